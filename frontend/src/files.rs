use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::{File, FileReader, HtmlInputElement, ProgressEvent};

/// Reads every file selected in `input` as a data URI, calling `on_loaded`
/// once per file as each read completes. The input is reset afterwards so
/// picking the same file again fires another change event.
pub fn read_selected_files(input: &HtmlInputElement, on_loaded: impl Fn(String) + Clone + 'static) {
    let Some(files) = input.files() else {
        return;
    };
    for i in 0..files.length() {
        if let Some(file) = files.get(i) {
            read_as_data_url(file, on_loaded.clone());
        }
    }
    input.set_value("");
}

fn read_as_data_url(file: File, on_loaded: impl FnOnce(String) + 'static) {
    let reader = match FileReader::new() {
        Ok(reader) => reader,
        Err(e) => {
            log::error!("Failed to create FileReader: {e:?}");
            return;
        }
    };

    let result_reader = reader.clone();
    let name = file.name();
    let onloadend = Closure::once_into_js(move |_: ProgressEvent| {
        match result_reader.result().ok().and_then(|v| v.as_string()) {
            Some(url) => on_loaded(url),
            None => log::error!("Failed to read {name} as a data URL"),
        }
    });
    reader.set_onloadend(Some(onloadend.unchecked_ref()));

    if let Err(e) = reader.read_as_data_url(&file) {
        log::error!("Failed to start reading {}: {e:?}", file.name());
    }
}
