use leptos::ev;
use leptos::html;
use leptos::prelude::*;
use web_sys::HtmlInputElement;

use crate::session::{Session, Status};
use crate::state::AppState;

/// Input form: attachment previews, textarea and the toolbar with the image
/// picker, web-search toggle, model selector and submit button.
#[component]
pub fn PromptInput() -> impl IntoView {
    let state = expect_context::<AppState>();
    let file_input: NodeRef<html::Input> = NodeRef::new();

    let on_submit = move |ev: ev::SubmitEvent| {
        ev.prevent_default();
        state.send_message();
    };

    let on_keydown = move |ev: ev::KeyboardEvent| {
        if ev.key() == "Enter" && !ev.shift_key() {
            ev.prevent_default();
            state.send_message();
        }
    };

    let placeholder = move || {
        if state.supports_vision() {
            "Write your message or upload an image..."
        } else {
            "Write your message..."
        }
    };

    view! {
        <form class="prompt-input" on:submit=on_submit>
            // Pending image previews
            {move || {
                let attachments = state.session.with(|s| s.attachments.clone());
                (!attachments.is_empty()).then(|| {
                    view! {
                        <div class="attachments">
                            {attachments
                                .into_iter()
                                .enumerate()
                                .map(|(i, a)| {
                                    view! {
                                        <div class="attachment">
                                            <img src=a.url alt=format!("Preview {i}") />
                                            <button
                                                type="button"
                                                class="remove-attachment"
                                                on:click=move |_| state.remove_attachment(i)
                                            >
                                                "×"
                                            </button>
                                        </div>
                                    }
                                })
                                .collect::<Vec<_>>()}
                        </div>
                    }
                })
            }}

            <textarea
                rows="2"
                placeholder=placeholder
                prop:value=move || state.session.with(|s| s.input.clone())
                on:input=move |ev| state.set_input(event_target_value(&ev))
                on:keydown=on_keydown
            />

            <div class="toolbar">
                <div class="tools">
                    <Show when=move || state.supports_vision()>
                        <input
                            node_ref=file_input
                            type="file"
                            accept="image/*"
                            multiple
                            class="hidden"
                            on:change=move |ev| {
                                let input: HtmlInputElement = event_target(&ev);
                                state.add_files(&input);
                            }
                        />
                        <button
                            type="button"
                            class="tool-btn"
                            on:click=move |_| {
                                if let Some(input) = file_input.get() {
                                    input.click();
                                }
                            }
                        >
                            "Image"
                        </button>
                    </Show>

                    <button
                        type="button"
                        class="tool-btn"
                        class:active=move || state.session.with(|s| s.web_search)
                        on:click=move |_| state.toggle_web_search()
                    >
                        "Search"
                    </button>

                    <select
                        class="model-select"
                        on:change=move |ev| state.select_model(event_target_value(&ev))
                    >
                        {move || {
                            let current = state.session.with(|s| s.model.clone());
                            state
                                .models
                                .get()
                                .into_iter()
                                .map(|m| {
                                    let label = if m.supports_vision {
                                        format!("{} 👁️", m.name)
                                    } else {
                                        m.name.clone()
                                    };
                                    let selected = m.value == current;
                                    view! {
                                        <option value=m.value selected=selected>
                                            {label}
                                        </option>
                                    }
                                })
                                .collect::<Vec<_>>()
                        }}
                    </select>
                </div>

                <button
                    type="submit"
                    class="send-btn"
                    disabled=move || !state.session.with(Session::can_submit)
                >
                    {move || match state.session.with(|s| s.status) {
                        Status::Submitted => "Sending…",
                        Status::Streaming => "Streaming…",
                        _ => "Send",
                    }}
                </button>
            </div>
        </form>
    }
}
