use leptos::prelude::*;
use leptos::task::spawn_local;
use web_sys::HtmlInputElement;

use crate::api;
use crate::files;
use crate::models::{Attachment, ModelOption, default_models};
use crate::session::Session;
use crate::stream;

/// Shared application state, provided via Leptos context.
#[derive(Clone, Copy)]
pub struct AppState {
    pub session: RwSignal<Session>,
    pub models: RwSignal<Vec<ModelOption>>,
}

impl AppState {
    /// Create a new `AppState` and provide it in the current Leptos context.
    pub fn provide() -> Self {
        let models = default_models();
        let session = Session::new(models[0].value.clone());

        let state = Self {
            session: RwSignal::new(session),
            models: RwSignal::new(models),
        };

        provide_context(state);
        state
    }

    /// Load the model table from the backend, keeping the built-in one on failure.
    pub fn load_models(&self) {
        let state = *self;
        spawn_local(async move {
            match api::fetch_models().await {
                Ok(models) if !models.is_empty() => {
                    let current = state.session.with_untracked(|s| s.model.clone());
                    let selected = if models.iter().any(|m| m.value == current) {
                        current
                    } else {
                        models[0].value.clone()
                    };
                    state.session.update(|s| s.select_model(&selected, &models));
                    state.models.set(models);
                }
                Ok(_) => log::warn!("Backend returned no models; keeping defaults"),
                Err(e) => log::warn!("Failed to fetch models, keeping defaults: {e}"),
            }
        });
    }

    pub fn supports_vision(&self) -> bool {
        self.models.with(|models| self.session.with(|s| s.supports_vision(models)))
    }

    pub fn set_input(&self, text: String) {
        self.session.update(|s| s.set_input(text));
    }

    pub fn select_model(&self, value: String) {
        let models = self.models.get_untracked();
        self.session.update(|s| s.select_model(&value, &models));
    }

    pub fn toggle_web_search(&self) {
        self.session.update(Session::toggle_web_search);
    }

    /// Read the files picked in `input` and queue them as attachments.
    pub fn add_files(&self, input: &HtmlInputElement) {
        let state = *self;
        files::read_selected_files(input, move |url| {
            let models = state.models.get_untracked();
            state.session.update(|s| {
                if !s.add_attachment(Attachment::from_data_url(url), &models) {
                    log::warn!("Ignoring image: {} does not accept images", s.model);
                }
            });
        });
    }

    pub fn remove_attachment(&self, index: usize) {
        self.session.update(|s| s.remove_attachment(index));
    }

    pub fn dismiss_error(&self) {
        self.session.update(Session::dismiss_error);
    }

    /// Submit the current input and stream the reply into the session.
    pub fn send_message(&self) {
        let mut request = None;
        self.session.update(|s| request = s.submit());
        let Some(request) = request else {
            return;
        };

        let session = self.session;
        spawn_local(async move {
            let result = stream::stream_chat(&request, |event| {
                session.update(|s| s.apply(event));
            })
            .await;

            match result {
                Ok(()) => session.update(Session::finish),
                Err(e) => {
                    log::error!("Chat stream failed: {e}");
                    session.update(|s| s.fail(e));
                }
            }
        });
    }
}
