mod api;
mod components;
mod files;
mod models;
mod session;
mod state;
mod stream;

use leptos::mount::mount_to_body;
use leptos::prelude::*;

use components::chat::ChatArea;
use state::AppState;

/// Root application component.
#[component]
fn App() -> impl IntoView {
    let state = AppState::provide();

    // Replace the built-in model table with the backend's catalog
    state.load_models();

    view! {
        <div class="app-container">
            <ChatArea />
        </div>
    }
}

fn main() {
    console_log::init_with_level(log::Level::Debug).expect("Failed to init logger");
    mount_to_body(App);
}
