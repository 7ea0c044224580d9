use gloo_net::http::Request;

use crate::models::ModelOption;

/// Base URL of the backend API server. Empty means same origin, which is how
/// the backend serves the built frontend.
const API_BASE: &str = match option_env!("API_BASE") {
    Some(base) => base,
    None => "",
};

/// Fetches the model capability table from the backend.
pub async fn fetch_models() -> Result<Vec<ModelOption>, String> {
    let resp = Request::get(&format!("{API_BASE}/api/models"))
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(format!("Server error: {}", resp.status()));
    }

    resp.json::<Vec<ModelOption>>()
        .await
        .map_err(|e| format!("Parse error: {e}"))
}

/// Returns the URL of the streaming chat endpoint.
pub fn chat_url() -> String {
    format!("{API_BASE}/api/chat")
}
