//! Decision-service auto-discovery helpers.
//!
//! Silently pings the configured Ollama instance and, if responsive,
//! fetches the list of locally downloaded models from `/api/tags`.

use serde::Deserialize;

/// A single model entry returned by Ollama's `/api/tags` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
}

/// Raw shape of the `/api/tags` JSON response.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

/// Ping the model server and return the list of available models.
///
/// Returns `Ok(models)` when the server is reachable, or `Err(reason)`
/// when it is not (server offline, network error, etc.).
pub fn fetch_models(base_url: &str) -> Result<Vec<OllamaModel>, String> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let response = reqwest::blocking::get(&url)
        .map_err(|e| format!("decision service unreachable at {}: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("decision service returned HTTP {}", response.status()));
    }

    let tags: TagsResponse = response
        .json()
        .map_err(|e| format!("failed to parse /api/tags response: {}", e))?;

    Ok(tags.models)
}
