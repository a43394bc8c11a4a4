//! HTTP helpers for the relay's REST surface.

use frames::ChatMessage;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}

fn messages_endpoint(base_url: &str) -> String {
    format!("{}/api/messages", base_url.trim_end_matches('/'))
}

/// Fetch the relay's retained messages from `GET /api/messages`, oldest
/// first.
///
/// # Errors
///
/// Returns [`ApiError::Http`] when the request or body decode fails and
/// [`ApiError::Status`] for a non-success status.
pub async fn fetch_history(base_url: &str) -> Result<Vec<ChatMessage>, ApiError> {
    let url = messages_endpoint(base_url);
    let resp = reqwest::get(&url).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ApiError::Status { url, status: status.as_u16() });
    }
    Ok(resp.json::<Vec<ChatMessage>>().await?)
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
