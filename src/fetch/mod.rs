//! HTTP plumbing for remote reading sources.
//!
//! [`HttpClient`] is the seam: [`BasicClient`] sends requests as-is and the
//! [`auth`] wrappers decorate them with credentials.

mod client;
mod basic;
pub mod auth;

pub use client::HttpClient;
pub use basic::BasicClient;

use anyhow::{Result, anyhow};
use tracing::debug;

/// GETs `url` and returns the response body.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);
    send(client, req).await
}

/// Executes `req` and returns the body, failing on a non-success status.
pub async fn send<C: HttpClient>(client: &C, req: reqwest::Request) -> Result<Vec<u8>> {
    let url = req.url().clone();
    let resp = client.execute(req).await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow!("{} returned status {}: {}", url, status, body));
    }

    let bytes = resp.bytes().await?;
    debug!(url = %url, bytes = bytes.len(), "Response received");
    Ok(bytes.to_vec())
}
