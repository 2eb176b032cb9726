//! HTTP retrieval of remote sensor exports.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use tracing::debug;

/// Downloads `url` in full, failing on non-success status codes.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(
        reqwest::Method::GET,
        url.parse().with_context(|| format!("invalid URL '{url}'"))?,
    );

    let resp = client.execute(req).await?.error_for_status()?;
    let bytes = resp.bytes().await?;
    debug!(url, bytes = bytes.len(), "Export downloaded");
    Ok(bytes.to_vec())
}
