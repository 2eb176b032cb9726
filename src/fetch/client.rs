use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes HTTP requests for remote sensor exports. Abstracted so tests and
/// alternative transports can stand in for `reqwest::Client`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
