use async_trait::async_trait;
use reqwest::{Request, Response};

/// Minimal request executor, implemented by the plain client and by the
/// credential-injecting wrappers.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
