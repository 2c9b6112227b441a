//! Content generator clients

use crate::error::{Error, Result};
use crate::revisions::{Content, GenerationScope, ModuleKind};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

/// Produces fresh module content for a scope.
///
/// Implementations must be safe to call concurrently for different modules.
#[async_trait]
pub trait ContentGeneratorClient: Send + Sync {
    /// Generate content for `module` from the given scope
    async fn generate(&self, module: ModuleKind, scope: &GenerationScope) -> Result<Content>;

    /// Client name (used in logs)
    fn name(&self) -> &str;
}

/// Request body sent to the generation backend
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<&'a str>,
    scope: &'a GenerationScope,
}

/// Generator backed by an HTTP service.
///
/// Posts `{fileId, scope}` to `<endpoint>/api/<module>` and treats the
/// JSON response body as the generated content.
pub struct HttpGeneratorClient {
    client: reqwest::Client,
    endpoint: String,
    file_id: Option<String>,
}

impl HttpGeneratorClient {
    /// Create a client for a backend base URL
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            file_id: None,
        }
    }

    /// Source document the backend generates from
    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    /// Backend base URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, module: ModuleKind) -> String {
        format!("{}/api/{}", self.endpoint.trim_end_matches('/'), module)
    }
}

#[async_trait]
impl ContentGeneratorClient for HttpGeneratorClient {
    async fn generate(&self, module: ModuleKind, scope: &GenerationScope) -> Result<Content> {
        let url = self.url(module);
        let payload = GenerateRequest {
            file_id: self.file_id.as_deref(),
            scope,
        };

        tracing::debug!(module = %module, url = %url, scope = %scope, "Requesting generation");

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to reach generator at {}: {}", url, e)))?;

        let status = response.status();
        if let Some(err) = classify_status(module, status) {
            let body = response.text().await.unwrap_or_default();
            if !body.is_empty() {
                tracing::debug!(module = %module, status = %status, body = %body, "Generator error body");
            }
            return Err(err);
        }

        response
            .json::<Content>()
            .await
            .map_err(|e| Error::Generation(format!("Failed to parse {} content: {}", module, e)))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Map a non-success backend status to an error
fn classify_status(module: ModuleKind, status: StatusCode) -> Option<Error> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(Error::Generation("quota exceeded".to_string()));
    }
    Some(Error::Generation(format!(
        "generator returned {} for {}",
        status, module
    )))
}
