//! Per-module generation lifecycle
//!
//! State machine:
//! ```text
//!   Idle ──begin──► Generating ──ok──► (create revision) ──► Idle
//!                        │
//!                        └──err──► Erroring ──► Idle
//! ```
//!
//! `begin` runs synchronously so the busy check and the transition to
//! `Generating` happen at call time; `run` awaits the generator and commits
//! the result. A request cancelled while the generator call is in flight is
//! dropped when the call resolves; a `run` future dropped before completing
//! releases its request.

use super::client::ContentGeneratorClient;
use crate::error::{Error, Result};
use crate::revisions::{GenerationScope, ModuleKind, Revision, RevisionOrigin, RevisionStore};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Generation state of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    Idle,
    Generating,
    /// Transient; a failure is being recorded
    Erroring,
}

impl std::fmt::Display for GenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Generating => write!(f, "generating"),
            Self::Erroring => write!(f, "erroring"),
        }
    }
}

/// Outcome of a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

/// One in-flight (or finished) generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub id: String,
    pub module: ModuleKind,
    pub scope: GenerationScope,
    /// Unix milliseconds
    pub requested_at: i64,
    pub status: RequestStatus,
}

/// Ticket for a request admitted by [`GenerationOrchestrator::begin`]
#[derive(Debug)]
pub struct PendingGeneration {
    request: GenerationRequest,
}

impl PendingGeneration {
    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: GenerationState,
    current: Option<GenerationRequest>,
    /// Set once a result passed the staleness check and is being stored
    committing: bool,
    last_request: Option<GenerationRequest>,
    last_error: Option<String>,
}

/// Drives generation for a single module
pub struct GenerationOrchestrator {
    module: ModuleKind,
    store: Arc<RevisionStore>,
    client: Arc<dyn ContentGeneratorClient>,
    timeout: Option<Duration>,
    label_prefix: String,
    lifecycle: Mutex<Lifecycle>,
}

impl GenerationOrchestrator {
    /// Create an idle orchestrator committing into `store`
    pub fn new(store: Arc<RevisionStore>, client: Arc<dyn ContentGeneratorClient>) -> Self {
        let module = store.module();
        Self {
            module,
            store,
            client,
            timeout: None,
            label_prefix: module.title().to_string(),
            lifecycle: Mutex::new(Lifecycle {
                state: GenerationState::Idle,
                current: None,
                committing: false,
                last_request: None,
                last_error: None,
            }),
        }
    }

    /// Fail generator calls that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Prefix for auto labels (`"<prefix> v<N>"`); defaults to the module title
    pub fn with_label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.label_prefix = prefix.into();
        self
    }

    pub fn module(&self) -> ModuleKind {
        self.module
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> GenerationState {
        self.lock().state
    }

    pub fn is_generating(&self) -> bool {
        self.lock().state == GenerationState::Generating
    }

    /// Request currently in flight
    pub fn current_request(&self) -> Option<GenerationRequest> {
        self.lock().current.clone()
    }

    /// Most recently finished request
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.lock().last_request.clone()
    }

    /// Message of the most recent failure, cleared by the next request
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Admit a generation request.
    ///
    /// Fails with `Busy` if one is already in flight for this module.
    pub fn begin(&self, scope: GenerationScope) -> Result<PendingGeneration> {
        if !self.module.is_generated() {
            return Err(Error::Validation(format!(
                "{} content is not generated",
                self.module
            )));
        }
        scope.validate()?;

        let mut lifecycle = self.lock();
        if lifecycle.state == GenerationState::Generating {
            return Err(Error::Busy(self.module.to_string()));
        }

        let request = GenerationRequest {
            id: format!("gen-{}", uuid::Uuid::new_v4()),
            module: self.module,
            scope,
            requested_at: chrono::Utc::now().timestamp_millis(),
            status: RequestStatus::Pending,
        };
        lifecycle.state = GenerationState::Generating;
        lifecycle.current = Some(request.clone());
        lifecycle.committing = false;
        lifecycle.last_error = None;
        drop(lifecycle);

        tracing::info!(
            module = %self.module,
            request = %request.id,
            scope = %request.scope,
            client = self.client.name(),
            "Generation started"
        );
        Ok(PendingGeneration { request })
    }

    /// Call the generator for an admitted request and commit its result as
    /// the new active revision.
    ///
    /// Dropping the returned future before it completes abandons the
    /// request and returns the module to `Idle`.
    pub fn run(
        &self,
        pending: PendingGeneration,
    ) -> impl Future<Output = Result<Revision>> + Send + '_ {
        let request = pending.request;
        // Armed before the first poll so an unpolled, dropped future is covered too
        let abandon = AbandonOnDrop {
            orchestrator: self,
            request_id: request.id.clone(),
        };
        async move {
            let _abandon = abandon;
            self.drive(request).await
        }
    }

    async fn drive(&self, request: GenerationRequest) -> Result<Revision> {
        let call = self.client.generate(self.module, &request.scope);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(Error::Generation(format!(
                    "{} generation timed out after {}s",
                    self.module,
                    limit.as_secs()
                ))),
            },
            None => call.await,
        };

        let content = match result {
            Ok(content) => content,
            Err(e) => return Err(self.fail(&request, e)),
        };

        if !self.claim_commit(&request.id) {
            tracing::info!(
                module = %self.module,
                request = %request.id,
                "Discarding result of cancelled generation"
            );
            return Err(Error::Cancelled(format!(
                "generation {} for {} was superseded",
                request.id, self.module
            )));
        }

        let label = self.store.next_auto_label(&self.label_prefix).await;
        match self
            .store
            .create_revision(
                &label,
                content,
                RevisionOrigin::Generated,
                Some(request.scope.clone()),
            )
            .await
        {
            Ok(revision) => {
                self.finish(&request.id, RequestStatus::Succeeded);
                tracing::info!(
                    module = %self.module,
                    request = %request.id,
                    revision = %revision.id,
                    "Generation finished as '{}'",
                    revision.label
                );
                Ok(revision)
            }
            Err(e) => Err(self.fail(&request, e)),
        }
    }

    /// `begin` followed by `run`
    pub async fn generate(&self, scope: GenerationScope) -> Result<Revision> {
        let pending = self.begin(scope)?;
        self.run(pending).await
    }

    /// Cancel the in-flight request, returning the module to `Idle`.
    ///
    /// Returns `false` if nothing was pending or the result is already being
    /// stored.
    pub fn cancel(&self) -> bool {
        let mut lifecycle = self.lock();
        if lifecycle.committing {
            return false;
        }
        let Some(mut request) = lifecycle.current.take() else {
            return false;
        };
        request.status = RequestStatus::Cancelled;
        tracing::info!(module = %self.module, request = %request.id, "Generation cancelled");
        lifecycle.last_request = Some(request);
        lifecycle.state = GenerationState::Idle;
        true
    }

    fn is_current(lifecycle: &Lifecycle, request_id: &str) -> bool {
        lifecycle
            .current
            .as_ref()
            .map(|r| r.id == request_id)
            .unwrap_or(false)
    }

    /// Pass the staleness check and block cancellation from here on
    fn claim_commit(&self, request_id: &str) -> bool {
        let mut lifecycle = self.lock();
        if !Self::is_current(&lifecycle, request_id) {
            return false;
        }
        lifecycle.committing = true;
        true
    }

    /// Close the request if it is still current; returns whether it was
    fn finish(&self, request_id: &str, status: RequestStatus) -> bool {
        let mut lifecycle = self.lock();
        if !Self::is_current(&lifecycle, request_id) {
            return false;
        }
        if let Some(mut request) = lifecycle.current.take() {
            request.status = status;
            lifecycle.last_request = Some(request);
        }
        lifecycle.committing = false;
        lifecycle.state = GenerationState::Idle;
        true
    }

    /// Record a failure and return the error to hand back to the caller.
    ///
    /// A failure of a request that is no longer current is reported as
    /// `Cancelled` and leaves the lifecycle alone.
    fn fail(&self, request: &GenerationRequest, err: Error) -> Error {
        {
            let mut lifecycle = self.lock();
            if !Self::is_current(&lifecycle, &request.id) {
                tracing::debug!(
                    module = %self.module,
                    request = %request.id,
                    error = %err,
                    "Ignoring failure of cancelled generation"
                );
                return Error::Cancelled(format!(
                    "generation {} for {} was superseded",
                    request.id, self.module
                ));
            }
            lifecycle.state = GenerationState::Erroring;
            lifecycle.last_error = Some(err.to_string());
        }

        tracing::warn!(
            module = %self.module,
            request = %request.id,
            error = %err,
            "Generation failed"
        );
        self.finish(&request.id, RequestStatus::Failed);
        err
    }
}

/// Releases the lifecycle of a `run` future that is dropped mid-flight.
///
/// Once `run` has finished the request is no longer current and this is a
/// no-op.
struct AbandonOnDrop<'a> {
    orchestrator: &'a GenerationOrchestrator,
    request_id: String,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self
            .orchestrator
            .finish(&self.request_id, RequestStatus::Cancelled)
        {
            tracing::info!(
                module = %self.orchestrator.module,
                request = %self.request_id,
                "Generation abandoned before completion"
            );
        }
    }
}
