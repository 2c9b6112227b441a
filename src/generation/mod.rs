//! Content generation
//!
//! [`ContentGeneratorClient`] is the seam to whatever produces module content;
//! [`GenerationOrchestrator`] runs one request at a time per module and turns
//! each successful result into the module's new active revision.

mod client;
mod orchestrator;

pub use client::{ContentGeneratorClient, HttpGeneratorClient};
pub use orchestrator::{
    GenerationOrchestrator, GenerationRequest, GenerationState, PendingGeneration, RequestStatus,
};
