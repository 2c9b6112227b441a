//! Docspace - revision and generation-lifecycle engine
//!
//! Docspace keeps, for every study module derived from a source document
//! (notes, quiz, flashcards, summary, mind map, insights, editor), a timeline
//! of named revisions, an active pointer into that timeline, a local draft of
//! unsaved edits, and at most one in-flight generation request.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ModuleRegistry                            │
//! │                                                                   │
//! │   notes        quiz        flashcards   ...        editor         │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐           ┌─────────┐     │
//! │  │ Store   │  │ Store   │  │ Store   │           │ Store   │     │
//! │  │ Drafts  │  │ Drafts  │  │ Drafts  │           │ Drafts  │     │
//! │  │ Gen.    │  │ Gen.    │  │ Gen.    │           │         │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘           └────┬────┘     │
//! │       └────────────┴─────┬──────┴─────────────────────┘          │
//! │                          │                 broadcast ──► events   │
//! └──────────────────────────┼────────────────────────────────────────┘
//!              ┌─────────────┴──────────────┐
//!              ▼                            ▼
//!   ┌─────────────────────┐      ┌───────────────────────┐
//!   │ PersistenceGateway  │      │ ContentGeneratorClient│
//!   │  memory | file      │      │  http                 │
//!   └─────────────────────┘      └───────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - At most one generation per module is in flight; a second request fails
//!   with [`Error::Busy`] at call time.
//! - Pointer changes are ordered by call, not by completion: a baseline
//!   fetch that resolves after a later switch is dropped.
//! - Deleting the active revision falls back to the baseline.
//! - Drafts never outlive a pointer change.
//!
//! ## Modules
//!
//! - [`revisions`]: revision types, per-module store and draft staging
//! - [`generation`]: generator client seam and generation lifecycle
//! - [`persistence`]: storage backends for revisions and baselines
//! - [`registry`]: per-module wiring, snapshots and change events
//! - [`config`]: configuration management

pub mod config;
pub mod error;
pub mod generation;
pub mod persistence;
pub mod registry;
pub mod revisions;

pub use config::DocspaceConfig;
pub use error::{Error, Result};
pub use generation::{ContentGeneratorClient, GenerationOrchestrator, HttpGeneratorClient};
pub use persistence::{FilePersistence, InMemoryPersistence, PersistenceGateway};
pub use registry::{GenerationOptions, ModuleRegistry, ModuleSnapshot, RegistryEvent};
pub use revisions::{Content, GenerationScope, ModuleKind, Revision, RevisionOrigin};
