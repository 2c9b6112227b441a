//! Revision timelines and local drafts
//!
//! A module's displayed content is either its baseline or one of its stored
//! revisions. [`RevisionStore`] owns the list and the active pointer;
//! [`DraftStaging`] holds unsaved edits on top of whatever is active.

mod draft;
mod store;
mod types;

pub use draft::{DraftStaging, LocalDraft};
pub use store::{RevisionStore, StoreView};
pub use types::{
    ActiveView, BaselineTicket, Content, GenerationScope, ModuleKind, Revision, RevisionOrigin,
};
