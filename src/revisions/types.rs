//! Revision data model
//!
//! Defines the module kinds, revision snapshots, generation scopes and the
//! view signals returned by pointer changes. All wire types use camelCase JSON
//! so they line up with what the web client stores.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Module-specific content payload. Opaque to the engine.
pub type Content = serde_json::Value;

/// A content module with its own independent revision timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Notes,
    Quiz,
    Flashcards,
    Summary,
    Mindmap,
    Insights,
    Editor,
}

impl ModuleKind {
    /// Every module kind, in display order
    pub const ALL: [ModuleKind; 7] = [
        Self::Notes,
        Self::Quiz,
        Self::Flashcards,
        Self::Summary,
        Self::Mindmap,
        Self::Insights,
        Self::Editor,
    ];

    /// Human-readable title, used for auto-generated labels
    pub fn title(&self) -> &'static str {
        match self {
            Self::Notes => "Notes",
            Self::Quiz => "Quiz",
            Self::Flashcards => "Flashcards",
            Self::Summary => "Summary",
            Self::Mindmap => "Mindmap",
            Self::Insights => "Insights",
            Self::Editor => "Editor",
        }
    }

    /// Whether the generation backend can produce content for this module.
    ///
    /// The editor module is only ever edited by hand.
    pub fn is_generated(&self) -> bool {
        !matches!(self, Self::Editor)
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notes => write!(f, "notes"),
            Self::Quiz => write!(f, "quiz"),
            Self::Flashcards => write!(f, "flashcards"),
            Self::Summary => write!(f, "summary"),
            Self::Mindmap => write!(f, "mindmap"),
            Self::Insights => write!(f, "insights"),
            Self::Editor => write!(f, "editor"),
        }
    }
}

impl std::str::FromStr for ModuleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notes" => Ok(Self::Notes),
            "quiz" => Ok(Self::Quiz),
            "flashcards" => Ok(Self::Flashcards),
            "summary" => Ok(Self::Summary),
            "mindmap" => Ok(Self::Mindmap),
            "insights" => Ok(Self::Insights),
            "editor" => Ok(Self::Editor),
            other => Err(format!("unknown module: {}", other)),
        }
    }
}

/// How a revision came into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionOrigin {
    /// Produced by a successful generation; auto-activates
    Generated,
    /// Saved from imported/legacy content
    Imported,
    /// Promoted from a local draft or saved by hand
    Manual,
    /// Copy of another revision
    Duplicated,
}

impl RevisionOrigin {
    /// Only generated revisions become active on creation
    pub fn activates_on_create(&self) -> bool {
        matches!(self, Self::Generated)
    }
}

impl std::fmt::Display for RevisionOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generated => write!(f, "generated"),
            Self::Imported => write!(f, "imported"),
            Self::Manual => write!(f, "manual"),
            Self::Duplicated => write!(f, "duplicated"),
        }
    }
}

/// Which part of the source material a generation draws on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum GenerationScope {
    /// The whole document
    #[default]
    All,
    /// An inclusive, 1-based page range
    Pages(u32, u32),
    /// A set of topic ids from the document outline
    Topics(Vec<String>),
}

impl GenerationScope {
    /// Reject empty or inverted scopes before they reach the backend
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::All => Ok(()),
            Self::Pages(start, end) => {
                if *start == 0 {
                    return Err(Error::Validation("page ranges start at 1".to_string()));
                }
                if start > end {
                    return Err(Error::Validation(format!(
                        "invalid page range {}-{}",
                        start, end
                    )));
                }
                Ok(())
            }
            Self::Topics(ids) => {
                if ids.iter().all(|id| id.trim().is_empty()) {
                    return Err(Error::Validation(
                        "topic scope needs at least one topic".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Display for GenerationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Pages(start, end) => write!(f, "pages:{}-{}", start, end),
            Self::Topics(ids) => write!(f, "topics:{}", ids.join(",")),
        }
    }
}

/// Parses `all`, `pages:3-7` or `topics:intro,methods`
impl std::str::FromStr for GenerationScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if let Some(range) = s.strip_prefix("pages:") {
            let (start, end) = range
                .split_once('-')
                .ok_or_else(|| format!("expected pages:<start>-<end>, got '{}'", s))?;
            let start = start
                .trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid start page '{}': {}", start, e))?;
            let end = end
                .trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid end page '{}': {}", end, e))?;
            return Ok(Self::Pages(start, end));
        }
        if let Some(list) = s.strip_prefix("topics:") {
            let ids: Vec<String> = list
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            return Ok(Self::Topics(ids));
        }
        Err(format!("unknown scope: {}", s))
    }
}

/// A named, immutable snapshot of a module's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub id: String,
    pub module: ModuleKind,
    pub label: String,
    /// Creation time in unix milliseconds
    pub created_at: i64,
    pub content: Content,
    pub origin: RevisionOrigin,
    /// Scope the content was generated from, for generated revisions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<GenerationScope>,
}

impl Revision {
    /// Build a revision with a fresh id and the current timestamp
    pub fn new(
        module: ModuleKind,
        label: impl Into<String>,
        content: Content,
        origin: RevisionOrigin,
    ) -> Self {
        Self {
            id: format!("rev-{}", uuid::Uuid::new_v4()),
            module,
            label: label.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
            content,
            origin,
            scope: None,
        }
    }

    /// Attach the generation scope
    pub fn with_scope(mut self, scope: GenerationScope) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Sequence number issued to a pointer change.
///
/// A baseline reload carrying a ticket is only applied while no later
/// pointer change has been applied for the same module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BaselineTicket(pub(crate) u64);

/// What a module displays after its pointer moved
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveView {
    /// A stored revision is active
    Revision(Revision),
    /// The pointer is at baseline; the caller must (re)load baseline content
    ReloadBaseline(BaselineTicket),
}

impl ActiveView {
    /// Whether the caller is being told to reload baseline content
    pub fn is_reload_baseline(&self) -> bool {
        matches!(self, Self::ReloadBaseline(_))
    }
}

/// Trim a user-supplied label, rejecting blank ones
pub(crate) fn normalize_label(label: &str) -> Result<String> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("label must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}
