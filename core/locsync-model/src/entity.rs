use chrono::{DateTime, Utc};
use locsync_formats::Format;
use locsync_types::{EntityId, Message, ProjectId, ResourceId};
use serde::{Deserialize, Serialize};

/// A project whose repository is kept in sync with the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub slug: String,
    pub name: String,
    pub source_locale: String,
}

/// A localizable file tracked inside a project's repository.
///
/// Created the first time a sync pass over the source locale discovers the
/// file. Never deleted, only marked obsolete once it disappears upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub project_id: ProjectId,
    /// Path relative to the source directory, shared by every locale.
    pub path: String,
    pub format: Format,
    pub obsolete: bool,
}

impl Resource {
    pub fn new(project_id: ProjectId, path: impl Into<String>, format: Format) -> Self {
        Self {
            id: ResourceId::new(),
            project_id,
            path: path.into(),
            format,
            obsolete: false,
        }
    }
}

/// One source string extracted from a resource.
///
/// `(resource_id, key)` is unique among entities that are not obsolete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub resource_id: ResourceId,
    /// Format-specific stable key (PO `msgctxt\u{4}msgid`, property key, Fluent id).
    pub key: String,
    pub source: Message,
    /// Developer comment; may carry metadata such as `MAX_LENGTH: 10`.
    pub comment: Option<String>,
    pub obsolete: bool,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(resource_id: ResourceId, key: impl Into<String>, source: Message) -> Self {
        Self {
            id: EntityId::new(),
            resource_id,
            key: key.into(),
            source,
            comment: None,
            obsolete: false,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment.filter(|c| !c.is_empty());
        self
    }
}
