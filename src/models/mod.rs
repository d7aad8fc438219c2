//! Data models for IdeaHub entities.
//!
//! This module defines the core data structures:
//! - `User` - platform accounts with denormalized social counters
//! - `Idea` - a shareable unit of content with owner, visibility, lifecycle
//!   status, and star/fork counters
//! - `Workspace` - the 1:1 editable content container bound to an Idea
//! - `Collaborator` - a non-owner user granted access to a private Idea
//! - `Star` / `Follow` - join rows backing the denormalized counters
//! - `Notification` - best-effort side-effect records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Maximum number of collaborator rows per idea.
pub const MAX_COLLABORATORS: usize = 3;

/// Idea visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

impl Visibility {
    /// Parse the storage representation back into the enum.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(Error::Validation(format!("unknown visibility: {other}"))),
        }
    }
}

/// Idea lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl fmt::Display for IdeaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdeaStatus::Draft => write!(f, "draft"),
            IdeaStatus::Published => write!(f, "published"),
            IdeaStatus::Archived => write!(f, "archived"),
        }
    }
}

impl IdeaStatus {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(IdeaStatus::Draft),
            "published" => Ok(IdeaStatus::Published),
            "archived" => Ok(IdeaStatus::Archived),
            other => Err(Error::Validation(format!("unknown status: {other}"))),
        }
    }
}

/// Role granted to a non-owner collaborator.
///
/// The idea's `owner_id` is authoritative for owner semantics; a collaborator
/// row is never created for the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorRole {
    Editor,
    Viewer,
}

impl fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollaboratorRole::Editor => write!(f, "editor"),
            CollaboratorRole::Viewer => write!(f, "viewer"),
        }
    }
}

impl CollaboratorRole {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "editor" => Ok(CollaboratorRole::Editor),
            "viewer" => Ok(CollaboratorRole::Viewer),
            other => Err(Error::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// Kind of a notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Followed,
    CollaboratorAdded,
    IdeaForked,
    IdeaStarred,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Followed => write!(f, "followed"),
            NotificationKind::CollaboratorAdded => write!(f, "collaborator_added"),
            NotificationKind::IdeaForked => write!(f, "idea_forked"),
            NotificationKind::IdeaStarred => write!(f, "idea_starred"),
        }
    }
}

impl NotificationKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "followed" => Ok(NotificationKind::Followed),
            "collaborator_added" => Ok(NotificationKind::CollaboratorAdded),
            "idea_forked" => Ok(NotificationKind::IdeaForked),
            "idea_starred" => Ok(NotificationKind::IdeaStarred),
            other => Err(Error::Validation(format!("unknown notification kind: {other}"))),
        }
    }
}

/// A platform account.
///
/// The counters are denormalized; the follow and idea lifecycle operations
/// keep them equal to the underlying row counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (e.g., "usr-a1b2c3d4")
    pub id: String,

    /// Unique handle
    pub username: String,

    /// Unique email address
    pub email: String,

    /// Name shown in the UI
    pub display_name: String,

    /// Count of Follow rows with this user as following
    #[serde(default)]
    pub follower_count: i64,

    /// Count of Follow rows with this user as follower
    #[serde(default)]
    pub following_count: i64,

    /// Count of ideas owned by this user
    #[serde(default)]
    pub idea_count: i64,

    #[serde(default)]
    pub verified: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with zeroed counters.
    pub fn new(id: String, fields: NewUser) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: fields.username,
            email: fields.email,
            display_name: fields.display_name,
            follower_count: 0,
            following_count: 0,
            idea_count: 0,
            verified: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input fields for user creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub display_name: String,
}

/// A shareable unit of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    /// Unique identifier (e.g., "idea-a1b2c3d4")
    pub id: String,

    pub title: String,

    pub description: String,

    /// Category label (required at creation)
    pub category: String,

    /// Rendered summary blob; the editable state lives in the Workspace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Owning user; immutable after creation
    pub owner_id: String,

    #[serde(default)]
    pub visibility: Visibility,

    #[serde(default)]
    pub status: IdeaStatus,

    /// Count of Star rows referencing this idea
    #[serde(default)]
    pub star_count: i64,

    /// Count of ideas with forked_from_id pointing at this idea
    #[serde(default)]
    pub fork_count: i64,

    #[serde(default)]
    pub is_fork: bool,

    /// Source idea when this one was created by forking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forked_from_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Idea {
    /// Create a new (non-fork) idea owned by `owner_id`.
    pub fn new(id: String, owner_id: String, fields: NewIdea) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: fields.title,
            description: fields.description,
            category: fields.category,
            content: fields.content,
            owner_id,
            visibility: fields.visibility,
            status: IdeaStatus::Draft,
            star_count: 0,
            fork_count: 0,
            is_fork: false,
            forked_from_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input fields for idea creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdea {
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

impl NewIdea {
    /// Reject payloads missing the required fields.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("title is required".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(Error::Validation("description is required".to_string()));
        }
        if self.category.trim().is_empty() {
            return Err(Error::Validation("category is required".to_string()));
        }
        Ok(())
    }
}

/// Owner-editable idea fields; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdeaPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub content: Option<String>,
    pub visibility: Option<Visibility>,
    pub status: Option<IdeaStatus>,
}

/// Title/description overrides applied to a fork at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForkOverrides {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// The editable content container bound 1:1 to an Idea.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique identifier (e.g., "ws-a1b2c3d4")
    pub id: String,

    /// Backing idea; unique across all workspaces
    pub idea_id: String,

    pub owner_id: String,

    /// Opaque document + canvas state, written wholesale
    pub content: String,

    /// Mirrors the idea's visibility at creation; may diverge later
    #[serde(default)]
    pub is_public: bool,

    #[serde(default)]
    pub archived: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A non-owner user granted access to an idea.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaborator {
    /// Unique identifier (e.g., "col-a1b2c3d4")
    pub id: String,
    pub idea_id: String,
    pub user_id: String,
    pub role: CollaboratorRole,
    pub created_at: DateTime<Utc>,
}

/// Existence of this row means `user_id` starred `idea_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Star {
    pub user_id: String,
    pub idea_id: String,
    pub created_at: DateTime<Utc>,
}

/// Existence of this row means `follower_id` follows `following_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub follower_id: String,
    pub following_id: String,
    pub created_at: DateTime<Utc>,
}

/// An idea together with its collaborator rows, loaded in one consistent
/// read. The permission resolver operates only on this snapshot and never
/// re-reads the store mid-decision.
#[derive(Debug, Clone)]
pub struct IdeaSnapshot {
    pub idea: Idea,
    pub collaborators: Vec<Collaborator>,
}

impl IdeaSnapshot {
    /// Role from the collaborator rows, ignoring ownership.
    pub fn collaborator_role(&self, user_id: &str) -> Option<CollaboratorRole> {
        self.collaborators
            .iter()
            .find(|c| c.user_id == user_id)
            .map(|c| c.role)
    }
}

/// Best-effort side-effect record; never required for correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier (e.g., "ntf-a1b2c3d4")
    pub id: String,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_idea_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_idea;

    #[test]
    fn test_new_idea_defaults() {
        let idea = Idea::new(
            "idea-00000001".to_string(),
            "usr-00000001".to_string(),
            sample_idea("Solar kettle"),
        );
        assert_eq!(idea.status, IdeaStatus::Draft);
        assert_eq!(idea.star_count, 0);
        assert_eq!(idea.fork_count, 0);
        assert!(!idea.is_fork);
        assert!(idea.forked_from_id.is_none());
    }

    #[test]
    fn test_new_idea_validation() {
        let mut fields = sample_idea("Valid");
        assert!(fields.validate().is_ok());

        fields.title = "   ".to_string();
        assert!(matches!(fields.validate(), Err(Error::Validation(_))));

        let mut fields = sample_idea("Valid");
        fields.category = String::new();
        assert!(matches!(fields.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_enum_round_trips() {
        for v in [Visibility::Public, Visibility::Private] {
            assert_eq!(Visibility::parse(&v.to_string()).unwrap(), v);
        }
        for s in [IdeaStatus::Draft, IdeaStatus::Published, IdeaStatus::Archived] {
            assert_eq!(IdeaStatus::parse(&s.to_string()).unwrap(), s);
        }
        for r in [CollaboratorRole::Editor, CollaboratorRole::Viewer] {
            assert_eq!(CollaboratorRole::parse(&r.to_string()).unwrap(), r);
        }
        assert!(Visibility::parse("unlisted").is_err());
        assert!(CollaboratorRole::parse("owner").is_err());
    }

    #[test]
    fn test_idea_serde_skips_empty_optionals() {
        let idea = Idea::new(
            "idea-00000001".to_string(),
            "usr-00000001".to_string(),
            NewIdea {
                title: "T".to_string(),
                description: "D".to_string(),
                category: "c".to_string(),
                content: None,
                visibility: Visibility::Private,
            },
        );
        let json = serde_json::to_string(&idea).unwrap();
        assert!(!json.contains("forked_from_id"));
        assert!(!json.contains("\"content\""));
        assert!(json.contains("\"visibility\":\"private\""));
    }
}
