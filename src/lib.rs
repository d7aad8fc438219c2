//! IdeaHub - the consistency and access-control core of a social
//! idea-sharing platform.
//!
//! This library provides the one subsystem of the platform with real
//! correctness requirements:
//! - `models` - entities (User, Idea, Workspace, collaborators, stars,
//!   follows) and their tagged enums
//! - `storage` - the transactional SQLite entity store
//! - `permissions` - pure permission decisions over an idea snapshot
//! - `lifecycle` - multi-entity transactional operations that keep the
//!   denormalized counters and cardinality limits consistent
//! - `service` - the access-controlled facade the HTTP layer calls
//!
//! The HTTP layer, identity provider, and editing UI live outside this
//! crate; they hand in an already-authenticated principal (a user id) or
//! `None` for anonymous requests.

pub mod lifecycle;
pub mod models;
pub mod permissions;
pub mod service;
pub mod storage;

/// Library-level error type for IdeaHub operations.
///
/// Domain variants carry no HTTP semantics; the HTTP layer maps them
/// mechanically (`Unauthenticated` vs `PermissionDenied` becomes 401 vs 403).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

/// Result type alias for IdeaHub operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Test utilities shared by the unit-test modules.
#[cfg(test)]
pub(crate) mod test_utils {
    use crate::models::{NewIdea, NewUser, Visibility};

    /// A valid creation payload tests can tweak per case.
    pub fn sample_idea(title: &str) -> NewIdea {
        NewIdea {
            title: title.to_string(),
            description: format!("{title} description"),
            category: "productivity".to_string(),
            content: Some(r#"{"blocks":[]}"#.to_string()),
            visibility: Visibility::Public,
        }
    }

    pub fn sample_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            display_name: username.to_string(),
        }
    }
}
