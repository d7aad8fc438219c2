//! Permission decisions over an idea snapshot.
//!
//! Every function here is pure: it looks only at the [`IdeaSnapshot`] and
//! the optional principal handed to it, never re-reads the store, and never
//! fails. Predicates return a [`Decision`] whose denial reason the facade
//! surfaces verbatim in `PermissionDenied` errors.
//!
//! Ownership strictly dominates collaborator rows: if a (state-violating)
//! collaborator row exists for the owner, it is ignored rather than
//! rejected, so a corrupted store degrades to the owner's full rights.

use serde::{Deserialize, Serialize};

use crate::models::{CollaboratorRole, IdeaSnapshot, Visibility, MAX_COLLABORATORS};

/// Effective role of a principal with respect to one idea.
///
/// `None` is a role, not a verdict: a public idea is viewable by a
/// `None`-role principal, just never editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Editor,
    Viewer,
    None,
}

/// Outcome of a permission predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    allowed: bool,
    reason: &'static str,
}

impl Decision {
    const ALLOW: Decision = Decision {
        allowed: true,
        reason: "",
    };

    fn deny(reason: &'static str) -> Self {
        Decision {
            allowed: false,
            reason,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Human-readable denial reason; empty for allowed decisions.
    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

/// Effective role of `principal` for the snapshot's idea.
///
/// The owner check runs before the collaborator lookup, so a redundant
/// owner-collaborator row never demotes the owner.
pub fn role_of(snapshot: &IdeaSnapshot, principal: Option<&str>) -> Role {
    let Some(user_id) = principal else {
        return Role::None;
    };

    if snapshot.idea.owner_id == user_id {
        return Role::Owner;
    }

    match snapshot.collaborator_role(user_id) {
        Some(CollaboratorRole::Editor) => Role::Editor,
        Some(CollaboratorRole::Viewer) => Role::Viewer,
        None => Role::None,
    }
}

/// Anyone may view a public idea; private ideas are limited to the owner
/// and collaborators of any role.
pub fn can_view(snapshot: &IdeaSnapshot, principal: Option<&str>) -> Decision {
    if snapshot.idea.visibility == Visibility::Public {
        return Decision::ALLOW;
    }

    match role_of(snapshot, principal) {
        Role::Owner | Role::Editor | Role::Viewer => Decision::ALLOW,
        Role::None => Decision::deny("private idea is visible only to its owner and collaborators"),
    }
}

/// Only the owner and editor collaborators may edit; visibility never
/// grants edit rights.
pub fn can_edit(snapshot: &IdeaSnapshot, principal: Option<&str>) -> Decision {
    match role_of(snapshot, principal) {
        Role::Owner | Role::Editor => Decision::ALLOW,
        Role::Viewer => Decision::deny("viewer collaborators cannot edit"),
        Role::None => Decision::deny("only the owner and editor collaborators can edit"),
    }
}

/// Only the owner may invite, and only below the collaborator cap.
pub fn can_invite(snapshot: &IdeaSnapshot, principal: Option<&str>) -> Decision {
    if role_of(snapshot, principal) != Role::Owner {
        return Decision::deny("only the owner can manage collaborators");
    }
    if snapshot.collaborators.len() >= MAX_COLLABORATORS {
        return Decision::deny("collaborator limit reached");
    }
    Decision::ALLOW
}

/// Only the owner may archive.
pub fn can_archive(snapshot: &IdeaSnapshot, principal: Option<&str>) -> Decision {
    match role_of(snapshot, principal) {
        Role::Owner => Decision::ALLOW,
        _ => Decision::deny("only the owner can archive an idea"),
    }
}

/// Only the owner may delete.
pub fn can_delete(snapshot: &IdeaSnapshot, principal: Option<&str>) -> Decision {
    match role_of(snapshot, principal) {
        Role::Owner => Decision::ALLOW,
        _ => Decision::deny("only the owner can delete an idea"),
    }
}

/// Forking requires an authenticated non-owner and a public idea. Owners
/// duplicate instead of forking.
pub fn can_fork(snapshot: &IdeaSnapshot, principal: Option<&str>) -> Decision {
    let Some(user_id) = principal else {
        return Decision::deny("authentication required to fork");
    };
    if snapshot.idea.visibility != Visibility::Public {
        return Decision::deny("only public ideas can be forked");
    }
    if snapshot.idea.owner_id == user_id {
        return Decision::deny("cannot fork your own idea; duplicate it instead");
    }
    Decision::ALLOW
}
