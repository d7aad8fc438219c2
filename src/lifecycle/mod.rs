//! Transactional lifecycle operations.
//!
//! Every operation here runs as a single transaction against the entity
//! store: it loads what it needs, validates the invariants, writes, and
//! either commits everything or nothing. Denormalized counters (star, fork,
//! follower/following, idea counts) are only ever touched in the same
//! transaction as the join-table row they summarize.
//!
//! Permission checks live in the `service` facade, not here; this layer
//! still enforces the structural invariants (collaborator cap, owner never
//! a collaborator, one workspace per idea) even for misbehaving callers.
//!
//! Notifications are best-effort: they are written after the owning
//! transaction commits, and a failed insert is logged and swallowed rather
//! than undoing the committed operation.

use chrono::Utc;
use tracing::{debug, warn};

use crate::models::{
    Collaborator, CollaboratorRole, Follow, ForkOverrides, Idea, IdeaPatch, IdeaStatus, NewIdea,
    NewUser, Notification, NotificationKind, Star, User, Visibility, Workspace, MAX_COLLABORATORS,
};
use crate::storage::{self, generate_id, Storage};
use crate::{Error, Result};

/// Create a user account.
pub fn create_user(storage: &mut Storage, fields: NewUser) -> Result<User> {
    if fields.username.trim().is_empty() {
        return Err(Error::Validation("username is required".to_string()));
    }
    if fields.email.trim().is_empty() || !fields.email.contains('@') {
        return Err(Error::Validation("a valid email is required".to_string()));
    }

    let user = User::new(generate_id("usr", &fields.username), fields);
    storage.with_transaction(|tx| storage::insert_user(tx, &user))?;

    debug!(user_id = %user.id, username = %user.username, "created user");
    Ok(user)
}

/// Create an idea together with its workspace.
///
/// The two inserts and the owner's idea_count bump share one transaction,
/// so an orphan idea (an idea without a workspace) is never observable.
pub fn create_idea_with_workspace(
    storage: &mut Storage,
    owner_id: &str,
    fields: NewIdea,
) -> Result<(Idea, Workspace)> {
    fields.validate()?;

    let content = fields.content.clone().unwrap_or_default();
    let idea = Idea::new(generate_id("idea", &fields.title), owner_id.to_string(), fields);
    let workspace = new_workspace(&idea, content);

    let result = storage.with_transaction(|tx| {
        // Fails with NotFound for unknown owners before any write.
        storage::get_user(tx, owner_id)?;
        storage::insert_idea(tx, &idea)?;
        storage::insert_workspace(tx, &workspace)?;
        storage::adjust_user_counters(tx, owner_id, 0, 0, 1)?;
        Ok((idea, workspace))
    })?;

    debug!(idea_id = %result.0.id, owner_id, "created idea with workspace");
    Ok(result)
}

/// Fork a public idea owned by someone else.
///
/// Creates an independent idea/workspace pair (content copied wholesale)
/// and increments the source's fork_count in the same transaction. The
/// facade guards this with `can_fork`; this layer only requires that the
/// source and requester exist. The source's owner gets a best-effort
/// notification after commit.
pub fn fork_idea(
    storage: &mut Storage,
    source_idea_id: &str,
    requester_id: &str,
    overrides: ForkOverrides,
) -> Result<(Idea, Workspace)> {
    let (result, source_owner_id, source_title, requester_name) = storage.with_transaction(|tx| {
        let source = storage::get_idea(tx, source_idea_id)?;
        let source_workspace = storage::get_workspace_for_idea(tx, source_idea_id)?;
        let requester = storage::get_user(tx, requester_id)?;

        let now = Utc::now();
        let title = overrides.title.unwrap_or_else(|| source.title.clone());
        let fork = Idea {
            id: generate_id("idea", &title),
            title,
            description: overrides
                .description
                .unwrap_or_else(|| source.description.clone()),
            category: source.category.clone(),
            content: source.content.clone(),
            owner_id: requester_id.to_string(),
            visibility: Visibility::Public,
            status: IdeaStatus::Draft,
            star_count: 0,
            fork_count: 0,
            is_fork: true,
            forked_from_id: Some(source.id.clone()),
            created_at: now,
            updated_at: now,
        };
        let workspace = new_workspace(&fork, source_workspace.content.clone());

        storage::insert_idea(tx, &fork)?;
        storage::insert_workspace(tx, &workspace)?;
        storage::adjust_fork_count(tx, &source.id, 1)?;
        storage::adjust_user_counters(tx, requester_id, 0, 0, 1)?;
        Ok((
            (fork, workspace),
            source.owner_id,
            source.title,
            requester.display_name,
        ))
    })?;

    debug!(
        fork_id = %result.0.id,
        source_idea_id,
        requester_id,
        "forked idea"
    );

    // Best-effort, and only when someone else forked: the facade already
    // denies owner self-forks, but this layer is callable directly.
    if source_owner_id != requester_id {
        notify(
            storage,
            Notification {
                id: generate_id("ntf", source_idea_id),
                recipient_id: source_owner_id,
                kind: NotificationKind::IdeaForked,
                message: format!("{requester_name} forked \"{source_title}\""),
                related_user_id: Some(requester_id.to_string()),
                related_idea_id: Some(source_idea_id.to_string()),
                is_read: false,
                created_at: Utc::now(),
            },
        );
    }

    Ok(result)
}

/// Set the starred state of an idea for a user. Returns the new state.
///
/// Idempotent: requesting a state that already holds is a no-op and leaves
/// the counter untouched. The decrement only happens when a star row was
/// actually deleted, so the counter cannot go negative. A new star from
/// someone other than the owner notifies the owner after commit.
pub fn set_star(storage: &mut Storage, idea_id: &str, user_id: &str, want: bool) -> Result<bool> {
    let starred = storage.with_transaction(|tx| {
        let idea = storage::get_idea(tx, idea_id)?;
        let user = storage::get_user(tx, user_id)?;

        if want {
            if storage::star_exists(tx, user_id, idea_id)? {
                return Ok(None);
            }
            storage::insert_star(
                tx,
                &Star {
                    user_id: user_id.to_string(),
                    idea_id: idea_id.to_string(),
                    created_at: Utc::now(),
                },
            )?;
            storage::adjust_star_count(tx, idea_id, 1)?;
            debug!(idea_id, user_id, "starred idea");
            Ok(Some((idea.owner_id, idea.title, user.display_name)))
        } else {
            let deleted = storage::delete_star(tx, user_id, idea_id)?;
            if deleted > 0 {
                storage::adjust_star_count(tx, idea_id, -1)?;
                debug!(idea_id, user_id, "unstarred idea");
            }
            Ok(None)
        }
    })?;

    // Best-effort, skipped for self-stars.
    if let Some((owner_id, title, starrer_name)) = starred {
        if owner_id != user_id {
            notify(
                storage,
                Notification {
                    id: generate_id("ntf", idea_id),
                    recipient_id: owner_id,
                    kind: NotificationKind::IdeaStarred,
                    message: format!("{starrer_name} starred \"{title}\""),
                    related_user_id: Some(user_id.to_string()),
                    related_idea_id: Some(idea_id.to_string()),
                    is_read: false,
                    created_at: Utc::now(),
                },
            );
        }
    }

    Ok(want)
}

/// Set the follow state between two users. Returns the new state.
///
/// Both users' counters move in the same transaction as the follow row.
/// A new follow enqueues a best-effort notification after commit.
pub fn set_follow(
    storage: &mut Storage,
    follower_id: &str,
    following_id: &str,
    want: bool,
) -> Result<bool> {
    if follower_id == following_id {
        return Err(Error::InvalidOperation(
            "users cannot follow themselves".to_string(),
        ));
    }

    let changed = storage.with_transaction(|tx| {
        let follower = storage::get_user(tx, follower_id)?;
        storage::get_user(tx, following_id)?;

        if want {
            if storage::follow_exists(tx, follower_id, following_id)? {
                return Ok(None);
            }
            storage::insert_follow(
                tx,
                &Follow {
                    follower_id: follower_id.to_string(),
                    following_id: following_id.to_string(),
                    created_at: Utc::now(),
                },
            )?;
            storage::adjust_user_counters(tx, following_id, 1, 0, 0)?;
            storage::adjust_user_counters(tx, follower_id, 0, 1, 0)?;
            debug!(follower_id, following_id, "followed user");
            Ok(Some(follower.display_name))
        } else {
            let deleted = storage::delete_follow(tx, follower_id, following_id)?;
            if deleted > 0 {
                storage::adjust_user_counters(tx, following_id, -1, 0, 0)?;
                storage::adjust_user_counters(tx, follower_id, 0, -1, 0)?;
                debug!(follower_id, following_id, "unfollowed user");
            }
            Ok(None)
        }
    })?;

    // Best-effort: the follow is already committed, a notification failure
    // must not undo it.
    if let Some(follower_name) = changed {
        notify(
            storage,
            Notification {
                id: generate_id("ntf", following_id),
                recipient_id: following_id.to_string(),
                kind: NotificationKind::Followed,
                message: format!("{follower_name} started following you"),
                related_user_id: Some(follower_id.to_string()),
                related_idea_id: None,
                is_read: false,
                created_at: Utc::now(),
            },
        );
    }

    Ok(want)
}

/// Add a collaborator to an idea.
///
/// The collaborator count is re-read inside the transaction, so two
/// concurrent adds cannot both pass the cap check: the IMMEDIATE
/// transaction serializes them and the loser re-evaluates against the
/// committed state. The `(idea_id, user_id)` unique constraint backstops
/// the duplicate check.
pub fn add_collaborator(
    storage: &mut Storage,
    idea_id: &str,
    target_user_id: &str,
    role: CollaboratorRole,
) -> Result<Collaborator> {
    let (collaborator, idea_title) = storage.with_transaction(|tx| {
        let idea = storage::get_idea(tx, idea_id)?;
        storage::get_user(tx, target_user_id)?;

        if idea.owner_id == target_user_id {
            return Err(Error::InvalidOperation(
                "the owner is never recorded as a collaborator".to_string(),
            ));
        }

        let count = storage::collaborator_count(tx, idea_id)?;
        if count >= MAX_COLLABORATORS {
            return Err(Error::LimitExceeded(format!(
                "idea {idea_id} already has {MAX_COLLABORATORS} collaborators"
            )));
        }

        let collaborator = Collaborator {
            id: generate_id("col", target_user_id),
            idea_id: idea_id.to_string(),
            user_id: target_user_id.to_string(),
            role,
            created_at: Utc::now(),
        };
        storage::insert_collaborator(tx, &collaborator)?;
        Ok((collaborator, idea.title))
    })?;

    debug!(idea_id, target_user_id, role = %role, "added collaborator");
    notify(
        storage,
        Notification {
            id: generate_id("ntf", target_user_id),
            recipient_id: target_user_id.to_string(),
            kind: NotificationKind::CollaboratorAdded,
            message: format!("You were added as a {role} on \"{idea_title}\""),
            related_user_id: None,
            related_idea_id: Some(idea_id.to_string()),
            is_read: false,
            created_at: Utc::now(),
        },
    );

    Ok(collaborator)
}

/// Remove a collaborator from an idea.
pub fn remove_collaborator(storage: &mut Storage, idea_id: &str, target_user_id: &str) -> Result<()> {
    storage.with_transaction(|tx| {
        storage::get_idea(tx, idea_id)?;
        let deleted = storage::delete_collaborator(tx, idea_id, target_user_id)?;
        if deleted == 0 {
            return Err(Error::NotFound(format!(
                "user {target_user_id} is not a collaborator on idea {idea_id}"
            )));
        }
        Ok(())
    })?;

    debug!(idea_id, target_user_id, "removed collaborator");
    Ok(())
}

/// Delete an idea. The workspace, collaborator, and star rows cascade in
/// the same transaction; forks survive with their lineage pointer cleared.
/// Deleting a fork gives the source its fork_count slot back, so the
/// counter keeps matching the surviving lineage rows.
pub fn delete_idea(storage: &mut Storage, idea_id: &str) -> Result<()> {
    storage.with_transaction(|tx| {
        let idea = storage::get_idea(tx, idea_id)?;
        storage::delete_idea(tx, idea_id)?;
        storage::adjust_user_counters(tx, &idea.owner_id, 0, 0, -1)?;
        if let Some(source_id) = &idea.forked_from_id {
            storage::adjust_fork_count(tx, source_id, -1)?;
        }
        Ok(())
    })?;

    debug!(idea_id, "deleted idea");
    Ok(())
}

/// Apply owner-edited field updates to an idea.
///
/// When visibility changes, the workspace's is_public flag moves with it in
/// the same transaction.
pub fn update_idea(storage: &mut Storage, idea_id: &str, patch: IdeaPatch) -> Result<Idea> {
    storage.with_transaction(|tx| {
        let mut idea = storage::get_idea(tx, idea_id)?;

        if let Some(title) = patch.title {
            if title.trim().is_empty() {
                return Err(Error::Validation("title cannot be empty".to_string()));
            }
            idea.title = title;
        }
        if let Some(description) = patch.description {
            if description.trim().is_empty() {
                return Err(Error::Validation("description cannot be empty".to_string()));
            }
            idea.description = description;
        }
        if let Some(category) = patch.category {
            if category.trim().is_empty() {
                return Err(Error::Validation("category cannot be empty".to_string()));
            }
            idea.category = category;
        }
        if let Some(content) = patch.content {
            idea.content = Some(content);
        }
        if let Some(status) = patch.status {
            idea.status = status;
        }

        let visibility_changed = match patch.visibility {
            Some(v) if v != idea.visibility => {
                idea.visibility = v;
                true
            }
            _ => false,
        };

        idea.updated_at = Utc::now();
        storage::update_idea(tx, &idea)?;

        if visibility_changed {
            let mut workspace = storage::get_workspace_for_idea(tx, idea_id)?;
            workspace.is_public = idea.visibility == Visibility::Public;
            workspace.updated_at = idea.updated_at;
            storage::update_workspace(tx, &workspace)?;
        }

        Ok(idea)
    })
}

/// Archive an idea and its workspace in one transaction.
pub fn archive_idea(storage: &mut Storage, idea_id: &str) -> Result<Idea> {
    let idea = storage.with_transaction(|tx| {
        let mut idea = storage::get_idea(tx, idea_id)?;
        idea.status = IdeaStatus::Archived;
        idea.updated_at = Utc::now();
        storage::update_idea(tx, &idea)?;

        let mut workspace = storage::get_workspace_for_idea(tx, idea_id)?;
        workspace.archived = true;
        workspace.updated_at = idea.updated_at;
        storage::update_workspace(tx, &workspace)?;

        Ok(idea)
    })?;

    debug!(idea_id, "archived idea");
    Ok(idea)
}

/// Duplicate one's own idea: an independent copy with no fork lineage and
/// no fork_count mutation. This is the sanctioned replacement for "forking
/// your own idea".
pub fn duplicate_idea(
    storage: &mut Storage,
    idea_id: &str,
    owner_id: &str,
) -> Result<(Idea, Workspace)> {
    let result = storage.with_transaction(|tx| {
        let source = storage::get_idea(tx, idea_id)?;
        let source_workspace = storage::get_workspace_for_idea(tx, idea_id)?;

        let now = Utc::now();
        let title = format!("{} (copy)", source.title);
        let copy = Idea {
            id: generate_id("idea", &title),
            title,
            description: source.description.clone(),
            category: source.category.clone(),
            content: source.content.clone(),
            owner_id: owner_id.to_string(),
            visibility: source.visibility,
            status: IdeaStatus::Draft,
            star_count: 0,
            fork_count: 0,
            is_fork: false,
            forked_from_id: None,
            created_at: now,
            updated_at: now,
        };
        let workspace = new_workspace(&copy, source_workspace.content.clone());

        storage::insert_idea(tx, &copy)?;
        storage::insert_workspace(tx, &workspace)?;
        storage::adjust_user_counters(tx, owner_id, 0, 0, 1)?;
        Ok((copy, workspace))
    })?;

    debug!(copy_id = %result.0.id, source_id = idea_id, "duplicated idea");
    Ok(result)
}

/// Replace the workspace content blob wholesale.
pub fn update_workspace_content(
    storage: &mut Storage,
    idea_id: &str,
    content: String,
) -> Result<Workspace> {
    storage.with_transaction(|tx| {
        let mut workspace = storage::get_workspace_for_idea(tx, idea_id)?;
        workspace.content = content;
        workspace.updated_at = Utc::now();
        storage::update_workspace(tx, &workspace)?;
        Ok(workspace)
    })
}

/// Build the workspace row paired with a freshly created idea.
fn new_workspace(idea: &Idea, content: String) -> Workspace {
    Workspace {
        id: generate_id("ws", &idea.id),
        idea_id: idea.id.clone(),
        owner_id: idea.owner_id.clone(),
        content,
        is_public: idea.visibility == Visibility::Public,
        archived: false,
        created_at: idea.created_at,
        updated_at: idea.created_at,
    }
}

/// Insert a notification outside the originating transaction, logging and
/// swallowing failures.
fn notify(storage: &mut Storage, notification: Notification) {
    let result = storage.with_transaction(|tx| storage::insert_notification(tx, &notification));
    if let Err(e) = result {
        warn!(
            recipient = %notification.recipient_id,
            kind = %notification.kind,
            error = %e,
            "failed to record notification"
        );
    }
}
