//! Access-controlled operation facade.
//!
//! `IdeaService` is what the HTTP layer talks to. Each method takes the
//! request's principal (`Some(user_id)` from the identity provider, `None`
//! for anonymous), loads the idea snapshot, asks the permission resolver,
//! and only then invokes the lifecycle operation. Entity ids arriving from
//! outside are format-checked before any lookup.
//!
//! Two denial outcomes are kept distinct so the HTTP layer can map them
//! mechanically: [`Error::Unauthenticated`] when the operation needs a
//! principal and none was supplied, and [`Error::PermissionDenied`] (with
//! the resolver's reason) when a present principal lacks the right.
//! Lifecycle errors pass through unchanged.

use crate::lifecycle;
use crate::models::{
    Collaborator, CollaboratorRole, ForkOverrides, Idea, IdeaPatch, IdeaSnapshot, NewIdea, NewUser,
    Notification, User, Workspace,
};
use crate::permissions::{self, Decision, Role};
use crate::storage::{validate_id, Storage};
use crate::{Error, Result};

/// The facade over the permission resolver and lifecycle orchestrator.
pub struct IdeaService {
    storage: Storage,
}

impl IdeaService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Direct store access, for callers that only read.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // === Users ===

    /// Register a new account. Registration is open; no principal needed.
    pub fn register_user(&mut self, fields: NewUser) -> Result<User> {
        lifecycle::create_user(&mut self.storage, fields)
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        validate_id(id, "usr")?;
        self.storage.get_user(id)
    }

    /// Set the principal's follow state toward another user.
    pub fn set_follow(
        &mut self,
        principal: Option<&str>,
        following_id: &str,
        want: bool,
    ) -> Result<bool> {
        let follower = require_principal(principal)?;
        validate_id(following_id, "usr")?;
        lifecycle::set_follow(&mut self.storage, follower, following_id, want)
    }

    /// Notifications are private to their recipient.
    pub fn notifications(&self, principal: Option<&str>) -> Result<Vec<Notification>> {
        let user_id = require_principal(principal)?;
        self.storage.notifications_for(user_id)
    }

    // === Ideas ===

    /// Create an idea (and its workspace) owned by the principal.
    pub fn create_idea(
        &mut self,
        principal: Option<&str>,
        fields: NewIdea,
    ) -> Result<(Idea, Workspace)> {
        let owner = require_principal(principal)?;
        lifecycle::create_idea_with_workspace(&mut self.storage, owner, fields)
    }

    /// Fetch an idea, subject to `can_view`.
    pub fn get_idea(&self, principal: Option<&str>, idea_id: &str) -> Result<Idea> {
        let snapshot = self.snapshot(idea_id)?;
        check(permissions::can_view(&snapshot, principal))?;
        Ok(snapshot.idea)
    }

    /// Fetch an idea's workspace, subject to `can_view`.
    pub fn get_workspace(&self, principal: Option<&str>, idea_id: &str) -> Result<Workspace> {
        let snapshot = self.snapshot(idea_id)?;
        check(permissions::can_view(&snapshot, principal))?;
        self.storage.get_workspace_for_idea(idea_id)
    }

    /// The principal's effective role for an idea (viewable or not).
    pub fn role_of(&self, principal: Option<&str>, idea_id: &str) -> Result<Role> {
        let snapshot = self.snapshot(idea_id)?;
        Ok(permissions::role_of(&snapshot, principal))
    }

    /// Owner-only idea field updates.
    pub fn update_idea(
        &mut self,
        principal: Option<&str>,
        idea_id: &str,
        patch: IdeaPatch,
    ) -> Result<Idea> {
        let snapshot = self.load_for(principal, idea_id)?;
        require_owner(&snapshot, principal, "only the owner can update idea fields")?;
        lifecycle::update_idea(&mut self.storage, idea_id, patch)
    }

    /// Wholesale workspace content write, subject to `can_edit`.
    pub fn update_workspace_content(
        &mut self,
        principal: Option<&str>,
        idea_id: &str,
        content: String,
    ) -> Result<Workspace> {
        let snapshot = self.load_for(principal, idea_id)?;
        check(permissions::can_edit(&snapshot, principal))?;
        lifecycle::update_workspace_content(&mut self.storage, idea_id, content)
    }

    /// Fork a public idea, subject to `can_fork`.
    pub fn fork_idea(
        &mut self,
        principal: Option<&str>,
        idea_id: &str,
        overrides: ForkOverrides,
    ) -> Result<(Idea, Workspace)> {
        let requester = require_principal(principal)?;
        let snapshot = self.snapshot(idea_id)?;
        check(permissions::can_fork(&snapshot, principal))?;
        lifecycle::fork_idea(&mut self.storage, idea_id, requester, overrides)
    }

    /// Duplicate one's own idea (the fork-your-own replacement).
    pub fn duplicate_idea(
        &mut self,
        principal: Option<&str>,
        idea_id: &str,
    ) -> Result<(Idea, Workspace)> {
        let owner = require_principal(principal)?;
        let snapshot = self.snapshot(idea_id)?;
        require_owner(&snapshot, principal, "only the owner can duplicate an idea")?;
        lifecycle::duplicate_idea(&mut self.storage, idea_id, owner)
    }

    /// Set the principal's star state for an idea. Starring requires the
    /// idea to be viewable by the principal.
    pub fn set_star(
        &mut self,
        principal: Option<&str>,
        idea_id: &str,
        want: bool,
    ) -> Result<bool> {
        let user_id = require_principal(principal)?;
        let snapshot = self.snapshot(idea_id)?;
        check(permissions::can_view(&snapshot, principal))?;
        lifecycle::set_star(&mut self.storage, idea_id, user_id, want)
    }

    /// Archive an idea and its workspace, subject to `can_archive`.
    pub fn archive_idea(&mut self, principal: Option<&str>, idea_id: &str) -> Result<Idea> {
        let snapshot = self.load_for(principal, idea_id)?;
        check(permissions::can_archive(&snapshot, principal))?;
        lifecycle::archive_idea(&mut self.storage, idea_id)
    }

    /// Delete an idea with its cascade, subject to `can_delete`.
    pub fn delete_idea(&mut self, principal: Option<&str>, idea_id: &str) -> Result<()> {
        let snapshot = self.load_for(principal, idea_id)?;
        check(permissions::can_delete(&snapshot, principal))?;
        lifecycle::delete_idea(&mut self.storage, idea_id)
    }

    // === Collaborators ===

    /// Add a collaborator, subject to `can_invite`.
    pub fn add_collaborator(
        &mut self,
        principal: Option<&str>,
        idea_id: &str,
        target_user_id: &str,
        role: CollaboratorRole,
    ) -> Result<Collaborator> {
        let snapshot = self.load_for(principal, idea_id)?;
        validate_id(target_user_id, "usr")?;
        check(permissions::can_invite(&snapshot, principal))?;
        lifecycle::add_collaborator(&mut self.storage, idea_id, target_user_id, role)
    }

    /// Remove a collaborator; owner-only, with no cap consideration.
    pub fn remove_collaborator(
        &mut self,
        principal: Option<&str>,
        idea_id: &str,
        target_user_id: &str,
    ) -> Result<()> {
        let snapshot = self.load_for(principal, idea_id)?;
        validate_id(target_user_id, "usr")?;
        require_owner(&snapshot, principal, "only the owner can manage collaborators")?;
        lifecycle::remove_collaborator(&mut self.storage, idea_id, target_user_id)
    }

    /// Load a snapshot for a mutating operation: these all require a
    /// principal before any permission question applies.
    fn load_for(&self, principal: Option<&str>, idea_id: &str) -> Result<IdeaSnapshot> {
        require_principal(principal)?;
        self.snapshot(idea_id)
    }

    /// Load an idea snapshot, rejecting malformed ids before any lookup.
    fn snapshot(&self, idea_id: &str) -> Result<IdeaSnapshot> {
        validate_id(idea_id, "idea")?;
        self.storage.idea_snapshot(idea_id)
    }
}

/// Anonymous requests never reach an operation that needs an identity.
fn require_principal(principal: Option<&str>) -> Result<&str> {
    principal.ok_or(Error::Unauthenticated)
}

/// Turn a denial into the error the HTTP layer maps to 403.
fn check(decision: Decision) -> Result<()> {
    if decision.is_allowed() {
        Ok(())
    } else {
        Err(Error::PermissionDenied(decision.reason().to_string()))
    }
}

/// Ownership gate for operations with no dedicated predicate.
fn require_owner(snapshot: &IdeaSnapshot, principal: Option<&str>, reason: &str) -> Result<()> {
    if permissions::role_of(snapshot, principal) == Role::Owner {
        Ok(())
    } else {
        Err(Error::PermissionDenied(reason.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visibility;
    use crate::test_utils::{sample_idea, sample_user};

    fn setup() -> (IdeaService, String, String) {
        let mut service = IdeaService::new(Storage::open_in_memory().unwrap());
        let alice = service.register_user(sample_user("alice")).unwrap().id;
        let bob = service.register_user(sample_user("bob")).unwrap().id;
        (service, alice, bob)
    }

    fn private_idea(service: &mut IdeaService, owner: &str) -> Idea {
        let mut fields = sample_idea("Secret plan");
        fields.visibility = Visibility::Private;
        service.create_idea(Some(owner), fields).unwrap().0
    }

    #[test]
    fn test_anonymous_create_is_unauthenticated() {
        let (mut service, _, _) = setup();
        let result = service.create_idea(None, sample_idea("Nope"));
        assert!(matches!(result, Err(Error::Unauthenticated)));
    }

    #[test]
    fn test_forbidden_is_distinct_from_unauthenticated() {
        let (mut service, alice, bob) = setup();
        let idea = private_idea(&mut service, &alice);

        // Anonymous: there is no principal at all.
        assert!(matches!(
            service.delete_idea(None, &idea.id),
            Err(Error::Unauthenticated)
        ));

        // Authenticated but not the owner: forbidden, with a reason.
        match service.delete_idea(Some(bob.as_str()), &idea.id) {
            Err(Error::PermissionDenied(reason)) => {
                assert!(reason.contains("owner"));
            }
            other => panic!("expected PermissionDenied, got {other:?}"),
        }
    }

    #[test]
    fn test_private_idea_view_gating() {
        let (mut service, alice, bob) = setup();
        let idea = private_idea(&mut service, &alice);
        service
            .add_collaborator(Some(alice.as_str()), &idea.id, &bob, CollaboratorRole::Viewer)
            .unwrap();
        let carol = service.register_user(sample_user("carol")).unwrap().id;

        assert!(service.get_idea(Some(alice.as_str()), &idea.id).is_ok());
        assert!(service.get_idea(Some(bob.as_str()), &idea.id).is_ok());
        assert!(matches!(
            service.get_idea(Some(carol.as_str()), &idea.id),
            Err(Error::PermissionDenied(_))
        ));
        assert!(matches!(
            service.get_idea(None, &idea.id),
            Err(Error::PermissionDenied(_))
        ));

        // Viewer can read the workspace but not write it.
        assert!(service.get_workspace(Some(bob.as_str()), &idea.id).is_ok());
        assert!(matches!(
            service.update_workspace_content(Some(bob.as_str()), &idea.id, "x".to_string()),
            Err(Error::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_fork_permission_matrix() {
        let (mut service, alice, bob) = setup();
        let (public_idea, _) = service
            .create_idea(Some(alice.as_str()), sample_idea("Open plan"))
            .unwrap();
        let secret = private_idea(&mut service, &alice);

        // Owner forking own idea is denied.
        assert!(matches!(
            service.fork_idea(Some(alice.as_str()), &public_idea.id, ForkOverrides::default()),
            Err(Error::PermissionDenied(_))
        ));

        // Private ideas cannot be forked by outsiders.
        assert!(matches!(
            service.fork_idea(Some(bob.as_str()), &secret.id, ForkOverrides::default()),
            Err(Error::PermissionDenied(_))
        ));

        // Anonymous forking is an authentication problem.
        assert!(matches!(
            service.fork_idea(None, &public_idea.id, ForkOverrides::default()),
            Err(Error::Unauthenticated)
        ));

        // Any other authenticated user may fork a public idea.
        let (fork, _) = service
            .fork_idea(Some(bob.as_str()), &public_idea.id, ForkOverrides::default())
            .unwrap();
        assert_eq!(fork.forked_from_id.as_deref(), Some(public_idea.id.as_str()));
        assert_eq!(
            service.get_idea(Some(bob.as_str()), &public_idea.id).unwrap().fork_count,
            1
        );
    }

    #[test]
    fn test_owner_duplicates_instead_of_forking() {
        let (mut service, alice, bob) = setup();
        let (idea, _) = service
            .create_idea(Some(alice.as_str()), sample_idea("Open plan"))
            .unwrap();

        let (copy, _) = service.duplicate_idea(Some(alice.as_str()), &idea.id).unwrap();
        assert!(!copy.is_fork);
        assert_eq!(service.get_idea(Some(alice.as_str()), &idea.id).unwrap().fork_count, 0);

        assert!(matches!(
            service.duplicate_idea(Some(bob.as_str()), &idea.id),
            Err(Error::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_collaborator_management_owner_only() {
        let (mut service, alice, bob) = setup();
        let idea = private_idea(&mut service, &alice);
        let carol = service.register_user(sample_user("carol")).unwrap().id;

        assert!(matches!(
            service.add_collaborator(Some(bob.as_str()), &idea.id, &carol, CollaboratorRole::Viewer),
            Err(Error::PermissionDenied(_))
        ));

        service
            .add_collaborator(Some(alice.as_str()), &idea.id, &bob, CollaboratorRole::Editor)
            .unwrap();
        assert!(matches!(
            service.remove_collaborator(Some(bob.as_str()), &idea.id, &bob),
            Err(Error::PermissionDenied(_))
        ));
        service
            .remove_collaborator(Some(alice.as_str()), &idea.id, &bob)
            .unwrap();
    }

    #[test]
    fn test_star_requires_view() {
        let (mut service, alice, bob) = setup();
        let secret = private_idea(&mut service, &alice);
        let (open, _) = service
            .create_idea(Some(alice.as_str()), sample_idea("Open plan"))
            .unwrap();

        assert!(matches!(
            service.set_star(Some(bob.as_str()), &secret.id, true),
            Err(Error::PermissionDenied(_))
        ));
        assert!(matches!(
            service.set_star(None, &open.id, true),
            Err(Error::Unauthenticated)
        ));
        assert!(service.set_star(Some(bob.as_str()), &open.id, true).unwrap());
    }

    #[test]
    fn test_update_idea_owner_only() {
        let (mut service, alice, bob) = setup();
        let idea = private_idea(&mut service, &alice);
        service
            .add_collaborator(Some(alice.as_str()), &idea.id, &bob, CollaboratorRole::Editor)
            .unwrap();

        // Even editor collaborators cannot change idea metadata.
        assert!(matches!(
            service.update_idea(
                Some(bob.as_str()),
                &idea.id,
                IdeaPatch {
                    title: Some("Hijacked".to_string()),
                    ..Default::default()
                }
            ),
            Err(Error::PermissionDenied(_))
        ));

        // But they can write workspace content.
        assert!(service
            .update_workspace_content(Some(bob.as_str()), &idea.id, "edits".to_string())
            .is_ok());
    }

    #[test]
    fn test_notifications_require_principal() {
        let (service, _, _) = setup();
        assert!(matches!(
            service.notifications(None),
            Err(Error::Unauthenticated)
        ));
    }

    #[test]
    fn test_malformed_ids_rejected_before_lookup() {
        let (mut service, alice, _) = setup();

        assert!(matches!(
            service.get_idea(Some(alice.as_str()), "not-an-id"),
            Err(Error::InvalidId(_))
        ));
        assert!(matches!(
            service.get_user("42"),
            Err(Error::InvalidId(_))
        ));
        assert!(matches!(
            service.set_follow(Some(alice.as_str()), "usr-xyz", true),
            Err(Error::InvalidId(_))
        ));
    }

    #[test]
    fn test_missing_idea_surfaces_not_found() {
        let (mut service, alice, _) = setup();
        assert!(matches!(
            service.get_idea(Some(alice.as_str()), "idea-ffffffff"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            service.archive_idea(Some(alice.as_str()), "idea-ffffffff"),
            Err(Error::NotFound(_))
        ));
    }
}
