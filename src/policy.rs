use crate::{error::ApiError, models::Role};

/// Policy Module
///
/// The explicit authorization layer. Every handler consults this table before
/// touching the repository, replacing the database-evaluated row policies a
/// hosted backend would provide.
///
/// Two layers of enforcement cooperate:
/// 1. Role-level gates live here and surface denials as 403.
/// 2. Row-level scoping (ownership) is compiled into the repository's WHERE
///    clauses, so a row the caller may not touch is indistinguishable from an
///    absent row (404) and existence is never leaked.
///
/// The role set consulted here is loaded once by the `AuthUser` extractor via a
/// plain repository query. `permits` is pure over that preloaded set, so a role
/// check can never re-enter the authorization layer.

/// The operation being attempted on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

/// The named collections the policy table covers. `FileObjects` stands for the
/// storage bucket; the rest map one-to-one onto database tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Profiles,
    RoleAssignments,
    Categories,
    Resources,
    ViewEvents,
    FileObjects,
}

/// The requesting principal as the policy table sees it. `owns_row` answers
/// "does the row under evaluation belong to this principal" for the operations
/// where ownership matters (self-insert, own-profile update, own view events).
#[derive(Debug, Clone, Copy)]
pub enum Actor<'a> {
    Anonymous,
    Authenticated { roles: &'a [Role], owns_row: bool },
}

fn is_staff(roles: &[Role]) -> bool {
    roles.contains(&Role::Teacher) || roles.contains(&Role::Admin)
}

fn is_admin(roles: &[Role]) -> bool {
    roles.contains(&Role::Admin)
}

/// The access-control table. Evaluated independently per collection; returns
/// plain allow/deny with no side effects.
pub fn permits(actor: Actor<'_>, action: Action, collection: Collection) -> bool {
    // Public object reads are the single anonymous grant.
    if let Actor::Anonymous = actor {
        return collection == Collection::FileObjects && action == Action::Read;
    }

    let Actor::Authenticated { roles, owns_row } = actor else {
        return false;
    };

    match collection {
        Collection::Profiles => match action {
            Action::Read => true,
            // Self-insert at first sign-in, self-update thereafter. No deletes.
            Action::Create | Action::Update => owns_row,
            Action::Delete => false,
        },
        Collection::RoleAssignments => match action {
            Action::Read => owns_row || is_admin(roles),
            Action::Create | Action::Update | Action::Delete => is_admin(roles),
        },
        Collection::Categories => match action {
            Action::Read => true,
            Action::Create | Action::Update | Action::Delete => is_staff(roles),
        },
        Collection::Resources => match action {
            Action::Read => true,
            Action::Create => is_staff(roles),
            Action::Update | Action::Delete => owns_row || is_admin(roles),
        },
        Collection::ViewEvents => match action {
            // Aggregate reads power the analytics screens.
            Action::Read => is_staff(roles),
            // A principal may only log a view as itself.
            Action::Create => owns_row,
            // The log is append-only.
            Action::Update | Action::Delete => false,
        },
        Collection::FileObjects => match action {
            Action::Read => true,
            Action::Create => is_staff(roles),
            // Intentionally broad, mirroring the bucket policy being replaced.
            Action::Update | Action::Delete => true,
        },
    }
}

/// Guard form of `permits` for handler use: anonymous denials become 401,
/// authenticated denials 403.
pub fn require(actor: Actor<'_>, action: Action, collection: Collection) -> Result<(), ApiError> {
    if permits(actor, action, collection) {
        return Ok(());
    }
    match actor {
        Actor::Anonymous => Err(ApiError::AuthenticationRequired),
        Actor::Authenticated { .. } => Err(ApiError::Forbidden),
    }
}
