//! Role-based access policy for appointments.
//!
//! Every decision is a lookup in [`grant`], a `(Role, Action) -> Grant` table,
//! followed by one ownership predicate ([`Grant::allows`]). Ownership is read
//! from the record the action targets: the proposed record for `Create`, the
//! stored record for everything else.

use crate::engine::EngineError;
use crate::model::{Appointment, AppointmentDraft, ListFilter, Role, User, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    ReadList,
    Read,
    Update,
    Delete,
    Complete,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Create,
        Action::ReadList,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::ReadList => "read_list",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Complete => "complete",
        }
    }
}

/// What a role needs to hold on a record for an action to go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Always,
    /// Caller must be the record's customer.
    OwnsAsCustomer,
    /// Caller must be the record's provider.
    OwnsAsProvider,
    Never,
}

impl Grant {
    pub fn allows(self, caller: UserId, owner: Ownership) -> bool {
        match self {
            Grant::Always => true,
            Grant::OwnsAsCustomer => owner.customer_id == Some(caller),
            Grant::OwnsAsProvider => owner.provider_id == Some(caller),
            Grant::Never => false,
        }
    }
}

/// The decision table.
pub const fn grant(role: Role, action: Action) -> Grant {
    match (role, action) {
        (Role::Admin, _) => Grant::Always,
        (Role::Customer, Action::Complete) => Grant::Never,
        (Role::Customer, _) => Grant::OwnsAsCustomer,
        (Role::Provider, _) => Grant::OwnsAsProvider,
        (Role::Unrecognized, _) => Grant::Never,
    }
}

/// Ownership fields of whichever record an action is checked against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub customer_id: Option<UserId>,
    pub provider_id: Option<UserId>,
}

impl From<&Appointment> for Ownership {
    fn from(a: &Appointment) -> Self {
        Self {
            customer_id: a.customer_id,
            provider_id: a.provider_id,
        }
    }
}

impl From<&AppointmentDraft> for Ownership {
    fn from(d: &AppointmentDraft) -> Self {
        Self {
            customer_id: d.customer_id,
            provider_id: d.provider_id,
        }
    }
}

pub fn authorize(user: &User, action: Action, owner: Ownership) -> Result<(), EngineError> {
    if grant(user.role, action).allows(user.id, owner) {
        return Ok(());
    }
    metrics::counter!(crate::observability::AUTHZ_DENIED_TOTAL, "action" => action.as_str())
        .increment(1);
    Err(EngineError::Unauthorized(denial_reason(user.role, action)))
}

fn denial_reason(role: Role, action: Action) -> String {
    match (role, action) {
        (Role::Unrecognized, _) => "unknown role".into(),
        (Role::Customer, Action::Create) => {
            "customers can only create appointments for themselves".into()
        }
        (Role::Provider, Action::Create) => {
            "providers can only create appointments they are assigned to".into()
        }
        (Role::Customer, Action::Complete) => "customers cannot complete appointments".into(),
        (Role::Customer, a) => format!("cannot {} an appointment you do not own", a.as_str()),
        (Role::Provider, a) => {
            format!("cannot {} an appointment you are not assigned to", a.as_str())
        }
        (Role::Admin, a) => format!("{} denied", a.as_str()),
    }
}

/// Customers booking without naming a customer book for themselves.
/// Runs before [`authorize`] on create; other roles are left untouched.
pub fn claim_ownership(user: &User, draft: &mut AppointmentDraft) {
    if user.role == Role::Customer && draft.customer_id.is_none() {
        draft.customer_id = Some(user.id);
    }
}

/// Ownership restriction a list query must carry for this caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    All,
    Customer(UserId),
    Provider(UserId),
}

impl ListScope {
    /// Overlay the scope on a caller filter. Injected ownership always wins
    /// over whatever the caller asked for.
    pub fn apply(self, mut filter: ListFilter) -> ListFilter {
        match self {
            ListScope::All => {}
            ListScope::Customer(id) => filter.customer_id = Some(id),
            ListScope::Provider(id) => filter.provider_id = Some(id),
        }
        filter
    }
}

pub fn list_scope(user: &User) -> Result<ListScope, EngineError> {
    match grant(user.role, Action::ReadList) {
        Grant::Always => Ok(ListScope::All),
        Grant::OwnsAsCustomer => Ok(ListScope::Customer(user.id)),
        Grant::OwnsAsProvider => Ok(ListScope::Provider(user.id)),
        Grant::Never => {
            metrics::counter!(crate::observability::AUTHZ_DENIED_TOTAL, "action" => Action::ReadList.as_str())
                .increment(1);
            Err(EngineError::Unauthorized(denial_reason(user.role, Action::ReadList)))
        }
    }
}
