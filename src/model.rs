use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type AppointmentId = Ulid;
pub type UserId = Ulid;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` when the end falls past the representable range.
    pub fn checked_from_minutes(start: DateTime<Utc>, duration_minutes: u32) -> Option<Self> {
        start
            .checked_add_signed(Duration::minutes(i64::from(duration_minutes)))
            .map(|end| Self { start, end })
    }

    /// Like [`Span::checked_from_minutes`], but clamps the end to `MAX_UTC`.
    pub fn from_minutes(start: DateTime<Utc>, duration_minutes: u32) -> Self {
        Self::checked_from_minutes(start, duration_minutes).unwrap_or(Self {
            start,
            end: DateTime::<Utc>::MAX_UTC,
        })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Scheduled => "Scheduled",
            Status::Completed => "Completed",
            Status::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status {:?}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for Status {
    type Err = UnknownStatus;

    /// Case-insensitive; anything outside the three statuses is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Status::Scheduled),
            "completed" => Ok(Status::Completed),
            "cancelled" | "canceled" => Ok(Status::Cancelled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// How an appointment repeats.
///
/// `Unrecognized` keeps whatever rule text a record was stored with so the
/// expander can decide what to do with it instead of failing the whole read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecurrenceRule {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Unrecognized(String),
}

impl RecurrenceRule {
    /// Parse a stored rule. Empty text means no recurrence. Never fails.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => RecurrenceRule::None,
            "daily" => RecurrenceRule::Daily,
            "weekly" => RecurrenceRule::Weekly,
            "monthly" => RecurrenceRule::Monthly,
            _ => RecurrenceRule::Unrecognized(s.to_string()),
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, RecurrenceRule::None)
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurrenceRule::None => f.write_str("none"),
            RecurrenceRule::Daily => f.write_str("daily"),
            RecurrenceRule::Weekly => f.write_str("weekly"),
            RecurrenceRule::Monthly => f.write_str("monthly"),
            RecurrenceRule::Unrecognized(raw) => f.write_str(raw),
        }
    }
}

/// A persisted (or about to be persisted) booking. Every field is populated;
/// `id` is `None` only before the store assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Option<AppointmentId>,
    pub customer_name: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub notes: String,
    pub recurrence: RecurrenceRule,
    pub status: Status,
    /// Empty means no shared resource: conflict checks don't apply.
    pub resource: String,
    pub customer_id: Option<UserId>,
    pub provider_id: Option<UserId>,
}

impl Appointment {
    pub fn span(&self) -> Span {
        Span::from_minutes(self.start, self.duration_minutes)
    }

    pub fn checked_span(&self) -> Option<Span> {
        Span::checked_from_minutes(self.start, self.duration_minutes)
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.span().end
    }

    /// True if this appointment holds its resource (not cancelled, resource set).
    pub fn occupies_resource(&self) -> bool {
        !self.resource.is_empty() && self.status != Status::Cancelled
    }

    /// Same non-empty resource, both active, intervals intersect.
    pub fn conflicts_with(&self, other: &Appointment) -> bool {
        self.occupies_resource()
            && other.occupies_resource()
            && self.resource == other.resource
            && self.span().overlaps(&other.span())
    }
}

/// Caller-supplied payload for create and update. Optional fields are
/// backfilled during normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentDraft {
    pub customer_name: String,
    pub start: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub notes: String,
    pub recurrence: Option<RecurrenceRule>,
    pub status: Option<Status>,
    pub resource: String,
    pub customer_id: Option<UserId>,
    pub provider_id: Option<UserId>,
}

/// A computed, never-persisted future instance of a recurring appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedOccurrence {
    pub anchor_id: Option<AppointmentId>,
    pub customer_name: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub notes: String,
    pub recurrence: RecurrenceRule,
    pub resource: String,
    pub customer_id: Option<UserId>,
    pub provider_id: Option<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Customer,
    Provider,
    /// Any role string we don't know. Denied everything.
    Unrecognized,
}

impl Role {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "customer" => Role::Customer,
            "provider" => Role::Provider,
            _ => Role::Unrecognized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Opaque credential. Never inspected here.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
}

impl User {
    pub fn new(role: Role) -> Self {
        let id = Ulid::new();
        Self {
            id,
            username: format!("user-{id}"),
            email: format!("{id}@example.invalid"),
            password_hash: String::new(),
            role,
        }
    }
}

/// Broadcast to observers and used as the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AppointmentCreated { appointment: Appointment },
    AppointmentUpdated { appointment: Appointment },
    StatusChanged { id: AppointmentId, status: Status },
    AppointmentDeleted { id: AppointmentId },
}

// ── List queries ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub customer_id: Option<UserId>,
    pub provider_id: Option<UserId>,
    /// Case-insensitive substring match on the customer display name.
    pub customer_name: Option<String>,
    /// Inclusive lower bound on start.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on start.
    pub end: Option<DateTime<Utc>>,
    pub status: Option<Status>,
}

impl ListFilter {
    pub fn matches(&self, a: &Appointment) -> bool {
        if self.customer_id.is_some_and(|id| a.customer_id != Some(id)) {
            return false;
        }
        if self.provider_id.is_some_and(|id| a.provider_id != Some(id)) {
            return false;
        }
        if let Some(ref needle) = self.customer_name
            && !a
                .customer_name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        {
            return false;
        }
        if self.start.is_some_and(|s| a.start < s) {
            return false;
        }
        if self.end.is_some_and(|e| a.start > e) {
            return false;
        }
        if self.status.is_some_and(|s| a.status != s) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    StartAsc,
    StartDesc,
    CustomerNameAsc,
    CustomerNameDesc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" | "start asc" | "time" | "time asc" => Some(SortOrder::StartAsc),
            "start desc" | "time desc" => Some(SortOrder::StartDesc),
            "customer_name" | "customer_name asc" => Some(SortOrder::CustomerNameAsc),
            "customer_name desc" => Some(SortOrder::CustomerNameDesc),
            _ => None,
        }
    }

    pub fn sort(self, appointments: &mut [Appointment]) {
        match self {
            SortOrder::StartAsc => appointments.sort_by_key(|a| a.start),
            SortOrder::StartDesc => appointments.sort_by(|a, b| b.start.cmp(&a.start)),
            SortOrder::CustomerNameAsc => {
                appointments.sort_by(|a, b| a.customer_name.cmp(&b.customer_name))
            }
            SortOrder::CustomerNameDesc => {
                appointments.sort_by(|a, b| b.customer_name.cmp(&a.customer_name))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: usize,
    pub offset: usize,
    pub filter: ListFilter,
    pub sort: Option<SortOrder>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: crate::limits::DEFAULT_LIST_LIMIT,
            offset: 0,
            filter: ListFilter::default(),
            sort: None,
        }
    }
}
