//! Hard caps on caller-supplied input.

pub const MAX_CUSTOMER_NAME_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 4096;
pub const MAX_RESOURCE_LEN: usize = 256;

/// One week.
pub const MAX_DURATION_MINUTES: u32 = 7 * 24 * 60;

pub const DEFAULT_LIST_LIMIT: usize = 10;
pub const MAX_LIST_LIMIT: usize = 1000;

/// Upper bound on occurrences projected per anchor.
pub const MAX_OCCURRENCE_LIMIT: usize = 1000;

pub const MAX_SUGGESTIONS: usize = 20;
