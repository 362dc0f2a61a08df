//! Shared constants for the runtime

use std::time::Duration;

/// Query cache entries live this long after insertion (no sliding expiry)
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on waiting for a local table to become ready
pub const LOCAL_TABLE_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Smallest non-zero auto-refresh interval the validator accepts
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 5;

/// Largest page a data table may request
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Default words used to pick a display column for foreign keys
pub const DEFAULT_DISPLAY_HINTS: &[&str] = &["name", "title", "label", "description", "code"];
