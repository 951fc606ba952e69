// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time handling.
//!
//! Timestamps are carried as Unix epoch milliseconds (`i64`) throughout the
//! crate; only the edges read the wall clock.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format epoch milliseconds as RFC3339 with a `Z` suffix.
///
/// Out-of-range values fall back to the Unix epoch.
pub fn format_ms_rfc3339(ms: i64) -> String {
    let date = DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default();
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ms_rfc3339() {
        assert_eq!(format_ms_rfc3339(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(
            format_ms_rfc3339(1_700_000_000_123),
            "2023-11-14T22:13:20.123Z"
        );
    }
}
