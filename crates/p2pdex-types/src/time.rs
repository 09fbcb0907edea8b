//! Wall-clock points and durations.
//!
//! A [`Timestamp`] is milliseconds since the UNIX epoch; a [`Timeout`] is a
//! duration in milliseconds. Both travel on the wire as integers. Expiry is a
//! deadline comparison evaluated by whoever reads the state, never a blocking
//! wait: something created at `t` with timeout `d` is expired once
//! `now >= t + d`.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DexError, Result};

/// A point in wall-clock time, in milliseconds since the UNIX epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Build a timestamp from its wire form.
    pub fn from_wire(ms: i64) -> Result<Self> {
        u64::try_from(ms)
            .map(Self)
            .map_err(|_| DexError::InvalidValue {
                field: "timestamp",
                reason: format!("negative value {ms}"),
            })
    }

    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0))
    }

    #[must_use]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// The integer carried on the wire.
    #[must_use]
    pub fn wire(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    /// `self + timeout`, saturating at the end of time.
    #[must_use]
    pub fn plus(self, timeout: Timeout) -> Self {
        Self(self.0.saturating_add(timeout.as_millis()))
    }

    /// Advance by a plain duration (handy for clocks and tests).
    #[must_use]
    pub fn after(self, duration: Duration) -> Self {
        Self(
            self.0
                .saturating_add(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match i64::try_from(self.0)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
        {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// How long something stays valid after its creation timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Timeout(u64);

impl Timeout {
    /// Expires the moment it is created.
    pub const IMMEDIATE: Self = Self(0);

    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Build a timeout from its wire form.
    pub fn from_wire(ms: i64) -> Result<Self> {
        u64::try_from(ms)
            .map(Self)
            .map_err(|_| DexError::InvalidValue {
                field: "timeout",
                reason: format!("negative value {ms}"),
            })
    }

    #[must_use]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// The integer carried on the wire.
    #[must_use]
    pub fn wire(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    /// Returns `true` once `now >= created_at + self`.
    #[must_use]
    pub fn is_timed_out(self, created_at: Timestamp, now: Timestamp) -> bool {
        now >= created_at.plus(self)
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
