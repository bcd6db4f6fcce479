//! Attendance deduplication: in-memory cooldown cache over a durable log.
//!
//! The durable log is the source of truth for "already marked". The cache
//! only short-circuits the common case inside one session and is rebuilt
//! empty on every session start.

use crate::clock::parse_timestamp;
use chrono::{NaiveDateTime, TimeDelta};
use std::collections::HashMap;

pub const DEFAULT_COOLDOWN_SECS: i64 = 600;

/// Durable attendance history, as seen by the ledger.
pub trait AttendanceLog {
    type Error: std::fmt::Display;

    /// Raw text of the most recent stored timestamp for this identity.
    fn last_mark(&self, identity_id: i64) -> Result<Option<String>, Self::Error>;

    /// Append one attendance record.
    fn record_mark(&self, identity_id: i64, at: NaiveDateTime) -> Result<(), Self::Error>;
}

/// Per-identity instant of the last accepted mark.
#[derive(Debug, Default)]
pub struct CooldownCache {
    last_marked: HashMap<i64, NaiveDateTime>,
}

impl CooldownCache {
    pub fn get(&self, identity_id: i64) -> Option<NaiveDateTime> {
        self.last_marked.get(&identity_id).copied()
    }

    pub fn set(&mut self, identity_id: i64, at: NaiveDateTime) {
        self.last_marked.insert(identity_id, at);
    }

    pub fn clear(&mut self) {
        self.last_marked.clear();
    }

    pub fn len(&self) -> usize {
        self.last_marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_marked.is_empty()
    }
}

/// What the ledger decided for one resolved identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    /// A new record was written.
    Marked,
    /// Suppressed by the in-memory cache.
    CoolingDown,
    /// Suppressed by a recent durable record.
    AlreadyMarked { at: NaiveDateTime },
    /// Suppressed because the stored timestamp could not be parsed.
    AssumedRecent,
    /// The durable layer failed; nothing cached, retried on the next frame.
    Unavailable,
}

impl MarkOutcome {
    pub fn marked(&self) -> bool {
        matches!(self, MarkOutcome::Marked)
    }
}

pub struct Ledger<L> {
    log: L,
    cooldown: TimeDelta,
    cache: CooldownCache,
}

impl<L: AttendanceLog> Ledger<L> {
    pub fn new(log: L, cooldown_secs: i64) -> Self {
        Self {
            log,
            cooldown: TimeDelta::seconds(cooldown_secs),
            cache: CooldownCache::default(),
        }
    }

    pub fn cache(&self) -> &CooldownCache {
        &self.cache
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Forget every cooldown entry.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    fn within_cooldown(&self, last: NaiveDateTime, now: NaiveDateTime) -> bool {
        now - last < self.cooldown
    }

    /// Decide whether `identity_id`, seen at `now`, gets a new attendance record.
    pub fn resolve(&mut self, identity_id: i64, now: NaiveDateTime) -> MarkOutcome {
        if let Some(last) = self.cache.get(identity_id) {
            if self.within_cooldown(last, now) {
                return MarkOutcome::CoolingDown;
            }
        }

        match self.log.last_mark(identity_id) {
            Ok(Some(raw)) => match parse_timestamp(&raw) {
                Some(last) if self.within_cooldown(last, now) => {
                    self.cache.set(identity_id, last);
                    return MarkOutcome::AlreadyMarked { at: last };
                }
                Some(_) => {}
                None => {
                    tracing::warn!(
                        identity_id,
                        stored = %raw,
                        "unparsable attendance timestamp; assuming recent"
                    );
                    self.cache.set(identity_id, now);
                    return MarkOutcome::AssumedRecent;
                }
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(identity_id, error = %err, "durable attendance check failed");
                return MarkOutcome::Unavailable;
            }
        }

        match self.log.record_mark(identity_id, now) {
            Ok(()) => {
                self.cache.set(identity_id, now);
                MarkOutcome::Marked
            }
            Err(err) => {
                tracing::warn!(identity_id, error = %err, "attendance write failed; will retry");
                MarkOutcome::Unavailable
            }
        }
    }
}
