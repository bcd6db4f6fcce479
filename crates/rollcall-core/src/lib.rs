//! rollcall-core: Recognition-to-attendance decision logic.
//!
//! Resolves oracle encodings against a session gallery, turns resolved
//! identities into deduplicated attendance marks, and decides which
//! indicator signal each evaluated face produces. No I/O lives here;
//! storage, capture and the serial link plug in through traits.

pub mod clock;
pub mod evaluator;
pub mod ledger;
pub mod signal;
pub mod types;

pub use clock::{format_timestamp, parse_timestamp, start_of_day, Clock, SystemClock, TIMESTAMP_FORMAT};
pub use evaluator::{
    DetectedFace, Evaluator, FaceOracle, OracleError, Resolution, DEFAULT_TOLERANCE, UNKNOWN_LABEL,
};
pub use ledger::{AttendanceLog, CooldownCache, Ledger, MarkOutcome, DEFAULT_COOLDOWN_SECS};
pub use signal::{Signal, SignalEmitter, SignalLink};
pub use types::{
    BoundingBox, Encoding, EuclideanMatcher, Gallery, GalleryEntry, Identity, MatchResult, Matcher,
};
