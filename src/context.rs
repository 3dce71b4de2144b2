//! Codec configuration threaded through every compression call.

use crate::transform::ModelUpdateFn;

/// Timestamp source returning the current 48-bit mission time.
pub type TimestampFn = fn() -> u64;

/// Configuration constructed once at start-up and passed by reference.
///
/// Replaces process-wide mutable state: the on-board software version
/// identifier recorded in every entity, the mission timestamp source, and
/// the model-update weighting function (see [`ModelUpdateFn`] for its
/// contract).
#[derive(Clone, Copy, Debug)]
pub struct CodecContext {
    /// Software version identifier written into the entity header.
    pub version_id: u16,
    /// Timestamp source for the entity start/end timestamps.
    pub now: TimestampFn,
    /// Model-update weighting function.
    pub model_update: ModelUpdateFn,
}

impl CodecContext {
    /// Create a new context.
    pub fn new(version_id: u16, now: TimestampFn, model_update: ModelUpdateFn) -> Self {
        Self {
            version_id,
            now,
            model_update,
        }
    }
}
