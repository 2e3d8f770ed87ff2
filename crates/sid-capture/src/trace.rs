//! The capture product: per-frame register snapshots plus write events.

use format_sid::Clock;
use serde::{Deserialize, Serialize};

use crate::tracker::{FilterState, RegisterWrite, VoiceState};

/// One captured frame.
///
/// The snapshot fields describe the register state at the end of the frame;
/// `writes` holds every window write made during it, in execution order.
/// Replaying the writes of frames `0..=index` through a fresh tracker
/// reproduces the snapshots exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame index, starting at 0 and gap-free.
    pub index: u32,
    /// End-of-frame state of the three voices.
    pub voices: [VoiceState; 3],
    /// End-of-frame filter and volume state.
    pub filter: FilterState,
    /// Ordered write events of this frame. Empty when the play routine
    /// touched nothing; the snapshot is still recorded.
    pub writes: Vec<RegisterWrite>,
}

/// A complete capture session result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Video standard of the tune.
    pub clock: Clock,
    /// Frame rate implied by the clock, in Hz.
    pub frame_rate_hz: u32,
    /// Frames the session was asked for. Equals `frames.len()` on success;
    /// strictly greater in a partial trace.
    pub requested_frames: u32,
    /// Captured frames in index order.
    pub frames: Vec<Frame>,
}

impl Trace {
    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialization failures.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` parse failures.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
