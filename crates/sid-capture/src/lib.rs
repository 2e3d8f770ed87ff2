//! Per-frame SID register capture.
//!
//! Runs a SID tune's 6502 driver headlessly — init once, then the play
//! routine once per frame — and records every write that lands in the SID
//! register window. The result is a [`Trace`]: one snapshot of the chip's
//! register state per frame plus the ordered write events that produced it.
//! No audio is synthesized; the trace is the product.
//!
//! ```no_run
//! use format_sid::SidFile;
//! use sid_capture::{capture, CaptureConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("tune.sid")?;
//! let sid = SidFile::parse(&bytes)?;
//! let trace = capture(&sid, &CaptureConfig { frames: 500, ..CaptureConfig::default() })
//!     .map_err(|partial| partial.error)?;
//! println!("{}", trace.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod dump;
mod driver;
mod memory;
mod trace;
mod tracker;

pub use driver::{capture, capture_bytes, CaptureConfig, CaptureError, PartialCapture};
pub use memory::MemoryImage;
pub use trace::{Frame, Trace};
pub use tracker::{FilterState, RegisterWrite, SidRegisters, VoiceState};
