//! Plain-text register dump.
//!
//! One line per captured frame, listing each register the frame changed as
//! `reg=value` hex pairs. A register written several times in one frame
//! appears once with its final value, at the position of its first write.
//! The text is derived from the event lists alone, so a trace and its dump
//! always agree.

use std::fmt;

use crate::trace::Trace;

/// Render the register dump into a `fmt::Write` sink.
///
/// # Errors
///
/// Propagates formatting failures from the sink.
pub fn write_register_dump<W: fmt::Write>(out: &mut W, trace: &Trace) -> fmt::Result {
    for frame in &trace.frames {
        write!(out, "{:5}:", frame.index)?;

        // Final value per register, kept in first-write order
        let mut changed: Vec<(u8, u8)> = Vec::new();
        for event in &frame.writes {
            match changed.iter_mut().find(|(reg, _)| *reg == event.reg) {
                Some((_, value)) => *value = event.value,
                None => changed.push((event.reg, event.value)),
            }
        }

        for (reg, value) in changed {
            write!(out, " {reg:02X}={value:02X}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Render the register dump to a `String`.
#[must_use]
pub fn register_dump(trace: &Trace) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_register_dump(&mut out, trace);
    out
}
