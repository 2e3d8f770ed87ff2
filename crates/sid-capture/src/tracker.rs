//! SID register write tracking.
//!
//! The tracker sits on the bus write path and mirrors the SID's 25 write
//! registers ($D400–$D418, mirrored through $D7FF). It stores raw bytes
//! exactly as written; multi-byte fields like frequency and pulse width are
//! combined only when a snapshot is taken, so a half-updated 16-bit value is
//! never observable from outside a frame.

use serde::{Deserialize, Serialize};

/// Base of the SID register window.
pub const SID_BASE: u16 = 0xD400;
/// Last address of the mirrored window.
pub const SID_END: u16 = 0xD7FF;
/// Number of write registers. $19–$1C are read-only, writes there do nothing.
pub const WRITE_REGS: usize = 0x19;

/// Registers per voice: freq lo/hi, pulse lo/hi, control, AD, SR.
const VOICE_REGS: u8 = 7;

/// One write into the SID register window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWrite {
    /// Frame the write happened in.
    pub frame: u32,
    /// Register index, 0x00–0x18.
    pub reg: u8,
    /// Byte written.
    pub value: u8,
}

/// Snapshot of one voice at a frame boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceState {
    /// 16-bit oscillator frequency.
    pub frequency: u16,
    /// 12-bit pulse width.
    pub pulse_width: u16,
    /// Raw control register.
    pub control: u8,
    /// Waveform selection bits (control bits 4–7).
    pub waveform: u8,
    /// Gate bit (control bit 0).
    pub gate: bool,
    /// Attack nibble.
    pub attack: u8,
    /// Decay nibble.
    pub decay: u8,
    /// Sustain nibble.
    pub sustain: u8,
    /// Release nibble.
    pub release: u8,
    /// Last frame any of this voice's registers was written, if ever.
    pub last_write_frame: Option<u32>,
}

/// Snapshot of the shared filter and volume registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    /// 11-bit filter cutoff.
    pub cutoff: u16,
    /// Resonance (high nibble) and voice routing (low nibble), $D417.
    pub resonance_routing: u8,
    /// Filter mode (high nibble) and master volume (low nibble), $D418.
    pub mode_volume: u8,
}

/// Mirror of the SID's write registers plus the per-frame event log.
#[derive(Debug, Clone, Default)]
pub struct SidRegisters {
    regs: [u8; WRITE_REGS],
    voice_last_write: [Option<u32>; 3],
    frame: u32,
    pending: Vec<RegisterWrite>,
}

impl SidRegisters {
    /// A tracker in power-on state: all registers zero, frame 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a bus address to a register index, if the write is one the
    /// chip would latch.
    fn decode(address: u16) -> Option<u8> {
        if !(SID_BASE..=SID_END).contains(&address) {
            return None;
        }
        let reg = (address & 0x1F) as u8;
        (usize::from(reg) < WRITE_REGS).then_some(reg)
    }

    /// Offer a bus write to the tracker. Writes outside the window and
    /// writes to read-only registers are ignored.
    pub fn on_write(&mut self, address: u16, value: u8) {
        let Some(reg) = Self::decode(address) else {
            return;
        };
        self.regs[usize::from(reg)] = value;
        if reg < VOICE_REGS * 3 {
            self.voice_last_write[usize::from(reg / VOICE_REGS)] = Some(self.frame);
        }
        self.pending.push(RegisterWrite {
            frame: self.frame,
            reg,
            value,
        });
    }

    /// Current frame index.
    #[must_use]
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Snapshot voice 0, 1 or 2, resolving the 16-bit fields from the raw
    /// byte mirror.
    ///
    /// # Panics
    ///
    /// Panics if `voice > 2`.
    #[must_use]
    pub fn voice_state(&self, voice: usize) -> VoiceState {
        assert!(voice < 3, "SID has voices 0-2");
        let base = voice * usize::from(VOICE_REGS);
        let r = &self.regs[base..base + usize::from(VOICE_REGS)];

        let control = r[4];
        VoiceState {
            frequency: u16::from_le_bytes([r[0], r[1]]),
            pulse_width: u16::from_le_bytes([r[2], r[3] & 0x0F]),
            control,
            waveform: control >> 4,
            gate: control & 0x01 != 0,
            attack: r[5] >> 4,
            decay: r[5] & 0x0F,
            sustain: r[6] >> 4,
            release: r[6] & 0x0F,
            last_write_frame: self.voice_last_write[voice],
        }
    }

    /// Snapshot the filter and volume registers.
    #[must_use]
    pub fn filter_state(&self) -> FilterState {
        FilterState {
            // Cutoff lo contributes only its bottom 3 bits
            cutoff: (u16::from(self.regs[0x16]) << 3) | u16::from(self.regs[0x15] & 0x07),
            resonance_routing: self.regs[0x17],
            mode_volume: self.regs[0x18],
        }
    }

    /// Close the current frame: drain its write events and advance the
    /// frame counter. Register state carries over to the next frame.
    pub fn end_frame(&mut self) -> Vec<RegisterWrite> {
        self.frame += 1;
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored_addresses_decode_to_same_register() {
        let mut t = SidRegisters::new();
        t.on_write(0xD400, 0x11);
        t.on_write(0xD5E1, 0x22); // $D5E1 & $1F == $01
        let v = t.voice_state(0);
        assert_eq!(v.frequency, 0x2211);
    }

    #[test]
    fn read_only_and_outside_writes_are_ignored() {
        let mut t = SidRegisters::new();
        t.on_write(0xD419, 0xFF); // paddle, read-only
        t.on_write(0xD3FF, 0xFF); // below the window
        t.on_write(0xD800, 0xFF); // above the window
        assert!(t.end_frame().is_empty());
    }

    #[test]
    fn pulse_width_is_twelve_bits() {
        let mut t = SidRegisters::new();
        t.on_write(0xD402, 0xFF);
        t.on_write(0xD403, 0xFF); // high nibble must be masked off
        assert_eq!(t.voice_state(0).pulse_width, 0x0FFF);
    }

    #[test]
    fn filter_cutoff_is_eleven_bits() {
        let mut t = SidRegisters::new();
        t.on_write(0xD415, 0xFF); // only bits 0-2 land
        t.on_write(0xD416, 0xFF);
        assert_eq!(t.filter_state().cutoff, 0x07FF);
    }

    #[test]
    fn gate_and_waveform_come_from_control() {
        let mut t = SidRegisters::new();
        t.on_write(0xD40B, 0x41); // voice 1: pulse + gate
        let v = t.voice_state(1);
        assert!(v.gate);
        assert_eq!(v.waveform, 0x4);
        assert_eq!(v.control, 0x41);
    }

    #[test]
    fn unwritten_half_reads_as_zero() {
        let mut t = SidRegisters::new();
        t.on_write(0xD401, 0x10); // hi only
        assert_eq!(t.voice_state(0).frequency, 0x1000);
    }

    #[test]
    fn last_write_frame_tracks_per_voice() {
        let mut t = SidRegisters::new();
        t.on_write(0xD400, 0x01);
        t.end_frame();
        t.on_write(0xD407, 0x02); // voice 1, frame 1
        assert_eq!(t.voice_state(0).last_write_frame, Some(0));
        assert_eq!(t.voice_state(1).last_write_frame, Some(1));
        assert_eq!(t.voice_state(2).last_write_frame, None);
    }

    #[test]
    fn end_frame_drains_events_in_order() {
        let mut t = SidRegisters::new();
        t.on_write(0xD404, 0x21);
        t.on_write(0xD404, 0x20);
        let events = t.end_frame();
        assert_eq!(
            events,
            vec![
                RegisterWrite { frame: 0, reg: 0x04, value: 0x21 },
                RegisterWrite { frame: 0, reg: 0x04, value: 0x20 },
            ]
        );
        assert!(t.end_frame().is_empty());
        assert_eq!(t.frame(), 2);
    }
}
