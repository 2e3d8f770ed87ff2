//! Frame-driven capture session.
//!
//! A session owns its memory image, CPU and tracker, so independent captures
//! never share state and identical inputs produce byte-identical traces.
//!
//! Routines are called with the sentinel-return convention: $FFFF is placed
//! on the stack before jumping in, so the routine's final RTS pops $FFFF and
//! the incremented PC wraps to $0000 — the run-until exit address. Real
//! drivers never execute at $0000, so the condition is unambiguous.

use std::fmt;

use cpu_6502::{Bus, CpuError, Mos6502};
use format_sid::{FormatError, SidFile};

use crate::memory::MemoryImage;
use crate::trace::{Frame, Trace};
use crate::tracker::SidRegisters;

/// PC value a returning routine lands on.
const RETURN_SENTINEL: u16 = 0x0000;

/// Frames of headroom a single play call gets by default. Play routines
/// normally finish well inside one frame period; CIA-driven tunes that
/// stretch over several still fit.
const DEFAULT_PLAY_FRAMES_BUDGET: u64 = 32;

/// Capture session parameters.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Number of play calls (and thus frames) to capture.
    pub frames: u32,
    /// 1-based song to play; 0 selects the file's default song.
    pub song: u16,
    /// Cycle ceiling for the init call. Init routines unpack data and can
    /// legitimately run for many frames, so the ceiling is generous.
    pub init_cycle_limit: u64,
    /// Cycle ceiling for one play call. `None` derives it from the file's
    /// clock as [`DEFAULT_PLAY_FRAMES_BUDGET`] frame periods.
    pub play_cycle_limit: Option<u64>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frames: 50,
            song: 0,
            init_cycle_limit: 10_000_000,
            play_cycle_limit: None,
        }
    }
}

/// Why a capture stopped early.
#[derive(Debug)]
pub enum CaptureError {
    /// The input bytes were not a valid SID file.
    Format(FormatError),
    /// The init routine failed before the first frame.
    Init(CpuError),
    /// A play call exceeded its cycle ceiling.
    FrameTimeout {
        frame: u32,
        pc: u16,
        cycle_limit: u64,
    },
    /// A play call hit a CPU error other than the cycle ceiling.
    Frame { frame: u32, source: CpuError },
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(err) => write!(f, "invalid SID file: {err}"),
            Self::Init(err) => write!(f, "init routine failed: {err}"),
            Self::FrameTimeout {
                frame,
                pc,
                cycle_limit,
            } => write!(
                f,
                "play routine did not return within {cycle_limit} cycles \
                 on frame {frame} (stuck near ${pc:04X})"
            ),
            Self::Frame { frame, source } => {
                write!(f, "play routine failed on frame {frame}: {source}")
            }
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Format(err) => Some(err),
            Self::Init(err) | Self::Frame { source: err, .. } => Some(err),
            Self::FrameTimeout { .. } => None,
        }
    }
}

/// A capture that stopped early: whatever frames completed, plus the cause.
///
/// The trace is never silently truncated — a shorter-than-requested trace
/// only ever arrives wrapped in this error.
#[derive(Debug)]
pub struct PartialCapture {
    /// Frames completed before the failure.
    pub trace: Trace,
    /// What went wrong, annotated with the frame index where applicable.
    pub error: CaptureError,
}

impl fmt::Display for PartialCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} of {} frames captured)",
            self.error,
            self.trace.frames.len(),
            self.trace.requested_frames
        )
    }
}

impl std::error::Error for PartialCapture {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Bus for a capture session: all accesses land in the flat image, and
/// every write is additionally offered to the register tracker.
struct CaptureBus<'a> {
    image: &'a mut MemoryImage,
    tracker: &'a mut SidRegisters,
}

impl Bus for CaptureBus<'_> {
    fn read(&mut self, address: u16) -> u8 {
        self.image.read(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.image.write(address, value);
        self.tracker.on_write(address, value);
    }
}

/// Jump into a routine with the sentinel return address on the stack and
/// run until it comes back.
fn call_routine<B: Bus>(
    cpu: &mut Mos6502,
    bus: &mut B,
    entry: u16,
    a: u8,
    cycle_limit: u64,
) -> Result<u64, CpuError> {
    // Seed the stack with $FFFF so the final RTS lands on the sentinel
    bus.write(0x01FD, 0xFF);
    bus.write(0x01FC, 0xFF);
    cpu.regs.s = 0xFB;
    cpu.regs.a = a;
    cpu.regs.pc = entry;
    cpu.run_until(bus, |regs| regs.pc == RETURN_SENTINEL, cycle_limit)
}

/// Parse and capture in one step.
///
/// # Errors
///
/// Format failures arrive as a [`PartialCapture`] with an empty trace;
/// execution failures as in [`capture`].
pub fn capture_bytes(bytes: &[u8], config: &CaptureConfig) -> Result<Trace, PartialCapture> {
    let sid = SidFile::parse(bytes).map_err(|err| PartialCapture {
        trace: Trace {
            clock: format_sid::Clock::default(),
            frame_rate_hz: format_sid::Clock::default().frame_rate_hz(),
            requested_frames: config.frames,
            frames: Vec::new(),
        },
        error: CaptureError::Format(err),
    })?;
    capture(&sid, config)
}

/// Run a capture session: init once, then `config.frames` play calls, one
/// frame snapshot per call.
///
/// Writes made by the init routine are part of frame 0: they set up the
/// chip state the first play call starts from, and dropping them would make
/// frame 0's snapshot irreproducible from its event list.
///
/// # Errors
///
/// Any failure returns a [`PartialCapture`] carrying the frames completed
/// before the failure and a [`CaptureError`] naming the frame and cause.
pub fn capture(sid: &SidFile, config: &CaptureConfig) -> Result<Trace, PartialCapture> {
    let clock = sid.clock();
    let play_limit = config
        .play_cycle_limit
        .unwrap_or(u64::from(clock.cycles_per_frame()) * DEFAULT_PLAY_FRAMES_BUDGET);
    let song = if config.song == 0 {
        sid.start_song()
    } else {
        config.song
    };

    let mut image = MemoryImage::from_sid_file(sid);
    let mut tracker = SidRegisters::new();
    let mut cpu = Mos6502::new();
    let mut trace = Trace {
        clock,
        frame_rate_hz: clock.frame_rate_hz(),
        requested_frames: config.frames,
        frames: Vec::with_capacity(config.frames as usize),
    };

    let mut bus = CaptureBus {
        image: &mut image,
        tracker: &mut tracker,
    };

    // Init: A selects the song, 0-based
    let song_index = (song.saturating_sub(1) & 0xFF) as u8;
    if let Err(err) = call_routine(
        &mut cpu,
        &mut bus,
        sid.init_address(),
        song_index,
        config.init_cycle_limit,
    ) {
        return Err(PartialCapture {
            trace,
            error: CaptureError::Init(err),
        });
    }

    for frame in 0..config.frames {
        let a = cpu.regs.a;
        let result = call_routine(&mut cpu, &mut bus, sid.play_address(), a, play_limit);
        if let Err(err) = result {
            let error = match err {
                CpuError::InfiniteLoop { pc, cycle_limit } => CaptureError::FrameTimeout {
                    frame,
                    pc,
                    cycle_limit,
                },
                source @ CpuError::UnsupportedOpcode { .. } => {
                    CaptureError::Frame { frame, source }
                }
            };
            return Err(PartialCapture { trace, error });
        }

        let voices = [
            bus.tracker.voice_state(0),
            bus.tracker.voice_state(1),
            bus.tracker.voice_state(2),
        ];
        let filter = bus.tracker.filter_state();
        let writes = bus.tracker.end_frame();
        trace.frames.push(Frame {
            index: frame,
            voices,
            filter,
            writes,
        });
    }

    Ok(trace)
}
