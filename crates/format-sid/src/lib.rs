//! PSID/RSID music file parser.
//!
//! A SID file is a big-endian header followed by raw C64 program data.
//! v1 headers are 0x76 bytes, v2+ headers 0x7C. A header load address of
//! zero means the real load address is embedded as the first two payload
//! bytes, little-endian, like a PRG file. Parsing only validates and slices;
//! nothing here executes 6502 code.

use std::fmt;

use serde::{Deserialize, Serialize};

/// v1 header size in bytes.
pub const HEADER_SIZE_V1: usize = 0x76;
/// v2+ header size in bytes.
pub const HEADER_SIZE_V2: usize = 0x7C;

#[derive(Debug)]
pub enum FormatError {
    /// Input too small to hold even a v1 header.
    TooShort(usize),
    /// First four bytes are neither `PSID` nor `RSID`.
    BadMagic([u8; 4]),
    /// Header version outside the 1..=4 range.
    UnsupportedVersion(u16),
    /// Header's data offset points past the end of the input.
    TruncatedPayload { offset: usize, len: usize },
    /// Load address of zero but no embedded address bytes to read.
    MissingLoadAddress,
    /// Payload would run past the top of the 64 KB address space.
    AddressOverflow { load: u16, len: usize },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort(len) => {
                write!(f, "file too short: {len} bytes (minimum {HEADER_SIZE_V1})")
            }
            Self::BadMagic(magic) => write!(f, "bad magic {magic:02X?} (expected PSID or RSID)"),
            Self::UnsupportedVersion(version) => write!(f, "unsupported version {version}"),
            Self::TruncatedPayload { offset, len } => {
                write!(f, "data offset {offset:#06X} past end of {len}-byte file")
            }
            Self::MissingLoadAddress => {
                write!(f, "load address 0 but payload too short for embedded address")
            }
            Self::AddressOverflow { load, len } => {
                write!(
                    f,
                    "payload of {len} bytes at ${load:04X} overflows the 64 KB address space"
                )
            }
        }
    }
}

impl std::error::Error for FormatError {}

/// File kind from the magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Magic {
    Psid,
    Rsid,
}

/// Video standard the tune was written for.
///
/// Selects the frame rate and the CPU clock used for frame metadata;
/// instruction timing is unaffected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clock {
    #[default]
    Pal,
    Ntsc,
}

impl Clock {
    /// CPU clock in Hz.
    #[must_use]
    pub const fn cpu_hz(self) -> u32 {
        match self {
            Self::Pal => 985_248,
            Self::Ntsc => 1_022_727,
        }
    }

    /// Frame interrupt rate in Hz.
    #[must_use]
    pub const fn frame_rate_hz(self) -> u32 {
        match self {
            Self::Pal => 50,
            Self::Ntsc => 60,
        }
    }

    /// CPU cycles in one frame period.
    #[must_use]
    pub const fn cycles_per_frame(self) -> u32 {
        self.cpu_hz() / self.frame_rate_hz()
    }
}

/// A parsed SID music file.
#[derive(Debug, Clone)]
pub struct SidFile {
    magic: Magic,
    version: u16,
    load_address: u16,
    init_address: u16,
    play_address: u16,
    songs: u16,
    start_song: u16,
    speed: u32,
    title: String,
    author: String,
    released: String,
    clock: Clock,
    data: Vec<u8>,
}

impl SidFile {
    /// Parse a SID file from raw bytes.
    ///
    /// # Errors
    ///
    /// Fails with [`FormatError`] on a bad magic, unsupported version,
    /// truncated input, or a payload that overflows the 64 KB space.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE_V1 {
            return Err(FormatError::TooShort(bytes.len()));
        }

        let magic = match &bytes[0..4] {
            b"PSID" => Magic::Psid,
            b"RSID" => Magic::Rsid,
            other => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(other);
                return Err(FormatError::BadMagic(raw));
            }
        };

        let version = be16(bytes, 0x04);
        if !(1..=4).contains(&version) {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let data_offset = usize::from(be16(bytes, 0x06));
        if data_offset > bytes.len() {
            return Err(FormatError::TruncatedPayload {
                offset: data_offset,
                len: bytes.len(),
            });
        }

        let header_load = be16(bytes, 0x08);
        let init_address = be16(bytes, 0x0A);
        let play_address = be16(bytes, 0x0C);
        let songs = be16(bytes, 0x0E).max(1);
        let start_song = be16(bytes, 0x10).max(1);
        let speed = be32(bytes, 0x12);
        let title = text_field(bytes, 0x16);
        let author = text_field(bytes, 0x36);
        let released = text_field(bytes, 0x56);

        // v2+ flags word, bits 2-3: 01 PAL, 10 NTSC, 11 both (treated as PAL)
        let clock = if version >= 2 && bytes.len() >= HEADER_SIZE_V2 {
            match (be16(bytes, 0x76) >> 2) & 0x03 {
                0b10 => Clock::Ntsc,
                _ => Clock::Pal,
            }
        } else {
            Clock::Pal
        };

        let mut payload = &bytes[data_offset..];
        let load_address = if header_load == 0 {
            let Some((addr_bytes, rest)) = payload.split_at_checked(2) else {
                return Err(FormatError::MissingLoadAddress);
            };
            payload = rest;
            u16::from_le_bytes([addr_bytes[0], addr_bytes[1]])
        } else {
            header_load
        };

        let end = usize::from(load_address) + payload.len();
        if end > 0x1_0000 {
            return Err(FormatError::AddressOverflow {
                load: load_address,
                len: payload.len(),
            });
        }

        Ok(Self {
            magic,
            version,
            load_address,
            init_address,
            play_address,
            songs,
            start_song,
            speed,
            title,
            author,
            released,
            clock,
            data: payload.to_vec(),
        })
    }

    #[must_use]
    pub fn magic(&self) -> Magic {
        self.magic
    }

    #[must_use]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Address the payload is placed at.
    #[must_use]
    pub fn load_address(&self) -> u16 {
        self.load_address
    }

    /// Init entry point. Zero in the header means the routine starts at
    /// the load address.
    #[must_use]
    pub fn init_address(&self) -> u16 {
        if self.init_address == 0 {
            self.load_address
        } else {
            self.init_address
        }
    }

    /// Play entry point, with the same load-address default as init.
    #[must_use]
    pub fn play_address(&self) -> u16 {
        if self.play_address == 0 {
            self.load_address
        } else {
            self.play_address
        }
    }

    /// Number of songs in the file (at least 1).
    #[must_use]
    pub fn songs(&self) -> u16 {
        self.songs
    }

    /// Default song, 1-based.
    #[must_use]
    pub fn start_song(&self) -> u16 {
        self.start_song
    }

    /// True when the given 1-based song is CIA-timer driven rather than
    /// frame-interrupt driven. Songs past bit 31 share bit 31.
    #[must_use]
    pub fn song_uses_cia_timer(&self, song: u16) -> bool {
        let bit = u32::from(song.saturating_sub(1)).min(31);
        self.speed & (1 << bit) != 0
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    #[must_use]
    pub fn released(&self) -> &str {
        &self.released
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// The raw C64 program payload (without any embedded address bytes).
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

fn be16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn be32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Decode a fixed 32-byte header text field: Latin-1, NUL-padded.
fn text_field(bytes: &[u8], at: usize) -> String {
    bytes[at..at + 32]
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| char::from(b))
        .collect()
}
