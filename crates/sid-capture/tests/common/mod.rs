//! Shared fixture: hand-assembled PSID files.

use format_sid::SidFile;

/// Build a minimal PSID v2 file (PAL, one song) around a raw payload.
pub fn build_psid(load: u16, init: u16, play: u16, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 0x7C];
    bytes[0..4].copy_from_slice(b"PSID");
    bytes[0x04..0x06].copy_from_slice(&2u16.to_be_bytes());
    bytes[0x06..0x08].copy_from_slice(&0x7Cu16.to_be_bytes());
    bytes[0x08..0x0A].copy_from_slice(&load.to_be_bytes());
    bytes[0x0A..0x0C].copy_from_slice(&init.to_be_bytes());
    bytes[0x0C..0x0E].copy_from_slice(&play.to_be_bytes());
    bytes[0x0E..0x10].copy_from_slice(&1u16.to_be_bytes());
    bytes[0x10..0x12].copy_from_slice(&1u16.to_be_bytes());
    bytes[0x76..0x78].copy_from_slice(&0x0004u16.to_be_bytes()); // PAL
    bytes.extend_from_slice(payload);
    bytes
}

/// Parse a fixture built with [`build_psid`].
pub fn parse_psid(load: u16, init: u16, play: u16, payload: &[u8]) -> SidFile {
    SidFile::parse(&build_psid(load, init, play, payload)).expect("fixture parses")
}
