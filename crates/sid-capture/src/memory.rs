//! Flat 64 KB memory image.

use format_sid::SidFile;

/// The full 6502 address space as plain RAM.
///
/// No banking, no I/O decode: the capture bus layered on top decides what
/// writes mean. Zero-initialized, which doubles as the chip's power-on
/// register state for halves the driver never touches.
pub struct MemoryImage {
    bytes: Box<[u8; 0x1_0000]>,
}

impl Default for MemoryImage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryImage {
    /// A zeroed 64 KB image.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: Box::new([0u8; 0x1_0000]),
        }
    }

    /// Build an image with the file's payload placed at its load address.
    ///
    /// Placement cannot overflow: [`SidFile::parse`] already rejected
    /// payloads that run past $FFFF.
    #[must_use]
    pub fn from_sid_file(sid: &SidFile) -> Self {
        let mut image = Self::new();
        image.load(sid.load_address(), sid.data());
        image
    }

    /// Copy bytes into the image starting at `at`.
    pub fn load(&mut self, at: u16, bytes: &[u8]) {
        let at = usize::from(at);
        self.bytes[at..at + bytes.len()].copy_from_slice(bytes);
    }

    #[must_use]
    pub fn read(&self, address: u16) -> u8 {
        self.bytes[usize::from(address)]
    }

    pub fn write(&mut self, address: u16, value: u8) {
        self.bytes[usize::from(address)] = value;
    }
}
