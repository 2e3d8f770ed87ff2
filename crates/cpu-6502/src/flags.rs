//! 6502 processor status register (P).

/// Carry flag - set if an operation produced a carry/borrow.
pub const C: u8 = 0x01;

/// Zero flag - set if the result is zero.
pub const Z: u8 = 0x02;

/// Interrupt disable - IRQ interrupts are ignored while set.
pub const I: u8 = 0x04;

/// Decimal mode - enables BCD arithmetic for ADC/SBC.
pub const D: u8 = 0x08;

/// Break flag - not a real flag, only appears when status is pushed.
pub const B: u8 = 0x10;

/// Unused bit - always reads as 1.
pub const U: u8 = 0x20;

/// Overflow flag - set if signed arithmetic overflowed.
pub const V: u8 = 0x40;

/// Negative flag - set if the result has bit 7 set.
pub const N: u8 = 0x80;

/// Processor status register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status(pub u8);

impl Status {
    /// Status at reset: unused bit and interrupt disable set.
    #[must_use]
    pub const fn new() -> Self {
        Self(U | I)
    }

    /// Check if a flag is set.
    #[must_use]
    pub const fn is_set(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    /// Set a flag.
    pub const fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    /// Clear a flag.
    pub const fn clear(&mut self, flag: u8) {
        self.0 &= !flag;
    }

    /// Set or clear a flag based on a condition.
    pub const fn set_if(&mut self, flag: u8, condition: bool) {
        if condition {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }

    /// Update N and Z from a result byte.
    pub const fn update_nz(&mut self, value: u8) {
        self.set_if(N, value & 0x80 != 0);
        self.set_if(Z, value == 0);
    }

    /// Value as pushed by BRK/PHP: B and U both set.
    #[must_use]
    pub const fn pushed(self) -> u8 {
        self.0 | U | B
    }

    /// Restore from a byte pulled off the stack: B ignored, U forced on.
    #[must_use]
    pub const fn pulled(value: u8) -> Self {
        Self((value | U) & !B)
    }
}
