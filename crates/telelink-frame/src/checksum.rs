//! CRC-16/ARC.
//!
//! Parameters: width 16, reflected polynomial 0xA001 (0x8005 unreflected),
//! initial value 0x0000, no final XOR.

/// Reflected CRC-16/ARC generator polynomial.
pub const CRC16_ARC_POLY: u16 = 0xA001;

/// Incremental CRC-16/ARC state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc16 {
    register: u16,
}

impl Crc16 {
    /// Fresh state with the ARC initial value.
    pub const fn new() -> Self {
        Self { register: 0x0000 }
    }

    /// Feed more bytes into the checksum.
    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.register ^= u16::from(byte);
            for _ in 0..8 {
                let lsb = self.register & 0x0001;
                self.register >>= 1;
                if lsb != 0 {
                    self.register ^= CRC16_ARC_POLY;
                }
            }
        }
    }

    /// Current checksum value.
    pub const fn finish(&self) -> u16 {
        self.register
    }
}

/// Compute the CRC-16/ARC checksum of `bytes`.
pub fn crc16_arc(bytes: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    crc.update(bytes);
    crc.finish()
}
