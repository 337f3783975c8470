/*! Dual CRC-16 engines.

The system uses two CRC-16 variants of the CCITT family at different
boundaries, and they must never be substituted for each other:

* Non-reflected (poly 0x1021, init 0xFFFF, MSB-first, no final XOR):
  CSI-2 long-packet line CRC, computed by [`LineCrc`].
* Reflected (poly 0x8408, init 0xFFFF, LSB-first, no final XOR): the
  UDP frame-header CRC documented in the external protocol, computed by
  [`HeaderCrc`].

The wrapper types exist precisely so that a line CRC cannot be handed to a
header check site, or vice versa, without a type error.
*/
use crate::{Error, Result};

/// Which of the two CRC engines a value or a mismatch belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrcKind {
    /// CSI-2 per-line CRC (non-reflected engine).
    Line,
    /// UDP frame-header CRC (reflected engine).
    Header,
}

impl std::fmt::Display for CrcKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrcKind::Line => write!(f, "line"),
            CrcKind::Header => write!(f, "header"),
        }
    }
}

const CCITT_POLY: u16 = 0x1021;
const MCRF4XX_POLY: u16 = 0x8408;

const CCITT_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CCITT_POLY;
            } else {
                crc <<= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

const MCRF4XX_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ MCRF4XX_POLY;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Non-reflected CRC-16/CCITT: poly 0x1021, init 0xFFFF, MSB-first, no
/// final XOR. Check value: `"123456789"` → 0x29B1.
#[must_use]
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    data.iter().fold(0xffffu16, |crc, byte| {
        let ofs = (((crc >> 8) ^ *byte as u16) & 0xff) as usize;
        (crc << 8) ^ CCITT_TABLE[ofs]
    })
}

/// Reflected CRC-16 (MCRF4XX form): poly 0x8408, init 0xFFFF, LSB-first,
/// no final XOR. Check value: `"123456789"` → 0x6F91.
#[must_use]
pub fn crc16_mcrf4xx(data: &[u8]) -> u16 {
    data.iter().fold(0xffffu16, |crc, byte| {
        let ofs = ((crc ^ *byte as u16) & 0xff) as usize;
        (crc >> 8) ^ MCRF4XX_TABLE[ofs]
    })
}

/// CSI-2 line CRC (non-reflected engine).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineCrc(pub u16);

impl LineCrc {
    /// Compute the line CRC over serialized pixel bytes.
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(crc16_ccitt(data))
    }

    /// Wire encoding (little-endian, trailing the payload).
    #[must_use]
    pub fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// Parse the two trailing CRC bytes of a long packet.
    pub fn from_le_bytes(data: &[u8]) -> Result<Self> {
        let b: [u8; 2] = data
            .try_into()
            .map_err(|_| Error::InvalidPacket(format!("line CRC needs 2 bytes, got {}", data.len())))?;
        Ok(Self(u16::from_le_bytes(b)))
    }

    /// Check received pixel bytes against this CRC.
    pub fn check(self, data: &[u8]) -> Result<()> {
        let want = Self::compute(data);
        if want == self {
            Ok(())
        } else {
            Err(Error::CrcMismatch {
                kind: CrcKind::Line,
                want: want.0,
                got: self.0,
            })
        }
    }
}

/// UDP frame-header CRC (reflected engine).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderCrc(pub u16);

impl HeaderCrc {
    /// Compute the header CRC over the first 28 header bytes.
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(crc16_mcrf4xx(data))
    }

    /// Wire encoding (little-endian, header bytes 28–29).
    #[must_use]
    pub fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// Check received header bytes against this CRC.
    pub fn check(self, data: &[u8]) -> Result<()> {
        let want = Self::compute(data);
        if want == self {
            Ok(())
        } else {
            Err(Error::CrcMismatch {
                kind: CrcKind::Header,
                want: want.0,
                got: self.0,
            })
        }
    }
}
