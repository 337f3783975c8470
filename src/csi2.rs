/*! CSI-2 packet model and wire codec.

The FPGA→MCU boundary carries pixel data as MIPI CSI-2 packets, modeled
here as an in-memory byte stream of structured packets.

Wire format:

* Long packet: 4-byte header (`DataID`, 16-bit word count little-endian,
  8-bit ECC), then `WC` payload bytes, then a 2-byte line CRC
  little-endian. `DataID` packs the virtual channel in the top two bits and
  the data type code in the low six.
* Short packet (frame/line delimiters): 4-byte header only, where the
  16-bit field carries the frame or line counter instead of a word count.

The header ECC is the MIPI-specified Hamming code over the 24 header bits;
it is generated on encode and checked on decode.
*/
use log::trace;

use crate::crc::LineCrc;
use crate::{Error, Result};

/// Number of virtual channels the two DataID bits can address.
pub const VIRTUAL_CHANNELS: u8 = 4;

/// Byte length of every packet header, short or long.
pub const HEADER_LEN: usize = 4;

/// CSI-2 data type codes used by this system.
///
/// RAW16 is the primary payload type; the short-packet codes delimit
/// frames and lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DataType {
    /// Frame start delimiter (short packet).
    FrameStart,
    /// Frame end delimiter (short packet).
    FrameEnd,
    /// Line start delimiter (short packet).
    LineStart,
    /// Line end delimiter (short packet).
    LineEnd,
    /// 8-bit raw pixels.
    Raw8,
    /// 10-bit raw pixels.
    Raw10,
    /// 12-bit raw pixels.
    Raw12,
    /// 14-bit raw pixels.
    Raw14,
    /// 16-bit raw pixels, little-endian.
    Raw16,
}

impl DataType {
    /// Six-bit wire code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            DataType::FrameStart => 0x00,
            DataType::FrameEnd => 0x01,
            DataType::LineStart => 0x02,
            DataType::LineEnd => 0x03,
            DataType::Raw8 => 0x2a,
            DataType::Raw10 => 0x2b,
            DataType::Raw12 => 0x2c,
            DataType::Raw14 => 0x2d,
            DataType::Raw16 => 0x2e,
        }
    }

    /// Decode a six-bit wire code.
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0x00 => DataType::FrameStart,
            0x01 => DataType::FrameEnd,
            0x02 => DataType::LineStart,
            0x03 => DataType::LineEnd,
            0x2a => DataType::Raw8,
            0x2b => DataType::Raw10,
            0x2c => DataType::Raw12,
            0x2d => DataType::Raw14,
            0x2e => DataType::Raw16,
            other => {
                return Err(Error::InvalidPacket(format!(
                    "unknown data type code {other:#04x}"
                )));
            }
        })
    }

    /// Short packets carry a counter in the header and have no payload on
    /// the wire.
    #[must_use]
    pub fn is_short(self) -> bool {
        self.code() <= 0x03
    }
}

// Parity masks over the 24 header bits (DataID = bits 0..8, WC low byte =
// bits 8..16, WC high byte = bits 16..24), per the MIPI CSI-2 ECC
// definition. ECC bits 6 and 7 are always zero.
const ECC_MASKS: [u32; 6] = [
    0x00f1_2cb7,
    0x00f2_555b,
    0x00b4_9a6d,
    0x0078_e38e,
    0x00df_03f0,
    0x00ef_fc00,
];

/// Compute the header ECC over a DataID byte and 16-bit count field.
#[must_use]
pub fn header_ecc(data_id: u8, count: u16) -> u8 {
    let word = data_id as u32 | (count as u32) << 8;
    let mut ecc = 0u8;
    for (i, mask) in ECC_MASKS.iter().enumerate() {
        if (word & mask).count_ones() & 1 == 1 {
            ecc |= 1 << i;
        }
    }
    ecc
}

/// One CSI-2 packet.
///
/// For short packets `payload` holds the 16-bit counter little-endian. For
/// long packets it holds the serialized line pixels followed by the 2-byte
/// line CRC, so its length is `width * 2 + 2`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Payload data type.
    pub data_type: DataType,
    /// Virtual channel, `0..=3`.
    pub virtual_channel: u8,
    /// Payload bytes (see type-level docs).
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a long packet. The payload must already carry its trailing
    /// line CRC.
    pub fn new(data_type: DataType, virtual_channel: u8, payload: Vec<u8>) -> Result<Self> {
        if virtual_channel >= VIRTUAL_CHANNELS {
            return Err(Error::InvalidPacket(format!(
                "virtual channel {virtual_channel} out of range"
            )));
        }
        if data_type.is_short() {
            return Err(Error::InvalidPacket(format!(
                "{data_type:?} is a short packet type"
            )));
        }
        if payload.len() < 3 {
            return Err(Error::InvalidPacket(format!(
                "long packet payload too short: {}",
                payload.len()
            )));
        }
        // The trailing CRC rides outside the 16-bit word count.
        if payload.len() - 2 > u16::MAX as usize {
            return Err(Error::InvalidPacket(format!(
                "payload of {} bytes exceeds the 16-bit word count",
                payload.len() - 2
            )));
        }
        Ok(Self {
            data_type,
            virtual_channel,
            payload,
        })
    }

    /// Create a short (delimiter) packet carrying a counter.
    pub fn short(data_type: DataType, virtual_channel: u8, counter: u16) -> Result<Self> {
        if virtual_channel >= VIRTUAL_CHANNELS {
            return Err(Error::InvalidPacket(format!(
                "virtual channel {virtual_channel} out of range"
            )));
        }
        if !data_type.is_short() {
            return Err(Error::InvalidPacket(format!(
                "{data_type:?} is not a short packet type"
            )));
        }
        Ok(Self {
            data_type,
            virtual_channel,
            payload: counter.to_le_bytes().to_vec(),
        })
    }

    /// The counter of a short packet.
    #[must_use]
    pub fn counter(&self) -> Option<u16> {
        if self.data_type.is_short() && self.payload.len() == 2 {
            Some(u16::from_le_bytes([self.payload[0], self.payload[1]]))
        } else {
            None
        }
    }

    /// Split a long packet's payload into pixel bytes and line CRC.
    pub fn split_line_payload(&self) -> Result<(&[u8], LineCrc)> {
        if self.data_type.is_short() {
            return Err(Error::InvalidPacket(format!(
                "{:?} has no line payload",
                self.data_type
            )));
        }
        if self.payload.len() < 3 {
            return Err(Error::InvalidPacket(format!(
                "long packet payload too short: {}",
                self.payload.len()
            )));
        }
        let n = self.payload.len() - 2;
        let crc = LineCrc::from_le_bytes(&self.payload[n..])?;
        Ok((&self.payload[..n], crc))
    }

    fn data_id(&self) -> u8 {
        (self.virtual_channel << 6) | self.data_type.code()
    }

    /// Serialize to wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let data_id = self.data_id();
        if self.data_type.is_short() {
            let counter = self.counter().unwrap_or(0);
            let ecc = header_ecc(data_id, counter);
            let c = counter.to_le_bytes();
            vec![data_id, c[0], c[1], ecc]
        } else {
            // WC counts payload bytes before the trailing CRC.
            let wc = (self.payload.len() - 2) as u16;
            let ecc = header_ecc(data_id, wc);
            let w = wc.to_le_bytes();
            let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
            out.extend([data_id, w[0], w[1], ecc]);
            out.extend(&self.payload);
            out
        }
    }
}

/// Serialize a packet sequence to one contiguous wire byte stream.
#[must_use]
pub fn encode_stream(packets: &[Packet]) -> Vec<u8> {
    let mut out = Vec::new();
    for p in packets {
        out.extend(p.to_bytes());
    }
    out
}

/// Parse a contiguous wire byte stream back into packets.
///
/// Fails on a bad ECC, an unknown data type, or a truncated stream. Line
/// CRCs are *not* checked here: per-line validation is the MCU's job, so a
/// flipped payload bit still parses and is then counted and dropped by the
/// receiver.
pub fn decode_stream(mut data: &[u8]) -> Result<Vec<Packet>> {
    let mut out = Vec::new();
    while !data.is_empty() {
        if data.len() < HEADER_LEN {
            return Err(Error::InvalidPacket(format!(
                "truncated header: {} bytes left",
                data.len()
            )));
        }
        let data_id = data[0];
        let count = u16::from_le_bytes([data[1], data[2]]);
        let got_ecc = data[3];
        let want_ecc = header_ecc(data_id, count);
        if got_ecc != want_ecc {
            return Err(Error::InvalidPacket(format!(
                "header ECC mismatch: want {want_ecc:#04x}, got {got_ecc:#04x}"
            )));
        }
        let virtual_channel = data_id >> 6;
        let data_type = DataType::from_code(data_id & 0x3f)?;
        trace!("csi2 rx header: {data_type:?} vc={virtual_channel} count={count}");
        if data_type.is_short() {
            out.push(Packet::short(data_type, virtual_channel, count)?);
            data = &data[HEADER_LEN..];
        } else {
            let total = HEADER_LEN + count as usize + 2;
            if data.len() < total {
                return Err(Error::InvalidPacket(format!(
                    "truncated long packet: want {total} bytes, have {}",
                    data.len()
                )));
            }
            out.push(Packet::new(
                data_type,
                virtual_channel,
                data[HEADER_LEN..total].to_vec(),
            )?);
            data = &data[total..];
        }
    }
    Ok(out)
}
