/*! UDP frame header and datagram model.

The MCU→Host boundary carries frames as UDP datagrams. Every datagram in
the frame stream starts with a 32-byte header, packed little-endian in
field order:

```text
offset  size  field
     0     4  magic           0xD7E01234
     4     1  version         0x01
     5     3  reserved        zero
     8     4  frame_id
    12     2  packet_seq      0-based
    14     2  total_packets
    16     8  timestamp_ns    monotonic epoch
    24     2  rows
    26     2  cols
    28     2  crc16           reflected CRC over bytes 0–27
    30     1  bit_depth
    31     1  flags
```

The header CRC covers bytes 0..28 only; `bit_depth` and `flags` ride
behind it unprotected, matching the external protocol document.
*/
use crate::crc::HeaderCrc;
use crate::{Error, Result};

/// Frame stream magic, first four header bytes (little-endian).
pub const FRAME_MAGIC: u32 = 0xd7e0_1234;

/// Protocol version this simulator speaks.
pub const FRAME_HEADER_VERSION: u8 = 0x01;

/// Serialized header length.
pub const FRAME_HEADER_LEN: usize = 32;

bitflags::bitflags! {
    /// Flags byte at header offset 31.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct HeaderFlags: u8 {
        /// Set on the final packet of a frame.
        const LAST_PACKET = 1 << 0;
        /// The transmitter marked this frame as faulty.
        const ERROR_FRAME = 1 << 1;
        /// Calibration frame, not image data.
        const CALIBRATION = 1 << 2;
    }
}

/// Parsed 32-byte frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame this packet belongs to.
    pub frame_id: u32,
    /// 0-based fragment index within the frame.
    pub packet_seq: u16,
    /// Fragment count for the whole frame.
    pub total_packets: u16,
    /// Monotonic timestamp at fragmentation time.
    pub timestamp_ns: u64,
    /// Frame height.
    pub rows: u16,
    /// Frame width.
    pub cols: u16,
    /// Pixel bit depth (14 or 16 in production).
    pub bit_depth: u8,
    /// Flags byte.
    pub flags: HeaderFlags,
}

impl FrameHeader {
    /// Serialize, computing the header CRC over bytes 0..28.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[0..4].copy_from_slice(&FRAME_MAGIC.to_le_bytes());
        out[4] = FRAME_HEADER_VERSION;
        // 5..8 reserved, zero.
        out[8..12].copy_from_slice(&self.frame_id.to_le_bytes());
        out[12..14].copy_from_slice(&self.packet_seq.to_le_bytes());
        out[14..16].copy_from_slice(&self.total_packets.to_le_bytes());
        out[16..24].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        out[24..26].copy_from_slice(&self.rows.to_le_bytes());
        out[26..28].copy_from_slice(&self.cols.to_le_bytes());
        let crc = HeaderCrc::compute(&out[0..28]);
        out[28..30].copy_from_slice(&crc.to_le_bytes());
        out[30] = self.bit_depth;
        out[31] = self.flags.bits();
        out
    }

    /// Parse and validate a header from the front of a datagram.
    ///
    /// Magic and version mismatches are [`Error::InvalidPacket`]; a CRC
    /// mismatch is [`Error::CrcMismatch`] tagged `header`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return Err(Error::InvalidPacket(format!(
                "datagram too short for frame header: {}",
                data.len()
            )));
        }
        let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
        if magic != FRAME_MAGIC {
            return Err(Error::InvalidPacket(format!(
                "bad magic {magic:#010x}, want {FRAME_MAGIC:#010x}"
            )));
        }
        if data[4] != FRAME_HEADER_VERSION {
            return Err(Error::InvalidPacket(format!(
                "unsupported header version {}",
                data[4]
            )));
        }
        let got = HeaderCrc(u16::from_le_bytes(data[28..30].try_into().unwrap()));
        got.check(&data[0..28])?;
        Ok(Self {
            frame_id: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            packet_seq: u16::from_le_bytes(data[12..14].try_into().unwrap()),
            total_packets: u16::from_le_bytes(data[14..16].try_into().unwrap()),
            timestamp_ns: u64::from_le_bytes(data[16..24].try_into().unwrap()),
            rows: u16::from_le_bytes(data[24..26].try_into().unwrap()),
            cols: u16::from_le_bytes(data[26..28].try_into().unwrap()),
            bit_depth: data[30],
            flags: HeaderFlags::from_bits_retain(data[31]),
        })
    }
}

/// One UDP datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UdpPacket {
    /// Sending port, `1..=65535`.
    pub source_port: u16,
    /// Receiving port, `1..=65535`.
    pub destination_port: u16,
    /// Datagram payload: frame header followed by a pixel chunk.
    pub data: Vec<u8>,
}

impl UdpPacket {
    /// Create a datagram, rejecting port 0.
    pub fn new(source_port: u16, destination_port: u16, data: Vec<u8>) -> Result<Self> {
        if source_port == 0 || destination_port == 0 {
            return Err(Error::InvalidConfig(format!(
                "port 0 is not addressable ({source_port} -> {destination_port})"
            )));
        }
        Ok(Self {
            source_port,
            destination_port,
            data,
        })
    }

    /// The pixel chunk behind the frame header.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[FRAME_HEADER_LEN.min(self.data.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CrcKind;
    use crate::crc::crc16_mcrf4xx;

    fn header() -> FrameHeader {
        FrameHeader {
            frame_id: 0x01020304,
            packet_seq: 5,
            total_packets: 9,
            timestamp_ns: 0x1122_3344_5566_7788,
            rows: 2048,
            cols: 1024,
            bit_depth: 16,
            flags: HeaderFlags::LAST_PACKET | HeaderFlags::CALIBRATION,
        }
    }

    #[test]
    fn field_offsets() {
        let bytes = header().to_bytes();
        assert_eq!(&bytes[0..4], &[0x34, 0x12, 0xe0, 0xd7]);
        assert_eq!(bytes[4], 0x01);
        assert_eq!(&bytes[5..8], &[0, 0, 0]);
        assert_eq!(&bytes[8..12], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[12..14], &[5, 0]);
        assert_eq!(&bytes[14..16], &[9, 0]);
        assert_eq!(
            &bytes[16..24],
            &[0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        );
        assert_eq!(&bytes[24..26], &[0x00, 0x08]);
        assert_eq!(&bytes[26..28], &[0x00, 0x04]);
        assert_eq!(
            u16::from_le_bytes([bytes[28], bytes[29]]),
            crc16_mcrf4xx(&bytes[0..28])
        );
        assert_eq!(bytes[30], 16);
        assert_eq!(bytes[31], 0b101);
    }

    #[test]
    fn round_trip() {
        let h = header();
        assert_eq!(FrameHeader::parse(&h.to_bytes()).unwrap(), h);
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut bytes = header().to_bytes();
        bytes[0] ^= 1;
        assert!(matches!(
            FrameHeader::parse(&bytes),
            Err(Error::InvalidPacket(_))
        ));

        let mut bytes = header().to_bytes();
        bytes[4] = 2;
        // Version is inside the CRC range, so recompute to isolate the
        // version check.
        let crc = crc16_mcrf4xx(&bytes[0..28]);
        bytes[28..30].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            FrameHeader::parse(&bytes),
            Err(Error::InvalidPacket(_))
        ));
    }

    #[test]
    fn crc_protects_bytes_up_to_28() {
        // Any flip in 0..28 must fail the CRC (or magic/version) check.
        for i in 5..28 {
            let mut bytes = header().to_bytes();
            bytes[i] ^= 0x80;
            assert!(FrameHeader::parse(&bytes).is_err(), "byte {i}");
        }
        // bit_depth and flags ride outside the protected range.
        let mut bytes = header().to_bytes();
        bytes[30] = 14;
        bytes[31] = 0;
        let h = FrameHeader::parse(&bytes).unwrap();
        assert_eq!(h.bit_depth, 14);
        assert_eq!(h.flags, HeaderFlags::empty());
    }

    #[test]
    fn crc_mismatch_is_tagged_header() {
        let mut bytes = header().to_bytes();
        bytes[28] ^= 0xff;
        match FrameHeader::parse(&bytes) {
            Err(Error::CrcMismatch { kind, .. }) => assert_eq!(kind, CrcKind::Header),
            other => panic!("want header CRC mismatch, got {other:?}"),
        }
    }

    #[test]
    fn port_zero_rejected() {
        assert!(UdpPacket::new(0, 9000, vec![]).is_err());
        assert!(UdpPacket::new(9000, 0, vec![]).is_err());
        assert!(UdpPacket::new(9000, 9001, vec![]).is_ok());
    }
}
