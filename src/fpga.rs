/*! FPGA layer: CSI-2 packetization.

Encodes a frame into the ordered CSI-2 packet sequence the real FPGA puts
on the link: one FrameStart, one RAW16 long packet per line (with its line
CRC), one FrameEnd. `height + 2` packets per frame, strictly in order.
*/
use log::trace;

use crate::crc::LineCrc;
use crate::csi2::{DataType, Packet};
use crate::frame::Frame;
use crate::layer::{Layer, LayerStats};
use crate::{Error, Result};

/// FPGA configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FpgaConfig {
    /// CSI-2 virtual channel for all emitted packets.
    pub virtual_channel: u8,
    /// Data type code used for line packets. The protocol documents have
    /// disagreed on the RAW16 code, so it is configurable rather than
    /// hardcoded.
    pub raw_data_type: DataType,
    /// Emit a LineStart delimiter carrying the row number before every
    /// line packet. Off by default; receivers fall back to implicit
    /// in-order row numbering.
    pub emit_line_sync: bool,
}

impl Default for FpgaConfig {
    fn default() -> Self {
        Self {
            virtual_channel: 0,
            raw_data_type: DataType::Raw16,
            emit_line_sync: false,
        }
    }
}

/// CSI-2 transmit layer.
pub struct FpgaLayer {
    config: FpgaConfig,
    stats: LayerStats,
    packets_transmitted: u64,
}

impl FpgaLayer {
    /// Create an FPGA layer from a validated configuration.
    pub fn new(config: FpgaConfig) -> Result<Self> {
        if config.virtual_channel >= crate::csi2::VIRTUAL_CHANNELS {
            return Err(Error::InvalidConfig(format!(
                "virtual channel {} out of range",
                config.virtual_channel
            )));
        }
        if config.raw_data_type.is_short() {
            return Err(Error::InvalidConfig(format!(
                "{:?} cannot carry line data",
                config.raw_data_type
            )));
        }
        Ok(Self {
            config,
            stats: LayerStats::default(),
            packets_transmitted: 0,
        })
    }

    /// Encode one frame into its packet sequence.
    pub fn transmit(&mut self, frame: &Frame) -> Result<Vec<Packet>> {
        let vc = self.config.virtual_channel;
        let counter = frame.frame_number() as u16;
        let mut out = Vec::with_capacity(frame.height() as usize + 2);
        out.push(Packet::short(DataType::FrameStart, vc, counter)?);
        for row in 0..frame.height() {
            if self.config.emit_line_sync {
                out.push(Packet::short(DataType::LineStart, vc, row as u16)?);
            }
            let line = frame.line(row)?;
            let bytes = line.to_le_bytes();
            let crc = LineCrc::compute(&bytes);
            let mut payload = bytes;
            payload.extend(crc.to_le_bytes());
            out.push(Packet::new(self.config.raw_data_type, vc, payload)?);
        }
        out.push(Packet::short(DataType::FrameEnd, vc, counter)?);
        trace!(
            "frame {}: transmitted {} csi2 packets",
            frame.frame_number(),
            out.len()
        );
        self.stats.frames_received += 1;
        self.packets_transmitted += out.len() as u64;
        Ok(out)
    }
}

impl Layer for FpgaLayer {
    type Input = Frame;
    type Output = Vec<Packet>;

    fn layer_name(&self) -> &'static str {
        "FpgaLayer"
    }

    fn process(&mut self, frame: Frame) -> Result<Vec<Packet>> {
        self.transmit(&frame)
    }

    fn reset(&mut self) {
        self.stats = LayerStats::default();
        self.packets_transmitted = 0;
    }

    fn status(&self) -> String {
        format!(
            "{}: {} packets_transmitted={}",
            self.layer_name(),
            self.stats,
            self.packets_transmitted
        )
    }

    fn stats(&self) -> LayerStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        let pixels = (0..width * height).map(|i| i as u16).collect();
        Frame::new(3, width, height, pixels).unwrap()
    }

    #[test]
    fn packet_count_is_height_plus_two() {
        let mut fpga = FpgaLayer::new(FpgaConfig::default()).unwrap();
        let packets = fpga.transmit(&frame(16, 8)).unwrap();
        assert_eq!(packets.len(), 10);
    }

    #[test]
    fn delimiters_carry_frame_number() {
        let mut fpga = FpgaLayer::new(FpgaConfig::default()).unwrap();
        let packets = fpga.transmit(&frame(4, 2)).unwrap();
        assert_eq!(packets[0].data_type, DataType::FrameStart);
        assert_eq!(packets[0].counter(), Some(3));
        assert_eq!(packets.last().unwrap().data_type, DataType::FrameEnd);
        assert_eq!(packets.last().unwrap().counter(), Some(3));
    }

    #[test]
    fn line_packets_carry_pixels_and_crc() {
        let mut fpga = FpgaLayer::new(FpgaConfig::default()).unwrap();
        let f = frame(4, 2);
        let packets = fpga.transmit(&f).unwrap();
        for (row, p) in packets[1..=2].iter().enumerate() {
            assert_eq!(p.data_type, DataType::Raw16);
            assert_eq!(p.payload.len(), 4 * 2 + 2);
            let (bytes, crc) = p.split_line_payload().unwrap();
            assert_eq!(bytes, f.line(row as u32).unwrap().to_le_bytes());
            crc.check(bytes).unwrap();
        }
    }

    #[test]
    fn line_sync_mode_doubles_line_packets() {
        let mut fpga = FpgaLayer::new(FpgaConfig {
            emit_line_sync: true,
            ..Default::default()
        })
        .unwrap();
        let packets = fpga.transmit(&frame(4, 3)).unwrap();
        // FS + 3 * (LS + line) + FE.
        assert_eq!(packets.len(), 8);
        assert_eq!(packets[1].data_type, DataType::LineStart);
        assert_eq!(packets[1].counter(), Some(0));
        assert_eq!(packets[3].data_type, DataType::LineStart);
        assert_eq!(packets[3].counter(), Some(1));
    }

    #[test]
    fn rejects_short_type_for_lines() {
        assert!(
            FpgaLayer::new(FpgaConfig {
                raw_data_type: DataType::FrameStart,
                ..Default::default()
            })
            .is_err()
        );
    }

    #[test]
    fn configurable_raw_code() {
        let mut fpga = FpgaLayer::new(FpgaConfig {
            raw_data_type: DataType::Raw12,
            ..Default::default()
        })
        .unwrap();
        let packets = fpga.transmit(&frame(4, 1)).unwrap();
        assert_eq!(packets[1].data_type, DataType::Raw12);
    }
}
