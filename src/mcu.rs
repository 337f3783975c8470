/*! MCU layer: CSI-2 receive and UDP fragmentation.

The SoC side of the link. The receive half walks the CSI-2 packet stream,
validates every line CRC, and rebuilds frames inside an FS/FE window. The
transmit half slices a rebuilt frame into UDP datagrams, each led by a
32-byte frame header.

Rebuilt frames pass through a bounded ring before fragmentation. A stalled
consumer makes the ring overflow, in which case the oldest in-flight frame
is dropped and counted; the producer is never blocked.

State machine per frame:

```text
Idle -> Receiving(frame) -> Complete -> Transmitting(seq 0..N) -> Idle
                 |
                 v  (line CRC storm)
               Error   (sticky until reset)
```
*/
use std::collections::VecDeque;
use std::time::Instant;

use log::{debug, info, warn};

use crate::csi2::{DataType, Packet};
use crate::frame::{Frame, validate_bit_depth};
use crate::layer::{Layer, LayerStats};
use crate::reassembly::FrameReassembler;
use crate::udp::{FrameHeader, HeaderFlags, UdpPacket};
use crate::{Error, Result};

/// MCU configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct McuConfig {
    /// Expected frame height; sizes the line bitmap.
    pub rows: u32,
    /// Expected frame width; line packets with another width are invalid.
    pub cols: u32,
    /// Bit depth advertised in outgoing frame headers.
    pub bit_depth: u8,
    /// UDP source port.
    pub source_port: u16,
    /// UDP destination port.
    pub destination_port: u16,
    /// Pixel bytes per UDP datagram after the 32-byte header.
    pub max_payload: usize,
    /// In-flight frames held between receive and fragmentation.
    pub ring_capacity: usize,
    /// Line CRC failures within one frame window that latch the error
    /// state.
    pub crc_storm_threshold: u64,
}

impl Default for McuConfig {
    fn default() -> Self {
        Self {
            rows: 1024,
            cols: 1024,
            bit_depth: 16,
            source_port: 9000,
            destination_port: 9001,
            max_payload: 8192,
            ring_capacity: 4,
            crc_storm_threshold: 16,
        }
    }
}

struct RxWindow {
    frame_number: u16,
    // Next row for packets without an explicit LineStart.
    cursor: u32,
    asm: FrameReassembler,
    crc_errors: u64,
}

enum RxState {
    Idle,
    Receiving(RxWindow),
    Error,
}

/// CSI-2 receiver and UDP fragmenter.
pub struct McuLayer {
    config: McuConfig,
    state: RxState,
    ring: VecDeque<Frame>,
    epoch: Instant,
    stats: LayerStats,
    incomplete_frames: u64,
    unexpected_packets: u64,
    invalid_packets: u64,
}

impl McuLayer {
    /// Create an MCU layer from a validated configuration.
    pub fn new(config: McuConfig) -> Result<Self> {
        if config.rows == 0 || config.cols == 0 {
            return Err(Error::InvalidConfig(format!(
                "zero geometry: {}x{}",
                config.cols, config.rows
            )));
        }
        if config.rows > u16::MAX as u32 || config.cols > u16::MAX as u32 {
            return Err(Error::InvalidConfig(format!(
                "geometry {}x{} exceeds the 16-bit header fields",
                config.cols, config.rows
            )));
        }
        if config.cols as usize * 2 > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "line of {} bytes exceeds the 16-bit CSI-2 word count",
                config.cols * 2
            )));
        }
        validate_bit_depth(config.bit_depth)?;
        if config.source_port == 0 || config.destination_port == 0 {
            return Err(Error::InvalidConfig("port 0 is not addressable".into()));
        }
        if config.max_payload == 0 {
            return Err(Error::InvalidConfig("zero max_payload".into()));
        }
        if config.ring_capacity == 0 {
            return Err(Error::InvalidConfig("zero ring capacity".into()));
        }
        if config.crc_storm_threshold == 0 {
            return Err(Error::InvalidConfig("zero crc storm threshold".into()));
        }
        let total = config.rows as usize * config.cols as usize * 2;
        let n = total.div_ceil(config.max_payload);
        if n > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "{n} fragments per frame exceeds the 16-bit packet_seq field"
            )));
        }
        Ok(Self {
            config,
            state: RxState::Idle,
            ring: VecDeque::new(),
            epoch: Instant::now(),
            stats: LayerStats::default(),
            incomplete_frames: 0,
            unexpected_packets: 0,
            invalid_packets: 0,
        })
    }

    /// The configuration this layer was built from.
    #[must_use]
    pub fn config(&self) -> &McuConfig {
        &self.config
    }

    fn new_window(&self, frame_number: u16) -> Result<RxWindow> {
        let rows = self.config.rows as usize;
        let line_len = self.config.cols as usize * 2;
        Ok(RxWindow {
            frame_number,
            cursor: 0,
            asm: FrameReassembler::new(frame_number as u32, rows, line_len, rows * line_len)?,
            crc_errors: 0,
        })
    }

    /// Walk a burst of CSI-2 packets, returning any frames completed by an
    /// FE in this burst. Line CRC failures and stray packets are counted
    /// and dropped; they never abort the burst.
    pub fn receive(&mut self, packets: &[Packet]) -> Result<Vec<Frame>> {
        if matches!(self.state, RxState::Error) {
            return Err(Error::UnexpectedPacket(
                "receiver latched in error state; reset required".into(),
            ));
        }
        let mut done = Vec::new();
        for packet in packets {
            match packet.data_type {
                DataType::FrameStart => self.on_frame_start(packet)?,
                DataType::FrameEnd => {
                    if let Some(frame) = self.on_frame_end(packet)? {
                        done.push(frame);
                    }
                }
                DataType::LineStart => self.on_line_start(packet),
                DataType::LineEnd => {}
                _ => {
                    self.on_line(packet)?;
                    if matches!(self.state, RxState::Error) {
                        return Err(Error::UnexpectedPacket(format!(
                            "line CRC storm: {} failures in one frame window",
                            self.config.crc_storm_threshold
                        )));
                    }
                }
            }
        }
        Ok(done)
    }

    fn on_frame_start(&mut self, packet: &Packet) -> Result<()> {
        let counter = packet.counter().unwrap_or(0);
        if let RxState::Receiving(w) = &self.state {
            // The previous window never saw its FE. Count it as dropped
            // and resynchronize on the new frame.
            warn!(
                "frame {} interrupted by FS of frame {counter}; dropping",
                w.frame_number
            );
            self.stats.frames_dropped += 1;
        }
        self.state = RxState::Receiving(self.new_window(counter)?);
        Ok(())
    }

    fn on_line_start(&mut self, packet: &Packet) {
        match &mut self.state {
            RxState::Receiving(w) => {
                w.cursor = packet.counter().unwrap_or(0) as u32;
            }
            _ => self.unexpected_packets += 1,
        }
    }

    fn on_line(&mut self, packet: &Packet) -> Result<()> {
        let line_len = self.config.cols as usize * 2;
        let storm = self.config.crc_storm_threshold;
        let RxState::Receiving(w) = &mut self.state else {
            debug!("line data outside an FS/FE window, dropping");
            self.unexpected_packets += 1;
            return Ok(());
        };
        let (bytes, crc) = match packet.split_line_payload() {
            Ok(split) => split,
            Err(_) => {
                self.invalid_packets += 1;
                return Ok(());
            }
        };
        if bytes.len() != line_len {
            debug!("line of {} bytes, want {line_len}; dropping", bytes.len());
            self.invalid_packets += 1;
            w.cursor += 1;
            return Ok(());
        }
        let row = w.cursor;
        w.cursor += 1;
        if let Err(e) = crc.check(bytes) {
            debug!("row {row}: {e}");
            self.stats.crc_errors += 1;
            w.crc_errors += 1;
            if w.crc_errors >= storm {
                warn!("line CRC storm on frame {}; latching error state", w.frame_number);
                self.state = RxState::Error;
            }
            return Ok(());
        }
        if row >= self.config.rows {
            debug!("row {row} beyond configured height {}; dropping", self.config.rows);
            self.unexpected_packets += 1;
            return Ok(());
        }
        // Duplicate rows (seen again after a LineStart rewind) are
        // dropped by the reassembler without changing state.
        w.asm.insert(row as usize, bytes)?;
        Ok(())
    }

    fn on_frame_end(&mut self, packet: &Packet) -> Result<Option<Frame>> {
        let state = std::mem::replace(&mut self.state, RxState::Idle);
        let RxState::Receiving(w) = state else {
            debug!("FE without a matching FS, dropping");
            self.unexpected_packets += 1;
            return Ok(None);
        };
        let counter = packet.counter().unwrap_or(0);
        if counter != w.frame_number {
            warn!(
                "FE counter {counter} does not match FS counter {}; dropping frame",
                w.frame_number
            );
            self.stats.frames_dropped += 1;
            return Ok(None);
        }
        if !w.asm.is_complete() {
            // Missing or corrupt lines stay zero-filled.
            info!(
                "frame {}: {} of {} lines missing, zero-filling",
                w.frame_number,
                w.asm.missing(),
                w.asm.segments()
            );
            self.incomplete_frames += 1;
        }
        let frame = Frame::from_le_bytes(
            w.frame_number as u32,
            self.config.cols,
            self.config.rows,
            &w.asm.into_buffer(),
        )?;
        self.stats.frames_received += 1;
        Ok(Some(frame))
    }

    /// Whether the last received frame window was fully populated.
    #[must_use]
    pub fn incomplete_frames(&self) -> u64 {
        self.incomplete_frames
    }

    /// Queue a rebuilt frame for fragmentation. On overflow the oldest
    /// queued frame is dropped and counted; the new frame always enters.
    pub fn enqueue(&mut self, frame: Frame) {
        if self.ring.len() >= self.config.ring_capacity {
            if let Some(evicted) = self.ring.pop_front() {
                warn!("{}", Error::BufferOverflow(evicted.frame_number()));
                self.stats.frames_dropped += 1;
            }
        }
        self.ring.push_back(frame);
    }

    /// Dequeue the next frame awaiting fragmentation.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.ring.pop_front()
    }

    /// Frames currently queued.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.ring.len()
    }

    /// Slice one frame into UDP datagrams, `packet_seq` ascending.
    pub fn fragment(&mut self, frame: &Frame) -> Result<Vec<UdpPacket>> {
        if frame.height() != self.config.rows || frame.width() != self.config.cols {
            return Err(Error::InvalidFrame(format!(
                "frame is {}x{}, layer configured for {}x{}",
                frame.width(),
                frame.height(),
                self.config.cols,
                self.config.rows
            )));
        }
        let bytes = frame.to_le_bytes();
        let total = bytes.len().div_ceil(self.config.max_payload) as u16;
        let timestamp_ns = self.epoch.elapsed().as_nanos() as u64;
        let mut out = Vec::with_capacity(total as usize);
        for (i, chunk) in bytes.chunks(self.config.max_payload).enumerate() {
            let last = i as u16 == total - 1;
            let header = FrameHeader {
                frame_id: frame.frame_number(),
                packet_seq: i as u16,
                total_packets: total,
                timestamp_ns,
                rows: frame.height() as u16,
                cols: frame.width() as u16,
                bit_depth: self.config.bit_depth,
                flags: if last {
                    HeaderFlags::LAST_PACKET
                } else {
                    HeaderFlags::empty()
                },
            };
            let mut data = header.to_bytes().to_vec();
            data.extend(chunk);
            out.push(UdpPacket::new(
                self.config.source_port,
                self.config.destination_port,
                data,
            )?);
        }
        debug!(
            "frame {}: fragmented into {total} datagrams",
            frame.frame_number()
        );
        Ok(out)
    }
}

impl Layer for McuLayer {
    type Input = Vec<Packet>;
    type Output = Vec<UdpPacket>;

    fn layer_name(&self) -> &'static str {
        "McuLayer"
    }

    /// Receive a burst, queue completed frames, and fragment everything
    /// the ring holds.
    fn process(&mut self, packets: Vec<Packet>) -> Result<Vec<UdpPacket>> {
        for frame in self.receive(&packets)? {
            self.enqueue(frame);
        }
        let mut out = Vec::new();
        while let Some(frame) = self.pop_frame() {
            out.extend(self.fragment(&frame)?);
        }
        Ok(out)
    }

    fn reset(&mut self) {
        self.state = RxState::Idle;
        self.ring.clear();
        self.stats = LayerStats::default();
        self.incomplete_frames = 0;
        self.unexpected_packets = 0;
        self.invalid_packets = 0;
    }

    fn status(&self) -> String {
        format!(
            "{}: {} incomplete={} unexpected={} invalid={} queued={}",
            self.layer_name(),
            self.stats,
            self.incomplete_frames,
            self.unexpected_packets,
            self.invalid_packets,
            self.ring.len()
        )
    }

    fn stats(&self) -> LayerStats {
        self.stats
    }
}
