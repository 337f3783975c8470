/*! Host layer: UDP reassembly.

The workstation side. Datagrams from the MCU arrive in any order, possibly
with losses; the host validates every frame header, sorts chunks into
per-frame reassembly slots, and emits a frame when its slot is fully
populated.

Every slot carries a deadline. Ageing slots are reaped on every packet
arrival and on an explicit [`HostLayer::tick`], whichever comes first. By
default a timed-out slot is discarded whole; zero-fill emission is opt-in.
*/
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::frame::Frame;
use crate::layer::{Layer, LayerStats};
use crate::reassembly::FrameReassembler;
use crate::udp::{FRAME_HEADER_LEN, FrameHeader, UdpPacket};
use crate::{Error, Result};

/// What to do with a slot whose deadline passes before completion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TimeoutPolicy {
    /// Discard the slot; nothing is emitted.
    #[default]
    Drop,
    /// Emit the frame with missing chunks zero-filled.
    ZeroFill,
}

/// Host configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostConfig {
    /// Chunk size the transmitter was configured with; non-final chunks
    /// must arrive at exactly this size.
    pub max_payload: usize,
    /// Slot lifetime from first packet.
    pub timeout: Duration,
    /// Timed-out slot handling.
    pub timeout_policy: TimeoutPolicy,
    /// Emit frames in ascending `frame_id` order instead of completion
    /// order. Completed frames are held while an older slot is still
    /// open.
    pub ordered_emission: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_payload: 8192,
            timeout: Duration::from_secs(2),
            timeout_policy: TimeoutPolicy::Drop,
            ordered_emission: false,
        }
    }
}

struct Slot {
    header: FrameHeader,
    asm: FrameReassembler,
    deadline: Instant,
}

/// UDP receive layer.
pub struct HostLayer {
    config: HostConfig,
    slots: HashMap<u32, Slot>,
    // Completed frames awaiting ordered emission.
    ready: BTreeMap<u32, Frame>,
    stats: LayerStats,
    invalid_packets: u64,
    zero_filled: u64,
}

impl HostLayer {
    /// Create a host layer from a validated configuration.
    pub fn new(config: HostConfig) -> Result<Self> {
        if config.max_payload == 0 {
            return Err(Error::InvalidConfig("zero max_payload".into()));
        }
        if config.timeout.is_zero() {
            return Err(Error::InvalidConfig("zero reassembly timeout".into()));
        }
        Ok(Self {
            config,
            slots: HashMap::new(),
            ready: BTreeMap::new(),
            stats: LayerStats::default(),
            invalid_packets: 0,
            zero_filled: 0,
        })
    }

    /// Feed a burst of datagrams, returning every frame that became
    /// emittable. Invalid packets are counted and dropped.
    pub fn receive(&mut self, packets: &[UdpPacket]) -> Result<Vec<Frame>> {
        let now = Instant::now();
        let mut out = Vec::new();
        for packet in packets {
            self.one_packet(packet, now, &mut out);
            // Deadlines are checked on every arrival, so a stalled frame
            // cannot linger just because traffic keeps flowing.
            out.extend(self.reap(now));
        }
        out.extend(self.drain_ready());
        Ok(out)
    }

    fn one_packet(&mut self, packet: &UdpPacket, now: Instant, out: &mut Vec<Frame>) {
        let header = match FrameHeader::parse(&packet.data) {
            Ok(h) => h,
            Err(Error::CrcMismatch { .. }) => {
                debug!("frame header CRC mismatch, dropping datagram");
                self.stats.crc_errors += 1;
                return;
            }
            Err(e) => {
                debug!("invalid datagram: {e}");
                self.invalid_packets += 1;
                return;
            }
        };
        let payload = &packet.data[FRAME_HEADER_LEN..];
        let total_bytes = header.rows as usize * header.cols as usize * 2;
        let slot = match self.slots.entry(header.frame_id) {
            std::collections::hash_map::Entry::Occupied(e) => {
                let slot = e.into_mut();
                if slot.header.total_packets != header.total_packets
                    || slot.header.rows != header.rows
                    || slot.header.cols != header.cols
                {
                    warn!(
                        "frame {}: header geometry changed mid-frame, dropping datagram",
                        header.frame_id
                    );
                    self.invalid_packets += 1;
                    return;
                }
                slot
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                let asm = match FrameReassembler::new(
                    header.frame_id,
                    header.total_packets as usize,
                    self.config.max_payload,
                    total_bytes,
                ) {
                    Ok(asm) => asm,
                    Err(e) => {
                        debug!("frame {}: {e}", header.frame_id);
                        self.invalid_packets += 1;
                        return;
                    }
                };
                debug!(
                    "frame {}: opened slot for {} packets",
                    header.frame_id, header.total_packets
                );
                e.insert(Slot {
                    header,
                    asm,
                    deadline: now + self.config.timeout,
                })
            }
        };
        match slot.asm.insert(header.packet_seq as usize, payload) {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    "frame {}: duplicate packet {}, dropping",
                    header.frame_id, header.packet_seq
                );
                return;
            }
            Err(e) => {
                debug!("frame {}: {e}", header.frame_id);
                self.invalid_packets += 1;
                return;
            }
        }
        if slot.asm.is_complete() {
            let slot = self.slots.remove(&header.frame_id).unwrap();
            self.finish(slot, out);
        }
    }

    fn finish(&mut self, slot: Slot, out: &mut Vec<Frame>) {
        let h = slot.header;
        match Frame::from_le_bytes(
            h.frame_id,
            h.cols as u32,
            h.rows as u32,
            &slot.asm.into_buffer(),
        ) {
            Ok(frame) => {
                self.stats.frames_received += 1;
                if self.config.ordered_emission {
                    self.ready.insert(h.frame_id, frame);
                } else {
                    out.push(frame);
                }
            }
            Err(e) => {
                warn!("frame {}: {e}", h.frame_id);
                self.stats.frames_dropped += 1;
            }
        }
    }

    // Emit ready frames whose id precedes every still-open slot.
    fn drain_ready(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        if !self.config.ordered_emission {
            return out;
        }
        let oldest_open = self.slots.keys().min().copied();
        while let Some((&id, _)) = self.ready.first_key_value() {
            if oldest_open.is_some_and(|open| open < id) {
                break;
            }
            out.push(self.ready.remove(&id).unwrap());
        }
        out
    }

    fn reap(&mut self, now: Instant) -> Vec<Frame> {
        let expired: Vec<u32> = self
            .slots
            .iter()
            .filter(|(_, s)| now >= s.deadline)
            .map(|(&id, _)| id)
            .collect();
        let mut out = Vec::new();
        for id in expired {
            let slot = self.slots.remove(&id).unwrap();
            self.stats.timeouts += 1;
            match self.config.timeout_policy {
                TimeoutPolicy::Drop => {
                    info!(
                        "frame {id}: timed out with {}/{} packets, dropping",
                        slot.asm.received(),
                        slot.asm.segments()
                    );
                    self.stats.frames_dropped += 1;
                }
                TimeoutPolicy::ZeroFill => {
                    info!(
                        "frame {id}: timed out with {}/{} packets, zero-filling",
                        slot.asm.received(),
                        slot.asm.segments()
                    );
                    self.zero_filled += 1;
                    self.finish(slot, &mut out);
                }
            }
        }
        out
    }

    /// Advance time explicitly, reaping slots past their deadline. Under
    /// the zero-fill policy the reaped frames are returned.
    pub fn tick(&mut self, now: Instant) -> Vec<Frame> {
        let mut out = self.reap(now);
        out.extend(self.drain_ready());
        out
    }

    /// Open reassembly slots.
    #[must_use]
    pub fn open_slots(&self) -> usize {
        self.slots.len()
    }

    /// Frames emitted after zero-filling a timed-out slot.
    #[must_use]
    pub fn zero_filled(&self) -> u64 {
        self.zero_filled
    }

    /// Datagrams rejected for reasons other than a header CRC mismatch.
    #[must_use]
    pub fn invalid_packets(&self) -> u64 {
        self.invalid_packets
    }
}

impl Layer for HostLayer {
    type Input = Vec<UdpPacket>;
    type Output = Vec<Frame>;

    fn layer_name(&self) -> &'static str {
        "HostLayer"
    }

    fn process(&mut self, packets: Vec<UdpPacket>) -> Result<Vec<Frame>> {
        self.receive(&packets)
    }

    fn reset(&mut self) {
        self.slots.clear();
        self.ready.clear();
        self.stats = LayerStats::default();
        self.invalid_packets = 0;
        self.zero_filled = 0;
    }

    fn status(&self) -> String {
        format!(
            "{}: {} invalid={} zero_filled={} open_slots={}",
            self.layer_name(),
            self.stats,
            self.invalid_packets,
            self.zero_filled,
            self.slots.len()
        )
    }

    fn stats(&self) -> LayerStats {
        self.stats
    }
}
