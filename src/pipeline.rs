/*! Pipeline driver: compose the four layers and verify every boundary.

The driver runs Panel → FPGA → MCU → Host for one frame at a time,
recording a [`Checkpoint`] at each boundary. The FPGA→MCU hop goes through
the actual CSI-2 wire codec (encode to bytes, decode back), so the
checkpoints prove bit-exactness of the serialized formats, not just of the
in-memory structs.

Fault injection happens at the two wire boundaries: line CRC corruption on
the CSI-2 stream, and packet loss or header corruption on the UDP stream.
All injection is driven by a seeded RNG, so a failing run can be replayed
exactly.
*/
use std::path::PathBuf;
use std::time::Instant;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::csi2::{self, Packet};
use crate::fpga::{FpgaConfig, FpgaLayer};
use crate::frame::Frame;
use crate::host::{HostConfig, HostLayer};
use crate::layer::Layer;
use crate::mcu::{McuConfig, McuLayer};
use crate::panel::{PanelConfig, PanelLayer};
use crate::storage::FrameWriter;
use crate::udp::UdpPacket;
use crate::{Error, Result};

/// The four boundaries the driver verifies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Boundary {
    /// Panel output entering the FPGA.
    PanelToFpga,
    /// CSI-2 stream entering the MCU.
    FpgaToMcu,
    /// UDP stream entering the host.
    McuToHost,
    /// Reassembled frame handed to storage.
    HostToStorage,
}

impl Boundary {
    /// All boundaries, pipeline order.
    pub const ALL: [Boundary; 4] = [
        Boundary::PanelToFpga,
        Boundary::FpgaToMcu,
        Boundary::McuToHost,
        Boundary::HostToStorage,
    ];
}

impl std::fmt::Display for Boundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Boundary::PanelToFpga => write!(f, "panel->fpga"),
            Boundary::FpgaToMcu => write!(f, "fpga->mcu"),
            Boundary::McuToHost => write!(f, "mcu->host"),
            Boundary::HostToStorage => write!(f, "host->storage"),
        }
    }
}

/// Compact description of what crossed a boundary.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Summary {
    /// A frame, summarized by its pixel hash.
    Frame {
        /// SHA-256 of the pixel bytes.
        pixel_hash: String,
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
    },
    /// A packet burst, summarized by its length.
    Packets {
        /// Packets crossing the boundary.
        count: usize,
    },
    /// Stage never ran.
    Skipped,
}

/// How a checkpoint ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum CheckpointOutcome {
    /// Data crossed and matched expectations.
    Passed,
    /// Verification failed or the stage errored.
    Failed,
    /// An earlier failure or a cancel stopped the run first.
    Cancelled,
}

/// Record of one boundary crossing.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Checkpoint {
    /// Which boundary.
    pub boundary: Boundary,
    /// How it ended.
    pub outcome: CheckpointOutcome,
    /// Error text for a failed checkpoint.
    pub error: Option<String>,
    /// What crossed.
    pub summary: Summary,
}

impl Checkpoint {
    fn passed(boundary: Boundary, summary: Summary) -> Self {
        Self {
            boundary,
            outcome: CheckpointOutcome::Passed,
            error: None,
            summary,
        }
    }

    fn failed(boundary: Boundary, summary: Summary, error: String) -> Self {
        Self {
            boundary,
            outcome: CheckpointOutcome::Failed,
            error: Some(error),
            summary,
        }
    }

    fn cancelled(boundary: Boundary) -> Self {
        Self {
            boundary,
            outcome: CheckpointOutcome::Cancelled,
            error: None,
            summary: Summary::Skipped,
        }
    }
}

/// Fault injection knobs, applied at the wire boundaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FaultConfig {
    /// Seed for the injection RNG.
    pub seed: u64,
    /// Per-line probability of flipping a bit in the CSI-2 line CRC.
    pub line_crc_corrupt_probability: f64,
    /// Per-datagram probability of dropping it on the UDP hop.
    pub packet_loss_probability: f64,
    /// Per-datagram probability of flipping a bit in the frame header.
    pub header_corrupt_probability: f64,
}

/// Faults actually injected while running one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct FaultSummary {
    /// CSI-2 lines whose CRC was damaged.
    pub corrupted_lines: u64,
    /// UDP datagrams dropped.
    pub dropped_packets: u64,
    /// UDP datagrams with a damaged header.
    pub corrupted_headers: u64,
}

struct FaultInjector {
    config: FaultConfig,
    rng: StdRng,
    totals: FaultSummary,
}

impl FaultInjector {
    fn new(config: FaultConfig) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(config.seed),
            totals: FaultSummary::default(),
        }
    }

    fn corrupt_csi2(&mut self, packets: &mut [Packet]) {
        let p = self.config.line_crc_corrupt_probability;
        if p <= 0.0 {
            return;
        }
        for packet in packets.iter_mut() {
            if packet.data_type.is_short() || self.rng.random::<f64>() >= p {
                continue;
            }
            let n = packet.payload.len();
            let byte = n - 2 + self.rng.random_range(0..2usize);
            let bit = self.rng.random_range(0..8u32);
            packet.payload[byte] ^= 1 << bit;
            self.totals.corrupted_lines += 1;
        }
    }

    fn tamper_udp(&mut self, packets: Vec<UdpPacket>) -> Vec<UdpPacket> {
        let loss = self.config.packet_loss_probability;
        let corrupt = self.config.header_corrupt_probability;
        if loss <= 0.0 && corrupt <= 0.0 {
            return packets;
        }
        let mut out = Vec::with_capacity(packets.len());
        for mut packet in packets {
            if loss > 0.0 && self.rng.random::<f64>() < loss {
                self.totals.dropped_packets += 1;
                continue;
            }
            if corrupt > 0.0 && self.rng.random::<f64>() < corrupt {
                // Stay inside the CRC-protected field range so every
                // injected fault is attributable to the header CRC check.
                let byte = self.rng.random_range(8..28usize);
                let bit = self.rng.random_range(0..8u32);
                packet.data[byte] ^= 1 << bit;
                self.totals.corrupted_headers += 1;
            }
            out.push(packet);
        }
        out
    }
}

/// Result of driving one frame end to end.
#[derive(Clone, Debug, serde::Serialize)]
pub struct PipelineResult {
    /// One checkpoint per boundary, pipeline order.
    pub checkpoints: [Checkpoint; 4],
    /// The frame the host emitted, when one did.
    #[serde(skip)]
    pub final_frame: Option<Frame>,
    /// True when every checkpoint passed.
    pub success: bool,
    /// Faults injected during this frame.
    pub faults: FaultSummary,
}

impl PipelineResult {
    /// The first boundary that did not pass, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<Boundary> {
        self.checkpoints
            .iter()
            .find(|c| c.outcome != CheckpointOutcome::Passed)
            .map(|c| c.boundary)
    }
}

/// Serializable whole-pipeline configuration, mainly for the CLI.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// Panel settings.
    #[serde(default)]
    pub panel: PanelConfig,
    /// FPGA settings.
    #[serde(default)]
    pub fpga: FpgaConfig,
    /// MCU settings; geometry is derived from the panel when absent.
    #[serde(default)]
    pub mcu: Option<McuConfig>,
    /// Host settings; chunk size is derived from the MCU when absent.
    #[serde(default)]
    pub host: Option<HostConfig>,
    /// Fault injection.
    #[serde(default)]
    pub faults: FaultConfig,
}

/// Builder for a [`Pipeline`].
///
/// Only the panel config is usually needed; the MCU and host configs
/// default to matching geometry and chunk size.
pub struct PipelineBuilder {
    config: PipelineConfig,
    writer: Option<(Box<dyn FrameWriter>, PathBuf)>,
}

impl PipelineBuilder {
    /// Start from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            writer: None,
        }
    }

    /// Start from a deserialized configuration.
    #[must_use]
    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            config,
            writer: None,
        }
    }

    /// Set the panel configuration.
    #[must_use]
    pub fn panel(mut self, config: PanelConfig) -> Self {
        self.config.panel = config;
        self
    }

    /// Set the FPGA configuration.
    #[must_use]
    pub fn fpga(mut self, config: FpgaConfig) -> Self {
        self.config.fpga = config;
        self
    }

    /// Override the derived MCU configuration.
    #[must_use]
    pub fn mcu(mut self, config: McuConfig) -> Self {
        self.config.mcu = Some(config);
        self
    }

    /// Override the derived host configuration.
    #[must_use]
    pub fn host(mut self, config: HostConfig) -> Self {
        self.config.host = Some(config);
        self
    }

    /// Set fault injection.
    #[must_use]
    pub fn faults(mut self, config: FaultConfig) -> Self {
        self.config.faults = config;
        self
    }

    /// Attach a storage writer; finished frames land in `output_dir`.
    #[must_use]
    pub fn writer(mut self, writer: Box<dyn FrameWriter>, output_dir: PathBuf) -> Self {
        self.writer = Some((writer, output_dir));
        self
    }

    /// Construct the pipeline, validating every layer's configuration.
    pub fn build(self) -> Result<Pipeline> {
        let panel_cfg = self.config.panel;
        let mcu_cfg = self.config.mcu.unwrap_or_else(|| McuConfig {
            rows: panel_cfg.height,
            cols: panel_cfg.width,
            bit_depth: panel_cfg.bit_depth,
            ..Default::default()
        });
        let host_cfg = self.config.host.unwrap_or_else(|| HostConfig {
            max_payload: mcu_cfg.max_payload,
            ..Default::default()
        });
        Ok(Pipeline {
            panel: PanelLayer::new(panel_cfg)?,
            fpga: FpgaLayer::new(self.config.fpga)?,
            mcu: McuLayer::new(mcu_cfg)?,
            host: HostLayer::new(host_cfg)?,
            faults: FaultInjector::new(self.config.faults),
            writer: self.writer,
            checkpoints: Vec::new(),
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The composed four-layer pipeline.
pub struct Pipeline {
    panel: PanelLayer,
    fpga: FpgaLayer,
    mcu: McuLayer,
    host: HostLayer,
    faults: FaultInjector,
    writer: Option<(Box<dyn FrameWriter>, PathBuf)>,
    // Checkpoints of the frame currently or most recently driven. Grows
    // as `drive` crosses boundaries; `run_frame` and `cancel` pad the
    // unreached ones.
    checkpoints: Vec<Checkpoint>,
}

impl Pipeline {
    /// Drive one frame end to end, verifying bit-exactness at every
    /// boundary. A stage failure marks its checkpoint `Failed`, the
    /// remaining ones `Cancelled`, and `success = false`; the pipeline
    /// itself stays usable for the next frame.
    pub fn run_frame(&mut self, frame_number: u32) -> Result<PipelineResult> {
        let faults_before = self.faults.totals;
        self.checkpoints.clear();

        let result = self.drive(frame_number);
        let final_frame = match result {
            Ok(frame) => Some(frame),
            Err(e) => {
                let boundary = Boundary::ALL[self.checkpoints.len()];
                warn!("frame {frame_number}: {boundary} failed: {e}");
                self.checkpoints
                    .push(Checkpoint::failed(boundary, Summary::Skipped, e.to_string()));
                None
            }
        };
        while self.checkpoints.len() < 4 {
            self.checkpoints
                .push(Checkpoint::cancelled(Boundary::ALL[self.checkpoints.len()]));
        }
        let checkpoints: [Checkpoint; 4] =
            self.checkpoints.clone().try_into().expect("exactly four");
        let success = checkpoints
            .iter()
            .all(|c| c.outcome == CheckpointOutcome::Passed);
        let mut faults = self.faults.totals;
        faults.corrupted_lines -= faults_before.corrupted_lines;
        faults.dropped_packets -= faults_before.dropped_packets;
        faults.corrupted_headers -= faults_before.corrupted_headers;
        if success {
            info!("frame {frame_number}: all boundaries passed");
        }
        Ok(PipelineResult {
            checkpoints,
            final_frame,
            success,
            faults,
        })
    }

    // The happy path; any `Err` return is converted into a failed
    // checkpoint at the boundary `self.checkpoints` has reached.
    fn drive(&mut self, frame_number: u32) -> Result<Frame> {
        // Panel -> FPGA.
        let panel_frame = self.panel.process(frame_number)?;
        self.checkpoints.push(Checkpoint::passed(
            Boundary::PanelToFpga,
            Summary::Frame {
                pixel_hash: panel_frame.pixel_hash(),
                width: panel_frame.width(),
                height: panel_frame.height(),
            },
        ));

        // FPGA -> MCU, through the wire codec.
        let mut packets = self.fpga.process(panel_frame.clone())?;
        self.faults.corrupt_csi2(&mut packets);
        let packet_count = packets.len();
        let wire = csi2::encode_stream(&packets);
        debug!(
            "frame {frame_number}: {packet_count} csi2 packets, {} wire bytes",
            wire.len()
        );
        let packets = csi2::decode_stream(&wire)?;
        let mcu_frames = self.mcu.receive(&packets)?;
        let mcu_frame = mcu_frames
            .into_iter()
            .find(|f| f.frame_number() == frame_number as u16 as u32)
            .ok_or_else(|| {
                Error::UnexpectedPacket(format!("MCU did not complete frame {frame_number}"))
            })?;
        let summary = Summary::Packets {
            count: packet_count,
        };
        if mcu_frame.pixels() != panel_frame.pixels() {
            self.checkpoints.push(Checkpoint::failed(
                Boundary::FpgaToMcu,
                summary,
                "MCU frame differs from panel frame".into(),
            ));
        } else {
            self.checkpoints
                .push(Checkpoint::passed(Boundary::FpgaToMcu, summary));
        }

        // MCU -> Host.
        self.mcu.enqueue(mcu_frame.clone());
        let mut datagrams = Vec::new();
        while let Some(frame) = self.mcu.pop_frame() {
            datagrams.extend(self.mcu.fragment(&frame)?);
        }
        let sent = datagrams.len();
        let datagrams = self.faults.tamper_udp(datagrams);
        let host_frames = self.host.receive(&datagrams)?;
        let host_frame = host_frames
            .into_iter()
            .find(|f| f.frame_number() == mcu_frame.frame_number())
            .ok_or_else(|| {
                Error::FrameTimeout(mcu_frame.frame_number())
            })?;
        let summary = Summary::Packets { count: sent };
        if host_frame.pixels() != mcu_frame.pixels() {
            self.checkpoints.push(Checkpoint::failed(
                Boundary::McuToHost,
                summary,
                "host frame differs from MCU frame".into(),
            ));
        } else {
            self.checkpoints
                .push(Checkpoint::passed(Boundary::McuToHost, summary));
        }

        // Host -> storage.
        let summary = Summary::Frame {
            pixel_hash: host_frame.pixel_hash(),
            width: host_frame.width(),
            height: host_frame.height(),
        };
        if let Some((writer, dir)) = &mut self.writer {
            let path = dir.join(format!(
                "frame_{:06}.{}",
                host_frame.frame_number(),
                writer.extension()
            ));
            writer.write(&host_frame, &path)?;
        }
        self.checkpoints
            .push(Checkpoint::passed(Boundary::HostToStorage, summary));

        Ok(host_frame)
    }

    /// Run `count` frames, numbered from 1.
    pub fn run(&mut self, count: u32) -> Result<Vec<PipelineResult>> {
        (1..=count).map(|n| self.run_frame(n)).collect()
    }

    /// Advance host-side time, reaping timed-out reassembly slots.
    pub fn tick(&mut self, now: Instant) -> Vec<Frame> {
        self.host.tick(now)
    }

    /// Stop the pipeline: every layer resets and drops its in-flight
    /// state, and every boundary the current frame never reached is
    /// marked `Cancelled` in [`Pipeline::checkpoints`].
    pub fn cancel(&mut self) {
        info!("pipeline cancelled, resetting all layers");
        while self.checkpoints.len() < 4 {
            self.checkpoints
                .push(Checkpoint::cancelled(Boundary::ALL[self.checkpoints.len()]));
        }
        self.panel.reset();
        self.fpga.reset();
        self.mcu.reset();
        self.host.reset();
    }

    /// Checkpoints of the most recent frame, as finalized by
    /// [`Pipeline::run_frame`] or [`Pipeline::cancel`].
    #[must_use]
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Per-layer status lines, pipeline order.
    #[must_use]
    pub fn status(&self) -> Vec<String> {
        vec![
            self.panel.status(),
            self.fpga.status(),
            self.mcu.status(),
            self.host.status(),
        ]
    }

    /// The host layer, for timeout and counter inspection.
    #[must_use]
    pub fn host(&self) -> &HostLayer {
        &self.host
    }

    /// The MCU layer, for counter inspection.
    #[must_use]
    pub fn mcu(&self) -> &McuLayer {
        &self.mcu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::Pattern;

    fn builder(width: u32, height: u32) -> PipelineBuilder {
        PipelineBuilder::new().panel(PanelConfig {
            width,
            height,
            ..Default::default()
        })
    }

    #[test]
    fn clean_run_passes_all_checkpoints() {
        let mut p = builder(64, 64).build().unwrap();
        let r = p.run_frame(1).unwrap();
        assert!(r.success);
        assert!(r.first_failure().is_none());
        for (c, b) in r.checkpoints.iter().zip(Boundary::ALL) {
            assert_eq!(c.boundary, b);
            assert_eq!(c.outcome, CheckpointOutcome::Passed);
        }
        let f = r.final_frame.unwrap();
        assert_eq!(f.frame_number(), 1);
        // Panel and storage checkpoints summarize the same pixels.
        assert_eq!(r.checkpoints[0].summary, r.checkpoints[3].summary);
    }

    #[test]
    fn checkpoint_hashes_match_frame() {
        let mut p = builder(32, 16).build().unwrap();
        let r = p.run_frame(2).unwrap();
        let f = r.final_frame.unwrap();
        match &r.checkpoints[0].summary {
            Summary::Frame {
                pixel_hash,
                width,
                height,
            } => {
                assert_eq!(pixel_hash, &f.pixel_hash());
                assert_eq!((*width, *height), (32, 16));
            }
            other => panic!("want frame summary, got {other:?}"),
        }
    }

    #[test]
    fn csi2_packet_count_summary() {
        let mut p = builder(16, 8).build().unwrap();
        let r = p.run_frame(1).unwrap();
        assert_eq!(
            r.checkpoints[1].summary,
            Summary::Packets { count: 8 + 2 }
        );
    }

    #[test]
    fn total_packet_loss_fails_at_mcu_to_host() {
        let mut p = builder(32, 32)
            .faults(FaultConfig {
                packet_loss_probability: 1.0,
                ..Default::default()
            })
            .build()
            .unwrap();
        let r = p.run_frame(1).unwrap();
        assert!(!r.success);
        assert_eq!(r.first_failure(), Some(Boundary::McuToHost));
        assert_eq!(r.checkpoints[2].outcome, CheckpointOutcome::Failed);
        assert_eq!(r.checkpoints[3].outcome, CheckpointOutcome::Cancelled);
        assert!(r.final_frame.is_none());
        assert!(r.faults.dropped_packets > 0);
        // The pipeline recovers on the next clean frame.
        let mut clean = builder(32, 32).build().unwrap();
        assert!(clean.run_frame(2).unwrap().success);
    }

    #[test]
    fn corrupted_headers_are_counted_by_host() {
        let mut p = builder(256, 32)
            .mcu(McuConfig {
                rows: 32,
                cols: 256,
                max_payload: 512,
                ..Default::default()
            })
            .faults(FaultConfig {
                seed: 7,
                header_corrupt_probability: 0.5,
                ..Default::default()
            })
            .build()
            .unwrap();
        let r = p.run_frame(1).unwrap();
        // Every corrupted datagram must show up as a header CRC error.
        assert_eq!(p.host().stats().crc_errors, r.faults.corrupted_headers);
        assert!(r.faults.corrupted_headers > 0);
        // With chunks missing the host cannot have emitted the frame.
        assert!(!r.success);
    }

    #[test]
    fn line_crc_corruption_zero_fills_and_fails_verification() {
        let mut p = builder(64, 64)
            .mcu(McuConfig {
                rows: 64,
                cols: 64,
                // Keep the storm latch out of the way so every injected
                // fault is visible in the counters.
                crc_storm_threshold: 1000,
                ..Default::default()
            })
            .faults(FaultConfig {
                seed: 3,
                line_crc_corrupt_probability: 0.2,
                ..Default::default()
            })
            .build()
            .unwrap();
        let r = p.run_frame(1).unwrap();
        assert!(!r.success);
        assert_eq!(r.first_failure(), Some(Boundary::FpgaToMcu));
        assert!(r.faults.corrupted_lines > 0);
        assert_eq!(p.mcu().stats().crc_errors, r.faults.corrupted_lines);
    }

    #[test]
    fn fault_injection_is_deterministic() {
        let make = || {
            builder(64, 16)
                .faults(FaultConfig {
                    seed: 99,
                    packet_loss_probability: 0.3,
                    header_corrupt_probability: 0.2,
                    ..Default::default()
                })
                .build()
                .unwrap()
        };
        let a: Vec<FaultSummary> = make().run(5).unwrap().iter().map(|r| r.faults).collect();
        let b: Vec<FaultSummary> = make().run(5).unwrap().iter().map(|r| r.faults).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn run_numbers_frames_from_one() {
        let mut p = builder(16, 8).build().unwrap();
        let results = p.run(3).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));
        let numbers: Vec<u32> = results
            .iter()
            .map(|r| r.final_frame.as_ref().unwrap().frame_number())
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn cancel_resets_every_layer() {
        let mut p = builder(16, 8)
            .faults(FaultConfig {
                packet_loss_probability: 0.5,
                seed: 1,
                ..Default::default()
            })
            .build()
            .unwrap();
        let _ = p.run(5);
        p.cancel();
        for line in p.status() {
            assert!(line.contains("frames_received=0"), "{line}");
        }
    }

    #[test]
    fn cancel_marks_unreached_checkpoints_cancelled() {
        // Cancelled before any frame ran: all four boundaries pending.
        let mut p = builder(16, 8).build().unwrap();
        assert!(p.checkpoints().is_empty());
        p.cancel();
        assert_eq!(p.checkpoints().len(), 4);
        for (c, b) in p.checkpoints().iter().zip(Boundary::ALL) {
            assert_eq!(c.boundary, b);
            assert_eq!(c.outcome, CheckpointOutcome::Cancelled);
            assert_eq!(c.summary, Summary::Skipped);
        }

        // After a completed frame nothing is pending, so a cancel leaves
        // the recorded checkpoints untouched.
        p.run_frame(1).unwrap();
        p.cancel();
        assert!(
            p.checkpoints()
                .iter()
                .all(|c| c.outcome == CheckpointOutcome::Passed)
        );
    }

    #[test]
    fn status_reports_all_four_layers() {
        let mut p = builder(16, 8).build().unwrap();
        p.run_frame(1).unwrap();
        let status = p.status();
        assert_eq!(status.len(), 4);
        assert!(status[0].starts_with("PanelLayer:"));
        assert!(status[3].starts_with("HostLayer:"));
    }

    #[test]
    fn checkerboard_survives_the_full_path() {
        let mut p = PipelineBuilder::new()
            .panel(PanelConfig {
                width: 32,
                height: 32,
                pattern: Pattern::Checkerboard,
                ..Default::default()
            })
            .build()
            .unwrap();
        let r = p.run_frame(1).unwrap();
        assert!(r.success);
        let f = r.final_frame.unwrap();
        assert_eq!(f.pixel(0, 0), 0xffff);
        assert_eq!(f.pixel(0, 1), 0);
    }
}
