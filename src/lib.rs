#![warn(missing_docs)]
/*! This crate provides a software simulator for the data path of an X-ray
detector panel system.

The real system moves pixel data from a detector panel through an FPGA
(CSI-2 packetization), an SoC (CSI-2 reassembly and 10 GbE streaming), and a
host workstation (UDP reassembly and storage). This simulator stands in for
all of that hardware during integration testing, so that the protocol
codecs, the reassembly logic, and the end-to-end bit-exactness can be
validated without a panel on the bench.

# Architecture overview

A simulation is a pipeline of layers. Each layer consumes the previous
layer's output, and the pipeline driver records a checkpoint at every
boundary:

```text
   [ PanelLayer: pixel generation ]
               ↓ Frame
   [ FpgaLayer: CSI-2 packetization ]
               ↓ CSI-2 packet stream (FS, lines + CRC, FE)
   [ McuLayer: CSI-2 reassembly + UDP fragmentation ]
               ↓ UDP datagrams (32-byte frame header + pixel chunk)
   [ HostLayer: UDP reassembly ]
               ↓ Frame
   [ Storage writer: TIFF / RAW ]
```

Layers implement the [`layer::Layer`] trait, and
[`pipeline::PipelineBuilder`] composes and drives them. Two CRC-16 variants
guard the wire formats, and control commands are authenticated with
HMAC-SHA256 ([`auth::AuthVerifier`]).

# Example

```
use panelsim::panel::{PanelConfig, Pattern};
use panelsim::pipeline::PipelineBuilder;

let mut pipeline = PipelineBuilder::new()
    .panel(PanelConfig {
        width: 64,
        height: 64,
        pattern: Pattern::Counter,
        ..Default::default()
    })
    .build()?;
let result = pipeline.run_frame(1)?;
assert!(result.success);
# Ok::<(), panelsim::Error>(())
```
*/

pub mod auth;
pub mod crc;
pub mod csi2;
pub mod fpga;
pub mod frame;
pub mod host;
pub mod layer;
pub mod mcu;
pub mod panel;
pub mod pipeline;
pub mod reassembly;
pub mod storage;
pub mod udp;

pub use crc::CrcKind;
pub use frame::{Frame, Line};
pub use layer::Layer;

/// Panelsim error.
///
/// Per-packet errors (`CrcMismatch`, `InvalidPacket`) are normally recovered
/// inside a layer by dropping the offending packet and counting it; they
/// only surface through this type when a caller asks a codec to decode a
/// single value. Per-call errors (`InvalidConfig`, `InvalidFrame`) halt the
/// current `process()`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration rejected before any processing (dimensions, bit depth,
    /// ports, thresholds).
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A frame value violates its own invariants.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A packet failed structural validation (magic, version, ECC).
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// CRC check failed, tagged with which of the two engines mismatched.
    #[error("{kind} CRC mismatch: want {want:#06x}, got {got:#06x}")]
    CrcMismatch {
        /// Which boundary's CRC failed.
        kind: CrcKind,
        /// CRC computed over the received bytes.
        want: u16,
        /// CRC carried by the packet.
        got: u16,
    },

    /// Protocol order violation, e.g. line data outside an FS/FE window.
    #[error("unexpected packet: {0}")]
    UnexpectedPacket(String),

    /// A reassembly slot's deadline elapsed before completion.
    #[error("frame {0} timed out during reassembly")]
    FrameTimeout(u32),

    /// Ring capacity exceeded; the oldest in-flight frame was dropped.
    #[error("frame ring full, dropped frame {0}")]
    BufferOverflow(u32),

    /// HMAC tag mismatch or missing.
    #[error("command authentication rejected")]
    AuthRejected,

    /// Error from the storage collaborator.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type commonly used in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
