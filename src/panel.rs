/*! Panel layer: deterministic pixel generation.

The panel is the source of the pipeline. Given a configuration it produces
[`Frame`]s whose content is fully determined by `(pattern, seed,
frame_number)`, so any two runs with the same configuration are bit
identical. That determinism is what makes the downstream bit-exactness
checks meaningful.
*/
use itertools::Itertools;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::{Frame, validate_bit_depth};
use crate::layer::{Layer, LayerStats};
use crate::{Error, Result};

/// Pixel pattern generated by the panel.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Pattern {
    /// `pixel(r, c) = (r * width + c) mod 2^bit_depth`. Bit-exact, used
    /// for integrity tests.
    Counter,
    /// Alternating `max_value` / 0.
    Checkerboard,
    /// Constant baseline, optionally with Gaussian noise.
    FlatField {
        /// Value every pixel starts from.
        baseline: u16,
    },
}

/// Panel configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PanelConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in lines.
    pub height: u32,
    /// Pixel bit depth, one of 8/10/12/14/16.
    pub bit_depth: u8,
    /// Generated pattern.
    pub pattern: Pattern,
    /// Seed for the noise and defect streams.
    pub seed: u64,
    /// Gaussian noise sigma for `FlatField`; 0 disables noise.
    pub noise_sigma: f64,
    /// Per-pixel probability of a dead (zero) pixel.
    pub defect_rate: f64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            bit_depth: 16,
            pattern: Pattern::Counter,
            seed: 0,
            noise_sigma: 0.0,
            defect_rate: 0.0,
        }
    }
}

// Noise and defects draw from separate streams so that defect positions
// depend only on (seed, defect_rate).
const NOISE_STREAM: u64 = 0;
const DEFECT_STREAM: u64 = 0x5eed_0000_0000_0001;

fn stream_rng(seed: u64, frame_number: u32, stream: u64) -> StdRng {
    let mixed = seed
        ^ (frame_number as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ stream;
    StdRng::seed_from_u64(mixed)
}

// Box-Muller transform. One sample per call is plenty here.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Pixel-generating source layer.
pub struct PanelLayer {
    config: PanelConfig,
    max_value: u16,
    stats: LayerStats,
}

impl PanelLayer {
    /// Create a panel from a validated configuration.
    pub fn new(config: PanelConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "zero dimension: {}x{}",
                config.width, config.height
            )));
        }
        validate_bit_depth(config.bit_depth)?;
        if !(0.0..=1.0).contains(&config.defect_rate) {
            return Err(Error::InvalidConfig(format!(
                "defect rate {} outside [0, 1]",
                config.defect_rate
            )));
        }
        if config.noise_sigma < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "negative noise sigma {}",
                config.noise_sigma
            )));
        }
        let max_value = ((1u32 << config.bit_depth) - 1) as u16;
        Ok(Self {
            config,
            max_value,
            stats: LayerStats::default(),
        })
    }

    /// The configuration this panel was built from.
    #[must_use]
    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Generate one frame. Deterministic per `(config, frame_number)`.
    pub fn generate(&mut self, frame_number: u32) -> Result<Frame> {
        let cfg = &self.config;
        let modulus = 1u64 << cfg.bit_depth;
        let max = self.max_value;
        let mut noise = stream_rng(cfg.seed, frame_number, NOISE_STREAM);

        let mut pixels: Vec<u16> = (0..cfg.height)
            .cartesian_product(0..cfg.width)
            .map(|(r, c)| match cfg.pattern {
                Pattern::Counter => {
                    ((r as u64 * cfg.width as u64 + c as u64) % modulus) as u16
                }
                Pattern::Checkerboard => {
                    if (r + c) & 1 == 0 {
                        max
                    } else {
                        0
                    }
                }
                Pattern::FlatField { baseline } => {
                    if cfg.noise_sigma > 0.0 {
                        let v = baseline as f64 + gaussian(&mut noise) * cfg.noise_sigma;
                        v.clamp(0.0, max as f64).round() as u16
                    } else {
                        baseline.min(max)
                    }
                }
            })
            .collect();

        if cfg.defect_rate > 0.0 {
            let mut defects = stream_rng(cfg.seed, frame_number, DEFECT_STREAM);
            let mut count = 0usize;
            for p in &mut pixels {
                if defects.random::<f64>() < cfg.defect_rate {
                    *p = 0;
                    count += 1;
                }
            }
            debug!("frame {frame_number}: injected {count} defect pixels");
        }

        self.stats.frames_received += 1;
        Frame::new(frame_number, cfg.width, cfg.height, pixels)
    }
}

impl Layer for PanelLayer {
    type Input = u32;
    type Output = Frame;

    fn layer_name(&self) -> &'static str {
        "PanelLayer"
    }

    fn process(&mut self, frame_number: u32) -> Result<Frame> {
        self.generate(frame_number)
    }

    fn reset(&mut self) {
        self.stats = LayerStats::default();
    }

    fn stats(&self) -> LayerStats {
        self.stats
    }
}
