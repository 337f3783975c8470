/*! Frame and line values moved through the pipeline.

A [`Frame`] is one complete 2-D pixel array; a [`Line`] is one row of it,
the unit of CSI-2 long-packet payload. Both are immutable after
construction: layers build new values instead of patching old ones, and
ownership moves forward through the pipeline.
*/
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Bit depths the panel hardware supports.
pub const SUPPORTED_BIT_DEPTHS: [u8; 5] = [8, 10, 12, 14, 16];

/// Validate a configured bit depth.
pub fn validate_bit_depth(bit_depth: u8) -> Result<()> {
    if SUPPORTED_BIT_DEPTHS.contains(&bit_depth) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "bit depth {bit_depth} not in {SUPPORTED_BIT_DEPTHS:?}"
        )))
    }
}

/// One complete pixel frame at a fixed resolution.
///
/// Invariants enforced at construction: `width > 0`, `height > 0`,
/// `pixels.len() == width * height` (row-major).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    frame_number: u32,
    width: u32,
    height: u32,
    pixels: Vec<u16>,
}

impl Frame {
    /// Create a frame, validating the dimension invariants.
    pub fn new(frame_number: u32, width: u32, height: u32, pixels: Vec<u16>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!(
                "zero dimension: {width}x{height}"
            )));
        }
        let want = width as usize * height as usize;
        if pixels.len() != want {
            return Err(Error::InvalidFrame(format!(
                "pixel count {} does not match {width}x{height} = {want}",
                pixels.len()
            )));
        }
        Ok(Self {
            frame_number,
            width,
            height,
            pixels,
        })
    }

    /// Frame sequence number.
    #[must_use]
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in lines.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// All pixels, row-major.
    #[must_use]
    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    /// One pixel. Panics if out of range, like slice indexing.
    #[must_use]
    pub fn pixel(&self, row: u32, col: u32) -> u16 {
        assert!(row < self.height && col < self.width);
        self.pixels[row as usize * self.width as usize + col as usize]
    }

    /// One row as a [`Line`].
    pub fn line(&self, line_number: u32) -> Result<Line> {
        if line_number >= self.height {
            return Err(Error::InvalidFrame(format!(
                "line {line_number} out of range for height {}",
                self.height
            )));
        }
        let w = self.width as usize;
        let start = line_number as usize * w;
        Line::new(
            self.frame_number,
            line_number,
            self.height,
            self.pixels[start..start + w].to_vec(),
        )
    }

    /// Serialize all pixels little-endian, row-major.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 2);
        for p in &self.pixels {
            out.extend(p.to_le_bytes());
        }
        out
    }

    /// Rebuild a frame from the little-endian byte stream produced by
    /// [`Frame::to_le_bytes`].
    pub fn from_le_bytes(frame_number: u32, width: u32, height: u32, data: &[u8]) -> Result<Self> {
        let want = width as usize * height as usize * 2;
        if data.len() != want {
            return Err(Error::InvalidFrame(format!(
                "byte count {} does not match {width}x{height}x2 = {want}",
                data.len()
            )));
        }
        let pixels = data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Self::new(frame_number, width, height, pixels)
    }

    /// SHA-256 of the little-endian pixel bytes, as lowercase hex.
    ///
    /// Used for checkpoint summaries and golden-hash comparisons.
    #[must_use]
    pub fn pixel_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for p in &self.pixels {
            hasher.update(p.to_le_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// One row of a frame.
///
/// Invariants: `line_number < height` of the frame it came from, pixels
/// non-empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    frame_number: u32,
    line_number: u32,
    pixels: Vec<u16>,
}

impl Line {
    /// Create a line, validating against the owning frame's height.
    pub fn new(frame_number: u32, line_number: u32, height: u32, pixels: Vec<u16>) -> Result<Self> {
        if line_number >= height {
            return Err(Error::InvalidFrame(format!(
                "line {line_number} out of range for height {height}"
            )));
        }
        if pixels.is_empty() {
            return Err(Error::InvalidFrame("empty line".into()));
        }
        Ok(Self {
            frame_number,
            line_number,
            pixels,
        })
    }

    /// Frame this line belongs to.
    #[must_use]
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// Row index within the frame.
    #[must_use]
    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    /// Pixels of this row.
    #[must_use]
    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    /// Serialize the row's pixels little-endian.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 2);
        for p in &self.pixels {
            out.extend(p.to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        assert!(Frame::new(0, 0, 4, vec![]).is_err());
        assert!(Frame::new(0, 4, 0, vec![]).is_err());
    }

    #[test]
    fn rejects_pixel_count_mismatch() {
        assert!(Frame::new(0, 2, 2, vec![0; 3]).is_err());
        assert!(Frame::new(0, 2, 2, vec![0; 5]).is_err());
        assert!(Frame::new(0, 2, 2, vec![0; 4]).is_ok());
    }

    #[test]
    fn bit_depths() {
        for d in SUPPORTED_BIT_DEPTHS {
            validate_bit_depth(d).unwrap();
        }
        for d in [0, 1, 7, 9, 11, 13, 15, 17, 24, 32] {
            assert!(validate_bit_depth(d).is_err(), "depth {d}");
        }
    }

    #[test]
    fn le_bytes_round_trip() {
        let f = Frame::new(7, 3, 2, vec![0x0102, 0x0304, 0xfffe, 0, 1, 0x8000]).unwrap();
        let bytes = f.to_le_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..4], &[0x02, 0x01, 0x04, 0x03]);
        let back = Frame::from_le_bytes(7, 3, 2, &bytes).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn line_extraction() {
        let f = Frame::new(1, 2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let l = f.line(1).unwrap();
        assert_eq!(l.line_number(), 1);
        assert_eq!(l.pixels(), &[3, 4]);
        assert!(f.line(3).is_err());
    }

    #[test]
    fn pixel_hash_is_stable_and_content_sensitive() {
        let a = Frame::new(1, 2, 2, vec![1, 2, 3, 4]).unwrap();
        let b = Frame::new(9, 2, 2, vec![1, 2, 3, 4]).unwrap();
        let c = Frame::new(1, 2, 2, vec![1, 2, 3, 5]).unwrap();
        // Hash covers pixels only, not the frame number.
        assert_eq!(a.pixel_hash(), b.pixel_hash());
        assert_ne!(a.pixel_hash(), c.pixel_hash());
        assert_eq!(a.pixel_hash().len(), 64);
    }
}
