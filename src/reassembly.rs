/*! Shared frame reassembly: presence bitmap plus segment copy.

Both receivers in the pipeline rebuild a frame from fixed-size segments
that can arrive out of order: the MCU from CSI-2 lines, the host from UDP
pixel chunks. This tracker owns the pixel buffer and one presence bit per
expected segment. The bitmap is sized from the segment count at run time;
production frame heights go well past 64 lines, so a fixed-width word is
not an option here.
*/
use bitvec::prelude::*;

use crate::{Error, Result};

/// Bitmap-backed reassembly buffer.
#[derive(Clone, Debug)]
pub struct FrameReassembler {
    frame_id: u32,
    segment_len: usize,
    buffer: Vec<u8>,
    present: BitVec,
}

impl FrameReassembler {
    /// Create a tracker expecting `segments` segments of `segment_len`
    /// bytes each (the final segment may be shorter), filling a buffer of
    /// `buffer_len` bytes.
    pub fn new(frame_id: u32, segments: usize, segment_len: usize, buffer_len: usize) -> Result<Self> {
        if segments == 0 || segment_len == 0 || buffer_len == 0 {
            return Err(Error::InvalidConfig(format!(
                "degenerate reassembly geometry: {segments} x {segment_len} -> {buffer_len}"
            )));
        }
        // Geometry must be consistent: all segments fit, and the segment
        // grid covers the whole buffer.
        if segment_len * (segments - 1) >= buffer_len || segment_len * segments < buffer_len {
            return Err(Error::InvalidConfig(format!(
                "segment grid {segments} x {segment_len} does not cover buffer of {buffer_len}"
            )));
        }
        Ok(Self {
            frame_id,
            segment_len,
            buffer: vec![0; buffer_len],
            present: bitvec![0; segments],
        })
    }

    /// Frame this tracker is assembling.
    #[must_use]
    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    /// Expected segment count.
    #[must_use]
    pub fn segments(&self) -> usize {
        self.present.len()
    }

    /// Segments received and validated so far.
    #[must_use]
    pub fn received(&self) -> usize {
        self.present.count_ones()
    }

    /// Segments still missing.
    #[must_use]
    pub fn missing(&self) -> usize {
        self.present.count_zeros()
    }

    /// True once every presence bit is set.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.present.all()
    }

    /// Whether a specific segment has been received.
    #[must_use]
    pub fn has(&self, index: usize) -> bool {
        self.present.get(index).map(|b| *b).unwrap_or(false)
    }

    /// Copy one validated segment into place and set its presence bit.
    ///
    /// Returns `Ok(true)` if the segment was new, `Ok(false)` for an exact
    /// duplicate (dropped idempotently, state unchanged). The segment must
    /// be full-length unless it is the final one, which must land exactly
    /// on the end of the buffer.
    pub fn insert(&mut self, index: usize, data: &[u8]) -> Result<bool> {
        let segments = self.segments();
        if index >= segments {
            return Err(Error::UnexpectedPacket(format!(
                "segment {index} out of range ({segments} expected)"
            )));
        }
        let offset = index * self.segment_len;
        let want = if index == segments - 1 {
            self.buffer.len() - offset
        } else {
            self.segment_len
        };
        if data.len() != want {
            return Err(Error::InvalidPacket(format!(
                "segment {index} has {} bytes, want {want}",
                data.len()
            )));
        }
        if self.has(index) {
            return Ok(false);
        }
        self.buffer[offset..offset + data.len()].copy_from_slice(data);
        self.present.set(index, true);
        Ok(true)
    }

    /// Take the buffer. Missing segments stay zero-filled.
    #[must_use]
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_geometry() {
        assert!(FrameReassembler::new(0, 0, 4, 16).is_err());
        assert!(FrameReassembler::new(0, 4, 0, 16).is_err());
        // Grid smaller than buffer.
        assert!(FrameReassembler::new(0, 3, 4, 16).is_err());
        // One whole trailing segment empty.
        assert!(FrameReassembler::new(0, 5, 4, 16).is_err());
    }

    #[test]
    fn out_of_order_completion() {
        let mut asm = FrameReassembler::new(9, 4, 2, 8).unwrap();
        assert!(asm.insert(3, &[7, 8]).unwrap());
        assert!(asm.insert(0, &[1, 2]).unwrap());
        assert!(asm.insert(2, &[5, 6]).unwrap());
        assert!(!asm.is_complete());
        assert_eq!(asm.missing(), 1);
        assert!(asm.insert(1, &[3, 4]).unwrap());
        assert!(asm.is_complete());
        assert_eq!(asm.into_buffer(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn duplicates_are_idempotent() {
        let mut asm = FrameReassembler::new(0, 2, 2, 4).unwrap();
        assert!(asm.insert(0, &[1, 2]).unwrap());
        // A replay with different content must not overwrite.
        assert!(!asm.insert(0, &[9, 9]).unwrap());
        assert_eq!(asm.received(), 1);
        asm.insert(1, &[3, 4]).unwrap();
        assert_eq!(asm.into_buffer(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn short_final_segment() {
        let mut asm = FrameReassembler::new(0, 3, 4, 10).unwrap();
        asm.insert(0, &[0; 4]).unwrap();
        asm.insert(1, &[0; 4]).unwrap();
        assert!(asm.insert(2, &[0; 4]).is_err());
        assert!(asm.insert(2, &[1, 2]).unwrap());
        assert!(asm.is_complete());
    }

    #[test]
    fn wrong_length_segment_rejected() {
        let mut asm = FrameReassembler::new(0, 4, 4, 16).unwrap();
        assert!(asm.insert(0, &[0; 3]).is_err());
        assert!(asm.insert(0, &[0; 5]).is_err());
        assert_eq!(asm.received(), 0);
    }

    #[test]
    fn out_of_range_segment_rejected() {
        let mut asm = FrameReassembler::new(0, 4, 4, 16).unwrap();
        assert!(matches!(
            asm.insert(4, &[0; 4]),
            Err(Error::UnexpectedPacket(_))
        ));
    }

    #[test]
    fn bitmap_scales_past_64_segments() {
        let segments = 2048;
        let mut asm = FrameReassembler::new(0, segments, 2, segments * 2).unwrap();
        for i in (0..segments).rev() {
            let b = (i & 0xff) as u8;
            assert!(asm.insert(i, &[b, b]).unwrap());
        }
        assert!(asm.is_complete());
        assert_eq!(asm.received(), segments);
        let buf = asm.into_buffer();
        assert_eq!(buf[2 * 1234], (1234 & 0xff) as u8);
    }

    #[test]
    fn missing_segments_zero_filled() {
        let mut asm = FrameReassembler::new(0, 3, 2, 6).unwrap();
        asm.insert(1, &[5, 6]).unwrap();
        assert_eq!(asm.into_buffer(), vec![0, 0, 5, 6, 0, 0]);
    }
}
