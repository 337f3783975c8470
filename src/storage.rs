/*! Storage writers for reassembled frames.

Two container formats are supported: raw little-endian pixel dumps, and
single-strip grayscale TIFF 6.0. The writers are deliberately minimal; the
contract is byte-identical output for identical frames, so round-trip
golden tests stay meaningful.
*/
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;

use crate::Result;
use crate::frame::Frame;

/// A storage collaborator the host hands finished frames to.
pub trait FrameWriter {
    /// Write one frame to `path`, replacing any existing file.
    fn write(&mut self, frame: &Frame, path: &Path) -> Result<()>;

    /// Conventional file extension for this container.
    fn extension(&self) -> &'static str;
}

/// Raw writer: exactly `rows * cols * 2` bytes, row-major little-endian.
#[derive(Debug, Default)]
pub struct RawWriter;

impl FrameWriter for RawWriter {
    fn write(&mut self, frame: &Frame, path: &Path) -> Result<()> {
        debug!("writing raw frame {} to {}", frame.frame_number(), path.display());
        let mut f = BufWriter::new(std::fs::File::create(path)?);
        f.write_all(&frame.to_le_bytes())?;
        f.flush()?;
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "raw"
    }
}

// TIFF structure constants. The IFD is written at a fixed offset with a
// fixed entry count, so every offset below is knowable up front.
const TIFF_IFD_OFFSET: u32 = 8;
const TIFF_ENTRY_COUNT: u16 = 12;
// 8-byte header + count + 12 entries + next-IFD pointer.
const TIFF_XRES_OFFSET: u32 = 8 + 2 + 12 * TIFF_ENTRY_COUNT as u32 + 4;
const TIFF_YRES_OFFSET: u32 = TIFF_XRES_OFFSET + 8;
const TIFF_STRIP_OFFSET: u32 = TIFF_YRES_OFFSET + 8;

const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

fn ifd_entry(out: &mut Vec<u8>, tag: u16, typ: u16, value: u32) {
    out.extend(tag.to_le_bytes());
    out.extend(typ.to_le_bytes());
    out.extend(1u32.to_le_bytes());
    out.extend(value.to_le_bytes());
}

/// TIFF 6.0 writer: little-endian, single strip, grayscale 16-bit, twelve
/// IFD entries.
#[derive(Debug, Default)]
pub struct TiffWriter;

impl FrameWriter for TiffWriter {
    fn write(&mut self, frame: &Frame, path: &Path) -> Result<()> {
        debug!(
            "writing tiff frame {} to {}",
            frame.frame_number(),
            path.display()
        );
        let width = frame.width();
        let height = frame.height();
        let strip_bytes = width * height * 2;

        let mut out = Vec::with_capacity(TIFF_STRIP_OFFSET as usize + strip_bytes as usize);
        // Header: little-endian marker, magic 42, first IFD offset.
        out.extend(b"II");
        out.extend(42u16.to_le_bytes());
        out.extend(TIFF_IFD_OFFSET.to_le_bytes());

        out.extend(TIFF_ENTRY_COUNT.to_le_bytes());
        // Entries in ascending tag order, as TIFF 6.0 requires.
        ifd_entry(&mut out, 256, TYPE_LONG, width); // ImageWidth
        ifd_entry(&mut out, 257, TYPE_LONG, height); // ImageLength
        ifd_entry(&mut out, 258, TYPE_SHORT, 16); // BitsPerSample
        ifd_entry(&mut out, 259, TYPE_SHORT, 1); // Compression: none
        ifd_entry(&mut out, 262, TYPE_SHORT, 1); // Photometric: BlackIsZero
        ifd_entry(&mut out, 273, TYPE_LONG, TIFF_STRIP_OFFSET); // StripOffsets
        ifd_entry(&mut out, 277, TYPE_SHORT, 1); // SamplesPerPixel
        ifd_entry(&mut out, 278, TYPE_LONG, height); // RowsPerStrip
        ifd_entry(&mut out, 279, TYPE_LONG, strip_bytes); // StripByteCounts
        ifd_entry(&mut out, 282, TYPE_RATIONAL, TIFF_XRES_OFFSET); // XResolution
        ifd_entry(&mut out, 283, TYPE_RATIONAL, TIFF_YRES_OFFSET); // YResolution
        ifd_entry(&mut out, 296, TYPE_SHORT, 2); // ResolutionUnit: inch
        out.extend(0u32.to_le_bytes()); // no next IFD

        // 72 dpi, both axes.
        for _ in 0..2 {
            out.extend(72u32.to_le_bytes());
            out.extend(1u32.to_le_bytes());
        }
        out.extend(frame.to_le_bytes());

        let mut f = BufWriter::new(std::fs::File::create(path)?);
        f.write_all(&out)?;
        f.flush()?;
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "tiff"
    }
}
