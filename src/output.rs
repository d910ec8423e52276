//! Frame output
//!
//! Formats detected frames for downstream consumers. The ASCII form is one
//! line per message, `@` + 12 hex digits of 12 MHz timestamp + the frame in
//! hex + `;`. The binary form is a fixed 24-byte little-endian record:
//! low 64 frame bits, high 48 frame bits, wall-clock milliseconds.

use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::demod::DetectedFrame;
use crate::modes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Ascii,
    Binary,
}

pub struct OutputWriter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn write_frame(&mut self, frame: &DetectedFrame) -> io::Result<()> {
        match self.format {
            OutputFormat::Ascii => self.write_ascii(frame),
            OutputFormat::Binary => self.write_binary(frame, wall_clock_ms()),
        }
    }

    fn write_ascii(&mut self, frame: &DetectedFrame) -> io::Result<()> {
        match frame {
            DetectedFrame::Short { frame, t12 } => {
                writeln!(
                    self.out,
                    "@{:012X}{};",
                    t12 & 0xFFFF_FFFF_FFFF,
                    modes::format_short(*frame)
                )?;
            }
            DetectedFrame::Long { frame, t12 } => {
                writeln!(
                    self.out,
                    "@{:012X}{};",
                    t12 & 0xFFFF_FFFF_FFFF,
                    modes::format_long(frame)
                )?;
            }
        }
        self.out.flush()
    }

    fn write_binary(&mut self, frame: &DetectedFrame, wall_ms: u64) -> io::Result<()> {
        let (lo, hi) = match frame {
            DetectedFrame::Short { frame, .. } => (frame & modes::SHORT_FRAME_MASK, 0u64),
            DetectedFrame::Long { frame, .. } => (frame.lo, frame.hi & modes::LONG_FRAME_MASK_HI),
        };
        let mut record = [0u8; 24];
        record[..8].copy_from_slice(&lo.to_le_bytes());
        record[8..16].copy_from_slice(&hi.to_le_bytes());
        record[16..].copy_from_slice(&wall_ms.to_le_bytes());
        self.out.write_all(&record)?;
        self.out.flush()
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::tests::{frame_from_bytes, GOOD_DF17};

    #[test]
    fn ascii_long_line() {
        let mut writer = OutputWriter::new(Vec::new(), OutputFormat::Ascii);
        let frame = frame_from_bytes(&GOOD_DF17);
        writer
            .write_frame(&DetectedFrame::Long { frame, t12: 0x1234 })
            .expect("write");
        assert_eq!(
            String::from_utf8(writer.out).expect("utf8"),
            "@0000000012348D4840D6202CC371C32CE0576098;\n"
        );
    }

    #[test]
    fn ascii_short_line() {
        let mut writer = OutputWriter::new(Vec::new(), OutputFormat::Ascii);
        writer
            .write_frame(&DetectedFrame::Short {
                frame: 0x5D_4840_D6AA_BBCC,
                t12: 1,
            })
            .expect("write");
        assert_eq!(
            String::from_utf8(writer.out).expect("utf8"),
            "@0000000000015D4840D6AABBCC;\n"
        );
    }

    #[test]
    fn ascii_timestamp_wraps_at_48_bits() {
        let mut writer = OutputWriter::new(Vec::new(), OutputFormat::Ascii);
        writer
            .write_frame(&DetectedFrame::Short {
                frame: 0,
                t12: 0x1_0000_0000_0001,
            })
            .expect("write");
        let line = String::from_utf8(writer.out).expect("utf8");
        assert!(line.starts_with("@000000000001"));
    }

    #[test]
    fn binary_record_layout() {
        let mut writer = OutputWriter::new(Vec::new(), OutputFormat::Binary);
        let frame = frame_from_bytes(&GOOD_DF17);
        writer
            .write_binary(&DetectedFrame::Long { frame, t12: 0 }, 0x0102_0304)
            .expect("write");
        let bytes = &writer.out;
        assert_eq!(bytes.len(), 24);
        assert_eq!(u64::from_le_bytes(bytes[..8].try_into().expect("8")), frame.lo);
        assert_eq!(
            u64::from_le_bytes(bytes[8..16].try_into().expect("8")),
            frame.hi & modes::LONG_FRAME_MASK_HI
        );
        assert_eq!(
            u64::from_le_bytes(bytes[16..].try_into().expect("8")),
            0x0102_0304
        );
    }

    #[test]
    fn binary_short_record_zeroes_the_high_lane() {
        let mut writer = OutputWriter::new(Vec::new(), OutputFormat::Binary);
        writer
            .write_binary(
                &DetectedFrame::Short {
                    frame: 0x12_3456_789A_BCDE,
                    t12: 0,
                },
                7,
            )
            .expect("write");
        let bytes = &writer.out;
        assert_eq!(
            u64::from_le_bytes(bytes[..8].try_into().expect("8")),
            0x12_3456_789A_BCDE
        );
        assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().expect("8")), 0);
    }

    #[test]
    fn frames_above_the_window_are_masked() {
        let mut writer = OutputWriter::new(Vec::new(), OutputFormat::Ascii);
        let mut frame = frame_from_bytes(&GOOD_DF17);
        frame.hi |= 0xFFFF_0000_0000_0000;
        writer
            .write_frame(&DetectedFrame::Long { frame, t12: 0 })
            .expect("write");
        let line = String::from_utf8(writer.out).expect("utf8");
        assert_eq!(line, "@0000000000008D4840D6202CC371C32CE0576098;\n");
    }
}
