//! Magnitude block sources
//!
//! Fills fixed-size magnitude blocks from either a synchronous byte stream
//! (stdin or a file, for tests) or the ring buffer fed by a capture device.
//! Raw bytes are decoded per the configured format, pushed through the I/Q
//! pipeline, and come out as one f32 magnitude per sample.

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};

use crate::pipeline::{IqPipeline, MagnitudeLut, RawFormat};
use crate::ring::RingReader;

/// What a source produced for the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// A full block; more may follow.
    More,
    /// A final block, zero-padded past the end of the input.
    LastBlock,
    /// Nothing left; the output block was not touched.
    Eof,
}

/// Decodes one raw block into magnitudes, keeping the pipeline state.
pub struct SampleConverter {
    format: RawFormat,
    pipeline: IqPipeline,
    /// Fast path for uint8 I/Q with an empty pipeline.
    lut: Option<MagnitudeLut>,
    u16_buf: Vec<u16>,
    f32_buf: Vec<f32>,
}

impl SampleConverter {
    pub fn new(format: RawFormat, pipeline: IqPipeline, block_samples: usize) -> Self {
        let lut = if format == RawFormat::IqUint8 && pipeline.is_passthrough() {
            Some(MagnitudeLut::new())
        } else {
            None
        };
        let elems = block_samples * format.elements_per_sample();
        Self {
            format,
            pipeline,
            lut,
            u16_buf: vec![0; elems],
            f32_buf: vec![0.0; elems],
        }
    }

    /// Raw bytes per magnitude block.
    pub fn bytes_per_block(&self, block_samples: usize) -> usize {
        block_samples * self.format.elements_per_sample() * self.format.element_size()
    }

    pub fn describe(&self) -> String {
        format!("{:?}, pipeline: {}", self.format, self.pipeline.describe())
    }

    /// Decode a full raw block. `bytes` must hold exactly the bytes of
    /// `out.len()` samples.
    pub fn convert(&mut self, bytes: &[u8], out: &mut [f32]) {
        debug_assert_eq!(bytes.len(), self.bytes_per_block(out.len()));
        match self.format {
            RawFormat::IqUint8 => {
                if let Some(lut) = &self.lut {
                    for (pair, m) in bytes.chunks_exact(2).zip(out.iter_mut()) {
                        *m = lut.lookup(pair[0], pair[1]);
                    }
                } else {
                    for (pair, m) in bytes.chunks_exact(2).zip(out.iter_mut()) {
                        let i = crate::pipeline::convert_u8(pair[0]);
                        let q = crate::pipeline::convert_u8(pair[1]);
                        *m = self.pipeline.process(i, q);
                    }
                }
            }
            RawFormat::IqUint16 | RawFormat::IqUint16RealRaw => {
                let vals = &mut self.u16_buf[..out.len() * 2];
                LittleEndian::read_u16_into(bytes, vals);
                for (pair, m) in vals.chunks_exact(2).zip(out.iter_mut()) {
                    let i = crate::pipeline::convert_u16(pair[0]);
                    let q = crate::pipeline::convert_u16(pair[1]);
                    *m = self.pipeline.process(i, q);
                }
            }
            RawFormat::IqFloat32 => {
                let vals = &mut self.f32_buf[..out.len() * 2];
                LittleEndian::read_f32_into(bytes, vals);
                for (pair, m) in vals.chunks_exact(2).zip(out.iter_mut()) {
                    *m = self.pipeline.process(pair[0], pair[1]);
                }
            }
            RawFormat::MagFloat32 => {
                LittleEndian::read_f32_into(bytes, out);
            }
        }
    }
}

/// A magnitude source the sample stream can drain block by block.
pub trait MagnitudeSource {
    /// Fill `out` with the next block of magnitudes.
    fn read_magnitude(&mut self, out: &mut [f32]) -> std::io::Result<BlockStatus>;

    /// The stream loop is leaving; release anything a producer might be
    /// blocked on.
    fn close(&mut self) {}
}

/// Synchronous source: reads the raw stream inline, no second thread.
pub struct StreamSource<R: Read> {
    reader: R,
    converter: SampleConverter,
    raw: Vec<u8>,
}

impl<R: Read> StreamSource<R> {
    pub fn new(reader: R, converter: SampleConverter, block_samples: usize) -> Self {
        let bytes = converter.bytes_per_block(block_samples);
        Self {
            reader,
            converter,
            raw: vec![0; bytes],
        }
    }
}

impl<R: Read> MagnitudeSource for StreamSource<R> {
    fn read_magnitude(&mut self, out: &mut [f32]) -> std::io::Result<BlockStatus> {
        let mut total = 0;
        while total < self.raw.len() {
            match self.reader.read(&mut self.raw[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if total == 0 {
            return Ok(BlockStatus::Eof);
        }
        if total < self.raw.len() {
            // Zero the tail so the register banks do not chew on stale
            // bytes and re-announce old messages.
            self.raw[total..].fill(0);
            self.converter.convert(&self.raw, out);
            return Ok(BlockStatus::LastBlock);
        }
        self.converter.convert(&self.raw, out);
        Ok(BlockStatus::More)
    }
}

/// Asynchronous source: drains whole blocks the device thread committed to
/// the ring buffer.
pub struct RingSource {
    reader: RingReader<u8>,
    converter: SampleConverter,
}

impl RingSource {
    pub fn new(reader: RingReader<u8>, converter: SampleConverter) -> Self {
        Self { reader, converter }
    }
}

impl MagnitudeSource for RingSource {
    fn read_magnitude(&mut self, out: &mut [f32]) -> std::io::Result<BlockStatus> {
        if self.reader.eof() {
            return Ok(BlockStatus::Eof);
        }
        let converter = &mut self.converter;
        self.reader.process(|bytes| converter.convert(bytes, out));
        Ok(BlockStatus::More)
    }

    fn close(&mut self) {
        self.reader.shutdown();
    }
}
