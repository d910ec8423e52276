//! Sample stream driver
//!
//! The outer loop of the demodulator: pull one block of magnitudes from the
//! source, resample to the working rate, slice N phase-shifted Manchester
//! bit streams and push them through the demod core. Two overlaps carry
//! state between blocks: one input sample for the resampler lookahead and
//! half a symbol of working-rate samples for the Manchester comparison.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::demod::DemodCore;
use crate::input::{BlockStatus, MagnitudeSource};
use crate::rate::RateConfig;
use crate::registers::RegisterBank;
use crate::resample::Resampler;

pub struct SampleStream<B: RegisterBank> {
    rate: RateConfig,
    resampler: Resampler,
    demod: DemodCore<B>,
    shutdown: Arc<AtomicBool>,
}

impl<B: RegisterBank> SampleStream<B> {
    pub fn new(rate: RateConfig, demod: DemodCore<B>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            resampler: Resampler::new(rate.p, rate.q),
            rate,
            demod,
            shutdown,
        }
    }

    pub fn demod(&self) -> &DemodCore<B> {
        &self.demod
    }

    /// Drain the source until EOF or shutdown. The shutdown flag is looked
    /// at once per block; the inner loops run free.
    pub fn run<S: MagnitudeSource>(&mut self, source: &mut S) -> io::Result<()> {
        let n = self.rate.num_streams;
        let half = self.rate.half_symbol();
        let input_block = self.rate.input_block();
        let sample_block = self.rate.sample_block();

        // one input sample of resampler lookahead in front of the fresh data
        let mut mag = vec![0.0f32; 1 + input_block];
        // half a symbol of history in front of the fresh working samples
        let mut samples = vec![0.0f32; half + sample_block];
        let mut bits = vec![0u64; n];

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                debug!("shutdown requested, leaving stream loop");
                break;
            }

            let status = source.read_magnitude(&mut mag[1..])?;
            if status == BlockStatus::Eof {
                break;
            }

            self.resampler
                .resample(&mag, &mut samples[half..], self.rate.blocks_per_chunk());

            for i in (0..sample_block).step_by(n) {
                for (j, bit) in bits.iter_mut().enumerate() {
                    *bit = (samples[i + j] > samples[i + j + half]) as u64;
                }
                self.demod.shift_in_new_bits(&bits);
            }

            mag[0] = mag[input_block];
            let tail = sample_block..sample_block + half;
            samples.copy_within(tail, 0);

            if status == BlockStatus::LastBlock {
                break;
            }
        }

        source.close();
        self.demod.stats().report_final();
        Ok(())
    }
}
