//! Rate configuration
//!
//! The closed set of supported (input, working) sample rate pairs and the
//! geometry derived from each: the P:Q resampling ratio in lowest terms,
//! the stream count N, and the block sizes every buffer in the chain is cut
//! to. One runtime struct instead of a compile-time ladder; the values are
//! small integers and the inner loops never branch on them.

use crate::error::ConfigError;
use crate::pipeline::RawFormat;

/// Blocks per processing chunk; input blocks are P·(N/2) samples of this.
const BLOCKS_PER_CHUNK: usize = 256;

/// One supported rate pair with everything derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateConfig {
    /// Input sample rate in Hz.
    pub input_rate: u32,
    /// Working rate in Hz; a whole even multiple of 1 MHz.
    pub output_rate: u32,
    /// Input samples per resampling block (lowest terms).
    pub p: usize,
    /// Output samples per resampling block (lowest terms).
    pub q: usize,
    /// Parallel bit streams: working rate / 1 MHz.
    pub num_streams: usize,
    /// Default raw format when none is forced.
    pub default_format: RawFormat,
}

/// The supported pairs. Anything else is a configuration error.
pub const SUPPORTED: [(u32, u32); 6] = [
    (2_400_000, 8_000_000),
    (6_000_000, 6_000_000),
    (6_000_000, 12_000_000),
    (6_000_000, 24_000_000),
    (10_000_000, 10_000_000),
    (10_000_000, 24_000_000),
];

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl RateConfig {
    /// Look up a pair; rejects combinations outside the supported set.
    pub fn for_pair(input_rate: u32, output_rate: u32) -> Result<Self, ConfigError> {
        if !SUPPORTED
            .iter()
            .any(|&(i, o)| i == input_rate && o == output_rate)
        {
            return Err(ConfigError::UnsupportedRatePair(
                input_rate as f64 / 1e6,
                output_rate as f64 / 1e6,
            ));
        }
        let g = gcd(input_rate, output_rate);
        let num_streams = (output_rate / 1_000_000) as usize;
        Ok(Self {
            input_rate,
            output_rate,
            p: (input_rate / g) as usize,
            q: (output_rate / g) as usize,
            num_streams,
            default_format: if input_rate < 6_000_000 {
                RawFormat::IqUint8
            } else {
                RawFormat::IqUint16
            },
        })
    }

    /// The first supported working rate for an input rate.
    pub fn default_output_rate(input_rate: u32) -> Result<u32, ConfigError> {
        SUPPORTED
            .iter()
            .find(|&&(i, _)| i == input_rate)
            .map(|&(_, o)| o)
            .ok_or(ConfigError::NoOutputRate(input_rate as f64 / 1e6))
    }

    /// Half a symbol at the working rate: the Manchester comparison span
    /// and the sample-buffer overlap.
    pub fn half_symbol(&self) -> usize {
        self.num_streams / 2
    }

    /// Fresh input samples per chunk.
    pub fn input_block(&self) -> usize {
        self.p * BLOCKS_PER_CHUNK * self.half_symbol()
    }

    /// Fresh working-rate samples per chunk.
    pub fn sample_block(&self) -> usize {
        self.q * BLOCKS_PER_CHUNK * self.half_symbol()
    }

    /// Resampling blocks per chunk.
    pub fn blocks_per_chunk(&self) -> usize {
        BLOCKS_PER_CHUNK * self.half_symbol()
    }

    pub fn is_passthrough(&self) -> bool {
        self.p == self.q
    }
}

/// Render the supported table for help output.
pub fn describe_supported() -> String {
    let mut out = String::from("Supported sample rate combinations:\n");
    for (i, o) in SUPPORTED {
        let fmt = if i < 6_000_000 { "uint8 IQ" } else { "uint16 IQ" };
        out.push_str(&format!(
            "  {:>4} -> {:>2} ({})\n",
            i as f64 / 1e6,
            o / 1_000_000,
            fmt
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_pairs_resolve() {
        let rc = RateConfig::for_pair(2_400_000, 8_000_000).expect("supported");
        assert_eq!((rc.p, rc.q), (3, 10));
        assert_eq!(rc.num_streams, 8);
        assert_eq!(rc.default_format, RawFormat::IqUint8);

        let rc = RateConfig::for_pair(6_000_000, 12_000_000).expect("supported");
        assert_eq!((rc.p, rc.q), (1, 2));
        assert_eq!(rc.num_streams, 12);
        assert_eq!(rc.default_format, RawFormat::IqUint16);

        let rc = RateConfig::for_pair(10_000_000, 10_000_000).expect("supported");
        assert!(rc.is_passthrough());
        assert_eq!(rc.num_streams, 10);
    }

    #[test]
    fn unsupported_pairs_are_rejected() {
        assert!(RateConfig::for_pair(2_400_000, 6_000_000).is_err());
        assert!(RateConfig::for_pair(8_000_000, 8_000_000).is_err());
        assert!(RateConfig::for_pair(3_000_000, 6_000_000).is_err());
    }

    #[test]
    fn default_output_rate_picks_first_match() {
        assert_eq!(RateConfig::default_output_rate(6_000_000).unwrap(), 6_000_000);
        assert_eq!(RateConfig::default_output_rate(2_400_000).unwrap(), 8_000_000);
        assert!(RateConfig::default_output_rate(5_000_000).is_err());
    }

    #[test]
    fn block_geometry_is_consistent() {
        for (i, o) in SUPPORTED {
            let rc = RateConfig::for_pair(i, o).expect("supported");
            // the resampler consumes P and produces Q per block
            assert_eq!(rc.input_block(), rc.p * rc.blocks_per_chunk());
            assert_eq!(rc.sample_block(), rc.q * rc.blocks_per_chunk());
            // the Manchester loop walks the sample block N bits at a time
            assert_eq!(rc.sample_block() % rc.num_streams, 0);
            // N must be even for the half-symbol comparison
            assert_eq!(rc.num_streams % 2, 0);
        }
    }
}
