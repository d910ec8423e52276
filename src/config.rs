//! Configuration and command-line argument parsing

use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::pipeline::RawFormat;
use crate::rate;

#[derive(Debug, Clone)]
pub struct Config {
    /// Input sample rate in Hz (required).
    pub input_rate: u32,
    /// Working rate in Hz; auto-selected from the input rate when absent.
    pub output_rate: Option<u32>,
    /// INI file naming and configuring the capture device. Without it the
    /// program reads the raw stream from stdin.
    pub device_config: Option<PathBuf>,
    /// Runtime-loaded FIR taps; overrides the built-in bank.
    pub taps_file: Option<PathBuf>,
    /// Enable the built-in FIR filter for the input rate.
    pub iq_filter: bool,
    /// Forced raw input format; the rate pair decides when absent.
    pub format: Option<RawFormat>,
    /// Binary output records instead of ASCII lines.
    pub binary: bool,
    /// Periodic statistics on the log.
    pub stats: bool,
    /// The DF11 fall-through for trusted senders (on unless disabled).
    pub df11_trust_elevation: bool,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_rate: 0,
            output_rate: None,
            device_config: None,
            taps_file: None,
            iq_filter: false,
            format: None,
            binary: false,
            stats: false,
            df11_trust_elevation: true,
            verbose: false,
        }
    }
}

impl Config {
    pub fn from_args() -> Result<Self, ConfigError> {
        Self::parse(env::args().skip(1))
    }

    fn parse<I: Iterator<Item = String>>(mut args: I) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let mut input_rate = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-s" => {
                    let raw = args.next().ok_or(ConfigError::MissingArgument("-s"))?;
                    input_rate = Some(parse_sample_rate(&raw)?);
                }
                "-u" => {
                    let raw = args.next().ok_or(ConfigError::MissingArgument("-u"))?;
                    config.output_rate = Some(parse_sample_rate(&raw)?);
                }
                "-d" => {
                    let raw = args.next().ok_or(ConfigError::MissingArgument("-d"))?;
                    config.device_config = Some(PathBuf::from(raw));
                }
                "-f" => {
                    let raw = args.next().ok_or(ConfigError::MissingArgument("-f"))?;
                    config.taps_file = Some(PathBuf::from(raw));
                }
                "-q" => config.iq_filter = true,
                "-v" => config.verbose = true,
                "--format" => {
                    let raw = args.next().ok_or(ConfigError::MissingArgument("--format"))?;
                    config.format = Some(parse_format(&raw)?);
                }
                "--binary" => config.binary = true,
                "--stats" => config.stats = true,
                "--no-df11-fallback" => config.df11_trust_elevation = false,
                other => return Err(ConfigError::UnknownArgument(other.to_string())),
            }
        }

        config.input_rate = input_rate.ok_or(ConfigError::MissingArgument("-s"))?;
        Ok(config)
    }
}

/// Parse a rate in MHz, with an optional trailing `M`: `2.4`, `8`, `12M`.
pub fn parse_sample_rate(raw: &str) -> Result<u32, ConfigError> {
    let s = raw.trim_end_matches(|c| c == 'M' || c == 'm');
    let mhz: f64 = s
        .parse()
        .map_err(|_| ConfigError::InvalidRate(raw.to_string()))?;
    if !(0.5..=48.0).contains(&mhz) {
        return Err(ConfigError::InvalidRate(raw.to_string()));
    }
    Ok((mhz * 1_000_000.0).round() as u32)
}

fn parse_format(raw: &str) -> Result<RawFormat, ConfigError> {
    match raw {
        "u8" => Ok(RawFormat::IqUint8),
        "u16" => Ok(RawFormat::IqUint16),
        "f32" => Ok(RawFormat::IqFloat32),
        "mag" => Ok(RawFormat::MagFloat32),
        "u16-real" => Ok(RawFormat::IqUint16RealRaw),
        other => Err(ConfigError::UnknownArgument(format!("--format {}", other))),
    }
}

pub fn print_help() {
    println!(
        r#"flux1090 - preamble-less Mode S demodulator

Usage: flux1090 -s <rate> [options]

Options:
  -s <rate>            Input sample rate in MHz (required)
  -u <rate>            Working/upsample rate in MHz
  -d <file.ini>        Device configuration INI ([rtlsdr] or [airspy]);
                       without it the raw stream is read from stdin
  -f <taps file>       FIR taps to load for the IQ low-pass filter
  -q                   Enable the built-in IQ FIR filter
  --format <fmt>       Raw input format: u8, u16, f32, mag, u16-real
  --binary             Emit 24-byte binary records instead of ASCII
  --stats              Report message statistics on the log
  --no-df11-fallback   Disable the DF11 trusted-sender parity fix
  -v                   Verbose output
  -h, --help           Show this help

{}
Examples:
  rtl_sdr -g 0 -f 1090000000 -s 2400000 - | flux1090 -s 2.4 -u 8
  flux1090 -s 2.4 -u 8 -d configs/rtlsdr.ini
  airspy_rx -t 4 -g 20 -f 1090.000 -a 12000000 -r - | flux1090 -s 6 -u 12 -q --format u16-real
"#,
        rate::describe_supported()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        Config::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn minimal_arguments() {
        let config = parse(&["-s", "2.4"]).expect("parses");
        assert_eq!(config.input_rate, 2_400_000);
        assert_eq!(config.output_rate, None);
        assert!(config.df11_trust_elevation);
        assert!(!config.binary);
    }

    #[test]
    fn full_surface() {
        let config = parse(&[
            "-s", "6", "-u", "12M", "-d", "dev.ini", "-f", "taps.txt", "-q", "-v", "--binary",
            "--stats", "--no-df11-fallback", "--format", "u16",
        ])
        .expect("parses");
        assert_eq!(config.input_rate, 6_000_000);
        assert_eq!(config.output_rate, Some(12_000_000));
        assert_eq!(config.device_config, Some(PathBuf::from("dev.ini")));
        assert_eq!(config.taps_file, Some(PathBuf::from("taps.txt")));
        assert!(config.iq_filter && config.verbose && config.binary && config.stats);
        assert!(!config.df11_trust_elevation);
        assert_eq!(config.format, Some(RawFormat::IqUint16));
    }

    #[test]
    fn missing_rate_is_an_error() {
        assert!(matches!(
            parse(&["-v"]),
            Err(ConfigError::MissingArgument("-s"))
        ));
        assert!(matches!(
            parse(&["-s"]),
            Err(ConfigError::MissingArgument("-s"))
        ));
    }

    #[test]
    fn unknown_arguments_are_rejected() {
        assert!(matches!(
            parse(&["-s", "2.4", "--wat"]),
            Err(ConfigError::UnknownArgument(_))
        ));
        assert!(parse(&["-s", "2.4", "--format", "pcm"]).is_err());
    }

    #[test]
    fn rate_strings() {
        assert_eq!(parse_sample_rate("2.4").expect("ok"), 2_400_000);
        assert_eq!(parse_sample_rate("10M").expect("ok"), 10_000_000);
        assert_eq!(parse_sample_rate("24m").expect("ok"), 24_000_000);
        assert!(parse_sample_rate("fast").is_err());
        assert!(parse_sample_rate("0").is_err());
    }
}
