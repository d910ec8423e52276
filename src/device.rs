//! Capture devices
//!
//! The demodulator proper only sees a producer that fills the ring buffer.
//! The built-in producer spawns the vendor capture tool (`rtl_sdr` or
//! `airspy_rx`) as a child process with arguments derived from an INI
//! section and pumps its stdout into the ring from a reader thread. Child
//! EOF or an I/O error shuts the ring down; the consumer drains and exits.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, DeviceError};
use crate::ring::RingWriter;

/// One `[section]` of key=value pairs.
pub type Section = HashMap<String, String>;

/// Parse an INI file: `[section]` headers, `key = value` lines, `#` and
/// `;` comments, whitespace trimmed. Lines that match nothing are skipped.
pub fn parse_ini(text: &str) -> HashMap<String, Section> {
    let mut data: HashMap<String, Section> = HashMap::new();
    let mut current = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            current = line[1..line.len() - 1].trim().to_string();
            data.entry(current.clone()).or_default();
            continue;
        }
        if let Some(pos) = line.find('=') {
            let key = line[..pos].trim().to_string();
            let value = line[pos + 1..].trim().to_string();
            data.entry(current.clone()).or_default().insert(key, value);
        }
    }
    data
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    RtlSdr,
    Airspy,
}

/// A recognized device section from the config file.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub kind: DeviceKind,
    pub settings: Section,
}

impl DeviceConfig {
    /// Load the device section from an INI file. A missing or unreadable
    /// file, or one naming no known device, is a configuration error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::DeviceConfig(path.display().to_string(), e.to_string()))?;
        let data = parse_ini(&text);
        if let Some(settings) = data.get("airspy") {
            return Ok(Self {
                kind: DeviceKind::Airspy,
                settings: settings.clone(),
            });
        }
        if let Some(settings) = data.get("rtlsdr") {
            return Ok(Self {
                kind: DeviceKind::RtlSdr,
                settings: settings.clone(),
            });
        }
        Err(ConfigError::DeviceConfig(
            path.display().to_string(),
            "no [rtlsdr] or [airspy] section".to_string(),
        ))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Translate the section into capture-tool arguments. Unknown keys are
    /// ignored; a value that fails to parse drops that one setting with a
    /// log line and nothing else.
    fn build_command(&self, input_rate: u32) -> Command {
        match self.kind {
            DeviceKind::RtlSdr => {
                let mut cmd = Command::new("rtl_sdr");
                let freq = self.parse_or("frequency", 1_090_000_000u64);
                cmd.arg("-f").arg(freq.to_string());
                cmd.arg("-s").arg(input_rate.to_string());
                if let Some(v) = self.get("serial") {
                    cmd.arg("-d").arg(v);
                }
                if let Some(gain) = self.parsed::<f64>("gain") {
                    cmd.arg("-g").arg(format!("{}", gain));
                } else if self.flag("agc") {
                    cmd.arg("-g").arg("0");
                }
                if let Some(ppm) = self.parsed::<i32>("ppm") {
                    cmd.arg("-p").arg(ppm.to_string());
                }
                if self.flag("bias_tee") {
                    cmd.arg("-T");
                }
                for key in ["offset_tuning", "direct_sampling", "tuner_bandwidth"] {
                    if self.get(key).is_some() {
                        debug!(key, "setting not supported by the rtl_sdr tool, ignored");
                    }
                }
                cmd.arg("-");
                cmd
            }
            DeviceKind::Airspy => {
                let mut cmd = Command::new("airspy_rx");
                let freq = self.parse_or("frequency", 1_090_000_000u64);
                cmd.arg("-f").arg(format!("{:.3}", freq as f64 / 1e6));
                // raw 12-bit real samples run at twice the nominal rate
                cmd.arg("-a").arg((input_rate * 2).to_string());
                cmd.arg("-t").arg("4");
                if let Some(v) = self.get("serial") {
                    cmd.arg("-s").arg(v);
                }
                if let Some(g) = self.parsed::<u32>("linearity_gain") {
                    cmd.arg("-g").arg(g.to_string());
                }
                if let Some(g) = self.parsed::<u32>("sensitivity_gain") {
                    cmd.arg("-h").arg(g.to_string());
                }
                if let Some(g) = self.parsed::<u32>("lna_gain") {
                    cmd.arg("-l").arg(g.to_string());
                }
                if let Some(g) = self.parsed::<u32>("mixer_gain") {
                    cmd.arg("-m").arg(g.to_string());
                }
                if let Some(g) = self.parsed::<u32>("vga_gain") {
                    cmd.arg("-v").arg(g.to_string());
                }
                if self.flag("bias_tee") {
                    cmd.arg("-b").arg("1");
                }
                cmd.arg("-r").arg("-");
                cmd
            }
        }
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(key, value = raw, "unparsable device setting, skipped");
                None
            }
        }
    }

    fn parse_or<T: std::str::FromStr + Copy>(&self, key: &str, default: T) -> T {
        self.parsed(key).unwrap_or(default)
    }

    fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("1") | Some("true") | Some("yes") | Some("on"))
    }
}

/// A running capture child plus the thread pumping it into the ring.
pub struct CaptureDevice {
    child: Child,
    pump: Option<JoinHandle<()>>,
}

impl CaptureDevice {
    /// Spawn the capture tool and start the pump thread. Spawn failure is
    /// fatal for the run.
    pub fn start(
        config: &DeviceConfig,
        input_rate: u32,
        mut writer: RingWriter<u8>,
    ) -> Result<Self, DeviceError> {
        let mut cmd = config.build_command(input_rate);
        cmd.stdout(Stdio::piped()).stderr(Stdio::null());

        let tool = match config.kind {
            DeviceKind::RtlSdr => "rtl_sdr",
            DeviceKind::Airspy => "airspy_rx",
        };
        info!(tool, input_rate, "starting capture device");

        let mut child = cmd
            .spawn()
            .map_err(|e| DeviceError::Spawn(tool.to_string(), e.to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeviceError::Spawn(tool.to_string(), "no stdout".to_string()))?;

        let pump = std::thread::spawn(move || {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => {
                        info!("capture stream ended");
                        break;
                    }
                    Ok(n) => {
                        let written = writer.write(&buf[..n]);
                        if written < n {
                            // ring shut down underneath us
                            break;
                        }
                    }
                    Err(e) => {
                        error!("capture read failed: {}", e);
                        break;
                    }
                }
            }
            writer.finish_last_block(0);
            writer.shutdown();
        });

        Ok(Self {
            child,
            pump: Some(pump),
        })
    }

    /// Kill the child and reap the pump thread.
    pub fn stop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

impl Drop for CaptureDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_INI: &str = "\
# capture device
[rtlsdr]
serial = 00000001
frequency = 1090000000
gain = 49.6
ppm = -2
bias_tee = 0
; trailing comment
bogus_key = whatever
";

    #[test]
    fn ini_sections_and_keys_parse() {
        let data = parse_ini(SAMPLE_INI);
        let section = data.get("rtlsdr").expect("section");
        assert_eq!(section.get("serial").map(String::as_str), Some("00000001"));
        assert_eq!(section.get("gain").map(String::as_str), Some("49.6"));
        assert_eq!(section.get("ppm").map(String::as_str), Some("-2"));
        // unknown keys are carried, consumers ignore them
        assert!(section.contains_key("bogus_key"));
    }

    #[test]
    fn ini_tolerates_junk_lines() {
        let data = parse_ini("noise without equals\n[airspy]\nlinearity_gain = 17\n====\n");
        assert_eq!(
            data.get("airspy").and_then(|s| s.get("linearity_gain")),
            Some(&"17".to_string())
        );
    }

    #[test]
    fn rtlsdr_command_arguments() {
        let config = DeviceConfig {
            kind: DeviceKind::RtlSdr,
            settings: parse_ini(SAMPLE_INI).remove("rtlsdr").expect("section"),
        };
        let cmd = config.build_command(2_400_000);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.windows(2).any(|w| w == ["-s", "2400000"]));
        assert!(args.windows(2).any(|w| w == ["-f", "1090000000"]));
        assert!(args.windows(2).any(|w| w == ["-g", "49.6"]));
        assert!(args.windows(2).any(|w| w == ["-p", "-2"]));
        assert!(!args.contains(&"-T".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn invalid_setting_values_are_skipped_silently() {
        let mut settings = Section::new();
        settings.insert("gain".to_string(), "loud".to_string());
        let config = DeviceConfig {
            kind: DeviceKind::RtlSdr,
            settings,
        };
        let cmd = config.build_command(2_400_000);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(!args.contains(&"-g".to_string()));
    }

    #[test]
    fn airspy_section_is_preferred_and_mapped() {
        let text = "[airspy]\nfrequency = 1090000000\nlinearity_gain = 18\nbias_tee = 1\n";
        let config = DeviceConfig {
            kind: DeviceKind::Airspy,
            settings: parse_ini(text).remove("airspy").expect("section"),
        };
        let cmd = config.build_command(6_000_000);
        assert_eq!(cmd.get_program().to_string_lossy(), "airspy_rx");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.windows(2).any(|w| w == ["-f", "1090.000"]));
        assert!(args.windows(2).any(|w| w == ["-a", "12000000"]));
        assert!(args.windows(2).any(|w| w == ["-g", "18"]));
        assert!(args.windows(2).any(|w| w == ["-b", "1"]));
    }
}
