//! FIR tap sets
//!
//! Built-in low-pass banks for the uint16 input rates, plus the loader for
//! user-supplied tap files (one float per line, `#` comments). The built-in
//! sets were produced offline by filter optimization against recorded
//! message samples.

use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Upper bound on a runtime-loaded tap set.
pub const MAX_TAPS: usize = 64;

/// 31-tap low-pass for 6 MHz input.
pub const TAPS_6_MHZ: [f32; 31] = [
    0.04691808, -0.02944228, 0.02481813, 0.00687245, -0.03778376, -0.05536104, -0.03637546,
    -0.06929483, 0.04111258, -0.0142561, -0.05956734, -0.00396889, -0.04647978, -0.06260861,
    0.38121662, 0.8284003, 0.38121662, -0.06260861, -0.04647978, -0.00396889, -0.05956734,
    -0.0142561, 0.04111258, -0.06929483, -0.03637546, -0.05536104, -0.03778376, 0.00687245,
    0.02481813, -0.02944228, 0.04691808,
];

/// 31-tap low-pass for 10 MHz input.
pub const TAPS_10_MHZ: [f32; 31] = [
    0.00055077, -0.01847956, 0.00234699, -0.01789507, 0.00318175, 0.05594195, 0.01237755,
    -0.06771679, 0.05199363, -0.02546499, 0.16795284, -0.07870515, -0.16818146, 0.2712337,
    0.2018848, 0.21795812, 0.2018848, 0.2712337, -0.16818146, -0.07870515, 0.16795284,
    -0.02546499, 0.05199363, -0.06771679, 0.01237755, 0.05594195, 0.00318175, -0.01789507,
    0.00234699, -0.01847956, 0.00055077,
];

/// Built-in taps for an input rate, if a bank exists for it.
pub fn builtin_for_rate(input_rate: u32) -> Option<&'static [f32]> {
    match input_rate {
        6_000_000 => Some(&TAPS_6_MHZ),
        10_000_000 => Some(&TAPS_10_MHZ),
        _ => None,
    }
}

/// Load a tap set from a file. Empty results, unparsable lines and
/// oversized sets all abort startup.
pub fn load_taps_file(path: &Path) -> Result<Vec<f32>, ConfigError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ConfigError::TapsFile(path.display().to_string(), e.to_string()))?;
    parse_taps(&text).map_err(|msg| ConfigError::TapsFile(path.display().to_string(), msg))
}

fn parse_taps(text: &str) -> Result<Vec<f32>, String> {
    let mut taps = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let v: f32 = line
            .parse()
            .map_err(|_| format!("malformed tap line: {:?}", line))?;
        taps.push(v);
        if taps.len() > MAX_TAPS {
            return Err(format!("more than {} taps", MAX_TAPS));
        }
    }
    if taps.is_empty() {
        return Err("no taps found".to_string());
    }
    Ok(taps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_banks_are_symmetric() {
        for taps in [&TAPS_6_MHZ[..], &TAPS_10_MHZ[..]] {
            let n = taps.len();
            for k in 0..n / 2 {
                assert_eq!(taps[k], taps[n - 1 - k]);
            }
        }
    }

    #[test]
    fn builtin_lookup_by_rate() {
        assert!(builtin_for_rate(6_000_000).is_some());
        assert!(builtin_for_rate(10_000_000).is_some());
        assert!(builtin_for_rate(2_400_000).is_none());
    }

    #[test]
    fn parse_accepts_comments_and_blank_lines() {
        let taps = parse_taps("# a comment\n0.5\n\n  -0.25  \n# tail\n1.0\n").expect("parses");
        assert_eq!(taps, vec![0.5, -0.25, 1.0]);
    }

    #[test]
    fn parse_rejects_garbage_and_oversize() {
        assert!(parse_taps("0.5\nnot a float\n").is_err());
        assert!(parse_taps("").is_err());
        let too_many: String = (0..65).map(|_| "0.1\n").collect();
        assert!(parse_taps(&too_many).is_err());
    }
}
