//! UTAU invocation convention
//!
//! Decodes the space-delimited resampler argument list, the base64-like
//! pitch bend encoding, and UTAU note names.

use std::path::PathBuf;

use crate::error::{CoreError, CoreResult};
use crate::flags::Flags;

/// A fully decoded render request.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Target pitch as a MIDI note number
    pub pitch_midi: i32,
    /// UTAU velocity (100 = neutral)
    pub velocity: f64,
    pub flags: Flags,
    /// Offset into the source in milliseconds
    pub offset_ms: f64,
    /// Requested output length in milliseconds
    pub length_ms: f64,
    /// Consonant (fixed) region length in milliseconds
    pub consonant_ms: f64,
    /// Cutoff from the end (>= 0) or from the offset (< 0), milliseconds
    pub cutoff_ms: f64,
    /// Output volume percent
    pub volume_pct: f64,
    /// Modulation percent
    pub modulation: f64,
    /// Tempo in BPM governing pitch bend tick spacing
    pub tempo_bpm: f64,
    /// Pitch bend curve in cents, one value per tick
    pub pitch_bend_cents: Vec<f64>,
}

/// Parse the classic 13-token resampler argument list.
///
/// When the flags token is absent the list has 12 tokens; an empty flags
/// slot is inserted to recover.
pub fn parse_args(args: &[String]) -> CoreResult<RenderRequest> {
    let mut tokens: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    match tokens.len() {
        13 => {}
        12 => tokens.insert(4, ""),
        n => {
            return Err(CoreError::InvalidArgument(format!(
                "expected 12 or 13 arguments, got {n}"
            )))
        }
    }

    let num = |idx: usize, name: &str| -> CoreResult<f64> {
        tokens[idx]
            .parse::<f64>()
            .map_err(|_| CoreError::InvalidArgument(format!("bad {name}: {:?}", tokens[idx])))
    };

    let tempo_token = tokens[11].strip_prefix('!').unwrap_or(tokens[11]);
    let tempo_bpm = tempo_token
        .parse::<f64>()
        .map_err(|_| CoreError::InvalidArgument(format!("bad tempo: {:?}", tokens[11])))?;

    Ok(RenderRequest {
        input_path: PathBuf::from(tokens[0]),
        output_path: PathBuf::from(tokens[1]),
        pitch_midi: note_to_midi(tokens[2])?,
        velocity: num(3, "velocity")?,
        flags: Flags::parse(tokens[4]),
        offset_ms: num(5, "offset")?,
        length_ms: num(6, "length")?,
        consonant_ms: num(7, "consonant")?,
        cutoff_ms: num(8, "cutoff")?,
        volume_pct: num(9, "volume")?,
        modulation: num(10, "modulation")?,
        tempo_bpm,
        pitch_bend_cents: decode_pitch_bend(tokens[12])?,
    })
}

/// Convert a UTAU note name (`C4`, `A#3`, `Db-1`) to a MIDI note number.
pub fn note_to_midi(note: &str) -> CoreResult<i32> {
    let bytes = note.as_bytes();
    if bytes.is_empty() {
        return Err(CoreError::BadNoteName(note.into()));
    }

    let base = match bytes[0].to_ascii_uppercase() {
        b'C' => 0,
        b'D' => 2,
        b'E' => 4,
        b'F' => 5,
        b'G' => 7,
        b'A' => 9,
        b'B' => 11,
        _ => return Err(CoreError::BadNoteName(note.into())),
    };

    let mut idx = 1;
    let mut semitone: i32 = base;
    while idx < bytes.len() {
        match bytes[idx] {
            b'#' => semitone += 1,
            b'b' => semitone -= 1,
            _ => break,
        }
        idx += 1;
    }

    let octave: i32 = note[idx..]
        .parse()
        .map_err(|_| CoreError::BadNoteName(note.into()))?;

    Ok((octave + 1) * 12 + semitone)
}

/// Convert a MIDI note number to frequency in Hz.
#[inline]
pub fn midi_to_hz(midi: f64) -> f64 {
    440.0 * 2f64.powf((midi - 69.0) / 12.0)
}

fn alphabet_value(c: u8) -> Option<i32> {
    match c {
        b'A'..=b'Z' => Some((c - b'A') as i32),
        b'a'..=b'z' => Some((c - b'a') as i32 + 26),
        b'0'..=b'9' => Some((c - b'0') as i32 + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Decode the pitch bend string into cents.
///
/// Character pairs form signed 12-bit integers; `#<n>#` repeats the last
/// value `n` times. A trailing zero is always appended.
pub fn decode_pitch_bend(encoded: &str) -> CoreResult<Vec<f64>> {
    let mut cents = Vec::new();
    let bytes = encoded.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'#' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            let count: usize = encoded[start..end]
                .parse()
                .map_err(|_| CoreError::BadPitchBend(encoded.into()))?;
            let last = cents
                .last()
                .copied()
                .ok_or_else(|| CoreError::BadPitchBend(encoded.into()))?;
            for _ in 0..count {
                cents.push(last);
            }
            i = end;
            if i < bytes.len() && bytes[i] == b'#' {
                i += 1;
            }
        } else {
            if i + 1 >= bytes.len() {
                return Err(CoreError::BadPitchBend(encoded.into()));
            }
            let hi = alphabet_value(bytes[i])
                .ok_or_else(|| CoreError::BadPitchBend(encoded.into()))?;
            let lo = alphabet_value(bytes[i + 1])
                .ok_or_else(|| CoreError::BadPitchBend(encoded.into()))?;
            let mut value = (hi << 6) | lo;
            if value & 0x800 != 0 {
                value -= 4096;
            }
            cents.push(value as f64);
            i += 2;
        }
    }

    cents.push(0.0);
    Ok(cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_names_round_to_midi() {
        assert_eq!(note_to_midi("C4").unwrap(), 60);
        assert_eq!(note_to_midi("A4").unwrap(), 69);
        assert_eq!(note_to_midi("A#3").unwrap(), 58);
        assert_eq!(note_to_midi("Db4").unwrap(), 61);
        assert_eq!(note_to_midi("C-1").unwrap(), 0);
        assert!(note_to_midi("H2").is_err());
        assert!(note_to_midi("").is_err());
    }

    #[test]
    fn midi_to_hz_reference_points() {
        assert!((midi_to_hz(69.0) - 440.0).abs() < 1e-9);
        assert!((midi_to_hz(81.0) - 880.0).abs() < 1e-9);
        assert!((midi_to_hz(60.0) - 261.6255653).abs() < 1e-4);
    }

    #[test]
    fn decode_simple_pairs() {
        // 'A','A' -> 0; 'A','B' -> 1
        let cents = decode_pitch_bend("AAAB").unwrap();
        assert_eq!(cents, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn decode_negative_values() {
        // '//' -> (63<<6)|63 = 4095 -> -1
        let cents = decode_pitch_bend("//").unwrap();
        assert_eq!(cents, vec![-1.0, 0.0]);
    }

    #[test]
    fn decode_run_length() {
        let cents = decode_pitch_bend("AB#3#AA").unwrap();
        assert_eq!(cents, vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_pitch_bend("A").is_err());
        assert!(decode_pitch_bend("A!").is_err());
        assert!(decode_pitch_bend("#3#").is_err());
    }

    #[test]
    fn empty_bend_is_single_zero() {
        assert_eq!(decode_pitch_bend("").unwrap(), vec![0.0]);
    }

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_full_argument_list() {
        let req = parse_args(&args(&[
            "in.wav", "out.wav", "C4", "100", "g-10He", "10.5", "500", "60", "-20", "100", "0",
            "!120", "AA#2#",
        ]))
        .unwrap();
        assert_eq!(req.pitch_midi, 60);
        assert_eq!(req.flags.g, -10);
        assert!(req.flags.loop_mel);
        assert!((req.offset_ms - 10.5).abs() < 1e-9);
        assert!((req.cutoff_ms + 20.0).abs() < 1e-9);
        assert!((req.tempo_bpm - 120.0).abs() < 1e-9);
        assert_eq!(req.pitch_bend_cents.len(), 4);
    }

    #[test]
    fn parse_recovers_missing_flags_token() {
        let req = parse_args(&args(&[
            "in.wav", "out.wav", "C4", "100", "0", "1000", "60", "0", "100", "0", "!120", "AA",
        ]))
        .unwrap();
        assert_eq!(req.flags, Flags::default());
        assert!((req.offset_ms - 0.0).abs() < 1e-9);
        assert!((req.length_ms - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn parse_rejects_wrong_token_count() {
        assert!(parse_args(&args(&["a", "b"])).is_err());
    }
}
