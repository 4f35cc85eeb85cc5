//! Render flag model
//!
//! Parses UTAU-style flag strings, clamps every knob to its documented
//! range, and derives the short signature used to key cached features.

use sha2::{Digest, Sha256};

/// Parsed render flags. All integer knobs are clamped on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    /// Formant/gender shift in cents (semitones x 100)
    pub g: i32,
    /// Breath gain percent
    pub hb: i32,
    /// Voice gain percent
    pub hv: i32,
    /// Growl strength
    pub hg: i32,
    /// Loudness-normalize blend percent
    pub p: i32,
    /// Pitch shift in cents
    pub t: i32,
    /// Tension
    pub ht: i32,
    /// Amplitude-from-pitch depth
    pub a: i32,
    /// Force feature regeneration (bypass cache)
    pub force_regen: bool,
    /// Mel loop mode
    pub loop_mel: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            g: 0,
            hb: 100,
            hv: 100,
            hg: 0,
            p: 100,
            t: 0,
            ht: 0,
            a: 0,
            force_regen: false,
            loop_mel: false,
        }
    }
}

/// Flag keys, longest first so `Hb` wins over `b`-less prefixes.
const KEYS: &[&str] = &["Hb", "Hv", "HG", "He", "Ht", "g", "P", "t", "A", "G"];

impl Flags {
    /// Parse a UTAU flag string such as `g-10Hb120HeG`.
    ///
    /// Unknown characters are skipped. Values are clamped afterwards.
    pub fn parse(s: &str) -> Self {
        let mut flags = Self::default();
        let bytes = s.as_bytes();
        let mut i = 0;

        'scan: while i < bytes.len() {
            for key in KEYS {
                if s[i..].starts_with(key) {
                    i += key.len();
                    match *key {
                        "He" => flags.loop_mel = true,
                        "G" => flags.force_regen = true,
                        _ => {
                            let (value, consumed) = read_int(&s[i..]);
                            i += consumed;
                            if let Some(v) = value {
                                match *key {
                                    "g" => flags.g = v,
                                    "Hb" => flags.hb = v,
                                    "Hv" => flags.hv = v,
                                    "HG" => flags.hg = v,
                                    "P" => flags.p = v,
                                    "t" => flags.t = v,
                                    "Ht" => flags.ht = v,
                                    "A" => flags.a = v,
                                    _ => unreachable!(),
                                }
                            }
                        }
                    }
                    continue 'scan;
                }
            }
            let ch = s[i..].chars().next().unwrap_or('?');
            log::debug!("skipping unknown flag character {ch:?}");
            i += ch.len_utf8();
        }

        flags.clamp();
        flags
    }

    /// Clamp every knob to its documented range.
    pub fn clamp(&mut self) {
        self.g = self.g.clamp(-600, 600);
        self.hb = self.hb.clamp(0, 500);
        self.hv = self.hv.clamp(0, 150);
        self.hg = self.hg.clamp(0, 100);
        self.p = self.p.clamp(0, 100);
        self.t = self.t.clamp(-1200, 1200);
        self.ht = self.ht.clamp(-100, 100);
        self.a = self.a.clamp(-100, 100);
    }

    /// Whether the harmonic/noise separator must run for these flags.
    pub fn needs_separation(&self) -> bool {
        self.ht != 0 || self.hb != self.hv
    }

    /// First six hex characters of the SHA-256 over the cache-relevant
    /// flags. Only `g`, `Hb`, `Hv`, and `Ht` influence cached features.
    pub fn signature(&self) -> String {
        let payload = format!("g={};Hb={};Hv={};Ht={}", self.g, self.hb, self.hv, self.ht);
        let digest = Sha256::digest(payload.as_bytes());
        hex::encode(&digest[..3])
    }
}

/// Read an optional leading signed integer, returning it and the number of
/// bytes consumed.
fn read_int(s: &str) -> (Option<i32>, usize) {
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return (None, 0);
    }
    (s[..end].parse().ok(), end)
}
