//! Resample RPC body
//!
//! The JSON mirror of the UTAU argument convention: camelCase fields plus
//! a flags object keyed by the literal flag names.

use std::path::PathBuf;

use serde::Deserialize;

use ms_core::{Flags, RenderRequest};

fn default_hundred() -> i32 {
    100
}

/// Flag object as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct FlagsDto {
    #[serde(default)]
    pub g: i32,
    #[serde(default = "default_hundred", rename = "Hb")]
    pub hb: i32,
    #[serde(default = "default_hundred", rename = "Hv")]
    pub hv: i32,
    #[serde(default, rename = "HG")]
    pub hg: i32,
    #[serde(default = "default_hundred", rename = "P")]
    pub p: i32,
    #[serde(default)]
    pub t: i32,
    #[serde(default, rename = "Ht")]
    pub ht: i32,
    #[serde(default, rename = "A")]
    pub a: i32,
    #[serde(default, rename = "G")]
    pub force_regen: bool,
    #[serde(default, rename = "He")]
    pub loop_mel: bool,
}

impl Default for FlagsDto {
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

impl From<FlagsDto> for Flags {
    fn from(dto: FlagsDto) -> Self {
        let mut flags = Flags {
            g: dto.g,
            hb: dto.hb,
            hv: dto.hv,
            hg: dto.hg,
            p: dto.p,
            t: dto.t,
            ht: dto.ht,
            a: dto.a,
            force_regen: dto.force_regen,
            loop_mel: dto.loop_mel,
        };
        flags.clamp();
        flags
    }
}

/// POST / body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResampleRequest {
    pub input_file: String,
    pub output_file: String,
    pub pitch_midi: i32,
    pub velocity: f64,
    #[serde(default)]
    pub flags: FlagsDto,
    pub offset: f64,
    pub length: i64,
    pub consonant: f64,
    pub cutoff: f64,
    pub volume: f64,
    pub modulation: f64,
    pub tempo: f64,
    #[serde(default)]
    pub pitch_bend_cents: Vec<f64>,
}

impl From<ResampleRequest> for RenderRequest {
    fn from(rpc: ResampleRequest) -> Self {
        RenderRequest {
            input_path: PathBuf::from(rpc.input_file),
            output_path: PathBuf::from(rpc.output_file),
            pitch_midi: rpc.pitch_midi,
            velocity: rpc.velocity,
            flags: rpc.flags.into(),
            offset_ms: rpc.offset,
            length_ms: rpc.length as f64,
            consonant_ms: rpc.consonant,
            cutoff_ms: rpc.cutoff,
            volume_pct: rpc.volume,
            modulation: rpc.modulation,
            tempo_bpm: rpc.tempo,
            pitch_bend_cents: rpc.pitch_bend_cents,
        }
    }
}
