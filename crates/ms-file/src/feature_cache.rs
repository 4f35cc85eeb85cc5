//! On-disk feature cache
//!
//! Mel spectrograms, their pre-scale factor, and separator output are
//! cached next to the source file under magic-tagged little-endian binary
//! layouts. Corruption of any kind reads as a cache miss. Writes go
//! through a temp file and an atomic rename so a cancelled render never
//! leaves a torn entry.
//!
//! Keying is by file name plus flag signature only; replacing a source
//! file in place can serve stale features. Known limitation.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ms_dsp::FloatMatrix;

use crate::error::FileResult;

const MEL_MAGIC: [u8; 4] = *b"MEL1";
const SCALE_MAGIC: [u8; 4] = *b"SCL1";
const SEP_MAGIC: [u8; 4] = *b"HNP1";

/// Upper bound on cached matrix dimensions; anything larger is corrupt.
const MAX_DIM: i32 = 1 << 24;

/// Feature cache rooted next to each source file, with an optional
/// override directory.
#[derive(Debug, Clone, Default)]
pub struct FeatureCache {
    cache_dir: Option<PathBuf>,
}

impl FeatureCache {
    /// Cache next to each source file (fallback: working directory).
    pub fn beside_source() -> Self {
        Self { cache_dir: None }
    }

    /// Cache in a fixed directory.
    pub fn in_directory(dir: PathBuf) -> Self {
        Self {
            cache_dir: Some(dir),
        }
    }

    fn base_dir(&self, source: &Path) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn stem(source: &Path) -> String {
        source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio")
            .to_string()
    }

    /// `<stem>_<sig>.mel.bin`
    pub fn mel_path(&self, source: &Path, signature: &str) -> PathBuf {
        self.base_dir(source)
            .join(format!("{}_{signature}.mel.bin", Self::stem(source)))
    }

    /// `<stem>_<sig>.scale.bin`
    pub fn scale_path(&self, source: &Path, signature: &str) -> PathBuf {
        self.base_dir(source)
            .join(format!("{}_{signature}.scale.bin", Self::stem(source)))
    }

    /// `<stem>.hnsep.bin`
    pub fn separator_path(&self, source: &Path) -> PathBuf {
        self.base_dir(source)
            .join(format!("{}.hnsep.bin", Self::stem(source)))
    }

    /// Load a cached mel + scale pair. Any inconsistency is a miss.
    pub fn load_mel(&self, source: &Path, signature: &str) -> Option<(FloatMatrix, f32)> {
        let mel = read_mel(&self.mel_path(source, signature))?;
        let scale = read_scale(&self.scale_path(source, signature))?;
        Some((mel, scale))
    }

    /// Persist a mel + scale pair.
    pub fn save_mel(
        &self,
        source: &Path,
        signature: &str,
        mel: &FloatMatrix,
        scale: f32,
    ) -> FileResult<()> {
        write_atomic(&self.mel_path(source, signature), |w| {
            w.write_all(&MEL_MAGIC)?;
            w.write_all(&(mel.rows() as i32).to_le_bytes())?;
            w.write_all(&(mel.cols() as i32).to_le_bytes())?;
            for r in 0..mel.rows() {
                for &v in mel.row(r) {
                    w.write_all(&v.to_le_bytes())?;
                }
            }
            Ok(())
        })?;
        write_atomic(&self.scale_path(source, signature), |w| {
            w.write_all(&SCALE_MAGIC)?;
            w.write_all(&scale.to_le_bytes())?;
            Ok(())
        })
    }

    /// Load cached separator output; accepted only when its length matches
    /// the current source audio.
    pub fn load_separated(&self, source: &Path, expected_len: usize) -> Option<Vec<f32>> {
        let samples = read_separated(&self.separator_path(source))?;
        if samples.len() != expected_len {
            log::debug!(
                "separator cache length {} != source length {expected_len}, discarding",
                samples.len()
            );
            return None;
        }
        Some(samples)
    }

    /// Persist separator output.
    pub fn save_separated(&self, source: &Path, samples: &[f32]) -> FileResult<()> {
        write_atomic(&self.separator_path(source), |w| {
            w.write_all(&SEP_MAGIC)?;
            w.write_all(&(samples.len() as i32).to_le_bytes())?;
            for &v in samples {
                w.write_all(&v.to_le_bytes())?;
            }
            Ok(())
        })
    }
}

/// Whether the cache must be bypassed for this request (the `G` flag).
pub fn should_bypass(force_regen: bool) -> bool {
    force_regen
}

fn write_atomic<F>(path: &Path, fill: F) -> FileResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        fill(&mut writer)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_u32_magic(reader: &mut impl Read) -> Option<[u8; 4]> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).ok()?;
    Some(magic)
}

fn read_i32(reader: &mut impl Read) -> Option<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).ok()?;
    Some(i32::from_le_bytes(buf))
}

fn read_f32_vec(reader: &mut impl Read, count: usize) -> Option<Vec<f32>> {
    let mut bytes = vec![0u8; count * 4];
    reader.read_exact(&mut bytes).ok()?;
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

fn read_mel(path: &Path) -> Option<FloatMatrix> {
    let mut reader = BufReader::new(File::open(path).ok()?);
    if read_u32_magic(&mut reader)? != MEL_MAGIC {
        log::debug!("bad mel cache magic in {}", path.display());
        return None;
    }
    let rows = read_i32(&mut reader)?;
    let cols = read_i32(&mut reader)?;
    if rows <= 0 || cols <= 0 || rows > MAX_DIM || cols > MAX_DIM {
        return None;
    }
    let (rows, cols) = (rows as usize, cols as usize);
    let data = read_f32_vec(&mut reader, rows * cols)?;
    FloatMatrix::from_vec(data, rows, cols).ok()
}

fn read_scale(path: &Path) -> Option<f32> {
    let mut reader = BufReader::new(File::open(path).ok()?);
    if read_u32_magic(&mut reader)? != SCALE_MAGIC {
        return None;
    }
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).ok()?;
    Some(f32::from_le_bytes(buf))
}

fn read_separated(path: &Path) -> Option<Vec<f32>> {
    let mut reader = BufReader::new(File::open(path).ok()?);
    if read_u32_magic(&mut reader)? != SEP_MAGIC {
        log::debug!("bad separator cache magic in {}", path.display());
        return None;
    }
    let len = read_i32(&mut reader)?;
    if len < 0 || len > MAX_DIM {
        return None;
    }
    read_f32_vec(&mut reader, len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_matrix() -> FloatMatrix {
        let mut m = FloatMatrix::zeros(8, 13);
        for r in 0..8 {
            for c in 0..13 {
                m.set(r, c, (r * 13 + c) as f32 * 0.25 - 3.0);
            }
        }
        m
    }

    #[test]
    fn mel_roundtrip_is_bit_exact() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("voice.wav");
        let cache = FeatureCache::beside_source();

        let mel = sample_matrix();
        cache.save_mel(&source, "abc123", &mel, 0.731).unwrap();

        let (loaded, scale) = cache.load_mel(&source, "abc123").unwrap();
        assert_eq!(loaded.rows(), mel.rows());
        assert_eq!(loaded.cols(), mel.cols());
        for r in 0..mel.rows() {
            for c in 0..mel.cols() {
                assert_eq!(loaded.get(r, c).to_bits(), mel.get(r, c).to_bits());
            }
        }
        assert_eq!(scale.to_bits(), 0.731f32.to_bits());
    }

    #[test]
    fn signature_selects_the_entry() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("voice.wav");
        let cache = FeatureCache::beside_source();

        cache.save_mel(&source, "aaaaaa", &sample_matrix(), 1.0).unwrap();
        assert!(cache.load_mel(&source, "aaaaaa").is_some());
        assert!(cache.load_mel(&source, "bbbbbb").is_none());
    }

    #[test]
    fn corrupt_magic_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("voice.wav");
        let cache = FeatureCache::beside_source();

        cache.save_mel(&source, "cafe01", &sample_matrix(), 1.0).unwrap();
        std::fs::write(cache.mel_path(&source, "cafe01"), b"WRONGDATA").unwrap();
        assert!(cache.load_mel(&source, "cafe01").is_none());
    }

    #[test]
    fn truncated_payload_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("voice.wav");
        let cache = FeatureCache::beside_source();

        cache.save_mel(&source, "cafe02", &sample_matrix(), 1.0).unwrap();
        let path = cache.mel_path(&source, "cafe02");
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(cache.load_mel(&source, "cafe02").is_none());
    }

    #[test]
    fn separator_cache_checks_length() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("voice.wav");
        let cache = FeatureCache::beside_source();

        let samples: Vec<f32> = (0..1000).map(|i| i as f32 * 1e-3).collect();
        cache.save_separated(&source, &samples).unwrap();

        assert_eq!(cache.load_separated(&source, 1000).unwrap(), samples);
        assert!(cache.load_separated(&source, 999).is_none());
    }

    #[test]
    fn override_directory_is_used() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("cache");
        let cache = FeatureCache::in_directory(cache_dir.clone());
        let source = Path::new("/somewhere/else/voice.wav");

        cache.save_mel(source, "012345", &sample_matrix(), 1.0).unwrap();
        assert!(cache_dir.join("voice_012345.mel.bin").exists());
        assert!(cache.load_mel(source, "012345").is_some());
    }

    #[test]
    fn bypass_follows_the_regen_flag() {
        assert!(should_bypass(true));
        assert!(!should_bypass(false));
    }

    #[test]
    fn missing_files_are_misses() {
        let cache = FeatureCache::beside_source();
        assert!(cache.load_mel(Path::new("/no/such.wav"), "ffffff").is_none());
        assert!(cache.load_separated(Path::new("/no/such.wav"), 10).is_none());
    }
}
