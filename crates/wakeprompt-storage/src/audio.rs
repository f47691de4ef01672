//! Generated audio blobs on the local filesystem.
//!
//! Blobs live flat in one sounds directory under their bare file name.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader never observes a half-written file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use wakeprompt_core::error::StorageError;
use wakeprompt_core::ports::AudioStore;

/// Audio store rooted at a sounds directory.
#[derive(Debug, Clone)]
pub struct FsAudioStore {
    sounds_dir: PathBuf,
}

impl FsAudioStore {
    pub fn new(sounds_dir: impl Into<PathBuf>) -> Self {
        Self {
            sounds_dir: sounds_dir.into(),
        }
    }

    pub fn sounds_dir(&self) -> &Path {
        &self.sounds_dir
    }

    /// Absolute location of a blob.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.sounds_dir.join(name))
    }
}

fn validate_name(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\');
    if invalid {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl AudioStore for FsAudioStore {
    fn save(&self, bytes: &[u8], name: &str) -> Result<PathBuf, StorageError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.sounds_dir)
            .map_err(|e| StorageError::Directory(format!("{}: {}", self.sounds_dir.display(), e)))?;

        let tmp = self.sounds_dir.join(format!(".{}.tmp", name));
        let write_err = |e: std::io::Error| StorageError::Write {
            name: name.to_string(),
            reason: e.to_string(),
        };
        fs::write(&tmp, bytes).map_err(write_err)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }

        debug!(name, bytes = bytes.len(), "Audio blob saved");
        Ok(path)
    }

    fn delete(&self, name: &str) {
        let Ok(path) = self.path_for(name) else {
            warn!(name, "Refusing to delete audio blob with invalid name");
            return;
        };
        match fs::remove_file(&path) {
            Ok(()) => debug!(name, "Audio blob deleted"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(name, error = %e, "Failed to delete audio blob"),
        }
    }

    fn duration(&self, name: &str) -> Result<f64, StorageError> {
        let path = self.path_for(name)?;
        let bytes = fs::read(&path).map_err(|e| StorageError::Read {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        wav_duration_secs(&bytes).map_err(|reason| StorageError::InvalidAudio {
            name: name.to_string(),
            reason,
        })
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Playback length of a RIFF/WAVE buffer in seconds.
///
/// Uses the byte rate from the `fmt ` chunk and the size of the `data`
/// chunk. A `data` size larger than the buffer (streamed output) is clamped
/// to the bytes actually present.
pub fn wav_duration_secs(bytes: &[u8]) -> Result<f64, String> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err("not a RIFF/WAVE file".to_string());
    }

    let mut offset = 12;
    let mut byte_rate: Option<u32> = None;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(bytes, offset + 4) as usize;
        let body = offset + 8;

        match id {
            b"fmt " => {
                if body + 12 > bytes.len() {
                    return Err("truncated fmt chunk".to_string());
                }
                byte_rate = Some(read_u32(bytes, body + 8));
            }
            b"data" => {
                let rate = byte_rate.ok_or("data chunk before fmt chunk")?;
                if rate == 0 {
                    return Err("byte rate is zero".to_string());
                }
                let available = bytes.len() - body;
                return Ok(size.min(available) as f64 / rate as f64);
            }
            _ => {}
        }

        // Chunks are word-aligned.
        offset = body.saturating_add(size).saturating_add(size & 1);
    }

    Err("missing data chunk".to_string())
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
