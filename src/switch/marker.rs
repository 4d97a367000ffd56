use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Switch state as recorded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Off,
    On { since: SystemTime },
}

#[derive(Debug, Serialize, Deserialize)]
struct MarkerRecord {
    since_epoch_ms: u64,
}

/// File whose presence means the switch is on. It outlives the process, so a
/// restarted daemon still knows when the switch was turned on.
#[derive(Debug, Clone)]
pub struct SwitchMarker {
    path: PathBuf,
}

impl SwitchMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A file that disappears while being read counts as `Off`.
    pub fn read(&self) -> io::Result<SwitchState> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SwitchState::Off),
            Err(e) => return Err(e),
        };

        if let Ok(rec) = serde_json::from_slice::<MarkerRecord>(&bytes) {
            return Ok(SwitchState::On {
                since: UNIX_EPOCH + Duration::from_millis(rec.since_epoch_ms),
            });
        }

        // no record inside (e.g. created with `touch`): the file time is the start time
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(SwitchState::On {
                since: meta.modified()?,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SwitchState::Off),
            Err(e) => Err(e),
        }
    }

    /// Writes the marker via a temp file and rename so readers never see a partial record.
    pub fn write(&self, since: SystemTime) -> io::Result<()> {
        let since_epoch_ms = since
            .duration_since(UNIX_EPOCH)
            .map_err(io::Error::other)?
            .as_millis() as u64;
        let body = serde_json::to_vec(&MarkerRecord { since_epoch_ms })?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, body)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    /// Removes the marker. Returns whether one was there.
    pub fn clear(&self) -> io::Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "marker".to_string());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", std::process::id()))
    }
}
