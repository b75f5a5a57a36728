/// Temp directory records: one resolved pipeline per unfinished tile.
use crate::constants::{BUFFER_STATE_EXTENSION, PARTIAL_SUFFIX, PLAN_MARKER, RECORD_EXTENSION};
use crate::error::{Error, Result};
use crate::pipeline::ResolvedPipeline;
use crate::tile::BufferState;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Handle on the temp directory holding pending pipeline records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Open the store, creating the directory if needed
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, RECORD_EXTENSION))
    }

    /// Persist a pipeline under `name`.
    /// Written to a hidden partial file first so a crash never leaves a
    /// truncated record behind.
    pub fn write(&self, name: &str, pipeline: &ResolvedPipeline) -> Result<PathBuf> {
        let path = self.record_path(name);
        let partial = self.dir.join(format!(
            ".{}.{}.{}",
            name, RECORD_EXTENSION, PARTIAL_SUFFIX
        ));

        fs::write(&partial, pipeline.to_json()?).map_err(|e| Error::io(&partial, e))?;
        fs::rename(&partial, &path).map_err(|e| Error::io(&path, e))?;
        log::debug!("Wrote record {}", path.display());
        Ok(path)
    }

    /// Keep non-default buffer flags beside the record of `name`
    pub fn write_buffer_state(&self, name: &str, state: &BufferState) -> Result<()> {
        if *state == BufferState::default() {
            return Ok(());
        }
        let path = self.dir.join(format!("{}.{}", name, BUFFER_STATE_EXTENSION));
        fs::write(&path, serde_json::to_string(state)?).map_err(|e| Error::io(&path, e))
    }

    /// Buffer flags stored beside `record`, default when there are none
    pub fn load_buffer_state(record: &Path) -> Result<BufferState> {
        let path = record.with_extension(BUFFER_STATE_EXTENSION);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BufferState::default()),
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    fn plan_marker(&self) -> PathBuf {
        self.dir.join(PLAN_MARKER)
    }

    /// Mark the start of a plan. Until `commit_plan`, the records in the
    /// store are an incomplete work list.
    pub fn begin_plan(&self) -> Result<()> {
        let marker = self.plan_marker();
        fs::write(&marker, "").map_err(|e| Error::io(&marker, e))
    }

    /// Every record of the plan is written
    pub fn commit_plan(&self) -> Result<()> {
        remove_if_present(&self.plan_marker())
    }

    pub fn has_open_plan(&self) -> bool {
        self.plan_marker().is_file()
    }

    /// Delete every record, sidecar and partial file, then the plan marker.
    /// Returns the number of records removed.
    pub fn discard_plan(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))? {
            let path = entry.map_err(|e| Error::io(&self.dir, e))?.path();
            if !path.is_file() {
                continue;
            }
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            let owned = [RECORD_EXTENSION, BUFFER_STATE_EXTENSION, PARTIAL_SUFFIX];
            if owned.contains(&extension.as_str()) {
                remove_if_present(&path)?;
                if extension == RECORD_EXTENSION {
                    removed += 1;
                }
            }
        }
        remove_if_present(&self.plan_marker())?;
        log::debug!("Discarded {} records from {}", removed, self.dir.display());
        Ok(removed)
    }

    /// Record paths currently in the store, sorted by name.
    /// Leftover partial files from an interrupted write are removed.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut records = Vec::new();

        for entry in fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))? {
            let path = entry.map_err(|e| Error::io(&self.dir, e))?.path();
            if !path.is_file() || path.file_name().is_some_and(|n| n == PLAN_MARKER) {
                continue;
            }

            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();

            if extension == PARTIAL_SUFFIX {
                log::warn!("Discarding interrupted record {}", path.display());
                fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            } else if extension == RECORD_EXTENSION {
                records.push(path);
            } else if extension != BUFFER_STATE_EXTENSION {
                log::warn!("Ignoring unexpected file in temp directory: {}", path.display());
            }
        }

        records.sort();
        Ok(records)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.list()?.is_empty())
    }

    /// Load a record and the tile name encoded in its filename
    pub fn load(path: &Path) -> Result<(String, ResolvedPipeline)> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let pipeline = ResolvedPipeline::from_json(&text)?;
        let name = path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        Ok((name, pipeline))
    }

    /// Delete a completed record and its buffer flags. Already missing
    /// records are fine.
    pub fn remove(path: &Path) -> Result<()> {
        remove_if_present(path)?;
        remove_if_present(&path.with_extension(BUFFER_STATE_EXTENSION))
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}
