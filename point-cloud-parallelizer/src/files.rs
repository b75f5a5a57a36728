/// Input discovery for directory mode and the empty-output sweep.
use crate::constants::POINT_CLOUD_EXTENSIONS;
use crate::error::{Error, Result};
use crate::laz::create_reader;
use std::fs;
use std::path::{Path, PathBuf};

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

fn is_point_cloud(path: &Path) -> bool {
    extension_of(path).is_some_and(|e| POINT_CLOUD_EXTENSIONS.contains(&e.as_str()))
}

/// LAS/LAZ files of `input_dir`, sorted by path; dry runs keep the first `limit`.
pub fn list_input_files(input_dir: &Path, limit: Option<usize>) -> Result<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        return Err(Error::Config(format!(
            "input directory does not exist: {}",
            input_dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(input_dir).map_err(|e| Error::io(input_dir, e))? {
        let path = entry.map_err(|e| Error::io(input_dir, e))?.path();
        if path.is_file() && is_point_cloud(&path) {
            files.push(path);
        }
    }

    files.sort();
    if let Some(limit) = limit {
        files.truncate(limit);
    }

    log::info!("Found {} input files in {}", files.len(), input_dir.display());
    Ok(files)
}

/// Whether an output holds no points.
/// Zero-byte files are empty; LAS/LAZ files are judged by their header.
fn is_empty_output(path: &Path) -> Result<bool> {
    let size = fs::metadata(path).map_err(|e| Error::io(path, e))?.len();
    if size == 0 {
        return Ok(true);
    }
    if !is_point_cloud(path) {
        return Ok(false);
    }

    match create_reader(path) {
        Ok(reader) => Ok(reader.header().number_of_points() == 0),
        Err(e) => {
            log::warn!("Cannot read header of {}: {}", path.display(), e);
            Ok(false)
        }
    }
}

/// Delete outputs without points and return their paths.
pub fn sweep_empty_outputs(output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !output_dir.is_dir() {
        return Ok(removed);
    }

    for entry in fs::read_dir(output_dir).map_err(|e| Error::io(output_dir, e))? {
        let path = entry.map_err(|e| Error::io(output_dir, e))?.path();
        if path.is_file() && is_empty_output(&path)? {
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            log::info!("Removed empty output {}", path.display());
            removed.push(path);
        }
    }

    removed.sort();
    Ok(removed)
}
