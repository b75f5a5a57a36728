use crate::bounds::Bounds;
use crate::error::{Error, Result};
use las::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Create LAS file reader for point cloud access.
/// Handles both .las and .laz compressed formats.
pub fn create_reader(file_path: &Path) -> Result<Reader> {
    let file = File::open(file_path).map_err(|e| Error::io(file_path, e))?;
    let buf_reader = BufReader::new(file);
    Ok(Reader::new(buf_reader)?)
}

/// Source point cloud handle. The file itself is never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct Cloud {
    pub filepath: PathBuf,
    pub extent: Option<Bounds>,
}

impl Cloud {
    /// Open a cloud and read its XY extent from the header
    pub fn open(filepath: &Path) -> Result<Self> {
        let reader = create_reader(filepath)?;
        let header = reader.header();
        let las_bounds = header.bounds();
        log::info!(
            "{}: {} points",
            filepath.display(),
            header.number_of_points()
        );

        let extent = Bounds::new(
            las_bounds.min.x,
            las_bounds.min.y,
            las_bounds.max.x,
            las_bounds.max.y,
        )
        .map_err(|_| {
            Error::InvalidExtent(format!(
                "{} has a degenerate extent ({}, {}) to ({}, {})",
                filepath.display(),
                las_bounds.min.x,
                las_bounds.min.y,
                las_bounds.max.x,
                las_bounds.max.y
            ))
        })?;

        Ok(Self {
            filepath: filepath.to_path_buf(),
            extent: Some(extent),
        })
    }

    /// Cloud with an already known extent
    pub fn with_extent(filepath: impl Into<PathBuf>, extent: Bounds) -> Self {
        Self {
            filepath: filepath.into(),
            extent: Some(extent),
        }
    }

    /// Cloud processed as a whole, without tiling
    pub fn whole_file(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
            extent: None,
        }
    }

    /// File stem used as output name in directory mode
    pub fn stem(&self) -> String {
        self.filepath
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_file_reports_path() {
        let err = Cloud::open(Path::new("/nonexistent/cloud.laz")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("cloud.laz"));
    }

    #[test]
    fn stem_strips_extension() {
        let cloud = Cloud::whole_file("/data/in/area_12.laz");
        assert_eq!(cloud.stem(), "area_12");
        assert!(cloud.extent.is_none());
    }
}
