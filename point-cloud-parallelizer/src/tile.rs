/// Per-tile pipeline instantiation
use crate::bounds::Bounds;
use crate::error::{Error, Result};
use crate::laz::Cloud;
use crate::pipeline::{PipelineTemplate, ResolvedPipeline};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Buffer intent carried past linking.
///
/// `applied` means the crop was grown by the buffer. `pending_removal` means
/// the buffered margin must be cropped out again after execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferState {
    pub applied: bool,
    pub pending_removal: bool,
}

/// One spatial subdivision (or one whole input file) with its own template.
#[derive(Debug, Clone)]
pub struct Tile {
    pub cloud: Cloud,
    /// `None` for whole-file tiles in directory mode.
    pub bounds: Option<Bounds>,
    pub name: String,
    pub output_dir: PathBuf,
    pub buffer: Option<(f64, f64)>,
    pub remove_buffer: bool,
    template: PipelineTemplate,
}

/// Result of linking a tile: everything needed to schedule it.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedTile {
    pub name: String,
    pub pipeline: ResolvedPipeline,
    pub crop_bounds: Option<Bounds>,
    pub buffer_state: BufferState,
}

impl Tile {
    /// Create a spatial tile named after its truncated origin
    pub fn new(
        cloud: Cloud,
        bounds: Bounds,
        template: PipelineTemplate,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cloud,
            name: bounds.origin_name(),
            bounds: Some(bounds),
            output_dir: output_dir.into(),
            buffer: None,
            remove_buffer: false,
            template,
        }
    }

    /// Create a tile covering a whole input file, named after its stem
    pub fn whole_file(
        cloud: Cloud,
        template: PipelineTemplate,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: cloud.stem(),
            cloud,
            bounds: None,
            output_dir: output_dir.into(),
            buffer: None,
            remove_buffer: false,
            template,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_buffer(mut self, buffer: Option<(f64, f64)>, remove_buffer: bool) -> Self {
        self.buffer = buffer;
        self.remove_buffer = remove_buffer;
        self
    }

    /// Resolve the tile's template into a concrete pipeline.
    ///
    /// In single-file mode the pipeline gains a crop filter over the tile
    /// bounds, grown by the buffer if one is set. With `remove_buffer` the
    /// crop goes back to the tile bounds and the removal is recorded in the
    /// returned [`BufferState`]. Directory mode processes the file as is.
    /// The template is consumed: a tile is linked exactly once.
    pub fn link_pipeline(self, is_single_file: bool) -> Result<LinkedTile> {
        let Tile {
            cloud,
            bounds,
            name,
            output_dir,
            buffer,
            remove_buffer,
            mut template,
        } = self;

        let extension = template.output_extension()?;
        let mut buffer_state = BufferState::default();
        let mut crop_bounds = None;

        if is_single_file {
            let bounds = bounds.ok_or_else(|| {
                Error::InvalidExtent(format!("tile `{}` has no bounds to crop to", name))
            })?;
            let mut crop = bounds;

            if let Some(buffer) = buffer {
                crop = crop.expanded(buffer)?;
                buffer_state.applied = true;
                if remove_buffer {
                    crop = crop.contracted(buffer)?;
                    buffer_state.pending_removal = true;
                }
            }

            template.add_crop_filter(&crop);
            crop_bounds = Some(crop);
        }

        template.set_readers_filename(&cloud.filepath);
        template.set_writers_filename(&output_dir.join(format!("{}{}", name, extension)));

        Ok(LinkedTile {
            name,
            pipeline: template.resolve(),
            crop_bounds,
            buffer_state,
        })
    }
}

impl std::fmt::Display for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.bounds {
            Some(bounds) => write!(f, "{} - {}", self.name, bounds),
            None => write!(f, "{} - {}", self.name, self.cloud.filepath.display()),
        }
    }
}

/// Names handed out in one run. Collisions get a numeric suffix.
#[derive(Debug, Default)]
pub struct TileNames {
    used: HashSet<String>,
}

impl TileNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `base`, or the first free `base_N` if it is taken
    pub fn claim(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", base, n);
            if self.used.insert(candidate.clone()) {
                log::warn!("tile name `{}` already used, renamed to `{}`", base, candidate);
                return candidate;
            }
            n += 1;
        }
    }
}
