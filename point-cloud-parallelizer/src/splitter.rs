/// Grid splitting of a cloud extent into tile bounds
use crate::bounds::Bounds;
use crate::constants::DEFAULT_TILE_SIZE;
use crate::error::{Error, Result};
use crate::laz::Cloud;
use crate::pipeline::PipelineTemplate;
use crate::tile::{Tile, TileNames};
use std::path::Path;

/// Options controlling how a single cloud is tiled.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOptions {
    pub tile_size: (f64, f64),
    pub buffer: Option<(f64, f64)>,
    pub remove_buffer: bool,
    /// Restrict tiling to this region of the cloud.
    pub bounding_box: Option<Bounds>,
    /// Dry runs keep only the first N tiles.
    pub limit: Option<usize>,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            buffer: None,
            remove_buffer: false,
            bounding_box: None,
            limit: None,
        }
    }
}

fn grid_shape(extent: &Bounds, tile_size: (f64, f64)) -> Result<(usize, usize)> {
    extent.validate()?;
    let (w, h) = tile_size;
    if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
        return Err(Error::Config(format!(
            "tile size must be positive, got ({}, {})",
            w, h
        )));
    }
    let columns = axis_cells(extent.min_x, extent.max_x, w);
    let rows = axis_cells(extent.min_y, extent.max_y, h);
    Ok((columns, rows))
}

/// Cells of width `step` with a non-empty span on `[min, max)`.
fn axis_cells(min: f64, max: f64, step: f64) -> usize {
    let mut cells = ((max - min) / step).ceil().max(1.0) as usize;
    while cells > 1 && min + (cells - 1) as f64 * step >= max {
        cells -= 1;
    }
    cells
}

/// Number of tiles covering `extent`
pub fn tile_count(extent: &Bounds, tile_size: (f64, f64)) -> Result<usize> {
    let (columns, rows) = grid_shape(extent, tile_size)?;
    Ok(columns * rows)
}

/// Split `extent` into a row-major grid of `tile_size` cells.
///
/// Rows run along y from `min_y`, columns along x from `min_x`. Border
/// cells are clipped to the extent rather than padded. With `limit` the
/// first `min(limit, total)` cells are returned.
pub fn split_bounds(
    extent: &Bounds,
    tile_size: (f64, f64),
    limit: Option<usize>,
) -> Result<Vec<Bounds>> {
    let (columns, rows) = grid_shape(extent, tile_size)?;
    let (w, h) = tile_size;
    let wanted = limit.unwrap_or(usize::MAX).min(columns * rows);

    let mut out = Vec::with_capacity(wanted);
    'rows: for row in 0..rows {
        let min_y = extent.min_y + row as f64 * h;
        let max_y = (min_y + h).min(extent.max_y);
        if min_y >= max_y {
            continue;
        }
        for column in 0..columns {
            if out.len() == wanted {
                break 'rows;
            }
            let min_x = extent.min_x + column as f64 * w;
            let max_x = (min_x + w).min(extent.max_x);
            if min_x >= max_x {
                continue;
            }
            out.push(Bounds {
                min_x,
                min_y,
                max_x,
                max_y,
            });
        }
    }
    Ok(out)
}

/// Build one tile per grid cell of the cloud extent.
pub fn split_cloud(
    cloud: &Cloud,
    template: &PipelineTemplate,
    output_dir: &Path,
    options: &SplitOptions,
) -> Result<Vec<Tile>> {
    let extent = cloud.extent.ok_or_else(|| {
        Error::InvalidExtent(format!("{} has no known extent", cloud.filepath.display()))
    })?;

    let extent = match &options.bounding_box {
        Some(bbox) => extent.intersection(bbox).ok_or_else(|| {
            Error::InvalidExtent(format!(
                "bounding box {} does not overlap cloud extent {}",
                bbox, extent
            ))
        })?,
        None => extent,
    };

    let cells = split_bounds(&extent, options.tile_size, options.limit)?;
    log::info!(
        "Split {} into {} of {} tiles ({:.2} x {:.2})",
        extent,
        cells.len(),
        tile_count(&extent, options.tile_size)?,
        options.tile_size.0,
        options.tile_size.1
    );

    let mut names = TileNames::new();
    Ok(cells
        .into_iter()
        .map(|bounds| {
            let name = names.claim(&bounds.origin_name());
            Tile::new(cloud.clone(), bounds, template.clone(), output_dir)
                .with_name(name)
                .with_buffer(options.buffer, options.remove_buffer)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extent(max_x: f64, max_y: f64) -> Bounds {
        Bounds::new(0.0, 0.0, max_x, max_y).unwrap()
    }

    fn overlap_area(a: &Bounds, b: &Bounds) -> f64 {
        let w = a.max_x.min(b.max_x) - a.min_x.max(b.min_x);
        let h = a.max_y.min(b.max_y) - a.min_y.max(b.min_y);
        w.max(0.0) * h.max(0.0)
    }

    #[test]
    fn even_grid_is_row_major() {
        let cells = split_bounds(&extent(1000.0, 1000.0), (500.0, 500.0), None).unwrap();
        let names: Vec<String> = cells.iter().map(Bounds::origin_name).collect();
        assert_eq!(names, ["0_0", "500_0", "0_500", "500_500"]);
    }

    #[test]
    fn cells_cover_extent_without_overlap() {
        let e = Bounds::new(3.0, -7.0, 1003.5, 250.25).unwrap();
        let cells = split_bounds(&e, (128.0, 64.0), None).unwrap();

        let area: f64 = cells.iter().map(|c| c.width() * c.height()).sum();
        assert!((area - e.width() * e.height()).abs() < 1e-6);

        for (i, a) in cells.iter().enumerate() {
            assert!(a.min_x >= e.min_x && a.max_x <= e.max_x);
            assert!(a.min_y >= e.min_y && a.max_y <= e.max_y);
            for b in &cells[i + 1..] {
                assert_eq!(overlap_area(a, b), 0.0);
            }
        }
    }

    #[test]
    fn border_cells_keep_natural_size() {
        let cells = split_bounds(&extent(600.0, 500.0), (500.0, 500.0), None).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[1], Bounds::new(500.0, 0.0, 600.0, 500.0).unwrap());
    }

    #[test]
    fn count_matches_emitted_cells_on_inexact_division() {
        // 2.1 / 0.3 is slightly above 7.
        let e = extent(2.1, 0.3);
        let cells = split_bounds(&e, (0.3, 0.3), None).unwrap();
        assert_eq!(cells.len(), 7);
        assert_eq!(tile_count(&e, (0.3, 0.3)).unwrap(), 7);
    }

    #[test]
    fn tile_larger_than_extent_gives_one_cell() {
        let cells = split_bounds(&extent(10.0, 10.0), (256.0, 256.0), None).unwrap();
        assert_eq!(cells, vec![extent(10.0, 10.0)]);
    }

    #[test]
    fn limit_takes_deterministic_prefix() {
        let e = extent(1000.0, 1000.0);
        let all = split_bounds(&e, (100.0, 100.0), None).unwrap();
        let first = split_bounds(&e, (100.0, 100.0), Some(7)).unwrap();
        let again = split_bounds(&e, (100.0, 100.0), Some(7)).unwrap();

        assert_eq!(first.len(), 7);
        assert_eq!(first, again);
        assert_eq!(first[..], all[..7]);
    }

    #[test]
    fn limit_above_total_returns_all() {
        let cells = split_bounds(&extent(1000.0, 1000.0), (500.0, 500.0), Some(50)).unwrap();
        assert_eq!(cells.len(), 4);
        assert_eq!(tile_count(&extent(1000.0, 1000.0), (500.0, 500.0)).unwrap(), 4);
    }

    #[test]
    fn degenerate_extent_is_rejected() {
        let flat = Bounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 100.0,
            max_y: 0.0,
        };
        assert!(matches!(
            split_bounds(&flat, (10.0, 10.0), None),
            Err(Error::InvalidExtent(_))
        ));
    }

    #[test]
    fn zero_tile_size_is_config_error() {
        assert!(matches!(
            split_bounds(&extent(10.0, 10.0), (0.0, 10.0), None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn split_cloud_applies_bounding_box_and_buffer() {
        let template = PipelineTemplate::from_value(&json!([
            { "type": "readers.las" },
            { "type": "writers.las" }
        ]))
        .unwrap();
        let cloud = Cloud::with_extent("/in/c.las", extent(1000.0, 1000.0));
        let options = SplitOptions {
            tile_size: (250.0, 250.0),
            buffer: Some((5.0, 5.0)),
            bounding_box: Some(Bounds::new(500.0, 500.0, 2000.0, 2000.0).unwrap()),
            ..SplitOptions::default()
        };

        let tiles = split_cloud(&cloud, &template, Path::new("/out"), &options).unwrap();
        let names: Vec<&str> = tiles.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["500_500", "750_500", "500_750", "750_750"]);
        assert!(tiles.iter().all(|t| t.buffer == Some((5.0, 5.0))));
    }

    #[test]
    fn split_cloud_disambiguates_fractional_origins() {
        let template = PipelineTemplate::from_value(&json!([
            { "type": "readers.las" },
            { "type": "writers.las" }
        ]))
        .unwrap();
        let cloud = Cloud::with_extent("/in/c.las", Bounds::new(0.0, 0.0, 1.0, 0.5).unwrap());
        let options = SplitOptions {
            tile_size: (0.5, 0.5),
            ..SplitOptions::default()
        };

        let tiles = split_cloud(&cloud, &template, Path::new("/out"), &options).unwrap();
        let names: Vec<&str> = tiles.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["0_0", "0_0_1"]);
    }

    #[test]
    fn bounding_box_outside_cloud_is_invalid() {
        let template = PipelineTemplate::from_value(&json!([
            { "type": "readers.las" },
            { "type": "writers.las" }
        ]))
        .unwrap();
        let cloud = Cloud::with_extent("/in/c.las", extent(10.0, 10.0));
        let options = SplitOptions {
            bounding_box: Some(Bounds::new(50.0, 50.0, 60.0, 60.0).unwrap()),
            ..SplitOptions::default()
        };
        assert!(matches!(
            split_cloud(&cloud, &template, Path::new("/out"), &options),
            Err(Error::InvalidExtent(_))
        ));
    }
}
