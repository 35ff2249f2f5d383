//! ESRI ASCII elevation grid backing the `--dem` option.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glider_engine::ElevationService;
use ndarray::Array2;
use tracing::info;

/// Regular lat/lon elevation grid, row 0 is the northern edge.
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    west: f64,
    south: f64,
    cell_size: f64,
    nodata: Option<f32>,
    heights: Array2<f32>,
}

#[derive(Default)]
struct GridHeader {
    ncols: Option<usize>,
    nrows: Option<usize>,
    x: Option<(f64, bool)>,
    y: Option<(f64, bool)>,
    cell_size: Option<f64>,
    nodata: Option<f32>,
}

impl ElevationGrid {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let grid =
            Self::parse(&text).with_context(|| format!("failed to parse {}", path.display()))?;
        let (rows, cols) = grid.heights.dim();
        info!(
            "Loaded elevation grid {}: {}x{} cells of {}°",
            path.display(),
            cols,
            rows,
            grid.cell_size
        );
        Ok(grid)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut header = GridHeader::default();
        let mut tokens = text.split_whitespace().peekable();

        while let Some(key) = tokens.peek().copied() {
            if !key.starts_with(|c: char| c.is_ascii_alphabetic()) {
                break;
            }
            tokens.next();
            let value = tokens
                .next()
                .ok_or_else(|| anyhow!("header '{}' has no value", key))?;
            let number: f64 = value
                .parse()
                .with_context(|| format!("invalid header value '{}' for {}", value, key))?;
            match key.to_ascii_lowercase().as_str() {
                "ncols" => header.ncols = Some(number as usize),
                "nrows" => header.nrows = Some(number as usize),
                "xllcorner" => header.x = Some((number, false)),
                "xllcenter" => header.x = Some((number, true)),
                "yllcorner" => header.y = Some((number, false)),
                "yllcenter" => header.y = Some((number, true)),
                "cellsize" => header.cell_size = Some(number),
                "nodata_value" => header.nodata = Some(number as f32),
                other => return Err(anyhow!("unknown grid header '{}'", other)),
            }
        }

        let ncols = header.ncols.ok_or_else(|| anyhow!("missing ncols"))?;
        let nrows = header.nrows.ok_or_else(|| anyhow!("missing nrows"))?;
        let cell_size = header
            .cell_size
            .filter(|c| *c > 0.0)
            .ok_or_else(|| anyhow!("missing or non-positive cellsize"))?;
        let (x, x_center) = header.x.ok_or_else(|| anyhow!("missing xllcorner"))?;
        let (y, y_center) = header.y.ok_or_else(|| anyhow!("missing yllcorner"))?;
        let half = cell_size / 2.0;

        let values = tokens
            .map(|t| {
                t.parse::<f32>()
                    .with_context(|| format!("invalid elevation value '{}'", t))
            })
            .collect::<Result<Vec<f32>>>()?;
        if values.len() != nrows * ncols {
            return Err(anyhow!(
                "expected {} elevation values, found {}",
                nrows * ncols,
                values.len()
            ));
        }
        let heights = Array2::from_shape_vec((nrows, ncols), values)
            .context("elevation values do not fit the grid shape")?;

        Ok(Self {
            west: if x_center { x - half } else { x },
            south: if y_center { y - half } else { y },
            cell_size,
            nodata: header.nodata,
            heights,
        })
    }

    fn cell(&self, latitude: f64, longitude: f64) -> Option<(usize, usize)> {
        let (rows, cols) = self.heights.dim();
        let col = ((longitude - self.west) / self.cell_size).floor();
        let from_south = ((latitude - self.south) / self.cell_size).floor();
        if col < 0.0 || from_south < 0.0 || col >= cols as f64 || from_south >= rows as f64 {
            return None;
        }
        Some((rows - 1 - from_south as usize, col as usize))
    }
}

impl ElevationService for ElevationGrid {
    fn elevation_at(&self, latitude: f64, longitude: f64) -> Option<f64> {
        let height = *self.heights.get(self.cell(latitude, longitude)?)?;
        if self.nodata == Some(height) || !height.is_finite() {
            return None;
        }
        Some(f64::from(height))
    }
}
