use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use geo_types::{Geometry, MultiPolygon};
use tracing_subscriber::EnvFilter;

use hexbin::{AggregationSpec, HexLayer, Predicate, SourceFeature};

#[derive(Parser)]
#[clap(about, version)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tile a region with H3 hexagons
    Hexagons {
        /// GeoJSON files with the region's polygons. With more than one file, the regions are
        /// unioned first.
        #[clap(long, required = true)]
        region: Vec<String>,
        /// From 0 to 15; higher means smaller hexagons
        #[clap(long)]
        resolution: u8,
        /// Path to a .geojson or .fgb file to create
        #[clap(long)]
        output: String,
    },
    /// Join points or shapes onto hexagons and aggregate their properties
    Aggregate {
        /// A layer written by the `hexagons` subcommand
        #[clap(long)]
        hexagons: String,
        /// GeoJSON features, or a CSV file with one point per row
        #[clap(long)]
        features: String,
        /// For CSV input, the longitude column
        #[clap(long, default_value = "longitude")]
        lon_key: String,
        /// For CSV input, the latitude column
        #[clap(long, default_value = "latitude")]
        lat_key: String,
        /// Drop features touching this `min_x,min_y,max_x,max_y` box before joining. Negative
        /// numbers need the `--exclude=-77.2,...` form.
        #[clap(long)]
        exclude: Option<String>,
        /// One of intersects, contains, within. Reads as "feature <predicate> hexagon".
        #[clap(long, default_value = "intersects")]
        predicate: String,
        /// Columns to produce, like `population:sum`. The operator is sum, min, or max.
        #[clap(long = "agg", required = true)]
        agg: Vec<String>,
        #[clap(long)]
        output: String,
    },
    /// Split polygon totals onto hexagons by overlapping area
    Overlay {
        #[clap(long)]
        hexagons: String,
        /// GeoJSON polygons carrying the totals
        #[clap(long)]
        polygons: String,
        /// Which numeric properties to split
        #[clap(long = "column", required = true)]
        columns: Vec<String>,
        #[clap(long)]
        output: String,
    },
    /// Roll a hexagon layer up to a coarser resolution
    Downsample {
        #[clap(long)]
        hexagons: String,
        /// Must be coarser (smaller) than the input layer's resolution
        #[clap(long)]
        resolution: u8,
        /// How to combine each column, like `population:sum`
        #[clap(long = "agg", required = true)]
        agg: Vec<String>,
        #[clap(long)]
        output: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Args::parse().command {
        Command::Hexagons {
            region,
            resolution,
            output,
        } => {
            let region = if region.len() == 1 {
                hexbin::load_region(&region[0])?
            } else {
                let mut regions = Vec::new();
                for path in &region {
                    regions.push(hexbin::load_region(path)?);
                }
                hexbin::merge_regions(&regions)?.into()
            };
            let layer = hexbin::generate_hexagons(&region, resolution)?;
            hexbin::write_layer(&layer, &output)?;
        }
        Command::Aggregate {
            hexagons,
            features,
            lon_key,
            lat_key,
            exclude,
            predicate,
            agg,
            output,
        } => {
            // Parse everything cheap before loading large inputs
            let predicate: Predicate = predicate.parse()?;
            let agg_spec = AggregationSpec::parse(&agg)?;
            let exclude = exclude.map(|x| parse_bounds(&x)).transpose()?;

            let layer = hexbin::load_layer(&hexagons)?;
            let mut features = if features.ends_with(".csv") {
                // Point grids usually cover a whole country; only keep what's near the hexagons
                let points = hexbin::load_points_csv(&features, &lon_key, &lat_key)?;
                hexbin::filter_to_bounds(&points, &extent(&layer))
            } else {
                hexbin::load_features(&features)?
            };
            if let Some(bounds) = exclude {
                features = hexbin::remove_features(&features, bounds);
            }
            let layer = hexbin::aggregate(&layer, &features, predicate, &agg_spec)?;
            hexbin::write_layer(&layer, &output)?;
        }
        Command::Overlay {
            hexagons,
            polygons,
            columns,
            output,
        } => {
            let layer = hexbin::load_layer(&hexagons)?;
            let polygons: Vec<SourceFeature> = hexbin::load_features(&polygons)?;
            let layer = hexbin::overlay_apportion(&polygons, &layer, &columns)?;
            hexbin::write_layer(&layer, &output)?;
        }
        Command::Downsample {
            hexagons,
            resolution,
            agg,
            output,
        } => {
            let agg_spec = AggregationSpec::parse(&agg)?;
            let layer = hexbin::load_layer(&hexagons)?;
            let layer = hexbin::downsample(&layer, resolution, &agg_spec)?;
            hexbin::write_layer(&layer, &output)?;
        }
    }
    Ok(())
}

fn parse_bounds(x: &str) -> Result<[f64; 4]> {
    let values = x
        .split(',')
        .map(|value| value.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;
    if let [min_x, min_y, max_x, max_y] = values[..] {
        Ok([min_x, min_y, max_x, max_y])
    } else {
        bail!("--exclude needs 4 comma-separated numbers, got {x}");
    }
}

/// All of a layer's hexagons as one geometry, to prefilter features by bounding box.
fn extent(layer: &HexLayer) -> Geometry<f64> {
    MultiPolygon::new(
        layer
            .cells()
            .iter()
            .map(|cell| cell.boundary.clone())
            .collect(),
    )
    .into()
}
