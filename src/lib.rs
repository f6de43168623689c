//! This crate bins geographic data into H3 hexagons. A region is first tiled into hexagons at
//! some resolution. Then values attached to points or shapes can be aggregated onto those
//! hexagons, either by spatially joining features (`aggregate`) or by splitting polygon totals
//! by overlapping area (`overlay_apportion`). Finally, a layer can be rolled up to a coarser
//! resolution with `downsample`.
//!
//! All input is assumed to be in WGS84 longitude/latitude. Nothing is reprojected.
//!
//! Every operation is a pure function: it validates its input first, then returns a new
//! `HexLayer` without modifying anything it was given.

mod aggregate;
mod downsample;
mod error;
mod geom;
mod hexagons;
mod index;
mod io;
mod layer;
mod nearest;
mod overlay;

pub use self::aggregate::aggregate;
pub use self::downsample::downsample;
pub use self::error::{HexError, Result};
pub use self::geom::{filter_to_bounds, merge_regions, remove_features, swap_xy};
pub use self::hexagons::{cell_boundary, generate_hexagons};
pub use self::io::{
    load_features, load_layer, load_points_csv, load_region, write_layer, HEX_KEY,
};
pub use self::layer::{Aggregation, AggregationSpec, HexCell, HexLayer, Predicate, SourceFeature};
pub use self::nearest::{nn_search, DistanceMetric};
pub use self::overlay::overlay_apportion;
