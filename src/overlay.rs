use geo::{Area, BooleanOps, BoundingRect};
use geo_types::{Geometry, MultiPolygon};
use tracing::{debug, info};

use crate::error::{HexError, Result};
use crate::geom::geometry_kind;
use crate::index::{build_tree, candidates};
use crate::layer::{HexLayer, SourceFeature};

/// Distributes totals attached to arbitrary polygons (census blocks, districts) onto hexagons, in
/// proportion to how much of each polygon's area falls in each hexagon.
///
/// This assumes every quantity is spread uniformly over its polygon. A hexagon overlapping
/// several polygons receives the sum of their shares. If the hexagons fully cover the polygons,
/// the totals are conserved, up to floating point error in the clipped areas.
///
/// Areas are measured in squared degrees; only their ratio is used, so no projection is needed
/// for polygons of city scale.
///
/// The output only contains hexagons that overlap some polygon, in the order of `hex_layer`, and
/// exactly the requested `columns`. A `null` value contributes nothing.
pub fn overlay_apportion<S: AsRef<str>>(
    polygons: &[SourceFeature],
    hex_layer: &HexLayer,
    columns: &[S],
) -> Result<HexLayer> {
    let mut shapes: Vec<(MultiPolygon<f64>, f64, Vec<f64>)> = Vec::with_capacity(polygons.len());
    for (idx, feature) in polygons.iter().enumerate() {
        let shape = match &feature.geometry {
            Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon.clone()]),
            Geometry::MultiPolygon(mp) => mp.clone(),
            other => {
                return Err(HexError::InvalidGeometry(format!(
                    "feature {idx} is a {}, but only polygons can be apportioned",
                    geometry_kind(other)
                )));
            }
        };
        let area = shape.unsigned_area();
        if area.is_nan() || area <= 0.0 {
            return Err(HexError::DegenerateGeometry(format!("feature {idx}")));
        }
        let values = columns
            .iter()
            .map(|column| {
                feature
                    .numeric(column.as_ref(), idx)
                    .map(|value| value.unwrap_or(0.0))
            })
            .collect::<Result<Vec<f64>>>()?;
        shapes.push((shape, area, values));
    }

    let tree = build_tree(hex_layer);
    let mut totals: Vec<Option<Vec<f64>>> = vec![None; hex_layer.len()];
    let mut num_fragments = 0;
    for (shape, area, values) in &shapes {
        for cell_idx in candidates(&tree, shape.bounding_rect()) {
            let cell = MultiPolygon::new(vec![hex_layer.cells()[cell_idx].boundary.clone()]);
            let fragment_area = shape.intersection(&cell).unsigned_area();
            // Only touching along an edge
            if fragment_area == 0.0 {
                continue;
            }
            num_fragments += 1;

            let share = fragment_area / area;
            let sums = totals[cell_idx].get_or_insert_with(|| vec![0.0; values.len()]);
            for (sum, value) in sums.iter_mut().zip(values) {
                *sum += value * share;
            }
        }
    }
    debug!(
        "Split {} polygons into {num_fragments} fragments",
        shapes.len()
    );

    let kept: Vec<usize> = totals
        .iter()
        .enumerate()
        .filter(|(_, sums)| sums.is_some())
        .map(|(idx, _)| idx)
        .collect();
    let mut output = hex_layer.subset(&kept);
    for (column_idx, column) in columns.iter().enumerate() {
        let values = kept
            .iter()
            .map(|idx| totals[*idx].as_ref().map(|sums| sums[column_idx]))
            .collect();
        output.set_column(column.as_ref(), values)?;
    }
    info!(
        "Apportioned {} columns from {} polygons onto {} of {} hexagons",
        columns.len(),
        polygons.len(),
        output.len(),
        hex_layer.len()
    );
    Ok(output)
}
