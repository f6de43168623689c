use geo::BoundingRect;
use tracing::{debug, info};

use crate::error::Result;
use crate::index::{build_tree, candidates};
use crate::layer::{AggregationSpec, HexLayer, Predicate, SourceFeature};

/// Spatially joins features onto hexagons and reduces the declared columns per hexagon.
///
/// Every (feature, hexagon) pair passing `predicate` assigns that feature to that hexagon, so a
/// feature straddling a border counts towards every hexagon it touches. Each column in
/// `agg_spec` is then reduced over the features assigned to a hexagon. Hexagons without any
/// assigned feature get a missing value, not 0; `null` properties are skipped the same way.
///
/// The input layer is cloned: cells, their order and any unrelated columns stay as they are, and
/// the declared columns are added or replaced.
pub fn aggregate(
    hex_layer: &HexLayer,
    source_features: &[SourceFeature],
    predicate: Predicate,
    agg_spec: &AggregationSpec,
) -> Result<HexLayer> {
    // Extract every value before joining anything, so bad input fails before any work happens
    let mut values_per_column: Vec<Vec<Option<f64>>> = Vec::with_capacity(agg_spec.len());
    for (column, _) in agg_spec.iter() {
        let values = source_features
            .iter()
            .enumerate()
            .map(|(idx, feature)| feature.numeric(column, idx))
            .collect::<Result<Vec<_>>>()?;
        values_per_column.push(values);
    }

    let tree = build_tree(hex_layer);
    let mut features_per_cell: Vec<Vec<usize>> = vec![Vec::new(); hex_layer.len()];
    let mut num_pairs = 0;
    for (feature_idx, feature) in source_features.iter().enumerate() {
        for cell_idx in candidates(&tree, feature.geometry.bounding_rect()) {
            if predicate.test(&feature.geometry, &hex_layer.cells()[cell_idx].boundary) {
                features_per_cell[cell_idx].push(feature_idx);
                num_pairs += 1;
            }
        }
    }
    debug!(
        "{} features matched {} hexagons with {:?}, forming {} pairs",
        source_features.len(),
        features_per_cell.iter().filter(|x| !x.is_empty()).count(),
        predicate,
        num_pairs
    );

    let mut output = hex_layer.clone();
    for ((column, aggregation), values) in agg_spec.iter().zip(&values_per_column) {
        let reduced = features_per_cell
            .iter()
            .map(|features| aggregation.reduce(features.iter().filter_map(|idx| values[*idx])))
            .collect();
        output.set_column(column, reduced)?;
    }
    info!(
        "Aggregated {} columns from {} features onto {} hexagons",
        agg_spec.len(),
        source_features.len(),
        output.len()
    );
    Ok(output)
}
