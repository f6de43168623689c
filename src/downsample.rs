use std::collections::HashMap;

use h3o::CellIndex;
use tracing::info;

use crate::error::{HexError, Result};
use crate::hexagons::parse_resolution;
use crate::layer::{Aggregation, AggregationSpec, HexLayer};

/// Re-aggregates a layer onto coarser hexagons.
///
/// Each hexagon maps to its unique ancestor at `target_resolution`, which must be strictly
/// coarser than the layer. Each column in `agg_spec` is reduced over the non-missing values of the
/// hexagons sharing an ancestor; a group with only missing values stays missing. The coarse
/// hexagons get their own geometry, in order of first appearance, and carry only the declared
/// columns.
pub fn downsample(
    hex_layer: &HexLayer,
    target_resolution: u8,
    agg_spec: &AggregationSpec,
) -> Result<HexLayer> {
    let target = parse_resolution(target_resolution)?;
    let source = u8::from(hex_layer.resolution());
    if target_resolution >= source {
        return Err(HexError::InvalidParameter(format!(
            "can't downsample from resolution {source} to {target_resolution}; the target must be coarser"
        )));
    }

    let columns = agg_spec
        .iter()
        .map(|(column, aggregation)| match hex_layer.column(column) {
            Some(values) => Ok((column, aggregation, values)),
            None => Err(HexError::MissingColumn {
                column: column.to_string(),
                record: "the hexagon layer".to_string(),
            }),
        })
        .collect::<Result<Vec<(&str, Aggregation, &[Option<f64>])>>>()?;

    let mut ancestors: Vec<CellIndex> = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    let mut group_per_ancestor: HashMap<CellIndex, usize> = HashMap::new();
    for (idx, cell) in hex_layer.cells().iter().enumerate() {
        let ancestor = cell.id.parent(target).ok_or_else(|| {
            HexError::InvalidParameter(format!(
                "{} has no ancestor at resolution {target_resolution}",
                cell.id
            ))
        })?;
        let group = *group_per_ancestor.entry(ancestor).or_insert_with(|| {
            ancestors.push(ancestor);
            members.push(Vec::new());
            ancestors.len() - 1
        });
        members[group].push(idx);
    }

    let mut output = HexLayer::from_cells(target, ancestors)?;
    for (column, aggregation, values) in columns {
        let reduced = members
            .iter()
            .map(|group| aggregation.reduce(group.iter().filter_map(|idx| values[*idx])))
            .collect();
        output.set_column(column, reduced)?;
    }
    info!(
        "Downsampled {} hexagons at resolution {source} into {} at {target_resolution}",
        hex_layer.len(),
        output.len()
    );
    Ok(output)
}
