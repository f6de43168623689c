use geo::BoundingRect;
use geo_types::Rect;
use rstar::{RTree, RTreeObject, AABB};

use crate::layer::HexLayer;

/// The bounding box of one hexagon, pointing back to its position in the layer.
pub(crate) struct CellEnvelope {
    pub idx: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for CellEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

pub(crate) fn build_tree(layer: &HexLayer) -> RTree<CellEnvelope> {
    let cells = layer
        .cells()
        .iter()
        .enumerate()
        .filter_map(|(idx, cell)| {
            cell.boundary.bounding_rect().map(|bounds| CellEnvelope {
                idx,
                envelope: to_aabb(bounds),
            })
        })
        .collect();
    RTree::bulk_load(cells)
}

/// Indices of the hexagons whose bounding box touches `bounds`. Callers still have to run an exact
/// test on each candidate.
pub(crate) fn candidates(tree: &RTree<CellEnvelope>, bounds: Option<Rect<f64>>) -> Vec<usize> {
    match bounds {
        Some(bounds) => {
            let mut indices: Vec<usize> = tree
                .locate_in_envelope_intersecting(&to_aabb(bounds))
                .map(|cell| cell.idx)
                .collect();
            // Keep the layer's order, so output doesn't depend on the tree's layout
            indices.sort_unstable();
            indices
        }
        None => Vec::new(),
    }
}

fn to_aabb(bounds: Rect<f64>) -> AABB<[f64; 2]> {
    let min = bounds.min();
    let max = bounds.max();
    AABB::from_corners([min.x, min.y], [max.x, max.y])
}
