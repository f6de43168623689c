//! Helpers to prepare inputs before binning them into hexagons.

use geo::{BooleanOps, BoundingRect, Intersects, MapCoords};
use geo_types::{Coord, Geometry, MultiPolygon, Rect};
use tracing::debug;

use crate::error::{HexError, Result};
use crate::layer::SourceFeature;

/// Unions several boundaries (for example, neighbouring districts fetched separately) into one
/// region. Every input must be a polygon or multipolygon.
pub fn merge_regions(regions: &[Geometry<f64>]) -> Result<MultiPolygon<f64>> {
    let mut merged = MultiPolygon::new(Vec::new());
    for (idx, region) in regions.iter().enumerate() {
        let next = match region {
            Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon.clone()]),
            Geometry::MultiPolygon(mp) => mp.clone(),
            other => {
                return Err(HexError::InvalidGeometry(format!(
                    "region {idx} is a {}, not a Polygon or MultiPolygon",
                    geometry_kind(other)
                )));
            }
        };
        merged = merged.union(&next);
    }
    debug!(
        "Merged {} regions into {} polygons",
        regions.len(),
        merged.0.len()
    );
    Ok(merged)
}

/// Keeps the features whose bounding box lies inside the region's bounding box, edges included.
/// This is a cheap prefilter for large point datasets like population grids; it doesn't test the
/// region's actual shape.
pub fn filter_to_bounds(features: &[SourceFeature], region: &Geometry<f64>) -> Vec<SourceFeature> {
    let bounds = if let Some(bounds) = region.bounding_rect() {
        bounds
    } else {
        return Vec::new();
    };
    features
        .iter()
        .filter(|feature| {
            feature
                .geometry
                .bounding_rect()
                .map(|rect| rect_within(&rect, &bounds))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Drops every feature touching the `[min_x, min_y, max_x, max_y]` box, such as an island that
/// shouldn't be part of a study area.
pub fn remove_features(features: &[SourceFeature], bounds: [f64; 4]) -> Vec<SourceFeature> {
    let [min_x, min_y, max_x, max_y] = bounds;
    let rect = Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y });
    let kept: Vec<SourceFeature> = features
        .iter()
        .filter(|feature| !feature.geometry.intersects(&rect))
        .cloned()
        .collect();
    debug!("Removed {} features", features.len() - kept.len());
    kept
}

/// Swaps the x and y of every coordinate, for data that arrives in (lat, lon) order.
pub fn swap_xy(geometry: &Geometry<f64>) -> Geometry<f64> {
    geometry.map_coords(|Coord { x, y }| Coord { x: y, y: x })
}

pub(crate) fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

fn rect_within(inner: &Rect<f64>, outer: &Rect<f64>) -> bool {
    inner.min().x >= outer.min().x
        && inner.min().y >= outer.min().y
        && inner.max().x <= outer.max().x
        && inner.max().y <= outer.max().y
}

#[cfg(test)]
mod tests {
    use geo::Area;
    use geo_types::{point, polygon, GeometryCollection, Point};

    use super::*;

    #[test]
    fn test_merge_adjacent_squares() {
        let left: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ]
        .into();
        let right: Geometry<f64> = polygon![
            (x: 1.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 1.0),
            (x: 1.0, y: 1.0),
        ]
        .into();
        let merged = merge_regions(&[left, right]).unwrap();
        assert_eq!(merged.0.len(), 1, "adjacent squares should fuse: {merged:?}");
        assert!((merged.unsigned_area() - 2.0).abs() < 1e-9);

        assert!(matches!(
            merge_regions(&[Point::new(0.0, 0.0).into()]),
            Err(HexError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_filter_and_remove() {
        let region: Geometry<f64> = polygon![
            (x: -77.2, y: -12.2),
            (x: -76.8, y: -12.2),
            (x: -76.8, y: -11.8),
            (x: -77.2, y: -11.8),
        ]
        .into();
        let features: Vec<SourceFeature> = [(-77.0, -12.0), (-76.8, -11.8), (-70.0, -12.0)]
            .into_iter()
            .map(|(x, y)| SourceFeature::new(Point::new(x, y)))
            .collect();

        let inside = filter_to_bounds(&features, &region);
        assert_eq!(inside.len(), 2, "the corner point counts as inside");

        let kept = remove_features(&inside, [-77.1, -12.1, -76.9, -11.9]);
        assert_eq!(kept, vec![features[1].clone()]);
    }

    #[test]
    fn test_swap_xy_recurses() {
        let collection = Geometry::GeometryCollection(GeometryCollection(vec![
            point!(x: -77.0, y: -12.0).into(),
            polygon![(x: 0.0, y: 1.0), (x: 2.0, y: 3.0), (x: 4.0, y: 5.0)].into(),
        ]));
        let expected = Geometry::GeometryCollection(GeometryCollection(vec![
            point!(x: -12.0, y: -77.0).into(),
            polygon![(x: 1.0, y: 0.0), (x: 3.0, y: 2.0), (x: 5.0, y: 4.0)].into(),
        ]));
        assert_eq!(swap_xy(&collection), expected);
    }
}
