use std::fmt;
use std::str::FromStr;

use geo::{Distance, Euclidean, Haversine};
use geo_types::Point;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use tracing::debug;

use crate::error::{HexError, Result};

/// How `nn_search` measures the distance between two points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Great-circle distance in kilometers. Points are longitude/latitude degrees.
    Haversine,
    /// Planar distance, in whatever units the coordinates use.
    Euclidean,
}

impl FromStr for DistanceMetric {
    type Err = HexError;

    fn from_str(x: &str) -> Result<Self> {
        match x {
            "haversine" => Ok(DistanceMetric::Haversine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            _ => Err(HexError::InvalidParameter(format!(
                "unknown distance metric {x:?}; use haversine or euclidean"
            ))),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DistanceMetric::Haversine => write!(f, "haversine"),
            DistanceMetric::Euclidean => write!(f, "euclidean"),
        }
    }
}

/// For every query point, finds the closest point of `tree_points`. Returns one
/// `(distance, index into tree_points)` pair per query point, in query order. When several tree
/// points are equally close, any of them may be returned.
///
/// A typical use is matching hexagon centroids to the nearest facility.
pub fn nn_search(
    tree_points: &[Point<f64>],
    query_points: &[Point<f64>],
    metric: DistanceMetric,
) -> Result<Vec<(f64, usize)>> {
    if tree_points.is_empty() {
        return Err(HexError::InvalidParameter(
            "nearest neighbour search needs at least one point to search".to_string(),
        ));
    }
    for pt in tree_points.iter().chain(query_points) {
        if !pt.x().is_finite() || !pt.y().is_finite() {
            return Err(HexError::InvalidGeometry(format!(
                "non-finite coordinate {:?}",
                pt.0
            )));
        }
    }

    let results = match metric {
        DistanceMetric::Haversine => {
            // The straight-line order of points on the unit sphere matches their great-circle
            // order, so a 3D tree finds the same neighbour as a haversine search would
            let tree = RTree::bulk_load(
                tree_points
                    .iter()
                    .enumerate()
                    .map(|(idx, pt)| GeomWithData::new(unit_vector(*pt), idx))
                    .collect(),
            );
            query_points
                .iter()
                .map(|query| {
                    let nearest = nearest_index(&tree, &unit_vector(*query))?;
                    let meters = Haversine.distance(*query, tree_points[nearest]);
                    Ok((meters / 1000.0, nearest))
                })
                .collect::<Result<Vec<_>>>()?
        }
        DistanceMetric::Euclidean => {
            let tree = RTree::bulk_load(
                tree_points
                    .iter()
                    .enumerate()
                    .map(|(idx, pt)| GeomWithData::new([pt.x(), pt.y()], idx))
                    .collect(),
            );
            query_points
                .iter()
                .map(|query| {
                    let nearest = nearest_index(&tree, &[query.x(), query.y()])?;
                    Ok((Euclidean.distance(*query, tree_points[nearest]), nearest))
                })
                .collect::<Result<Vec<_>>>()?
        }
    };
    debug!(
        "Matched {} query points against {} points by {metric} distance",
        query_points.len(),
        tree_points.len()
    );
    Ok(results)
}

fn nearest_index<const N: usize>(
    tree: &RTree<GeomWithData<[f64; N], usize>>,
    query: &[f64; N],
) -> Result<usize> {
    tree.nearest_neighbor(query)
        .map(|found| found.data)
        .ok_or_else(|| HexError::InvalidParameter("the search tree is empty".to_string()))
}

fn unit_vector(pt: Point<f64>) -> [f64; 3] {
    let lon = pt.x().to_radians();
    let lat = pt.y().to_radians();
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

#[cfg(test)]
mod tests {
    use geo_types::point;

    use super::*;

    fn tree() -> Vec<Point<f64>> {
        vec![
            point!(x: -77.0, y: -12.0),
            point!(x: -78.0, y: -15.0),
            point!(x: 0.0, y: 0.0),
            point!(x: 45.0, y: 23.0),
            point!(x: 2.0, y: 5.0),
        ]
    }

    #[test]
    fn test_euclidean() {
        let query = vec![
            point!(x: 0.0, y: -1.0),
            point!(x: -76.0, y: -11.0),
            point!(x: -1.0, y: -1.0),
            point!(x: 200.0, y: 23.0),
        ];
        let found = nn_search(&tree(), &query, DistanceMetric::Euclidean).unwrap();
        let indices: Vec<usize> = found.iter().map(|(_, idx)| *idx).collect();
        assert_eq!(indices, vec![2, 0, 2, 3]);
        let expected = [1.0, 2.0_f64.sqrt(), 2.0_f64.sqrt(), 155.0];
        for ((dist, _), expected) in found.iter().zip(expected) {
            assert!((dist - expected).abs() < 1e-9, "{dist} should be {expected}");
        }
    }

    #[test]
    fn test_haversine() {
        let query = vec![point!(x: 0.0, y: -1.0), point!(x: -1.0, y: -1.0)];
        let found = nn_search(&tree(), &query, DistanceMetric::Haversine).unwrap();
        assert_eq!(found[0].1, 2);
        assert_eq!(found[1].1, 2);
        // One degree along a meridian, then roughly the diagonal of a 1 degree square
        assert!((found[0].0 - 111.195).abs() < 0.01, "{}", found[0].0);
        assert!((found[1].0 - 157.25).abs() < 0.01, "{}", found[1].0);
    }

    #[test]
    fn test_haversine_wraps_the_antimeridian() {
        let tree = vec![point!(x: -179.5, y: 0.0), point!(x: 170.0, y: 0.0)];
        let query = vec![point!(x: 179.5, y: 0.0)];

        let (dist, idx) = nn_search(&tree, &query, DistanceMetric::Haversine).unwrap()[0];
        assert_eq!(idx, 0, "one degree across 180 beats 9.5 degrees west");
        assert!((dist - 111.195).abs() < 0.01, "{dist}");

        let (_, idx) = nn_search(&tree, &query, DistanceMetric::Euclidean).unwrap()[0];
        assert_eq!(idx, 1, "planar distance doesn't know about the wrap");
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            nn_search(&[], &[], DistanceMetric::Haversine),
            Err(HexError::InvalidParameter(_))
        ));
        assert_eq!(
            nn_search(&tree(), &[], DistanceMetric::Euclidean),
            Ok(Vec::new())
        );
        assert!(matches!(
            "manhattan".parse::<DistanceMetric>(),
            Err(HexError::InvalidParameter(_))
        ));
    }
}
