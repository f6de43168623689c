use geo::Area;
use geo_types::{Coord, Geometry, LineString, Polygon};
use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::{CellIndex, Resolution};
use tracing::{debug, info};

use crate::error::{HexError, Result};
use crate::geom::geometry_kind;
use crate::layer::HexLayer;

/// Tiles a polygon or multipolygon region with H3 hexagons at the given resolution (0 to 15,
/// higher is smaller).
///
/// A hexagon is included when its center lies inside the region. Each part of a multipolygon is
/// filled on its own, then the per-part results are merged; hexagons emitted by more than one
/// part appear only once in the output, in the order they were first produced. Parts with no
/// area (like an empty ring) are skipped, as long as some other part has area.
///
/// The region must be in WGS84 longitude/latitude degrees.
pub fn generate_hexagons(region: &Geometry<f64>, resolution: u8) -> Result<HexLayer> {
    let resolution = parse_resolution(resolution)?;
    let parts = polygon_parts(region)?;
    if region.unsigned_area() == 0.0 {
        return Err(HexError::InvalidGeometry(
            "the region has zero area".to_string(),
        ));
    }

    let mut ids: Vec<CellIndex> = Vec::new();
    for (idx, part) in parts.into_iter().enumerate() {
        if part.unsigned_area() == 0.0 {
            debug!("Skipping part {idx} of the region, which has no area");
            continue;
        }
        let mut tiler = TilerBuilder::new(resolution)
            .containment_mode(ContainmentMode::ContainsCentroid)
            .build();
        tiler
            .add(part)
            .map_err(|err| HexError::InvalidGeometry(format!("part {idx} of the region: {err}")))?;
        let before = ids.len();
        ids.extend(tiler.into_coverage());
        debug!("Part {idx} of the region covers {} hexagons", ids.len() - before);
    }

    let emitted = ids.len();
    let layer = HexLayer::from_cells(resolution, ids)?;
    info!(
        "Generated {} hexagons at resolution {} ({} duplicates across parts collapsed)",
        layer.len(),
        u8::from(resolution),
        emitted - layer.len()
    );
    Ok(layer)
}

/// The boundary of one hexagon as a polygon in longitude/latitude order.
pub fn cell_boundary(cell: CellIndex) -> Polygon<f64> {
    // H3 vertices are (lat, lng); GIS convention is (x, y) = (lng, lat)
    let exterior: LineString<f64> = cell
        .boundary()
        .iter()
        .map(|vertex| Coord {
            x: vertex.lng(),
            y: vertex.lat(),
        })
        .collect();
    Polygon::new(exterior, Vec::new())
}

pub(crate) fn parse_resolution(resolution: u8) -> Result<Resolution> {
    Resolution::try_from(resolution).map_err(|_| {
        HexError::InvalidParameter(format!("resolution {resolution} is outside of 0 to 15"))
    })
}

fn polygon_parts(region: &Geometry<f64>) -> Result<Vec<Polygon<f64>>> {
    match region {
        Geometry::Polygon(polygon) => Ok(vec![polygon.clone()]),
        Geometry::MultiPolygon(mp) => Ok(mp.0.clone()),
        other => Err(HexError::InvalidGeometry(format!(
            "a region must be a Polygon or MultiPolygon, not a {}",
            geometry_kind(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use geo::Intersects;
    use geo_types::{polygon, MultiPolygon, Point};

    use super::*;

    #[test]
    fn test_bad_resolution() {
        let region: Geometry<f64> = polygon![
            (x: -77.05, y: -12.05),
            (x: -77.03, y: -12.05),
            (x: -77.03, y: -12.03),
            (x: -77.05, y: -12.03),
        ]
        .into();
        assert!(matches!(
            generate_hexagons(&region, 16),
            Err(HexError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_non_polygonal_region() {
        let point: Geometry<f64> = Point::new(-77.0, -12.0).into();
        assert!(matches!(
            generate_hexagons(&point, 8),
            Err(HexError::InvalidGeometry(_))
        ));

        let flat: Geometry<f64> = polygon![
            (x: -77.0, y: -12.0),
            (x: -76.9, y: -12.0),
            (x: -76.8, y: -12.0),
        ]
        .into();
        assert!(matches!(
            generate_hexagons(&flat, 8),
            Err(HexError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_empty_part_skipped() {
        let square = polygon![
            (x: -77.05, y: -12.07),
            (x: -77.03, y: -12.07),
            (x: -77.03, y: -12.05),
            (x: -77.05, y: -12.05),
        ];
        let empty = Polygon::new(LineString::new(Vec::new()), Vec::new());

        let alone = generate_hexagons(&square.clone().into(), 8).unwrap();
        let with_empty =
            generate_hexagons(&MultiPolygon::new(vec![square, empty]).into(), 8).unwrap();
        assert!(!alone.is_empty());
        assert_eq!(alone.cells(), with_empty.cells());
    }

    #[test]
    fn test_boundary_is_lon_lat() {
        // Lima is at roughly (-77, -12)
        let cell = h3o::LatLng::new(-12.05, -77.04)
            .unwrap()
            .to_cell(Resolution::Eight);
        let boundary = cell_boundary(cell);
        assert!(
            boundary.exterior().0.len() >= 7,
            "a hexagon needs 6 vertices plus the closing one: {boundary:?}"
        );
        for coord in boundary.exterior().coords() {
            assert!((coord.x + 77.04).abs() < 0.05, "x should be longitude: {coord:?}");
            assert!((coord.y + 12.05).abs() < 0.05, "y should be latitude: {coord:?}");
        }
        assert!(boundary.intersects(&Point::new(-77.04, -12.05)));
    }
}
