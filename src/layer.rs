use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use geo::Relate;
use geo_types::{Geometry, Point, Polygon};
use h3o::{CellIndex, LatLng, Resolution};
use serde_json::{Map, Value};

use crate::error::{HexError, Result};
use crate::hexagons::cell_boundary;

/// One H3 hexagon, with its geometry in longitude/latitude order.
#[derive(Clone, Debug, PartialEq)]
pub struct HexCell {
    pub id: CellIndex,
    pub boundary: Polygon<f64>,
    pub centroid: Point<f64>,
}

impl HexCell {
    /// Builds the boundary and centroid from the index. The centroid is H3's canonical center,
    /// not the planar centroid of the boundary.
    pub fn new(id: CellIndex) -> Self {
        let center = LatLng::from(id);
        Self {
            id,
            boundary: cell_boundary(id),
            centroid: Point::new(center.lng(), center.lat()),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.id.resolution()
    }
}

/// A set of unique hexagons at one resolution, plus numeric columns attached to them. Every
/// column has exactly one slot per cell; `None` means no data, which is different from zero.
#[derive(Clone, Debug, PartialEq)]
pub struct HexLayer {
    resolution: Resolution,
    cells: Vec<HexCell>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl HexLayer {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            cells: Vec::new(),
            columns: BTreeMap::new(),
        }
    }

    /// Builds a layer without any columns. Duplicate ids are collapsed, keeping the first one.
    pub fn from_cells<I: IntoIterator<Item = CellIndex>>(
        resolution: Resolution,
        ids: I,
    ) -> Result<Self> {
        let mut layer = Self::new(resolution);
        let mut seen = HashSet::new();
        for id in ids {
            if id.resolution() != resolution {
                return Err(HexError::InvalidParameter(format!(
                    "cell {id} has resolution {}, but the layer is at {}",
                    u8::from(id.resolution()),
                    u8::from(resolution)
                )));
            }
            if seen.insert(id) {
                layer.cells.push(HexCell::new(id));
            }
        }
        Ok(layer)
    }

    /// A copy holding only the cells at `indices`, without any columns.
    pub(crate) fn subset(&self, indices: &[usize]) -> HexLayer {
        HexLayer {
            resolution: self.resolution,
            cells: indices.iter().map(|idx| self.cells[*idx].clone()).collect(),
            columns: BTreeMap::new(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn cells(&self) -> &[HexCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|name| name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(|values| values.as_slice())
    }

    /// Looks up one value. `None` covers both an unknown cell and a missing value.
    pub fn value(&self, id: CellIndex, column: &str) -> Option<f64> {
        let idx = self.cells.iter().position(|cell| cell.id == id)?;
        self.columns.get(column)?[idx]
    }

    /// Adds or replaces a column. There must be one value per cell.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<()> {
        let name = name.into();
        if values.len() != self.cells.len() {
            return Err(HexError::InvalidParameter(format!(
                "column {name} has {} values, but the layer has {} cells",
                values.len(),
                self.cells.len()
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Sums the non-missing values of a column. `None` if the column doesn't exist.
    pub fn total(&self, column: &str) -> Option<f64> {
        self.columns
            .get(column)
            .map(|values| values.iter().flatten().sum())
    }
}

/// An input geometry with attributes to be aggregated onto hexagons. Properties follow GeoJSON,
/// so numbers are JSON numbers and `null` means no data.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceFeature {
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

impl SourceFeature {
    pub fn new<G: Into<Geometry<f64>>>(geometry: G) -> Self {
        Self {
            geometry: geometry.into(),
            properties: Map::new(),
        }
    }

    pub fn with_property<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Reads a numeric property. `idx` only identifies the feature in errors.
    pub(crate) fn numeric(&self, column: &str, idx: usize) -> Result<Option<f64>> {
        match self.properties.get(column) {
            None => Err(HexError::MissingColumn {
                column: column.to_string(),
                record: format!("feature {idx}"),
            }),
            Some(Value::Null) => Ok(None),
            Some(Value::Number(x)) => match x.as_f64() {
                Some(x) => Ok(Some(x)),
                None => Err(type_conversion(column, idx, x)),
            },
            Some(other) => Err(type_conversion(column, idx, other)),
        }
    }
}

fn type_conversion<V: fmt::Display>(column: &str, idx: usize, value: V) -> HexError {
    HexError::TypeConversion {
        column: column.to_string(),
        record: format!("feature {idx}"),
        value: value.to_string(),
    }
}

/// How several values landing on the same hexagon are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Min,
    Max,
}

impl Aggregation {
    /// Combines values. An empty input produces `None`, never an identity element like 0.
    pub fn reduce<I: IntoIterator<Item = f64>>(self, values: I) -> Option<f64> {
        values.into_iter().reduce(|acc, x| match self {
            Aggregation::Sum => acc + x,
            Aggregation::Min => acc.min(x),
            Aggregation::Max => acc.max(x),
        })
    }
}

impl FromStr for Aggregation {
    type Err = HexError;

    fn from_str(x: &str) -> Result<Self> {
        match x {
            "sum" => Ok(Aggregation::Sum),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            _ => Err(HexError::UnsupportedAggregation(x.to_string())),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Aggregation::Sum => "sum",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        };
        write!(f, "{name}")
    }
}

/// Which columns to produce, and how to reduce each of them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregationSpec(BTreeMap<String, Aggregation>);

impl AggregationSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, aggregation: Aggregation) -> Self {
        self.0.insert(column.to_string(), aggregation);
        self
    }

    /// Parses tokens like `population:sum`. The operator follows the last colon, so column names
    /// may contain colons themselves.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        let mut spec = Self::new();
        for token in tokens {
            let token = token.as_ref();
            let (column, op) = token.rsplit_once(':').ok_or_else(|| {
                HexError::InvalidParameter(format!("{token} isn't of the form column:operator"))
            })?;
            spec.0.insert(column.to_string(), op.parse()?);
        }
        Ok(spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Aggregation)> {
        self.0.iter().map(|(column, agg)| (column.as_str(), *agg))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Aggregation)> for AggregationSpec {
    fn from_iter<I: IntoIterator<Item = (String, Aggregation)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The spatial test used to assign a feature to a hexagon. It reads left to right with the
/// feature on the left: `Within` means the feature lies within the hexagon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Predicate {
    Intersects,
    Contains,
    Within,
}

impl Predicate {
    pub fn test(self, feature: &Geometry<f64>, cell: &Polygon<f64>) -> bool {
        let matrix = feature.relate(cell);
        match self {
            Predicate::Intersects => matrix.is_intersects(),
            Predicate::Contains => matrix.is_contains(),
            Predicate::Within => matrix.is_within(),
        }
    }
}

impl FromStr for Predicate {
    type Err = HexError;

    fn from_str(x: &str) -> Result<Self> {
        match x {
            "intersects" => Ok(Predicate::Intersects),
            "contains" => Ok(Predicate::Contains),
            "within" => Ok(Predicate::Within),
            _ => Err(HexError::InvalidParameter(format!(
                "unknown predicate {x:?}; use one of intersects, contains, within"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aggregation_spec() {
        let spec = AggregationSpec::parse(&["population:sum", "a:b:max"]).unwrap();
        let parsed: Vec<_> = spec.iter().collect();
        assert_eq!(
            parsed,
            vec![("a:b", Aggregation::Max), ("population", Aggregation::Sum)]
        );

        assert_eq!(
            AggregationSpec::parse(&["population:mean"]),
            Err(HexError::UnsupportedAggregation("mean".to_string()))
        );
        assert!(matches!(
            AggregationSpec::parse(&["population"]),
            Err(HexError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_reduce_empty_is_missing() {
        for agg in [Aggregation::Sum, Aggregation::Min, Aggregation::Max] {
            assert_eq!(agg.reduce(Vec::new()), None, "{agg} of nothing");
        }
        assert_eq!(Aggregation::Sum.reduce([1.0, 2.5]), Some(3.5));
        assert_eq!(Aggregation::Min.reduce([3.0, -1.0, 2.0]), Some(-1.0));
        assert_eq!(Aggregation::Max.reduce([3.0, -1.0, 2.0]), Some(3.0));
    }

    #[test]
    fn test_numeric_property() {
        let feature = SourceFeature::new(Point::new(0.0, 0.0))
            .with_property("n", 2.5)
            .with_property("name", "abc")
            .with_property("empty", Value::Null);
        assert_eq!(feature.numeric("n", 0), Ok(Some(2.5)));
        assert_eq!(feature.numeric("empty", 0), Ok(None));
        assert!(matches!(
            feature.numeric("name", 0),
            Err(HexError::TypeConversion { .. })
        ));
        assert!(matches!(
            feature.numeric("other", 0),
            Err(HexError::MissingColumn { .. })
        ));
    }
}
