use std::collections::{BTreeSet, HashMap};
use std::io::{BufReader, BufWriter};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use flatgeobuf::{FgbWriter, GeometryType};
use fs_err::File;
use geo_types::{Geometry, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, FeatureReader};
use geozero::geojson::GeoJson;
use geozero::GeozeroDatasource;
use h3o::CellIndex;
use serde_json::{Map, Value};
use tracing::info;

use crate::geom::geometry_kind;
use crate::layer::{HexLayer, SourceFeature};

/// The property holding the hexagon ID in files written and read by this crate.
pub const HEX_KEY: &str = "hex";

/// Reads every polygon and multipolygon in a GeoJSON file as one region. Parts aren't unioned;
/// overlapping parts are fine, because hexagon generation collapses duplicates.
pub fn load_region(geojson_path: &str) -> Result<Geometry<f64>> {
    let mut parts = Vec::new();
    for feature in load_features(geojson_path)? {
        match feature.geometry {
            Geometry::Polygon(p) => parts.push(p),
            Geometry::MultiPolygon(mp) => parts.extend(mp.0),
            // Boundary downloads often carry a label point; skip it
            Geometry::Point(_) => {}
            other => bail!(
                "{geojson_path} has a {}, but a region can only contain polygons",
                geometry_kind(&other)
            ),
        }
    }
    if parts.is_empty() {
        bail!("{geojson_path} doesn't contain any polygons");
    }
    Ok(MultiPolygon::new(parts).into())
}

/// Reads every feature of a GeoJSON file, with its properties.
pub fn load_features(geojson_path: &str) -> Result<Vec<SourceFeature>> {
    let reader = FeatureReader::from_reader(BufReader::new(File::open(geojson_path)?));
    let mut features = Vec::new();
    for feature in reader.features() {
        let feature = feature?;
        let geometry: Geometry<f64> = if let Some(geometry) = feature.geometry {
            geometry.try_into()?
        } else {
            bail!("A feature in {geojson_path} has no geometry");
        };
        features.push(SourceFeature {
            geometry,
            properties: feature.properties.unwrap_or_default(),
        });
    }
    info!("Loaded {} features from {geojson_path}", features.len());
    Ok(features)
}

/// Reads points from a CSV file with one row per point, like the population grids published on
/// HDX. Numeric cells become numbers, empty and `NaN` cells become `null`, anything else stays a
/// string.
pub fn load_points_csv(csv_path: &str, lon_key: &str, lat_key: &str) -> Result<Vec<SourceFeature>> {
    let mut features = Vec::new();
    for rec in csv::Reader::from_reader(File::open(csv_path)?).deserialize() {
        // Read raw strings first; IDs with leading zeros would be mangled if parsed as numbers
        let mut string_map: HashMap<String, String> = rec?;

        let mut coordinate = |key: &str| -> Result<f64> {
            let value = if let Some(value) = string_map.remove(key) {
                value
            } else {
                bail!("{csv_path} doesn't have a {key} column");
            };
            value
                .parse::<f64>()
                .with_context(|| format!("{key} value {value:?} in {csv_path} isn't numeric"))
        };
        let x = coordinate(lon_key)?;
        let y = coordinate(lat_key)?;

        let mut properties = Map::new();
        for (key, value) in string_map {
            let json_value = if value.is_empty() {
                Value::Null
            } else if let Ok(x) = value.parse::<f64>() {
                serde_json::Number::from_f64(x)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            } else {
                Value::String(value)
            };
            properties.insert(key, json_value);
        }
        features.push(SourceFeature {
            geometry: Point::new(x, y).into(),
            properties,
        });
    }
    info!("Loaded {} points from {csv_path}", features.len());
    Ok(features)
}

/// Reads a hexagon layer previously written by `write_layer`. Geometry in the file is ignored and
/// recomputed from the `hex` IDs; every other property becomes a numeric column.
pub fn load_layer(geojson_path: &str) -> Result<HexLayer> {
    let features = load_features(geojson_path)?;
    let mut ids = Vec::with_capacity(features.len());
    let mut column_names = BTreeSet::new();
    for feature in &features {
        let id = if let Some(Value::String(id)) = feature.properties.get(HEX_KEY) {
            CellIndex::from_str(id).with_context(|| format!("bad hexagon ID {id}"))?
        } else {
            bail!("A feature in {geojson_path} doesn't have a string {HEX_KEY} property");
        };
        ids.push(id);
        column_names.extend(
            feature
                .properties
                .keys()
                .filter(|key| key.as_str() != HEX_KEY)
                .cloned(),
        );
    }
    let resolution = if let Some(id) = ids.first() {
        id.resolution()
    } else {
        bail!("{geojson_path} doesn't contain any hexagons");
    };

    let mut layer = HexLayer::from_cells(resolution, ids)?;
    if layer.len() != features.len() {
        bail!("{geojson_path} repeats some hexagons");
    }
    for column in column_names {
        let mut values = Vec::with_capacity(features.len());
        for feature in &features {
            values.push(match feature.properties.get(&column) {
                None | Some(Value::Null) => None,
                Some(Value::Number(x)) => x.as_f64(),
                Some(other) => bail!("{column} in {geojson_path} has a non-numeric value {other}"),
            });
        }
        layer.set_column(column, values)?;
    }
    Ok(layer)
}

impl HexLayer {
    /// One polygon feature per hexagon, with the ID under `hex` and every column. Missing values
    /// are written as `null`.
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let mut features = Vec::with_capacity(self.len());
        for (idx, cell) in self.cells().iter().enumerate() {
            let mut properties = Map::new();
            properties.insert(HEX_KEY.to_string(), Value::String(cell.id.to_string()));
            for name in self.column_names() {
                let value = self
                    .column(name)
                    .and_then(|values| values[idx])
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                properties.insert(name.to_string(), value);
            }
            features.push(Feature {
                geometry: Some(geojson::Geometry {
                    value: geojson::Value::from(&cell.boundary),
                    bbox: None,
                    foreign_members: None,
                }),
                properties: Some(properties),
                bbox: None,
                id: None,
                foreign_members: None,
            });
        }
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

/// Writes a layer as FlatGeobuf if the path ends with `.fgb`, otherwise as GeoJSON.
pub fn write_layer(layer: &HexLayer, path: &str) -> Result<()> {
    let gj = layer.to_feature_collection();
    if path.ends_with(".fgb") {
        let mut fgb = FgbWriter::create("hexagons", GeometryType::Polygon)?;
        let json = serde_json::to_string(&gj)?;
        GeoJson(&json).process(&mut fgb)?;
        fgb.write(&mut BufWriter::new(File::create(path)?))?;
    } else {
        fs_err::write(path, serde_json::to_string_pretty(&gj)?)?;
    }
    info!("Wrote {} hexagons to {path}", layer.len());
    Ok(())
}
