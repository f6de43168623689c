use thiserror::Error;

/// Everything that can go wrong in the hexagon operations. All of these are detected while
/// validating inputs, before any output layer is built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    /// A resolution is out of range, or a downsampling target isn't coarser than the input.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The region is empty, has no area, or isn't a polygon / multipolygon.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("unsupported aggregation {0:?}; use one of sum, min, max")]
    UnsupportedAggregation(String),

    /// A declared column isn't present on an input record.
    #[error("column {column} is missing from {record}")]
    MissingColumn { column: String, record: String },

    /// A declared column holds something that isn't a number.
    #[error("column {column} of {record} isn't numeric: {value}")]
    TypeConversion {
        column: String,
        record: String,
        value: String,
    },

    /// A source polygon has zero area, so its values can't be apportioned.
    #[error("{0} has zero area")]
    DegenerateGeometry(String),
}

pub type Result<T> = std::result::Result<T, HexError>;
