use indexmap::IndexMap;
use serde::Deserialize;

use crate::{AdapterError, Result, Value};

/// One result row: column name to value, in column order.
pub type Row = IndexMap<String, Value>;

/// Logical column type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Float,
    Decimal,
    String,
    Text,
    Boolean,
    Date,
    DateTime,
    Binary,
    /// Engine type with no narrower mapping (`scalar`, `any`, `map`, ...).
    Any,
}

impl ColumnType {
    /// Parses an abstract type tag from the mapping layer.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(Self::Integer),
            "float" | "double" => Ok(Self::Float),
            "decimal" | "number" => Ok(Self::Decimal),
            "string" | "enum" => Ok(Self::String),
            "text" => Ok(Self::Text),
            "boolean" | "bool" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "datetime" => Ok(Self::DateTime),
            "binary" | "varbinary" => Ok(Self::Binary),
            _ => Err(AdapterError::UnsupportedType(tag.to_owned())),
        }
    }

    /// Maps a type name reported in engine reply metadata. Never fails;
    /// unknown names become [`ColumnType::Any`].
    pub(crate) fn from_engine(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "integer" | "unsigned" => Self::Integer,
            "double" => Self::Float,
            "number" | "decimal" => Self::Decimal,
            "string" | "text" => Self::String,
            "boolean" => Self::Boolean,
            "varbinary" => Self::Binary,
            "datetime" => Self::DateTime,
            _ => Self::Any,
        }
    }
}

/// Column description as seen by the adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: ColumnType,
    pub nullable: bool,
    pub primary: bool,
    pub autoincrement: bool,
}

impl ColumnMetadata {
    /// Metadata inferred from a reply, with no key information.
    pub fn inferred(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            primary: false,
            autoincrement: false,
        }
    }

    /// Whether this column gets its value from the sequence emulator.
    pub fn is_identity(&self) -> bool {
        self.primary && self.autoincrement
    }
}

/// Column-backed field supplied by the external mapping layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalarField {
    pub column_name: String,
    /// Abstract type tag (`integer`, `text`, ...).
    pub data_type: String,
    pub nullable: bool,
    pub primary: bool,
    pub autoincrement: bool,
}

impl ScalarField {
    pub fn new(column_name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary: false,
            autoincrement: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub(crate) fn to_metadata(&self) -> Result<ColumnMetadata> {
        Ok(ColumnMetadata {
            name: self.column_name.clone(),
            data_type: ColumnType::from_tag(&self.data_type)?,
            nullable: self.nullable && !self.primary,
            primary: self.primary,
            autoincrement: self.autoincrement,
        })
    }
}

/// Any field of an entity map. Only scalar fields are backed by a column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldDefinition {
    Scalar(ScalarField),
    /// Relation to another entity; has no column of its own.
    Reference { target: String },
    /// Computed from other columns at query time.
    Expression { expression: String },
}

impl FieldDefinition {
    pub fn as_scalar(&self) -> Option<&ScalarField> {
        match self {
            Self::Scalar(field) => Some(field),
            _ => None,
        }
    }
}

impl From<ScalarField> for FieldDefinition {
    fn from(field: ScalarField) -> Self {
        Self::Scalar(field)
    }
}

/// Client-side offset/limit applied over a reply's rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Window {
    pub fn new(offset: usize, limit: Option<usize>) -> Self {
        Self { offset, limit }
    }

    pub fn limit(limit: usize) -> Self {
        Self {
            offset: 0,
            limit: Some(limit),
        }
    }
}

/// Outcome of an insert.
#[derive(Clone, Debug, PartialEq)]
pub struct InsertResult {
    /// Inserted fields, including a synthesized identity value.
    pub row: Row,
    /// Identity value of the inserted row, when the table declares one.
    pub inserted_id: Option<Value>,
}

/// One index of a table, columns in key order.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Engine version as `(version, is_light_edition)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    pub version: String,
    pub light_edition: bool,
}
