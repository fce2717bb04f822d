use serde_json::Value as JsonValue;

use crate::{
    wire::{self, SqlResult},
    AdapterError, ColumnMetadata, ColumnType, IndexInfo, Value,
};

/// Normalized form of the first value of an evaluation reply.
#[derive(Debug)]
pub(crate) enum ReplyShape {
    Rows {
        fields: Vec<ColumnMetadata>,
        rows: Vec<Vec<JsonValue>>,
    },
    Count(u64),
    Scalar(JsonValue),
    Empty,
}

pub(crate) fn encode_value(value: &Value) -> Result<JsonValue, AdapterError> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Boolean(value) => Ok(JsonValue::Bool(*value)),
        Value::Integer(value) => Ok(JsonValue::from(*value)),
        Value::Float(value) => serde_json::Number::from_f64(*value)
            .map(JsonValue::Number)
            .ok_or_else(|| {
                AdapterError::Decode(format!("non-finite float value '{value}' is unsupported"))
            }),
        Value::Text(value) => Ok(JsonValue::String(value.clone())),
    }
}

pub(crate) fn encode_args(args: &[Value]) -> Result<Vec<JsonValue>, AdapterError> {
    args.iter().map(encode_value).collect()
}

pub(crate) fn decode_value(value: JsonValue, data_type: ColumnType) -> Result<Value, AdapterError> {
    match value {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(value) => Ok(Value::Boolean(value)),
        JsonValue::Number(number) => {
            let wants_float = matches!(data_type, ColumnType::Float | ColumnType::Decimal);
            if !wants_float {
                if let Some(value) = number.as_i64() {
                    return Ok(Value::Integer(value));
                }
                if number.is_u64() {
                    return Err(AdapterError::Decode(format!(
                        "integer value {number} does not fit into i64"
                    )));
                }
            }
            number
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| AdapterError::Decode(format!("invalid number value '{number}'")))
        }
        JsonValue::String(value) => Ok(Value::Text(value)),
        other @ (JsonValue::Array(_) | JsonValue::Object(_)) => Ok(Value::Text(other.to_string())),
    }
}

pub(crate) fn decode_reply_shape(values: Vec<JsonValue>) -> Result<ReplyShape, AdapterError> {
    let Some(first) = values.into_iter().next() else {
        return Ok(ReplyShape::Empty);
    };

    match first {
        JsonValue::Null => Ok(ReplyShape::Empty),
        JsonValue::Object(ref map) if map.contains_key("metadata") || map.contains_key("row_count") => {
            let result: SqlResult = serde_json::from_value(first)
                .map_err(|err| AdapterError::Decode(format!("invalid sql result: {err}")))?;
            decode_sql_result(result)
        }
        other => Ok(ReplyShape::Scalar(other)),
    }
}

fn decode_sql_result(result: SqlResult) -> Result<ReplyShape, AdapterError> {
    match result.metadata {
        Some(metadata) => {
            let fields = metadata.into_iter().map(decode_column).collect::<Vec<_>>();
            if let Some(row) = result.rows.iter().find(|row| row.len() != fields.len()) {
                return Err(AdapterError::Decode(format!(
                    "row has {} values but metadata lists {} columns",
                    row.len(),
                    fields.len()
                )));
            }
            Ok(ReplyShape::Rows {
                fields,
                rows: result.rows,
            })
        }
        None => Ok(ReplyShape::Count(result.row_count.unwrap_or(0))),
    }
}

fn decode_column(meta: wire::ColumnMeta) -> ColumnMetadata {
    let data_type = meta
        .kind
        .as_deref()
        .map_or(ColumnType::Any, ColumnType::from_engine);
    let mut column = ColumnMetadata::inferred(meta.name, data_type);
    if let Some(nullable) = meta.is_nullable {
        column.nullable = nullable;
    }
    if let Some(autoincrement) = meta.is_autoincrement {
        column.autoincrement = autoincrement;
        column.primary = autoincrement;
    }
    column
}

/// Decodes the `{name, columns}` list returned by the index probe. Lua
/// encodes an empty table as either `[]` or `{}`.
pub(crate) fn decode_index_list(values: Vec<JsonValue>) -> Result<Vec<IndexInfo>, AdapterError> {
    match values.into_iter().next() {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Object(map)) if map.is_empty() => Ok(Vec::new()),
        Some(list @ JsonValue::Array(_)) => serde_json::from_value(list)
            .map_err(|err| AdapterError::Decode(format!("invalid index list: {err}"))),
        Some(other) => Err(AdapterError::Decode(format!(
            "expected index list, got {other}"
        ))),
    }
}

/// Sums `row_count` over the per-statement results of an atomic batch.
pub(crate) fn decode_batch_row_count(values: Vec<JsonValue>) -> Result<u64, AdapterError> {
    let results = match values.into_iter().next() {
        None | Some(JsonValue::Null) => return Ok(0),
        Some(JsonValue::Object(map)) if map.is_empty() => return Ok(0),
        Some(JsonValue::Array(results)) => results,
        Some(other) => {
            return Err(AdapterError::Decode(format!(
                "expected batch result list, got {other}"
            )))
        }
    };

    let mut total = 0u64;
    for result in results {
        if let ReplyShape::Count(count) = decode_reply_shape(vec![result])? {
            total = total.saturating_add(count);
        }
    }
    Ok(total)
}
