use std::collections::VecDeque;

use serde_json::Value as JsonValue;

use crate::{
    decode::{decode_reply_shape, decode_value, ReplyShape},
    AdapterError, ColumnMetadata, ColumnType, RawReply, Result, Row, Window,
};

/// Column name given to the single column of a scalar reply.
pub const SCALAR_COLUMN: &str = "VALUE";

/// Forward-only cursor over one evaluation reply.
///
/// Rows are decoded on [`fetch`](ResultCursor::fetch); the cursor cannot be
/// rewound.
#[derive(Debug)]
pub struct ResultCursor {
    fields: Vec<ColumnMetadata>,
    rows: VecDeque<Vec<JsonValue>>,
    affected_rows: u64,
    row_set: bool,
}

impl ResultCursor {
    /// Wraps a successful reply. Engine failures must be turned into errors
    /// before reaching this point.
    pub fn new(reply: RawReply) -> Result<Self> {
        let values = match reply {
            RawReply::Ok(values) => values,
            RawReply::Failure { message, .. } => {
                return Err(AdapterError::Decode(format!(
                    "engine failure handed to result adapter: {message}"
                )))
            }
        };

        Ok(match decode_reply_shape(values)? {
            ReplyShape::Rows { fields, rows } => Self {
                fields,
                affected_rows: rows.len() as u64,
                rows: rows.into(),
                row_set: true,
            },
            ReplyShape::Count(count) => Self {
                fields: Vec::new(),
                rows: VecDeque::new(),
                affected_rows: count,
                row_set: false,
            },
            ReplyShape::Scalar(value) => Self {
                fields: vec![ColumnMetadata::inferred(
                    SCALAR_COLUMN,
                    scalar_type(&value),
                )],
                rows: VecDeque::from([vec![value]]),
                affected_rows: 1,
                row_set: true,
            },
            ReplyShape::Empty => Self {
                fields: Vec::new(),
                rows: VecDeque::new(),
                affected_rows: 0,
                row_set: true,
            },
        })
    }

    /// Column metadata of the reply, available even when no rows came back.
    pub fn fields(&self) -> &[ColumnMetadata] {
        &self.fields
    }

    /// Rows returned, or rows changed for a write.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// `false` when the reply reported a write (`row_count`) instead of rows.
    pub fn is_row_set(&self) -> bool {
        self.row_set
    }

    /// Rows not yet fetched.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Next row, or `None` at end of sequence.
    pub fn fetch(&mut self) -> Result<Option<Row>> {
        let Some(values) = self.rows.pop_front() else {
            return Ok(None);
        };

        let mut row = Row::with_capacity(values.len());
        for (field, value) in self.fields.iter().zip(values) {
            row.insert(field.name.clone(), decode_value(value, field.data_type)?);
        }
        Ok(Some(row))
    }

    pub fn fetch_all(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(self.rows.len());
        while let Some(row) = self.fetch()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Drops rows outside `window`. The engine has no OFFSET/LIMIT in this
    /// path, so the window is applied here.
    pub(crate) fn apply_window(mut self, window: Window) -> Self {
        let offset = window.offset.min(self.rows.len());
        self.rows.drain(..offset);
        if let Some(limit) = window.limit {
            self.rows.truncate(limit);
        }
        self
    }
}

fn scalar_type(value: &JsonValue) -> ColumnType {
    match value {
        JsonValue::Bool(_) => ColumnType::Boolean,
        JsonValue::Number(number) if number.is_f64() => ColumnType::Float,
        JsonValue::Number(_) => ColumnType::Integer,
        JsonValue::String(_) => ColumnType::String,
        _ => ColumnType::Any,
    }
}
