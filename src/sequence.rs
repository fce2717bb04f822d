//! Engine-resident counters that stand in for autoincrement columns.
//!
//! `next` is a single evaluation: creation and increment both happen inside
//! the engine, so concurrent connections never read-modify-write a counter.

use crate::{AdapterError, NativeHandle, RawReply, Result, Value};

/// Creates the counter at 1 if absent, then advances it.
pub(crate) const NEXT_EXPRESSION: &str = "\
local name = ...
local seq = box.sequence[name]
if seq == nil then
    seq = box.schema.sequence.create(name, {start = 1, min = 1, if_not_exists = true})
end
return seq:next()";

/// Creates the counter if absent without advancing it.
pub(crate) const ENSURE_EXPRESSION: &str = "\
local name = ...
box.schema.sequence.create(name, {start = 1, min = 1, if_not_exists = true})
return true";

/// Prefix of the counter used by `insert` for a table's identity column.
pub const IDENTITY_PREFIX: &str = "sq_";

/// Strips every character outside `[A-Za-z0-9_]`. Fails if nothing is left.
pub fn normalize_sequence_name(name: &str) -> Result<String> {
    let normalized = name
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .collect::<String>();
    if normalized.is_empty() {
        return Err(AdapterError::invalid_argument(
            "name",
            format!("sequence name '{name}' is empty after normalization"),
        ));
    }
    Ok(normalized)
}

/// Counter name used by `insert` for `table`.
pub fn identity_sequence_name(table: &str) -> String {
    format!("{IDENTITY_PREFIX}{table}")
}

/// Counter name backing an autoincrement column declared by `create_table`.
/// The conventional `ID` column uses the bare table name.
pub fn column_sequence_name(table: &str, column: &str) -> String {
    if column.eq_ignore_ascii_case("id") {
        table.to_owned()
    } else {
        format!("{table}_{column}")
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SequenceEmulator;

impl SequenceEmulator {
    /// Advances the counter `name` (already normalized) and returns the raw reply.
    pub async fn next(&self, handle: &dyn NativeHandle, name: &str) -> Result<RawReply> {
        #[cfg(feature = "tracing")]
        tracing::debug!(sequence = name, "allocating next sequence value");

        handle.evaluate(NEXT_EXPRESSION, &[Value::text(name)]).await
    }

    /// Makes sure the counter `name` (already normalized) exists.
    pub async fn ensure(&self, handle: &dyn NativeHandle, name: &str) -> Result<RawReply> {
        handle.evaluate(ENSURE_EXPRESSION, &[Value::text(name)]).await
    }
}
