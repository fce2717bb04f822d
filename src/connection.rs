use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::{
    decode::{decode_batch_row_count, decode_index_list},
    error::engine_diagnostic,
    sequence::{column_sequence_name, identity_sequence_name, normalize_sequence_name},
    sql_helper::require_identifier,
    AdapterError, ColumnMetadata, FieldDefinition, Gateway, HttpGateway,
    IndexInfo, InsertResult, NativeHandle, RawReply, Result, ResultCursor, Row, ScalarField,
    SchemaCache, SequenceEmulator, SqlHelper, Statement, TarantoolSqlHelper, Value, Version,
    Window,
};

const DB_TYPE: &str = "tarantool";
const DEFAULT_VERSION: &str = "1";

/// Runs one SQL statement. The SQL text and binds travel as arguments, never
/// as part of the expression.
pub(crate) const EXECUTE_EXPRESSION: &str = "\
local sql = ...
local res, err = box.execute(sql, {select(2, ...)})
if err ~= nil then
    error(err)
end
return res";

/// Runs queued statements inside one engine transaction. Arguments are
/// `count, (sql, bind_count, binds...)*`.
pub(crate) const BATCH_EXPRESSION: &str = "\
local args = {...}
local count = args[1]
local results = {}
local pos = 2
box.begin()
for n = 1, count do
    local sql, bind_count = args[pos], args[pos + 1]
    local binds = {}
    for b = 1, bind_count do
        binds[b] = args[pos + 1 + b]
    end
    pos = pos + 2 + bind_count
    local res, err = box.execute(sql, binds)
    if err ~= nil then
        box.rollback()
        error(err)
    end
    results[n] = res
end
box.commit()
return results";

pub(crate) const TABLE_EXISTS_EXPRESSION: &str = "\
local name = ...
return box.space[name] ~= nil";

/// Lists `{name, columns}` for every index of a space, ordered by index id.
pub(crate) const INDEX_LIST_EXPRESSION: &str = "\
local name = ...
local space = box.space[name]
if space == nil then
    return {}
end
local format = space:format()
local indexes = {}
for id, index in pairs(space.index) do
    if type(id) == 'number' then
        local columns = {}
        for i, part in ipairs(index.parts) do
            local field = format[part.fieldno]
            columns[i] = field and field.name or tostring(part.fieldno)
        end
        table.insert(indexes, {id = id, name = index.name, columns = columns})
    end
end
table.sort(indexes, function(a, b) return a.id < b.id end)
return indexes";

pub(crate) const VERSION_EXPRESSION: &str = "return box.info.version";

/// Connection contract shared by relational backends.
#[async_trait]
pub trait Connection: Send {
    type Helper: SqlHelper;

    /// Opens the link if needed. Idempotent.
    async fn connect(&mut self) -> Result<()>;

    /// Releases the link if open. Idempotent, never fails.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Executes `statement` and returns the rows inside `window`.
    async fn query_with(&mut self, statement: Statement, window: Window) -> Result<ResultCursor>;

    /// Wraps a successful engine reply.
    fn create_result(&self, reply: RawReply) -> Result<ResultCursor>;

    fn sql_helper(&self) -> &Self::Helper;

    fn db_type(&self) -> &'static str;
}

#[derive(Debug)]
enum Pending {
    Execute(Statement),
    Insert {
        statement: Statement,
        inserted_id: Option<Value>,
    },
}

impl Pending {
    fn statement(&self) -> &Statement {
        match self {
            Self::Execute(statement) | Self::Insert { statement, .. } => statement,
        }
    }
}

/// Relational connection to Tarantool.
///
/// Not internally synchronized: operations take `&mut self`, so sharing one
/// connection between tasks needs an external lock. Separate connections may
/// run in parallel.
#[derive(Debug)]
pub struct TarantoolConnection<G = HttpGateway> {
    gateway: G,
    handle: Option<Box<dyn NativeHandle>>,
    helper: TarantoolSqlHelper,
    sequences: SequenceEmulator,
    cache: SchemaCache,
    ping_timeout: Duration,
    last_affected_rows: Option<u64>,
    last_inserted_id: Option<Value>,
    version: Option<String>,
    transaction: Option<Vec<Pending>>,
}

impl TarantoolConnection<HttpGateway> {
    pub fn http(gateway: HttpGateway) -> Self {
        Self::new(gateway)
    }
}

impl<G: Gateway> TarantoolConnection<G> {
    /// Creates a disconnected connection. Nothing is sent until first use.
    /// The ping bound comes from [`Gateway::ping_timeout`].
    pub fn new(gateway: G) -> Self {
        let ping_timeout = gateway.ping_timeout();
        Self {
            gateway,
            handle: None,
            helper: TarantoolSqlHelper,
            sequences: SequenceEmulator,
            cache: SchemaCache::default(),
            ping_timeout,
            last_affected_rows: None,
            last_inserted_id: None,
            version: None,
            transaction: None,
        }
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.cache
    }

    /// Executes a statement and returns all of its rows.
    pub async fn query(&mut self, statement: impl Into<Statement>) -> Result<ResultCursor> {
        self.query_with(statement.into(), Window::default()).await
    }

    /// Executes a statement and keeps only the rows inside `window`.
    pub async fn query_window(
        &mut self,
        statement: impl Into<Statement>,
        window: Window,
    ) -> Result<ResultCursor> {
        self.query_with(statement.into(), window).await
    }

    /// Executes a write statement and returns the affected row count.
    ///
    /// Inside a transaction the statement is queued and `0` is returned;
    /// [`commit_transaction`](Self::commit_transaction) reports the total.
    pub async fn execute(&mut self, statement: impl Into<Statement>) -> Result<u64> {
        let statement = statement.into();
        if let Some(pending) = self.transaction.as_mut() {
            pending.push(Pending::Execute(statement));
            return Ok(0);
        }
        let cursor = self.run_statement(&statement).await?;
        Ok(cursor.affected_rows())
    }

    /// Inserts one row. When the table declares an identity column and
    /// `fields` leaves it out (or null), the next value of `sq_<table>` is
    /// injected.
    pub async fn insert(&mut self, table: &str, fields: Row) -> Result<InsertResult> {
        require_identifier(table, "table")?;
        if fields.is_empty() {
            return Err(AdapterError::invalid_argument(
                "fields",
                "at least one column value is required",
            ));
        }

        self.columns(table).await?;
        let identity = self
            .cache
            .identity_column(table)
            .map(|column| column.name.clone());

        let mut row = fields;
        if let Some(column) = &identity {
            if row.get(column).map_or(true, Value::is_null) {
                let sequence = identity_sequence_name(table);
                let next = self.next_identity(&sequence).await?.ok_or_else(|| {
                    AdapterError::Query {
                        sql: sequence_label(&sequence),
                        diagnostic: format!("sequence '{sequence}' returned no value"),
                    }
                })?;
                match row.get_mut(column) {
                    Some(slot) => *slot = next,
                    None => {
                        row.shift_insert(0, column.clone(), next);
                    }
                }
            }
        }

        let inserted_id = identity.as_ref().and_then(|column| row.get(column).cloned());
        let statement = self.helper.prepare_insert(table, &row);

        if let Some(pending) = self.transaction.as_mut() {
            pending.push(Pending::Insert {
                statement,
                inserted_id: inserted_id.clone(),
            });
            return Ok(InsertResult { row, inserted_id });
        }

        self.run_statement(&statement).await?;
        self.last_inserted_id = inserted_id.clone();

        Ok(InsertResult { row, inserted_id })
    }

    /// Identity of the most recent successful insert.
    pub fn last_inserted_id(&self) -> Option<&Value> {
        self.last_inserted_id.as_ref()
    }

    /// Next value of an engine-resident counter. Characters outside
    /// `[A-Za-z0-9_]` are stripped from `name` first.
    ///
    /// `None` means the engine reported no value.
    pub async fn next_identity(&mut self, name: &str) -> Result<Option<Value>> {
        let name = normalize_sequence_name(name)?;
        self.connect().await?;

        let sequences = self.sequences;
        let label = sequence_label(&name);
        let reply = sequences
            .next(self.native()?, &name)
            .await
            .map_err(|err| query_error(&label, &err))?;
        let mut cursor = self.checked_cursor(&label, reply)?;

        let value = cursor
            .fetch()?
            .and_then(|row| row.into_values().next())
            .filter(|value| !value.is_null());
        Ok(value)
    }

    /// Whether a table named `table` exists. An empty name is never sent.
    pub async fn table_exists(&mut self, table: &str) -> Result<bool> {
        if table.is_empty() {
            return Ok(false);
        }
        let values = self
            .evaluate_checked(TABLE_EXISTS_EXPRESSION, &[Value::text(table)], table)
            .await?;
        Ok(matches!(
            values.first(),
            Some(value) if !value.is_null() && *value != JsonValue::Bool(false)
        ))
    }

    /// Indexes of `table` with their columns, ordered by index id. Unknown
    /// tables have no indexes.
    pub async fn indexes(&mut self, table: &str) -> Result<Vec<IndexInfo>> {
        require_identifier(table, "table")?;
        let values = self
            .evaluate_checked(INDEX_LIST_EXPRESSION, &[Value::text(table)], table)
            .await?;
        decode_index_list(values)
    }

    pub async fn index_exists(&mut self, table: &str, columns: &[&str]) -> Result<bool> {
        Ok(self.index_name(table, columns, false).await?.is_some())
    }

    /// Name of an index over `columns`. With `strict` the index columns must
    /// match exactly; otherwise `columns` may be a prefix of them.
    pub async fn index_name(
        &mut self,
        table: &str,
        columns: &[&str],
        strict: bool,
    ) -> Result<Option<String>> {
        if columns.is_empty() || table.is_empty() {
            return Ok(None);
        }

        let indexes = self.indexes(table).await?;
        Ok(indexes
            .into_iter()
            .find(|index| index_matches(&index.columns, columns, strict))
            .map(|index| index.name))
    }

    /// Column metadata of `table`, probed once and then served from cache.
    pub async fn columns(&mut self, table: &str) -> Result<Vec<ColumnMetadata>> {
        if let Some(columns) = self.cache.get(table) {
            return Ok(columns.to_vec());
        }
        require_identifier(table, "table")?;

        let statement = self.helper.probe_columns(table);
        let cursor = self.run_statement(&statement).await?;
        let fields = cursor.fields().to_vec();
        self.cache.insert(table, fields.clone());
        Ok(fields)
    }

    /// Seeds the schema cache with metadata declared by the mapping layer.
    /// Non-scalar fields have no column and are skipped.
    pub fn declare_table(
        &mut self,
        table: &str,
        fields: &IndexMap<String, FieldDefinition>,
    ) -> Result<()> {
        require_identifier(table, "table")?;
        let columns = fields
            .values()
            .filter_map(FieldDefinition::as_scalar)
            .map(ScalarField::to_metadata)
            .collect::<Result<Vec<_>>>()?;
        self.cache.insert(table, columns);
        Ok(())
    }

    /// Creates a table. `primary` and `autoincrement` name entries of
    /// `fields`. A counter is created for every autoincrement column.
    pub async fn create_table(
        &mut self,
        table: &str,
        fields: &IndexMap<String, FieldDefinition>,
        primary: &[&str],
        autoincrement: &[&str],
    ) -> Result<()> {
        require_identifier(table, "table")?;

        let mut scalars = Vec::with_capacity(fields.len());
        for (name, field) in fields {
            let scalar = field.as_scalar().ok_or_else(|| {
                AdapterError::invalid_argument(name, "field must be a scalar field")
            })?;
            if scalar.column_name.trim().is_empty() {
                return Err(AdapterError::invalid_argument(
                    name,
                    "column name must not be empty",
                ));
            }
            scalars.push(scalar);
        }

        let primary_columns = resolve_columns(fields, primary)?;
        let autoincrement_columns = resolve_columns(fields, autoincrement)?;
        let statement = self
            .helper
            .create_table(table, &scalars, &primary_columns)?;

        let mut metadata = scalars
            .iter()
            .map(|field| field.to_metadata())
            .collect::<Result<Vec<_>>>()?;
        for column in &mut metadata {
            if primary_columns.contains(&column.name.as_str()) {
                column.primary = true;
                column.nullable = false;
            }
            if autoincrement_columns.contains(&column.name.as_str()) {
                column.autoincrement = true;
            }
        }
        let sequence_names = autoincrement_columns
            .iter()
            .map(|column| normalize_sequence_name(&column_sequence_name(table, column)))
            .collect::<Result<Vec<_>>>()?;

        self.run_statement(&statement).await?;
        self.cache.insert(table, metadata);

        let sequences = self.sequences;
        for name in sequence_names {
            let label = sequence_label(&name);
            let reply = sequences
                .ensure(self.native()?, &name)
                .await
                .map_err(|err| query_error(&label, &err))?;
            self.checked_cursor(&label, reply)?;
        }
        Ok(())
    }

    /// Renames a table and moves its cache entry.
    ///
    /// The `sq_<current>` identity counter is left behind: the next insert
    /// into `new` starts `sq_<new>` at 1, so a table that already holds rows
    /// needs its counter advanced by the caller.
    pub async fn rename_table(&mut self, current: &str, new: &str) -> Result<()> {
        require_identifier(current, "current")?;
        require_identifier(new, "new")?;
        let statement = self.helper.rename_table(current, new);
        self.run_statement(&statement).await?;
        self.cache.rename(current, new);
        Ok(())
    }

    pub async fn drop_table(&mut self, table: &str) -> Result<()> {
        require_identifier(table, "table")?;
        let statement = self.helper.drop_table(table);
        self.run_statement(&statement).await?;
        self.cache.invalidate(table);
        Ok(())
    }

    /// Starts queueing writes made through [`execute`](Self::execute) and
    /// [`insert`](Self::insert). Reads, DDL and sequence allocations still run
    /// immediately.
    pub fn start_transaction(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(AdapterError::Transaction(
                "a transaction is already in progress".to_owned(),
            ));
        }
        self.transaction = Some(Vec::new());
        Ok(())
    }

    /// Sends every queued statement in one engine transaction and returns the
    /// total affected row count. On failure the engine rolls back and the
    /// queue is discarded.
    pub async fn commit_transaction(&mut self) -> Result<u64> {
        let pending = self
            .transaction
            .take()
            .ok_or_else(|| AdapterError::Transaction("no transaction in progress".to_owned()))?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut args = vec![Value::Integer(pending.len() as i64)];
        for entry in &pending {
            let statement = entry.statement();
            args.push(Value::text(statement.sql()));
            args.push(Value::Integer(statement.binds().len() as i64));
            args.extend(statement.binds().iter().cloned());
        }
        let label = pending
            .iter()
            .map(|entry| entry.statement().sql())
            .collect::<Vec<_>>()
            .join("; ");

        #[cfg(feature = "tracing")]
        tracing::debug!(statements = pending.len(), "committing transaction");

        let values = self.evaluate_checked(BATCH_EXPRESSION, &args, &label).await?;
        let affected = decode_batch_row_count(values)?;
        self.last_affected_rows = Some(affected);

        let last_insert = pending.into_iter().rev().find_map(|entry| match entry {
            Pending::Insert { inserted_id, .. } => Some(inserted_id),
            Pending::Execute(_) => None,
        });
        if let Some(inserted_id) = last_insert {
            self.last_inserted_id = inserted_id;
        }

        Ok(affected)
    }

    /// Discards queued statements. Nothing has reached the engine yet.
    pub fn rollback_transaction(&mut self) -> Result<()> {
        let pending = self
            .transaction
            .take()
            .ok_or_else(|| AdapterError::Transaction("no transaction in progress".to_owned()))?;

        #[cfg(feature = "tracing")]
        if !pending.is_empty() {
            tracing::warn!(discarded = pending.len(), "rolled back queued statements");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = pending;

        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Rows returned or changed by the last statement, `0` before any.
    pub fn affected_rows_count(&self) -> u64 {
        self.last_affected_rows.unwrap_or(0)
    }

    /// Engine version, fetched once. Tarantool has no light edition.
    pub async fn version(&mut self) -> Result<Version> {
        if self.version.is_none() {
            let values = self
                .evaluate_checked(VERSION_EXPRESSION, &[], "box.info.version")
                .await?;
            let version = match values.into_iter().next() {
                Some(JsonValue::String(version)) if !version.is_empty() => version,
                _ => DEFAULT_VERSION.to_owned(),
            };
            self.version = Some(version);
        }

        Ok(Version {
            version: self.version.clone().unwrap_or_else(|| DEFAULT_VERSION.to_owned()),
            light_edition: false,
        })
    }

    pub(crate) fn native(&self) -> Result<&dyn NativeHandle> {
        self.handle
            .as_deref()
            .ok_or_else(|| AdapterError::Disconnected("connection is not open".to_owned()))
    }

    async fn run_statement(&mut self, statement: &Statement) -> Result<ResultCursor> {
        self.connect().await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(sql = statement.sql(), binds = statement.binds().len(), "executing statement");

        let reply = self
            .native()?
            .evaluate(EXECUTE_EXPRESSION, &statement.to_args())
            .await
            .map_err(|err| query_error(statement.sql(), &err))?;
        let cursor = self.checked_cursor(statement.sql(), reply)?;
        self.last_affected_rows = Some(cursor.affected_rows());
        Ok(cursor)
    }

    /// Evaluates a non-SQL expression and returns its values, turning engine
    /// failures into [`AdapterError::Query`] labelled with `label`.
    async fn evaluate_checked(
        &mut self,
        expression: &str,
        args: &[Value],
        label: &str,
    ) -> Result<Vec<JsonValue>> {
        self.connect().await?;
        let reply = self
            .native()?
            .evaluate(expression, args)
            .await
            .map_err(|err| query_error(label, &err))?;
        match reply {
            RawReply::Ok(values) => Ok(values),
            RawReply::Failure { code, message } => Err(AdapterError::Query {
                sql: label.to_owned(),
                diagnostic: engine_diagnostic(code, &message),
            }),
        }
    }

    fn checked_cursor(&self, sql: &str, reply: RawReply) -> Result<ResultCursor> {
        match reply {
            RawReply::Failure { code, message } => Err(AdapterError::Query {
                sql: sql.to_owned(),
                diagnostic: engine_diagnostic(code, &message),
            }),
            reply => self.create_result(reply),
        }
    }
}

#[async_trait]
impl<G: Gateway> Connection for TarantoolConnection<G> {
    type Helper = TarantoolSqlHelper;

    async fn connect(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let handle = self
            .gateway
            .open()
            .await
            .map_err(|err| connect_error(err.to_string()))?;

        let diagnostic = match tokio::time::timeout(self.ping_timeout, handle.ping()).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(format!(
                "ping timed out after {} ms",
                self.ping_timeout.as_millis()
            )),
        };
        if let Some(diagnostic) = diagnostic {
            handle.close().await;
            return Err(connect_error(diagnostic));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("connected to tarantool");

        self.handle = Some(handle);
        Ok(())
    }

    async fn disconnect(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.close().await;

        #[cfg(feature = "tracing")]
        tracing::debug!("disconnected from tarantool");
    }

    fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    async fn query_with(&mut self, statement: Statement, window: Window) -> Result<ResultCursor> {
        let cursor = self.run_statement(&statement).await?;
        Ok(cursor.apply_window(window))
    }

    fn create_result(&self, reply: RawReply) -> Result<ResultCursor> {
        ResultCursor::new(reply)
    }

    fn sql_helper(&self) -> &TarantoolSqlHelper {
        &self.helper
    }

    fn db_type(&self) -> &'static str {
        DB_TYPE
    }
}

fn connect_error(diagnostic: String) -> AdapterError {
    AdapterError::Connection {
        message: "tarantool connect error".to_owned(),
        diagnostic,
    }
}

fn query_error(sql: &str, err: &AdapterError) -> AdapterError {
    AdapterError::Query {
        sql: sql.to_owned(),
        diagnostic: err.to_string(),
    }
}

fn sequence_label(name: &str) -> String {
    format!("{name}.NEXTVAL")
}

/// Maps entity field names to their column names.
fn resolve_columns<'a>(
    fields: &'a IndexMap<String, FieldDefinition>,
    names: &[&str],
) -> Result<Vec<&'a str>> {
    names
        .iter()
        .map(|name| {
            fields
                .get(*name)
                .and_then(FieldDefinition::as_scalar)
                .map(|field| field.column_name.as_str())
                .ok_or_else(|| {
                    AdapterError::invalid_argument(*name, "not a scalar field of this table")
                })
        })
        .collect()
}

fn index_matches(index_columns: &[String], columns: &[&str], strict: bool) -> bool {
    if strict && index_columns.len() != columns.len() {
        return false;
    }
    index_columns.len() >= columns.len()
        && index_columns
            .iter()
            .zip(columns)
            .all(|(index_column, column)| index_column == column)
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{index_matches, resolve_columns};
    use crate::{AdapterError, FieldDefinition, ScalarField};

    #[test]
    fn strict_match_requires_equal_columns() {
        let index = vec!["A".to_owned(), "B".to_owned()];
        assert!(index_matches(&index, &["A", "B"], true));
        assert!(!index_matches(&index, &["A"], true));
        assert!(index_matches(&index, &["A"], false));
        assert!(!index_matches(&index, &["B"], false));
        assert!(!index_matches(&index, &["A", "B", "C"], false));
    }

    #[test]
    fn resolve_columns_maps_field_names() {
        let mut fields = IndexMap::new();
        fields.insert(
            "ID".to_owned(),
            FieldDefinition::from(ScalarField::new("id_col", "integer")),
        );
        fields.insert(
            "AUTHOR".to_owned(),
            FieldDefinition::Reference {
                target: "users".to_owned(),
            },
        );

        assert_eq!(resolve_columns(&fields, &["ID"]).expect("valid"), vec!["id_col"]);
        let err = resolve_columns(&fields, &["AUTHOR"]).expect_err("must fail");
        assert!(matches!(err, AdapterError::InvalidArgument { .. }));
    }
}
