//! In-memory stand-in for a Tarantool evaluation endpoint.
//!
//! Understands only the expressions and SQL shapes the adapter sends.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tarantool_sql::{AdapterError, Gateway, NativeHandle, RawReply, Value};

#[derive(Default)]
struct Table {
    columns: Vec<(String, String)>,
    rows: Vec<Vec<JsonValue>>,
    indexes: Vec<(String, Vec<String>)>,
}

#[derive(Default)]
struct EngineState {
    opens: usize,
    closes: usize,
    evaluations: Vec<String>,
    statements: Vec<String>,
    sequences: HashMap<String, i64>,
    tables: HashMap<String, Table>,
    ping_failure: Option<String>,
    transport_failure: Option<String>,
    statement_failure: Option<(u32, String)>,
    sequences_exhausted: bool,
}

#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<EngineState>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state mutex must not be poisoned")
    }

    pub fn with_table(self, name: &str, columns: &[(&str, &str)]) -> Self {
        self.state().tables.insert(
            name.to_owned(),
            Table {
                columns: columns
                    .iter()
                    .map(|(column, kind)| ((*column).to_owned(), (*kind).to_owned()))
                    .collect(),
                ..Table::default()
            },
        );
        self
    }

    pub fn with_row(self, table: &str, row: Vec<JsonValue>) -> Self {
        self.state()
            .tables
            .get_mut(table)
            .expect("table must exist")
            .rows
            .push(row);
        self
    }

    pub fn with_index(self, table: &str, name: &str, columns: &[&str]) -> Self {
        self.state()
            .tables
            .get_mut(table)
            .expect("table must exist")
            .indexes
            .push((
                name.to_owned(),
                columns.iter().map(|column| (*column).to_owned()).collect(),
            ));
        self
    }

    /// Number of `evaluate` round-trips (the ping is not counted).
    pub fn calls(&self) -> usize {
        self.state().evaluations.len()
    }

    pub fn opens(&self) -> usize {
        self.state().opens
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    /// SQL texts received, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub fn count_statements(&self, sql: &str) -> usize {
        self.state()
            .statements
            .iter()
            .filter(|statement| statement.as_str() == sql)
            .count()
    }

    pub fn sequence_value(&self, name: &str) -> Option<i64> {
        self.state().sequences.get(name).copied()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state().tables.get(table).map_or(0, |table| table.rows.len())
    }

    pub fn fail_ping(&self, message: &str) {
        self.state().ping_failure = Some(message.to_owned());
    }

    /// Next `evaluate` fails at the transport level.
    pub fn fail_transport(&self, message: &str) {
        self.state().transport_failure = Some(message.to_owned());
    }

    /// Counter allocations return nil from now on.
    pub fn exhaust_sequences(&self) {
        self.state().sequences_exhausted = true;
    }

    /// Next SQL statement fails with an engine error.
    pub fn fail_next_statement(&self, code: u32, message: &str) {
        self.state().statement_failure = Some((code, message.to_owned()));
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn open(&self) -> tarantool_sql::Result<Box<dyn NativeHandle>> {
        self.state().opens += 1;
        Ok(Box::new(FakeHandle {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeHandle {
    state: Arc<Mutex<EngineState>>,
}

impl std::fmt::Debug for FakeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FakeHandle")
    }
}

#[async_trait]
impl NativeHandle for FakeHandle {
    async fn ping(&self) -> tarantool_sql::Result<()> {
        let state = self.state.lock().expect("engine state mutex must not be poisoned");
        match &state.ping_failure {
            Some(message) => Err(AdapterError::Disconnected(message.clone())),
            None => Ok(()),
        }
    }

    async fn evaluate(&self, expression: &str, args: &[Value]) -> tarantool_sql::Result<RawReply> {
        let mut state = self.state.lock().expect("engine state mutex must not be poisoned");
        if let Some(message) = state.transport_failure.take() {
            return Err(AdapterError::Disconnected(message));
        }
        state.evaluations.push(expression.to_owned());
        Ok(state.evaluate(expression, args))
    }

    async fn close(&self) {
        self.state
            .lock()
            .expect("engine state mutex must not be poisoned")
            .closes += 1;
    }
}

impl EngineState {
    fn evaluate(&mut self, expression: &str, args: &[Value]) -> RawReply {
        if expression.contains("seq:next()") {
            if self.sequences_exhausted {
                return RawReply::Ok(vec![JsonValue::Null]);
            }
            let counter = self.sequences.entry(text_arg(args, 0)).or_insert(0);
            *counter += 1;
            return RawReply::Ok(vec![json!(*counter)]);
        }
        if expression.contains("box.schema.sequence.create") {
            self.sequences.entry(text_arg(args, 0)).or_insert(0);
            return RawReply::Ok(vec![json!(true)]);
        }
        if expression.contains("space.index") {
            let indexes = self
                .tables
                .get(&text_arg(args, 0))
                .map(|table| {
                    table
                        .indexes
                        .iter()
                        .map(|(name, columns)| json!({ "name": name, "columns": columns }))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            // Lua encodes an empty table as an object.
            let reply = if indexes.is_empty() { json!({}) } else { json!(indexes) };
            return RawReply::Ok(vec![reply]);
        }
        if expression.contains("box.space[name] ~= nil") {
            return RawReply::Ok(vec![json!(self.tables.contains_key(&text_arg(args, 0)))]);
        }
        if expression.contains("box.info.version") {
            return RawReply::Ok(vec![json!("2.11.1-0-g96877bd")]);
        }
        if expression.contains("box.begin()") {
            return self.run_batch(args);
        }
        if expression.contains("box.execute") {
            let sql = text_arg(args, 0);
            return match self.run_sql(&sql, &args[1..]) {
                Ok(result) => RawReply::Ok(vec![result]),
                Err((code, message)) => RawReply::Failure {
                    code: Some(code),
                    message,
                },
            };
        }
        RawReply::Failure {
            code: None,
            message: format!("unsupported expression: {expression}"),
        }
    }

    fn run_batch(&mut self, args: &[Value]) -> RawReply {
        let count = args[0].as_i64().expect("statement count") as usize;
        let snapshot = self
            .tables
            .iter()
            .map(|(name, table)| (name.clone(), table.rows.len()))
            .collect::<HashMap<_, _>>();

        let mut results = Vec::with_capacity(count);
        let mut pos = 1;
        for _ in 0..count {
            let sql = text_arg(args, pos);
            let bind_count = args[pos + 1].as_i64().expect("bind count") as usize;
            let binds = &args[pos + 2..pos + 2 + bind_count];
            pos += 2 + bind_count;
            match self.run_sql(&sql, binds) {
                Ok(result) => results.push(result),
                Err((code, message)) => {
                    for (name, len) in &snapshot {
                        if let Some(table) = self.tables.get_mut(name) {
                            table.rows.truncate(*len);
                        }
                    }
                    return RawReply::Failure {
                        code: Some(code),
                        message,
                    };
                }
            }
        }
        RawReply::Ok(vec![JsonValue::Array(results)])
    }

    fn run_sql(&mut self, sql: &str, binds: &[Value]) -> Result<JsonValue, (u32, String)> {
        self.statements.push(sql.to_owned());
        if let Some(failure) = self.statement_failure.take() {
            return Err(failure);
        }

        if let Some(rest) = sql.strip_prefix("SELECT * FROM ") {
            let (name, rest) = split_quoted(rest);
            let table = self.table(&name)?;
            let metadata = table
                .columns
                .iter()
                .map(|(column, kind)| json!({ "name": column, "type": kind }))
                .collect::<Vec<_>>();
            let rows = if rest.contains("WHERE 1 = 0") {
                Vec::new()
            } else {
                table.rows.clone()
            };
            return Ok(json!({ "metadata": metadata, "rows": rows }));
        }

        if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
            let (name, rest) = split_quoted(rest);
            let inner = rest
                .trim_start()
                .strip_prefix('(')
                .and_then(|rest| rest.split_once(") VALUES"))
                .map(|(columns, _)| columns)
                .ok_or((1, format!("Syntax error near '{rest}'")))?;
            let columns = inner
                .split(", ")
                .map(|column| column.trim_matches('"').to_owned())
                .collect::<Vec<_>>();
            let table = self.table_mut(&name)?;
            let mut row = vec![JsonValue::Null; table.columns.len()];
            for (column, bind) in columns.iter().zip(binds) {
                let position = table
                    .columns
                    .iter()
                    .position(|(name, _)| name == column)
                    .ok_or((1, format!("Field '{column}' was not found")))?;
                row[position] = to_json(bind);
            }
            table.rows.push(row);
            return Ok(json!({ "row_count": 1 }));
        }

        if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
            let (name, rest) = split_quoted(rest);
            if self.tables.contains_key(&name) {
                return Err((84, format!("Space '{name}' already exists")));
            }
            let body = rest.trim().trim_start_matches('(').trim_end_matches(')');
            let mut columns = Vec::new();
            for segment in body.split(", ") {
                if !segment.starts_with('"') {
                    break;
                }
                let (column, definition) = split_quoted(segment);
                let keyword = definition.split_whitespace().next().unwrap_or_default();
                columns.push((column, engine_type(keyword).to_owned()));
            }
            self.tables.insert(
                name,
                Table {
                    columns,
                    ..Table::default()
                },
            );
            return Ok(json!({ "row_count": 1 }));
        }

        if let Some(rest) = sql.strip_prefix("DROP TABLE ") {
            let (name, _) = split_quoted(rest);
            self.tables
                .remove(&name)
                .ok_or((36, format!("Space '{name}' does not exist")))?;
            return Ok(json!({ "row_count": 1 }));
        }

        if let Some(rest) = sql.strip_prefix("ALTER TABLE ") {
            let (current, rest) = split_quoted(rest);
            let (new, _) = split_quoted(rest.trim_start().trim_start_matches("RENAME TO "));
            let table = self
                .tables
                .remove(&current)
                .ok_or((36, format!("Space '{current}' does not exist")))?;
            self.tables.insert(new, table);
            return Ok(json!({ "row_count": 0 }));
        }

        Err((1, format!("Syntax error near '{sql}'")))
    }

    fn table(&self, name: &str) -> Result<&Table, (u32, String)> {
        self.tables
            .get(name)
            .ok_or((36, format!("Space '{name}' does not exist")))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, (u32, String)> {
        self.tables
            .get_mut(name)
            .ok_or((36, format!("Space '{name}' does not exist")))
    }
}

fn text_arg(args: &[Value], index: usize) -> String {
    args.get(index)
        .and_then(Value::as_str)
        .expect("text argument")
        .to_owned()
}

/// Splits `"name" rest` into the unquoted name and the remainder.
fn split_quoted(input: &str) -> (String, &str) {
    let input = input.trim_start();
    let body = input.strip_prefix('"').expect("quoted identifier");
    let mut name = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        if ch == '"' {
            if matches!(chars.peek(), Some((_, '"'))) {
                chars.next();
                name.push('"');
                continue;
            }
            return (name, &body[index + 1..]);
        }
        name.push(ch);
    }
    panic!("unterminated identifier in {input}");
}

fn engine_type(keyword: &str) -> &'static str {
    match keyword {
        "INTEGER" => "integer",
        "DOUBLE" => "double",
        "NUMBER" => "number",
        "BOOLEAN" => "boolean",
        "VARBINARY" => "varbinary",
        "DATETIME" => "datetime",
        keyword if keyword == "STRING" || keyword.starts_with("VARCHAR") => "string",
        _ => "scalar",
    }
}

fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(value) => json!(value),
        Value::Integer(value) => json!(value),
        Value::Float(value) => json!(value),
        Value::Text(value) => json!(value),
    }
}
