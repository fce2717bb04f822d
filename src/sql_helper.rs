//! Statement rendering for Tarantool SQL.
//!
//! Every identifier that ends up in statement text goes through
//! [`SqlHelper::quote`]; values are always passed as binds.

use crate::{AdapterError, ColumnType, Result, Row, ScalarField, Statement};

/// Dialect-specific quoting and type rendering.
pub trait SqlHelper: Send + Sync {
    /// Quotes an identifier so it is taken verbatim by the engine.
    fn quote(&self, identifier: &str) -> String;

    /// Maps an abstract type tag to the dialect's column type keyword.
    fn column_type(&self, data_type: &str) -> Result<&'static str>;

    /// Renders `INSERT INTO t (cols) VALUES (?, ...)` with binds in field order.
    fn prepare_insert(&self, table: &str, fields: &Row) -> Statement;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TarantoolSqlHelper;

impl TarantoolSqlHelper {
    pub fn type_keyword(data_type: ColumnType) -> &'static str {
        match data_type {
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "DOUBLE",
            ColumnType::Decimal => "NUMBER",
            ColumnType::String => "VARCHAR(255)",
            ColumnType::Text => "STRING",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date | ColumnType::DateTime => "DATETIME",
            ColumnType::Binary => "VARBINARY",
            ColumnType::Any => "SCALAR",
        }
    }

    /// Zero-row probe that still reports the table's column metadata.
    pub fn probe_columns(&self, table: &str) -> Statement {
        Statement::from(format!("SELECT * FROM {} WHERE 1 = 0", self.quote(table)))
    }

    /// Renders `CREATE TABLE`. `primary` lists column names, in key order.
    pub fn create_table(
        &self,
        table: &str,
        fields: &[&ScalarField],
        primary: &[&str],
    ) -> Result<Statement> {
        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            let not_null = field.primary || !field.nullable || primary.contains(&field.column_name.as_str());
            columns.push(format!(
                "{} {} {}",
                self.quote(&field.column_name),
                self.column_type(&field.data_type)?,
                if not_null { "NOT NULL" } else { "NULL" }
            ));
        }

        let mut sql = format!("CREATE TABLE {} ({}", self.quote(table), columns.join(", "));
        if !primary.is_empty() {
            let keys = primary
                .iter()
                .map(|column| self.quote(column))
                .collect::<Vec<_>>();
            sql.push_str(&format!(", PRIMARY KEY ({})", keys.join(", ")));
        }
        sql.push(')');

        Ok(Statement::from(sql))
    }

    pub fn rename_table(&self, current: &str, new: &str) -> Statement {
        Statement::from(format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote(current),
            self.quote(new)
        ))
    }

    pub fn drop_table(&self, table: &str) -> Statement {
        Statement::from(format!("DROP TABLE {}", self.quote(table)))
    }
}

impl SqlHelper for TarantoolSqlHelper {
    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn column_type(&self, data_type: &str) -> Result<&'static str> {
        ColumnType::from_tag(data_type).map(Self::type_keyword)
    }

    fn prepare_insert(&self, table: &str, fields: &Row) -> Statement {
        let columns = fields
            .keys()
            .map(|column| self.quote(column))
            .collect::<Vec<_>>();
        let placeholders = vec!["?"; fields.len()];
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(table),
            columns.join(", "),
            placeholders.join(", ")
        );
        Statement::new(sql, fields.values().cloned().collect::<Vec<_>>())
    }
}

/// Rejects empty identifiers before they reach the renderer.
pub(crate) fn require_identifier(name: &str, argument: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AdapterError::invalid_argument(argument, "must not be empty"));
    }
    Ok(())
}
