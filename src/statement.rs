use crate::Value;

/// SQL text plus its ordered bind values.
///
/// Fields are private so a statement cannot change between rendering and
/// execution.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    sql: String,
    binds: Vec<Value>,
}

impl Statement {
    /// Creates a statement with positional binds mapped to `?` placeholders.
    pub fn new(sql: impl Into<String>, binds: impl Into<Vec<Value>>) -> Self {
        Self {
            sql: sql.into(),
            binds: binds.into(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn binds(&self) -> &[Value] {
        &self.binds
    }

    /// Evaluation arguments: the SQL text followed by every bind value.
    pub(crate) fn to_args(&self) -> Vec<Value> {
        let mut args = Vec::with_capacity(self.binds.len() + 1);
        args.push(Value::Text(self.sql.clone()));
        args.extend(self.binds.iter().cloned());
        args
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::new(sql, Vec::new())
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::new(sql, Vec::new())
    }
}

impl<const N: usize> From<(&str, [Value; N])> for Statement {
    fn from((sql, binds): (&str, [Value; N])) -> Self {
        Self::new(sql, binds)
    }
}
