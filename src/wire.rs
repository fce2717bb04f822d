use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Serialize)]
pub struct EvalRequest<'a> {
    pub expression: &'a str,
    pub args: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvalResponse {
    Ok {
        #[serde(default)]
        result: Vec<JsonValue>,
    },
    Error {
        error: EvalError,
    },
}

#[derive(Debug, Deserialize)]
pub struct EvalError {
    #[serde(default)]
    pub code: Option<u32>,
    pub message: String,
}

/// Table returned by `box.execute`.
#[derive(Debug, Deserialize)]
pub struct SqlResult {
    #[serde(default)]
    pub metadata: Option<Vec<ColumnMeta>>,
    #[serde(default)]
    pub rows: Vec<Vec<JsonValue>>,
    #[serde(default)]
    pub row_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub is_nullable: Option<bool>,
    #[serde(default)]
    pub is_autoincrement: Option<bool>,
}
