//! `tarantool-sql` is a relational connection adapter for Tarantool.
//!
//! Tarantool is reached through a single evaluation primitive
//! ([`NativeHandle::evaluate`]); this crate layers the usual connection
//! contract on top of it:
//! - [`TarantoolConnection::query`] and [`TarantoolConnection::execute`]
//! - [`TarantoolConnection::insert`] with sequence-backed identity values
//! - schema introspection, DDL and queued transactions

mod connection;
mod decode;
mod error;
mod gateway;
mod options;
mod result;
mod schema_cache;
mod sequence;
mod sql_helper;
mod statement;
mod types;
mod value;
mod wire;

#[cfg(feature = "raw-mode")]
pub mod raw;

pub use connection::{Connection, TarantoolConnection};
pub use error::AdapterError;
pub use gateway::{eval_url, Gateway, HttpGateway, NativeHandle, RawReply};
pub use options::ClientOptions;
pub use result::{ResultCursor, SCALAR_COLUMN};
pub use schema_cache::SchemaCache;
pub use sequence::{
    column_sequence_name, identity_sequence_name, normalize_sequence_name, SequenceEmulator,
    IDENTITY_PREFIX,
};
pub use sql_helper::{SqlHelper, TarantoolSqlHelper};
pub use statement::Statement;
pub use types::{
    ColumnMetadata, ColumnType, FieldDefinition, IndexInfo, InsertResult, Row, ScalarField,
    Version, Window,
};
pub use value::Value;

pub type Result<T> = std::result::Result<T, AdapterError>;
