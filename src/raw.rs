//! Experimental raw evaluation passthrough.
//!
//! Enabled with the `raw-mode` feature.

use crate::{Connection, Gateway, RawReply, Result, TarantoolConnection, Value};

impl<G: Gateway> TarantoolConnection<G> {
    /// Evaluates an arbitrary expression and returns the engine reply as-is.
    ///
    /// Engine failures come back as [`RawReply::Failure`]; the schema cache is
    /// not touched, so DDL sent this way can leave it stale.
    pub async fn evaluate_raw(&mut self, expression: &str, args: &[Value]) -> Result<RawReply> {
        self.connect().await?;
        self.native()?.evaluate(expression, args).await
    }
}
