use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde_json::Value as JsonValue;

use crate::{
    decode::encode_args,
    wire::{EvalRequest, EvalResponse},
    AdapterError, ClientOptions, Result, Value,
};

/// Expression used as the liveness probe.
pub(crate) const PING_EXPRESSION: &str = "return true";

/// Reply to one evaluation call.
///
/// `Failure` is an engine-reported error; transport failures are returned as
/// [`AdapterError`] instead.
#[derive(Clone, Debug, PartialEq)]
pub enum RawReply {
    /// Values returned by the evaluated expression, in order.
    Ok(Vec<JsonValue>),
    Failure { code: Option<u32>, message: String },
}

/// Opens native handles to the backing engine.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn open(&self) -> Result<Box<dyn NativeHandle>>;

    /// Upper bound on the liveness probe run by `connect`.
    fn ping_timeout(&self) -> Duration {
        Duration::from_millis(ClientOptions::default().ping_timeout_ms)
    }
}

/// An open link to the engine. `evaluate` is the only data-path primitive.
#[async_trait]
pub trait NativeHandle: Send + Sync + fmt::Debug {
    /// Liveness probe. The error carries the engine's diagnostic text.
    async fn ping(&self) -> Result<()>;

    /// Evaluates `expression` with `args` bound to its `...` varargs.
    async fn evaluate(&self, expression: &str, args: &[Value]) -> Result<RawReply>;

    /// Releases the handle. Must not fail.
    async fn close(&self);
}

/// Formats an endpoint base URL into the canonical evaluation URL.
///
/// Example: `"http://127.0.0.1:8081"` → `"http://127.0.0.1:8081/eval"`
pub fn eval_url(base: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed.ends_with("/eval") {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/eval")
    }
}

#[derive(Clone)]
/// Gateway that reaches Tarantool through an HTTP evaluation endpoint.
pub struct HttpGateway {
    endpoint: String,
    authorization: Option<String>,
    options: ClientOptions,
}

impl fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpGateway")
            .field("endpoint", &self.endpoint)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .field("options", &self.options)
            .finish()
    }
}

impl HttpGateway {
    /// Creates a gateway for the given endpoint URL, used as-is.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            authorization: None,
            options: ClientOptions::default(),
        }
    }

    /// Sends a bearer token with every request.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn with_token(mut self, token: impl AsRef<str>) -> Self {
        self.authorization = Some(normalize_bearer_authorization(token.as_ref()));
        self
    }

    /// Applies timeout options.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Creates a gateway from environment variables.
    ///
    /// Reads:
    /// - `TARANTOOL_EVAL_URL`: evaluation endpoint (required); `/eval` is
    ///   appended when missing
    /// - `TARANTOOL_TOKEN`: access token (optional, Bearer prefix optional)
    pub fn from_env() -> std::result::Result<Self, String> {
        let url = std::env::var("TARANTOOL_EVAL_URL")
            .map_err(|_| "missing TARANTOOL_EVAL_URL environment variable".to_owned())?;
        if url.trim().is_empty() {
            return Err("TARANTOOL_EVAL_URL is set but empty".to_owned());
        }
        let gateway = Self::new(eval_url(&url));
        match std::env::var("TARANTOOL_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Ok(gateway.with_token(token)),
            _ => Ok(gateway),
        }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn open(&self) -> Result<Box<dyn NativeHandle>> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.options.timeout_ms))
            .build()
            .map_err(AdapterError::Transport)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, "opened http evaluation handle");

        Ok(Box::new(HttpHandle {
            http,
            endpoint: self.endpoint.clone(),
            authorization: self.authorization.clone(),
        }))
    }

    fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.options.ping_timeout_ms)
    }
}

/// Handle produced by [`HttpGateway`].
struct HttpHandle {
    http: reqwest::Client,
    endpoint: String,
    authorization: Option<String>,
}

impl fmt::Debug for HttpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpHandle")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl NativeHandle for HttpHandle {
    async fn ping(&self) -> Result<()> {
        match self.evaluate(PING_EXPRESSION, &[]).await? {
            RawReply::Ok(values) if values.first() == Some(&JsonValue::Bool(true)) => Ok(()),
            RawReply::Ok(values) => Err(AdapterError::Decode(format!(
                "unexpected ping reply: {values:?}"
            ))),
            RawReply::Failure { code, message } => Err(AdapterError::Disconnected(
                crate::error::engine_diagnostic(code, &message),
            )),
        }
    }

    async fn evaluate(&self, expression: &str, args: &[Value]) -> Result<RawReply> {
        let payload = EvalRequest {
            expression,
            args: encode_args(args)?,
        };

        let mut request = self
            .http
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&payload);
        if let Some(authorization) = &self.authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }

        let response = request.send().await.map_err(AdapterError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(AdapterError::Transport)?;

        if !status.is_success() {
            return Err(AdapterError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let decoded = serde_json::from_str::<EvalResponse>(&body).map_err(|err| {
            AdapterError::Decode(format!("invalid evaluation response JSON: {err}; body: {body}"))
        })?;

        Ok(match decoded {
            EvalResponse::Ok { result } => RawReply::Ok(result),
            EvalResponse::Error { error } => RawReply::Failure {
                code: error.code,
                message: error.message,
            },
        })
    }

    async fn close(&self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, "closed http evaluation handle");
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
