/// Configures request and liveness-probe timeouts.
///
/// Every evaluation is sent at most once; there is no retry setting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-evaluation timeout in milliseconds.
    pub timeout_ms: u64,
    /// Upper bound for the liveness probe issued by `connect`.
    pub ping_timeout_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            ping_timeout_ms: 2_000,
        }
    }
}
