//! Gateway configuration
//!
//! Defaults suit local development; each field can be overridden through
//! a `QUOTEFEED_*` environment variable. Unparseable overrides fall back
//! to the default with a warning rather than failing startup.

use std::net::SocketAddr;

use market_data::outbox::OverflowPolicy;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the HTTP/WebSocket server binds to.
    pub listen_addr: SocketAddr,
    /// Address the upstream feed listener binds to.
    pub feed_addr: SocketAddr,
    /// Per-connection outbound queue capacity.
    pub outbox_capacity: usize,
    /// Policy when a connection's outbound queue overflows.
    pub overflow_policy: OverflowPolicy,
    /// Maximum concurrent subscriptions per connection.
    pub max_subscriptions_per_connection: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            feed_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            outbox_capacity: 1024,
            overflow_policy: OverflowPolicy::CoalesceOldest,
            max_subscriptions_per_connection: 64,
        }
    }
}

impl GatewayConfig {
    /// Build a configuration from the environment, falling back to
    /// defaults field by field.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: env_parsed("QUOTEFEED_LISTEN_ADDR", defaults.listen_addr),
            feed_addr: env_parsed("QUOTEFEED_FEED_ADDR", defaults.feed_addr),
            outbox_capacity: env_parsed("QUOTEFEED_OUTBOX_CAPACITY", defaults.outbox_capacity),
            overflow_policy: env_policy("QUOTEFEED_OVERFLOW_POLICY", defaults.overflow_policy),
            max_subscriptions_per_connection: env_parsed(
                "QUOTEFEED_MAX_SUBSCRIPTIONS",
                defaults.max_subscriptions_per_connection,
            ),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, raw = %raw, "unparseable environment override, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_policy(key: &str, default: OverflowPolicy) -> OverflowPolicy {
    match std::env::var(key) {
        Ok(raw) => match raw.as_str() {
            "coalesce_oldest" | "coalesce" => OverflowPolicy::CoalesceOldest,
            "disconnect" => OverflowPolicy::Disconnect,
            _ => {
                warn!(key, raw = %raw, "unknown overflow policy, using default");
                default
            }
        },
        Err(_) => default,
    }
}
