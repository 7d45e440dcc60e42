//! Engine configuration
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | ORDER_SYNC_ENDPOINT | http://localhost:4000/graphql | GraphQL endpoint |
//! | ORDER_SYNC_TOKEN | (none) | Bearer token |
//! | ORDER_SYNC_TIMEOUT_SECS | 30 | Request timeout |
//! | ORDER_SYNC_TERMINAL_STATUSES | delivered,completed,cancelled | Past-bucket statuses |
//! | ORDER_SYNC_CHECKOUT_URL | Cashfree sandbox web checkout | Hosted checkout base |
//! | ORDER_SYNC_PUSH_BUFFER | 64 | Push channel buffer |

use shared::models::StatusClassifier;

/// Hosted checkout page used to open a payment session
pub const DEFAULT_CHECKOUT_URL: &str = "https://sandbox.cashfree.com/pg/view/sessions/checkout/web";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// GraphQL endpoint (e.g., "http://localhost:4000/graphql")
    pub endpoint: String,

    /// Bearer token for authentication
    pub token: Option<String>,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Status labels classified as TERMINAL
    pub terminal_statuses: Vec<String>,

    /// Hosted checkout base URL; the session id is appended
    pub checkout_url_base: String,

    /// Buffer size for push channel receivers
    pub push_buffer: usize,
}

impl SyncConfig {
    /// Create a new configuration for the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            timeout: 30,
            terminal_statuses: StatusClassifier::default()
                .terminal_labels()
                .map(str::to_string)
                .collect(),
            checkout_url_base: DEFAULT_CHECKOUT_URL.to_string(),
            push_buffer: 64,
        }
    }

    /// Load configuration from the environment (after reading `.env`)
    ///
    /// Missing or unparsable values fall back to defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Self {
            endpoint: std::env::var("ORDER_SYNC_ENDPOINT").unwrap_or(defaults.endpoint),
            token: std::env::var("ORDER_SYNC_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            timeout: std::env::var("ORDER_SYNC_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout),
            terminal_statuses: std::env::var("ORDER_SYNC_TERMINAL_STATUSES")
                .ok()
                .map(|v| parse_status_list(&v))
                .filter(|list| !list.is_empty())
                .unwrap_or(defaults.terminal_statuses),
            checkout_url_base: std::env::var("ORDER_SYNC_CHECKOUT_URL")
                .unwrap_or(defaults.checkout_url_base),
            push_buffer: std::env::var("ORDER_SYNC_PUSH_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.push_buffer),
        }
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Replace the terminal status vocabulary
    pub fn with_terminal_statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terminal_statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    /// Set the hosted checkout base URL
    pub fn with_checkout_url_base(mut self, base: impl Into<String>) -> Self {
        self.checkout_url_base = base.into();
        self
    }

    /// Set the push buffer size
    pub fn with_push_buffer(mut self, capacity: usize) -> Self {
        self.push_buffer = capacity.max(1);
        self
    }

    /// Status classifier built from `terminal_statuses`
    pub fn classifier(&self) -> StatusClassifier {
        StatusClassifier::new(&self.terminal_statuses)
    }

    /// Hosted checkout URL for a payment session
    pub fn checkout_url(&self, session_id: &str) -> String {
        format!("{}/{}", self.checkout_url_base.trim_end_matches('/'), session_id)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://localhost:4000/graphql")
    }
}

fn parse_status_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::OrderStatus;

    #[test]
    fn test_config_default() {
        let config = SyncConfig::default();
        assert_eq!(config.timeout, 30);
        assert_eq!(config.push_buffer, 64);
        assert!(config.token.is_none());
        assert!(config.classifier().is_terminal(&OrderStatus::new("delivered")));
    }

    #[test]
    fn test_config_builder() {
        let config = SyncConfig::new("https://api.example.com/graphql")
            .with_token("t0k3n")
            .with_timeout(5)
            .with_push_buffer(0)
            .with_terminal_statuses(["refunded"]);

        assert_eq!(config.token.as_deref(), Some("t0k3n"));
        assert_eq!(config.timeout, 5);
        assert_eq!(config.push_buffer, 1);
        let classifier = config.classifier();
        assert!(classifier.is_terminal(&OrderStatus::new("refunded")));
        assert!(!classifier.is_terminal(&OrderStatus::new("delivered")));
    }

    #[test]
    fn test_checkout_url() {
        let config = SyncConfig::default().with_checkout_url_base("https://pay.example.com/web/");
        assert_eq!(
            config.checkout_url("session_abc"),
            "https://pay.example.com/web/session_abc"
        );
    }

    #[test]
    fn test_parse_status_list() {
        assert_eq!(
            parse_status_list(" Delivered, ,CANCELLED "),
            vec!["delivered".to_string(), "cancelled".to_string()]
        );
    }
}
