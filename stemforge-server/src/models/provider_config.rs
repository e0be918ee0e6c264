//! Persisted provider credential and quota descriptors
//!
//! Written by admin tooling, read by the provider registry at dispatch time.

use chrono::{DateTime, Utc};

/// One row of the `provider_configs` table
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub service_name: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Lower tries first
    pub priority: i64,
    pub is_enabled: bool,
    /// Maximum dispatches per window; None = unlimited
    pub rate_limit: Option<i64>,
    pub rate_window_seconds: Option<i64>,
    pub current_usage: i64,
    pub usage_reset_at: Option<DateTime<Utc>>,
    /// Free-form service-specific settings
    pub config: Option<serde_json::Value>,
}

impl ProviderConfig {
    /// True when the declared quota is spent for the current window
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        let Some(limit) = self.rate_limit else {
            return false;
        };
        if self.window_elapsed(now) {
            // A fresh window starts on the next dispatch
            return false;
        }
        self.current_usage >= limit
    }

    /// True when `usage_reset_at` is unset or in the past
    pub fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.usage_reset_at {
            Some(reset_at) => reset_at <= now,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config(rate_limit: Option<i64>, usage: i64, reset_in: Option<i64>) -> ProviderConfig {
        ProviderConfig {
            service_name: "tidal".to_string(),
            api_key: None,
            api_secret: None,
            priority: 1,
            is_enabled: true,
            rate_limit,
            rate_window_seconds: Some(3600),
            current_usage: usage,
            usage_reset_at: reset_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            config: None,
        }
    }

    #[test]
    fn test_unlimited_never_exhausts() {
        assert!(!config(None, 10_000, Some(60)).is_exhausted(Utc::now()));
    }

    #[test]
    fn test_exhausted_inside_window() {
        assert!(config(Some(10), 10, Some(60)).is_exhausted(Utc::now()));
        assert!(!config(Some(10), 9, Some(60)).is_exhausted(Utc::now()));
    }

    #[test]
    fn test_elapsed_window_resets() {
        // Usage above the limit but the window already passed
        assert!(!config(Some(10), 50, Some(-60)).is_exhausted(Utc::now()));
    }
}
