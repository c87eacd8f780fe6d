//! Configuration validation.
//!
//! Serde handles syntactic checks; this pass covers the semantic ones and
//! returns every violation, not just the first.

use crate::config::schema::GatewayConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a configuration, collecting all semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(err(
            "listener.bind_address",
            format!("not a valid socket address: {}", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(err("listener.request_timeout_secs", "must be greater than zero"));
    }

    if config.pipeline.payment_workers == 0 {
        errors.push(err("pipeline.payment_workers", "must be at least 1"));
    }
    if config.pipeline.max_attempts == 0 {
        errors.push(err("pipeline.max_attempts", "must be at least 1"));
    }
    if config.pipeline.retry_base_delay_ms > config.pipeline.retry_max_delay_ms {
        errors.push(err(
            "pipeline.retry_base_delay_ms",
            "base delay exceeds retry_max_delay_ms",
        ));
    }

    if config.notifications.user_workers == 0 {
        errors.push(err("notifications.user_workers", "must be at least 1"));
    }
    if config.notifications.admin_workers == 0 {
        errors.push(err("notifications.admin_workers", "must be at least 1"));
    }
    if config.notifications.feed_cap == 0 {
        errors.push(err("notifications.feed_cap", "must be at least 1"));
    }

    if !(0.0..=1.0).contains(&config.risk.threshold) {
        errors.push(err("risk.threshold", "must be within 0.0..=1.0"));
    }

    if config.blockchain.enabled {
        if config.blockchain.rpc_url.parse::<url::Url>().is_err() {
            errors.push(err(
                "blockchain.rpc_url",
                format!("not a valid URL: {}", config.blockchain.rpc_url),
            ));
        }
        for (i, failover) in config.blockchain.failover_urls.iter().enumerate() {
            if failover.parse::<url::Url>().is_err() {
                errors.push(err(
                    &format!("blockchain.failover_urls[{}]", i),
                    format!("not a valid URL: {}", failover),
                ));
            }
        }
        if config.blockchain.max_concurrent_submissions == 0 {
            errors.push(err("blockchain.max_concurrent_submissions", "must be at least 1"));
        }
        if config.blockchain.gas_price_multiplier < 1.0 {
            errors.push(err("blockchain.gas_price_multiplier", "must be at least 1.0"));
        }
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(err("admin.api_key", "required when admin routes are enabled"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(err(
            "observability.metrics_address",
            format!("not a valid socket address: {}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
