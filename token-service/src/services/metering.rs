//! Login metering counters exposed on `/metrics`.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;
use uuid::Uuid;

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static LOGINS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Register the metering counters. Safe to call more than once; later
/// calls are no-ops (test harnesses share the process registry).
pub fn init_metrics() {
    if REGISTRY.get().is_some() {
        return;
    }

    let registry = Registry::new();

    let logins_total = match IntCounterVec::new(
        Opts::new("logins_total", "Total number of successful logins"),
        &["channel"],
    ) {
        Ok(metric) => metric,
        Err(e) => {
            tracing::error!("Failed to create logins_total metric: {}", e);
            return;
        }
    };

    if let Err(e) = registry.register(Box::new(logins_total.clone())) {
        tracing::error!("Failed to register logins_total collector: {}", e);
        return;
    }

    let _ = REGISTRY.set(registry);
    let _ = LOGINS_TOTAL.set(logins_total);
}

/// Count a successful login on the given channel ("token" for the refresh
/// grant).
pub fn record_login(channel: &str, user_id: Uuid) {
    if let Some(counter) = LOGINS_TOTAL.get() {
        counter.with_label_values(&[channel]).inc();
    }
    tracing::info!(channel = %channel, user_id = %user_id, "login recorded");
}

/// Encode the registry in the prometheus text format.
pub fn gather() -> Result<String, anyhow::Error> {
    let registry = REGISTRY
        .get()
        .ok_or_else(|| anyhow::anyhow!("metrics registry not initialized"))?;

    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_login_shows_up_in_gather() {
        init_metrics();
        record_login("token", Uuid::new_v4());

        let text = gather().unwrap();
        assert!(text.contains("logins_total"));
    }
}
