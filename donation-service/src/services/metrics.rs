use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{CounterVec, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static DONATION_VERIFICATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static DONATION_AMOUNT_TOTAL: OnceLock<CounterVec> = OnceLock::new();

pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    let registry = Registry::new();

    let verifications_counter = IntCounterVec::new(
        Opts::new(
            "donation_verifications_total",
            "Total donation verification attempts by route and outcome",
        ),
        &["route", "status"],
    )
    .expect("Failed to create donation_verifications_total metric");

    let amount_counter = CounterVec::new(
        Opts::new(
            "donation_amount_total",
            "Total verified donation amounts by currency (major unit)",
        ),
        &["currency"],
    )
    .expect("Failed to create donation_amount_total metric");

    registry
        .register(Box::new(verifications_counter.clone()))
        .expect("Failed to register donation_verifications_total");
    registry
        .register(Box::new(amount_counter.clone()))
        .expect("Failed to register donation_amount_total");

    PROMETHEUS_REGISTRY
        .set(registry)
        .expect("Failed to set prometheus registry");
    DONATION_VERIFICATIONS_TOTAL
        .set(verifications_counter)
        .expect("Failed to set donation_verifications_total");
    DONATION_AMOUNT_TOTAL
        .set(amount_counter)
        .expect("Failed to set donation_amount_total");
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Record the outcome of a verification attempt.
pub fn record_verification(route: &str, status: &str) {
    if let Some(counter) = DONATION_VERIFICATIONS_TOTAL.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

/// Record a verified donation amount.
pub fn record_amount(currency: &str, amount: f64) {
    if let Some(counter) = DONATION_AMOUNT_TOTAL.get() {
        counter.with_label_values(&[currency]).inc_by(amount);
    }
}
