use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};

lazy_static! {
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "chkit_query_duration_seconds",
        "Query duration in seconds, including failover",
        &["operation", "status"]
    ).unwrap();

    pub static ref OPERATION_COUNTER: IntCounterVec = register_int_counter_vec!(
        "chkit_operations_total",
        "Total number of client operations",
        &["operation", "status"]
    ).unwrap();

    pub static ref HOST_FAILURES: IntCounterVec = register_int_counter_vec!(
        "chkit_host_failures_total",
        "Failed requests per host",
        &["host"]
    ).unwrap();

    pub static ref HOST_COOLDOWNS: IntCounter = register_int_counter!(
        "chkit_host_cooldowns_total",
        "Number of times a host was put into cooldown"
    ).unwrap();

    pub static ref BUFFERED_ROWS: IntGaugeVec = register_int_gauge_vec!(
        "chkit_buffered_rows",
        "Rows waiting in the write buffer",
        &["table"]
    ).unwrap();
}

pub fn record_operation(operation: &str, success: bool, duration: f64) {
    let status = if success { "success" } else { "failure" };
    QUERY_DURATION
        .with_label_values(&[operation, status])
        .observe(duration);
    OPERATION_COUNTER
        .with_label_values(&[operation, status])
        .inc();
}

pub fn record_host_failure(host: &str) {
    HOST_FAILURES.with_label_values(&[host]).inc();
    HOST_COOLDOWNS.inc();
}

pub fn set_buffered_rows(table: &str, rows: usize) {
    BUFFERED_ROWS.with_label_values(&[table]).set(rows as i64);
}
