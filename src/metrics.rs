use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, GaugeVec, Histogram, register_counter, register_counter_vec,
    register_gauge_vec, register_histogram,
};

lazy_static! {
    pub static ref CONVERSIONS_TOTAL: Counter =
        register_counter!("deck2pdf_conversions_total", "Total conversion requests accepted")
            .expect("register deck2pdf_conversions_total");
    pub static ref CONVERSION_FAILURES: CounterVec = register_counter_vec!(
        "deck2pdf_failures_total",
        "Rejected or failed requests by error kind",
        &["kind"]
    )
    .expect("register deck2pdf_failures_total");
    pub static ref ADMISSIONS_DENIED: CounterVec = register_counter_vec!(
        "deck2pdf_admissions_denied_total",
        "Requests denied by an admission tier",
        &["tier"]
    )
    .expect("register deck2pdf_admissions_denied_total");
    pub static ref CONVERSION_LATENCY: Histogram = register_histogram!(
        "deck2pdf_conversion_seconds",
        "Engine wall-clock time per conversion attempt"
    )
    .expect("register deck2pdf_conversion_seconds");
    pub static ref JANITOR_REMOVED: Counter = register_counter!(
        "deck2pdf_janitor_removed_total",
        "Stale workspaces removed by the janitor"
    )
    .expect("register deck2pdf_janitor_removed_total");
    pub static ref TRACKED_CLIENTS: GaugeVec = register_gauge_vec!(
        "deck2pdf_tracked_clients",
        "Client entries held by an admission tier",
        &["tier"]
    )
    .expect("register deck2pdf_tracked_clients");
}
