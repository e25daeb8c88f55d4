use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Write;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use watch_core::IssueKind;

use crate::state::AppState;

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut out = String::with_capacity(2048);

    writeln!(out, "# TYPE watch_engine_state stateset").unwrap();
    writeln!(out, "# HELP watch_engine_state Current state of the check scheduler").unwrap();
    let engine_state = state.checker.state().await.to_string();
    for variant in &["idle", "active", "stopping", "stopped"] {
        writeln!(
            out,
            "watch_engine_state{{state=\"{}\"}} {}",
            variant,
            if engine_state == *variant { 1 } else { 0 }
        )
        .unwrap();
    }

    let targets = state.store.list_targets().await.unwrap_or_default();

    writeln!(out, "# TYPE watch_targets gauge").unwrap();
    writeln!(out, "# HELP watch_targets Number of registered targets").unwrap();
    writeln!(out, "watch_targets {}", targets.len()).unwrap();

    writeln!(out, "# TYPE watch_cycles_completed counter").unwrap();
    writeln!(out, "# HELP watch_cycles_completed Check cycles completed since start").unwrap();
    writeln!(out, "watch_cycles_completed {}", state.checker.cycles_completed()).unwrap();

    writeln!(out, "# TYPE watch_cycles_skipped counter").unwrap();
    writeln!(
        out,
        "# HELP watch_cycles_skipped Scheduler ticks skipped because a cycle was still running"
    )
    .unwrap();
    writeln!(out, "watch_cycles_skipped {}", state.checker.cycles_skipped()).unwrap();

    writeln!(out, "# TYPE watch_open_alerts gauge").unwrap();
    writeln!(out, "# HELP watch_open_alerts Currently open alerts by issue kind").unwrap();
    let mut open_counts: HashMap<IssueKind, usize> = HashMap::new();
    let distinct_urls: HashSet<&str> = targets.iter().map(|t| t.url.as_str()).collect();
    for url in distinct_urls {
        if let Ok(notification) = state.store.notification_state(url).await {
            for kind in notification.open_kinds() {
                *open_counts.entry(kind).or_default() += 1;
            }
        }
    }
    for kind in [
        IssueKind::Reachability,
        IssueKind::CertificateExpiry,
        IssueKind::DomainExpiry,
    ] {
        writeln!(
            out,
            "watch_open_alerts{{kind=\"{}\"}} {}",
            kind,
            open_counts.get(&kind).copied().unwrap_or(0)
        )
        .unwrap();
    }

    writeln!(out, "# TYPE watch_last_cycle_timestamp_seconds gauge").unwrap();
    writeln!(
        out,
        "# HELP watch_last_cycle_timestamp_seconds Unix timestamp of the last completed cycle"
    )
    .unwrap();
    if let Some(t) = state.checker.last_cycle().await {
        let secs = t.timestamp() as f64 + (t.timestamp_subsec_millis() as f64 / 1000.0);
        writeln!(out, "watch_last_cycle_timestamp_seconds {:.3}", secs).unwrap();
    }

    writeln!(out, "# EOF").unwrap();

    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        out,
    )
}
