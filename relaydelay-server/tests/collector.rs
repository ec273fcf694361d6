use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;

use relaydelay_config::Config;
use relaydelay_metrics::{
    CollectorCounters, CollectorGauges, DirectionCounters, MetricsRegistry, PushClient,
};
use relaydelay_server::{CollectionLoop, Controller, HealthState, IsHealthy};
use relaydelay_store::MemoryStore;
use relaydelay_telemetry::Direction;
use relaydelay_telemetry::testutils::{encode_blob, telemetry_json};
use similar_asserts::assert_eq;

const CONFIG: &str = r#"
collector:
  period: 60
store:
  max_retries: 2
  retry_initial_interval: 1
  retry_max_interval: 4
metrics:
  histogram: { start: 10.0, width: 10.0, count: 3 }
relays:
  nodes:
    1: 10.0.0.1
    2: 10.0.0.2
"#;

struct Harness {
    store: Arc<MemoryStore>,
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthState>,
    collector: CollectionLoop,
}

fn harness() -> Harness {
    harness_with_push(None)
}

fn harness_with_push(push: Option<PushClient>) -> Harness {
    relaydelay_log::init_test!();

    let config = Config::from_yaml_str(CONFIG).unwrap();
    let store = Arc::new(MemoryStore::new());
    let metrics = Arc::new(MetricsRegistry::from_config(&config).unwrap());
    let health = Arc::new(HealthState::new());

    let collector = CollectionLoop::new(
        &config,
        store.clone(),
        metrics.clone(),
        health.clone(),
        push,
    );

    Harness {
        store,
        metrics,
        health,
        collector,
    }
}

/// Starts a push gateway answering every request with `status`.
///
/// Returns the gateway address and the number of requests received so far.
async fn gateway(status: StatusCode) -> (String, Arc<AtomicUsize>) {
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();

    let app = Router::new().fallback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { status }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    (format!("http://{addr}"), requests)
}

fn push_client(addr: &str) -> PushClient {
    PushClient::new(addr, "relaydelay", "test", Duration::from_secs(5)).unwrap()
}

fn blob(upstream_to_relay: &[(i64, f64)], relay_to_upstream: &[(i64, f64)]) -> String {
    encode_blob(
        telemetry_json(upstream_to_relay, relay_to_upstream).as_bytes(),
        76,
    )
}

/// Returns the exposition lines of the delay summary counts.
fn summary_counts(metrics: &MetricsRegistry) -> Vec<String> {
    let text = metrics.encode_text().unwrap();
    text.lines()
        .filter(|line| line.starts_with("relaydelay_Summary_relay_count"))
        .map(str::to_owned)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_cycle_records_known_relays() {
    let mut h = harness();
    h.store.insert(blob(&[(1, 37.0)], &[]), 1_000);
    h.store.insert(blob(&[(1, 12.0), (2, 0.0)], &[(2, 25.0), (999, 5.0)]), 2_000);
    h.store.insert("", 3_000);
    h.store.insert("marker", 10_000);

    let report = h.collector.run_cycle().await.unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(report.decode_errors, 0);
    assert_eq!(report.summary.recorded(), 3);
    assert_eq!(report.summary.upstream_to_relay.zero_suppressed, 1);
    assert_eq!(report.summary.relay_to_upstream.unknown, 1);

    insta::assert_snapshot!(summary_counts(&h.metrics).join("\n"), @r#"
    relaydelay_Summary_relay_count{IP="10.0.0.1",RelayId="1"} 2
    relaydelay_Summary_relay_count{IP="10.0.0.2",RelayId="2"} 1
    "#);

    assert_eq!(h.metrics.counter(CollectorCounters::Records), 2);
    assert_eq!(
        h.metrics
            .direction_counter(DirectionCounters::UnknownRelay, Direction::RelayToUpstream),
        1
    );
    assert_eq!(h.metrics.gauge(CollectorGauges::WatermarkMillis), 10_000);
    assert!(h.health.check(IsHealthy::Readiness));
}

#[tokio::test(start_paused = true)]
async fn test_bad_records_do_not_abort_cycle() {
    let mut h = harness();
    h.store.insert("not base64 !", 1_000);
    let wrong_type = r#"{"ur_link_info": {"U_R_self": [{"relayID": 1, "delay": "x"}]}}"#;
    h.store.insert(encode_blob(wrong_type.as_bytes(), 76), 2_000);
    // Invalid JSON yields no readings but is not an error.
    h.store.insert(encode_blob(b"{not json", 76), 3_000);
    h.store.insert(blob(&[(2, 8.0)], &[]), 4_000);
    h.store.insert("marker", 5_000);

    let report = h.collector.run_cycle().await.unwrap();

    assert_eq!(report.records, 4);
    assert_eq!(report.decode_errors, 1);
    assert_eq!(report.parse_errors, 1);
    assert_eq!(report.summary.recorded(), 1);
    assert_eq!(h.metrics.counter(CollectorCounters::DecodeErrors), 1);
    assert_eq!(h.metrics.counter(CollectorCounters::ParseErrors), 1);
}

#[tokio::test(start_paused = true)]
async fn test_records_processed_once() {
    let mut h = harness();
    h.store.insert(blob(&[(1, 37.0)], &[]), 1_000);
    h.store.insert("marker", 2_000);
    h.collector.run_cycle().await.unwrap();

    h.store.insert(blob(&[(1, 41.0)], &[]), 3_000);
    h.store.insert("marker", 4_000);
    let report = h.collector.run_cycle().await.unwrap();
    assert_eq!(report.records, 1);

    // No new records: the range collapses and nothing is recorded again.
    let report = h.collector.run_cycle().await.unwrap();
    assert_eq!(report.records, 0);

    assert_eq!(
        summary_counts(&h.metrics),
        vec![r#"relaydelay_Summary_relay_count{IP="10.0.0.1",RelayId="1"} 2"#]
    );

    let queries = h.store.queries();
    assert_eq!(queries.len(), 3);
    assert_eq!(queries[1].after, queries[0].before);
    assert_eq!(queries[2].after, queries[1].before);
}

#[tokio::test(start_paused = true)]
async fn test_empty_store_is_healthy() {
    let mut h = harness();

    let report = h.collector.run_cycle().await.unwrap();
    assert_eq!(report.range, None);
    assert!(h.health.check(IsHealthy::Readiness));
    assert_eq!(h.collector.watermark(), None);
}

#[tokio::test(start_paused = true)]
async fn test_transient_store_failure_is_retried() {
    let mut h = harness();
    h.store.insert(blob(&[(1, 37.0)], &[]), 1_000);
    h.store.insert("marker", 2_000);
    h.store.fail_next(2);

    let report = h.collector.run_cycle().await.unwrap();
    assert_eq!(report.summary.recorded(), 1);
    assert_eq!(h.metrics.counter(CollectorCounters::StoreErrors), 2);
    assert!(h.health.check(IsHealthy::Readiness));
}

#[tokio::test(start_paused = true)]
async fn test_persistent_store_failure() {
    let mut h = harness();
    h.store.insert(blob(&[(1, 37.0)], &[]), 1_000);
    h.store.insert("marker", 2_000);
    h.collector.run_cycle().await.unwrap();

    h.store.insert(blob(&[(1, 41.0)], &[]), 3_000);
    h.store.insert("marker", 4_000);
    h.store.set_failing(true);

    assert!(h.collector.run_cycle().await.is_err());
    // One attempt plus two retries.
    assert_eq!(h.metrics.counter(CollectorCounters::StoreErrors), 3);
    assert!(!h.health.check(IsHealthy::Readiness));
    assert!(h.health.check(IsHealthy::Liveness));
    assert_eq!(h.metrics.gauge(CollectorGauges::StoreHealthy), 0);
    assert_eq!(h.metrics.gauge(CollectorGauges::WatermarkMillis), 2_000);

    // Once the store recovers, the skipped records are picked up.
    h.store.set_failing(false);
    let report = h.collector.run_cycle().await.unwrap();
    assert_eq!(report.records, 1);
    assert!(h.health.check(IsHealthy::Readiness));
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown() {
    let h = harness();
    h.store.insert(blob(&[(1, 37.0)], &[]), 1_000);
    h.store.insert("marker", 2_000);

    let controller = Controller::new();
    let task = tokio::spawn(h.collector.run(controller.shutdown_handle()));

    // Let the first cycle and a few sleeps pass.
    tokio::time::sleep(std::time::Duration::from_secs(150)).await;
    controller.shutdown();
    task.await.unwrap();

    assert_eq!(h.metrics.counter(CollectorCounters::Cycles), 3);
    assert_eq!(h.store.queries().len(), 3);
}

#[tokio::test]
async fn test_failed_push_does_not_stop_cycles() {
    let (addr, requests) = gateway(StatusCode::INTERNAL_SERVER_ERROR).await;
    let mut h = harness_with_push(Some(push_client(&addr)));
    h.store.insert(blob(&[(1, 37.0)], &[]), 1_000);
    h.store.insert("marker", 2_000);

    let report = h.collector.run_cycle().await.unwrap();
    assert_eq!(report.summary.recorded(), 1);
    assert_eq!(h.metrics.counter(CollectorCounters::ExportErrors), 1);

    h.store.insert(blob(&[(1, 41.0)], &[]), 3_000);
    h.store.insert("marker", 4_000);

    let report = h.collector.run_cycle().await.unwrap();
    assert_eq!(report.records, 1);
    assert_eq!(h.metrics.counter(CollectorCounters::ExportErrors), 2);
    assert_eq!(requests.load(Ordering::SeqCst), 2);
    assert!(h.health.check(IsHealthy::Readiness));
}

#[tokio::test]
async fn test_unreachable_gateway_is_counted() {
    let mut h = harness_with_push(Some(push_client("http://127.0.0.1:1")));

    h.collector.run_cycle().await.unwrap();
    h.collector.run_cycle().await.unwrap();
    assert_eq!(h.metrics.counter(CollectorCounters::ExportErrors), 2);
    assert_eq!(h.metrics.counter(CollectorCounters::Cycles), 2);
}

#[tokio::test]
async fn test_successful_push() {
    let (addr, requests) = gateway(StatusCode::OK).await;
    let mut h = harness_with_push(Some(push_client(&addr)));

    h.collector.run_cycle().await.unwrap();
    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert_eq!(h.metrics.counter(CollectorCounters::ExportErrors), 0);
}
