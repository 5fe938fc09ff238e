//! End-to-end handler behavior against the embedded engine.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use metricount_core::protocol::event::{Event, Response};
use metricount_core::protocol::metric::MetricName;
use metricount_function::db::TableName;

use common::{fast_retry, fixture, post_metric, ready_fixture, upsert};

fn table() -> TableName {
    TableName::parse("metrics").unwrap()
}

#[tokio::test]
async fn first_then_second_request() {
    let fx = ready_fixture().await;
    let event: Event = serde_json::from_str(
        r#"{"httpMethod":"POST","body":"{\"metricName\":\"page_views\"}"}"#,
    )
    .unwrap();

    let first = fx.service.handle(event.clone()).await;
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        r#"{"statusCode":201,"body":"{\"status\":\"created\",\"metric\":\"page_views\",\"count\":1}"}"#
    );

    let second = fx.service.handle(event).await;
    assert_eq!(
        serde_json::to_string(&second).unwrap(),
        r#"{"statusCode":200,"body":"{\"status\":\"incremented\",\"metric\":\"page_views\"}"}"#
    );
}

#[tokio::test]
async fn new_metric_creates_exactly_one_row() {
    let fx = ready_fixture().await;
    for name in ["a", "signups", "checkout.completed", "ключ"] {
        let resp = upsert(&fx, name).await;
        assert_eq!(resp.status_code, 201, "metric={name} body={}", resp.body);
        let row = fx
            .engine
            .row(&table(), &MetricName::parse(name).unwrap())
            .await
            .unwrap();
        assert_eq!(row.count, 1);
    }
    assert_eq!(fx.engine.row_count(&table()).await, Some(4));
}

#[tokio::test]
async fn existing_row_increments_by_one_and_keeps_creation_time() {
    let fx = ready_fixture().await;
    let name = MetricName::parse("page_views").unwrap();
    upsert(&fx, "page_views").await;
    let before = fx.engine.row(&table(), &name).await.unwrap();

    let resp = upsert(&fx, "page_views").await;
    assert_eq!(resp.status_code, 200);

    let after = fx.engine.row(&table(), &name).await.unwrap();
    assert_eq!(after.count, before.count + 1);
    assert_eq!(after.creation_time, before.creation_time);
}

#[tokio::test]
async fn sequential_calls_count_exactly() {
    let fx = ready_fixture().await;
    const N: u64 = 25;
    for _ in 0..N {
        let resp = upsert(&fx, "orders").await;
        assert!(matches!(resp.status_code, 200 | 201), "{}", resp.body);
    }
    let row = fx
        .engine
        .row(&table(), &MetricName::parse("orders").unwrap())
        .await
        .unwrap();
    assert_eq!(row.count, N);
    assert_eq!(fx.metrics.upsert_outcomes.get(&[("outcome", "created")]), 1);
    assert_eq!(fx.metrics.upsert_outcomes.get(&[("outcome", "incremented")]), N - 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_lose_no_updates() {
    let fx = ready_fixture().await;
    const M: u64 = 32;

    let mut handles = Vec::new();
    for _ in 0..M {
        let service = fx.service.clone();
        handles.push(tokio::spawn(async move {
            service.handle(post_metric("hot_counter")).await
        }));
    }

    let mut created = 0;
    for h in handles {
        let resp: Response = h.await.unwrap();
        match resp.status_code {
            201 => created += 1,
            200 => {}
            other => panic!("unexpected status {other}: {}", resp.body),
        }
    }

    assert_eq!(created, 1, "exactly one caller creates the row");
    let row = fx
        .engine
        .row(&table(), &MetricName::parse("hot_counter").unwrap())
        .await
        .unwrap();
    assert_eq!(row.count, M);
}

#[tokio::test]
async fn name_length_boundary() {
    let fx = ready_fixture().await;

    let ok = upsert(&fx, &"x".repeat(255)).await;
    assert_eq!(ok.status_code, 201);

    let connects = fx.engine.stats().connects;
    let too_long = upsert(&fx, &"x".repeat(256)).await;
    assert_eq!(too_long.status_code, 400);
    assert_eq!(too_long.body, r#"{"error":"metricName too long"}"#);
    assert_eq!(fx.engine.stats().connects, connects, "no database call for 400");
}

#[tokio::test]
async fn invalid_bodies_are_rejected_without_database() {
    let fx = fixture(fast_retry(3));
    let cases = [
        Event::post(r#"{"name":"page_views"}"#),
        Event::post(r#"{"metricName":7}"#),
        Event::post(r#"{"metricName":null}"#),
        Event::post(r#"{"metricName":""}"#),
        Event::post(""),
        Event::post("{"),
        Event {
            http_method: Some("POST".into()),
            ..Event::default()
        },
    ];
    for ev in cases {
        let resp = fx.service.handle(ev.clone()).await;
        assert_eq!(resp.status_code, 400, "event={ev:?}");
    }
    assert_eq!(fx.engine.stats().connects, 0);
    assert_eq!(fx.metrics.errors.get(&[("kind", "bad_request")]), 7);
}

#[tokio::test]
async fn non_post_is_405_without_database() {
    let fx = fixture(fast_retry(3));
    for method in ["GET", "PUT", "DELETE", "post"] {
        let ev = Event {
            http_method: Some(method.into()),
            body: Some(r#"{"metricName":"page_views"}"#.into()),
            ..Event::default()
        };
        let resp = fx.service.handle(ev).await;
        assert_eq!(resp, Response::text(405, "Method Not Allowed"), "method={method}");
    }
    assert_eq!(fx.engine.stats().connects, 0);
}

#[tokio::test]
async fn init_creates_table_and_enables_upserts() {
    let fx = fixture(fast_retry(3));

    let resp = fx
        .service
        .handle(Event {
            mode: Some("init".into()),
            http_method: Some("GET".into()),
            body: Some("garbage".into()),
        })
        .await;
    assert_eq!(resp, Response::text(200, "Schema created successfully"));

    let schema = fx.engine.table_schema(&table()).await.unwrap();
    assert_eq!(schema.primary_key, vec!["metricName"]);
    assert_eq!(schema.partitioning.partition_size_mb, 1024);

    assert_eq!(upsert(&fx, "page_views").await.status_code, 201);
    let stats = fx.engine.stats();
    assert_eq!(stats.connects, 2);
    assert_eq!(stats.stops, 2);
}

#[tokio::test]
async fn repeated_init_succeeds_and_keeps_rows() {
    let fx = ready_fixture().await;
    assert_eq!(upsert(&fx, "page_views").await.status_code, 201);

    let resp = fx.service.handle(Event::init()).await;
    assert_eq!(resp, Response::text(200, "Schema created successfully"));

    let row = fx
        .engine
        .row(&table(), &MetricName::parse("page_views").unwrap())
        .await
        .unwrap();
    assert_eq!(row.count, 1);
    assert_eq!(upsert(&fx, "page_views").await.status_code, 200);
}

#[tokio::test]
async fn upsert_before_init_is_500_and_not_retried() {
    let fx = fixture(fast_retry(5));
    let resp = upsert(&fx, "page_views").await;
    assert_eq!(resp.status_code, 500);
    assert!(resp.body.starts_with(r#"{"error":"scheme error: "#), "{}", resp.body);

    let stats = fx.engine.stats();
    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.rollbacks, 1);
    assert_eq!(stats.stops, 1);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let fx = ready_fixture().await;
    fx.engine.inject_unavailable(2);
    fx.engine.inject_conflicts(2);

    let resp = upsert(&fx, "page_views").await;
    assert_eq!(resp.status_code, 201, "{}", resp.body);
    assert_eq!(fx.metrics.tx_retries.get(&[("reason", "unavailable")]), 2);
    assert_eq!(fx.metrics.tx_retries.get(&[("reason", "conflict")]), 2);

    let row = fx
        .engine
        .row(&table(), &MetricName::parse("page_views").unwrap())
        .await
        .unwrap();
    assert_eq!(row.count, 1);
}

#[tokio::test]
async fn exhausted_retries_surface_as_500_and_release_driver() {
    let fx = ready_fixture().await;
    fx.engine.inject_unavailable(100);

    let service = {
        // Same engine, smaller budget.
        let mut cfg = fx.service.cfg().clone();
        cfg.retry = fast_retry(2);
        metricount_function::service::MetricCounterService::new(
            std::sync::Arc::new(cfg),
            fx.connector.clone(),
            fx.metrics.clone(),
        )
    };

    let resp = service.handle(post_metric("page_views")).await;
    assert_eq!(resp.status_code, 500);
    assert!(
        resp.body.contains("retries exhausted after 3 attempts"),
        "{}",
        resp.body
    );

    let stats = fx.engine.stats();
    assert_eq!(stats.connects, stats.stops);
    assert_eq!(fx.metrics.drivers_open.get(&[]), 0);
}
