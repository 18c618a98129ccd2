//! Integration tests for the upload wire format.
//!
//! Tests the full flow: capture -> buffer -> flush -> reqwest -> HTTP receiver

mod common;

use std::sync::Arc;

use common::{config_for, Receiver};
use lantern_telemetry::fetch::{ALERT_PATH, ERRORS_BATCH_PATH, METRICS_BATCH_PATH};
use lantern_telemetry::{
    CaptureOptions, Collector, ErrorType, Fetch, FetchRequest, FlushOutcome, MetricUnit,
    ReqwestFetch, Severity,
};
use rstest::rstest;
use serde_json::json;

fn collector_for(receiver: &Receiver) -> Arc<Collector> {
    Collector::builder(config_for(&receiver.base_url))
        .build()
        .expect("collector builds")
}

#[rstest]
#[tokio::test]
async fn batches_use_backend_wire_shape() {
    let receiver = Receiver::spawn().await;
    let collector = collector_for(&receiver);

    collector.set_tag("region", "eu-west");
    collector.set_context("cart", json!({"items": 2}));
    collector.add_breadcrumb("clicked pay", "ui", Some(json!({"button": "primary"})));
    for _ in 0..3 {
        collector.capture_error("Boom", CaptureOptions::new().data("orderId", 991));
    }
    collector.record_metric("checkout_render", 84.5, MetricUnit::Milliseconds);

    let FlushOutcome::Completed(report) = collector.flush().await else {
        panic!("flush did not run");
    };
    assert!(report.is_clean());

    let errors = receiver.received(ERRORS_BATCH_PATH);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].content_type.as_deref(), Some("application/json"));

    let body = &errors[0].body;
    let error = &body["errors"][0];
    assert_eq!(error["message"], "Boom");
    assert_eq!(error["type"], "javascript");
    assert_eq!(error["severity"], "medium");
    assert_eq!(error["count"], 3);
    assert_eq!(error["resolved"], false);
    assert!(error["firstSeen"].is_string());
    assert!(error["lastSeen"].is_string());
    assert_eq!(error["context"]["buildVersion"], "2.4.1");
    assert_eq!(error["context"]["environment"], "integration");
    assert_eq!(error["context"]["additionalData"]["orderId"], 991);
    assert!(error["context"]["sessionId"].is_string());
    assert_eq!(
        error["tags"],
        json!(["type:javascript", "environment:integration", "region:eu-west"])
    );
    assert_eq!(body["breadcrumbs"][0]["message"], "clicked pay");
    assert_eq!(body["breadcrumbs"][0]["data"]["button"], "primary");
    assert_eq!(body["contexts"]["cart"]["items"], 2);

    let metrics = receiver.received(METRICS_BATCH_PATH);
    let metric = &metrics[0].body["metrics"][0];
    assert_eq!(metric["name"], "checkout_render");
    assert_eq!(metric["value"], 84.5);
    assert_eq!(metric["unit"], "ms");
    assert!(metric["context"]["userAgent"].is_string());
}

#[rstest]
#[tokio::test]
async fn critical_report_is_alerted_over_http() {
    let receiver = Receiver::spawn().await;
    let collector = collector_for(&receiver);
    collector.start().expect("collector starts");

    let id = collector.capture_error(
        "Card vault unreachable",
        CaptureOptions::new()
            .severity(Severity::Critical)
            .error_type(ErrorType::Security),
    );

    let alerts = receiver.wait_for(ALERT_PATH, 1).await;
    assert_eq!(alerts[0].body["id"], id.as_str());
    assert_eq!(alerts[0].body["type"], "security");
    assert_eq!(alerts[0].body["severity"], "critical");
    collector.destroy();
}

#[rstest]
#[tokio::test]
async fn rejected_batch_is_requeued() {
    let receiver = Receiver::spawn().await;
    receiver.respond_with(503);
    let collector = collector_for(&receiver);

    collector.capture_error("Inventory sync failed", CaptureOptions::new());
    let FlushOutcome::Completed(report) = collector.flush().await else {
        panic!("flush did not run");
    };
    assert_eq!(report.requeued_errors, 1);
    assert_eq!(collector.pending_errors().len(), 1);

    receiver.respond_with(200);
    collector.flush().await;
    assert!(collector.pending_errors().is_empty());
    assert_eq!(receiver.received(ERRORS_BATCH_PATH).len(), 2);
}

#[rstest]
#[tokio::test]
async fn instrumented_client_reports_without_query_string() {
    let receiver = Receiver::spawn().await;
    receiver.respond_with(500);
    let collector = collector_for(&receiver);
    let client = collector.instrument(ReqwestFetch::new().expect("client builds"));

    let url = format!("{}/v1/users?token=abc123", receiver.base_url);
    let response = client
        .fetch(FetchRequest::get(url))
        .await
        .expect("server answered");
    assert_eq!(response.status, 500);

    let requests = receiver.received("/v1/users");
    assert_eq!(requests[0].query.as_deref(), Some("token=abc123"));

    let pending = collector.pending_errors();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].error_type, ErrorType::Api);
    assert_eq!(pending[0].severity, Severity::High);
    assert!(!pending[0].message.contains("abc123"));

    let metrics = collector.pending_metrics();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].name, "api_call_v1_users");
}
