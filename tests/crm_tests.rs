mod common;

use chat_tldr::core::models::{Sentiment, SummaryRecord, Urgency};
use chat_tldr::errors::PipelineError;
use chat_tldr::worker::{CrmDispatcher, CrmPayload, CrmSink};
use chrono::Utc;
use common::config_with;
use serde_json::Value;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn record() -> SummaryRecord {
    SummaryRecord {
        ticket_id: Some("T-7".to_string()),
        chat_id: "C1".to_string(),
        customer_email: Some("jane@example.com".to_string()),
        customer_name: Some("Jane Doe".to_string()),
        summary: "Customer's invoice was corrected.".to_string(),
        key_issues: vec!["Wrong invoice".to_string()],
        resolution: Some("Invoice reissued".to_string()),
        action_items: vec![],
        sentiment: Sentiment::Positive,
        urgency: Urgency::Low,
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn test_rest_mode_sends_authenticated_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/summaries"))
        .and(header("authorization", "Bearer crm-key"))
        .and(header("x-api-key", "crm-key"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = format!("{}/crm/summaries", server.uri());
    let config = config_with(&[("CRM_ENDPOINT_URL", &endpoint), ("CRM_API_KEY", "crm-key")]);
    let dispatcher = CrmDispatcher::new(&config).unwrap();
    let record = record();

    let outcome = dispatcher
        .dispatch(&CrmPayload {
            record: &record,
            raw_transcript: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.mode, "rest");
    assert_eq!(outcome.status, 201);

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    let keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
    for field in [
        "ticket_id",
        "chat_id",
        "customer_email",
        "customer_name",
        "summary",
        "key_issues",
        "resolution",
        "action_items",
        "sentiment",
        "urgency",
        "timestamp",
    ] {
        assert!(keys.contains(&field), "missing {field}");
    }
    assert_eq!(body["sentiment"], "positive");
    assert_eq!(body["urgency"], "low");
    assert!(body.get("raw_transcript").is_none());
}

#[tokio::test]
async fn test_webhook_mode_omits_crm_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let hook = format!("{}/hook", server.uri());
    let config = config_with(&[
        ("CRM_MODE", "webhook"),
        ("CRM_WEBHOOK_URL", &hook),
        ("CRM_API_KEY", "crm-key"),
        (
            "CRM_CUSTOM_HEADERS",
            r#"{"X-Tenant": "acme", "Authorization": "Bearer leaked"}"#,
        ),
    ]);
    let dispatcher = CrmDispatcher::new(&config).unwrap();
    let record = record();

    let outcome = dispatcher
        .dispatch(&CrmPayload {
            record: &record,
            raw_transcript: Some("[10:00] Customer: my invoice is wrong"),
        })
        .await
        .unwrap();
    assert_eq!(outcome.mode, "webhook");

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    assert!(request.headers.get("authorization").is_none());
    assert!(request.headers.get("x-api-key").is_none());
    assert_eq!(request.headers.get("x-tenant").unwrap(), "acme");

    let body: Value = request.body_json().unwrap();
    assert_eq!(body["chat_id"], "C1");
    assert_eq!(body["raw_transcript"], "[10:00] Customer: my invoice is wrong");
}

#[tokio::test]
async fn test_webhook_mode_falls_back_to_endpoint_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = format!("{}/crm", server.uri());
    let config = config_with(&[("CRM_USE_WEBHOOK", "true"), ("CRM_ENDPOINT_URL", &endpoint)]);
    let dispatcher = CrmDispatcher::new(&config).unwrap();

    assert_eq!(dispatcher.target_url(), Some(endpoint.as_str()));
    let record = record();
    dispatcher
        .dispatch(&CrmPayload {
            record: &record,
            raw_transcript: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_non_2xx_is_dispatch_error_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad summary"))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_with(&[("CRM_ENDPOINT_URL", &server.uri())]);
    let dispatcher = CrmDispatcher::new(&config).unwrap();
    let record = record();

    let err = dispatcher
        .dispatch(&CrmPayload {
            record: &record,
            raw_transcript: None,
        })
        .await
        .unwrap_err();

    match err {
        PipelineError::DispatchError { status, message } => {
            assert_eq!(status, Some(422));
            assert!(message.contains("bad summary"));
        }
        other => panic!("expected DispatchError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_network_failure_is_dispatch_error_without_status() {
    // Nothing listens on this port once the server is dropped.
    let uri = {
        let server = MockServer::builder().start().await;
        server.uri()
    };
    let config = config_with(&[("CRM_ENDPOINT_URL", &uri)]);
    let dispatcher = CrmDispatcher::new(&config).unwrap();
    let record = record();

    let err = dispatcher
        .dispatch(&CrmPayload {
            record: &record,
            raw_transcript: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::DispatchError { status: None, .. }));
}

#[tokio::test]
async fn test_missing_url_is_dispatch_error() {
    let config = config_with(&[]);
    let dispatcher = CrmDispatcher::new(&config).unwrap();
    let record = record();

    let err = dispatcher
        .dispatch(&CrmPayload {
            record: &record,
            raw_transcript: None,
        })
        .await
        .unwrap_err();

    match err {
        PipelineError::DispatchError { status, message } => {
            assert_eq!(status, None);
            assert!(message.contains("rest"));
        }
        other => panic!("expected DispatchError, got {other:?}"),
    }
}
