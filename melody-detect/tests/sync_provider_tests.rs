//! Synchronous adapters against a local fake detection endpoint
//!
//! The fake records every request's auth headers and multipart fields, then
//! answers with a configured status and JSON body.

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use melody_common::FailureKind;
use melody_detect::models::DetectionRequest;
use melody_detect::providers::aiornot::AiOrNotClient;
use melody_detect::providers::hive::{HiveAuth, HiveClient};
use melody_detect::providers::http::{HttpSettings, ProviderHttp};
use melody_detect::providers::shlabs::{ShLabsAuth, ShLabsClient};
use melody_detect::providers::sightengine::{SightengineAuth, SightengineClient};
use melody_detect::providers::{ProviderAdapter, Submission};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct FieldRecord {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct Captured {
    authorization: Option<String>,
    api_key: Option<String>,
    fields: Vec<FieldRecord>,
}

impl Captured {
    fn field(&self, name: &str) -> &FieldRecord {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("no multipart field {}", name))
    }

    fn text(&self, name: &str) -> String {
        String::from_utf8(self.field(name).data.clone()).unwrap()
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

struct FakeProvider {
    status: StatusCode,
    body: Value,
    captured: Mutex<Vec<Captured>>,
}

impl FakeProvider {
    fn answering(status: StatusCode, body: Value) -> Arc<Self> {
        Arc::new(Self {
            status,
            body,
            captured: Mutex::new(Vec::new()),
        })
    }

    fn last(&self) -> Captured {
        self.captured.lock().unwrap().last().cloned().expect("no request captured")
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn fake_detect(State(fake): State<Arc<FakeProvider>>, headers: HeaderMap, mut multipart: Multipart) -> Response {
    let mut captured = Captured {
        authorization: header(&headers, "authorization"),
        api_key: header(&headers, "x-api-key"),
        fields: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.unwrap().to_vec();
        captured.fields.push(FieldRecord {
            name,
            file_name,
            content_type,
            data,
        });
    }

    fake.captured.lock().unwrap().push(captured);
    (fake.status, Json(fake.body.clone())).into_response()
}

/// Serve `fake` on an ephemeral port; returns the detection URL
async fn start_fake(fake: Arc<FakeProvider>) -> String {
    let app = Router::new().route("/detect", post(fake_detect)).with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/detect", addr)
}

fn http(provider: &'static str) -> ProviderHttp {
    ProviderHttp::new(provider, HttpSettings::default()).unwrap()
}

fn request() -> DetectionRequest {
    DetectionRequest::new("song.mp3", b"ID3 not really audio".to_vec()).unwrap()
}

fn probability(submission: Submission) -> f64 {
    match submission {
        Submission::Completed(outcome) => outcome.ai_probability,
        other => panic!("expected a completed submission, got {:?}", other),
    }
}

fn assert_audio_part(captured: &Captured, field_name: &str) {
    let audio = captured.field(field_name);
    assert_eq!(audio.file_name.as_deref(), Some("song.mp3"));
    assert_eq!(audio.content_type.as_deref(), Some("audio/mpeg"));
    assert_eq!(audio.data, b"ID3 not really audio");
}

#[tokio::test]
async fn test_aiornot_sends_file_with_bearer() {
    let fake = FakeProvider::answering(
        StatusCode::OK,
        json!({"report": {"verdict": "human", "confidence": 0.75}}),
    );
    let url = start_fake(fake.clone()).await;
    let client = AiOrNotClient::new(http("aiornot"), url, "aon-key");

    let p = probability(client.submit(&request()).await.unwrap());
    assert!((p - 0.25).abs() < 1e-12);

    let captured = fake.last();
    assert_eq!(captured.authorization.as_deref(), Some("Bearer aon-key"));
    assert_audio_part(&captured, "file");
    assert_eq!(captured.fields.len(), 1);
}

#[tokio::test]
async fn test_hive_raw_header_and_media_field() {
    let fake = FakeProvider::answering(
        StatusCode::OK,
        json!({"chunks": [{"score": 0.9}, {"score": 0.7}]}),
    );
    let url = start_fake(fake.clone()).await;
    let client = HiveClient::new(http("hive"), url, HiveAuth::RawHeader("Token hive-raw".to_string()));

    let p = probability(client.submit(&request()).await.unwrap());
    assert!((p - 0.8).abs() < 1e-12);

    let captured = fake.last();
    assert_eq!(captured.authorization.as_deref(), Some("Token hive-raw"));
    assert_audio_part(&captured, "media");
    assert!(!captured.has_field("file"));
}

#[tokio::test]
async fn test_hive_bearer_fallback() {
    let fake = FakeProvider::answering(StatusCode::OK, json!({"ai_probability": 0.4}));
    let url = start_fake(fake.clone()).await;
    let client = HiveClient::new(http("hive"), url, HiveAuth::Bearer("hive-key".to_string()));

    client.submit(&request()).await.unwrap();
    assert_eq!(fake.last().authorization.as_deref(), Some("Bearer hive-key"));
}

#[tokio::test]
async fn test_shlabs_api_key_header() {
    let fake = FakeProvider::answering(StatusCode::OK, json!({"score": 0.66}));
    let url = start_fake(fake.clone()).await;
    let client = ShLabsClient::new(http("shlabs"), url, ShLabsAuth::ApiKey("sh-key".to_string()));

    let p = probability(client.submit(&request()).await.unwrap());
    assert!((p - 0.66).abs() < 1e-12);

    let captured = fake.last();
    assert_eq!(captured.api_key.as_deref(), Some("sh-key"));
    assert!(captured.authorization.is_none());
    assert_audio_part(&captured, "file");
}

#[tokio::test]
async fn test_sightengine_user_secret_fields() {
    let fake = FakeProvider::answering(StatusCode::OK, json!({"type": {"ai_generated": 0.97}}));
    let url = start_fake(fake.clone()).await;
    let client = SightengineClient::new(
        http("sightengine"),
        url,
        SightengineAuth::UserSecret {
            api_user: "se-user".to_string(),
            api_secret: "se-secret".to_string(),
        },
    );

    let p = probability(client.submit(&request()).await.unwrap());
    assert!((p - 0.97).abs() < 1e-12);

    let captured = fake.last();
    assert!(captured.authorization.is_none());
    assert_audio_part(&captured, "media");
    assert_eq!(captured.text("api_user"), "se-user");
    assert_eq!(captured.text("api_secret"), "se-secret");
}

#[tokio::test]
async fn test_sightengine_bearer_has_no_secret_fields() {
    let fake = FakeProvider::answering(StatusCode::OK, json!({"ai_probability": 0.1}));
    let url = start_fake(fake.clone()).await;
    let client = SightengineClient::new(http("sightengine"), url, SightengineAuth::Bearer("se-key".to_string()));

    client.submit(&request()).await.unwrap();
    let captured = fake.last();
    assert_eq!(captured.authorization.as_deref(), Some("Bearer se-key"));
    assert!(!captured.has_field("api_user"));
    assert!(!captured.has_field("api_secret"));
}

fn adapters(url: &str) -> Vec<Arc<dyn ProviderAdapter>> {
    let aiornot: Arc<dyn ProviderAdapter> = Arc::new(AiOrNotClient::new(http("aiornot"), url, "k"));
    let hive: Arc<dyn ProviderAdapter> = Arc::new(HiveClient::new(http("hive"), url, HiveAuth::Bearer("k".to_string())));
    let shlabs: Arc<dyn ProviderAdapter> =
        Arc::new(ShLabsClient::new(http("shlabs"), url, ShLabsAuth::ApiKey("k".to_string())));
    let sightengine: Arc<dyn ProviderAdapter> = Arc::new(SightengineClient::new(
        http("sightengine"),
        url,
        SightengineAuth::Bearer("k".to_string()),
    ));
    vec![aiornot, hive, shlabs, sightengine]
}

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let fake = FakeProvider::answering(StatusCode::UNAUTHORIZED, json!({"error": "bad key"}));
    let url = start_fake(fake).await;

    for adapter in adapters(&url) {
        let err = adapter.submit(&request()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Auth, "{}", adapter.id());
        assert_eq!(err.provider(), adapter.id());
    }
}

#[tokio::test]
async fn test_server_error_is_protocol_error() {
    let fake = FakeProvider::answering(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"}));
    let url = start_fake(fake).await;

    for adapter in adapters(&url) {
        let err = adapter.submit(&request()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Protocol, "{}", adapter.id());
        assert!(err.to_string().contains("HTTP 500"), "{}", err);
    }
}

#[tokio::test]
async fn test_unrecognized_body_is_protocol_error() {
    let fake = FakeProvider::answering(StatusCode::OK, json!({"unexpected": true}));
    let url = start_fake(fake).await;

    for adapter in adapters(&url) {
        let err = adapter.submit(&request()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Protocol, "{}", adapter.id());
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let url = format!("http://{}/detect", addr);

    for adapter in adapters(&url) {
        let err = adapter.submit(&request()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport, "{}", adapter.id());
    }
}
