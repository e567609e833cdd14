//! End-to-end tests against an in-process fake STC server

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Form, Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;
use stc_core::config::PollSettings;
use stc_core::{
    ClientConfig, EndMode, Error, ExistingSession, MultipartForm, Payload, Request, Transport,
};
use stc_http::HttpTransport;
use tempfile::TempDir;

const SESSION_HEADER: &str = "x-stc-api-session";

#[derive(Default)]
struct FakeStc {
    sessions: Vec<String>,
    files: HashMap<String, Vec<u8>>,
    uploads: Vec<(String, Vec<u8>)>,
}

type Shared = Arc<Mutex<FakeStc>>;

fn json_response(status: StatusCode, value: serde_json::Value) -> Response {
    (status, axum::Json(value)).into_response()
}

async fn list_sessions(State(state): State<Shared>) -> Response {
    let sessions = state.lock().unwrap().sessions.clone();
    json_response(StatusCode::OK, json!(sessions))
}

async fn create_session(
    State(state): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let user = form.get("userid").cloned().unwrap_or_default();
    let mut state = state.lock().unwrap();
    let name = match form.get("sessionname").filter(|n| !n.is_empty()) {
        Some(n) => n.clone(),
        None => format!("Session{}", state.sessions.len() + 1),
    };
    let sid = format!("{name} - {user}");
    if state.sessions.contains(&sid) {
        return json_response(
            StatusCode::CONFLICT,
            json!({ "code": 1, "detail": format!("session {sid} already exists") }),
        );
    }
    state.sessions.push(sid.clone());
    json_response(StatusCode::CREATED, json!({ "session_id": sid }))
}

async fn session_info(State(state): State<Shared>, Path(sid): Path<String>) -> Response {
    if state.lock().unwrap().sessions.contains(&sid) {
        json_response(StatusCode::OK, json!({ "session_id": sid, "test.project": "project1" }))
    } else {
        json_response(StatusCode::NOT_FOUND, json!({ "code": 3, "detail": "no such session" }))
    }
}

async fn delete_session(
    State(state): State<Shared>,
    Path(sid): Path<String>,
    RawQuery(_query): RawQuery,
) -> Response {
    let mut state = state.lock().unwrap();
    let before = state.sessions.len();
    state.sessions.retain(|s| *s != sid);
    if state.sessions.len() == before {
        return json_response(StatusCode::NOT_FOUND, json!({ "code": 3, "detail": "no such session" }));
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn system() -> Response {
    json_response(StatusCode::OK, json!({ "stcapi_version": "2.1.5", "stc_version": "5.0" }))
}

async fn get_object(
    State(state): State<Shared>,
    Path(handle): Path<String>,
    headers: HeaderMap,
) -> Response {
    match handle.as_str() {
        "system1" => {
            let sid = headers
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if state.lock().unwrap().sessions.iter().any(|s| s == sid) {
                json_response(StatusCode::OK, json!({ "version": "5.0.0", "name": "StcSystem 1" }))
            } else {
                json_response(StatusCode::NOT_FOUND, json!({ "code": 3, "detail": "session not found" }))
            }
        }
        "partial" => json_response(
            StatusCode::MULTI_STATUS,
            json!({ "code": 17, "detail": "bad xpath" }),
        ),
        "garbled" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "application/json")],
            "{not json",
        )
            .into_response(),
        _ => json_response(StatusCode::NOT_FOUND, json!({ "code": 3, "detail": "object not found" })),
    }
}

async fn moved() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/stcapi/system/")]).into_response()
}

async fn delete_object() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

async fn list_files(State(state): State<Shared>) -> Response {
    let mut names: Vec<String> = state.lock().unwrap().files.keys().cloned().collect();
    names.sort();
    json_response(StatusCode::OK, json!(names))
}

async fn put_file(State(state): State<Shared>, Path(name): Path<String>, body: Bytes) -> Response {
    state.lock().unwrap().files.insert(name.clone(), body.to_vec());
    json_response(StatusCode::CREATED, json!({ "name": name }))
}

async fn get_file(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    match state.lock().unwrap().files.get(&name) {
        Some(data) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            data.clone(),
        )
            .into_response(),
        None => json_response(StatusCode::NOT_FOUND, json!({ "code": 3, "detail": "file not found" })),
    }
}

async fn post_package(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.lock().unwrap().uploads.push((content_type, body.to_vec()));
    json_response(StatusCode::OK, json!({ "received": body.len() }))
}

async fn start_server() -> (SocketAddr, Shared) {
    let state = Shared::default();
    let app = Router::new()
        .route("/stcapi/sessions/", get(list_sessions).post(create_session))
        .route("/stcapi/sessions/{sid}", get(session_info).delete(delete_session))
        .route("/stcapi/system/", get(system))
        .route("/stcapi/objects/{handle}", get(get_object).delete(delete_object))
        .route("/stcapi/files/", get(list_files))
        .route("/stcapi/files/{name}", get(get_file).put(put_file))
        .route("/stcapi/system/packages", post(post_package))
        .route("/stcapi/moved", get(moved))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        port: Some(addr.port()),
        timeout_secs: Some(10),
        poll: PollSettings {
            interval_ms: 10,
            attempts: 3,
        },
        ..ClientConfig::new("127.0.0.1")
    }
}

fn raw_request(addr: SocketAddr, path: &str) -> Request {
    Request::new(
        reqwest::Method::GET,
        format!("http://{addr}/stcapi/{path}"),
        Default::default(),
    )
}

#[tokio::test]
async fn test_no_content_has_empty_payload() {
    let (addr, _) = start_server().await;
    let transport = HttpTransport::new(None).unwrap();
    let mut request = raw_request(addr, "objects/port1");
    request.method = reqwest::Method::DELETE;
    let response = transport.send(request).await.unwrap();
    assert_eq!(response.status, 204);
    assert_eq!(response.payload, Payload::Empty);
}

#[tokio::test]
async fn test_multi_status_is_api_error() {
    let (addr, _) = start_server().await;
    let transport = HttpTransport::new(None).unwrap();
    let err = transport.send(raw_request(addr, "objects/partial")).await.unwrap_err();
    let api = err.api().unwrap();
    assert_eq!((api.status, api.code, api.detail.as_str()), (207, 17, "bad xpath"));
}

#[tokio::test]
async fn test_redirect_is_api_error() {
    let (addr, _) = start_server().await;
    let transport = HttpTransport::new(None).unwrap();
    let err = transport.send(raw_request(addr, "moved")).await.unwrap_err();
    let api = err.api().unwrap();
    assert_eq!(api.status, 302);
    assert_eq!(api.code, -1);
}

#[tokio::test]
async fn test_malformed_json_error_keeps_raw_text() {
    let (addr, _) = start_server().await;
    let transport = HttpTransport::new(None).unwrap();
    let err = transport.send(raw_request(addr, "objects/garbled")).await.unwrap_err();
    let api = err.api().unwrap();
    assert_eq!(api.status, 500);
    assert_eq!(api.code, -1);
    assert!(api.detail.contains("{not json"));
}

#[tokio::test]
async fn test_cannot_connect_names_port() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ClientConfig {
        port: Some(port),
        ..ClientConfig::new("127.0.0.1")
    };
    let err = stc_http::connect(&config).await.err().unwrap();
    assert!(err.is_connection());
    assert_eq!(
        err.to_string(),
        format!("Cannot connect to STC server: 127.0.0.1:{port}")
    );
}

#[tokio::test]
async fn test_refused_connection_keeps_os_code() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(None).unwrap();
    match transport.send(raw_request(addr, "sessions/")).await {
        Err(Error::Connection { code, .. }) => assert_ne!(code, 0),
        other => panic!("expected connection error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_session_lifecycle() {
    let (addr, state) = start_server().await;
    let mut stc = stc_http::connect(&config_for(addr)).await.unwrap();

    let sid = stc.new_session(Some("bob"), Some("lab"), false).await.unwrap();
    assert_eq!(sid.as_deref(), Some("lab - bob"));
    assert_eq!(stc.session_id(), Some("lab - bob"));
    assert_eq!(stc.bll_version().await.unwrap().as_deref(), Some("5.0.0"));

    assert!(stc.end_session(EndMode::Terminate, None).await.unwrap());
    assert!(!stc.started());
    assert!(state.lock().unwrap().sessions.is_empty());
}

#[tokio::test]
async fn test_existing_session_policies() {
    let (addr, state) = start_server().await;
    state.lock().unwrap().sessions.push("lab - bob".to_string());

    let mut stc = stc_http::connect(&config_for(addr)).await.unwrap();
    let err = stc
        .start_session(Some("bob"), Some("lab"), ExistingSession::Fail)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionExists { .. }));
    assert!(!stc.started());

    stc.start_session(Some("bob"), Some("lab"), ExistingSession::Join)
        .await
        .unwrap();
    assert_eq!(stc.session_id(), Some("lab - bob"));
    stc.end_session(EndMode::Detach, None).await.unwrap();

    stc.start_session(Some("bob"), Some("lab"), ExistingSession::Kill)
        .await
        .unwrap();
    assert_eq!(stc.session_id(), Some("lab - bob"));
    assert_eq!(state.lock().unwrap().sessions, vec!["lab - bob".to_string()]);
}

#[tokio::test]
async fn test_join_unknown_session_fails() {
    let (addr, _) = start_server().await;
    let mut stc = stc_http::connect(&config_for(addr)).await.unwrap();
    let err = stc.join_session("ghost - nobody").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!stc.started());
}

#[tokio::test]
async fn test_upload_then_download_round_trip() {
    let (addr, _) = start_server().await;
    let mut stc = stc_http::connect(&config_for(addr)).await.unwrap();
    stc.new_session(Some("bob"), Some("files"), false).await.unwrap();

    let dir = TempDir::new().unwrap();
    let src = dir.path().join("capture.pcap");
    let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&src, &content).unwrap();

    stc.upload(&src, None).await.unwrap();
    assert_eq!(stc.files().await.unwrap(), vec!["capture.pcap"]);

    let dest = dir.path().join("out/copy.pcap");
    let (path, bytes) = stc.download("capture.pcap", Some(&dest)).await.unwrap();
    assert_eq!(path, dest);
    assert_eq!(bytes, content.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), content);
}

#[tokio::test]
async fn test_download_missing_file() {
    let (addr, _) = start_server().await;
    let mut stc = stc_http::connect(&config_for(addr)).await.unwrap();
    stc.new_session(Some("bob"), Some("missing"), false).await.unwrap();

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("nothing.log");
    let err = stc.download("nothing.log", Some(&dest)).await.unwrap_err();
    assert!(matches!(err, Error::DownloadFailed { .. }));
    assert!(err.is_not_found());
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_multipart_upload_reaches_server() {
    let (addr, state) = start_server().await;
    let stc = stc_http::connect(&config_for(addr)).await.unwrap();

    let dir = TempDir::new().unwrap();
    let src = dir.path().join("pkg.tar");
    std::fs::write(&src, b"package-bytes").unwrap();

    let form = MultipartForm::new().field("overwrite", "true");
    let reply = stc
        .upload_multipart("system/packages", &src, None, form.clone())
        .await
        .unwrap();

    let expected = form.encode("pkg.tar", b"package-bytes");
    assert_eq!(reply.unwrap()["received"], expected.len());

    let uploads = &state.lock().unwrap().uploads;
    assert_eq!(uploads[0].0, MultipartForm::content_type());
    assert_eq!(uploads[0].1, expected.to_vec());
}
