use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect};
use axum::routing::{any, get};
use serde_json::{Value, json};

use trawl_client::ReqwestTransport;
use trawl_core::testutil::{BASIC_HTML, decisions_html};
use trawl_core::{Engine, EngineDefaults, Observers};

/// Serve the fixture pages on an ephemeral port and return the base URL.
pub async fn spawn_fixture_server() -> String {
    let app = Router::new()
        .route("/basic.html", get(|| async { Html(BASIC_HTML) }))
        .route(
            "/transparency1.html",
            get(|| async { Html(decisions_html(15)) }),
        )
        .route("/slow.html", get(slow))
        .route("/status/{code}", get(status))
        .route("/redirect", get(|| async { Redirect::temporary("/basic.html") }))
        .route("/latin1.html", get(latin1))
        .route("/cookies", get(cookies))
        .route("/binary", get(binary))
        .route("/echo", any(echo));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fixture server");
    let addr = listener.local_addr().expect("Failed to read local addr");

    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("Fixture server crashed");
    });

    format!("http://{addr}")
}

/// Engine over the real reqwest transport, with SSRF protection off for localhost.
pub fn test_engine(observers: Observers) -> Engine<ReqwestTransport> {
    let transport = ReqwestTransport::new()
        .expect("Failed to build transport")
        .allow_private_urls();
    let defaults = EngineDefaults::default().with_header("User-Agent", "trawl-tests");
    Engine::with_observers(transport, defaults, observers)
}

pub fn simple_list() -> Value {
    json!([
        "http://nicesite.com",
        "http://awesomesite.com",
        "http://prettysite.com",
        "http://unknownsite.com"
    ])
}

async fn slow() -> Html<&'static str> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Html("<p>too late</p>")
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn binary() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        vec![0x00u8, 0x9f, 0x92, 0x00, 0xff],
    )
}

/// `BASIC_HTML` with an accented label, encoded as ISO-8859-1.
async fn latin1() -> impl IntoResponse {
    let body: Vec<u8> = BASIC_HTML
        .replace("Nice site", "Caf\u{e9}")
        .chars()
        .map(|c| u8::try_from(c).unwrap_or(b'?'))
        .collect();
    (
        [(header::CONTENT_TYPE, "text/html; charset=iso-8859-1")],
        body,
    )
}

async fn cookies() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
    headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
    headers.insert(
        "x-label",
        HeaderValue::from_bytes(b"caf\xe9").unwrap_or(HeaderValue::from_static("cafe")),
    );
    (headers, Html("<p>cookies</p>"))
}

/// Reflect the request back as JSON.
async fn echo(method: Method, headers: HeaderMap, body: String) -> Json<Value> {
    let header = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "method": method.as_str(),
        "content_type": header(header::CONTENT_TYPE),
        "authorization": header(header::AUTHORIZATION),
        "user_agent": header(header::USER_AGENT),
        "body": body,
    }))
}
