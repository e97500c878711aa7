use std::time::Duration;

use serde_json::Value;

use crate::config::EngineDefaults;
use crate::headers::Headers;
use crate::job::{Auth, Body, BodyEncoding, JobRequest, Method};

const CONTENT_TYPE: &str = "content-type";
const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Encoded request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Literal body, sent verbatim. The content type travels in the headers.
    Raw(String),
    /// Structured value the transport serializes as JSON.
    Json(Value),
    /// URL-encoded form fields.
    Form(Vec<(String, String)>),
}

/// Fully specified request, ready for a [`Transport`](crate::traits::Transport).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub url: String,
    pub method: Method,
    pub headers: Headers,
    pub timeout: Option<Duration>,
    pub auth: Option<Auth>,
    pub payload: Option<Payload>,
}

/// Combine a job's request description with the engine defaults.
///
/// Pure and total: per-job values win, headers and auth are merged key by key,
/// and the body is encoded according to the effective body encoding.
pub fn build_request(request: &JobRequest, defaults: &EngineDefaults) -> TransportRequest {
    let mut headers = request.headers.merged_over(&defaults.headers);

    let auth = match (&request.auth, &defaults.auth) {
        (Some(job), Some(default)) => Some(job.merged_over(default)),
        (Some(job), None) => Some(job.clone()),
        (None, default) => default.clone(),
    };

    let encoding = request.body_encoding.or(defaults.body_encoding);
    let payload = merge_body(request.body.as_ref(), defaults.body.as_ref())
        .filter(|body| !body.is_empty())
        .map(|body| encode_body(body, encoding, &mut headers));

    TransportRequest {
        url: request.url.clone(),
        method: request.method.unwrap_or(defaults.method),
        headers,
        timeout: request.timeout.or(defaults.timeout),
        auth,
        payload,
    }
}

/// A textual job body is taken verbatim; structured bodies are shallow-merged
/// over the default body when both are objects.
fn merge_body(job: Option<&Body>, defaults: Option<&Body>) -> Option<Body> {
    match (job, defaults) {
        (Some(Body::Text(text)), _) => Some(Body::Text(text.clone())),
        (Some(Body::Structured(Value::Object(fields))), Some(Body::Structured(Value::Object(base)))) => {
            let mut merged = base.clone();
            for (key, value) in fields {
                merged.insert(key.clone(), value.clone());
            }
            Some(Body::Structured(Value::Object(merged)))
        }
        (Some(job), _) => Some(job.clone()),
        (None, default) => default.cloned(),
    }
}

fn encode_body(body: Body, encoding: Option<BodyEncoding>, headers: &mut Headers) -> Payload {
    match (encoding, body) {
        (Some(BodyEncoding::Json), Body::Text(text)) => {
            headers.insert(CONTENT_TYPE, JSON_CONTENT_TYPE);
            Payload::Raw(text)
        }
        (Some(BodyEncoding::Json), Body::Structured(value)) => Payload::Json(value),
        (_, Body::Text(text)) => {
            if !headers.contains(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, FORM_CONTENT_TYPE);
            }
            Payload::Raw(text)
        }
        (_, Body::Structured(Value::Object(fields))) => Payload::Form(
            fields
                .into_iter()
                .map(|(key, value)| (key, form_value(value)))
                .collect(),
        ),
        (_, Body::Structured(other)) => {
            if !headers.contains(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, FORM_CONTENT_TYPE);
            }
            Payload::Raw(other.to_string())
        }
    }
}

fn form_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
