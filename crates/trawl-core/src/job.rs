use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::document::decode_body;
use crate::headers::Headers;
use crate::models::RawResponse;

/// HTTP method of a job request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(format!("Unknown HTTP method: {}", s)),
        }
    }
}

/// How a non-textual request body is encoded. Absent means form encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Json,
    Form,
}

/// Request body: a literal string or a structured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Body {
    Text(String),
    Structured(Value),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Text(s) => s.is_empty(),
            Body::Structured(Value::Null) => true,
            Body::Structured(Value::Object(map)) => map.is_empty(),
            Body::Structured(Value::Array(items)) => items.is_empty(),
            Body::Structured(_) => false,
        }
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Structured(value)
    }
}

/// Credentials forwarded to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    #[serde(default, alias = "user")]
    pub username: Option<String>,
    #[serde(default, alias = "pass")]
    pub password: Option<String>,
    #[serde(default)]
    pub bearer: Option<String>,
}

impl Auth {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            bearer: None,
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
            ..Self::default()
        }
    }

    /// Field-wise merge: values set on `self` win over `defaults`.
    pub fn merged_over(&self, defaults: &Auth) -> Auth {
        Auth {
            username: self.username.clone().or_else(|| defaults.username.clone()),
            password: self.password.clone().or_else(|| defaults.password.clone()),
            bearer: self.bearer.clone().or_else(|| defaults.bearer.clone()),
        }
    }
}

/// Per-job request description. Unset fields fall back to engine defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub url: String,
    #[serde(default)]
    pub method: Option<Method>,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, with = "crate::util::millis")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub body: Option<Body>,
    #[serde(default, alias = "bodyType")]
    pub body_encoding: Option<BodyEncoding>,
}

impl JobRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: Headers::new(),
            timeout: None,
            auth: None,
            body: None,
            body_encoding: None,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_body_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.body_encoding = Some(encoding);
        self
    }
}

/// What the engine learned about a job, filled stage by stage.
///
/// Every field is written at most once; the engine is the only writer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobResult {
    final_url: Option<String>,
    #[serde(skip)]
    raw_body: Option<Vec<u8>>,
    status: Option<u16>,
    headers: Option<Headers>,
    extracted_data: Option<Value>,
    fetched_at: Option<DateTime<Utc>>,
}

impl JobResult {
    /// URL after redirects.
    pub fn final_url(&self) -> Option<&str> {
        self.final_url.as_deref()
    }

    pub fn raw_body(&self) -> Option<&[u8]> {
        self.raw_body.as_deref()
    }

    /// Body decoded with the response charset; lossy UTF-8 if it is binary.
    pub fn text(&self) -> Option<String> {
        let body = self.raw_body.as_deref()?;
        let text = match decode_body(body, self.header("content-type")) {
            Ok(text) => text.into_owned(),
            Err(_) => String::from_utf8_lossy(body).into_owned(),
        };
        Some(text)
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers(&self) -> Option<&Headers> {
        self.headers.as_ref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.as_ref().and_then(|h| h.get(name))
    }

    pub fn extracted_data(&self) -> Option<&Value> {
        self.extracted_data.as_ref()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Copy response metadata onto the result.
    pub(crate) fn materialize(&mut self, response: RawResponse) {
        set_once(&mut self.final_url, response.final_url, "final_url");
        set_once(&mut self.status, response.status, "status");
        set_once(&mut self.headers, response.headers, "headers");
        set_once(&mut self.raw_body, response.body, "raw_body");
        set_once(&mut self.fetched_at, Utc::now(), "fetched_at");
    }

    pub(crate) fn set_extracted_data(&mut self, data: Value) {
        set_once(&mut self.extracted_data, data, "extracted_data");
    }
}

fn set_once<T>(slot: &mut Option<T>, value: impl Into<Option<T>>, field: &str) {
    if slot.is_some() {
        tracing::warn!(field, "Result field already set, keeping first value");
        return;
    }
    *slot = value.into();
}

/// One unit of fetch-and-extract work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub request: JobRequest,
    pub result: JobResult,
}

impl Job {
    pub fn new(request: JobRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            result: JobResult::default(),
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self::new(JobRequest::new(url))
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }
}
