use std::error::Error as _;
use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use trawl_core::error::AppError;
use trawl_core::headers::Headers;
use trawl_core::job::Method;
use trawl_core::models::{RawResponse, TransportError, TransportErrorKind};
use trawl_core::request::{Payload, TransportRequest};
use trawl_core::traits::Transport;
use url::Url;

const DEFAULT_USER_AGENT: &str = "trawl/0.1";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Markers of a failed name resolution somewhere in a reqwest error chain.
const DNS_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "no such host",
    "nodename nor servname",
];

/// HTTP transport using reqwest.
///
/// Forwards method, headers, per-request timeout, auth and payload; follows
/// redirects and reports the final URL. By default, SSRF protection is
/// **enabled**: requests to private/reserved IP ranges are blocked. Use
/// [`allow_private_urls`](Self::allow_private_urls) to disable this (e.g. for
/// CLI usage or local fixtures).
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    ssrf_protection: bool,
}

impl ReqwestTransport {
    /// Transport with the SSRF guard on.
    ///
    /// Hosts that are or resolve to loopback, private or link-local addresses
    /// (`localhost`, `127.0.0.1`, `10.x`, ...) are refused with an unclassified
    /// `SSRF blocked` error. The guard resolves the host itself before reqwest
    /// connects, so each guarded request does one extra DNS lookup. Call
    /// [`allow_private_urls`](Self::allow_private_urls) for local targets.
    pub fn new() -> Result<Self, AppError> {
        Self::build(DEFAULT_USER_AGENT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// User-Agent sent when the job and engine defaults don't set one.
    pub fn with_user_agent(user_agent: &str) -> Result<Self, AppError> {
        Self::build(user_agent, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(user_agent: &str, timeout: Duration) -> Result<Self, AppError> {
        Self::build(user_agent, timeout)
    }

    /// Disable SSRF protection, allowing requests to private/reserved IPs.
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }

    fn build(user_agent: &str, connect_timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            ssrf_protection: true,
        })
    }

    async fn execute(&self, request: &TransportRequest) -> Result<RawResponse, TransportError> {
        let headers = to_header_map(&request.headers)?;
        if self.ssrf_protection {
            validate_url(&request.url).await?;
        }

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .headers(headers);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(auth) = &request.auth {
            if let Some(token) = &auth.bearer {
                builder = builder.bearer_auth(token);
            } else if let Some(username) = &auth.username {
                builder = builder.basic_auth(username, auth.password.as_deref());
            }
        }
        builder = match &request.payload {
            Some(Payload::Raw(text)) => builder.body(text.clone()),
            Some(Payload::Json(value)) => builder.json(value),
            Some(Payload::Form(fields)) => builder.form(fields),
            None => builder,
        };

        let response = builder.send().await.map_err(classify_reqwest)?;

        let final_url = response.url().to_string();
        let status = Some(response.status().as_u16());
        let headers = collect_headers(response.headers());

        let body = response.bytes().await.map_err(classify_reqwest)?;
        tracing::debug!(url = %final_url, ?status, bytes = body.len(), "Response received");

        Ok(RawResponse {
            final_url,
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &TransportRequest) -> Result<RawResponse, TransportError> {
        // Also bounds the SSRF DNS lookup, which reqwest's own timeout doesn't see.
        match request.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.execute(request))
                .await
                .unwrap_or_else(|_| Err(TransportError::timeout())),
            None => self.execute(request).await,
        }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

/// Reject header names and values reqwest would refuse, before anything is sent.
fn to_header_map(headers: &Headers) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            TransportError::other(format!("Invalid request header name '{name}': {e}"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            TransportError::other(format!("Invalid value for request header '{name}': {e}"))
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Repeated headers are joined; non-UTF-8 bytes are kept lossily.
fn collect_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }
    headers
}

fn classify_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        return TransportError::timeout();
    }
    if is_dns_failure(&e) {
        return TransportError::new(TransportErrorKind::HostNotFound, e.to_string());
    }
    TransportError::other(error_chain(&e))
}

fn is_dns_failure(e: &reqwest::Error) -> bool {
    let chain = error_chain(e).to_lowercase();
    DNS_MARKERS.iter().any(|marker| chain.contains(marker))
}

/// `outer: inner: innermost`, since reqwest's own message hides the cause.
fn error_chain(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Validate a URL to prevent server-side request forgery (SSRF).
///
/// 1. Only allow `http` and `https` schemes.
/// 2. Resolve the hostname via DNS.
/// 3. Reject if any resolved IP is private/reserved.
async fn validate_url(url: &str) -> Result<(), TransportError> {
    let parsed = Url::parse(url).map_err(|e| TransportError::other(format!("Invalid URL: {e}")))?;

    // 1. Scheme check
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(TransportError::other(format!(
                "URL scheme '{scheme}' is not allowed (only http/https)"
            )));
        }
    }

    // 2. Extract host
    let host = parsed
        .host_str()
        .ok_or_else(|| TransportError::other("URL has no host"))?;

    // 3. If the host is already an IP literal, check it directly
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Err(TransportError::other(format!(
                "SSRF blocked: {host} resolves to private/reserved IP"
            )));
        }
        return Ok(());
    }

    // 4. DNS resolve and check all addresses
    let port = parsed.port_or_known_default().unwrap_or(80);
    let addr = format!("{host}:{port}");
    let addrs: Vec<_> = tokio::net::lookup_host(&addr)
        .await
        .map_err(|_| TransportError::host_not_found(host))?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::host_not_found(host));
    }

    for socket_addr in &addrs {
        if is_private_ip(socket_addr.ip()) {
            return Err(TransportError::other(format!(
                "SSRF blocked: {host} resolves to private/reserved IP {}",
                socket_addr.ip()
            )));
        }
    }

    Ok(())
}

/// Check if an IP address is in a private/reserved/link-local range.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()           // 127.0.0.0/8
                || v4.is_private()     // 10/8, 172.16/12, 192.168/16
                || v4.is_link_local()  // 169.254.0.0/16 (cloud metadata!)
                || v4.is_unspecified() // 0.0.0.0
                || v4.is_broadcast()   // 255.255.255.255
                || v4.is_documentation() // 192.0.2.0/24, 198.51.100.0/24, 203.0.113.0/24
                || v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64 // 100.64.0.0/10 (CGN)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()       // ::1
                || v6.is_unspecified() // ::
                // fe80::/10 (link-local)
                || (v6.segments()[0] & 0xFFC0) == 0xFE80
                // fc00::/7 (unique local)
                || (v6.segments()[0] & 0xFE00) == 0xFC00
                // IPv4-mapped IPv6 (::ffff:x.x.x.x): check the embedded v4
                || match v6.to_ipv4_mapped() {
                    Some(v4) => is_private_ip(IpAddr::V4(v4)),
                    None => false,
                }
        }
    }
}
