//! Test utilities: mock transport, recording observer and fixture pages.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};

use crate::models::{RawResponse, TransportError};
use crate::request::TransportRequest;
use crate::telemetry::{PageEvent, PageObserver};
use crate::traits::Transport;

/// Page with four links inside `.url-list`.
pub const BASIC_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Basic</title></head>
<body>
  <h1>Basic page</h1>
  <ul class="url-list">
    <li><a href="http://nicesite.com">Nice site</a></li>
    <li><a href="http://awesomesite.com">Awesome site</a></li>
    <li><a href="http://prettysite.com">Pretty site</a></li>
    <li><a href="http://unknownsite.com">Unknown site</a></li>
  </ul>
</body>
</html>
"#;

/// Page with `count` repeated `.decisions` blocks (title, date, text).
pub fn decisions_html(count: usize) -> String {
    let blocks: String = (1..=count)
        .map(|i| {
            format!(
                r#"
  <div class="decisions">
    <div class="sous-titre"><h3>Decision {i}</h3></div>
    <span class="date">2014-01-{i:02}</span>
    <div>Text of decision {i}</div>
  </div>"#
            )
        })
        .collect();
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Transparency</title></head>\n<body>{blocks}\n</body>\n</html>\n"
    )
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Mock transport that returns queued responses and records requests.
#[derive(Clone)]
pub struct MockTransport {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML page for the requested URL.
    responses: Arc<Mutex<Vec<Result<RawResponse, TransportError>>>>,
    requests: Arc<Mutex<Vec<TransportRequest>>>,
}

impl MockTransport {
    pub fn new(responses: Vec<Result<RawResponse, TransportError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn html(url: &str, body: impl Into<String>) -> Self {
        Self::new(vec![Ok(RawResponse::html(url, body))])
    }

    pub fn with_error(error: TransportError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Requests sent so far, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: &TransportRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(RawResponse::html(
                request.url.clone(),
                "<html><body>default</body></html>",
            ))
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

/// Recorded event: (channel, url, message).
pub type EventRecord = (&'static str, String, String);

/// Observer that records every page event.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    pub events: Arc<Mutex<Vec<EventRecord>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn on_channel(&self, channel: &str) -> Vec<(String, String)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| *c == channel)
            .map(|(_, url, message)| (url.clone(), message.clone()))
            .collect()
    }

    /// `(url, message)` pairs seen on `page:log`.
    pub fn logs(&self) -> Vec<(String, String)> {
        self.on_channel("page:log")
    }

    /// `(url, message)` pairs seen on `page:error`.
    pub fn errors(&self) -> Vec<(String, String)> {
        self.on_channel("page:error")
    }
}

impl PageObserver for RecordingObserver {
    fn on_event(&self, event: &PageEvent<'_>) {
        self.events.lock().unwrap().push((
            event.channel(),
            event.url().to_string(),
            event.message().to_string(),
        ));
    }
}
