use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use scraper::Selector;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::EngineDefaults;
use crate::document::{Document, Retriever};
use crate::error::{AppError, JobError};
use crate::telemetry::{Observers, PageEvent};

const NOT_COMPLETED: &str = "scraper completed without calling done";

/// Fault raised by a scraper script.
///
/// Displays as `Error: <message>`, the form callers see in the job error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Error: {message}")]
pub struct ScriptError {
    message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "scraper panicked".to_string()
        };
        Self::new(message)
    }
}

impl From<serde_json::Error> for ScriptError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Read-only view of the engine a script runs in.
#[derive(Clone)]
pub struct ScriptContext {
    job_id: Uuid,
    url: String,
    defaults: Arc<EngineDefaults>,
    observers: Observers,
}

impl ScriptContext {
    pub(crate) fn new(
        job_id: Uuid,
        url: impl Into<String>,
        defaults: Arc<EngineDefaults>,
        observers: Observers,
    ) -> Self {
        Self {
            job_id,
            url: url.into(),
            defaults,
            observers,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Engine-wide defaults, e.g. to read configured headers.
    pub fn defaults(&self) -> &EngineDefaults {
        &self.defaults
    }

    /// Write a line to the page log (`page:log`).
    pub fn log(&self, message: impl AsRef<str>) {
        self.observers.emit(&PageEvent::Log {
            url: &self.url,
            message: message.as_ref(),
        });
    }
}

/// Completion handle given to asynchronous scripts.
///
/// Every method consumes the handle, so a script can signal at most once.
/// Dropping it without signalling fails the job.
pub struct Completion {
    sender: oneshot::Sender<Result<Option<Value>, ScriptError>>,
}

type CompletionReceiver = oneshot::Receiver<Result<Option<Value>, ScriptError>>;

impl Completion {
    fn channel() -> (Self, CompletionReceiver) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    pub fn done(self, data: Value) {
        self.finish(None, Some(data));
    }

    /// Complete successfully without producing data.
    pub fn done_empty(self) {
        self.finish(None, None);
    }

    pub fn fail(self, error: ScriptError) {
        self.finish(Some(error), None);
    }

    /// Error-first completion: a present error wins over the data.
    pub fn finish(self, error: Option<ScriptError>, data: Option<Value>) {
        let outcome = match error {
            Some(e) => Err(e),
            None => Ok(data),
        };
        // The engine only stops listening once the job already failed.
        let _ = self.sender.send(outcome);
    }
}

type SyncFn = dyn Fn(&Document, &ScriptContext) -> Result<Value, ScriptError> + Send + Sync;
type AsyncFn =
    dyn Fn(&Document, &ScriptContext, Completion) -> Result<(), ScriptError> + Send + Sync;

/// Caller-supplied extraction logic.
///
/// The variant is fixed at registration: `Sync` scripts return their data,
/// `Async` scripts report it through a [`Completion`].
#[derive(Clone)]
pub enum Script {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Script::Sync(_) => f.write_str("Script::Sync"),
            Script::Async(_) => f.write_str("Script::Async"),
        }
    }
}

/// Declarative scraper: one retriever applied to every `iterator` match.
///
/// ```json
/// {"iterator": ".url-list a", "data": "href"}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrapeModel {
    pub iterator: String,
    pub data: Retriever,
    /// Only keep the first match instead of a list.
    #[serde(default)]
    pub one: bool,
}

impl Script {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Document, &ScriptContext) -> Result<Value, ScriptError> + Send + Sync + 'static,
    {
        Script::Sync(Arc::new(f))
    }

    pub fn asynchronous<F>(f: F) -> Self
    where
        F: Fn(&Document, &ScriptContext, Completion) -> Result<(), ScriptError>
            + Send
            + Sync
            + 'static,
    {
        Script::Async(Arc::new(f))
    }

    /// Parse a declarative scraper source (a JSON [`ScrapeModel`]).
    pub fn from_source(source: &str) -> Result<Self, AppError> {
        let model: ScrapeModel =
            serde_json::from_str(source).map_err(|e| AppError::ScriptSource(e.to_string()))?;
        Self::from_model(model)
    }

    /// Read and parse a declarative scraper from a file.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            AppError::ScriptSource(format!(
                "Failed to read scraper file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_source(&source)
    }

    pub fn from_model(model: ScrapeModel) -> Result<Self, AppError> {
        Selector::parse(&model.iterator).map_err(|e| {
            AppError::ScriptSource(format!("invalid iterator '{}': {e}", model.iterator))
        })?;

        Ok(Script::sync(move |document, _ctx| {
            if model.one {
                document.scrape_one(&model.iterator, &model.data)
            } else {
                document.scrape(&model.iterator, &model.data)
            }
        }))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Script::Async(_))
    }

    /// Decode and parse the body, then run the script against it.
    ///
    /// Faults of either variant, panics included, come back as
    /// [`JobError::Scraper`]; nothing escapes to the caller's stack.
    pub(crate) async fn invoke(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        ctx: &ScriptContext,
    ) -> Result<Option<Value>, JobError> {
        match self {
            Script::Sync(f) => {
                let document = Document::parse(body, content_type)?;
                match catch_unwind(AssertUnwindSafe(|| f(&document, ctx))) {
                    Ok(Ok(data)) => Ok(Some(data)),
                    Ok(Err(e)) => Err(JobError::Scraper(e.to_string())),
                    Err(panic) => Err(JobError::Scraper(ScriptError::from_panic(panic).to_string())),
                }
            }
            Script::Async(f) => {
                let (completion, receiver) = Completion::channel();
                {
                    // The document must not live across the await below.
                    let document = Document::parse(body, content_type)?;
                    match catch_unwind(AssertUnwindSafe(|| f(&document, ctx, completion))) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => return Err(JobError::Scraper(e.to_string())),
                        Err(panic) => {
                            return Err(JobError::Scraper(
                                ScriptError::from_panic(panic).to_string(),
                            ));
                        }
                    }
                }

                match receiver.await {
                    Ok(Ok(data)) => Ok(data),
                    Ok(Err(e)) => Err(JobError::Scraper(e.to_string())),
                    Err(_) => Err(JobError::Scraper(
                        ScriptError::new(NOT_COMPLETED).to_string(),
                    )),
                }
            }
        }
    }
}
