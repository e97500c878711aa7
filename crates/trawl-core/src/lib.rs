pub mod classify;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod headers;
pub mod job;
pub mod models;
pub mod request;
pub mod script;
pub mod telemetry;
pub mod testutil;
pub mod traits;
pub mod util;
pub mod validate;

pub use config::EngineDefaults;
pub use document::{Document, Retriever, decode_body};
pub use engine::{Engine, Outcome, Scraper};
pub use error::{AppError, JobError};
pub use headers::Headers;
pub use job::{Auth, Body, BodyEncoding, Job, JobRequest, JobResult, Method};
pub use models::{RawResponse, TransportError, TransportErrorKind};
pub use request::{Payload, TransportRequest, build_request};
pub use script::{Completion, ScrapeModel, Script, ScriptContext, ScriptError};
pub use telemetry::{Observers, PageEvent, PageObserver, TracingPageObserver};
pub use traits::Transport;
pub use validate::{Shape, TypeExpr, Validation};
