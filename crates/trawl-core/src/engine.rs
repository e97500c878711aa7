use std::sync::Arc;

use serde_json::Value;

use crate::classify::{classify_status, classify_transport};
use crate::config::EngineDefaults;
use crate::error::JobError;
use crate::job::Job;
use crate::request::build_request;
use crate::script::{Script, ScriptContext};
use crate::telemetry::{Observers, PageEvent};
use crate::traits::Transport;
use crate::validate::Validation;

/// Extraction registered for a job: an optional script plus optional validation.
#[derive(Debug, Clone, Default)]
pub struct Scraper {
    script: Option<Script>,
    validation: Option<Validation>,
}

impl Scraper {
    /// No script: jobs only fetch.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(mut self, script: Script) -> Self {
        self.script = Some(script);
        self
    }

    pub fn validate(mut self, validation: Validation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn script(&self) -> Option<&Script> {
        self.script.as_ref()
    }

    pub fn validation(&self) -> Option<&Validation> {
        self.validation.as_ref()
    }
}

/// Successful outcome of [`Engine::fetch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No script was registered; the job itself (with its result) is the outcome.
    Page,
    /// Data produced by the script, absent if an asynchronous script completed empty.
    Data(Option<Value>),
}

impl Outcome {
    pub fn data(&self) -> Option<&Value> {
        match self {
            Outcome::Data(data) => data.as_ref(),
            Outcome::Page => None,
        }
    }

    pub fn into_data(self) -> Option<Value> {
        match self {
            Outcome::Data(data) => data,
            Outcome::Page => None,
        }
    }
}

/// Static fetch-and-extract engine.
///
/// Generic over the transport so the pipeline runs without real HTTP in tests.
/// Holds no per-job state: clones share the read-only defaults and the
/// observer registry, and any number of `fetch` calls may run concurrently.
#[derive(Clone)]
pub struct Engine<T>
where
    T: Transport,
{
    transport: T,
    defaults: Arc<EngineDefaults>,
    observers: Observers,
}

impl<T> Engine<T>
where
    T: Transport,
{
    pub fn new(transport: T, defaults: EngineDefaults) -> Self {
        Self::with_observers(transport, defaults, Observers::new())
    }

    pub fn with_observers(transport: T, defaults: EngineDefaults, observers: Observers) -> Self {
        Self {
            transport,
            defaults: Arc::new(defaults),
            observers,
        }
    }

    pub fn defaults(&self) -> &EngineDefaults {
        &self.defaults
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    /// Engine type tag.
    pub fn kind(&self) -> &'static str {
        "static"
    }

    /// Run one job through the pipeline.
    ///
    /// 1. Build the request from the job and the engine defaults
    /// 2. Send it; classify transport failures and statuses >= 400
    /// 3. Copy the response onto `job.result`
    /// 4. Without a script, stop here with [`Outcome::Page`]
    /// 5. Decode and parse the body, then invoke the script
    /// 6. Validate the data, if a validation is registered
    ///
    /// Resolves exactly once, and never panics on script or predicate faults.
    pub async fn fetch(&self, job: &mut Job, scraper: &Scraper) -> Result<Outcome, JobError> {
        // 1. Build
        let request = build_request(&job.request, &self.defaults);
        tracing::debug!(url = %request.url, method = %request.method, "Sending request");

        // 2. Send + classify
        let response = self.transport.send(&request).await.map_err(|e| {
            let error = classify_transport(&e);
            tracing::warn!(url = %job.request.url, error = %e, kind = error.kind(), "Request failed");
            error
        })?;

        if let Some(error) = classify_status(response.status) {
            tracing::warn!(url = %job.request.url, status = ?response.status, "Error status");
            return Err(error);
        }

        // 3. Materialize
        tracing::info!(
            url = %job.request.url,
            final_url = %response.final_url,
            status = ?response.status,
            bytes = response.body.len(),
            "Fetched"
        );
        job.result.materialize(response);

        // 4. No script
        let Some(script) = &scraper.script else {
            return Ok(Outcome::Page);
        };

        // 5. Parse + invoke
        let ctx = ScriptContext::new(
            job.id,
            job.request.url.clone(),
            Arc::clone(&self.defaults),
            self.observers.clone(),
        );
        let body = job.result.raw_body().unwrap_or_default();
        let content_type = job.result.header("content-type");
        let data = match script.invoke(body, content_type, &ctx).await {
            Ok(data) => data,
            Err(error) => {
                let message = error.to_string();
                self.observers.emit(&PageEvent::Error {
                    url: &job.request.url,
                    message: &message,
                });
                tracing::warn!(url = %job.request.url, error = %message, kind = error.kind(), "Scraper failed");
                return Err(error);
            }
        };

        // 6. Validate
        if let Some(validation) = &scraper.validation {
            if !validation.validate(data.as_ref()) {
                tracing::warn!(url = %job.request.url, ?validation, "Extracted data failed validation");
                return Err(JobError::InvalidData);
            }
        }

        if let Some(data) = &data {
            job.result.set_extracted_data(data.clone());
        }
        tracing::info!(url = %job.request.url, has_data = data.is_some(), "Extraction complete");

        Ok(Outcome::Data(data))
    }
}
