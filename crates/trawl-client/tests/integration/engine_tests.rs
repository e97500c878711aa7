use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use trawl_core::testutil::RecordingObserver;
use trawl_core::{
    Auth, BodyEncoding, Job, JobError, JobRequest, Method, Observers, Outcome, Retriever,
    Scraper, Script, ScriptError, Validation,
};

use crate::integration::common::{simple_list, spawn_fixture_server, test_engine};

fn link_script() -> Script {
    Script::asynchronous(|doc, _, done| {
        let data = doc.scrape(".url-list a", &Retriever::attr("href"))?;
        done.done(data);
        Ok(())
    })
}

fn echo_of(job: &Job) -> Value {
    serde_json::from_str(&job.result.text().expect("Missing body")).expect("Echo is not JSON")
}

#[tokio::test]
async fn test_lone_url_with_async_scraper() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());

    let mut job = Job::from_url(format!("{base}/basic.html"));
    let outcome = engine
        .fetch(&mut job, &Scraper::new().inject(link_script()))
        .await
        .unwrap();

    assert_eq!(outcome.data(), Some(&simple_list()));
    assert_eq!(job.result.extracted_data(), Some(&simple_list()));
    assert_eq!(job.result.status(), Some(200));
    assert!(job.result.fetched_at().is_some());
}

#[tokio::test]
async fn test_scraper_from_source() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());
    let script = Script::from_source(r#"{"iterator": ".url-list a", "data": "href"}"#).unwrap();

    let mut job = Job::from_url(format!("{base}/basic.html"));
    let outcome = engine
        .fetch(&mut job, &Scraper::new().inject(script))
        .await
        .unwrap();

    assert_eq!(outcome.into_data(), Some(simple_list()));
}

#[tokio::test]
async fn test_scraper_from_file() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("links.json");
    std::fs::write(&path, r#"{"iterator": ".url-list a", "data": "href"}"#).unwrap();
    let script = Script::from_file(&path).unwrap();

    let mut job = Job::from_url(format!("{base}/basic.html"));
    let outcome = engine
        .fetch(&mut job, &Scraper::new().inject(script))
        .await
        .unwrap();

    assert_eq!(outcome.into_data(), Some(simple_list()));
}

#[tokio::test]
async fn test_validation_with_predicate() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());
    let scraper = Scraper::new()
        .inject(link_script())
        .validate(Validation::predicate(|data| {
            data.and_then(Value::as_array).is_some_and(|a| a.len() == 4)
        }));

    let mut job = Job::from_url(format!("{base}/basic.html"));
    let outcome = engine.fetch(&mut job, &scraper).await.unwrap();
    assert_eq!(outcome.into_data(), Some(simple_list()));
}

#[tokio::test]
async fn test_validation_with_type_expression() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());
    let url = format!("{base}/basic.html");

    let passing = Scraper::new()
        .inject(link_script())
        .validate(Validation::types("array|object").unwrap());
    let mut job = Job::from_url(&url);
    assert!(engine.fetch(&mut job, &passing).await.is_ok());

    let failing = Scraper::new()
        .inject(link_script())
        .validate(Validation::types("string").unwrap());
    let mut job = Job::from_url(&url);
    let err = engine.fetch(&mut job, &failing).await.unwrap_err();
    assert_eq!(err, JobError::InvalidData);
    assert_eq!(err.to_string(), "invalid-data");
    assert!(job.result.extracted_data().is_none());
}

#[tokio::test]
async fn test_page_log_reaches_observers() {
    let base = spawn_fixture_server().await;
    let recorder = RecordingObserver::new();
    let observers = Observers::new();
    observers.subscribe(Arc::new(recorder.clone()));
    let engine = test_engine(observers);

    let url = format!("{base}/basic.html");
    let scraper = Scraper::new().inject(Script::sync(|_, ctx| {
        ctx.log("Hello world!");
        Ok(json!("ok"))
    }));
    let mut job = Job::from_url(&url);
    engine.fetch(&mut job, &scraper).await.unwrap();

    assert_eq!(recorder.logs(), vec![(url, "Hello world!".to_string())]);
    assert!(recorder.errors().is_empty());
}

#[tokio::test]
async fn test_page_error_reaches_observers() {
    let base = spawn_fixture_server().await;
    let recorder = RecordingObserver::new();
    let observers = Observers::new();
    observers.subscribe(Arc::new(recorder.clone()));
    let engine = test_engine(observers);

    let url = format!("{base}/basic.html");
    let scraper = Scraper::new().inject(Script::sync(|_, _| Err(ScriptError::new("test"))));
    let mut job = Job::new(JobRequest::new(&url).with_timeout(Duration::from_millis(100)));
    let err = engine.fetch(&mut job, &scraper).await.unwrap_err();

    assert_eq!(err.to_string(), "Error: test");
    assert_eq!(recorder.errors(), vec![(url, "Error: test".to_string())]);
}

#[tokio::test]
async fn test_structural_records() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());
    let script = Script::from_source(
        r#"{"iterator": ".decisions", "data": {
            "title": {"sel": ".sous-titre > h3"},
            "date": {"sel": ".date"}
        }}"#,
    )
    .unwrap();

    let mut job = Job::from_url(format!("{base}/transparency1.html"));
    let data = engine
        .fetch(&mut job, &Scraper::new().inject(script))
        .await
        .unwrap()
        .into_data()
        .unwrap();

    let records = data.as_array().unwrap();
    assert_eq!(records.len(), 15);
    assert_eq!(records[0], json!({"title": "Decision 1", "date": "2014-01-01"}));
}

#[tokio::test]
async fn test_status_error() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());

    let mut job = Job::from_url(format!("{base}/status/404"));
    let err = engine
        .fetch(&mut job, &Scraper::new().inject(link_script()))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "status-404");
    assert_eq!(err.status(), Some(404));
    assert!(job.result.status().is_none());
}

#[tokio::test]
async fn test_timeout() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());

    let request = JobRequest::new(format!("{base}/slow.html")).with_timeout(Duration::from_millis(100));
    let mut job = Job::new(request);
    let err = engine.fetch(&mut job, &Scraper::new()).await.unwrap_err();

    assert_eq!(err, JobError::Timeout);
    assert_eq!(err.to_string(), "timeout");
}

#[tokio::test]
async fn test_host_not_found() {
    let engine = test_engine(Observers::new());

    let mut job = Job::from_url("http://nonexistent.invalid/");
    let err = engine.fetch(&mut job, &Scraper::new()).await.unwrap_err();

    assert_eq!(err.to_string(), "host-not-found");
}

#[tokio::test]
async fn test_connection_refused_passes_through() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let engine = test_engine(Observers::new());
    let mut job = Job::from_url(format!("http://{addr}/"));
    let err = engine.fetch(&mut job, &Scraper::new()).await.unwrap_err();

    assert!(!err.is_classified());
    assert!(matches!(err, JobError::Transport(_)));
}

#[tokio::test]
async fn test_redirect_reports_final_url() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());

    let url = format!("{base}/redirect");
    let mut job = Job::from_url(&url);
    let outcome = engine.fetch(&mut job, &Scraper::new()).await.unwrap();

    assert_eq!(outcome, Outcome::Page);
    assert_eq!(job.url(), url);
    assert_eq!(job.result.final_url(), Some(format!("{base}/basic.html").as_str()));
}

#[tokio::test]
async fn test_page_without_script() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());

    let mut job = Job::from_url(format!("{base}/basic.html"));
    let outcome = engine.fetch(&mut job, &Scraper::new()).await.unwrap();

    assert_eq!(outcome, Outcome::Page);
    assert!(job.result.text().unwrap().contains("url-list"));
    assert!(job.result.header("Content-Type").unwrap().starts_with("text/html"));
    assert_eq!(job.result.header("content-type"), job.result.header("CONTENT-TYPE"));
}

#[tokio::test]
async fn test_json_body() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());

    let request = JobRequest::new(format!("{base}/echo"))
        .with_method(Method::Post)
        .with_body(json!({"query": "links"}))
        .with_body_encoding(BodyEncoding::Json);
    let mut job = Job::new(request);
    engine.fetch(&mut job, &Scraper::new()).await.unwrap();

    let echo = echo_of(&job);
    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["content_type"], "application/json");
    assert_eq!(echo["user_agent"], "trawl-tests");
    let sent: Value = serde_json::from_str(echo["body"].as_str().unwrap()).unwrap();
    assert_eq!(sent, json!({"query": "links"}));
}

#[tokio::test]
async fn test_form_body() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());

    let request = JobRequest::new(format!("{base}/echo"))
        .with_method(Method::Post)
        .with_body(json!({"name": "trawl", "count": 2}));
    let mut job = Job::new(request);
    engine.fetch(&mut job, &Scraper::new()).await.unwrap();

    let echo = echo_of(&job);
    assert_eq!(echo["content_type"], "application/x-www-form-urlencoded");
    let body = echo["body"].as_str().unwrap();
    assert!(body.contains("name=trawl"));
    assert!(body.contains("count=2"));
}

#[tokio::test]
async fn test_basic_auth() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());

    let request = JobRequest::new(format!("{base}/echo")).with_auth(Auth::basic("user", "pass"));
    let mut job = Job::new(request);
    engine.fetch(&mut job, &Scraper::new()).await.unwrap();

    assert_eq!(echo_of(&job)["authorization"], "Basic dXNlcjpwYXNz");
}

#[tokio::test]
async fn test_latin1_page_is_scraped() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());
    let scraper = Scraper::new().inject(Script::sync(|doc, _| {
        Ok(json!({
            "links": doc.scrape(".url-list a", &Retriever::attr("href"))?,
            "first": doc.scrape_one(".url-list a", &Retriever::text())?,
        }))
    }));

    let mut job = Job::from_url(format!("{base}/latin1.html"));
    let data = engine.fetch(&mut job, &scraper).await.unwrap().into_data().unwrap();

    assert_eq!(data["links"], simple_list());
    assert_eq!(data["first"], json!("Caf\u{e9}"));
    assert!(job.result.text().unwrap().contains("Caf\u{e9}"));
}

#[tokio::test]
async fn test_repeated_and_raw_response_headers_are_kept() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());

    let mut job = Job::from_url(format!("{base}/cookies"));
    engine.fetch(&mut job, &Scraper::new()).await.unwrap();

    assert_eq!(job.result.header("set-cookie"), Some("a=1, b=2"));
    assert_eq!(job.result.header("x-label"), Some("caf\u{fffd}"));
}

#[tokio::test]
async fn test_binary_body_is_parse_error() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());

    let mut job = Job::from_url(format!("{base}/binary"));
    let err = engine
        .fetch(&mut job, &Scraper::new().inject(link_script()))
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Parse(_)));
    assert!(err.to_string().starts_with("parse-error"));
}

#[tokio::test]
async fn test_concurrent_jobs() {
    let base = spawn_fixture_server().await;
    let engine = test_engine(Observers::new());
    let scraper = Scraper::new().inject(link_script());

    let mut jobs: Vec<Job> = (0..5)
        .map(|_| Job::from_url(format!("{base}/basic.html")))
        .collect();
    let results =
        futures::future::join_all(jobs.iter_mut().map(|job| engine.fetch(job, &scraper))).await;

    for result in results {
        assert_eq!(result.unwrap().into_data(), Some(simple_list()));
    }
}
