use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use tower::ServiceExt;

use spool_api::{AppState, build_app_router};
use spool_core::domain::{ExecutorError, JobArgs};
use spool_core::impls::{InMemoryJobQueue, InMemoryJobStore};
use spool_core::ports::TaskExecutor;
use spool_core::{AppBuilder, CoreConfig, WorkerPool};

/// Answers based on the last message, so one pool serves every scenario.
///
/// - `"slow"`: sleeps past the wait timeout, then answers
/// - `"fail"`: non-retryable error
/// - anything else: `"world"`
pub struct ScriptedExecutor;

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, args: &JobArgs) -> Result<String, ExecutorError> {
        let last = args.messages.last().map(|m| m.content.as_str()).unwrap_or("");
        match last {
            "slow" => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok("late".into())
            }
            "fail" => Err(ExecutorError::fatal("model refused")),
            _ => Ok("world".into()),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub pool: WorkerPool,
}

/// In-memory backend, two worker slots, 300ms caller wait.
pub async fn build_test_app() -> TestApp {
    let store = Arc::new(InMemoryJobStore::default());
    let app = AppBuilder::new()
        .store(store.clone())
        .queue(Arc::new(InMemoryJobQueue::new()))
        .executor(Arc::new(ScriptedExecutor))
        .config(CoreConfig {
            concurrency: 2,
            wait_timeout: Duration::from_millis(300),
            wait_poll_interval: Duration::from_millis(10),
            ..CoreConfig::default()
        })
        .build()
        .unwrap();

    let pool = app.start_workers().await.unwrap();
    let state = AppState {
        dispatcher: app.dispatcher(),
        monitor: app.monitor(),
        store,
    };

    TestApp {
        router: build_app_router(state),
        pool,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
