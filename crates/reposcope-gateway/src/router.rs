use axum::Router;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{ask_handler, index_handler, root_handler, search_handler};
use super::server::AppState;

pub(crate) fn build_router(state: AppState, max_body_size: usize) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/search", post(search_handler))
        .route("/ask-assistant", post(ask_handler))
        .route("/index-repo", post(index_handler))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::service::{AnalyzerService, BoxFuture, IndexSummary, SearchResult};

    #[derive(Default)]
    struct FakeService {
        fail: bool,
        index_calls: AtomicUsize,
    }

    impl AnalyzerService for FakeService {
        fn search(&self, query: String) -> BoxFuture<'_, anyhow::Result<Vec<SearchResult>>> {
            Box::pin(async move {
                if self.fail {
                    anyhow::bail!("embedding service unavailable");
                }
                Ok(vec![
                    SearchResult {
                        text: format!("match for {query}"),
                        distance: 0.25,
                    },
                    SearchResult {
                        text: "second".into(),
                        distance: 1.5,
                    },
                ])
            })
        }

        fn ask(&self, query: String) -> BoxFuture<'_, anyhow::Result<String>> {
            Box::pin(async move {
                if self.fail {
                    anyhow::bail!("run failed");
                }
                Ok(format!("answer to {query}"))
            })
        }

        fn index_repository(&self) -> BoxFuture<'_, anyhow::Result<IndexSummary>> {
            Box::pin(async move {
                self.index_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    anyhow::bail!("disk full");
                }
                Ok(IndexSummary {
                    files_indexed: 3,
                    files_failed: 1,
                    chunks_indexed: 42,
                })
            })
        }
    }

    fn make_router(fail: bool) -> Router {
        let service = Arc::new(FakeService {
            fail,
            ..FakeService::default()
        });
        build_router(AppState { service }, 1_048_576)
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn root_reports_running() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = make_router(false).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["message"], "Repository Analyzer API is running");
    }

    #[tokio::test]
    async fn search_returns_text_distance_pairs() {
        let req = post_json("/search", &serde_json::json!({"query": "config"}));
        let resp = make_router(false).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["results"][0][0], "match for config");
        assert_eq!(json["results"][0][1], 0.25);
        assert_eq!(json["results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn search_without_query_is_bad_request() {
        for body in [
            serde_json::json!({}),
            serde_json::json!({"query": ""}),
            serde_json::json!({"query": 7}),
        ] {
            let resp = make_router(false)
                .oneshot(post_json("/search", &body))
                .await
                .unwrap();
            assert_eq!(resp.status(), 400, "body {body}");
            assert_eq!(json_body(resp).await["error"], "Query text is required");
        }
    }

    #[tokio::test]
    async fn search_with_malformed_body_is_bad_request() {
        let req = Request::builder()
            .method("POST")
            .uri("/search")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = make_router(false).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn search_failure_is_internal_error() {
        let req = post_json("/search", &serde_json::json!({"query": "x"}));
        let resp = make_router(true).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 500);
        let json = json_body(resp).await;
        assert_eq!(json["error"], "Search failed: embedding service unavailable");
    }

    #[tokio::test]
    async fn ask_returns_response() {
        let req = post_json("/ask-assistant", &serde_json::json!({"query": "what is main"}));
        let resp = make_router(false).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(json_body(resp).await["response"], "answer to what is main");
    }

    #[tokio::test]
    async fn ask_validation_and_failure() {
        let resp = make_router(false)
            .oneshot(post_json("/ask-assistant", &serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = make_router(true)
            .oneshot(post_json("/ask-assistant", &serde_json::json!({"query": "q"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        assert_eq!(json_body(resp).await["error"], "Assistant query failed: run failed");
    }

    #[tokio::test]
    async fn index_repo_reports_counts() {
        let req = Request::builder()
            .method("POST")
            .uri("/index-repo")
            .body(Body::empty())
            .unwrap();
        let resp = make_router(false).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["message"], "Repository successfully indexed");
        assert_eq!(json["files_indexed"], 3);
        assert_eq!(json["files_failed"], 1);
        assert_eq!(json["chunks_indexed"], 42);
    }

    #[tokio::test]
    async fn index_repo_failure() {
        let req = Request::builder()
            .method("POST")
            .uri("/index-repo")
            .body(Body::empty())
            .unwrap();
        let resp = make_router(true).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 500);
        assert_eq!(json_body(resp).await["error"], "Indexing failed: disk full");
    }

    #[tokio::test]
    async fn body_size_limit() {
        let service = Arc::new(FakeService::default());
        let app = build_router(AppState { service }, 64);
        let oversized = vec![b'a'; 128];
        let req = Request::builder()
            .method("POST")
            .uri("/search")
            .header("content-type", "application/json")
            .body(Body::from(oversized))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 413);
    }

    #[tokio::test]
    async fn declared_oversized_body_is_rejected_early() {
        let service = Arc::new(FakeService::default());
        let app = build_router(AppState { service }, 64);
        let req = Request::builder()
            .method("POST")
            .uri("/ask-assistant")
            .header("content-type", "application/json")
            .header("content-length", "128")
            .body(Body::from(vec![b'a'; 128]))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 413);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let resp = make_router(false).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 404);
    }
}
