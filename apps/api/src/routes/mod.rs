pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::matching::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/providers", get(handlers::handle_list_providers))
        // Matching API
        .route("/api/v1/matches", post(handlers::handle_match))
        .route("/api/v1/matches/batch", post(handlers::handle_batch_match))
        .route("/api/v1/matches/:id", get(handlers::handle_get_match))
        // Extraction API
        .route("/api/v1/extract", post(handlers::handle_extract))
        .route("/api/v1/extract/resume", post(handlers::handle_extract_resume))
        .route("/api/v1/extract/job", post(handlers::handle_extract_job))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{Config, LlmConfig};
    use crate::llm_client::testing::{MockAdapter, MockReply};
    use crate::llm_client::{ProviderId, ProviderRegistry};
    use crate::matching::ats::AtsAnalyzer;
    use crate::matching::matcher::Matcher;

    const DETAILED_REPLY: &str = r#"```json
{"match_score": 78, "missing_skills": ["Kubernetes"], "recommendations": ["Add a Kubernetes project"], "explanation": "Strong Python background."}
```"#;

    /// State with a lazily-connecting pool; requests without `user_id` never touch it.
    fn app(mock: Arc<MockAdapter>) -> Router {
        let llm = LlmConfig::from_lookup(|_| None).unwrap();
        let registry = ProviderRegistry::new(ProviderId::Claude, reqwest::Client::new())
            .with_adapter(mock);
        let matcher = Matcher::new(
            AtsAnalyzer::new().unwrap(),
            Duration::from_secs(60),
            Duration::from_secs(15),
        );
        let state = AppState {
            db: PgPoolOptions::new()
                .connect_lazy("postgres://localhost/skillfit_test")
                .unwrap(),
            registry: Arc::new(registry),
            matcher: Arc::new(matcher),
            config: Config {
                database_url: "postgres://localhost/skillfit_test".to_string(),
                port: 0,
                rust_log: "info".to_string(),
                llm,
            },
        };
        build_router(state)
    }

    async fn do_get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        read(response).await
    }

    async fn do_post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        read(response).await
    }

    async fn read(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn claude(replies: Vec<MockReply>) -> Arc<MockAdapter> {
        Arc::new(MockAdapter::new(ProviderId::Claude, replies))
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = do_get(app(claude(vec![])), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "skillfit-api");
    }

    #[tokio::test]
    async fn test_list_providers() {
        let (status, body) = do_get(app(claude(vec![])), "/api/v1/providers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["default_provider"], "claude");
        let providers = body["providers"].as_array().unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0]["provider"], "claude");
    }

    #[tokio::test]
    async fn test_match_returns_score_and_cost() {
        let mock = claude(vec![MockReply::text_with_usage(DETAILED_REPLY, 1200, 300)]);
        let (status, body) = do_post(
            app(mock.clone()),
            "/api/v1/matches",
            json!({
                "resume_text": "Senior Python engineer, Django, PostgreSQL",
                "job_text": "Python engineer with Kubernetes"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["match_score"], json!(78.0));
        assert_eq!(body["missing_skills"], json!(["Kubernetes"]));
        assert_eq!(body["provider"], "claude");
        assert_eq!(body["tokens_used"], 1500);
        assert!(body["match_id"].is_null());
        assert!(body["cost_display"].as_str().unwrap().starts_with('$'));
        assert_eq!(body["rates"], json!({"input": 3.0, "output": 15.0}));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_match_rejects_empty_text_without_calling_provider() {
        let mock = claude(vec![]);
        let (status, body) = do_post(
            app(mock.clone()),
            "/api/v1/matches",
            json!({"resume_text": "   ", "job_text": "Python engineer"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_match_with_unknown_provider_is_bad_request() {
        let mock = claude(vec![MockReply::text(DETAILED_REPLY)]);
        let (status, body) = do_post(
            app(mock.clone()),
            "/api/v1/matches",
            json!({
                "resume_text": "Python",
                "job_text": "Python",
                "llm_provider": "claud"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "UNSUPPORTED_PROVIDER");
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_match_with_unparseable_reply_is_bad_gateway() {
        let mock = claude(vec![MockReply::text("I think this candidate is a decent fit.")]);
        let (status, body) = do_post(
            app(mock),
            "/api/v1/matches",
            json!({"resume_text": "Python", "job_text": "Python"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "LLM_BAD_RESPONSE");
    }

    #[tokio::test]
    async fn test_match_auth_failure_is_unauthorized() {
        let mock = claude(vec![MockReply::auth_failure()]);
        let (status, _) = do_post(
            app(mock),
            "/api/v1/matches",
            json!({"resume_text": "Python", "job_text": "Python"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_batch_reports_partial_failures() {
        let mock = Arc::new(MockAdapter::with_responder(ProviderId::Claude, |request| {
            if request.prompt.contains("COBOL") {
                MockReply::auth_failure()
            } else {
                MockReply::text(r#"{"match_score": 64, "top_3_missing_skills": ["Go"]}"#)
            }
        }));
        let (status, body) = do_post(
            app(mock),
            "/api/v1/matches/batch",
            json!({
                "job_text": "Backend engineer",
                "resumes": [
                    {"resume_text": "Python developer"},
                    {"resume_text": "COBOL developer"},
                    {"resume_text": "Rust developer"}
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["succeeded"], 2);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["failures"][0]["index"], 1);
        assert_eq!(body["failures"][0]["label"], "resume-1");
        assert_eq!(body["results"][0]["missing_skills"], json!(["Go"]));
        assert_eq!(body["persisted"], json!([]));
        assert_eq!(body["persist_failures"], json!([]));
    }

    #[tokio::test]
    async fn test_batch_rejects_empty_resume_list() {
        let (status, _) = do_post(
            app(claude(vec![])),
            "/api/v1/matches/batch",
            json!({"job_text": "Backend engineer", "resumes": []}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_extract_with_caller_schema() {
        let mock = claude(vec![MockReply::text(
            r#"{"title": "Staff Engineer", "years": 9, "location": "Berlin"}"#,
        )]);
        let (status, body) = do_post(
            app(mock),
            "/api/v1/extract",
            json!({
                "text": "Staff Engineer with 9 years, based in Berlin",
                "schema": {"fields": [
                    {"name": "title", "type": "string"},
                    {"name": "years", "type": "number", "min": 0, "max": 60}
                ]}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payload"]["title"], "Staff Engineer");
        assert_eq!(body["payload"]["years"], json!(9));
        assert!(body["payload"].get("location").is_none());
        assert_eq!(body["provider"], "claude");
        assert_eq!(body["rates"]["input"], json!(3.0));
    }

    #[tokio::test]
    async fn test_extract_with_empty_schema_is_bad_request() {
        let mock = claude(vec![]);
        let (status, _) = do_post(
            app(mock.clone()),
            "/api/v1/extract",
            json!({"text": "anything", "schema": {"fields": []}}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_extract_job_skills() {
        let mock = claude(vec![MockReply::text(
            r#"{"technical_skills": {"required": ["Python"], "preferred": []}, "soft_skills": ["Mentoring"]}"#,
        )]);
        let (status, body) = do_post(
            app(mock),
            "/api/v1/extract/job",
            json!({"text": "Python engineer who mentors juniors"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["skills"]["technical_skills"]["required"], json!(["Python"]));
        assert_eq!(body["skills"]["soft_skills"], json!(["Mentoring"]));
    }
}
