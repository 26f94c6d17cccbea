use axum::{routing::get, Router};

pub const HEALTH_PATH: &str = "/health";

pub const READY_BODY: &str = "ok";
pub const UNCONFIGURED_BODY: &str = "ok (Slack not configured yet)";

pub async fn ready() -> &'static str {
    READY_BODY
}

/// Liveness while Slack credentials are missing; still 200 so the host keeps the process.
pub async fn unconfigured() -> &'static str {
    UNCONFIGURED_BODY
}

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(HEALTH_PATH, get(ready))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::{router, unconfigured, READY_BODY};

    #[tokio::test]
    async fn health_returns_ok_body() {
        let response = router::<()>()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&body[..], READY_BODY.as_bytes());
    }

    #[tokio::test]
    async fn unconfigured_body_mentions_missing_slack_setup() {
        assert!(unconfigured().await.contains("Slack not configured"));
    }
}
