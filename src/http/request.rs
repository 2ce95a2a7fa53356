//! Request identification middleware.
//!
//! # Responsibilities
//! - Ensure every request carries an `x-request-id` header
//! - Generate a UUID v4 when the client supplied none
//!
//! # Design Decisions
//! - The ID is added as early as possible so it appears in all log events
//! - Client-supplied IDs are kept, matching common gateway behavior

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use tower::{Layer, Service};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer that stamps requests with an `x-request-id` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestIdService<S>
where
    S: Service<Request<Body>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        if !request.headers().contains_key(X_REQUEST_ID) {
            let id = Uuid::new_v4().to_string();
            if let Ok(value) = HeaderValue::from_str(&id) {
                request.headers_mut().insert(X_REQUEST_ID, value);
            }
        }
        self.inner.call(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::ServiceExt;

    #[tokio::test]
    async fn generates_id_when_absent() {
        let service = RequestIdLayer.layer(tower::service_fn(
            |req: Request<Body>| async move {
                Ok::<_, Infallible>(req.headers().get(X_REQUEST_ID).cloned())
            },
        ));
        let id = service
            .oneshot(Request::builder().body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(id.is_some());
    }

    #[tokio::test]
    async fn keeps_client_supplied_id() {
        let service = RequestIdLayer.layer(tower::service_fn(
            |req: Request<Body>| async move {
                Ok::<_, Infallible>(req.headers().get(X_REQUEST_ID).cloned())
            },
        ));
        let id = service
            .oneshot(
                Request::builder()
                    .header(X_REQUEST_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(id.unwrap(), "abc-123");
    }
}
