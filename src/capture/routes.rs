use crate::capture::capture_error::CaptureError;
use crate::capture::render;
use crate::error::Error;
use crate::event::{DynRequestObserver, HttpCaptureEvent};
use crate::response::{DynResponseProvider, ResponseConfig};
use axum::body::{boxed, BoxBody, Bytes, HttpBody};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use hyper::body::{Body, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub(super) struct CaptureState {
    /// `http` or `https`, for requests that don't carry their own scheme.
    pub scheme: &'static str,
    pub observer: DynRequestObserver,
    pub responses: DynResponseProvider,
}

/// A router owned by one listener. Every method on every path lands in [`capture`].
pub(super) fn new(state: CaptureState) -> Router {
    Router::new()
        .fallback(capture)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn capture(
    State(state): State<CaptureState>,
    request: Request<Body>,
) -> Result<Response, CaptureError> {
    let (parts, body) = request.into_parts();
    let body = hyper::body::to_bytes(body).await.map_err(Error::BodyRead)?;

    let response = canned_response(&state.responses.current());

    let event = render::capture_event(state.scheme, &parts, &body);
    tracing::debug!("captured {}", event.uri);
    let (parts, body) = response.into_parts();
    let body = ReportingBody {
        inner: body,
        report: Some((state.observer, event)),
    };
    Ok(Response::from_parts(parts, boxed(body)))
}

fn canned_response(conf: &ResponseConfig) -> Response {
    let status = StatusCode::from_u16(conf.status).unwrap_or_else(|_| {
        tracing::warn!("status {} can't be sent, using 200", conf.status);
        StatusCode::OK
    });
    let mut response = (status, conf.body.clone()).into_response();
    match HeaderValue::from_str(&conf.content_type) {
        Ok(content_type) => {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        Err(_) => tracing::warn!("invalid Content-Type {:?}, not sent", conf.content_type),
    }
    response
}

/// A response body that hands its capture event to the observer once the connection is done
/// with it. The observer runs on the blocking pool, so it never holds up the response.
struct ReportingBody {
    inner: BoxBody,
    report: Option<(DynRequestObserver, HttpCaptureEvent)>,
}

impl Drop for ReportingBody {
    fn drop(&mut self) {
        if let Some((observer, event)) = self.report.take() {
            tokio::task::spawn_blocking(move || observer.on_request(event));
        }
    }
}

impl HttpBody for ReportingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_data(cx)
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_trailers(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::SharedResponse;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    type Seen = Arc<Mutex<Vec<HttpCaptureEvent>>>;

    fn router(scheme: &'static str, responses: SharedResponse) -> (Router, Seen) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let state = CaptureState {
            scheme,
            observer: Arc::new(move |event: HttpCaptureEvent| sink.lock().unwrap().push(event)),
            responses: Arc::new(responses),
        };
        (new(state), seen)
    }

    /// Events arrive once the response body is dropped, on the blocking pool.
    async fn wait_for(seen: &Seen, count: usize) -> Vec<HttpCaptureEvent> {
        for _ in 0..500 {
            let events = seen.lock().unwrap().clone();
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} capture events, got {}", seen.lock().unwrap().len());
    }

    async fn body_of(response: Response) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn every_path_and_method_is_answered_and_captured() {
        let responses = SharedResponse::new(ResponseConfig::new(404, "text/plain", "gone"));
        let (app, seen) = router("https", responses);

        let request = Request::builder()
            .method("DELETE")
            .uri("/deep/path?x=1")
            .header("host", "api.example.test")
            .body(Body::from("payload"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(body_of(response).await, "gone");

        let seen = wait_for(&seen, 1).await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "https://api.example.test/deep/path");
        assert!(seen[0].content.ends_with("\r\n\r\npayload"));
    }

    #[tokio::test]
    async fn response_is_read_fresh_for_each_request() {
        let responses = SharedResponse::new(ResponseConfig::new(200, "text/html", "first"));
        let (app, seen) = router("http", responses.clone());

        let get = || Request::get("/").header("host", "h").body(Body::empty()).unwrap();
        let first = app.clone().oneshot(get()).await.unwrap();
        assert_eq!(body_of(first).await, "first");

        responses.set(ResponseConfig::new(500, "application/json", "{}"));
        let second = app.oneshot(get()).await.unwrap();
        assert_eq!(second.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(second.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_of(second).await, "{}");

        assert_eq!(wait_for(&seen, 2).await.len(), 2);
    }

    #[tokio::test]
    async fn slow_observer_does_not_hold_back_the_response() {
        let seen: Seen = Arc::default();
        let sink = Arc::clone(&seen);
        let state = CaptureState {
            scheme: "http",
            observer: Arc::new(move |event: HttpCaptureEvent| {
                std::thread::sleep(Duration::from_millis(1500));
                sink.lock().unwrap().push(event);
            }),
            responses: Arc::new(SharedResponse::new(ResponseConfig::default())),
        };

        let started = Instant::now();
        let request = Request::get("/slow").header("host", "h").body(Body::empty()).unwrap();
        let response = new(state).oneshot(request).await.unwrap();
        assert_eq!(body_of(response).await, "@_@");
        assert!(started.elapsed() < Duration::from_millis(500));

        let seen = wait_for(&seen, 1).await;
        assert_eq!(seen[0].url, "http://h/slow");
    }

    #[test]
    fn unsendable_status_falls_back_to_ok() {
        let response = canned_response(&ResponseConfig::new(42, "text/html", ""));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html");
    }
}
