use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::{Data, Request, Response};
use std::time::Instant;
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "X-Request-Id";

#[derive(Clone)]
struct RequestMeta {
    started_at: Instant,
    request_id: String,
}

/// Fairing that logs one line per HTTP request with timing and assigns a
/// request id when the caller did not supply one. The id is echoed back on
/// the response so callers can correlate across services.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let request_id = request
            .headers()
            .get_one(REQUEST_ID_HEADER)
            .map(|id| id.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        request.local_cache(|| RequestMeta {
            started_at: Instant::now(),
            request_id,
        });
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let meta = request.local_cache(|| RequestMeta {
            started_at: Instant::now(),
            request_id: Uuid::new_v4().to_string(),
        });
        let duration = meta.started_at.elapsed();

        response.set_header(Header::new(REQUEST_ID_HEADER, meta.request_id.clone()));

        log::info!(
            "{} {} -> {} ({:.2}ms) [requestId={}]",
            request.method(),
            request.uri(),
            response.status().code,
            duration.as_secs_f64() * 1000.0,
            meta.request_id
        );
    }
}
