use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Path segments followed by a caller-chosen identifier.
const ID_PARENTS: [&str; 3] = ["units", "attempts", "students"];

/// Records request count and latency per method, route and status.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}

/// Collapses identifiers into `{id}` so label cardinality stays bounded.
fn normalize_path(path: &str) -> String {
    let mut normalized = Vec::new();
    let mut previous = "";

    for segment in path.split('/') {
        if ID_PARENTS.contains(&previous) || is_uuid_like(segment) {
            normalized.push("{id}");
        } else {
            normalized.push(segment);
        }
        previous = segment;
    }

    normalized.join("/")
}

fn is_uuid_like(s: &str) -> bool {
    s.len() == 36 && s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}
