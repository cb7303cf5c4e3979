/*
 * Copyright 2023 Google LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Read only HTTP introspection of published snapshots, held inputs and
//! metrics.

mod health;

use std::convert::Infallible;

use hyper::{
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server as HyperServer, StatusCode,
};
use tokio_util::sync::CancellationToken;

pub use self::health::Health;
use crate::xds::Introspection;

pub const PORT: u16 = 8000;

/// Serves the admin endpoints on `address` from a dedicated thread until
/// `shutdown` is cancelled.
pub fn server(
    introspection: Introspection,
    health: Health,
    address: std::net::SocketAddr,
    shutdown: CancellationToken,
) -> std::io::Result<std::thread::JoinHandle<crate::Result<()>>> {
    tracing::info!(address = %address, "starting admin endpoint");

    std::thread::Builder::new()
        .name("admin-http".into())
        .spawn(move || -> crate::Result<()> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .enable_time()
                .thread_name("admin-http-worker")
                .build()?;

            runtime.block_on(async move {
                let make_svc = make_service_fn(move |_conn| {
                    let introspection = introspection.clone();
                    let health = health.clone();
                    async move {
                        Ok::<_, Infallible>(service_fn(move |req| {
                            let introspection = introspection.clone();
                            let health = health.clone();
                            async move {
                                let result = handle_request(req, &introspection, &health);
                                Ok::<_, Infallible>(map_result_into_response(result))
                            }
                        }))
                    }
                });

                HyperServer::try_bind(&address)?
                    .serve(make_svc)
                    .with_graceful_shutdown(shutdown.cancelled_owned())
                    .await?;
                Ok(())
            })
        })
}

/// Maps errors into a 500 response, passing successful responses through.
fn map_result_into_response(request: crate::Result<Response<Body>>) -> Response<Body> {
    match request {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(%error, "admin http server error");
            let mut response = Response::new(Body::from("internal error"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

#[tracing::instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
fn handle_request(
    request: Request<Body>,
    introspection: &Introspection,
    health: &Health,
) -> crate::Result<Response<Body>> {
    tracing::trace!("handling request");

    match (request.method(), request.uri().path()) {
        (&Method::GET, "/metrics") => collect_metrics(),
        (&Method::GET, "/live" | "/livez") => Ok(health.check_liveness()),
        (&Method::GET, "/xds") => json_response(&introspection.keys()),
        (&Method::GET, "/api") => match introspection.latest() {
            Some(snapshot) => json_response(&*snapshot),
            None => Ok(not_found("no snapshot has been computed yet")),
        },
        (&Method::GET, path) if path.starts_with("/xds/") => {
            let key = &path["/xds/".len()..];
            match introspection.snapshot(key) {
                Some(snapshot) => json_response(&*snapshot),
                None => Ok(not_found(&format!("no snapshot for {key}"))),
            }
        }
        (_, path) => Ok(not_found(&format!("{path} not found"))),
    }
}

fn json_response(value: &impl serde::Serialize) -> crate::Result<Response<Body>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        )
        .body(Body::from(serde_json::to_string(value)?))
        .map_err(From::from)
}

fn not_found(message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_owned()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

fn collect_metrics() -> crate::Result<Response<Body>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, crate::metrics::text_content_type())
        .body(Body::from(crate::metrics::encode()?))
        .map_err(From::from)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::xds::{MemorySnapshotCache, Snapshot, SnapshotCache};

    fn introspection() -> (Arc<MemorySnapshotCache>, Introspection) {
        let cache = Arc::new(MemorySnapshotCache::new());
        let introspection = Introspection::new(cache.clone(), <_>::default());
        (cache, introspection)
    }

    fn get(path: &str, introspection: &Introspection) -> Response<Body> {
        let request = Request::get(path).body(Body::empty()).unwrap();
        map_result_into_response(handle_request(
            request,
            introspection,
            &Health::new(CancellationToken::new()),
        ))
    }

    async fn body(response: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn collect_metrics() {
        let (_, introspection) = introspection();
        let response = get("/metrics", &introspection);
        assert_eq!(StatusCode::OK, response.status());
    }

    #[tokio::test]
    async fn lists_and_dumps_snapshots() {
        let (cache, introspection) = introspection();
        cache.set_snapshot("default~gw", Snapshot::empty());

        let response = get("/xds", &introspection);
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(r#"["default~gw"]"#, body(response).await);

        let response = get("/xds/default~gw", &introspection);
        assert_eq!(StatusCode::OK, response.status());

        let response = get("/xds/missing", &introspection);
        assert_eq!(StatusCode::NOT_FOUND, response.status());
    }

    #[tokio::test]
    async fn api_before_first_pass() {
        let (_, introspection) = introspection();
        assert_eq!(
            StatusCode::NOT_FOUND,
            get("/api", &introspection).status()
        );
    }
}
