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

use std::{
    panic,
    sync::{
        atomic::{AtomicBool, Ordering::Relaxed},
        Arc,
    },
};

use hyper::{Body, Response, StatusCode};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct Health {
    healthy: Arc<AtomicBool>,
}

impl Health {
    /// Installs a panic hook that marks the process unhealthy and cancels
    /// `shutdown`.
    pub fn new(shutdown: CancellationToken) -> Self {
        let health = Self {
            healthy: Arc::new(AtomicBool::new(true)),
        };

        let healthy = health.healthy.clone();
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            tracing::error!(%panic_info, "panic has occurred, moving to unhealthy");
            healthy.swap(false, Relaxed);
            shutdown.cancel();
            default_hook(panic_info);
        }));

        health
    }

    /// Returns a HTTP 200 response if the controller is healthy.
    pub fn check_liveness(&self) -> Response<Body> {
        if self.healthy.load(Relaxed) {
            return Response::new("ok".into());
        };

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_hook() {
        let shutdown = CancellationToken::new();
        let health = Health::new(shutdown.clone());

        let response = health.check_liveness();
        assert_eq!(response.status(), StatusCode::OK);

        let _unused = std::panic::catch_unwind(|| {
            panic!("oh no!");
        });

        let response = health.check_liveness();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(shutdown.is_cancelled());
    }
}
