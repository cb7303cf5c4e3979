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

use tokio_util::sync::CancellationToken;

/// Creates a handler for shutdown signals (SIGTERM, SIGINT), returning a
/// token that is cancelled once one has been received.
pub fn spawn_handler() -> std::io::Result<CancellationToken> {
    let shutdown = CancellationToken::new();

    #[cfg(unix)]
    let mut sig_term_fut =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let token = shutdown.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let sig_term = sig_term_fut.recv();
        #[cfg(not(unix))]
        let sig_term = std::future::pending::<()>();

        let signal = tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sig_term => "SIGTERM",
            _ = token.cancelled() => return,
        };

        tracing::info!(%signal, "shutting down from signal");
        token.cancel();
    });

    Ok(shutdown)
}
