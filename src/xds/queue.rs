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

use async_channel::{Receiver, Sender};

use super::InputEvent;
use crate::resources::{DiscoveryInputs, SecretInputs};

/// An unbounded queue whose consumer only ever observes the latest value
/// enqueued since it last looked.
#[derive(Debug)]
pub struct AsyncQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for AsyncQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }
}

impl<T> AsyncQueue<T> {
    /// Enqueues `value` without blocking.
    pub fn enqueue(&self, value: T) {
        // Both halves live as long as the queue, so the channel can't close.
        let _ = self.tx.try_send(value);
    }

    /// Waits for a value, then drains everything queued behind it and returns
    /// the most recent one. Returns `None` once the queue is closed.
    ///
    /// Cancel safe: nothing is dequeued until a value is returned.
    pub async fn next_value(&self) -> Option<T> {
        let mut latest = self.rx.recv().await.ok()?;
        while let Ok(value) = self.rx.try_recv() {
            latest = value;
        }
        Some(latest)
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// The three input queues feeding the syncer: resource change kicks,
/// discovery data and secrets.
#[derive(Clone, Debug, Default)]
pub struct XdsInputChannels {
    pub(crate) kick: AsyncQueue<()>,
    pub(crate) discovery: AsyncQueue<DiscoveryInputs>,
    pub(crate) secrets: AsyncQueue<SecretInputs>,
}

impl XdsInputChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals that routing resources changed and a pass should run.
    pub fn kick(&self) {
        self.kick.enqueue(());
    }

    pub fn update_discovery_inputs(&self, inputs: DiscoveryInputs) {
        self.discovery.enqueue(inputs);
    }

    pub fn update_secret_inputs(&self, inputs: SecretInputs) {
        self.secrets.enqueue(inputs);
    }

    /// Waits for the next input from any queue. Queues that are ready at the
    /// same time are picked at random. Returns `None` once every queue is
    /// closed.
    pub(crate) async fn next_event(&self) -> Option<InputEvent> {
        tokio::select! {
            Some(()) = self.kick.next_value() => Some(InputEvent::Kick),
            Some(discovery) = self.discovery.next_value() => Some(InputEvent::Discovery(discovery)),
            Some(secrets) = self.secrets.next_value() => Some(InputEvent::Secrets(secrets)),
            else => None,
        }
    }
}
