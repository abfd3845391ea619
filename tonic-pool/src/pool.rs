/*
 *
 * Copyright 2025 gRPC authors.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to
 * deal in the Software without restriction, including without limitation the
 * rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
 * sell copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
 * FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
 * IN THE SOFTWARE.
 *
 */

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::affinity::AffinityRegistry;
use crate::channel_ref::ChannelRef;
use crate::config::{AffinityConfig, ApiConfig};
use crate::transport::{ChannelConnector, ConnectivityState, ManagedChannel};

/// Default capacity cap for a pool.
pub const DEFAULT_MAX_SIZE: usize = 10;

/// Default per-channel active-stream threshold that triggers growth.
pub const DEFAULT_STREAMS_LOW_WATERMARK: u32 = 100;

// One Ready member means the pool can serve; otherwise report the most
// actionable state.
const STATE_PRIORITY: [ConnectivityState; 5] = [
    ConnectivityState::Ready,
    ConnectivityState::Connecting,
    ConnectivityState::TransientFailure,
    ConnectivityState::Idle,
    ConnectivityState::Shutdown,
];

/// A bounded pool of transport channels that presents itself as a single
/// channel.
///
/// Calls placed through [`call`](ChannelPool::call) are routed to a member
/// channel: a call whose method carries an affinity key goes to the channel
/// bound to that key, and every other call goes to the least-loaded member.
/// The pool starts with one channel and grows lazily, one channel at a
/// time, whenever the least-loaded member is already running at or above
/// the stream low watermark, up to `max_size`. A saturated pool keeps
/// routing onto the least-loaded member rather than failing.
///
/// Lifecycle operations fan out to every member, and
/// [`state`](ChannelPool::state) condenses the members' connectivity states
/// into one answer. Cloning the pool is cheap and every clone routes over
/// the same members.
#[derive(Clone)]
pub struct ChannelPool {
    pub(crate) inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    connector: Arc<dyn ChannelConnector>,
    // Member-list lock. Never taken while holding the registry lock, and
    // vice versa.
    channels: Mutex<Vec<Arc<ChannelRef>>>,
    pub(crate) affinity: Arc<AffinityRegistry>,
    pub(crate) method_affinity: HashMap<String, AffinityConfig>,
    max_size: usize,
    streams_low_watermark: u32,
}

impl PoolInner {
    /// Selects the channel for one call.
    ///
    /// A non-empty key that is currently bound routes to its channel, even
    /// if that channel has since been shut down (the call will surface the
    /// failure). Unkeyed calls, and keyed calls whose key is not bound,
    /// reuse the least-loaded member until it crosses the low watermark,
    /// then grow the pool until it reaches capacity, after which the
    /// least-loaded member absorbs the overflow.
    pub(crate) fn pick(&self, key: Option<&str>) -> Arc<ChannelRef> {
        if let Some(key) = key.filter(|key| !key.is_empty()) {
            if let Some(bound) = self.affinity.lookup(key) {
                return bound;
            }
        }

        let mut channels = self.channels.lock();
        // Ties on stream count break toward the lowest id so selection is
        // reproducible.
        channels.sort_by_key(|member| (member.active_streams(), member.id()));
        if let Some(least) = channels.first() {
            if least.active_streams() < self.streams_low_watermark {
                return least.clone();
            }
        }
        if channels.len() < self.max_size {
            let id = channels.len() as u32;
            let member = Arc::new(ChannelRef::new(id, self.connector.connect()));
            debug!(id, "pool growing: created channel");
            channels.push(member.clone());
            return member;
        }
        // Saturated: the least-loaded member absorbs the overflow.
        channels[0].clone()
    }

    pub(crate) fn members(&self) -> Vec<Arc<ChannelRef>> {
        self.channels.lock().clone()
    }
}

impl ChannelPool {
    /// Starts building a pool that obtains its channels from `connector`.
    pub fn builder(connector: impl ChannelConnector + 'static) -> ChannelPoolBuilder {
        ChannelPoolBuilder {
            connector: Arc::new(connector),
            config: None,
        }
    }

    /// Current number of member channels.
    pub fn number_of_channels(&self) -> usize {
        self.inner.channels.lock().len()
    }

    /// The capacity cap this pool was configured with.
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// The per-channel active-stream threshold that triggers growth.
    pub fn streams_low_watermark(&self) -> u32 {
        self.inner.streams_low_watermark
    }

    /// The authority of the pool, taken from its first member. The first
    /// member is created when the pool is built, so it always exists.
    pub fn authority(&self) -> String {
        self.inner.channels.lock()[0].channel().authority()
    }

    /// The aggregate connectivity state of the pool: the highest-priority
    /// state any member reports, in the order Ready, Connecting,
    /// TransientFailure, Idle, Shutdown.
    pub fn state(&self, request_connection: bool) -> ConnectivityState {
        let states: Vec<ConnectivityState> = self
            .inner
            .members()
            .iter()
            .map(|member| member.channel().state(request_connection))
            .collect();
        for state in STATE_PRIORITY {
            if states.contains(&state) {
                return state;
            }
        }
        ConnectivityState::Idle
    }

    /// Begins an orderly shutdown of every member channel. Idempotent.
    pub fn shutdown(&self) {
        for member in self.inner.members() {
            member.channel().shutdown();
        }
    }

    /// Forcefully shuts down every member channel that has not yet
    /// terminated. Idempotent.
    pub fn shutdown_now(&self) {
        for member in self.inner.members() {
            if !member.channel().is_terminated() {
                member.channel().shutdown_now();
            }
        }
    }

    /// Whether every member channel has begun shutting down.
    pub fn is_shutdown(&self) -> bool {
        self.inner
            .members()
            .iter()
            .all(|member| member.channel().is_shutdown())
    }

    /// Whether every member channel has terminated.
    pub fn is_terminated(&self) -> bool {
        self.inner
            .members()
            .iter()
            .all(|member| member.channel().is_terminated())
    }

    /// Waits up to `timeout` for every member channel to terminate,
    /// spending the remaining budget on each member in turn. Reports
    /// whether the whole pool terminated.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        for member in self.inner.members() {
            if member.channel().is_terminated() {
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            member.channel().await_termination(remaining).await;
        }
        self.is_terminated()
    }
}

/// Builds a [`ChannelPool`].
pub struct ChannelPoolBuilder {
    connector: Arc<dyn ChannelConnector>,
    config: Option<ApiConfig>,
}

impl ChannelPoolBuilder {
    /// Applies a decoded configuration document.
    pub fn api_config(mut self, config: ApiConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Decodes and applies a JSON configuration document. A document that
    /// fails to decode is logged and ignored, leaving the defaults and an
    /// empty method-affinity table in place.
    pub fn api_config_json(self, json: &str) -> Self {
        match ApiConfig::from_json(json) {
            Ok(config) => self.api_config(config),
            Err(error) => {
                warn!(%error, "ignoring unusable pool configuration");
                self
            }
        }
    }

    /// Reads, decodes, and applies a JSON configuration file, with the same
    /// fallback behavior as [`api_config_json`](Self::api_config_json).
    pub fn api_config_file(self, path: impl AsRef<Path>) -> Self {
        match ApiConfig::from_file(&path) {
            Ok(config) => self.api_config(config),
            Err(error) => {
                warn!(
                    path = %path.as_ref().display(),
                    %error,
                    "ignoring unusable pool configuration file"
                );
                self
            }
        }
    }

    /// Creates the pool. The first member channel is created eagerly, so
    /// the pool is never empty. Zero-valued size settings keep their
    /// defaults.
    pub fn build(self) -> ChannelPool {
        let config = self.config.unwrap_or_default();
        let max_size = match config.channel_pool.max_size {
            0 => DEFAULT_MAX_SIZE,
            n => n as usize,
        };
        let streams_low_watermark = match config.channel_pool.max_concurrent_streams_low_watermark {
            0 => DEFAULT_STREAMS_LOW_WATERMARK,
            n => n,
        };
        let first = Arc::new(ChannelRef::new(0, self.connector.connect()));
        ChannelPool {
            inner: Arc::new(PoolInner {
                connector: self.connector,
                channels: Mutex::new(vec![first]),
                affinity: Arc::new(AffinityRegistry::new()),
                method_affinity: config.method_affinity_table(),
                max_size,
                streams_low_watermark,
            }),
        }
    }
}
