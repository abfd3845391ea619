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

//! An in-process transport for tests and examples.
//!
//! Calls are answered synchronously by a handler closure. The connector
//! keeps a handle to every channel it creates so tests can inspect served
//! call counts and steer connectivity states.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use prost_reflect::DynamicMessage;
use tokio::sync::Notify;
use tonic::{async_trait, Request, Response, Status};

use crate::transport::{BoxMessageStream, ChannelConnector, ConnectivityState, ManagedChannel};

/// Produces the response messages for one in-memory call.
pub type Handler =
    dyn Fn(&str, DynamicMessage) -> Result<Vec<DynamicMessage>, Status> + Send + Sync;

/// A [`ManagedChannel`] served entirely in process.
pub struct InMemoryChannel {
    authority: String,
    handler: Arc<Handler>,
    state: Mutex<ConnectivityState>,
    shut_down: AtomicBool,
    terminated: AtomicBool,
    terminated_notify: Notify,
    calls_served: AtomicU64,
}

impl InMemoryChannel {
    pub fn new<F>(authority: impl Into<String>, handler: F) -> Arc<Self>
    where
        F: Fn(&str, DynamicMessage) -> Result<Vec<DynamicMessage>, Status> + Send + Sync + 'static,
    {
        Arc::new(Self::with_handler(authority.into(), Arc::new(handler)))
    }

    fn with_handler(authority: String, handler: Arc<Handler>) -> Self {
        Self {
            authority,
            handler,
            state: Mutex::new(ConnectivityState::Idle),
            shut_down: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            terminated_notify: Notify::new(),
            calls_served: AtomicU64::new(0),
        }
    }

    /// Overrides the reported connectivity state.
    pub fn set_state(&self, state: ConnectivityState) {
        *self.state.lock() = state;
    }

    /// Number of calls this channel has answered.
    pub fn calls_served(&self) -> u64 {
        self.calls_served.load(Ordering::Relaxed)
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.terminated_notify.notify_waiters();
    }
}

#[async_trait]
impl ManagedChannel for InMemoryChannel {
    async fn call(
        &self,
        method: &str,
        request: Request<DynamicMessage>,
    ) -> Result<Response<BoxMessageStream>, Status> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Status::unavailable("channel has been shut down"));
        }
        *self.state.lock() = ConnectivityState::Ready;
        self.calls_served.fetch_add(1, Ordering::Relaxed);
        let responses = (self.handler)(method, request.into_inner())?;
        let stream = tokio_stream::iter(responses.into_iter().map(Ok::<_, Status>));
        Ok(Response::new(Box::pin(stream) as BoxMessageStream))
    }

    fn authority(&self) -> String {
        self.authority.clone()
    }

    fn state(&self, request_connection: bool) -> ConnectivityState {
        if self.shut_down.load(Ordering::SeqCst) {
            return ConnectivityState::Shutdown;
        }
        let mut state = self.state.lock();
        if request_connection && *state == ConnectivityState::Idle {
            *state = ConnectivityState::Connecting;
        }
        *state
    }

    fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            // Nothing is ever pending in process, so shutdown terminates
            // immediately.
            self.terminate();
        }
    }

    fn shutdown_now(&self) {
        self.shutdown();
    }

    fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    async fn await_termination(&self, timeout: Duration) -> bool {
        let notified = self.terminated_notify.notified();
        if self.is_terminated() {
            return true;
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.is_terminated()
    }
}

/// A [`ChannelConnector`] that mints [`InMemoryChannel`]s sharing one
/// handler.
///
/// Cloning the connector shares its channel list, so a test can keep a
/// clone and inspect the channels a pool created from the original.
#[derive(Clone)]
pub struct InMemoryConnector {
    authority: String,
    handler: Arc<Handler>,
    channels: Arc<Mutex<Vec<Arc<InMemoryChannel>>>>,
}

impl InMemoryConnector {
    pub fn new<F>(authority: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str, DynamicMessage) -> Result<Vec<DynamicMessage>, Status> + Send + Sync + 'static,
    {
        Self {
            authority: authority.into(),
            handler: Arc::new(handler),
            channels: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every channel this connector has created, in creation order.
    pub fn channels(&self) -> Vec<Arc<InMemoryChannel>> {
        self.channels.lock().clone()
    }
}

impl ChannelConnector for InMemoryConnector {
    fn connect(&self) -> Arc<dyn ManagedChannel> {
        let channel = Arc::new(InMemoryChannel::with_handler(
            self.authority.clone(),
            self.handler.clone(),
        ));
        self.channels.lock().push(channel.clone());
        channel
    }
}
