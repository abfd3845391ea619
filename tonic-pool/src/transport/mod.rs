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

//! Seams between the pool and the transport layer.
//!
//! The pool never dials, frames, or encrypts anything itself. It talks to
//! transport channels through [`ManagedChannel`] and obtains new ones from a
//! [`ChannelConnector`]. The `transport` feature provides an implementation
//! over `tonic::transport::Channel`; [`crate::inmemory`] provides an
//! in-process one.

use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use prost_reflect::DynamicMessage;
use ::tonic::{async_trait, Request, Response, Status};

#[cfg(feature = "transport")]
pub mod tonic;

/// A boxed stream of decoded response messages: one message for a unary
/// call, any number for a server-streaming call.
pub type BoxMessageStream = Pin<Box<dyn Stream<Item = Result<DynamicMessage, Status>> + Send>>;

/// A representation of the current state of a transport channel, also used
/// for the aggregate state the pool reports.
///
/// A channel begins in the Idle state. When a call is attempted, the
/// channel transitions to Connecting, then to Ready once connections to the
/// backend are available, or to TransientFailure when calls would fail for
/// lack of one. A channel that has been shut down reports Shutdown.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

impl Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Idle => write!(f, "Idle"),
            ConnectivityState::Connecting => write!(f, "Connecting"),
            ConnectivityState::Ready => write!(f, "Ready"),
            ConnectivityState::TransientFailure => write!(f, "TransientFailure"),
            ConnectivityState::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// One long-lived transport connection to the remote service.
///
/// The pool owns a bounded set of these, routes calls onto them, and
/// aggregates their lifecycle and connectivity state. A channel multiplexes
/// many concurrent calls; the pool never assumes exclusive access to one.
#[async_trait]
pub trait ManagedChannel: Send + Sync {
    /// Performs one call. `method` is the full gRPC method name,
    /// `"package.Service/Method"`.
    async fn call(
        &self,
        method: &str,
        request: Request<DynamicMessage>,
    ) -> Result<Response<BoxMessageStream>, Status>;

    /// The authority this channel connects to.
    fn authority(&self) -> String;

    /// Reports the channel's connectivity state. When `request_connection`
    /// is true, an Idle channel should begin connecting.
    fn state(&self, request_connection: bool) -> ConnectivityState;

    /// Begins an orderly shutdown: new calls are refused, calls already in
    /// flight are allowed to finish. Idempotent.
    fn shutdown(&self);

    /// Begins a forceful shutdown, abandoning in-flight work where the
    /// transport allows it. Idempotent.
    fn shutdown_now(&self);

    /// Whether a shutdown has begun.
    fn is_shutdown(&self) -> bool;

    /// Whether shutdown has completed and all resources are released.
    fn is_terminated(&self) -> bool;

    /// Waits up to `timeout` for the channel to terminate and reports
    /// whether it did.
    async fn await_termination(&self, timeout: Duration) -> bool;
}

/// Creates transport channels for the pool on demand.
///
/// Construction must not block: implementations hand back a channel that
/// connects lazily, in the manner of `Endpoint::connect_lazy`.
pub trait ChannelConnector: Send + Sync {
    fn connect(&self) -> Arc<dyn ManagedChannel>;
}
