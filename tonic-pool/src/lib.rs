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

//! Affinity-based channel pooling for gRPC clients.
//!
//! A [`ChannelPool`] multiplexes calls across a bounded set of transport
//! channels while presenting the lifecycle and connectivity surface of a
//! single channel. Calls that carry an affinity key (a session id, a
//! transaction handle) are pinned to the channel that owns the key, so the
//! server-side resource keeps being served by the same connection. Calls
//! without a key go to the least-loaded channel, and the pool grows lazily
//! up to a configured cap once every channel is running above its stream
//! watermark.
//!
//! Routing is driven by per-method configuration ([`config::ApiConfig`],
//! usually decoded from JSON): each configured method names a dotted field
//! path into its request or response message and one of three commands.
//! `BIND` establishes a binding from each successful response, `BOUND`
//! routes by the request's key, and `UNBIND` routes by the request's key
//! and releases the binding once the call finishes.
//!
//! The pool never dials anything itself. It obtains channels from a
//! [`ChannelConnector`] and talks to them through the [`ManagedChannel`]
//! trait; the `transport` feature provides an implementation over
//! `tonic::transport::Channel`, and [`inmemory`] provides an in-process one
//! for tests.
//!
//! ```no_run
//! use tonic_pool::inmemory::InMemoryConnector;
//! use tonic_pool::ChannelPool;
//!
//! let connector = InMemoryConnector::new("pool.example.com", |_method, request| {
//!     Ok(vec![request])
//! });
//! let pool = ChannelPool::builder(connector)
//!     .api_config_file("pool.json")
//!     .build();
//! assert_eq!(pool.number_of_channels(), 1);
//! ```

mod affinity;
mod call;
mod channel_ref;
mod key;

pub mod config;
pub mod inmemory;
pub mod pool;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

pub use call::PooledStream;
pub use config::{AffinityCommand, AffinityConfig, ApiConfig, ChannelPoolConfig, MethodConfig};
pub use pool::{ChannelPool, ChannelPoolBuilder};
pub use transport::{BoxMessageStream, ChannelConnector, ConnectivityState, ManagedChannel};

/// Errors produced while decoding pool configuration.
///
/// The call path never surfaces this type; call failures are
/// [`tonic::Status`] values propagated from the underlying channels.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration document could not be read.
    #[error("failed to read pool configuration: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration document could not be decoded.
    #[error("failed to decode pool configuration: {0}")]
    Decode(#[from] serde_json::Error),
}
