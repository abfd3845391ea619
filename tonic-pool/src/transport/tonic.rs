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

//! Carries pooled calls over [`tonic::transport::Channel`].
//!
//! Methods are resolved against a [`DescriptorPool`], so requests and
//! responses travel as [`DynamicMessage`]s without generated code. Dialing,
//! TLS, and HTTP/2 are tonic's concern; channels connect lazily on first
//! use.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use http::uri::PathAndQuery;
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, MethodDescriptor};
use tokio::sync::Notify;
use tonic::client::Grpc;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::transport::{Channel, Endpoint};
use tonic::{async_trait, Request, Response, Status, Streaming};

use crate::transport::{BoxMessageStream, ChannelConnector, ConnectivityState, ManagedChannel};

/// A pooled transport channel backed by [`tonic::transport::Channel`].
pub struct TonicChannel {
    channel: Channel,
    descriptors: DescriptorPool,
    authority: String,
    ready_seen: AtomicBool,
    lifecycle: Arc<Lifecycle>,
}

impl TonicChannel {
    /// Wraps an existing transport channel. `descriptors` must contain the
    /// services that calls will name.
    pub fn new(channel: Channel, authority: String, descriptors: DescriptorPool) -> Self {
        Self {
            channel,
            descriptors,
            authority,
            ready_seen: AtomicBool::new(false),
            lifecycle: Arc::new(Lifecycle {
                shut_down: AtomicBool::new(false),
                in_flight: AtomicU32::new(0),
                terminated_notify: Notify::new(),
            }),
        }
    }

    fn resolve_method(&self, method: &str) -> Result<MethodDescriptor, Status> {
        let method = method.trim_start_matches('/');
        let (service_name, method_name) = method
            .split_once('/')
            .ok_or_else(|| Status::internal(format!("malformed method name {method:?}")))?;
        let service = self
            .descriptors
            .get_service_by_name(service_name)
            .ok_or_else(|| Status::unimplemented(format!("unknown service {service_name:?}")))?;
        service
            .methods()
            .find(|m| m.name() == method_name)
            .ok_or_else(|| Status::unimplemented(format!("unknown method {method:?}")))
    }
}

#[async_trait]
impl ManagedChannel for TonicChannel {
    async fn call(
        &self,
        method: &str,
        request: Request<DynamicMessage>,
    ) -> Result<Response<BoxMessageStream>, Status> {
        if self.lifecycle.shut_down.load(Ordering::SeqCst) {
            return Err(Status::unavailable("channel has been shut down"));
        }
        let descriptor = self.resolve_method(method)?;
        let path = PathAndQuery::from_maybe_shared(format!("/{}", method.trim_start_matches('/')))
            .map_err(|e| Status::internal(format!("invalid method name {method:?}: {e}")))?;
        let codec = DynamicCodec::new(descriptor.output());

        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("channel was not ready: {e}")))?;
        self.ready_seen.store(true, Ordering::Relaxed);

        let guard = self.lifecycle.begin_call();
        if descriptor.is_server_streaming() {
            let response = grpc.server_streaming(request, path, codec).await?;
            let (metadata, stream, extensions) = response.into_parts();
            let stream = TrackedStream {
                inner: stream,
                _guard: guard,
            };
            Ok(Response::from_parts(
                metadata,
                Box::pin(stream) as BoxMessageStream,
                extensions,
            ))
        } else {
            let response = grpc.unary(request, path, codec).await;
            drop(guard);
            let (metadata, message, extensions) = response?.into_parts();
            Ok(Response::from_parts(
                metadata,
                Box::pin(tokio_stream::once(Ok(message))) as BoxMessageStream,
                extensions,
            ))
        }
    }

    fn authority(&self) -> String {
        self.authority.clone()
    }

    // `request_connection` is ignored: the underlying channel connects on
    // first use and exposes no probe to trigger it early.
    fn state(&self, _request_connection: bool) -> ConnectivityState {
        if self.lifecycle.shut_down.load(Ordering::SeqCst) {
            ConnectivityState::Shutdown
        } else if self.ready_seen.load(Ordering::Relaxed) {
            ConnectivityState::Ready
        } else {
            ConnectivityState::Idle
        }
    }

    fn shutdown(&self) {
        self.lifecycle.shut_down.store(true, Ordering::SeqCst);
        if self.lifecycle.in_flight.load(Ordering::SeqCst) == 0 {
            self.lifecycle.terminated_notify.notify_waiters();
        }
    }

    // Calls already on the wire cannot be aborted from here; they drain as
    // in an orderly shutdown.
    fn shutdown_now(&self) {
        self.shutdown();
    }

    fn is_shutdown(&self) -> bool {
        self.lifecycle.shut_down.load(Ordering::SeqCst)
    }

    fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.lifecycle.in_flight.load(Ordering::SeqCst) == 0
    }

    async fn await_termination(&self, timeout: Duration) -> bool {
        let notified = self.lifecycle.terminated_notify.notified();
        if self.is_terminated() {
            return true;
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.is_terminated()
    }
}

struct Lifecycle {
    shut_down: AtomicBool,
    in_flight: AtomicU32,
    terminated_notify: Notify,
}

impl Lifecycle {
    fn begin_call(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            lifecycle: self.clone(),
        }
    }
}

struct InFlightGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.lifecycle.in_flight.fetch_sub(1, Ordering::SeqCst) == 1
            && self.lifecycle.shut_down.load(Ordering::SeqCst)
        {
            self.lifecycle.terminated_notify.notify_waiters();
        }
    }
}

/// Keeps the owning channel's in-flight count up while a server stream is
/// being consumed.
struct TrackedStream {
    inner: Streaming<DynamicMessage>,
    _guard: InFlightGuard,
}

impl futures_core::Stream for TrackedStream {
    type Item = Result<DynamicMessage, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Mints lazily-connecting [`TonicChannel`]s from one endpoint.
#[derive(Clone)]
pub struct TonicConnector {
    endpoint: Endpoint,
    descriptors: DescriptorPool,
}

impl TonicConnector {
    pub fn new(endpoint: Endpoint, descriptors: DescriptorPool) -> Self {
        Self {
            endpoint,
            descriptors,
        }
    }
}

impl ChannelConnector for TonicConnector {
    fn connect(&self) -> Arc<dyn ManagedChannel> {
        let authority = self
            .endpoint
            .uri()
            .authority()
            .map(|authority| authority.to_string())
            .unwrap_or_default();
        Arc::new(TonicChannel::new(
            self.endpoint.connect_lazy(),
            authority,
            self.descriptors.clone(),
        ))
    }
}

/// Encodes requests with their own embedded descriptors and decodes
/// responses with the method's output descriptor.
#[derive(Clone)]
struct DynamicCodec {
    response: MessageDescriptor,
}

impl DynamicCodec {
    fn new(response: MessageDescriptor) -> Self {
        Self { response }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder {
            descriptor: self.response.clone(),
        }
    }
}

struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode(dst)
            .map_err(|e| Status::internal(e.to_string()))
    }
}

struct DynamicDecoder {
    descriptor: MessageDescriptor,
}

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        DynamicMessage::decode(self.descriptor.clone(), src)
            .map(Some)
            .map_err(|e| Status::internal(e.to_string()))
    }
}
