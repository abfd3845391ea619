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

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_core::Stream;
use prost_reflect::DynamicMessage;
use tokio_stream::StreamExt;
use tonic::{IntoRequest, Request, Response, Status};

use crate::affinity::AffinityRegistry;
use crate::channel_ref::ChannelRef;
use crate::config::AffinityCommand;
use crate::key::extract_affinity_key;
use crate::pool::ChannelPool;
use crate::transport::{BoxMessageStream, ManagedChannel};

impl ChannelPool {
    /// Performs one call through the pool.
    ///
    /// The channel is selected according to the method's affinity
    /// configuration: methods without one use the least-loaded member,
    /// `BOUND` and `UNBIND` methods route by the key extracted from the
    /// request, and `BIND` methods route unkeyed and establish a binding
    /// from the key extracted from each successful response message. A
    /// request whose key field is absent runs unkeyed for that call.
    ///
    /// The returned stream owns the call's bookkeeping: dropping it before
    /// the end of the stream counts as the call's terminal event, so
    /// cancellation still decrements the member's stream count and still
    /// performs a configured unbind.
    pub async fn call(
        &self,
        method: &str,
        request: impl IntoRequest<DynamicMessage>,
    ) -> Result<Response<PooledStream>, Status> {
        let request = request.into_request();
        let mut unbind_key = None;
        let mut bind_path = None;
        let member = match self.inner.method_affinity.get(method) {
            None => self.inner.pick(None),
            Some(config) => match config.command {
                AffinityCommand::Bound => {
                    let key = request_key(&request, &config.affinity_key);
                    self.inner.pick(key.as_deref())
                }
                AffinityCommand::Unbind => {
                    let key = request_key(&request, &config.affinity_key);
                    let picked = self.inner.pick(key.as_deref());
                    unbind_key = key;
                    picked
                }
                AffinityCommand::Bind => {
                    bind_path = Some(config.affinity_key.clone());
                    self.inner.pick(None)
                }
            },
        };

        member.incr_streams();
        // The guard settles the call whichever way it ends: stream drained,
        // dispatch failure, or cancellation.
        let guard = CallGuard {
            member: member.clone(),
            affinity: self.inner.affinity.clone(),
            unbind_key,
        };

        let response = member.channel().call(method, request).await?;
        let (metadata, stream, extensions) = response.into_parts();
        let stream = PooledStream {
            inner: stream,
            bind_path,
            guard,
        };
        Ok(Response::from_parts(metadata, stream, extensions))
    }

    /// Performs a unary call through the pool, resolving to the single
    /// response message.
    pub async fn unary(
        &self,
        method: &str,
        request: impl IntoRequest<DynamicMessage>,
    ) -> Result<Response<DynamicMessage>, Status> {
        let (metadata, mut stream, extensions) = self.call(method, request).await?.into_parts();
        match stream.next().await {
            Some(Ok(message)) => Ok(Response::from_parts(metadata, message, extensions)),
            Some(Err(status)) => Err(status),
            None => Err(Status::internal(
                "response stream ended without a message",
            )),
        }
    }
}

fn request_key(request: &Request<DynamicMessage>, key_path: &str) -> Option<String> {
    extract_affinity_key(request.get_ref(), key_path)
}

/// Response stream of a pooled call.
///
/// Yields the underlying channel's response messages unchanged. When the
/// stream is dropped, drained or not, the member's active-stream count is
/// decremented and a configured unbind runs.
pub struct PooledStream {
    inner: BoxMessageStream,
    bind_path: Option<String>,
    guard: CallGuard,
}

impl Stream for PooledStream {
    type Item = Result<DynamicMessage, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = ready!(this.inner.as_mut().poll_next(cx));
        if let (Some(Ok(message)), Some(bind_path)) = (&item, &this.bind_path) {
            if let Some(key) = extract_affinity_key(message, bind_path) {
                this.guard.affinity.bind(&this.guard.member, &key);
            }
        }
        Poll::Ready(item)
    }
}

struct CallGuard {
    member: Arc<ChannelRef>,
    affinity: Arc<AffinityRegistry>,
    unbind_key: Option<String>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.member.decr_streams();
        if let Some(key) = self.unbind_key.take() {
            self.affinity.unbind(&key);
        }
    }
}
