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

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::transport::ManagedChannel;

/// One member channel of the pool.
///
/// Tracks how many calls are currently in flight on the channel and how many
/// affinity keys are bound to it. The id is assigned at creation and
/// identifies the member regardless of its position in the pool's list,
/// which is re-sorted during selection.
pub(crate) struct ChannelRef {
    channel: Arc<dyn ManagedChannel>,
    id: u32,
    active_streams: AtomicU32,
    affinity_count: AtomicU32,
}

impl ChannelRef {
    pub(crate) fn new(id: u32, channel: Arc<dyn ManagedChannel>) -> Self {
        Self {
            channel,
            id,
            active_streams: AtomicU32::new(0),
            affinity_count: AtomicU32::new(0),
        }
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn channel(&self) -> &Arc<dyn ManagedChannel> {
        &self.channel
    }

    /// Number of calls currently in flight on this channel.
    pub(crate) fn active_streams(&self) -> u32 {
        self.active_streams.load(Ordering::Relaxed)
    }

    /// Number of affinity keys currently bound to this channel.
    pub(crate) fn affinity_count(&self) -> u32 {
        self.affinity_count.load(Ordering::Relaxed)
    }

    pub(crate) fn incr_streams(&self) {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturating: a counter already at zero stays at zero.
    pub(crate) fn decr_streams(&self) {
        let _ = self
            .active_streams
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub(crate) fn incr_affinity(&self) {
        self.affinity_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturating: a counter already at zero stays at zero.
    pub(crate) fn decr_affinity(&self) {
        let _ = self
            .affinity_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    #[cfg(test)]
    pub(crate) fn set_active_streams(&self, n: u32) {
        self.active_streams.store(n, Ordering::Relaxed);
    }
}

impl fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRef")
            .field("id", &self.id)
            .field("active_streams", &self.active_streams())
            .field("affinity_count", &self.affinity_count())
            .finish()
    }
}
