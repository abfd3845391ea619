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
use std::sync::Arc;

use parking_lot::Mutex;

use crate::channel_ref::ChannelRef;

/// Maps affinity keys to the pool member that owns them.
///
/// The registry has its own lock. The pool's channel-list lock is never
/// held while this one is taken, and vice versa; the only shared state is
/// each member's affinity counter, which is touched exclusively under this
/// lock.
pub(crate) struct AffinityRegistry {
    by_key: Mutex<HashMap<String, Arc<ChannelRef>>>,
}

impl AffinityRegistry {
    pub(crate) fn new() -> Self {
        Self {
            by_key: Mutex::new(HashMap::new()),
        }
    }

    /// The channel `key` is bound to, if any.
    pub(crate) fn lookup(&self, key: &str) -> Option<Arc<ChannelRef>> {
        self.by_key.lock().get(key).cloned()
    }

    /// Binds `key` to `channel_ref` and counts one more holder of the key.
    ///
    /// The first binding wins: re-binding an existing key keeps the original
    /// channel and only increments that channel's affinity count.
    pub(crate) fn bind(&self, channel_ref: &Arc<ChannelRef>, key: &str) {
        if key.is_empty() {
            return;
        }
        let mut by_key = self.by_key.lock();
        let bound = by_key
            .entry(key.to_owned())
            .or_insert_with(|| channel_ref.clone());
        bound.incr_affinity();
    }

    /// Releases one holder of `key`.
    ///
    /// When the owning channel's affinity count reaches zero, no logical
    /// holder remains and every key still pointing at that channel is
    /// purged. Unknown keys are ignored, so repeated unbinds are no-ops.
    pub(crate) fn unbind(&self, key: &str) {
        let mut by_key = self.by_key.lock();
        let Some(bound) = by_key.get(key).cloned() else {
            return;
        };
        bound.decr_affinity();
        if bound.affinity_count() == 0 {
            by_key.retain(|_, c| !Arc::ptr_eq(c, &bound));
        }
    }

    /// Number of keys currently bound.
    pub(crate) fn len(&self) -> usize {
        self.by_key.lock().len()
    }
}
