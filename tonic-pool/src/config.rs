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

//! Pool configuration, usually provided as a JSON document:
//!
//! ```json
//! {
//!   "channelPool": {
//!     "maxSize": 10,
//!     "maxConcurrentStreamsLowWatermark": 100
//!   },
//!   "method": [
//!     {
//!       "name": ["example.sessions.v1.Sessions/CreateSession"],
//!       "affinity": { "affinityKey": "name", "command": "BIND" }
//!     }
//!   ]
//! }
//! ```
//!
//! Unknown fields are ignored and absent fields take their defaults, so a
//! document produced for a newer release still decodes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::Error;

/// Top-level configuration document for a pool.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiConfig {
    /// Size limits for the pool itself.
    pub channel_pool: ChannelPoolConfig,
    /// Affinity declarations, one entry per group of methods.
    pub method: Vec<MethodConfig>,
}

impl ApiConfig {
    /// Decodes a configuration document from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and decodes a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Flattens the method entries into a lookup table keyed by full method
    /// name. Entries without an affinity setting contribute nothing.
    pub(crate) fn method_affinity_table(&self) -> HashMap<String, AffinityConfig> {
        let mut table = HashMap::new();
        for method in &self.method {
            let Some(affinity) = &method.affinity else {
                continue;
            };
            for name in &method.name {
                table.insert(name.clone(), affinity.clone());
            }
        }
        table
    }
}

/// Size limits for the pool. A zero value means "use the default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelPoolConfig {
    /// Capacity cap for the pool.
    pub max_size: u32,
    /// Per-channel active-stream threshold above which the pool prefers to
    /// grow rather than pile more calls onto one channel.
    pub max_concurrent_streams_low_watermark: u32,
}

/// Affinity declaration for a group of methods.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MethodConfig {
    /// Full method names this entry applies to,
    /// `"package.Service/Method"`.
    pub name: Vec<String>,
    /// How calls to these methods participate in affinity routing. Entries
    /// without one are ignored.
    pub affinity: Option<AffinityConfig>,
}

/// How calls to a method participate in affinity routing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AffinityConfig {
    /// Dotted path to the key field inside the request or response message,
    /// e.g. `"transaction.session"`.
    pub affinity_key: String,
    /// What to do with the key.
    pub command: AffinityCommand,
}

/// The binding command of an affinity-configured method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum AffinityCommand {
    /// Route by the key extracted from the request; the binding stays in
    /// place.
    #[default]
    #[serde(rename = "BOUND")]
    Bound,
    /// Route without a key and establish a binding from the key extracted
    /// from each successful response message.
    #[serde(rename = "BIND")]
    Bind,
    /// Route by the key extracted from the request and release the binding
    /// once the call finishes.
    #[serde(rename = "UNBIND")]
    Unbind,
}
