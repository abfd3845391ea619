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

use prost_reflect::DynamicMessage;

/// Extracts the affinity key at `key_path` from `message`.
///
/// `key_path` is a dotted field path such as `"transaction.session"`: every
/// segment but the last must name a message-typed field, and the last must
/// name a string-typed field. Lookup is descriptor-driven, so at most one
/// field can match each segment.
///
/// Returns `None` when a segment does not name a field, an intermediate
/// field is not a message, the leaf is not a string, or the leaf is unset
/// (the empty string counts as absent).
pub(crate) fn extract_affinity_key(message: &DynamicMessage, key_path: &str) -> Option<String> {
    let (head, rest) = match key_path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (key_path, None),
    };
    let value = message.get_field_by_name(head)?;
    match rest {
        None => value
            .as_str()
            .filter(|key| !key.is_empty())
            .map(str::to_owned),
        Some(rest) => extract_affinity_key(value.as_message()?, rest),
    }
}
