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

//! Shared test fixtures: a descriptor pool for a small session service and
//! helpers to build dynamic messages against it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};

use prost_reflect::{DescriptorPool, DynamicMessage, Value};
use prost_types::{
    field_descriptor_proto, DescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    FileDescriptorSet, MethodDescriptorProto, ServiceDescriptorProto,
};
use tonic::Status;

pub(crate) const CREATE_METHOD: &str = "example.sessions.v1.Sessions/CreateSession";
pub(crate) const GET_METHOD: &str = "example.sessions.v1.Sessions/GetSession";
pub(crate) const DELETE_METHOD: &str = "example.sessions.v1.Sessions/DeleteSession";
pub(crate) const LIST_METHOD: &str = "example.sessions.v1.Sessions/ListFacts";

static POOL: LazyLock<DescriptorPool> = LazyLock::new(|| {
    DescriptorPool::from_file_descriptor_set(FileDescriptorSet {
        file: vec![session_file_descriptor()],
    })
    .expect("test descriptors are valid")
});

pub(crate) fn descriptor_pool() -> DescriptorPool {
    POOL.clone()
}

fn string_field(name: &str, number: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_owned()),
        number: Some(number),
        label: Some(field_descriptor_proto::Label::Optional as i32),
        r#type: Some(field_descriptor_proto::Type::String as i32),
        ..Default::default()
    }
}

fn int32_field(name: &str, number: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_owned()),
        number: Some(number),
        label: Some(field_descriptor_proto::Label::Optional as i32),
        r#type: Some(field_descriptor_proto::Type::Int32 as i32),
        ..Default::default()
    }
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_owned()),
        number: Some(number),
        label: Some(field_descriptor_proto::Label::Optional as i32),
        r#type: Some(field_descriptor_proto::Type::Message as i32),
        type_name: Some(type_name.to_owned()),
        ..Default::default()
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_owned()),
        field: fields,
        ..Default::default()
    }
}

fn method(name: &str, input: &str, output: &str, server_streaming: bool) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_owned()),
        input_type: Some(input.to_owned()),
        output_type: Some(output.to_owned()),
        server_streaming: Some(server_streaming),
        ..Default::default()
    }
}

fn session_file_descriptor() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("example_sessions.proto".to_owned()),
        package: Some("example.sessions.v1".to_owned()),
        syntax: Some("proto3".to_owned()),
        message_type: vec![
            message("Session", vec![string_field("name", 1)]),
            message("CreateSessionRequest", vec![]),
            message("GetSessionRequest", vec![string_field("name", 1)]),
            message("DeleteSessionRequest", vec![string_field("name", 1)]),
            message(
                "Probe",
                vec![
                    string_field("session1", 1),
                    message_field("transaction", 2, ".example.sessions.v1.ProbeNested"),
                    int32_field("count", 3),
                ],
            ),
            message("ProbeNested", vec![string_field("session2", 1)]),
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("Sessions".to_owned()),
            method: vec![
                method(
                    "CreateSession",
                    ".example.sessions.v1.CreateSessionRequest",
                    ".example.sessions.v1.Session",
                    false,
                ),
                method(
                    "GetSession",
                    ".example.sessions.v1.GetSessionRequest",
                    ".example.sessions.v1.Session",
                    false,
                ),
                method(
                    "DeleteSession",
                    ".example.sessions.v1.DeleteSessionRequest",
                    ".example.sessions.v1.Session",
                    false,
                ),
                method(
                    "ListFacts",
                    ".example.sessions.v1.GetSessionRequest",
                    ".example.sessions.v1.Session",
                    true,
                ),
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub(crate) fn new_message(type_name: &str) -> DynamicMessage {
    DynamicMessage::new(
        descriptor_pool()
            .get_message_by_name(type_name)
            .expect("message type registered"),
    )
}

/// A `Session` response carrying `name`.
pub(crate) fn session_message(name: &str) -> DynamicMessage {
    let mut message = new_message("example.sessions.v1.Session");
    message.set_field_by_name("name", Value::String(name.to_owned()));
    message
}

/// A request message (`Get`/`Delete` shape) carrying `name`.
pub(crate) fn named_request(type_name: &str, name: &str) -> DynamicMessage {
    let mut message = new_message(type_name);
    message.set_field_by_name("name", Value::String(name.to_owned()));
    message
}

/// A `Probe` message with the optional fields set as requested.
pub(crate) fn probe_message(session1: Option<&str>, session2: Option<&str>) -> DynamicMessage {
    let mut message = new_message("example.sessions.v1.Probe");
    if let Some(session1) = session1 {
        message.set_field_by_name("session1", Value::String(session1.to_owned()));
    }
    if let Some(session2) = session2 {
        let mut nested = new_message("example.sessions.v1.ProbeNested");
        nested.set_field_by_name("session2", Value::String(session2.to_owned()));
        message.set_field_by_name("transaction", Value::Message(nested));
    }
    message.set_field_by_name("count", Value::I32(7));
    message
}

/// A handler implementing the session service: `CreateSession` mints
/// sequentially-named sessions, `GetSession`/`DeleteSession` echo the
/// requested session back.
pub(crate) fn session_handler(
) -> impl Fn(&str, DynamicMessage) -> Result<Vec<DynamicMessage>, Status> + Send + Sync + 'static {
    let next_session = Arc::new(AtomicU32::new(0));
    move |method, request| match method {
        CREATE_METHOD => {
            let n = next_session.fetch_add(1, Ordering::Relaxed);
            Ok(vec![session_message(&format!("sessions/{n}"))])
        }
        GET_METHOD | DELETE_METHOD => {
            let name = request
                .get_field_by_name("name")
                .and_then(|value| value.as_str().map(str::to_owned))
                .unwrap_or_default();
            Ok(vec![session_message(&name)])
        }
        other => Err(Status::unimplemented(other.to_owned())),
    }
}

/// The configuration document used by the affinity tests: session calls
/// bind on create, route by key on get, and release on delete.
pub(crate) const SESSION_API_CONFIG: &str = r#"{
    "channelPool": {
        "maxSize": 10,
        "maxConcurrentStreamsLowWatermark": 1
    },
    "method": [
        {
            "name": ["example.sessions.v1.Sessions/CreateSession"],
            "affinity": { "affinityKey": "name", "command": "BIND" }
        },
        {
            "name": ["example.sessions.v1.Sessions/GetSession"],
            "affinity": { "affinityKey": "name", "command": "BOUND" }
        },
        {
            "name": ["example.sessions.v1.Sessions/DeleteSession"],
            "affinity": { "affinityKey": "name", "command": "UNBIND" }
        }
    ]
}"#;
