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

//! End-to-end affinity routing over the in-memory transport, via the public
//! API only.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prost_reflect::{DescriptorPool, DynamicMessage, Value};
use prost_types::{
    field_descriptor_proto, DescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    FileDescriptorSet,
};
use tonic::Status;
use tonic_pool::inmemory::InMemoryConnector;
use tonic_pool::{ChannelPool, ConnectivityState};

const CREATE_METHOD: &str = "example.sessions.v1.Sessions/CreateSession";
const GET_METHOD: &str = "example.sessions.v1.Sessions/GetSession";
const DELETE_METHOD: &str = "example.sessions.v1.Sessions/DeleteSession";

const API_CONFIG: &str = r#"{
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

fn string_field(name: &str, number: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_owned()),
        number: Some(number),
        label: Some(field_descriptor_proto::Label::Optional as i32),
        r#type: Some(field_descriptor_proto::Type::String as i32),
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

fn descriptor_pool() -> DescriptorPool {
    let file = FileDescriptorProto {
        name: Some("example_sessions.proto".to_owned()),
        package: Some("example.sessions.v1".to_owned()),
        syntax: Some("proto3".to_owned()),
        message_type: vec![
            message("Session", vec![string_field("name", 1)]),
            message("CreateSessionRequest", vec![]),
            message("GetSessionRequest", vec![string_field("name", 1)]),
            message("DeleteSessionRequest", vec![string_field("name", 1)]),
        ],
        ..Default::default()
    };
    DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] })
        .expect("test descriptors are valid")
}

fn new_message(pool: &DescriptorPool, type_name: &str) -> DynamicMessage {
    DynamicMessage::new(pool.get_message_by_name(type_name).expect("registered"))
}

fn named_message(pool: &DescriptorPool, type_name: &str, name: &str) -> DynamicMessage {
    let mut message = new_message(pool, type_name);
    message.set_field_by_name("name", Value::String(name.to_owned()));
    message
}

fn name_of(message: &DynamicMessage) -> String {
    message
        .get_field_by_name("name")
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_default()
}

fn session_connector(pool: DescriptorPool) -> InMemoryConnector {
    let next_session = Arc::new(AtomicU32::new(0));
    InMemoryConnector::new("sessions.example.com", move |method, request| {
        match method {
            CREATE_METHOD => {
                let n = next_session.fetch_add(1, Ordering::Relaxed);
                Ok(vec![named_message(
                    &pool,
                    "example.sessions.v1.Session",
                    &format!("sessions/{n}"),
                )])
            }
            GET_METHOD | DELETE_METHOD => Ok(vec![named_message(
                &pool,
                "example.sessions.v1.Session",
                &name_of(&request),
            )]),
            other => Err(Status::unimplemented(other.to_owned())),
        }
    })
}

#[tokio::test]
async fn session_calls_stick_to_one_channel_until_released() {
    let descriptors = descriptor_pool();
    let connector = session_connector(descriptors.clone());
    let pool = ChannelPool::builder(connector.clone())
        .api_config_json(API_CONFIG)
        .build();

    assert_eq!(pool.authority(), "sessions.example.com");
    assert_eq!(pool.number_of_channels(), 1);
    assert_eq!(pool.streams_low_watermark(), 1);
    assert_eq!(pool.state(false), ConnectivityState::Idle);

    // Creating a session binds it to the channel that answered.
    let created = pool
        .unary(
            CREATE_METHOD,
            new_message(&descriptors, "example.sessions.v1.CreateSessionRequest"),
        )
        .await
        .unwrap();
    let session = name_of(created.get_ref());
    assert_eq!(session, "sessions/0");
    assert_eq!(pool.state(false), ConnectivityState::Ready);
    assert_eq!(connector.channels()[0].calls_served(), 1);

    // Two unkeyed calls held open push every member to the low watermark,
    // growing the pool.
    let held_a = pool
        .call(
            GET_METHOD,
            new_message(&descriptors, "example.sessions.v1.GetSessionRequest"),
        )
        .await
        .unwrap();
    let held_b = pool
        .call(
            GET_METHOD,
            new_message(&descriptors, "example.sessions.v1.GetSessionRequest"),
        )
        .await
        .unwrap();
    assert_eq!(pool.number_of_channels(), 2);

    // The bound session keeps landing on its channel even though the
    // unkeyed policy would now grow or spread.
    for _ in 0..3 {
        let got = pool
            .unary(
                GET_METHOD,
                named_message(&descriptors, "example.sessions.v1.GetSessionRequest", &session),
            )
            .await
            .unwrap();
        assert_eq!(name_of(got.get_ref()), session);
    }
    let served_by_bound = connector.channels()[0].calls_served();
    assert_eq!(served_by_bound, 5);

    // Deleting the session releases the binding, so the same key now takes
    // the unkeyed path, which grows a fresh channel instead of returning to
    // the loaded one.
    let _ = pool
        .unary(
            DELETE_METHOD,
            named_message(
                &descriptors,
                "example.sessions.v1.DeleteSessionRequest",
                &session,
            ),
        )
        .await
        .unwrap();
    assert_eq!(connector.channels()[0].calls_served(), 6);

    let _ = pool
        .unary(
            GET_METHOD,
            named_message(&descriptors, "example.sessions.v1.GetSessionRequest", &session),
        )
        .await
        .unwrap();
    assert_eq!(pool.number_of_channels(), 3);
    assert_eq!(connector.channels()[2].calls_served(), 1);

    drop(held_a);
    drop(held_b);

    // The pool shuts down as one unit.
    pool.shutdown();
    assert!(pool.is_shutdown());
    assert!(pool.await_termination(Duration::from_millis(50)).await);
    assert_eq!(pool.state(false), ConnectivityState::Shutdown);

    let status = pool
        .unary(
            CREATE_METHOD,
            new_message(&descriptors, "example.sessions.v1.CreateSessionRequest"),
        )
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unavailable);
}

#[tokio::test]
async fn an_unconfigured_pool_spreads_load_and_never_binds() {
    let descriptors = descriptor_pool();
    let connector = session_connector(descriptors.clone());
    let pool = ChannelPool::builder(connector.clone()).build();

    assert_eq!(pool.max_size(), 10);
    assert_eq!(pool.streams_low_watermark(), 100);

    for _ in 0..20 {
        let created = pool
            .unary(
                CREATE_METHOD,
                new_message(&descriptors, "example.sessions.v1.CreateSessionRequest"),
            )
            .await
            .unwrap();
        assert!(name_of(created.get_ref()).starts_with("sessions/"));
    }

    // Sequential calls never push the single member past the watermark.
    assert_eq!(pool.number_of_channels(), 1);
    assert_eq!(connector.channels()[0].calls_served(), 20);
}
