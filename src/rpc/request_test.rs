use bytes::Bytes;

use super::*;

#[test]
fn test_attachments_clone_is_deep() {
    let attachments = Attachments::new();
    attachments.set("k", "v");

    let cloned = attachments.clone();
    cloned.set("k2", "v2");

    assert_eq!(attachments.len(), 1);
    assert_eq!(cloned.get("k").as_deref(), Some("v"));
    assert_eq!(cloned.len(), 2);
}

#[test]
fn test_process_deserializable_passthrough() {
    let mut request = RpcRequest::new("foo", 1);
    request.body = RequestBody::Proxy {
        header: Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n"),
        body: Bytes::new(),
    };

    request
        .process_deserializable(None, DeserializeMode::Proxy)
        .expect("already-materialized body should pass through");
    assert!(matches!(request.body, RequestBody::Proxy { .. }));
}

#[test]
fn test_process_deserializable_without_serialization() {
    let mut request = RpcRequest::new("foo", 1);
    request.body = RequestBody::Serialized(Bytes::from_static(b"blob"));

    let err = request
        .process_deserializable(None, DeserializeMode::Rewrite)
        .expect_err("serialized body without a hook must fail");
    assert!(err.to_string().contains("no serialization configured"));
}

#[test]
fn test_process_deserializable_proxy_mode() {
    let mut serialization = MockSerialization::new();
    serialization.expect_deserialize_proxy().returning(|_| {
        Ok((
            Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n"),
            Bytes::from_static(b"payload"),
        ))
    });

    let mut request = RpcRequest::new("foo", 7);
    request.body = RequestBody::Serialized(Bytes::from_static(b"wire"));
    request
        .process_deserializable(Some(&serialization), DeserializeMode::Proxy)
        .expect("should materialize");

    match &request.body {
        RequestBody::Proxy { header, body } => {
            assert!(header.starts_with(b"GET"));
            assert_eq!(body.as_ref(), b"payload");
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn test_process_deserializable_rewrite_mode_fills_arguments() {
    let mut serialization = MockSerialization::new();
    serialization
        .expect_deserialize_value()
        .returning(|_| Ok(Argument::Str("hello".to_string())));

    let mut request = RpcRequest::new("foo", 7);
    request.body = RequestBody::Serialized(Bytes::from_static(b"wire"));
    request
        .process_deserializable(Some(&serialization), DeserializeMode::Rewrite)
        .expect("should materialize");

    assert_eq!(request.arguments, vec![Argument::Str("hello".to_string())]);
}
