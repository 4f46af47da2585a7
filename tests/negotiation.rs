//! End-to-end handshake negotiation between a client and a server negotiator.

use rsws_negotiate::protocol::handshake::{
    SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL,
};
use rsws_negotiate::{
    ClientHandshake, CloseCode, Config, Error, Frame, Handshake, Negotiable, Negotiator, OpCode,
    Role, ServerHandshake,
};

/// Run a full handshake and return both connected negotiators.
fn connect(client: &Negotiator, server: &Negotiator) -> (Negotiator, Negotiator, ServerHandshake) {
    let mut client = client.duplicate();
    let mut server = server.duplicate();

    let mut request = ClientHandshake::new("/socket");
    request.put("Host", "localhost");
    client.post_process_request_as_client(&mut request).unwrap();

    server.accept_handshake_as_server(&request).unwrap();
    let mut response = ServerHandshake::default();
    server
        .post_process_response_as_server(&request, &mut response)
        .unwrap();

    client.accept_handshake_as_client(&request, &response).unwrap();
    (client, server, response)
}

fn send(from: &mut Negotiator, to: &mut Negotiator, opcode: OpCode, data: &[u8], chunk: usize) -> Vec<u8> {
    let mut received = Vec::new();
    for mut frame in Frame::fragment(opcode, data, chunk) {
        from.encode_frame(&mut frame).unwrap();
        to.decode_frame(&mut frame).unwrap();
        received.extend_from_slice(frame.payload());
    }
    received
}

#[cfg(feature = "compression")]
#[test]
fn test_deflate_and_protocol_negotiated() {
    let client = Config::client().with_protocols(["v2.chat", "v1.chat"]).negotiator();
    let server = Config::server().with_protocol("v1.chat").negotiator();

    let (mut client, mut server, response) = connect(&client, &server);
    assert_eq!(response.field_value(SEC_WEBSOCKET_EXTENSIONS), "permessage-deflate");
    assert_eq!(response.field_value(SEC_WEBSOCKET_PROTOCOL), "v1.chat");

    assert_eq!(client.role(), Some(Role::Client));
    assert_eq!(server.role(), Some(Role::Server));
    assert_eq!(client.negotiated_extension().unwrap().token(), "permessage-deflate");
    assert_eq!(client.negotiated_protocol().unwrap().token(), "v1.chat");

    let text = "hello from the client ".repeat(100);
    assert_eq!(send(&mut client, &mut server, OpCode::Text, text.as_bytes(), 256), text.as_bytes());
    assert_eq!(send(&mut server, &mut client, OpCode::Binary, &[7u8; 3000], 1000), vec![7u8; 3000]);
}

#[cfg(feature = "compression")]
#[test]
fn test_compressed_frames_are_smaller_and_flagged() {
    let (mut client, _server, _) = connect(&Config::client().negotiator(), &Config::server().negotiator());
    let mut frame = Frame::text("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    client.encode_frame(&mut frame).unwrap();
    assert!(frame.rsv1);
    assert!(frame.payload().len() < 64);
}

#[cfg(feature = "compression")]
#[test]
fn test_no_context_takeover_negotiated_both_ways() {
    use rsws_negotiate::DeflateConfig;

    let client = Config::client()
        .with_deflate(
            DeflateConfig::new()
                .client_no_context_takeover(true)
                .server_no_context_takeover(true),
        )
        .negotiator();
    let server = Config::server().negotiator();

    let (mut client, mut server, response) = connect(&client, &server);
    assert_eq!(
        response.field_value(SEC_WEBSOCKET_EXTENSIONS),
        "permessage-deflate; server_no_context_takeover; client_no_context_takeover"
    );

    for _ in 0..3 {
        let msg = b"repeated message repeated message";
        assert_eq!(send(&mut client, &mut server, OpCode::Text, msg, 10), msg);
        assert_eq!(send(&mut server, &mut client, OpCode::Text, msg, 7), msg);
    }
}

#[test]
fn test_compression_disabled_on_one_side() {
    let client = Config::client().negotiator();
    let server = Config::server().without_compression().negotiator();

    let (mut client, mut server, response) = connect(&client, &server);
    assert!(!response.has_field(SEC_WEBSOCKET_EXTENSIONS));
    assert_eq!(client.negotiated_extension().unwrap().token(), "");

    let mut frame = Frame::binary(vec![1, 2, 3]);
    client.encode_frame(&mut frame).unwrap();
    assert!(!frame.rsv1);
    server.decode_frame(&mut frame).unwrap();
    assert_eq!(frame.payload(), &[1, 2, 3]);

    // without compression any reserved bit is a protocol error
    frame.rsv1 = true;
    let err = server.decode_frame(&mut frame).unwrap_err();
    assert!(matches!(err, Error::InvalidFrame(_)));
    assert_eq!(err.close_code(), Some(CloseCode::ProtocolError));
}

#[test]
fn test_empty_offers_are_omitted() {
    let negotiator = Config::client().without_compression().negotiator();
    let mut request = ClientHandshake::new("/");
    negotiator.post_process_request_as_client(&mut request).unwrap();

    assert!(request.has_field(SEC_WEBSOCKET_KEY));
    assert!(!request.has_field(SEC_WEBSOCKET_EXTENSIONS));
    assert!(!request.has_field(SEC_WEBSOCKET_PROTOCOL));
}

#[test]
fn test_protocol_mismatch_fails_handshake() {
    let client = Config::client().with_protocol("graphql-ws").negotiator();
    let server = Config::server().with_protocol("mqtt").negotiator();

    let mut request = ClientHandshake::new("/");
    client.post_process_request_as_client(&mut request).unwrap();

    let mut server = server.duplicate();
    let err = server.accept_handshake_as_server(&request).unwrap_err();
    assert!(matches!(err, Error::InvalidHandshake(_)));
    assert!(matches!(
        server.negotiated_protocol(),
        Err(Error::IncompleteHandshake(_))
    ));
}

#[cfg(feature = "compression")]
#[test]
fn test_case_insensitive_extension_offer() {
    let mut server = Config::server().negotiator().duplicate();
    let mut request = ClientHandshake::new("/");
    request.put("upgrade", "WebSocket");
    request.put("connection", "upgrade");
    request.put("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==");
    request.put("sec-websocket-version", "13");
    request.put("SEC-WEBSOCKET-EXTENSIONS", "Permessage-Deflate , foo");

    server.accept_handshake_as_server(&request).unwrap();
    assert_eq!(server.negotiated_extension().unwrap().token(), "permessage-deflate");
}

#[cfg(feature = "compression")]
#[test]
fn test_connections_do_not_share_compression_state() {
    let client = Config::client().negotiator();
    let server = Config::server().negotiator();
    let (mut client_a, mut server_a, _) = connect(&client, &server);
    let (mut client_b, mut server_b, _) = connect(&client, &server);

    // warm up connection A's windows only
    let msg = b"state must stay with its own connection";
    send(&mut client_a, &mut server_a, OpCode::Text, msg, 64);

    let mut on_a = Frame::text(msg.to_vec());
    let mut on_b = Frame::text(msg.to_vec());
    client_a.encode_frame(&mut on_a).unwrap();
    client_b.encode_frame(&mut on_b).unwrap();
    assert!(on_a.payload().len() < on_b.payload().len());

    server_a.decode_frame(&mut on_a).unwrap();
    server_b.decode_frame(&mut on_b).unwrap();
    assert_eq!(on_a.payload(), msg);
    assert_eq!(on_b.payload(), msg);
}

#[cfg(feature = "compression")]
#[test]
fn test_limits_cap_decompressed_messages() {
    use rsws_negotiate::Limits;

    let client = Config::client().negotiator();
    let server = Config::server().with_limits(Limits::new(1024, 8192)).negotiator();
    let (mut client, mut server, _) = connect(&client, &server);

    let fits = vec![b'a'; 1024];
    assert_eq!(send(&mut client, &mut server, OpCode::Binary, &fits, 1024), fits);

    let mut frame = Frame::binary(vec![b'a'; 4096]);
    client.encode_frame(&mut frame).unwrap();
    let err = server.decode_frame(&mut frame).unwrap_err();
    assert_eq!(err.close_code(), Some(CloseCode::MessageTooBig));
}
