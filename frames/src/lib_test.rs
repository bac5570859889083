use super::*;
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;

fn ts(raw: &str) -> OffsetDateTime {
    OffsetDateTime::parse(raw, &Rfc3339).expect("timestamp")
}

#[test]
fn decode_message_event_with_sender_name() {
    let text = r#"{"type":"message","roomId":"r1","messageId":"m1","senderId":"u2","senderName":"Bea","text":"hello","sentAt":"2025-03-01T10:15:30.250Z"}"#;
    let event = decode_server_event(text).expect("decode");
    let ServerEvent::Message(msg) = event else {
        panic!("expected message event");
    };
    assert_eq!(msg.room_id, "r1");
    assert_eq!(msg.message_id, "m1");
    assert_eq!(msg.sender_id, "u2");
    assert_eq!(msg.sender_name.as_deref(), Some("Bea"));
    assert_eq!(msg.text, "hello");
    assert_eq!(msg.sent_at, ts("2025-03-01T10:15:30.250Z"));
}

#[test]
fn decode_message_event_without_sender_name() {
    let text = r#"{"type":"message","roomId":"r1","messageId":"m1","senderId":"u2","text":"hi","sentAt":"2025-03-01T10:15:30Z"}"#;
    let ServerEvent::Message(msg) = decode_server_event(text).expect("decode") else {
        panic!("expected message event");
    };
    assert!(msg.sender_name.is_none());
}

#[test]
fn decode_presence_join_and_leave() {
    let join = r#"{"type":"presence","action":"join","roomId":"r1","userId":"u2","username":"Bea","members":2}"#;
    let leave = r#"{"type":"presence","action":"leave","roomId":"r1","userId":"u2","members":1}"#;

    let ServerEvent::Presence(join) = decode_server_event(join).expect("join") else {
        panic!("expected presence event");
    };
    assert_eq!(join.action, PresenceAction::Join);
    assert_eq!(join.username.as_deref(), Some("Bea"));
    assert_eq!(join.members, 2);

    let ServerEvent::Presence(leave) = decode_server_event(leave).expect("leave") else {
        panic!("expected presence event");
    };
    assert_eq!(leave.action, PresenceAction::Leave);
    assert!(leave.username.is_none());
    assert_eq!(leave.members, 1);
}

#[test]
fn decode_join_ack_uses_hyphenated_tag() {
    let text = r#"{"type":"join-ack","roomId":"r1","userId":"u1","members":1}"#;
    let event = decode_server_event(text).expect("decode");
    assert_eq!(
        event,
        ServerEvent::JoinAck(JoinAckEvent {
            room_id: "r1".to_owned(),
            user_id: "u1".to_owned(),
            username: None,
            members: 1,
        })
    );
}

#[test]
fn decode_error_event() {
    let text = r#"{"type":"error","code":"RATE_LIMITED","message":"slow down"}"#;
    let event = decode_server_event(text).expect("decode");
    assert_eq!(
        event,
        ServerEvent::Error(ErrorEvent { code: "RATE_LIMITED".to_owned(), message: "slow down".to_owned() })
    );
}

#[test]
fn decode_rejects_unknown_type_tag() {
    let err = decode_server_event(r#"{"type":"typing","isTyping":true}"#).expect_err("unknown tag");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn decode_rejects_malformed_json_and_missing_fields() {
    assert!(decode_server_event("not json").is_err());
    assert!(decode_server_event(r#"{"type":"presence","action":"join","roomId":"r1","userId":"u2"}"#).is_err());
    assert!(decode_server_event(r#"{"type":"presence","action":"wave","roomId":"r1","userId":"u2","members":1}"#).is_err());
}

fn sent_at_of(raw: &str) -> OffsetDateTime {
    let text = format!(
        r#"{{"type":"message","roomId":"r1","messageId":"m1","senderId":"u2","text":"hi","sentAt":"{raw}"}}"#
    );
    let ServerEvent::Message(msg) = decode_server_event(&text).expect("decode") else {
        panic!("expected message event");
    };
    msg.sent_at
}

#[test]
fn decode_accepts_naive_iso8601_sent_at_as_utc() {
    assert_eq!(sent_at_of("2025-03-01T10:15:30.123456"), ts("2025-03-01T10:15:30.123456Z"));
    assert_eq!(sent_at_of("2025-03-01T10:15:30"), ts("2025-03-01T10:15:30Z"));
}

#[test]
fn decode_accepts_offset_forms_of_sent_at() {
    assert_eq!(sent_at_of("2025-03-01T11:15:30+01:00"), ts("2025-03-01T10:15:30Z"));
    assert_eq!(sent_at_of("2025-03-01T10:15:30.5+00:00"), ts("2025-03-01T10:15:30.5Z"));
}

#[test]
fn encode_writes_sent_at_as_rfc3339() {
    let event = ServerEvent::Message(MessageEvent {
        room_id: "r1".to_owned(),
        message_id: "m1".to_owned(),
        sender_id: "u2".to_owned(),
        sender_name: None,
        text: "hi".to_owned(),
        sent_at: sent_at_of("2025-03-01T10:15:30"),
    });
    let value: Value = serde_json::from_str(&encode_server_event(&event)).expect("json");
    assert_eq!(value["sentAt"], "2025-03-01T10:15:30Z");
}

#[test]
fn decode_rejects_unparseable_sent_at() {
    let text = r#"{"type":"message","roomId":"r1","messageId":"m1","senderId":"u2","text":"hi","sentAt":"yesterday"}"#;
    assert!(decode_server_event(text).is_err());
}

#[test]
fn encode_client_message_matches_wire_shape() {
    let event = ClientEvent::Message { message_id: "msg_1_abc".to_owned(), text: "hello".to_owned() };
    let value: Value = serde_json::from_str(&encode_client_event(&event)).expect("json");
    assert_eq!(value, json!({"type": "message", "messageId": "msg_1_abc", "text": "hello"}));
}

#[test]
fn encode_client_typing_matches_wire_shape() {
    let value: Value =
        serde_json::from_str(&encode_client_event(&ClientEvent::Typing { is_typing: true })).expect("json");
    assert_eq!(value, json!({"type": "typing", "isTyping": true}));
}

#[test]
fn encode_server_event_omits_absent_optional_fields() {
    let event = ServerEvent::Presence(PresenceEvent {
        action: PresenceAction::Leave,
        room_id: "r1".to_owned(),
        user_id: "u2".to_owned(),
        username: None,
        members: 3,
    });
    let value: Value = serde_json::from_str(&encode_server_event(&event)).expect("json");
    assert_eq!(
        value,
        json!({"type": "presence", "action": "leave", "roomId": "r1", "userId": "u2", "members": 3})
    );
}

#[test]
fn encoded_server_message_decodes_back() {
    let event = ServerEvent::Message(MessageEvent {
        room_id: "r1".to_owned(),
        message_id: "m9".to_owned(),
        sender_id: "u1".to_owned(),
        sender_name: Some("Ann".to_owned()),
        text: "ping".to_owned(),
        sent_at: ts("2025-03-01T10:15:30Z"),
    });
    let decoded = decode_server_event(&encode_server_event(&event)).expect("decode");
    assert_eq!(decoded, event);
}

#[test]
fn decode_client_event_reads_typing_frame() {
    let event = decode_client_event(r#"{"type":"typing","isTyping":false}"#).expect("decode");
    assert_eq!(event, ClientEvent::Typing { is_typing: false });
}

#[test]
fn close_codes_match_websocket_registry() {
    assert_eq!(CLOSE_NORMAL, 1000);
    assert_eq!(CLOSE_NO_STATUS, 1005);
    assert_eq!(CLOSE_ABNORMAL, 1006);
}
