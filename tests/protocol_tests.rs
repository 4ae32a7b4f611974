#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol serialization tests for session-join.
//!
//! Verifies the JSON shapes exchanged with the credential authority, handed to
//! the communication channel, and received from matchmaking, against fixtures
//! that match real service payloads.

use serde_json::json;
use session_join::protocol::{
    ChannelOpenRequest, CredentialRequest, CredentialResponse, Feature, MatchmakingClientMessage,
    MatchmakingServerMessage, Profile, Role, DEFAULT_FEATURES,
};
use tokio_test::{assert_err, assert_ok};

// ════════════════════════════════════════════════════════════════════
// Credential authority
// ════════════════════════════════════════════════════════════════════

#[test]
fn credential_request_uses_camel_case_and_integer_role() {
    let request = CredentialRequest {
        session_name: "room1".into(),
        role: Role::Host,
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value, json!({ "sessionName": "room1", "role": 1 }));
}

#[test]
fn credential_request_attendee_fixture() {
    let request: CredentialRequest =
        assert_ok!(serde_json::from_str(r#"{"sessionName":"lobby-7","role":0}"#));
    assert_eq!(request.session_name, "lobby-7");
    assert_eq!(request.role, Role::Attendee);
}

#[test]
fn credential_request_rejects_unknown_role() {
    assert_err!(serde_json::from_str::<CredentialRequest>(
        r#"{"sessionName":"room1","role":2}"#
    ));
}

#[test]
fn credential_response_ignores_extra_fields() {
    let response: CredentialResponse = assert_ok!(serde_json::from_str(
        r#"{"signature":"eyJhbGciOiJIUzI1NiJ9.payload.sig","expiresIn":7200}"#
    ));
    assert_eq!(
        response.signature.as_deref(),
        Some("eyJhbGciOiJIUzI1NiJ9.payload.sig")
    );
}

#[test]
fn credential_response_without_signature_decodes_to_none() {
    let response: CredentialResponse = assert_ok!(serde_json::from_str(r#"{"error":"nope"}"#));
    assert!(response.signature.is_none());
}

// ════════════════════════════════════════════════════════════════════
// Communication channel
// ════════════════════════════════════════════════════════════════════

#[test]
fn channel_open_request_fixture() {
    let request = ChannelOpenRequest {
        credential: "T".into(),
        session_name: "room1".into(),
        user_name: "Ana".into(),
        passcode: String::new(),
        features: DEFAULT_FEATURES.to_vec(),
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(
        value,
        json!({
            "credential": "T",
            "sessionName": "room1",
            "userName": "Ana",
            "passcode": "",
            "features": ["video", "audio"],
        })
    );
}

#[test]
fn features_are_lowercase() {
    let value = serde_json::to_value([Feature::Video, Feature::Audio, Feature::Share, Feature::Chat])
        .unwrap();
    assert_eq!(value, json!(["video", "audio", "share", "chat"]));
}

// ════════════════════════════════════════════════════════════════════
// Matchmaking
// ════════════════════════════════════════════════════════════════════

#[test]
fn begin_message_fixture() {
    let value = serde_json::to_value(MatchmakingClientMessage::Begin).unwrap();
    assert_eq!(value, json!({ "type": "Begin" }));
}

#[test]
fn participant_joined_fixture() {
    let msg: MatchmakingServerMessage = assert_ok!(serde_json::from_str(
        r#"{"type":"ParticipantJoined","data":{"id":"42","profile":{"name":"Ana"},"is_self":true}}"#
    ));
    assert_eq!(
        msg,
        MatchmakingServerMessage::ParticipantJoined {
            id: Some("42".into()),
            profile: Some(Profile { name: "Ana".into() }),
            is_self: true,
        }
    );
}

#[test]
fn participant_joined_defaults_is_self_to_false() {
    let msg: MatchmakingServerMessage = assert_ok!(serde_json::from_str(
        r#"{"type":"ParticipantJoined","data":{"id":"7","profile":{"name":"Bo"}}}"#
    ));
    assert!(matches!(
        msg,
        MatchmakingServerMessage::ParticipantJoined { is_self: false, .. }
    ));
}

#[test]
fn participant_joined_without_id_still_decodes() {
    let msg: MatchmakingServerMessage = assert_ok!(serde_json::from_str(
        r#"{"type":"ParticipantJoined","data":{"profile":{"name":"Ghost"}}}"#
    ));
    assert_eq!(
        msg,
        MatchmakingServerMessage::ParticipantJoined {
            id: None,
            profile: Some(Profile {
                name: "Ghost".into()
            }),
            is_self: false,
        }
    );
}

#[test]
fn participant_joined_omits_absent_fields() {
    let msg = MatchmakingServerMessage::ParticipantJoined {
        id: Some("p".into()),
        profile: None,
        is_self: false,
    };
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(
        value,
        json!({ "type": "ParticipantJoined", "data": { "id": "p", "is_self": false } })
    );
}

#[test]
fn participant_left_fixture() {
    let msg: MatchmakingServerMessage = assert_ok!(serde_json::from_str(
        r#"{"type":"ParticipantLeft","data":{"id":"42"}}"#
    ));
    assert_eq!(msg, MatchmakingServerMessage::ParticipantLeft { id: "42".into() });
}

#[test]
fn started_and_error_fixtures() {
    let started: MatchmakingServerMessage = assert_ok!(serde_json::from_str(r#"{"type":"Started"}"#));
    assert_eq!(started, MatchmakingServerMessage::Started);

    let error: MatchmakingServerMessage = assert_ok!(serde_json::from_str(
        r#"{"type":"Error","data":{"message":"room full"}}"#
    ));
    assert_eq!(
        error,
        MatchmakingServerMessage::Error {
            message: "room full".into()
        }
    );
}

#[test]
fn unknown_message_type_is_rejected() {
    assert_err!(serde_json::from_str::<MatchmakingServerMessage>(
        r#"{"type":"Teleported","data":{}}"#
    ));
}
