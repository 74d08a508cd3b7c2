//! ContextStore: session lifecycle, history bounds, expiry, persistence
//! across re-open, atomic document writes.

mod init_logging;

use std::collections::BTreeMap;

use switchboard::context::{ContextStore, InterfaceKind, SessionUpdate};

#[test]
fn created_sessions_are_retrievable_and_touched() {
    let dir = tempfile::tempdir().unwrap();
    let store = ContextStore::open(dir.path(), 30, 50).unwrap();

    let id = store.create_session("alice", InterfaceKind::Web);
    let session = store.get_session(&id).unwrap();
    assert_eq!(session.user_id, "alice");
    assert_eq!(session.interface_type, InterfaceKind::Web);
    assert!(session.command_history.is_empty());

    assert!(store.get_session("sess_nope").is_none());
}

#[test]
fn history_is_bounded_to_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let store = ContextStore::open(dir.path(), 30, 3).unwrap();

    let id = store.create_session("bob", InterfaceKind::Text);
    for i in 0..5 {
        store.add_to_history(&id, &format!("cmd-{}", i), &format!("resp-{}", i));
    }

    let session = store.get_session(&id).unwrap();
    assert_eq!(session.command_history, vec!["cmd-2", "cmd-3", "cmd-4"]);
    assert_eq!(session.response_history, vec!["resp-2", "resp-3", "resp-4"]);
}

#[test]
fn expired_sessions_are_hidden_pruned_and_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    // TTL of zero minutes: every session is immediately inactive.
    let store = ContextStore::open(dir.path(), 0, 50).unwrap();

    let id = store.create_session("carol", InterfaceKind::Voice);
    assert!(store.get_session(&id).is_none());
    assert_eq!(store.active_session_count(), 0);

    let removed = store.cleanup_expired_sessions();
    assert_eq!(removed, 1);
    assert_eq!(store.cleanup_expired_sessions(), 0);

    // Only active sessions are written back.
    let sessions: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("sessions.json")).unwrap(),
    )
    .unwrap();
    assert!(sessions.as_object().unwrap().is_empty());
}

#[test]
fn sessions_and_users_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = ContextStore::open(dir.path(), 30, 50).unwrap();
        store.touch_user("dave");
        let id = store.create_session("dave", InterfaceKind::Mobile);
        store.update_session(
            &id,
            SessionUpdate {
                last_intent: Some("play_music".into()),
                last_parameters: Some(BTreeMap::from([("genre".into(), "jazz".into())])),
                ..SessionUpdate::default()
            },
        );
        id
    };

    let store = ContextStore::open(dir.path(), 30, 50).unwrap();
    let session = store.get_session(&id).unwrap();
    assert_eq!(session.last_intent, "play_music");
    assert_eq!(
        session.last_parameters.get("genre").map(String::as_str),
        Some("jazz")
    );
    let user = store.touch_user("dave");
    assert_eq!(user.preferred_language, "en");
}

#[test]
fn variables_merge_instead_of_replacing() {
    let dir = tempfile::tempdir().unwrap();
    let store = ContextStore::open(dir.path(), 30, 50).unwrap();

    let id = store.create_session("erin", InterfaceKind::Web);
    store.update_session(
        &id,
        SessionUpdate {
            variables: Some(BTreeMap::from([("location".into(), "home".into())])),
            ..SessionUpdate::default()
        },
    );
    store.update_session(
        &id,
        SessionUpdate {
            variables: Some(BTreeMap::from([("device".into(), "phone".into())])),
            ..SessionUpdate::default()
        },
    );

    let session = store.get_session(&id).unwrap();
    assert_eq!(session.variables.get("location").map(String::as_str), Some("home"));
    assert_eq!(session.variables.get("device").map(String::as_str), Some("phone"));
}

#[test]
fn corrupt_documents_start_empty_instead_of_failing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sessions.json"), "{not json").unwrap();
    let store = ContextStore::open(dir.path(), 30, 50).unwrap();
    assert_eq!(store.active_session_count(), 0);
}
