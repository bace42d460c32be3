use super::*;

use crate::test_support::{at, conversation, message};

fn ids(directory: &ConversationDirectory) -> Vec<&str> {
    directory
        .conversations()
        .iter()
        .map(|conversation| conversation.id.as_str())
        .collect()
}

#[test]
fn starts_loading_and_empty() {
    let directory = ConversationDirectory::default();

    assert_eq!(directory.ui_state(), DirectoryUiState::Loading);
    assert!(directory.conversations().is_empty());
}

#[test]
fn replace_orders_by_last_message_descending() {
    let mut directory = ConversationDirectory::default();

    directory.replace(vec![
        conversation("old", "a", Some(1)),
        conversation("silent", "b", None),
        conversation("new", "c", Some(9)),
    ]);

    assert_eq!(directory.ui_state(), DirectoryUiState::Ready);
    assert_eq!(ids(&directory), vec!["new", "old", "silent"]);
}

#[test]
fn replace_with_nothing_is_empty_state() {
    let mut directory = ConversationDirectory::default();

    directory.replace(Vec::new());

    assert_eq!(directory.ui_state(), DirectoryUiState::Empty);
}

#[test]
fn fetch_error_keeps_last_known_list() {
    let mut directory = ConversationDirectory::default();
    directory.replace(vec![conversation("c1", "a", Some(1))]);

    directory.set_error();

    assert_eq!(directory.ui_state(), DirectoryUiState::Ready);
    assert_eq!(ids(&directory), vec!["c1"]);
}

#[test]
fn fetch_error_without_data_is_error_state() {
    let mut directory = ConversationDirectory::default();

    directory.set_error();

    assert_eq!(directory.ui_state(), DirectoryUiState::Error);
}

#[test]
fn unread_count_ignores_read_and_own_messages() {
    let mut entry = conversation("c1", "client-1", Some(1));
    let mut read = message("m1", "c1", "client-1", "old");
    read.is_read = true;
    entry.messages = vec![
        message("m3", "c1", "client-1", "still there?"),
        message("m2", "c1", "agent-1", "my reply"),
        read,
        message("m0", "c1", "client-1", "hello"),
    ];

    assert_eq!(unread_count_of(&entry, &UserId::from("agent-1")), 2);
    assert_eq!(unread_count_of(&entry, &UserId::from("client-1")), 1);
}

#[test]
fn unread_count_follows_server_read_state() {
    let mut directory = ConversationDirectory::default();
    let mut entry = conversation("c1", "client-1", Some(1));
    entry.messages = vec![message("m1", "c1", "client-1", "hi")];
    directory.replace(vec![entry.clone()]);
    assert_eq!(directory.total_unread(&UserId::from("agent-1")), 1);

    entry.messages[0].is_read = true;
    directory.replace(vec![entry]);

    assert_eq!(directory.total_unread(&UserId::from("agent-1")), 0);
}

#[test]
fn note_message_bumps_recency_and_reorders() {
    let mut directory = ConversationDirectory::default();
    directory.replace(vec![
        conversation("c1", "a", Some(5)),
        conversation("c2", "b", Some(1)),
    ]);
    let mut incoming = message("m9", "c2", "b", "ping");
    incoming.created_at = at(7);

    assert!(directory.note_message(&incoming));

    assert_eq!(ids(&directory), vec!["c2", "c1"]);
    let c2 = directory.get(&ConversationId::from("c2")).expect("listed");
    assert_eq!(c2.last_message_at, Some(at(7)));
    assert_eq!(c2.last_message().map(|m| m.id.as_str()), Some("m9"));
}

#[test]
fn note_message_never_moves_last_message_at_backwards() {
    let mut directory = ConversationDirectory::default();
    directory.replace(vec![conversation("c1", "a", Some(8))]);
    let mut late = message("m1", "c1", "a", "delayed");
    late.created_at = at(2);

    directory.note_message(&late);

    let c1 = directory.get(&ConversationId::from("c1")).expect("listed");
    assert_eq!(c1.last_message_at, Some(at(8)));
}

#[test]
fn note_message_for_unlisted_conversation_is_ignored() {
    let mut directory = ConversationDirectory::default();
    directory.replace(vec![conversation("c1", "a", Some(1))]);

    assert!(!directory.note_message(&message("m1", "other", "a", "x")));
}

#[test]
fn deferred_refresh_is_taken_once() {
    let mut directory = ConversationDirectory::default();

    directory.defer_refresh();

    assert!(directory.take_deferred_refresh());
    assert!(!directory.take_deferred_refresh());
}

#[test]
fn mark_closed_updates_status() {
    let mut directory = ConversationDirectory::default();
    directory.replace(vec![conversation("c1", "a", Some(1))]);

    assert!(directory.mark_closed(&ConversationId::from("c1")));

    assert!(directory
        .get(&ConversationId::from("c1"))
        .expect("listed")
        .is_closed());
}
