use super::*;

fn message(id: &str, sender: &str, channel: &str, content: &str) -> Message {
    Message {
        id: MessageId::new(id),
        sender_id: UserId::new(sender),
        sender_name: format!("{sender} (name)"),
        content: content.into(),
        attachment: None,
        channel_id: ChannelId::new(channel),
        timestamp: 1_700_000_000_000,
    }
}

#[test]
fn appends_and_queries_in_insertion_order() {
    let store = MessageStore::ephemeral();
    assert!(store.append(message("m1", "A", "A-B", "hello")));
    assert!(store.append(message("m2", "B", "A-B", "hi")));
    assert!(store.append(message("m3", "A", "global", "everyone")));

    let direct = store.query(&ChannelId::new("A-B"));
    assert_eq!(direct.len(), 2);
    assert_eq!(direct[0].content, "hello");
    assert_eq!(direct[0].sender_id, UserId::new("A"));
    assert_eq!(direct[1].content, "hi");

    assert_eq!(store.query(&ChannelId::new("global")).len(), 1);
    assert!(store.query(&ChannelId::new("B-C")).is_empty());
}

#[test]
fn append_is_idempotent_on_message_id() {
    let store = MessageStore::ephemeral();
    assert!(store.append(message("m1", "A", "A-B", "hello")));
    assert!(!store.append(message("m1", "A", "A-B", "hello")));
    assert_eq!(store.query(&ChannelId::new("A-B")).len(), 1);
    assert_eq!(store.len(), 1);
}

#[test]
fn query_preserves_append_order_not_timestamp_order() {
    let store = MessageStore::ephemeral();
    let mut late = message("m1", "A", "global", "late timestamp, appended first");
    late.timestamp = 2_000;
    let mut early = message("m2", "A", "global", "early timestamp, appended second");
    early.timestamp = 1_000;
    store.append(late);
    store.append(early);

    let messages = store.query(&ChannelId::new("global"));
    assert_eq!(messages[0].id, MessageId::new("m1"));
    assert_eq!(messages[1].id, MessageId::new("m2"));
}

#[test]
fn channels_touching_skips_broadcast_and_foreign_channels() {
    let store = MessageStore::ephemeral();
    store.append(message("m1", "A", "global", "hi all"));
    store.append(message("m2", "A", "A-B", "hi B"));
    store.append(message("m3", "C", "A-C", "hi A"));
    store.append(message("m4", "B", "B-C", "no A here"));
    store.append(message("m5", "B", "A-B", "another in the same channel"));

    let channels = store.channels_touching(&UserId::new("A"));
    let expected: BTreeSet<ChannelId> = [ChannelId::new("A-B"), ChannelId::new("A-C")]
        .into_iter()
        .collect();
    assert_eq!(channels, expected);
}

#[test]
fn rehydrates_history_from_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("messages.json");

    {
        let store = MessageStore::open(&path).expect("store");
        store.append(message("m1", "A", "A-B", "hello"));
        store.append(message("m2", "B", "A-B", "hi"));
    }

    let reopened = MessageStore::open(&path).expect("store");
    let messages = reopened.query(&ChannelId::new("A-B"));
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "hello");

    // Rehydrated ids still deduplicate.
    assert!(!reopened.append(message("m1", "A", "A-B", "hello")));
}

#[test]
fn malformed_snapshot_resets_to_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("messages.json");
    fs::write(&path, b"{ not json ]").expect("write garbage");

    let store = MessageStore::open(&path).expect("store");
    assert!(store.is_empty());

    // Recovery is silent and the store stays usable.
    assert!(store.append(message("m1", "A", "global", "fresh start")));
    assert_eq!(store.len(), 1);
}

#[test]
fn creates_snapshot_parent_directory_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("deeper").join("messages.json");

    let store = MessageStore::open(&path).expect("store");
    store.append(message("m1", "A", "global", "hello"));
    assert!(path.exists(), "snapshot file should exist: {}", path.display());
}

#[test]
fn emits_store_event_per_insertion_only() {
    let store = MessageStore::ephemeral();
    let mut events = store.subscribe();

    store.append(message("m1", "A", "A-B", "hello"));
    store.append(message("m1", "A", "A-B", "hello"));

    let StoreEvent::Appended { channel_id } = events.try_recv().expect("one event");
    assert_eq!(channel_id, ChannelId::new("A-B"));
    assert!(events.try_recv().is_err(), "duplicate append must not emit");
}
