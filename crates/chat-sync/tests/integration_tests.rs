//! Integration tests for chat-sync.
//!
//! Everything runs against an in-memory store; no external services are
//! needed.
//!
//! Run all integration tests:
//!   cargo test --test integration_tests

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Mutex;

use chat_store::{
    MessageKind, NewGroup, NewGroupMessage, NewMessage, Participant, Store, StoreError,
};
use chat_sync::{
    ChatService, GroupEvent, Notifier, RoomEvent, Subscription, SyncConfig, SyncError,
};

/// Service over a fresh in-memory store.
async fn test_service() -> ChatService {
    let store = Store::connect("sqlite::memory:").await.unwrap();
    store.migrate().await.unwrap();
    ChatService::new(store)
}

fn ada() -> Participant {
    Participant::new("u1", "Ada")
}

fn ben() -> Participant {
    Participant::new("u2", "Ben")
}

fn cam() -> Participant {
    Participant::new("u3", "Cam")
}

/// Poll a subscription briefly and insist nothing arrives.
async fn assert_no_event<T: Debug + Clone + Send + 'static>(sub: &mut Subscription<T>) {
    let quiet = tokio::time::timeout(Duration::from_millis(100), sub.next()).await;
    assert!(quiet.is_err(), "expected no event, got {:?}", quiet);
}

// ============================================================================
// 1:1 room flows
// ============================================================================

mod room_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_live_event_matches_stored_message() {
        let service = test_service().await;
        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();

        let mut events = service.subscribe_room(&room.id).await;
        let sent = service
            .send_message(&room.id, &NewMessage::text(&ada(), &ben(), "hello"))
            .await
            .unwrap();

        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event, RoomEvent::MessageAdded(sent));
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscribers() {
        let service = test_service().await;
        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();

        service
            .send_message(&room.id, &NewMessage::text(&ada(), &ben(), "before"))
            .await
            .unwrap();

        // The backlog comes from the one-shot read; the stream starts
        // empty and only carries what is sent afterwards.
        let mut events = service.subscribe_room(&room.id).await;
        let backlog = service.get_messages(&room.id).await.unwrap();
        assert_eq!(backlog.len(), 1);

        service
            .send_message(&room.id, &NewMessage::text(&ben(), &ada(), "after"))
            .await
            .unwrap();

        let event = events.next().await.unwrap().unwrap();
        let RoomEvent::MessageAdded(message) = event;
        assert_eq!(message.body, "after");
        assert_no_event(&mut events).await;
    }

    #[tokio::test]
    async fn test_reads_and_deletes_stay_silent() {
        let service = test_service().await;
        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();

        let mut events = service.subscribe_room(&room.id).await;
        let sent = service
            .send_message(&room.id, &NewMessage::text(&ada(), &ben(), "hello"))
            .await
            .unwrap();
        events.next().await.unwrap().unwrap();

        // Room channels forward appends only.
        service.mark_as_read(&room.id, "u2").await.unwrap();
        service.delete_message(&room.id, &sent.id).await.unwrap();
        assert_no_event(&mut events).await;
    }

    #[tokio::test]
    async fn test_dropped_subscription_detaches() {
        let service = test_service().await;
        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();

        let events = service.subscribe_room(&room.id).await;
        drop(events);

        // Sending into a watched-then-abandoned room still works.
        service
            .send_message(&room.id, &NewMessage::text(&ada(), &ben(), "anyone?"))
            .await
            .unwrap();

        let mut events = service.subscribe_room(&room.id).await;
        assert_no_event(&mut events).await;
    }

    #[tokio::test]
    async fn test_store_accessor_reads_the_same_database() {
        let service = test_service().await;
        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();

        // Callers can drop down to the store API through the service.
        let fetched = chat_store::room::get_room(service.store().pool(), &room.id)
            .await
            .unwrap();
        assert_eq!(fetched.id, room.id);
        assert_eq!(fetched.user_a, "u1");
    }
}

// ============================================================================
// Group flows
// ============================================================================

mod group_flow_tests {
    use super::*;

    /// Group created by Ada with Ben and Cam as members.
    async fn seeded_group(service: &ChatService) -> String {
        let group = service
            .create_group(&NewGroup::new("Trip", ada()))
            .await
            .unwrap();
        service.add_member(&group.id, &ben()).await.unwrap();
        service.add_member(&group.id, &cam()).await.unwrap();
        group.id
    }

    #[tokio::test]
    async fn test_adds_edits_and_removals_are_forwarded() {
        let service = test_service().await;
        let group_id = seeded_group(&service).await;
        let mut events = service.subscribe_group(&group_id).await;

        // Append
        let sent = service
            .send_group_message(&group_id, &NewGroupMessage::text(&ada(), "meet at 9"))
            .await
            .unwrap();
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event, GroupEvent::MessageAdded(sent.clone()));

        // Body edit
        service
            .edit_group_message(&group_id, &sent.id, "u1", "meet at 10")
            .await
            .unwrap();
        match events.next().await.unwrap().unwrap() {
            GroupEvent::MessageEdited(message) => {
                assert_eq!(message.body, "meet at 10");
                assert!(message.edited_at.is_some());
            }
            other => panic!("expected edit, got {:?}", other),
        }

        // Receipt update
        service.mark_read(&group_id, &sent.id, "u2").await.unwrap();
        match events.next().await.unwrap().unwrap() {
            GroupEvent::MessageEdited(message) => {
                assert_eq!(message.delivered_to, vec!["u2"]);
                assert_eq!(message.read_by, vec!["u2"]);
            }
            other => panic!("expected receipt edit, got {:?}", other),
        }

        // Soft delete mutates the record in place
        service
            .soft_delete_group_message(&group_id, &sent.id, "u1")
            .await
            .unwrap();
        match events.next().await.unwrap().unwrap() {
            GroupEvent::MessageEdited(message) => {
                assert_eq!(message.body, "");
                assert!(message.is_deleted());
            }
            other => panic!("expected soft delete edit, got {:?}", other),
        }

        // Hard removal
        service
            .remove_group_message(&group_id, &sent.id, "u1")
            .await
            .unwrap();
        match events.next().await.unwrap().unwrap() {
            GroupEvent::MessageRemoved {
                group_id: g,
                message_id: m,
            } => {
                assert_eq!(g, group_id);
                assert_eq!(m, sent.id);
            }
            other => panic!("expected removal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sends_require_membership() {
        let service = test_service().await;
        let group_id = seeded_group(&service).await;

        let outsider = Participant::new("u9", "Mallory");
        let result = service
            .send_group_message(&group_id, &NewGroupMessage::text(&outsider, "hi"))
            .await;
        assert!(matches!(
            result,
            Err(SyncError::Store(StoreError::NotAMember { .. }))
        ));
    }

    #[tokio::test]
    async fn test_group_and_room_channels_are_separate() {
        let service = test_service().await;
        let group_id = seeded_group(&service).await;
        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();

        let mut group_events = service.subscribe_group(&group_id).await;
        service
            .send_message(&room.id, &NewMessage::text(&ada(), &ben(), "direct"))
            .await
            .unwrap();

        assert_no_event(&mut group_events).await;
    }
}

// ============================================================================
// Typing presence
// ============================================================================

mod typing_tests {
    use super::*;

    #[tokio::test]
    async fn test_typing_round_trip() {
        let service = test_service().await;
        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();

        let mut events = service.subscribe_typing(&room.id).await;

        service.set_typing(&room.id, "u2", true).await;
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.user_id, "u2");
        assert!(event.typing);
        assert_eq!(service.typing_users(&room.id).await, vec!["u2"]);

        service.set_typing(&room.id, "u2", false).await;
        let event = events.next().await.unwrap().unwrap();
        assert!(!event.typing);
        assert!(service.typing_users(&room.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_group_ids_work_as_typing_channels() {
        let service = test_service().await;
        let group = service
            .create_group(&NewGroup::new("Trip", ada()))
            .await
            .unwrap();

        service.set_typing(&group.id, "u1", true).await;
        assert_eq!(service.typing_users(&group.id).await, vec!["u1"]);
    }
}

// ============================================================================
// Lag behavior
// ============================================================================

mod lag_tests {
    use super::*;

    #[tokio::test]
    async fn test_slow_subscriber_sees_lag_then_tail() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.migrate().await.unwrap();
        let service = ChatService::with_config(store, SyncConfig::new(2));

        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();
        let mut events = service.subscribe_room(&room.id).await;

        // Overflow the two-slot buffer before polling at all.
        for body in ["one", "two", "three", "four"] {
            service
                .send_message(&room.id, &NewMessage::text(&ada(), &ben(), body))
                .await
                .unwrap();
        }

        match events.next().await.unwrap() {
            Err(SyncError::Lagged { skipped }) => assert_eq!(skipped, 2),
            other => panic!("expected lag, got {:?}", other),
        }

        // The retained tail is still delivered; the caller re-fetches the
        // rest from the store.
        let RoomEvent::MessageAdded(message) = events.next().await.unwrap().unwrap();
        assert_eq!(message.body, "three");
        let RoomEvent::MessageAdded(message) = events.next().await.unwrap().unwrap();
        assert_eq!(message.body, "four");

        let backlog = service.get_messages(&room.id).await.unwrap();
        assert_eq!(backlog.len(), 4);
    }

    #[tokio::test]
    async fn test_typing_buffer_overflow_reports_lag() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.migrate().await.unwrap();
        let service =
            ChatService::with_config(store, SyncConfig::new(16).with_typing_capacity(1));

        let mut events = service.subscribe_typing("room-1").await;
        for user in ["u1", "u2", "u3"] {
            service.set_typing("room-1", user, true).await;
        }

        // A one-slot typing buffer keeps only the newest flag.
        match events.next().await.unwrap() {
            Err(SyncError::Lagged { skipped }) => assert_eq!(skipped, 2),
            other => panic!("expected lag, got {:?}", other),
        }
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.user_id, "u3");
    }
}

// ============================================================================
// Ordering under concurrent sends
// ============================================================================

mod ordering_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_stream_in_log_order() {
        // A single pooled connection so every task shares one in-memory
        // database.
        let store = Store::connect_with_pool_size("sqlite::memory:", 1)
            .await
            .unwrap();
        store.migrate().await.unwrap();
        let service = Arc::new(ChatService::new(store));
        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();

        let mut events = service.subscribe_room(&room.id).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = Arc::clone(&service);
            let room_id = room.id.clone();
            handles.push(tokio::spawn(async move {
                service
                    .send_message(
                        &room_id,
                        &NewMessage::text(&ada(), &ben(), format!("message {}", i)),
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let logged: Vec<String> = service
            .get_messages(&room.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(logged.len(), 8);

        // The stream yields the adds in exactly the order the log reads.
        let mut streamed = Vec::new();
        for _ in 0..8 {
            let RoomEvent::MessageAdded(message) = events.next().await.unwrap().unwrap();
            streamed.push(message.id);
        }
        assert_eq!(streamed, logged);
    }
}

// ============================================================================
// Notifications
// ============================================================================

mod notifier_tests {
    use super::*;

    /// Notifier that records calls instead of delivering anything.
    #[derive(Clone, Default)]
    struct RecordingNotifier {
        calls: Arc<Mutex<Vec<(String, String, String)>>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            recipient: &str,
            channel_id: &str,
            preview: &str,
        ) -> chat_sync::Result<()> {
            self.calls.lock().await.push((
                recipient.to_string(),
                channel_id.to_string(),
                preview.to_string(),
            ));
            Ok(())
        }
    }

    /// Notifier whose transport is permanently down.
    struct FailingNotifier;

    #[async_trait::async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _: &str, _: &str, _: &str) -> chat_sync::Result<()> {
            Err(SyncError::Notify("push gateway offline".to_string()))
        }
    }

    async fn recording_service() -> (ChatService<RecordingNotifier>, RecordingNotifier) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.migrate().await.unwrap();
        let recorder = RecordingNotifier::default();
        let service = ChatService::with_notifier(store, SyncConfig::default(), recorder.clone());
        (service, recorder)
    }

    #[tokio::test]
    async fn test_receiver_is_notified_with_preview() {
        let (service, recorder) = recording_service().await;
        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();

        service
            .send_message(
                &room.id,
                &NewMessage::text(&ada(), &ben(), "https://cdn/pic.jpg")
                    .with_kind(MessageKind::Image)
                    .with_media("https://cdn/pic.jpg"),
            )
            .await
            .unwrap();

        let calls = recorder.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "u2");
        assert_eq!(calls[0].1, room.id);
        // Media kinds notify with the placeholder, not the URL.
        assert_eq!(calls[0].2, "Photo");
    }

    #[tokio::test]
    async fn test_group_send_notifies_everyone_but_the_sender() {
        let (service, recorder) = recording_service().await;
        let group = service
            .create_group(&NewGroup::new("Trip", ada()))
            .await
            .unwrap();
        service.add_member(&group.id, &ben()).await.unwrap();
        service.add_member(&group.id, &cam()).await.unwrap();

        service
            .send_group_message(&group.id, &NewGroupMessage::text(&ben(), "on my way"))
            .await
            .unwrap();

        let calls = recorder.calls.lock().await;
        let mut notified: Vec<&str> = calls.iter().map(|(r, _, _)| r.as_str()).collect();
        notified.sort();
        assert_eq!(notified, vec!["u1", "u3"]);
    }

    #[tokio::test]
    async fn test_notify_failure_never_fails_the_send() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.migrate().await.unwrap();
        let service = ChatService::with_notifier(store, SyncConfig::default(), FailingNotifier);

        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();
        let sent = service
            .send_message(&room.id, &NewMessage::text(&ada(), &ben(), "hello"))
            .await
            .unwrap();

        let messages = service.get_messages(&room.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, sent.id);
    }
}
