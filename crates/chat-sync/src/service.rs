//! The chat service facade.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use chat_store::{
    group, group_message, message, room, Group, GroupMember, GroupMessage, GroupRole, Message,
    NewGroup, NewGroupMessage, NewMessage, Participant, Room, Store, StoreError,
};

use crate::bus::Bus;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::events::{GroupEvent, RoomEvent, TypingEvent};
use crate::notify::{Notifier, TracingNotifier};
use crate::subscription::Subscription;
use crate::typing::TypingTracker;

/// Per-channel write locks.
///
/// Every mutation that publishes holds its channel's lock across the
/// store write and the matching publish, so subscribers observe events
/// in the same order a reader sees them in the log. The lock is fair:
/// writers publish in the order they queued.
#[derive(Debug, Default)]
struct ChannelLocks {
    channels: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChannelLocks {
    async fn acquire(&self, channel_id: &str) -> Arc<Mutex<()>> {
        let mut channels = self.channels.lock().await;
        // Entries nobody holds are dropped; the map only tracks channels
        // with a write in flight.
        channels.retain(|id, lock| id == channel_id || Arc::strong_count(lock) > 1);
        channels.entry(channel_id.to_string()).or_default().clone()
    }
}

/// Coordinates the store, the live event channels and notifications.
///
/// The service:
/// - Wraps every store mutation and publishes the matching live event,
///   serialized per channel so streams follow log order
/// - Forwards only appends on 1:1 room channels; group channels also carry
///   in-place edits (body edits, receipts, soft deletes) and hard removals
/// - Enforces group permissions (admin eviction/promotion, creator-only
///   group deletion, sender-or-admin message removal)
/// - Tracks typing presence per channel, in memory
/// - Notifies recipients after a successful send; notification failures
///   are logged and never fail the send
pub struct ChatService<N: Notifier = TracingNotifier> {
    store: Store,
    rooms: Bus<RoomEvent>,
    groups: Bus<GroupEvent>,
    typing: TypingTracker,
    locks: ChannelLocks,
    notifier: N,
}

impl ChatService<TracingNotifier> {
    /// Create a service with default configuration and the logging
    /// notifier.
    pub fn new(store: Store) -> Self {
        Self::with_notifier(store, SyncConfig::default(), TracingNotifier)
    }

    /// Create a service with custom channel capacities.
    pub fn with_config(store: Store, config: SyncConfig) -> Self {
        Self::with_notifier(store, config, TracingNotifier)
    }
}

impl<N: Notifier> ChatService<N> {
    /// Create a service with a custom notifier.
    pub fn with_notifier(store: Store, config: SyncConfig, notifier: N) -> Self {
        Self {
            rooms: Bus::new(config.channel_capacity),
            groups: Bus::new(config.channel_capacity),
            typing: TypingTracker::new(config.typing_capacity),
            locks: ChannelLocks::default(),
            store,
            notifier,
        }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    // ------------------------------------------------------------------
    // 1:1 rooms
    // ------------------------------------------------------------------

    /// Create (or overwrite) the room between two participants.
    pub async fn create_room(&self, a: &Participant, b: &Participant) -> Result<Room> {
        Ok(room::create_room(self.store.pool(), a, b).await?)
    }

    /// Get a room by id.
    pub async fn get_room(&self, room_id: &str) -> Result<Room> {
        Ok(room::get_room(self.store.pool(), room_id).await?)
    }

    /// Get the room between two participants, creating it if missing.
    pub async fn get_or_create_room(&self, a: &Participant, b: &Participant) -> Result<Room> {
        Ok(room::get_or_create_room(self.store.pool(), a, b).await?)
    }

    /// List all rooms a user participates in, most recent activity first.
    pub async fn list_rooms_for_user(&self, user_id: &str) -> Result<Vec<Room>> {
        Ok(room::list_rooms_for_user(self.store.pool(), user_id).await?)
    }

    /// Delete a room and its message log. No live event is published;
    /// room channels only carry appends.
    pub async fn delete_room(&self, room_id: &str) -> Result<()> {
        Ok(room::delete_room(self.store.pool(), room_id).await?)
    }

    /// Send a 1:1 message: append to the log and fan out the add event
    /// under the room's write lock, then notify the receiver.
    pub async fn send_message(&self, room_id: &str, message: &NewMessage) -> Result<Message> {
        let sent = {
            let lock = self.locks.acquire(room_id).await;
            let _held = lock.lock().await;

            let sent = message::send_message(self.store.pool(), room_id, message).await?;
            self.rooms
                .publish(room_id, RoomEvent::MessageAdded(sent.clone()))
                .await;
            sent
        };

        let preview = sent.kind.preview_label(&sent.body);
        if let Err(e) = self.notifier.notify(&sent.receiver_id, room_id, preview).await {
            warn!("Notification for {} failed: {}", sent.receiver_id, e);
        }

        Ok(sent)
    }

    /// Get a room's full message log, oldest first.
    pub async fn get_messages(&self, room_id: &str) -> Result<Vec<Message>> {
        Ok(message::get_messages(self.store.pool(), room_id).await?)
    }

    /// Get up to `limit` messages older than the `before` cursor, the
    /// previous page's oldest `(sent_at, id)` pair. `None` fetches the
    /// latest page.
    pub async fn get_messages_before(
        &self,
        room_id: &str,
        before: Option<(i64, &str)>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        Ok(message::get_messages_before(self.store.pool(), room_id, before, limit).await?)
    }

    /// Delete a single 1:1 message. Room channels do not forward
    /// removals, so subscribers find out on their next one-shot read.
    pub async fn delete_message(&self, room_id: &str, message_id: &str) -> Result<()> {
        Ok(message::delete_message(self.store.pool(), room_id, message_id).await?)
    }

    /// Mark a room read for `user_id`: flip the read flag on their unread
    /// messages, then reset the room's unread counter. The counter is
    /// shared, so the reset is skipped when nothing was flipped: a caller
    /// with no unread messages writes nothing, and the other
    /// participant's count survives. Returns the number flipped.
    pub async fn mark_as_read(&self, room_id: &str, user_id: &str) -> Result<u64> {
        let flipped = message::mark_messages_read(self.store.pool(), room_id, user_id).await?;
        if flipped > 0 {
            message::reset_unread(self.store.pool(), room_id).await?;
        }
        Ok(flipped)
    }

    /// Subscribe to a room's live append events.
    ///
    /// Subscribe first, then fetch the backlog with [`get_messages`]; a
    /// message sent between the two calls shows up in both, so drop
    /// duplicates by message id.
    ///
    /// [`get_messages`]: ChatService::get_messages
    pub async fn subscribe_room(&self, room_id: &str) -> Subscription<RoomEvent> {
        Subscription::new(room_id, self.rooms.subscribe(room_id).await)
    }

    // ------------------------------------------------------------------
    // Typing presence
    // ------------------------------------------------------------------

    /// Record a typing flag on a channel (room or group id) and broadcast
    /// it. Fire-and-forget.
    pub async fn set_typing(&self, channel_id: &str, user_id: &str, typing: bool) {
        self.typing.set_typing(channel_id, user_id, typing).await;
    }

    /// Users currently typing on a channel.
    pub async fn typing_users(&self, channel_id: &str) -> Vec<String> {
        self.typing.typing_users(channel_id).await
    }

    /// Subscribe to typing changes on a channel.
    pub async fn subscribe_typing(&self, channel_id: &str) -> Subscription<TypingEvent> {
        self.typing.subscribe(channel_id).await
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Create a group; the creator becomes the first member and admin.
    pub async fn create_group(&self, group: &NewGroup) -> Result<Group> {
        Ok(group::create_group(self.store.pool(), group).await?)
    }

    /// Get a group by id.
    pub async fn get_group(&self, group_id: &str) -> Result<Group> {
        Ok(group::get_group(self.store.pool(), group_id).await?)
    }

    /// List all groups a user belongs to, most recent activity first.
    pub async fn list_groups_for_user(&self, user_id: &str) -> Result<Vec<Group>> {
        Ok(group::list_groups_for_user(self.store.pool(), user_id).await?)
    }

    /// List a group's members, in join order.
    pub async fn group_members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        Ok(group::members(self.store.pool(), group_id).await?)
    }

    /// Add a member to a group.
    pub async fn add_member(&self, group_id: &str, member: &Participant) -> Result<()> {
        Ok(group::add_member(self.store.pool(), group_id, member).await?)
    }

    /// Remove a member. Members may leave on their own; removing someone
    /// else requires the admin role.
    pub async fn remove_member(
        &self,
        group_id: &str,
        caller_id: &str,
        user_id: &str,
    ) -> Result<()> {
        if caller_id != user_id {
            self.ensure_admin(group_id, caller_id).await?;
        }
        Ok(group::remove_member(self.store.pool(), group_id, user_id).await?)
    }

    /// Change a member's role. Admin only.
    pub async fn set_role(
        &self,
        group_id: &str,
        caller_id: &str,
        user_id: &str,
        role: GroupRole,
    ) -> Result<()> {
        self.ensure_admin(group_id, caller_id).await?;
        Ok(group::set_role(self.store.pool(), group_id, user_id, role).await?)
    }

    /// Get a member's role.
    pub async fn get_role(&self, group_id: &str, user_id: &str) -> Result<GroupRole> {
        Ok(group::get_role(self.store.pool(), group_id, user_id).await?)
    }

    /// Delete a group with everything in it. Only the creator may.
    pub async fn delete_group(&self, group_id: &str, caller_id: &str) -> Result<()> {
        let group = group::get_group(self.store.pool(), group_id).await?;
        if group.creator_id != caller_id {
            return Err(StoreError::Forbidden {
                reason: "only the creator can delete a group".to_string(),
            }
            .into());
        }
        Ok(group::delete_group(self.store.pool(), group_id).await?)
    }

    /// Send a group message: append to the ledger and fan out the add
    /// event under the group's write lock, then notify every member but
    /// the sender.
    pub async fn send_group_message(
        &self,
        group_id: &str,
        message: &NewGroupMessage,
    ) -> Result<GroupMessage> {
        let sent = {
            let lock = self.locks.acquire(group_id).await;
            let _held = lock.lock().await;

            let sent =
                group_message::send_group_message(self.store.pool(), group_id, message).await?;
            self.groups
                .publish(group_id, GroupEvent::MessageAdded(sent.clone()))
                .await;
            sent
        };

        let preview = sent.kind.preview_label(&sent.body);
        let members = group::members(self.store.pool(), group_id).await?;
        for member in &members {
            if member.user_id == sent.sender_id {
                continue;
            }
            if let Err(e) = self.notifier.notify(&member.user_id, group_id, preview).await {
                warn!("Notification for {} failed: {}", member.user_id, e);
            }
        }

        Ok(sent)
    }

    /// Get a group's full message ledger, oldest first, receipts included.
    pub async fn get_group_messages(&self, group_id: &str) -> Result<Vec<GroupMessage>> {
        Ok(group_message::get_group_messages(self.store.pool(), group_id).await?)
    }

    /// Get a single group message with its receipts.
    pub async fn get_group_message(
        &self,
        group_id: &str,
        message_id: &str,
    ) -> Result<GroupMessage> {
        Ok(group_message::get_group_message(self.store.pool(), group_id, message_id).await?)
    }

    /// Edit a message body (sender only) and fan out the edit.
    pub async fn edit_group_message(
        &self,
        group_id: &str,
        message_id: &str,
        editor_id: &str,
        new_body: &str,
    ) -> Result<GroupMessage> {
        let lock = self.locks.acquire(group_id).await;
        let _held = lock.lock().await;

        let updated =
            group_message::edit_group_message(self.store.pool(), group_id, message_id, editor_id, new_body)
                .await?;

        self.groups
            .publish(group_id, GroupEvent::MessageEdited(updated.clone()))
            .await;

        Ok(updated)
    }

    /// Soft-delete a message (sender only) and fan out the edit. The
    /// record stays in the ledger with a blank body.
    pub async fn soft_delete_group_message(
        &self,
        group_id: &str,
        message_id: &str,
        caller_id: &str,
    ) -> Result<GroupMessage> {
        let lock = self.locks.acquire(group_id).await;
        let _held = lock.lock().await;

        let updated =
            group_message::soft_delete_group_message(self.store.pool(), group_id, message_id, caller_id)
                .await?;

        self.groups
            .publish(group_id, GroupEvent::MessageEdited(updated.clone()))
            .await;

        Ok(updated)
    }

    /// Hard-remove a message from the ledger and fan out the removal.
    /// Allowed for the sender and for admins.
    pub async fn remove_group_message(
        &self,
        group_id: &str,
        message_id: &str,
        caller_id: &str,
    ) -> Result<()> {
        let lock = self.locks.acquire(group_id).await;
        let _held = lock.lock().await;

        let message = group_message::get_group_message(self.store.pool(), group_id, message_id).await?;
        if message.sender_id != caller_id {
            self.ensure_admin(group_id, caller_id).await?;
        }

        group_message::remove_group_message(self.store.pool(), group_id, message_id).await?;

        self.groups
            .publish(
                group_id,
                GroupEvent::MessageRemoved {
                    group_id: group_id.to_string(),
                    message_id: message_id.to_string(),
                },
            )
            .await;

        Ok(())
    }

    /// Record delivery of a message to a member and fan out the updated
    /// record.
    pub async fn mark_delivered(
        &self,
        group_id: &str,
        message_id: &str,
        user_id: &str,
    ) -> Result<GroupMessage> {
        let lock = self.locks.acquire(group_id).await;
        let _held = lock.lock().await;

        group_message::mark_delivered(self.store.pool(), group_id, message_id, user_id).await?;
        self.publish_updated(group_id, message_id).await
    }

    /// Record that a member read a message and fan out the updated
    /// record. Reading implies delivery.
    pub async fn mark_read(
        &self,
        group_id: &str,
        message_id: &str,
        user_id: &str,
    ) -> Result<GroupMessage> {
        let lock = self.locks.acquire(group_id).await;
        let _held = lock.lock().await;

        group_message::mark_read(self.store.pool(), group_id, message_id, user_id).await?;
        self.publish_updated(group_id, message_id).await
    }

    /// Subscribe to a group's live events: adds, edits and removals.
    ///
    /// As with rooms, subscribe before fetching the backlog and drop
    /// duplicates by message id.
    pub async fn subscribe_group(&self, group_id: &str) -> Subscription<GroupEvent> {
        Subscription::new(group_id, self.groups.subscribe(group_id).await)
    }

    /// Callers hold the group's write lock.
    async fn publish_updated(&self, group_id: &str, message_id: &str) -> Result<GroupMessage> {
        let updated = group_message::get_group_message(self.store.pool(), group_id, message_id).await?;
        self.groups
            .publish(group_id, GroupEvent::MessageEdited(updated.clone()))
            .await;
        Ok(updated)
    }

    async fn ensure_admin(&self, group_id: &str, user_id: &str) -> Result<()> {
        match group::get_role(self.store.pool(), group_id, user_id).await? {
            GroupRole::Admin => Ok(()),
            GroupRole::Member => Err(StoreError::Forbidden {
                reason: "requires the admin role".to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

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

    /// Group created by Ada with Ben and Cam as plain members.
    async fn seeded_group(service: &ChatService) -> String {
        let group = service
            .create_group(&NewGroup::new("Trip", ada()))
            .await
            .unwrap();
        service.add_member(&group.id, &ben()).await.unwrap();
        service.add_member(&group.id, &cam()).await.unwrap();
        group.id
    }

    fn is_forbidden<T>(result: &Result<T>) -> bool {
        matches!(result, Err(SyncError::Store(StoreError::Forbidden { .. })))
    }

    #[tokio::test]
    async fn test_mark_as_read_flips_messages_and_counter() {
        let service = test_service().await;
        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();

        service
            .send_message(&room.id, &NewMessage::text(&ada(), &ben(), "one"))
            .await
            .unwrap();
        service
            .send_message(&room.id, &NewMessage::text(&ada(), &ben(), "two"))
            .await
            .unwrap();

        let flipped = service.mark_as_read(&room.id, "u2").await.unwrap();
        assert_eq!(flipped, 2);

        let room = service.get_room(&room.id).await.unwrap();
        assert_eq!(room.unread_count, 0);
        let messages = service.get_messages(&room.id).await.unwrap();
        assert!(messages.iter().all(|m| m.read));

        // Nothing left to flip; still a success.
        let flipped = service.mark_as_read(&room.id, "u2").await.unwrap();
        assert_eq!(flipped, 0);
    }

    #[tokio::test]
    async fn test_mark_as_read_by_sender_keeps_receiver_unread() {
        let service = test_service().await;
        let room = service.get_or_create_room(&ada(), &ben()).await.unwrap();

        service
            .send_message(&room.id, &NewMessage::text(&ada(), &ben(), "unread for Ben"))
            .await
            .unwrap();

        // Ada has nothing unread; her call must not touch Ben's counter.
        let flipped = service.mark_as_read(&room.id, "u1").await.unwrap();
        assert_eq!(flipped, 0);
        let room = service.get_room(&room.id).await.unwrap();
        assert_eq!(room.unread_count, 1);

        // Ben's own call still clears it.
        let flipped = service.mark_as_read(&room.id, "u2").await.unwrap();
        assert_eq!(flipped, 1);
        let room = service.get_room(&room.id).await.unwrap();
        assert_eq!(room.unread_count, 0);
    }

    #[tokio::test]
    async fn test_members_may_leave_but_not_evict() {
        let service = test_service().await;
        let group_id = seeded_group(&service).await;

        // Cam may not evict Ben.
        let result = service.remove_member(&group_id, "u3", "u2").await;
        assert!(is_forbidden(&result));

        // But Cam may leave.
        service.remove_member(&group_id, "u3", "u3").await.unwrap();
        let members = service.group_members(&group_id).await.unwrap();
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn test_admin_may_evict_and_promote() {
        let service = test_service().await;
        let group_id = seeded_group(&service).await;

        // Plain members cannot change roles.
        let result = service.set_role(&group_id, "u3", "u2", GroupRole::Admin).await;
        assert!(is_forbidden(&result));

        // Ada promotes Ben; Ben can then evict Cam.
        service
            .set_role(&group_id, "u1", "u2", GroupRole::Admin)
            .await
            .unwrap();
        service.remove_member(&group_id, "u2", "u3").await.unwrap();
        let members = service.group_members(&group_id).await.unwrap();
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_group_is_creator_only() {
        let service = test_service().await;
        let group_id = seeded_group(&service).await;

        let result = service.delete_group(&group_id, "u2").await;
        assert!(is_forbidden(&result));

        service.delete_group(&group_id, "u1").await.unwrap();
        let result = service.get_group(&group_id).await;
        assert!(matches!(
            result,
            Err(SyncError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_remove_group_message_needs_sender_or_admin() {
        let service = test_service().await;
        let group_id = seeded_group(&service).await;

        let sent = service
            .send_group_message(&group_id, &NewGroupMessage::text(&ben(), "spam"))
            .await
            .unwrap();

        // Cam is neither the sender nor an admin.
        let result = service.remove_group_message(&group_id, &sent.id, "u3").await;
        assert!(is_forbidden(&result));

        // The sender may remove their own message.
        service
            .remove_group_message(&group_id, &sent.id, "u2")
            .await
            .unwrap();

        // An admin may remove anyone's.
        let sent = service
            .send_group_message(&group_id, &NewGroupMessage::text(&ben(), "more spam"))
            .await
            .unwrap();
        service
            .remove_group_message(&group_id, &sent.id, "u1")
            .await
            .unwrap();

        assert!(service.get_group_messages(&group_id).await.unwrap().is_empty());
    }
}
