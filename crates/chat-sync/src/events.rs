//! Events fanned out to live subscribers.

use serde::{Deserialize, Serialize};

use chat_store::{GroupMessage, Message};

/// Events observed on a 1:1 room channel.
///
/// Rooms only forward appends. Read-flag flips and per-message deletions
/// happen in the store without a live event; clients pick them up on the
/// next one-shot read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoomEvent {
    /// A message was appended to the room's log.
    MessageAdded(Message),
}

/// Events observed on a group channel.
///
/// Groups are richer than rooms: in-place record changes (body edits,
/// receipt updates, soft deletes) and hard removals are forwarded too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupEvent {
    /// A message was appended to the group's ledger.
    MessageAdded(GroupMessage),
    /// The record changed in place; carries the full updated record.
    MessageEdited(GroupMessage),
    /// The record was removed from the ledger.
    MessageRemoved {
        group_id: String,
        message_id: String,
    },
}

/// A typing-state change on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    /// Channel the change happened on (room id or group id).
    pub channel_id: String,
    pub user_id: String,
    pub typing: bool,
}
