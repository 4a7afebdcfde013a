//! Store models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A chat participant: user id plus the display snapshot that gets
/// denormalized onto rooms, messages and memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// User id (e.g., "u-7f3a").
    pub id: String,
    /// Display name at the time of the write; not kept in sync afterwards.
    pub name: String,
    /// Avatar URL snapshot, if any.
    pub photo_url: Option<String>,
}

impl Participant {
    /// Create a participant with no avatar.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            photo_url: None,
        }
    }

    /// Attach an avatar URL snapshot.
    pub fn with_photo(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }
}

/// Message payload kind.
///
/// Stored as lowercase text; the kind also decides the room-list preview
/// via [`MessageKind::preview_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Document,
    Voice,
}

impl MessageKind {
    /// Preview text shown on the parent room record.
    ///
    /// Text messages show their body; every other kind shows a fixed
    /// placeholder label instead of its content.
    pub fn preview_label<'a>(&self, body: &'a str) -> &'a str {
        match self {
            MessageKind::Text => body,
            MessageKind::Image => "Photo",
            MessageKind::Document => "Document",
            MessageKind::Voice => "Voice message",
        }
    }
}

/// A 1:1 chat room between two users.
///
/// `user_a` is always the lexicographically smaller of the two ids, so the
/// row matches the deterministic room id regardless of creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Room {
    /// Deterministic pair id (e.g., "u1_u2").
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub user_a_name: String,
    pub user_b_name: String,
    pub user_a_photo: Option<String>,
    pub user_b_photo: Option<String>,
    /// Preview of the most recent message.
    pub last_message: String,
    /// Epoch-ms timestamp of the most recent message, 0 if none.
    pub last_message_time: i64,
    /// Messages sent since the receiver last marked the room read.
    pub unread_count: i64,
    /// Epoch-ms creation timestamp.
    pub created_at: i64,
}

impl Room {
    /// The participant opposite `user_id`, if `user_id` is in the room.
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        if self.user_a == user_id {
            Some(&self.user_b)
        } else if self.user_b == user_id {
            Some(&self.user_a)
        } else {
            None
        }
    }
}

/// A stored 1:1 message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Message {
    /// Store-assigned push key (UUIDv7, time-ordered).
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub receiver_id: String,
    pub receiver_name: String,
    pub body: String,
    pub kind: MessageKind,
    /// Out-of-band media URL for non-text kinds.
    pub media_url: Option<String>,
    /// Whether the receiver has read the message.
    pub read: bool,
    /// Epoch-ms send timestamp, assigned by the store.
    pub sent_at: i64,
}

/// A 1:1 message to be sent; id and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub receiver_id: String,
    pub receiver_name: String,
    pub body: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
}

impl NewMessage {
    /// Create a plain text message.
    pub fn text(sender: &Participant, receiver: &Participant, body: impl Into<String>) -> Self {
        Self {
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            receiver_id: receiver.id.clone(),
            receiver_name: receiver.name.clone(),
            body: body.into(),
            kind: MessageKind::Text,
            media_url: None,
        }
    }

    /// Change the payload kind.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach a media URL.
    pub fn with_media(mut self, url: impl Into<String>) -> Self {
        self.media_url = Some(url.into());
        self
    }
}

/// A group chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Group {
    /// Store-assigned id (UUIDv7).
    pub id: String,
    pub name: String,
    pub photo_url: Option<String>,
    pub creator_id: String,
    /// Preview of the most recent message.
    pub last_message: String,
    /// Epoch-ms timestamp of the most recent message, 0 if none.
    pub last_message_time: i64,
    /// Epoch-ms creation timestamp.
    pub created_at: i64,
}

/// A group to be created; the creator becomes the first member and admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    pub photo_url: Option<String>,
    pub creator: Participant,
}

impl NewGroup {
    pub fn new(name: impl Into<String>, creator: Participant) -> Self {
        Self {
            name: name.into(),
            photo_url: None,
            creator,
        }
    }

    /// Attach a group photo URL.
    pub fn with_photo(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }
}

/// One group membership record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    /// Epoch-ms join timestamp.
    pub joined_at: i64,
}

/// Per-member role, kept in a side table keyed by (group, member).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum GroupRole {
    Admin,
    Member,
}

/// A stored group message, including its receipt sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct GroupMessage {
    /// Store-assigned push key (UUIDv7, time-ordered).
    pub id: String,
    pub group_id: String,
    pub sender_id: String,
    pub sender_name: String,
    /// Body text; blanked when the message is soft-deleted.
    pub body: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    /// Epoch-ms send timestamp, assigned by the store.
    pub sent_at: i64,
    /// Epoch-ms timestamp of the last body edit, if any.
    pub edited_at: Option<i64>,
    /// Epoch-ms soft-delete timestamp; the record itself remains.
    pub deleted_at: Option<i64>,
    /// Members the message was delivered to, from the receipts table.
    #[sqlx(skip)]
    pub delivered_to: Vec<String>,
    /// Members who have read the message, from the receipts table.
    #[sqlx(skip)]
    pub read_by: Vec<String>,
}

impl GroupMessage {
    /// Whether the message has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A group message to be sent; id and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroupMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub body: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
}

impl NewGroupMessage {
    /// Create a plain text group message.
    pub fn text(sender: &Participant, body: impl Into<String>) -> Self {
        Self {
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            body: body.into(),
            kind: MessageKind::Text,
            media_url: None,
        }
    }

    /// Change the payload kind.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach a media URL.
    pub fn with_media(mut self, url: impl Into<String>) -> Self {
        self.media_url = Some(url.into());
        self
    }
}
