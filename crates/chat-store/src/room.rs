//! 1:1 chat room operations.
//!
//! Rooms are keyed by a deterministic id derived from the two participant
//! ids, so both users resolve the same room without coordination.

use sqlx::SqlitePool;

use crate::error::{Result, StoreError};
use crate::models::{Participant, Room};
use crate::now_ms;

/// Deterministic room id for a pair of users.
///
/// The lexicographically smaller id comes first, so
/// `room_id(a, b) == room_id(b, a)`.
pub fn room_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}_{}", a, b)
    } else {
        format!("{}_{}", b, a)
    }
}

/// Create (or overwrite) the room between two participants.
///
/// The record is written at the deterministic id with a fresh timestamp,
/// empty preview and zero unread count. Re-creating an existing room
/// refreshes the participant snapshots and resets the preview; the message
/// log is untouched.
pub async fn create_room(pool: &SqlitePool, a: &Participant, b: &Participant) -> Result<Room> {
    let (first, second) = if a.id <= b.id { (a, b) } else { (b, a) };
    let id = room_id(&a.id, &b.id);
    let created_at = now_ms();

    // Not INSERT OR REPLACE: REPLACE deletes the old row first, and the
    // message log hangs off it with ON DELETE CASCADE.
    sqlx::query(
        r#"
        INSERT INTO rooms (id, user_a, user_b, user_a_name, user_b_name,
                           user_a_photo, user_b_photo, last_message,
                           last_message_time, unread_count, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, '', 0, 0, ?)
        ON CONFLICT(id) DO UPDATE SET
            user_a_name = excluded.user_a_name,
            user_b_name = excluded.user_b_name,
            user_a_photo = excluded.user_a_photo,
            user_b_photo = excluded.user_b_photo,
            last_message = '',
            last_message_time = 0,
            unread_count = 0,
            created_at = excluded.created_at
        "#,
    )
    .bind(&id)
    .bind(&first.id)
    .bind(&second.id)
    .bind(&first.name)
    .bind(&second.name)
    .bind(&first.photo_url)
    .bind(&second.photo_url)
    .bind(created_at)
    .execute(pool)
    .await?;

    get_room(pool, &id).await
}

/// Get a room by id.
pub async fn get_room(pool: &SqlitePool, id: &str) -> Result<Room> {
    sqlx::query_as::<_, Room>(
        r#"
        SELECT id, user_a, user_b, user_a_name, user_b_name,
               user_a_photo, user_b_photo, last_message,
               last_message_time, unread_count, created_at
        FROM rooms
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound {
        entity: "Room",
        id: id.to_string(),
    })
}

/// Get the room between two participants, creating it if missing.
///
/// An existing room is returned unchanged; only a missing room is written.
pub async fn get_or_create_room(
    pool: &SqlitePool,
    a: &Participant,
    b: &Participant,
) -> Result<Room> {
    let (first, second) = if a.id <= b.id { (a, b) } else { (b, a) };
    let id = room_id(&a.id, &b.id);
    let created_at = now_ms();

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO rooms (id, user_a, user_b, user_a_name, user_b_name,
                                     user_a_photo, user_b_photo, last_message,
                                     last_message_time, unread_count, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, '', 0, 0, ?)
        "#,
    )
    .bind(&id)
    .bind(&first.id)
    .bind(&second.id)
    .bind(&first.name)
    .bind(&second.name)
    .bind(&first.photo_url)
    .bind(&second.photo_url)
    .bind(created_at)
    .execute(pool)
    .await?;

    get_room(pool, &id).await
}

/// List all rooms a user participates in, most recent activity first.
pub async fn list_rooms_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Room>> {
    let rooms = sqlx::query_as::<_, Room>(
        r#"
        SELECT id, user_a, user_b, user_a_name, user_b_name,
               user_a_photo, user_b_photo, last_message,
               last_message_time, unread_count, created_at
        FROM rooms
        WHERE user_a = ? OR user_b = ?
        ORDER BY last_message_time DESC
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rooms)
}

/// Delete a room and its message log.
pub async fn delete_room(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM rooms
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Room",
            id: id.to_string(),
        });
    }

    Ok(())
}
