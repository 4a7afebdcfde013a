//! End-to-end chat demo.
//!
//! Walks through the whole surface: a 1:1 room with typing indicators
//! and live events, then a group with edits, receipts and a soft
//! delete. Live events are printed from background tasks as they
//! arrive.
//!
//! Run with: cargo run -p chat-sync --example chat_demo
//!
//! Configuration via .env file or environment variables:
//!   ROAM_DB - Database URL (default: sqlite:roam-demo.db?mode=rwc)

use std::env;
use std::time::Duration;

use futures::StreamExt;

use chat_store::{MessageKind, NewGroup, NewGroupMessage, NewMessage, Participant, Store};
use chat_sync::{ChatService, GroupEvent, RoomEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (searches current dir and parents)
    let _ = dotenvy::dotenv();

    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let db_url = env::var("ROAM_DB").unwrap_or_else(|_| "sqlite:roam-demo.db?mode=rwc".to_string());
    println!("Opening {}...", db_url);

    let store = Store::connect(&db_url).await?;
    store.migrate().await?;
    let service = ChatService::new(store);

    let ada = Participant::new("u1", "Ada");
    let ben = Participant::new("u2", "Ben");
    let cam = Participant::new("u3", "Cam");

    // ---- 1:1 room ----
    let room = service.get_or_create_room(&ada, &ben).await?;
    println!("Room {} ready", room.id);

    let mut room_events = service.subscribe_room(&room.id).await;
    let room_printer = tokio::spawn(async move {
        while let Some(event) = room_events.next().await {
            match event {
                Ok(RoomEvent::MessageAdded(m)) => {
                    println!("  [room] {}: {}", m.sender_name, m.body)
                }
                Err(e) => println!("  [room] stream error: {}", e),
            }
        }
    });

    service.set_typing(&room.id, &ada.id, true).await;
    println!("Ada is typing...");
    tokio::time::sleep(Duration::from_millis(200)).await;

    service
        .send_message(&room.id, &NewMessage::text(&ada, &ben, "Landed! Where are you?"))
        .await?;
    service.set_typing(&room.id, &ada.id, false).await;

    service
        .send_message(
            &room.id,
            &NewMessage::text(&ben, &ada, "https://cdn.example/gate.jpg")
                .with_kind(MessageKind::Image)
                .with_media("https://cdn.example/gate.jpg"),
        )
        .await?;

    let flipped = service.mark_as_read(&room.id, &ada.id).await?;
    println!("Ada caught up ({} message read)", flipped);

    for room in service.list_rooms_for_user(&ada.id).await? {
        println!(
            "Inbox: {} | {} | unread {}",
            room.id, room.last_message, room.unread_count
        );
    }

    // ---- Group ----
    let group = service.create_group(&NewGroup::new("Trip planning", ada.clone())).await?;
    service.add_member(&group.id, &ben).await?;
    service.add_member(&group.id, &cam).await?;
    let members = service.group_members(&group.id).await?;
    println!("Group {} with {} members", group.name, members.len());

    let mut group_events = service.subscribe_group(&group.id).await;
    let group_printer = tokio::spawn(async move {
        while let Some(event) = group_events.next().await {
            match event {
                Ok(GroupEvent::MessageAdded(m)) => {
                    println!("  [group] {}: {}", m.sender_name, m.body)
                }
                Ok(GroupEvent::MessageEdited(m)) => {
                    println!(
                        "  [group] updated {}: '{}' (read by {:?})",
                        m.id, m.body, m.read_by
                    )
                }
                Ok(GroupEvent::MessageRemoved { message_id, .. }) => {
                    println!("  [group] removed {}", message_id)
                }
                Err(e) => println!("  [group] stream error: {}", e),
            }
        }
    });

    let sent = service
        .send_group_message(&group.id, &NewGroupMessage::text(&ben, "Meet at gate B12?"))
        .await?;
    service
        .edit_group_message(&group.id, &sent.id, &ben.id, "Meet at gate B14?")
        .await?;
    service.mark_read(&group.id, &sent.id, &cam.id).await?;
    service
        .soft_delete_group_message(&group.id, &sent.id, &ben.id)
        .await?;

    // Let the printers drain, then close the channels by dropping the
    // service. The background streams end on their own.
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(service);
    room_printer.await?;
    group_printer.await?;

    println!("Done.");
    Ok(())
}
