//! Live chat fan-out and typing presence for Roam.
//!
//! This crate sits on top of `chat-store` and adds the live layer:
//!
//! - Per-room and per-group event channels (rooms forward appends only;
//!   groups also forward edits and removals)
//! - `Subscription` stream handles that detach on drop
//! - In-memory typing presence per channel
//! - A `Notifier` seam for recipient notifications
//!
//! # Example
//!
//! ```no_run
//! use chat_store::{NewMessage, Participant, Store};
//! use chat_sync::{ChatService, RoomEvent};
//! use futures::StreamExt;
//!
//! # async fn example() -> chat_sync::Result<()> {
//! let store = Store::connect("sqlite:roam.db?mode=rwc").await?;
//! store.migrate().await?;
//! let service = ChatService::new(store);
//!
//! let ada = Participant::new("u-ada", "Ada");
//! let ben = Participant::new("u-ben", "Ben");
//! let room = service.get_or_create_room(&ada, &ben).await?;
//!
//! // Attach the live stream first, then send
//! let mut events = service.subscribe_room(&room.id).await;
//! service
//!     .send_message(&room.id, &NewMessage::text(&ada, &ben, "hi"))
//!     .await?;
//!
//! while let Some(result) = events.next().await {
//!     match result {
//!         Ok(RoomEvent::MessageAdded(message)) => {
//!             println!("{}: {}", message.sender_name, message.body);
//!         }
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod notify;
pub mod service;
pub mod subscription;
pub mod typing;

pub use bus::Bus;
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use events::{GroupEvent, RoomEvent, TypingEvent};
pub use notify::{Notifier, TracingNotifier};
pub use service::ChatService;
pub use subscription::Subscription;
pub use typing::TypingTracker;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
