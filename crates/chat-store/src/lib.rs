//! SQLite persistence layer for Roam chat.
//!
//! This crate provides async store operations for 1:1 rooms, messages,
//! groups and their membership/receipt records using SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use chat_store::{room, Participant, Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let store = Store::connect("sqlite:roam.db?mode=rwc").await?;
//!     store.migrate().await?;
//!
//!     // Get or create the room between two users
//!     let ada = Participant::new("u-ada", "Ada");
//!     let ben = Participant::new("u-ben", "Ben");
//!     let room = room::get_or_create_room(store.pool(), &ada, &ben).await?;
//!     println!("room {}", room.id);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod group;
pub mod group_message;
pub mod message;
pub mod models;
pub mod room;

pub use error::{Result, StoreError};
pub use models::{
    Group, GroupMember, GroupMessage, GroupRole, Message, MessageKind, NewGroup, NewGroupMessage,
    NewMessage, Participant, Room,
};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Current time as epoch milliseconds; the timestamp stamped onto every
/// record this crate writes.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Store connection wrapper.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Default pool size for store connections.
    const DEFAULT_POOL_SIZE: u32 = 8;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// Use `?mode=rwc` to create the database file if it doesn't exist.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example() -> chat_store::Result<()> {
    /// // File database
    /// let store = chat_store::Store::connect("sqlite:data/roam.db?mode=rwc").await?;
    ///
    /// // In-memory database (for testing)
    /// let store = chat_store::Store::connect("sqlite::memory:").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!("Connected to store: {} (pool size: {})", url, pool_size);

        Ok(Self { pool })
    }

    /// Run database migrations.
    ///
    /// This should be called once after connecting to ensure the schema is up to date.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running store migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
