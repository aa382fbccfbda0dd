//! # sqlx-sqlite-opener
//!
//! A minimal wrapper around SQLx that opens SQLite databases with opinionated
//! defaults for pragmas, connection pooling, and durability.
//!
//! ## Core Types
//!
//! - **[`SqliteDatabase`]**: database handle opened through one of three
//!   access modes (read-only, read-write, read-write-create)
//! - **[`OpenOption`]**: composable tuning overrides for a single open call
//! - **[`Migrator`]**: re-exported from sqlx for running database migrations
//! - **[`Error`]**: error type for open and database operations
//!
//! ## Defaults
//!
//! Every open applies these unless an option overrides the specific setting:
//!
//! - Private cache (always forced; shared cache is never offered)
//! - Foreign key enforcement enabled
//! - 10 second busy timeout
//! - WAL journal mode (skipped entirely for read-only opens)
//! - NORMAL synchronous level
//! - 32 MiB page cache
//! - In-memory temporary storage
//!
//! Connections are pooled (2–8, scaled from available parallelism) and each
//! new physical connection is initialized identically before first use:
//! `PRAGMA optimize`, then any post-connect settings such as `temp_store`.
//!
//! ## Usage
//!
//! ```no_run
//! use sqlx_sqlite_opener::{OpenOption, SqliteDatabase};
//!
//! #[tokio::main]
//! async fn main() -> sqlx_sqlite_opener::Result<()> {
//!     // Open or create with defaults
//!     let db = SqliteDatabase::open_read_write_create("example.db", &[]).await?;
//!
//!     sqlx::query("CREATE TABLE IF NOT EXISTS users (name TEXT)")
//!         .execute(db.pool())
//!         .await?;
//!
//!     db.close().await;
//!
//!     // Reopen read-only with a couple of overrides
//!     let db = SqliteDatabase::open_read_only(
//!         "example.db",
//!         &[
//!             OpenOption::BusyTimeoutSeconds(30),
//!             OpenOption::CacheSizeMib(64),
//!         ],
//!     )
//!     .await?;
//!
//!     let rows = sqlx::query("SELECT name FROM users")
//!         .fetch_all(db.pool())
//!         .await?;
//!
//!     db.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Principles
//!
//! - Uses sqlx's `SqliteConnectOptions` for connection flags and pragmas and
//!   `SqlitePoolOptions` for all pool configuration
//! - Options are validated when applied, so a bad value is attributable to
//!   the option that introduced it; setting the same key twice is an error,
//!   never a silent overwrite
//! - Each open call is self-contained: no global registry, no process-wide
//!   state, independent handles for repeated opens of the same file
//! - A bounded ping after opening fails fast instead of deferring
//!   connectivity problems to the first query
//!
mod config;
mod database;
mod error;
mod options;

// Re-export public types
pub use database::SqliteDatabase;
pub use error::Error;
pub use options::OpenOption;

// Re-export sqlx migrate types for convenience
pub use sqlx::migrate::Migrator;

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
