//! Opening SQLite databases with opinionated pooling and pragma defaults

use crate::Result;
use crate::config::{OpenConfig, OpenMode};
use crate::error::Error;
use crate::options::OpenOption;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Connection, Pool, Sqlite};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Upper bound on the post-open connectivity probe
const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Pool sizing bounds. SQLite's locking model rarely rewards more than 8
/// connections; 2 is the floor so one long write cannot starve a reader.
const MIN_POOL_CONNECTIONS: u32 = 2;
const MAX_POOL_CONNECTIONS: u32 = 8;

/// SQLite database handle with connection pooling and opinionated defaults
///
/// Opened through one of three access modes. Every open applies the same
/// built-in defaults (private cache, foreign keys on, 10s busy timeout, WAL
/// journaling, NORMAL synchronous, 32 MiB page cache, in-memory temp store)
/// unless an [`OpenOption`] overrides the specific setting, and every
/// physical connection the pool establishes is initialized the same way
/// before first use.
///
/// The handle owns the pool; dropping or closing it releases all physical
/// connections. Repeated opens of the same file produce independent handles.
///
/// # Example
///
/// ```no_run
/// use sqlx_sqlite_opener::{OpenOption, SqliteDatabase};
///
/// # async fn example() -> sqlx_sqlite_opener::Result<()> {
/// let db = SqliteDatabase::open_read_write_create(
///    "app.db",
///    &[OpenOption::BusyTimeoutSeconds(30)],
/// )
/// .await?;
///
/// sqlx::query("CREATE TABLE IF NOT EXISTS users (name TEXT)")
///    .execute(db.pool())
///    .await?;
///
/// db.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteDatabase {
   pool: Pool<Sqlite>,

   /// Canonical serialized form of the configuration this handle was opened
   /// with, retained for diagnostics
   connection_string: String,
}

impl SqliteDatabase {
   /// Open an existing database in read-only mode.
   ///
   /// Fails if the file does not exist. The journal mode of the file is
   /// respected as-is: read-only opens never force one, even when a
   /// [`OpenOption::JournalMode`] is supplied.
   pub async fn open_read_only(
      filename: impl AsRef<Path>,
      options: &[OpenOption],
   ) -> Result<Self> {
      Self::open_with_mode(filename.as_ref(), OpenMode::ReadOnly, options).await
   }

   /// Open an existing database with read/write access.
   ///
   /// Fails if the file does not exist.
   pub async fn open_read_write(
      filename: impl AsRef<Path>,
      options: &[OpenOption],
   ) -> Result<Self> {
      Self::open_with_mode(filename.as_ref(), OpenMode::ReadWrite, options).await
   }

   /// Open a database with read/write access, creating it if missing
   pub async fn open_read_write_create(
      filename: impl AsRef<Path>,
      options: &[OpenOption],
   ) -> Result<Self> {
      Self::open_with_mode(filename.as_ref(), OpenMode::ReadWriteCreate, options).await
   }

   async fn open_with_mode(
      filename: &Path,
      mode: OpenMode,
      options: &[OpenOption],
   ) -> Result<Self> {
      let filename_str = filename.to_string_lossy().into_owned();
      if filename_str.is_empty() {
         return Err(Error::EmptyFilename);
      }
      // '?' begins the query component and '#' a fragment; either would be
      // misread as a connection-string delimiter. Rejected before any I/O.
      if filename_str.contains(['?', '#']) {
         return Err(Error::ReservedFilenameCharacters(filename_str));
      }

      // Apply caller options in order, first failure aborts the open
      let mut config = OpenConfig::default();
      for option in options {
         option.apply(&mut config)?;
      }
      config.merge_defaults();
      config.apply_mode(mode);

      let connection_string = config.connection_string(&filename_str);
      let connect_options = config.connect_options(filename)?;
      let init = Arc::new(config.into_init());

      let max_connections = pool_size();
      debug!(
         dsn = %connection_string,
         max_connections,
         "opening sqlite database"
      );

      // Physical connections open lazily; the hook runs once per connection
      // before it is handed out. Connections are never proactively recycled.
      let pool = SqlitePoolOptions::new()
         .max_connections(max_connections)
         .min_connections(0)
         .idle_timeout(None)
         .max_lifetime(None)
         .after_connect(move |conn, _meta| {
            let init = Arc::clone(&init);
            Box::pin(async move { init.run(conn).await })
         })
         .connect_with(connect_options)
         .await
         .map_err(|source| Error::OpenFailed {
            filename: filename_str.clone(),
            source,
         })?;

      // Validate connectivity before handing the pool out, bounded so a
      // wedged file or filesystem fails the open instead of the first query
      match tokio::time::timeout(PING_TIMEOUT, probe(&pool)).await {
         Ok(Ok(())) => {}
         Ok(Err(source)) => {
            pool.close().await;
            return Err(Error::PingFailed {
               filename: filename_str,
               source,
            });
         }
         Err(_elapsed) => {
            pool.close().await;
            return Err(Error::PingTimeout {
               filename: filename_str,
               timeout_secs: PING_TIMEOUT.as_secs(),
            });
         }
      }

      Ok(Self {
         pool,
         connection_string,
      })
   }

   /// Get a reference to the connection pool for executing queries
   ///
   /// # Example
   ///
   /// ```no_run
   /// use sqlx_sqlite_opener::SqliteDatabase;
   ///
   /// # async fn example() -> sqlx_sqlite_opener::Result<()> {
   /// let db = SqliteDatabase::open_read_only("app.db", &[]).await?;
   /// let rows = sqlx::query("SELECT * FROM users")
   ///    .fetch_all(db.pool())
   ///    .await?;
   /// # Ok(())
   /// # }
   /// ```
   pub fn pool(&self) -> &Pool<Sqlite> {
      &self.pool
   }

   /// The canonical connection string this handle was opened with:
   /// `file:<filename>?<key>=<value>&…` with keys in lexicographic order.
   ///
   /// The same filename, mode, and options always produce a byte-identical
   /// string, which makes it useful in logs and tests.
   pub fn connection_string(&self) -> &str {
      &self.connection_string
   }

   /// Run database migrations using the provided migrator
   ///
   /// # Example
   ///
   /// ```no_run
   /// use sqlx_sqlite_opener::SqliteDatabase;
   ///
   /// # async fn example() -> sqlx_sqlite_opener::Result<()> {
   /// let db = SqliteDatabase::open_read_write_create("app.db", &[]).await?;
   /// let migrator = sqlx::migrate::Migrator::new(std::path::Path::new("./migrations")).await?;
   /// db.run_migrations(&migrator).await?;
   /// # Ok(())
   /// # }
   /// ```
   pub async fn run_migrations(&self, migrator: &sqlx::migrate::Migrator) -> Result<()> {
      migrator.run(&self.pool).await?;
      Ok(())
   }

   /// Close the pool, waiting for all pooled connections to be released.
   ///
   /// Idempotent. Operations issued through [`pool()`](Self::pool) after
   /// closing fail with sqlx's pool-closed error.
   pub async fn close(&self) {
      self.pool.close().await;
   }
}

/// Probe one pooled connection; also forces the first physical connection
/// (and its initialization hook) to run eagerly
async fn probe(pool: &Pool<Sqlite>) -> sqlx::Result<()> {
   let mut conn = pool.acquire().await?;
   conn.ping().await
}

/// Size the pool from available parallelism, clamped to `[2, 8]`
fn pool_size() -> u32 {
   let parallelism = std::thread::available_parallelism().map_or(1, std::num::NonZero::get);
   u32::try_from(parallelism)
      .unwrap_or(MAX_POOL_CONNECTIONS)
      .clamp(MIN_POOL_CONNECTIONS, MAX_POOL_CONNECTIONS)
}

#[cfg(test)]
mod tests {
   use super::*;

   #[tokio::test]
   async fn test_empty_filename_rejected() {
      let result = SqliteDatabase::open_read_write_create("", &[]).await;
      assert!(matches!(result.unwrap_err(), Error::EmptyFilename));
   }

   #[tokio::test]
   async fn test_reserved_characters_rejected() {
      for filename in ["data?.db", "data#.db", "dir/da#ta.db"] {
         let result = SqliteDatabase::open_read_write_create(filename, &[]).await;
         assert!(
            matches!(
               result.unwrap_err(),
               Error::ReservedFilenameCharacters(name) if name == filename
            ),
            "{filename} should be rejected"
         );
      }
   }

   #[tokio::test]
   async fn test_invalid_option_aborts_before_io() {
      let result = SqliteDatabase::open_read_write_create(
         "never_created.db",
         &[OpenOption::BusyTimeoutSeconds(-5)],
      )
      .await;

      assert!(matches!(
         result.unwrap_err(),
         Error::InvalidOption { .. }
      ));
      assert!(
         !std::path::Path::new("never_created.db").exists(),
         "option validation must fail before any I/O"
      );
   }

   #[test]
   fn test_pool_size_within_bounds() {
      let size = pool_size();
      assert!(
         (MIN_POOL_CONNECTIONS..=MAX_POOL_CONNECTIONS).contains(&size),
         "pool size {size} outside [2, 8]"
      );
   }
}
