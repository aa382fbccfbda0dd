//! Connection configuration assembled from options, built-in defaults, and
//! the requested open mode
//!
//! An [`OpenConfig`] is created fresh for every open call, mutated while
//! options are applied and defaults merged, then consumed into the three
//! things the open path actually needs: the canonical connection string, the
//! [`sqlx::sqlite::SqliteConnectOptions`] handed to the driver, and the
//! [`ConnectionInit`] snapshot run against every new physical connection.

use crate::Result;
use crate::error::Error;
use sqlx::sqlite::{
   SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteSynchronous,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::error;

// Connection-string parameter keys. These follow the underscore convention
// used by SQLite URI wrappers: bare keys are consumed by the open itself,
// underscore-prefixed keys configure the connection.
pub(crate) const PARAM_MODE: &str = "mode";
pub(crate) const PARAM_CACHE: &str = "cache";
pub(crate) const PARAM_BUSY_TIMEOUT: &str = "_busy_timeout";
pub(crate) const PARAM_CACHE_SIZE: &str = "_cache_size";
pub(crate) const PARAM_CASE_SENSITIVE_LIKE: &str = "_case_sensitive_like";
pub(crate) const PARAM_FOREIGN_KEYS: &str = "_foreign_keys";
pub(crate) const PARAM_JOURNAL_MODE: &str = "_journal_mode";
pub(crate) const PARAM_MMAP_SIZE: &str = "_mmap_size";
pub(crate) const PARAM_RECURSIVE_TRIGGERS: &str = "_recursive_triggers";
pub(crate) const PARAM_SECURE_DELETE: &str = "_secure_delete";
pub(crate) const PARAM_SYNCHRONOUS: &str = "_synchronous";

// Settings SQLite does not honor through the connection string. These are
// issued as direct PRAGMA statements against each new physical connection.
pub(crate) const PRAGMA_TEMP_STORE: &str = "temp_store";

/// Defaults merged into every open wherever the caller did not set the same
/// key explicitly.
const DEFAULT_PARAMS: &[(&str, &str)] = &[
   // Shared cache is an obsolete feature that SQLite discourages; WAL gives
   // better concurrent access without its complexity, so a private cache is
   // always forced and never configurable.
   // See: https://www.sqlite.org/sharedcache.html
   (PARAM_CACHE, "private"),
   // Not enabled by SQLite itself for backwards-compatibility reasons.
   // See: https://www.sqlite.org/foreignkeys.html
   (PARAM_FOREIGN_KEYS, "true"),
   // SQLite's default of 0 fails immediately with "database is locked".
   // 10 seconds lets complex transactions complete without hanging forever.
   (PARAM_BUSY_TIMEOUT, "10000"),
   // WAL is almost always better than the default DELETE mode.
   // See: https://www.sqlite.org/wal.html
   (PARAM_JOURNAL_MODE, "WAL"),
   // In WAL mode, NORMAL is safe from corruption and equivalent to FULL for
   // application crashes; only power loss can roll back recent commits.
   // See: https://www.sqlite.org/pragma.html#pragma_synchronous
   (PARAM_SYNCHRONOUS, "NORMAL"),
   // Negative means KiB: -32768 is 32 MiB of page cache per connection.
   (PARAM_CACHE_SIZE, "-32768"),
];

/// Access mode requested through one of the three public open operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenMode {
   /// Open an existing database for reads only
   ReadOnly,
   /// Open an existing database for reads and writes
   ReadWrite,
   /// Open for reads and writes, creating the file if missing
   ReadWriteCreate,
}

impl OpenMode {
   /// The connection-string tag for this mode
   pub(crate) fn tag(self) -> &'static str {
      match self {
         OpenMode::ReadOnly => "ro",
         OpenMode::ReadWrite => "rw",
         OpenMode::ReadWriteCreate => "rwc",
      }
   }
}

/// Mutable configuration record threaded through option application and
/// default merging, then consumed by the open path.
///
/// `params` and `pragmas` are disjoint key spaces: `params` holds settings
/// expressible in the connection string (inherited by every physical
/// connection the pool opens), `pragmas` holds settings that must be issued
/// as direct statements after each physical connection is established.
#[derive(Debug, Default)]
pub(crate) struct OpenConfig {
   params: BTreeMap<&'static str, String>,
   pragmas: BTreeMap<&'static str, String>,
   skip_optimize: bool,
}

impl OpenConfig {
   /// Set a connection-string parameter, rejecting a second write to the
   /// same key
   pub(crate) fn set_param(&mut self, key: &'static str, value: String) -> Result<()> {
      if self.params.contains_key(key) {
         return Err(Error::DuplicateOption(key));
      }
      self.params.insert(key, value);
      Ok(())
   }

   /// Set a post-connect pragma, rejecting a second write to the same key
   pub(crate) fn set_pragma(&mut self, key: &'static str, value: String) -> Result<()> {
      if self.pragmas.contains_key(key) {
         return Err(Error::DuplicateOption(key));
      }
      self.pragmas.insert(key, value);
      Ok(())
   }

   /// Suppress or restore the per-connection `PRAGMA optimize` (run by
   /// default on every new physical connection)
   pub(crate) fn set_skip_optimize(&mut self, skip: bool) {
      self.skip_optimize = skip;
   }

   /// Merge built-in defaults wherever the caller did not already set the
   /// same key explicitly. Explicit values always win and are never merged
   /// over.
   pub(crate) fn merge_defaults(&mut self) {
      for &(key, value) in DEFAULT_PARAMS {
         self.params.entry(key).or_insert_with(|| value.to_string());
      }
      // Keeping temporary tables and indices out of the filesystem is the
      // right default for the same workloads that want WAL.
      self
         .pragmas
         .entry(PRAGMA_TEMP_STORE)
         .or_insert_with(|| "MEMORY".to_string());
   }

   /// Record the open mode and apply its adjustments.
   ///
   /// A read-only open must never force a journal mode: whatever mode the
   /// database file is already in is respected as-is, so any journal-mode
   /// key (caller-supplied or default) is removed entirely.
   pub(crate) fn apply_mode(&mut self, mode: OpenMode) {
      self.params.insert(PARAM_MODE, mode.tag().to_string());
      if mode == OpenMode::ReadOnly {
         self.params.remove(PARAM_JOURNAL_MODE);
      }
   }

   /// Serialize the canonical connection string: `file:<filename>?<k>=<v>&…`
   /// with keys in lexicographic order, so the same configuration always
   /// produces a byte-identical string.
   /// See: https://www.sqlite.org/uri.html
   pub(crate) fn connection_string(&self, filename: &str) -> String {
      let mut dsn = format!("file:{filename}");
      for (i, (key, value)) in self.params.iter().enumerate() {
         dsn.push(if i == 0 { '?' } else { '&' });
         dsn.push_str(key);
         dsn.push('=');
         dsn.push_str(value);
      }
      dsn
   }

   /// Translate the connection-string parameters onto the driver's
   /// [`SqliteConnectOptions`].
   ///
   /// Every key produced by option application or the default merge has a
   /// translation; hitting an unknown key or mode tag here means internal
   /// state was corrupted, and is reported rather than ignored.
   pub(crate) fn connect_options(&self, filename: &Path) -> Result<SqliteConnectOptions> {
      let mut options = SqliteConnectOptions::new().filename(filename);

      for (key, value) in &self.params {
         options = match *key {
            PARAM_MODE => match value.as_str() {
               "ro" => options.read_only(true),
               "rw" => options,
               "rwc" => options.create_if_missing(true),
               other => return Err(Error::InvalidMode(other.to_string())),
            },
            // Only "private" is ever emitted; shared cache is never offered.
            PARAM_CACHE => options.shared_cache(false),
            PARAM_BUSY_TIMEOUT => {
               let millis: u64 = value.parse().map_err(|_| Error::InvalidOption {
                  key: PARAM_BUSY_TIMEOUT,
                  message: format!("expected milliseconds, got {value:?}"),
               })?;
               options.busy_timeout(Duration::from_millis(millis))
            }
            PARAM_JOURNAL_MODE => options.journal_mode(journal_mode_from_str(value)?),
            PARAM_SYNCHRONOUS => options.synchronous(synchronous_from_str(value)?),
            PARAM_FOREIGN_KEYS => options.foreign_keys(value == "true"),
            PARAM_CACHE_SIZE => options.pragma("cache_size", value.clone()),
            PARAM_MMAP_SIZE => options.pragma("mmap_size", value.clone()),
            PARAM_CASE_SENSITIVE_LIKE => options.pragma("case_sensitive_like", value.clone()),
            PARAM_RECURSIVE_TRIGGERS => options.pragma("recursive_triggers", value.clone()),
            PARAM_SECURE_DELETE => options.pragma("secure_delete", value.clone()),
            other => {
               return Err(Error::InvalidOption {
                  key: other,
                  message: "no connection-string translation".to_string(),
               });
            }
         };
      }

      Ok(options)
   }

   /// Consume the record into the immutable snapshot run against every new
   /// physical connection
   pub(crate) fn into_init(self) -> ConnectionInit {
      ConnectionInit {
         run_optimize: !self.skip_optimize,
         pragmas: self.pragmas.into_iter().collect(),
      }
   }

   #[cfg(test)]
   pub(crate) fn param(&self, key: &str) -> Option<&str> {
      self.params.get(key).map(String::as_str)
   }

   #[cfg(test)]
   pub(crate) fn pragma(&self, key: &str) -> Option<&str> {
      self.pragmas.get(key).map(String::as_str)
   }
}

fn journal_mode_from_str(value: &str) -> Result<SqliteJournalMode> {
   match value {
      "WAL" => Ok(SqliteJournalMode::Wal),
      "DELETE" => Ok(SqliteJournalMode::Delete),
      "TRUNCATE" => Ok(SqliteJournalMode::Truncate),
      "PERSIST" => Ok(SqliteJournalMode::Persist),
      "MEMORY" => Ok(SqliteJournalMode::Memory),
      "OFF" => Ok(SqliteJournalMode::Off),
      other => Err(Error::InvalidOption {
         key: PARAM_JOURNAL_MODE,
         message: format!("unrecognized journal mode {other:?}"),
      }),
   }
}

fn synchronous_from_str(value: &str) -> Result<SqliteSynchronous> {
   match value {
      "OFF" => Ok(SqliteSynchronous::Off),
      "NORMAL" => Ok(SqliteSynchronous::Normal),
      "FULL" => Ok(SqliteSynchronous::Full),
      "EXTRA" => Ok(SqliteSynchronous::Extra),
      other => Err(Error::InvalidOption {
         key: PARAM_SYNCHRONOUS,
         message: format!("unrecognized synchronous level {other:?}"),
      }),
   }
}

/// Immutable per-connection initialization snapshot.
///
/// Captured once per open call and shared with the pool's new-connection
/// hook. It reads no caller-mutable state, so it is safe to run concurrently
/// for connections the pool opens in parallel.
#[derive(Debug)]
pub(crate) struct ConnectionInit {
   run_optimize: bool,
   pragmas: Vec<(&'static str, String)>,
}

impl ConnectionInit {
   /// Initialize one new physical connection: `PRAGMA optimize` first
   /// (unless suppressed), then each post-connect pragma in sorted order.
   ///
   /// A failure aborts this connection's initialization; the pool discards
   /// the connection and the error surfaces to whichever caller triggered
   /// its creation.
   pub(crate) async fn run(&self, conn: &mut SqliteConnection) -> sqlx::Result<()> {
      if self.run_optimize {
         sqlx::query("PRAGMA optimize")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
               error!(statement = "PRAGMA optimize", error = %e, "connection init failed");
               e
            })?;
      }

      for (name, value) in &self.pragmas {
         let statement = format!("PRAGMA {name}={value}");
         sqlx::query(&statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
               error!(statement = %statement, error = %e, "connection init failed");
               e
            })?;
      }

      Ok(())
   }

   #[cfg(test)]
   pub(crate) fn runs_optimize(&self) -> bool {
      self.run_optimize
   }

   #[cfg(test)]
   pub(crate) fn pragmas(&self) -> &[(&'static str, String)] {
      &self.pragmas
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn default_config(mode: OpenMode) -> OpenConfig {
      let mut config = OpenConfig::default();
      config.merge_defaults();
      config.apply_mode(mode);
      config
   }

   #[test]
   fn test_defaults_present_when_not_overridden() {
      let config = default_config(OpenMode::ReadWriteCreate);

      assert_eq!(config.param(PARAM_CACHE), Some("private"));
      assert_eq!(config.param(PARAM_FOREIGN_KEYS), Some("true"));
      assert_eq!(config.param(PARAM_BUSY_TIMEOUT), Some("10000"));
      assert_eq!(config.param(PARAM_JOURNAL_MODE), Some("WAL"));
      assert_eq!(config.param(PARAM_SYNCHRONOUS), Some("NORMAL"));
      assert_eq!(config.param(PARAM_CACHE_SIZE), Some("-32768"));
      assert_eq!(config.pragma(PRAGMA_TEMP_STORE), Some("MEMORY"));
   }

   #[test]
   fn test_explicit_value_wins_over_default() {
      let mut config = OpenConfig::default();
      config
         .set_param(PARAM_SYNCHRONOUS, "FULL".to_string())
         .unwrap();
      config.merge_defaults();

      assert_eq!(
         config.param(PARAM_SYNCHRONOUS),
         Some("FULL"),
         "default must never merge over an explicit value"
      );
   }

   #[test]
   fn test_duplicate_param_rejected() {
      let mut config = OpenConfig::default();
      config
         .set_param(PARAM_BUSY_TIMEOUT, "5000".to_string())
         .unwrap();

      let err = config
         .set_param(PARAM_BUSY_TIMEOUT, "5000".to_string())
         .unwrap_err();

      assert!(matches!(err, Error::DuplicateOption(PARAM_BUSY_TIMEOUT)));
      assert_eq!(
         config.param(PARAM_BUSY_TIMEOUT),
         Some("5000"),
         "first value must be preserved"
      );
   }

   #[test]
   fn test_duplicate_pragma_rejected() {
      let mut config = OpenConfig::default();
      config
         .set_pragma(PRAGMA_TEMP_STORE, "MEMORY".to_string())
         .unwrap();

      let err = config
         .set_pragma(PRAGMA_TEMP_STORE, "FILE".to_string())
         .unwrap_err();

      assert!(matches!(err, Error::DuplicateOption(PRAGMA_TEMP_STORE)));
   }

   #[test]
   fn test_read_only_strips_journal_mode() {
      let config = default_config(OpenMode::ReadOnly);

      assert_eq!(config.param(PARAM_MODE), Some("ro"));
      assert_eq!(
         config.param(PARAM_JOURNAL_MODE),
         None,
         "read-only opens must not force a journal mode"
      );
   }

   #[test]
   fn test_read_only_strips_explicit_journal_mode() {
      let mut config = OpenConfig::default();
      config
         .set_param(PARAM_JOURNAL_MODE, "DELETE".to_string())
         .unwrap();
      config.merge_defaults();
      config.apply_mode(OpenMode::ReadOnly);

      assert_eq!(config.param(PARAM_JOURNAL_MODE), None);
   }

   #[test]
   fn test_read_write_keeps_journal_mode() {
      let config = default_config(OpenMode::ReadWrite);

      assert_eq!(config.param(PARAM_MODE), Some("rw"));
      assert_eq!(config.param(PARAM_JOURNAL_MODE), Some("WAL"));
   }

   #[test]
   fn test_connection_string_is_sorted_and_deterministic() {
      let config = default_config(OpenMode::ReadWriteCreate);

      let dsn = config.connection_string("app.db");
      assert_eq!(
         dsn,
         "file:app.db?_busy_timeout=10000&_cache_size=-32768&_foreign_keys=true\
          &_journal_mode=WAL&_synchronous=NORMAL&cache=private&mode=rwc"
      );

      // Byte-identical across repeated builds of the same configuration
      assert_eq!(dsn, config.connection_string("app.db"));
      assert_eq!(dsn, default_config(OpenMode::ReadWriteCreate).connection_string("app.db"));
   }

   #[test]
   fn test_connection_string_without_params() {
      let config = OpenConfig::default();
      assert_eq!(config.connection_string("bare.db"), "file:bare.db");
   }

   #[test]
   fn test_connect_options_translates_all_default_keys() {
      let config = default_config(OpenMode::ReadWriteCreate);
      let options = config.connect_options(Path::new("app.db"));

      assert!(options.is_ok(), "every emitted key must have a translation");
   }

   #[test]
   fn test_connect_options_rejects_unknown_mode_tag() {
      let mut config = OpenConfig::default();
      config.set_param(PARAM_MODE, "banana".to_string()).unwrap();

      let err = config.connect_options(Path::new("app.db")).unwrap_err();
      assert!(matches!(err, Error::InvalidMode(tag) if tag == "banana"));
   }

   #[test]
   fn test_journal_mode_parsing_covers_documented_set() {
      for mode in ["WAL", "DELETE", "TRUNCATE", "PERSIST", "MEMORY", "OFF"] {
         assert!(journal_mode_from_str(mode).is_ok(), "{mode} must parse");
      }
      assert!(journal_mode_from_str("wal").is_err(), "canonical form is uppercase");
      assert!(journal_mode_from_str("JOURNAL").is_err());
   }

   #[test]
   fn test_synchronous_parsing_covers_documented_set() {
      for level in ["OFF", "NORMAL", "FULL", "EXTRA"] {
         assert!(synchronous_from_str(level).is_ok(), "{level} must parse");
      }
      assert!(synchronous_from_str("SLOW").is_err());
   }

   #[test]
   fn test_into_init_snapshot() {
      let mut config = OpenConfig::default();
      config.merge_defaults();
      let init = config.into_init();

      assert!(init.runs_optimize(), "optimize runs unless suppressed");
      assert_eq!(init.pragmas(), &[(PRAGMA_TEMP_STORE, "MEMORY".to_string())]);
   }

   #[test]
   fn test_into_init_optimize_suppressed() {
      let mut config = OpenConfig::default();
      config.set_skip_optimize(true);
      let init = config.into_init();

      assert!(!init.runs_optimize());
   }
}
