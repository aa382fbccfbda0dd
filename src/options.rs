//! Composable tuning options applied while opening a database
//!
//! Options are applied strictly in the order given, each validating its own
//! value against the documented domain. Setting the same underlying key
//! twice — with the same or a different value — is an error, so option order
//! never silently decides which value wins.

use crate::Result;
use crate::config::{
   OpenConfig, PARAM_BUSY_TIMEOUT, PARAM_CACHE_SIZE, PARAM_CASE_SENSITIVE_LIKE,
   PARAM_FOREIGN_KEYS, PARAM_JOURNAL_MODE, PARAM_MMAP_SIZE, PARAM_RECURSIVE_TRIGGERS,
   PARAM_SECURE_DELETE, PARAM_SYNCHRONOUS, PRAGMA_TEMP_STORE,
};
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// A single tuning override for an open operation
///
/// Each variant writes exactly one connection parameter or post-connect
/// pragma. Values are validated when the option is applied, so a failure is
/// always attributable to the option that introduced it.
///
/// The enum derives serde traits so applications can keep their SQLite
/// tuning in configuration files:
///
/// ```
/// use sqlx_sqlite_opener::OpenOption;
///
/// let options: Vec<OpenOption> =
///    serde_json::from_str(r#"[{"busy_timeout_seconds": 30}, {"journal_mode": "WAL"}]"#)
///       .unwrap();
///
/// assert_eq!(options[0], OpenOption::BusyTimeoutSeconds(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenOption {
   /// Run `PRAGMA optimize` on each new physical connection (default:
   /// enabled). See: https://www.sqlite.org/pragma.html#pragma_optimize
   OptimizeOnConnect(bool),

   /// Busy timeout in whole seconds, must be `>= 0`. Stored as milliseconds
   /// in the connection string.
   BusyTimeoutSeconds(i64),

   /// Page cache size in MiB, must be `> 0`. Stored in SQLite's negative-KiB
   /// form.
   CacheSizeMib(i64),

   /// Journal mode: one of `WAL`, `DELETE`, `TRUNCATE`, `PERSIST`, `MEMORY`
   /// or `OFF` (case-insensitive). Ignored by read-only opens, which never
   /// force a journal mode.
   JournalMode(String),

   /// Synchronous level: one of `OFF`, `NORMAL`, `FULL` or `EXTRA`
   /// (case-insensitive)
   Synchronous(String),

   /// Enable or disable foreign key constraint enforcement
   ForeignKeys(bool),

   /// Temporary storage location: one of `DEFAULT`, `FILE` or `MEMORY`
   /// (case-insensitive). Applied as a direct statement on each physical
   /// connection; SQLite does not honor it through the connection string.
   TempStore(String),

   /// Memory-map size in bytes, must be `>= 0` (0 disables memory mapping)
   MmapSize(i64),

   /// Make `LIKE` comparisons case-sensitive
   CaseSensitiveLike(bool),

   /// Allow triggers to fire recursively
   RecursiveTriggers(bool),

   /// Secure delete mode: one of `FAST`, `ON` or `OFF` (case-insensitive)
   SecureDelete(String),
}

impl OpenOption {
   /// Apply this option onto the configuration record, validating the value
   pub(crate) fn apply(&self, config: &mut OpenConfig) -> Result<()> {
      match self {
         OpenOption::OptimizeOnConnect(enabled) => {
            config.set_skip_optimize(!enabled);
            Ok(())
         }

         OpenOption::BusyTimeoutSeconds(seconds) => {
            if *seconds < 0 {
               return Err(Error::InvalidOption {
                  key: PARAM_BUSY_TIMEOUT,
                  message: format!("busy timeout must be >= 0 seconds, got {seconds}"),
               });
            }
            let millis = seconds.checked_mul(1000).ok_or_else(|| Error::InvalidOption {
               key: PARAM_BUSY_TIMEOUT,
               message: format!("busy timeout of {seconds}s overflows milliseconds"),
            })?;
            config.set_param(PARAM_BUSY_TIMEOUT, millis.to_string())
         }

         OpenOption::CacheSizeMib(mib) => {
            if *mib <= 0 {
               return Err(Error::InvalidOption {
                  key: PARAM_CACHE_SIZE,
                  message: format!("cache size must be > 0 MiB, got {mib}"),
               });
            }
            let kib = mib.checked_mul(1024).ok_or_else(|| Error::InvalidOption {
               key: PARAM_CACHE_SIZE,
               message: format!("cache size of {mib} MiB overflows KiB"),
            })?;
            config.set_param(PARAM_CACHE_SIZE, format!("-{kib}"))
         }

         OpenOption::JournalMode(mode) => {
            let canonical = mode.to_uppercase();
            match canonical.as_str() {
               "WAL" | "DELETE" | "TRUNCATE" | "PERSIST" | "MEMORY" | "OFF" => {
                  config.set_param(PARAM_JOURNAL_MODE, canonical)
               }
               _ => Err(Error::InvalidOption {
                  key: PARAM_JOURNAL_MODE,
                  message: format!("invalid journal mode {mode:?}"),
               }),
            }
         }

         OpenOption::Synchronous(level) => {
            let canonical = level.to_uppercase();
            match canonical.as_str() {
               "OFF" | "NORMAL" | "FULL" | "EXTRA" => {
                  config.set_param(PARAM_SYNCHRONOUS, canonical)
               }
               _ => Err(Error::InvalidOption {
                  key: PARAM_SYNCHRONOUS,
                  message: format!("invalid synchronous level {level:?}"),
               }),
            }
         }

         OpenOption::ForeignKeys(enabled) => {
            config.set_param(PARAM_FOREIGN_KEYS, bool_value(*enabled))
         }

         OpenOption::TempStore(store) => {
            let canonical = store.to_uppercase();
            match canonical.as_str() {
               "DEFAULT" | "FILE" | "MEMORY" => config.set_pragma(PRAGMA_TEMP_STORE, canonical),
               _ => Err(Error::InvalidOption {
                  key: PRAGMA_TEMP_STORE,
                  message: format!("invalid temp_store {store:?}"),
               }),
            }
         }

         OpenOption::MmapSize(bytes) => {
            if *bytes < 0 {
               return Err(Error::InvalidOption {
                  key: PARAM_MMAP_SIZE,
                  message: format!("mmap size must be >= 0 bytes, got {bytes}"),
               });
            }
            config.set_param(PARAM_MMAP_SIZE, bytes.to_string())
         }

         OpenOption::CaseSensitiveLike(enabled) => {
            config.set_param(PARAM_CASE_SENSITIVE_LIKE, bool_value(*enabled))
         }

         OpenOption::RecursiveTriggers(enabled) => {
            config.set_param(PARAM_RECURSIVE_TRIGGERS, bool_value(*enabled))
         }

         OpenOption::SecureDelete(mode) => {
            let canonical = mode.to_uppercase();
            match canonical.as_str() {
               "FAST" | "ON" | "OFF" => config.set_param(PARAM_SECURE_DELETE, canonical),
               _ => Err(Error::InvalidOption {
                  key: PARAM_SECURE_DELETE,
                  message: format!("invalid secure_delete {mode:?}"),
               }),
            }
         }
      }
   }
}

fn bool_value(enabled: bool) -> String {
   if enabled { "true" } else { "false" }.to_string()
}
