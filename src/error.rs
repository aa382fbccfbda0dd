//! Error types for sqlx-sqlite-opener

use thiserror::Error;

/// Errors that may occur when opening or using a database
#[derive(Error, Debug)]
pub enum Error {
   /// An empty filename was supplied to an open operation
   #[error("filename cannot be empty")]
   EmptyFilename,

   /// The filename contains characters reserved by the connection-string
   /// format. `?` begins the query component and `#` begins a fragment, so
   /// neither may appear in a raw filename.
   #[error("filename {0:?} contains reserved characters ('?' or '#')")]
   ReservedFilenameCharacters(String),

   /// A configuration option was given a value outside its documented domain
   #[error("invalid value for {key}: {message}")]
   InvalidOption {
      /// The connection parameter or pragma the option writes
      key: &'static str,
      /// What was wrong with the supplied value
      message: String,
   },

   /// The same configuration key was set by more than one option. Later
   /// options never silently overwrite earlier ones.
   #[error("{0} already specified")]
   DuplicateOption(&'static str),

   /// The internal open mode tag was unrecognized (defensive, unreachable
   /// through the public open operations)
   #[error("invalid open mode {0:?}")]
   InvalidMode(String),

   /// The database could not be opened
   #[error("failed to open database {filename:?}")]
   OpenFailed {
      /// The filename passed to the open operation
      filename: String,
      /// The underlying sqlx error
      #[source]
      source: sqlx::Error,
   },

   /// Ping validation failed after opening
   #[error("failed to ping database {filename:?}")]
   PingFailed {
      /// The filename passed to the open operation
      filename: String,
      /// The underlying sqlx error
      #[source]
      source: sqlx::Error,
   },

   /// Ping validation did not complete within the allotted time
   #[error("ping of database {filename:?} timed out after {timeout_secs}s")]
   PingTimeout {
      /// The filename passed to the open operation
      filename: String,
      /// The probe timeout that elapsed, in seconds
      timeout_secs: u64,
   },

   /// Error from the sqlx library. Standard sqlx errors are converted to this
   /// variant. Per-connection initialization failures also surface here, at
   /// first use of whichever physical connection failed to initialize.
   #[error("sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Migration error from the sqlx migrate framework
   #[error("migration error: {0}")]
   Migration(#[from] sqlx::migrate::MigrateError),
}
