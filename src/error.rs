//! Error types for the lease and configuration stores.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

/// Errors that can occur while storing or retrieving leases and configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system I/O error (settings file, on-disk database).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (settings file, user context).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend could not be opened.
    ///
    /// Raised at construction time on connectivity failure or when the
    /// schema version stored in the database differs from the one this
    /// code expects.
    #[error("unable to open database: {0}")]
    DbOpen(String),

    /// The statement catalog does not line up with the statement index.
    ///
    /// Turns a silent indexing bug into a startup failure.
    #[error("statement catalog mismatch: {0}")]
    SchemaMismatch(String),

    /// The backend rejected a well-formed request or an integrity
    /// invariant was violated.
    #[error("database operation failed: {0}")]
    DbOperation(String),

    /// A row was rejected because of a primary or unique key conflict.
    ///
    /// Lease inserts translate this into a `false` result.
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    /// A lease could not be marshalled to or from its row representation.
    #[error("could not convert lease {address}: {reason}")]
    DataConversion {
        /// The lease address, or `"<unknown>"` when the row could not be
        /// decoded far enough to find it.
        address: String,
        /// The underlying cause.
        reason: String,
    },

    /// A value supplied by the caller is malformed or out of range.
    #[error("bad value: {0}")]
    BadValue(String),

    /// The lease targeted by an update does not exist.
    #[error("no such lease: {0}")]
    NoSuchLease(String),

    /// A single-result query matched more than one row.
    #[error("multiple records: {0}")]
    MultipleRecords(String),

    /// An accessor for one address family was called with the other one.
    #[error("invalid address family: {0}")]
    InvalidAddressFamily(String),

    /// The operation is intentionally unsupported by this backend.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// No backend factory is registered for the requested type.
    #[error("unknown backend type: {0}")]
    UnknownBackend(String),

    /// Invalid settings.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate) when the
    /// settings contain invalid values (e.g., a missing database type).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn conversion(address: impl ToString, reason: impl ToString) -> Self {
        Self::DataConversion {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A specialized Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;
