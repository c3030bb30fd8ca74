//! Error types for the server binary.
//!
//! [`ServerError`] wraps every failure that can stop the server during
//! startup or while driving the event stream. Failures of individual events
//! are not server errors; they are reported on the output stream.

/// Top-level error for the server binary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: tradelab_dispatch::ConfigError,
    },

    /// Connecting to or seeding the store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: tradelab_store::StoreError,
    },

    /// Seeding the experiment failed.
    #[error("setup error: {source}")]
    Setup {
        /// The underlying dispatch error.
        #[from]
        source: tradelab_dispatch::DispatchError,
    },

    /// Reading input or writing output failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Encoding a reply failed.
    #[error("encoding error: {source}")]
    Encode {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },

    /// Logging could not be initialized.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
