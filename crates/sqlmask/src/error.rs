//! Error types for the masking library.

use thiserror::Error;

/// Main error type for masking operations.
#[derive(Error, Debug)]
pub enum MaskError {
    /// Configuration error (invalid YAML, unknown transformer, bad glob, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQLite error from the storage layer
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema introspection failed
    #[error("Schema introspection failed: {0}")]
    Introspect(String),

    /// Subset expansion failed for a specific table
    #[error("Subset expansion failed for table {table}: {message}")]
    Subset { table: String, message: String },

    /// Transformer failed for a specific column
    #[error("Transform failed for {table}.{column}: {message}")]
    Transform {
        table: String,
        column: String,
        message: String,
    },

    /// Data copy failed for a specific table
    #[error("Copy failed for table {table}: {message}")]
    Copy { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Run cancelled")]
    Cancelled,
}

impl MaskError {
    /// Create a Subset error with table context.
    pub fn subset(table: impl Into<String>, message: impl Into<String>) -> Self {
        MaskError::Subset {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Transform error with `table.column` context.
    pub fn transform(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MaskError::Transform {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a Copy error with table context.
    pub fn copy(table: impl Into<String>, message: impl Into<String>) -> Self {
        MaskError::Copy {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for the CLI: configuration errors exit 2,
    /// cancellation exits 130, everything else exits 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            MaskError::Config(_) | MaskError::Yaml(_) => 2,
            MaskError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for masking operations.
pub type Result<T> = std::result::Result<T, MaskError>;
