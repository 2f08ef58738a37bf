//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Entry point name is not one of the four tracked directions
    #[error("Unknown entry point: {name}")]
    UnknownEntry { name: String },

    /// Supply category or item is not tracked
    #[error("Unknown supply item: {category}.{item}")]
    UnknownSupply { category: String, item: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
