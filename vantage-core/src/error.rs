//! Error types for VANTAGE operations

use crate::{DataCategory, ExternalService};
use std::time::Duration;
use thiserror::Error;

/// Cache and ledger storage errors.
///
/// Any of these means "the cache is unavailable". Readers degrade to the API
/// path; writers log and move on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cache store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Read failed for {identifier}/{category}: {reason}")]
    ReadFailed {
        identifier: String,
        category: DataCategory,
        reason: String,
    },

    #[error("Write failed for {identifier}/{category}: {reason}")]
    WriteFailed {
        identifier: String,
        category: DataCategory,
        reason: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Corrupt record under {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// External provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("No provider configured for {service}")]
    ProviderNotConfigured { service: ExternalService },

    #[error("Call to {service} timed out after {timeout:?}")]
    Timeout {
        service: ExternalService,
        timeout: Duration,
    },

    #[error("Request to {service} failed with status {status}: {message}")]
    RequestFailed {
        service: ExternalService,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {service}, retry after {retry_after_ms}ms")]
    RateLimited {
        service: ExternalService,
        retry_after_ms: u64,
    },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse {
        service: ExternalService,
        reason: String,
    },

    #[error("{service} has no data for {subject}")]
    NotFound {
        service: ExternalService,
        subject: String,
    },
}

impl ProviderError {
    /// The service this error originated from, when known.
    pub fn service(&self) -> ExternalService {
        match self {
            ProviderError::ProviderNotConfigured { service }
            | ProviderError::Timeout { service, .. }
            | ProviderError::RequestFailed { service, .. }
            | ProviderError::RateLimited { service, .. }
            | ProviderError::InvalidResponse { service, .. }
            | ProviderError::NotFound { service, .. } => *service,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout { .. })
    }
}

/// Daily budget errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BudgetError {
    #[error(
        "Daily budget exceeded for {service} (user {user_id}): \
         {calls_used}/{calls_limit} calls, ${cost_used:.4}/${cost_limit:.2}"
    )]
    Exceeded {
        service: ExternalService,
        user_id: String,
        calls_used: u32,
        calls_limit: u32,
        cost_used: f64,
        cost_limit: f64,
    },

    #[error("Budget status unavailable for {service}: {reason}")]
    Unavailable {
        service: ExternalService,
        reason: String,
    },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Company name '{name}' normalizes to an empty identifier")]
    EmptyIdentifier { name: String },

    #[error("Data type {data_type} is not supported by {operation}")]
    UnsupportedDataType {
        data_type: String,
        operation: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Failure to append a usage or analytics record.
///
/// Returned, never raised: callers inspect it and log it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LogError {
    #[error("Failed to append usage record: {reason}")]
    UsageAppend { reason: String },

    #[error("Failed to append cache event: {reason}")]
    EventAppend { reason: String },
}

/// Master error type for all VANTAGE errors.
#[derive(Debug, Clone, Error)]
pub enum VantageError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Budget error: {0}")]
    Budget(#[from] BudgetError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("No data available for {identifier}: {reason}")]
    NoDataAvailable { identifier: String, reason: String },
}

impl VantageError {
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, VantageError::Budget(BudgetError::Exceeded { .. }))
    }
}

/// Result type alias for VANTAGE operations.
pub type VantageResult<T> = Result<T, VantageError>;

// =============================================================================
// TESTS
// =============================================================================
