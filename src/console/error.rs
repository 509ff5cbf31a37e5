//! Console error types

use thiserror::Error;

/// Console error with code and message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConsoleError {
    /// E01: Unknown command
    #[error("E01: unknown command")]
    UnknownCommand,
    /// E02: Value does not parse for the item's type
    #[error("E02: invalid value")]
    InvalidValue,
    /// E03: Missing required argument
    #[error("E03: missing argument")]
    MissingArg,
    /// E04: Value parsed but failed the item's validity check
    #[error("E04: rejected by validity check")]
    Rejected,
    /// E05: No item with that name
    #[error("E05: unknown item")]
    UnknownItem,
    /// E06: Item busy (lock timeout)
    #[error("E06: item busy")]
    Busy,
}

impl ConsoleError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCommand => "E01",
            Self::InvalidValue => "E02",
            Self::MissingArg => "E03",
            Self::Rejected => "E04",
            Self::UnknownItem => "E05",
            Self::Busy => "E06",
        }
    }
}
