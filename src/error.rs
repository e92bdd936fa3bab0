use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the auction service
#[derive(Error, Debug)]
pub enum GavelError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Domain errors
    #[error(transparent)]
    Auction(#[from] AuctionError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Address parsing error: {0}")]
    AddrParsing(#[from] std::net::AddrParseError),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for GavelError
pub type Result<T> = std::result::Result<T, GavelError>;

/// Caller-facing auction errors.
///
/// One variant per rejection kind the facade can surface; the `Display`
/// text is the exact `{error}` payload returned over HTTP and the socket
/// channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuctionError {
    #[error("only the seller can perform this operation")]
    NotSeller,

    #[error("caller is not invited to this auction")]
    NotInvited,

    #[error("auction is not active (state: {state})")]
    AuctionNotActive { state: String },

    #[error("bid too low: minimum acceptable bid is {minimum}")]
    BidTooLow { minimum: Decimal },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("auction not found: {id}")]
    AuctionNotFound { id: String },

    #[error("deal room not found: {deal_room_id}")]
    RoomNotFound { deal_room_id: String },

    #[error("missing required fields: {fields}")]
    MissingFields { fields: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Store or channel failure behind an otherwise valid request; maps to 500
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for caller-facing auction operations
pub type AuctionResult<T> = std::result::Result<T, AuctionError>;

impl AuctionError {
    /// Minimum-stating rejection for an undersized bid
    pub fn bid_too_low(minimum: Decimal) -> Self {
        AuctionError::BidTooLow { minimum }
    }
}
