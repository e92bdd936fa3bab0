use async_trait::async_trait;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::{AuctionParams, Bid};
use crate::error::AuctionError;

// ============================================================================
// Request Types
// ============================================================================

/// Body of `POST /deals/:deal_room_id/start-auction`.
///
/// Every field is optional at the parse layer so that absent ones can be
/// reported together in a single `MissingFields` message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAuctionRequest {
    pub start_price: Option<Decimal>,
    pub min_increment: Option<Decimal>,
    pub duration_minutes: Option<i64>,
    pub invitee_ids: Option<Vec<String>>,
    /// Optional deferred start; omitted means bidding opens immediately
    pub open_at: Option<DateTime<Utc>>,
}

impl StartAuctionRequest {
    pub fn into_params(
        self,
    ) -> std::result::Result<(AuctionParams, Option<DateTime<Utc>>), AuctionError> {
        let mut missing = Vec::new();
        if self.start_price.is_none() {
            missing.push("startPrice");
        }
        if self.min_increment.is_none() {
            missing.push("minIncrement");
        }
        if self.duration_minutes.is_none() {
            missing.push("durationMinutes");
        }
        if self.invitee_ids.is_none() {
            missing.push("inviteeIds");
        }

        match (
            self.start_price,
            self.min_increment,
            self.duration_minutes,
            self.invitee_ids,
        ) {
            (Some(start_price), Some(min_increment), Some(duration_minutes), Some(invitee_ids)) => {
                Ok((
                    AuctionParams {
                        start_price,
                        min_increment,
                        duration_minutes,
                        invitee_ids,
                    },
                    self.open_at,
                ))
            }
            _ => Err(AuctionError::MissingFields {
                fields: missing.join(", "),
            }),
        }
    }
}

/// Body of `POST /auctions/:auction_id/bid`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    pub amount: Option<Decimal>,
}

impl BidRequest {
    pub fn amount(self) -> std::result::Result<Decimal, AuctionError> {
        self.amount.ok_or(AuctionError::MissingFields {
            fields: "amount".to_string(),
        })
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidsListResponse {
    pub bids: Vec<Bid>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
}

// ============================================================================
// Error Envelope
// ============================================================================

/// Flat JSON error body: `{"error": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Bridges engine errors (and the identity gate) to HTTP responses
#[derive(Debug)]
pub enum ApiError {
    Auction(AuctionError),
    /// Missing or empty caller identity
    Unauthorized(String),
    /// Body the JSON extractor could not decode; status carried over
    /// from the rejection
    MalformedBody(StatusCode, String),
}

impl From<AuctionError> for ApiError {
    fn from(err: AuctionError) -> Self {
        Self::Auction(err)
    }
}

/// HTTP status for each error kind
pub fn status_for(err: &AuctionError) -> StatusCode {
    match err {
        AuctionError::AuctionNotFound { .. } | AuctionError::RoomNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        AuctionError::NotSeller | AuctionError::NotInvited => StatusCode::FORBIDDEN,
        AuctionError::AuctionNotActive { .. } | AuctionError::InvalidState(_) => {
            StatusCode::CONFLICT
        }
        AuctionError::BidTooLow { .. }
        | AuctionError::InvalidAmount(_)
        | AuctionError::MissingFields { .. } => StatusCode::BAD_REQUEST,
        AuctionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Auction(err) => {
                let status = status_for(&err);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %err, "request failed internally");
                }
                (status, err.to_string())
            }
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            ApiError::MalformedBody(status, message) => (status, message),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

// ============================================================================
// Request Body Extractor
// ============================================================================

/// `Json` with its rejection folded into the flat error envelope, so an
/// undecodable body answers with the same `{"error": "..."}` shape as
/// every other failure.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::MalformedBody(
                rejection.status(),
                rejection.body_text(),
            )),
        }
    }
}
