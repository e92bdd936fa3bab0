use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState, websocket::websocket_handler};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Auction lifecycle
        .route(
            "/deals/:deal_room_id/start-auction",
            post(handlers::start_auction),
        )
        .route("/auctions/:auction_id", get(handlers::get_auction))
        .route("/auctions/:auction_id/bid", post(handlers::place_bid))
        .route("/auctions/:auction_id/bids", get(handlers::list_bids))
        .route("/auctions/:auction_id/cancel", post(handlers::cancel_auction))
        // Ops endpoints
        .route("/healthz", get(handlers::healthz))
        // WebSocket endpoint
        .route("/ws", get(websocket_handler))
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
