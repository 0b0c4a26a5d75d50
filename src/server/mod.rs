mod extract;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, patch, post},
    Router,
};

use crate::server::handlers::{bookings, members, rides, tracking};
use crate::{api::API, auth::DynIdentityProvider, error::Error};

pub type DynAPI = Arc<dyn API + Send + Sync>;

pub fn router(api: DynAPI, identity: DynIdentityProvider) -> Router {
    Router::new()
        .route("/members", post(members::register))
        .route("/members/me", get(members::find))
        .route("/members/phone", patch(members::update_phone))
        .route("/rides", post(rides::create))
        .route("/rides/search", get(rides::search))
        .route("/rides/mine", get(rides::mine))
        .route("/rides/:id", get(rides::find))
        .route("/rides/:id/start", patch(rides::start))
        .route("/rides/:id/complete", patch(rides::complete))
        .route("/rides/:id/cancel", patch(rides::cancel))
        .route("/rides/:id/close", patch(rides::close_bookings))
        .route(
            "/rides/:id/bookings",
            get(rides::bookings).post(rides::request_booking),
        )
        .route("/bookings/mine", get(bookings::mine))
        .route("/bookings/:id", get(bookings::find))
        .route("/bookings/:id/accept", patch(bookings::accept))
        .route("/bookings/:id/reject", patch(bookings::reject))
        .route("/bookings/:id/cancel", patch(bookings::cancel))
        .route("/tracking", get(tracking::connect))
        .layer(Extension(api))
        .layer(Extension(identity))
}

pub async fn serve<T: API + Sync + Send + 'static>(
    api: T,
    identity: DynIdentityProvider,
    addr: SocketAddr,
) -> Result<(), Error> {
    let api = Arc::new(api) as DynAPI;
    let app = router(api, identity);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "server stopped");
            Error::unexpected_error()
        })
}
