use axum::extract::{Extension, Json, Path, Query};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::db::SearchQuery;
use crate::entities::{Booking, Ride, RideSpec};
use crate::error::Error;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct SearchParams {
    from: Option<String>,
    to: Option<String>,
    date: Option<String>,
    seats: Option<u32>,
}

#[derive(Serialize, Deserialize)]
pub struct BookingParams {
    seats: u32,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(spec): Json<RideSpec>,
) -> Result<(StatusCode, Json<Ride>), Error> {
    let ride = api.offer_ride(user, spec).await?;

    Ok((StatusCode::CREATED, ride.into()))
}

pub async fn search(
    Extension(api): Extension<DynAPI>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Ride>>, Error> {
    let query = SearchQuery::parse(
        params.from.as_deref(),
        params.to.as_deref(),
        params.date.as_deref(),
        params.seats,
    )?;

    let rides = api.search_rides(query).await?;

    Ok(rides.into())
}

pub async fn mine(Extension(api): Extension<DynAPI>, user: User) -> Result<Json<Vec<Ride>>, Error> {
    let rides = api.rides_by_driver(user).await?;

    Ok(rides.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.find_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn start(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.start_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn complete(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.complete_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.cancel_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn close_bookings(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.close_bookings(user, id).await?;

    Ok(ride.into())
}

pub async fn bookings(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Booking>>, Error> {
    let bookings = api.bookings_for_ride(user, id).await?;

    Ok(bookings.into())
}

pub async fn request_booking(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<BookingParams>,
) -> Result<(StatusCode, Json<Booking>), Error> {
    let booking = api.request_booking(user, id, params.seats).await?;

    Ok((StatusCode::CREATED, booking.into()))
}
