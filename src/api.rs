use async_channel::Sender;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::User;
use crate::db::SearchQuery;
use crate::entities::{
    Booking, Coordinates, LocationEvent, Member, MemberProfile, ParticipantRole, Ride, RideSpec,
};
use crate::error::Error;
use crate::relay::ConnectionId;

#[async_trait]
pub trait MemberAPI {
    async fn register_member(&self, user: User, profile: MemberProfile) -> Result<Member, Error>;

    async fn update_phone(&self, user: User, phone: String) -> Result<Member, Error>;

    async fn find_member(&self, user: User) -> Result<Member, Error>;
}

#[async_trait]
pub trait RideAPI {
    async fn offer_ride(&self, user: User, spec: RideSpec) -> Result<Ride, Error>;

    async fn find_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;

    async fn search_rides(&self, query: SearchQuery) -> Result<Vec<Ride>, Error>;

    async fn rides_by_driver(&self, user: User) -> Result<Vec<Ride>, Error>;

    async fn start_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;

    async fn complete_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;

    async fn cancel_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;

    async fn close_bookings(&self, user: User, id: Uuid) -> Result<Ride, Error>;
}

#[async_trait]
pub trait BookingAPI {
    async fn request_booking(&self, user: User, ride_id: Uuid, seats: u32)
        -> Result<Booking, Error>;

    async fn find_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;

    async fn bookings_for_ride(&self, user: User, ride_id: Uuid) -> Result<Vec<Booking>, Error>;

    async fn bookings_by_passenger(&self, user: User) -> Result<Vec<Booking>, Error>;

    async fn accept_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;

    async fn reject_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;

    async fn cancel_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;
}

#[async_trait]
pub trait TrackingAPI {
    /// Joins the ride's location channel with the role the ride assigns the
    /// caller.
    async fn join_ride(
        &self,
        user: User,
        ride_id: Uuid,
        connection_id: ConnectionId,
        outbox: Sender<LocationEvent>,
    ) -> Result<ParticipantRole, Error>;

    async fn leave_ride(&self, ride_id: Uuid, connection_id: ConnectionId) -> Result<(), Error>;

    async fn publish_location(
        &self,
        ride_id: Uuid,
        connection_id: ConnectionId,
        role: ParticipantRole,
        coordinates: Coordinates,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<usize, Error>;

    async fn disconnect(&self, connection_id: ConnectionId);
}

pub trait API: MemberAPI + RideAPI + BookingAPI + TrackingAPI {}
