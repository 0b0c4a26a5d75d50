use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::RideAPI,
    auth::{Platform, User},
    db::SearchQuery,
    entities::{Booking, Ride, RideSpec},
    error::Error,
};

#[async_trait]
impl RideAPI for Engine {
    #[tracing::instrument(skip(self, spec))]
    async fn offer_ride(&self, user: User, spec: RideSpec) -> Result<Ride, Error> {
        self.authorize(user.clone(), "offer_ride", Platform::default())?;

        let ride = spec.into_ride(user.id)?;
        self.bounded(self.store.insert_ride(&ride)).await?;

        tracing::info!(ride_id = %ride.id, seats = ride.seats, "ride offered");

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        self.authorized_ride(&user, "read", id).await
    }

    #[tracing::instrument(skip(self))]
    async fn search_rides(&self, query: SearchQuery) -> Result<Vec<Ride>, Error> {
        self.bounded(self.store.search_rides(&query)).await
    }

    #[tracing::instrument(skip(self))]
    async fn rides_by_driver(&self, user: User) -> Result<Vec<Ride>, Error> {
        self.bounded(self.store.rides_by_driver(user.id)).await
    }

    #[tracing::instrument(skip(self))]
    async fn start_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        self.authorized_ride(&user, "start", id).await?;

        // not geofenced here, clients gate the action on arrival at pickup
        let ride = self
            .bounded(self.store.update_ride(id, Box::new(|ride: &mut Ride| ride.start())))
            .await?;

        tracing::info!("ride started");

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn complete_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        self.authorized_ride(&user, "complete", id).await?;

        let ride = self
            .bounded(self.store.update_ride(id, Box::new(|ride: &mut Ride| ride.complete())))
            .await?;

        self.relay.close(id).await;

        tracing::info!("ride completed");

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        self.authorized_ride(&user, "cancel", id).await?;

        let (ride, bookings) = self
            .bounded(self.store.update_ride_with_bookings(
                id,
                Box::new(|ride: &mut Ride, bookings: &mut [Booking]| {
                    ride.cancel()?;

                    for booking in bookings.iter_mut() {
                        if !booking.status.is_terminal() {
                            booking.cancel_by_driver()?;
                        }
                    }

                    Ok(())
                }),
            ))
            .await?;

        self.relay.close(id).await;

        tracing::info!(bookings = bookings.len(), "ride cancelled");

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn close_bookings(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        self.authorized_ride(&user, "close_bookings", id).await?;

        let ride = self
            .bounded(self.store.update_ride(
                id,
                Box::new(|ride: &mut Ride| ride.close_bookings()),
            ))
            .await?;

        tracing::info!(available_seats = ride.available_seats, "bookings closed");

        Ok(ride)
    }
}
