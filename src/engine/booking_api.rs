use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::BookingAPI,
    auth::User,
    entities::{Booking, BookingStatus, PassengerSnapshot, Ride},
    error::Error,
};

#[async_trait]
impl BookingAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn request_booking(
        &self,
        user: User,
        ride_id: Uuid,
        seats: u32,
    ) -> Result<Booking, Error> {
        let ride = self.authorized_ride(&user, "request_booking", ride_id).await?;
        self.passenger_profile(user.id).await?;

        let booking = Booking::new(&ride, user.id, seats)?;

        // seats are claimed on acceptance; the request only has to fit today
        self.bounded(self.store.insert_booking(
            &booking,
            Box::new(move |ride: &Ride| {
                if !ride.is_available() {
                    return Err(Error::invalid_state_error().with_message("ride is not available"));
                }

                if seats > ride.available_seats {
                    return Err(Error::invalid_fields_error(vec!["seats".into()])
                        .with_message("not enough seats available"));
                }

                Ok(())
            }),
        ))
        .await?;

        tracing::info!(booking_id = %booking.id, "booking requested");

        Ok(booking)
    }

    #[tracing::instrument(skip(self))]
    async fn find_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        self.authorized_booking(&user, "read", id).await
    }

    #[tracing::instrument(skip(self))]
    async fn bookings_for_ride(&self, user: User, ride_id: Uuid) -> Result<Vec<Booking>, Error> {
        self.authorized_ride(&user, "list_bookings", ride_id).await?;

        self.bounded(self.store.bookings_for_ride(ride_id)).await
    }

    #[tracing::instrument(skip(self))]
    async fn bookings_by_passenger(&self, user: User) -> Result<Vec<Booking>, Error> {
        self.bounded(self.store.bookings_by_passenger(user.id)).await
    }

    #[tracing::instrument(skip(self))]
    async fn accept_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        let booking = self.authorized_booking(&user, "accept", id).await?;

        if !booking.is_pending() {
            return Err(Error::invalid_state_error());
        }

        let member = self.passenger_profile(booking.passenger_id).await?;

        // status, seat count and passenger list change together or not at all
        let result = self
            .bounded(self.store.update_booking(
                id,
                Box::new(move |ride: &mut Ride, booking: &mut Booking| {
                    booking.accept()?;
                    let snapshot = PassengerSnapshot::new(booking, &member);
                    ride.admit(booking, snapshot)
                }),
            ))
            .await;

        let (ride, booking) = match result {
            Ok(updated) => updated,
            Err(err) => {
                if err.is_conflict_error() {
                    tracing::info!("lost the seat race, booking stays pending");
                }
                return Err(err);
            }
        };

        tracing::info!(
            available_seats = ride.available_seats,
            ride_status = %ride.status.name(),
            "booking accepted"
        );

        Ok(booking)
    }

    #[tracing::instrument(skip(self))]
    async fn reject_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        self.authorized_booking(&user, "reject", id).await?;

        let (_, booking) = self
            .bounded(self.store.update_booking(
                id,
                Box::new(|_: &mut Ride, booking: &mut Booking| booking.reject()),
            ))
            .await?;

        tracing::info!("booking rejected");

        Ok(booking)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        self.authorized_booking(&user, "cancel", id).await?;

        let (ride, booking) = self
            .bounded(self.store.update_booking(
                id,
                Box::new(|ride: &mut Ride, booking: &mut Booking| {
                    if booking.cancel_by_passenger()? == BookingStatus::Accepted {
                        let restored = ride.release(booking)?;
                        tracing::info!(restored, "accepted passenger withdrew");
                    }

                    Ok(())
                }),
            ))
            .await?;

        if ride.role_of(booking.passenger_id).is_none() {
            self.relay.remove_user(ride.id, booking.passenger_id).await;
        }

        tracing::info!(available_seats = ride.available_seats, "booking cancelled");

        Ok(booking)
    }
}
