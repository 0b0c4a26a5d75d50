use std::future::Future;
use uuid::Uuid;

use super::Engine;
use crate::{
    auth::User,
    entities::{Booking, Member, Ride},
    error::Error,
};

impl Engine {
    /// Runs a store call under the configured deadline. A call that does not
    /// finish in time surfaces as unavailable; the store's own transaction
    /// guarantees nothing was half applied.
    pub(super) async fn bounded<T, F>(&self, call: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(elapsed) => {
                tracing::warn!(timeout = ?self.store_timeout, "store call timed out");
                Err(elapsed.into())
            }
        }
    }

    pub(super) async fn fetch_ride(&self, id: Uuid) -> Result<Ride, Error> {
        self.bounded(self.store.find_ride(id)).await
    }

    pub(super) async fn fetch_booking(&self, id: Uuid) -> Result<Booking, Error> {
        self.bounded(self.store.find_booking(id)).await
    }

    /// Fetches a ride and checks the caller may perform `action` on it. The
    /// driver of a ride never changes, so checking before the locked update
    /// is safe.
    pub(super) async fn authorized_ride(
        &self,
        user: &User,
        action: &str,
        id: Uuid,
    ) -> Result<Ride, Error> {
        let ride = self.fetch_ride(id).await?;
        self.authorize(user.clone(), action.to_string(), ride.clone())?;

        Ok(ride)
    }

    pub(super) async fn authorized_booking(
        &self,
        user: &User,
        action: &str,
        id: Uuid,
    ) -> Result<Booking, Error> {
        let booking = self.fetch_booking(id).await?;
        self.authorize(user.clone(), action.to_string(), booking.clone())?;

        Ok(booking)
    }

    /// A passenger needs a profile before their details can be shared with
    /// a driver.
    pub(super) async fn passenger_profile(&self, passenger_id: Uuid) -> Result<Member, Error> {
        match self.bounded(self.store.find_member(passenger_id)).await {
            Err(err) if err.is_not_found_error() => Err(Error::invalid_state_error()
                .with_message("a member profile is required before booking")),
            result => result,
        }
    }
}
