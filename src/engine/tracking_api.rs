use super::Engine;

use async_channel::Sender;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    api::TrackingAPI,
    auth::User,
    entities::{Coordinates, LocationEvent, ParticipantRole},
    error::Error,
    relay::ConnectionId,
};

#[async_trait]
impl TrackingAPI for Engine {
    #[tracing::instrument(skip(self, outbox))]
    async fn join_ride(
        &self,
        user: User,
        ride_id: Uuid,
        connection_id: ConnectionId,
        outbox: Sender<LocationEvent>,
    ) -> Result<ParticipantRole, Error> {
        let ride = self.authorized_ride(&user, "track", ride_id).await?;

        if !ride.is_trackable() {
            return Err(Error::invalid_state_error());
        }

        let role = ride
            .role_of(user.id)
            .ok_or_else(Error::unauthorized_error)?;

        self.relay
            .join(ride_id, connection_id, role, user.id, outbox)
            .await;

        // A completion or cancellation that landed after the first read has
        // already closed the group, so the join must not outlive it.
        let ride = match self.fetch_ride(ride_id).await {
            Ok(ride) => ride,
            Err(err) => {
                self.relay.leave(ride_id, connection_id).await;
                return Err(err);
            }
        };

        if !ride.is_trackable() || ride.role_of(user.id) != Some(role) {
            self.relay.leave(ride_id, connection_id).await;
            tracing::info!(status = %ride.status.name(), "ride changed while joining");
            return Err(Error::invalid_state_error());
        }

        Ok(role)
    }

    #[tracing::instrument(skip(self))]
    async fn leave_ride(&self, ride_id: Uuid, connection_id: ConnectionId) -> Result<(), Error> {
        if !self.relay.leave(ride_id, connection_id).await {
            tracing::debug!("connection was not in the ride channel");
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn publish_location(
        &self,
        ride_id: Uuid,
        connection_id: ConnectionId,
        role: ParticipantRole,
        coordinates: Coordinates,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<usize, Error> {
        self.relay
            .publish(ride_id, connection_id, role, coordinates, timestamp)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn disconnect(&self, connection_id: ConnectionId) {
        self.relay.disconnect(connection_id).await
    }
}
