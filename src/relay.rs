use async_channel::{Sender, TrySendError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::entities::{Coordinates, LocationEvent, ParticipantRole};
use crate::error::Error;

pub type ConnectionId = Uuid;

#[derive(Debug)]
struct Member {
    connection_id: ConnectionId,
    role: ParticipantRole,
    user_id: Uuid,
    outbox: Sender<LocationEvent>,
}

#[derive(Debug)]
enum RideChannel {
    Open(Vec<Member>),
    /// Detached from the map. A handle fetched before the detach must look
    /// the ride up again.
    Closed,
}

/// Per-ride broadcast groups for live position reports.
///
/// Membership is the only state. A connection joins a ride with the role the
/// ride assigned it, and every report it publishes is forwarded to the other
/// members of that ride. Delivery is best effort: a full outbox drops the
/// event and a closed outbox drops the member.
///
/// A group exists only while it has members. The map lock is always taken
/// before a group lock, never while holding one.
#[derive(Debug, Default)]
pub struct LocationRelay {
    channels: RwLock<HashMap<Uuid, Arc<Mutex<RideChannel>>>>,
}

impl LocationRelay {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel(&self, ride_id: &Uuid) -> Option<Arc<Mutex<RideChannel>>> {
        self.channels.read().await.get(ride_id).cloned()
    }

    async fn channel_or_open(&self, ride_id: Uuid) -> Arc<Mutex<RideChannel>> {
        if let Some(channel) = self.channel(&ride_id).await {
            return channel;
        }

        self.channels
            .write()
            .await
            .entry(ride_id)
            .or_insert_with(|| Arc::new(Mutex::new(RideChannel::Open(vec![]))))
            .clone()
    }

    /// Drops the ride's group if nobody is left in it.
    async fn prune(&self, ride_id: Uuid) {
        let mut channels = self.channels.write().await;

        let channel = match channels.get(&ride_id) {
            Some(channel) => channel.clone(),
            None => return,
        };
        let mut channel = channel.lock().await;

        if matches!(&*channel, RideChannel::Open(members) if members.is_empty()) {
            *channel = RideChannel::Closed;
            channels.remove(&ride_id);
            tracing::debug!(%ride_id, "dropped empty ride channel");
        }
    }

    /// Removes the members matching `leaving` and returns how many went.
    async fn remove_where<F>(&self, ride_id: Uuid, leaving: F) -> usize
    where
        F: Fn(&Member) -> bool,
    {
        let channel = match self.channel(&ride_id).await {
            Some(channel) => channel,
            None => return 0,
        };

        let (removed, empty) = match &mut *channel.lock().await {
            RideChannel::Closed => return 0,
            RideChannel::Open(members) => {
                let before = members.len();
                members.retain(|m| !leaving(m));
                (before - members.len(), members.is_empty())
            }
        };

        if empty {
            self.prune(ride_id).await;
        }

        removed
    }

    /// Adds a connection to the ride's group, opening the group if needed.
    /// Joining again replaces the earlier membership of the same connection.
    /// Whether the ride may be tracked at all is the caller's concern.
    #[tracing::instrument(skip(self, outbox))]
    pub async fn join(
        &self,
        ride_id: Uuid,
        connection_id: ConnectionId,
        role: ParticipantRole,
        user_id: Uuid,
        outbox: Sender<LocationEvent>,
    ) {
        loop {
            let channel = self.channel_or_open(ride_id).await;
            let mut channel = channel.lock().await;

            if let RideChannel::Open(members) = &mut *channel {
                members.retain(|m| m.connection_id != connection_id);
                members.push(Member {
                    connection_id,
                    role,
                    user_id,
                    outbox,
                });

                tracing::info!(members = members.len(), "joined ride channel");

                return;
            }
        }
    }

    /// Returns whether the connection was a member.
    #[tracing::instrument(skip(self))]
    pub async fn leave(&self, ride_id: Uuid, connection_id: ConnectionId) -> bool {
        self.remove_where(ride_id, |m| m.connection_id == connection_id)
            .await
            > 0
    }

    /// Drops every connection a user holds in the ride, for when they are no
    /// longer a participant. Returns how many connections were removed.
    #[tracing::instrument(skip(self))]
    pub async fn remove_user(&self, ride_id: Uuid, user_id: Uuid) -> usize {
        let removed = self.remove_where(ride_id, |m| m.user_id == user_id).await;

        if removed > 0 {
            tracing::info!(removed, "removed user from ride channel");
        }

        removed
    }

    /// Removes a closed socket from every group it joined.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let rides: Vec<Uuid> = self.channels.read().await.keys().copied().collect();

        for ride_id in rides {
            self.remove_where(ride_id, |m| m.connection_id == connection_id)
                .await;
        }
    }

    /// Tears the group down. Members stop receiving reports and publishes
    /// for the ride fail until someone joins again.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self, ride_id: Uuid) {
        let channel = match self.channels.write().await.remove(&ride_id) {
            Some(channel) => channel,
            None => return,
        };
        let mut channel = channel.lock().await;

        if let RideChannel::Open(members) = &*channel {
            tracing::info!(members = members.len(), "closing ride channel");
        }

        *channel = RideChannel::Closed;
    }

    /// Forwards a position report to every other member of the ride and
    /// returns how many outboxes accepted it.
    #[tracing::instrument(skip(self))]
    pub async fn publish(
        &self,
        ride_id: Uuid,
        connection_id: ConnectionId,
        role: ParticipantRole,
        coordinates: Coordinates,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<usize, Error> {
        if !coordinates.is_valid() {
            return Err(Error::invalid_fields_error(vec!["coordinates".into()]));
        }

        let channel = self
            .channel(&ride_id)
            .await
            .ok_or_else(Error::invalid_state_error)?;
        let mut channel = channel.lock().await;

        let members = match &mut *channel {
            RideChannel::Closed => return Err(Error::invalid_state_error()),
            RideChannel::Open(members) => members,
        };

        let sender = members
            .iter()
            .find(|m| m.connection_id == connection_id)
            .ok_or_else(Error::unauthorized_error)?;

        if sender.role != role {
            tracing::warn!(joined_as = ?sender.role, "publish with a different role");
            return Err(Error::unauthorized_error());
        }

        let event = LocationEvent {
            ride_id,
            role,
            user_id: sender.user_id,
            coordinates,
            timestamp: timestamp.unwrap_or_else(Utc::now),
        };

        let mut delivered = 0;

        members.retain(|m| {
            if m.connection_id == connection_id {
                return true;
            }

            match m.outbox.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(connection_id = %m.connection_id, "outbox full, dropping report");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %m.connection_id, "outbox closed, dropping member");
                    false
                }
            }
        });

        Ok(delivered)
    }

    #[cfg(test)]
    pub(crate) async fn member_count(&self, ride_id: Uuid) -> usize {
        match self.channel(&ride_id).await {
            Some(channel) => match &*channel.lock().await {
                RideChannel::Open(members) => members.len(),
                RideChannel::Closed => 0,
            },
            None => 0,
        }
    }

    #[cfg(test)]
    pub(crate) async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}
