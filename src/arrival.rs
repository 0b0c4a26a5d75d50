use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{Coordinates, LocationEvent, ParticipantRole, Ride, RideStatus};
use crate::geo::distance;

/// Radius around a pickup or drop-off point that counts as arrived.
pub const ARRIVAL_THRESHOLD_METERS: f64 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalSignal {
    /// The driver is at the pickup point; the ride may be started.
    AtPickup,
    /// The driver is at the destination; the ride may be completed.
    AtDestination,
}

/// Decides from a single driver position which lifecycle step is enabled.
/// Recomputed on every position with no hysteresis, so a driver hovering at
/// the edge of the radius will toggle the signal.
pub fn arrival_signal(
    status: RideStatus,
    from: Coordinates,
    to: Coordinates,
    driver_position: Coordinates,
) -> Option<ArrivalSignal> {
    match status {
        RideStatus::Booked if distance(driver_position, from) <= ARRIVAL_THRESHOLD_METERS => {
            Some(ArrivalSignal::AtPickup)
        }
        RideStatus::Ongoing if distance(driver_position, to) <= ARRIVAL_THRESHOLD_METERS => {
            Some(ArrivalSignal::AtDestination)
        }
        _ => None,
    }
}

/// Tracks the latest driver position for one ride as relayed events come in.
#[derive(Debug, Clone)]
pub struct ArrivalDetector {
    from: Coordinates,
    to: Coordinates,
    status: RideStatus,
    last_position: Option<(Coordinates, DateTime<Utc>)>,
}

impl ArrivalDetector {
    pub fn new(ride: &Ride) -> Self {
        Self {
            from: ride.from_coordinates,
            to: ride.to_coordinates,
            status: ride.status,
            last_position: None,
        }
    }

    pub fn set_status(&mut self, status: RideStatus) {
        self.status = status;
    }

    pub fn last_position(&self) -> Option<Coordinates> {
        self.last_position.map(|(position, _)| position)
    }

    /// Feeds a relayed event. Passenger positions and events older than the
    /// last accepted one are ignored. Returns the signal for the newest
    /// known driver position.
    pub fn observe(&mut self, event: &LocationEvent) -> Option<ArrivalSignal> {
        if event.role == ParticipantRole::Driver {
            match self.last_position {
                Some((_, seen)) if event.timestamp < seen => {
                    tracing::debug!(ride_id = %event.ride_id, "dropping stale driver position");
                }
                _ => self.last_position = Some((event.coordinates, event.timestamp)),
            }
        }

        self.signal()
    }

    pub fn signal(&self) -> Option<ArrivalSignal> {
        let (position, _) = self.last_position?;
        arrival_signal(self.status, self.from, self.to, position)
    }
}
