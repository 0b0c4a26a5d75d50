use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Ride;
use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Booking {
    #[polar(attribute)]
    pub id: Uuid,
    #[polar(attribute)]
    pub ride_id: Uuid,
    #[polar(attribute)]
    pub driver_id: Uuid,
    #[polar(attribute)]
    pub passenger_id: Uuid,
    pub seats: u32,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted,
    Rejected,
    CancelledByPassenger,
    CancelledByDriver,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "pending".into(),
            Self::Accepted => "accepted".into(),
            Self::Rejected => "rejected".into(),
            Self::CancelledByPassenger => "cancelled_by_passenger".into(),
            Self::CancelledByDriver => "cancelled_by_driver".into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::CancelledByPassenger | Self::CancelledByDriver
        )
    }
}

impl Booking {
    pub fn new(ride: &Ride, passenger_id: Uuid, seats: u32) -> Result<Self, Error> {
        if seats == 0 {
            return Err(Error::invalid_fields_error(vec!["seats".into()]));
        }

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            ride_id: ride.id,
            driver_id: ride.driver_id,
            passenger_id,
            seats,
            status: Status::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    fn transition(&mut self, status: Status) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    #[tracing::instrument(skip(self), fields(booking_id = %self.id))]
    pub fn accept(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                self.transition(Status::Accepted);
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }

    #[tracing::instrument(skip(self), fields(booking_id = %self.id))]
    pub fn reject(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                self.transition(Status::Rejected);
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }

    /// Returns the status the booking held before it was cancelled.
    #[tracing::instrument(skip(self), fields(booking_id = %self.id))]
    pub fn cancel_by_passenger(&mut self) -> Result<Status, Error> {
        match self.status {
            Status::Pending | Status::Accepted => {
                let previous = self.status;
                self.transition(Status::CancelledByPassenger);
                Ok(previous)
            }
            _ => Err(Error::invalid_state_error()),
        }
    }

    /// Used when the driver withdraws the whole ride.
    #[tracing::instrument(skip(self), fields(booking_id = %self.id))]
    pub fn cancel_by_driver(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Pending | Status::Accepted => {
                self.transition(Status::CancelledByDriver);
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }
}

#[test]
fn booking_requires_seats_test() {
    use crate::entities::ride::sample_spec;

    let ride = sample_spec().into_ride(Uuid::new_v4()).unwrap();
    let err = Booking::new(&ride, Uuid::new_v4(), 0).unwrap_err();

    assert!(err.is_invalid_input_error());
    assert_eq!(err.fields, vec!["seats"]);

    let booking = Booking::new(&ride, Uuid::new_v4(), 2).unwrap();
    assert_eq!(booking.driver_id, ride.driver_id);
    assert_eq!(booking.ride_id, ride.id);
    assert!(booking.is_pending());
}

#[test]
fn only_pending_bookings_move_test() {
    use crate::entities::ride::sample_spec;

    let ride = sample_spec().into_ride(Uuid::new_v4()).unwrap();

    let mut accepted = Booking::new(&ride, Uuid::new_v4(), 1).unwrap();
    accepted.accept().unwrap();
    assert!(accepted.accept().unwrap_err().is_invalid_state_error());
    assert!(accepted.reject().unwrap_err().is_invalid_state_error());

    let mut rejected = Booking::new(&ride, Uuid::new_v4(), 1).unwrap();
    rejected.reject().unwrap();
    assert!(rejected.status.is_terminal());
    assert!(rejected.accept().unwrap_err().is_invalid_state_error());
    assert!(rejected
        .cancel_by_passenger()
        .unwrap_err()
        .is_invalid_state_error());

    assert_eq!(accepted.cancel_by_passenger().unwrap(), Status::Accepted);
    assert_eq!(accepted.status, Status::CancelledByPassenger);
    assert!(accepted
        .cancel_by_passenger()
        .unwrap_err()
        .is_invalid_state_error());
    assert!(accepted.cancel_by_driver().unwrap_err().is_invalid_state_error());

    let mut pending = Booking::new(&ride, Uuid::new_v4(), 1).unwrap();
    pending.cancel_by_driver().unwrap();
    assert_eq!(pending.status, Status::CancelledByDriver);
}
