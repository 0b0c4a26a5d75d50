mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{Booking, Member, Ride, RideStatus};
use crate::error::Error;

/// Checked against the locked ride before a dependent record is written.
pub type RideGuard = Box<dyn FnOnce(&Ride) -> Result<(), Error> + Send>;
pub type RideMutation = Box<dyn FnOnce(&mut Ride) -> Result<(), Error> + Send>;
pub type BookingMutation = Box<dyn FnOnce(&mut Ride, &mut Booking) -> Result<(), Error> + Send>;
pub type RideCascade = Box<dyn FnOnce(&mut Ride, &mut [Booking]) -> Result<(), Error> + Send>;

pub type DynStore = Arc<dyn Store>;

#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub from: String,
    pub to: String,
    pub date: NaiveDate,
    pub min_seats: u32,
}

impl SearchQuery {
    /// Builds a query from loose request parameters. `from`, `to` and a
    /// `YYYY-MM-DD` date are required; seats default to one.
    pub fn parse(
        from: Option<&str>,
        to: Option<&str>,
        date: Option<&str>,
        seats: Option<u32>,
    ) -> Result<Self, Error> {
        let from = from.map(str::trim).filter(|v| !v.is_empty());
        let to = to.map(str::trim).filter(|v| !v.is_empty());
        let date = date.and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok());
        let seats = seats.unwrap_or(1);

        let mut missing = vec![];
        if from.is_none() {
            missing.push("from".to_string());
        }
        if to.is_none() {
            missing.push("to".to_string());
        }
        if date.is_none() {
            missing.push("date".to_string());
        }
        if seats == 0 {
            missing.push("seats".to_string());
        }

        match (from, to, date) {
            (Some(from), Some(to), Some(date)) if seats > 0 => Ok(Self {
                from: from.to_string(),
                to: to.to_string(),
                date,
                min_seats: seats,
            }),
            _ => Err(Error::invalid_fields_error(missing)),
        }
    }

    pub fn matches(&self, ride: &Ride) -> bool {
        ride.status == RideStatus::Available
            && ride.from.to_lowercase() == self.from.to_lowercase()
            && ride.to.to_lowercase() == self.to.to_lowercase()
            && ride.date == self.date
            && ride.available_seats >= self.min_seats
    }
}

/// Durable ride, booking and member records.
///
/// The `update_*` methods are the only way rides and bookings change after
/// they are created. Each runs its closure against the current records while
/// holding the ride exclusively and writes the results back as one unit. If
/// the closure fails, nothing is written.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_member(&self, member: &Member) -> Result<(), Error>;

    async fn find_member(&self, id: Uuid) -> Result<Member, Error>;

    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error>;

    async fn find_ride(&self, id: Uuid) -> Result<Ride, Error>;

    /// Newest first.
    async fn rides_by_driver(&self, driver_id: Uuid) -> Result<Vec<Ride>, Error>;

    /// Only `available` rides, oldest first.
    async fn search_rides(&self, query: &SearchQuery) -> Result<Vec<Ride>, Error>;

    async fn insert_booking(&self, booking: &Booking, guard: RideGuard) -> Result<(), Error>;

    async fn find_booking(&self, id: Uuid) -> Result<Booking, Error>;

    /// Newest first.
    async fn bookings_for_ride(&self, ride_id: Uuid) -> Result<Vec<Booking>, Error>;

    /// Newest first.
    async fn bookings_by_passenger(&self, passenger_id: Uuid) -> Result<Vec<Booking>, Error>;

    async fn update_ride(&self, id: Uuid, f: RideMutation) -> Result<Ride, Error>;

    async fn update_booking(&self, id: Uuid, f: BookingMutation)
        -> Result<(Ride, Booking), Error>;

    async fn update_ride_with_bookings(
        &self,
        id: Uuid,
        f: RideCascade,
    ) -> Result<(Ride, Vec<Booking>), Error>;
}

#[test]
fn search_query_matches_test() {
    use crate::entities::ride::sample_spec;

    let mut ride = sample_spec().into_ride(Uuid::new_v4()).unwrap();

    let query = SearchQuery {
        from: "hyderabad, telangana, india".into(),
        to: "BENGALURU, Karnataka, India".into(),
        date: ride.date,
        min_seats: 2,
    };
    assert!(query.matches(&ride));

    let wider = SearchQuery {
        min_seats: 3,
        ..query.clone()
    };
    assert!(!wider.matches(&ride));

    let other_day = SearchQuery {
        date: ride.date.succ_opt().unwrap(),
        ..query.clone()
    };
    assert!(!other_day.matches(&ride));

    ride.status = RideStatus::Booked;
    assert!(!query.matches(&ride));
}

#[test]
fn search_query_parse_test() {
    let query = SearchQuery::parse(Some(" Hyderabad "), Some("Bengaluru"), Some("2026-11-02"), None)
        .unwrap();
    assert_eq!(query.from, "Hyderabad");
    assert_eq!(query.min_seats, 1);

    let err = SearchQuery::parse(None, Some("Bengaluru"), Some("02/11/2026"), Some(0)).unwrap_err();
    assert!(err.is_invalid_input_error());
    assert_eq!(err.fields, vec!["from", "date", "seats"]);
}
