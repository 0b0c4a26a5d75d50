use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Booking, Coordinates, Member, ParticipantRole};
use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub from: String,
    pub to: String,
    pub from_coordinates: Coordinates,
    pub to_coordinates: Coordinates,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub seats: u32,
    pub available_seats: u32,
    pub price_per_seat: f64,
    pub car_details: CarDetails,
    pub status: Status,
    pub passengers: Vec<PassengerSnapshot>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Available,
    Booked,
    Ongoing,
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CarDetails {
    pub model: String,
    pub license_plate: String,
    pub color: String,
}

/// Contact details of an accepted passenger, captured when the booking is
/// accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassengerSnapshot {
    pub booking_id: Uuid,
    pub passenger_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub picture: Option<String>,
    pub seats_booked: u32,
}

impl PassengerSnapshot {
    pub fn new(booking: &Booking, member: &Member) -> Self {
        Self {
            booking_id: booking.id,
            passenger_id: booking.passenger_id,
            name: member.name.clone(),
            phone: member.phone.clone(),
            email: member.email.clone(),
            picture: member.picture.clone(),
            seats_booked: booking.seats,
        }
    }
}

/// Unvalidated ride offer as submitted by a driver.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RideSpec {
    pub from: Option<String>,
    pub to: Option<String>,
    pub from_coordinates: Option<Coordinates>,
    pub to_coordinates: Option<Coordinates>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub available_seats: Option<u32>,
    pub price_per_seat: Option<f64>,
    pub car_details: Option<CarDetailsSpec>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CarDetailsSpec {
    pub model: Option<String>,
    pub license_plate: Option<String>,
    pub color: Option<String>,
}

fn required_text(value: &Option<String>, field: &str, missing: &mut Vec<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => {
            missing.push(field.to_string());
            String::new()
        }
    }
}

fn required_coordinates(
    value: &Option<Coordinates>,
    field: &str,
    missing: &mut Vec<String>,
) -> Coordinates {
    match value {
        Some(coordinates) if coordinates.is_valid() => *coordinates,
        _ => {
            missing.push(field.to_string());
            Coordinates::new(0.0, 0.0)
        }
    }
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Available => "available".into(),
            Self::Booked => "booked".into(),
            Self::Ongoing => "ongoing".into(),
            Self::Completed => "completed".into(),
            Self::Cancelled => "cancelled".into(),
        }
    }

    /// Position along available -> booked -> ongoing -> completed.
    /// Cancelled sits after every state it can be reached from.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Available => 0,
            Self::Booked => 1,
            Self::Ongoing => 2,
            Self::Completed | Self::Cancelled => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl PolarClass for Ride {
    fn get_polar_class_builder() -> oso::ClassBuilder<Ride> {
        oso::Class::builder()
            .name("Ride")
            .add_attribute_getter("id", |recv: &Ride| recv.id)
            .add_attribute_getter("driver_id", |recv: &Ride| recv.driver_id)
            .add_attribute_getter("status", |recv: &Ride| recv.status.name())
            .add_attribute_getter("passenger_ids", |recv: &Ride| recv.passenger_ids())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Ride::get_polar_class_builder();
        builder.build()
    }
}

impl RideSpec {
    /// Builds a ride in the `available` state, reporting every missing or
    /// malformed field at once.
    pub fn into_ride(self, driver_id: Uuid) -> Result<Ride, Error> {
        let mut missing = vec![];

        let from = required_text(&self.from, "from", &mut missing);
        let to = required_text(&self.to, "to", &mut missing);
        let from_coordinates =
            required_coordinates(&self.from_coordinates, "from_coordinates", &mut missing);
        let to_coordinates =
            required_coordinates(&self.to_coordinates, "to_coordinates", &mut missing);

        if self.date.is_none() {
            missing.push("date".into());
        }
        if self.time.is_none() {
            missing.push("time".into());
        }

        let seats = match self.available_seats {
            Some(seats) if seats > 0 => seats,
            _ => {
                missing.push("available_seats".into());
                0
            }
        };

        let price_per_seat = match self.price_per_seat {
            Some(price) if price.is_finite() && price >= 0.0 => price,
            _ => {
                missing.push("price_per_seat".into());
                0.0
            }
        };

        let car = self.car_details.unwrap_or_default();
        let car_details = CarDetails {
            model: required_text(&car.model, "car_details.model", &mut missing),
            license_plate: required_text(
                &car.license_plate,
                "car_details.license_plate",
                &mut missing,
            ),
            color: required_text(&car.color, "car_details.color", &mut missing),
        };

        match (self.date, self.time) {
            (Some(date), Some(time)) if missing.is_empty() => Ok(Ride {
                id: Uuid::new_v4(),
                driver_id,
                from,
                to,
                from_coordinates,
                to_coordinates,
                date,
                time,
                seats,
                available_seats: seats,
                price_per_seat,
                car_details,
                status: Status::Available,
                passengers: vec![],
                created_at: Utc::now(),
            }),
            _ => Err(Error::invalid_fields_error(missing)),
        }
    }
}

impl Ride {
    pub fn is_available(&self) -> bool {
        self.status == Status::Available
    }

    /// Location reports are only relayed while the ride is booked or underway.
    pub fn is_trackable(&self) -> bool {
        matches!(self.status, Status::Booked | Status::Ongoing)
    }

    pub fn passenger_ids(&self) -> Vec<Uuid> {
        self.passengers.iter().map(|p| p.passenger_id).collect()
    }

    pub fn role_of(&self, user_id: Uuid) -> Option<ParticipantRole> {
        if self.driver_id == user_id {
            return Some(ParticipantRole::Driver);
        }

        self.passengers
            .iter()
            .any(|p| p.passenger_id == user_id)
            .then_some(ParticipantRole::Passenger)
    }

    pub fn accepted_seats(&self) -> u32 {
        self.passengers.iter().map(|p| p.seats_booked).sum()
    }

    /// Seats a booking onto the ride. Fails with a conflict, leaving the ride
    /// untouched, when fewer than the requested seats remain.
    #[tracing::instrument(skip(self, snapshot), fields(ride_id = %self.id))]
    pub fn admit(&mut self, booking: &Booking, snapshot: PassengerSnapshot) -> Result<(), Error> {
        match self.status {
            Status::Available | Status::Booked => {}
            _ => return Err(Error::invalid_state_error()),
        }

        if booking.ride_id != self.id {
            return Err(Error::invalid_input_error());
        }

        let remaining = self.available_seats.checked_sub(booking.seats).ok_or_else(|| {
            tracing::warn!(
                requested = booking.seats,
                available = self.available_seats,
                "not enough seats left"
            );
            Error::conflict_error().with_message("not enough seats available")
        })?;

        self.available_seats = remaining;
        self.passengers.push(snapshot);

        if self.available_seats == 0 && self.status == Status::Available {
            self.status = Status::Booked;
        }

        Ok(())
    }

    /// Removes an accepted passenger. Seats return to the inventory only
    /// while the ride is still open; a booked ride keeps its status and the
    /// seats are forfeited. Returns whether seats were restored.
    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn release(&mut self, booking: &Booking) -> Result<bool, Error> {
        match self.status {
            Status::Available | Status::Booked => {}
            _ => return Err(Error::invalid_state_error()),
        }

        let before = self.passengers.len();
        self.passengers.retain(|p| p.booking_id != booking.id);

        if self.passengers.len() == before {
            return Err(Error::invalid_state_error());
        }

        if self.status == Status::Available {
            self.available_seats = (self.available_seats + booking.seats).min(self.seats);
            return Ok(true);
        }

        Ok(false)
    }

    /// Stops taking requests on a partly filled ride so it can be started.
    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn close_bookings(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Available if !self.passengers.is_empty() => {
                self.status = Status::Booked;
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }

    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn start(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Booked => {
                self.status = Status::Ongoing;
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }

    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn complete(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Ongoing => {
                self.status = Status::Completed;
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }

    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn cancel(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Available | Status::Booked => {
                self.status = Status::Cancelled;
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_spec() -> RideSpec {
    RideSpec {
        from: Some("Hyderabad, Telangana, India".into()),
        to: Some("Bengaluru, Karnataka, India".into()),
        from_coordinates: Some(Coordinates::new(78.4867, 17.385)),
        to_coordinates: Some(Coordinates::new(77.5946, 12.9716)),
        date: NaiveDate::from_ymd_opt(2026, 11, 2),
        time: NaiveTime::from_hms_opt(7, 30, 0),
        available_seats: Some(2),
        price_per_seat: Some(450.0),
        car_details: Some(CarDetailsSpec {
            model: Some("Swift".into()),
            license_plate: Some("TS09AB1234".into()),
            color: Some("white".into()),
        }),
    }
}

#[cfg(test)]
pub(crate) fn sample_member(id: Uuid) -> Member {
    Member {
        id,
        name: "Asha".into(),
        email: "asha@example.com".into(),
        phone: "+919900000000".into(),
        picture: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn offer_validation_test() {
    let ride = sample_spec().into_ride(Uuid::new_v4()).unwrap();

    assert_eq!(ride.status, Status::Available);
    assert_eq!(ride.available_seats, 2);
    assert_eq!(ride.seats, 2);

    let spec = RideSpec {
        from: Some("  ".into()),
        available_seats: Some(0),
        price_per_seat: Some(-1.0),
        car_details: None,
        ..sample_spec()
    };

    let err = spec.into_ride(Uuid::new_v4()).unwrap_err();
    assert!(err.is_invalid_input_error());
    assert_eq!(
        err.fields,
        vec![
            "from",
            "available_seats",
            "price_per_seat",
            "car_details.model",
            "car_details.license_plate",
            "car_details.color",
        ]
    );

    let err = RideSpec::default().into_ride(Uuid::new_v4()).unwrap_err();
    assert_eq!(err.fields.len(), 11);
}

#[test]
fn admit_until_full_test() {
    let mut ride = sample_spec().into_ride(Uuid::new_v4()).unwrap();

    let a = Booking::new(&ride, Uuid::new_v4(), 1).unwrap();
    let b = Booking::new(&ride, Uuid::new_v4(), 1).unwrap();
    let c = Booking::new(&ride, Uuid::new_v4(), 1).unwrap();

    ride.admit(&a, PassengerSnapshot::new(&a, &sample_member(a.passenger_id)))
        .unwrap();
    assert_eq!(ride.available_seats, 1);
    assert_eq!(ride.status, Status::Available);

    ride.admit(&b, PassengerSnapshot::new(&b, &sample_member(b.passenger_id)))
        .unwrap();
    assert_eq!(ride.available_seats, 0);
    assert_eq!(ride.status, Status::Booked);

    let err = ride
        .admit(&c, PassengerSnapshot::new(&c, &sample_member(c.passenger_id)))
        .unwrap_err();
    assert!(err.is_conflict_error());
    assert_eq!(ride.available_seats, 0);
    assert_eq!(ride.passengers.len(), 2);
}

#[test]
fn release_policy_test() {
    let mut ride = sample_spec().into_ride(Uuid::new_v4()).unwrap();

    let a = Booking::new(&ride, Uuid::new_v4(), 1).unwrap();
    let b = Booking::new(&ride, Uuid::new_v4(), 1).unwrap();

    ride.admit(&a, PassengerSnapshot::new(&a, &sample_member(a.passenger_id)))
        .unwrap();

    // still open: seats go back
    assert!(ride.release(&a).unwrap());
    assert_eq!(ride.available_seats, 2);
    assert!(ride.passengers.is_empty());

    ride.admit(&a, PassengerSnapshot::new(&a, &sample_member(a.passenger_id)))
        .unwrap();
    ride.admit(&b, PassengerSnapshot::new(&b, &sample_member(b.passenger_id)))
        .unwrap();
    assert_eq!(ride.status, Status::Booked);

    // booked: seats forfeited, status kept
    assert!(!ride.release(&b).unwrap());
    assert_eq!(ride.available_seats, 0);
    assert_eq!(ride.status, Status::Booked);
    assert_eq!(ride.passenger_ids(), vec![a.passenger_id]);

    ride.start().unwrap();
    assert!(ride.release(&a).unwrap_err().is_invalid_state_error());
}

#[test]
fn lifecycle_transitions_test() {
    let mut ride = sample_spec().into_ride(Uuid::new_v4()).unwrap();

    assert!(ride.start().unwrap_err().is_invalid_state_error());
    assert!(ride.complete().unwrap_err().is_invalid_state_error());
    assert!(ride.close_bookings().unwrap_err().is_invalid_state_error());

    let a = Booking::new(&ride, Uuid::new_v4(), 1).unwrap();
    ride.admit(&a, PassengerSnapshot::new(&a, &sample_member(a.passenger_id)))
        .unwrap();
    ride.close_bookings().unwrap();
    assert_eq!(ride.status, Status::Booked);

    ride.start().unwrap();
    assert_eq!(ride.status, Status::Ongoing);
    assert!(ride.start().unwrap_err().is_invalid_state_error());
    assert!(ride.cancel().unwrap_err().is_invalid_state_error());

    ride.complete().unwrap();
    assert_eq!(ride.status, Status::Completed);

    for result in [ride.start(), ride.complete(), ride.cancel(), ride.close_bookings()] {
        assert!(result.unwrap_err().is_invalid_state_error());
    }
}

#[test]
fn roles_test() {
    let driver_id = Uuid::new_v4();
    let mut ride = sample_spec().into_ride(driver_id).unwrap();
    let a = Booking::new(&ride, Uuid::new_v4(), 1).unwrap();

    assert_eq!(ride.role_of(driver_id), Some(ParticipantRole::Driver));
    assert_eq!(ride.role_of(a.passenger_id), None);

    ride.admit(&a, PassengerSnapshot::new(&a, &sample_member(a.passenger_id)))
        .unwrap();
    assert_eq!(ride.role_of(a.passenger_id), Some(ParticipantRole::Passenger));
    assert_eq!(ride.accepted_seats(), 1);
}
