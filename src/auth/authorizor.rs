use oso::{Oso, OsoError, PolarClass};

use crate::auth::{Platform, User};
use crate::entities::{Booking, Ride};

pub fn new() -> Result<Oso, OsoError> {
    let mut o = Oso::new();

    o.register_class(Platform::get_polar_class())?;
    o.register_class(User::get_polar_class())?;
    o.register_class(Ride::get_polar_class())?;
    o.register_class(Booking::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}

#[cfg(test)]
fn fixtures() -> (Oso, User, User, Ride) {
    use crate::entities::ride::sample_spec;
    use uuid::Uuid;

    let authorizor = new().unwrap();
    let driver = User::new(Uuid::new_v4());
    let passenger = User::new(Uuid::new_v4());
    let ride = sample_spec().into_ride(driver.id).unwrap();

    (authorizor, driver, passenger, ride)
}

#[test]
fn platform_actions_test() {
    let (authorizor, driver, _, _) = fixtures();

    let result = authorizor.is_allowed(driver.clone(), "offer_ride", Platform::default());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "launch_rockets", Platform::default());
    assert_eq!(result.unwrap(), false);
}

#[test]
fn ride_driver_role_test() {
    let (authorizor, driver, passenger, ride) = fixtures();

    for action in ["start", "complete", "cancel", "close_bookings", "list_bookings"] {
        let result = authorizor.is_allowed(driver.clone(), action, ride.clone());
        assert_eq!(result.unwrap(), true, "driver should be allowed to {action}");

        let result = authorizor.is_allowed(passenger.clone(), action, ride.clone());
        assert_eq!(result.unwrap(), false, "passenger should not be allowed to {action}");
    }

    let result = authorizor.is_allowed(driver.clone(), "request_booking", ride.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(passenger.clone(), "request_booking", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(passenger.clone(), "read", ride.clone());
    assert_eq!(result.unwrap(), true);
}

#[test]
fn ride_tracking_role_test() {
    use crate::entities::{Booking, PassengerSnapshot};
    use crate::entities::ride::sample_member;

    let (authorizor, driver, passenger, mut ride) = fixtures();

    let result = authorizor.is_allowed(driver.clone(), "track", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(passenger.clone(), "track", ride.clone());
    assert_eq!(result.unwrap(), false);

    let booking = Booking::new(&ride, passenger.id, 1).unwrap();
    ride.admit(&booking, PassengerSnapshot::new(&booking, &sample_member(passenger.id)))
        .unwrap();

    let result = authorizor.is_allowed(passenger.clone(), "track", ride.clone());
    assert_eq!(result.unwrap(), true);
}

#[test]
fn booking_roles_test() {
    use crate::entities::Booking;
    use uuid::Uuid;

    let (authorizor, driver, passenger, ride) = fixtures();
    let stranger = User::new(Uuid::new_v4());

    let booking = Booking::new(&ride, passenger.id, 1).unwrap();

    for action in ["accept", "reject"] {
        let result = authorizor.is_allowed(driver.clone(), action, booking.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(passenger.clone(), action, booking.clone());
        assert_eq!(result.unwrap(), false);
    }

    let result = authorizor.is_allowed(passenger.clone(), "cancel", booking.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "cancel", booking.clone());
    assert_eq!(result.unwrap(), false);

    for user in [driver, passenger] {
        let result = authorizor.is_allowed(user, "read", booking.clone());
        assert_eq!(result.unwrap(), true);
    }

    let result = authorizor.is_allowed(stranger, "read", booking.clone());
    assert_eq!(result.unwrap(), false);
}
