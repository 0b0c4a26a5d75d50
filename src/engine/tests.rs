use async_channel::unbounded;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::block_on;
use uuid::Uuid;

use super::Engine;
use crate::api::{BookingAPI, MemberAPI, RideAPI, TrackingAPI};
use crate::auth::User;
use crate::db::{
    BookingMutation, MemoryStore, RideCascade, RideGuard, RideMutation, SearchQuery, Store,
};
use crate::entities::ride::sample_spec;
use crate::entities::{
    Booking, BookingStatus, Coordinates, Member, MemberProfile, ParticipantRole, Ride, RideStatus,
};
use crate::error::Error;

fn engine() -> Engine {
    Engine::new(Arc::new(MemoryStore::new())).unwrap()
}

async fn register(engine: &Engine, name: &str) -> User {
    let user = User::new(Uuid::new_v4());
    let profile = MemberProfile {
        name: Some(name.into()),
        email: Some(format!("{}@example.com", name.to_lowercase())),
        phone: Some("+919900000000".into()),
        picture: None,
    };

    engine
        .register_member(user.clone(), profile)
        .await
        .unwrap();

    user
}

fn seats_for(seats: u32) -> crate::entities::RideSpec {
    let mut spec = sample_spec();
    spec.available_seats = Some(seats);
    spec
}

#[test]
fn two_seat_scenario_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let a = block_on(register(&engine, "Asha"));
    let b = block_on(register(&engine, "Bilal"));

    let ride = block_on(engine.offer_ride(driver.clone(), sample_spec())).unwrap();
    assert_eq!(ride.available_seats, 2);

    let booking_a = block_on(engine.request_booking(a.clone(), ride.id, 2)).unwrap();
    let booking_b = block_on(engine.request_booking(b.clone(), ride.id, 1)).unwrap();
    assert_eq!(booking_a.status, BookingStatus::Pending);
    assert_eq!(booking_b.status, BookingStatus::Pending);

    // requests alone do not hold seats
    let ride = block_on(engine.find_ride(a.clone(), ride.id)).unwrap();
    assert_eq!(ride.available_seats, 2);

    let accepted = block_on(engine.accept_booking(driver.clone(), booking_a.id)).unwrap();
    assert_eq!(accepted.status, BookingStatus::Accepted);

    let ride = block_on(engine.find_ride(driver.clone(), ride.id)).unwrap();
    assert_eq!(ride.available_seats, 0);
    assert_eq!(ride.status, RideStatus::Booked);
    assert_eq!(ride.passengers.len(), 1);
    assert_eq!(ride.passengers[0].name, "Asha");
    assert_eq!(ride.passengers[0].seats_booked, 2);

    let err = block_on(engine.accept_booking(driver.clone(), booking_b.id)).unwrap_err();
    assert!(err.is_conflict_error());
    assert!(err.is_retryable());

    let booking_b = block_on(engine.find_booking(b.clone(), booking_b.id)).unwrap();
    assert_eq!(booking_b.status, BookingStatus::Pending);

    // the driver can still turn the request down
    let rejected = block_on(engine.reject_booking(driver.clone(), booking_b.id)).unwrap();
    assert_eq!(rejected.status, BookingStatus::Rejected);

    let err = block_on(engine.accept_booking(driver, booking_b.id)).unwrap_err();
    assert!(err.is_invalid_state_error());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_test() {
    let engine = Arc::new(engine());
    let driver = register(&engine, "Ravi").await;
    let a = register(&engine, "Asha").await;
    let b = register(&engine, "Bilal").await;

    for _ in 0..25 {
        let ride = engine.offer_ride(driver.clone(), sample_spec()).await.unwrap();
        let first = engine.request_booking(a.clone(), ride.id, 2).await.unwrap();
        let second = engine.request_booking(b.clone(), ride.id, 1).await.unwrap();

        let accept = |id: Uuid| {
            let engine = engine.clone();
            let driver = driver.clone();
            tokio::spawn(async move { engine.accept_booking(driver, id).await })
        };

        let (x, y) = tokio::join!(accept(first.id), accept(second.id));
        let results = [x.unwrap(), y.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(err) if err.is_conflict_error())));

        let ride = engine.find_ride(driver.clone(), ride.id).await.unwrap();
        let accepted: u32 = engine
            .bookings_for_ride(driver.clone(), ride.id)
            .await
            .unwrap()
            .iter()
            .filter(|b| b.status == BookingStatus::Accepted)
            .map(|b| b.seats)
            .sum();

        assert!(accepted <= ride.seats);
        assert_eq!(ride.available_seats + accepted, ride.seats);
        assert_eq!(ride.accepted_seats(), accepted);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn oversubscribed_ride_test() {
    let engine = Arc::new(engine());
    let driver = register(&engine, "Ravi").await;

    let ride = engine.offer_ride(driver.clone(), seats_for(3)).await.unwrap();

    let mut bookings = vec![];
    for i in 0..8 {
        let passenger = register(&engine, &format!("Rider{}", i)).await;
        bookings.push(engine.request_booking(passenger, ride.id, 1).await.unwrap());
    }

    let handles: Vec<_> = bookings
        .iter()
        .map(|booking| {
            let engine = engine.clone();
            let driver = driver.clone();
            let id = booking.id;
            tokio::spawn(async move { engine.accept_booking(driver, id).await })
        })
        .collect();

    let mut accepted = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) if err.is_conflict_error() => conflicts += 1,
            Err(err) => panic!("unexpected error {}", err),
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(conflicts, 5);

    let ride = engine.find_ride(driver, ride.id).await.unwrap();
    assert_eq!(ride.available_seats, 0);
    assert_eq!(ride.status, RideStatus::Booked);
    assert_eq!(ride.passengers.len(), 3);
}

#[test]
fn lifecycle_requires_prior_state_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let passenger = block_on(register(&engine, "Asha"));

    let ride = block_on(engine.offer_ride(driver.clone(), sample_spec())).unwrap();

    assert!(block_on(engine.start_ride(driver.clone(), ride.id))
        .unwrap_err()
        .is_invalid_state_error());
    assert!(block_on(engine.complete_ride(driver.clone(), ride.id))
        .unwrap_err()
        .is_invalid_state_error());

    let booking = block_on(engine.request_booking(passenger.clone(), ride.id, 2)).unwrap();
    block_on(engine.accept_booking(driver.clone(), booking.id)).unwrap();

    assert!(block_on(engine.complete_ride(driver.clone(), ride.id))
        .unwrap_err()
        .is_invalid_state_error());

    let started = block_on(engine.start_ride(driver.clone(), ride.id)).unwrap();
    assert_eq!(started.status, RideStatus::Ongoing);

    assert!(block_on(engine.start_ride(driver.clone(), ride.id))
        .unwrap_err()
        .is_invalid_state_error());
    assert!(block_on(engine.cancel_ride(driver.clone(), ride.id))
        .unwrap_err()
        .is_invalid_state_error());

    // an accepted passenger cannot drop out once underway
    assert!(block_on(engine.cancel_booking(passenger, booking.id))
        .unwrap_err()
        .is_invalid_state_error());

    let completed = block_on(engine.complete_ride(driver.clone(), ride.id)).unwrap();
    assert_eq!(completed.status, RideStatus::Completed);

    for result in [
        block_on(engine.start_ride(driver.clone(), ride.id)),
        block_on(engine.complete_ride(driver.clone(), ride.id)),
        block_on(engine.cancel_ride(driver.clone(), ride.id)),
        block_on(engine.close_bookings(driver, ride.id)),
    ] {
        assert!(result.unwrap_err().is_invalid_state_error());
    }
}

#[test]
fn status_never_regresses_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let a = block_on(register(&engine, "Asha"));
    let b = block_on(register(&engine, "Bilal"));

    let ride = block_on(engine.offer_ride(driver.clone(), seats_for(3))).unwrap();
    let booking_a = block_on(engine.request_booking(a.clone(), ride.id, 2)).unwrap();
    let booking_b = block_on(engine.request_booking(b.clone(), ride.id, 1)).unwrap();

    let mut rank = ride.status.rank();
    let mut observe = |ride: Ride| {
        assert!(ride.status.rank() >= rank, "{:?} regressed", ride.status);
        rank = ride.status.rank();
    };

    block_on(engine.accept_booking(driver.clone(), booking_a.id)).unwrap();
    observe(block_on(engine.find_ride(driver.clone(), ride.id)).unwrap());

    block_on(engine.accept_booking(driver.clone(), booking_b.id)).unwrap();
    observe(block_on(engine.find_ride(driver.clone(), ride.id)).unwrap());

    // seats are forfeited rather than reopening a booked ride
    let cancelled = block_on(engine.cancel_booking(b.clone(), booking_b.id)).unwrap();
    assert_eq!(cancelled.status, BookingStatus::CancelledByPassenger);
    let ride_now = block_on(engine.find_ride(driver.clone(), ride.id)).unwrap();
    assert_eq!(ride_now.status, RideStatus::Booked);
    assert_eq!(ride_now.available_seats, 0);
    assert_eq!(ride_now.passengers.len(), 1);
    observe(ride_now);

    // already booked, there is nothing left to close
    let err = block_on(engine.close_bookings(driver.clone(), ride.id)).unwrap_err();
    assert!(err.is_invalid_state_error());
    observe(block_on(engine.find_ride(driver.clone(), ride.id)).unwrap());

    observe(block_on(engine.start_ride(driver.clone(), ride.id)).unwrap());
    let err = block_on(engine.cancel_ride(driver.clone(), ride.id)).unwrap_err();
    assert!(err.is_invalid_state_error());
    observe(block_on(engine.find_ride(driver.clone(), ride.id)).unwrap());
    observe(block_on(engine.complete_ride(driver.clone(), ride.id)).unwrap());
}

#[test]
fn cancel_accepted_booking_restores_open_seats_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let passenger = block_on(register(&engine, "Asha"));

    let ride = block_on(engine.offer_ride(driver.clone(), seats_for(3))).unwrap();
    let booking = block_on(engine.request_booking(passenger.clone(), ride.id, 1)).unwrap();
    block_on(engine.accept_booking(driver.clone(), booking.id)).unwrap();

    let ride_now = block_on(engine.find_ride(driver.clone(), ride.id)).unwrap();
    assert_eq!(ride_now.available_seats, 2);

    let cancelled = block_on(engine.cancel_booking(passenger.clone(), booking.id)).unwrap();
    assert_eq!(cancelled.status, BookingStatus::CancelledByPassenger);

    let ride_now = block_on(engine.find_ride(driver.clone(), ride.id)).unwrap();
    assert_eq!(ride_now.available_seats, 3);
    assert!(ride_now.passengers.is_empty());

    assert!(block_on(engine.cancel_booking(passenger, booking.id))
        .unwrap_err()
        .is_invalid_state_error());
}

#[test]
fn close_bookings_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let passenger = block_on(register(&engine, "Asha"));

    let ride = block_on(engine.offer_ride(driver.clone(), seats_for(3))).unwrap();

    // nobody aboard yet
    assert!(block_on(engine.close_bookings(driver.clone(), ride.id))
        .unwrap_err()
        .is_invalid_state_error());

    let booking = block_on(engine.request_booking(passenger.clone(), ride.id, 1)).unwrap();
    block_on(engine.accept_booking(driver.clone(), booking.id)).unwrap();

    let closed = block_on(engine.close_bookings(driver.clone(), ride.id)).unwrap();
    assert_eq!(closed.status, RideStatus::Booked);
    assert_eq!(closed.available_seats, 2);

    // closed rides take no further requests
    let late = block_on(register(&engine, "Chen"));
    assert!(block_on(engine.request_booking(late, ride.id, 1))
        .unwrap_err()
        .is_invalid_state_error());

    let started = block_on(engine.start_ride(driver, ride.id)).unwrap();
    assert_eq!(started.status, RideStatus::Ongoing);
}

#[test]
fn cancel_ride_cascades_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let a = block_on(register(&engine, "Asha"));
    let b = block_on(register(&engine, "Bilal"));
    let c = block_on(register(&engine, "Chen"));

    let ride = block_on(engine.offer_ride(driver.clone(), seats_for(3))).unwrap();
    let accepted = block_on(engine.request_booking(a.clone(), ride.id, 1)).unwrap();
    let pending = block_on(engine.request_booking(b.clone(), ride.id, 1)).unwrap();
    let rejected = block_on(engine.request_booking(c.clone(), ride.id, 1)).unwrap();

    block_on(engine.accept_booking(driver.clone(), accepted.id)).unwrap();
    block_on(engine.reject_booking(driver.clone(), rejected.id)).unwrap();

    let cancelled = block_on(engine.cancel_ride(driver.clone(), ride.id)).unwrap();
    assert_eq!(cancelled.status, RideStatus::Cancelled);

    let status_of = |user: &User, id: Uuid| block_on(engine.find_booking(user.clone(), id)).unwrap().status;

    assert_eq!(status_of(&a, accepted.id), BookingStatus::CancelledByDriver);
    assert_eq!(status_of(&b, pending.id), BookingStatus::CancelledByDriver);
    assert_eq!(status_of(&c, rejected.id), BookingStatus::Rejected);

    let (tx, _rx) = unbounded();
    assert!(block_on(engine.join_ride(a, ride.id, Uuid::new_v4(), tx))
        .unwrap_err()
        .is_invalid_state_error());
}

#[test]
fn request_booking_preconditions_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let passenger = block_on(register(&engine, "Asha"));
    let stranger = User::new(Uuid::new_v4());

    let ride = block_on(engine.offer_ride(driver.clone(), sample_spec())).unwrap();

    assert!(block_on(engine.request_booking(passenger.clone(), Uuid::new_v4(), 1))
        .unwrap_err()
        .is_not_found_error());

    let err = block_on(engine.request_booking(passenger.clone(), ride.id, 0)).unwrap_err();
    assert!(err.is_invalid_input_error());
    assert_eq!(err.fields, vec!["seats"]);

    let err = block_on(engine.request_booking(passenger.clone(), ride.id, 3)).unwrap_err();
    assert!(err.is_invalid_input_error());

    // no member profile to share with the driver
    assert!(block_on(engine.request_booking(stranger, ride.id, 1))
        .unwrap_err()
        .is_invalid_state_error());

    let booking = block_on(engine.request_booking(passenger.clone(), ride.id, 2)).unwrap();
    block_on(engine.accept_booking(driver, booking.id)).unwrap();

    let other = block_on(register(&engine, "Bilal"));
    assert!(block_on(engine.request_booking(other, ride.id, 1))
        .unwrap_err()
        .is_invalid_state_error());
}

#[test]
fn forbidden_actions_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let passenger = block_on(register(&engine, "Asha"));
    let stranger = block_on(register(&engine, "Mallory"));

    let ride = block_on(engine.offer_ride(driver.clone(), sample_spec())).unwrap();

    assert!(block_on(engine.request_booking(driver.clone(), ride.id, 1))
        .unwrap_err()
        .is_unauthorized_error());

    let booking = block_on(engine.request_booking(passenger.clone(), ride.id, 1)).unwrap();

    for result in [
        block_on(engine.accept_booking(passenger.clone(), booking.id)),
        block_on(engine.accept_booking(stranger.clone(), booking.id)),
        block_on(engine.reject_booking(stranger.clone(), booking.id)),
        block_on(engine.cancel_booking(stranger.clone(), booking.id)),
        block_on(engine.cancel_booking(driver.clone(), booking.id)),
        block_on(engine.find_booking(stranger.clone(), booking.id)),
    ] {
        assert!(result.unwrap_err().is_unauthorized_error());
    }

    for result in [
        block_on(engine.start_ride(passenger.clone(), ride.id)),
        block_on(engine.complete_ride(stranger.clone(), ride.id)),
        block_on(engine.cancel_ride(passenger.clone(), ride.id)),
        block_on(engine.close_bookings(stranger.clone(), ride.id)),
    ] {
        assert!(result.unwrap_err().is_unauthorized_error());
    }

    assert!(block_on(engine.bookings_for_ride(passenger.clone(), ride.id))
        .unwrap_err()
        .is_unauthorized_error());

    block_on(engine.accept_booking(driver.clone(), booking.id)).unwrap();
    block_on(engine.close_bookings(driver.clone(), ride.id)).unwrap();

    let (tx, _rx) = unbounded();
    assert!(block_on(engine.join_ride(stranger, ride.id, Uuid::new_v4(), tx))
        .unwrap_err()
        .is_unauthorized_error());

    // both parties can read the booking
    assert!(block_on(engine.find_booking(passenger, booking.id)).is_ok());
    assert!(block_on(engine.find_booking(driver, booking.id)).is_ok());
}

#[test]
fn tracking_until_completion_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let passenger = block_on(register(&engine, "Asha"));

    let ride = block_on(engine.offer_ride(driver.clone(), sample_spec())).unwrap();
    let booking = block_on(engine.request_booking(passenger.clone(), ride.id, 2)).unwrap();

    // the channel only opens once the ride is booked
    let (early_tx, _early_rx) = unbounded();
    assert!(block_on(engine.join_ride(driver.clone(), ride.id, Uuid::new_v4(), early_tx))
        .unwrap_err()
        .is_invalid_state_error());

    block_on(engine.accept_booking(driver.clone(), booking.id)).unwrap();

    let (driver_conn, passenger_conn) = (Uuid::new_v4(), Uuid::new_v4());
    let (driver_tx, driver_rx) = unbounded();
    let (passenger_tx, passenger_rx) = unbounded();

    let role = block_on(engine.join_ride(driver.clone(), ride.id, driver_conn, driver_tx)).unwrap();
    assert_eq!(role, ParticipantRole::Driver);
    let role =
        block_on(engine.join_ride(passenger.clone(), ride.id, passenger_conn, passenger_tx)).unwrap();
    assert_eq!(role, ParticipantRole::Passenger);

    let pickup = Coordinates::new(78.4867, 17.3854);
    let delivered = block_on(engine.publish_location(
        ride.id,
        driver_conn,
        ParticipantRole::Driver,
        pickup,
        None,
    ))
    .unwrap();
    assert_eq!(delivered, 1);

    let event = passenger_rx.try_recv().unwrap();
    assert_eq!(event.user_id, driver.id);
    assert_eq!(event.coordinates, pickup);

    block_on(engine.publish_location(
        ride.id,
        passenger_conn,
        ParticipantRole::Passenger,
        pickup,
        None,
    ))
    .unwrap();
    assert_eq!(driver_rx.try_recv().unwrap().role, ParticipantRole::Passenger);

    block_on(engine.start_ride(driver.clone(), ride.id)).unwrap();
    block_on(engine.complete_ride(driver.clone(), ride.id)).unwrap();

    let err = block_on(engine.publish_location(
        ride.id,
        driver_conn,
        ParticipantRole::Driver,
        pickup,
        None,
    ))
    .unwrap_err();
    assert!(err.is_invalid_state_error());
    assert!(passenger_rx.try_recv().is_err());
    assert_eq!(block_on(engine.relay.channel_count()), 0);

    let (late_tx, _late_rx) = unbounded();
    assert!(block_on(engine.join_ride(passenger, ride.id, Uuid::new_v4(), late_tx))
        .unwrap_err()
        .is_invalid_state_error());
    assert_eq!(block_on(engine.relay.channel_count()), 0);
}

#[test]
fn cancelled_passenger_stops_tracking_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let a = block_on(register(&engine, "Asha"));
    let b = block_on(register(&engine, "Bilal"));

    let ride = block_on(engine.offer_ride(driver.clone(), sample_spec())).unwrap();
    let booking_a = block_on(engine.request_booking(a.clone(), ride.id, 1)).unwrap();
    let booking_b = block_on(engine.request_booking(b.clone(), ride.id, 1)).unwrap();
    block_on(engine.accept_booking(driver.clone(), booking_a.id)).unwrap();
    block_on(engine.accept_booking(driver.clone(), booking_b.id)).unwrap();

    let ride = block_on(engine.find_ride(driver.clone(), ride.id)).unwrap();
    assert_eq!(ride.status, RideStatus::Booked);

    let (driver_conn, b_conn) = (Uuid::new_v4(), Uuid::new_v4());
    let (driver_tx, driver_rx) = unbounded();
    let (b_tx, b_rx) = unbounded();

    block_on(engine.join_ride(driver.clone(), ride.id, driver_conn, driver_tx)).unwrap();
    block_on(engine.join_ride(b.clone(), ride.id, b_conn, b_tx)).unwrap();

    block_on(engine.cancel_booking(b.clone(), booking_b.id)).unwrap();
    assert_eq!(block_on(engine.relay.member_count(ride.id)), 1);

    let delivered = block_on(engine.publish_location(
        ride.id,
        driver_conn,
        ParticipantRole::Driver,
        Coordinates::new(78.4867, 17.385),
        None,
    ))
    .unwrap();
    assert_eq!(delivered, 0);
    assert!(b_rx.try_recv().is_err());

    let err = block_on(engine.publish_location(
        ride.id,
        b_conn,
        ParticipantRole::Passenger,
        Coordinates::new(78.4867, 17.385),
        None,
    ))
    .unwrap_err();
    assert!(err.is_unauthorized_error());
    assert!(driver_rx.try_recv().is_err());

    // and cannot come back
    let (again_tx, _again_rx) = unbounded();
    assert!(block_on(engine.join_ride(b, ride.id, Uuid::new_v4(), again_tx))
        .unwrap_err()
        .is_unauthorized_error());
}

#[test]
fn disconnect_leaves_ride_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let passenger = block_on(register(&engine, "Asha"));

    let ride = block_on(engine.offer_ride(driver.clone(), sample_spec())).unwrap();
    let booking = block_on(engine.request_booking(passenger.clone(), ride.id, 2)).unwrap();
    block_on(engine.accept_booking(driver.clone(), booking.id)).unwrap();

    let (driver_conn, passenger_conn) = (Uuid::new_v4(), Uuid::new_v4());
    let (driver_tx, _driver_rx) = unbounded();
    let (passenger_tx, _passenger_rx) = unbounded();

    block_on(engine.join_ride(driver, ride.id, driver_conn, driver_tx)).unwrap();
    block_on(engine.join_ride(passenger, ride.id, passenger_conn, passenger_tx)).unwrap();

    block_on(engine.disconnect(passenger_conn));

    let delivered = block_on(engine.publish_location(
        ride.id,
        driver_conn,
        ParticipantRole::Driver,
        Coordinates::new(78.4867, 17.385),
        None,
    ))
    .unwrap();
    assert_eq!(delivered, 0);

    block_on(engine.leave_ride(ride.id, driver_conn)).unwrap();
    assert_eq!(block_on(engine.relay.channel_count()), 0);

    // nobody is left, so there is no group to publish into
    assert!(block_on(engine.publish_location(
        ride.id,
        driver_conn,
        ParticipantRole::Driver,
        Coordinates::new(78.4867, 17.385),
        None,
    ))
    .unwrap_err()
    .is_invalid_state_error());
}

#[test]
fn search_only_returns_open_rides_test() {
    let engine = engine();
    let driver = block_on(register(&engine, "Ravi"));
    let passenger = block_on(register(&engine, "Asha"));

    let open = block_on(engine.offer_ride(driver.clone(), sample_spec())).unwrap();
    let full = block_on(engine.offer_ride(driver.clone(), sample_spec())).unwrap();

    let booking = block_on(engine.request_booking(passenger, full.id, 2)).unwrap();
    block_on(engine.accept_booking(driver.clone(), booking.id)).unwrap();

    let query = SearchQuery::parse(
        Some("hyderabad, telangana, india"),
        Some("bengaluru, karnataka, india"),
        Some("2026-11-02"),
        Some(1),
    )
    .unwrap();

    let rides = block_on(engine.search_rides(query)).unwrap();
    assert_eq!(rides.len(), 1);
    assert_eq!(rides[0].id, open.id);

    let mine = block_on(engine.rides_by_driver(driver)).unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().any(|r| r.id == full.id));
}

#[test]
fn member_profile_test() {
    let engine = engine();
    let user = User {
        name: Some("Asha".into()),
        email: Some("asha@example.com".into()),
        ..User::new(Uuid::new_v4())
    };

    assert!(block_on(engine.find_member(user.clone()))
        .unwrap_err()
        .is_not_found_error());

    // claims fill in what the body leaves out
    let member = block_on(engine.register_member(user.clone(), MemberProfile::default())).unwrap();
    assert_eq!(member.name, "Asha");
    assert!(member.phone.is_empty());

    let err = block_on(engine.update_phone(user.clone(), "call me".into())).unwrap_err();
    assert_eq!(err.fields, vec!["phone"]);

    let member = block_on(engine.update_phone(user.clone(), "+919812345678".into())).unwrap();
    assert_eq!(member.phone, "+919812345678");

    let again = block_on(engine.register_member(user.clone(), MemberProfile::default())).unwrap();
    assert_eq!(again.phone, "+919812345678");
    assert_eq!(again.created_at, member.created_at);
}

/// Never answers, to exercise the store deadline.
struct StalledStore;

#[async_trait]
impl Store for StalledStore {
    async fn save_member(&self, _: &Member) -> Result<(), Error> {
        futures::future::pending().await
    }

    async fn find_member(&self, _: Uuid) -> Result<Member, Error> {
        futures::future::pending().await
    }

    async fn insert_ride(&self, _: &Ride) -> Result<(), Error> {
        futures::future::pending().await
    }

    async fn find_ride(&self, _: Uuid) -> Result<Ride, Error> {
        futures::future::pending().await
    }

    async fn rides_by_driver(&self, _: Uuid) -> Result<Vec<Ride>, Error> {
        futures::future::pending().await
    }

    async fn search_rides(&self, _: &SearchQuery) -> Result<Vec<Ride>, Error> {
        futures::future::pending().await
    }

    async fn insert_booking(&self, _: &Booking, _: RideGuard) -> Result<(), Error> {
        futures::future::pending().await
    }

    async fn find_booking(&self, _: Uuid) -> Result<Booking, Error> {
        futures::future::pending().await
    }

    async fn bookings_for_ride(&self, _: Uuid) -> Result<Vec<Booking>, Error> {
        futures::future::pending().await
    }

    async fn bookings_by_passenger(&self, _: Uuid) -> Result<Vec<Booking>, Error> {
        futures::future::pending().await
    }

    async fn update_ride(&self, _: Uuid, _: RideMutation) -> Result<Ride, Error> {
        futures::future::pending().await
    }

    async fn update_booking(&self, _: Uuid, _: BookingMutation) -> Result<(Ride, Booking), Error> {
        futures::future::pending().await
    }

    async fn update_ride_with_bookings(
        &self,
        _: Uuid,
        _: RideCascade,
    ) -> Result<(Ride, Vec<Booking>), Error> {
        futures::future::pending().await
    }
}

#[test]
fn store_timeout_is_unavailable_test() {
    let engine = Engine::new(Arc::new(StalledStore))
        .unwrap()
        .with_store_timeout(Duration::from_millis(20));
    let user = User::new(Uuid::new_v4());

    let err = block_on(engine.find_ride(user.clone(), Uuid::new_v4())).unwrap_err();
    assert!(err.is_unavailable_error());
    assert!(err.is_retryable());

    let err = block_on(engine.offer_ride(user, sample_spec())).unwrap_err();
    assert!(err.is_unavailable_error());
}

/// Serves one held-back copy of a ride before reading through, so a caller
/// sees the ride as it was just before a concurrent write.
struct LaggingStore {
    inner: MemoryStore,
    stale: std::sync::Mutex<Option<Ride>>,
}

impl LaggingStore {
    fn hold(&self, ride: Ride) {
        *self.stale.lock().unwrap() = Some(ride);
    }
}

#[async_trait]
impl Store for LaggingStore {
    async fn save_member(&self, member: &Member) -> Result<(), Error> {
        self.inner.save_member(member).await
    }

    async fn find_member(&self, id: Uuid) -> Result<Member, Error> {
        self.inner.find_member(id).await
    }

    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        self.inner.insert_ride(ride).await
    }

    async fn find_ride(&self, id: Uuid) -> Result<Ride, Error> {
        let stale = self.stale.lock().unwrap().take();
        match stale {
            Some(ride) => Ok(ride),
            None => self.inner.find_ride(id).await,
        }
    }

    async fn rides_by_driver(&self, driver_id: Uuid) -> Result<Vec<Ride>, Error> {
        self.inner.rides_by_driver(driver_id).await
    }

    async fn search_rides(&self, query: &SearchQuery) -> Result<Vec<Ride>, Error> {
        self.inner.search_rides(query).await
    }

    async fn insert_booking(&self, booking: &Booking, guard: RideGuard) -> Result<(), Error> {
        self.inner.insert_booking(booking, guard).await
    }

    async fn find_booking(&self, id: Uuid) -> Result<Booking, Error> {
        self.inner.find_booking(id).await
    }

    async fn bookings_for_ride(&self, ride_id: Uuid) -> Result<Vec<Booking>, Error> {
        self.inner.bookings_for_ride(ride_id).await
    }

    async fn bookings_by_passenger(&self, passenger_id: Uuid) -> Result<Vec<Booking>, Error> {
        self.inner.bookings_by_passenger(passenger_id).await
    }

    async fn update_ride(&self, id: Uuid, f: RideMutation) -> Result<Ride, Error> {
        self.inner.update_ride(id, f).await
    }

    async fn update_booking(&self, id: Uuid, f: BookingMutation) -> Result<(Ride, Booking), Error> {
        self.inner.update_booking(id, f).await
    }

    async fn update_ride_with_bookings(
        &self,
        id: Uuid,
        f: RideCascade,
    ) -> Result<(Ride, Vec<Booking>), Error> {
        self.inner.update_ride_with_bookings(id, f).await
    }
}

#[test]
fn join_racing_completion_leaves_no_group_test() {
    let store = Arc::new(LaggingStore {
        inner: MemoryStore::new(),
        stale: std::sync::Mutex::new(None),
    });
    let engine = Engine::new(store.clone()).unwrap();
    let driver = block_on(register(&engine, "Ravi"));
    let passenger = block_on(register(&engine, "Asha"));

    let ride = block_on(engine.offer_ride(driver.clone(), sample_spec())).unwrap();
    let booking = block_on(engine.request_booking(passenger.clone(), ride.id, 1)).unwrap();
    block_on(engine.accept_booking(driver.clone(), booking.id)).unwrap();
    let underway = block_on(engine.start_ride(driver.clone(), ride.id)).unwrap();

    // the join reads the ride while it is underway, completion lands before
    // the join reaches the relay
    block_on(engine.complete_ride(driver.clone(), ride.id)).unwrap();
    store.hold(underway);

    let (tx, rx) = unbounded();
    let err = block_on(engine.join_ride(passenger, ride.id, Uuid::new_v4(), tx)).unwrap_err();
    assert!(err.is_invalid_state_error());
    assert_eq!(block_on(engine.relay.channel_count()), 0);
    assert!(rx.try_recv().is_err());
}
