use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{BookingMutation, RideCascade, RideGuard, RideMutation, SearchQuery, Store};
use crate::entities::{Booking, Member, Ride};
use crate::error::Error;

/// A ride and every booking made against it, guarded together.
#[derive(Debug)]
struct RideEntry {
    ride: Ride,
    bookings: Vec<Booking>,
}

/// Process-local store. Each ride is serialised by its own mutex, so
/// commands on different rides never contend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    members: RwLock<HashMap<Uuid, Member>>,
    rides: RwLock<HashMap<Uuid, Arc<Mutex<RideEntry>>>>,
    booking_rides: RwLock<HashMap<Uuid, Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, ride_id: &Uuid) -> Result<Arc<Mutex<RideEntry>>, Error> {
        self.rides
            .read()
            .await
            .get(ride_id)
            .cloned()
            .ok_or_else(Error::not_found_error)
    }

    async fn entry_for_booking(&self, booking_id: &Uuid) -> Result<Arc<Mutex<RideEntry>>, Error> {
        let ride_id = *self
            .booking_rides
            .read()
            .await
            .get(booking_id)
            .ok_or_else(Error::not_found_error)?;

        self.entry(&ride_id).await
    }

    async fn entries(&self) -> Vec<Arc<Mutex<RideEntry>>> {
        self.rides.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_member(&self, member: &Member) -> Result<(), Error> {
        self.members
            .write()
            .await
            .insert(member.id, member.clone());

        Ok(())
    }

    async fn find_member(&self, id: Uuid) -> Result<Member, Error> {
        self.members
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(Error::not_found_error)
    }

    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        let entry = RideEntry {
            ride: ride.clone(),
            bookings: vec![],
        };

        self.rides
            .write()
            .await
            .insert(ride.id, Arc::new(Mutex::new(entry)));

        Ok(())
    }

    async fn find_ride(&self, id: Uuid) -> Result<Ride, Error> {
        let entry = self.entry(&id).await?;
        let ride = entry.lock().await.ride.clone();

        Ok(ride)
    }

    async fn rides_by_driver(&self, driver_id: Uuid) -> Result<Vec<Ride>, Error> {
        let mut rides = vec![];

        for entry in self.entries().await {
            let entry = entry.lock().await;
            if entry.ride.driver_id == driver_id {
                rides.push(entry.ride.clone());
            }
        }

        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(rides)
    }

    async fn search_rides(&self, query: &SearchQuery) -> Result<Vec<Ride>, Error> {
        let mut rides = vec![];

        for entry in self.entries().await {
            let entry = entry.lock().await;
            if query.matches(&entry.ride) {
                rides.push(entry.ride.clone());
            }
        }

        rides.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(rides)
    }

    async fn insert_booking(&self, booking: &Booking, guard: RideGuard) -> Result<(), Error> {
        let entry = self.entry(&booking.ride_id).await?;
        let mut entry = entry.lock().await;

        guard(&entry.ride)?;

        entry.bookings.push(booking.clone());
        self.booking_rides
            .write()
            .await
            .insert(booking.id, booking.ride_id);

        Ok(())
    }

    async fn find_booking(&self, id: Uuid) -> Result<Booking, Error> {
        let entry = self.entry_for_booking(&id).await?;
        let entry = entry.lock().await;

        entry
            .bookings
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(Error::not_found_error)
    }

    async fn bookings_for_ride(&self, ride_id: Uuid) -> Result<Vec<Booking>, Error> {
        let entry = self.entry(&ride_id).await?;
        let mut bookings = entry.lock().await.bookings.clone();

        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(bookings)
    }

    async fn bookings_by_passenger(&self, passenger_id: Uuid) -> Result<Vec<Booking>, Error> {
        let mut bookings = vec![];

        for entry in self.entries().await {
            let entry = entry.lock().await;
            bookings.extend(
                entry
                    .bookings
                    .iter()
                    .filter(|b| b.passenger_id == passenger_id)
                    .cloned(),
            );
        }

        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(bookings)
    }

    async fn update_ride(&self, id: Uuid, f: RideMutation) -> Result<Ride, Error> {
        let entry = self.entry(&id).await?;
        let mut entry = entry.lock().await;

        let mut ride = entry.ride.clone();
        f(&mut ride)?;
        entry.ride = ride.clone();

        Ok(ride)
    }

    async fn update_booking(
        &self,
        id: Uuid,
        f: BookingMutation,
    ) -> Result<(Ride, Booking), Error> {
        let entry = self.entry_for_booking(&id).await?;
        let mut entry = entry.lock().await;

        let index = entry
            .bookings
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(Error::not_found_error)?;

        let mut ride = entry.ride.clone();
        let mut booking = entry.bookings[index].clone();
        f(&mut ride, &mut booking)?;

        entry.ride = ride.clone();
        entry.bookings[index] = booking.clone();

        Ok((ride, booking))
    }

    async fn update_ride_with_bookings(
        &self,
        id: Uuid,
        f: RideCascade,
    ) -> Result<(Ride, Vec<Booking>), Error> {
        let entry = self.entry(&id).await?;
        let mut entry = entry.lock().await;

        let mut ride = entry.ride.clone();
        let mut bookings = entry.bookings.clone();
        f(&mut ride, bookings.as_mut_slice())?;

        entry.ride = ride.clone();
        entry.bookings = bookings.clone();

        Ok((ride, bookings))
    }
}
