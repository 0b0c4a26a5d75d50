use async_trait::async_trait;
use geo_types::Geometry;
use geozero::wkb;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    Executor, Pool, Postgres, Row, Transaction,
};
use uuid::Uuid;

use super::{BookingMutation, RideCascade, RideGuard, RideMutation, SearchQuery, Store};
use crate::entities::{Booking, Member, Ride};
use crate::error::Error;

type Database = Postgres;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Pool<Database>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip(db_uri))]
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: Pool<Database>) -> Result<Self, Error> {
        pool.execute("CREATE EXTENSION IF NOT EXISTS postgis")
            .await?;

        // member service (KV store)
        pool.execute("CREATE TABLE IF NOT EXISTS members (id UUID PRIMARY KEY, data JSONB NOT NULL)")
            .await?;

        // ride service
        pool.execute(
            "CREATE TABLE IF NOT EXISTS rides (
                id UUID PRIMARY KEY,
                driver_id UUID NOT NULL,
                status VARCHAR NOT NULL,
                origin_label VARCHAR NOT NULL,
                destination_label VARCHAR NOT NULL,
                departure_date DATE NOT NULL,
                available_seats INT4 NOT NULL CHECK (available_seats >= 0),
                origin geometry(Point, 4326) NOT NULL,
                destination geometry(Point, 4326) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            )",
        )
        .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS rides_driver_idx ON rides (driver_id, created_at)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS rides_search_idx ON rides (lower(origin_label), lower(destination_label), departure_date)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS rides_origin_idx ON rides USING GIST (origin)")
            .await?;
        pool.execute(
            "CREATE INDEX IF NOT EXISTS rides_destination_idx ON rides USING GIST (destination)",
        )
        .await?;

        // booking service
        pool.execute(
            "CREATE TABLE IF NOT EXISTS bookings (
                id UUID PRIMARY KEY,
                ride_id UUID NOT NULL,
                passenger_id UUID NOT NULL,
                status VARCHAR NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL,
                CONSTRAINT fk_booking_ride FOREIGN KEY(ride_id) REFERENCES rides(id)
            )",
        )
        .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS bookings_ride_idx ON bookings (ride_id)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS bookings_passenger_idx ON bookings (passenger_id)")
            .await?;

        Ok(Self { pool })
    }
}

fn seats_column(seats: u32) -> Result<i32, Error> {
    i32::try_from(seats).map_err(|_| Error::invalid_fields_error(vec!["seats".into()]))
}

fn ride_from_row(row: &PgRow) -> Result<Ride, Error> {
    let Json(ride): Json<Ride> = row.try_get("data")?;
    Ok(ride)
}

fn booking_from_row(row: &PgRow) -> Result<Booking, Error> {
    let Json(booking): Json<Booking> = row.try_get("data")?;
    Ok(booking)
}

#[tracing::instrument(skip(tx))]
async fn fetch_ride_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Ride, Error> {
    let row = tx
        .fetch_optional(sqlx::query("SELECT data FROM rides WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(Error::not_found_error)?;

    ride_from_row(&row)
}

#[tracing::instrument(skip(tx))]
async fn fetch_booking_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Booking, Error> {
    let row = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM bookings WHERE id = $1 FOR UPDATE").bind(id),
        )
        .await?
        .ok_or_else(Error::not_found_error)?;

    booking_from_row(&row)
}

#[tracing::instrument(skip(tx, ride), fields(ride_id = %ride.id))]
async fn update_ride(tx: &mut Transaction<'_, Database>, ride: &Ride) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE rides SET status = $2, available_seats = $3, data = $4 WHERE id = $1")
            .bind(&ride.id)
            .bind(ride.status.name())
            .bind(seats_column(ride.available_seats)?)
            .bind(Json(ride)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, booking), fields(booking_id = %booking.id))]
async fn update_booking(
    tx: &mut Transaction<'_, Database>,
    booking: &Booking,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE bookings SET status = $2, data = $3 WHERE id = $1")
            .bind(&booking.id)
            .bind(booking.status.name())
            .bind(Json(booking)),
    )
    .await?;

    Ok(())
}

#[async_trait]
impl Store for PgStore {
    #[tracing::instrument(skip(self, member), fields(member_id = %member.id))]
    async fn save_member(&self, member: &Member) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query(
                "INSERT INTO members (id, data) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data",
            )
            .bind(&member.id)
            .bind(Json(member)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_member(&self, id: Uuid) -> Result<Member, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(member): Json<Member> = conn
            .fetch_optional(sqlx::query("SELECT data FROM members WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(Error::not_found_error)?
            .try_get("data")?;

        Ok(member)
    }

    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        let origin: Geometry<f64> = ride.from_coordinates.into();
        let destination: Geometry<f64> = ride.to_coordinates.into();

        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query(
                "INSERT INTO rides (id, driver_id, status, origin_label, destination_label, departure_date, available_seats, origin, destination, created_at, data)
                VALUES ($1, $2, $3, $4, $5, $6, $7, ST_SetSRID($8, 4326), ST_SetSRID($9, 4326), $10, $11)",
            )
            .bind(&ride.id)
            .bind(&ride.driver_id)
            .bind(ride.status.name())
            .bind(&ride.from)
            .bind(&ride.to)
            .bind(ride.date)
            .bind(seats_column(ride.available_seats)?)
            .bind(wkb::Encode(origin))
            .bind(wkb::Encode(destination))
            .bind(ride.created_at)
            .bind(Json(ride)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<Ride, Error> {
        let mut conn = self.pool.acquire().await?;

        let row = conn
            .fetch_optional(sqlx::query("SELECT data FROM rides WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(Error::not_found_error)?;

        ride_from_row(&row)
    }

    #[tracing::instrument(skip(self))]
    async fn rides_by_driver(&self, driver_id: Uuid) -> Result<Vec<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM rides WHERE driver_id = $1 ORDER BY created_at DESC",
                )
                .bind(&driver_id),
            )
            .await?;

        rows.iter().map(ride_from_row).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn search_rides(&self, query: &SearchQuery) -> Result<Vec<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query(
                    "
                    SELECT
                        data
                    FROM
                        rides
                    WHERE
                        status = 'available'
                        AND lower(origin_label) = lower($1)
                        AND lower(destination_label) = lower($2)
                        AND departure_date = $3
                        AND available_seats >= $4
                    ORDER BY
                        created_at ASC
                    ",
                )
                .bind(&query.from)
                .bind(&query.to)
                .bind(query.date)
                .bind(seats_column(query.min_seats)?),
            )
            .await?;

        rows.iter().map(ride_from_row).collect()
    }

    #[tracing::instrument(skip(self, booking, guard), fields(booking_id = %booking.id))]
    async fn insert_booking(&self, booking: &Booking, guard: RideGuard) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        let ride = fetch_ride_for_update(&mut tx, &booking.ride_id).await?;
        guard(&ride)?;

        tx.execute(
            sqlx::query(
                "INSERT INTO bookings (id, ride_id, passenger_id, status, created_at, data) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&booking.id)
            .bind(&booking.ride_id)
            .bind(&booking.passenger_id)
            .bind(booking.status.name())
            .bind(booking.created_at)
            .bind(Json(booking)),
        )
        .await?;

        tx.commit().await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_booking(&self, id: Uuid) -> Result<Booking, Error> {
        let mut conn = self.pool.acquire().await?;

        let row = conn
            .fetch_optional(sqlx::query("SELECT data FROM bookings WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(Error::not_found_error)?;

        booking_from_row(&row)
    }

    #[tracing::instrument(skip(self))]
    async fn bookings_for_ride(&self, ride_id: Uuid) -> Result<Vec<Booking>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM bookings WHERE ride_id = $1 ORDER BY created_at DESC",
                )
                .bind(&ride_id),
            )
            .await?;

        rows.iter().map(booking_from_row).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn bookings_by_passenger(&self, passenger_id: Uuid) -> Result<Vec<Booking>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM bookings WHERE passenger_id = $1 ORDER BY created_at DESC",
                )
                .bind(&passenger_id),
            )
            .await?;

        rows.iter().map(booking_from_row).collect()
    }

    #[tracing::instrument(skip(self, f))]
    async fn update_ride(&self, id: Uuid, f: RideMutation) -> Result<Ride, Error> {
        let mut tx = self.pool.begin().await?;

        let mut ride = fetch_ride_for_update(&mut tx, &id).await?;
        f(&mut ride)?;
        update_ride(&mut tx, &ride).await?;

        tx.commit().await?;

        Ok(ride)
    }

    #[tracing::instrument(skip(self, f))]
    async fn update_booking(
        &self,
        id: Uuid,
        f: BookingMutation,
    ) -> Result<(Ride, Booking), Error> {
        let mut tx = self.pool.begin().await?;

        // the ride row is always locked before its bookings
        let ride_id: Uuid = tx
            .fetch_optional(sqlx::query("SELECT ride_id FROM bookings WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(Error::not_found_error)?
            .try_get("ride_id")?;

        let mut ride = fetch_ride_for_update(&mut tx, &ride_id).await?;
        let mut booking = fetch_booking_for_update(&mut tx, &id).await?;

        f(&mut ride, &mut booking)?;

        update_ride(&mut tx, &ride).await?;
        update_booking(&mut tx, &booking).await?;

        tx.commit().await?;

        Ok((ride, booking))
    }

    #[tracing::instrument(skip(self, f))]
    async fn update_ride_with_bookings(
        &self,
        id: Uuid,
        f: RideCascade,
    ) -> Result<(Ride, Vec<Booking>), Error> {
        let mut tx = self.pool.begin().await?;

        let mut ride = fetch_ride_for_update(&mut tx, &id).await?;

        let rows = tx
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM bookings WHERE ride_id = $1 ORDER BY created_at DESC FOR UPDATE",
                )
                .bind(&id),
            )
            .await?;
        let mut bookings = rows
            .iter()
            .map(booking_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        f(&mut ride, bookings.as_mut_slice())?;

        update_ride(&mut tx, &ride).await?;
        for booking in bookings.iter() {
            update_booking(&mut tx, booking).await?;
        }

        tx.commit().await?;

        Ok((ride, bookings))
    }
}
