pub mod bookings;
pub mod members;
pub mod rides;
pub mod tracking;
