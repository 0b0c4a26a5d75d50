mod booking;
mod location;
mod member;
pub(crate) mod ride;

pub use booking::{Booking, Status as BookingStatus};
pub use location::{Coordinates, LocationEvent, ParticipantRole};
pub use member::{Member, MemberProfile};
pub use ride::{
    CarDetails, CarDetailsSpec, PassengerSnapshot, Ride, RideSpec, Status as RideStatus,
};
