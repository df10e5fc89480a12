pub mod driver;
pub mod ride;
pub mod user;

pub use driver::DriverAvailability;
pub use user::UserRole;
pub use ride::{
    Coords, Location, PaymentMethod, Ride, RideStatus, TimelineEvent, TimelineEventType,
};
