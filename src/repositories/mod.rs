pub mod availability_repository;
pub mod memory;
pub mod ride_repository;

pub use availability_repository::{AvailabilityRegistry, PgAvailabilityRepository};
pub use ride_repository::{NewRide, PgRideRepository, RideStore, TransitionUpdate};
