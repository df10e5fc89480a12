pub mod availability_controller;
pub mod ride_controller;

pub use availability_controller::AvailabilityController;
pub use ride_controller::RideController;
