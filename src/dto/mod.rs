pub mod ride_dto;
