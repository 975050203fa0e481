pub mod platform;
pub mod repository;
pub mod types;
