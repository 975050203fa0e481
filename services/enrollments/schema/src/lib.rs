//! sea-orm entities read by the enrollments service.
//!
//! `legacy_users` holds the V1 per-user document with nested platform
//! sub-objects; `user_products` is the V2 normalized join table.

pub mod legacy_users;
pub mod products;
pub mod user_products;
