//! Data Transfer Objects for REST request/response serialization.
//!
//! Identifiers travel as plain integers (or UUIDs for QR sessions); money
//! amounts as decimal strings.

pub mod booking_dto;
pub mod common_dto;
pub mod rewards_dto;
pub mod session_dto;

pub use booking_dto::*;
pub use common_dto::*;
pub use rewards_dto::*;
pub use session_dto::*;
