//! Shared vocabulary for chainfolio: errors, domain types and the
//! collaborator traits the aggregation core is written against.

pub mod address;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
