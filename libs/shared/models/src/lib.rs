pub mod auth;
pub mod doctor;
pub mod error;
