pub mod access;
pub mod doctors;
pub mod family;
pub mod patient;
pub mod session;
pub mod validation;

pub use access::{AccessGraph, Actor};
pub use doctors::DoctorDirectory;
pub use family::FamilyService;
pub use patient::PatientService;
pub use session::PatientSession;
