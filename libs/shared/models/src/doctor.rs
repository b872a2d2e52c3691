use serde::{Deserialize, Serialize};

/// A doctor as seen by the patient and appointment cells: an authorization
/// principal plus the display data copied onto appointments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: String,
    /// Auth principal linked to this doctor, if the doctor has logged in.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "especialidad")]
    pub specialty: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub consultation_fee: Option<f64>,
    #[serde(default)]
    pub verified: bool,
}
