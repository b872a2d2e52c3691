use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use shared_database::{DocumentStore, Query, SortDirection, StoreError};
use shared_utils::clock::Clock;
use shared_utils::ids::{human_readable_id, new_record_id};

use crate::models::{
    FamilyMember, FamilyMemberData, Patient, PatientError, PatientUnderCare,
    UpdateFamilyMemberRequest, FAMILY_MEMBERS,
};
use crate::services::patient::{decode_all, load_family_member, load_patient};
use crate::services::session::PatientSession;
use crate::services::validation::validate_family_member_data;

/// Family members registered by a primary patient. They have no login and no
/// doctor grants of their own.
pub struct FamilyService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl FamilyService {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self { store, clock, offset }
    }

    fn today(&self) -> NaiveDate {
        self.clock.today(self.offset)
    }

    pub async fn create_family_member(
        &self,
        primary_patient_id: &str,
        data: FamilyMemberData,
    ) -> Result<FamilyMember, PatientError> {
        debug!("Creating family member for primary patient {}", primary_patient_id);

        validate_family_member_data(&data, self.today())?;

        if load_patient(self.store.as_ref(), primary_patient_id).await?.is_none() {
            return Err(PatientError::NotFound(primary_patient_id.to_string()));
        }

        let now = self.clock.now();
        let member = FamilyMember {
            id: new_record_id(),
            family_member_id: Some(human_readable_id("FAM", now)),
            primary_patient_id: primary_patient_id.to_string(),
            name: data.name.trim().to_string(),
            relationship: data.relationship.trim().to_string(),
            details: data.details,
            created_at: now,
            updated_at: now,
        };

        let stored = self
            .store
            .insert(FAMILY_MEMBERS, serde_json::to_value(&member)?)
            .await?;

        info!("Family member {} created under {}", member.id, primary_patient_id);
        Ok(serde_json::from_value(stored)?)
    }

    pub async fn get_family_member(&self, member_id: &str) -> Result<FamilyMember, PatientError> {
        load_family_member(self.store.as_ref(), member_id)
            .await?
            .ok_or_else(|| PatientError::FamilyMemberNotFound(member_id.to_string()))
    }

    /// Family members of a primary patient, oldest registration first.
    pub async fn get_family_members(&self, primary_patient_id: &str) -> Result<Vec<FamilyMember>, PatientError> {
        let documents = self
            .store
            .query(
                FAMILY_MEMBERS,
                &Query::new()
                    .eq("primary_patient_id", primary_patient_id)
                    .order_by("created_at", SortDirection::Ascending),
            )
            .await?;
        decode_all(documents)
    }

    /// Applies the update and re-validates the merged record. The owning
    /// primary patient cannot be changed.
    pub async fn update_family_member(
        &self,
        member_id: &str,
        request: UpdateFamilyMemberRequest,
    ) -> Result<FamilyMember, PatientError> {
        debug!("Updating family member {}", member_id);

        let current = self.get_family_member(member_id).await?;
        let merged = FamilyMemberData {
            name: request.name.clone().unwrap_or_else(|| current.name.clone()),
            relationship: request
                .relationship
                .clone()
                .unwrap_or_else(|| current.relationship.clone()),
            details: current.details.overlay(&request.details),
        };
        validate_family_member_data(&merged, self.today())?;

        let mut patch = Map::new();
        if let Some(name) = request.name {
            patch.insert("name".to_string(), json!(name.trim()));
        }
        if let Some(relationship) = request.relationship {
            patch.insert("relationship".to_string(), json!(relationship.trim()));
        }
        request.details.write_set_fields(&mut patch);
        patch.insert("updated_at".to_string(), json!(self.clock.now()));

        let updated = self
            .store
            .update(FAMILY_MEMBERS, member_id, Value::Object(patch), None)
            .await?;

        info!("Family member {} updated", member_id);
        Ok(serde_json::from_value(updated)?)
    }

    /// Hard delete; appointments booked for the member keep their reference.
    pub async fn delete_family_member(&self, member_id: &str) -> Result<(), PatientError> {
        self.store
            .delete(FAMILY_MEMBERS, member_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => PatientError::FamilyMemberNotFound(member_id.to_string()),
                other => PatientError::Storage(other),
            })?;

        info!("Family member {} deleted", member_id);
        Ok(())
    }

    /// The primary patient at index 0, then every family member.
    pub async fn get_all_patients_under_care(
        &self,
        primary_patient_id: &str,
        primary: &Patient,
    ) -> Result<Vec<PatientUnderCare>, PatientError> {
        let members = self.get_family_members(primary_patient_id).await?;

        let mut patients = Vec::with_capacity(members.len() + 1);
        patients.push(PatientUnderCare::from(primary));
        patients.extend(members.iter().map(PatientUnderCare::from));
        Ok(patients)
    }

    /// Starts an active-patient session for a logged-in primary patient.
    pub async fn open_session(&self, primary: &Patient) -> Result<PatientSession, PatientError> {
        let patients = self.get_all_patients_under_care(&primary.id, primary).await?;
        PatientSession::open(patients)
    }
}
