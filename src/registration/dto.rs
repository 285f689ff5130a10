use serde::Deserialize;
use time::Date;

use crate::store::ParticipantProfile;

/// Registration form as submitted by a parent.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub participant_name: String,
    #[serde(with = "crate::iso_date")]
    pub dob: Date,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub mother_name: String,
    #[serde(default)]
    pub contact_home: String,
    #[serde(default)]
    pub contact_father_office: String,
    #[serde(default)]
    pub contact_father_mobile: String,
    #[serde(default)]
    pub contact_mother_office: String,
    #[serde(default)]
    pub contact_mother_mobile: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub residence: String,
    #[serde(default)]
    pub parent_agreement: bool,
    #[serde(default)]
    pub parent_signature: String,
    #[serde(default)]
    pub medical_conditions: Vec<String>,
    #[serde(default)]
    pub other_condition: String,
    #[serde(default)]
    pub medical_notes: String,
}

impl RegistrationRequest {
    pub fn profile(&self) -> ParticipantProfile {
        ParticipantProfile {
            father_name: self.father_name.clone(),
            mother_name: self.mother_name.clone(),
            contact_home: self.contact_home.clone(),
            contact_father_office: self.contact_father_office.clone(),
            contact_father_mobile: self.contact_father_mobile.clone(),
            contact_mother_office: self.contact_mother_office.clone(),
            contact_mother_mobile: self.contact_mother_mobile.clone(),
            email: self.email.clone(),
            residence: self.residence.clone(),
            parent_agreement: self.parent_agreement,
            parent_signature: self.parent_signature.clone(),
            medical_conditions: self.medical_conditions.clone(),
            other_condition: self.other_condition.clone(),
            medical_notes: self.medical_notes.clone(),
        }
    }
}
