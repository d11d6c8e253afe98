use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{Patient, QueueError};

pub struct PatientService {
    supabase: SupabaseClient,
}

/// National ids are exactly 16 digits.
pub fn is_valid_national_id(value: &str) -> bool {
    value.len() == 16 && value.bytes().all(|b| b.is_ascii_digit())
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Resolves a walk-in patient by national id, registering them with a
    /// fresh medical record number on first visit.
    pub async fn get_or_create(
        &self,
        national_id: &str,
        name: &str,
        phone: Option<&str>,
        auth_token: &str,
    ) -> Result<Patient, QueueError> {
        if !is_valid_national_id(national_id) {
            return Err(QueueError::Validation(
                "National id must be exactly 16 digits".to_string(),
            ));
        }

        let existing: Vec<Patient> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/patients?national_id=eq.{}", national_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        if let Some(patient) = existing.into_iter().next() {
            debug!("Walk-in matched existing patient {}", patient.id);
            return Ok(patient);
        }

        let medical_record_number = self.next_medical_record_number(auth_token).await?;
        let now = Utc::now();

        let created: Vec<Patient> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/patients",
                Some(auth_token),
                Some(json!({
                    "name": name,
                    "national_id": national_id,
                    "phone": phone,
                    "medical_record_number": medical_record_number,
                    "created_at": now.to_rfc3339(),
                    "updated_at": now.to_rfc3339()
                })),
                Some(return_representation()),
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let patient = created
            .into_iter()
            .next()
            .ok_or_else(|| QueueError::Database("Failed to create patient".to_string()))?;

        info!(
            "Registered walk-in patient {} as {}",
            patient.id, patient.medical_record_number
        );
        Ok(patient)
    }

    /// Lookup by medical record number, falling back to national id when
    /// the identifier reads as one.
    pub async fn lookup(&self, identifier: &str, auth_token: &str) -> Result<Patient, QueueError> {
        let filter = if is_valid_national_id(identifier) {
            format!("national_id=eq.{}", identifier)
        } else {
            format!("medical_record_number=eq.{}", identifier)
        };

        let rows: Vec<Patient> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/patients?{}", filter),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| QueueError::NotFound(format!("Patient {}", identifier)))
    }

    /// Record numbers are RM-prefixed sequences; the next one continues
    /// from the most recently registered patient.
    async fn next_medical_record_number(&self, auth_token: &str) -> Result<String, QueueError> {
        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                "/rest/v1/patients?order=created_at.desc&limit=1&select=medical_record_number",
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let last = rows
            .first()
            .and_then(|row| row["medical_record_number"].as_str())
            .and_then(|mrn| mrn.strip_prefix("RM-"))
            .and_then(|digits| digits.parse::<i64>().ok())
            .unwrap_or(0);

        Ok(format!("RM-{:06}", last + 1))
    }
}
