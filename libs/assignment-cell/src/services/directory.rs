// libs/assignment-cell/src/services/directory.rs
//
// Read-only collaborators the engine consumes, plus the booking workflow's
// compare-and-increment contract for the daily appointment counter.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, SecondsFormat};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AssignmentError, BookedAppointment, DoctorRecord, PastAppointment, PatientSnapshot};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn fetch_patient(&self, patient_id: Uuid, auth_token: &str)
        -> Result<PatientSnapshot, AssignmentError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DepartmentRoster: Send + Sync {
    async fn department_exists(
        &self,
        hospital_id: Uuid,
        department_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, AssignmentError>;

    async fn doctors_in_department(
        &self,
        hospital_id: Uuid,
        department_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<DoctorRecord>, AssignmentError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AppointmentHistoryStore: Send + Sync {
    /// Completed appointments for the pair, most recent first.
    async fn completed_appointments(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<PastAppointment>, AssignmentError>;

    /// Pending and confirmed bookings of the given doctors on `date`.
    async fn booked_appointments(
        &self,
        doctor_ids: &[Uuid],
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedAppointment>, AssignmentError>;
}

/// Owned by the booking workflow. Succeeds only if the doctor's counter still
/// equals `expected_count`, incrementing it atomically.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CapacityLedger: Send + Sync {
    async fn compare_and_increment(
        &self,
        doctor_id: Uuid,
        expected_count: u32,
        auth_token: &str,
    ) -> Result<bool, AssignmentError>;
}

/// PostgREST-backed implementation of every collaborator.
#[derive(Clone)]
pub struct SupabaseDirectory {
    supabase: SupabaseClient,
}

impl SupabaseDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn get_rows<T>(&self, path: &str, auth_token: &str, what: &str) -> Result<Vec<T>, AssignmentError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.supabase
            .request::<Vec<T>>(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch {}: {}", what, e);
                AssignmentError::DataUnavailable(format!("Failed to fetch {}: {}", what, e))
            })
    }
}

#[async_trait]
impl PatientDirectory for SupabaseDirectory {
    async fn fetch_patient(&self, patient_id: Uuid, auth_token: &str)
        -> Result<PatientSnapshot, AssignmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let mut rows: Vec<PatientSnapshot> = self.get_rows(&path, auth_token, "patient").await?;

        if rows.is_empty() {
            return Err(AssignmentError::InvalidRequest(format!("Patient {} not found", patient_id)));
        }

        Ok(rows.swap_remove(0))
    }
}

#[async_trait]
impl DepartmentRoster for SupabaseDirectory {
    async fn department_exists(
        &self,
        hospital_id: Uuid,
        department_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, AssignmentError> {
        let path = format!(
            "/rest/v1/departments?id=eq.{}&hospital_id=eq.{}&select=id",
            department_id, hospital_id
        );
        let rows: Vec<Value> = self.get_rows(&path, auth_token, "department").await?;
        Ok(!rows.is_empty())
    }

    async fn doctors_in_department(
        &self,
        hospital_id: Uuid,
        department_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<DoctorRecord>, AssignmentError> {
        let path = format!(
            "/rest/v1/doctors?department_id=eq.{}&hospital_id=eq.{}&order=id.asc",
            department_id, hospital_id
        );
        let doctors: Vec<DoctorRecord> = self.get_rows(&path, auth_token, "department roster").await?;

        debug!("Roster for department {} has {} doctors", department_id, doctors.len());
        Ok(doctors)
    }
}

#[async_trait]
impl AppointmentHistoryStore for SupabaseDirectory {
    async fn completed_appointments(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<PastAppointment>, AssignmentError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&doctor_id=eq.{}&status=eq.completed&order=appointment_datetime.desc",
            patient_id, doctor_id
        );
        self.get_rows(&path, auth_token, "appointment history").await
    }

    async fn booked_appointments(
        &self,
        doctor_ids: &[Uuid],
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedAppointment>, AssignmentError> {
        if doctor_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = doctor_ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        // Same UTC day the validator checks against
        let day_start = date.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + Duration::days(1);

        let path = format!(
            "/rest/v1/appointments?doctor_id=in.({})&status=in.(pending,confirmed)&appointment_datetime=gte.{}&appointment_datetime=lt.{}&select=id,doctor_id,appointment_datetime,status",
            ids,
            day_start.to_rfc3339_opts(SecondsFormat::Secs, true),
            day_end.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        self.get_rows(&path, auth_token, "booked appointments").await
    }
}

#[async_trait]
impl CapacityLedger for SupabaseDirectory {
    async fn compare_and_increment(
        &self,
        doctor_id: Uuid,
        expected_count: u32,
        auth_token: &str,
    ) -> Result<bool, AssignmentError> {
        let body = json!({
            "p_doctor_id": doctor_id,
            "p_expected_count": expected_count
        });

        self.supabase
            .request::<bool>(
                Method::POST,
                "/rest/v1/rpc/increment_daily_appointment_count",
                Some(auth_token),
                Some(body),
            )
            .await
            .map_err(|e| {
                error!("Daily counter update failed for doctor {}: {}", doctor_id, e);
                AssignmentError::DataUnavailable(format!("Failed to update daily counter: {}", e))
            })
    }
}
