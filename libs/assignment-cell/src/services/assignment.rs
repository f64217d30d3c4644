// libs/assignment-cell/src/services/assignment.rs
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::{
    AppointmentRequest, AssignmentError, AssignmentOutcome, AssignmentSnapshot, EngineConfig,
};
use crate::services::availability::AvailabilityValidator;
use crate::services::directory::{
    AppointmentHistoryStore, CapacityLedger, DepartmentRoster, PatientDirectory, SupabaseDirectory,
};
use crate::services::optimizer::AssignmentOptimizer;

/// Loads one consistent snapshot from the collaborators and runs the
/// optimizer over it. Never retries; retry policy belongs to the caller.
pub struct DoctorAssignmentService {
    patients: Arc<dyn PatientDirectory>,
    roster: Arc<dyn DepartmentRoster>,
    history: Arc<dyn AppointmentHistoryStore>,
    ledger: Arc<dyn CapacityLedger>,
    optimizer: AssignmentOptimizer,
}

impl DoctorAssignmentService {
    pub fn new(config: &AppConfig) -> Self {
        let directory = Arc::new(SupabaseDirectory::new(config));
        Self::with_collaborators(
            directory.clone(),
            directory.clone(),
            directory.clone(),
            directory,
            EngineConfig::from_app_config(config),
        )
    }

    pub fn with_collaborators(
        patients: Arc<dyn PatientDirectory>,
        roster: Arc<dyn DepartmentRoster>,
        history: Arc<dyn AppointmentHistoryStore>,
        ledger: Arc<dyn CapacityLedger>,
        engine_config: EngineConfig,
    ) -> Self {
        Self {
            patients,
            roster,
            history,
            ledger,
            optimizer: AssignmentOptimizer::new(engine_config),
        }
    }

    #[instrument(
        skip(self, request, auth_token),
        fields(
            patient_id = %request.patient_ref,
            department_id = %request.department_id,
            priority = ?request.priority
        )
    )]
    pub async fn assign_doctor(
        &self,
        request: AppointmentRequest,
        auth_token: &str,
    ) -> Result<AssignmentOutcome, AssignmentError> {
        let snapshot = self.load_snapshot(request, auth_token).await?;
        let outcome = self.optimizer.assign(&snapshot)?;

        match outcome.doctor_id() {
            Some(doctor_id) => info!("Assignment complete: doctor {}", doctor_id),
            None => warn!(
                "No eligible doctor for patient {}; caller must waitlist or escalate",
                snapshot.request.patient_ref
            ),
        }

        Ok(outcome)
    }

    /// Fetches everything the engine reads for `request`. History is fetched
    /// per (patient, doctor) pair concurrently.
    pub async fn load_snapshot(
        &self,
        request: AppointmentRequest,
        auth_token: &str,
    ) -> Result<AssignmentSnapshot, AssignmentError> {
        if request.department_id.is_nil() || request.hospital_id.is_nil() {
            return Err(AssignmentError::InvalidRequest(
                "department_id and hospital_id are required".to_string(),
            ));
        }

        if !self
            .roster
            .department_exists(request.hospital_id, request.department_id, auth_token)
            .await?
        {
            return Err(AssignmentError::InvalidRequest(format!(
                "Department {} not found in hospital {}",
                request.department_id, request.hospital_id
            )));
        }

        let patient = self.patients.fetch_patient(request.patient_ref, auth_token).await?;

        let candidates = self
            .roster
            .doctors_in_department(request.hospital_id, request.department_id, auth_token)
            .await?;

        let doctor_ids: Vec<Uuid> = candidates.iter().map(|d| d.id).collect();
        let booked_appointments = self
            .history
            .booked_appointments(&doctor_ids, request.requested_datetime.date_naive(), auth_token)
            .await?;

        let history = try_join_all(
            doctor_ids
                .iter()
                .map(|doctor_id| self.history.completed_appointments(patient.id, *doctor_id, auth_token)),
        )
        .await?
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        debug!(
            "Loaded snapshot: {} candidates, {} bookings, {} past visits",
            candidates.len(),
            booked_appointments.len(),
            history.len()
        );

        Ok(AssignmentSnapshot {
            request,
            patient,
            candidates,
            booked_appointments,
            history,
        })
    }

    /// Optimistic check-then-commit for the booking workflow: re-validates the
    /// chosen doctor against fresh data, then bumps the daily counter only if
    /// nobody else did first. `Ok(false)` means the slot was lost.
    #[instrument(skip(self, request, doctor_id, auth_token), fields(doctor_id = %doctor_id))]
    pub async fn commit_assignment(
        &self,
        request: &AppointmentRequest,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, AssignmentError> {
        let roster = self
            .roster
            .doctors_in_department(request.hospital_id, request.department_id, auth_token)
            .await?;

        let Some(doctor) = roster.into_iter().find(|d| d.id == doctor_id) else {
            warn!("Doctor {} no longer on department roster", doctor_id);
            return Ok(false);
        };

        if !doctor.can_practice {
            warn!("Doctor {} can no longer practice", doctor_id);
            return Ok(false);
        }

        let booked = self
            .history
            .booked_appointments(&[doctor_id], request.requested_datetime.date_naive(), auth_token)
            .await?;

        let still_available = AvailabilityValidator::new(&booked).is_available(
            &doctor,
            request.requested_datetime,
            request.appointment_type.is_emergency(),
            request.current_appointment_id,
        );
        if !still_available {
            info!("Doctor {} lost availability before commit", doctor_id);
            return Ok(false);
        }

        let committed = self
            .ledger
            .compare_and_increment(doctor_id, doctor.current_daily_appointment_count, auth_token)
            .await?;

        if !committed {
            info!("Daily counter for doctor {} moved concurrently", doctor_id);
        }
        Ok(committed)
    }
}
