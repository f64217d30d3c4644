// libs/assignment-cell/src/services/history.rs
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::models::{AppointmentStatus, AppointmentType, EngineConfig, PastAppointment};
use crate::services::scoring::WeightProfile;

/// What the history store knows about one (patient, doctor) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionSummary {
    pub appointment_count: usize,
    pub most_recent: DateTime<Utc>,
    pub department_match: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinuityComponents {
    pub count_score: f64,
    pub recency_score: f64,
    pub department_score: f64,
    pub combined: f64,
}

/// Read-only index of a single patient's completed appointments, grouped per
/// doctor with the most recent visit first.
#[derive(Debug, Clone, Default)]
pub struct HistoryIndex {
    by_doctor: HashMap<Uuid, Vec<PastAppointment>>,
}

impl HistoryIndex {
    pub fn build(patient_id: Uuid, appointments: &[PastAppointment]) -> Self {
        let mut by_doctor: HashMap<Uuid, Vec<PastAppointment>> = HashMap::new();

        for appointment in appointments.iter().filter(|a| {
            a.patient_id == patient_id && a.status == AppointmentStatus::Completed
        }) {
            by_doctor
                .entry(appointment.doctor_id)
                .or_default()
                .push(appointment.clone());
        }

        for visits in by_doctor.values_mut() {
            visits.sort_by(|a, b| {
                b.appointment_datetime
                    .cmp(&a.appointment_datetime)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }

        debug!(
            "Indexed completed history for patient {} across {} doctors",
            patient_id,
            by_doctor.len()
        );

        Self { by_doctor }
    }

    /// Completed visits with `doctor_id`, most recent first.
    pub fn completed_with(&self, doctor_id: Uuid) -> &[PastAppointment] {
        self.by_doctor
            .get(&doctor_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn summary(&self, doctor_id: Uuid, department_id: Uuid) -> Option<InteractionSummary> {
        let visits = self.completed_with(doctor_id);
        let most_recent = visits.first()?.appointment_datetime;

        Some(InteractionSummary {
            appointment_count: visits.len(),
            most_recent,
            department_match: visits.iter().any(|v| v.department_id == department_id),
        })
    }
}

pub fn continuity_components(
    summary: &InteractionSummary,
    reference_time: DateTime<Utc>,
    config: &EngineConfig,
) -> ContinuityComponents {
    let count_score =
        (summary.appointment_count as f64 / config.history_saturation_count).min(1.0);

    let days_since = (reference_time - summary.most_recent).num_days().max(0) as f64;
    let recency_score = (1.0 - days_since / config.recency_horizon_days).max(0.0);

    let department_score = if summary.department_match { 1.0 } else { 0.5 };

    ContinuityComponents {
        count_score,
        recency_score,
        department_score,
        combined: 0.3 * count_score + 0.5 * recency_score + 0.2 * department_score,
    }
}

/// Continuity sub-score for one candidate. Emergencies never consult history.
pub fn continuity_score(
    summary: Option<&InteractionSummary>,
    reference_time: DateTime<Utc>,
    appointment_type: AppointmentType,
    config: &EngineConfig,
) -> f64 {
    if appointment_type.is_emergency() {
        return 0.0;
    }

    let Some(summary) = summary else {
        return 0.0;
    };

    let scale = WeightProfile::for_type(appointment_type, config).continuity_scale;
    continuity_components(summary, reference_time, config).combined * scale
}
