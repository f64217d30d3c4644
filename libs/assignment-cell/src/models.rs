use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use shared_config::{is_valid_emergency_bonus, is_valid_tie_break_delta, AppConfig};
use shared_models::error::AppError;

// ==============================================================================
// APPOINTMENT CONTEXT
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[serde(alias = "consultation", alias = "general")]
    Regular,

    #[serde(alias = "followup", alias = "follow-up")]
    FollowUp,

    Emergency,
}

impl AppointmentType {
    pub fn is_emergency(self) -> bool {
        matches!(self, AppointmentType::Emergency)
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::Regular => write!(f, "regular"),
            AppointmentType::FollowUp => write!(f, "follow_up"),
            AppointmentType::Emergency => write!(f, "emergency"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Pending and confirmed bookings hold a doctor's slot.
    pub fn is_active(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// One pending assignment call. Created by the caller, never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub patient_ref: Uuid,
    pub department_id: Uuid,
    pub hospital_id: Uuid,
    pub requested_datetime: DateTime<Utc>,
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub priority: AppointmentPriority,
    /// Appointment being rescheduled; its own slot is not a conflict.
    #[serde(default)]
    pub current_appointment_id: Option<Uuid>,
}

// ==============================================================================
// COLLABORATOR SNAPSHOTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSnapshot {
    pub id: Uuid,
    pub birthdate: Option<NaiveDate>,
    pub gender: Option<String>,
    pub preferred_language: Option<String>,
    pub custom_language: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub secondary_languages: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub legacy_languages: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub diagnosis_codes: Vec<String>,
    pub care_complexity_score: Option<f64>,
    pub comorbidity_count: Option<u32>,
    pub medication_count: Option<u32>,
    pub hospitalization_count: Option<u32>,
    pub doctor_gender_preference: Option<String>,
}

impl PatientSnapshot {
    /// A snapshot with no personalization signals at all.
    pub fn bare(id: Uuid) -> Self {
        Self {
            id,
            birthdate: None,
            gender: None,
            preferred_language: None,
            custom_language: None,
            secondary_languages: Vec::new(),
            legacy_languages: Vec::new(),
            diagnosis_codes: Vec::new(),
            care_complexity_score: None,
            comorbidity_count: None,
            medication_count: None,
            hospitalization_count: None,
            doctor_gender_preference: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ConsultationHours {
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && time <= self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorRecord {
    pub id: Uuid,
    pub department_id: Uuid,
    pub hospital_id: Uuid,
    pub gender: Option<String>,
    #[serde(default)]
    pub years_of_experience: u32,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub languages_spoken: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub expertise_codes: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub primary_expertise_codes: Vec<String>,
    /// 0 = Sunday, 1 = Monday, ... 6 = Saturday
    #[serde(default, deserialize_with = "null_as_empty")]
    pub consultation_days: Vec<u32>,
    pub consultation_hours: ConsultationHours,
    pub max_daily_appointments: u32,
    /// Owned by the booking workflow; read here as a snapshot only.
    #[serde(default)]
    pub current_daily_appointment_count: u32,
    pub can_practice: bool,
    #[serde(default)]
    pub complex_case_rating: f64,
    #[serde(default)]
    pub continuity_of_care_rating: f64,
}

/// Completed (or otherwise historical) appointment between a patient and a doctor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PastAppointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub department_id: Uuid,
    pub appointment_datetime: DateTime<Utc>,
    pub status: AppointmentStatus,
}

/// Live booking on a doctor's calendar, used for slot-conflict checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedAppointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_datetime: DateTime<Utc>,
    pub status: AppointmentStatus,
}

/// Everything one engine call reads. All candidates are judged against this
/// single snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSnapshot {
    pub request: AppointmentRequest,
    pub patient: PatientSnapshot,
    #[serde(default)]
    pub candidates: Vec<DoctorRecord>,
    #[serde(default)]
    pub booked_appointments: Vec<BookedAppointment>,
    #[serde(default)]
    pub history: Vec<PastAppointment>,
}

// ==============================================================================
// ENGINE OUTPUT
// ==============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub experience: f64,
    pub language_match: f64,
    pub specialty_match: f64,
    pub continuity: f64,
    pub complexity_bonus: f64,
    pub workload_penalty: f64,
    pub emergency_bonus: f64,
    pub composite: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub doctor_id: Uuid,
    pub years_of_experience: u32,
    pub score_breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    CannotPractice,
    OutsideDepartment,
    NotConsultationDay,
    OutsideConsultationHours,
    SlotConflict,
    DailyCapReached,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::CannotPractice => write!(f, "doctor is not cleared to practice"),
            ExclusionReason::OutsideDepartment => write!(f, "doctor is not on the requested department roster"),
            ExclusionReason::NotConsultationDay => write!(f, "requested day is not a consultation day"),
            ExclusionReason::OutsideConsultationHours => write!(f, "requested time is outside consultation hours"),
            ExclusionReason::SlotConflict => write!(f, "doctor already has a booking at the requested time"),
            ExclusionReason::DailyCapReached => write!(f, "doctor has reached the daily appointment cap"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub doctor_id: Uuid,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub doctor_id: Uuid,
    pub score_breakdown: ScoreBreakdown,
    pub match_reasons: Vec<String>,
    /// Every scored candidate, in ranking order.
    pub evaluated: Vec<CandidateEvaluation>,
    pub excluded: Vec<Exclusion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    Assigned(AssignmentResult),
    NoEligibleDoctor {
        department_id: Uuid,
        candidates_considered: usize,
        excluded: Vec<Exclusion>,
    },
}

impl AssignmentOutcome {
    pub fn doctor_id(&self) -> Option<Uuid> {
        match self {
            AssignmentOutcome::Assigned(result) => Some(result.doctor_id),
            AssignmentOutcome::NoEligibleDoctor { .. } => None,
        }
    }

    /// For callers that prefer the no-match path as an error value.
    pub fn into_result(self) -> Result<AssignmentResult, AssignmentError> {
        match self {
            AssignmentOutcome::Assigned(result) => Ok(result),
            AssignmentOutcome::NoEligibleDoctor { department_id, .. } => {
                Err(AssignmentError::NoEligibleDoctor { department_id })
            }
        }
    }
}

// ==============================================================================
// ENGINE CONFIGURATION
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub experience_ceiling_years: f64,
    pub high_complexity_threshold: f64,
    pub workload_penalty_factor: f64,
    pub emergency_bonus: f64,
    pub tie_break_delta: f64,
    pub history_saturation_count: f64,
    pub recency_horizon_days: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            experience_ceiling_years: 30.0,
            high_complexity_threshold: 0.7,
            workload_penalty_factor: 5.0,
            emergency_bonus: 1000.0,
            tie_break_delta: 0.01,
            history_saturation_count: 5.0,
            recency_horizon_days: 365.0,
        }
    }
}

impl EngineConfig {
    /// Out-of-range settings keep the engine defaults.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let defaults = Self::default();

        let emergency_bonus = if is_valid_emergency_bonus(config.assignment_emergency_bonus) {
            config.assignment_emergency_bonus
        } else {
            warn!(
                "Ignoring emergency bonus {}, using {}",
                config.assignment_emergency_bonus, defaults.emergency_bonus
            );
            defaults.emergency_bonus
        };

        let tie_break_delta = if is_valid_tie_break_delta(config.assignment_tie_break_delta) {
            config.assignment_tie_break_delta
        } else {
            warn!(
                "Ignoring tie-break delta {}, using {}",
                config.assignment_tie_break_delta, defaults.tie_break_delta
            );
            defaults.tie_break_delta
        };

        Self {
            emergency_bonus,
            tie_break_delta,
            ..defaults
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AssignmentError {
    #[error("Invalid assignment request: {0}")]
    InvalidRequest(String),

    #[error("No eligible doctor in department {department_id}")]
    NoEligibleDoctor { department_id: Uuid },

    #[error("Required data unavailable: {0}")]
    DataUnavailable(String),
}

impl From<AssignmentError> for AppError {
    fn from(err: AssignmentError) -> Self {
        match err {
            AssignmentError::InvalidRequest(msg) => AppError::BadRequest(msg),
            e @ AssignmentError::NoEligibleDoctor { .. } => AppError::Conflict(e.to_string()),
            AssignmentError::DataUnavailable(msg) => AppError::ExternalService(msg),
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
