// libs/assignment-cell/src/services/features.rs
//
// Flat feature records for the scoring engine. Missing personalization data
// always produces an empty/zero feature, never an error.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    AppointmentPriority, AppointmentRequest, AppointmentType, BookedAppointment, DoctorRecord,
    PatientSnapshot,
};
use crate::services::availability::effective_daily_load;

/// Produces a flat feature record from one domain snapshot. New feature
/// sources get their own extractor rather than extending an existing one.
pub trait FeatureExtractor {
    type Source;
    type Features;

    fn extract(&self, source: &Self::Source) -> Self::Features;
}

// ==============================================================================
// PATIENT
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PatientFeatures {
    pub patient_id: Uuid,
    pub age_years: Option<u32>,
    pub preferred_language: Option<String>,
    pub additional_languages: Vec<String>,
    pub diagnosis_codes: Vec<String>,
    /// Overall case complexity in 0..=1
    pub complexity: f64,
    pub gender_preference: Option<String>,
}

pub struct PatientFeatureExtractor {
    reference_date: NaiveDate,
}

impl PatientFeatureExtractor {
    pub fn new(reference_date: NaiveDate) -> Self {
        Self { reference_date }
    }

    fn age_on(&self, birthdate: NaiveDate) -> Option<u32> {
        self.reference_date.years_since(birthdate)
    }
}

impl FeatureExtractor for PatientFeatureExtractor {
    type Source = PatientSnapshot;
    type Features = PatientFeatures;

    fn extract(&self, patient: &PatientSnapshot) -> PatientFeatures {
        let preferred_language = preferred_language(patient);

        let mut additional_languages = Vec::new();
        for language in patient.secondary_languages.iter().chain(&patient.legacy_languages) {
            if let Some(lang) = normalize_token(language) {
                if preferred_language.as_deref() != Some(lang.as_str())
                    && !additional_languages.contains(&lang)
                {
                    additional_languages.push(lang);
                }
            }
        }

        PatientFeatures {
            patient_id: patient.id,
            age_years: patient.birthdate.and_then(|b| self.age_on(b)),
            preferred_language,
            additional_languages,
            diagnosis_codes: normalize_codes(&patient.diagnosis_codes),
            complexity: case_complexity(patient),
            gender_preference: patient
                .doctor_gender_preference
                .as_deref()
                .and_then(normalize_token),
        }
    }
}

fn preferred_language(patient: &PatientSnapshot) -> Option<String> {
    match patient.preferred_language.as_deref().and_then(normalize_token) {
        Some(lang) if lang != "other" => Some(lang),
        _ => patient.custom_language.as_deref().and_then(normalize_token),
    }
}

/// Explicit score when recorded, otherwise derived from acuity signals.
fn case_complexity(patient: &PatientSnapshot) -> f64 {
    if let Some(score) = patient.care_complexity_score.filter(|s| s.is_finite()) {
        return score.clamp(0.0, 1.0);
    }

    let signals = [
        (patient.comorbidity_count, 0.15),
        (patient.medication_count, 0.05),
        (patient.hospitalization_count, 0.2),
    ];

    let derived: f64 = signals
        .iter()
        .filter_map(|(count, weight)| count.map(|c| c as f64 * weight))
        .sum();

    derived.min(1.0)
}

// ==============================================================================
// DOCTOR
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DoctorFeatures {
    pub doctor_id: Uuid,
    pub years_of_experience: u32,
    pub languages: Vec<String>,
    /// Union of general and primary expertise, upper-cased.
    pub expertise_codes: Vec<String>,
    pub primary_expertise_codes: Vec<String>,
    pub complex_case_rating: f64,
    pub continuity_of_care_rating: f64,
    pub gender: Option<String>,
    pub daily_load: u32,
    pub max_daily_appointments: u32,
}

impl DoctorFeatures {
    pub fn workload_ratio(&self) -> f64 {
        if self.max_daily_appointments == 0 {
            return 1.0;
        }
        self.daily_load as f64 / self.max_daily_appointments as f64
    }
}

/// Extracts doctor features against the booked-appointment snapshot of the
/// requested day, so workload reflects the same data the validator saw.
pub struct DoctorFeatureExtractor<'a> {
    booked: &'a [BookedAppointment],
    requested_date: NaiveDate,
    current_appointment_id: Option<Uuid>,
}

impl<'a> DoctorFeatureExtractor<'a> {
    pub fn new(
        booked: &'a [BookedAppointment],
        requested_date: NaiveDate,
        current_appointment_id: Option<Uuid>,
    ) -> Self {
        Self {
            booked,
            requested_date,
            current_appointment_id,
        }
    }
}

impl FeatureExtractor for DoctorFeatureExtractor<'_> {
    type Source = DoctorRecord;
    type Features = DoctorFeatures;

    fn extract(&self, doctor: &DoctorRecord) -> DoctorFeatures {
        let primary_expertise_codes = normalize_codes(&doctor.primary_expertise_codes);
        let mut expertise_codes = normalize_codes(&doctor.expertise_codes);
        for code in &primary_expertise_codes {
            if !expertise_codes.contains(code) {
                expertise_codes.push(code.clone());
            }
        }

        let mut languages = Vec::new();
        for language in &doctor.languages_spoken {
            if let Some(lang) = normalize_token(language) {
                if !languages.contains(&lang) {
                    languages.push(lang);
                }
            }
        }

        DoctorFeatures {
            doctor_id: doctor.id,
            years_of_experience: doctor.years_of_experience,
            languages,
            expertise_codes,
            primary_expertise_codes,
            complex_case_rating: doctor.complex_case_rating.max(0.0),
            continuity_of_care_rating: doctor.continuity_of_care_rating.max(0.0),
            gender: doctor.gender.as_deref().and_then(normalize_token),
            daily_load: effective_daily_load(
                doctor,
                self.booked,
                self.requested_date,
                self.current_appointment_id,
            ),
            max_daily_appointments: doctor.max_daily_appointments,
        }
    }
}

// ==============================================================================
// APPOINTMENT CONTEXT
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ContextFeatures {
    pub appointment_type: AppointmentType,
    pub priority: AppointmentPriority,
    pub department_id: Uuid,
    pub hospital_id: Uuid,
    pub requested_datetime: DateTime<Utc>,
    pub is_emergency: bool,
}

pub struct ContextFeatureExtractor;

impl FeatureExtractor for ContextFeatureExtractor {
    type Source = AppointmentRequest;
    type Features = ContextFeatures;

    fn extract(&self, request: &AppointmentRequest) -> ContextFeatures {
        ContextFeatures {
            appointment_type: request.appointment_type,
            priority: request.priority,
            department_id: request.department_id,
            hospital_id: request.hospital_id,
            requested_datetime: request.requested_datetime,
            is_emergency: request.appointment_type.is_emergency(),
        }
    }
}

// ==============================================================================
// NORMALIZATION
// ==============================================================================

fn normalize_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

fn normalize_codes(raw: &[String]) -> Vec<String> {
    let mut codes: Vec<String> = Vec::with_capacity(raw.len());
    for code in raw {
        let code = code.trim().to_uppercase();
        if !code.is_empty() && !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}
