// libs/assignment-cell/src/services/scoring.rs
use crate::models::{AppointmentType, EngineConfig, ScoreBreakdown};
use crate::services::features::{ContextFeatures, DoctorFeatures, PatientFeatures};
use crate::services::history::{continuity_score, InteractionSummary};

const PREFERRED_LANGUAGE_POINTS: f64 = 3.0;
const ADDITIONAL_LANGUAGE_POINTS: f64 = 2.0;
const SPECIALTY_EXACT_CREDIT: f64 = 10.0;
const SPECIALTY_CATEGORY_CREDIT: f64 = 5.0;
const SPECIALTY_CAP: f64 = 10.0;
const PRINCIPAL_DIAGNOSIS_WEIGHT: f64 = 2.0;
const CATEGORY_PREFIX_LEN: usize = 3;

// ==============================================================================
// WEIGHT PROFILES
// ==============================================================================

/// Per appointment-type policy table. All type-dependent behavior of the
/// scoring engine is read from here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightProfile {
    pub experience: f64,
    pub language: f64,
    pub specialty: f64,
    pub complexity: f64,
    pub workload: f64,
    pub continuity_scale: f64,
    pub emergency_bonus: f64,
}

impl WeightProfile {
    pub fn for_type(appointment_type: AppointmentType, config: &EngineConfig) -> Self {
        let base = Self {
            experience: 1.0,
            language: 1.0,
            specialty: 1.0,
            complexity: 1.0,
            workload: 1.0,
            continuity_scale: 0.0,
            emergency_bonus: 0.0,
        };

        match appointment_type {
            AppointmentType::Regular => Self { continuity_scale: 5.0, ..base },
            AppointmentType::FollowUp => Self { continuity_scale: 15.0, ..base },
            AppointmentType::Emergency => Self {
                emergency_bonus: config.emergency_bonus,
                ..base
            },
        }
    }
}

// ==============================================================================
// SUB-SCORES
// ==============================================================================

pub fn experience_score(years_of_experience: u32, config: &EngineConfig) -> f64 {
    (years_of_experience as f64 / config.experience_ceiling_years).min(1.0)
}

/// +3 when the doctor speaks the preferred language, +2 for each additional
/// patient language the doctor also speaks.
pub fn language_match_score(patient: &PatientFeatures, doctor: &DoctorFeatures) -> f64 {
    let speaks = |lang: &String| doctor.languages.contains(lang);

    let preferred = match &patient.preferred_language {
        Some(lang) if speaks(lang) => PREFERRED_LANGUAGE_POINTS,
        _ => 0.0,
    };

    let additional = patient
        .additional_languages
        .iter()
        .filter(|lang| speaks(lang))
        .count() as f64
        * ADDITIONAL_LANGUAGE_POINTS;

    preferred + additional
}

/// Weighted average of per-diagnosis credit: exact code in the doctor's
/// expertise earns full credit, same 3-character category earns half. The
/// first (principal) diagnosis counts double.
pub fn specialty_match_score(diagnosis_codes: &[String], doctor: &DoctorFeatures) -> f64 {
    if diagnosis_codes.is_empty() {
        return 0.0;
    }

    let mut weighted_credit = 0.0;
    let mut total_weight = 0.0;

    for (position, code) in diagnosis_codes.iter().enumerate() {
        let weight = if position == 0 { PRINCIPAL_DIAGNOSIS_WEIGHT } else { 1.0 };

        let credit = if doctor.expertise_codes.contains(code) {
            SPECIALTY_EXACT_CREDIT
        } else if doctor
            .expertise_codes
            .iter()
            .any(|expertise| category(expertise) == category(code))
        {
            SPECIALTY_CATEGORY_CREDIT
        } else {
            0.0
        };

        weighted_credit += weight * credit;
        total_weight += weight;
    }

    (weighted_credit / total_weight).min(SPECIALTY_CAP)
}

fn category(code: &str) -> &str {
    match code.char_indices().nth(CATEGORY_PREFIX_LEN) {
        Some((idx, _)) => &code[..idx],
        None => code,
    }
}

pub fn complexity_bonus(complexity: f64, doctor: &DoctorFeatures, config: &EngineConfig) -> f64 {
    if complexity > config.high_complexity_threshold {
        doctor.years_of_experience as f64 * 0.5 + doctor.complex_case_rating * 0.3
    } else {
        0.0
    }
}

/// Cubic in the load ratio: near-empty calendars cost almost nothing, full
/// ones cost the whole factor.
pub fn workload_penalty(workload_ratio: f64, config: &EngineConfig) -> f64 {
    if workload_ratio <= 0.0 {
        return 0.0;
    }
    -config.workload_penalty_factor * workload_ratio.powi(3)
}

// ==============================================================================
// SCORING ENGINE
// ==============================================================================

pub struct ScoringInput<'a> {
    pub patient: &'a PatientFeatures,
    pub doctor: &'a DoctorFeatures,
    pub context: &'a ContextFeatures,
    pub interaction: Option<&'a InteractionSummary>,
}

/// Turns one candidate's features into a score breakdown. Higher composite is
/// strictly better; implementations must be deterministic.
pub trait CandidateScorer: Send + Sync {
    fn score(&self, input: &ScoringInput<'_>) -> ScoreBreakdown;
}

/// The fixed linear formula.
#[derive(Debug, Clone, Default)]
pub struct FormulaScorer {
    config: EngineConfig,
}

impl FormulaScorer {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl CandidateScorer for FormulaScorer {
    fn score(&self, input: &ScoringInput<'_>) -> ScoreBreakdown {
        let context = input.context;
        let weights = WeightProfile::for_type(context.appointment_type, &self.config);

        let experience = weights.experience
            * experience_score(input.doctor.years_of_experience, &self.config);
        let language_match = weights.language * language_match_score(input.patient, input.doctor);
        let specialty_match = weights.specialty
            * specialty_match_score(&input.patient.diagnosis_codes, input.doctor);
        let continuity = continuity_score(
            input.interaction,
            context.requested_datetime,
            context.appointment_type,
            &self.config,
        );
        let complexity_bonus = weights.complexity
            * complexity_bonus(input.patient.complexity, input.doctor, &self.config);
        let workload_penalty =
            weights.workload * workload_penalty(input.doctor.workload_ratio(), &self.config);
        let emergency_bonus = weights.emergency_bonus;

        let composite = experience
            + language_match
            + specialty_match
            + continuity
            + complexity_bonus
            + workload_penalty
            + emergency_bonus;

        ScoreBreakdown {
            experience,
            language_match,
            specialty_match,
            continuity,
            complexity_bonus,
            workload_penalty,
            emergency_bonus,
            composite,
        }
    }
}
