// libs/assignment-cell/src/services/optimizer.rs
use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use crate::models::{
    AppointmentRequest, AssignmentError, AssignmentOutcome, AssignmentResult, AssignmentSnapshot,
    CandidateEvaluation, DoctorRecord, EngineConfig, Exclusion, ExclusionReason, ScoreBreakdown,
};
use crate::services::availability::AvailabilityValidator;
use crate::services::features::{
    ContextFeatureExtractor, ContextFeatures, DoctorFeatureExtractor, DoctorFeatures,
    FeatureExtractor, PatientFeatureExtractor, PatientFeatures,
};
use crate::services::history::{HistoryIndex, InteractionSummary};
use crate::services::scoring::{CandidateScorer, FormulaScorer, ScoringInput};

/// Picks exactly one doctor for a request, or reports that none is eligible.
/// Pure over the snapshot it is given; nothing is mutated or persisted.
pub struct AssignmentOptimizer<S = FormulaScorer> {
    scorer: S,
    config: EngineConfig,
}

impl AssignmentOptimizer<FormulaScorer> {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            scorer: FormulaScorer::new(config.clone()),
            config,
        }
    }
}

impl Default for AssignmentOptimizer<FormulaScorer> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

struct ScoredCandidate {
    features: DoctorFeatures,
    interaction: Option<InteractionSummary>,
    breakdown: ScoreBreakdown,
}

impl<S: CandidateScorer> AssignmentOptimizer<S> {
    pub fn with_scorer(scorer: S, config: EngineConfig) -> Self {
        Self { scorer, config }
    }

    #[instrument(
        skip(self, snapshot),
        fields(
            patient_id = %snapshot.request.patient_ref,
            department_id = %snapshot.request.department_id,
            appointment_type = %snapshot.request.appointment_type
        )
    )]
    pub fn assign(&self, snapshot: &AssignmentSnapshot) -> Result<AssignmentOutcome, AssignmentError> {
        validate_snapshot(snapshot)?;

        let request = &snapshot.request;
        let requested_date = request.requested_datetime.date_naive();

        let context = ContextFeatureExtractor.extract(request);
        let patient = PatientFeatureExtractor::new(requested_date).extract(&snapshot.patient);
        let history = HistoryIndex::build(snapshot.patient.id, &snapshot.history);
        let validator = AvailabilityValidator::new(&snapshot.booked_appointments);
        let doctor_extractor = DoctorFeatureExtractor::new(
            &snapshot.booked_appointments,
            requested_date,
            request.current_appointment_id,
        );

        let mut seen = HashSet::new();
        let mut excluded = Vec::new();
        let mut scored = Vec::new();

        for doctor in &snapshot.candidates {
            if !seen.insert(doctor.id) {
                warn!("Doctor {} listed twice in candidate pool, ignoring duplicate", doctor.id);
                continue;
            }

            if let Err(reason) = eligibility(doctor, request, &validator) {
                debug!("Excluding doctor {}: {}", doctor.id, reason);
                excluded.push(Exclusion { doctor_id: doctor.id, reason });
                continue;
            }

            let features = doctor_extractor.extract(doctor);
            let interaction = history.summary(doctor.id, request.department_id);
            let breakdown = self.scorer.score(&ScoringInput {
                patient: &patient,
                doctor: &features,
                context: &context,
                interaction: interaction.as_ref(),
            });

            debug!(
                "Doctor {} scored {:.4} (exp {:.3}, lang {:.1}, specialty {:.2}, cont {:.3}, cplx {:.2}, load {:.3})",
                doctor.id,
                breakdown.composite,
                breakdown.experience,
                breakdown.language_match,
                breakdown.specialty_match,
                breakdown.continuity,
                breakdown.complexity_bonus,
                breakdown.workload_penalty
            );

            scored.push(ScoredCandidate { features, interaction, breakdown });
        }

        if scored.is_empty() {
            info!(
                "No eligible doctor for patient {} in department {} ({} candidates, {} excluded)",
                request.patient_ref,
                request.department_id,
                seen.len(),
                excluded.len()
            );
            return Ok(AssignmentOutcome::NoEligibleDoctor {
                department_id: request.department_id,
                candidates_considered: seen.len(),
                excluded,
            });
        }

        scored.sort_by(rank_order);
        let (winner_idx, tie_broken) = select_winner(&scored, self.config.tie_break_delta);
        let winner = &scored[winner_idx];

        let match_reasons = generate_match_reasons(winner, &patient, &context, tie_broken);

        info!(
            "Assigned doctor {} to patient {} with score {:.4} ({} scored, {} excluded)",
            winner.features.doctor_id,
            request.patient_ref,
            winner.breakdown.composite,
            scored.len(),
            excluded.len()
        );

        Ok(AssignmentOutcome::Assigned(AssignmentResult {
            doctor_id: winner.features.doctor_id,
            score_breakdown: winner.breakdown,
            match_reasons,
            evaluated: scored
                .iter()
                .map(|c| CandidateEvaluation {
                    doctor_id: c.features.doctor_id,
                    years_of_experience: c.features.years_of_experience,
                    score_breakdown: c.breakdown,
                })
                .collect(),
            excluded,
        }))
    }
}

fn validate_snapshot(snapshot: &AssignmentSnapshot) -> Result<(), AssignmentError> {
    let request = &snapshot.request;

    if request.department_id.is_nil() {
        return Err(AssignmentError::InvalidRequest("department_id is required".to_string()));
    }
    if request.hospital_id.is_nil() {
        return Err(AssignmentError::InvalidRequest("hospital_id is required".to_string()));
    }
    if request.patient_ref.is_nil() {
        return Err(AssignmentError::InvalidRequest("patient_ref is required".to_string()));
    }
    if snapshot.patient.id != request.patient_ref {
        return Err(AssignmentError::InvalidRequest(format!(
            "patient snapshot {} does not match patient_ref {}",
            snapshot.patient.id, request.patient_ref
        )));
    }

    Ok(())
}

/// Eligible iff on the requested roster, cleared to practice, and either an
/// emergency or available at the requested time.
fn eligibility(
    doctor: &DoctorRecord,
    request: &AppointmentRequest,
    validator: &AvailabilityValidator<'_>,
) -> Result<(), ExclusionReason> {
    if doctor.department_id != request.department_id || doctor.hospital_id != request.hospital_id {
        return Err(ExclusionReason::OutsideDepartment);
    }
    if !doctor.can_practice {
        return Err(ExclusionReason::CannotPractice);
    }

    validator.check(
        doctor,
        request.requested_datetime,
        request.appointment_type.is_emergency(),
        request.current_appointment_id,
    )
}

/// Composite descending, then doctor id ascending so equal scores have a
/// stable order independent of input order.
fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.breakdown
        .composite
        .total_cmp(&a.breakdown.composite)
        .then_with(|| a.features.doctor_id.cmp(&b.features.doctor_id))
}

/// Among candidates within `delta` of the top score, the most experienced
/// wins. Returns the winner's index and whether experience decided it.
fn select_winner(ranked: &[ScoredCandidate], delta: f64) -> (usize, bool) {
    let top = ranked[0].breakdown.composite;
    let mut winner = 0;

    for (idx, candidate) in ranked.iter().enumerate().skip(1) {
        if top - candidate.breakdown.composite >= delta {
            break;
        }
        if candidate.features.years_of_experience > ranked[winner].features.years_of_experience {
            winner = idx;
        }
    }

    (winner, winner != 0)
}

fn generate_match_reasons(
    winner: &ScoredCandidate,
    patient: &PatientFeatures,
    context: &ContextFeatures,
    tie_broken: bool,
) -> Vec<String> {
    let mut reasons = Vec::new();
    let breakdown = &winner.breakdown;
    let doctor = &winner.features;

    if context.is_emergency {
        reasons.push("Emergency request - schedule rules bypassed".to_string());
    }

    if let Some(interaction) = winner.interaction.as_ref().filter(|_| breakdown.continuity > 0.0) {
        reasons.push(format!(
            "Previous patient - {} completed visit(s) with this doctor",
            interaction.appointment_count
        ));
    }

    match &patient.preferred_language {
        Some(lang) if doctor.languages.contains(lang) => {
            reasons.push(format!("Speaks the patient's preferred language ({})", lang));
        }
        _ if breakdown.language_match > 0.0 => {
            reasons.push("Shares a secondary language with the patient".to_string());
        }
        _ => {}
    }

    if breakdown.specialty_match >= 10.0 {
        reasons.push("Direct expertise in all of the patient's diagnoses".to_string());
    } else if breakdown.specialty_match > 0.0 {
        reasons.push("Expertise matching the patient's diagnoses".to_string());
    }

    if breakdown.complexity_bonus > 0.0 {
        reasons.push("Experienced with high-complexity cases".to_string());
    }

    if let (Some(preferred), Some(gender)) = (&patient.gender_preference, &doctor.gender) {
        if preferred == gender {
            reasons.push("Matches the patient's doctor gender preference".to_string());
        }
    }

    if doctor.years_of_experience >= 5 {
        reasons.push(format!("{} years of experience", doctor.years_of_experience));
    }

    if tie_broken {
        reasons.push("Chosen over a near-identical score by greater experience".to_string());
    }

    if reasons.is_empty() {
        reasons.push("Best available doctor in the department".to_string());
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Utc};
    use std::collections::HashMap;
    use uuid::Uuid;

    use crate::models::{
        AppointmentPriority, AppointmentType, ConsultationHours, PatientSnapshot,
    };

    /// Returns a fixed composite per doctor so ranking rules can be tested in isolation.
    struct FixedScorer(HashMap<Uuid, f64>);

    impl CandidateScorer for FixedScorer {
        fn score(&self, input: &ScoringInput<'_>) -> ScoreBreakdown {
            ScoreBreakdown {
                composite: self.0[&input.doctor.doctor_id],
                ..ScoreBreakdown::default()
            }
        }
    }

    fn doctor(department_id: Uuid, hospital_id: Uuid, years: u32) -> DoctorRecord {
        DoctorRecord {
            id: Uuid::new_v4(),
            department_id,
            hospital_id,
            gender: None,
            years_of_experience: years,
            languages_spoken: vec![],
            expertise_codes: vec![],
            primary_expertise_codes: vec![],
            consultation_days: (0..7).collect(),
            consultation_hours: ConsultationHours {
                start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            },
            max_daily_appointments: 10,
            current_daily_appointment_count: 0,
            can_practice: true,
            complex_case_rating: 0.0,
            continuity_of_care_rating: 0.0,
        }
    }

    fn snapshot(candidates: Vec<DoctorRecord>, department_id: Uuid, hospital_id: Uuid) -> AssignmentSnapshot {
        let patient_id = Uuid::new_v4();
        AssignmentSnapshot {
            request: AppointmentRequest {
                patient_ref: patient_id,
                department_id,
                hospital_id,
                requested_datetime: Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap(),
                appointment_type: AppointmentType::Regular,
                priority: AppointmentPriority::Normal,
                current_appointment_id: None,
            },
            patient: PatientSnapshot::bare(patient_id),
            candidates,
            booked_appointments: vec![],
            history: vec![],
        }
    }

    #[test]
    fn test_near_tie_goes_to_more_experienced() {
        let (dept, hosp) = (Uuid::new_v4(), Uuid::new_v4());
        let junior = doctor(dept, hosp, 4);
        let senior = doctor(dept, hosp, 20);
        let scores = HashMap::from([(junior.id, 10.005), (senior.id, 10.0)]);

        let optimizer = AssignmentOptimizer::with_scorer(FixedScorer(scores), EngineConfig::default());
        let outcome = optimizer.assign(&snapshot(vec![junior, senior.clone()], dept, hosp)).unwrap();

        let result = outcome.into_result().unwrap();
        assert_eq!(result.doctor_id, senior.id);
        assert!(result.match_reasons.iter().any(|r| r.contains("greater experience")));
    }

    #[test]
    fn test_clear_winner_ignores_experience() {
        let (dept, hosp) = (Uuid::new_v4(), Uuid::new_v4());
        let junior = doctor(dept, hosp, 4);
        let senior = doctor(dept, hosp, 20);
        let scores = HashMap::from([(junior.id, 10.02), (senior.id, 10.0)]);

        let optimizer = AssignmentOptimizer::with_scorer(FixedScorer(scores), EngineConfig::default());
        let outcome = optimizer.assign(&snapshot(vec![senior, junior.clone()], dept, hosp)).unwrap();

        assert_eq!(outcome.doctor_id(), Some(junior.id));
    }

    #[test]
    fn test_exact_tie_with_equal_experience_is_order_independent() {
        let (dept, hosp) = (Uuid::new_v4(), Uuid::new_v4());
        let a = doctor(dept, hosp, 10);
        let b = doctor(dept, hosp, 10);
        let expected = a.id.min(b.id);
        let scores = HashMap::from([(a.id, 5.0), (b.id, 5.0)]);
        let optimizer = AssignmentOptimizer::with_scorer(FixedScorer(scores), EngineConfig::default());

        let forward = optimizer.assign(&snapshot(vec![a.clone(), b.clone()], dept, hosp)).unwrap();
        let backward = optimizer.assign(&snapshot(vec![b, a], dept, hosp)).unwrap();

        assert_eq!(forward.doctor_id(), Some(expected));
        assert_eq!(backward.doctor_id(), Some(expected));
    }

    #[test]
    fn test_request_validation_fails_fast() {
        let dept = Uuid::new_v4();
        let mut snap = snapshot(vec![], dept, Uuid::nil());
        let err = AssignmentOptimizer::default().assign(&snap).unwrap_err();
        assert!(matches!(err, AssignmentError::InvalidRequest(msg) if msg.contains("hospital_id")));

        snap.request.hospital_id = Uuid::new_v4();
        snap.patient.id = Uuid::new_v4();
        let err = AssignmentOptimizer::default().assign(&snap).unwrap_err();
        assert!(matches!(err, AssignmentError::InvalidRequest(_)));
    }

    #[test]
    fn test_other_department_and_duplicates_are_not_scored() {
        let (dept, hosp) = (Uuid::new_v4(), Uuid::new_v4());
        let stranger = doctor(Uuid::new_v4(), hosp, 30);
        let local = doctor(dept, hosp, 2);

        let outcome = AssignmentOptimizer::default()
            .assign(&snapshot(vec![stranger.clone(), local.clone(), local.clone()], dept, hosp))
            .unwrap();

        let result = outcome.into_result().unwrap();
        assert_eq!(result.doctor_id, local.id);
        assert_eq!(result.evaluated.len(), 1);
        assert_eq!(
            result.excluded,
            vec![Exclusion { doctor_id: stranger.id, reason: ExclusionReason::OutsideDepartment }]
        );
    }
}
