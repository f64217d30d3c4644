// libs/assignment-cell/src/services/availability.rs
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::models::{BookedAppointment, DoctorRecord, ExclusionReason};

/// Checks a doctor's static schedule and the live booking snapshot against a
/// requested datetime. Never errors: an unavailable doctor is simply excluded.
pub struct AvailabilityValidator<'a> {
    booked: &'a [BookedAppointment],
}

impl<'a> AvailabilityValidator<'a> {
    pub fn new(booked: &'a [BookedAppointment]) -> Self {
        Self { booked }
    }

    pub fn is_available(
        &self,
        doctor: &DoctorRecord,
        requested: DateTime<Utc>,
        is_emergency: bool,
        current_appointment_id: Option<Uuid>,
    ) -> bool {
        self.check(doctor, requested, is_emergency, current_appointment_id).is_ok()
    }

    /// Same rules as `is_available`, reporting the first rule that failed.
    pub fn check(
        &self,
        doctor: &DoctorRecord,
        requested: DateTime<Utc>,
        is_emergency: bool,
        current_appointment_id: Option<Uuid>,
    ) -> Result<(), ExclusionReason> {
        if is_emergency {
            return Ok(());
        }

        if !doctor.can_practice {
            return Err(ExclusionReason::CannotPractice);
        }

        let date = requested.date_naive();
        if !doctor.consultation_days.contains(&day_of_week(date)) {
            debug!("Doctor {} does not consult on {}", doctor.id, date.weekday());
            return Err(ExclusionReason::NotConsultationDay);
        }

        if !doctor.consultation_hours.contains(requested.time()) {
            debug!(
                "Requested time {} outside doctor {} hours {}-{}",
                requested.time(),
                doctor.id,
                doctor.consultation_hours.start,
                doctor.consultation_hours.end
            );
            return Err(ExclusionReason::OutsideConsultationHours);
        }

        let has_conflict = active_bookings(self.booked, doctor.id, current_appointment_id)
            .any(|b| b.appointment_datetime == requested);
        if has_conflict {
            debug!("Doctor {} already booked at {}", doctor.id, requested);
            return Err(ExclusionReason::SlotConflict);
        }

        let load = effective_daily_load(doctor, self.booked, date, current_appointment_id);
        if load >= doctor.max_daily_appointments {
            debug!(
                "Doctor {} at daily cap ({}/{})",
                doctor.id, load, doctor.max_daily_appointments
            );
            return Err(ExclusionReason::DailyCapReached);
        }

        Ok(())
    }
}

/// 0 = Sunday, matching `DoctorRecord::consultation_days`.
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// The doctor's load for `date`: the roster counter or the active bookings
/// visible in the snapshot, whichever is higher.
pub fn effective_daily_load(
    doctor: &DoctorRecord,
    booked: &[BookedAppointment],
    date: NaiveDate,
    current_appointment_id: Option<Uuid>,
) -> u32 {
    let booked_on_date = active_bookings(booked, doctor.id, current_appointment_id)
        .filter(|b| b.appointment_datetime.date_naive() == date)
        .count() as u32;

    doctor.current_daily_appointment_count.max(booked_on_date)
}

fn active_bookings<'b>(
    booked: &'b [BookedAppointment],
    doctor_id: Uuid,
    current_appointment_id: Option<Uuid>,
) -> impl Iterator<Item = &'b BookedAppointment> {
    booked.iter().filter(move |b| {
        b.doctor_id == doctor_id
            && b.status.is_active()
            && Some(b.id) != current_appointment_id
    })
}
