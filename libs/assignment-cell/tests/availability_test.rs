use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use assignment_cell::models::{
    AppointmentStatus, BookedAppointment, ConsultationHours, DoctorRecord, ExclusionReason,
};
use assignment_cell::services::availability::{day_of_week, effective_daily_load};
use assignment_cell::services::AvailabilityValidator;

fn weekday_doctor() -> DoctorRecord {
    DoctorRecord {
        id: Uuid::new_v4(),
        department_id: Uuid::new_v4(),
        hospital_id: Uuid::new_v4(),
        gender: None,
        years_of_experience: 7,
        languages_spoken: vec![],
        expertise_codes: vec![],
        primary_expertise_codes: vec![],
        consultation_days: vec![1, 2, 3, 4, 5],
        consultation_hours: ConsultationHours {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        },
        max_daily_appointments: 3,
        current_daily_appointment_count: 0,
        can_practice: true,
        complex_case_rating: 0.0,
        continuity_of_care_rating: 0.0,
    }
}

// Wednesday
fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 12, hour, minute, 0).unwrap()
}

fn booking(doctor_id: Uuid, when: DateTime<Utc>, status: AppointmentStatus) -> BookedAppointment {
    BookedAppointment {
        id: Uuid::new_v4(),
        doctor_id,
        appointment_datetime: when,
        status,
    }
}

#[test]
fn test_day_of_week_starts_on_sunday() {
    assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()), 0);
    assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2025, 3, 12).unwrap()), 3);
    assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()), 6);
}

#[test]
fn test_open_slot_is_available() {
    let doctor = weekday_doctor();
    let validator = AvailabilityValidator::new(&[]);
    assert!(validator.is_available(&doctor, at(11, 30), false, None));
}

#[test]
fn test_consultation_hours_are_inclusive() {
    let doctor = weekday_doctor();
    let validator = AvailabilityValidator::new(&[]);

    assert!(validator.is_available(&doctor, at(9, 0), false, None));
    assert!(validator.is_available(&doctor, at(17, 0), false, None));
    assert_eq!(
        validator.check(&doctor, at(8, 59), false, None),
        Err(ExclusionReason::OutsideConsultationHours)
    );
    assert_eq!(
        validator.check(&doctor, at(17, 1), false, None),
        Err(ExclusionReason::OutsideConsultationHours)
    );
}

#[test]
fn test_non_consultation_day_is_rejected() {
    let doctor = weekday_doctor();
    let saturday = Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap();

    assert_eq!(
        AvailabilityValidator::new(&[]).check(&doctor, saturday, false, None),
        Err(ExclusionReason::NotConsultationDay)
    );
}

#[test]
fn test_practice_clearance_checked_first() {
    let mut doctor = weekday_doctor();
    doctor.can_practice = false;
    let saturday = Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap();

    assert_eq!(
        AvailabilityValidator::new(&[]).check(&doctor, saturday, false, None),
        Err(ExclusionReason::CannotPractice)
    );
}

#[test]
fn test_only_active_bookings_conflict() {
    let doctor = weekday_doctor();

    for status in [AppointmentStatus::Pending, AppointmentStatus::Confirmed] {
        let booked = vec![booking(doctor.id, at(10, 0), status)];
        assert_eq!(
            AvailabilityValidator::new(&booked).check(&doctor, at(10, 0), false, None),
            Err(ExclusionReason::SlotConflict)
        );
    }

    for status in [
        AppointmentStatus::Cancelled,
        AppointmentStatus::Completed,
        AppointmentStatus::NoShow,
    ] {
        let booked = vec![booking(doctor.id, at(10, 0), status)];
        assert!(AvailabilityValidator::new(&booked).is_available(&doctor, at(10, 0), false, None));
    }
}

#[test]
fn test_other_doctors_bookings_do_not_conflict() {
    let doctor = weekday_doctor();
    let booked = vec![booking(Uuid::new_v4(), at(10, 0), AppointmentStatus::Confirmed)];
    assert!(AvailabilityValidator::new(&booked).is_available(&doctor, at(10, 0), false, None));
}

#[test]
fn test_rescheduled_appointment_does_not_conflict_with_itself() {
    let doctor = weekday_doctor();
    let existing = booking(doctor.id, at(10, 0), AppointmentStatus::Confirmed);
    let existing_id = existing.id;
    let booked = vec![existing];
    let validator = AvailabilityValidator::new(&booked);

    assert!(!validator.is_available(&doctor, at(10, 0), false, None));
    assert!(validator.is_available(&doctor, at(10, 0), false, Some(existing_id)));
}

#[test]
fn test_daily_cap_from_counter() {
    let mut doctor = weekday_doctor();
    doctor.current_daily_appointment_count = 3;

    assert_eq!(
        AvailabilityValidator::new(&[]).check(&doctor, at(10, 0), false, None),
        Err(ExclusionReason::DailyCapReached)
    );

    doctor.current_daily_appointment_count = 2;
    assert!(AvailabilityValidator::new(&[]).is_available(&doctor, at(10, 0), false, None));
}

#[test]
fn test_daily_cap_from_snapshot_bookings() {
    let doctor = weekday_doctor();
    let mut booked: Vec<BookedAppointment> = (0..3)
        .map(|i| booking(doctor.id, at(13, 0) + Duration::hours(i), AppointmentStatus::Pending))
        .collect();
    // Bookings on another day never count toward today's load
    booked.push(booking(doctor.id, at(10, 0) + Duration::days(1), AppointmentStatus::Pending));

    let date = at(10, 0).date_naive();
    assert_eq!(effective_daily_load(&doctor, &booked, date, None), 3);
    assert_eq!(
        AvailabilityValidator::new(&booked).check(&doctor, at(10, 0), false, None),
        Err(ExclusionReason::DailyCapReached)
    );

    let rescheduled = Some(booked[0].id);
    assert_eq!(effective_daily_load(&doctor, &booked, date, rescheduled), 2);
    assert!(AvailabilityValidator::new(&booked).is_available(&doctor, at(10, 0), false, rescheduled));
}

#[test]
fn test_emergency_skips_every_rule() {
    let mut doctor = weekday_doctor();
    doctor.consultation_days.clear();
    doctor.current_daily_appointment_count = 99;
    let booked = vec![booking(doctor.id, at(22, 0), AppointmentStatus::Confirmed)];

    assert!(AvailabilityValidator::new(&booked).is_available(&doctor, at(22, 0), true, None));
}
