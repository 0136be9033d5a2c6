// libs/appointment-cell/src/services/schedule.rs
use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::debug;

use shared_config::Locale;

use crate::models::{
    closed_day_message, outside_hours_message, past_date_message, AppointmentError, ClinicSettings,
};

/// Reject a proposed time that is not in the future.
pub fn ensure_future(at: DateTime<Utc>, now: DateTime<Utc>, locale: Locale) -> Result<(), AppointmentError> {
    if at <= now {
        return Err(AppointmentError::PastDate(past_date_message(locale)));
    }
    Ok(())
}

/// Reject a time outside the clinic's opening hours for that weekday, both
/// taken in the clinic's local offset. Bounds are inclusive.
pub fn ensure_within_working_hours(
    clinic: &ClinicSettings,
    at: DateTime<Utc>,
    locale: Locale,
) -> Result<(), AppointmentError> {
    let local = at + Duration::minutes(clinic.utc_offset_minutes as i64);
    let weekday = local.weekday();

    let Some((start, end)) = clinic.working_hours.day(weekday).and_then(|day| day.open_hours()) else {
        debug!("Clinic {} closed on {}", clinic.id, weekday);
        return Err(AppointmentError::OutsideWorkingHours(closed_day_message(locale)));
    };

    let time = local.time();
    if time < start || time > end {
        debug!("{} outside {}-{} for clinic {}", time, start, end, clinic.id);
        return Err(AppointmentError::OutsideWorkingHours(outside_hours_message(start, end, locale)));
    }

    Ok(())
}
