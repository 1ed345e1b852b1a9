use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::domain::appointment::Appointment;
use crate::domain::schedule::{ScheduleConfig, TimeInterval};

/// A bookable window on one date, tenant-local.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Slot {
    pub fn label(&self) -> String {
        self.start.format("%H:%M").to_string()
    }
}

/// Every full-length slot the working-hours table offers on `date`, before
/// subtracting bookings. Partial trailing steps are dropped.
pub fn candidate_slots(config: &ScheduleConfig, date: NaiveDate) -> Vec<Slot> {
    let duration = config.slot_duration_minutes;
    if duration == 0 {
        return Vec::new();
    }

    let day = match config.day(date.weekday().into()) {
        Some(day) if day.enabled => day,
        _ => return Vec::new(),
    };

    let mut slots = Vec::new();
    for (start, end) in day.intervals.iter().filter_map(TimeInterval::bounds) {
        let mut cursor = start;
        while cursor + duration <= end {
            if let Some(slot) = slot_at(date, cursor, duration) {
                slots.push(slot);
            }
            cursor += duration;
        }
    }

    slots.sort();
    slots.dedup();
    slots
}

/// Candidate slots minus those overlapping a non-cancelled appointment and those not
/// strictly after `now_local`. Chronological.
pub fn available_slots(
    config: &ScheduleConfig,
    date: NaiveDate,
    appointments: &[Appointment],
    now_local: NaiveDateTime,
) -> Vec<Slot> {
    candidate_slots(config, date)
        .into_iter()
        .filter(|slot| slot.start > now_local)
        .filter(|slot| !appointments.iter().any(|existing| existing.overlaps(slot.start, slot.end)))
        .collect()
}

pub fn labels(slots: &[Slot]) -> Vec<String> {
    slots.iter().map(Slot::label).collect()
}

fn slot_at(date: NaiveDate, start_minutes: u32, duration: u32) -> Option<Slot> {
    let time = NaiveTime::from_hms_opt(start_minutes / 60, start_minutes % 60, 0)?;
    let start = date.and_time(time);
    Some(Slot { start, end: start + Duration::minutes(i64::from(duration)) })
}
