use std::collections::BTreeMap;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SLOT_DURATION_MINUTES: u32 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<Weekday> for DayOfWeek {
    fn from(value: Weekday) -> Self {
        match value {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }
}

/// A working-hours window expressed as `HH:MM` wall-clock strings in tenant-local time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: String,
    pub end: String,
}

impl TimeInterval {
    pub fn new(start: &str, end: &str) -> Self {
        Self { start: start.to_string(), end: end.to_string() }
    }

    /// Start and end as minutes since midnight; `None` for malformed or inverted bounds.
    pub fn bounds(&self) -> Option<(u32, u32)> {
        let start = minutes_of_day(&self.start)?;
        let end = minutes_of_day(&self.end)?;
        (start < end).then_some((start, end))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub enabled: bool,
    #[serde(default)]
    pub intervals: Vec<TimeInterval>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_slot_duration")]
    pub slot_duration_minutes: u32,
    #[serde(default)]
    pub days: BTreeMap<DayOfWeek, DaySchedule>,
}

fn default_slot_duration() -> u32 {
    DEFAULT_SLOT_DURATION_MINUTES
}

impl Default for ScheduleConfig {
    /// Monday to Friday, 09:00-18:00, one-hour slots.
    fn default() -> Self {
        let weekday =
            DaySchedule { enabled: true, intervals: vec![TimeInterval::new("09:00", "18:00")] };
        let days = [
            DayOfWeek::Monday,
            DayOfWeek::Tuesday,
            DayOfWeek::Wednesday,
            DayOfWeek::Thursday,
            DayOfWeek::Friday,
        ]
        .into_iter()
        .map(|day| (day, weekday.clone()))
        .collect();

        Self { slot_duration_minutes: DEFAULT_SLOT_DURATION_MINUTES, days }
    }
}

impl ScheduleConfig {
    pub fn day(&self, day: DayOfWeek) -> Option<&DaySchedule> {
        self.days.get(&day)
    }

    pub fn is_open_at(&self, day: DayOfWeek, time: NaiveTime) -> bool {
        let minute = time.hour() * 60 + time.minute();
        match self.day(day) {
            Some(schedule) if schedule.enabled => schedule
                .intervals
                .iter()
                .filter_map(TimeInterval::bounds)
                .any(|(start, end)| minute >= start && minute < end),
            _ => false,
        }
    }
}

pub fn minutes_of_day(value: &str) -> Option<u32> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()?;
    Some(time.hour() * 60 + time.minute())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::{minutes_of_day, DayOfWeek, ScheduleConfig, TimeInterval};

    #[test]
    fn default_template_is_weekday_business_hours() {
        let config = ScheduleConfig::default();

        assert_eq!(config.slot_duration_minutes, 60);
        assert!(config.day(DayOfWeek::Friday).map(|day| day.enabled).unwrap_or(false));
        assert!(config.day(DayOfWeek::Saturday).is_none());
    }

    #[test]
    fn interval_bounds_reject_inverted_windows() {
        assert_eq!(TimeInterval::new("09:00", "12:30").bounds(), Some((540, 750)));
        assert_eq!(TimeInterval::new("12:00", "09:00").bounds(), None);
        assert_eq!(TimeInterval::new("9h", "10:00").bounds(), None);
        assert_eq!(minutes_of_day("23:59"), Some(1439));
    }

    #[test]
    fn open_hours_use_half_open_windows() {
        let config = ScheduleConfig::default();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).expect("time");
        let six_pm = NaiveTime::from_hms_opt(18, 0, 0).expect("time");

        assert!(config.is_open_at(DayOfWeek::Monday, nine));
        assert!(!config.is_open_at(DayOfWeek::Monday, six_pm));
        assert!(!config.is_open_at(DayOfWeek::Sunday, nine));
    }
}
