use chrono::{Datelike, Days, NaiveDate, NaiveTime};

/// Finds the first date expression in free text: `hoje`, `amanhã`/`amanha`, `DD/MM`
/// (current year) or `DD/MM/YYYY`, resolved against the tenant-local `today`.
/// "dia 15/03" and "amanhã de manhã" both resolve.
pub fn parse_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lowered = text.to_lowercase();
    tokens(&lowered).into_iter().find_map(|token| match token {
        "hoje" => Some(today),
        "amanhã" | "amanha" => today.checked_add_days(Days::new(1)),
        _ => day_month(token, today.year()),
    })
}

/// Finds the first `HH:MM` or `H:MM` in free text ("às 10:00", "10:30h") and returns the
/// canonical zero-padded form.
pub fn parse_time(text: &str) -> Option<String> {
    tokens(text).into_iter().find_map(|token| {
        let (hour, minute) = token.strip_suffix('h').unwrap_or(token).split_once(':')?;
        if !is_digits(hour, 1..=2) || !is_digits(minute, 2..=2) {
            return None;
        }
        let time = NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)?;
        Some(time.format("%H:%M").to_string())
    })
}

/// Words, numbers and `/`/`:` joined runs, in order; other punctuation separates.
fn tokens(text: &str) -> Vec<&str> {
    text.split(|ch: char| !(ch.is_alphanumeric() || ch == '/' || ch == ':'))
        .filter(|token| !token.is_empty())
        .collect()
}

fn day_month(token: &str, current_year: i32) -> Option<NaiveDate> {
    let parts = token.split('/').collect::<Vec<_>>();
    let (day, month, year) = match parts.as_slice() {
        [day, month] => (*day, *month, None),
        [day, month, year] => (*day, *month, Some(*year)),
        _ => return None,
    };
    if !is_digits(day, 1..=2) || !is_digits(month, 1..=2) {
        return None;
    }
    let year = match year {
        Some(year) if is_digits(year, 4..=4) => year.parse().ok()?,
        Some(_) => return None,
        None => current_year,
    };
    NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)
}

fn is_digits(value: &str, len: std::ops::RangeInclusive<usize>) -> bool {
    len.contains(&value.len()) && value.bytes().all(|byte| byte.is_ascii_digit())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}
