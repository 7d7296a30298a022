//! `weekdayRange`, `dateRange` and `timeRange`.
//!
//! Each takes an optional trailing `"GMT"` to evaluate against UTC instead of
//! local time. A range whose start is after its end wraps around (overnight,
//! over the weekend, over new year).

use chrono::{Datelike, Local, NaiveDateTime, Timelike, Utc};

use crate::domain::HostValue;

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// The current instant in both zones.
#[derive(Debug, Clone, Copy)]
pub struct Moment {
    pub local: NaiveDateTime,
    pub utc: NaiveDateTime,
}

impl Moment {
    pub fn now() -> Self {
        Self {
            local: Local::now().naive_local(),
            utc: Utc::now().naive_utc(),
        }
    }

    fn pick(&self, gmt: bool) -> NaiveDateTime {
        if gmt {
            self.utc
        } else {
            self.local
        }
    }
}

fn is_gmt(value: Option<&HostValue>) -> bool {
    value.and_then(HostValue::as_str) == Some("GMT")
}

/// Splits off a trailing `"GMT"`.
fn strip_gmt(args: &[HostValue]) -> (&[HostValue], bool) {
    match args.split_last() {
        Some((last, rest)) if is_gmt(Some(last)) => (rest, true),
        _ => (args, false),
    }
}

fn in_range<T: PartialOrd>(start: T, value: T, end: T) -> bool {
    if start <= end {
        start <= value && value <= end
    } else {
        value >= start || value <= end
    }
}

fn weekday_index(value: Option<&HostValue>) -> Option<u32> {
    let name = value?.as_str()?;
    WEEKDAYS.iter().position(|day| *day == name).map(|i| i as u32)
}

pub fn weekday_range(args: &[HostValue], now: &Moment) -> bool {
    // GMT may stand in for the second weekday.
    let gmt = is_gmt(args.get(2)) || is_gmt(args.get(1));
    let Some(start) = weekday_index(args.first()) else {
        return false;
    };
    let today = now.pick(gmt).weekday().num_days_from_sunday();

    match weekday_index(args.get(1)) {
        Some(end) => in_range(start, today, end),
        None => today == start,
    }
}

fn seconds(hour: i64, minute: i64, second: i64) -> i64 {
    hour * 3600 + minute * 60 + second
}

fn int_arg(value: &HostValue) -> Option<i64> {
    let n = value.to_number();
    if n.is_nan() {
        None
    } else {
        Some(n.trunc() as i64)
    }
}

pub fn time_range(args: &[HostValue], now: &Moment) -> bool {
    let (args, gmt) = strip_gmt(args);
    let Some(values) = args.iter().map(int_arg).collect::<Option<Vec<_>>>() else {
        return false;
    };
    let current = now.pick(gmt);
    let hour = i64::from(current.hour());
    let elapsed = seconds(hour, i64::from(current.minute()), i64::from(current.second()));

    match values.as_slice() {
        [h] => hour == *h,
        [h1, h2] => {
            if h1 <= h2 {
                *h1 <= hour && hour < *h2
            } else {
                hour >= *h1 || hour < *h2
            }
        }
        [h1, m1, h2, m2] => in_range(seconds(*h1, *m1, 0), elapsed, seconds(*h2, *m2, 59)),
        [h1, m1, s1, h2, m2, s2] => in_range(seconds(*h1, *m1, *s1), elapsed, seconds(*h2, *m2, *s2)),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatePart {
    Day(i64),
    Month(i64),
    Year(i64),
}

impl DatePart {
    fn parse(value: &HostValue) -> Option<Self> {
        if let Some(name) = value.as_str() {
            if let Some(month) = MONTHS.iter().position(|m| *m == name) {
                return Some(DatePart::Month(month as i64));
            }
        }
        match int_arg(value)? {
            day @ 1..=31 => Some(DatePart::Day(day)),
            year if year > 31 => Some(DatePart::Year(year)),
            _ => None,
        }
    }

    /// Ordering weight, most significant first.
    fn rank(&self) -> u8 {
        match self {
            DatePart::Year(_) => 0,
            DatePart::Month(_) => 1,
            DatePart::Day(_) => 2,
        }
    }

    fn value(&self) -> i64 {
        match self {
            DatePart::Day(v) | DatePart::Month(v) | DatePart::Year(v) => *v,
        }
    }

    fn same_kind(&self, other: &DatePart) -> bool {
        self.rank() == other.rank()
    }

    fn current(&self, date: &NaiveDateTime) -> i64 {
        match self {
            DatePart::Day(_) => i64::from(date.day()),
            DatePart::Month(_) => i64::from(date.month0()),
            DatePart::Year(_) => i64::from(date.year()),
        }
    }
}

/// Comparable key, components ordered year, month, day.
fn key(parts: &[DatePart], date: Option<&NaiveDateTime>) -> Vec<i64> {
    let mut sorted = parts.to_vec();
    sorted.sort_by_key(DatePart::rank);
    sorted
        .iter()
        .map(|part| match date {
            Some(date) => part.current(date),
            None => part.value(),
        })
        .collect()
}

pub fn date_range(args: &[HostValue], now: &Moment) -> bool {
    let (args, gmt) = strip_gmt(args);
    let Some(parts) = args.iter().map(DatePart::parse).collect::<Option<Vec<_>>>() else {
        return false;
    };
    let today = now.pick(gmt);

    if parts.len() == 1 {
        return parts[0].current(&today) == parts[0].value();
    }
    if !matches!(parts.len(), 2 | 4 | 6) {
        return false;
    }

    let (start, end) = parts.split_at(parts.len() / 2);
    if !start.iter().zip(end).all(|(a, b)| a.same_kind(b)) {
        return false;
    }

    let start_key = key(start, None);
    let end_key = key(end, None);
    let today_key = key(start, Some(&today));

    // Ranges that name a year never wrap.
    if start_key > end_key && start.iter().any(|p| matches!(p, DatePart::Year(_))) {
        return false;
    }
    in_range(start_key, today_key, end_key)
}
