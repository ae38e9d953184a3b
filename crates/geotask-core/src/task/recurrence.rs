use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// How often a task comes back after completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "every", rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    /// Weekdays 0=Sun ... 6=Sat
    Weekly { days: Vec<u8> },
    /// Day of month; months shorter than `day` use their last day
    Monthly { day: u32 },
}

impl Recurrence {
    /// First matching date strictly after `from`.
    pub fn next_after(&self, from: NaiveDate) -> Option<NaiveDate> {
        match self {
            Recurrence::Daily => from.succ_opt(),
            Recurrence::Weekly { days } => {
                if days.iter().all(|d| *d > 6) {
                    return None;
                }
                (1..=7)
                    .map(|offset| from + Duration::days(offset))
                    .find(|date| days.contains(&(date.weekday().num_days_from_sunday() as u8)))
            }
            Recurrence::Monthly { day } => {
                if *day == 0 || *day > 31 {
                    return None;
                }
                let this_month = clamp_day(from.year(), from.month(), *day)?;
                if this_month > from {
                    return Some(this_month);
                }
                let (year, month) = if from.month() == 12 {
                    (from.year() + 1, 1)
                } else {
                    (from.year(), from.month() + 1)
                };
                clamp_day(year, month, *day)
            }
        }
    }
}

fn clamp_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    (1..=day)
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekly_picks_next_listed_weekday() {
        // 2026-03-02 is a Monday
        let rule = Recurrence::Weekly { days: vec![1, 4] };
        assert_eq!(rule.next_after(date(2026, 3, 2)), Some(date(2026, 3, 5)));
        assert_eq!(rule.next_after(date(2026, 3, 5)), Some(date(2026, 3, 9)));
    }

    #[test]
    fn weekly_without_valid_days_never_recurs() {
        assert_eq!(Recurrence::Weekly { days: vec![] }.next_after(date(2026, 3, 2)), None);
    }

    #[test]
    fn monthly_clamps_short_months() {
        let rule = Recurrence::Monthly { day: 31 };
        assert_eq!(rule.next_after(date(2026, 1, 31)), Some(date(2026, 2, 28)));
        assert_eq!(rule.next_after(date(2026, 2, 10)), Some(date(2026, 2, 28)));
    }
}
