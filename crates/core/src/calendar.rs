//! Week arithmetic for the calendar view.
//!
//! The home view shows seven days at a time. Before a day is picked the strip
//! is the Sunday-to-Saturday week containing today; once a day is picked the
//! strip re-centres so the picked day sits in the middle slot.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone};

use crate::types::ClassRecord;

/// Number of days shown in the calendar strip.
pub const DAYS_IN_WEEK: usize = 7;

/// Index of the selected day in a centred week.
pub const CENTER_INDEX: usize = 3;

/// Seven consecutive days.
pub type Week = [NaiveDate; DAYS_IN_WEEK];

/// The Sunday-start week containing `day`.
#[must_use]
pub fn week_containing(day: NaiveDate) -> Week {
    let offset = u64::from(day.weekday().num_days_from_sunday());
    seven_days_from(day.checked_sub_days(Days::new(offset)).unwrap_or(day))
}

/// The seven days with `day` in the middle (three before, three after).
#[must_use]
pub fn week_centered_on(day: NaiveDate) -> Week {
    seven_days_from(day.checked_sub_days(Days::new(3)).unwrap_or(day))
}

/// The calendar day a class starts on, in the viewer's time zone.
#[must_use]
pub fn local_day<Tz: TimeZone>(start: &DateTime<chrono::Utc>, tz: &Tz) -> NaiveDate {
    start.with_timezone(tz).date_naive()
}

/// Bucket classes into the days of `week`, ordered by start time.
///
/// Classes outside the week are dropped. Every day of the week is present in
/// the result, in order, even when it has no classes.
#[must_use]
pub fn group_by_day<'a, Tz: TimeZone>(
    classes: &'a [ClassRecord],
    week: &Week,
    tz: &Tz,
) -> Vec<(NaiveDate, Vec<&'a ClassRecord>)> {
    week.iter()
        .map(|day| {
            let mut on_day: Vec<&ClassRecord> = classes
                .iter()
                .filter(|class| local_day(&class.start_date, tz) == *day)
                .collect();
            on_day.sort_by_key(|class| class.start_date);
            (*day, on_day)
        })
        .collect()
}

fn seven_days_from(start: NaiveDate) -> Week {
    let mut days = [start; DAYS_IN_WEEK];
    for (slot, date) in days.iter_mut().zip(start.iter_days()) {
        *slot = date;
    }
    days
}
