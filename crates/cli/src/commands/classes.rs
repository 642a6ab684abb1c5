//! Class commands.
//!
//! # Usage
//!
//! ```bash
//! classbook classes list --date 2025-03-04
//! classbook classes week
//! classbook classes create -t Yoga -d "Morning flow" -s "2025-03-04 09:00" -c 12
//! classbook classes reserve 42
//! ```
//!
//! Times are shown in the local time zone.

use std::fmt::Display;
use std::io::Write;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use classbook_client::{ClassForm, ClassesApi};
use classbook_core::calendar::{group_by_day, week_centered_on, week_containing};
use classbook_core::{ClassId, ClassRecord};

use super::CommandResult;

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
const TIME_FORMAT: &str = "%H:%M";
const LOCAL_INPUT_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

pub async fn list(api: &ClassesApi, out: &mut impl Write, date: Option<NaiveDate>) -> CommandResult {
    let mut classes = match date {
        Some(day) => api.list_classes_on(day).await?,
        None => api.list_classes().await?,
    };
    classes.sort_by_key(|class| class.start_date);

    if classes.is_empty() {
        writeln!(out, "No classes.")?;
    }
    for class in &classes {
        write_class_line(out, class, &Local, DATE_TIME_FORMAT)?;
    }
    Ok(())
}

/// Seven days of classes: centred on `date` when given, otherwise the
/// Sunday-start week containing today.
pub async fn week(api: &ClassesApi, out: &mut impl Write, date: Option<NaiveDate>) -> CommandResult {
    let today = Local::now().date_naive();
    let days = date.map_or_else(|| week_containing(today), week_centered_on);
    let selected = date.unwrap_or(today);

    let classes = api.list_classes().await?;
    write_week(out, &group_by_day(&classes, &days, &Local), selected, &Local)?;
    Ok(())
}

pub async fn create(api: &ClassesApi, out: &mut impl Write, form: ClassForm) -> CommandResult {
    let title = form.title.trim().to_string();
    let created = api.create_class(form).await?;

    let id = created
        .get("id")
        .and_then(|id| serde_json::from_value::<ClassId>(id.clone()).ok());
    match id {
        Some(id) => writeln!(out, "Created class #{id}: {title}")?,
        None => writeln!(out, "Created class: {title}")?,
    }
    Ok(())
}

pub async fn reserve(api: &ClassesApi, out: &mut impl Write, class_id: ClassId) -> CommandResult {
    api.reserve_class(class_id).await?;
    writeln!(out, "Reserved a seat in class #{class_id}.")?;
    Ok(())
}

/// Parse a class start time given on the command line.
///
/// # Errors
///
/// Returns a message for clap if the input is in neither accepted format.
pub fn parse_start(value: &str) -> Result<DateTime<Utc>, String> {
    parse_start_in(value, &Local)
}

fn parse_start_in<Tz: TimeZone>(value: &str, tz: &Tz) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(start) = DateTime::parse_from_rfc3339(value) {
        return Ok(start.with_timezone(&Utc));
    }

    for format in LOCAL_INPUT_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|start| start.with_timezone(&Utc))
                .ok_or_else(|| format!("`{value}` does not exist in the local time zone"));
        }
    }

    Err(format!(
        "invalid start time `{value}` (expected RFC 3339 or \"YYYY-MM-DD HH:MM\")"
    ))
}

fn write_class_line<Tz>(
    out: &mut impl Write,
    class: &ClassRecord,
    tz: &Tz,
    time_format: &str,
) -> std::io::Result<()>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let id = format!("#{}", class.id);
    let seats = class.capacity.map_or_else(
        || class.seats_taken().to_string(),
        |capacity| format!("{}/{capacity}", class.seats_taken()),
    );
    let booking = if class.is_open() { "" } else { " (not bookable)" };
    writeln!(
        out,
        "{id:<6} {}  {}  [{seats}] {}{booking}",
        class.start_date.with_timezone(tz).format(time_format),
        class.title,
        class.status
    )
}

fn write_week<Tz>(
    out: &mut impl Write,
    days: &[(NaiveDate, Vec<&ClassRecord>)],
    selected: NaiveDate,
    tz: &Tz,
) -> std::io::Result<()>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    for (day, classes) in days {
        let marker = if *day == selected { '*' } else { ' ' };
        writeln!(out, "{marker} {}", day.format("%a %Y-%m-%d"))?;
        if classes.is_empty() {
            writeln!(out, "    -")?;
        }
        for class in classes {
            write!(out, "    ")?;
            write_class_line(out, class, tz, TIME_FORMAT)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::FixedOffset;
    use classbook_core::{ClassStatus, UserId};

    use super::*;

    fn class(id: i64, title: &str, start: DateTime<Utc>) -> ClassRecord {
        ClassRecord {
            id: ClassId::new(id),
            title: title.to_string(),
            description: String::new(),
            creator_id: UserId::new(1),
            creator_name: None,
            created_at: None,
            start_date: start,
            status: ClassStatus::Active,
            capacity: Some(10),
            participants: vec![serde_json::json!({"user_id": 2})],
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_parse_start_rfc3339() {
        let start = parse_start_in("2025-03-04T09:00:00+02:00", &Utc).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 4, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_start_local_time() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        let start = parse_start_in("2025-03-04 09:30", &tz).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 4, 8, 30, 0).unwrap());

        let start = parse_start_in("2025-03-04T09:30", &Utc).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 4, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_start_rejects_garbage() {
        let err = parse_start_in("next tuesday", &Utc).unwrap_err();
        assert!(err.contains("next tuesday"));
    }

    #[test]
    fn test_class_line() {
        let record = class(7, "Yoga", Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap());
        let mut out = Vec::new();
        write_class_line(&mut out, &record, &Utc, DATE_TIME_FORMAT).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "#7     2025-03-04 09:00  Yoga  [1/10] active\n"
        );
    }

    #[test]
    fn test_class_line_flags_full_and_cancelled() {
        let mut full = class(8, "Spin", Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap());
        full.capacity = Some(1);
        let mut cancelled = class(9, "Pilates", Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap());
        cancelled.status = ClassStatus::Cancelled;

        let mut out = Vec::new();
        write_class_line(&mut out, &full, &Utc, TIME_FORMAT).unwrap();
        write_class_line(&mut out, &cancelled, &Utc, TIME_FORMAT).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "#8     09:00  Spin  [1/1] active (not bookable)\n\
             #9     09:00  Pilates  [1/10] cancelled (not bookable)\n"
        );
    }

    #[test]
    fn test_week_marks_selected_day() {
        let classes = vec![
            class(1, "Late", Utc.with_ymd_and_hms(2025, 3, 4, 18, 0, 0).unwrap()),
            class(2, "Early", Utc.with_ymd_and_hms(2025, 3, 4, 7, 0, 0).unwrap()),
        ];
        let days = group_by_day(&classes, &week_centered_on(day(4)), &Utc);

        let mut out = Vec::new();
        write_week(&mut out, &days, day(4), &Utc).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.first().copied(), Some("  Sat 2025-03-01"));
        assert!(lines.contains(&"* Tue 2025-03-04"));
        let early = lines.iter().position(|l| l.contains("Early")).unwrap();
        let late = lines.iter().position(|l| l.contains("Late")).unwrap();
        assert!(early < late);
        assert_eq!(text.matches("    -\n").count(), 6);
    }
}
