//! Date handling for footers and output file names
//!
//! `[date]` in a footer either becomes a `DATE` field that the word
//! processor fills in when the file is opened, or a fixed date given on the
//! command line as an expression.

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Weekday};
use crate::error::{Error, Result};

/// Word date picture matching [`format_date`]
pub const WORD_DATE_PICTURE: &str = "MMMM d, yyyy";

/// Parse a date expression relative to `today`
///
/// Supported formats:
/// - `"today"`
/// - `"2024-11-20"` (ISO)
/// - `"11/20/2024"` (US)
/// - `"Tuesday"` → next Tuesday, or today if today is Tuesday
/// - `"Tuesday+3"` → three weeks after that
pub fn parse_date_expression(expr: &str, today: NaiveDate) -> Result<NaiveDate> {
    let expr = expr.trim();

    if expr.eq_ignore_ascii_case("today") {
        return Ok(today);
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(expr, format) {
            return Ok(date);
        }
    }

    let (day, weeks) = match expr.split_once('+') {
        Some((day, offset)) => {
            let weeks: u32 = offset
                .trim()
                .parse()
                .map_err(|_| Error::InvalidDateExpression(format!("Invalid offset: {}", offset)))?;
            (day, weeks)
        }
        None => (expr, 0),
    };
    let day = parse_weekday(day)?;
    Ok(next_weekday(today, day, weeks))
}

/// Parse a date expression relative to the local date
pub fn parse_date(expr: &str) -> Result<NaiveDate> {
    parse_date_expression(expr, Local::now().date_naive())
}

fn parse_weekday(s: &str) -> Result<Weekday> {
    let s = s.trim().to_lowercase();
    match s.as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        _ => Err(Error::InvalidDateExpression(format!(
            "Unable to parse date expression: {}",
            s
        ))),
    }
}

/// First `day` on or after `from`, plus `weeks` weeks
fn next_weekday(from: NaiveDate, day: Weekday, weeks: u32) -> NaiveDate {
    let ahead = (day.num_days_from_monday() + 7 - from.weekday().num_days_from_monday()) % 7;
    from + chrono::Duration::days(i64::from(ahead + weeks * 7))
}

/// Format a date as "Month day, year", e.g. "November 20, 2024"
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Default name of the merged document, e.g. `Proceedings_20241120_0930.docx`
pub fn default_output_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("Proceedings_{}.docx", now.format("%Y%m%d_%H%M"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn wednesday() -> NaiveDate {
        // 2024-11-20 was a Wednesday
        NaiveDate::from_ymd_opt(2024, 11, 20).unwrap()
    }

    #[test]
    fn test_today() {
        assert_eq!(parse_date_expression("Today", wednesday()).unwrap(), wednesday());
    }

    #[test]
    fn test_explicit_dates() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(parse_date_expression("2025-03-07", wednesday()).unwrap(), expected);
        assert_eq!(parse_date_expression("03/07/2025", wednesday()).unwrap(), expected);
    }

    #[test]
    fn test_weekdays() {
        let today = wednesday();
        assert_eq!(parse_date_expression("wednesday", today).unwrap(), today);
        assert_eq!(
            parse_date_expression("Fri", today).unwrap(),
            NaiveDate::from_ymd_opt(2024, 11, 22).unwrap()
        );
        assert_eq!(
            parse_date_expression("Monday", today).unwrap(),
            NaiveDate::from_ymd_opt(2024, 11, 25).unwrap()
        );
        assert_eq!(
            parse_date_expression("tue+2", today).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 10).unwrap()
        );
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            parse_date_expression("someday", wednesday()),
            Err(Error::InvalidDateExpression(_))
        ));
        assert!(parse_date_expression("friday+x", wednesday()).is_err());
        assert!(parse_date_expression("", wednesday()).is_err());
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(&wednesday()), "November 20, 2024");
        let date = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        assert_eq!(format_date(&date), "January 5, 2025");
    }

    #[test]
    fn test_default_output_name() {
        let now = Utc.with_ymd_and_hms(2024, 11, 20, 9, 5, 0).unwrap();
        assert_eq!(default_output_name(&now), "Proceedings_20241120_0905.docx");
    }
}
