use chrono::{DateTime, Datelike, Duration, Local, NaiveDate};
use thiserror::Error;

use crate::datetime::{self, day_end, day_start};

/// 集計対象の期間。両端を含む。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Span {
    pub name: String,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    /// 複数日にまたがるかどうか。日毎の集計を選べるかの判断に使う。
    pub multi_day: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpanError {
    #[error("unable to parse span '{0}'")]
    Unparseable(String),
    #[error("span '{0}' starts after it ends")]
    Inverted(String),
}

/// 文字列で表した期間を具体的な日時の範囲にする。
///
/// 以下の形式を受け付ける。
///
/// * `today`, `yesterday`
/// * `week` : 直近の日曜日の00:00から現在まで
/// * `M/D`, `M/D/YY`, `M/D/YYYY`, `YYYY-M-D` : その日の00:00から23:59:59.999999999まで
/// * `<left>..<right>` : `left`の開始から`right`の終了まで
///
/// # Examples
///
/// ```
/// let span = get_span("1/1..1/31").unwrap();
/// assert!(span.multi_day);
/// ```
pub fn get_span(text: &str) -> Result<Span, SpanError> {
    let text = text.trim();
    let unparseable = || SpanError::Unparseable(text.to_string());

    if let Some((left, right)) = text.split_once("..") {
        let left = get_span(left).map_err(|_| unparseable())?;
        let right = get_span(right).map_err(|_| unparseable())?;
        if left.start > right.end {
            return Err(SpanError::Inverted(text.to_string()));
        }
        return Ok(Span {
            name: text.to_string(),
            start: left.start,
            end: right.end,
            multi_day: true,
        });
    }

    let today = datetime::today();
    match text.to_lowercase().as_str() {
        "today" => single_day("today", today).ok_or_else(unparseable),
        "yesterday" => single_day("yesterday", today - Duration::days(1)).ok_or_else(unparseable),
        "week" => {
            let sunday = today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
            Ok(Span {
                name: "this week".to_string(),
                start: day_start(sunday).map_err(|_| unparseable())?,
                end: datetime::local_now(),
                multi_day: true,
            })
        }
        _ => parse_date(text, today.year())
            .and_then(|date| single_day(text, date))
            .ok_or_else(unparseable),
    }
}

fn single_day(name: &str, date: NaiveDate) -> Option<Span> {
    Some(Span {
        name: name.to_string(),
        start: day_start(date).ok()?,
        end: day_end(date).ok()?,
        multi_day: false,
    })
}

/// `M/D`, `M/D/YY`, `M/D/YYYY`, `YYYY-M-D`のいずれかの形式の日付を読む。
///
/// 年が省略された場合は`current_year`を使う。
fn parse_date(text: &str, current_year: i32) -> Option<NaiveDate> {
    if let Some((year, rest)) = text.split_once('-') {
        let (month, day) = rest.split_once('-')?;
        if year.len() != 4 || !is_number(month, 1, 2) || !is_number(day, 1, 2) {
            return None;
        }
        return NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?);
    }

    let parts: Vec<&str> = text.split('/').collect();
    let (month, day, year) = match parts.as_slice() {
        [month, day] => (*month, *day, current_year),
        [month, day, year] if is_number(year, 2, 2) => {
            // 2桁の年は69以上を1900年代とする
            let year: i32 = year.parse().ok()?;
            (*month, *day, if year >= 69 { 1900 + year } else { 2000 + year })
        }
        [month, day, year] if is_number(year, 4, 4) => (*month, *day, year.parse().ok()?),
        _ => return None,
    };
    if !is_number(month, 1, 2) || !is_number(day, 1, 2) {
        return None;
    }

    NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)
}

/// `min`から`max`桁の数字だけからなるかどうか。
fn is_number(text: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&text.len()) && text.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use chrono::{Local, NaiveDate, TimeZone, Timelike};
    use rstest::rstest;

    use super::{get_span, parse_date, SpanError};
    use crate::datetime::mock_datetime;

    /// 2024-06-12(水) 15:30をモック時間にする。
    fn set_now() {
        mock_datetime::set_mock_time(Local.with_ymd_and_hms(2024, 6, 12, 15, 30, 0).unwrap().to_utc());
    }

    #[test]
    fn test_today() {
        set_now();

        let span = get_span("today").unwrap();

        assert_eq!(span.name, "today");
        assert_eq!(span.start, Local.with_ymd_and_hms(2024, 6, 12, 0, 0, 0).unwrap());
        assert_eq!(span.end.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 12).unwrap());
        assert_eq!((span.end.hour(), span.end.minute(), span.end.second()), (23, 59, 59));
        assert_eq!(span.end.nanosecond(), 999_999_999);
        assert!(!span.multi_day);
        mock_datetime::clear_mock_time();
    }

    #[test]
    fn test_yesterday() {
        set_now();

        let span = get_span("Yesterday").unwrap();

        assert_eq!(span.start, Local.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap());
        assert_eq!(span.end.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 11).unwrap());
        mock_datetime::clear_mock_time();
    }

    /// 週は直近の日曜日から現在までであることを確認する。
    #[test]
    fn test_week() {
        set_now();

        let span = get_span("week").unwrap();

        assert_eq!(span.name, "this week");
        assert_eq!(span.start, Local.with_ymd_and_hms(2024, 6, 9, 0, 0, 0).unwrap());
        assert_eq!(span.end, Local.with_ymd_and_hms(2024, 6, 12, 15, 30, 0).unwrap());
        assert!(span.multi_day);
        mock_datetime::clear_mock_time();
    }

    #[test]
    fn test_week_on_sunday_starts_today() {
        mock_datetime::set_mock_time(Local.with_ymd_and_hms(2024, 6, 9, 8, 0, 0).unwrap().to_utc());

        let span = get_span("week").unwrap();

        assert_eq!(span.start, Local.with_ymd_and_hms(2024, 6, 9, 0, 0, 0).unwrap());
        mock_datetime::clear_mock_time();
    }

    #[test]
    fn test_range() {
        set_now();

        let span = get_span("6/1..yesterday").unwrap();

        assert_eq!(span.name, "6/1..yesterday");
        assert_eq!(span.start, get_span("6/1").unwrap().start);
        assert_eq!(span.end, get_span("yesterday").unwrap().end);
        assert!(span.multi_day);
        mock_datetime::clear_mock_time();
    }

    #[test]
    fn test_range_with_spaces() {
        set_now();

        let span = get_span("2024-5-1 .. 5/3").unwrap();

        assert_eq!(span.start, Local.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(span.end.date_naive(), NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
        mock_datetime::clear_mock_time();
    }

    #[rstest]
    #[case::month_day("3/7", Some((2024, 3, 7)))]
    #[case::padded("03/07", Some((2024, 3, 7)))]
    #[case::short_year("3/7/23", Some((2023, 3, 7)))]
    #[case::short_year_last_century("3/7/99", Some((1999, 3, 7)))]
    #[case::full_year("12/31/2022", Some((2022, 12, 31)))]
    #[case::iso("2022-1-05", Some((2022, 1, 5)))]
    #[case::iso_padded("2022-01-05", Some((2022, 1, 5)))]
    #[case::invalid_day("2/30", None)]
    #[case::three_digit_year("1/2/123", None)]
    #[case::letters("a/b", None)]
    #[case::short_iso_year("22-1-5", None)]
    #[case::empty("", None)]
    fn test_parse_date(#[case] text: &str, #[case] expected: Option<(i32, u32, u32)>) {
        let expected = expected.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap());

        assert_eq!(parse_date(text, 2024), expected);
    }

    #[rstest]
    #[case("tomorrow")]
    #[case("1/2..")]
    #[case("..today")]
    #[case("13/1")]
    fn test_unparseable(#[case] text: &str) {
        assert_eq!(get_span(text), Err(SpanError::Unparseable(text.to_string())));
    }

    #[test]
    fn test_error_message() {
        let err = get_span("soon").unwrap_err();

        assert_eq!(err.to_string(), "unable to parse span 'soon'");
    }

    #[test]
    fn test_inverted_range() {
        assert_eq!(
            get_span("2024-2-1..2024-1-1"),
            Err(SpanError::Inverted("2024-2-1..2024-1-1".to_string()))
        );
    }
}
