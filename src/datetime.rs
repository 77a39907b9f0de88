use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}


#[cfg(test)]
pub use mock_datetime::now;

/// 現在時刻をLocalタイムゾーンで取得する。
pub fn local_now() -> DateTime<Local> {
    now().with_timezone(&Local)
}

/// Localタイムゾーンでの今日の日付を取得する。
pub fn today() -> NaiveDate {
    local_now().date_naive()
}

/// 指定された日付のLocalタイムゾーンでの00:00:00を返す。
pub fn day_start(date: NaiveDate) -> Result<DateTime<Local>> {
    Local
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .with_context(|| format!("No local midnight exists on {}", date))
}

/// 指定された日付のLocalタイムゾーンでの23:59:59.999999999を返す。
pub fn day_end(date: NaiveDate) -> Result<DateTime<Local>> {
    let last_moment = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
        .context("Failed to build the last moment of a day")?;
    Local
        .from_local_datetime(&date.and_time(last_moment))
        .latest()
        .with_context(|| format!("No local end of day exists on {}", date))
}

/// `date1`の日付が`date2`の日付より前かどうか。
pub fn is_date_before(date1: NaiveDate, date2: NaiveDate) -> bool {
    date1 < date2
}

/// `date1`の日付が`date2`の日付より後かどうか。
pub fn is_date_after(date1: NaiveDate, date2: NaiveDate) -> bool {
    date1 > date2
}

/// 2つの日付がISO週で同じ週に属するかどうか。
pub fn is_same_week(date1: NaiveDate, date2: NaiveDate) -> bool {
    date1.iso_week() == date2.iso_week()
}

/// 日付を人が読みやすい文字列に変換する。
///
/// 今日、昨日、今週、先週7日以内はそれぞれ名前で表し、それ以外と未来の日付はISO形式の日付にする。
pub fn to_human_date_string(date: NaiveDate) -> String {
    let today = today();

    if is_date_before(today, date) {
        date.format("%Y-%m-%d").to_string()
    } else if date == today {
        "today".to_string()
    } else if date == today - Duration::days(1) {
        "yesterday".to_string()
    } else if is_same_week(date, today) {
        format!("{}", date.format("%A"))
    } else if is_date_after(date, today - Duration::days(7)) {
        format!("last {}", date.format("%A"))
    } else {
        date.format("%Y-%m-%d").to_string()
    }
}
