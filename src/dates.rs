use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::datetime;
use crate::error::{KimaiError, KimaiResult};

/// 日時の表現を解釈する。
///
/// 対応している表現:
/// - `now`
/// - `today`, `yesterday`, `tomorrow` (`at HH:MM[:SS]`を後ろに付けられる)
/// - `HH:MM[:SS]` (基準日の時刻)
/// - `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]`, `YYYY-MM-DDTHH:MM[:SS]`
/// - `+1h30m`, `-45m`, `+90` (分) のような基準日時からの相対指定
///
/// 解釈できない場合は`None`を返す。
///
/// # Arguments
///
/// * `expression` - 解釈する文字列
/// * `relative_to` - 相対指定の基準。`None`の場合は現在時刻
pub fn parse(expression: &str, relative_to: Option<DateTime<Local>>) -> Option<DateTime<Local>> {
    let base = relative_to.unwrap_or_else(|| datetime::now().with_timezone(&Local));
    let expression = expression.trim().to_lowercase();

    if expression == "now" {
        return Some(base);
    }

    if let Some(offset) = expression.strip_prefix('+') {
        return base.checked_add_signed(parse_offset(offset)?);
    }
    if let Some(offset) = expression.strip_prefix('-') {
        return base.checked_sub_signed(parse_offset(offset)?);
    }

    if let Some(datetime) = parse_day_word(&expression, &base) {
        return Some(datetime);
    }

    if let Some(time) = parse_time(&expression) {
        return to_local(base.date_naive().and_time(time));
    }

    parse_absolute(&expression)
}

/// `parse`の結果が`None`の場合に入力エラーにする。
pub fn parse_required(
    expression: &str,
    relative_to: Option<DateTime<Local>>,
) -> KimaiResult<DateTime<Local>> {
    parse(expression, relative_to).ok_or_else(|| KimaiError::InvalidDate(expression.to_string()))
}

fn to_local(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&naive).earliest()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_day_word(s: &str, base: &DateTime<Local>) -> Option<DateTime<Local>> {
    let (word, time) = match s.split_once(" at ") {
        Some((word, time)) => (word.trim(), parse_time(time.trim())?),
        None => (s, NaiveTime::MIN),
    };

    let today = base.date_naive();
    let day = match word {
        "today" => today,
        "yesterday" => today.pred_opt()?,
        "tomorrow" => today.succ_opt()?,
        _ => return None,
    };

    to_local(day.and_time(time))
}

fn parse_absolute(s: &str) -> Option<DateTime<Local>> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return to_local(date.and_time(NaiveTime::MIN));
    }

    let s = s.replacen('t', " ", 1);
    let (date, time) = s.split_once(' ')?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let time = parse_time(time.trim())?;

    to_local(date.and_time(time))
}

/// `1h30m`, `45m`, `2h`, `90`(分)を解釈する。範囲外の値は`None`。
fn parse_offset(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(minutes) = s.parse::<i64>() {
        return Duration::try_minutes(minutes);
    }

    let mut total = Duration::zero();
    let mut digits = String::new();
    for c in s.chars() {
        match c {
            '0'..='9' => digits.push(c),
            'h' | 'm' | 's' if !digits.is_empty() => {
                let value: i64 = digits.parse().ok()?;
                let part = match c {
                    'h' => Duration::try_hours(value),
                    'm' => Duration::try_minutes(value),
                    _ => Duration::try_seconds(value),
                }?;
                total = total.checked_add(&part)?;
                digits.clear();
            }
            ' ' => {}
            _ => return None,
        }
    }

    digits.is_empty().then_some(total)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Local, TimeZone};
    use rstest::rstest;

    use super::{parse, parse_required};
    use crate::error::KimaiError;

    fn base() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 15, 14, 30, 0).unwrap()
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[rstest]
    #[case::now("now", base())]
    #[case::today("today", local(2024, 5, 15, 0, 0, 0))]
    #[case::today_at("today at 09:15", local(2024, 5, 15, 9, 15, 0))]
    #[case::today_end("Today at 23:59:59", local(2024, 5, 15, 23, 59, 59))]
    #[case::yesterday_at("yesterday at 17:00", local(2024, 5, 14, 17, 0, 0))]
    #[case::tomorrow("tomorrow", local(2024, 5, 16, 0, 0, 0))]
    #[case::time_only("08:05", local(2024, 5, 15, 8, 5, 0))]
    #[case::date_only("2024-01-02", local(2024, 1, 2, 0, 0, 0))]
    #[case::date_time("2024-01-02 10:11", local(2024, 1, 2, 10, 11, 0))]
    #[case::iso("2024-01-02T10:11:12", local(2024, 1, 2, 10, 11, 12))]
    #[case::plus_hours("+2h", base() + Duration::hours(2))]
    #[case::plus_mixed("+1h30m", base() + Duration::minutes(90))]
    #[case::plus_minutes_only("+45", base() + Duration::minutes(45))]
    #[case::minus("-30m", base() - Duration::minutes(30))]
    fn test_parse(#[case] expression: &str, #[case] expected: DateTime<Local>) {
        assert_eq!(parse(expression, Some(base())), Some(expected));
    }

    #[rstest]
    #[case::empty("")]
    #[case::garbage("next blue moon")]
    #[case::bad_time("25:99")]
    #[case::bad_offset("+1x")]
    #[case::dangling_digits("+1h30")]
    #[case::bad_day_time("today at noon")]
    #[case::hours_out_of_range("+99999999999999h")]
    #[case::minutes_out_of_range("+9223372036854775807")]
    #[case::sum_out_of_range("-2000000000000h2000000000000h")]
    #[case::date_out_of_range("+2500000000h")]
    fn test_parse_invalid(#[case] expression: &str) {
        assert_eq!(parse(expression, Some(base())), None);
    }

    #[test]
    fn test_parse_required_reports_expression() {
        let result = parse_required("whenever", Some(base()));

        assert!(matches!(result, Err(KimaiError::InvalidDate(expression)) if expression == "whenever"));
    }
}
