use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, Utc};

/// Kimaiに日時を渡す際の書式。タイムゾーンを持たないローカル時刻として送る。
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}


#[cfg(test)]
pub use mock_datetime::now;

/// Localタイムゾーンでの今日の00:00:00と23:59:59を返す。
pub fn today_bounds() -> (NaiveDateTime, NaiveDateTime) {
    let today = now().with_timezone(&Local).date_naive();
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);

    (today.and_time(NaiveTime::MIN), today.and_time(end_of_day))
}

/// UTCの日時をKimaiが受け付けるローカル時刻の文字列にする。
pub fn to_wire(datetime: &DateTime<Utc>) -> String {
    datetime.with_timezone(&Local).format(WIRE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Local, SecondsFormat, TimeZone, Timelike, Utc};

    use super::{mock_datetime, to_wire, today_bounds};

    /// 何も設定しない場合は、現在時間が取得できることを確認する。
    ///
    ///  - 現在時刻での比較を行なっているため、ミリ秒単位まで比較するとテストが失敗する可能性があり、秒単位で比較している。
    #[test]
    fn test_now() {
        assert_eq!(
            mock_datetime::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }

    /// モック時間を設定した時に、その時間が取得できることを確認する。
    #[test]
    fn test_now_specific_datetime() {
        let datetime = String::from("2024-01-01T00:00:00+00:00");
        mock_datetime::set_mock_time(
            DateTime::parse_from_rfc3339(datetime.as_str())
                .unwrap()
                .to_utc(),
        );

        assert_eq!(mock_datetime::now().to_rfc3339(), datetime);
        mock_datetime::clear_mock_time();
    }

    /// 今日の範囲がモック時間の日付の0時から23:59:59になることを確認する。
    #[test]
    fn test_today_bounds() {
        let noon = Local.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        mock_datetime::set_mock_time(noon.to_utc());

        let (start, end) = today_bounds();

        assert_eq!(start.date(), noon.date_naive());
        assert_eq!(end.date(), noon.date_naive());
        assert_eq!((start.hour(), start.minute(), start.second()), (0, 0, 0));
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 59));
        mock_datetime::clear_mock_time();
    }

    #[test]
    fn test_to_wire_uses_local_time() {
        let local = Local.with_ymd_and_hms(2024, 5, 27, 8, 30, 15).unwrap();

        assert_eq!(to_wire(&local.to_utc()), "2024-05-27T08:30:15");
    }
}
