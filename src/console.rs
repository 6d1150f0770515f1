use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Duration, Local};

use crate::record::Entry;

const RECORD_HEADERS: [&str; 8] = [
    "Id",
    "Start Time",
    "End Time",
    "Duration",
    "Customer",
    "Project",
    "Task",
    "Comment",
];

/// Consoleに一覧を表示するためのtrait。
pub trait ConsolePresenter {
    /// レコードを表示する。
    ///
    /// # Arguments
    ///
    /// * `records` - 表示するレコード
    fn show_records(&mut self, records: &[Entry]) -> Result<()>;

    /// 見出しと行を表として表示する。
    fn show_rows(&mut self, headers: &[&str], rows: &[Vec<String>]) -> Result<()>;
}

/// 一覧を罫線付きの表で表示する。
pub struct ConsoleTable<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleTable<'a, W> {
    /// 新しい`ConsoleTable`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn write_border(&mut self, widths: &[usize], fill: char) -> Result<()> {
        let line: String = widths
            .iter()
            .map(|width| fill.to_string().repeat(width + 2))
            .collect::<Vec<_>>()
            .join("+");
        writeln!(self.writer, "+{}+", line).context("Failed to write table border")
    }

    fn write_row(&mut self, widths: &[usize], cells: &[String]) -> Result<()> {
        let line: String = widths
            .iter()
            .zip(cells)
            .map(|(width, cell)| {
                let padding = width - cell.chars().count();
                format!(" {}{} ", cell, " ".repeat(padding))
            })
            .collect::<Vec<_>>()
            .join("|");
        writeln!(self.writer, "|{}|", line)
            .with_context(|| format!("Failed to write table row: {:?}", cells))
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleTable<'a, W> {
    // レコードを1行ずつ表として表示する。
    fn show_records(&mut self, records: &[Entry]) -> Result<()> {
        let rows: Vec<Vec<String>> = records.iter().map(record_row).collect();

        self.show_rows(&RECORD_HEADERS, &rows)
    }

    fn show_rows(&mut self, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        let widths: Vec<usize> = headers
            .iter()
            .enumerate()
            .map(|(column, header)| {
                rows.iter()
                    .filter_map(|row| row.get(column))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        self.write_border(&widths, '-')?;
        self.write_row(&widths, &headers)?;
        self.write_border(&widths, '=')?;
        for row in rows {
            let mut cells = row.clone();
            cells.resize(widths.len(), String::new());
            self.write_row(&widths, &cells)?;
            self.write_border(&widths, '-')?;
        }

        Ok(())
    }
}

fn record_row(record: &Entry) -> Vec<String> {
    let end = record
        .end
        .map(|end| end.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());

    vec![
        record.id.to_string(),
        record
            .start
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string(),
        end,
        format_duration(record.duration()),
        record.customer.to_string(),
        record.project.to_string(),
        record.task.to_string(),
        record.comment.replace('\n', " "),
    ]
}

/// 経過時間を`H:MM`形式にする。
pub fn format_duration(duration: Duration) -> String {
    let minutes = duration.num_minutes();
    let sign = if minutes < 0 { "-" } else { "" };
    let minutes = minutes.abs();

    format!("{}{}:{:02}", sign, minutes / 60, minutes % 60)
}

/// レコードの合計時間を`H:MMh`形式で返す。
pub fn total_duration(records: &[Entry]) -> String {
    let total = records
        .iter()
        .fold(Duration::zero(), |total, record| total + record.duration());

    format!("{}h", format_duration(total))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, TimeZone, Utc};
    use rstest::rstest;

    use super::{format_duration, total_duration, ConsolePresenter, ConsoleTable};
    use crate::record::{Entry, Named, RecordId};

    /// テスト用にダミーのEntryを作成する。
    fn dummy_entry(id: u64, minutes: i64) -> Entry {
        let start = Utc.with_ymd_and_hms(2021, 1, 1, 1, 0, 0).unwrap();
        Entry {
            id: RecordId(id),
            start,
            end: Some(start + Duration::minutes(minutes)),
            customer: Named {
                id: 1,
                name: "ACME".to_string(),
            },
            project: Named {
                id: 2,
                name: "Web".to_string(),
            },
            task: Named {
                id: 3,
                name: "Dev".to_string(),
            },
            comment: "fix\nbug".to_string(),
            user_id: "u1".to_string(),
        }
    }

    #[rstest]
    #[case::zero(Duration::zero(), "0:00")]
    #[case::minutes(Duration::minutes(5), "0:05")]
    #[case::hours(Duration::minutes(195), "3:15")]
    #[case::seconds_truncated(Duration::seconds(119), "0:01")]
    #[case::negative(Duration::minutes(-75), "-1:15")]
    fn test_format_duration(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(format_duration(duration), expected);
    }

    #[rstest]
    #[case::no_records(vec![], "0:00h")]
    #[case::single(vec![dummy_entry(1, 180)], "3:00h")]
    #[case::multiple(vec![dummy_entry(1, 180), dummy_entry(2, 195)], "6:15h")]
    fn test_total_duration(#[case] records: Vec<Entry>, #[case] expected: &str) {
        assert_eq!(total_duration(&records), expected);
    }

    #[test]
    fn test_show_rows() {
        let mut writer = Vec::new();
        let mut presenter = ConsoleTable::new(&mut writer);

        presenter
            .show_rows(
                &["Name", "Id"],
                &[
                    vec!["Development".to_string(), "9".to_string()],
                    vec!["QA".to_string()],
                ],
            )
            .unwrap();

        let expected = "\
+-------------+----+
| Name        | Id |
+=============+====+
| Development | 9  |
+-------------+----+
| QA          |    |
+-------------+----+
";
        assert_eq!(String::from_utf8(writer).unwrap(), expected);
    }

    #[test]
    fn test_show_records() {
        let mut writer = Vec::new();
        let mut presenter = ConsoleTable::new(&mut writer);
        let entry = dummy_entry(42, 90);

        presenter.show_records(&[entry.clone()]).unwrap();

        let output = String::from_utf8(writer).unwrap();
        let start = entry.start.with_timezone(&Local).format("%H:%M:%S").to_string();
        assert!(output.contains("| Id "));
        assert!(output.contains(&format!("| 42 | {} ", start)));
        assert!(output.contains("| 1:30     |"));
        assert!(output.contains("| fix bug "));
    }
}
