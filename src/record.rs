use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datetime;
use crate::error::{KimaiError, KimaiResult};

/// Kimai上のレコードID。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// IDと表示名の組。顧客、プロジェクト、タスクで共通して使う。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Named {
    pub id: u64,
    pub name: String,
}

impl fmt::Display for Named {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// タイムシートの1レコード。
///
/// `end`が`None`のレコードは計測中を表す。
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub id: RecordId,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub customer: Named,
    pub project: Named,
    pub task: Named,
    pub comment: String,
    pub user_id: String,
}

impl Entry {
    /// 計測中かどうかを返す。
    pub fn is_running(&self) -> bool {
        self.end.is_none()
    }

    /// 現在時刻を基準にした経過時間を返す。
    pub fn duration(&self) -> Duration {
        self.duration_at(datetime::now())
    }

    /// 指定時刻を基準にした経過時間を返す。
    ///
    /// 終了済みのレコードは`end - start`、計測中のレコードは`now - start`とする。
    pub fn duration_at(&self, now: DateTime<Utc>) -> Duration {
        self.end.unwrap_or(now) - self.start
    }
}

/// 数値が文字列で返ってくることがあるため、どちらでも受け付ける。
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(i64),
    Text(String),
}

impl Lenient {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Lenient::Number(n) => Some(*n),
            Lenient::Text(s) => s.trim().parse().ok(),
        }
    }

    /// `0`か空文字列の場合は値が無いものとして扱う。
    fn is_unset(&self) -> bool {
        match self {
            Lenient::Number(n) => *n == 0,
            Lenient::Text(s) => matches!(s.trim(), "" | "0"),
        }
    }

    fn as_u64(&self, field: &str) -> KimaiResult<u64> {
        self.as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| KimaiError::Decode(format!("invalid {}: {:?}", field, self)))
    }

    fn into_text(self) -> String {
        match self {
            Lenient::Number(n) => n.to_string(),
            Lenient::Text(s) => s,
        }
    }
}

/// Kimai APIのレコードをデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(rename = "timeEntryID")]
    time_entry_id: Lenient,
    start: Lenient,
    end: Option<Lenient>,
    comment: Option<String>,
    #[serde(rename = "customerID")]
    customer_id: Option<Lenient>,
    customer_name: Option<String>,
    #[serde(rename = "projectID")]
    project_id: Option<Lenient>,
    project_name: Option<String>,
    #[serde(rename = "activityID")]
    activity_id: Option<Lenient>,
    activity_name: Option<String>,
    #[serde(rename = "userID")]
    user_id: Option<Lenient>,
}

fn timestamp(value: &Lenient, field: &str) -> KimaiResult<DateTime<Utc>> {
    value
        .as_i64()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| KimaiError::Decode(format!("invalid {}: {:?}", field, value)))
}

fn named(id: Option<Lenient>, name: Option<String>, field: &str) -> KimaiResult<Named> {
    let id = match id {
        Some(id) => id.as_u64(field)?,
        None => 0,
    };

    Ok(Named {
        id,
        name: name.unwrap_or_default(),
    })
}

impl TryFrom<RawRecord> for Entry {
    type Error = KimaiError;

    fn try_from(raw: RawRecord) -> KimaiResult<Self> {
        let start = timestamp(&raw.start, "start")?;
        // 終了していないレコードは0か空で返ってくる
        let end = match raw.end {
            Some(end) if !end.is_unset() => Some(timestamp(&end, "end")?),
            _ => None,
        };

        Ok(Entry {
            id: RecordId(raw.time_entry_id.as_u64("timeEntryID")?),
            start,
            end,
            customer: named(raw.customer_id, raw.customer_name, "customerID")?,
            project: named(raw.project_id, raw.project_name, "projectID")?,
            task: named(raw.activity_id, raw.activity_name, "activityID")?,
            comment: raw.comment.unwrap_or_default(),
            user_id: raw.user_id.map(Lenient::into_text).unwrap_or_default(),
        })
    }
}

/// レスポンスの1 itemを`Entry`に変換する。
pub fn decode_entry(item: &Value) -> KimaiResult<Entry> {
    let raw: RawRecord = serde_json::from_value(item.clone())
        .map_err(|e| KimaiError::Decode(format!("unexpected record shape: {}", e)))?;

    Entry::try_from(raw)
}

/// プロジェクト一覧の1件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub customer_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProject {
    #[serde(rename = "projectID")]
    project_id: Lenient,
    name: String,
    customer_name: Option<String>,
}

impl Project {
    /// 補完用のキャッシュで使う名前。
    pub fn display_key(&self) -> String {
        format!("({}) {}", self.customer_name, self.name)
    }
}

pub fn decode_project(item: &Value) -> KimaiResult<Project> {
    let raw: RawProject = serde_json::from_value(item.clone())
        .map_err(|e| KimaiError::Decode(format!("unexpected project shape: {}", e)))?;

    Ok(Project {
        id: raw.project_id.as_u64("projectID")?,
        name: raw.name,
        customer_name: raw.customer_name.unwrap_or_default(),
    })
}

/// タスク(Kimai上はactivity)一覧の1件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTask {
    #[serde(rename = "activityID")]
    activity_id: Lenient,
    name: String,
}

pub fn decode_task(item: &Value) -> KimaiResult<Task> {
    let raw: RawTask = serde_json::from_value(item.clone())
        .map_err(|e| KimaiError::Decode(format!("unexpected task shape: {}", e)))?;

    Ok(Task {
        id: raw.activity_id.as_u64("activityID")?,
        name: raw.name,
    })
}

/// 作成・更新時に送るレコード本体。
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    pub project_id: u64,
    pub task_id: u64,
    pub status_id: u8,
    pub comment: String,
}
