use std::{cell::RefCell, collections::HashMap};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info, warn};
#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use crate::datetime::{self, WIRE_FORMAT};
use crate::error::{KimaiError, KimaiResult};
use crate::record::{
    decode_entry, decode_project, decode_task, Entry, Project, RecordId, RecordPayload, Task,
};
use crate::rpc::{KimaiClient, Param, RequestAction};

/// `getTimesheet`の取得範囲。
///
/// `None`と`0`はKimai側で「制限なし」を表す。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimesheetWindow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub limit: u32,
}

impl TimesheetWindow {
    /// 最新の1件だけを取得する範囲。
    pub fn latest() -> Self {
        Self {
            limit: 1,
            ..Self::default()
        }
    }

    fn params(&self) -> Vec<Param> {
        let bound = |value: Option<NaiveDateTime>| match value {
            Some(value) => Param::scalar(value.format(WIRE_FORMAT)),
            None => Param::scalar(0),
        };

        vec![
            bound(self.start),
            bound(self.end),
            Param::scalar(-1),
            Param::scalar(0),
            Param::scalar(self.limit),
        ]
    }
}

/// 新しく追加するレコード。
#[derive(Clone, Debug, PartialEq)]
pub struct NewEntry {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub project_id: u64,
    pub task_id: u64,
    pub comment: String,
}

/// 既存レコードへの変更。`None`の項目はサーバー上の値を維持する。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryChanges {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub project_id: Option<u64>,
    pub task_id: Option<u64>,
    pub comment: Option<String>,
}

impl EntryChanges {
    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::default()
        }
    }
}

/// 既存レコードに変更を重ねた更新内容を作る。
pub fn merge_changes(existing: &Entry, changes: &EntryChanges) -> RecordPayload {
    RecordPayload {
        id: Some(existing.id),
        start: datetime::to_wire(&changes.start.unwrap_or(existing.start)),
        end: changes.end.or(existing.end).map(|end| datetime::to_wire(&end)),
        project_id: changes.project_id.unwrap_or(existing.project.id),
        task_id: changes.task_id.unwrap_or(existing.task.id),
        status_id: 1,
        comment: changes
            .comment
            .clone()
            .unwrap_or_else(|| existing.comment.clone()),
    }
}

/// タイムシートのレコードを型付きで扱うためのリポジトリ。
#[cfg_attr(test, automock)]
pub trait RecordRepository {
    /// 指定範囲のレコードを取得する。並びは新しいものが先頭である前提で扱う。
    async fn get_timesheet(&self, window: TimesheetWindow) -> KimaiResult<Vec<Entry>>;

    async fn get_single(&self, id: RecordId) -> KimaiResult<Entry>;

    /// Localタイムゾーンで今日のレコードを取得する。
    async fn get_today(&self) -> KimaiResult<Vec<Entry>>;

    /// 計測中のレコードを返す。最新のレコードが終了済みなら`None`。
    async fn get_current(&self) -> KimaiResult<Option<Entry>>;

    /// 計測を開始し、作成されたレコードのIDを返す。
    async fn start(&self, project_id: u64, task_id: u64) -> KimaiResult<RecordId>;

    async fn stop(&self, id: RecordId) -> KimaiResult<()>;

    async fn add(&self, entry: NewEntry) -> KimaiResult<RecordId>;

    async fn edit(&self, id: RecordId, changes: EntryChanges) -> KimaiResult<()>;

    async fn comment(&self, id: RecordId, comment: String) -> KimaiResult<()>;

    async fn delete(&self, id: RecordId) -> KimaiResult<()>;

    /// レコードが現在のユーザーのものであることを確認し、そのレコードを返す。
    async fn authorize(&self, id: RecordId) -> KimaiResult<Entry>;
}

/// 認可の判定結果。
#[derive(Clone, Debug)]
enum Authorization {
    Granted(Entry),
    Denied,
}

/// `KimaiClient`を使った`RecordRepository`の実装。
///
/// 認可の結果はこのインスタンスが生きている間だけキャッシュする。
/// 1コマンドにつき1インスタンスを作ること。
pub struct KimaiRepository {
    client: KimaiClient,
    authorizations: RefCell<HashMap<RecordId, Authorization>>,
    current_user: RefCell<Option<String>>,
}

impl KimaiRepository {
    /// 新しい`KimaiRepository`を返す。
    pub fn new(client: KimaiClient) -> Self {
        Self {
            client,
            authorizations: RefCell::new(HashMap::new()),
            current_user: RefCell::new(None),
        }
    }

    /// 利用できるプロジェクトの一覧を取得する。
    pub async fn get_projects(&self) -> KimaiResult<Vec<Project>> {
        let items = self
            .client
            .send(RequestAction::GetProjects, &[], true)
            .await?;

        items.iter().map(decode_project).collect()
    }

    /// 利用できるタスクの一覧を取得する。
    pub async fn get_tasks(&self) -> KimaiResult<Vec<Task>> {
        let items = self.client.send(RequestAction::GetTasks, &[], true).await?;

        items.iter().map(decode_task).collect()
    }

    /// APIキーの持ち主のユーザーIDを返す。
    ///
    /// 直接取得する手段が無いため、最新のレコードの持ち主で代用する。
    /// レコードが1件も無い場合は`None`。
    async fn current_user_id(&self) -> KimaiResult<Option<String>> {
        let cached = self.current_user.borrow().clone();
        if cached.is_some() {
            return Ok(cached);
        }

        let user_id = self
            .get_timesheet(TimesheetWindow::latest())
            .await?
            .into_iter()
            .next()
            .map(|entry| entry.user_id);
        if let Some(user_id) = &user_id {
            debug!("Current user id: {}", user_id);
            *self.current_user.borrow_mut() = Some(user_id.clone());
        }

        Ok(user_id)
    }

    async fn set_record(&self, params: Vec<Param>) -> KimaiResult<Vec<Value>> {
        self.client
            .send(RequestAction::SetTimesheetRecord, &params, true)
            .await
    }
}

fn record_param(payload: &RecordPayload) -> KimaiResult<Param> {
    serde_json::to_value(payload)
        .map(Param::Object)
        .map_err(|e| KimaiError::Decode(format!("Failed to encode record: {}", e)))
}

/// レスポンスの先頭itemから作成されたレコードのIDを読む。
fn created_id(items: &[Value]) -> Option<RecordId> {
    let id = items.first()?.get("id")?;

    id.as_u64()
        .or_else(|| id.as_str().and_then(|id| id.parse().ok()))
        .map(RecordId)
}

impl RecordRepository for KimaiRepository {
    async fn get_timesheet(&self, window: TimesheetWindow) -> KimaiResult<Vec<Entry>> {
        let items = self
            .client
            .send(RequestAction::GetTimesheet, &window.params(), true)
            .await?;
        debug!("length of records: {}", items.len());

        items.iter().map(decode_entry).collect()
    }

    async fn get_single(&self, id: RecordId) -> KimaiResult<Entry> {
        let items = match self
            .client
            .send(RequestAction::GetTimesheetRecord, &[Param::scalar(id)], true)
            .await
        {
            Ok(items) => items,
            Err(KimaiError::Application(message)) => {
                debug!("Record {} not available: {}", id, message);
                return Err(KimaiError::NotFound(id));
            }
            Err(e) => return Err(e),
        };

        let item = items.first().ok_or(KimaiError::NotFound(id))?;
        decode_entry(item)
    }

    async fn get_today(&self) -> KimaiResult<Vec<Entry>> {
        let (start, end) = datetime::today_bounds();
        info!("Start at: {}, End at: {}", start, end);

        self.get_timesheet(TimesheetWindow {
            start: Some(start),
            end: Some(end),
            limit: 0,
        })
        .await
    }

    async fn get_current(&self) -> KimaiResult<Option<Entry>> {
        let latest = self
            .get_timesheet(TimesheetWindow::latest())
            .await?
            .into_iter()
            .next();

        Ok(latest.filter(Entry::is_running))
    }

    async fn start(&self, project_id: u64, task_id: u64) -> KimaiResult<RecordId> {
        let items = self
            .client
            .send(
                RequestAction::StartRecord,
                &[Param::scalar(project_id), Param::scalar(task_id)],
                true,
            )
            .await?;

        if let Some(id) = created_id(&items) {
            return Ok(id);
        }

        // IDが返ってこないサーバーでは最新のレコードから探す
        self.get_current()
            .await?
            .map(|entry| entry.id)
            .ok_or_else(|| KimaiError::Decode("started record could not be found".to_string()))
    }

    async fn stop(&self, id: RecordId) -> KimaiResult<()> {
        self.client
            .send(RequestAction::StopRecord, &[Param::scalar(id)], true)
            .await?;

        Ok(())
    }

    async fn add(&self, entry: NewEntry) -> KimaiResult<RecordId> {
        let payload = RecordPayload {
            id: None,
            start: datetime::to_wire(&entry.start),
            end: Some(datetime::to_wire(&entry.end)),
            project_id: entry.project_id,
            task_id: entry.task_id,
            status_id: 1,
            comment: entry.comment,
        };
        let items = self.set_record(vec![record_param(&payload)?]).await?;

        created_id(&items)
            .ok_or_else(|| KimaiError::Decode("created record has no id".to_string()))
    }

    async fn edit(&self, id: RecordId, changes: EntryChanges) -> KimaiResult<()> {
        self.authorize(id).await?;

        let existing = self.get_single(id).await?;
        let payload = merge_changes(&existing, &changes);
        self.set_record(vec![record_param(&payload)?, Param::Bool(true)])
            .await?;
        info!("Record {} updated", id);

        Ok(())
    }

    async fn comment(&self, id: RecordId, comment: String) -> KimaiResult<()> {
        self.edit(id, EntryChanges::comment(comment)).await
    }

    async fn delete(&self, id: RecordId) -> KimaiResult<()> {
        self.authorize(id).await?;

        self.client
            .send(
                RequestAction::RemoveTimesheetRecord,
                &[Param::scalar(id)],
                true,
            )
            .await?;
        info!("Record {} deleted", id);

        Ok(())
    }

    /// Kimai APIは編集時に持ち主を確認しないため、ここで確認する。
    ///
    /// 対象レコードのユーザーIDと、APIキーで取得できる最新レコードのユーザーIDを比較する。
    async fn authorize(&self, id: RecordId) -> KimaiResult<Entry> {
        let cached = self.authorizations.borrow().get(&id).cloned();
        let authorization = match cached {
            Some(authorization) => authorization,
            None => {
                let record = self.get_single(id).await?;
                let authorization = match self.current_user_id().await? {
                    Some(user_id) if user_id == record.user_id => Authorization::Granted(record),
                    _ => Authorization::Denied,
                };
                self.authorizations
                    .borrow_mut()
                    .insert(id, authorization.clone());
                authorization
            }
        };

        match authorization {
            Authorization::Granted(record) => Ok(record),
            Authorization::Denied => {
                warn!("Record {} belongs to another user", id);
                Err(KimaiError::Unauthorized(id))
            }
        }
    }
}

/// 複数のレコードを順に削除する。
///
/// 途中で失敗しても残りのレコードの削除を続け、IDごとの結果を返す。
pub async fn delete_all<R: RecordRepository>(
    repository: &R,
    ids: &[RecordId],
) -> Vec<(RecordId, KimaiResult<()>)> {
    let mut results = Vec::with_capacity(ids.len());

    for &id in ids {
        let result = repository.delete(id).await;
        if let Err(e) = &result {
            warn!("Failed to delete record {}: {}", id, e);
        }
        results.push((id, result));
    }

    results
}
