use log::{debug, info, warn};

use crate::config::Config;
use crate::error::{KimaiError, KimaiResult};
use crate::record::{Entry, RecordId};
use crate::repository::RecordRepository;

/// 停止後のコメント書き込みの結果。
#[derive(Debug)]
pub enum CommentOutcome {
    /// 書き込むコメントが無かった。
    Skipped,
    Applied,
    /// 書き込みに失敗した。停止自体は成功している。
    Failed(KimaiError),
}

/// `stop`の結果。
#[derive(Debug)]
pub enum StopOutcome {
    /// 計測中のレコードが無かった。
    NothingRunning,
    Stopped { id: RecordId, comment: CommentOutcome },
}

/// 計測中のレコードのライフサイクルを扱う。
///
/// ローカルの`CurrentEntry`は古い可能性があるため、認可が必要な操作では
/// 必ずサーバーに問い合わせ直す。
pub struct RecordingSession<'a, R: RecordRepository> {
    repository: &'a R,
    config: &'a mut Config,
}

impl<'a, R: RecordRepository> RecordingSession<'a, R> {
    /// 新しい`RecordingSession`を返す。
    ///
    /// # Arguments
    /// * `repository` - レコードを操作するためのリポジトリ
    /// * `config` - 計測中のレコードとコメントを保存するストア
    pub fn new(repository: &'a R, config: &'a mut Config) -> Self {
        Self { repository, config }
    }

    /// 計測を開始する。
    ///
    /// 成功した場合は作成されたレコードのIDを保存し、保留中のコメントを`comment`で置き換える。
    /// 既に計測中でも止めない。
    pub async fn start(
        &mut self,
        project_id: u64,
        task_id: u64,
        comment: Option<&str>,
    ) -> KimaiResult<RecordId> {
        let id = self.repository.start(project_id, task_id).await?;
        info!("Started record {}", id);

        self.config.set_current_entry(id)?;
        match comment {
            Some(comment) => self.config.set_pending_comment(comment)?,
            None => self.config.clear_pending_comment(),
        }

        Ok(id)
    }

    /// 計測中のレコードを停止する。
    ///
    /// 停止に成功した場合、保留中のコメントを書き込んでから
    /// 保存しているIDとコメントを削除する。コメントの書き込みに失敗しても停止は成功とする。
    pub async fn stop(&mut self) -> KimaiResult<StopOutcome> {
        let had_pointer = self.config.current_entry().is_some();
        let Some(id) = self.resolve_running().await? else {
            if had_pointer {
                debug!("Clearing stale session state");
                self.clear();
            }
            return Ok(StopOutcome::NothingRunning);
        };

        self.repository.stop(id).await?;
        info!("Stopped record {}", id);

        let comment = match self.config.pending_comment() {
            Some(comment) => match self.repository.comment(id, comment).await {
                Ok(()) => CommentOutcome::Applied,
                Err(e) => {
                    warn!("Failed to save comment on record {}: {}", id, e);
                    CommentOutcome::Failed(e)
                }
            },
            None => CommentOutcome::Skipped,
        };
        self.clear();

        Ok(StopOutcome::Stopped { id, comment })
    }

    /// 停止時に書き込むコメントを設定する。計測中でなければエラーにする。
    pub fn set_pending_comment(&mut self, comment: &str) -> KimaiResult<()> {
        if self.config.current_entry().is_none() {
            return Err(KimaiError::NoRunningRecord);
        }

        self.config.set_pending_comment(comment)
    }

    /// 計測中のレコードを返す。保留中のコメントがあればそれを表示用に使う。
    pub async fn current(&self) -> KimaiResult<Option<Entry>> {
        let current = self.repository.get_current().await?;

        Ok(current.map(|mut entry| {
            if let Some(comment) = self.config.pending_comment() {
                entry.comment = comment;
            }
            entry
        }))
    }

    /// 停止対象のレコードを決める。
    ///
    /// 保存済みのIDは持ち主を確認してから使う。見つからないか既に終了している場合は
    /// 古い情報として扱い、サーバー上の最新のレコードから探し直す。
    async fn resolve_running(&self) -> KimaiResult<Option<RecordId>> {
        if let Some(id) = self.config.current_entry() {
            match self.repository.authorize(id).await {
                Ok(entry) if entry.is_running() => return Ok(Some(id)),
                Ok(_) => debug!("Record {} is already stopped", id),
                Err(KimaiError::NotFound(_)) => debug!("Record {} no longer exists", id),
                Err(e) => return Err(e),
            }
        }

        Ok(self.repository.get_current().await?.map(|entry| entry.id))
    }

    fn clear(&mut self) {
        self.config.clear_pending_comment();
        self.config.clear_current_entry();
    }
}
