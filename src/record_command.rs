use std::io::Write;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use log::info;

use crate::config::Config;
use crate::console::{total_duration, ConsolePresenter, ConsoleTable};
use crate::dates;
use crate::favorites;
use crate::record::RecordId;
use crate::repository::{delete_all, EntryChanges, NewEntry, RecordRepository};
use crate::session::{CommentOutcome, RecordingSession, StopOutcome};

/// `start`サブコマンドの引数。
#[derive(Debug, Default, clap::Args)]
pub struct StartArgs {
    #[clap(short = 't', long = "task-id")]
    pub task_id: Option<u64>,

    #[clap(short = 'p', long = "project-id")]
    pub project_id: Option<u64>,

    #[clap(short = 'f', long = "favorite", help = "Name of a saved favorite")]
    pub favorite: Option<String>,

    #[clap(
        short = 'c',
        long = "comment",
        help = "Comment saved on the record when it is stopped"
    )]
    pub comment: Option<String>,
}

/// 計測中のレコードへのコメントの引数。
#[derive(Debug, clap::Args)]
pub struct PendingCommentArgs {
    #[clap(
        short = 'c',
        long = "comment",
        help = "Overrides any comment set before"
    )]
    pub comment: String,
}

/// `record add`サブコマンドの引数。
#[derive(Debug, Default, clap::Args)]
pub struct AddArgs {
    #[clap(short = 's', long = "start-time")]
    pub start_time: Option<String>,

    #[clap(short = 'e', long = "end-time")]
    pub end_time: Option<String>,

    #[clap(
        short = 'l',
        long = "last-entry-id",
        help = "ID of the last entry this record should snap to"
    )]
    pub last_entry_id: Option<u64>,

    #[clap(short = 'd', long = "duration", help = "Duration like 1h30m")]
    pub duration: Option<String>,

    #[clap(short = 'p', long = "project-id")]
    pub project_id: Option<u64>,

    #[clap(short = 't', long = "task-id")]
    pub task_id: Option<u64>,

    #[clap(short = 'f', long = "favorite")]
    pub favorite: Option<String>,

    #[clap(short = 'c', long = "comment", default_value = "")]
    pub comment: String,
}

/// `record edit`サブコマンドの引数。
#[derive(Debug, Default, clap::Args)]
pub struct EditArgs {
    #[clap(short = 'i', long = "id")]
    pub id: u64,

    #[clap(short = 's', long = "start-time")]
    pub start_time: Option<String>,

    #[clap(short = 'e', long = "end-time")]
    pub end_time: Option<String>,

    #[clap(
        short = 'l',
        long = "last-entry-id",
        help = "ID of the last entry this record should snap to"
    )]
    pub last_entry_id: Option<u64>,

    #[clap(short = 'p', long = "project-id")]
    pub project_id: Option<u64>,

    #[clap(short = 't', long = "task-id")]
    pub task_id: Option<u64>,

    #[clap(short = 'f', long = "favorite")]
    pub favorite: Option<String>,

    #[clap(short = 'c', long = "comment")]
    pub comment: Option<String>,
}

/// `record delete`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct DeleteArgs {
    #[clap(short = 'i', long = "id", required = true)]
    pub ids: Vec<u64>,
}

/// `record comment`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct RecordCommentArgs {
    #[clap(short = 'i', long = "id")]
    pub id: u64,

    #[clap(
        short = 'c',
        long = "comment",
        help = "Overwrites any comment that was already present"
    )]
    pub comment: String,
}

/// `record`サブコマンド群。
#[derive(Debug, clap::Subcommand)]
pub enum RecordCommands {
    /// Start a new time recording
    Start(StartArgs),
    /// Stop the currently running recording (if there is one)
    Stop,
    /// Get the currently running time recording
    GetCurrent,
    /// Return all recorded entries for today
    GetToday,
    /// Add a finished record
    Add(AddArgs),
    /// Edit a record
    Edit(EditArgs),
    /// Delete one or more records
    Delete(DeleteArgs),
    /// Set the comment of a record
    Comment(RecordCommentArgs),
}

/// レコードを操作するサブコマンドの処理を行う。
pub struct RecordCommand<'a, R: RecordRepository, W: Write> {
    repository: &'a R,
    config: &'a mut Config,
    out: &'a mut W,
}

impl<'a, R: RecordRepository, W: Write> RecordCommand<'a, R, W> {
    /// 新しい`RecordCommand`を返す。
    ///
    /// # Arguments
    /// * `repository` - Kimai APIと通信するためのリポジトリ
    /// * `config` - ローカルの状態
    /// * `out` - 結果の出力先
    pub fn new(repository: &'a R, config: &'a mut Config, out: &'a mut W) -> Self {
        Self {
            repository,
            config,
            out,
        }
    }

    pub async fn run(&mut self, command: RecordCommands) -> Result<()> {
        match command {
            RecordCommands::Start(args) => self.start(args).await,
            RecordCommands::Stop => self.stop().await,
            RecordCommands::GetCurrent => self.get_current().await,
            RecordCommands::GetToday => self.today().await,
            RecordCommands::Add(args) => self.add(args).await,
            RecordCommands::Edit(args) => self.edit(args).await,
            RecordCommands::Delete(args) => self.delete(args).await,
            RecordCommands::Comment(args) => self.comment_on_record(args).await,
        }
    }

    /// 計測を開始する。
    pub async fn start(&mut self, args: StartArgs) -> Result<()> {
        let (project_id, task_id) = resolve_target(
            self.config,
            args.favorite.as_deref(),
            args.project_id,
            args.task_id,
        )?;

        let id = RecordingSession::new(self.repository, self.config)
            .start(project_id, task_id, args.comment.as_deref())
            .await
            .context("Could not start recording")?;

        writeln!(
            self.out,
            "Started recording {}. To stop recording type 'kimai stop'",
            id
        )?;
        Ok(())
    }

    /// 計測中のレコードを停止する。
    pub async fn stop(&mut self) -> Result<()> {
        let outcome = RecordingSession::new(self.repository, self.config)
            .stop()
            .await
            .context("Could not stop recording")?;

        match outcome {
            StopOutcome::NothingRunning => writeln!(self.out, "No recording running.")?,
            StopOutcome::Stopped { id, comment } => {
                writeln!(self.out, "Stopped recording {}.", id)?;
                if let CommentOutcome::Failed(e) = comment {
                    eprintln!("The comment could not be saved: {}", e);
                }
            }
        }

        Ok(())
    }

    /// 計測中のレコードにコメントを付ける。コメントは停止時に保存される。
    pub fn comment_on_current(&mut self, args: PendingCommentArgs) -> Result<()> {
        RecordingSession::new(self.repository, self.config).set_pending_comment(&args.comment)?;

        Ok(())
    }

    pub async fn get_current(&mut self) -> Result<()> {
        let current = RecordingSession::new(self.repository, self.config)
            .current()
            .await
            .context("Failed to retrieve the current record")?;

        match current {
            Some(entry) => ConsoleTable::new(self.out).show_records(&[entry])?,
            None => writeln!(self.out, "No recording running.")?,
        }

        Ok(())
    }

    /// Localタイムゾーンで今日のレコードと合計時間を表示する。
    pub async fn today(&mut self) -> Result<()> {
        let records = self
            .repository
            .get_today()
            .await
            .context("Failed to retrieve records")?;
        info!("Records retrieved successfully.");

        ConsoleTable::new(self.out).show_records(&records)?;
        writeln!(self.out, "Total: {}", total_duration(&records))?;
        Ok(())
    }

    /// 終了済みのレコードを追加する。
    ///
    /// 日時の解釈は通信の前に行い、失敗した場合は何も送らない。
    pub async fn add(&mut self, args: AddArgs) -> Result<()> {
        if args.start_time.is_none() && args.last_entry_id.is_none() {
            bail!("Need either a start time or the id of the previous record.");
        }

        let (project_id, task_id) = resolve_target(
            self.config,
            args.favorite.as_deref(),
            args.project_id,
            args.task_id,
        )?;
        let start_time = args
            .start_time
            .as_deref()
            .map(|expression| dates::parse_required(expression, None))
            .transpose()?;
        let end_time = match (&args.duration, &args.end_time) {
            (Some(duration), _) => {
                // 開始時刻が決まる前に書式だけ確認しておく
                let offset = format!("+{}", duration);
                dates::parse_required(&offset, None)?;
                EndTime::After(offset)
            }
            (None, Some(expression)) => EndTime::At(dates::parse_required(expression, None)?),
            (None, None) => bail!("Need either an end time or a duration."),
        };

        let start = match args.last_entry_id {
            Some(id) => self.end_of(RecordId(id)).await?,
            None => start_time
                .context("Need either a start time or the id of the previous record.")?
                .to_utc(),
        };
        let end = match end_time {
            EndTime::At(end) => end.to_utc(),
            EndTime::After(offset) => {
                dates::parse_required(&offset, Some(start.with_timezone(&Local)))?.to_utc()
            }
        };

        let id = self
            .repository
            .add(NewEntry {
                start,
                end,
                project_id,
                task_id,
                comment: args.comment,
            })
            .await
            .context("Could not add record")?;

        writeln!(self.out, "{}", id)?;
        Ok(())
    }

    /// レコードを編集する。指定しなかった項目はそのまま残す。
    pub async fn edit(&mut self, args: EditArgs) -> Result<()> {
        let id = RecordId(args.id);
        let start_time = args
            .start_time
            .as_deref()
            .map(|expression| dates::parse_required(expression, None))
            .transpose()?;
        let end_time = args
            .end_time
            .as_deref()
            .map(|expression| dates::parse_required(expression, None))
            .transpose()?;
        let (project_id, task_id) = match args.favorite.as_deref() {
            Some(name) => {
                let (project_id, task_id) = favorites::resolve(self.config, name)?;
                (Some(project_id), Some(task_id))
            }
            None => (args.project_id, args.task_id),
        };

        let start = match args.last_entry_id {
            Some(last) => Some(self.end_of(RecordId(last)).await?),
            None => start_time.map(|start| start.to_utc()),
        };

        self.repository
            .edit(
                id,
                EntryChanges {
                    start,
                    end: end_time.map(|end| end.to_utc()),
                    project_id,
                    task_id,
                    comment: args.comment,
                },
            )
            .await
            .with_context(|| format!("Could not update record {}", id))?;

        writeln!(self.out, "Successfully updated record {}", id)?;
        Ok(())
    }

    /// 複数のレコードを削除する。失敗したIDがあっても残りは削除する。
    pub async fn delete(&mut self, args: DeleteArgs) -> Result<()> {
        let ids: Vec<RecordId> = args.ids.into_iter().map(RecordId).collect();
        let results = delete_all(self.repository, &ids).await;

        let mut failed = 0;
        for (id, result) in &results {
            match result {
                Ok(()) => writeln!(self.out, "Record {} successfully deleted", id)?,
                Err(e) => {
                    eprintln!("Could not delete record {}: {}", id, e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(anyhow!(
                "{} of {} records could not be deleted",
                failed,
                results.len()
            ));
        }
        Ok(())
    }

    /// 既存のレコードのコメントを書き換える。
    pub async fn comment_on_record(&mut self, args: RecordCommentArgs) -> Result<()> {
        let id = RecordId(args.id);
        self.repository
            .comment(id, args.comment)
            .await
            .with_context(|| format!("Could not comment on record {}", id))?;

        writeln!(self.out, "Successfully updated record {}", id)?;
        Ok(())
    }

    /// 指定したレコードの終了時刻を返す。計測中のレコードには続けられない。
    async fn end_of(&self, id: RecordId) -> Result<DateTime<Utc>> {
        let last = self
            .repository
            .get_single(id)
            .await
            .with_context(|| format!("Failed to retrieve record {}", id))?;

        last.end
            .with_context(|| format!("Record {} is still running", id))
    }
}

/// 終了時刻の指定方法。
enum EndTime {
    At(DateTime<Local>),
    /// 開始時刻からの相対指定。
    After(String),
}

/// お気に入り、またはプロジェクトIDとタスクIDから記録先を決める。
fn resolve_target(
    config: &Config,
    favorite: Option<&str>,
    project_id: Option<u64>,
    task_id: Option<u64>,
) -> Result<(u64, u64)> {
    if let Some(name) = favorite {
        return Ok(favorites::resolve(config, name)?);
    }

    match (project_id, task_id) {
        (Some(project_id), Some(task_id)) => Ok((project_id, task_id)),
        _ => bail!("Need either a favorite or both a project id and a task id."),
    }
}
