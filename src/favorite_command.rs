use std::io::Write;

use anyhow::Result;

use crate::config::Config;
use crate::console::{ConsolePresenter, ConsoleTable};
use crate::favorites;
use crate::record_command::{RecordCommand, StartArgs};
use crate::repository::RecordRepository;

/// `favorites add`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct FavoriteAddArgs {
    #[clap(short = 'n', long = "name")]
    pub name: String,

    #[clap(short = 'p', long = "project-id")]
    pub project_id: u64,

    #[clap(short = 't', long = "task-id")]
    pub task_id: u64,
}

/// `favorites`サブコマンド群。
#[derive(Debug, clap::Subcommand)]
pub enum FavoriteCommands {
    /// List all favorites
    List,
    /// Add a favorite
    Add(FavoriteAddArgs),
    /// Delete a favorite
    Delete {
        #[clap(short = 'n', long = "name")]
        name: String,
    },
    /// Start a new record for a favorite
    Start {
        #[clap(short = 'n', long = "name")]
        name: String,

        #[clap(short = 'c', long = "comment")]
        comment: Option<String>,
    },
}

/// `favorites`サブコマンドの処理を行う。
pub async fn favorite_command<R: RecordRepository, W: Write>(
    command: FavoriteCommands,
    repository: &R,
    config: &mut Config,
    out: &mut W,
) -> Result<()> {
    match command {
        FavoriteCommands::List => {
            let rows: Vec<Vec<String>> = favorites::list(config)
                .into_iter()
                .map(|favorite| {
                    vec![
                        favorite.name,
                        favorite.project_id.to_string(),
                        favorite.task_id.to_string(),
                    ]
                })
                .collect();
            ConsoleTable::new(out).show_rows(&["Name", "Project", "Task"], &rows)?;
        }
        FavoriteCommands::Add(args) => {
            favorites::add(config, &args.name, args.project_id, args.task_id)?;
            writeln!(out, "Successfully added favorite \"{}\"", args.name)?;
        }
        FavoriteCommands::Delete { name } => {
            favorites::delete(config, &name)?;
            writeln!(out, "Successfully removed favorite \"{}\"", name)?;
        }
        FavoriteCommands::Start { name, comment } => {
            RecordCommand::new(repository, config, out)
                .start(StartArgs {
                    favorite: Some(name),
                    comment,
                    ..StartArgs::default()
                })
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::{favorite_command, FavoriteAddArgs, FavoriteCommands};
    use crate::config::Config;
    use crate::favorites;
    use crate::record::RecordId;
    use crate::repository::MockRecordRepository;

    #[tokio::test]
    async fn test_add_then_list() {
        let repository = MockRecordRepository::new();
        let mut config = Config::in_memory();
        let mut out = Vec::new();

        favorite_command(
            FavoriteCommands::Add(FavoriteAddArgs {
                name: "dev".to_string(),
                project_id: 7,
                task_id: 9,
            }),
            &repository,
            &mut config,
            &mut out,
        )
        .await
        .unwrap();
        favorite_command(FavoriteCommands::List, &repository, &mut config, &mut out)
            .await
            .unwrap();

        let output = String::from_utf8(out).unwrap();
        assert!(output.starts_with("Successfully added favorite \"dev\"\n"));
        assert!(output.contains("| dev  | 7       | 9    |"));
    }

    #[tokio::test]
    async fn test_delete_missing_favorite() {
        let repository = MockRecordRepository::new();
        let mut config = Config::in_memory();
        let mut out = Vec::new();

        let result = favorite_command(
            FavoriteCommands::Delete {
                name: "nope".to_string(),
            },
            &repository,
            &mut config,
            &mut out,
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_favorite() {
        let mut repository = MockRecordRepository::new();
        repository
            .expect_start()
            .with(eq(7), eq(9))
            .times(1)
            .returning(|_, _| Ok(RecordId(42)));
        let mut config = Config::in_memory();
        favorites::add(&mut config, "dev", 7, 9).unwrap();
        let mut out = Vec::new();

        favorite_command(
            FavoriteCommands::Start {
                name: "dev".to_string(),
                comment: Some("standup".to_string()),
            },
            &repository,
            &mut config,
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(config.current_entry(), Some(RecordId(42)));
        assert_eq!(config.pending_comment().as_deref(), Some("standup"));
    }
}
