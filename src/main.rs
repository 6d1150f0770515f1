use std::io;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::{debug, LevelFilter};

mod catalog_command;
mod config;
mod configure_command;
mod console;
mod dates;
mod datetime;
mod error;
mod favorite_command;
mod favorites;
mod record;
mod record_command;
mod repository;
mod rpc;
mod session;

use catalog_command::{Catalog, CatalogCommand, CatalogCommands};
use config::{Config, API_KEY};
use configure_command::{configure_command, ConfigureArgs};
use error::KimaiError;
use favorite_command::{favorite_command, FavoriteCommands};
use record_command::{PendingCommentArgs, RecordCommand, RecordCommands, StartArgs};
use repository::KimaiRepository;
use rpc::KimaiClient;

/// Kimaiで作業時間を記録するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ kimai configure -k https://kimai.example.com -u alice -p secret
/// $ kimai start -f dev -c "code review"
/// $ kimai stop
/// $ kimai today
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    /// Print debug logs to stderr
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Configure the Kimai URL and credentials
    Configure(ConfigureArgs),
    /// Start a new time recording
    Start(StartArgs),
    /// Stop the currently running recording
    Stop,
    /// Set a comment that is saved when the current recording stops
    Comment(PendingCommentArgs),
    /// Show all records of today
    Today,
    /// Show the currently running recording
    GetCurrent,
    /// List or download projects
    Projects {
        #[clap(subcommand)]
        command: CatalogCommands,
    },
    /// List or download tasks
    Tasks {
        #[clap(subcommand)]
        command: CatalogCommands,
    },
    /// Manage time records
    Record {
        #[clap(subcommand)]
        command: RecordCommands,
    },
    /// Manage favorites
    Favorites {
        #[clap(subcommand)]
        command: FavoriteCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logger(args.verbose)?;

    let mut config = Config::load()?;
    let result = run(args.subcommand, &mut config).await;

    // コマンドが失敗しても、それまでの状態の変更は保存する
    let flushed = config.flush();
    result?;
    flushed?;

    Ok(())
}

/// stderrにログを出力する。
fn setup_logger(verbose: bool) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue);
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(io::stderr())
        .apply()
        .context("Failed to initialize logger")
}

/// サブコマンドを実行する。
async fn run(subcommand: SubCommands, config: &mut Config) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    debug!("Running {:?}", subcommand);

    match subcommand {
        SubCommands::Configure(args) => configure_command(args, config, &mut out).await,
        SubCommands::Start(args) => {
            let repository = connect(config)?;
            RecordCommand::new(&repository, config, &mut out)
                .start(args)
                .await
        }
        SubCommands::Stop => {
            let repository = connect(config)?;
            RecordCommand::new(&repository, config, &mut out).stop().await
        }
        SubCommands::Comment(args) => {
            let repository = connect(config)?;
            RecordCommand::new(&repository, config, &mut out).comment_on_current(args)
        }
        SubCommands::Today => {
            let repository = connect(config)?;
            RecordCommand::new(&repository, config, &mut out).today().await
        }
        SubCommands::GetCurrent => {
            let repository = connect(config)?;
            RecordCommand::new(&repository, config, &mut out)
                .get_current()
                .await
        }
        SubCommands::Projects { command } => {
            let repository = connect(config)?;
            CatalogCommand::new(&repository, config, &mut out)
                .run(Catalog::Projects, command)
                .await
        }
        SubCommands::Tasks { command } => {
            let repository = connect(config)?;
            CatalogCommand::new(&repository, config, &mut out)
                .run(Catalog::Tasks, command)
                .await
        }
        SubCommands::Record { command } => {
            let repository = connect(config)?;
            RecordCommand::new(&repository, config, &mut out)
                .run(command)
                .await
        }
        SubCommands::Favorites { command } => {
            let repository = connect(config)?;
            favorite_command(command, &repository, config, &mut out).await
        }
    }
}

/// 設定からKimaiに接続するリポジトリを作る。APIキーが無い場合は何もさせない。
fn connect(config: &Config) -> Result<KimaiRepository> {
    if config.api_key().is_none() {
        return Err(KimaiError::NotConfigured(API_KEY).into());
    }

    Ok(KimaiRepository::new(KimaiClient::from_config(config)?))
}
