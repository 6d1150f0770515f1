use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};
use log::info;

use crate::config::{Config, PROJECTS, TASKS};
use crate::console::{ConsolePresenter, ConsoleTable};
use crate::repository::KimaiRepository;

/// `projects`と`tasks`のサブコマンド。
#[derive(Debug, clap::Subcommand)]
pub enum CatalogCommands {
    /// List all available entries
    List,
    /// Download all entries to the config so they can be looked up by name
    Download,
}

/// 一覧の種類。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Catalog {
    Projects,
    Tasks,
}

/// プロジェクトとタスクの一覧を扱う。
pub struct CatalogCommand<'a, W: Write> {
    repository: &'a KimaiRepository,
    config: &'a mut Config,
    out: &'a mut W,
}

impl<'a, W: Write> CatalogCommand<'a, W> {
    /// 新しい`CatalogCommand`を返す。
    pub fn new(repository: &'a KimaiRepository, config: &'a mut Config, out: &'a mut W) -> Self {
        Self {
            repository,
            config,
            out,
        }
    }

    pub async fn run(&mut self, catalog: Catalog, command: CatalogCommands) -> Result<()> {
        match (catalog, command) {
            (Catalog::Projects, CatalogCommands::List) => self.list_projects().await,
            (Catalog::Projects, CatalogCommands::Download) => self.download_projects().await,
            (Catalog::Tasks, CatalogCommands::List) => self.list_tasks().await,
            (Catalog::Tasks, CatalogCommands::Download) => self.download_tasks().await,
        }
    }

    pub async fn list_projects(&mut self) -> Result<()> {
        let projects = self
            .repository
            .get_projects()
            .await
            .context("Failed to get project list from kimai")?;
        let rows: Vec<Vec<String>> = projects
            .into_iter()
            .map(|project| {
                vec![
                    project.id.to_string(),
                    project.name,
                    project.customer_name,
                ]
            })
            .collect();

        ConsoleTable::new(self.out).show_rows(&["Id", "Name", "Customer"], &rows)
    }

    /// プロジェクト一覧を`(顧客名) プロジェクト名`をキーにして設定に保存する。
    pub async fn download_projects(&mut self) -> Result<()> {
        let projects = self
            .repository
            .get_projects()
            .await
            .context("Failed to get project list from kimai")?;
        let project_map: BTreeMap<String, u64> = projects
            .iter()
            .map(|project| (project.display_key(), project.id))
            .collect();
        info!("Downloaded {} projects", project_map.len());

        self.config.set(PROJECTS, project_map)?;
        writeln!(self.out, "Successfully downloaded projects.")?;
        Ok(())
    }

    pub async fn list_tasks(&mut self) -> Result<()> {
        let tasks = self
            .repository
            .get_tasks()
            .await
            .context("Failed to get task list from kimai")?;
        let rows: Vec<Vec<String>> = tasks
            .into_iter()
            .map(|task| vec![task.id.to_string(), task.name])
            .collect();

        ConsoleTable::new(self.out).show_rows(&["Id", "Name"], &rows)
    }

    /// タスク一覧を名前をキーにして設定に保存する。
    pub async fn download_tasks(&mut self) -> Result<()> {
        let tasks = self
            .repository
            .get_tasks()
            .await
            .context("Failed to get task list from kimai")?;
        let task_map: BTreeMap<String, u64> =
            tasks.into_iter().map(|task| (task.name, task.id)).collect();
        info!("Downloaded {} tasks", task_map.len());

        self.config.set(TASKS, task_map)?;
        writeln!(self.out, "Successfully downloaded tasks.")?;
        Ok(())
    }
}
