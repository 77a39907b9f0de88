use anyhow::{Context, Result};
use log::info;

use crate::cache::Cache;
use crate::config::{Config, Paths};
use crate::console::ConsolePresenter;
use crate::store;
use crate::sync::Session;
use crate::toggl::TogglRepository;

/// 設定を表示・変更するためのサブコマンド。
#[derive(Debug, Default, clap::Args)]
pub struct OptionsArgs {
    #[clap(long = "rounding", help = "Round report durations up to this many minutes; 0 disables")]
    rounding: Option<u32>,

    #[clap(long = "default-project", help = "Project for new entries (ID or name), or 'none'")]
    default_project: Option<String>,

    #[clap(long = "duration-only", help = "Continue today's entries instead of creating new ones")]
    duration_only: Option<bool>,

    #[clap(long = "hours-minutes", help = "Show durations as H:MM")]
    hours_minutes: Option<bool>,

    #[clap(long = "ask-for-project", help = "Require a project when starting an entry")]
    ask_for_project: Option<bool>,

    #[clap(long = "test-mode", help = "Never refresh the cache automatically")]
    test_mode: Option<bool>,
}

/// APIトークンを保存するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct TokenArgs {
    #[clap(help = "API token from the Toggl profile page")]
    token: String,
}

/// リモートと全体を同期する。
pub struct SyncCommand<'a, T: TogglRepository> {
    session: Session<'a, T>,
}

impl<'a, T: TogglRepository> SyncCommand<'a, T> {
    pub fn new(session: Session<'a, T>) -> Self {
        Self { session }
    }

    /// `sync`サブコマンドの処理を行う。テストモードでも同期する。
    pub async fn run<P: ConsolePresenter>(&mut self, presenter: &mut P) -> Result<()> {
        self.session.full_refresh().await?;

        let account = &self.session.cache().account;
        presenter.show_message(&format!(
            "Synced {} time entries, {} projects and {} tags",
            account.time_entries.len(),
            account.projects.len(),
            account.tags.len()
        ))
    }
}

/// リモートを使わずに、設定ファイルとキャッシュファイルを操作する。
pub struct SettingsCommand<'a> {
    paths: &'a Paths,
    config: Config,
}

impl<'a> SettingsCommand<'a> {
    /// 新しい`SettingsCommand`を返す。
    ///
    /// # Arguments
    /// * `paths` - 設定ファイルとキャッシュファイルの場所
    /// * `config` - 読み込み済みの設定
    pub fn new(paths: &'a Paths, config: Config) -> Self {
        Self { paths, config }
    }

    fn save(&self) -> Result<()> {
        store::save_json(&self.paths.config_file, &self.config).context("Failed to save config")
    }

    /// `options`サブコマンドの処理を行う。
    ///
    /// 指定された項目を変更して保存し、全ての設定を表示する。
    pub fn options<P: ConsolePresenter>(mut self, args: OptionsArgs, presenter: &mut P) -> Result<Config> {
        let cache: Cache = store::load_json(&self.paths.cache_file);
        let mut changed = false;

        if let Some(rounding) = args.rounding {
            self.config.rounding = rounding;
            changed = true;
        }
        if let Some(key) = args.default_project {
            self.config.default_project_id = if key.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(cache.find_project(&key)?.id)
            };
            changed = true;
        }
        for (value, field) in [
            (args.duration_only, &mut self.config.duration_only),
            (args.hours_minutes, &mut self.config.hours_minutes),
            (args.ask_for_project, &mut self.config.ask_for_project),
            (args.test_mode, &mut self.config.test_mode),
        ] {
            if let Some(value) = value {
                *field = value;
                changed = true;
            }
        }

        if changed {
            self.save()?;
            info!("Options saved");
        }

        let rounding = match self.config.rounding {
            0 => "Not rounding".to_string(),
            minutes => format!("{} minute increments", minutes),
        };
        let default_project = match self.config.default_project_id {
            Some(id) => match cache.project(id) {
                Some(project) => format!("{} [{}]", project.name, id),
                None => format!("[{}]", id),
            },
            None => "<None>".to_string(),
        };
        presenter.show_message(&format!("rounding: {}", rounding))?;
        presenter.show_message(&format!("defaultProject: {}", default_project))?;
        presenter.show_message(&format!("durationOnly: {}", self.config.duration_only))?;
        presenter.show_message(&format!("hoursMinutes: {}", self.config.hours_minutes))?;
        presenter.show_message(&format!("askForProject: {}", self.config.ask_for_project))?;
        presenter.show_message(&format!("testMode: {}", self.config.test_mode))?;

        Ok(self.config)
    }

    /// `token`サブコマンドの処理を行う。保存した設定を返す。
    pub fn token<P: ConsolePresenter>(mut self, args: TokenArgs, presenter: &mut P) -> Result<Config> {
        self.config.api_key = args.token.trim().to_string();
        self.save()?;
        presenter.show_message("API token saved")?;

        Ok(self.config)
    }

    /// `logout`サブコマンドの処理を行う。
    pub fn logout<P: ConsolePresenter>(mut self, presenter: &mut P) -> Result<()> {
        self.config.api_key.clear();
        self.save()?;
        presenter.show_message("You are now logged out of Toggl")
    }

    /// `reset`サブコマンドの処理を行う。設定ファイルとキャッシュファイルを削除する。
    pub fn reset<P: ConsolePresenter>(self, presenter: &mut P) -> Result<()> {
        store::remove_file(&self.paths.config_file)?;
        store::remove_file(&self.paths.cache_file)?;
        presenter.show_message("Local data cleared")
    }
}
