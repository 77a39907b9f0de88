use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::{debug, LevelFilter};

mod account;
mod account_command;
mod cache;
mod config;
mod console;
mod datetime;
mod duration;
mod error;
mod project_command;
mod report;
mod report_command;
mod span;
mod store;
mod sync;
mod tag_command;
mod time_entry;
mod timer_command;
mod toggl;

use account_command::{OptionsArgs, SettingsCommand, SyncCommand, TokenArgs};
use config::{Config, Paths};
use console::ConsoleMarkdownList;
use error::MirrorError;
use project_command::{ProjectCommand, ProjectsArgs};
use report_command::{ReportArgs, ReportCommand};
use sync::Session;
use tag_command::{TagCommand, TagsArgs};
use timer_command::{EditArgs, StartArgs, StopArgs, TimerCommand, TimerIdArgs, TimersArgs};
use toggl::TogglClient;

/// Toggl Trackのアカウントをローカルにミラーし、集計や操作を行うCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- token <API_TOKEN>
/// $ cargo run -- report week --by-day
/// $ cargo run -- start "Write docs" --project Docs
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(
        long = "data-dir",
        global = true,
        help = "Keep config.json and cache.json in this directory"
    )]
    data_dir: Option<PathBuf>,

    #[clap(
        short = 'v',
        long = "verbose",
        global = true,
        parse(from_occurrences),
        help = "Log more; repeat for debug output"
    )]
    verbose: u64,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Refresh the local cache from Toggl
    Sync,
    /// Show the running entry and today's total
    Status,
    /// Summarize time entries over a span
    Report(ReportArgs),
    /// List time entries, newest first
    Timers(TimersArgs),
    /// Start a new time entry
    Start(StartArgs),
    /// Stop a time entry
    Stop(StopArgs),
    /// Continue a stopped time entry
    Continue(TimerIdArgs),
    /// Stop a running time entry or continue a stopped one
    Toggle(TimerIdArgs),
    /// Change a time entry
    Edit(EditArgs),
    /// Delete a time entry
    Delete(TimerIdArgs),
    /// List and change projects
    Projects(ProjectsArgs),
    /// List and change tags
    Tags(TagsArgs),
    /// Show or change options
    Options(OptionsArgs),
    /// Save an API token and sync
    Token(TokenArgs),
    /// Forget the API token
    Logout,
    /// Delete the local config and cache
    Reset,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(err) = run(args).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

/// ログの出力を設定する。
///
/// 既定では警告以上を出力し、`-v`でinfo、`-vv`でdebugまで出力する。
fn setup_logger(verbose: u64) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {} [{}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply()
        .context("Failed to set up logger")
}

/// キャッシュファイルを読み込み、リモートと通信するセッションを作成する。
fn open_session<'a>(
    client: &'a Result<TogglClient, MirrorError>,
    config: Config,
    paths: &Paths,
) -> Result<Session<'a, TogglClient>> {
    let client = client.as_ref().map_err(Clone::clone)?;
    Ok(Session::load(client, config, paths.cache_file.clone()))
}

async fn run(args: Args) -> Result<()> {
    setup_logger(args.verbose)?;

    let paths = match &args.data_dir {
        Some(dir) => Paths::in_dir(dir),
        None => Paths::from_system()?,
    };
    debug!("Using {:?}", paths);
    let config: Config = store::load_json(&paths.config_file);
    let client = config.api_token().map(|token| TogglClient::new(&token));

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let mut presenter = ConsoleMarkdownList::new(&mut stdout, config.rounding(), config.hours_minutes);

    match args.subcommand {
        SubCommands::Sync => {
            let session = open_session(&client, config, &paths)?;
            SyncCommand::new(session).run(&mut presenter).await?;
        }
        SubCommands::Status => {
            let session = open_session(&client, config, &paths)?;
            ReportCommand::new(session).status(&mut presenter).await?;
        }
        SubCommands::Report(report) => {
            let session = open_session(&client, config, &paths)?;
            ReportCommand::new(session).run(report, &mut presenter).await?;
        }
        SubCommands::Timers(timers) => {
            let session = open_session(&client, config, &paths)?;
            TimerCommand::new(session).list(timers, &mut presenter).await?;
        }
        SubCommands::Start(start) => {
            let session = open_session(&client, config, &paths)?;
            TimerCommand::new(session).start(start, &mut presenter).await?;
        }
        SubCommands::Stop(stop) => {
            let session = open_session(&client, config, &paths)?;
            TimerCommand::new(session).stop(stop, &mut presenter).await?;
        }
        SubCommands::Continue(id) => {
            let session = open_session(&client, config, &paths)?;
            TimerCommand::new(session).continue_entry(id, &mut presenter).await?;
        }
        SubCommands::Toggle(id) => {
            let session = open_session(&client, config, &paths)?;
            TimerCommand::new(session).toggle(id, &mut presenter).await?;
        }
        SubCommands::Edit(edit) => {
            let session = open_session(&client, config, &paths)?;
            TimerCommand::new(session).edit(edit, &mut presenter).await?;
        }
        SubCommands::Delete(id) => {
            let session = open_session(&client, config, &paths)?;
            TimerCommand::new(session).delete(id, &mut presenter).await?;
        }
        SubCommands::Projects(projects) => {
            let session = open_session(&client, config, &paths)?;
            ProjectCommand::new(session).run(projects, &mut presenter).await?;
        }
        SubCommands::Tags(tags) => {
            let session = open_session(&client, config, &paths)?;
            TagCommand::new(session).run(tags, &mut presenter).await?;
        }
        SubCommands::Options(options) => {
            SettingsCommand::new(&paths, config).options(options, &mut presenter)?;
        }
        SubCommands::Token(token) => {
            let config = SettingsCommand::new(&paths, config).token(token, &mut presenter)?;
            let client = Ok(TogglClient::new(&config.api_token()?));
            let session = open_session(&client, config, &paths)?;
            SyncCommand::new(session).run(&mut presenter).await?;
        }
        SubCommands::Logout => SettingsCommand::new(&paths, config).logout(&mut presenter)?,
        SubCommands::Reset => SettingsCommand::new(&paths, config).reset(&mut presenter)?,
    }

    Ok(())
}
