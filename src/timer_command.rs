use anyhow::Result;
use log::info;

use crate::console::ConsolePresenter;
use crate::datetime;
use crate::error::MirrorError;
use crate::sync::{Session, Toggled};
use crate::time_entry::TimeEntry;
use crate::toggl::TogglRepository;

/// time entryを一覧するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct TimersArgs {
    #[clap(help = "Only entries whose description contains this text")]
    query: Option<String>,

    #[clap(
        long = "project",
        conflicts_with = "tag",
        help = "The latest entry of each description in this project (ID or name)"
    )]
    project: Option<String>,

    #[clap(long = "tag", help = "Only entries with this tag (ID or name)")]
    tag: Option<String>,

    #[clap(long = "limit", default_value = "20", help = "Maximum number of entries to show")]
    limit: usize,
}

/// time entryを開始するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct StartArgs {
    description: String,

    #[clap(long = "project", help = "Project of the new entry (ID or name)")]
    project: Option<String>,

    #[clap(long = "tag", help = "Tag of the new entry; may be repeated")]
    tags: Vec<String>,
}

/// time entryを停止するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct StopArgs {
    #[clap(help = "Entry to stop; the running entry when omitted")]
    id: Option<i64>,
}

/// 1件のtime entryを指定するサブコマンド。
#[derive(Debug, clap::Args)]
pub struct TimerIdArgs {
    id: i64,
}

/// time entryを編集するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct EditArgs {
    id: i64,

    #[clap(long = "description")]
    description: Option<String>,

    #[clap(long = "project", help = "New project (ID or name)")]
    project: Option<String>,

    #[clap(long = "no-project", conflicts_with = "project", help = "Remove the project")]
    no_project: bool,

    #[clap(long = "tag", help = "Tag to add; may be repeated")]
    add_tags: Vec<String>,

    #[clap(long = "untag", help = "Tag to remove; may be repeated")]
    remove_tags: Vec<String>,
}

pub struct TimerCommand<'a, T: TogglRepository> {
    session: Session<'a, T>,
}

impl<'a, T: TogglRepository> TimerCommand<'a, T> {
    /// 新しい`TimerCommand`を返す。
    ///
    /// # Arguments
    /// * `session` - ミラーとリモートを束ねるセッション
    pub fn new(session: Session<'a, T>) -> Self {
        Self { session }
    }

    /// `timers`サブコマンドの処理を行う。
    ///
    /// ミラーから条件に合うtime entryを新しい順に表示する。
    pub async fn list<P: ConsolePresenter>(&mut self, args: TimersArgs, presenter: &mut P) -> Result<Vec<i64>> {
        self.session.refresh_if_stale().await;

        let cache = self.session.cache();
        let mut entries = match (&args.project, &args.tag) {
            (Some(project), _) => cache.latest_entries_for_project(cache.find_project(project)?.id),
            (None, Some(tag)) => cache.entries_with_tag(&cache.find_tag(tag)?.name),
            (None, None) => cache.time_entries_matching(args.query.as_deref().unwrap_or_default()),
        };
        if let Some(query) = args.query.as_deref().filter(|_| args.project.is_some() || args.tag.is_some()) {
            let query = query.to_lowercase();
            entries.retain(|entry| entry.description.to_lowercase().contains(&query));
        }
        entries.truncate(args.limit);

        if entries.is_empty() {
            presenter.show_message("No matching time entries")?;
        } else {
            presenter.show_time_entries(cache, &entries, datetime::now())?;
        }

        Ok(entries.iter().map(|entry| entry.id).collect())
    }

    /// `start`サブコマンドの処理を行う。
    pub async fn start<P: ConsolePresenter>(&mut self, args: StartArgs, presenter: &mut P) -> Result<TimeEntry> {
        self.session.refresh_if_stale().await;

        let project_id = match &args.project {
            Some(project) => Some(self.session.cache().find_project(project)?.id),
            None => None,
        };
        let entry = self.session.start(&args.description, project_id, args.tags).await?;
        presenter.show_message(&format!("Started '{}'", entry.description))?;

        Ok(entry)
    }

    /// `stop`サブコマンドの処理を行う。
    ///
    /// idが指定されない場合は実行中のtime entryを停止する。
    pub async fn stop<P: ConsolePresenter>(&mut self, args: StopArgs, presenter: &mut P) -> Result<Option<TimeEntry>> {
        self.session.refresh_if_stale().await;

        let id = match args.id.or_else(|| self.session.cache().running_entry().map(|entry| entry.id)) {
            Some(id) => id,
            None => {
                presenter.show_message("No timers currently running")?;
                return Ok(None);
            }
        };
        let entry = self.session.stop(id).await?;
        presenter.show_message(&format!("Stopped '{}'", entry.description))?;

        Ok(Some(entry))
    }

    /// `continue`サブコマンドの処理を行う。
    pub async fn continue_entry<P: ConsolePresenter>(
        &mut self,
        args: TimerIdArgs,
        presenter: &mut P,
    ) -> Result<TimeEntry> {
        self.session.refresh_if_stale().await;

        let entry = self.session.continue_entry(args.id).await?;
        presenter.show_message(&format!("Continued '{}'", entry.description))?;

        Ok(entry)
    }

    /// `toggle`サブコマンドの処理を行う。
    pub async fn toggle<P: ConsolePresenter>(&mut self, args: TimerIdArgs, presenter: &mut P) -> Result<TimeEntry> {
        self.session.refresh_if_stale().await;

        let (toggled, entry) = self.session.toggle(args.id).await?;
        let message = match toggled {
            Toggled::Started => format!("Started '{}'", entry.description),
            Toggled::Stopped => format!("Stopped '{}'", entry.description),
        };
        presenter.show_message(&message)?;

        Ok(entry)
    }

    /// `edit`サブコマンドの処理を行う。
    ///
    /// 指定された項目だけを変更し、time entry全体を送信する。
    pub async fn edit<P: ConsolePresenter>(&mut self, args: EditArgs, presenter: &mut P) -> Result<TimeEntry> {
        self.session.refresh_if_stale().await;

        let cache = self.session.cache();
        let mut entry = cache
            .time_entry(args.id)
            .cloned()
            .ok_or(MirrorError::UnknownTimeEntry(args.id))?;
        if let Some(description) = args.description {
            entry.description = description;
        }
        if args.no_project {
            entry.project_id = None;
        } else if let Some(project) = &args.project {
            entry.project_id = Some(cache.find_project(project)?.id);
        }
        for tag in &args.add_tags {
            entry.add_tag(tag);
        }
        for tag in &args.remove_tags {
            entry.remove_tag(tag);
        }
        info!("Editing time entry {}", entry.id);

        let entry = self.session.update_time_entry(entry).await?;
        presenter.show_message(&format!("Updated '{}'", entry.description))?;

        Ok(entry)
    }

    /// `delete`サブコマンドの処理を行う。
    pub async fn delete<P: ConsolePresenter>(&mut self, args: TimerIdArgs, presenter: &mut P) -> Result<TimeEntry> {
        self.session.refresh_if_stale().await;

        let entry = self.session.delete_time_entry(args.id).await?;
        presenter.show_message(&format!("Deleted '{}'", entry.description))?;

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, TimeZone};
    use rstest::rstest;

    use super::{EditArgs, StartArgs, StopArgs, TimerCommand, TimerIdArgs, TimersArgs};
    use crate::cache::fixtures::{project, running_entry, stopped_entry, tag, workspace};
    use crate::cache::Cache;
    use crate::config::Config;
    use crate::console::ConsoleMarkdownList;
    use crate::datetime::mock_datetime;
    use crate::duration::Rounding;
    use crate::error::MirrorError;
    use crate::sync::Session;
    use crate::toggl::{MockTogglRepository, NewTimeEntry};

    /// 2024-06-12(水) 12:00をモック時間にし、同期直後のミラーを返す。
    fn dummy_cache() -> Cache {
        let now = Local.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap().to_utc();
        mock_datetime::set_mock_time(now);

        let mut cache = Cache::default();
        cache.workspace = Some(1);
        cache.time = Some(now);
        cache.account.workspaces = vec![workspace(1)];
        cache.account.projects = vec![project(1, "Alpha")];
        cache.account.tags = vec![tag(1, "billable")];
        cache.account.time_entries = vec![
            stopped_entry(1, Some(1), "coding", now - Duration::hours(5), 3600),
            stopped_entry(2, Some(1), "coding", now - Duration::hours(3), 1800),
            stopped_entry(3, None, "review", now - Duration::hours(2), 600),
        ];
        cache.account.time_entries[2].add_tag("billable");
        cache
    }

    fn session<'a>(toggl: &'a MockTogglRepository, dir: &tempfile::TempDir) -> Session<'a, MockTogglRepository> {
        Session::new(toggl, Config::default(), dummy_cache(), dir.path().join("cache.json"))
    }

    fn timers_args(query: Option<&str>, project: Option<&str>, tag: Option<&str>) -> TimersArgs {
        TimersArgs {
            query: query.map(str::to_string),
            project: project.map(str::to_string),
            tag: tag.map(str::to_string),
            limit: 20,
        }
    }

    #[tokio::test]
    #[rstest]
    #[case::all(None, None, None, vec![3, 2, 1])]
    #[case::query(Some("COD"), None, None, vec![2, 1])]
    #[case::latest_per_description(None, Some("Alpha"), None, vec![2])]
    #[case::tag(None, None, Some("billable"), vec![3])]
    #[case::tag_and_query(Some("coding"), None, Some("billable"), vec![])]
    async fn test_list(
        #[case] query: Option<&str>,
        #[case] project: Option<&str>,
        #[case] tag: Option<&str>,
        #[case] expected: Vec<i64>,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let toggl = MockTogglRepository::new();
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer, Rounding::default(), false);

        let mut command = TimerCommand::new(session(&toggl, &dir));
        let ids = command
            .list(timers_args(query, project, tag), &mut presenter)
            .await
            .unwrap();

        assert_eq!(ids, expected);
        mock_datetime::clear_mock_time();
    }

    #[tokio::test]
    async fn test_list_limit() {
        let dir = tempfile::tempdir().unwrap();
        let toggl = MockTogglRepository::new();
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer, Rounding::default(), false);
        let mut args = timers_args(None, None, None);
        args.limit = 1;

        let mut command = TimerCommand::new(session(&toggl, &dir));
        let ids = command.list(args, &mut presenter).await.unwrap();

        assert_eq!(ids, vec![3]);
        assert_eq!(
            String::from_utf8(writer).unwrap(),
            "- [3] today 10:00 ~ 10:10: review (<No project>) 0.16\n"
        );
        mock_datetime::clear_mock_time();
    }

    #[tokio::test]
    async fn test_start_with_project_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut toggl = MockTogglRepository::new();
        toggl
            .expect_create_time_entry()
            .withf(|entry: &NewTimeEntry| entry.project_id == Some(1) && entry.tags == vec!["billable".to_string()])
            .times(1)
            .returning(|entry| {
                Ok(running_entry(10, entry.project_id, &entry.description, entry.start))
            });
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer, Rounding::default(), false);
        let args = StartArgs {
            description: "planning".to_string(),
            project: Some("Alpha".to_string()),
            tags: vec!["billable".to_string()],
        };

        let mut command = TimerCommand::new(session(&toggl, &dir));
        let entry = command.start(args, &mut presenter).await.unwrap();

        assert_eq!(entry.id, 10);
        assert_eq!(command.session.cache().running_entry().map(|e| e.id), Some(10));
        assert_eq!(String::from_utf8(writer).unwrap(), "Started 'planning'\n");
        mock_datetime::clear_mock_time();
    }

    #[tokio::test]
    async fn test_stop_without_running_entry() {
        let dir = tempfile::tempdir().unwrap();
        let toggl = MockTogglRepository::new();
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer, Rounding::default(), false);

        let mut command = TimerCommand::new(session(&toggl, &dir));
        let stopped = command.stop(StopArgs { id: None }, &mut presenter).await.unwrap();

        assert_eq!(stopped, None);
        assert_eq!(String::from_utf8(writer).unwrap(), "No timers currently running\n");
        mock_datetime::clear_mock_time();
    }

    #[tokio::test]
    async fn test_toggle_starts_stopped_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut toggl = MockTogglRepository::new();
        toggl
            .expect_continue_time_entry()
            .times(1)
            .returning(|entry, _| {
                Ok(running_entry(11, entry.project_id, &entry.description, mock_datetime::now()))
            });
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer, Rounding::default(), false);

        let mut command = TimerCommand::new(session(&toggl, &dir));
        command.toggle(TimerIdArgs { id: 3 }, &mut presenter).await.unwrap();

        assert_eq!(String::from_utf8(writer).unwrap(), "Started 'review'\n");
        assert_eq!(command.session.cache().running_entry().map(|e| e.id), Some(11));
        mock_datetime::clear_mock_time();
    }

    #[tokio::test]
    async fn test_edit() {
        let dir = tempfile::tempdir().unwrap();
        let mut toggl = MockTogglRepository::new();
        toggl
            .expect_update_time_entry()
            .withf(|entry| {
                entry.id == 3
                    && entry.description == "code review"
                    && entry.project_id == Some(1)
                    && entry.tags == vec!["urgent".to_string()]
            })
            .times(1)
            .returning(|entry| Ok(entry.clone()));
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer, Rounding::default(), false);
        let args = EditArgs {
            id: 3,
            description: Some("code review".to_string()),
            project: Some("1".to_string()),
            no_project: false,
            add_tags: vec!["urgent".to_string()],
            remove_tags: vec!["billable".to_string()],
        };

        let mut command = TimerCommand::new(session(&toggl, &dir));
        command.edit(args, &mut presenter).await.unwrap();

        assert_eq!(command.session.cache().time_entry(3).unwrap().description, "code review");
        mock_datetime::clear_mock_time();
    }

    #[tokio::test]
    async fn test_delete_unknown_entry() {
        let dir = tempfile::tempdir().unwrap();
        let toggl = MockTogglRepository::new();
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer, Rounding::default(), false);

        let mut command = TimerCommand::new(session(&toggl, &dir));
        let err = command
            .delete(TimerIdArgs { id: 42 }, &mut presenter)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Invalid time entry ID 42");
        mock_datetime::clear_mock_time();
    }

    #[tokio::test]
    async fn test_start_requires_project() {
        let dir = tempfile::tempdir().unwrap();
        let toggl = MockTogglRepository::new();
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer, Rounding::default(), false);
        let config = Config {
            ask_for_project: true,
            ..Default::default()
        };
        let session = Session::new(&toggl, config, dummy_cache(), dir.path().join("cache.json"));
        let args = StartArgs {
            description: "planning".to_string(),
            project: None,
            tags: vec![],
        };

        let mut command = TimerCommand::new(session);
        let err = command.start(args, &mut presenter).await.unwrap_err();

        assert_eq!(err.downcast_ref::<MirrorError>(), Some(&MirrorError::ProjectRequired));
        mock_datetime::clear_mock_time();
    }
}
