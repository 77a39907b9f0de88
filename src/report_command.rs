use anyhow::{Context, Result};
use log::info;

use crate::console::ConsolePresenter;
use crate::datetime;
use crate::report::{Grouping, ProjectFilter, ReportFilter, ReportLevel, ReportView};
use crate::span::get_span;
use crate::sync::Session;
use crate::toggl::TogglRepository;

/// 期間の集計を表示するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct ReportArgs {
    #[clap(help = "Span to report on: today, yesterday, week, M/D, YYYY-M-D or <from>..<to>")]
    span: String,

    #[clap(long = "project", help = "Only entries of this project (ID or name)")]
    project: Option<String>,

    #[clap(
        long = "no-project",
        conflicts_with = "project",
        help = "Only entries without a project"
    )]
    no_project: bool,

    #[clap(long = "description", help = "Only entries with exactly this description")]
    description: Option<String>,

    #[clap(long = "by-day", help = "Group a multi-day span by day instead of by project")]
    by_day: bool,

    #[clap(long = "drill", help = "Show the entries of one project, or of one day with --by-day")]
    drill: Option<String>,
}

pub struct ReportCommand<'a, T: TogglRepository> {
    session: Session<'a, T>,
}

impl<'a, T: TogglRepository> ReportCommand<'a, T> {
    /// 新しい`ReportCommand`を返す。
    ///
    /// # Arguments
    /// * `session` - ミラーとリモートを束ねるセッション
    pub fn new(session: Session<'a, T>) -> Self {
        Self { session }
    }

    /// `report`サブコマンドの処理を行う。
    ///
    /// 期間の集計を作成し、`--drill`で指定された階層を表示する。
    /// 1日だけの期間では`--by-day`は無視する。
    pub async fn run<P: ConsolePresenter>(
        &mut self,
        args: ReportArgs,
        presenter: &mut P,
    ) -> Result<ReportView> {
        self.session.refresh_if_stale().await;

        let span = get_span(&args.span)?;
        let filter = ReportFilter {
            project: self.project_filter(args.project.as_deref(), args.no_project)?,
            description: args.description,
        };
        let grouping = if args.by_day && span.multi_day {
            Grouping::ByDay
        } else {
            if args.by_day {
                info!("'{}' is a single day; grouping by project", span.name);
            }
            Grouping::ByProject
        };

        let level = match (args.drill, grouping) {
            (None, _) => ReportLevel::Span,
            (Some(day), Grouping::ByDay) => {
                let day = get_span(&day).with_context(|| format!("Failed to resolve day '{}'", day))?;
                ReportLevel::Day(day.start.date_naive())
            }
            (Some(project), Grouping::ByProject) => ReportLevel::Project(project),
        };

        let report = self.session.report(&span, &filter);
        let view = report.view(&level, grouping);
        presenter.show_report(&view)?;

        Ok(view)
    }

    fn project_filter(&self, project: Option<&str>, no_project: bool) -> Result<Option<ProjectFilter>> {
        if no_project {
            return Ok(Some(ProjectFilter::Unassigned));
        }
        match project {
            Some(key) => {
                let project = self.session.cache().find_project(key)?;
                Ok(Some(ProjectFilter::Id(project.id)))
            }
            None => Ok(None),
        }
    }

    /// `status`サブコマンドの処理を行う。
    ///
    /// 実行中のtime entryと、今日の集計を表示する。
    pub async fn status<P: ConsolePresenter>(&mut self, presenter: &mut P) -> Result<ReportView> {
        self.session.refresh_if_stale().await;

        let today = get_span("today")?;
        let view = self
            .session
            .report(&today, &ReportFilter::default())
            .view(&ReportLevel::Span, Grouping::ByProject);
        let cache = self.session.cache();
        presenter.show_status(cache, cache.running_entry(), &view, datetime::now())?;

        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, Local, TimeZone};
    use rstest::rstest;

    use super::{ReportArgs, ReportCommand};
    use crate::cache::fixtures::{project, running_entry, stopped_entry, workspace};
    use crate::cache::Cache;
    use crate::config::Config;
    use crate::console::ConsoleMarkdownList;
    use crate::datetime::mock_datetime;
    use crate::error::MirrorError;
    use crate::report::ReportView;
    use crate::sync::Session;
    use crate::toggl::MockTogglRepository;

    /// 2024-06-12(水) 12:00をモック時間にし、同期直後のミラーを返す。
    fn dummy_cache() -> Cache {
        let now = Local.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap().to_utc();
        mock_datetime::set_mock_time(now);

        let mut cache = Cache::default();
        cache.workspace = Some(1);
        cache.time = Some(now);
        cache.account.workspaces = vec![workspace(1)];
        cache.account.projects = vec![project(1, "Alpha"), project(2, "Beta")];
        cache.account.time_entries = vec![
            stopped_entry(1, Some(1), "coding", now - Duration::hours(3), 3 * 3600),
            running_entry(2, Some(2), "email", now - Duration::minutes(30)),
            stopped_entry(3, None, "lunch", now - Duration::days(1), 3600),
        ];
        cache
    }

    fn args(span: &str) -> ReportArgs {
        ReportArgs {
            span: span.to_string(),
            project: None,
            no_project: false,
            description: None,
            by_day: false,
            drill: None,
        }
    }

    async fn run(args: ReportArgs, config: Config) -> (Result<ReportView>, String) {
        let mut toggl = MockTogglRepository::new();
        toggl.expect_read_account().times(0);
        let session = Session::new(&toggl, config.clone(), dummy_cache(), "unused.json".into());
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer, config.rounding(), config.hours_minutes);

        let mut command = ReportCommand::new(session);
        let result = command.run(args, &mut presenter).await;

        mock_datetime::clear_mock_time();
        (result, String::from_utf8(writer).unwrap())
    }

    #[tokio::test]
    async fn test_report_today() {
        let (result, output) = run(args("today"), Config::default()).await;

        assert_eq!(result.unwrap().total, 350);
        assert_eq!(
            output,
            "Total hours for today: 3.50\n\
             - Alpha: 3.00 [--drill Alpha]\n\
             - Beta: 0.50 (running) [--drill Beta]\n\
             Up: report <span>\n"
        );
    }

    #[tokio::test]
    async fn test_report_drill_into_project() {
        let mut args = args("today");
        args.drill = Some("Alpha".to_string());

        let (_, output) = run(args, Config::default()).await;

        assert_eq!(output, "Total hours for today for Alpha: 3.00\n- coding: 3.00\nUp: report without --drill\n");
    }

    #[tokio::test]
    async fn test_report_by_day() {
        let mut args = args("yesterday..today");
        args.by_day = true;

        let (_, output) = run(args, Config::default()).await;

        assert_eq!(
            output,
            "Total hours for yesterday..today: 4.50\n\
             - 6/11: 1.00 [--by-day --drill 6/11]\n\
             - 6/12: 3.50 (running) [--by-day --drill 6/12]\n\
             Up: report <span>\n"
        );
    }

    #[tokio::test]
    async fn test_report_drill_into_day() {
        let mut args = args("week");
        args.by_day = true;
        args.drill = Some("6/11".to_string());

        let (_, output) = run(args, Config::default()).await;

        assert_eq!(output, "Total hours for 6/11: 1.00\n- lunch: 1.00\nUp: report without --drill\n");
    }

    #[tokio::test]
    #[rstest]
    #[case::no_project(None, true, "No time entries for today\nUp: report <span>\n")]
    #[case::by_name(
        Some("Beta"),
        false,
        "Total hours for today: 0.50\n- Beta: 0.50 (running) [--drill Beta]\nUp: report <span>\n"
    )]
    #[case::by_id(
        Some("1"),
        false,
        "Total hours for today: 3.00\n- Alpha: 3.00 [--drill Alpha]\nUp: report <span>\n"
    )]
    async fn test_report_project_filter(
        #[case] project: Option<&str>,
        #[case] no_project: bool,
        #[case] expected: &str,
    ) {
        let mut args = args("today");
        args.project = project.map(str::to_string);
        args.no_project = no_project;

        let (_, output) = run(args, Config::default()).await;

        assert_eq!(output, expected);
    }

    #[tokio::test]
    async fn test_report_unknown_project() {
        let mut args = args("today");
        args.project = Some("Gamma".to_string());

        let (result, output) = run(args, Config::default()).await;

        let err = result.unwrap_err();
        assert_eq!(
            err.downcast_ref::<MirrorError>(),
            Some(&MirrorError::UnknownProjectName("Gamma".to_string()))
        );
        assert_eq!(output, "");
    }

    #[tokio::test]
    async fn test_report_unparseable_span() {
        let (result, _) = run(args("someday"), Config::default()).await;

        assert_eq!(result.unwrap_err().to_string(), "unable to parse span 'someday'");
    }

    #[tokio::test]
    async fn test_report_hours_minutes_with_rounding() {
        let config = Config {
            rounding: 15,
            hours_minutes: true,
            ..Default::default()
        };

        let (_, output) = run(args("yesterday"), config).await;

        assert_eq!(
            output,
            "Total hours for yesterday: 1:00\n- <No project>: 1:00 [--drill '<No project>']\nUp: report <span>\n"
        );
    }

    #[tokio::test]
    async fn test_status() {
        let mut toggl = MockTogglRepository::new();
        toggl.expect_read_account().times(0);
        let session = Session::new(&toggl, Config::default(), dummy_cache(), "unused.json".into());
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer, Config::default().rounding(), false);

        let mut command = ReportCommand::new(session);
        let view = command.status(&mut presenter).await.unwrap();

        assert_eq!(view.total, 350);
        assert_eq!(
            String::from_utf8(writer).unwrap(),
            "Running: email [Beta] 0.50 hr, started today at 11:30:00\n\
             Total hours for today: 3.50\n\
             - Alpha: 3.00\n\
             - Beta: 0.50 (running)\n"
        );
        mock_datetime::clear_mock_time();
    }
}
