use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use crate::account::{Project, Tag};
use crate::cache::Cache;
use crate::datetime::to_human_date_string;
use crate::duration::{format_duration, round_duration, Rounding, RoundingFlavor};
use crate::report::{day_title, project_name, ReportLevel, ReportView, UpLink};
use crate::time_entry::TimeEntry;

/// 実行中の行に付ける印。
const RUNNING_MARK: &str = " (running)";

/// Consoleに結果を表示するためのtrait。
pub trait ConsolePresenter {
    /// 集計結果の1階層を表示する。
    ///
    /// # Arguments
    ///
    /// * `view` - 表示する階層
    fn show_report(&mut self, view: &ReportView) -> Result<()>;

    /// time entryを与えられた順に表示する。
    ///
    /// # Arguments
    ///
    /// * `cache` - プロジェクト名の解決に使うミラー
    /// * `time_entries` - 表示するtime entry
    /// * `now` - 実行中のtime entryの経過時間の基準
    fn show_time_entries(
        &mut self,
        cache: &Cache,
        time_entries: &[&TimeEntry],
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// 実行中のtime entryと今日の合計を表示する。
    fn show_status(
        &mut self,
        cache: &Cache,
        running: Option<&TimeEntry>,
        today: &ReportView,
        now: DateTime<Utc>,
    ) -> Result<()>;

    fn show_projects(&mut self, projects: &[&Project]) -> Result<()>;

    fn show_tags(&mut self, tags: &[&Tag]) -> Result<()>;

    /// 1行のメッセージを表示する。
    fn show_message(&mut self, message: &str) -> Result<()>;
}

/// 結果をMarkdownのlist形式で表示する。
pub struct ConsoleMarkdownList<'a, W: Write> {
    writer: &'a mut W,
    rounding: Rounding,
    hours_minutes: bool,
}

impl<'a, W: Write> ConsoleMarkdownList<'a, W> {
    /// 新しい`ConsoleMarkdownList`を返す。
    ///
    /// # Arguments
    ///
    /// * `writer` - 出力先
    /// * `rounding` - time entryの一覧で使う丸め単位
    /// * `hours_minutes` - 時間を`H:MM`形式で表示するかどうか
    pub fn new(writer: &'a mut W, rounding: Rounding, hours_minutes: bool) -> Self {
        Self {
            writer,
            rounding,
            hours_minutes,
        }
    }

    fn hours(&self, hours100: i64) -> String {
        format_duration(hours100, self.hours_minutes)
    }

    /// 集計の1階層を書き出す。`navigation`が有効な場合は、下の階層と上の階層への移動方法も書き出す。
    fn write_report(&mut self, view: &ReportView, navigation: bool) -> Result<()> {
        if view.is_empty() {
            writeln!(self.writer, "No time entries {}", view.title)
                .context("Failed to write report")?;
        } else {
            writeln!(
                self.writer,
                "Total hours {}: {}",
                view.title,
                self.hours(view.total)
            )
            .context("Failed to write report")?;
            for row in &view.rows {
                let drill = match &row.drill {
                    Some(level) if navigation => format!(" [{}]", drill_args(level)),
                    _ => String::new(),
                };
                writeln!(
                    self.writer,
                    "- {}: {}{}{}",
                    row.title,
                    self.hours(row.total),
                    running_mark(row.running),
                    drill
                )
                .with_context(|| format!("Failed to write report row: {:?}", row))?;
            }
        }

        match &view.up {
            Some(up) if navigation => {
                let up = match up {
                    UpLink::SpanList => "report <span>",
                    UpLink::Level(_) => "report without --drill",
                };
                writeln!(self.writer, "Up: {}", up).context("Failed to write report")
            }
            _ => Ok(()),
        }
    }
}

/// 下の階層を表示するための`report`の引数。
fn drill_args(level: &ReportLevel) -> String {
    match level {
        ReportLevel::Span => String::new(),
        ReportLevel::Project(name) => format!("--drill {}", shell_quote(name)),
        ReportLevel::Day(date) => format!("--by-day --drill {}", day_title(*date)),
    }
}

/// そのままシェルに渡せない文字を含む場合はシングルクォートで囲む。
fn shell_quote(text: &str) -> String {
    let plain = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if plain {
        text.to_string()
    } else {
        format!("'{}'", text.replace('\'', "'\\''"))
    }
}

fn running_mark(running: bool) -> &'static str {
    if running {
        RUNNING_MARK
    } else {
        ""
    }
}

fn local_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|time| time.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

impl<'a, W: Write> ConsolePresenter for ConsoleMarkdownList<'a, W> {
    fn show_report(&mut self, view: &ReportView) -> Result<()> {
        self.write_report(view, true)
    }

    // 一覧では経過時間を切り捨てで丸める。
    fn show_time_entries(
        &mut self,
        cache: &Cache,
        time_entries: &[&TimeEntry],
        now: DateTime<Utc>,
    ) -> Result<()> {
        for entry in time_entries {
            let date = entry
                .start
                .map(|start| to_human_date_string(start.with_timezone(&Local).date_naive()))
                .unwrap_or_default();
            let end = if entry.is_running() {
                "now".to_string()
            } else {
                local_time(entry.stop)
            };
            let hours = self
                .rounding
                .round(entry.elapsed_seconds(now), RoundingFlavor::Floor);
            writeln!(
                self.writer,
                "- [{}] {} {} ~ {}: {} ({}) {}{}",
                entry.id,
                date,
                local_time(entry.start),
                end,
                entry.description,
                project_name(cache, entry.project_id),
                self.hours(hours),
                running_mark(entry.is_running())
            )
            .with_context(|| format!("Failed to write time entry: {:?}", entry))?;
        }

        Ok(())
    }

    fn show_status(
        &mut self,
        cache: &Cache,
        running: Option<&TimeEntry>,
        today: &ReportView,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match running {
            Some(entry) => {
                let started = entry.start.unwrap_or(now).with_timezone(&Local);
                writeln!(
                    self.writer,
                    "Running: {} [{}] {} hr, started {} at {}",
                    entry.description,
                    project_name(cache, entry.project_id),
                    self.hours(round_duration(
                        entry.elapsed_seconds(now),
                        0,
                        RoundingFlavor::Floor
                    )),
                    to_human_date_string(started.date_naive()),
                    started.format("%H:%M:%S")
                )
                .context("Failed to write status")?;
            }
            None => {
                writeln!(self.writer, "No timers currently running").context("Failed to write status")?
            }
        }

        self.write_report(today, false)
    }

    fn show_projects(&mut self, projects: &[&Project]) -> Result<()> {
        for project in projects {
            let archived = if project.active { "" } else { " (archived)" };
            writeln!(self.writer, "- [{}] {}{}", project.id, project.name, archived)
                .with_context(|| format!("Failed to write project: {:?}", project))?;
        }

        Ok(())
    }

    fn show_tags(&mut self, tags: &[&Tag]) -> Result<()> {
        for tag in tags {
            writeln!(self.writer, "- [{}] {}", tag.id, tag.name)
                .with_context(|| format!("Failed to write tag: {:?}", tag))?;
        }

        Ok(())
    }

    fn show_message(&mut self, message: &str) -> Result<()> {
        writeln!(self.writer, "{}", message).context("Failed to write message")
    }
}
