use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDate, Utc};
use log::debug;

use crate::account::Project;
use crate::cache::Cache;
use crate::duration::{Rounding, RoundingFlavor};
use crate::span::Span;

/// プロジェクトが割り当てられていない、または見つからない場合の名前。
pub const NO_PROJECT: &str = "<No project>";

/// 集計対象のプロジェクトの絞り込み。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProjectFilter {
    Unassigned,
    Id(i64),
}

impl ProjectFilter {
    /// `project`はtime entryのプロジェクトをミラーで解決したもの。
    /// ミラーにないプロジェクトを指すtime entryは未割り当てとして扱う。
    fn matches(&self, project: Option<&Project>) -> bool {
        match self {
            ProjectFilter::Unassigned => project.is_none(),
            ProjectFilter::Id(id) => project.map(|project| project.id) == Some(*id),
        }
    }
}

/// 集計対象の絞り込み条件。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub project: Option<ProjectFilter>,
    /// 説明の完全一致。
    pub description: Option<String>,
}

/// 最上位の集計単位。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Grouping {
    #[default]
    ByProject,
    ByDay,
}

/// 説明ごとの集計。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptionSummary {
    pub description: String,
    pub total: i64,
    pub running: bool,
}

/// プロジェクトごとの集計。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProjectSummary {
    pub name: String,
    /// `<No project>`の集計では`None`。
    pub id: Option<i64>,
    pub total: i64,
    pub running: bool,
    pub entries: BTreeMap<String, DescriptionSummary>,
}

/// 日ごとの集計。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub total: i64,
    pub running: bool,
    pub entries: BTreeMap<String, DescriptionSummary>,
}

/// 期間の集計結果。時間はすべて時間の100倍の整数。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub span: Span,
    pub filter: ReportFilter,
    pub total: i64,
    pub projects: BTreeMap<String, ProjectSummary>,
    pub days: BTreeMap<NaiveDate, DaySummary>,
}

/// プロジェクトidから表示名を返す。
pub fn project_name(cache: &Cache, project_id: Option<i64>) -> String {
    project_id
        .and_then(|id| cache.project(id))
        .map(|project| project.name.clone())
        .unwrap_or_else(|| NO_PROJECT.to_string())
}

fn add_to_descriptions(
    entries: &mut BTreeMap<String, DescriptionSummary>,
    description: &str,
    duration: i64,
    running: bool,
) {
    let summary = entries
        .entry(description.to_string())
        .or_insert_with(|| DescriptionSummary {
            description: description.to_string(),
            ..Default::default()
        });
    summary.total += duration;
    summary.running |= running;
}

/// ミラーのtime entryを期間で集計する。
///
/// 開始時刻が期間内(両端を含む)で、絞り込み条件に一致するtime entryを対象とする。
/// 各time entryの経過時間は切り上げで丸めてから加算するため、親の合計は常に子の合計と一致する。
/// 実行中のtime entryは`now`までの経過時間で集計する。
pub fn generate_report(
    cache: &Cache,
    span: &Span,
    filter: &ReportFilter,
    rounding: Rounding,
    now: DateTime<Utc>,
) -> Report {
    debug!("Generating report from {} to {} ({:?})", span.start, span.end, filter);

    let mut report = Report {
        span: span.clone(),
        filter: filter.clone(),
        total: 0,
        projects: BTreeMap::new(),
        days: BTreeMap::new(),
    };

    for entry in &cache.account.time_entries {
        let Some(start) = entry.start.map(|start| start.with_timezone(&Local)) else {
            continue;
        };
        if start < span.start || span.end < start {
            continue;
        }
        let resolved = entry.project_id.and_then(|id| cache.project(id));
        if let Some(project) = &filter.project {
            if !project.matches(resolved) {
                continue;
            }
        }
        if let Some(description) = &filter.description {
            if &entry.description != description {
                continue;
            }
        }

        let name = resolved.map_or_else(|| NO_PROJECT.to_string(), |project| project.name.clone());
        let running = entry.is_running();
        let duration = rounding.round(entry.elapsed_seconds(now), RoundingFlavor::Ceil);

        let project = report
            .projects
            .entry(name.clone())
            .or_insert_with(|| ProjectSummary {
                name,
                id: resolved.map(|project| project.id),
                ..Default::default()
            });
        project.total += duration;
        project.running |= running;
        add_to_descriptions(&mut project.entries, &entry.description, duration, running);

        let date = start.date_naive();
        let day = report.days.entry(date).or_insert_with(|| DaySummary {
            date,
            total: 0,
            running: false,
            entries: BTreeMap::new(),
        });
        day.total += duration;
        day.running |= running;
        add_to_descriptions(&mut day.entries, &entry.description, duration, running);

        report.total += duration;
    }

    debug!(
        "Report has {} projects over {} days, total {}",
        report.projects.len(),
        report.days.len(),
        report.total
    );

    report
}

/// 集計結果の表示階層。期間 → プロジェクト(または日) → 説明の順にたどる。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportLevel {
    Span,
    Project(String),
    Day(NaiveDate),
}

/// 1つ上の階層への戻り先。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpLink {
    /// 期間の選択に戻る。
    SpanList,
    Level(ReportLevel),
}

/// 表示する1行。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportRow {
    pub title: String,
    pub total: i64,
    pub running: bool,
    /// この行からたどれる下の階層。説明の行は末端なので`None`。
    pub drill: Option<ReportLevel>,
}

/// ある階層の表示内容。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportView {
    pub title: String,
    pub total: i64,
    pub rows: Vec<ReportRow>,
    /// 説明で絞り込まれた末端の集計では`None`。
    pub up: Option<UpLink>,
}

impl ReportView {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 日の表示名。期間としても指定できる`M/D`形式にする。
pub fn day_title(date: NaiveDate) -> String {
    date.format("%-m/%-d").to_string()
}

fn description_rows(entries: &BTreeMap<String, DescriptionSummary>) -> Vec<ReportRow> {
    entries
        .values()
        .map(|entry| ReportRow {
            title: entry.description.clone(),
            total: entry.total,
            running: entry.running,
            drill: None,
        })
        .collect()
}

impl Report {
    /// 指定した階層の表示内容を返す。
    ///
    /// 期間の階層では`grouping`に従ってプロジェクトか日の一覧を返す。
    /// 集計にないプロジェクトや日を指定した場合は空の表示になる。
    pub fn view(&self, level: &ReportLevel, grouping: Grouping) -> ReportView {
        let (title, mut rows) = match level {
            ReportLevel::Span => {
                let rows = match grouping {
                    Grouping::ByProject => self
                        .projects
                        .values()
                        .map(|project| ReportRow {
                            title: project.name.clone(),
                            total: project.total,
                            running: project.running,
                            drill: Some(ReportLevel::Project(project.name.clone())),
                        })
                        .collect(),
                    Grouping::ByDay => self
                        .days
                        .values()
                        .map(|day| ReportRow {
                            title: day_title(day.date),
                            total: day.total,
                            running: day.running,
                            drill: Some(ReportLevel::Day(day.date)),
                        })
                        .collect(),
                };
                (format!("for {}", self.span.name), rows)
            }
            ReportLevel::Project(name) => (
                format!("for {} for {}", self.span.name, name),
                self.projects
                    .get(name)
                    .map(|project| description_rows(&project.entries))
                    .unwrap_or_default(),
            ),
            ReportLevel::Day(date) => (
                format!("for {}", day_title(*date)),
                self.days
                    .get(date)
                    .map(|day| description_rows(&day.entries))
                    .unwrap_or_default(),
            ),
        };

        // 日の一覧は日付順、それ以外は名前順
        if !matches!((level, grouping), (ReportLevel::Span, Grouping::ByDay)) {
            rows.sort_by(|a, b| a.title.cmp(&b.title));
        }

        let up = if self.filter.description.is_some() {
            None
        } else {
            Some(match level {
                ReportLevel::Span => UpLink::SpanList,
                ReportLevel::Project(_) | ReportLevel::Day(_) => UpLink::Level(ReportLevel::Span),
            })
        };

        ReportView {
            title,
            total: rows.iter().map(|row| row.total).sum(),
            rows,
            up,
        }
    }
}
