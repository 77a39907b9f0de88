use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// time entryの計測状態。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    /// 計測済み。`duration`は秒数。
    Stopped { duration: i64 },
    /// 計測中。経過時間は`started_at`から現在までで計算する。
    Running { started_at: DateTime<Utc> },
}

/// ミラーに保持するtime entry。
///
/// Toggl APIやキャッシュファイルでは、実行中を負の`duration`で表すため、
/// シリアライズ時は`TogglTimeEntry`を経由して変換する。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TogglTimeEntry", into = "TogglTimeEntry")]
pub struct TimeEntry {
    pub id: i64,
    pub workspace_id: i64,
    pub description: String,
    pub project_id: Option<i64>,
    pub tags: Vec<String>,
    pub start: Option<DateTime<Utc>>,
    pub stop: Option<DateTime<Utc>>,
    pub state: TimerState,
}

impl TimeEntry {
    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    /// 経過秒数を返す。
    ///
    /// 実行中の場合は`now`までの経過時間とし、負にはならない。
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        match self.state {
            TimerState::Stopped { duration } => duration,
            TimerState::Running { started_at } => (now - started_at).num_seconds().max(0),
        }
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag == name)
    }

    /// タグを追加する。既に付いている場合は何もしない。
    pub fn add_tag(&mut self, name: &str) {
        if !self.has_tag(name) {
            self.tags.push(name.to_string());
        }
    }

    pub fn remove_tag(&mut self, name: &str) {
        self.tags.retain(|tag| tag != name);
    }
}

/// Toggl APIのtime entryの表現。
#[derive(Debug, Serialize, Deserialize)]
struct TogglTimeEntry {
    id: i64,
    #[serde(default, alias = "wid")]
    workspace_id: i64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "pid")]
    project_id: Option<i64>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    stop: Option<DateTime<Utc>>,
    duration: i64,
}

impl TryFrom<TogglTimeEntry> for TimeEntry {
    type Error = String;

    fn try_from(entry: TogglTimeEntry) -> Result<Self, Self::Error> {
        let state = if entry.duration < 0 {
            // 古い形式では開始時刻のUNIX時間を負にしたものが入っている
            let started_at = entry
                .start
                .or_else(|| DateTime::from_timestamp(-entry.duration, 0))
                .ok_or_else(|| format!("running time entry {} has no start time", entry.id))?;
            TimerState::Running { started_at }
        } else {
            TimerState::Stopped {
                duration: entry.duration,
            }
        };

        let mut tags: Vec<String> = Vec::new();
        for tag in entry.tags.unwrap_or_default() {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        Ok(TimeEntry {
            id: entry.id,
            workspace_id: entry.workspace_id,
            description: entry.description.unwrap_or_default(),
            project_id: entry.project_id.filter(|id| *id != 0),
            tags,
            start: match state {
                TimerState::Running { started_at } => Some(started_at),
                TimerState::Stopped { .. } => entry.start,
            },
            stop: entry.stop,
            state,
        })
    }
}

impl From<TimeEntry> for TogglTimeEntry {
    fn from(entry: TimeEntry) -> Self {
        let duration = match entry.state {
            TimerState::Stopped { duration } => duration,
            TimerState::Running { started_at } => -started_at.timestamp(),
        };

        TogglTimeEntry {
            id: entry.id,
            workspace_id: entry.workspace_id,
            description: Some(entry.description),
            project_id: entry.project_id,
            tags: Some(entry.tags),
            start: entry.start,
            stop: entry.stop,
            duration,
        }
    }
}
