use serde::{Deserialize, Deserializer, Serialize};

use crate::time_entry::TimeEntry;

/// Toggl APIのプロジェクト。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    #[serde(default, alias = "wid")]
    pub workspace_id: i64,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Toggl APIのタグ。time entryからは名前で参照される。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    #[serde(default, alias = "wid")]
    pub workspace_id: i64,
    pub name: String,
}

/// Toggl APIのワークスペース。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub premium: bool,
}

/// アカウント全体のスナップショット。
///
/// リモートから一括で取得したもので、各リストの中でidは重複しない。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub projects: Vec<Project>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_entries: Vec<TimeEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub workspaces: Vec<Workspace>,
}

/// `null`を空の値として読む。
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// スナップショットの中で、idで識別され丸ごと置き換えられる要素。
pub trait Entity: Clone {
    /// エラーメッセージ用の種類名。
    const KIND: &'static str;

    fn id(&self) -> i64;

    fn slots(account: &AccountSnapshot) -> &[Self];

    fn slots_mut(account: &mut AccountSnapshot) -> &mut Vec<Self>;
}

impl Entity for TimeEntry {
    const KIND: &'static str = "time entry";

    fn id(&self) -> i64 {
        self.id
    }

    fn slots(account: &AccountSnapshot) -> &[Self] {
        &account.time_entries
    }

    fn slots_mut(account: &mut AccountSnapshot) -> &mut Vec<Self> {
        &mut account.time_entries
    }
}

impl Entity for Project {
    const KIND: &'static str = "project";

    fn id(&self) -> i64 {
        self.id
    }

    fn slots(account: &AccountSnapshot) -> &[Self] {
        &account.projects
    }

    fn slots_mut(account: &mut AccountSnapshot) -> &mut Vec<Self> {
        &mut account.projects
    }
}

impl Entity for Tag {
    const KIND: &'static str = "tag";

    fn id(&self) -> i64 {
        self.id
    }

    fn slots(account: &AccountSnapshot) -> &[Self] {
        &account.tags
    }

    fn slots_mut(account: &mut AccountSnapshot) -> &mut Vec<Self> {
        &mut account.tags
    }
}
