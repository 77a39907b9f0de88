use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{AccountSnapshot, Entity, Project, Tag, Workspace};
use crate::error::MirrorError;
use crate::time_entry::TimeEntry;

/// リモートのアカウント状態のローカルミラー。
///
/// 1回の起動の間だけメモリ上で更新され、終了前にJSONファイルへ保存される。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cache {
    /// 最初のワークスペースのid。新しいプロジェクトやタグの既定の作成先。
    #[serde(default)]
    pub workspace: Option<i64>,
    #[serde(default)]
    pub account: AccountSnapshot,
    /// 最後に全体を同期した時刻。一度も同期していなければ`None`。
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl Cache {
    /// 最後の同期から`threshold`以上経過しているかどうか。
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.time {
            Some(time) => now - time >= threshold,
            None => true,
        }
    }

    pub fn position<T: Entity>(&self, id: i64) -> Option<usize> {
        T::slots(&self.account).iter().position(|item| item.id() == id)
    }

    pub fn get<T: Entity>(&self, id: i64) -> Option<&T> {
        T::slots(&self.account).iter().find(|item| item.id() == id)
    }

    pub fn replace_at<T: Entity>(&mut self, index: usize, value: T) {
        T::slots_mut(&mut self.account)[index] = value;
    }

    pub fn append<T: Entity>(&mut self, value: T) {
        T::slots_mut(&mut self.account).push(value);
    }

    /// 指定位置の要素を取り除く。並び順は保持しない。
    pub fn remove_at<T: Entity>(&mut self, index: usize) -> T {
        T::slots_mut(&mut self.account).swap_remove(index)
    }

    pub fn time_entry(&self, id: i64) -> Option<&TimeEntry> {
        self.get(id)
    }

    pub fn project(&self, id: i64) -> Option<&Project> {
        self.get(id)
    }

    pub fn project_by_name(&self, name: &str) -> Option<&Project> {
        self.account.projects.iter().find(|project| project.name == name)
    }

    pub fn tag(&self, id: i64) -> Option<&Tag> {
        self.get(id)
    }

    pub fn tag_by_name(&self, name: &str) -> Option<&Tag> {
        self.account.tags.iter().find(|tag| tag.name == name)
    }

    /// idまたは名前でプロジェクトを探す。数字だけの場合はidとして扱う。
    pub fn find_project(&self, key: &str) -> Result<&Project, MirrorError> {
        match key.parse::<i64>() {
            Ok(id) => self.project(id).ok_or(MirrorError::UnknownProject(id)),
            Err(_) => self
                .project_by_name(key)
                .ok_or_else(|| MirrorError::UnknownProjectName(key.to_string())),
        }
    }

    /// idまたは名前でタグを探す。数字だけの場合はidとして扱う。
    pub fn find_tag(&self, key: &str) -> Result<&Tag, MirrorError> {
        match key.parse::<i64>() {
            Ok(id) => self.tag(id).ok_or(MirrorError::UnknownTag(id)),
            Err(_) => self
                .tag_by_name(key)
                .ok_or_else(|| MirrorError::UnknownTagName(key.to_string())),
        }
    }

    pub fn workspace(&self, id: i64) -> Option<&Workspace> {
        self.account.workspaces.iter().find(|workspace| workspace.id == id)
    }

    /// 実行中のtime entryを返す。
    pub fn running_entry(&self) -> Option<&TimeEntry> {
        self.account.time_entries.iter().find(|entry| entry.is_running())
    }

    /// 既定のワークスペースのidを返す。
    pub fn primary_workspace(&self) -> Result<i64, MirrorError> {
        self.workspace
            .or_else(|| self.account.workspaces.first().map(|workspace| workspace.id))
            .ok_or(MirrorError::NoWorkspace)
    }

    /// 説明に`query`を含む(大文字小文字を区別しない)time entryを新しい順に返す。
    pub fn time_entries_matching(&self, query: &str) -> Vec<&TimeEntry> {
        let query = query.to_lowercase();
        let mut matched: Vec<&TimeEntry> = self
            .account
            .time_entries
            .iter()
            .filter(|entry| entry.description.to_lowercase().contains(&query))
            .collect();
        sort_newest_first(&mut matched);
        matched
    }

    /// プロジェクトのtime entryを、説明ごとに最も新しいもの1件ずつ新しい順に返す。
    pub fn latest_entries_for_project(&self, project_id: i64) -> Vec<&TimeEntry> {
        let mut latest: HashMap<&str, &TimeEntry> = HashMap::new();
        for entry in self
            .account
            .time_entries
            .iter()
            .filter(|entry| entry.project_id == Some(project_id))
        {
            let slot = latest.entry(entry.description.as_str()).or_insert(entry);
            if entry.start > slot.start {
                *slot = entry;
            }
        }

        let mut matched: Vec<&TimeEntry> = latest.into_values().collect();
        sort_newest_first(&mut matched);
        matched
    }

    /// タグの付いたtime entryを新しい順に返す。
    pub fn entries_with_tag(&self, name: &str) -> Vec<&TimeEntry> {
        let mut matched: Vec<&TimeEntry> = self
            .account
            .time_entries
            .iter()
            .filter(|entry| entry.has_tag(name))
            .collect();
        sort_newest_first(&mut matched);
        matched
    }

    pub fn project_has_time_entries(&self, project_id: i64) -> bool {
        self.account
            .time_entries
            .iter()
            .any(|entry| entry.project_id == Some(project_id))
    }

    pub fn tag_has_time_entries(&self, name: &str) -> bool {
        self.account.time_entries.iter().any(|entry| entry.has_tag(name))
    }
}

/// 開始時刻の新しい順に並べる。開始時刻のないものは最後。
fn sort_newest_first(entries: &mut [&TimeEntry]) {
    entries.sort_by(|a, b| b.start.cmp(&a.start));
}


#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rstest::rstest;

    use super::fixtures::{project, running_entry, stopped_entry, tag};
    use super::Cache;
    use crate::account::Project;
    use crate::error::MirrorError;
    use crate::time_entry::TimeEntry;

    fn dummy_cache() -> Cache {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let mut cache = Cache::default();
        cache.account.projects = vec![project(1, "Alpha"), project(2, "Beta")];
        cache.account.tags = vec![tag(1, "billable")];
        cache.account.time_entries = vec![
            stopped_entry(1, Some(1), "Coding", base, 3600),
            stopped_entry(2, Some(1), "coding review", base + Duration::hours(2), 600),
            stopped_entry(3, Some(1), "Coding", base + Duration::hours(3), 1200),
            running_entry(4, None, "email", base + Duration::hours(5)),
        ];
        cache.account.time_entries[1].add_tag("billable");
        cache
    }

    #[test]
    fn test_is_stale() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut cache = Cache::default();
        assert!(cache.is_stale(now, Duration::minutes(5)));

        cache.time = Some(now - Duration::minutes(4));
        assert!(!cache.is_stale(now, Duration::minutes(5)));

        cache.time = Some(now - Duration::minutes(5));
        assert!(cache.is_stale(now, Duration::minutes(5)));
    }

    #[test]
    fn test_lookups() {
        let cache = dummy_cache();

        assert_eq!(cache.project_by_name("Beta").map(|p| p.id), Some(2));
        assert_eq!(cache.project(3), None);
        assert_eq!(cache.tag_by_name("billable").map(|t| t.id), Some(1));
        assert_eq!(cache.time_entry(3).map(|e| e.id), Some(3));
        assert_eq!(cache.running_entry().map(|e| e.id), Some(4));
        assert_eq!(cache.primary_workspace(), Err(MirrorError::NoWorkspace));
    }

    #[rstest]
    #[case::by_id("2", Ok(2))]
    #[case::by_name("Alpha", Ok(1))]
    #[case::unknown_id("9", Err(MirrorError::UnknownProject(9)))]
    #[case::unknown_name("Gamma", Err(MirrorError::UnknownProjectName("Gamma".to_string())))]
    fn test_find_project(#[case] key: &str, #[case] expected: Result<i64, MirrorError>) {
        assert_eq!(dummy_cache().find_project(key).map(|p| p.id), expected);
    }

    #[test]
    fn test_find_tag() {
        let cache = dummy_cache();

        assert_eq!(cache.find_tag("1").map(|t| t.name.as_str()), Ok("billable"));
        assert_eq!(cache.find_tag("billable").map(|t| t.id), Ok(1));
        assert_eq!(
            cache.find_tag("urgent").map(|t| t.id),
            Err(MirrorError::UnknownTagName("urgent".to_string()))
        );
    }

    #[test]
    fn test_positional_mutation() {
        let mut cache = dummy_cache();

        let index = cache.position::<Project>(1).unwrap();
        cache.replace_at(index, project(1, "Alpha 2"));
        assert_eq!(cache.project(1).unwrap().name, "Alpha 2");

        cache.append(project(3, "Gamma"));
        assert_eq!(cache.account.projects.len(), 3);

        let index = cache.position::<TimeEntry>(1).unwrap();
        let removed: TimeEntry = cache.remove_at(index);
        assert_eq!(removed.id, 1);
        assert_eq!(cache.time_entry(1), None);
        assert_eq!(cache.account.time_entries.len(), 3);
    }

    #[test]
    fn test_time_entries_matching() {
        let cache = dummy_cache();

        let ids: Vec<i64> = cache.time_entries_matching("CODING").iter().map(|e| e.id).collect();

        assert_eq!(ids, vec![3, 2, 1]);
    }

    /// 説明ごとに最も新しいものだけが返ることを確認する。
    #[test]
    fn test_latest_entries_for_project() {
        let cache = dummy_cache();

        let ids: Vec<i64> = cache.latest_entries_for_project(1).iter().map(|e| e.id).collect();

        assert_eq!(ids, vec![3, 2]);
        assert!(cache.project_has_time_entries(1));
        assert!(!cache.project_has_time_entries(2));
    }

    #[test]
    fn test_entries_with_tag() {
        let cache = dummy_cache();

        let ids: Vec<i64> = cache.entries_with_tag("billable").iter().map(|e| e.id).collect();

        assert_eq!(ids, vec![2]);
        assert!(cache.tag_has_time_entries("billable"));
        assert!(!cache.tag_has_time_entries("other"));
    }
}
