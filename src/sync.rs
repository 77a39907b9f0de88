use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use log::{debug, info, warn};

use crate::account::{Entity, Project, Tag};
use crate::cache::Cache;
use crate::config::Config;
use crate::datetime;
use crate::error::MirrorError;
use crate::report::{generate_report, Report, ReportFilter};
use crate::span::Span;
use crate::store;
use crate::time_entry::{TimeEntry, TimerState};
use crate::toggl::{NewTimeEntry, TogglRepository};

/// ミラーを信頼する時間(分)。これを過ぎると全体を同期し直す。
const STALE_AFTER_MINUTES: i64 = 5;

/// リモートで1件の変更が成功した後に、ミラーへ反映する内容。
#[derive(Clone, Debug, PartialEq)]
pub enum Patch<T> {
    Create(T),
    Update(T),
    Delete(i64),
}

/// `toggle`で行われた操作。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggled {
    Started,
    Stopped,
}

/// 1回の起動の間、設定とミラーとリモートを束ねるコンテキスト。
///
/// ミラーを変更する操作はすべてここを通り、終了前にキャッシュファイルへ保存される。
pub struct Session<'a, T: TogglRepository> {
    repository: &'a T,
    config: Config,
    cache: Cache,
    cache_file: PathBuf,
}

impl<'a, T: TogglRepository> Session<'a, T> {
    /// 新しい`Session`を返す。
    ///
    /// # Arguments
    /// * `repository` - Toggl APIと通信するためのリポジトリ
    /// * `config` - 利用者の設定
    /// * `cache` - 読み込み済みのミラー
    /// * `cache_file` - ミラーの保存先
    pub fn new(repository: &'a T, config: Config, cache: Cache, cache_file: PathBuf) -> Self {
        Self {
            repository,
            config,
            cache,
            cache_file,
        }
    }

    /// キャッシュファイルからミラーを読み込んで`Session`を返す。
    ///
    /// ファイルがない、または壊れている場合は空のミラーから始める。
    pub fn load(repository: &'a T, config: Config, cache_file: PathBuf) -> Self {
        let cache = store::load_json(&cache_file);
        Self::new(repository, config, cache, cache_file)
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// ミラーが古い場合は全体を同期する。
    ///
    /// テストモードの場合や、最後の同期から5分経っていない場合は何もしない。
    /// 同期に失敗した場合はエラーを返すが、古いミラーはそのまま利用できる。
    pub async fn ensure_fresh(&mut self) -> Result<()> {
        if self.config.test_mode {
            info!("Test mode is active; not auto-refreshing");
            return Ok(());
        }
        if !self
            .cache
            .is_stale(datetime::now(), Duration::minutes(STALE_AFTER_MINUTES))
        {
            return Ok(());
        }

        info!("Refreshing cache...");
        self.full_refresh().await
    }

    /// `ensure_fresh`に失敗した場合は警告を出し、古いミラーのまま続ける。
    pub async fn refresh_if_stale(&mut self) {
        if let Err(err) = self.ensure_fresh().await {
            warn!("Error syncing with toggl: {:#}", err);
        }
    }

    /// リモートからアカウント全体を取得し、ミラーを置き換えて保存する。
    ///
    /// 取得に失敗した場合、ミラーは変更しない。
    pub async fn full_refresh(&mut self) -> Result<()> {
        let account = self
            .repository
            .read_account()
            .await
            .context("Failed to refresh from toggl")?;

        let workspace = account.workspaces.first().map(|workspace| workspace.id);
        self.cache = Cache {
            workspace,
            account,
            time: Some(datetime::now()),
        };
        info!("Cache refreshed");

        self.save()
    }

    /// 1件の変更をミラーに反映して保存する。
    ///
    /// 保存に失敗してもリモートの変更は成功しているため、警告だけを出す。
    /// 次の同期でファイルは修復される。
    pub fn apply_patch<E: Entity>(&mut self, patch: Patch<E>) {
        self.patch_in_memory(patch);
        self.save_or_warn();
    }

    fn patch_in_memory<E: Entity>(&mut self, patch: Patch<E>) {
        match patch {
            Patch::Create(value) => {
                debug!("Appending {} {}", E::KIND, value.id());
                self.cache.append(value);
            }
            Patch::Update(value) => match self.cache.position::<E>(value.id()) {
                Some(index) => self.cache.replace_at(index, value),
                None => {
                    warn!("Updated {} {} was not in the cache; appending it", E::KIND, value.id());
                    self.cache.append(value);
                }
            },
            Patch::Delete(id) => match self.cache.position::<E>(id) {
                Some(index) => {
                    self.cache.remove_at::<E>(index);
                }
                None => warn!("Deleted {} {} was not in the cache", E::KIND, id),
            },
        }
    }

    /// time entryを作成または置き換える。
    fn upsert_time_entry(&mut self, entry: TimeEntry) {
        let patch = if self.cache.position::<TimeEntry>(entry.id).is_some() {
            Patch::Update(entry)
        } else {
            Patch::Create(entry)
        };
        self.apply_patch(patch);
    }

    fn save(&self) -> Result<()> {
        store::save_json(&self.cache_file, &self.cache).context("Failed to save cache")
    }

    fn save_or_warn(&self) {
        if let Err(err) = self.save() {
            warn!("Error saving cache: {:#}", err);
        }
    }

    /// 全体の同期を試み、失敗した場合は`fallback`でミラーを更新して次回の同期を強制する。
    async fn refresh_or_invalidate(&mut self, fallback: impl FnOnce(&mut Cache)) {
        if let Err(err) = self.full_refresh().await {
            warn!("Error refreshing cache: {:#}", err);
            fallback(&mut self.cache);
            self.cache.time = None;
            self.save_or_warn();
        }
    }

    /// 実行中のtime entryが変わった可能性がある操作の結果をミラーに反映する。
    ///
    /// 操作前に別のtime entryが実行中だった場合、リモートではそれが暗黙に停止されているが
    /// 操作の結果には含まれないため、パッチではなく全体を同期する。
    async fn settle_running(&mut self, previous: Option<i64>, result: &TimeEntry) {
        match previous {
            Some(previous) if previous != result.id => {
                info!("Time entry {} was running; refreshing everything", previous);
                let result = result.clone();
                self.refresh_or_invalidate(move |cache| {
                    // 同期できない間は、以前のtime entryを今停止したものとして扱う
                    if let Some(index) = cache.position::<TimeEntry>(previous) {
                        let mut stopped = cache.account.time_entries[index].clone();
                        let now = result.start.unwrap_or_else(datetime::now);
                        stopped.state = TimerState::Stopped {
                            duration: stopped.elapsed_seconds(now),
                        };
                        stopped.stop = Some(now);
                        cache.replace_at(index, stopped);
                    }
                    match cache.position::<TimeEntry>(result.id) {
                        Some(index) => cache.replace_at(index, result),
                        None => cache.append(result),
                    }
                })
                .await;
            }
            _ => self.upsert_time_entry(result.clone()),
        }
    }

    fn find_time_entry(&self, id: i64) -> Result<TimeEntry, MirrorError> {
        self.cache
            .time_entry(id)
            .cloned()
            .ok_or(MirrorError::UnknownTimeEntry(id))
    }

    /// time entryの実行状態を切り替える。
    ///
    /// 実行中であれば停止し、停止していれば再開する。
    pub async fn toggle(&mut self, id: i64) -> Result<(Toggled, TimeEntry)> {
        let entry = self.find_time_entry(id)?;
        if entry.is_running() {
            Ok((Toggled::Stopped, self.stop(id).await?))
        } else {
            Ok((Toggled::Started, self.continue_entry(id).await?))
        }
    }

    /// 実行中のtime entryを停止する。
    pub async fn stop(&mut self, id: i64) -> Result<TimeEntry> {
        let entry = self.find_time_entry(id)?;
        if !entry.is_running() {
            return Err(MirrorError::NotRunning(id).into());
        }

        let previous = self.cache.running_entry().map(|running| running.id);
        let stopped = self.repository.stop_time_entry(&entry).await?;
        info!("Stopped time entry {}", stopped.id);
        self.settle_running(previous, &stopped).await;

        Ok(stopped)
    }

    /// 停止しているtime entryを再開する。
    ///
    /// 設定の`duration_only`に従い、同じtime entryを再開するか新しいtime entryを作成する。
    pub async fn continue_entry(&mut self, id: i64) -> Result<TimeEntry> {
        let entry = self.find_time_entry(id)?;
        if entry.is_running() {
            return Err(MirrorError::AlreadyRunning(id).into());
        }

        let previous = self.cache.running_entry().map(|running| running.id);
        let started = self
            .repository
            .continue_time_entry(&entry, self.config.duration_only)
            .await?;
        info!("Continued time entry {} as {}", entry.id, started.id);
        self.settle_running(previous, &started).await;

        Ok(started)
    }

    /// 新しいtime entryを開始する。
    ///
    /// プロジェクトが指定されない場合は設定の既定のプロジェクトを使う。
    pub async fn start(
        &mut self,
        description: &str,
        project_id: Option<i64>,
        tags: Vec<String>,
    ) -> Result<TimeEntry> {
        let project_id = self.resolve_project(project_id)?;
        let workspace_id = match project_id.and_then(|id| self.cache.project(id)) {
            Some(project) => project.workspace_id,
            None => self.cache.primary_workspace()?,
        };

        let previous = self.cache.running_entry().map(|running| running.id);
        let started = self
            .repository
            .create_time_entry(&NewTimeEntry {
                workspace_id,
                description: description.to_string(),
                project_id,
                tags,
                start: datetime::now(),
                duration: None,
            })
            .await?;
        info!("Started time entry {}", started.id);
        self.settle_running(previous, &started).await;

        Ok(started)
    }

    /// 開始するtime entryのプロジェクトを決める。
    pub fn resolve_project(&self, requested: Option<i64>) -> Result<Option<i64>, MirrorError> {
        match requested {
            Some(id) => match self.cache.project(id) {
                Some(project) => Ok(Some(project.id)),
                None => Err(MirrorError::UnknownProject(id)),
            },
            None if self.config.ask_for_project => Err(MirrorError::ProjectRequired),
            None => Ok(self.config.default_project_id),
        }
    }

    /// time entryを更新する。
    pub async fn update_time_entry(&mut self, entry: TimeEntry) -> Result<TimeEntry> {
        self.find_time_entry(entry.id)?;
        let updated = self.repository.update_time_entry(&entry).await?;
        info!("Updated time entry {}", updated.id);
        self.apply_patch(Patch::Update(updated.clone()));

        Ok(updated)
    }

    /// time entryを削除し、削除したtime entryを返す。
    pub async fn delete_time_entry(&mut self, id: i64) -> Result<TimeEntry> {
        let entry = self.find_time_entry(id)?;
        self.repository.delete_time_entry(&entry).await?;
        info!("Deleted time entry {}", id);
        self.apply_patch(Patch::<TimeEntry>::Delete(id));

        Ok(entry)
    }

    /// 作成先のワークスペースを決める。指定されない場合は既定のワークスペースにする。
    fn target_workspace(&self, requested: Option<i64>) -> Result<i64, MirrorError> {
        match requested {
            Some(id) => self
                .cache
                .workspace(id)
                .map(|workspace| workspace.id)
                .ok_or(MirrorError::UnknownWorkspace(id)),
            None => self.cache.primary_workspace(),
        }
    }

    /// プロジェクトを作成する。ワークスペースが指定されない場合は既定のワークスペースに作成する。
    pub async fn create_project(&mut self, name: &str, workspace_id: Option<i64>) -> Result<Project> {
        let workspace_id = self.target_workspace(workspace_id)?;
        let project = self.repository.create_project(name, workspace_id).await?;
        info!("Created project {}", project.id);
        self.apply_patch(Patch::Create(project.clone()));

        Ok(project)
    }

    pub async fn update_project(&mut self, project: Project) -> Result<Project> {
        if self.cache.project(project.id).is_none() {
            return Err(MirrorError::UnknownProject(project.id).into());
        }
        let updated = self.repository.update_project(&project).await?;
        info!("Updated project {}", updated.id);
        self.apply_patch(Patch::Update(updated.clone()));

        Ok(updated)
    }

    /// プロジェクトを削除する。
    ///
    /// リモートではプロジェクトのtime entryからプロジェクトが外されるため、全体を同期する。
    pub async fn delete_project(&mut self, id: i64) -> Result<Project> {
        let project = self
            .cache
            .project(id)
            .cloned()
            .ok_or(MirrorError::UnknownProject(id))?;
        self.repository.delete_project(&project).await?;
        info!("Deleted project {}; refreshing everything", id);
        self.refresh_or_invalidate(move |cache| {
            if let Some(index) = cache.position::<Project>(id) {
                cache.remove_at::<Project>(index);
            }
            for entry in cache
                .account
                .time_entries
                .iter_mut()
                .filter(|entry| entry.project_id == Some(id))
            {
                entry.project_id = None;
            }
        })
        .await;

        Ok(project)
    }

    /// タグを作成する。ワークスペースが指定されない場合は既定のワークスペースに作成する。
    pub async fn create_tag(&mut self, name: &str, workspace_id: Option<i64>) -> Result<Tag> {
        let workspace_id = self.target_workspace(workspace_id)?;
        let tag = self.repository.create_tag(name, workspace_id).await?;
        info!("Created tag {}", tag.id);
        self.apply_patch(Patch::Create(tag.clone()));

        Ok(tag)
    }

    /// タグを更新する。
    ///
    /// time entryはタグを名前で参照しているため、名前の変更は多くのtime entryに影響する。
    /// そのためパッチではなく全体を同期する。
    pub async fn update_tag(&mut self, tag: Tag) -> Result<Tag> {
        if self.cache.tag(tag.id).is_none() {
            return Err(MirrorError::UnknownTag(tag.id).into());
        }
        let updated = self.repository.update_tag(&tag).await?;
        info!("Updated tag {}; refreshing everything", updated.id);
        let patched = updated.clone();
        self.refresh_or_invalidate(move |cache| {
            if let Some(index) = cache.position::<Tag>(patched.id) {
                cache.replace_at(index, patched);
            }
        })
        .await;

        Ok(updated)
    }

    /// タグを削除する。名前の変更と同じ理由で全体を同期する。
    pub async fn delete_tag(&mut self, id: i64) -> Result<Tag> {
        let tag = self.cache.tag(id).cloned().ok_or(MirrorError::UnknownTag(id))?;
        self.repository.delete_tag(&tag).await?;
        info!("Deleted tag {}; refreshing everything", id);
        self.refresh_or_invalidate(move |cache| {
            if let Some(index) = cache.position::<Tag>(id) {
                cache.remove_at::<Tag>(index);
            }
        })
        .await;

        Ok(tag)
    }

    /// ミラーから期間の集計を作成する。
    pub fn report(&self, span: &Span, filter: &ReportFilter) -> Report {
        generate_report(
            &self.cache,
            span,
            filter,
            self.config.rounding(),
            datetime::now(),
        )
    }
}
