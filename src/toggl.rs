use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use reqwest::{header::CONTENT_TYPE, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};

use crate::account::{AccountSnapshot, Project, Tag};
use crate::datetime;
use crate::time_entry::{TimeEntry, TimerState};

const API_URL: &str = "https://api.track.toggl.com/api/v9";
const CREATED_WITH: &str = "toggl-mirror";

/// 新しく作成するtime entry。
#[derive(Clone, Debug, PartialEq)]
pub struct NewTimeEntry {
    pub workspace_id: i64,
    pub description: String,
    pub project_id: Option<i64>,
    pub tags: Vec<String>,
    pub start: DateTime<Utc>,
    /// 計測済みの秒数。`None`の場合は実行中として作成する。
    pub duration: Option<i64>,
}

/// Toggl APIの操作を表すtrait。
///
/// 成功時は操作後のリモートの状態を返す。失敗時のエラーはそのまま呼び出し側に返し、再試行はしない。
#[cfg_attr(test, automock)]
pub trait TogglRepository {
    /// アカウント全体を取得する。
    async fn read_account(&self) -> Result<AccountSnapshot>;

    async fn create_time_entry(&self, entry: &NewTimeEntry) -> Result<TimeEntry>;

    async fn update_time_entry(&self, entry: &TimeEntry) -> Result<TimeEntry>;

    async fn delete_time_entry(&self, entry: &TimeEntry) -> Result<()>;

    async fn stop_time_entry(&self, entry: &TimeEntry) -> Result<TimeEntry>;

    /// 停止しているtime entryを再開する。
    ///
    /// `duration_only`が有効で当日に開始したtime entryの場合は同じtime entryを再開し、
    /// それ以外は同じ内容で新しいtime entryを開始する。
    async fn continue_time_entry(&self, entry: &TimeEntry, duration_only: bool) -> Result<TimeEntry>;

    async fn create_project(&self, name: &str, workspace_id: i64) -> Result<Project>;

    async fn update_project(&self, project: &Project) -> Result<Project>;

    async fn delete_project(&self, project: &Project) -> Result<()>;

    async fn create_tag(&self, name: &str, workspace_id: i64) -> Result<Tag>;

    async fn update_tag(&self, tag: &Tag) -> Result<Tag>;

    async fn delete_tag(&self, tag: &Tag) -> Result<()>;
}

/// time entryの作成、更新時のリクエストボディ。
#[derive(Debug, Serialize)]
struct TimeEntryRequest<'a> {
    created_with: &'a str,
    workspace_id: i64,
    description: &'a str,
    project_id: Option<i64>,
    tags: &'a [String],
    start: DateTime<Utc>,
    duration: i64,
}

#[derive(Debug, Serialize)]
struct ProjectRequest<'a> {
    name: &'a str,
    active: bool,
}

#[derive(Debug, Serialize)]
struct TagRequest<'a> {
    name: &'a str,
    workspace_id: i64,
}

/// Toggl APIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = TogglClient::new(&token);
/// let account = client.read_account().await.unwrap();
/// ```
pub struct TogglClient {
    client: Client,
    api_url: String,
    api_token: String,
}

impl TogglClient {
    /// 新しい`TogglClient`を返す。
    pub fn new(api_token: &str) -> Self {
        Self::with_api_url(api_token, API_URL)
    }

    /// 接続先を指定して`TogglClient`を返す。
    pub fn with_api_url(api_token: &str, api_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_url, path))
            .basic_auth(&self.api_token, Some("api_token"))
            .header(CONTENT_TYPE, "application/json")
    }

    /// リクエストを送信し、レスポンスをデシリアライズする。
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .context("Failed to deserialize response")
    }

    /// リクエストを送信し、エラーステータスの場合はレスポンスの本文をエラーにする。
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to Toggl API at {}", self.api_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Toggl API returned {}: {}", status, body.trim());
        }

        Ok(response)
    }

    fn time_entry_path(workspace_id: i64, id: i64) -> String {
        format!("/workspaces/{}/time_entries/{}", workspace_id, id)
    }
}

impl TogglRepository for TogglClient {
    async fn read_account(&self) -> Result<AccountSnapshot> {
        let account: AccountSnapshot = self
            .send_json(
                self.request(Method::GET, "/me")
                    .query(&[("with_related_data", "true")]),
            )
            .await
            .context("Failed to get account from toggl")?;
        info!(
            "Fetched account: {} projects, {} time entries, {} tags, {} workspaces",
            account.projects.len(),
            account.time_entries.len(),
            account.tags.len(),
            account.workspaces.len()
        );

        Ok(account)
    }

    async fn create_time_entry(&self, entry: &NewTimeEntry) -> Result<TimeEntry> {
        let body = TimeEntryRequest {
            created_with: CREATED_WITH,
            workspace_id: entry.workspace_id,
            description: &entry.description,
            project_id: entry.project_id,
            tags: &entry.tags,
            start: entry.start,
            duration: entry.duration.unwrap_or(-1),
        };
        debug!("Creating time entry: {:?}", body);

        self.send_json(
            self.request(
                Method::POST,
                &format!("/workspaces/{}/time_entries", entry.workspace_id),
            )
            .json(&body),
        )
        .await
        .context("Failed to create time entry")
    }

    async fn update_time_entry(&self, entry: &TimeEntry) -> Result<TimeEntry> {
        let start = entry
            .start
            .with_context(|| format!("Time entry {} has no start time", entry.id))?;
        let duration = match entry.state {
            TimerState::Stopped { duration } => duration,
            TimerState::Running { .. } => -1,
        };
        let body = TimeEntryRequest {
            created_with: CREATED_WITH,
            workspace_id: entry.workspace_id,
            description: &entry.description,
            project_id: entry.project_id,
            tags: &entry.tags,
            start,
            duration,
        };
        debug!("Updating time entry {}: {:?}", entry.id, body);

        self.send_json(
            self.request(
                Method::PUT,
                &Self::time_entry_path(entry.workspace_id, entry.id),
            )
            .json(&body),
        )
        .await
        .with_context(|| format!("Failed to update time entry {}", entry.id))
    }

    async fn delete_time_entry(&self, entry: &TimeEntry) -> Result<()> {
        self.send(self.request(
            Method::DELETE,
            &Self::time_entry_path(entry.workspace_id, entry.id),
        ))
        .await
        .with_context(|| format!("Failed to delete time entry {}", entry.id))?;

        Ok(())
    }

    async fn stop_time_entry(&self, entry: &TimeEntry) -> Result<TimeEntry> {
        self.send_json(self.request(
            Method::PATCH,
            &format!("{}/stop", Self::time_entry_path(entry.workspace_id, entry.id)),
        ))
        .await
        .with_context(|| format!("Failed to stop time entry {}", entry.id))
    }

    async fn continue_time_entry(&self, entry: &TimeEntry, duration_only: bool) -> Result<TimeEntry> {
        let now = datetime::now();
        let started_today = entry
            .start
            .map(|start| start.with_timezone(&Local).date_naive() == datetime::today())
            .unwrap_or(false);

        if duration_only && started_today {
            // 経過時間を保ったまま同じtime entryを再開する
            let mut resumed = entry.clone();
            let start = now - Duration::seconds(entry.elapsed_seconds(now));
            resumed.start = Some(start);
            resumed.stop = None;
            resumed.state = TimerState::Running { started_at: start };
            return self.update_time_entry(&resumed).await;
        }

        self.create_time_entry(&NewTimeEntry {
            workspace_id: entry.workspace_id,
            description: entry.description.clone(),
            project_id: entry.project_id,
            tags: entry.tags.clone(),
            start: now,
            duration: None,
        })
        .await
    }

    async fn create_project(&self, name: &str, workspace_id: i64) -> Result<Project> {
        self.send_json(
            self.request(
                Method::POST,
                &format!("/workspaces/{}/projects", workspace_id),
            )
            .json(&ProjectRequest { name, active: true }),
        )
        .await
        .with_context(|| format!("Failed to create project '{}'", name))
    }

    async fn update_project(&self, project: &Project) -> Result<Project> {
        self.send_json(
            self.request(
                Method::PUT,
                &format!("/workspaces/{}/projects/{}", project.workspace_id, project.id),
            )
            .json(&ProjectRequest {
                name: &project.name,
                active: project.active,
            }),
        )
        .await
        .with_context(|| format!("Failed to update project {}", project.id))
    }

    async fn delete_project(&self, project: &Project) -> Result<()> {
        self.send(self.request(
            Method::DELETE,
            &format!("/workspaces/{}/projects/{}", project.workspace_id, project.id),
        ))
        .await
        .with_context(|| format!("Failed to delete project {}", project.id))?;

        Ok(())
    }

    async fn create_tag(&self, name: &str, workspace_id: i64) -> Result<Tag> {
        self.send_json(
            self.request(Method::POST, &format!("/workspaces/{}/tags", workspace_id))
                .json(&TagRequest { name, workspace_id }),
        )
        .await
        .with_context(|| format!("Failed to create tag '{}'", name))
    }

    async fn update_tag(&self, tag: &Tag) -> Result<Tag> {
        self.send_json(
            self.request(
                Method::PUT,
                &format!("/workspaces/{}/tags/{}", tag.workspace_id, tag.id),
            )
            .json(&TagRequest {
                name: &tag.name,
                workspace_id: tag.workspace_id,
            }),
        )
        .await
        .with_context(|| format!("Failed to update tag {}", tag.id))
    }

    async fn delete_tag(&self, tag: &Tag) -> Result<()> {
        self.send(self.request(
            Method::DELETE,
            &format!("/workspaces/{}/tags/{}", tag.workspace_id, tag.id),
        ))
        .await
        .with_context(|| format!("Failed to delete tag {}", tag.id))?;

        Ok(())
    }
}
