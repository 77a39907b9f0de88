use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::Rounding;
use crate::error::MirrorError;

const APP_DIR: &str = "toggl-mirror";

/// 利用者が設定するオプション。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub api_key: String,
    /// 集計時の丸め単位(分)。0の場合は丸めない。
    pub rounding: u32,
    pub default_project_id: Option<i64>,
    /// 当日のtime entryを再開する時に、新しいtime entryを作らず同じものを再開する。
    pub duration_only: bool,
    /// 時間を`H:MM`形式で表示する。
    pub hours_minutes: bool,
    /// time entryの開始時にプロジェクトの指定を必須にする。
    pub ask_for_project: bool,
    /// 自動でリモートと同期しない。
    pub test_mode: bool,
}

impl Config {
    pub fn rounding(&self) -> Rounding {
        Rounding::new(self.rounding)
    }

    /// APIトークンを返す。
    ///
    /// 設定ファイルにない場合は環境変数`TOGGL_API_TOKEN`を利用する。
    pub fn api_token(&self) -> Result<String, MirrorError> {
        if !self.api_key.is_empty() {
            return Ok(self.api_key.clone());
        }
        env::var("TOGGL_API_TOKEN")
            .ok()
            .filter(|token| !token.is_empty())
            .ok_or(MirrorError::MissingApiToken)
    }
}

/// 設定ファイルとキャッシュファイルの場所。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Paths {
    pub config_file: PathBuf,
    pub cache_file: PathBuf,
}

impl Paths {
    /// OS標準のディレクトリを利用する。
    pub fn from_system() -> Result<Self> {
        let config_dir = dirs::config_dir().context("No configuration directory on this system")?;
        let cache_dir = dirs::cache_dir().context("No cache directory on this system")?;

        Ok(Self {
            config_file: config_dir.join(APP_DIR).join("config.json"),
            cache_file: cache_dir.join(APP_DIR).join("cache.json"),
        })
    }

    /// 1つのディレクトリに両方のファイルを置く。
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config_file: dir.join("config.json"),
            cache_file: dir.join("cache.json"),
        }
    }
}
