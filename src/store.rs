use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};

/// JSONファイルを読み込む。
///
/// ファイルが存在しない場合や壊れている場合は既定値を返す。
/// 壊れたファイルは次に保存した時に上書きされる。
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("{} does not exist yet", path.display());
            return T::default();
        }
        Err(err) => {
            warn!("Failed to read {}: {}", path.display(), err);
            return T::default();
        }
    };

    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(err) => {
            warn!("Ignoring unreadable {}: {}", path.display(), err);
            T::default()
        }
    }
}

/// 値をJSONファイルに保存する。親ディレクトリがなければ作成する。
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Saved {}", path.display());

    Ok(())
}

/// ファイルを削除する。存在しない場合は何もしない。
pub fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
