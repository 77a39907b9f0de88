use thiserror::Error;

/// ミラーの参照や操作の前提が満たされない時のエラー。
///
/// いずれも利用者にそのまま表示できるメッセージを持つ。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MirrorError {
    #[error("Invalid time entry ID {0}")]
    UnknownTimeEntry(i64),
    #[error("Invalid project ID {0}")]
    UnknownProject(i64),
    #[error("Unknown project '{0}'")]
    UnknownProjectName(String),
    #[error("Time entry {0} is not running")]
    NotRunning(i64),
    #[error("Time entry {0} is already running")]
    AlreadyRunning(i64),
    #[error("Invalid tag ID {0}")]
    UnknownTag(i64),
    #[error("Unknown tag '{0}'")]
    UnknownTagName(String),
    #[error("Invalid workspace ID {0}")]
    UnknownWorkspace(i64),
    #[error("No workspace is known yet; run `sync` first")]
    NoWorkspace,
    #[error("No API token; run `token <TOKEN>` or set TOGGL_API_TOKEN")]
    MissingApiToken,
    #[error("A project is required; pass --project")]
    ProjectRequired,
}
