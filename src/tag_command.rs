use anyhow::Result;
use log::warn;

use crate::account::Tag;
use crate::console::ConsolePresenter;
use crate::sync::Session;
use crate::toggl::TogglRepository;

/// タグを操作するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct TagsArgs {
    #[clap(subcommand)]
    action: Option<TagAction>,
}

#[derive(Debug, clap::Subcommand)]
pub enum TagAction {
    /// List tags by name
    List,
    /// Create a tag in the default workspace
    Add {
        name: String,
        #[clap(long = "workspace", help = "Workspace ID; the default workspace when omitted")]
        workspace: Option<i64>,
    },
    /// Rename a tag (ID or name)
    Rename { tag: String, name: String },
    /// Delete a tag (ID or name)
    Delete { tag: String },
}

pub struct TagCommand<'a, T: TogglRepository> {
    session: Session<'a, T>,
}

impl<'a, T: TogglRepository> TagCommand<'a, T> {
    /// 新しい`TagCommand`を返す。
    ///
    /// # Arguments
    /// * `session` - ミラーとリモートを束ねるセッション
    pub fn new(session: Session<'a, T>) -> Self {
        Self { session }
    }

    /// `tags`サブコマンドの処理を行う。操作が指定されない場合は一覧を表示する。
    ///
    /// 名前の変更と削除は全てのtime entryに影響するため、ミラー全体が同期し直される。
    pub async fn run<P: ConsolePresenter>(&mut self, args: TagsArgs, presenter: &mut P) -> Result<()> {
        self.session.refresh_if_stale().await;

        match args.action.unwrap_or(TagAction::List) {
            TagAction::List => {
                let mut tags: Vec<&Tag> = self.session.cache().account.tags.iter().collect();
                tags.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
                presenter.show_tags(&tags)?;
            }
            TagAction::Add { name, workspace } => {
                let tag = self.session.create_tag(&name, workspace).await?;
                presenter.show_message(&format!("Created tag '{}'", tag.name))?;
            }
            TagAction::Rename { tag, name } => {
                let mut tag = self.session.cache().find_tag(&tag)?.clone();
                tag.name = name;
                let tag = self.session.update_tag(tag).await?;
                presenter.show_message(&format!("Renamed tag to '{}'", tag.name))?;
            }
            TagAction::Delete { tag } => {
                let tag = self.session.cache().find_tag(&tag)?.clone();
                if self.session.cache().tag_has_time_entries(&tag.name) {
                    warn!("Tag '{}' will be removed from its time entries", tag.name);
                }
                let tag = self.session.delete_tag(tag.id).await?;
                presenter.show_message(&format!("Deleted tag '{}'", tag.name))?;
            }
        }

        Ok(())
    }
}
