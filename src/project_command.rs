use anyhow::Result;
use log::warn;

use crate::account::Project;
use crate::console::ConsolePresenter;
use crate::sync::Session;
use crate::toggl::TogglRepository;

/// プロジェクトを操作するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct ProjectsArgs {
    #[clap(subcommand)]
    action: Option<ProjectAction>,
}

#[derive(Debug, clap::Subcommand)]
pub enum ProjectAction {
    /// List projects by name
    List {
        #[clap(long = "all", help = "Include archived projects")]
        all: bool,
    },
    /// Create a project in the default workspace
    Add {
        name: String,
        #[clap(long = "workspace", help = "Workspace ID; the default workspace when omitted")]
        workspace: Option<i64>,
    },
    /// Rename a project (ID or name)
    Rename { project: String, name: String },
    /// Archive a project (ID or name)
    Archive { project: String },
    /// Restore an archived project (ID or name)
    Unarchive { project: String },
    /// Delete a project (ID or name)
    Delete { project: String },
}

pub struct ProjectCommand<'a, T: TogglRepository> {
    session: Session<'a, T>,
}

impl<'a, T: TogglRepository> ProjectCommand<'a, T> {
    /// 新しい`ProjectCommand`を返す。
    ///
    /// # Arguments
    /// * `session` - ミラーとリモートを束ねるセッション
    pub fn new(session: Session<'a, T>) -> Self {
        Self { session }
    }

    /// `projects`サブコマンドの処理を行う。操作が指定されない場合は一覧を表示する。
    pub async fn run<P: ConsolePresenter>(&mut self, args: ProjectsArgs, presenter: &mut P) -> Result<()> {
        self.session.refresh_if_stale().await;

        match args.action.unwrap_or(ProjectAction::List { all: false }) {
            ProjectAction::List { all } => {
                let mut projects: Vec<&Project> = self
                    .session
                    .cache()
                    .account
                    .projects
                    .iter()
                    .filter(|project| all || project.active)
                    .collect();
                projects.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
                presenter.show_projects(&projects)?;
            }
            ProjectAction::Add { name, workspace } => {
                let project = self.session.create_project(&name, workspace).await?;
                presenter.show_message(&format!("Created project '{}'", project.name))?;
            }
            ProjectAction::Rename { project, name } => {
                let mut project = self.find(&project)?;
                project.name = name;
                let project = self.session.update_project(project).await?;
                presenter.show_message(&format!("Renamed project to '{}'", project.name))?;
            }
            ProjectAction::Archive { project } => {
                self.set_active(&project, false, presenter).await?;
            }
            ProjectAction::Unarchive { project } => {
                self.set_active(&project, true, presenter).await?;
            }
            ProjectAction::Delete { project } => {
                let project = self.find(&project)?;
                if self.session.cache().project_has_time_entries(project.id) {
                    warn!("Time entries of '{}' will no longer have a project", project.name);
                }
                let project = self.session.delete_project(project.id).await?;
                presenter.show_message(&format!("Deleted project '{}'", project.name))?;
            }
        }

        Ok(())
    }

    fn find(&self, key: &str) -> Result<Project> {
        Ok(self.session.cache().find_project(key)?.clone())
    }

    async fn set_active<P: ConsolePresenter>(&mut self, key: &str, active: bool, presenter: &mut P) -> Result<()> {
        let mut project = self.find(key)?;
        project.active = active;
        let project = self.session.update_project(project).await?;
        let state = if active { "Restored" } else { "Archived" };
        presenter.show_message(&format!("{} project '{}'", state, project.name))
    }
}
