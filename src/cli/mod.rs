use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "project-cloner")]
#[command(about = "Replicate a DevOps project into a new sibling project")]
#[command(long_about = "Project Cloner creates a new project in the same organization and copies the \
                       selected parts of a source project into it: settings, areas and iterations, \
                       repositories, work items, build pipelines, queries, dashboards, wiki and teams. \
                       Start with 'project-cloner validate' to check your connection settings.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clone a source project into a new project
    Clone {
        /// Source project name or ID
        #[arg(help = "Name or ID of the project to copy from")]
        source: String,
        /// Name of the project to create
        #[arg(help = "Name of the new project; must not exist yet")]
        target: String,
        /// Description for the new project
        #[arg(long, help = "Description for the new project (defaults to the source description)")]
        description: Option<String>,
        /// Enable every clone option
        #[arg(long, help = "Copy everything; combine with --exclude-repo to skip repositories")]
        all: bool,
        #[arg(long, help = "Copy the project description and custom properties")]
        settings: bool,
        #[arg(long, help = "Copy area and iteration paths")]
        areas: bool,
        #[arg(long, help = "Create empty repositories with the source names")]
        repositories: bool,
        #[arg(long, help = "Copy work items with their links and attachments")]
        work_items: bool,
        #[arg(long, help = "Copy build pipeline definitions")]
        build_pipelines: bool,
        #[arg(long, help = "Copy shared query folders and queries")]
        queries: bool,
        #[arg(long, help = "Copy team dashboards")]
        dashboards: bool,
        #[arg(long, help = "Copy the project wiki pages")]
        wiki: bool,
        #[arg(long, help = "Create teams and copy group memberships")]
        teams: bool,
        /// Repositories to leave out
        #[arg(long = "exclude-repo", value_name = "NAME", help = "Repository to skip (repeatable)")]
        exclude_repo: Vec<String>,
        /// Where to write the run report
        #[arg(long, value_name = "PATH", help = "Write the JSON run report here instead of the storage directory")]
        report: Option<PathBuf>,
    },
    /// Check that the configured organization is reachable with the configured token
    Validate,
    /// List the process templates available for new projects
    Templates,
}
