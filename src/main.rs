use anyhow::Result;
use clap::Parser;

use project_cloner::cli::commands::clone::CloneCommand;
use project_cloner::cli::commands::templates::TemplatesCommand;
use project_cloner::cli::commands::validate::ValidateCommand;
use project_cloner::cli::commands::{show_usage, Command};
use project_cloner::cli::{Cli, Commands};
use project_cloner::clone::CloneOptionSet;
use project_cloner::config::ObservabilityConfig;
use project_cloner::{config, init_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let observability = config()
        .map(|c| c.observability.clone())
        .unwrap_or_else(|_| ObservabilityConfig::default());
    if let Err(e) = init_telemetry(&observability) {
        eprintln!("⚠️  Logging disabled: {e}");
    }

    match cli.command {
        // No subcommand: explain how to use the tool
        None => tokio::runtime::Runtime::new()?.block_on(async { show_usage().await }),
        Some(Commands::Clone {
            source,
            target,
            description,
            all,
            settings,
            areas,
            repositories,
            work_items,
            build_pipelines,
            queries,
            dashboards,
            wiki,
            teams,
            exclude_repo,
            report,
        }) => {
            let options = CloneOptionSet {
                settings,
                classification_nodes: areas,
                repositories,
                work_items,
                build_pipelines,
                queries,
                dashboards,
                wiki,
                teams,
                excluded_repositories: exclude_repo,
            };
            let command = CloneCommand::new(source, target)
                .with_description(description)
                .with_options(options)
                .with_all(all)
                .with_report_path(report);
            tokio::runtime::Runtime::new()?.block_on(async { command.execute().await })
        }
        Some(Commands::Validate) => {
            tokio::runtime::Runtime::new()?.block_on(async { ValidateCommand::new().execute().await })
        }
        Some(Commands::Templates) => {
            tokio::runtime::Runtime::new()?.block_on(async { TemplatesCommand::new().execute().await })
        }
    }
}
