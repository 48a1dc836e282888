use clap::Parser;
use std::path::PathBuf;

pub fn parse_args() -> Args {
    Args::parse()
}

/// `stagehand` - scenario-based test instance lifecycle management
///
/// Stagehand reads a scenario config, brings up the containerized test
/// instances it describes through the configured infrastructure driver,
/// opens interactive shells into them, and tears everything down again.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about, disable_help_subcommand(true))]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Parser, Debug)]
pub enum Command {
    #[command(subcommand)]
    Scenario(Scenario),
    #[command(subcommand)]
    Instance(Instance),
}

#[derive(Parser, Debug)]
pub enum Scenario {
    Check(Check),
    Create(Create),
    Destroy(Destroy),
    #[command(subcommand)]
    Export(Export),
}

/// Check a scenario configuration
#[derive(Parser, Debug)]
pub struct Check {
    #[command(flatten)]
    pub common: CommonScenarioOptions,
}

/// Build images and bring up a scenario's instances
#[derive(Parser, Debug)]
pub struct Create {
    #[command(flatten)]
    pub common: CommonScenarioOptions,
}

/// Tear down a scenario's instances and networks
#[derive(Parser, Debug)]
pub struct Destroy {
    #[command(flatten)]
    pub common: CommonScenarioOptions,
}

/// Export scenario data for external tooling
#[derive(Parser, Debug)]
pub enum Export {
    /// Export the provisioner inventory as JSON to stdout
    Inventory {
        #[command(flatten)]
        common: CommonScenarioOptions,
    },
}

#[derive(Parser, Debug)]
pub enum Instance {
    List(List),
    Login(Login),
    Stats(Stats),
}

/// List instances and their engine-reported state
#[derive(Parser, Debug)]
pub struct List {
    #[command(flatten)]
    pub common: CommonScenarioOptions,
}

/// Open an interactive shell into a running instance
#[derive(Parser, Debug)]
pub struct Login {
    #[command(flatten)]
    pub common: CommonScenarioOptions,

    pub instance_name: String,
}

/// Print instance resource usage
#[derive(Parser, Debug)]
pub struct Stats {
    #[command(flatten)]
    pub common: CommonScenarioOptions,

    pub instance_name: String,
}

#[derive(Parser, Debug)]
pub struct CommonScenarioOptions {
    /// Path to config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CommonScenarioOptions {
    pub(crate) async fn resolve_scenario(&self) -> anyhow::Result<stagehand::Scenario> {
        if let Some(ref config) = self.config {
            stagehand::Scenario::try_from_config_path(config).await
        } else {
            stagehand::Scenario::try_from_working_directory().await
        }
    }

    pub(crate) fn resolve_scenario_no_runtime(&self) -> anyhow::Result<stagehand::Scenario> {
        if let Some(ref config) = self.config {
            stagehand::Scenario::try_from_config_path_no_runtime(config)
        } else {
            stagehand::Scenario::try_from_working_directory_no_runtime()
        }
    }
}
