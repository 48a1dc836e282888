use crate::opts;
use anyhow::Result;
use std::borrow::Cow;
use std::path::Path;
use tracing::debug;

pub async fn handle(s: opts::Scenario) -> Result<()> {
    match s {
        opts::Scenario::Check(check) => {
            let config_path: Cow<Path> = if let Some(ref config_path) = check.common.config {
                config_path.into()
            } else {
                stagehand_config::find_config_file()?.into()
            };
            println!("Checking configuration file '{}'", config_path.display());
            let scenario = stagehand::Scenario::try_from_config_path_no_runtime(&*config_path)?;
            println!("{:#?}", scenario.config());
            println!(
                "scenario '{}' is valid (driver: {})",
                scenario.config().global.name,
                scenario.driver().name()
            );
            Ok(())
        }
        opts::Scenario::Create(create) => {
            let mut scenario = create.common.resolve_scenario().await?;
            debug!(
                scenario = scenario.config().global.name.as_str(),
                "creating scenario"
            );
            scenario.create().await?;
            println!("scenario '{}' created", scenario.config().global.name);
            Ok(())
        }
        opts::Scenario::Destroy(destroy) => {
            let mut scenario = destroy.common.resolve_scenario().await?;
            scenario.destroy().await?;
            println!("scenario '{}' destroyed", scenario.config().global.name);
            Ok(())
        }
        opts::Scenario::Export(opts::Export::Inventory { common }) => {
            let scenario = common.resolve_scenario_no_runtime()?;
            let inventory = scenario.provisioner_inventory();
            println!("{}", serde_json::to_string_pretty(&inventory)?);
            Ok(())
        }
    }
}
