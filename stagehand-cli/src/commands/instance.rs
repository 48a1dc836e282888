use crate::opts::{Instance, List, Login, Stats};
use crate::stats::InstanceAndStats;
use anyhow::{bail, Result};
use stagehand::LoginGeometry;
use std::io::{self, Write};
use tabwriter::TabWriter;
use tracing::debug;

pub async fn handle(s: Instance) -> Result<()> {
    match s {
        Instance::List(List { common }) => {
            let scenario = common.resolve_scenario().await?;
            let states = scenario.instance_states().await?;

            let mut tw = TabWriter::new(io::stdout());
            writeln!(tw, "NAME\tDRIVER\tSTATE")?;
            for (name, state) in states {
                writeln!(tw, "{name}\t{}\t{}", scenario.driver().name(), state.as_str())?;
            }
            tw.flush()?;
        }
        Instance::Login(Login {
            common,
            instance_name,
        }) => {
            let scenario = common.resolve_scenario_no_runtime()?;
            let argv = scenario.login_command(&instance_name, login_geometry())?;
            debug!(?argv, "spawning login shell");

            let Some((program, args)) = argv.split_first() else {
                bail!("driver produced an empty login command");
            };
            let status = tokio::process::Command::new(program)
                .args(args)
                .status()
                .await?;
            if !status.success() {
                bail!("login shell for '{instance_name}' exited with {status}");
            }
        }
        Instance::Stats(Stats {
            common,
            instance_name,
        }) => {
            let scenario = common.resolve_scenario().await?;
            let runtime_name = scenario.runtime_name_for_instance(&instance_name)?;

            for container in scenario.containers() {
                if container.name() == Some(runtime_name.as_str()) {
                    let stats =
                        InstanceAndStats::new(instance_name.clone(), container.stats().await?);

                    let mut tw = TabWriter::new(io::stdout());
                    writeln!(tw, "{}", InstanceAndStats::TABWRITER_HEADER)?;
                    stats.tabwriter_writeln(&mut tw)?;
                    tw.flush()?;

                    break;
                }
            }
        }
    }

    Ok(())
}

/// Geometry for the login shell; falls back to 80x24 when stdout is not a
/// terminal.
fn login_geometry() -> LoginGeometry {
    match crossterm::terminal::size() {
        Ok((columns, lines)) => LoginGeometry { columns, lines },
        Err(_) => LoginGeometry::default(),
    }
}
