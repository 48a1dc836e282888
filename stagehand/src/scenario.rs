use crate::{
    config::{Config, Platform},
    containers::{Container, InstanceState, Network, LABEL_INSTANCE, LABEL_SCENARIO},
    driver::{render_login_cmd, Driver, DriverRegistry, LoginGeometry},
    types::{InstanceName, InstanceRuntimeName, NetworkName},
};
use anyhow::{bail, Result};
use bollard::auth::DockerCredentials;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Keeps an instance alive until something interactive takes over.
const DEFAULT_INSTANCE_COMMAND: [&str; 3] = ["bash", "-c", "while true; do sleep 10000; done"];

/// A scenario run: the validated config, the driver it selected, and the
/// runtime containers/networks backing its instances.
#[derive(Debug)]
pub struct Scenario {
    config: Arc<Config>,
    driver: Box<dyn Driver>,
    containers: Vec<Container>,
    networks: BTreeMap<NetworkName, Network>,
}

impl Scenario {
    /// Resolve the configured driver but skip the container engine entirely;
    /// enough for config checks, login command assembly, and inventory
    /// export.
    pub fn from_config_no_runtime(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let driver = DriverRegistry::with_builtin_drivers()
            .resolve(&config.driver, config.clone())?;
        Ok(Scenario {
            config,
            driver,
            containers: Vec::new(),
            networks: BTreeMap::new(),
        })
    }

    pub async fn from_config(config: Config) -> Result<Self> {
        let mut scenario = Self::from_config_no_runtime(config)?;
        scenario.build_runtime_containers().await?;
        Ok(scenario)
    }

    pub fn try_from_config_path_no_runtime<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::read(path)?;
        Self::from_config_no_runtime(config)
    }

    pub async fn try_from_config_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::read(path)?;
        Self::from_config(config).await
    }

    pub fn try_from_working_directory_no_runtime() -> Result<Self> {
        let config_path = stagehand_config::find_config_file()?;
        Self::try_from_config_path_no_runtime(config_path)
    }

    pub async fn try_from_working_directory() -> Result<Self> {
        let config_path = stagehand_config::find_config_file()?;
        Self::try_from_config_path(config_path).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn containers(&self) -> impl IntoIterator<Item = &Container> {
        self.containers.as_slice()
    }

    pub fn runtime_name_for_instance(&self, instance: &str) -> Result<InstanceRuntimeName> {
        for platform in &self.config.platforms {
            if platform.name.as_str() == instance {
                return Ok(InstanceRuntimeName::new(
                    &self.config.global.name,
                    &platform.name,
                ));
            }
        }

        bail!(
            "instance '{instance}' is not a platform of scenario '{}'",
            self.config.global.name
        )
    }

    /// The full backend CLI command line for an interactive shell into a
    /// running instance, geometry included, split into argv form.
    pub fn login_command(
        &self,
        instance: &str,
        geometry: LoginGeometry,
    ) -> Result<Vec<String>> {
        let runtime_name = self.runtime_name_for_instance(instance)?;

        let mut options = self.driver.login_options(runtime_name.as_str());
        geometry.apply(&mut options);

        let rendered = render_login_cmd(self.driver.login_cmd_template(), &options)?;
        Ok(rendered.split_whitespace().map(str::to_owned).collect())
    }

    /// Per-instance connection-option mappings for the provisioning
    /// integration layer. An empty mapping is valid output: it means the
    /// backend offers no special connection metadata.
    pub fn provisioner_inventory(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut inventory = BTreeMap::new();
        for platform in &self.config.platforms {
            let runtime_name =
                InstanceRuntimeName::new(&self.config.global.name, &platform.name);
            let options = self
                .driver
                .ansible_connection_options(runtime_name.as_str());
            if !options.is_supported() {
                warn!(
                    driver = self.driver.name(),
                    instance = platform.name.as_str(),
                    "driver does not provide connection metadata yet"
                );
            }
            inventory.insert(platform.name.to_string(), options.into_map());
        }
        inventory
    }

    async fn build_runtime_containers(&mut self) -> Result<()> {
        debug_assert!(self.containers.is_empty());

        for platform in &self.config.platforms {
            for network_name in platform.networks.iter() {
                if !self.networks.contains_key(network_name) {
                    let network = Network::builder()
                        .name(network_name.as_str())
                        .scenario(self.config.global.name.as_str())
                        .resolve()
                        .await?;
                    self.networks.insert(network_name.clone(), network);
                }
            }
        }

        let scenario_name = self.config.global.name.clone();
        for platform in self.config.platforms.iter() {
            let runtime_name = InstanceRuntimeName::new(&scenario_name, &platform.name);

            let mut builder = Container::builder()
                .with_name(runtime_name.as_str())
                .with_privileged(platform.privileged)
                .with_pull(platform.pull)
                .with_published_ports(platform.published_ports.iter().copied())
                .with_cmd(instance_command(platform))
                .with_labels([
                    (LABEL_SCENARIO, scenario_name.as_str()),
                    (LABEL_INSTANCE, platform.name.as_str()),
                ]);

            if let Some(ref image) = platform.image {
                builder.set_image(image);
            }
            if let Some(ref containerfile) = platform.containerfile {
                builder.set_containerfile(containerfile);
            }
            if let Some(ref context) = platform.context {
                builder.set_context(context);
            }

            let mut env = platform.environment_variables.clone();
            env.apply_defaults(&self.config.global.environment_variables);
            builder.set_env(&*env);

            if !platform.volumes.is_empty() {
                builder.set_mounts(
                    platform
                        .volumes
                        .iter()
                        .map(|(host, guest)| (host.to_string_lossy(), guest.to_string_lossy())),
                );
            }

            if !platform.networks.is_empty() {
                builder.set_networks(platform.networks.iter().map(|n| n.as_str()));
            }

            if let Some(credentials) = registry_credentials(platform) {
                builder.set_registry_credentials(credentials);
            }

            self.containers.push(builder.resolve().await?);
        }

        Ok(())
    }

    pub async fn build(&mut self) -> Result<()> {
        for rt in &mut self.containers {
            rt.build().await?;
        }

        Ok(())
    }

    pub async fn start(&mut self) -> Result<()> {
        for rt in &mut self.containers {
            rt.start().await?;
        }

        Ok(())
    }

    /// Build images and bring every instance up.
    pub async fn create(&mut self) -> Result<()> {
        self.build().await?;
        self.start().await?;
        debug!(scenario = self.config.global.name.as_str(), "scenario created");

        Ok(())
    }

    /// Tear everything down. Safe to run against a partially created or
    /// already destroyed scenario.
    pub async fn destroy(&mut self) -> Result<()> {
        for rt in &mut self.containers {
            rt.stop().await?;
            rt.remove().await?;
        }

        for network in self.networks.values_mut() {
            network.remove().await?;
        }

        debug!(scenario = self.config.global.name.as_str(), "scenario destroyed");

        Ok(())
    }

    pub async fn instance_states(&self) -> Result<Vec<(InstanceName, InstanceState)>> {
        let mut states = Vec::with_capacity(self.containers.len());
        for (platform, container) in self.config.platforms.iter().zip(self.containers.iter()) {
            states.push((platform.name.clone(), container.state().await?));
        }
        Ok(states)
    }
}

fn instance_command(platform: &Platform) -> Vec<String> {
    match &platform.command {
        Some(command) => vec!["bash".to_owned(), "-c".to_owned(), command.clone()],
        None => DEFAULT_INSTANCE_COMMAND
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
    }
}

fn registry_credentials(platform: &Platform) -> Option<DockerCredentials> {
    let registry = platform.registry.as_ref()?;
    let credentials = registry.credentials.as_ref();
    let username = credentials
        .and_then(|c| c.username_env.as_deref())
        .and_then(|var| std::env::var(var).ok());
    let password = credentials
        .and_then(|c| c.password_env.as_deref())
        .and_then(|var| std::env::var(var).ok());
    Some(DockerCredentials {
        username,
        password,
        serveraddress: registry.url.clone(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Global;
    use crate::types::{DriverName, ScenarioName};
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn scenario_config(driver: &str) -> Config {
        Config {
            global: Global {
                name: ScenarioName::new("smoke").unwrap(),
                environment_variables: Default::default(),
            },
            driver: DriverName::new(driver).unwrap(),
            platforms: vec![Platform {
                name: InstanceName::new("web1").unwrap(),
                image: Some("docker.io/library/ubuntu:latest".to_owned()),
                containerfile: None,
                context: None,
                command: None,
                privileged: false,
                pull: true,
                environment_variables: Default::default(),
                volumes: Default::default(),
                published_ports: Vec::new(),
                networks: Vec::new(),
                registry: None,
            }],
        }
    }

    #[test]
    fn resolves_the_configured_driver() {
        let scenario = Scenario::from_config_no_runtime(scenario_config("podman")).unwrap();
        assert_eq!(scenario.driver().name(), "podman");
    }

    #[test]
    fn unknown_drivers_fail_before_any_container_operation() {
        let err =
            Scenario::from_config_no_runtime(scenario_config("unknown-backend")).unwrap_err();
        assert!(err.to_string().contains("Unknown driver"));
    }

    #[test]
    fn login_commands_render_end_to_end() {
        let scenario = Scenario::from_config_no_runtime(scenario_config("podman")).unwrap();
        let argv = scenario
            .login_command(
                "web1",
                LoginGeometry {
                    columns: 120,
                    lines: 40,
                },
            )
            .unwrap();
        assert_eq!(
            argv,
            vec![
                "podman", "exec", "-e", "COLUMNS=120", "-e", "LINES=40", "-e", "TERM=xterm",
                "-ti", "smoke-web1", "bash",
            ]
        );
    }

    #[test]
    fn login_rejects_unknown_instances() {
        let scenario = Scenario::from_config_no_runtime(scenario_config("docker")).unwrap();
        assert!(scenario
            .login_command("db9", LoginGeometry::default())
            .is_err());
    }

    #[test]
    fn inventory_carries_docker_connection_metadata() {
        let scenario = Scenario::from_config_no_runtime(scenario_config("docker")).unwrap();
        let inventory = scenario.provisioner_inventory();
        assert_eq!(
            inventory.get("web1").unwrap().get("ansible_connection"),
            Some(&"docker".to_owned())
        );
    }

    #[test]
    #[traced_test]
    fn inventory_flags_pending_connection_support() {
        let scenario = Scenario::from_config_no_runtime(scenario_config("podman")).unwrap();
        let inventory = scenario.provisioner_inventory();
        assert!(inventory.get("web1").unwrap().is_empty());
        assert!(logs_contain("does not provide connection metadata"));
    }

    #[test]
    fn instance_commands_wrap_in_a_shell() {
        let mut platform = scenario_config("docker").platforms.remove(0);
        assert_eq!(instance_command(&platform)[0], "bash");

        platform.command = Some("sleep infinity".to_owned());
        assert_eq!(
            instance_command(&platform),
            vec!["bash", "-c", "sleep infinity"]
        );
    }
}
