use crate::config::Config;
use crate::driver::{ConnectionOptions, DockerDriver, Driver};
use derive_more::Display;
use std::sync::Arc;

pub(crate) const NAME: &str = "podman";

const LOGIN_CMD_TEMPLATE: &str =
    "podman exec -e COLUMNS={columns} -e LINES={lines} -e TERM=xterm -ti {instance} bash";

/// Podman is CLI-compatible with the Docker baseline for every lifecycle
/// operation, so this driver composes it and substitutes only the
/// shell-invocation surface: the exec verb and the environment overrides
/// passed to it.
#[derive(Clone, Debug, Display)]
#[display(fmt = "podman")]
pub struct PodmanDriver {
    base: DockerDriver,
}

impl PodmanDriver {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            base: DockerDriver::new(config),
        }
    }
}

impl Driver for PodmanDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config(&self) -> &Config {
        self.base.config()
    }

    fn login_cmd_template(&self) -> &'static str {
        LOGIN_CMD_TEMPLATE
    }

    fn ansible_connection_options(&self, _instance_name: &str) -> ConnectionOptions {
        // No connection-plugin integration is available for this backend yet;
        // the inventory layer treats this as an empty option set.
        ConnectionOptions::Unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_support::scenario_config;
    use crate::driver::{template_placeholders, LoginOptions};
    use std::collections::BTreeSet;

    #[test]
    fn template_execs_through_the_podman_cli() {
        let driver = PodmanDriver::new(scenario_config(NAME));
        let template = driver.login_cmd_template();
        assert!(template.starts_with("podman exec"));
        assert!(template.contains("-ti {instance} bash"));
    }

    #[test]
    fn template_uses_the_contract_placeholder_set() {
        let driver = PodmanDriver::new(scenario_config(NAME));
        assert_eq!(
            template_placeholders(driver.login_cmd_template()),
            BTreeSet::from([
                "instance".to_owned(),
                "columns".to_owned(),
                "lines".to_owned()
            ])
        );
    }

    #[test]
    fn login_options_name_the_instance_only() {
        let driver = PodmanDriver::new(scenario_config(NAME));
        assert_eq!(
            driver.login_options("web1"),
            LoginOptions::from([("instance".to_owned(), "web1".to_owned())])
        );
    }

    #[test]
    fn connection_options_are_a_pending_capability() {
        let driver = PodmanDriver::new(scenario_config(NAME));
        let options = driver.ansible_connection_options("web1");
        assert!(!options.is_supported());
        assert!(options.into_map().is_empty());
    }

    #[test]
    fn lifecycle_configuration_is_shared_with_the_baseline() {
        let config = scenario_config(NAME);
        let driver = PodmanDriver::new(config.clone());
        assert_eq!(driver.config(), config.as_ref());
    }
}
