use crate::config::Config;
use crate::driver::{ConnectionOptions, Driver};
use derive_more::Display;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) const NAME: &str = "docker";

const LOGIN_CMD_TEMPLATE: &str =
    "docker exec -e COLUMNS={columns} -e LINES={lines} -e TERM=xterm -ti {instance} bash";

/// The baseline full-lifecycle driver.
///
/// Image build/pull, container create/start/stop/destroy, and network wiring
/// all run through the shared engine-API lifecycle in [`crate::containers`];
/// this type contributes the backend-CLI-facing contract values.
#[derive(Clone, Debug, Display)]
#[display(fmt = "docker")]
pub struct DockerDriver {
    config: Arc<Config>,
}

impl DockerDriver {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl Driver for DockerDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn login_cmd_template(&self) -> &'static str {
        LOGIN_CMD_TEMPLATE
    }

    fn ansible_connection_options(&self, _instance_name: &str) -> ConnectionOptions {
        ConnectionOptions::Options(BTreeMap::from([(
            "ansible_connection".to_owned(),
            NAME.to_owned(),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_support::scenario_config;
    use crate::driver::{template_placeholders, LoginOptions};
    use std::collections::BTreeSet;

    #[test]
    fn template_uses_the_contract_placeholder_set() {
        let driver = DockerDriver::new(scenario_config(NAME));
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
        let driver = DockerDriver::new(scenario_config(NAME));
        assert_eq!(
            driver.login_options("web1"),
            LoginOptions::from([("instance".to_owned(), "web1".to_owned())])
        );
    }

    #[test]
    fn connection_options_select_the_docker_plugin() {
        let driver = DockerDriver::new(scenario_config(NAME));
        let options = driver.ansible_connection_options("web1");
        assert!(options.is_supported());
        assert_eq!(
            options.into_map(),
            BTreeMap::from([("ansible_connection".to_owned(), "docker".to_owned())])
        );
    }

    #[test]
    fn driver_shares_the_scenario_config() {
        let config = scenario_config(NAME);
        let driver = DockerDriver::new(config.clone());
        assert_eq!(driver.config(), config.as_ref());
    }
}
