use crate::config::Config;
use crate::driver::{docker, podman, DockerDriver, Driver, PodmanDriver};
use crate::types::DriverName;
use std::collections::BTreeMap;
use std::sync::Arc;

type DriverFactory = fn(Arc<Config>) -> Box<dyn Driver>;

#[derive(Debug, thiserror::Error)]
#[error("Unknown driver '{name}', expected one of: {known}")]
pub struct UnknownDriverError {
    pub name: String,
    known: String,
}

/// Maps a configured driver name to its constructor.
///
/// The name set is fixed at process start; resolution happens once per
/// scenario run, before any container operation is attempted.
pub struct DriverRegistry {
    factories: BTreeMap<&'static str, DriverFactory>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtin_drivers()
    }
}

impl DriverRegistry {
    pub fn with_builtin_drivers() -> Self {
        let mut factories: BTreeMap<&'static str, DriverFactory> = BTreeMap::new();
        factories.insert(docker::NAME, |config| Box::new(DockerDriver::new(config)));
        factories.insert(podman::NAME, |config| Box::new(PodmanDriver::new(config)));
        Self { factories }
    }

    pub fn driver_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn resolve(
        &self,
        name: &DriverName,
        config: Arc<Config>,
    ) -> Result<Box<dyn Driver>, UnknownDriverError> {
        match self.factories.get(name.as_str()) {
            Some(factory) => Ok(factory(config)),
            None => Err(UnknownDriverError {
                name: name.to_string(),
                known: self
                    .driver_names()
                    .collect::<Vec<&'static str>>()
                    .join(", "),
            }),
        }
    }
}
