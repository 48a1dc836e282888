use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

pub const DEFAULT_CONFIG_FILE_NAME: &str = "stagehand.toml";
pub const DEFAULT_SCENARIO_NAME: &str = "default";
pub const DEFAULT_DRIVER_NAME: &str = "docker";

#[derive(Debug, thiserror::Error)]
pub enum ConfigReadError {
    #[error("Error in configuration file {}", .path.display())]
    ConfigToml {
        path: PathBuf,
        #[source]
        error: Box<toml::de::Error>,
    },

    #[error("Encountered an IO error while reading the configuration file")]
    Io(#[from] Box<io::Error>),
}

#[derive(Debug, thiserror::Error)]
#[error(
    "Could not find a '{DEFAULT_CONFIG_FILE_NAME}' file in the current directory or any of its ancestors"
)]
pub struct FindConfigFileError;

/// Walk upwards from the current directory until a scenario config file shows up.
pub fn find_config_file() -> Result<PathBuf, FindConfigFileError> {
    let cwd = env::current_dir().map_err(|_| FindConfigFileError)?;
    find_config_file_in(cwd)
}

pub fn find_config_file_in<P: AsRef<Path>>(start: P) -> Result<PathBuf, FindConfigFileError> {
    let mut dir = start.as_ref().to_owned();
    loop {
        let candidate = dir.join(DEFAULT_CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            return Err(FindConfigFileError);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    #[serde(flatten)]
    pub global: Global,

    pub driver: Driver,

    #[serde(alias = "platform", skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<Platform>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Global {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_variables: BTreeMap<String, String>,
}

/// Which infrastructure driver runs the scenario's instances.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Driver {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Platform {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containerfile: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_variables: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<PathBuf, PathBuf>,
    #[serde(alias = "published-port", skip_serializing_if = "Vec::is_empty")]
    pub published_ports: Vec<String>,
    #[serde(alias = "network", skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<Registry>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Registry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<RegistryCredentials>,
}

/// Credentials are never written in the config file itself; the fields name
/// the environment variables holding the actual values.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RegistryCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl Config {
    pub fn read<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigReadError> {
        let content = fs::read_to_string(&config_path).map_err(Box::new)?;
        Self::from_str(&content).map_err(|e| ConfigReadError::ConfigToml {
            path: config_path.as_ref().to_owned(),
            error: Box::new(e),
        })
    }
}

impl FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const FULL_TOML: &str = indoc! {r#"
        name = 'smoke'

        [environment-variables]
        SOME_VAR = 'SOME_VAL'
        SOME_VAR2 = 'SOME_VAL2'

        [driver]
        name = 'podman'

        [[platform]]
        name = 'web1'
        image = 'docker.io/library/ubuntu:latest'
        command = 'sleep infinity'
        privileged = true
        published-ports = ['0.0.0.0:8053:53/udp', '8080:80/tcp']
        networks = ['frontend', 'backend']
            [platform.environment-variables]
            P0_VAR = 'P0_VAL'

            [platform.volumes]
            '/sys/fs/cgroup' = '/sys/fs/cgroup'

            [platform.registry]
            url = 'registry.example.com'
                [platform.registry.credentials]
                username-env = 'REGISTRY_USER'
                password-env = 'REGISTRY_PASS'

        [[platform]]
        name = 'web2'
        containerfile = 'Containerfile.web'
        context = 'images/web'
        pull = false
    "#};

    #[test]
    fn parse_full_document() {
        let cfg = Config::from_str(FULL_TOML).unwrap();

        assert_eq!(cfg.global.name.as_deref(), Some("smoke"));
        assert_eq!(cfg.global.environment_variables.len(), 2);
        assert_eq!(cfg.driver.name.as_deref(), Some("podman"));
        assert_eq!(cfg.platforms.len(), 2);

        let web1 = &cfg.platforms[0];
        assert_eq!(web1.name.as_deref(), Some("web1"));
        assert_eq!(web1.privileged, Some(true));
        assert_eq!(web1.published_ports.len(), 2);
        assert_eq!(web1.networks.len(), 2);
        assert_eq!(web1.volumes.len(), 1);
        let registry = web1.registry.as_ref().unwrap();
        assert_eq!(registry.url.as_deref(), Some("registry.example.com"));
        assert_eq!(
            registry.credentials.as_ref().unwrap().username_env.as_deref(),
            Some("REGISTRY_USER")
        );

        let web2 = &cfg.platforms[1];
        assert_eq!(web2.containerfile.as_deref(), Some(Path::new("Containerfile.web")));
        assert_eq!(web2.pull, Some(false));
    }

    #[test]
    fn driver_section_is_optional() {
        let cfg = Config::from_str("[[platform]]\nname = 'solo'\n").unwrap();
        assert_eq!(cfg.driver.name, None);
        assert_eq!(cfg.platforms.len(), 1);
    }

    #[test]
    fn read_config_file() {
        let td = tempfile::tempdir().unwrap();
        let cfg_path = td.path().join(DEFAULT_CONFIG_FILE_NAME);
        fs::write(&cfg_path, FULL_TOML).unwrap();
        let cfg = Config::read(&cfg_path).unwrap();

        assert_eq!(cfg.platforms.len(), 2);
    }

    #[test]
    fn find_config_file_walks_up() {
        let td = tempfile::tempdir().unwrap();
        fs::write(td.path().join(DEFAULT_CONFIG_FILE_NAME), FULL_TOML).unwrap();
        let nested = td.path().join("roles/web/tasks");
        fs::create_dir_all(&nested).unwrap();

        let found = find_config_file_in(&nested).unwrap();
        assert_eq!(found, td.path().join(DEFAULT_CONFIG_FILE_NAME));
    }

    #[test]
    fn find_config_file_reports_missing() {
        let td = tempfile::tempdir().unwrap();
        assert!(find_config_file_in(td.path()).is_err());
    }
}
