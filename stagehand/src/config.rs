use crate::types::{
    DriverName, EnvironmentVariableKeyValuePairs, InstanceName, NetworkName, ScenarioName,
};
use std::{
    collections::BTreeMap,
    net::IpAddr,
    path::{Path, PathBuf},
    str::FromStr,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("A platform must have a name")]
    EmptyPlatformName,
    #[error("Found duplicate platforms with name '{_0}'")]
    DupPlatform(InstanceName),
    #[error("Platform '{_0}' needs an image or a containerfile/context to build from")]
    NoPlatformImageSource(InstanceName),
    #[error("The containerfile '{_0:?}' for platform '{_1}' does not exist")]
    NonExistentContainerfile(PathBuf, InstanceName),
    #[error("The build context '{_0:?}' for platform '{_1}' does not exist")]
    NonExistentContext(PathBuf, InstanceName),
    #[error("Platform '{_0}' has a network without a name")]
    EmptyNetworkName(InstanceName),
    #[error("The driver must have a name")]
    EmptyDriverName,
    #[error(transparent)]
    PublishedPort(#[from] PublishedPortSpecError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigReadError {
    #[error(transparent)]
    Syntax(#[from] stagehand_config::ConfigReadError),
    #[error(transparent)]
    Semantics(#[from] ConfigError),
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Config {
    pub global: Global,
    pub driver: DriverName,
    pub platforms: Vec<Platform>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Global {
    pub name: ScenarioName,
    pub environment_variables: EnvironmentVariableKeyValuePairs,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Platform {
    pub name: InstanceName,
    pub image: Option<String>,
    pub containerfile: Option<PathBuf>,
    pub context: Option<PathBuf>,
    pub command: Option<String>,
    pub privileged: bool,
    pub pull: bool,
    pub environment_variables: EnvironmentVariableKeyValuePairs,
    pub volumes: BTreeMap<PathBuf, PathBuf>,
    pub published_ports: Vec<PublishedPort>,
    pub networks: Vec<NetworkName>,
    pub registry: Option<Registry>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Registry {
    pub url: Option<String>,
    pub credentials: Option<RegistryCredentials>,
}

/// Names of the environment variables that hold the actual secrets.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RegistryCredentials {
    pub username_env: Option<String>,
    pub password_env: Option<String>,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum PortProtocol {
    Tcp,
    Udp,
}

impl PortProtocol {
    pub fn as_str(self) -> &'static str {
        use PortProtocol::*;
        match self {
            Tcp => "tcp",
            Udp => "udp",
        }
    }
}

/// A `[host-ip:]host-port:container-port[/protocol]` forwarding entry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PublishedPort {
    pub host_ip: Option<IpAddr>,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: PortProtocol,
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid published port spec '{_0}'")]
pub struct PublishedPortSpecError(pub String);

impl FromStr for PublishedPort {
    type Err = PublishedPortSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PublishedPortSpecError(s.to_owned());

        let (ports, protocol) = match s.split_once('/') {
            Some((ports, proto)) => {
                let protocol = match proto {
                    "tcp" => PortProtocol::Tcp,
                    "udp" => PortProtocol::Udp,
                    _ => return Err(err()),
                };
                (ports, protocol)
            }
            None => (s, PortProtocol::Tcp),
        };

        let parts: Vec<&str> = ports.split(':').collect();
        let (host_ip, host_port, container_port) = match parts.as_slice() {
            [host, container] => (None, host, container),
            [ip, host, container] => {
                let ip = IpAddr::from_str(ip).map_err(|_| err())?;
                (Some(ip), host, container)
            }
            _ => return Err(err()),
        };

        Ok(PublishedPort {
            host_ip,
            host_port: host_port.parse().map_err(|_| err())?,
            container_port: container_port.parse().map_err(|_| err())?,
            protocol,
        })
    }
}

impl From<stagehand_config::Global> for Global {
    fn from(value: stagehand_config::Global) -> Self {
        Self {
            name: value
                .name
                .as_ref()
                .and_then(ScenarioName::new)
                .unwrap_or_default(),
            environment_variables: value.environment_variables.into(),
        }
    }
}

impl TryFrom<stagehand_config::Platform> for Platform {
    type Error = ConfigError;

    fn try_from(value: stagehand_config::Platform) -> Result<Self, Self::Error> {
        let name = value
            .name
            .as_ref()
            .and_then(InstanceName::new)
            .ok_or(ConfigError::EmptyPlatformName)?;

        if value.image.is_none() && value.containerfile.is_none() && value.context.is_none() {
            return Err(ConfigError::NoPlatformImageSource(name));
        }
        if let Some(ref containerfile) = value.containerfile {
            if !containerfile.exists() {
                return Err(ConfigError::NonExistentContainerfile(
                    containerfile.clone(),
                    name,
                ));
            }
        }
        if let Some(ref context) = value.context {
            if !context.exists() {
                return Err(ConfigError::NonExistentContext(context.clone(), name));
            }
        }

        let published_ports = value
            .published_ports
            .iter()
            .map(|p| p.parse())
            .collect::<Result<Vec<PublishedPort>, _>>()?;

        let networks = value
            .networks
            .iter()
            .map(|n| NetworkName::new(n).ok_or_else(|| ConfigError::EmptyNetworkName(name.clone())))
            .collect::<Result<Vec<NetworkName>, _>>()?;

        // Pulling is the default for image-based platforms; platforms built
        // from a containerfile/context never pull.
        let pull = value.pull.unwrap_or(value.image.is_some())
            && value.containerfile.is_none()
            && value.context.is_none();

        Ok(Self {
            name,
            image: value.image,
            containerfile: value.containerfile,
            context: value.context,
            command: value.command,
            privileged: value.privileged.unwrap_or(false),
            pull,
            environment_variables: value.environment_variables.into(),
            volumes: value.volumes,
            published_ports,
            networks,
            registry: value.registry.map(Registry::from),
        })
    }
}

impl From<stagehand_config::Registry> for Registry {
    fn from(value: stagehand_config::Registry) -> Self {
        Self {
            url: value.url,
            credentials: value.credentials.map(|c| RegistryCredentials {
                username_env: c.username_env,
                password_env: c.password_env,
            }),
        }
    }
}

impl TryFrom<stagehand_config::Config> for Config {
    type Error = ConfigError;

    fn try_from(value: stagehand_config::Config) -> Result<Self, Self::Error> {
        let driver = match value.driver.name {
            Some(ref name) => DriverName::new(name).ok_or(ConfigError::EmptyDriverName)?,
            None => DriverName::default(),
        };

        let mut platforms: Vec<Platform> = Vec::with_capacity(value.platforms.len());
        for p in value.platforms.into_iter() {
            let p = Platform::try_from(p)?;
            if platforms.iter().any(|known| known.name == p.name) {
                return Err(ConfigError::DupPlatform(p.name));
            }
            platforms.push(p);
        }

        Ok(Self {
            global: value.global.into(),
            driver,
            platforms,
        })
    }
}

impl Config {
    pub fn read<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigReadError> {
        let cfg = stagehand_config::Config::read(config_path)?;
        Ok(Self::try_from(cfg)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw_platform(name: &str) -> stagehand_config::Platform {
        stagehand_config::Platform {
            name: Some(name.to_owned()),
            image: Some("docker.io/library/ubuntu:latest".to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_in() {
        let raw = stagehand_config::Config {
            platforms: vec![raw_platform("web1")],
            ..Default::default()
        };
        let cfg = Config::try_from(raw).unwrap();

        assert_eq!(cfg.global.name.as_str(), "default");
        assert_eq!(cfg.driver.as_str(), "docker");
        let p = &cfg.platforms[0];
        assert!(p.pull);
        assert!(!p.privileged);
    }

    #[test]
    fn duplicate_platforms_are_rejected() {
        let raw = stagehand_config::Config {
            platforms: vec![raw_platform("web1"), raw_platform("web1")],
            ..Default::default()
        };
        assert!(matches!(
            Config::try_from(raw),
            Err(ConfigError::DupPlatform(_))
        ));
    }

    #[test]
    fn platforms_need_an_image_source() {
        let raw = stagehand_config::Config {
            platforms: vec![stagehand_config::Platform {
                name: Some("web1".to_owned()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            Config::try_from(raw),
            Err(ConfigError::NoPlatformImageSource(_))
        ));
    }

    #[test]
    fn missing_containerfile_is_rejected() {
        let raw = stagehand_config::Config {
            platforms: vec![stagehand_config::Platform {
                name: Some("web1".to_owned()),
                containerfile: Some("does/not/exist/Containerfile".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            Config::try_from(raw),
            Err(ConfigError::NonExistentContainerfile(..))
        ));
    }

    #[test]
    fn context_platforms_never_pull() {
        let td = tempfile::tempdir().unwrap();
        let raw = stagehand_config::Config {
            platforms: vec![stagehand_config::Platform {
                name: Some("web1".to_owned()),
                image: Some("web1:latest".to_owned()),
                context: Some(td.path().to_owned()),
                pull: Some(true),
                ..Default::default()
            }],
            ..Default::default()
        };
        let cfg = Config::try_from(raw).unwrap();
        assert!(!cfg.platforms[0].pull);
    }

    #[test]
    fn full_document_converts() {
        use indoc::indoc;
        use std::str::FromStr;

        let raw = stagehand_config::Config::from_str(indoc! {r#"
            name = 'smoke'

            [environment-variables]
            SOME_VAR = 'SOME_VAL'

            [driver]
            name = 'podman'

            [[platform]]
            name = 'web1'
            image = 'docker.io/library/ubuntu:latest'
            privileged = true
            published-ports = ['0.0.0.0:8053:53/udp']
            networks = ['frontend']
        "#})
        .unwrap();

        let cfg = Config::try_from(raw).unwrap();
        assert_eq!(cfg.global.name.as_str(), "smoke");
        assert_eq!(cfg.driver.as_str(), "podman");

        let p = &cfg.platforms[0];
        assert_eq!(p.name.as_str(), "web1");
        assert!(p.privileged);
        assert_eq!(p.published_ports[0].host_port, 8053);
        assert_eq!(p.networks[0].as_str(), "frontend");
    }

    #[test]
    fn published_port_specs() {
        let p: PublishedPort = "0.0.0.0:8053:53/udp".parse().unwrap();
        assert_eq!(p.host_ip, Some("0.0.0.0".parse().unwrap()));
        assert_eq!(p.host_port, 8053);
        assert_eq!(p.container_port, 53);
        assert_eq!(p.protocol, PortProtocol::Udp);

        let p: PublishedPort = "8080:80".parse().unwrap();
        assert_eq!(p.host_ip, None);
        assert_eq!(p.protocol, PortProtocol::Tcp);

        assert!("8080".parse::<PublishedPort>().is_err());
        assert!("8080:80/sctp".parse::<PublishedPort>().is_err());
        assert!("host:80".parse::<PublishedPort>().is_err());
    }
}
