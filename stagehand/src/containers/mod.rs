use crate::config::PublishedPort;
use anyhow::{anyhow, Context, Result};
use bollard::{
    auth::DockerCredentials,
    container::{
        self, InspectContainerOptions, NetworkingConfig, RemoveContainerOptions, StatsOptions,
        StopContainerOptions,
    },
    image::{BuildImageOptions, CreateImageOptions},
    models::{ContainerStateStatusEnum, EndpointSettings, HostConfig, Mount, MountTypeEnum, PortBinding},
    Docker,
};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, trace};

pub mod network;

pub use network::{Network, NetworkBuilder};

type ContainerClient = Docker;

/// Every resource this crate creates on the engine carries these labels.
pub const LABEL_OWNED: &str = "io.stagehand";
pub const LABEL_SCENARIO: &str = "io.stagehand.scenario";
pub const LABEL_INSTANCE: &str = "io.stagehand.instance";
pub const LABEL_CONTEXT_HASH: &str = "io.stagehand.image-context-hash";

/// How many seconds the engine waits before killing a stopping container.
const STOP_TIMEOUT_SECS: i64 = 10;

pub(crate) async fn connect() -> Result<ContainerClient> {
    let client = Docker::connect_with_local_defaults()
        .context("connect to container engine service")?
        .negotiate_version()
        .await
        .context("negotiate container engine API version")?;
    Ok(client)
}

/// Engine-reported lifecycle state of an instance container.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum InstanceState {
    Absent,
    Created,
    Running,
    Exited,
}

impl InstanceState {
    pub fn as_str(self) -> &'static str {
        use InstanceState::*;
        match self {
            Absent => "absent",
            Created => "created",
            Running => "running",
            Exited => "exited",
        }
    }
}

/// Point-in-time resource usage of a running container.
#[derive(Clone, Debug, Default)]
pub struct ContainerStats {
    pub cpu_percentage: f64,
    pub mem_usage: f64,
    pub mem_limit: f64,
    pub mem_percentage: f64,
    pub net_rx: f64,
    pub net_tx: f64,
    pub block_rx: f64,
    pub block_tx: f64,
}

#[derive(Debug, Default)]
pub struct ContainerBuilder {
    name: Option<String>,
    image: Option<String>,
    containerfile: Option<PathBuf>,
    context: Option<PathBuf>,
    cmd: Option<Vec<String>>,
    env: Option<Vec<String>>,
    mounts: Option<HashMap<String, String>>,
    privileged: bool,
    pull: bool,
    published_ports: Vec<PublishedPort>,
    networks: Vec<String>,
    labels: HashMap<String, String>,
    registry_credentials: Option<DockerCredentials>,
}

// builder-ish things
impl ContainerBuilder {
    pub fn set_name(&mut self, name: impl AsRef<str>) {
        self.name = Some(name.as_ref().to_string());
    }
    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.set_name(name);

        self
    }

    pub fn set_image(&mut self, image: impl AsRef<str>) {
        self.image = Some(image.as_ref().to_string());
    }
    pub fn with_image(mut self, image: impl AsRef<str>) -> Self {
        self.set_image(image);

        self
    }

    pub fn set_containerfile(&mut self, containerfile: impl AsRef<Path>) {
        self.containerfile = Some(containerfile.as_ref().to_path_buf());
    }
    pub fn with_containerfile(mut self, containerfile: impl AsRef<Path>) -> Self {
        self.set_containerfile(containerfile);

        self
    }

    pub fn set_context(&mut self, context: impl AsRef<Path>) {
        self.context = Some(context.as_ref().to_path_buf());
    }
    pub fn with_context(mut self, context: impl AsRef<Path>) -> Self {
        self.set_context(context);

        self
    }

    pub fn set_cmd(&mut self, cmd: impl IntoIterator<Item = impl AsRef<str>>) {
        self.cmd = Some(cmd.into_iter().map(|a| a.as_ref().to_string()).collect());
    }
    pub fn with_cmd(mut self, cmd: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.set_cmd(cmd);

        self
    }

    pub fn set_env(&mut self, env: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>) {
        let env = Vec::from_iter(
            env.into_iter()
                .map(|(var, val)| format!("{}={}", var.as_ref(), val.as_ref())),
        );
        self.env = Some(env);
    }
    pub fn with_env(
        mut self,
        env: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    ) -> Self {
        self.set_env(env);

        self
    }

    pub fn set_mounts(
        &mut self,
        mounts: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    ) {
        let mounts = HashMap::from_iter(
            mounts
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string())),
        );
        self.mounts = Some(mounts);
    }
    pub fn with_mounts(
        mut self,
        mounts: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    ) -> Self {
        self.set_mounts(mounts);

        self
    }

    pub fn set_privileged(&mut self, privileged: bool) {
        self.privileged = privileged;
    }
    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.set_privileged(privileged);

        self
    }

    pub fn set_pull(&mut self, pull: bool) {
        self.pull = pull;
    }
    pub fn with_pull(mut self, pull: bool) -> Self {
        self.set_pull(pull);

        self
    }

    pub fn set_published_ports(&mut self, ports: impl IntoIterator<Item = PublishedPort>) {
        self.published_ports = ports.into_iter().collect();
    }
    pub fn with_published_ports(mut self, ports: impl IntoIterator<Item = PublishedPort>) -> Self {
        self.set_published_ports(ports);

        self
    }

    pub fn set_networks(&mut self, networks: impl IntoIterator<Item = impl AsRef<str>>) {
        self.networks = networks
            .into_iter()
            .map(|n| n.as_ref().to_string())
            .collect();
    }
    pub fn with_networks(mut self, networks: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.set_networks(networks);

        self
    }

    pub fn set_labels(
        &mut self,
        labels: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    ) {
        self.labels = HashMap::from_iter(
            labels
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string())),
        );
    }
    pub fn with_labels(
        mut self,
        labels: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    ) -> Self {
        self.set_labels(labels);

        self
    }

    pub fn set_registry_credentials(&mut self, credentials: DockerCredentials) {
        self.registry_credentials = Some(credentials);
    }
    pub fn with_registry_credentials(mut self, credentials: DockerCredentials) -> Self {
        self.set_registry_credentials(credentials);

        self
    }

    pub async fn resolve(self) -> Result<Container> {
        let client = connect().await?;
        Ok(Container {
            client,
            id: None,
            name: self.name,
            image: self.image,
            containerfile: self.containerfile,
            context: self.context,
            cmd: self.cmd,
            env: self.env,
            mounts: self.mounts,
            privileged: self.privileged,
            pull: self.pull,
            published_ports: self.published_ports,
            networks: self.networks,
            labels: self.labels,
            registry_credentials: self.registry_credentials,
        })
    }
}

#[derive(Debug)]
pub struct Container {
    client: ContainerClient,
    id: Option<String>,
    name: Option<String>,
    image: Option<String>,
    containerfile: Option<PathBuf>,
    context: Option<PathBuf>,
    cmd: Option<Vec<String>>,
    env: Option<Vec<String>>,
    mounts: Option<HashMap<String, String>>,
    privileged: bool,
    pull: bool,
    published_ports: Vec<PublishedPort>,
    networks: Vec<String>,
    labels: HashMap<String, String>,
    registry_credentials: Option<DockerCredentials>,
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        Default::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The tag the instance's image is built or pulled under.
    fn image_tag(&self) -> String {
        match (&self.image, &self.name) {
            (Some(image), _) => image.clone(),
            (None, Some(name)) => format!("stagehand/{name}"),
            (None, None) => "stagehand/unnamed".to_owned(),
        }
    }

    async fn build_context_tar(&self) -> Result<Vec<u8>> {
        let containerfile = self.containerfile.clone();
        let context = self.context.clone();

        // TODO: stream files from FS, taring in flight, don't block
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut tarball = tar::Builder::new(Vec::new());

            if let Some(containerfile) = containerfile {
                let containerfile_file_name = containerfile
                    .file_name()
                    .ok_or(anyhow!("containerfile does not name a file"))?
                    .to_os_string();

                tarball
                    .append_path_with_name(containerfile, containerfile_file_name)
                    .context("add containerfile to in-memory image tarball")?;
            }

            if let Some(context) = context {
                tarball
                    .append_dir_all(".", context)
                    .context("add context to in-memory image tarball")?;
            }

            tarball
                .into_inner()
                .context("finish in-memory image tarball")
        })
        .await
        .context("spawn blocking tokio task to build tarball")?
    }

    /// Build the instance image from its containerfile/context, or pull it
    /// when the platform only names a registry image.
    #[instrument(skip(self), fields(name = ?self.name))]
    pub async fn build(&mut self) -> Result<()> {
        if self.containerfile.is_some() || self.context.is_some() {
            let tarball = self.build_context_tar().await?;
            let context_hash = context_hash(&tarball);

            let mut labels = label_refs(&self.labels);
            labels.insert(LABEL_CONTEXT_HASH, &context_hash);

            let image_tag = self.image_tag();
            let image_options = BuildImageOptions {
                dockerfile: "Containerfile",
                t: &image_tag,
                labels,
                ..Default::default()
            };

            let mut build_image_progress =
                self.client
                    .build_image(image_options, None, Some(tarball.into()));

            while let Some(progress) = build_image_progress.next().await {
                if let Some(msg) = progress?.stream {
                    trace!("{}", msg.trim_end());
                }
            }

            debug!(image = %image_tag, "image built");
        } else if self.pull {
            let image_tag = self.image_tag();
            let image_options = CreateImageOptions {
                from_image: image_tag.as_str(),
                ..Default::default()
            };

            let mut create_image_progress = self.client.create_image(
                Some(image_options),
                None,
                self.registry_credentials.clone(),
            );

            while let Some(progress) = create_image_progress.next().await {
                if let Some(status) = progress?.status {
                    trace!("{status}");
                }
            }

            debug!(image = %image_tag, "image pulled");
        }

        Ok(())
    }

    /// Create and start the instance container.
    #[instrument(skip(self), fields(name = ?self.name))]
    pub async fn start(&mut self) -> Result<()> {
        let image = self.image_tag();

        let env = self
            .env
            .as_ref()
            .map(|vars| vars.iter().map(|ev| ev.as_str()).collect());

        let mounts = self.mounts.as_ref().map(|some_mounts| {
            some_mounts
                .iter()
                .map(|(host_path, container_path)| Mount {
                    source: Some(host_path.as_str().to_string()),
                    target: Some(container_path.as_str().to_string()),
                    typ: Some(MountTypeEnum::BIND),
                    ..Default::default()
                })
                .collect()
        });

        let cmd = self
            .cmd
            .as_ref()
            .map(|some_cmd| some_cmd.iter().map(|arg| arg.as_str()).collect());

        let (exposed, port_bindings) = published_port_maps(&self.published_ports);
        let exposed_ports: HashMap<&str, HashMap<(), ()>> = exposed
            .iter()
            .map(|key| (key.as_str(), HashMap::new()))
            .collect();

        let networking_config = if self.networks.is_empty() {
            None
        } else {
            let endpoints_config = self
                .networks
                .iter()
                .map(|n| (n.as_str(), EndpointSettings::default()))
                .collect();
            Some(NetworkingConfig { endpoints_config })
        };

        let mut labels = label_refs(&self.labels);
        labels.insert(LABEL_OWNED, "");

        let container_config = container::Config {
            image: Some(image.as_str()),
            cmd,
            tty: Some(true),
            env,
            labels: Some(labels),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(HostConfig {
                privileged: Some(self.privileged),
                port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
                mounts,
                ..Default::default()
            }),
            networking_config,
            ..Default::default()
        };

        let container = self
            .client
            .create_container(
                self.name
                    .as_ref()
                    .map(|n| container::CreateContainerOptions {
                        name: n.clone(),
                        ..Default::default()
                    }),
                container_config,
            )
            .await?;

        trace!(?container, "created container");

        self.client
            .start_container::<String>(&container.id, None)
            .await?;

        debug!(id = %container.id, "container started");
        self.id = Some(container.id);

        Ok(())
    }

    /// Stop the instance container if it is running. Missing containers are
    /// not an error; teardown must be idempotent.
    #[instrument(skip(self), fields(name = ?self.name))]
    pub async fn stop(&mut self) -> Result<()> {
        let target = self.runtime_ref()?;
        let res = self
            .client
            .stop_container(&target, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await;
        match res {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e).context("stop container"),
        }
    }

    /// Remove the instance container and forget its runtime id.
    #[instrument(skip(self), fields(name = ?self.name))]
    pub async fn remove(&mut self) -> Result<()> {
        let target = self.runtime_ref()?;
        let res = self
            .client
            .remove_container(
                &target,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        self.id = None;
        match res {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e).context("remove container"),
        }
    }

    pub async fn state(&self) -> Result<InstanceState> {
        let target = self.runtime_ref()?;
        let inspection = self
            .client
            .inspect_container(&target, None::<InspectContainerOptions>)
            .await;
        let inspection = match inspection {
            Ok(i) => i,
            Err(e) if is_not_found(&e) => return Ok(InstanceState::Absent),
            Err(e) => return Err(e).context("inspect container"),
        };

        let status = inspection.state.and_then(|s| s.status);
        Ok(match status {
            Some(ContainerStateStatusEnum::RUNNING) => InstanceState::Running,
            Some(ContainerStateStatusEnum::EXITED)
            | Some(ContainerStateStatusEnum::DEAD)
            | Some(ContainerStateStatusEnum::REMOVING) => InstanceState::Exited,
            _ => InstanceState::Created,
        })
    }

    pub async fn stats(&self) -> Result<ContainerStats> {
        let target = self.runtime_ref()?;
        let mut stats_stream = self.client.stats(
            &target,
            Some(StatsOptions {
                stream: false,
                one_shot: false,
            }),
        );
        let stats = stats_stream
            .next()
            .await
            .ok_or(anyhow!("container engine returned no stats sample"))??;

        let cpu_delta = stats
            .cpu_stats
            .cpu_usage
            .total_usage
            .saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
        let system_delta = stats
            .cpu_stats
            .system_cpu_usage
            .unwrap_or(0)
            .saturating_sub(stats.precpu_stats.system_cpu_usage.unwrap_or(0));
        let online_cpus = stats.cpu_stats.online_cpus.unwrap_or(1);

        let mem_usage = stats.memory_stats.usage.unwrap_or(0) as f64;
        let mem_limit = stats.memory_stats.limit.unwrap_or(0) as f64;
        let mem_percentage = if mem_limit > 0.0 {
            (mem_usage / mem_limit) * 100.0
        } else {
            0.0
        };

        let (net_rx, net_tx) = stats
            .networks
            .as_ref()
            .map(|interfaces| {
                interfaces.values().fold((0u64, 0u64), |(rx, tx), net| {
                    (rx + net.rx_bytes, tx + net.tx_bytes)
                })
            })
            .unwrap_or((0, 0));

        let (block_rx, block_tx) = stats
            .blkio_stats
            .io_service_bytes_recursive
            .as_ref()
            .map(|entries| {
                entries.iter().fold((0u64, 0u64), |(rd, wr), entry| {
                    match entry.op.to_ascii_lowercase().as_str() {
                        "read" => (rd + entry.value, wr),
                        "write" => (rd, wr + entry.value),
                        _ => (rd, wr),
                    }
                })
            })
            .unwrap_or((0, 0));

        Ok(ContainerStats {
            cpu_percentage: cpu_percentage(cpu_delta, system_delta, online_cpus),
            mem_usage,
            mem_limit,
            mem_percentage,
            net_rx: net_rx as f64,
            net_tx: net_tx as f64,
            block_rx: block_rx as f64,
            block_tx: block_tx as f64,
        })
    }

    /// The engine-side handle for this container: the id once started, the
    /// configured name before that.
    fn runtime_ref(&self) -> Result<String> {
        self.id
            .clone()
            .or_else(|| self.name.clone())
            .ok_or(anyhow!("container has neither an id nor a name"))
    }
}

fn label_refs(labels: &HashMap<String, String>) -> HashMap<&str, &str> {
    labels
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

fn context_hash(tarball: &[u8]) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, tarball);
    data_encoding::HEXLOWER.encode(digest.as_ref())
}

pub(crate) fn is_not_found(error: &bollard::errors::Error) -> bool {
    matches!(
        error,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn cpu_percentage(cpu_delta: u64, system_delta: u64, online_cpus: u64) -> f64 {
    if system_delta == 0 {
        return 0.0;
    }
    (cpu_delta as f64 / system_delta as f64) * online_cpus as f64 * 100.0
}

/// Engine-format port maps for a set of published ports: the exposed-port
/// keys in first-seen order, and the host bindings keyed by them.
fn published_port_maps(
    ports: &[PublishedPort],
) -> (Vec<String>, HashMap<String, Option<Vec<PortBinding>>>) {
    let mut exposed: Vec<String> = Vec::with_capacity(ports.len());
    let mut bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for port in ports {
        let key = format!("{}/{}", port.container_port, port.protocol.as_str());
        let binding = PortBinding {
            host_ip: port.host_ip.map(|ip| ip.to_string()),
            host_port: Some(port.host_port.to_string()),
        };
        bindings
            .entry(key.clone())
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(binding);
        if !exposed.contains(&key) {
            exposed.push(key);
        }
    }
    (exposed, bindings)
}
