use crate::containers::{connect, is_not_found, LABEL_OWNED, LABEL_SCENARIO};
use anyhow::{anyhow, bail, Context as _, Result};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

#[derive(Debug, Default)]
pub struct NetworkBuilder {
    pub(crate) name: Option<String>,
    pub(crate) scenario: Option<String>,
}

impl NetworkBuilder {
    pub fn name<'a>(&mut self, name: impl Into<Cow<'a, str>>) -> &mut Self {
        self.name = Some(name.into().to_string());

        self
    }

    pub fn scenario<'a>(&mut self, scenario: impl Into<Cow<'a, str>>) -> &mut Self {
        self.scenario = Some(scenario.into().to_string());

        self
    }

    /// Create the network, or adopt an existing one with the same name so
    /// repeated scenario runs converge instead of failing.
    pub async fn resolve(&mut self) -> Result<Network> {
        let client = connect().await?;

        // take ownership of self's contents
        let mut src = Default::default();
        std::mem::swap(self, &mut src);

        let Some(name) = src.name else {
            bail!("name required");
        };

        let list_options = ListNetworksOptions {
            filters: HashMap::from([("name", vec![name.as_str()])]),
        };
        let known = client.list_networks(Some(list_options)).await?;
        // the name filter matches substrings; check for the exact name
        if let Some(existing) = known
            .into_iter()
            .find(|n| n.name.as_deref() == Some(name.as_str()))
        {
            let id = existing.id.unwrap_or_else(|| name.clone());
            trace!(network_id = %id, name = %name, "adopting existing network");
            return Ok(Network {
                client,
                name,
                state: NetworkState::Built { id },
            });
        }

        let mut labels = HashMap::from([(LABEL_OWNED, "")]);
        if let Some(ref scenario) = src.scenario {
            labels.insert(LABEL_SCENARIO, scenario.as_str());
        }

        trace!(?labels, "creating network");

        let network_options = CreateNetworkOptions {
            name: name.as_str(),
            labels,
            ..Default::default()
        };
        let create_network_resp = client.create_network(network_options).await?;

        if let Some(warning) = create_network_resp.warning {
            warn!("warning from container engine while creating network: {warning}");
        }

        let network_id = create_network_resp.id.ok_or(anyhow!(
            "container engine successfully created network, but did not return an id"
        ))?;

        debug!(network_id = %network_id, name = %name, "network created");

        Ok(Network {
            client,
            name,
            state: NetworkState::Built { id: network_id },
        })
    }
}

#[derive(Debug, Default, Clone)]
pub enum NetworkState {
    #[default]
    Defined,
    Built {
        id: String,
    },
}

#[derive(Debug)]
pub struct Network {
    client: Docker,
    pub(crate) name: String,
    pub(crate) state: NetworkState,
}

impl Network {
    pub fn builder() -> NetworkBuilder {
        Default::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn remove(&mut self) -> Result<()> {
        let res = self.client.remove_network(&self.name).await;
        self.state = NetworkState::Defined;
        match res {
            Ok(()) => {
                debug!(name = %self.name, "network removed");
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e).context("remove network"),
        }
    }
}
