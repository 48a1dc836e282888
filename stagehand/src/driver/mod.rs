use crate::config::Config;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

pub mod docker;
pub mod podman;
pub mod registry;

pub use docker::DockerDriver;
pub use podman::PodmanDriver;
pub use registry::{DriverRegistry, UnknownDriverError};

/// Keys and values substituted into a driver's login command template.
///
/// Drivers contribute the instance identifier; the caller merges in terminal
/// geometry before rendering.
pub type LoginOptions = BTreeMap<String, String>;

/// Terminal geometry supplied by the caller, not by the driver.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct LoginGeometry {
    pub columns: u16,
    pub lines: u16,
}

impl LoginGeometry {
    pub fn apply(&self, options: &mut LoginOptions) {
        options.insert("columns".to_owned(), self.columns.to_string());
        options.insert("lines".to_owned(), self.lines.to_string());
    }
}

impl Default for LoginGeometry {
    fn default() -> Self {
        LoginGeometry {
            columns: 80,
            lines: 24,
        }
    }
}

/// Connection metadata handed to the provisioning integration layer.
///
/// `Unsupported` marks a backend whose connection-plugin integration is
/// still pending, as opposed to one that genuinely needs no metadata.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ConnectionOptions {
    Options(BTreeMap<String, String>),
    Unsupported,
}

impl ConnectionOptions {
    pub fn is_supported(&self) -> bool {
        !matches!(self, ConnectionOptions::Unsupported)
    }

    /// Flatten to the mapping the inventory layer consumes; an empty mapping
    /// is a valid output meaning "no special connection metadata available".
    pub fn into_map(self) -> BTreeMap<String, String> {
        match self {
            ConnectionOptions::Options(map) => map,
            ConnectionOptions::Unsupported => BTreeMap::new(),
        }
    }
}

/// The capability set every infrastructure backend implements.
///
/// Shared behavior lives in default methods; the instance lifecycle itself
/// is implemented once over the engine API (`crate::containers`) and is not
/// duplicated per backend.
///
/// The three contract operations are pure data transformations. They do no
/// I/O and cannot fail; instance identifiers are validated at config load,
/// before any driver sees them.
pub trait Driver: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// The scenario configuration this driver was constructed for.
    fn config(&self) -> &Config;

    /// Format string with named `{instance}`, `{columns}`, `{lines}`
    /// placeholders describing how to open an interactive shell into a
    /// running instance via this backend's CLI.
    fn login_cmd_template(&self) -> &'static str;

    /// The driver's own contribution to the login options; the caller merges
    /// terminal geometry before rendering the template.
    fn login_options(&self, instance_name: &str) -> LoginOptions {
        LoginOptions::from([("instance".to_owned(), instance_name.to_owned())])
    }

    /// Backend-specific connection metadata for the provisioning layer.
    fn ansible_connection_options(&self, instance_name: &str) -> ConnectionOptions;
}

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\{([a-z_]+)\}").unwrap();
}

#[derive(Debug, thiserror::Error)]
#[error("Login command template placeholder '{{{_0}}}' has no value")]
pub struct LoginTemplateError(pub String);

fn placeholder_key(matched: &str) -> &str {
    matched.trim_start_matches('{').trim_end_matches('}')
}

/// The set of named placeholders a login command template uses.
pub fn template_placeholders(template: &str) -> BTreeSet<String> {
    PLACEHOLDER_RE
        .find_iter(template)
        .map(|m| placeholder_key(m.as_str()).to_owned())
        .collect()
}

/// Substitute `{key}` placeholders from `options`. Placeholders without a
/// value are an error rather than passing through to the shell.
pub fn render_login_cmd(
    template: &str,
    options: &LoginOptions,
) -> Result<String, LoginTemplateError> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for placeholder in PLACEHOLDER_RE.find_iter(template) {
        let key = placeholder_key(placeholder.as_str());
        let value = options
            .get(key)
            .ok_or_else(|| LoginTemplateError(key.to_owned()))?;
        rendered.push_str(&template[last..placeholder.start()]);
        rendered.push_str(value);
        last = placeholder.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::{Config, Global};
    use crate::types::{DriverName, ScenarioName};
    use std::sync::Arc;

    pub(crate) fn scenario_config(driver: &str) -> Arc<Config> {
        Arc::new(Config {
            global: Global {
                name: ScenarioName::new("smoke").unwrap(),
                environment_variables: Default::default(),
            },
            driver: DriverName::new(driver).unwrap(),
            platforms: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_extracted() {
        let placeholders = template_placeholders("x {foo} y {bar_baz} {foo}");
        assert_eq!(
            placeholders,
            BTreeSet::from(["foo".to_owned(), "bar_baz".to_owned()])
        );
        assert!(template_placeholders("no placeholders here").is_empty());
    }

    #[test]
    fn rendering_substitutes_every_placeholder() {
        let options = LoginOptions::from([
            ("instance".to_owned(), "web1".to_owned()),
            ("columns".to_owned(), "120".to_owned()),
        ]);
        let rendered = render_login_cmd("exec -e COLUMNS={columns} {instance}", &options).unwrap();
        assert_eq!(rendered, "exec -e COLUMNS=120 web1");
    }

    #[test]
    fn rendering_rejects_unresolved_placeholders() {
        let err = render_login_cmd("exec {instance}", &LoginOptions::new()).unwrap_err();
        assert_eq!(err.0, "instance");
    }

    #[test]
    fn geometry_merges_into_options() {
        let mut options = LoginOptions::from([("instance".to_owned(), "web1".to_owned())]);
        LoginGeometry::default().apply(&mut options);
        assert_eq!(options.get("columns").map(String::as_str), Some("80"));
        assert_eq!(options.get("lines").map(String::as_str), Some("24"));
    }

    #[test]
    fn unsupported_connection_options_flatten_to_empty() {
        assert!(ConnectionOptions::Unsupported.into_map().is_empty());
        assert!(!ConnectionOptions::Unsupported.is_supported());

        let map = BTreeMap::from([("ansible_connection".to_owned(), "docker".to_owned())]);
        let options = ConnectionOptions::Options(map.clone());
        assert!(options.is_supported());
        assert_eq!(options.into_map(), map);
    }
}
