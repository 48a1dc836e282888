use crate::name_newtype;
use derive_more::{AsRef, Deref, Display, Into};
use std::collections::BTreeMap;

name_newtype!(ScenarioName);

impl Default for ScenarioName {
    fn default() -> Self {
        ScenarioName(stagehand_config::DEFAULT_SCENARIO_NAME.to_owned())
    }
}

name_newtype!(InstanceName);
name_newtype!(DriverName);
name_newtype!(NetworkName);

impl Default for DriverName {
    fn default() -> Self {
        DriverName(stagehand_config::DEFAULT_DRIVER_NAME.to_owned())
    }
}

/// The engine-visible container name for an instance.
///
/// Instance names are only unique within a scenario, so the runtime name
/// carries both.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, AsRef, Deref, Display, Into)]
pub struct InstanceRuntimeName(String);

impl InstanceRuntimeName {
    pub fn new(scenario: &ScenarioName, instance: &InstanceName) -> Self {
        Self(format!("{scenario}-{instance}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, AsRef, Deref, Into)]
pub struct EnvironmentVariableKeyValuePairs(pub(crate) BTreeMap<String, String>);

impl EnvironmentVariableKeyValuePairs {
    pub fn insert(&mut self, k: String, v: String) {
        self.0.insert(k, v);
    }

    /// Fill in pairs from `defaults` without clobbering anything already set;
    /// platform-level variables win over scenario-level ones.
    pub fn apply_defaults(&mut self, defaults: &Self) {
        for (k, v) in defaults.0.iter() {
            self.0.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

impl From<BTreeMap<String, String>> for EnvironmentVariableKeyValuePairs {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self(value)
    }
}

#[macro_export]
macro_rules! name_newtype {
    ($t:ident) => {
        #[derive(
            Clone,
            Eq,
            PartialEq,
            Ord,
            PartialOrd,
            Hash,
            Debug,
            derive_more::AsRef,
            derive_more::Deref,
            derive_more::Display,
            derive_more::Into,
        )]
        pub struct $t(String);

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl $t {
            /// Empty names are rejected; interior whitespace is canonicalized
            /// so the name stays usable as an engine identifier.
            pub fn new<T: AsRef<str>>(s: T) -> Option<Self> {
                let inner: String = s
                    .as_ref()
                    .trim()
                    .chars()
                    .map(|c| if c.is_whitespace() { '_' } else { c })
                    .collect();
                if inner.is_empty() {
                    None
                } else {
                    Some(Self(inner))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names() {
        assert_eq!(
            InstanceName::new("my instance"),
            Some(InstanceName("my_instance".to_owned()))
        );
        assert_eq!(InstanceName::new("  \t \n"), None);
        assert_eq!(DriverName::new(""), None);
    }

    #[test]
    fn runtime_names_carry_the_scenario() {
        let scenario = ScenarioName::new("smoke").unwrap();
        let instance = InstanceName::new("web1").unwrap();
        assert_eq!(
            InstanceRuntimeName::new(&scenario, &instance).as_str(),
            "smoke-web1"
        );
    }

    #[test]
    fn platform_environment_variables_win_over_defaults() {
        let mut vars = EnvironmentVariableKeyValuePairs::default();
        vars.insert("A".to_owned(), "platform".to_owned());

        let mut defaults = EnvironmentVariableKeyValuePairs::default();
        defaults.insert("A".to_owned(), "scenario".to_owned());
        defaults.insert("B".to_owned(), "scenario".to_owned());

        vars.apply_defaults(&defaults);

        assert_eq!(vars.get("A").map(String::as_str), Some("platform"));
        assert_eq!(vars.get("B").map(String::as_str), Some("scenario"));
    }
}
