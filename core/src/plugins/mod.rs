//! # Plugins
//!
//! Users steer resolution with a heterogeneous list of *plugin hints*. Each hint carries one
//! capability:
//!
//! *   a **strategy** ([`StrategyPlugin`]): how work is parallelized,
//! *   a **precision** ([`PrecisionPlugin`]): which numeric format is used,
//! *   a **cluster environment**: how processes discover each other,
//! *   a **name**: either a registered strategy (see [`StrategyRegistry`]) or a distributed
//!     backend name such as `"ddp_spawn"`.
//!
//! [`classify_plugins`] partitions the list, allowing at most one hint per category.

pub mod precision;
pub mod registry;
pub mod strategy;

pub use precision::{BuiltinPrecision, PrecisionKind, PrecisionPlugin};
pub use registry::{RegisteredStrategy, StrategyRegistry};
pub use strategy::{
    DdpStrategy, DeepSpeedStrategy, ParallelStrategy, SingleDeviceStrategy, StrategyKind,
    StrategyPlugin,
};

use crate::environments::ClusterEnvironment;
use crate::error::{ConnectorError, Result};
use std::sync::Arc;

/// One user-supplied plugin hint.
#[derive(Debug)]
pub enum PluginHint {
    Name(String),
    Strategy(Box<dyn StrategyPlugin>),
    Precision(Arc<dyn PrecisionPlugin>),
    ClusterEnvironment(Arc<dyn ClusterEnvironment>),
    /// A hint with none of the recognized capabilities, kept for error reporting.
    Unsupported(String),
}

impl PluginHint {
    /// Short description used in conflict errors.
    pub fn describe(&self) -> String {
        match self {
            PluginHint::Name(name) => name.clone(),
            PluginHint::Strategy(strategy) => strategy.name(),
            PluginHint::Precision(precision) => precision.name(),
            PluginHint::ClusterEnvironment(environment) => environment.name().to_string(),
            PluginHint::Unsupported(description) => description.clone(),
        }
    }
}

impl From<&str> for PluginHint {
    fn from(name: &str) -> Self {
        PluginHint::Name(name.to_string())
    }
}

impl From<String> for PluginHint {
    fn from(name: String) -> Self {
        PluginHint::Name(name)
    }
}

impl From<Box<dyn StrategyPlugin>> for PluginHint {
    fn from(strategy: Box<dyn StrategyPlugin>) -> Self {
        PluginHint::Strategy(strategy)
    }
}

impl From<Arc<dyn PrecisionPlugin>> for PluginHint {
    fn from(precision: Arc<dyn PrecisionPlugin>) -> Self {
        PluginHint::Precision(precision)
    }
}

impl From<Arc<dyn ClusterEnvironment>> for PluginHint {
    fn from(environment: Arc<dyn ClusterEnvironment>) -> Self {
        PluginHint::ClusterEnvironment(environment)
    }
}

/// The surviving override per category.
#[derive(Debug, Default)]
pub struct ClassifiedPlugins {
    pub strategy: Option<Box<dyn StrategyPlugin>>,
    pub precision: Option<Arc<dyn PrecisionPlugin>>,
    pub cluster_environment: Option<Arc<dyn ClusterEnvironment>>,
}

/// Remembers the first hint of a category and rejects a second one.
fn claim<T>(
    slot: &mut Option<(String, T)>,
    category: &'static str,
    description: String,
    value: T,
) -> Result<()> {
    if let Some((first, _)) = slot {
        return Err(ConnectorError::DuplicatePlugin {
            category,
            first: first.clone(),
            second: description,
        });
    }
    *slot = Some((description, value));
    Ok(())
}

/// Partitions `hints` into at most one override per category.
///
/// Every name hint is handed to `on_name` in list order, after it was (possibly) claimed as a
/// registered strategy. A registered name counts as a strategy hint.
///
/// # Errors
///
/// [`ConnectorError::DuplicatePlugin`] on a second hint of a category,
/// [`ConnectorError::InvalidPlugin`] for an unsupported hint, and any error of `on_name`.
pub fn classify_plugins<F>(
    hints: Vec<PluginHint>,
    registry: &StrategyRegistry,
    mut on_name: F,
) -> Result<ClassifiedPlugins>
where
    F: FnMut(&str) -> Result<()>,
{
    let mut strategy = None;
    let mut precision = None;
    let mut cluster_environment = None;

    for hint in hints {
        let description = hint.describe();
        match hint {
            PluginHint::Name(name) => {
                if let Some(registered) = registry.create(&name) {
                    claim(&mut strategy, "training type", description, registered)?;
                }
                on_name(&name)?;
            }
            PluginHint::Strategy(plugin) => {
                claim(&mut strategy, "training type", description, plugin)?;
            }
            PluginHint::Precision(plugin) => {
                claim(&mut precision, "precision", description, plugin)?;
            }
            PluginHint::ClusterEnvironment(environment) => {
                claim(
                    &mut cluster_environment,
                    "cluster environment",
                    description,
                    environment,
                )?;
            }
            PluginHint::Unsupported(description) => {
                return Err(ConnectorError::InvalidPlugin(description));
            }
        }
    }

    Ok(ClassifiedPlugins {
        strategy: strategy.map(|(_, value)| value),
        precision: precision.map(|(_, value)| value),
        cluster_environment: cluster_environment.map(|(_, value)| value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvSnapshot;
    use crate::environments::LocalEnvironment;
    use crate::types::ParallelDevice;

    fn no_names(_: &str) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_one_of_each_category() {
        let hints = vec![
            PluginHint::Precision(Arc::new(BuiltinPrecision::double())),
            PluginHint::Strategy(Box::new(SingleDeviceStrategy::new(ParallelDevice::Cpu))),
            PluginHint::ClusterEnvironment(Arc::new(LocalEnvironment::from_env(
                &EnvSnapshot::default(),
            ))),
        ];
        let classified = classify_plugins(hints, &StrategyRegistry::default(), no_names).unwrap();
        assert_eq!(
            classified.strategy.unwrap().kind(),
            StrategyKind::SingleDevice
        );
        assert_eq!(
            classified.precision.unwrap().kind(),
            PrecisionKind::Double
        );
        assert_eq!(classified.cluster_environment.unwrap().name(), "local");
    }

    #[test]
    fn test_registered_name_conflicts_with_strategy_in_either_order() {
        let registry = StrategyRegistry::default();
        for names_first in [true, false] {
            let mut hints = vec![
                PluginHint::from("deepspeed"),
                PluginHint::Strategy(Box::new(DdpStrategy::new(StrategyKind::Ddp))),
            ];
            if !names_first {
                hints.reverse();
            }
            let err = classify_plugins(hints, &registry, no_names).unwrap_err();
            assert!(matches!(
                err,
                ConnectorError::DuplicatePlugin { category: "training type", .. }
            ));
        }
    }

    #[test]
    fn test_duplicate_precision_names_both() {
        let hints = vec![
            PluginHint::Precision(Arc::new(BuiltinPrecision::full())),
            PluginHint::Precision(Arc::new(BuiltinPrecision::double())),
        ];
        match classify_plugins(hints, &StrategyRegistry::default(), no_names) {
            Err(ConnectorError::DuplicatePlugin { first, second, .. }) => {
                assert_eq!(first, "full");
                assert_eq!(second, "double");
            }
            other => panic!("expected a conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_unregistered_name_is_only_forwarded() {
        let mut seen = Vec::new();
        let classified = classify_plugins(
            vec![PluginHint::from("ddp_spawn"), PluginHint::from("fsdp")],
            &StrategyRegistry::default(),
            |name| {
                seen.push(name.to_string());
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(seen, vec!["ddp_spawn", "fsdp"]);
        assert_eq!(
            classified.strategy.unwrap().kind(),
            StrategyKind::DdpFullySharded
        );
    }

    #[test]
    fn test_unsupported_hint_fails() {
        let err = classify_plugins(
            vec![PluginHint::Unsupported("a logger".into())],
            &StrategyRegistry::default(),
            no_names,
        )
        .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidPlugin(ref d) if d == "a logger"));
    }
}
