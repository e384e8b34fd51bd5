//! Startup configuration read from environment variables.

use crate::error::ControllerError;
use crds::DEFAULT_CONFIGURATION_STATE_NAME;
use lb_config::Validation;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_NAMESPACE: &str = "metallb-system";
const DEFAULT_BGP_TYPE: &str = "frr-k8s";
const DEFAULT_FRRK8S_NAMESPACE: &str = "frr-k8s-system";
const DEFAULT_WEBHOOK_PORT: u16 = 9443;
const DEFAULT_DEBOUNCE_SECONDS: u64 = 3;
const DEFAULT_RECONCILE_WORKERS: usize = 3;

/// Which process this binary runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    /// Cluster-wide controller (pools, services, aggregate status, webhook)
    Controller,
    /// Per-node speaker
    Speaker { node_name: String },
}

impl Component {
    /// Owner prefix of the condition types this component reports.
    pub fn owner(&self) -> String {
        match self {
            Self::Controller => "controller".to_string(),
            Self::Speaker { node_name } => format!("speaker-{node_name}"),
        }
    }
}

/// BGP implementation the speaker drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgpType {
    Native,
    Frr,
    FrrK8s,
}

impl BgpType {
    /// Name as accepted in `BGP_TYPE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Frr => "frr",
            Self::FrrK8s => "frr-k8s",
        }
    }

    /// Validation policy matching the backend.
    pub fn validation(&self) -> Validation {
        Validation::for_bgp_type(self.as_str())
    }
}

impl FromStr for BgpType {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(Self::Native),
            "frr" => Ok(Self::Frr),
            "frr-k8s" => Ok(Self::FrrK8s),
            other => Err(ControllerError::InvalidConfig(format!(
                "BGP_TYPE must be one of native, frr, frr-k8s, got {other:?}"
            ))),
        }
    }
}

/// Process settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub component: Component,
    /// Namespace of the load-balancer custom resources
    pub namespace: String,
    pub bgp_type: BgpType,
    /// Namespace the FRRConfiguration objects are written to
    pub frrk8s_namespace: String,
    /// Name of the shared ConfigurationState object
    pub config_status_name: String,
    pub webhook_port: u16,
    /// Directory holding `tls.crt` and `tls.key`
    pub webhook_cert_dir: Option<PathBuf>,
    pub enable_webhook: bool,
    pub frr_debounce: Duration,
    pub reconcile_workers: usize,
}

impl Settings {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let component = match var("LB_COMPONENT").as_deref().unwrap_or("controller") {
            "controller" => Component::Controller,
            "speaker" => Component::Speaker {
                node_name: var("NODE_NAME").ok_or_else(|| {
                    ControllerError::InvalidConfig(
                        "NODE_NAME environment variable is required for the speaker".to_string(),
                    )
                })?,
            },
            other => {
                return Err(ControllerError::InvalidConfig(format!(
                    "LB_COMPONENT must be controller or speaker, got {other:?}"
                )));
            }
        };

        let bgp_type = var("BGP_TYPE").as_deref().unwrap_or(DEFAULT_BGP_TYPE).parse()?;
        let enable_webhook = match var("ENABLE_WEBHOOK") {
            Some(v) => parse_var("ENABLE_WEBHOOK", &v)?,
            None => component == Component::Controller,
        };
        let reconcile_workers = match var("RECONCILE_WORKERS") {
            Some(v) => parse_var("RECONCILE_WORKERS", &v)?,
            None => DEFAULT_RECONCILE_WORKERS,
        };
        if reconcile_workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_WORKERS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            component,
            namespace: var("LB_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            bgp_type,
            frrk8s_namespace: var("FRRK8S_NAMESPACE").unwrap_or_else(|| DEFAULT_FRRK8S_NAMESPACE.to_string()),
            config_status_name: var("CONFIG_STATUS_NAME")
                .unwrap_or_else(|| DEFAULT_CONFIGURATION_STATE_NAME.to_string()),
            webhook_port: match var("WEBHOOK_PORT") {
                Some(v) => parse_var("WEBHOOK_PORT", &v)?,
                None => DEFAULT_WEBHOOK_PORT,
            },
            webhook_cert_dir: var("WEBHOOK_CERT_DIR").map(PathBuf::from),
            enable_webhook,
            frr_debounce: Duration::from_secs(match var("FRR_DEBOUNCE_SECONDS") {
                Some(v) => parse_var("FRR_DEBOUNCE_SECONDS", &v)?,
                None => DEFAULT_DEBOUNCE_SECONDS,
            }),
            reconcile_workers,
        })
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("{key}={value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).expect("defaults are valid");
        assert_eq!(s.component, Component::Controller);
        assert_eq!(s.namespace, "metallb-system");
        assert_eq!(s.bgp_type, BgpType::FrrK8s);
        assert_eq!(s.frrk8s_namespace, "frr-k8s-system");
        assert_eq!(s.config_status_name, "config-status");
        assert_eq!(s.webhook_port, 9443);
        assert!(s.enable_webhook);
        assert_eq!(s.frr_debounce, Duration::from_secs(3));
        assert_eq!(s.reconcile_workers, 3);
    }

    #[test]
    fn test_speaker_requires_node_name() {
        let err = settings(&[("LB_COMPONENT", "speaker")]).expect_err("node name is required");
        assert!(matches!(err, ControllerError::InvalidConfig(_)));

        let s = settings(&[("LB_COMPONENT", "speaker"), ("NODE_NAME", "worker-1")])
            .expect("valid speaker settings");
        assert_eq!(s.component.owner(), "speaker-worker-1");
        assert!(!s.enable_webhook);
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(settings(&[("WEBHOOK_PORT", "not-a-port")]).is_err());
        assert!(settings(&[("BGP_TYPE", "bird")]).is_err());
        assert!(settings(&[("RECONCILE_WORKERS", "0")]).is_err());
        assert!(settings(&[("LB_COMPONENT", "agent")]).is_err());
    }

    #[test]
    fn test_bgp_type_selects_validation() {
        let s = settings(&[("BGP_TYPE", "native")]).expect("valid settings");
        assert_eq!(s.bgp_type.validation(), Validation::DiscardFrrOnly);
        assert_eq!(BgpType::FrrK8s.validation(), Validation::DiscardNativeOnly);
    }
}
