//! Environment scope shared by every manager

use crate::instance::InstanceManager;
use crate::model::qualify;
use crate::network::NetworkManager;
use crate::peering::PeeringManager;
use crate::provider::{CloudApi, TAG_ENV, TAG_NAME, TAG_NETWORK, Tags};
use crate::security::SecurityPolicyManager;
use crate::wait::WaitSettings;
use crate::zone::ZoneManager;
use std::fmt;
use std::sync::Arc;

/// How much progress an operation reports
///
/// Carried by the [`CloudContext`] so every operation sees the same policy; there is no
/// process-wide verbosity switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPolicy {
    /// Failures only
    Quiet,
    /// Progress of each provisioning step
    #[default]
    Normal,
    /// Progress plus every external command issued
    Verbose,
}

impl LogPolicy {
    pub fn progress(&self, args: fmt::Arguments<'_>) {
        if *self != LogPolicy::Quiet {
            tracing::info!("{}", args);
        }
    }

    pub fn detail(&self, args: fmt::Arguments<'_>) {
        if *self == LogPolicy::Verbose {
            tracing::info!("{}", args);
        } else {
            tracing::debug!("{}", args);
        }
    }

    /// Teardown keeps going after a failure; the failure is always reported
    pub fn failure(&self, args: fmt::Arguments<'_>) {
        tracing::warn!("{}", args);
    }
}

/// Target environment: the `Env` tag value plus the provider handle
#[derive(Clone)]
pub struct CloudContext {
    name: String,
    api: Arc<dyn CloudApi>,
    log: LogPolicy,
    waits: WaitSettings,
}

impl CloudContext {
    pub fn new(name: impl Into<String>, api: Arc<dyn CloudApi>) -> Self {
        Self {
            name: name.into(),
            api,
            log: LogPolicy::default(),
            waits: WaitSettings::default(),
        }
    }

    pub fn with_log_policy(mut self, log: LogPolicy) -> Self {
        self.log = log;
        self
    }

    pub fn with_waits(mut self, waits: WaitSettings) -> Self {
        self.waits = waits;
        self
    }

    /// Environment name; the value of every `Env` tag
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn api(&self) -> &dyn CloudApi {
        self.api.as_ref()
    }

    pub fn log(&self) -> LogPolicy {
        self.log
    }

    pub fn waits(&self) -> &WaitSettings {
        &self.waits
    }

    /// `env.name`
    pub fn qualify(&self, name: &str) -> String {
        qualify(&self.name, name)
    }

    /// `Name` + `Env` tags
    pub fn tags(&self, qualified_name: &str) -> Tags {
        Tags::new()
            .with(TAG_NAME, qualified_name)
            .with(TAG_ENV, self.name.as_str())
    }

    /// `Name` + `Network` + `Env` tags for a resource inside a network
    pub fn network_tags(&self, qualified_name: &str, network: &str) -> Tags {
        self.tags(qualified_name).with(TAG_NETWORK, network)
    }

    pub fn networks(&self) -> NetworkManager<'_> {
        NetworkManager::new(self)
    }

    pub fn zones(&self) -> ZoneManager<'_> {
        ZoneManager::new(self)
    }

    pub fn security(&self) -> SecurityPolicyManager<'_> {
        SecurityPolicyManager::new(self)
    }

    pub fn peering(&self) -> PeeringManager<'_> {
        PeeringManager::new(self)
    }

    pub fn instances(&self) -> InstanceManager<'_> {
        InstanceManager::new(self)
    }
}

impl fmt::Debug for CloudContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudContext")
            .field("name", &self.name)
            .field("provider", &self.api.name())
            .field("log", &self.log)
            .finish()
    }
}
