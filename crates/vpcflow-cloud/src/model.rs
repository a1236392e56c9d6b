//! Domain model for networks, zones, machines and their provider states

use crate::error::CloudError;
use crate::provider::{
    InstanceRecord, PeeringRecord, SecurityGroupRecord, SubnetRecord, TAG_NAME, TAG_NETWORK,
    TAG_PEERING, TAG_ZONE, VpcRecord,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State of a network (VPC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkState {
    Pending,
    Available,
}

impl NetworkState {
    pub fn is_live(&self) -> bool {
        matches!(self, NetworkState::Pending | NetworkState::Available)
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkState::Pending => write!(f, "pending"),
            NetworkState::Available => write!(f, "available"),
        }
    }
}

impl FromStr for NetworkState {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NetworkState::Pending),
            "available" => Ok(NetworkState::Available),
            other => Err(CloudError::Api(format!("unknown VPC state: {}", other))),
        }
    }
}

/// State of a machine instance
///
/// `pending -> running -> shutting-down -> terminated`; `stopping`/`stopped` are only reached
/// from outside this system and are treated as absent by every lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    pub fn is_live(&self) -> bool {
        matches!(self, InstanceState::Pending | InstanceState::Running)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceState::Pending => write!(f, "pending"),
            InstanceState::Running => write!(f, "running"),
            InstanceState::ShuttingDown => write!(f, "shutting-down"),
            InstanceState::Terminated => write!(f, "terminated"),
            InstanceState::Stopping => write!(f, "stopping"),
            InstanceState::Stopped => write!(f, "stopped"),
        }
    }
}

impl FromStr for InstanceState {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InstanceState::Pending),
            "running" => Ok(InstanceState::Running),
            "shutting-down" => Ok(InstanceState::ShuttingDown),
            "terminated" => Ok(InstanceState::Terminated),
            "stopping" => Ok(InstanceState::Stopping),
            "stopped" => Ok(InstanceState::Stopped),
            other => Err(CloudError::Api(format!("unknown instance state: {}", other))),
        }
    }
}

/// State of a peering connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeeringState {
    InitiatingRequest,
    PendingAcceptance,
    Provisioning,
    Active,
    Deleting,
    Deleted,
    Rejected,
    Failed,
    Expired,
}

impl PeeringState {
    pub fn is_live(&self) -> bool {
        !matches!(
            self,
            PeeringState::Deleting
                | PeeringState::Deleted
                | PeeringState::Rejected
                | PeeringState::Failed
                | PeeringState::Expired
        )
    }
}

impl fmt::Display for PeeringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeeringState::InitiatingRequest => "initiating-request",
            PeeringState::PendingAcceptance => "pending-acceptance",
            PeeringState::Provisioning => "provisioning",
            PeeringState::Active => "active",
            PeeringState::Deleting => "deleting",
            PeeringState::Deleted => "deleted",
            PeeringState::Rejected => "rejected",
            PeeringState::Failed => "failed",
            PeeringState::Expired => "expired",
        };
        f.write_str(s)
    }
}

impl FromStr for PeeringState {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiating-request" => Ok(PeeringState::InitiatingRequest),
            "pending-acceptance" => Ok(PeeringState::PendingAcceptance),
            "provisioning" => Ok(PeeringState::Provisioning),
            "active" => Ok(PeeringState::Active),
            "deleting" => Ok(PeeringState::Deleting),
            "deleted" => Ok(PeeringState::Deleted),
            "rejected" => Ok(PeeringState::Rejected),
            "failed" => Ok(PeeringState::Failed),
            "expired" => Ok(PeeringState::Expired),
            other => Err(CloudError::Api(format!("unknown peering state: {}", other))),
        }
    }
}

/// A network (VPC) belonging to an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Network {
    pub id: String,
    /// Short name, e.g. `admin`
    pub name: String,
    /// `env.name`
    pub qualified_name: String,
    pub cidr_block: String,
    pub state: NetworkState,
}

impl Network {
    pub(crate) fn from_record(env: &str, record: VpcRecord) -> Self {
        let qualified_name = record.tags.get(TAG_NAME).unwrap_or_default().to_string();
        let name = strip_qualifier(env, &qualified_name).to_string();
        Self {
            id: record.id,
            name,
            qualified_name,
            cidr_block: record.cidr_block,
            state: record.state,
        }
    }
}

/// A subnet inside a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    pub id: String,
    /// Short name, e.g. `bastion`
    pub name: String,
    /// `env.network.zone`
    pub qualified_name: String,
    pub cidr_block: String,
    /// Qualified name of the owning network
    pub network: String,
    pub vpc_id: String,
}

impl Zone {
    pub(crate) fn from_record(record: SubnetRecord) -> Self {
        let qualified_name = record.tags.get(TAG_NAME).unwrap_or_default().to_string();
        let network = record.tags.get(TAG_NETWORK).unwrap_or_default().to_string();
        let name = strip_qualifier(&network, &qualified_name).to_string();
        Self {
            id: record.id,
            name,
            qualified_name,
            cidr_block: record.cidr_block,
            network,
            vpc_id: record.vpc_id,
        }
    }
}

/// A machine instance; rebuilt from a tag query on every call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Machine {
    pub id: String,
    /// `env.network.machine`
    pub name: String,
    /// Qualified name of the owning network
    pub network: String,
    /// Qualified name of the zone it was launched into
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    pub state: InstanceState,
}

impl Machine {
    pub(crate) fn from_record(record: InstanceRecord) -> Self {
        Self {
            name: record.tags.get(TAG_NAME).unwrap_or_default().to_string(),
            network: record.tags.get(TAG_NETWORK).unwrap_or_default().to_string(),
            zone: record.tags.get(TAG_ZONE).map(str::to_string),
            id: record.id,
            private_ip: record.private_ip,
            public_ip: record.public_ip,
            state: record.state,
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - {}/{}",
            self.name,
            self.id,
            self.private_ip.as_deref().unwrap_or("-"),
            self.public_ip.as_deref().unwrap_or("(no public ip)")
        )
    }
}

/// A security group scoped to a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroup {
    pub id: String,
    pub group_name: String,
    pub vpc_id: String,
    /// Qualified owning network; absent on the provider-created default group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl SecurityGroup {
    pub const DEFAULT_GROUP_NAME: &'static str = "default";

    pub fn is_default(&self) -> bool {
        self.group_name == Self::DEFAULT_GROUP_NAME
    }

    pub(crate) fn from_record(record: SecurityGroupRecord) -> Self {
        Self {
            network: record.tags.get(TAG_NETWORK).map(str::to_string),
            id: record.id,
            group_name: record.group_name,
            vpc_id: record.vpc_id,
        }
    }
}

/// Composite `admin:app` key naming both sides of a peering connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeeringKey {
    pub admin: String,
    pub app: String,
}

impl PeeringKey {
    pub fn new(admin: impl Into<String>, app: impl Into<String>) -> Self {
        Self {
            admin: admin.into(),
            app: app.into(),
        }
    }

    /// Parse `admin:app`; anything without exactly two non-empty sides is rejected
    pub fn parse(s: &str) -> Option<Self> {
        let (admin, app) = s.split_once(':')?;
        if admin.is_empty() || app.is_empty() || app.contains(':') {
            return None;
        }
        Some(Self::new(admin, app))
    }

    pub fn mentions(&self, network: &str) -> bool {
        self.admin == network || self.app == network
    }
}

impl fmt::Display for PeeringKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.admin, self.app)
    }
}

/// A peering connection between the admin network and an application network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeeringConnection {
    pub id: String,
    /// Parsed `Peering` tag; `None` when the tag is missing or malformed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<PeeringKey>,
    pub state: PeeringState,
}

impl PeeringConnection {
    pub(crate) fn from_record(record: PeeringRecord) -> Self {
        Self {
            key: record.tags.get(TAG_PEERING).and_then(PeeringKey::parse),
            id: record.id,
            state: record.state,
        }
    }
}

/// Join name segments into a dotted qualified name
pub fn qualify(prefix: &str, name: &str) -> String {
    format!("{}.{}", prefix, name)
}

fn strip_qualifier<'a>(prefix: &str, qualified: &'a str) -> &'a str {
    qualified
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(qualified)
}
