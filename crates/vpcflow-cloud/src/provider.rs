//! Cloud provider API trait definition
//!
//! `CloudApi` is the only boundary between the engine and the provider's resource API.
//! Every lookup is a filter query; tags are the only persisted state.

use crate::error::Result;
use crate::model::{InstanceState, NetworkState, PeeringState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TAG_NAME: &str = "Name";
pub const TAG_ENV: &str = "Env";
pub const TAG_NETWORK: &str = "Network";
pub const TAG_ZONE: &str = "Zone";
pub const TAG_PEERING: &str = "Peering";

/// Provider resource API abstraction
///
/// Implemented by `vpcflow-cloud-aws` against EC2. Calls map one-to-one onto provider
/// requests; no call waits for a state change.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Returns the provider name (e.g., "aws-ec2")
    fn name(&self) -> &str;

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> Result<()>;

    // Networks
    async fn create_vpc(&self, cidr_block: &str) -> Result<VpcRecord>;
    async fn describe_vpcs(&self, filters: &[Filter]) -> Result<Vec<VpcRecord>>;
    async fn delete_vpc(&self, vpc_id: &str) -> Result<()>;

    // Subnets
    async fn create_subnet(&self, vpc_id: &str, cidr_block: &str) -> Result<SubnetRecord>;
    async fn describe_subnets(&self, filters: &[Filter]) -> Result<Vec<SubnetRecord>>;
    async fn delete_subnet(&self, subnet_id: &str) -> Result<()>;

    // Security groups
    async fn create_security_group(
        &self,
        vpc_id: &str,
        group_name: &str,
        description: &str,
    ) -> Result<String>;
    async fn describe_security_groups(&self, filters: &[Filter])
    -> Result<Vec<SecurityGroupRecord>>;
    async fn delete_security_group(&self, group_id: &str) -> Result<()>;
    async fn authorize_ingress(&self, group_id: &str, rule: &Rule) -> Result<()>;
    async fn authorize_egress(&self, group_id: &str, rule: &Rule) -> Result<()>;
    async fn revoke_egress(&self, group_id: &str, rule: &Rule) -> Result<()>;

    // Internet gateways
    async fn create_internet_gateway(&self) -> Result<String>;
    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()>;
    async fn describe_internet_gateways(&self, filters: &[Filter]) -> Result<Vec<GatewayRecord>>;
    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()>;
    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<()>;

    // Route tables
    async fn describe_route_tables(&self, filters: &[Filter]) -> Result<Vec<RouteTableRecord>>;
    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        target: &RouteTarget,
    ) -> Result<()>;

    // Peering
    async fn create_peering(&self, requester_vpc_id: &str, accepter_vpc_id: &str)
    -> Result<String>;
    /// Accept a pending request; returns the state reported after acceptance
    async fn accept_peering(&self, peering_id: &str) -> Result<PeeringState>;
    async fn describe_peerings(&self, filters: &[Filter]) -> Result<Vec<PeeringRecord>>;
    async fn delete_peering(&self, peering_id: &str) -> Result<()>;

    // Instances
    async fn run_instance(&self, request: &RunInstanceRequest) -> Result<InstanceRecord>;
    async fn describe_instances(&self, filters: &[Filter]) -> Result<Vec<InstanceRecord>>;
    async fn terminate_instance(&self, instance_id: &str) -> Result<()>;

    // Elastic addresses
    async fn allocate_address(&self) -> Result<AddressRecord>;
    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<()>;
    async fn describe_addresses(&self, filters: &[Filter]) -> Result<Vec<AddressRecord>>;
    async fn release_address(&self, allocation_id: &str) -> Result<()>;
}

/// Key/value tags attached to a provider resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn merge(&mut self, other: &Tags) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A provider-side query filter (`tag:Name`, `vpc-id`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: vec![value.into()],
        }
    }

    pub fn tag(key: &str, value: impl Into<String>) -> Self {
        Self::new(format!("tag:{}", key), value)
    }

    pub fn vpc_id(vpc_id: impl Into<String>) -> Self {
        Self::new("vpc-id", vpc_id)
    }

    pub fn instance_id(instance_id: impl Into<String>) -> Self {
        Self::new("instance-id", instance_id)
    }

    pub fn attached_vpc_id(vpc_id: impl Into<String>) -> Self {
        Self::new("attachment.vpc-id", vpc_id)
    }

    /// Tag key if this is a `tag:<key>` filter
    pub fn tag_key(&self) -> Option<&str> {
        self.name.strip_prefix("tag:")
    }
}

/// A single security group rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// "tcp", "udp", "icmp" or "-1" for all traffic
    pub protocol: String,
    pub from_port: i32,
    pub to_port: i32,
    pub source: RuleSource,
}

impl Rule {
    pub fn cidr(protocol: impl Into<String>, port: i32, cidr: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            from_port: port,
            to_port: port,
            source: RuleSource::Cidr(cidr.into()),
        }
    }

    pub fn group(
        protocol: impl Into<String>,
        port: i32,
        group_id: impl Into<String>,
        owner_id: Option<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            from_port: port,
            to_port: port,
            source: RuleSource::Group {
                group_id: group_id.into(),
                owner_id,
            },
        }
    }

    /// The provider's default "allow all outbound" rule
    pub fn all_traffic_anywhere() -> Self {
        Self {
            protocol: "-1".to_string(),
            from_port: -1,
            to_port: -1,
            source: RuleSource::Cidr("0.0.0.0/0".to_string()),
        }
    }
}

/// Peer of a security group rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    Cidr(String),
    Group {
        group_id: String,
        owner_id: Option<String>,
    },
}

/// Where a route sends matching traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Gateway(String),
    Peering(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcRecord {
    pub id: String,
    pub cidr_block: String,
    pub state: NetworkState,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetRecord {
    pub id: String,
    pub vpc_id: String,
    pub cidr_block: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupRecord {
    pub id: String,
    pub group_name: String,
    pub vpc_id: String,
    pub ingress: Vec<Rule>,
    pub egress: Vec<Rule>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRecord {
    pub id: String,
    pub attached_vpc_ids: Vec<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableRecord {
    pub id: String,
    pub vpc_id: String,
    pub routes: Vec<RouteRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub destination_cidr: String,
    pub target: Option<RouteTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeeringRecord {
    pub id: String,
    pub requester_vpc_id: String,
    pub accepter_vpc_id: String,
    pub state: PeeringState,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: String,
    pub state: InstanceState,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub allocation_id: String,
    pub public_ip: String,
    pub instance_id: Option<String>,
    pub association_id: Option<String>,
    pub tags: Tags,
}

impl AddressRecord {
    pub fn is_associated(&self) -> bool {
        self.association_id.is_some() || self.instance_id.is_some()
    }
}

/// Request for exactly one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInstanceRequest {
    pub subnet_id: String,
    pub security_group_ids: Vec<String>,
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
}
