//! Network (VPC) lifecycle
//!
//! Creation waits for the VPC to become available and removes it again if it never does.
//! Destruction walks dependents in a fixed order, since the provider rejects deleting a
//! VPC that still has any of them.

use crate::context::CloudContext;
use crate::error::{CloudError, Result, exactly_one};
use crate::model::{Network, NetworkState, qualify};
use crate::provider::{Filter, RouteTarget, RouteTableRecord, TAG_ENV, TAG_NAME, VpcRecord};
use crate::report::TeardownReport;
use crate::wait::wait_for_state;
use ipnet::Ipv4Net;
use std::time::Instant;

/// Short name of the internet gateway, qualified by its network
pub const GATEWAY_NAME: &str = "gateway";

/// Network manager
pub struct NetworkManager<'a> {
    ctx: &'a CloudContext,
}

impl<'a> NetworkManager<'a> {
    pub(crate) fn new(ctx: &'a CloudContext) -> Self {
        Self { ctx }
    }

    /// Create a network and wait until it is available
    pub async fn create_network(&self, name: &str, cidr: &str) -> Result<Network> {
        parse_cidr(cidr)?;
        let qualified = self.ctx.qualify(name);

        if self.find_network(name).await?.is_some() {
            return Err(CloudError::AlreadyExists(format!("network '{}'", qualified)));
        }

        self.ctx
            .log()
            .progress(format_args!("Creating network '{}' ({})", qualified, cidr));
        let api = self.ctx.api();
        let vpc = api.create_vpc(cidr).await?;

        if let Err(e) = api.create_tags(&vpc.id, &self.ctx.tags(&qualified)).await {
            self.discard(&vpc.id).await;
            return Err(e);
        }

        let ready = wait_for_state(
            &self.ctx.waits().state,
            "vpc",
            &vpc.id,
            NetworkState::Pending,
            NetworkState::Available,
            || self.fetch(&vpc.id),
        )
        .await;

        match ready {
            Ok(record) => {
                let network = Network::from_record(self.ctx.name(), record);
                self.ctx.log().progress(format_args!(
                    "Network '{}' is available: {}",
                    network.qualified_name, network.id
                ));
                Ok(network)
            }
            Err(e) => {
                self.discard(&vpc.id).await;
                Err(e)
            }
        }
    }

    /// Look up a live network by short name
    pub async fn find_network(&self, name: &str) -> Result<Option<Network>> {
        let qualified = self.ctx.qualify(name);
        let filters = [
            Filter::tag(TAG_NAME, qualified.as_str()),
            Filter::tag(TAG_ENV, self.ctx.name()),
        ];
        let mut live: Vec<VpcRecord> = self
            .ctx
            .api()
            .describe_vpcs(&filters)
            .await?
            .into_iter()
            .filter(|v| v.state.is_live())
            .collect();

        match live.len() {
            0 => Ok(None),
            1 => Ok(live.pop().map(|v| Network::from_record(self.ctx.name(), v))),
            count => Err(CloudError::Ambiguous {
                what: format!("network '{}'", qualified),
                count,
            }),
        }
    }

    /// Like [`find_network`](Self::find_network), but the network must exist
    pub async fn require_network(&self, name: &str) -> Result<Network> {
        self.find_network(name).await?.ok_or_else(|| {
            CloudError::ResourceNotFound(format!("network '{}'", self.ctx.qualify(name)))
        })
    }

    /// Every live network of the environment, sorted by name
    pub async fn list_networks(&self) -> Result<Vec<Network>> {
        let mut networks: Vec<Network> = self
            .ctx
            .api()
            .describe_vpcs(&[Filter::tag(TAG_ENV, self.ctx.name())])
            .await?
            .into_iter()
            .filter(|v| v.state.is_live())
            .map(|v| Network::from_record(self.ctx.name(), v))
            .collect();
        networks.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        Ok(networks)
    }

    /// Tear a network down with all of its dependents
    ///
    /// Returns `Ok(None)` when there is no such network.
    pub async fn destroy_network(&self, name: &str) -> Result<Option<TeardownReport>> {
        let Some(network) = self.find_network(name).await? else {
            self.ctx.log().progress(format_args!(
                "Network '{}' not found, nothing to destroy",
                self.ctx.qualify(name)
            ));
            return Ok(None);
        };

        let started = Instant::now();
        self.ctx.log().progress(format_args!(
            "Destroying network '{}' ({})",
            network.qualified_name, network.id
        ));

        let mut report = TeardownReport::new();
        match self.ctx.peering().disconnect(&network.name).await {
            Ok(sub) => report.absorb(sub),
            Err(e) => {
                self.ctx.log().failure(format_args!(
                    "Listing peerings of '{}' failed: {}",
                    network.qualified_name, e
                ));
                report.add_failure("list-peerings", &network.id, e);
            }
        }
        report.absorb(self.teardown(&network).await);

        let report = report.finish(started);
        self.ctx.log().progress(format_args!(
            "Network '{}' destroyed: {}",
            network.qualified_name, report
        ));
        Ok(Some(report))
    }

    /// Remove everything but peerings, then the VPC itself
    pub(crate) async fn teardown(&self, network: &Network) -> TeardownReport {
        let mut report = TeardownReport::new();
        self.terminate_machines(network, &mut report).await;
        self.delete_security_groups(network, &mut report).await;
        self.delete_gateways(network, &mut report).await;
        self.delete_subnets(network, &mut report).await;

        match self.ctx.api().delete_vpc(&network.id).await {
            Ok(()) => report.add_success("delete-vpc", &network.id),
            Err(e) => self.record_failure(&mut report, "delete-vpc", &network.id, e),
        }
        report
    }

    /// Create the network's internet gateway and attach it
    pub async fn create_gateway(&self, network: &Network) -> Result<String> {
        let qualified = qualify(&network.qualified_name, GATEWAY_NAME);
        let api = self.ctx.api();

        let gateway_id = api.create_internet_gateway().await?;
        api.create_tags(
            &gateway_id,
            &self.ctx.network_tags(&qualified, &network.qualified_name),
        )
        .await?;
        api.attach_internet_gateway(&gateway_id, &network.id).await?;

        self.ctx.log().progress(format_args!(
            "Internet gateway '{}' attached to '{}': {}",
            qualified, network.qualified_name, gateway_id
        ));
        Ok(gateway_id)
    }

    /// The network's route table; a VPC here has exactly one
    pub async fn route_table(&self, network: &Network) -> Result<RouteTableRecord> {
        let tables = self
            .ctx
            .api()
            .describe_route_tables(&[Filter::vpc_id(network.id.as_str())])
            .await?;
        exactly_one(format!("route table of '{}'", network.qualified_name), tables)
    }

    /// Send all traffic without a more specific route to the gateway
    pub async fn add_default_route(&self, network: &Network, gateway_id: &str) -> Result<()> {
        let table = self.route_table(network).await?;
        self.ctx
            .api()
            .create_route(
                &table.id,
                "0.0.0.0/0",
                &RouteTarget::Gateway(gateway_id.to_string()),
            )
            .await?;
        self.ctx.log().detail(format_args!(
            "Route 0.0.0.0/0 -> {} added to {}",
            gateway_id, table.id
        ));
        Ok(())
    }

    async fn terminate_machines(&self, network: &Network, report: &mut TeardownReport) {
        let instances = self.ctx.instances();
        let machines = match instances.list_in_network(network).await {
            Ok(machines) => machines,
            Err(e) => {
                self.record_failure(report, "list-instances", &network.id, e);
                return;
            }
        };

        for machine in machines {
            match instances.terminate(&machine).await {
                Ok(()) => report.add_success("terminate-instance", &machine.id),
                Err(e) => self.record_failure(report, "terminate-instance", &machine.id, e),
            }
        }
    }

    async fn delete_security_groups(&self, network: &Network, report: &mut TeardownReport) {
        let groups = match self.ctx.security().list_groups(&network.id).await {
            Ok(groups) => groups,
            Err(e) => {
                self.record_failure(report, "list-security-groups", &network.id, e);
                return;
            }
        };

        for group in groups.into_iter().filter(|g| !g.is_default()) {
            match self.ctx.api().delete_security_group(&group.id).await {
                Ok(()) => report.add_success("delete-security-group", &group.id),
                Err(e) => self.record_failure(report, "delete-security-group", &group.id, e),
            }
        }
    }

    async fn delete_gateways(&self, network: &Network, report: &mut TeardownReport) {
        let api = self.ctx.api();
        let gateways = match api
            .describe_internet_gateways(&[Filter::attached_vpc_id(network.id.as_str())])
            .await
        {
            Ok(gateways) => gateways,
            Err(e) => {
                self.record_failure(report, "list-gateways", &network.id, e);
                return;
            }
        };

        for gateway in gateways {
            if let Err(e) = api.detach_internet_gateway(&gateway.id, &network.id).await {
                self.record_failure(report, "detach-gateway", &gateway.id, e);
            }
            match api.delete_internet_gateway(&gateway.id).await {
                Ok(()) => report.add_success("delete-gateway", &gateway.id),
                Err(e) => self.record_failure(report, "delete-gateway", &gateway.id, e),
            }
        }
    }

    async fn delete_subnets(&self, network: &Network, report: &mut TeardownReport) {
        let api = self.ctx.api();
        let subnets = match api
            .describe_subnets(&[Filter::vpc_id(network.id.as_str())])
            .await
        {
            Ok(subnets) => subnets,
            Err(e) => {
                self.record_failure(report, "list-subnets", &network.id, e);
                return;
            }
        };

        for subnet in subnets {
            match api.delete_subnet(&subnet.id).await {
                Ok(()) => report.add_success("delete-subnet", &subnet.id),
                Err(e) => self.record_failure(report, "delete-subnet", &subnet.id, e),
            }
        }
    }

    fn record_failure(&self, report: &mut TeardownReport, step: &str, id: &str, e: CloudError) {
        self.ctx
            .log()
            .failure(format_args!("{} {} failed: {}", step, id, e));
        report.add_failure(step, id, e);
    }

    async fn fetch(&self, vpc_id: &str) -> Result<Option<VpcRecord>> {
        let mut vpcs = self
            .ctx
            .api()
            .describe_vpcs(&[Filter::vpc_id(vpc_id)])
            .await?;
        Ok(vpcs.pop())
    }

    async fn discard(&self, vpc_id: &str) {
        match self.ctx.api().delete_vpc(vpc_id).await {
            Ok(()) => tracing::debug!("Deleted incomplete VPC {}", vpc_id),
            Err(e) => self
                .ctx
                .log()
                .failure(format_args!("Deleting incomplete VPC {} failed: {}", vpc_id, e)),
        }
    }
}

/// Parse an IPv4 CIDR block
pub(crate) fn parse_cidr(cidr: &str) -> Result<Ipv4Net> {
    cidr.parse::<Ipv4Net>()
        .map_err(|e| CloudError::InvalidConfig(format!("invalid CIDR block '{}': {}", cidr, e)))
}
