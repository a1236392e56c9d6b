//! Environment-level workflows
//!
//! An environment is one admin network holding the bastion (`jumphost`), plus any number of
//! application networks peered with it. Everything here is composed from the managers on
//! [`CloudContext`]; the steps run strictly one after another.

use crate::context::CloudContext;
use crate::error::{CloudError, Result};
use crate::instance::MachineSpec;
use crate::model::{Machine, Network, PeeringConnection, Zone, qualify};
use crate::network::parse_cidr;
use crate::provider::{Filter, TAG_ENV};
use crate::relay::{CommandRunner, ConnectionProfile, RemoteExecRelay};
use crate::report::TeardownReport;
use crate::security::EgressPolicy;
use serde::Serialize;
use std::time::Instant;

pub const ADMIN_NETWORK: &str = "admin";
pub const ADMIN_CIDR: &str = "10.255.255.0/24";
pub const BASTION_ZONE: &str = "bastion";
pub const BASTION_CIDR: &str = "10.255.255.0/28";
pub const BASTION_MACHINE: &str = "jumphost";
pub const SSH_PORT: i32 = 22;

/// `admin.jumphost`, relative to the environment
pub fn bastion_name() -> String {
    qualify(ADMIN_NETWORK, BASTION_MACHINE)
}

/// Inputs of [`Environment::setup`]
#[derive(Debug, Clone)]
pub struct SetupOptions {
    /// Addresses allowed to ssh into the bastion
    pub control_cidr: String,
    pub admin_cidr: String,
    pub bastion_cidr: String,
    pub machine: MachineSpec,
    pub egress: EgressPolicy,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            control_cidr: "0.0.0.0/0".to_string(),
            admin_cidr: ADMIN_CIDR.to_string(),
            bastion_cidr: BASTION_CIDR.to_string(),
            machine: MachineSpec::default(),
            egress: EgressPolicy::default(),
        }
    }
}

/// What `setup` provisioned
#[derive(Debug, Clone, Serialize)]
pub struct SetupOutcome {
    pub network: Network,
    pub zone: Zone,
    pub bastion: Machine,
    pub gateway_id: String,
    pub public_ip: String,
}

/// Snapshot returned by `describe`
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub name: String,
    pub networks: Vec<NetworkStatus>,
    pub peerings: Vec<PeeringConnection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkStatus {
    pub network: Network,
    pub zones: Vec<Zone>,
    pub machines: Vec<Machine>,
}

/// Workflows over one environment
pub struct Environment<'a> {
    ctx: &'a CloudContext,
    profile: &'a ConnectionProfile,
    runner: &'a dyn CommandRunner,
}

impl<'a> Environment<'a> {
    pub fn new(
        ctx: &'a CloudContext,
        profile: &'a ConnectionProfile,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            ctx,
            profile,
            runner,
        }
    }

    pub fn context(&self) -> &'a CloudContext {
        self.ctx
    }

    pub fn relay(&self) -> RemoteExecRelay<'a> {
        RemoteExecRelay::new(self.ctx, self.profile, self.runner)
    }

    /// Provision the admin network and a reachable bastion
    ///
    /// There is no rollback: a failure leaves whatever was created, and `cleanup` removes it.
    pub async fn setup(&self, options: &SetupOptions) -> Result<SetupOutcome> {
        parse_cidr(&options.control_cidr)?;
        let admin_block = parse_cidr(&options.admin_cidr)?;
        if !admin_block.contains(&parse_cidr(&options.bastion_cidr)?) {
            return Err(CloudError::InvalidConfig(format!(
                "bastion CIDR {} is outside admin CIDR {}",
                options.bastion_cidr, options.admin_cidr
            )));
        }

        let networks = self.ctx.networks();
        let security = self.ctx.security();
        if networks.find_network(ADMIN_NETWORK).await?.is_some() {
            return Err(CloudError::AlreadyExists(format!(
                "environment '{}' is already set up",
                self.ctx.name()
            )));
        }

        let admin = networks
            .create_network(ADMIN_NETWORK, &options.admin_cidr)
            .await?;

        let group = security
            .create_security_group(&admin, BASTION_ZONE, "ssh access to the bastion")
            .await?;
        security
            .authorize_inbound_address(&group, &options.control_cidr, "tcp", SSH_PORT)
            .await?;
        security
            .apply_egress_policy(&group, options.egress, &options.admin_cidr)
            .await?;

        let zone = self
            .ctx
            .zones()
            .create_zone(&admin, BASTION_ZONE, &options.bastion_cidr)
            .await?;
        let gateway_id = networks.create_gateway(&admin).await?;

        let bastion = self
            .ctx
            .instances()
            .launch(&zone, BASTION_MACHINE, &group.id, &options.machine)
            .await?;

        let api = self.ctx.api();
        let address = api.allocate_address().await?;
        api.create_tags(
            &address.allocation_id,
            &self.ctx.network_tags(&bastion.name, &admin.qualified_name),
        )
        .await?;
        api.associate_address(&address.allocation_id, &bastion.id)
            .await?;
        self.ctx.log().progress(format_args!(
            "Elastic IP {} associated with '{}'",
            address.public_ip, bastion.name
        ));

        networks.add_default_route(&admin, &gateway_id).await?;

        let bastion = self
            .relay()
            .wait_until_reachable(&bastion.id, &options.machine.key_name)
            .await?;

        Ok(SetupOutcome {
            network: admin,
            zone,
            bastion,
            gateway_id,
            public_ip: address.public_ip,
        })
    }

    /// Networks with their zones and machines, plus peerings
    pub async fn describe(&self) -> Result<EnvironmentStatus> {
        let networks = self.ctx.networks();
        if networks.find_network(ADMIN_NETWORK).await?.is_none() {
            return Err(CloudError::ResourceNotFound(format!(
                "environment '{}' has no admin network",
                self.ctx.name()
            )));
        }

        let machines = self.ctx.instances().list().await?;
        let mut statuses = Vec::new();
        for network in networks.list_networks().await? {
            let zones = self.ctx.zones().list_zones(&network).await?;
            let machines = machines
                .iter()
                .filter(|m| m.network == network.qualified_name)
                .cloned()
                .collect();
            statuses.push(NetworkStatus {
                network,
                zones,
                machines,
            });
        }

        Ok(EnvironmentStatus {
            name: self.ctx.name().to_string(),
            networks: statuses,
            peerings: self.ctx.peering().list().await?,
        })
    }

    /// Remove every resource of the environment
    ///
    /// Failed lookups and deletes are recorded in the report; later steps still run.
    pub async fn cleanup(&self) -> Result<TeardownReport> {
        let started = Instant::now();
        let mut report = TeardownReport::new();
        match self.ctx.peering().disconnect_all().await {
            Ok(peerings) => report.absorb(peerings),
            Err(e) => self.record_failure(&mut report, "list-peerings", e),
        }

        let networks = self.ctx.networks();
        match networks.list_networks().await {
            Ok(mut all) => {
                // admin last; the bastion is the way into the others
                all.sort_by_key(|n| n.name == ADMIN_NETWORK);
                for network in &all {
                    self.ctx.log().progress(format_args!(
                        "Destroying network '{}' ({})",
                        network.qualified_name, network.id
                    ));
                    report.absorb(networks.teardown(network).await);
                }
            }
            Err(e) => self.record_failure(&mut report, "list-networks", e),
        }

        self.release_addresses(&mut report).await;
        Ok(report.finish(started))
    }

    fn record_failure(&self, report: &mut TeardownReport, step: &str, error: CloudError) {
        self.ctx.log().failure(format_args!(
            "{} failed in environment '{}': {}",
            step,
            self.ctx.name(),
            error
        ));
        report.add_failure(step, self.ctx.name(), error);
    }

    /// Create an application network peered with admin, reachable over ssh from it
    pub async fn create_app_network(&self, name: &str, cidr: &str) -> Result<Network> {
        if name == ADMIN_NETWORK {
            return Err(CloudError::InvalidConfig(format!(
                "'{}' is reserved for the admin network",
                ADMIN_NETWORK
            )));
        }

        let networks = self.ctx.networks();
        let admin = networks.require_network(ADMIN_NETWORK).await?;
        let block = parse_cidr(cidr)?;
        let admin_block = parse_cidr(&admin.cidr_block)?;
        if block.contains(&admin_block.network()) || admin_block.contains(&block.network()) {
            return Err(CloudError::InvalidConfig(format!(
                "{} overlaps the admin network ({})",
                cidr, admin.cidr_block
            )));
        }

        let app = networks.create_network(name, cidr).await?;
        self.ctx.peering().connect(&admin, &app).await?;

        let security = self.ctx.security();
        let group = security.default_group(&app.id).await?;
        security
            .authorize_inbound_address(&group, &admin.cidr_block, "tcp", SSH_PORT)
            .await?;

        let bastion_group = qualify(&admin.qualified_name, BASTION_ZONE);
        if let Some(bastion) = security.find_security_group(&bastion_group).await? {
            security.ensure_outbound_ssh(&bastion, cidr).await?;
        }
        Ok(app)
    }

    pub async fn destroy_network(&self, name: &str) -> Result<Option<TeardownReport>> {
        self.ctx.networks().destroy_network(name).await
    }

    /// Create a zone; without a CIDR it spans the whole network
    pub async fn create_zone(
        &self,
        network: &str,
        zone: &str,
        cidr: Option<&str>,
    ) -> Result<Zone> {
        let network = self.ctx.networks().require_network(network).await?;
        let cidr = cidr.unwrap_or(&network.cidr_block).to_string();
        self.ctx.zones().create_zone(&network, zone, &cidr).await
    }

    /// Launch a machine into `env.network.zone` under the network's default group
    pub async fn run_machine(&self, name: &str, zone: &str, spec: &MachineSpec) -> Result<Machine> {
        let zone = self
            .ctx
            .zones()
            .find_zone(zone)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("zone '{}'", zone)))?;
        let group = self.ctx.security().default_group(&zone.vpc_id).await?;
        self.ctx
            .instances()
            .launch(&zone, name, &group.id, spec)
            .await
    }

    /// Run a command on a live machine, relayed through the bastion when it is private
    pub async fn ssh(&self, instance_id: &str, key_name: &str, command: &[String]) -> Result<String> {
        let machine = self
            .ctx
            .instances()
            .get(instance_id)
            .await?
            .filter(|m| m.state.is_live())
            .ok_or_else(|| CloudError::ResourceNotFound(format!("instance '{}'", instance_id)))?;
        self.relay().run(&machine, key_name, command).await
    }

    async fn release_addresses(&self, report: &mut TeardownReport) {
        let api = self.ctx.api();
        let addresses = match api
            .describe_addresses(&[Filter::tag(TAG_ENV, self.ctx.name())])
            .await
        {
            Ok(addresses) => addresses,
            Err(e) => return self.record_failure(report, "list-addresses", e),
        };
        for address in addresses.into_iter().filter(|a| !a.is_associated()) {
            match api.release_address(&address.allocation_id).await {
                Ok(()) => report.add_success("release-address", &address.allocation_id),
                Err(e) => {
                    self.ctx.log().failure(format_args!(
                        "Releasing {} ({}) failed: {}",
                        address.public_ip, address.allocation_id, e
                    ));
                    report.add_failure("release-address", &address.allocation_id, e);
                }
            }
        }
    }
}
