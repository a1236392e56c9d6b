#![allow(dead_code)]

use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use vpcflow_cloud::provider::{
    AddressRecord, Filter, GatewayRecord, InstanceRecord, PeeringRecord, RouteRecord,
    RouteTableRecord, RouteTarget, Rule, RunInstanceRequest, SecurityGroupRecord, SubnetRecord,
    Tags, VpcRecord,
};
use vpcflow_cloud::{
    CloudApi, CloudContext, CloudError, CommandRunner, ConnectionProfile, Environment,
    InstanceState, LogPolicy, NetworkState, PeeringState, Result, SetupOptions, SetupOutcome,
    WaitConfig, WaitSettings,
};

pub const ENV: &str = "dev";
pub const CONTROL_CIDR: &str = "203.0.113.0/24";

/// Provider resources held in memory
#[derive(Default)]
pub struct FakeState {
    next_id: u32,
    pub vpcs: Vec<VpcRecord>,
    pub subnets: Vec<SubnetRecord>,
    pub groups: Vec<SecurityGroupRecord>,
    pub gateways: Vec<GatewayRecord>,
    pub route_tables: Vec<RouteTableRecord>,
    pub peerings: Vec<PeeringRecord>,
    pub instances: Vec<InstanceRecord>,
    pub addresses: Vec<AddressRecord>,
    instance_groups: HashMap<String, Vec<String>>,
    /// Mutating calls in order, e.g. "delete_vpc vpc-0001"
    pub calls: Vec<String>,
    failures: HashMap<String, String>,
    /// Keep pending VPCs and instances pending forever
    pub stall_pending: bool,
}

impl FakeState {
    fn new_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", prefix, self.next_id)
    }

    fn tags_mut(&mut self, id: &str) -> Option<&mut Tags> {
        if let Some(r) = self.vpcs.iter_mut().find(|r| r.id == id) {
            return Some(&mut r.tags);
        }
        if let Some(r) = self.subnets.iter_mut().find(|r| r.id == id) {
            return Some(&mut r.tags);
        }
        if let Some(r) = self.groups.iter_mut().find(|r| r.id == id) {
            return Some(&mut r.tags);
        }
        if let Some(r) = self.gateways.iter_mut().find(|r| r.id == id) {
            return Some(&mut r.tags);
        }
        if let Some(r) = self.peerings.iter_mut().find(|r| r.id == id) {
            return Some(&mut r.tags);
        }
        if let Some(r) = self.instances.iter_mut().find(|r| r.id == id) {
            return Some(&mut r.tags);
        }
        self.addresses
            .iter_mut()
            .find(|r| r.allocation_id == id)
            .map(|r| &mut r.tags)
    }

    fn live_instances_where(&self, pred: impl Fn(&InstanceRecord) -> bool) -> usize {
        self.instances
            .iter()
            .filter(|i| i.state != InstanceState::Terminated && pred(i))
            .count()
    }

    fn advance(&mut self) {
        if self.stall_pending {
            return;
        }
        for vpc in &mut self.vpcs {
            if vpc.state == NetworkState::Pending {
                vpc.state = NetworkState::Available;
            }
        }
        for instance in &mut self.instances {
            instance.state = match instance.state {
                InstanceState::Pending => InstanceState::Running,
                InstanceState::ShuttingDown => InstanceState::Terminated,
                other => other,
            };
        }
    }
}

fn api_error(message: impl Into<String>) -> CloudError {
    CloudError::Api(message.into())
}

/// Provider filters over tags and named fields; unknown filter names match nothing
fn matches(filters: &[Filter], tags: &Tags, fields: &[(&str, &str)]) -> bool {
    filters.iter().all(|f| match f.tag_key() {
        Some(key) => tags
            .get(key)
            .is_some_and(|v| f.values.iter().any(|x| x == v)),
        None => fields
            .iter()
            .any(|(name, value)| *name == f.name && f.values.iter().any(|x| x == value)),
    })
}

/// In-memory `CloudApi` with provider-like dependency checks
///
/// VPCs and instances advance one lifecycle step after each describe that observes them.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Every later call of `op` fails with `message`
    pub fn fail_on(&self, op: &str, message: &str) {
        self.state()
            .failures
            .insert(op.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn stall(&self) {
        self.state().stall_pending = true;
    }

    pub fn set_instance_state(&self, instance_id: &str, state: InstanceState) {
        let mut s = self.state();
        if let Some(i) = s.instances.iter_mut().find(|i| i.id == instance_id) {
            i.state = state;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Index of the first mutating call starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.state().calls.iter().position(|c| c.starts_with(prefix))
    }

    /// Index of the last mutating call starting with `prefix`
    pub fn last_position(&self, prefix: &str) -> Option<usize> {
        self.state().calls.iter().rposition(|c| c.starts_with(prefix))
    }

    pub fn live_vpc_count(&self) -> usize {
        self.state().vpcs.len()
    }

    fn begin(&self, op: &str, subject: &str) -> Result<MutexGuard<'_, FakeState>> {
        let mut s = self.state();
        s.calls.push(format!("{} {}", op, subject).trim_end().to_string());
        if let Some(message) = s.failures.get(op) {
            return Err(api_error(message.clone()));
        }
        Ok(s)
    }

    fn read(&self, op: &str) -> Result<MutexGuard<'_, FakeState>> {
        let s = self.state();
        if let Some(message) = s.failures.get(op) {
            return Err(api_error(message.clone()));
        }
        Ok(s)
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> Result<()> {
        let mut s = self.begin("create_tags", resource_id)?;
        let target = s
            .tags_mut(resource_id)
            .ok_or_else(|| api_error(format!("InvalidID.NotFound: {}", resource_id)))?;
        target.merge(tags);
        Ok(())
    }

    async fn create_vpc(&self, cidr_block: &str) -> Result<VpcRecord> {
        let mut s = self.begin("create_vpc", cidr_block)?;
        let vpc = VpcRecord {
            id: s.new_id("vpc"),
            cidr_block: cidr_block.to_string(),
            state: NetworkState::Pending,
            tags: Tags::new(),
        };
        let group_id = s.new_id("sg");
        s.groups.push(SecurityGroupRecord {
            id: group_id,
            group_name: "default".to_string(),
            vpc_id: vpc.id.clone(),
            ingress: Vec::new(),
            egress: vec![Rule::all_traffic_anywhere()],
            tags: Tags::new(),
        });
        let table_id = s.new_id("rtb");
        s.route_tables.push(RouteTableRecord {
            id: table_id,
            vpc_id: vpc.id.clone(),
            routes: vec![RouteRecord {
                destination_cidr: cidr_block.to_string(),
                target: None,
            }],
        });
        s.vpcs.push(vpc.clone());
        Ok(vpc)
    }

    async fn describe_vpcs(&self, filters: &[Filter]) -> Result<Vec<VpcRecord>> {
        let mut s = self.read("describe_vpcs")?;
        let found = s
            .vpcs
            .iter()
            .filter(|v| matches(filters, &v.tags, &[("vpc-id", v.id.as_str())]))
            .cloned()
            .collect();
        s.advance();
        Ok(found)
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        let mut s = self.begin("delete_vpc", vpc_id)?;
        if !s.vpcs.iter().any(|v| v.id == vpc_id) {
            return Err(api_error(format!("InvalidVpcID.NotFound: {}", vpc_id)));
        }
        let blocked = s.subnets.iter().any(|n| n.vpc_id == vpc_id)
            || s
                .groups
                .iter()
                .any(|g| g.vpc_id == vpc_id && g.group_name != "default")
            || s
                .gateways
                .iter()
                .any(|g| g.attached_vpc_ids.iter().any(|v| v == vpc_id))
            || s.live_instances_where(|i| i.vpc_id.as_deref() == Some(vpc_id)) > 0;
        if blocked {
            return Err(api_error(format!("DependencyViolation: {}", vpc_id)));
        }
        s.vpcs.retain(|v| v.id != vpc_id);
        s.groups.retain(|g| g.vpc_id != vpc_id);
        s.route_tables.retain(|t| t.vpc_id != vpc_id);
        Ok(())
    }

    async fn create_subnet(&self, vpc_id: &str, cidr_block: &str) -> Result<SubnetRecord> {
        let mut s = self.begin("create_subnet", cidr_block)?;
        let vpc_block: Ipv4Net = s
            .vpcs
            .iter()
            .find(|v| v.id == vpc_id)
            .ok_or_else(|| api_error(format!("InvalidVpcID.NotFound: {}", vpc_id)))?
            .cidr_block
            .parse()
            .map_err(|_| api_error("InvalidParameterValue"))?;
        let block: Ipv4Net = cidr_block
            .parse()
            .map_err(|_| api_error("InvalidParameterValue"))?;
        if !vpc_block.contains(&block) {
            return Err(api_error(format!("InvalidSubnet.Range: {}", cidr_block)));
        }
        let conflict = s.subnets.iter().filter(|n| n.vpc_id == vpc_id).any(|n| {
            n.cidr_block
                .parse::<Ipv4Net>()
                .is_ok_and(|other| other.contains(&block.network()) || block.contains(&other.network()))
        });
        if conflict {
            return Err(api_error(format!("InvalidSubnet.Conflict: {}", cidr_block)));
        }

        let subnet = SubnetRecord {
            id: s.new_id("subnet"),
            vpc_id: vpc_id.to_string(),
            cidr_block: cidr_block.to_string(),
            tags: Tags::new(),
        };
        s.subnets.push(subnet.clone());
        Ok(subnet)
    }

    async fn describe_subnets(&self, filters: &[Filter]) -> Result<Vec<SubnetRecord>> {
        let s = self.read("describe_subnets")?;
        Ok(s.subnets
            .iter()
            .filter(|n| matches(filters, &n.tags, &[("vpc-id", n.vpc_id.as_str()), ("subnet-id", n.id.as_str())]))
            .cloned()
            .collect())
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        let mut s = self.begin("delete_subnet", subnet_id)?;
        if s.live_instances_where(|i| i.subnet_id.as_deref() == Some(subnet_id)) > 0 {
            return Err(api_error(format!("DependencyViolation: {}", subnet_id)));
        }
        s.subnets.retain(|n| n.id != subnet_id);
        Ok(())
    }

    async fn create_security_group(
        &self,
        vpc_id: &str,
        group_name: &str,
        _description: &str,
    ) -> Result<String> {
        let mut s = self.begin("create_security_group", group_name)?;
        if !s.vpcs.iter().any(|v| v.id == vpc_id) {
            return Err(api_error(format!("InvalidVpcID.NotFound: {}", vpc_id)));
        }
        if s
            .groups
            .iter()
            .any(|g| g.vpc_id == vpc_id && g.group_name == group_name)
        {
            return Err(api_error(format!("InvalidGroup.Duplicate: {}", group_name)));
        }
        let id = s.new_id("sg");
        s.groups.push(SecurityGroupRecord {
            id: id.clone(),
            group_name: group_name.to_string(),
            vpc_id: vpc_id.to_string(),
            ingress: Vec::new(),
            egress: vec![Rule::all_traffic_anywhere()],
            tags: Tags::new(),
        });
        Ok(id)
    }

    async fn describe_security_groups(
        &self,
        filters: &[Filter],
    ) -> Result<Vec<SecurityGroupRecord>> {
        let s = self.read("describe_security_groups")?;
        Ok(s.groups
            .iter()
            .filter(|g| {
                matches(
                    filters,
                    &g.tags,
                    &[
                        ("vpc-id", g.vpc_id.as_str()),
                        ("group-id", g.id.as_str()),
                        ("group-name", g.group_name.as_str()),
                    ],
                )
            })
            .cloned()
            .collect())
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<()> {
        let mut s = self.begin("delete_security_group", group_id)?;
        let group = s
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .ok_or_else(|| api_error(format!("InvalidGroup.NotFound: {}", group_id)))?;
        if group.group_name == "default" {
            return Err(api_error("CannotDelete: default group"));
        }
        let in_use = s.instances.iter().any(|i| {
            i.state != InstanceState::Terminated
                && s.instance_groups
                    .get(&i.id)
                    .is_some_and(|g| g.iter().any(|g| g == group_id))
        });
        if in_use {
            return Err(api_error(format!("DependencyViolation: {}", group_id)));
        }
        s.groups.retain(|g| g.id != group_id);
        Ok(())
    }

    async fn authorize_ingress(&self, group_id: &str, rule: &Rule) -> Result<()> {
        let mut s = self.begin("authorize_ingress", group_id)?;
        let group = s
            .groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| api_error(format!("InvalidGroup.NotFound: {}", group_id)))?;
        if group.ingress.contains(rule) {
            return Err(api_error("InvalidPermission.Duplicate"));
        }
        group.ingress.push(rule.clone());
        Ok(())
    }

    async fn authorize_egress(&self, group_id: &str, rule: &Rule) -> Result<()> {
        let mut s = self.begin("authorize_egress", group_id)?;
        let group = s
            .groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| api_error(format!("InvalidGroup.NotFound: {}", group_id)))?;
        if group.egress.contains(rule) {
            return Err(api_error("InvalidPermission.Duplicate"));
        }
        group.egress.push(rule.clone());
        Ok(())
    }

    async fn revoke_egress(&self, group_id: &str, rule: &Rule) -> Result<()> {
        let mut s = self.begin("revoke_egress", group_id)?;
        let group = s
            .groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| api_error(format!("InvalidGroup.NotFound: {}", group_id)))?;
        let before = group.egress.len();
        group.egress.retain(|r| r != rule);
        if group.egress.len() == before {
            return Err(api_error("InvalidPermission.NotFound"));
        }
        Ok(())
    }

    async fn create_internet_gateway(&self) -> Result<String> {
        let mut s = self.begin("create_internet_gateway", "")?;
        let id = s.new_id("igw");
        s.gateways.push(GatewayRecord {
            id: id.clone(),
            attached_vpc_ids: Vec::new(),
            tags: Tags::new(),
        });
        Ok(id)
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        let mut s = self.begin("attach_internet_gateway", gateway_id)?;
        if !s.vpcs.iter().any(|v| v.id == vpc_id) {
            return Err(api_error(format!("InvalidVpcID.NotFound: {}", vpc_id)));
        }
        let gateway = s
            .gateways
            .iter_mut()
            .find(|g| g.id == gateway_id)
            .ok_or_else(|| api_error(format!("InvalidInternetGatewayID.NotFound: {}", gateway_id)))?;
        if !gateway.attached_vpc_ids.is_empty() {
            return Err(api_error("Resource.AlreadyAssociated"));
        }
        gateway.attached_vpc_ids.push(vpc_id.to_string());
        Ok(())
    }

    async fn describe_internet_gateways(&self, filters: &[Filter]) -> Result<Vec<GatewayRecord>> {
        let s = self.read("describe_internet_gateways")?;
        Ok(s.gateways
            .iter()
            .filter(|g| {
                let mut fields: Vec<(&str, &str)> = vec![("internet-gateway-id", g.id.as_str())];
                fields.extend(
                    g.attached_vpc_ids
                        .iter()
                        .map(|v| ("attachment.vpc-id", v.as_str())),
                );
                matches(filters, &g.tags, &fields)
            })
            .cloned()
            .collect())
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        let mut s = self.begin("detach_internet_gateway", gateway_id)?;
        let gateway = s
            .gateways
            .iter_mut()
            .find(|g| g.id == gateway_id)
            .ok_or_else(|| api_error(format!("InvalidInternetGatewayID.NotFound: {}", gateway_id)))?;
        if !gateway.attached_vpc_ids.iter().any(|v| v == vpc_id) {
            return Err(api_error("Gateway.NotAttached"));
        }
        gateway.attached_vpc_ids.retain(|v| v != vpc_id);
        Ok(())
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<()> {
        let mut s = self.begin("delete_internet_gateway", gateway_id)?;
        let attached = s
            .gateways
            .iter()
            .find(|g| g.id == gateway_id)
            .ok_or_else(|| api_error(format!("InvalidInternetGatewayID.NotFound: {}", gateway_id)))?
            .attached_vpc_ids
            .len();
        if attached > 0 {
            return Err(api_error(format!("DependencyViolation: {}", gateway_id)));
        }
        s.gateways.retain(|g| g.id != gateway_id);
        Ok(())
    }

    async fn describe_route_tables(&self, filters: &[Filter]) -> Result<Vec<RouteTableRecord>> {
        let s = self.read("describe_route_tables")?;
        Ok(s.route_tables
            .iter()
            .filter(|t| {
                matches(
                    filters,
                    &Tags::new(),
                    &[("vpc-id", t.vpc_id.as_str()), ("route-table-id", t.id.as_str())],
                )
            })
            .cloned()
            .collect())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        target: &RouteTarget,
    ) -> Result<()> {
        let mut s = self.begin("create_route", route_table_id)?;
        let table = s
            .route_tables
            .iter_mut()
            .find(|t| t.id == route_table_id)
            .ok_or_else(|| api_error(format!("InvalidRouteTableID.NotFound: {}", route_table_id)))?;
        if table
            .routes
            .iter()
            .any(|r| r.destination_cidr == destination_cidr)
        {
            return Err(api_error("RouteAlreadyExists"));
        }
        table.routes.push(RouteRecord {
            destination_cidr: destination_cidr.to_string(),
            target: Some(target.clone()),
        });
        Ok(())
    }

    async fn create_peering(
        &self,
        requester_vpc_id: &str,
        accepter_vpc_id: &str,
    ) -> Result<String> {
        let mut s = self.begin("create_peering", requester_vpc_id)?;
        for vpc_id in [requester_vpc_id, accepter_vpc_id] {
            if !s.vpcs.iter().any(|v| v.id == vpc_id) {
                return Err(api_error(format!("InvalidVpcID.NotFound: {}", vpc_id)));
            }
        }
        let id = s.new_id("pcx");
        s.peerings.push(PeeringRecord {
            id: id.clone(),
            requester_vpc_id: requester_vpc_id.to_string(),
            accepter_vpc_id: accepter_vpc_id.to_string(),
            state: PeeringState::PendingAcceptance,
            tags: Tags::new(),
        });
        Ok(id)
    }

    async fn accept_peering(&self, peering_id: &str) -> Result<PeeringState> {
        let mut s = self.begin("accept_peering", peering_id)?;
        let peering = s
            .peerings
            .iter_mut()
            .find(|p| p.id == peering_id)
            .ok_or_else(|| api_error(format!("InvalidVpcPeeringConnectionID.NotFound: {}", peering_id)))?;
        peering.state = PeeringState::Active;
        Ok(peering.state)
    }

    async fn describe_peerings(&self, filters: &[Filter]) -> Result<Vec<PeeringRecord>> {
        let s = self.read("describe_peerings")?;
        Ok(s.peerings
            .iter()
            .filter(|p| matches(filters, &p.tags, &[("vpc-peering-connection-id", p.id.as_str())]))
            .cloned()
            .collect())
    }

    async fn delete_peering(&self, peering_id: &str) -> Result<()> {
        let mut s = self.begin("delete_peering", peering_id)?;
        let peering = s
            .peerings
            .iter_mut()
            .find(|p| p.id == peering_id)
            .ok_or_else(|| api_error(format!("InvalidVpcPeeringConnectionID.NotFound: {}", peering_id)))?;
        peering.state = PeeringState::Deleted;
        Ok(())
    }

    async fn run_instance(&self, request: &RunInstanceRequest) -> Result<InstanceRecord> {
        let mut s = self.begin("run_instance", &request.subnet_id)?;
        let subnet = s
            .subnets
            .iter()
            .find(|n| n.id == request.subnet_id)
            .cloned()
            .ok_or_else(|| api_error(format!("InvalidSubnetID.NotFound: {}", request.subnet_id)))?;
        let block: Ipv4Net = subnet
            .cidr_block
            .parse()
            .map_err(|_| api_error("InvalidParameterValue"))?;
        let taken = s
            .instances
            .iter()
            .filter(|i| i.subnet_id.as_deref() == Some(subnet.id.as_str()))
            .count();
        let private_ip = block
            .hosts()
            .nth(3 + taken)
            .ok_or_else(|| api_error("InsufficientFreeAddressesInSubnet"))?
            .to_string();

        let instance = InstanceRecord {
            id: s.new_id("i"),
            state: InstanceState::Pending,
            vpc_id: Some(subnet.vpc_id.clone()),
            subnet_id: Some(subnet.id.clone()),
            private_ip: Some(private_ip),
            public_ip: None,
            tags: Tags::new(),
        };
        s.instance_groups
            .insert(instance.id.clone(), request.security_group_ids.clone());
        s.instances.push(instance.clone());
        Ok(instance)
    }

    async fn describe_instances(&self, filters: &[Filter]) -> Result<Vec<InstanceRecord>> {
        let mut s = self.read("describe_instances")?;
        let found = s
            .instances
            .iter()
            .filter(|i| {
                matches(
                    filters,
                    &i.tags,
                    &[
                        ("instance-id", i.id.as_str()),
                        ("vpc-id", i.vpc_id.as_deref().unwrap_or_default()),
                        ("subnet-id", i.subnet_id.as_deref().unwrap_or_default()),
                    ],
                )
            })
            .cloned()
            .collect();
        s.advance();
        Ok(found)
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        let mut s = self.begin("terminate_instance", instance_id)?;
        let instance = s
            .instances
            .iter_mut()
            .find(|i| i.id == instance_id)
            .ok_or_else(|| api_error(format!("InvalidInstanceID.NotFound: {}", instance_id)))?;
        if instance.state != InstanceState::Terminated {
            instance.state = InstanceState::ShuttingDown;
        }
        instance.public_ip = None;
        for address in &mut s.addresses {
            if address.instance_id.as_deref() == Some(instance_id) {
                address.instance_id = None;
                address.association_id = None;
            }
        }
        Ok(())
    }

    async fn allocate_address(&self) -> Result<AddressRecord> {
        let mut s = self.begin("allocate_address", "")?;
        let public_ip = format!("198.51.100.{}", 10 + s.addresses.len());
        let address = AddressRecord {
            allocation_id: s.new_id("eipalloc"),
            public_ip,
            instance_id: None,
            association_id: None,
            tags: Tags::new(),
        };
        s.addresses.push(address.clone());
        Ok(address)
    }

    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<()> {
        let mut s = self.begin("associate_address", allocation_id)?;
        let association_id = s.new_id("eipassoc");
        let public_ip = {
            let address = s
                .addresses
                .iter_mut()
                .find(|a| a.allocation_id == allocation_id)
                .ok_or_else(|| api_error(format!("InvalidAllocationID.NotFound: {}", allocation_id)))?;
            address.instance_id = Some(instance_id.to_string());
            address.association_id = Some(association_id);
            address.public_ip.clone()
        };
        let instance = s
            .instances
            .iter_mut()
            .find(|i| i.id == instance_id)
            .ok_or_else(|| api_error(format!("InvalidInstanceID.NotFound: {}", instance_id)))?;
        instance.public_ip = Some(public_ip);
        Ok(())
    }

    async fn describe_addresses(&self, filters: &[Filter]) -> Result<Vec<AddressRecord>> {
        let s = self.read("describe_addresses")?;
        Ok(s.addresses
            .iter()
            .filter(|a| {
                matches(
                    filters,
                    &a.tags,
                    &[
                        ("allocation-id", a.allocation_id.as_str()),
                        ("instance-id", a.instance_id.as_deref().unwrap_or_default()),
                    ],
                )
            })
            .cloned()
            .collect())
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        let mut s = self.begin("release_address", allocation_id)?;
        let address = s
            .addresses
            .iter()
            .find(|a| a.allocation_id == allocation_id)
            .ok_or_else(|| api_error(format!("InvalidAllocationID.NotFound: {}", allocation_id)))?;
        if address.is_associated() {
            return Err(api_error("InvalidIPAddress.InUse"));
        }
        s.addresses.retain(|a| a.allocation_id != allocation_id);
        Ok(())
    }
}

/// `CommandRunner` replaying queued results; an empty queue answers like a healthy host
#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn push_output(&self, output: &str) {
        self.script.lock().unwrap().push_back(Ok(output.to_string()));
    }

    pub fn push_failure(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(CloudError::RemoteExec(message.to_string())));
    }

    pub fn push_error(&self, error: CloudError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Every invocation as `program args...`
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        self.calls.lock().unwrap().push(call);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ip-10-255-255-4\n".to_string()))
    }
}

pub fn quick_waits() -> WaitSettings {
    let config = WaitConfig::fixed(Duration::from_millis(1), Duration::from_millis(500));
    WaitSettings {
        state: config.clone(),
        reachability: config,
    }
}

/// Fake provider, scripted ssh and a `dev` context wired together
pub struct TestCloud {
    pub cloud: Arc<FakeCloud>,
    pub ctx: CloudContext,
    pub runner: ScriptedRunner,
    pub profile: ConnectionProfile,
}

impl TestCloud {
    pub fn new() -> Self {
        let cloud = FakeCloud::new();
        let api: Arc<dyn CloudApi> = cloud.clone();
        let ctx = CloudContext::new(ENV, api)
            .with_waits(quick_waits())
            .with_log_policy(LogPolicy::Quiet);
        Self {
            cloud,
            ctx,
            runner: ScriptedRunner::default(),
            profile: ConnectionProfile::new("ec2-user", "/home/ops/.ssh").unwrap(),
        }
    }

    pub fn env(&self) -> Environment<'_> {
        Environment::new(&self.ctx, &self.profile, &self.runner)
    }

    pub fn setup_options(&self) -> SetupOptions {
        SetupOptions {
            control_cidr: CONTROL_CIDR.to_string(),
            ..SetupOptions::default()
        }
    }

    pub async fn setup(&self) -> SetupOutcome {
        self.env().setup(&self.setup_options()).await.unwrap()
    }
}
