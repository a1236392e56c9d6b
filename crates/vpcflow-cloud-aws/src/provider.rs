//! EC2 implementation of `CloudApi`

use crate::convert;
use crate::error::{AwsError, sdk};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{DomainType, InstanceType};
use vpcflow_cloud::provider::{
    AddressRecord, CloudApi, Filter, GatewayRecord, InstanceRecord, PeeringRecord,
    RouteTableRecord, RouteTarget, Rule, RunInstanceRequest, SecurityGroupRecord, SubnetRecord,
    Tags, VpcRecord,
};
use vpcflow_cloud::{PeeringState, Result};

/// AWS EC2 provider
///
/// Credentials and region come from the standard AWS chain
/// (environment, shared config, instance metadata).
pub struct Ec2Provider {
    client: Client,
    region: Option<String>,
}

impl Ec2Provider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            region: None,
        }
    }

    /// Build a client from the default credential chain, optionally pinning the region
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region.clone() {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        let region = region.or_else(|| config.region().map(|r| r.to_string()));
        tracing::debug!("EC2 client region: {:?}", region);

        Self {
            client: Client::new(&config),
            region,
        }
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

#[async_trait]
impl CloudApi for Ec2Provider {
    fn name(&self) -> &str {
        "aws-ec2"
    }

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> Result<()> {
        tracing::debug!("CreateTags {} {:?}", resource_id, tags);
        self.client
            .create_tags()
            .resources(resource_id)
            .set_tags(Some(convert::to_tags(tags)))
            .send()
            .await
            .map_err(sdk("CreateTags"))?;
        Ok(())
    }

    async fn create_vpc(&self, cidr_block: &str) -> Result<VpcRecord> {
        const OP: &str = "CreateVpc";
        tracing::debug!("{} {}", OP, cidr_block);
        let output = self
            .client
            .create_vpc()
            .cidr_block(cidr_block)
            .send()
            .await
            .map_err(sdk(OP))?;
        let vpc = output.vpc().ok_or_else(|| AwsError::missing(OP, "Vpc"))?;
        Ok(convert::vpc(OP, vpc)?)
    }

    async fn describe_vpcs(&self, filters: &[Filter]) -> Result<Vec<VpcRecord>> {
        const OP: &str = "DescribeVpcs";
        let output = self
            .client
            .describe_vpcs()
            .set_filters(Some(convert::to_filters(filters)))
            .send()
            .await
            .map_err(sdk(OP))?;
        let vpcs = output
            .vpcs()
            .iter()
            .map(|v| convert::vpc(OP, v))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(vpcs)
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        tracing::debug!("DeleteVpc {}", vpc_id);
        self.client
            .delete_vpc()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(sdk("DeleteVpc"))?;
        Ok(())
    }

    async fn create_subnet(&self, vpc_id: &str, cidr_block: &str) -> Result<SubnetRecord> {
        const OP: &str = "CreateSubnet";
        tracing::debug!("{} {} {}", OP, vpc_id, cidr_block);
        let output = self
            .client
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr_block)
            .send()
            .await
            .map_err(sdk(OP))?;
        let subnet = output
            .subnet()
            .ok_or_else(|| AwsError::missing(OP, "Subnet"))?;
        Ok(convert::subnet(OP, subnet)?)
    }

    async fn describe_subnets(&self, filters: &[Filter]) -> Result<Vec<SubnetRecord>> {
        const OP: &str = "DescribeSubnets";
        let output = self
            .client
            .describe_subnets()
            .set_filters(Some(convert::to_filters(filters)))
            .send()
            .await
            .map_err(sdk(OP))?;
        let subnets = output
            .subnets()
            .iter()
            .map(|s| convert::subnet(OP, s))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(subnets)
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        tracing::debug!("DeleteSubnet {}", subnet_id);
        self.client
            .delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(sdk("DeleteSubnet"))?;
        Ok(())
    }

    async fn create_security_group(
        &self,
        vpc_id: &str,
        group_name: &str,
        description: &str,
    ) -> Result<String> {
        const OP: &str = "CreateSecurityGroup";
        tracing::debug!("{} {} in {}", OP, group_name, vpc_id);
        let output = self
            .client
            .create_security_group()
            .vpc_id(vpc_id)
            .group_name(group_name)
            .description(description)
            .send()
            .await
            .map_err(sdk(OP))?;
        let id = output
            .group_id()
            .ok_or_else(|| AwsError::missing(OP, "GroupId"))?;
        Ok(id.to_string())
    }

    async fn describe_security_groups(
        &self,
        filters: &[Filter],
    ) -> Result<Vec<SecurityGroupRecord>> {
        const OP: &str = "DescribeSecurityGroups";
        let output = self
            .client
            .describe_security_groups()
            .set_filters(Some(convert::to_filters(filters)))
            .send()
            .await
            .map_err(sdk(OP))?;
        let groups = output
            .security_groups()
            .iter()
            .map(|g| convert::security_group(OP, g))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(groups)
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<()> {
        tracing::debug!("DeleteSecurityGroup {}", group_id);
        self.client
            .delete_security_group()
            .group_id(group_id)
            .send()
            .await
            .map_err(sdk("DeleteSecurityGroup"))?;
        Ok(())
    }

    async fn authorize_ingress(&self, group_id: &str, rule: &Rule) -> Result<()> {
        tracing::debug!("AuthorizeSecurityGroupIngress {} {:?}", group_id, rule);
        self.client
            .authorize_security_group_ingress()
            .group_id(group_id)
            .ip_permissions(convert::permission(rule))
            .send()
            .await
            .map_err(sdk("AuthorizeSecurityGroupIngress"))?;
        Ok(())
    }

    async fn authorize_egress(&self, group_id: &str, rule: &Rule) -> Result<()> {
        tracing::debug!("AuthorizeSecurityGroupEgress {} {:?}", group_id, rule);
        self.client
            .authorize_security_group_egress()
            .group_id(group_id)
            .ip_permissions(convert::permission(rule))
            .send()
            .await
            .map_err(sdk("AuthorizeSecurityGroupEgress"))?;
        Ok(())
    }

    async fn revoke_egress(&self, group_id: &str, rule: &Rule) -> Result<()> {
        tracing::debug!("RevokeSecurityGroupEgress {} {:?}", group_id, rule);
        self.client
            .revoke_security_group_egress()
            .group_id(group_id)
            .ip_permissions(convert::permission(rule))
            .send()
            .await
            .map_err(sdk("RevokeSecurityGroupEgress"))?;
        Ok(())
    }

    async fn create_internet_gateway(&self) -> Result<String> {
        const OP: &str = "CreateInternetGateway";
        tracing::debug!("{}", OP);
        let output = self
            .client
            .create_internet_gateway()
            .send()
            .await
            .map_err(sdk(OP))?;
        let id = output
            .internet_gateway()
            .and_then(|g| g.internet_gateway_id())
            .ok_or_else(|| AwsError::missing(OP, "InternetGatewayId"))?;
        Ok(id.to_string())
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        tracing::debug!("AttachInternetGateway {} to {}", gateway_id, vpc_id);
        self.client
            .attach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(sdk("AttachInternetGateway"))?;
        Ok(())
    }

    async fn describe_internet_gateways(&self, filters: &[Filter]) -> Result<Vec<GatewayRecord>> {
        const OP: &str = "DescribeInternetGateways";
        let output = self
            .client
            .describe_internet_gateways()
            .set_filters(Some(convert::to_filters(filters)))
            .send()
            .await
            .map_err(sdk(OP))?;
        let gateways = output
            .internet_gateways()
            .iter()
            .map(|g| convert::gateway(OP, g))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(gateways)
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        tracing::debug!("DetachInternetGateway {} from {}", gateway_id, vpc_id);
        self.client
            .detach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(sdk("DetachInternetGateway"))?;
        Ok(())
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<()> {
        tracing::debug!("DeleteInternetGateway {}", gateway_id);
        self.client
            .delete_internet_gateway()
            .internet_gateway_id(gateway_id)
            .send()
            .await
            .map_err(sdk("DeleteInternetGateway"))?;
        Ok(())
    }

    async fn describe_route_tables(&self, filters: &[Filter]) -> Result<Vec<RouteTableRecord>> {
        const OP: &str = "DescribeRouteTables";
        let output = self
            .client
            .describe_route_tables()
            .set_filters(Some(convert::to_filters(filters)))
            .send()
            .await
            .map_err(sdk(OP))?;
        let tables = output
            .route_tables()
            .iter()
            .map(|t| convert::route_table(OP, t))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(tables)
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        target: &RouteTarget,
    ) -> Result<()> {
        tracing::debug!(
            "CreateRoute {} {} -> {:?}",
            route_table_id,
            destination_cidr,
            target
        );
        let request = self
            .client
            .create_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr);
        let request = match target {
            RouteTarget::Gateway(id) => request.gateway_id(id),
            RouteTarget::Peering(id) => request.vpc_peering_connection_id(id),
        };
        request.send().await.map_err(sdk("CreateRoute"))?;
        Ok(())
    }

    async fn create_peering(
        &self,
        requester_vpc_id: &str,
        accepter_vpc_id: &str,
    ) -> Result<String> {
        const OP: &str = "CreateVpcPeeringConnection";
        tracing::debug!("{} {} -> {}", OP, requester_vpc_id, accepter_vpc_id);
        let output = self
            .client
            .create_vpc_peering_connection()
            .vpc_id(requester_vpc_id)
            .peer_vpc_id(accepter_vpc_id)
            .send()
            .await
            .map_err(sdk(OP))?;
        let id = output
            .vpc_peering_connection()
            .and_then(|p| p.vpc_peering_connection_id())
            .ok_or_else(|| AwsError::missing(OP, "VpcPeeringConnectionId"))?;
        Ok(id.to_string())
    }

    async fn accept_peering(&self, peering_id: &str) -> Result<PeeringState> {
        const OP: &str = "AcceptVpcPeeringConnection";
        tracing::debug!("{} {}", OP, peering_id);
        let output = self
            .client
            .accept_vpc_peering_connection()
            .vpc_peering_connection_id(peering_id)
            .send()
            .await
            .map_err(sdk(OP))?;
        let peering = output
            .vpc_peering_connection()
            .ok_or_else(|| AwsError::missing(OP, "VpcPeeringConnection"))?;
        Ok(convert::peering_state(OP, peering)?)
    }

    async fn describe_peerings(&self, filters: &[Filter]) -> Result<Vec<PeeringRecord>> {
        const OP: &str = "DescribeVpcPeeringConnections";
        let output = self
            .client
            .describe_vpc_peering_connections()
            .set_filters(Some(convert::to_filters(filters)))
            .send()
            .await
            .map_err(sdk(OP))?;
        let peerings = output
            .vpc_peering_connections()
            .iter()
            .map(|p| convert::peering(OP, p))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(peerings)
    }

    async fn delete_peering(&self, peering_id: &str) -> Result<()> {
        tracing::debug!("DeleteVpcPeeringConnection {}", peering_id);
        self.client
            .delete_vpc_peering_connection()
            .vpc_peering_connection_id(peering_id)
            .send()
            .await
            .map_err(sdk("DeleteVpcPeeringConnection"))?;
        Ok(())
    }

    async fn run_instance(&self, request: &RunInstanceRequest) -> Result<InstanceRecord> {
        const OP: &str = "RunInstances";
        tracing::debug!("{} {:?}", OP, request);
        let output = self
            .client
            .run_instances()
            .image_id(&request.image_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .key_name(&request.key_name)
            .subnet_id(&request.subnet_id)
            .set_security_group_ids(Some(request.security_group_ids.clone()))
            .min_count(1)
            .max_count(1)
            .send()
            .await
            .map_err(sdk(OP))?;
        match output.instances() {
            [instance] => Ok(convert::instance(OP, instance)?),
            others => Err(AwsError::Sdk {
                operation: OP,
                message: format!("expected exactly one instance, got {}", others.len()),
            }
            .into()),
        }
    }

    async fn describe_instances(&self, filters: &[Filter]) -> Result<Vec<InstanceRecord>> {
        const OP: &str = "DescribeInstances";
        let output = self
            .client
            .describe_instances()
            .set_filters(Some(convert::to_filters(filters)))
            .send()
            .await
            .map_err(sdk(OP))?;
        let instances = output
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .map(|i| convert::instance(OP, i))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(instances)
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        tracing::debug!("TerminateInstances {}", instance_id);
        self.client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(sdk("TerminateInstances"))?;
        Ok(())
    }

    async fn allocate_address(&self) -> Result<AddressRecord> {
        const OP: &str = "AllocateAddress";
        tracing::debug!("{}", OP);
        let output = self
            .client
            .allocate_address()
            .domain(DomainType::Vpc)
            .send()
            .await
            .map_err(sdk(OP))?;
        Ok(AddressRecord {
            allocation_id: output
                .allocation_id()
                .ok_or_else(|| AwsError::missing(OP, "AllocationId"))?
                .to_string(),
            public_ip: output
                .public_ip()
                .ok_or_else(|| AwsError::missing(OP, "PublicIp"))?
                .to_string(),
            instance_id: None,
            association_id: None,
            tags: Tags::new(),
        })
    }

    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<()> {
        tracing::debug!("AssociateAddress {} -> {}", allocation_id, instance_id);
        self.client
            .associate_address()
            .allocation_id(allocation_id)
            .instance_id(instance_id)
            .send()
            .await
            .map_err(sdk("AssociateAddress"))?;
        Ok(())
    }

    async fn describe_addresses(&self, filters: &[Filter]) -> Result<Vec<AddressRecord>> {
        const OP: &str = "DescribeAddresses";
        let output = self
            .client
            .describe_addresses()
            .set_filters(Some(convert::to_filters(filters)))
            .send()
            .await
            .map_err(sdk(OP))?;
        let addresses = output
            .addresses()
            .iter()
            .map(|a| convert::address(OP, a))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(addresses)
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        tracing::debug!("ReleaseAddress {}", allocation_id);
        self.client
            .release_address()
            .allocation_id(allocation_id)
            .send()
            .await
            .map_err(sdk("ReleaseAddress"))?;
        Ok(())
    }
}
