//! Conversions between EC2 SDK shapes and vpcflow records

use crate::error::{AwsError, Result};
use aws_sdk_ec2::types as ec2;
use std::str::FromStr;
use vpcflow_cloud::CloudError;
use vpcflow_cloud::provider::{
    AddressRecord, Filter, GatewayRecord, InstanceRecord, PeeringRecord, RouteRecord,
    RouteTableRecord, RouteTarget, Rule, RuleSource, SecurityGroupRecord, SubnetRecord, Tags,
    VpcRecord,
};

const ALL_PROTOCOLS: &str = "-1";

pub(crate) fn to_filters(filters: &[Filter]) -> Vec<ec2::Filter> {
    filters
        .iter()
        .map(|f| {
            ec2::Filter::builder()
                .name(&f.name)
                .set_values(Some(f.values.clone()))
                .build()
        })
        .collect()
}

pub(crate) fn to_tags(tags: &Tags) -> Vec<ec2::Tag> {
    tags.iter()
        .map(|(k, v)| ec2::Tag::builder().key(k).value(v).build())
        .collect()
}

pub(crate) fn from_tags(tags: &[ec2::Tag]) -> Tags {
    tags.iter()
        .filter_map(|t| Some((t.key()?, t.value().unwrap_or_default())))
        .collect()
}

fn required(operation: &'static str, field: &'static str, value: Option<&str>) -> Result<String> {
    value
        .map(str::to_string)
        .ok_or_else(|| AwsError::missing(operation, field))
}

fn state<T>(operation: &'static str, value: Option<&str>) -> Result<T>
where
    T: FromStr<Err = CloudError>,
{
    let value = value.ok_or_else(|| AwsError::missing(operation, "State"))?;
    value.parse().map_err(|_| AwsError::UnknownState {
        operation,
        value: value.to_string(),
    })
}

pub(crate) fn vpc(operation: &'static str, vpc: &ec2::Vpc) -> Result<VpcRecord> {
    Ok(VpcRecord {
        id: required(operation, "VpcId", vpc.vpc_id())?,
        cidr_block: required(operation, "CidrBlock", vpc.cidr_block())?,
        state: state(operation, vpc.state().map(|s| s.as_str()))?,
        tags: from_tags(vpc.tags()),
    })
}

pub(crate) fn subnet(operation: &'static str, subnet: &ec2::Subnet) -> Result<SubnetRecord> {
    Ok(SubnetRecord {
        id: required(operation, "SubnetId", subnet.subnet_id())?,
        vpc_id: required(operation, "VpcId", subnet.vpc_id())?,
        cidr_block: required(operation, "CidrBlock", subnet.cidr_block())?,
        tags: from_tags(subnet.tags()),
    })
}

pub(crate) fn security_group(
    operation: &'static str,
    group: &ec2::SecurityGroup,
) -> Result<SecurityGroupRecord> {
    Ok(SecurityGroupRecord {
        id: required(operation, "GroupId", group.group_id())?,
        group_name: group.group_name().unwrap_or_default().to_string(),
        vpc_id: required(operation, "VpcId", group.vpc_id())?,
        ingress: group.ip_permissions().iter().flat_map(rules).collect(),
        egress: group.ip_permissions_egress().iter().flat_map(rules).collect(),
        tags: from_tags(group.tags()),
    })
}

/// Flatten one permission into a rule per peer
fn rules(permission: &ec2::IpPermission) -> Vec<Rule> {
    let protocol = permission.ip_protocol().unwrap_or(ALL_PROTOCOLS).to_string();
    let (from_port, to_port) = if protocol == ALL_PROTOCOLS {
        (-1, -1)
    } else {
        (
            permission.from_port().unwrap_or(-1),
            permission.to_port().unwrap_or(-1),
        )
    };

    let cidrs = permission
        .ip_ranges()
        .iter()
        .filter_map(|r| r.cidr_ip())
        .map(|cidr| RuleSource::Cidr(cidr.to_string()));
    let groups = permission
        .user_id_group_pairs()
        .iter()
        .filter_map(|p| {
            Some(RuleSource::Group {
                group_id: p.group_id()?.to_string(),
                owner_id: p.user_id().map(str::to_string),
            })
        });

    cidrs
        .chain(groups)
        .map(|source| Rule {
            protocol: protocol.clone(),
            from_port,
            to_port,
            source,
        })
        .collect()
}

pub(crate) fn permission(rule: &Rule) -> ec2::IpPermission {
    let mut builder = ec2::IpPermission::builder().ip_protocol(&rule.protocol);
    if rule.protocol != ALL_PROTOCOLS {
        builder = builder.from_port(rule.from_port).to_port(rule.to_port);
    }
    match &rule.source {
        RuleSource::Cidr(cidr) => builder
            .ip_ranges(ec2::IpRange::builder().cidr_ip(cidr).build())
            .build(),
        RuleSource::Group { group_id, owner_id } => builder
            .user_id_group_pairs(
                ec2::UserIdGroupPair::builder()
                    .group_id(group_id)
                    .set_user_id(owner_id.clone())
                    .build(),
            )
            .build(),
    }
}

pub(crate) fn gateway(
    operation: &'static str,
    gateway: &ec2::InternetGateway,
) -> Result<GatewayRecord> {
    Ok(GatewayRecord {
        id: required(operation, "InternetGatewayId", gateway.internet_gateway_id())?,
        attached_vpc_ids: gateway
            .attachments()
            .iter()
            .filter_map(|a| a.vpc_id().map(str::to_string))
            .collect(),
        tags: from_tags(gateway.tags()),
    })
}

pub(crate) fn route_table(
    operation: &'static str,
    table: &ec2::RouteTable,
) -> Result<RouteTableRecord> {
    Ok(RouteTableRecord {
        id: required(operation, "RouteTableId", table.route_table_id())?,
        vpc_id: required(operation, "VpcId", table.vpc_id())?,
        routes: table.routes().iter().filter_map(route).collect(),
    })
}

fn route(route: &ec2::Route) -> Option<RouteRecord> {
    let target = match (route.gateway_id(), route.vpc_peering_connection_id()) {
        (_, Some(peering)) => Some(RouteTarget::Peering(peering.to_string())),
        // "local" is the implicit in-network route
        (Some(gateway), None) if gateway != "local" => {
            Some(RouteTarget::Gateway(gateway.to_string()))
        }
        _ => None,
    };
    Some(RouteRecord {
        destination_cidr: route.destination_cidr_block()?.to_string(),
        target,
    })
}

pub(crate) fn peering(
    operation: &'static str,
    peering: &ec2::VpcPeeringConnection,
) -> Result<PeeringRecord> {
    Ok(PeeringRecord {
        id: required(
            operation,
            "VpcPeeringConnectionId",
            peering.vpc_peering_connection_id(),
        )?,
        requester_vpc_id: required(
            operation,
            "RequesterVpcInfo.VpcId",
            peering.requester_vpc_info().and_then(|i| i.vpc_id()),
        )?,
        accepter_vpc_id: required(
            operation,
            "AccepterVpcInfo.VpcId",
            peering.accepter_vpc_info().and_then(|i| i.vpc_id()),
        )?,
        state: peering_state(operation, peering)?,
        tags: from_tags(peering.tags()),
    })
}

pub(crate) fn peering_state<T>(
    operation: &'static str,
    peering: &ec2::VpcPeeringConnection,
) -> Result<T>
where
    T: FromStr<Err = CloudError>,
{
    state(
        operation,
        peering
            .status()
            .and_then(|s| s.code())
            .map(|c| c.as_str()),
    )
}

pub(crate) fn instance(
    operation: &'static str,
    instance: &ec2::Instance,
) -> Result<InstanceRecord> {
    Ok(InstanceRecord {
        id: required(operation, "InstanceId", instance.instance_id())?,
        state: state(
            operation,
            instance.state().and_then(|s| s.name()).map(|n| n.as_str()),
        )?,
        vpc_id: instance.vpc_id().map(str::to_string),
        subnet_id: instance.subnet_id().map(str::to_string),
        private_ip: instance.private_ip_address().map(str::to_string),
        public_ip: instance.public_ip_address().map(str::to_string),
        tags: from_tags(instance.tags()),
    })
}

pub(crate) fn address(operation: &'static str, address: &ec2::Address) -> Result<AddressRecord> {
    Ok(AddressRecord {
        allocation_id: required(operation, "AllocationId", address.allocation_id())?,
        public_ip: required(operation, "PublicIp", address.public_ip())?,
        instance_id: address.instance_id().map(str::to_string),
        association_id: address.association_id().map(str::to_string),
        tags: from_tags(address.tags()),
    })
}
