//! Security groups and their rules

use crate::context::CloudContext;
use crate::environment::SSH_PORT;
use crate::error::{CloudError, Result, exactly_one};
use crate::model::{Network, SecurityGroup, qualify};
use crate::network::parse_cidr;
use crate::provider::{Filter, Rule, TAG_ENV, TAG_NAME};
use serde::{Deserialize, Serialize};

/// What to do with the provider's default "allow all outbound" rule on a new group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EgressPolicy {
    #[default]
    KeepDefault,
    /// Drop the all-traffic rule and allow only outbound ssh to the relay targets
    ///
    /// Each peered application network adds its own tcp/22 egress rule.
    RevokeDefault,
}

/// Security policy manager
pub struct SecurityPolicyManager<'a> {
    ctx: &'a CloudContext,
}

impl<'a> SecurityPolicyManager<'a> {
    pub(crate) fn new(ctx: &'a CloudContext) -> Self {
        Self { ctx }
    }

    /// Create a group named `<network qualified name>.<name>`
    pub async fn create_security_group(
        &self,
        network: &Network,
        name: &str,
        description: &str,
    ) -> Result<SecurityGroup> {
        let group_name = qualify(&network.qualified_name, name);
        if self.find_security_group(&group_name).await?.is_some() {
            return Err(CloudError::AlreadyExists(format!(
                "security group '{}'",
                group_name
            )));
        }

        let api = self.ctx.api();
        let id = api
            .create_security_group(&network.id, &group_name, description)
            .await?;
        api.create_tags(
            &id,
            &self.ctx.network_tags(&group_name, &network.qualified_name),
        )
        .await?;

        self.ctx.log().progress(format_args!(
            "Security group '{}' created: {}",
            group_name, id
        ));
        Ok(SecurityGroup {
            id,
            group_name,
            vpc_id: network.id.clone(),
            network: Some(network.qualified_name.clone()),
        })
    }

    /// Look up a group by qualified name
    pub async fn find_security_group(&self, qualified: &str) -> Result<Option<SecurityGroup>> {
        let filters = [
            Filter::tag(TAG_NAME, qualified),
            Filter::tag(TAG_ENV, self.ctx.name()),
        ];
        let mut groups = self.ctx.api().describe_security_groups(&filters).await?;
        match groups.len() {
            0 => Ok(None),
            1 => Ok(groups.pop().map(SecurityGroup::from_record)),
            count => Err(CloudError::Ambiguous {
                what: format!("security group '{}'", qualified),
                count,
            }),
        }
    }

    /// The provider-created `default` group of a VPC
    pub async fn default_group(&self, vpc_id: &str) -> Result<SecurityGroup> {
        let defaults: Vec<SecurityGroup> = self
            .list_groups(vpc_id)
            .await?
            .into_iter()
            .filter(SecurityGroup::is_default)
            .collect();
        exactly_one(format!("default security group in {}", vpc_id), defaults)
    }

    /// Every group of a VPC, including the default one
    pub async fn list_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>> {
        Ok(self
            .ctx
            .api()
            .describe_security_groups(&[Filter::vpc_id(vpc_id)])
            .await?
            .into_iter()
            .map(SecurityGroup::from_record)
            .collect())
    }

    pub async fn authorize_inbound_address(
        &self,
        group: &SecurityGroup,
        cidr: &str,
        protocol: &str,
        port: i32,
    ) -> Result<()> {
        parse_cidr(cidr)?;
        self.ctx
            .api()
            .authorize_ingress(&group.id, &Rule::cidr(protocol, port, cidr))
            .await?;
        self.ctx.log().detail(format_args!(
            "Allowed {}/{} from {} into {}",
            protocol, port, cidr, group.group_name
        ));
        Ok(())
    }

    pub async fn authorize_outbound_address(
        &self,
        group: &SecurityGroup,
        cidr: &str,
        protocol: &str,
        port: i32,
    ) -> Result<()> {
        parse_cidr(cidr)?;
        self.ctx
            .api()
            .authorize_egress(&group.id, &Rule::cidr(protocol, port, cidr))
            .await?;
        self.ctx.log().detail(format_args!(
            "Allowed {}/{} from {} to {}",
            protocol, port, group.group_name, cidr
        ));
        Ok(())
    }

    /// Admit traffic from members of `peer_group_id`; `owner_id` for cross-account peers
    pub async fn authorize_inbound_group(
        &self,
        group: &SecurityGroup,
        peer_group_id: &str,
        owner_id: Option<&str>,
        protocol: &str,
        port: i32,
    ) -> Result<()> {
        let rule = Rule::group(protocol, port, peer_group_id, owner_id.map(str::to_string));
        self.ctx.api().authorize_ingress(&group.id, &rule).await?;
        self.ctx.log().detail(format_args!(
            "Allowed {}/{} from group {} into {}",
            protocol, port, peer_group_id, group.group_name
        ));
        Ok(())
    }

    pub async fn authorize_outbound_group(
        &self,
        group: &SecurityGroup,
        peer_group_id: &str,
        owner_id: Option<&str>,
        protocol: &str,
        port: i32,
    ) -> Result<()> {
        let rule = Rule::group(protocol, port, peer_group_id, owner_id.map(str::to_string));
        self.ctx.api().authorize_egress(&group.id, &rule).await?;
        self.ctx.log().detail(format_args!(
            "Allowed {}/{} from {} to group {}",
            protocol, port, group.group_name, peer_group_id
        ));
        Ok(())
    }

    /// Remove the all-traffic `0.0.0.0/0` egress rule
    pub async fn revoke_default_outbound(&self, group: &SecurityGroup) -> Result<()> {
        self.ctx
            .api()
            .revoke_egress(&group.id, &Rule::all_traffic_anywhere())
            .await?;
        self.ctx.log().detail(format_args!(
            "Revoked default outbound rule of {}",
            group.group_name
        ));
        Ok(())
    }

    /// Apply `policy`; `relay_cidr` keeps outbound ssh open when the default rule goes
    pub async fn apply_egress_policy(
        &self,
        group: &SecurityGroup,
        policy: EgressPolicy,
        relay_cidr: &str,
    ) -> Result<()> {
        match policy {
            EgressPolicy::KeepDefault => Ok(()),
            EgressPolicy::RevokeDefault => {
                self.revoke_default_outbound(group).await?;
                self.authorize_outbound_address(group, relay_cidr, "tcp", SSH_PORT)
                    .await
            }
        }
    }

    /// Allow outbound ssh to `cidr` unless the group already lets it through
    pub async fn ensure_outbound_ssh(&self, group: &SecurityGroup, cidr: &str) -> Result<()> {
        let rule = Rule::cidr("tcp", SSH_PORT, cidr);
        let egress = self.outbound_rules(group).await?;
        if egress.contains(&Rule::all_traffic_anywhere()) || egress.contains(&rule) {
            return Ok(());
        }
        self.authorize_outbound_address(group, cidr, "tcp", SSH_PORT)
            .await
    }

    async fn outbound_rules(&self, group: &SecurityGroup) -> Result<Vec<Rule>> {
        let records = self
            .ctx
            .api()
            .describe_security_groups(&[Filter::new("group-id", group.id.as_str())])
            .await?;
        Ok(exactly_one(format!("security group '{}'", group.id), records)?.egress)
    }
}
