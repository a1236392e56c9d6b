//! Zones (subnets) inside a network

use crate::context::CloudContext;
use crate::error::{CloudError, Result};
use crate::model::{Network, Zone, qualify};
use crate::network::parse_cidr;
use crate::provider::{Filter, TAG_ENV, TAG_NAME, TAG_NETWORK};

/// Zone manager
pub struct ZoneManager<'a> {
    ctx: &'a CloudContext,
}

impl<'a> ZoneManager<'a> {
    pub(crate) fn new(ctx: &'a CloudContext) -> Self {
        Self { ctx }
    }

    /// Create a zone; `cidr` must lie inside the network's block
    pub async fn create_zone(&self, network: &Network, name: &str, cidr: &str) -> Result<Zone> {
        let block = parse_cidr(&network.cidr_block)?;
        let subnet = parse_cidr(cidr)?;
        if !block.contains(&subnet) {
            return Err(CloudError::InvalidConfig(format!(
                "zone CIDR {} is outside network '{}' ({})",
                cidr, network.qualified_name, network.cidr_block
            )));
        }

        let qualified = qualify(&network.qualified_name, name);
        if self.find_in(network, &qualified).await?.is_some() {
            return Err(CloudError::AlreadyExists(format!("zone '{}'", qualified)));
        }

        self.ctx
            .log()
            .progress(format_args!("Creating zone '{}' ({})", qualified, cidr));
        let api = self.ctx.api();
        let mut record = api.create_subnet(&network.id, cidr).await?;
        let tags = self.ctx.network_tags(&qualified, &network.qualified_name);
        api.create_tags(&record.id, &tags).await?;
        record.tags.merge(&tags);

        Ok(Zone::from_record(record))
    }

    /// Zones of a network, sorted by name
    pub async fn list_zones(&self, network: &Network) -> Result<Vec<Zone>> {
        let filters = [
            Filter::tag(TAG_NETWORK, network.qualified_name.as_str()),
            Filter::tag(TAG_ENV, self.ctx.name()),
        ];
        let mut zones: Vec<Zone> = self
            .ctx
            .api()
            .describe_subnets(&filters)
            .await?
            .into_iter()
            .map(Zone::from_record)
            .collect();
        zones.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(zones)
    }

    /// Look up a zone by its fully qualified `env.network.zone` name
    pub async fn find_zone(&self, qualified: &str) -> Result<Option<Zone>> {
        let parts: Vec<&str> = qualified.split('.').collect();
        let [env, network, _zone] = parts.as_slice() else {
            return Err(CloudError::InvalidConfig(format!(
                "zone name '{}' must have the form env.network.zone",
                qualified
            )));
        };
        if *env != self.ctx.name() || parts.iter().any(|p| p.is_empty()) {
            return Err(CloudError::InvalidConfig(format!(
                "zone '{}' is not in environment '{}'",
                qualified,
                self.ctx.name()
            )));
        }

        let network = self.ctx.networks().require_network(network).await?;
        self.find_in(&network, qualified).await
    }

    async fn find_in(&self, network: &Network, qualified: &str) -> Result<Option<Zone>> {
        let filters = [
            Filter::tag(TAG_NAME, qualified),
            Filter::vpc_id(network.id.as_str()),
        ];
        let mut subnets = self.ctx.api().describe_subnets(&filters).await?;
        match subnets.len() {
            0 => Ok(None),
            1 => Ok(subnets.pop().map(Zone::from_record)),
            count => Err(CloudError::Ambiguous {
                what: format!("zone '{}'", qualified),
                count,
            }),
        }
    }
}
