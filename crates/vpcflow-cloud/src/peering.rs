//! Peering between the admin network and application networks

use crate::context::CloudContext;
use crate::error::{CloudError, Result};
use crate::model::{Network, PeeringConnection, PeeringKey};
use crate::provider::{Filter, RouteTarget, TAG_ENV, TAG_PEERING};
use crate::report::TeardownReport;
use std::time::Instant;

/// Peering manager
pub struct PeeringManager<'a> {
    ctx: &'a CloudContext,
}

impl<'a> PeeringManager<'a> {
    pub(crate) fn new(ctx: &'a CloudContext) -> Self {
        Self { ctx }
    }

    /// Peer `app` with `admin` and route each network's block to the other
    ///
    /// Both networks live in the same account, so the request is accepted right away.
    pub async fn connect(&self, admin: &Network, app: &Network) -> Result<PeeringConnection> {
        let key = PeeringKey::new(&admin.name, &app.name);
        if self.list().await?.iter().any(|p| p.key.as_ref() == Some(&key)) {
            return Err(CloudError::AlreadyExists(format!("peering '{}'", key)));
        }

        self.ctx.log().progress(format_args!(
            "Peering '{}' with '{}'",
            app.qualified_name, admin.qualified_name
        ));
        let api = self.ctx.api();
        let id = api.create_peering(&admin.id, &app.id).await?;
        let state = api.accept_peering(&id).await?;

        let tags = self
            .ctx
            .tags(&self.ctx.qualify(&key.to_string()))
            .with(TAG_PEERING, key.to_string());
        api.create_tags(&id, &tags).await?;

        let target = RouteTarget::Peering(id.clone());
        let networks = self.ctx.networks();
        let admin_table = networks.route_table(admin).await?;
        api.create_route(&admin_table.id, &app.cidr_block, &target)
            .await?;
        let app_table = networks.route_table(app).await?;
        api.create_route(&app_table.id, &admin.cidr_block, &target)
            .await?;

        self.ctx
            .log()
            .progress(format_args!("Peering '{}' is {}: {}", key, state, id));
        Ok(PeeringConnection {
            id,
            key: Some(key),
            state,
        })
    }

    /// Live peerings of the environment
    pub async fn list(&self) -> Result<Vec<PeeringConnection>> {
        Ok(self
            .ctx
            .api()
            .describe_peerings(&[Filter::tag(TAG_ENV, self.ctx.name())])
            .await?
            .into_iter()
            .filter(|p| p.state.is_live())
            .map(PeeringConnection::from_record)
            .collect())
    }

    /// Delete every peering whose key names `network` (short name) on either side
    pub async fn disconnect(&self, network: &str) -> Result<TeardownReport> {
        let started = Instant::now();
        let peerings = self.list().await?;
        let mut report = TeardownReport::new();
        for peering in peerings {
            if peering.key.as_ref().is_some_and(|k| k.mentions(network)) {
                self.delete(&peering, &mut report).await;
            }
        }
        Ok(report.finish(started))
    }

    /// Delete every peering of the environment
    pub async fn disconnect_all(&self) -> Result<TeardownReport> {
        let started = Instant::now();
        let mut report = TeardownReport::new();
        for peering in self.list().await? {
            self.delete(&peering, &mut report).await;
        }
        Ok(report.finish(started))
    }

    async fn delete(&self, peering: &PeeringConnection, report: &mut TeardownReport) {
        match self.ctx.api().delete_peering(&peering.id).await {
            Ok(()) => {
                self.ctx
                    .log()
                    .detail(format_args!("Deleted peering {}", peering.id));
                report.add_success("delete-peering", &peering.id);
            }
            Err(e) => {
                self.ctx
                    .log()
                    .failure(format_args!("Deleting peering {} failed: {}", peering.id, e));
                report.add_failure("delete-peering", &peering.id, e);
            }
        }
    }
}
