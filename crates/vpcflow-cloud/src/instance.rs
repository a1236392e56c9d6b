//! Machine instance lifecycle

use crate::context::CloudContext;
use crate::error::{CloudError, Result};
use crate::model::{InstanceState, Machine, Network, Zone, qualify};
use crate::provider::{
    Filter, InstanceRecord, RunInstanceRequest, TAG_ENV, TAG_NAME, TAG_NETWORK, TAG_ZONE,
};
use crate::wait::wait_for_state;
use serde::{Deserialize, Serialize};

/// Image, size and login key of a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSpec {
    /// Name of the provider key pair; also the `.pem` file name used by ssh
    pub key_name: String,
    pub image: String,
    pub instance_type: String,
}

impl MachineSpec {
    pub const DEFAULT_KEY_NAME: &'static str = "ec2-user";
    pub const DEFAULT_IMAGE: &'static str = "ami-81f7e8b1";
    pub const DEFAULT_INSTANCE_TYPE: &'static str = "t1.micro";
}

impl Default for MachineSpec {
    fn default() -> Self {
        Self {
            key_name: Self::DEFAULT_KEY_NAME.to_string(),
            image: Self::DEFAULT_IMAGE.to_string(),
            instance_type: Self::DEFAULT_INSTANCE_TYPE.to_string(),
        }
    }
}

/// Instance lifecycle manager
pub struct InstanceManager<'a> {
    ctx: &'a CloudContext,
}

impl<'a> InstanceManager<'a> {
    pub(crate) fn new(ctx: &'a CloudContext) -> Self {
        Self { ctx }
    }

    /// Launch one machine into `zone` and wait until it is running
    ///
    /// The machine is named `<network qualified name>.<name>`.
    pub async fn launch(
        &self,
        zone: &Zone,
        name: &str,
        security_group_id: &str,
        spec: &MachineSpec,
    ) -> Result<Machine> {
        let qualified = qualify(&zone.network, name);
        if self.find_qualified(&qualified).await?.is_some() {
            return Err(CloudError::AlreadyExists(format!("machine '{}'", qualified)));
        }

        self.ctx.log().progress(format_args!(
            "Launching '{}' ({}, {}) in zone '{}'",
            qualified, spec.image, spec.instance_type, zone.qualified_name
        ));
        let api = self.ctx.api();
        let request = RunInstanceRequest {
            subnet_id: zone.id.clone(),
            security_group_ids: vec![security_group_id.to_string()],
            image_id: spec.image.clone(),
            instance_type: spec.instance_type.clone(),
            key_name: spec.key_name.clone(),
        };
        let record = api.run_instance(&request).await?;

        let tags = self
            .ctx
            .network_tags(&qualified, &zone.network)
            .with(TAG_ZONE, zone.qualified_name.as_str());
        api.create_tags(&record.id, &tags).await?;

        let running = wait_for_state(
            &self.ctx.waits().state,
            "instance",
            &record.id,
            InstanceState::Pending,
            InstanceState::Running,
            || self.fetch(&record.id),
        )
        .await?;

        let machine = Machine::from_record(running);
        self.ctx
            .log()
            .progress(format_args!("Machine is running: {}", machine));
        Ok(machine)
    }

    /// Terminate a machine and wait until it is gone
    pub async fn terminate(&self, machine: &Machine) -> Result<()> {
        self.ctx
            .log()
            .progress(format_args!("Terminating '{}' ({})", machine.name, machine.id));
        self.ctx.api().terminate_instance(&machine.id).await?;

        wait_for_state(
            &self.ctx.waits().state,
            "instance",
            &machine.id,
            InstanceState::ShuttingDown,
            InstanceState::Terminated,
            || self.fetch(&machine.id),
        )
        .await?;
        Ok(())
    }

    /// Live machine by name relative to the environment, e.g. `admin.jumphost`
    pub async fn find(&self, name: &str) -> Result<Option<Machine>> {
        self.find_qualified(&self.ctx.qualify(name)).await
    }

    /// Live machine by fully qualified name
    pub async fn find_qualified(&self, qualified: &str) -> Result<Option<Machine>> {
        let filters = [
            Filter::tag(TAG_NAME, qualified),
            Filter::tag(TAG_ENV, self.ctx.name()),
        ];
        Ok(self
            .ctx
            .api()
            .describe_instances(&filters)
            .await?
            .into_iter()
            .find(|i| i.state.is_live())
            .map(Machine::from_record))
    }

    /// Machine by instance id, whatever its state
    pub async fn get(&self, instance_id: &str) -> Result<Option<Machine>> {
        Ok(self.fetch(instance_id).await?.map(Machine::from_record))
    }

    /// Live machines of the environment, sorted by name
    pub async fn list(&self) -> Result<Vec<Machine>> {
        self.list_live(&[Filter::tag(TAG_ENV, self.ctx.name())])
            .await
    }

    /// Live machines of one network
    pub async fn list_in_network(&self, network: &Network) -> Result<Vec<Machine>> {
        self.list_live(&[
            Filter::tag(TAG_NETWORK, network.qualified_name.as_str()),
            Filter::tag(TAG_ENV, self.ctx.name()),
        ])
        .await
    }

    async fn list_live(&self, filters: &[Filter]) -> Result<Vec<Machine>> {
        let mut machines: Vec<Machine> = self
            .ctx
            .api()
            .describe_instances(filters)
            .await?
            .into_iter()
            .filter(|i| i.state.is_live())
            .map(Machine::from_record)
            .collect();
        machines.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(machines)
    }

    async fn fetch(&self, instance_id: &str) -> Result<Option<InstanceRecord>> {
        let mut instances = self
            .ctx
            .api()
            .describe_instances(&[Filter::instance_id(instance_id)])
            .await?;
        Ok(instances.pop())
    }
}
