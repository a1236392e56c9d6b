pub mod cleanup;
pub mod describe;
pub mod machine;
pub mod network;
pub mod setup;

use crate::settings::Settings;
use std::sync::Arc;
use vpcflow_cloud::{CloudApi, CloudContext, ConnectionProfile, Environment, SystemRunner};
use vpcflow_cloud_aws::Ec2Provider;

/// 1 回のコマンド実行で共有する接続一式
pub struct Session {
    ctx: CloudContext,
    profile: ConnectionProfile,
    runner: SystemRunner,
}

impl Session {
    pub async fn connect(settings: &Settings) -> anyhow::Result<Self> {
        let provider = Ec2Provider::from_env(settings.region.clone()).await;
        tracing::debug!(
            "env={} region={}",
            settings.env,
            provider.region().unwrap_or("(default)")
        );
        let api: Arc<dyn CloudApi> = Arc::new(provider);

        Ok(Self {
            ctx: CloudContext::new(&settings.env, api)
                .with_log_policy(settings.log)
                .with_waits(settings.waits.clone()),
            profile: settings.profile.clone(),
            runner: SystemRunner::default(),
        })
    }

    pub fn context(&self) -> &CloudContext {
        &self.ctx
    }

    pub fn environment(&self) -> Environment<'_> {
        Environment::new(&self.ctx, &self.profile, &self.runner)
    }
}

/// `list` / `machines` の出力
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
