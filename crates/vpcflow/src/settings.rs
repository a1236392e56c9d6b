//! コマンドラインと環境変数から実行設定を組み立てる

use crate::GlobalArgs;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vpcflow_cloud::{ConnectionProfile, LogPolicy, MachineSpec, WaitSettings};

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: String,
    pub region: Option<String>,
    pub log: LogPolicy,
    pub machine: MachineSpec,
    pub profile: ConnectionProfile,
    pub waits: WaitSettings,
}

impl Settings {
    pub fn from_args(args: &GlobalArgs) -> anyhow::Result<Self> {
        let key_dir = resolve_key_dir(args.key_dir.as_deref())?;
        let profile = ConnectionProfile::new(&args.ssh_user, key_dir)?
            .with_host_key_policy(args.host_key);

        let log = if args.quiet {
            LogPolicy::Quiet
        } else if args.verbose {
            LogPolicy::Verbose
        } else {
            LogPolicy::Normal
        };

        let waits = match args.wait_timeout {
            Some(0) => anyhow::bail!("--wait-timeout は 1 秒以上を指定してください"),
            Some(secs) => WaitSettings::default().with_timeout(Duration::from_secs(secs)),
            None => WaitSettings::default(),
        };

        Ok(Self {
            env: args.env.clone(),
            region: args.region.clone(),
            log,
            machine: MachineSpec {
                key_name: args.key.clone(),
                image: args.image.clone(),
                instance_type: args.instance_type.clone(),
            },
            profile,
            waits,
        })
    }
}

/// 未指定なら ~/.ssh、相対パスはカレントディレクトリ基準
fn resolve_key_dir(key_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    match key_dir {
        Some(dir) if dir.is_absolute() => Ok(dir.to_path_buf()),
        Some(dir) => Ok(std::env::current_dir()
            .context("カレントディレクトリを取得できません")?
            .join(dir)),
        None => {
            let home = dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("ホームディレクトリが見つかりません"))?;
            Ok(home.join(".ssh"))
        }
    }
}
