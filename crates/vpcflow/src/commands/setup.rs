use super::Session;
use crate::settings::Settings;
use colored::Colorize;
use vpcflow_cloud::{EgressPolicy, SetupOptions};

pub async fn handle(
    session: &Session,
    settings: &Settings,
    control_cidr: String,
    revoke_default_egress: bool,
) -> anyhow::Result<()> {
    println!(
        "{} {}",
        "環境を構築中:".blue(),
        session.context().name().cyan()
    );

    let options = SetupOptions {
        control_cidr,
        machine: settings.machine.clone(),
        egress: if revoke_default_egress {
            EgressPolicy::RevokeDefault
        } else {
            EgressPolicy::KeepDefault
        },
        ..Default::default()
    };
    let outcome = session.environment().setup(&options).await?;

    println!();
    println!("{}", "✓ 構築が完了しました".green());
    println!(
        "  ネットワーク: {} ({}, {})",
        outcome.network.qualified_name.cyan(),
        outcome.network.id,
        outcome.network.cidr_block
    );
    println!(
        "  ゾーン:       {} ({})",
        outcome.zone.qualified_name.cyan(),
        outcome.zone.cidr_block
    );
    println!("  ゲートウェイ: {}", outcome.gateway_id);
    println!(
        "  踏み台:       {} {}",
        outcome.bastion.id.cyan(),
        outcome.public_ip.bold()
    );
    println!();
    println!(
        "  {} vpc -e {} ssh {}",
        "接続確認:".dimmed(),
        session.context().name(),
        outcome.bastion.id
    );
    Ok(())
}
