use super::Session;
use crate::settings::Settings;
use colored::Colorize;

pub async fn run(
    session: &Session,
    settings: &Settings,
    name: &str,
    zone: &str,
) -> anyhow::Result<()> {
    let machine = session
        .environment()
        .run_machine(name, zone, &settings.machine)
        .await?;
    println!(
        "{} {} ({}, {})",
        "✓ マシンを起動しました:".green(),
        machine.name.cyan(),
        machine.id,
        machine.private_ip.as_deref().unwrap_or("-")
    );
    Ok(())
}

/// リモートの標準出力をそのまま流す
pub async fn ssh(
    session: &Session,
    settings: &Settings,
    instance_id: &str,
    command: &[String],
) -> anyhow::Result<()> {
    let output = session
        .environment()
        .ssh(instance_id, &settings.machine.key_name, command)
        .await?;
    print!("{}", output);
    Ok(())
}
