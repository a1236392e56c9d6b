use super::{Session, print_json};
use colored::Colorize;
use vpcflow_cloud::Machine;

pub async fn handle(session: &Session) -> anyhow::Result<()> {
    let status = session.environment().describe().await?;

    println!("{} {}", "環境:".bold(), status.name.cyan());
    for entry in &status.networks {
        let network = &entry.network;
        println!();
        println!(
            "{} {}  {}  {}",
            "■".blue(),
            network.qualified_name.cyan().bold(),
            network.cidr_block,
            network.id.dimmed()
        );

        if entry.zones.is_empty() {
            println!("  {}", "ゾーンはありません".dimmed());
        }
        for zone in &entry.zones {
            println!(
                "  {} {:<28} {:<18} {}",
                "zone".dimmed(),
                zone.qualified_name,
                zone.cidr_block,
                zone.id.dimmed()
            );
        }
        for machine in &entry.machines {
            print_machine(machine);
        }
    }

    if !status.peerings.is_empty() {
        println!();
        println!("{}", "ピアリング".bold());
        for peering in &status.peerings {
            let key = peering
                .key
                .as_ref()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("  {:<24} {:<20} {}", key, peering.id.dimmed(), peering.state);
        }
    }
    Ok(())
}

fn print_machine(machine: &Machine) {
    let state = machine.state.to_string();
    let state = if machine.state.is_live() {
        state.green()
    } else {
        state.yellow()
    };
    println!(
        "  {} {:<28} {:<20} {:<16} {:<16} {}",
        "host".dimmed(),
        machine.name,
        machine.id,
        machine.private_ip.as_deref().unwrap_or("-"),
        machine.public_ip.as_deref().unwrap_or("-"),
        state
    );
}

pub async fn list_networks(session: &Session) -> anyhow::Result<()> {
    let networks = session.context().networks().list_networks().await?;
    print_json(&networks)
}

pub async fn list_machines(session: &Session) -> anyhow::Result<()> {
    let machines = session.context().instances().list().await?;
    print_json(&machines)
}
