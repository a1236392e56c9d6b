use super::Session;
use super::cleanup::print_report;
use colored::Colorize;

pub async fn create(session: &Session, name: &str, cidr: &str) -> anyhow::Result<()> {
    let network = session.environment().create_app_network(name, cidr).await?;
    println!(
        "{} {} ({}, {})",
        "✓ ネットワークを作成しました:".green(),
        network.qualified_name.cyan(),
        network.id,
        network.cidr_block
    );
    Ok(())
}

pub async fn destroy(session: &Session, name: &str) -> anyhow::Result<()> {
    match session.environment().destroy_network(name).await? {
        Some(report) => print_report(&report),
        None => {
            println!(
                "{} {}",
                "ネットワークが見つかりません:".yellow(),
                session.context().qualify(name)
            );
            Ok(())
        }
    }
}

pub async fn create_zone(
    session: &Session,
    network: &str,
    zone: &str,
    cidr: Option<&str>,
) -> anyhow::Result<()> {
    let zone = session
        .environment()
        .create_zone(network, zone, cidr)
        .await?;
    println!(
        "{} {} ({}, {})",
        "✓ ゾーンを作成しました:".green(),
        zone.qualified_name.cyan(),
        zone.id,
        zone.cidr_block
    );
    Ok(())
}
