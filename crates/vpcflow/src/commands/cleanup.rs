use super::Session;
use colored::Colorize;
use vpcflow_cloud::TeardownReport;

pub async fn handle(session: &Session) -> anyhow::Result<()> {
    println!(
        "{} {}",
        "環境を削除中:".blue(),
        session.context().name().cyan()
    );
    let report = session.environment().cleanup().await?;
    print_report(&report)
}

/// 失敗したステップが 1 つでもあればエラーとして返す
pub fn print_report(report: &TeardownReport) -> anyhow::Result<()> {
    println!();
    for step in &report.succeeded {
        println!("  {} {:<24} {}", "✓".green(), step.step, step.resource_id.dimmed());
    }
    for step in &report.failed {
        println!(
            "  {} {:<24} {} {}",
            "✗".red(),
            step.step,
            step.resource_id,
            step.error.as_deref().unwrap_or_default().red()
        );
    }
    println!();
    println!(
        "{} 件削除 / {} 件失敗 ({} ms)",
        report.succeeded.len(),
        report.failed.len(),
        report.duration_ms
    );

    if report.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{} 件のリソースを削除できませんでした", report.failed.len())
    }
}
