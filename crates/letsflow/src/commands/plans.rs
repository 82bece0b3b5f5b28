use crate::engine::Engine;
use colored::Colorize;

pub async fn handle(engine: &Engine, location: &str) -> anyhow::Result<()> {
    let plans = engine.instances.location_plans(location).await?;

    if plans.is_empty() {
        println!("{}", format!("{} で利用できるプランはありません", location).dimmed());
        return Ok(());
    }

    println!("{}", format!("{} のプラン ({} 件):", location, plans.len()).bold());
    println!(
        "  {:<16} {:<20} {:>5} {:>8} {:>6} {:>10} {:>12}",
        "SLUG", "NAME", "CORE", "MEMORY", "DISK", "BANDWIDTH", "MONTHLY"
    );
    for plan in &plans {
        println!(
            "  {:<16} {:<20} {:>5} {:>8} {:>6} {:>10} {:>12}",
            plan.slug.cyan(),
            plan.shortcode,
            plan.core,
            plan.memory,
            plan.disk,
            plan.bandwidth,
            format!("{} {}", plan.monthly_value, plan.currency_code)
        );
    }
    Ok(())
}
