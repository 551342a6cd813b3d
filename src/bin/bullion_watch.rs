use std::path::PathBuf;

use bullion_sync::{Asset, CycleOutcome, Dashboard, DashboardView, Highlight, Result, TimeRange};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(version, about = "Watch live precious-metal prices from the terminal")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Gateway base URL, overriding the settings file
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Historical window: 1D, 1W, 1M or 3M
    #[arg(long)]
    range: Option<TimeRange>,

    /// Refresh once, print and exit
    #[arg(long)]
    once: bool,

    /// Trigger a manual collection and analysis before printing
    #[arg(long)]
    analyze: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bullion_sync=info,bullion_watch=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut builder = Dashboard::builder().auto_refresh(!cli.once);
    if let Some(path) = &cli.config {
        builder = builder.config_path(path);
    }
    if let Some(url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(range) = cli.range {
        builder = builder.range(range);
    }
    let dashboard = builder.build()?;

    if cli.analyze {
        match dashboard.trigger_manual_analysis().await {
            Ok(outcome) => info!(refresh = ?outcome.refresh, "manual analysis finished"),
            Err(e) => error!(error = %e, "manual analysis failed"),
        }
    }

    if cli.once {
        if dashboard.refresh_now().await == CycleOutcome::Errored {
            error!("refresh failed, showing whatever was held");
        }
        print_view(&dashboard.view());
        dashboard.shutdown().await;
        return Ok(());
    }

    let mut changes = dashboard.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = dashboard.view();
                if !view.loading {
                    print_view(&view);
                }
            }
        }
    }

    dashboard.shutdown().await;
    Ok(())
}

fn print_view(view: &DashboardView) {
    let updated = view
        .last_update
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!("== {} window, updated {} ==", view.selected_range, updated);

    for asset in Asset::ALL {
        let price = view
            .snapshot
            .as_ref()
            .and_then(|s| s.price(asset))
            .map(|p| format!("{:>10.2}", p))
            .unwrap_or_else(|| format!("{:>10}", "n/a"));
        let marker = match view.highlights.get(asset) {
            Highlight::Positive => " ^",
            Highlight::Negative => " v",
            Highlight::None => "",
        };
        println!(
            "{:<9} {} {}{}",
            asset.name(),
            price,
            view.metrics.get(asset),
            marker
        );
    }

    for (asset, summary) in &view.trends {
        if let Some(change) = summary.change_percent {
            println!("{:<9} trend {:?} ({:+.2}%)", asset.name(), summary.trend, change);
        }
    }
    for anomaly in &view.anomalies {
        println!(
            "anomaly: {} {:.2} at {} ({:.1} sigma)",
            anomaly.asset.name(),
            anomaly.price,
            anomaly.label,
            anomaly.deviation
        );
    }
    if view.series_stale {
        println!("(series is from the previous window, refreshing)");
    }
    if let Some(err) = &view.error {
        println!("error: {}", err);
    }
    if let Some(text) = &view.insight_text {
        println!("\n{}", text);
    }
    println!();
}
