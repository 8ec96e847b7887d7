use crate::utils;
use colored::Colorize;
use stackweave_cloud::{ExecutionReport, Executor, InMemoryProvider};
use std::path::PathBuf;
use std::sync::Arc;

pub struct ApplyArgs {
    pub file: Option<PathBuf>,
    pub simulate: bool,
    pub json: bool,
    pub max_concurrency: Option<usize>,
    pub edge_region: Option<String>,
}

pub async fn handle(args: ApplyArgs) -> anyhow::Result<()> {
    if !args.simulate {
        anyhow::bail!("no cloud provider is configured; run with --simulate to use the in-memory provider");
    }

    let path = utils::resolve_stack_path(args.file)?;
    let settings = utils::load_settings()?;
    let stack = utils::load_stack(&path)?;

    let provider = Arc::new(InMemoryProvider::simulated());
    let topology =
        utils::build_topology(&stack, provider.as_ref(), &settings, args.edge_region.as_deref())
            .await?;

    if !args.json {
        println!("Stack file: {}", path.display().to_string().cyan());
        println!(
            "{}",
            format!("Provisioning {} ({} resources)...", stack.name, topology.len()).blue()
        );
        utils::print_warnings(&topology);
    }

    let options = utils::executor_options(&settings, args.max_concurrency);
    let handle = Executor::new(provider, options).spawn(Arc::new(topology));

    let abort = handle.abort_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, cancelling pending resources...".yellow());
            abort.abort();
        }
    });

    let report = handle.wait().await?;

    if args.json {
        let output = serde_json::json!({
            "report": report,
            "endpoints": report.endpoints(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&report);
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} failed, {} blocked",
            report.failed().len(),
            report.blocked().len()
        );
    }
    Ok(())
}

fn print_report(report: &ExecutionReport) {
    println!();
    for outcome in &report.outcomes {
        let detail = if let Some(error) = &outcome.error {
            error.red().to_string()
        } else if outcome.cancelled {
            "cancelled".yellow().to_string()
        } else if let Some(dependency) = &outcome.blocked_by {
            format!("blocked by {}", dependency).yellow().to_string()
        } else {
            outcome.provider_id.clone().unwrap_or_default()
        };
        println!(
            "  {} {} [{} {}] {}",
            utils::state_label(outcome.state),
            outcome.node_id,
            outcome.kind,
            outcome.region,
            detail
        );
    }

    let endpoints = report.endpoints();
    if !endpoints.is_empty() {
        println!();
        println!("{}", "Endpoints:".bold());
        for line in endpoints.to_string().lines() {
            println!("  {}", line.cyan());
        }
    }

    println!();
    if report.is_success() {
        println!(
            "{}",
            format!(
                "✓ {} resources ready in {}ms",
                report.outcomes.len(),
                report.duration_ms
            )
            .green()
            .bold()
        );
    } else {
        println!("{}", "✗ Provisioning incomplete".red().bold());
    }
}
