use crate::utils;
use colored::Colorize;
use stackweave_cloud::{ActionType, InMemoryProvider, Plan};
use std::path::PathBuf;

pub async fn handle(file: Option<PathBuf>, edge_region: Option<String>, json: bool) -> anyhow::Result<()> {
    let path = utils::resolve_stack_path(file)?;
    let settings = utils::load_settings()?;
    let stack = utils::load_stack(&path)?;

    let provider = InMemoryProvider::simulated();
    let topology =
        utils::build_topology(&stack, &provider, &settings, edge_region.as_deref()).await?;
    let plan = Plan::from_topology(&topology);

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Stack file: {}", path.display().to_string().cyan());
    println!("Plan for {}:", plan.stack.bold());
    for (wave, ids) in plan.waves.iter().enumerate() {
        println!();
        println!("{}", format!("Wave {}", wave + 1).bold());
        for id in ids {
            let Some(action) = plan.actions.iter().find(|a| &a.id == id) else {
                continue;
            };
            let label = match action.action_type {
                ActionType::Create => "+ create".green(),
                ActionType::Adopt => "~ adopt ".cyan(),
            };
            println!("  {} {} ({})", label, action.id, action.description);
        }
    }

    if !plan.warnings.is_empty() {
        println!();
        println!("{}", "Warnings:".yellow());
        utils::print_warnings(&topology);
    }

    println!();
    println!("Plan: {}", plan.summary());
    if !plan.has_changes() {
        println!("{}", "No changes: every resource already exists".green());
    }
    Ok(())
}
