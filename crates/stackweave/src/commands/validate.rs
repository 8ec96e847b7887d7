use crate::utils;
use colored::Colorize;
use stackweave_cloud::InMemoryProvider;
use stackweave_core::ResourceKind;
use std::path::PathBuf;

pub async fn handle(file: Option<PathBuf>) -> anyhow::Result<()> {
    println!("{}", "Validating stack...".blue());

    let path = utils::resolve_stack_path(file)?;
    println!("Stack file: {}", path.display().to_string().cyan());

    let settings = utils::load_settings()?;
    let result = match utils::load_stack(&path) {
        Ok(stack) => {
            // Lookups are answered by the simulated provider
            let provider = InMemoryProvider::simulated();
            utils::build_topology(&stack, &provider, &settings, None)
                .await
                .map(|topology| (stack, topology))
        }
        Err(e) => Err(e),
    };

    match result {
        Ok((stack, topology)) => {
            println!("{}", "✓ Stack is valid".green().bold());
            println!();
            println!("Summary:");
            println!("  Stack: {}", stack.name.cyan());
            println!("  Resources: {}", topology.len());
            for kind in ResourceKind::ALL {
                let count = topology.nodes().iter().filter(|n| n.kind == kind).count();
                if count > 0 {
                    println!("    - {} x{}", kind.to_string().cyan(), count);
                }
            }
            println!("  Waves: {}", topology.waves().len());
            println!("  Edge region: {}", topology.edge_region());
            if !topology.warnings().is_empty() {
                println!("  Warnings:");
                utils::print_warnings(&topology);
            }
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Invalid stack".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
