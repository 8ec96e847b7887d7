use anyhow::Context;
use colored::{ColoredString, Colorize};
use stackweave_cloud::{CloudProvider, ExecutorOptions, PollConfig, RetryConfig, resolve_lookups};
use stackweave_config::EngineSettings;
use stackweave_core::{
    NodeState, StackDeclaration, Topology, TopologyBuilder, lookup_requests, parse_stack_file,
};
use std::path::{Path, PathBuf};

/// Explicit `--file`, or the discovered stack file
pub fn resolve_stack_path(file: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match file {
        Some(path) => Ok(path),
        None => Ok(stackweave_config::find_stack_file()?),
    }
}

pub fn load_stack(path: &Path) -> anyhow::Result<StackDeclaration> {
    parse_stack_file(path).with_context(|| format!("failed to load {}", path.display()))
}

pub fn load_settings() -> anyhow::Result<EngineSettings> {
    EngineSettings::load().context("failed to load engine settings")
}

/// Resolve lookups through `provider` and build the topology
///
/// Edge region precedence: `--edge-region`, stack options, settings.
pub async fn build_topology(
    stack: &StackDeclaration,
    provider: &dyn CloudProvider,
    settings: &EngineSettings,
    edge_region: Option<&str>,
) -> anyhow::Result<Topology> {
    let requests = lookup_requests(&stack.resources, &stack.options);
    let lookups = resolve_lookups(provider, &requests).await?;

    let mut builder = TopologyBuilder::for_stack(stack).with_lookups(lookups);
    if stack.options.edge_region.is_none()
        && let Some(region) = &settings.edge_region
    {
        builder = builder.with_edge_region(region.clone());
    }
    if let Some(region) = edge_region {
        builder = builder.with_edge_region(region);
    }

    Ok(builder.build_stack(stack)?)
}

pub fn executor_options(settings: &EngineSettings, max_concurrency: Option<usize>) -> ExecutorOptions {
    ExecutorOptions {
        retry: RetryConfig {
            max_attempts: settings.retry.max_attempts,
            initial_delay: settings.retry.initial_delay(),
            max_delay: settings.retry.max_delay(),
            backoff_multiplier: settings.retry.backoff_multiplier,
        },
        deployment: PollConfig::new(settings.deployment.interval(), settings.deployment.timeout()),
        certificate: PollConfig::new(settings.certificate.interval(), settings.certificate.timeout()),
        max_concurrency: max_concurrency.or(settings.max_concurrency),
    }
}

pub fn print_warnings(topology: &Topology) {
    for warning in topology.warnings() {
        println!("  {} {}", "⚠".yellow(), warning);
    }
}

pub fn state_label(state: NodeState) -> ColoredString {
    let label = format!("{:<12}", state.to_string());
    match state {
        NodeState::Ready => label.green(),
        NodeState::Failed => label.red().bold(),
        NodeState::Blocked => label.yellow(),
        _ => label.normal(),
    }
}
