//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{HandlerConfig, PipelineBlueprint};
use dispatcher::HandlerRegistry;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    channel_count: usize,
    handler_count: usize,
    log_port: u16,
    critical_error_port: u16,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint, &HandlerRegistry::with_builtin());
            let handler_count = blueprint
                .channels
                .iter()
                .map(|c| c.root.walk().len())
                .sum();

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    channel_count: blueprint.channels.len(),
                    handler_count,
                    log_port: blueprint.transport.log_port,
                    critical_error_port: blueprint.transport.critical_error_port,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &PipelineBlueprint, registry: &HandlerRegistry) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.channels.is_empty() {
        warnings.push("No channels configured - listen falls back to a console channel".to_string());
    }

    for channel in &blueprint.channels {
        for node in channel.root.walk() {
            match node {
                HandlerConfig::Leaf(leaf) if !registry.contains(&leaf.kind) => {
                    warnings.push(format!(
                        "Channel '{}': handler '{}' uses kind '{}' which is not built in",
                        channel.name, leaf.name, leaf.kind
                    ));
                }
                HandlerConfig::Sequence { name, children }
                | HandlerConfig::Parallel { name, children }
                    if children.is_empty() =>
                {
                    warnings.push(format!(
                        "Channel '{}': composite '{}' has no children - events are discarded",
                        channel.name, name
                    ));
                }
                _ => {}
            }
        }
    }

    if blueprint.transport.reassembly_ttl_ms.is_none() {
        warnings.push(
            "transport.reassembly_ttl_ms not set - incomplete messages are never evicted"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Channels: {}", summary.channel_count);
            println!("  Handlers: {}", summary.handler_count);
            println!(
                "  Ports: log {}, critical {}",
                summary.log_port, summary.critical_error_port
            );
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
