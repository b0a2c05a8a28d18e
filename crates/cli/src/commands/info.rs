//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{HandlerConfig, PipelineBlueprint};
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    transport: TransportInfo,
    channels: Vec<ChannelInfo>,
}

#[derive(Serialize)]
struct TransportInfo {
    bind_host: String,
    destination_host: String,
    log_port: u16,
    critical_error_port: u16,
    max_datagram_size: usize,
    max_fragment_payload: usize,
    broadcast: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reassembly_ttl_ms: Option<u64>,
}

#[derive(Serialize)]
struct ChannelInfo {
    name: String,
    root: NodeInfo,
}

#[derive(Serialize)]
struct NodeInfo {
    name: String,
    node_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimal_filter: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeInfo>,
}

impl From<&HandlerConfig> for NodeInfo {
    fn from(node: &HandlerConfig) -> Self {
        let (node_type, kind, minimal_filter) = match node {
            HandlerConfig::Sequence { .. } => ("sequence", None, None),
            HandlerConfig::Parallel { .. } => ("parallel", None, None),
            HandlerConfig::Leaf(leaf) => (
                "leaf",
                Some(leaf.kind.clone()),
                leaf.minimal_filter.map(|l| l.to_string()),
            ),
        };
        Self {
            name: node.name().to_string(),
            node_type,
            kind,
            minimal_filter,
            children: node.children().iter().map(NodeInfo::from).collect(),
        }
    }
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(Some(&args.config))?;

    if args.json {
        let info = build_config_info(&blueprint);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint);
    }

    Ok(())
}

fn build_config_info(blueprint: &PipelineBlueprint) -> ConfigInfo {
    let t = &blueprint.transport;
    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        transport: TransportInfo {
            bind_host: t.bind_host.clone(),
            destination_host: t.destination_host.clone(),
            log_port: t.log_port,
            critical_error_port: t.critical_error_port,
            max_datagram_size: t.max_datagram_size,
            max_fragment_payload: t.max_fragment_payload(),
            broadcast: t.broadcast,
            reassembly_ttl_ms: t.reassembly_ttl_ms,
        },
        channels: blueprint
            .channels
            .iter()
            .map(|c| ChannelInfo {
                name: c.name.clone(),
                root: NodeInfo::from(&c.root),
            })
            .collect(),
    }
}

fn print_config_info(blueprint: &PipelineBlueprint) {
    let t = &blueprint.transport;
    println!("=== logpipe Configuration ===\n");

    println!("Transport");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Bind: {} (log {}, critical {})", t.bind_host, t.log_port, t.critical_error_port);
    println!(
        "   ├─ Destination: {}{}",
        t.destination_host,
        if t.broadcast { " (broadcast)" } else { "" }
    );
    println!(
        "   ├─ Datagram: {} bytes ({} payload per fragment)",
        t.max_datagram_size,
        t.max_fragment_payload()
    );
    match t.reassembly_ttl_ms {
        Some(ttl) => println!("   └─ Reassembly TTL: {} ms", ttl),
        None => println!("   └─ Reassembly TTL: never evict"),
    }

    println!("\nChannels ({})", blueprint.channels.len());
    for (i, channel) in blueprint.channels.iter().enumerate() {
        let is_last = i == blueprint.channels.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {}", prefix, channel.name);
        print_node(&channel.root, &format!("   {}  ", child_prefix), true);
    }

    println!();
}

fn print_node(node: &HandlerConfig, indent: &str, is_last: bool) {
    let prefix = if is_last { "└─" } else { "├─" };
    let label = match node {
        HandlerConfig::Sequence { .. } => "sequence".to_string(),
        HandlerConfig::Parallel { .. } => "parallel".to_string(),
        HandlerConfig::Leaf(leaf) => match leaf.minimal_filter {
            Some(level) => format!("{}, >= {}", leaf.kind, level),
            None => leaf.kind.clone(),
        },
    };
    println!("{}{} {} ({})", indent, prefix, node.name(), label);

    let child_indent = format!("{}{}", indent, if is_last { "   " } else { "│  " });
    let children = node.children();
    for (i, child) in children.iter().enumerate() {
        print_node(child, &child_indent, i == children.len() - 1);
    }
}
