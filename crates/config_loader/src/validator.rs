//! 配置校验模块
//!
//! 校验规则：
//! - channel 名称非空且唯一
//! - 同一棵 handler 树内 handler 名称非空且唯一
//! - leaf 的 kind 非空
//! - max_datagram_size 大于报文头 (24 字节) 且不超过 UDP 上限
//! - 日志端口与严重错误端口非零且互不相同

use std::collections::HashSet;

use contracts::{
    ChannelConfig, ContractError, HandlerConfig, PipelineBlueprint, TransportSettings,
    ENVELOPE_HEADER_LEN, MAX_UDP_DATAGRAM,
};

/// 校验 PipelineBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    validate_transport(&blueprint.transport)?;
    validate_channel_names(&blueprint.channels)?;
    for channel in &blueprint.channels {
        validate_handler_tree(channel)?;
    }
    Ok(())
}

/// 校验传输配置
fn validate_transport(transport: &TransportSettings) -> Result<(), ContractError> {
    if transport.max_datagram_size <= ENVELOPE_HEADER_LEN {
        return Err(ContractError::config_validation(
            "transport.max_datagram_size",
            format!(
                "must be > {} (envelope header), got {}",
                ENVELOPE_HEADER_LEN, transport.max_datagram_size
            ),
        ));
    }
    if transport.max_datagram_size > MAX_UDP_DATAGRAM {
        return Err(ContractError::config_validation(
            "transport.max_datagram_size",
            format!(
                "must be <= {}, got {}",
                MAX_UDP_DATAGRAM, transport.max_datagram_size
            ),
        ));
    }

    for (field, port) in [
        ("transport.log_port", transport.log_port),
        ("transport.critical_error_port", transport.critical_error_port),
    ] {
        if port == 0 {
            return Err(ContractError::config_validation(field, "port must be non-zero"));
        }
    }

    // 两个发送端各自独立
    if transport.log_port == transport.critical_error_port {
        return Err(ContractError::config_validation(
            "transport.critical_error_port",
            format!("must differ from log_port ({})", transport.log_port),
        ));
    }
    Ok(())
}

/// 校验 channel 名称唯一性
fn validate_channel_names(channels: &[ChannelConfig]) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (index, channel) in channels.iter().enumerate() {
        if channel.name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("channels[{index}].name"),
                "channel name must not be empty",
            ));
        }
        if !seen.insert(&channel.name) {
            return Err(ContractError::config_validation(
                format!("channels[name={}]", channel.name),
                "duplicate channel name",
            ));
        }
    }
    Ok(())
}

/// 校验 handler 树
fn validate_handler_tree(channel: &ChannelConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for node in channel.root.walk() {
        let name = node.name();
        if name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("channels[{}].root", channel.name),
                "handler name must not be empty",
            ));
        }
        if !seen.insert(name) {
            return Err(ContractError::config_validation(
                format!("channels[{}].handlers[name={}]", channel.name, name),
                "duplicate handler name",
            ));
        }
        if let HandlerConfig::Leaf(leaf) = node {
            if leaf.kind.trim().is_empty() {
                return Err(ContractError::config_validation(
                    format!("channels[{}].handlers[{}].kind", channel.name, name),
                    "leaf kind must not be empty",
                ));
            }
        }
    }
    Ok(())
}
