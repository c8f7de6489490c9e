//! 配置校验模块
//!
//! 校验规则：
//! - engine 参数合法 (registry_capacity > 0, max_payload_bytes > 0)
//! - 已启用端口的 path 非空
//! - http storage 端口必须配置 endpoint
//! - named storage 端口必须配置 storage_name
//! - codec format 已知
//!
//! 未知的传输方式编码在加载阶段允许，提交时才会失败。

use contracts::{ContractError, ExportSettings, TransportMethod};
use validator::Validate;

/// 校验 ExportSettings 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(settings: &ExportSettings) -> Result<(), ContractError> {
    validate_engine(settings)?;
    validate_ports(settings)?;
    validate_codec(settings)?;
    Ok(())
}

/// 校验引擎参数 (validator derive 规则)
fn validate_engine(settings: &ExportSettings) -> Result<(), ContractError> {
    settings.engine.validate().map_err(|errors| {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| format!("engine.{f}"))
            .unwrap_or_else(|| "engine".to_string());
        ContractError::config_validation(field, errors.to_string())
    })
}

/// 校验端口配置
fn validate_ports(settings: &ExportSettings) -> Result<(), ContractError> {
    for (channel, port) in settings.configured_ports() {
        if !port.enabled {
            continue;
        }
        let prefix = format!("port_settings.{}", channel.port_key());

        if port.path.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("{prefix}.path"),
                "path cannot be empty for an enabled port",
            ));
        }

        match port.transport_method() {
            TransportMethod::HttpStorage if is_blank(port.endpoint.as_deref()) => {
                return Err(ContractError::config_validation(
                    format!("{prefix}.endpoint"),
                    "http storage requires an endpoint",
                ));
            }
            TransportMethod::NamedStorage if is_blank(port.storage_name.as_deref()) => {
                return Err(ContractError::config_validation(
                    format!("{prefix}.storage_name"),
                    "named storage requires a storage_name",
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// 校验编码格式
fn validate_codec(settings: &ExportSettings) -> Result<(), ContractError> {
    if settings.codec_settings.raw_extension().is_none() {
        return Err(ContractError::config_validation(
            "codec_settings.format",
            format!(
                "unknown codec format {}, expected 0 (bin), 1 (jpg) or 2 (bmp)",
                settings.codec_settings.format
            ),
        ));
    }
    Ok(())
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
