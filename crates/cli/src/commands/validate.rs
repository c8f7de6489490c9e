//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{ExportSettings, TransportMethod};
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
    configured_ports: usize,
    enabled_ports: usize,
    codec_format: u32,
    registry_capacity: usize,
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
        Ok(settings) => {
            let warnings = collect_warnings(&settings);
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
                    version: format!("{:?}", settings.version),
                    configured_ports: settings.configured_ports().count(),
                    enabled_ports: settings
                        .configured_ports()
                        .filter(|(_, p)| p.enabled)
                        .count(),
                    codec_format: settings.codec_settings.format,
                    registry_capacity: settings.engine.registry_capacity,
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
fn collect_warnings(settings: &ExportSettings) -> Vec<String> {
    let mut warnings = Vec::new();

    if settings.configured_ports().next().is_none() {
        warnings.push("No ports configured - nothing will be exported".to_string());
    }

    for (channel, port) in settings.configured_ports() {
        if !port.enabled {
            warnings.push(format!("Port '{}' is disabled", channel.port_key()));
        } else if let TransportMethod::Unknown(code) = port.transport_method() {
            warnings.push(format!(
                "Port '{}' uses unknown transport method {} - exports will fail",
                channel.port_key(),
                code
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Ports: {} configured, {} enabled",
                summary.configured_ports, summary.enabled_ports
            );
            println!("  Codec format: {}", summary.codec_format);
            println!("  Registry capacity: {}", summary.registry_capacity);
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

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ExportChannel, PortSetting};

    fn port(method: u32, enabled: bool) -> PortSetting {
        PortSetting {
            method,
            enabled,
            path: "p".into(),
            endpoint: None,
            storage_name: None,
        }
    }

    #[test]
    fn test_warnings() {
        assert_eq!(collect_warnings(&ExportSettings::default()).len(), 1);

        let settings = ExportSettings::default()
            .with_port(ExportChannel::Raw, port(7, true))
            .with_port(ExportChannel::Metadata, port(0, false));
        let warnings = collect_warnings(&settings);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("unknown transport method 7"));
        assert!(warnings[1].contains("disabled"));
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: "/nonexistent/export.toml".into(),
            json: true,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }
}
