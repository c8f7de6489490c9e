//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{ExportChannel, ExportSettings, PortSetting};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    ports: Vec<PortInfo>,
    codec: CodecInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine: Option<EngineInfo>,
}

#[derive(Serialize)]
struct PortInfo {
    channel: String,
    method: String,
    enabled: bool,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_name: Option<String>,
}

#[derive(Serialize)]
struct CodecInfo {
    format: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_extension: Option<&'static str>,
}

#[derive(Serialize)]
struct EngineInfo {
    registry_capacity: usize,
    max_payload_bytes: u64,
    pump_timeout_ms: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let settings = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&settings, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&settings, args);
    }

    Ok(())
}

fn port_info(channel: ExportChannel, port: &PortSetting) -> PortInfo {
    PortInfo {
        channel: channel.port_key().to_string(),
        method: port.transport_method().to_string(),
        enabled: port.enabled,
        path: port.path.clone(),
        endpoint: port.endpoint.clone(),
        storage_name: port.storage_name.clone(),
    }
}

fn build_config_info(settings: &ExportSettings, args: &InfoArgs) -> ConfigInfo {
    let engine = args.engine.then(|| EngineInfo {
        registry_capacity: settings.engine.registry_capacity,
        max_payload_bytes: settings.engine.max_payload_bytes,
        pump_timeout_ms: settings.engine.pump_timeout_ms,
    });

    ConfigInfo {
        version: format!("{:?}", settings.version),
        ports: settings
            .configured_ports()
            .map(|(channel, port)| port_info(channel, port))
            .collect(),
        codec: CodecInfo {
            format: settings.codec_settings.format,
            raw_extension: settings.codec_settings.raw_extension(),
        },
        engine,
    }
}

fn print_config_info(settings: &ExportSettings, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Edge Export Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📄 Version: {:?}", settings.version);

    let ports: Vec<_> = settings.configured_ports().collect();
    println!("\n📤 Ports ({})", ports.len());
    for (i, (channel, port)) in ports.iter().enumerate() {
        let is_last = i == ports.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };
        let status = if port.enabled { "enabled" } else { "disabled" };

        println!(
            "   {} {} ({}, {})",
            prefix,
            channel.port_key(),
            port.transport_method(),
            status
        );
        println!("   {}  ├─ Path: {}", child_prefix, port.path);
        match (&port.endpoint, &port.storage_name) {
            (Some(endpoint), _) => println!("   {}  └─ Endpoint: {}", child_prefix, endpoint),
            (None, Some(storage)) => println!("   {}  └─ Storage: {}", child_prefix, storage),
            (None, None) => println!("   {}  └─ (no endpoint)", child_prefix),
        }
    }

    println!("\n🎞️  Codec");
    println!(
        "   └─ Format: {} ({})",
        settings.codec_settings.format,
        settings.codec_settings.raw_extension().unwrap_or("unknown")
    );

    if args.engine {
        let engine = &settings.engine;
        println!("\n⚙️  Engine");
        println!("   ├─ Registry capacity: {}", engine.registry_capacity);
        println!("   ├─ Max payload: {} bytes", engine.max_payload_bytes);
        println!("   └─ Pump timeout: {} ms", engine.pump_timeout_ms);
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_info() {
        let settings = ExportSettings::default().with_port(
            ExportChannel::Metadata,
            PortSetting {
                method: 0,
                enabled: true,
                path: "meta".into(),
                endpoint: None,
                storage_name: None,
            },
        );
        let args = InfoArgs {
            config: "export.toml".into(),
            json: true,
            engine: false,
        };

        let info = build_config_info(&settings, &args);
        assert_eq!(info.ports.len(), 1);
        assert_eq!(info.ports[0].channel, "metadata");
        assert!(info.engine.is_none());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["codec"]["raw_extension"], "bin");
    }
}
