//! # Edge Export CLI
//!
//! `edge-export` 入口。
//!
//! 日志统一由 `observability` 安装；每条命令在启动时记录它读取的配置文件，
//! `send` 额外记录 transport 与通道，便于事后对照导出目录。

mod cli;
mod commands;
mod error;
mod session;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use cli::{Cli, Commands};
use commands::{run_info, run_send, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    observability::init_with_config(cli.observability_config())?;

    let command = cli.command.name();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        command,
        config = %cli.command.config_path().display(),
        "edge-export starting"
    );

    let result = match &cli.command {
        Commands::Send(args) => {
            info!(
                transport = ?args.transport,
                channel = ?args.channel,
                inputs = args.inputs.len(),
                serialized = args.serialized,
                output = %args.output.display(),
                "Export session requested"
            );
            run_send(args).await
        }
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(e) = &result {
        error!(command, error = %e, "Command failed");
    }
    result
}
