//! streamlb: RTMP and HTTP (FLV/HLS+) load balancers.
//!
//! ```text
//!                    ┌───────────────────────────────────────────────┐
//!   Encoder/Player   │  rtmp: TcpListeners ──▶ RtmpProxy ──┐         │
//!   ────────────────▶│                                     │         │
//!                    │  http: HttpServer ──▶ HLS+ / stream ┤         │
//!   Viewer (FLV/HLS) │                                     ▼         │   Worker
//!   ────────────────▶│                     127.0.0.1:<active port> ──┼──▶ process
//!                    │                                     ▲         │
//!   Operator         │  control API ──▶ BackendSelector ───┘         │
//!   ────────────────▶│                                               │
//!                    └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use streamlb::lifecycle::{run_http, run_rtmp};

#[derive(Parser)]
#[command(name = "streamlb", version)]
#[command(about = "Load balancers for RTMP and HTTP FLV/HLS+ streaming", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load-balance RTMP publish and play connections
    Rtmp {
        #[arg(short, long, default_value = "conf/rtmplb.toml")]
        config: PathBuf,
    },
    /// Load-balance HTTP FLV and HLS+ streams
    Http {
        #[arg(short, long, default_value = "conf/httplb.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Rtmp { config } => {
            println!("RTMPLB is the load-balance for rtmp streaming, config is {}", config.display());
            run_rtmp(&config).await?;
        }
        Commands::Http { config } => {
            println!("HTTPLB is the load-balance for http flv/hls+ streaming, config is {}", config.display());
            run_http(&config).await?;
        }
    }

    Ok(())
}
