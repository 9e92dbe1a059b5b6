use clap::{Args, Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "lbctl")]
#[command(about = "Control CLI for the streamlb balancers", long_about = None)]
struct Cli {
    /// Control API base URL
    #[arg(short, long, default_value = "http://127.0.0.1:9100")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the balancer version
    Version,
    /// Show the active backend and every port ever switched to
    Backends,
    /// Switch the active backend
    Proxy(ProxyArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ProxyArgs {
    /// RTMP backend port (RTMP balancer)
    #[arg(long)]
    rtmp: Option<u16>,

    /// HTTP backend port (HTTP balancer)
    #[arg(long)]
    http: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder().no_proxy().build()?;
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Version => client.get(format!("{base}/api/v1/version")),
        Commands::Backends => client.get(format!("{base}/api/v1/backends")),
        Commands::Proxy(args) => {
            let query = match (args.rtmp, args.http) {
                (Some(port), _) => ("rtmp", port),
                (None, Some(port)) => ("http", port),
                (None, None) => return Err("either --rtmp or --http is required".into()),
            };
            client
                .get(format!("{base}/api/v1/proxy"))
                .query(&[(query.0, query.1.to_string())])
        }
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let body: Value = match res.json().await {
        Ok(body) => body,
        Err(e) => {
            eprintln!("Error: control API returned status {status} with an unreadable body: {e}");
            std::process::exit(1);
        }
    };

    if !status.is_success() || body["code"] != 0 {
        eprintln!("Error: control API returned status {status}");
        eprintln!("{}", serde_json::to_string_pretty(&body)?);
        std::process::exit(1);
    }

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
