use anyhow::Context;

pub const DEFAULT_CONFIG_PATH: &str = "./config/turret.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub config_path: String,
    pub server_url: Option<String>,
    pub signaling_url: Option<String>,
    pub tls_cert_path: Option<String>,
}

pub fn parse_args() -> anyhow::Result<Args> {
    parse_args_from(std::env::args().skip(1))
}

pub fn parse_args_from(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut config_path = None;
    let mut server_url = None;
    let mut signaling_url = None;
    let mut tls_cert_path = None;

    let args: Vec<String> = args.into_iter().collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-V" | "--version" => {
                println!("turret-console {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-h" | "--help" => {
                println!("turret-console - operator console for a pan/tilt turret");
                println!();
                println!("USAGE:");
                println!("    turret-console [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!(
                    "    -c, --config <PATH>          Config file [default: {DEFAULT_CONFIG_PATH}]"
                );
                println!("    --server-url <URL>           Control channel WebSocket URL");
                println!("    --signaling-url <URL>        Video offer/answer endpoint");
                println!(
                    "    --tls-cert <PATH>            TLS certificate to pin for server connections"
                );
                println!("    -V, --version                Print version and exit");
                println!("    -h, --help                   Print this help and exit");
                println!();
                println!("Operator commands are read from stdin; type 'help' once running.");
                std::process::exit(0);
            }
            "-c" | "--config" => {
                i += 1;
                config_path = Some(args.get(i).context("Missing --config value")?.clone());
            }
            "--server-url" => {
                i += 1;
                server_url = Some(args.get(i).context("Missing --server-url value")?.clone());
            }
            "--signaling-url" => {
                i += 1;
                signaling_url = Some(
                    args.get(i)
                        .context("Missing --signaling-url value")?
                        .clone(),
                );
            }
            "--tls-cert" => {
                i += 1;
                tls_cert_path = Some(args.get(i).context("Missing --tls-cert value")?.clone());
            }
            other => anyhow::bail!("Unknown argument: {other}"),
        }
        i += 1;
    }

    // Fall back to env var, then the default location
    let config_path = config_path
        .or_else(|| std::env::var("TURRET_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    Ok(Args {
        config_path,
        server_url,
        signaling_url,
        tls_cert_path,
    })
}
