//! Example: watch one operation hash and print its confirmations.
//!
//! Prints one-line JSON per processed block once the operation is included, and exits when
//! the confirmation depth is reached (or on Ctrl-C).
//!
//! Usage:
//!
//!   cargo run -p observer --example watch_operation -- --rpc-url <NODE_URL> --op <OP_HASH>
//!
//! Options:
//!   --depth <K>        Blocks (including the one with the operation) before exiting. Default: 2.
//!   --poll             Do not try the node's header stream.
//!   --project <path>   Project configuration JSON; with --env, resolves the node URL instead
//!                      of --rpc-url.
//!   --env <path>       Local environment configuration JSON.

use anyhow::Context;
use observer::{
    ConfirmationDepth, Observer, ObserverConfig, ProjectConfig, RpcClient, RpcConfig,
};
use std::sync::Arc;

/// Empty when no path was given, so the config layer reports what is missing.
fn read_optional(path: &str) -> anyhow::Result<String> {
    if path.is_empty() {
        return Ok(String::new());
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {path}"))
}

fn parse_depth(arg: Option<&String>) -> anyhow::Result<u64> {
    let s = arg.context("--depth needs a value")?;
    s.parse().with_context(|| format!("invalid --depth {s:?}"))
}

fn usage() -> &'static str {
    "Usage: watch_operation (--rpc-url <NODE_URL> | --project <path> --env <path>) --op <OP_HASH> [--depth K] [--poll]"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut rpc_url = String::new();
    let mut op = String::new();
    let mut project_path = String::new();
    let mut env_path = String::new();
    let mut depth: u64 = 2;
    let mut streaming = true;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rpc-url" => {
                i += 1;
                rpc_url = args.get(i).cloned().unwrap_or_default();
            }
            "--op" => {
                i += 1;
                op = args.get(i).cloned().unwrap_or_default();
            }
            "--project" => {
                i += 1;
                project_path = args.get(i).cloned().unwrap_or_default();
            }
            "--env" => {
                i += 1;
                env_path = args.get(i).cloned().unwrap_or_default();
            }
            "--depth" => {
                i += 1;
                depth = parse_depth(args.get(i))?;
            }
            "--poll" => streaming = false,
            "--help" | "-h" => {
                eprintln!("{}", usage());
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    let rpc = if !project_path.is_empty() || !env_path.is_empty() {
        let project = read_optional(&project_path)?;
        let env = read_optional(&env_path)?;
        let config = ProjectConfig::parse(&project, &env)?;
        let (name, address) = config.default_account()?;
        tracing::info!(account = name, %address, "default account");
        config.rpc_config(None)?
    } else {
        RpcConfig::new(rpc_url)
    };
    if rpc.url.is_empty() || op.is_empty() {
        eprintln!("{}", usage());
        std::process::exit(1);
    }

    let client = match RpcClient::new(&rpc)?.load_chain_params().await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(reason = %e, "cannot load chain constants, using defaults");
            RpcClient::new(&rpc)?
        }
    };

    let observer = Observer::with_config(ObserverConfig {
        streaming,
        ..Default::default()
    });
    let (_, mut events) = observer.subscribe_with_depth(op.as_str().into(), ConfirmationDepth(depth))?;
    observer.listen(Arc::new(client))?;

    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(ev) => {
                    println!("{}", serde_json::to_string(&ev)?);
                    if ev.finalized {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    observer.shutdown().await;
    Ok(())
}
