//! The key/value store server binary.

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use kvstore::Server;

/// A non-blocking, single-threaded key/value store server.
#[derive(Parser, Debug)]
#[command(name = "kvd", version, about)]
struct Args {
    /// TCP port to listen on.
    #[arg(default_value_t = 7878)]
    port: u16,

    /// Address to bind to.
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Log level, e.g. "info", "kvstore=debug".
    #[arg(long, env = "KVD_LOG", default_value = "info")]
    log: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new().parse_filters(&args.log).init();

    let addr = SocketAddr::new(args.bind, args.port);
    let mut server = Server::bind(addr).with_context(|| format!("failed to bind {addr}"))?;
    log::info!("listening on {addr}");

    server.run().context("event loop exited with an error")
}
