use std::net::SocketAddr;

use clap::Parser;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use tftp::cli::ServerCli;
use tftp::server::Server;

#[tokio::main]
async fn main() {
	let cli = ServerCli::parse();
	tftp::cli::init_logger(cli.debug);

	match cli.root.try_exists() {
		Ok(true) => {}
		Ok(false) => {
			error!("root path {} does not exist", cli.root.display());
			std::process::exit(1);
		}
		Err(e) => {
			error!("cannot access root path {}: {e}", cli.root.display());
			std::process::exit(1);
		}
	}

	let cancel = CancellationToken::new();
	let sigint_token = cancel.clone();
	ctrlc::set_handler(move || {
		info!("received SIGINT, shutting down");
		sigint_token.cancel();
	})
	.expect("failed to install SIGINT handler");

	let listen_addr = SocketAddr::from((cli.bind, cli.port));
	let server = match Server::bind(listen_addr, cli.root).await {
		Ok(s) => s,
		Err(e) => {
			error!("failed to bind {listen_addr}: {e}");
			std::process::exit(1);
		}
	};

	if let Err(e) = server.serve(cancel).await {
		error!("server error: {e}");
		std::process::exit(1);
	}
}
