use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use log::error;

use tftp::cli::ClientCli;
use tftp::client::{self, RequestOptions};
use tftp::tftp::Mode;

#[tokio::main]
async fn main() {
	let cli = ClientCli::parse();
	tftp::cli::init_logger(cli.debug);

	let opts = RequestOptions {
		blksize: cli.opts.blocksize,
		timeout_secs: cli.opts.timeout_secs,
		transfer_size: cli.opts.transfer_size.then_some(0),
	};
	let mode: Mode = cli.opts.mode.into();
	let addr = SocketAddr::from((cli.host, cli.port));

	let result = match cli.remote_source {
		Some(remote_file) => {
			let local_path = PathBuf::from(&cli.target);
			client::get(addr, &remote_file, &local_path, mode, opts).await
		}
		None => client::put(addr, std::io::stdin(), &cli.target, mode, opts).await,
	};

	if let Err(e) = result {
		error!("transfer failed: {e}");
		std::process::exit(1);
	}
}
