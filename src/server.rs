use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::tftp::engine;
use crate::tftp::io_bridge::{self, FileReader, FileWriter};
use crate::tftp::options::OptionTable;
use crate::tftp::packet::builder::OAckBuilder;
use crate::tftp::packet::Packet;
use crate::tftp::{ErrorCode, Mode, RequestKind, Role, TransferError};

/// Large enough for any RRQ/WRQ this server will parse: a filename, a mode
/// string, and the three negotiable options, each well under the platform
/// path limit.
const REQUEST_BUF_LEN: usize = 1024;

/// Component E: binds the well-known port and dispatches each request to a
/// fresh ephemeral-port worker task, mirroring the one-socket-per-transfer
/// design the original server got from `fork()`-per-connection.
pub struct Server {
	socket: UdpSocket,
	root: PathBuf,
}

impl Server {
	pub async fn bind(addr: SocketAddr, root: PathBuf) -> io::Result<Self> {
		let socket = UdpSocket::bind(addr).await?;
		log::info!("tftpd listening on {addr}, serving {}", root.display());
		Ok(Self { socket, root })
	}

	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.socket.local_addr()
	}

	/// Runs the accept loop until `cancel` fires. `cancel` is also handed to
	/// every worker task, so a dispatcher shutdown closes in-flight transfers
	/// cleanly instead of abandoning them (spec.md §5 termination case (d)).
	pub async fn serve(self, cancel: CancellationToken) -> io::Result<()> {
		let mut buf = vec![0u8; REQUEST_BUF_LEN];
		loop {
			tokio::select! {
				_ = cancel.cancelled() => {
					log::info!("tftpd shutting down");
					return Ok(());
				}
				res = self.socket.recv_from(&mut buf) => {
					let (n, client) = res?;
					let request = buf[..n].to_vec();
					let root = self.root.clone();
					let worker_cancel = cancel.clone();
					tokio::spawn(async move {
						if let Err(e) = handle_request(request, client, root, worker_cancel).await {
							log::warn!("transfer with {client} ended: {e}");
						}
					});
				}
			}
		}
	}
}

async fn handle_request(request: Vec<u8>, client: SocketAddr, root: PathBuf, cancel: CancellationToken) -> Result<(), TransferError> {
	let worker = UdpSocket::bind("0.0.0.0:0").await?;
	log::debug!("worker on port {} handling {client}", worker.local_addr()?.port());

	let req = match Packet::decode(&request) {
		Ok(Packet::Request(r)) => r,
		Ok(_) => {
			engine::send_error(&worker, client, ErrorCode::IllegalOperation, "expected RRQ or WRQ").await;
			return Err(TransferError::UnexpectedPacket);
		}
		Err(e) => {
			engine::send_error(&worker, client, ErrorCode::IllegalOperation, &e.to_string()).await;
			return Err(e.into());
		}
	};

	let mode = match req.mode() {
		Ok(m) => m,
		Err(_) => {
			engine::send_error(&worker, client, ErrorCode::IllegalOperation, "unsupported mode").await;
			return Err(TransferError::UnsupportedMode);
		}
	};

	let requested = match OptionTable::parse_requested(&req.options) {
		Ok(t) => t,
		Err(e) => {
			engine::send_error(&worker, client, ErrorCode::InvalidOption, &e.to_string()).await;
			return Err(e.into());
		}
	};

	let Some(path) = confine_to_root(&root, req.filename) else {
		engine::send_error(&worker, client, ErrorCode::AccessViolation, "path escapes server root").await;
		return Err(TransferError::AccessViolation);
	};
	let kind = req.kind;
	log::info!(
		"{} {}:{} \"{}\" {mode}{}",
		kind.as_str(),
		client.ip(),
		client.port(),
		req.filename,
		engine::format_options_trace(&requested_pairs(&req.options))
	);

	match kind {
		RequestKind::Rrq => serve_rrq(&worker, client, &path, mode, requested, &cancel).await,
		RequestKind::Wrq => serve_wrq(&worker, client, &path, mode, requested, &cancel).await,
	}
}

/// Renders the raw requested option pairs for the RRQ/WRQ trace line; unlike
/// [`OptionTable::as_oack_pairs`] this must show exactly what the peer asked
/// for, including options this server doesn't recognize or rejects.
fn requested_pairs<'a>(pairs: &[(&'a str, &'a str)]) -> Vec<(&'a str, String)> {
	pairs.iter().map(|(name, value)| (*name, value.to_string())).collect()
}

/// Joins `filename` onto `root`, refusing anything that could step outside
/// it: absolute paths and any `..` component. Rejects before ever touching
/// the filesystem.
fn confine_to_root(root: &Path, filename: &str) -> Option<PathBuf> {
	use std::path::Component;

	let requested = Path::new(filename);
	if requested.is_absolute() {
		return None;
	}
	if requested.components().any(|c| matches!(c, Component::ParentDir | Component::Prefix(_))) {
		return None;
	}
	Some(root.join(requested))
}

async fn serve_rrq(worker: &UdpSocket, client: SocketAddr, path: &Path, mode: Mode, requested: OptionTable, cancel: &CancellationToken) -> Result<(), TransferError> {
	let file = match io_bridge::open_for_read(path) {
		Ok(f) => f,
		Err(e) => {
			engine::send_error(worker, client, map_open_error(&e), &e.to_string()).await;
			return Err(e.into());
		}
	};
	let file_size = file.metadata()?.len();
	let accepted = OptionTable::negotiate(&requested, Role::Writer, file_size);
	let blksize = accepted.effective_blksize() as usize;
	let timeout = accepted.effective_timeout();
	let reader = FileReader::new(file, mode);

	if accepted.is_empty() {
		// No options negotiated: the first reply to an RRQ is DATA(1) itself.
		engine::run_writer(worker, client, reader, blksize, timeout, cancel).await
	} else {
		let oack_pairs = accepted.as_oack_pairs();
		let oack = oack_pairs.iter().cloned().fold(OAckBuilder::new(), |b, (name, value)| b.option(name, value)).build()?;
		engine::send_oack_and_await_ack0(worker, client, &oack, &oack_pairs, timeout, cancel).await?;
		engine::run_writer(worker, client, reader, blksize, timeout, cancel).await
	}
}

async fn serve_wrq(worker: &UdpSocket, client: SocketAddr, path: &Path, mode: Mode, requested: OptionTable, cancel: &CancellationToken) -> Result<(), TransferError> {
	let file = match io_bridge::open_for_write_new(path) {
		Ok(f) => f,
		Err(e) => {
			engine::send_error(worker, client, map_open_error(&e), &e.to_string()).await;
			return Err(e.into());
		}
	};
	let accepted = OptionTable::negotiate(&requested, Role::Reader, requested.effective_tsize() as u64);
	let blksize = accepted.effective_blksize() as usize;
	let timeout = accepted.effective_timeout();
	let writer = FileWriter::new(file, mode);

	if accepted.is_empty() {
		worker.send_to(&crate::tftp::packet::encode_ack(0), client).await?;
	} else {
		// OACK stands in for ACK(0); the reader sends its first ACK as soon as
		// it sees DATA(1), so there is nothing more to wait for here.
		let oack_pairs = accepted.as_oack_pairs();
		let oack = oack_pairs.iter().cloned().fold(OAckBuilder::new(), |b, (name, value)| b.option(name, value)).build()?;
		worker.send_to(&oack, client).await?;
		let local = worker.local_addr()?;
		log::info!("OACK {}:{}{}", local.ip(), local.port(), engine::format_options_trace(&oack_pairs));
	}
	engine::run_reader(worker, client, writer, blksize, timeout, None, cancel).await
}

fn map_open_error(e: &io::Error) -> ErrorCode {
	match e.kind() {
		io::ErrorKind::NotFound => ErrorCode::FileNotFound,
		io::ErrorKind::PermissionDenied => ErrorCode::AccessViolation,
		io::ErrorKind::AlreadyExists => ErrorCode::FileExists,
		_ => ErrorCode::NotDefined,
	}
}
