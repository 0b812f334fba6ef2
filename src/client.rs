use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::tftp::engine;
use crate::tftp::io_bridge::{self, FileReader, FileWriter};
use crate::tftp::options::OptionTable;
use crate::tftp::packet::builder::RequestBuilder;
use crate::tftp::packet::Packet;
use crate::tftp::{consts, Mode, RequestKind, TransferError};

/// Options a client may ask the server to negotiate. A `None` field is
/// simply left out of the RRQ/WRQ, and the transfer falls back to the
/// RFC 1350 defaults for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
	pub blksize: Option<u16>,
	pub timeout_secs: Option<u8>,
	pub transfer_size: Option<u32>,
}

impl RequestOptions {
	fn as_pairs(&self) -> Vec<(&'static str, String)> {
		let mut out = Vec::with_capacity(3);
		if let Some(b) = self.blksize {
			out.push((consts::OPT_BLOCKSIZE_IDENT, b.to_string()));
		}
		if let Some(t) = self.timeout_secs {
			out.push((consts::OPT_TIMEOUT_IDENT, t.to_string()));
		}
		if let Some(s) = self.transfer_size {
			out.push((consts::OPT_TRANSFERSIZE_IDENT, s.to_string()));
		}
		out
	}
}

const REPLY_BUF_LEN: usize = consts::MAX_BLOCK_SIZE as usize + 4;

/// Component F: retrieves `remote_filename` from `server_addr` into
/// `local_path`. The client is the `Reader` of this session — data flows
/// server to client.
pub async fn get(server_addr: SocketAddr, remote_filename: &str, local_path: &Path, mode: Mode, opts: RequestOptions) -> Result<(), TransferError> {
	let socket = UdpSocket::bind("0.0.0.0:0").await?;
	let cancel = CancellationToken::new();

	let mut builder = RequestBuilder::new(RequestKind::Rrq, remote_filename).mode(mode);
	for (name, value) in opts.as_pairs() {
		builder = builder.option(name, value);
	}
	let request = builder.build()?;

	let file = io_bridge::open_for_write_new(local_path)?;
	let writer = FileWriter::new(file, mode);

	let fallback_timeout = Duration::from_secs(opts.timeout_secs.unwrap_or(consts::DEFAULT_TIMEOUT_SECS) as u64);
	let mut buf = vec![0u8; REPLY_BUF_LEN];
	let (n, peer) = engine::send_request_and_await_first_reply(&socket, server_addr, &request, &mut buf, fallback_timeout).await?;

	match Packet::decode(&buf[..n])? {
		Packet::OAck(oack) => {
			let accepted = OptionTable::parse_requested(&oack.options)?;
			let blksize = accepted.effective_blksize() as usize;
			let timeout = accepted.effective_timeout();
			socket.send_to(&crate::tftp::packet::encode_ack(0), peer).await?;
			engine::run_reader(&socket, peer, writer, blksize, timeout, None, &cancel).await
		}
		Packet::Data(d) => {
			// No OACK: the server ignored our options and this reply is
			// already DATA(1), framed at the RFC 1350 default block size.
			let seed = (d.block, d.payload.to_vec());
			engine::run_reader(&socket, peer, writer, consts::DEFAULT_BLOCK_SIZE as usize, fallback_timeout, Some(seed), &cancel).await
		}
		Packet::Error(e) => Err(TransferError::PeerError { code: e.code, message: e.message.to_string() }),
		_ => Err(TransferError::UnexpectedPacket),
	}
}

/// Component G: sends `source` to the server under `remote_filename`. The
/// client is the `Writer` of this session — data flows client to server.
/// `source` is generic so the CLI can stream straight from standard input,
/// per spec.md §6 (a write with no `-f` reads from stdin); tests can pass
/// an in-memory buffer instead.
pub async fn put<R: Read>(server_addr: SocketAddr, source: R, remote_filename: &str, mode: Mode, opts: RequestOptions) -> Result<(), TransferError> {
	let socket = UdpSocket::bind("0.0.0.0:0").await?;
	let cancel = CancellationToken::new();
	let reader = FileReader::new(source, mode);

	let mut builder = RequestBuilder::new(RequestKind::Wrq, remote_filename).mode(mode);
	for (name, value) in opts.as_pairs() {
		builder = builder.option(name, value);
	}
	let request = builder.build()?;

	let fallback_timeout = Duration::from_secs(opts.timeout_secs.unwrap_or(consts::DEFAULT_TIMEOUT_SECS) as u64);
	let mut buf = vec![0u8; REPLY_BUF_LEN];
	let (n, peer) = engine::send_request_and_await_first_reply(&socket, server_addr, &request, &mut buf, fallback_timeout).await?;

	match Packet::decode(&buf[..n])? {
		Packet::Ack(ack) if ack.block == 0 => {
			// No OACK: the server ignored our options, defaults apply.
			engine::run_writer(&socket, peer, reader, consts::DEFAULT_BLOCK_SIZE as usize, fallback_timeout, &cancel).await
		}
		Packet::OAck(oack) => {
			let accepted = OptionTable::parse_requested(&oack.options)?;
			let blksize = accepted.effective_blksize() as usize;
			let timeout = accepted.effective_timeout();
			engine::run_writer(&socket, peer, reader, blksize, timeout, &cancel).await
		}
		Packet::Error(e) => Err(TransferError::PeerError { code: e.code, message: e.message.to_string() }),
		_ => Err(TransferError::UnexpectedPacket),
	}
}
