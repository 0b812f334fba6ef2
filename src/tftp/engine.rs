use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout as with_timeout;
use tokio_util::sync::CancellationToken;

use crate::tftp::consts::MAX_RETRIES;
use crate::tftp::io_bridge::{FileReader, FileWriter};
use crate::tftp::packet::{self, Packet};
use crate::tftp::{ErrorCode, TransferError};

/// Largest ERROR message plus header this engine will ever receive into a
/// scratch buffer while waiting for an ACK (ACKs are always 4 bytes; this
/// just needs to be big enough that a peer's ERROR packet doesn't get
/// truncated).
const CONTROL_BUF_LEN: usize = 516;

/// Sends a terminal ERROR packet. Used both to close out a session and to
/// fend off a datagram from an address other than the remembered peer.
pub async fn send_error(socket: &UdpSocket, addr: SocketAddr, code: ErrorCode, message: &str) {
	match packet::encode_error(code as u16, message) {
		Ok(buf) => {
			if let Err(e) = socket.send_to(&buf, addr).await {
				log::warn!("failed to send ERROR to {addr}: {e}");
			}
			match socket.local_addr() {
				Ok(local) => log::info!("ERROR {}:{}:{} {} \"{}\"", local.ip(), local.port(), addr.port(), code as u16, message),
				Err(_) => log::info!("ERROR ?:?:{} {} \"{}\"", addr.port(), code as u16, message),
			}
		}
		Err(e) => log::warn!("failed to encode ERROR packet: {e}"),
	}
}

/// Receives one datagram, enforcing TID discipline (spec.md §4.4): any
/// packet whose source doesn't match `peer` gets ERROR 5 and is otherwise
/// ignored; the session's state is untouched and the wait continues within
/// the caller's timeout budget.
async fn recv_from_peer(socket: &UdpSocket, peer: SocketAddr, buf: &mut [u8]) -> io::Result<usize> {
	loop {
		let (n, from) = socket.recv_from(buf).await?;
		if from == peer {
			return Ok(n);
		}
		log::warn!("datagram from unexpected TID {from}, expected {peer}");
		send_error(socket, from, ErrorCode::UnknownTid, "unknown transfer ID").await;
	}
}

pub(crate) fn format_options_trace(pairs: &[(&str, String)]) -> String {
	pairs.iter().map(|(name, value)| format!(" {name}: {value}")).collect()
}

/// Reports this session's terminal error to the peer with exactly one ERROR
/// packet (spec.md §7), unless the session is ending for a reason that must
/// not itself generate one: an ERROR already received from the peer, or a
/// clean shutdown requested by the dispatcher.
async fn notify_peer_on_error<T>(socket: &UdpSocket, peer: SocketAddr, result: &Result<T, TransferError>) {
	if let Err(err) = result {
		if matches!(err, TransferError::PeerError { .. } | TransferError::Cancelled) {
			return;
		}
		send_error(socket, peer, err.wire_code(), &err.to_string()).await;
	}
}

/// Sends the initial RRQ/WRQ and waits for the first reply, establishing the
/// peer's TID in the process (spec.md §4.4: the TID isn't known until the
/// first reply arrives, so only the IP is checked here — the port is
/// whatever the responder happens to reply from). Retransmits the request
/// on timeout up to the standard retry cap.
pub async fn send_request_and_await_first_reply(
	socket: &UdpSocket,
	server_addr: SocketAddr,
	request_bytes: &[u8],
	buf: &mut [u8],
	timeout: Duration,
) -> Result<(usize, SocketAddr), TransferError> {
	let result = send_request_and_await_first_reply_inner(socket, server_addr, request_bytes, buf, timeout).await;
	notify_peer_on_error(socket, server_addr, &result).await;
	result
}

async fn send_request_and_await_first_reply_inner(
	socket: &UdpSocket,
	server_addr: SocketAddr,
	request_bytes: &[u8],
	buf: &mut [u8],
	timeout: Duration,
) -> Result<(usize, SocketAddr), TransferError> {
	let mut retries = 0u8;
	loop {
		socket.send_to(request_bytes, server_addr).await?;
		let attempt = with_timeout(timeout, async {
			loop {
				let (n, from) = socket.recv_from(buf).await?;
				if from.ip() == server_addr.ip() {
					return Ok::<_, io::Error>((n, from));
				}
				log::warn!("ignoring reply from unrelated host {from} while awaiting {server_addr}");
			}
		})
		.await;
		match attempt {
			Ok(Ok(result)) => return Ok(result),
			Ok(Err(io_err)) => return Err(io_err.into()),
			Err(_elapsed) => {
				retries += 1;
				if retries >= MAX_RETRIES {
					return Err(TransferError::RetriesExhausted(MAX_RETRIES));
				}
			}
		}
	}
}

/// Sends an OACK and waits for the peer's ACK(0), retransmitting the OACK on
/// timeout. Used by a responder that negotiated options for an RRQ: the OACK
/// must be acknowledged before the first DATA goes out, per the worked
/// example in spec.md §8.
pub async fn send_oack_and_await_ack0(
	socket: &UdpSocket,
	peer: SocketAddr,
	oack_bytes: &[u8],
	oack_pairs: &[(&str, String)],
	timeout: Duration,
	cancel: &CancellationToken,
) -> Result<(), TransferError> {
	let result = send_oack_and_await_ack0_inner(socket, peer, oack_bytes, oack_pairs, timeout, cancel).await;
	notify_peer_on_error(socket, peer, &result).await;
	result
}

async fn send_oack_and_await_ack0_inner(
	socket: &UdpSocket,
	peer: SocketAddr,
	oack_bytes: &[u8],
	oack_pairs: &[(&str, String)],
	timeout: Duration,
	cancel: &CancellationToken,
) -> Result<(), TransferError> {
	let mut control_buf = vec![0u8; CONTROL_BUF_LEN];
	let mut retries = 0u8;
	loop {
		if cancel.is_cancelled() {
			return Err(TransferError::Cancelled);
		}
		socket.send_to(oack_bytes, peer).await?;
		let local = socket.local_addr()?;
		log::info!("OACK {}:{}{}", local.ip(), local.port(), format_options_trace(oack_pairs));

		let recv = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(TransferError::Cancelled),
			res = with_timeout(timeout, recv_from_peer(socket, peer, &mut control_buf)) => res,
		};
		match recv {
			Ok(Ok(n)) => match Packet::decode(&control_buf[..n])? {
				Packet::Ack(ack) if ack.block == 0 => return Ok(()),
				Packet::Error(e) => return Err(TransferError::PeerError { code: e.code, message: e.message.to_string() }),
				_ => return Err(TransferError::UnexpectedPacket),
			},
			Ok(Err(io_err)) => return Err(io_err.into()),
			Err(_elapsed) => {
				retries += 1;
				if retries >= MAX_RETRIES {
					return Err(TransferError::RetriesExhausted(MAX_RETRIES));
				}
			}
		}
	}
}

/// Drives the stop-and-wait loop for the side sending DATA packets (a
/// client GET or a server's reply to an RRQ), starting at block 1. The
/// handshake (request + option negotiation) has already completed by the
/// time this is called. `cancel` lets a dispatcher shutdown close this
/// session cleanly between packets (spec.md §5 termination case (d)); a
/// client caller with nothing to cancel on can pass a fresh, never-fired
/// token.
pub async fn run_writer<R: std::io::Read>(
	socket: &UdpSocket,
	peer: SocketAddr,
	reader: FileReader<R>,
	blksize: usize,
	timeout: Duration,
	cancel: &CancellationToken,
) -> Result<(), TransferError> {
	let result = run_writer_inner(socket, peer, reader, blksize, timeout, cancel).await;
	notify_peer_on_error(socket, peer, &result).await;
	result
}

async fn run_writer_inner<R: std::io::Read>(
	socket: &UdpSocket,
	peer: SocketAddr,
	mut reader: FileReader<R>,
	blksize: usize,
	timeout: Duration,
	cancel: &CancellationToken,
) -> Result<(), TransferError> {
	let mut block: u16 = 1;
	let mut control_buf = vec![0u8; CONTROL_BUF_LEN];

	loop {
		if cancel.is_cancelled() {
			return Err(TransferError::Cancelled);
		}
		let payload = reader.read_block(blksize)?;
		let terminal = payload.len() < blksize;
		let mut out = vec![0u8; 4 + payload.len()];
		packet::encode_data_into(&mut out, block, &payload);

		let mut retries = 0u8;
		loop {
			socket.send_to(&out, peer).await?;
			let local = socket.local_addr()?;
			log::debug!("DATA {}:{}:{} {}", local.ip(), local.port(), peer.port(), block);

			let recv = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(TransferError::Cancelled),
				res = with_timeout(timeout, recv_from_peer(socket, peer, &mut control_buf)) => res,
			};
			match recv {
				Ok(Ok(n)) => match Packet::decode(&control_buf[..n])? {
					Packet::Ack(ack) if ack.block == block => break,
					Packet::Ack(ack) if ack.block == block.wrapping_sub(1) => continue,
					Packet::Error(e) => {
						return Err(TransferError::PeerError { code: e.code, message: e.message.to_string() })
					}
					_ => return Err(TransferError::UnexpectedPacket),
				},
				Ok(Err(io_err)) => return Err(io_err.into()),
				Err(_elapsed) => {
					retries += 1;
					if retries >= MAX_RETRIES {
						return Err(TransferError::RetriesExhausted(MAX_RETRIES));
					}
					continue;
				}
			}
		}

		if terminal {
			return Ok(());
		}
		block = block.wrapping_add(1);
	}
}

/// Drives the stop-and-wait loop for the side receiving DATA packets (a
/// client PUT or a server handling a WRQ). `seed` carries a DATA packet
/// already consumed during the handshake — the no-options RRQ case, where
/// the server's very first reply to an RRQ *is* DATA 1 rather than a
/// separate OACK/ACK0 exchange.
pub async fn run_reader(
	socket: &UdpSocket,
	peer: SocketAddr,
	writer: FileWriter,
	blksize: usize,
	timeout: Duration,
	seed: Option<(u16, Vec<u8>)>,
	cancel: &CancellationToken,
) -> Result<(), TransferError> {
	let result = run_reader_inner(socket, peer, writer, blksize, timeout, seed, cancel).await;
	notify_peer_on_error(socket, peer, &result).await;
	result
}

async fn run_reader_inner(
	socket: &UdpSocket,
	peer: SocketAddr,
	mut writer: FileWriter,
	blksize: usize,
	timeout: Duration,
	seed: Option<(u16, Vec<u8>)>,
	cancel: &CancellationToken,
) -> Result<(), TransferError> {
	let mut expected: u16 = 1;
	let mut control_buf = vec![0u8; blksize + 4];

	if let Some((block, payload)) = seed {
		if block != expected {
			return Err(TransferError::BlockMismatch { expected, got: block });
		}
		let terminal = payload.len() < blksize;
		writer.append(&payload)?;
		socket.send_to(&packet::encode_ack(block), peer).await?;
		if terminal {
			writer.finish()?;
			return Ok(());
		}
		expected = expected.wrapping_add(1);
	}

	loop {
		if cancel.is_cancelled() {
			return Err(TransferError::Cancelled);
		}
		let mut retries = 0u8;
		let (block, payload) = loop {
			let recv = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(TransferError::Cancelled),
				res = with_timeout(timeout, recv_from_peer(socket, peer, &mut control_buf)) => res,
			};
			match recv {
				Ok(Ok(n)) => match Packet::decode(&control_buf[..n])? {
					Packet::Data(d) => break (d.block, d.payload.to_vec()),
					Packet::Error(e) => {
						return Err(TransferError::PeerError { code: e.code, message: e.message.to_string() })
					}
					_ => return Err(TransferError::UnexpectedPacket),
				},
				Ok(Err(io_err)) => return Err(io_err.into()),
				Err(_elapsed) => {
					retries += 1;
					if retries >= MAX_RETRIES {
						return Err(TransferError::RetriesExhausted(MAX_RETRIES));
					}
					// Resend the last ACK to prompt the peer to retransmit.
					let last_acked = expected.wrapping_sub(1);
					socket.send_to(&packet::encode_ack(last_acked), peer).await?;
					continue;
				}
			}
		};

		if block == expected {
			let terminal = payload.len() < blksize;
			writer.append(&payload)?;
			socket.send_to(&packet::encode_ack(block), peer).await?;
			let local = socket.local_addr()?;
			log::debug!("ACK {}:{} {}", local.ip(), local.port(), block);
			if terminal {
				writer.finish()?;
				return Ok(());
			}
			expected = expected.wrapping_add(1);
		} else if block == expected.wrapping_sub(1) {
			// Duplicate DATA: re-acknowledge without re-appending.
			socket.send_to(&packet::encode_ack(block), peer).await?;
		} else {
			return Err(TransferError::BlockMismatch { expected, got: block });
		}
	}
}
