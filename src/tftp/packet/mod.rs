use std::ffi::CStr;
use std::fmt::Display;

use crate::tftp::{consts, ErrorCode, Mode, RequestKind};

pub mod builder;

/// Maximum filename length accepted from the wire; anything beyond this
/// is reported as [`CodecError::FilenameTooLong`] rather than silently
/// truncated.
pub const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
	/// First two bytes didn't decode to a recognized opcode (1..=6).
	MalformedOpcode,
	/// A string field ran off the end of the buffer without a NUL terminator,
	/// or an option was missing its value half of the pair.
	MalformedFraming,
	/// A decoded filename exceeds [`MAX_FILENAME_LEN`].
	FilenameTooLong,
	/// A string field contained non-ASCII or otherwise invalid bytes.
	InvalidCharacters,
	/// The mode string didn't match `octet` or `netascii`.
	UnknownMode,
	/// Buffer shorter than the fixed header for this packet kind.
	UnexpectedEof,
	/// Attempted to encode a string field that would contain an interior NUL.
	InteriorNul,
}

impl Display for CodecError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let msg = match self {
			Self::MalformedOpcode => "unrecognized opcode",
			Self::MalformedFraming => "missing NUL terminator in framed string",
			Self::FilenameTooLong => "filename exceeds platform path limit",
			Self::InvalidCharacters => "non-ASCII or invalid characters in string field",
			Self::UnknownMode => "unsupported transfer mode",
			Self::UnexpectedEof => "buffer too short for packet kind",
			Self::InteriorNul => "string field would contain an interior NUL byte",
		};
		write!(f, "{msg}")
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
	Request,
	Data,
	Ack,
	Error,
	OAck,
}

/// A parsed RRQ or WRQ. Filename, mode and option strings all borrow from
/// the decode buffer; `options` is an owned `Vec` of borrowed pairs, since
/// the pair count is small and bounded by the three known option kinds.
#[derive(Debug)]
pub struct Request<'a> {
	pub kind: RequestKind,
	pub filename: &'a str,
	pub mode_str: &'a str,
	pub options: Vec<(&'a str, &'a str)>,
}

impl<'a> Request<'a> {
	pub fn mode(&self) -> Result<Mode, CodecError> {
		Mode::parse(self.mode_str).ok_or(CodecError::UnknownMode)
	}
}

#[derive(Debug)]
pub struct Data<'a> {
	pub block: u16,
	pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub struct Ack {
	pub block: u16,
}

#[derive(Debug)]
pub struct ErrorPacket<'a> {
	pub code: u16,
	pub message: &'a str,
}

#[derive(Debug)]
pub struct OAck<'a> {
	pub options: Vec<(&'a str, &'a str)>,
}

#[derive(Debug)]
pub enum Packet<'a> {
	Request(Request<'a>),
	Data(Data<'a>),
	Ack(Ack),
	Error(ErrorPacket<'a>),
	OAck(OAck<'a>),
}

impl<'a> Packet<'a> {
	pub fn kind(&self) -> PacketKind {
		match self {
			Self::Request(_) => PacketKind::Request,
			Self::Data(_) => PacketKind::Data,
			Self::Ack(_) => PacketKind::Ack,
			Self::Error(_) => PacketKind::Error,
			Self::OAck(_) => PacketKind::OAck,
		}
	}

	/// Parse one packet from `buf`. Never interprets semantics beyond
	/// framing; e.g. it does not validate that `mode` is a known mode
	/// string nor that option values are in range — that's the option
	/// table's and the engine's job.
	pub fn decode(buf: &'a [u8]) -> Result<Self, CodecError> {
		if buf.len() < 2 {
			return Err(CodecError::UnexpectedEof);
		}
		let opcode = u16::from_be_bytes([buf[0], buf[1]]);
		match opcode {
			consts::OPCODE_RRQ => Ok(Self::Request(decode_request(buf, RequestKind::Rrq)?)),
			consts::OPCODE_WRQ => Ok(Self::Request(decode_request(buf, RequestKind::Wrq)?)),
			consts::OPCODE_DATA => Ok(Self::Data(decode_data(buf)?)),
			consts::OPCODE_ACK => Ok(Self::Ack(decode_ack(buf)?)),
			consts::OPCODE_ERROR => Ok(Self::Error(decode_error(buf)?)),
			consts::OPCODE_OACK => Ok(Self::OAck(decode_oack(buf)?)),
			_ => Err(CodecError::MalformedOpcode),
		}
	}
}

fn read_cstr(buf: &[u8]) -> Result<(&str, &[u8]), CodecError> {
	let cstr = CStr::from_bytes_until_nul(buf).map_err(|_| CodecError::MalformedFraming)?;
	let s = cstr.to_str().map_err(|_| CodecError::InvalidCharacters)?;
	let rest = &buf[cstr.to_bytes_with_nul().len()..];
	Ok((s, rest))
}

/// Reads alternating (name, value) NUL-terminated pairs until `buf` is
/// exhausted. A trailing half-pair is a framing error.
fn read_option_pairs(mut buf: &[u8]) -> Result<Vec<(&str, &str)>, CodecError> {
	let mut pairs = Vec::with_capacity(3);
	while !buf.is_empty() {
		let (name, rest) = read_cstr(buf)?;
		let (value, rest) = read_cstr(rest)?;
		pairs.push((name, value));
		buf = rest;
	}
	Ok(pairs)
}

fn decode_request(buf: &[u8], kind: RequestKind) -> Result<Request<'_>, CodecError> {
	let (filename, rest) = read_cstr(&buf[2..])?;
	if filename.len() > MAX_FILENAME_LEN {
		return Err(CodecError::FilenameTooLong);
	}
	let (mode_str, rest) = read_cstr(rest)?;
	let options = read_option_pairs(rest)?;
	Ok(Request { kind, filename, mode_str, options })
}

fn decode_data(buf: &[u8]) -> Result<Data<'_>, CodecError> {
	if buf.len() < 4 {
		return Err(CodecError::UnexpectedEof);
	}
	let block = u16::from_be_bytes([buf[2], buf[3]]);
	Ok(Data { block, payload: &buf[4..] })
}

fn decode_ack(buf: &[u8]) -> Result<Ack, CodecError> {
	if buf.len() < 4 {
		return Err(CodecError::UnexpectedEof);
	}
	Ok(Ack { block: u16::from_be_bytes([buf[2], buf[3]]) })
}

fn decode_error(buf: &[u8]) -> Result<ErrorPacket<'_>, CodecError> {
	if buf.len() < 4 {
		return Err(CodecError::UnexpectedEof);
	}
	let raw_code = u16::from_be_bytes([buf[2], buf[3]]);
	// Accept any 16-bit code, but out-of-range ones are reported as Undefined
	// rather than passed through (spec.md §4.1).
	let code = ErrorCode::from_wire(raw_code) as u16;
	let (message, _) = read_cstr(&buf[4..])?;
	Ok(ErrorPacket { code, message })
}

fn decode_oack(buf: &[u8]) -> Result<OAck<'_>, CodecError> {
	let options = read_option_pairs(&buf[2..])?;
	Ok(OAck { options })
}

/// Writes `s` followed by one NUL byte, rejecting interior NULs.
fn write_cstr(out: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
	if s.as_bytes().contains(&0) {
		return Err(CodecError::InteriorNul);
	}
	out.extend_from_slice(s.as_bytes());
	out.push(0);
	Ok(())
}

pub fn encode_request(kind: RequestKind, filename: &str, mode: Mode, options: &[(&str, String)]) -> Result<Vec<u8>, CodecError> {
	let mut out = Vec::with_capacity(16 + filename.len());
	out.extend_from_slice(&(kind as u16).to_be_bytes());
	write_cstr(&mut out, filename)?;
	write_cstr(&mut out, mode.as_str())?;
	for (name, value) in options {
		write_cstr(&mut out, name)?;
		write_cstr(&mut out, value)?;
	}
	Ok(out)
}

/// Writes a DATA packet into `buf`, which must be at least `4 + payload.len()`
/// bytes. Returns the number of bytes written. Callers in the hot loop reuse
/// one stack buffer across blocks instead of allocating per block.
pub fn encode_data_into(buf: &mut [u8], block: u16, payload: &[u8]) -> usize {
	buf[0..2].copy_from_slice(&consts::OPCODE_DATA.to_be_bytes());
	buf[2..4].copy_from_slice(&block.to_be_bytes());
	buf[4..4 + payload.len()].copy_from_slice(payload);
	4 + payload.len()
}

pub fn encode_ack(block: u16) -> [u8; 4] {
	let mut buf = [0u8; 4];
	buf[0..2].copy_from_slice(&consts::OPCODE_ACK.to_be_bytes());
	buf[2..4].copy_from_slice(&block.to_be_bytes());
	buf
}

pub fn encode_oack(options: &[(&str, String)]) -> Result<Vec<u8>, CodecError> {
	let mut out = Vec::with_capacity(8 + options.len() * 12);
	out.extend_from_slice(&consts::OPCODE_OACK.to_be_bytes());
	for (name, value) in options {
		write_cstr(&mut out, name)?;
		write_cstr(&mut out, value)?;
	}
	Ok(out)
}

pub fn encode_error(code: u16, message: &str) -> Result<Vec<u8>, CodecError> {
	let mut out = Vec::with_capacity(8 + message.len());
	out.extend_from_slice(&consts::OPCODE_ERROR.to_be_bytes());
	out.extend_from_slice(&code.to_be_bytes());
	write_cstr(&mut out, message)?;
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_round_trip_with_options() {
		let opts: Vec<(&str, String)> = vec![("blksize", "1024".to_string()), ("tsize", "0".to_string())];
		let buf = encode_request(RequestKind::Rrq, "hello.txt", Mode::Octet, &opts).unwrap();
		let Packet::Request(req) = Packet::decode(&buf).unwrap() else { panic!("wrong kind") };
		assert_eq!(req.kind, RequestKind::Rrq);
		assert_eq!(req.filename, "hello.txt");
		assert_eq!(req.mode().unwrap(), Mode::Octet);
		assert_eq!(req.options, vec![("blksize", "1024"), ("tsize", "0")]);
	}

	#[test]
	fn data_round_trip_blocks_0_1_65535() {
		for block in [0u16, 1, 65535] {
			let mut buf = [0u8; 4 + 3];
			let len = encode_data_into(&mut buf, block, b"abc");
			let Packet::Data(d) = Packet::decode(&buf[..len]).unwrap() else { panic!("wrong kind") };
			assert_eq!(d.block, block);
			assert_eq!(d.payload, b"abc");
		}
	}

	#[test]
	fn data_accepts_zero_length_payload() {
		let mut buf = [0u8; 4];
		let len = encode_data_into(&mut buf, 7, &[]);
		let Packet::Data(d) = Packet::decode(&buf[..len]).unwrap() else { panic!("wrong kind") };
		assert_eq!(d.payload.len(), 0);
	}

	#[test]
	fn ack_round_trip() {
		let buf = encode_ack(65535);
		let Packet::Ack(a) = Packet::decode(&buf).unwrap() else { panic!("wrong kind") };
		assert_eq!(a.block, 65535);
	}

	#[test]
	fn oack_preserves_option_order() {
		let opts: Vec<(&str, String)> = vec![("timeout", "3".to_string()), ("blksize", "1400".to_string())];
		let buf = encode_oack(&opts).unwrap();
		let Packet::OAck(oack) = Packet::decode(&buf).unwrap() else { panic!("wrong kind") };
		assert_eq!(oack.options, vec![("timeout", "3"), ("blksize", "1400")]);
	}

	#[test]
	fn error_round_trip() {
		let buf = encode_error(6, "File already exists").unwrap();
		let Packet::Error(e) = Packet::decode(&buf).unwrap() else { panic!("wrong kind") };
		assert_eq!(e.code, 6);
		assert_eq!(e.message, "File already exists");
	}

	#[test]
	fn out_of_range_error_code_is_reported_as_undefined() {
		let buf = encode_error(200, "huh").unwrap();
		let Packet::Error(e) = Packet::decode(&buf).unwrap() else { panic!("wrong kind") };
		assert_eq!(e.code, 0);
	}

	#[test]
	fn unknown_opcode_is_malformed() {
		let buf = [0u8, 42];
		assert_eq!(Packet::decode(&buf).unwrap_err(), CodecError::MalformedOpcode);
	}

	#[test]
	fn missing_mode_terminator_is_malformed_framing() {
		let mut buf = vec![0, 1];
		buf.extend_from_slice(b"file.txt\0octet"); // no trailing NUL
		assert_eq!(Packet::decode(&buf).unwrap_err(), CodecError::MalformedFraming);
	}

	#[test]
	fn interior_nul_in_filename_is_rejected() {
		let err = encode_request(RequestKind::Rrq, "a\0b", Mode::Octet, &[]).unwrap_err();
		assert_eq!(err, CodecError::InteriorNul);
	}

	#[test]
	fn filename_longer_than_limit_is_rejected() {
		let long_name = "a".repeat(MAX_FILENAME_LEN + 1);
		let mut buf = vec![0, 1];
		buf.extend_from_slice(long_name.as_bytes());
		buf.push(0);
		buf.extend_from_slice(b"octet\0");
		assert_eq!(Packet::decode(&buf).unwrap_err(), CodecError::FilenameTooLong);
	}
}
