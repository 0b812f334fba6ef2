use std::fmt::Display;

pub mod consts {
	pub const TFTP_LISTEN_PORT: u16 = 69;
	pub const DEFAULT_BLOCK_SIZE: u16 = 512;
	pub const DEFAULT_TIMEOUT_SECS: u8 = 5;
	pub const MAX_RETRIES: u8 = 5;

	pub const MIN_BLOCK_SIZE: u16 = 8;
	pub const MAX_BLOCK_SIZE: u16 = 65464;
	pub const MIN_TIMEOUT_SECS: u8 = 1;
	pub const MAX_TIMEOUT_SECS: u8 = 255;

	pub const OPT_BLOCKSIZE_IDENT: &str = "blksize";
	pub const OPT_TIMEOUT_IDENT: &str = "timeout";
	pub const OPT_TRANSFERSIZE_IDENT: &str = "tsize";

	pub const OPCODE_RRQ: u16 = 1;
	pub const OPCODE_WRQ: u16 = 2;
	pub const OPCODE_DATA: u16 = 3;
	pub const OPCODE_ACK: u16 = 4;
	pub const OPCODE_ERROR: u16 = 5;
	pub const OPCODE_OACK: u16 = 6;
}

pub mod packet;
pub mod options;
pub mod io_bridge;
pub mod engine;

/// A TFTP request kind, carried by the first opcode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RequestKind {
	Rrq = consts::OPCODE_RRQ,
	Wrq = consts::OPCODE_WRQ,
}

impl RequestKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Rrq => "RRQ",
			Self::Wrq => "WRQ",
		}
	}
}

impl Display for RequestKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Which side of a session sends the DATA packets.
///
/// A client GET and a server's reply to an RRQ are both `Writer`s of data;
/// a client PUT and a server receiving a WRQ are both `Reader`s of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Writer,
	Reader,
}

/// Wire error codes, per RFC 1350 §5 and the extension RFCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
	NotDefined = 0,
	FileNotFound = 1,
	AccessViolation = 2,
	DiskFull = 3,
	IllegalOperation = 4,
	UnknownTid = 5,
	FileExists = 6,
	NoSuchUser = 7,
	InvalidOption = 8,
}

impl ErrorCode {
	/// Any code outside the documented 0..=8 range is reported as this one.
	pub fn from_wire(code: u16) -> Self {
		match code {
			0 => Self::NotDefined,
			1 => Self::FileNotFound,
			2 => Self::AccessViolation,
			3 => Self::DiskFull,
			4 => Self::IllegalOperation,
			5 => Self::UnknownTid,
			6 => Self::FileExists,
			7 => Self::NoSuchUser,
			8 => Self::InvalidOption,
			_ => Self::NotDefined,
		}
	}
}

impl Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let msg = match self {
			Self::NotDefined => "Undefined error",
			Self::FileNotFound => "File not found",
			Self::AccessViolation => "Access violation",
			Self::DiskFull => "Disk full or allocation exceeded",
			Self::IllegalOperation => "Illegal TFTP operation",
			Self::UnknownTid => "Unknown transfer ID",
			Self::FileExists => "File already exists",
			Self::NoSuchUser => "No such user",
			Self::InvalidOption => "Option negotiation failed",
		};
		write!(f, "{msg}")
	}
}

/// Transfer mode requested in RRQ/WRQ. Case-insensitive on the wire,
/// canonical lowercase when emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	NetAscii,
	Octet,
}

impl Mode {
	pub fn parse(input: &str) -> Option<Self> {
		match input.to_ascii_lowercase().as_str() {
			"netascii" => Some(Self::NetAscii),
			"octet" => Some(Self::Octet),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Octet => "octet",
			Self::NetAscii => "netascii",
		}
	}
}

impl Display for Mode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Errors that terminate a session; each variant knows the wire `ErrorCode`
/// it should be reported as (see [`TransferError::wire_code`]).
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("malformed packet: {0}")]
	Codec(#[from] packet::CodecError),

	#[error("option negotiation failed: {0}")]
	Option(#[from] options::OptionError),

	#[error("peer sent error {code}: {message}")]
	PeerError { code: u16, message: String },

	#[error("unexpected packet kind in current state")]
	UnexpectedPacket,

	#[error("block number mismatch, expected {expected}, got {got}")]
	BlockMismatch { expected: u16, got: u16 },

	#[error("no response after {0} retransmissions")]
	RetriesExhausted(u8),

	#[error("file not found")]
	FileNotFound,

	#[error("access violation")]
	AccessViolation,

	#[error("target file already exists")]
	FileExists,

	#[error("unsupported transfer mode")]
	UnsupportedMode,

	#[error("session cancelled by dispatcher shutdown")]
	Cancelled,
}

impl TransferError {
	/// Map this error onto the wire code a terminal ERROR packet should carry.
	pub fn wire_code(&self) -> ErrorCode {
		match self {
			Self::FileNotFound => ErrorCode::FileNotFound,
			Self::AccessViolation => ErrorCode::AccessViolation,
			Self::FileExists => ErrorCode::FileExists,
			Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
			Self::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => ErrorCode::AccessViolation,
			Self::Io(_) => ErrorCode::DiskFull,
			Self::Option(_) => ErrorCode::InvalidOption,
			Self::UnsupportedMode => ErrorCode::IllegalOperation,
			Self::UnexpectedPacket | Self::Codec(_) => ErrorCode::IllegalOperation,
			Self::BlockMismatch { .. } | Self::RetriesExhausted(_) => ErrorCode::NotDefined,
			Self::PeerError { .. } => ErrorCode::NotDefined,
			Self::Cancelled => ErrorCode::NotDefined,
		}
	}
}
