use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};
use simple_logger::SimpleLogger;

use crate::tftp::Mode;

#[derive(Debug, Clone, ValueEnum, Default)]
pub enum DebugLevel {
	Off = 0,
	Error,

	#[default]
	Warn,
	Info,
	Debug,
	Trace,
}

impl From<DebugLevel> for log::LevelFilter {
	fn from(value: DebugLevel) -> Self {
		match value {
			DebugLevel::Off => Self::Off,
			DebugLevel::Error => Self::Error,
			DebugLevel::Warn => Self::Warn,
			DebugLevel::Info => Self::Info,
			DebugLevel::Debug => Self::Debug,
			DebugLevel::Trace => Self::Trace,
		}
	}
}

pub fn init_logger(debug_level: DebugLevel) {
	SimpleLogger::new().with_level(debug_level.into()).env().init().unwrap();
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum TransferMode {
	#[default]
	Octet,
	Netascii,
}

impl From<TransferMode> for Mode {
	fn from(value: TransferMode) -> Self {
		match value {
			TransferMode::Octet => Mode::Octet,
			TransferMode::Netascii => Mode::NetAscii,
		}
	}
}

/// CLI for the `tftp` client binary. Direction is implied by `-f`: with it,
/// a read (RRQ) from the server into the `-t` destination; without it, a
/// write (WRQ) reading from standard input, with `-t` naming the remote
/// file to create.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct ClientCli {
	#[arg(value_enum, short, long, default_value_t = DebugLevel::Warn, help = "Debug level to determine which messages are printed")]
	pub debug: DebugLevel,

	#[arg(short = 'h', long, help = "TFTP server to connect to")]
	pub host: IpAddr,

	#[arg(short = 'p', long, default_value_t = crate::tftp::consts::TFTP_LISTEN_PORT, help = "Remote port to connect to")]
	pub port: u16,

	#[arg(short = 'f', long = "from", help = "Remote path to read; if omitted, this is a write sourced from standard input")]
	pub remote_source: Option<String>,

	#[arg(short = 't', long = "to", help = "Destination path when reading, or remote filename when writing")]
	pub target: String,

	#[command(flatten)]
	pub opts: ClientOpts,
}

#[derive(Debug, Args)]
pub struct ClientOpts {
	#[arg(short, long, help = "Negotiate this block size (8-65464)")]
	pub blocksize: Option<u16>,

	#[arg(short = 'o', long = "timeout-secs", help = "Negotiate this retransmission timeout, in seconds (1-255)")]
	pub timeout_secs: Option<u8>,

	#[arg(short = 'T', long, default_value_t = false, help = "Negotiate the tsize option")]
	pub transfer_size: bool,

	#[arg(short, long, value_enum, default_value_t = TransferMode::Octet)]
	pub mode: TransferMode,
}

/// CLI for the `tftpd` server binary.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct ServerCli {
	#[arg(value_enum, short, long, default_value_t = DebugLevel::Warn, help = "Debug level to determine which messages are printed")]
	pub debug: DebugLevel,

	#[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED), help = "Address to bind the listening socket to")]
	pub bind: IpAddr,

	#[arg(short, long, default_value_t = crate::tftp::consts::TFTP_LISTEN_PORT)]
	pub port: u16,

	#[arg(help = "Directory served to clients; requests are confined to this root")]
	pub root: PathBuf,
}
