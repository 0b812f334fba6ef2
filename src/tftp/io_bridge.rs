use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use crate::tftp::Mode;

/// Opens the source file for a transfer in which we send DATA (a GET on the
/// client, or the server's reply to an RRQ).
pub fn open_for_read(path: &Path) -> io::Result<File> {
	File::open(path)
}

/// Opens the destination file for a transfer in which we receive DATA (a PUT
/// on the client, or the server handling a WRQ). Refuses to overwrite an
/// existing file, per spec.md §4.3 / §7 (ERROR code 6).
pub fn open_for_write_new(path: &Path) -> io::Result<File> {
	OpenOptions::new().write(true).create_new(true).open(path)
}

/// Reads and, for `netascii`, translates a block's worth of payload from the
/// underlying source. Used by the side that sends DATA packets. Generic over
/// the source so a client PUT can stream straight from standard input
/// instead of requiring a seekable file.
pub struct FileReader<R> {
	source: R,
	mode: Mode,
	/// A translated byte produced by the previous call but not yet emitted,
	/// because the requested block size didn't have room for it. This is
	/// the one-byte lookahead spec.md §4.3 requires for streaming netascii
	/// translation across block boundaries.
	carry: Option<u8>,
	eof: bool,
}

impl<R: Read> FileReader<R> {
	pub fn new(source: R, mode: Mode) -> Self {
		Self { source, mode, carry: None, eof: false }
	}

	/// Reads up to `blksize` bytes of wire payload. A return shorter than
	/// `blksize` means end of file; the engine uses that to mark the
	/// terminal DATA packet.
	pub fn read_block(&mut self, blksize: usize) -> io::Result<Vec<u8>> {
		match self.mode {
			Mode::Octet => self.read_block_octet(blksize),
			Mode::NetAscii => self.read_block_netascii(blksize),
		}
	}

	fn read_block_octet(&mut self, blksize: usize) -> io::Result<Vec<u8>> {
		let mut buf = vec![0u8; blksize];
		let mut filled = 0;
		while filled < blksize {
			let n = self.source.read(&mut buf[filled..])?;
			if n == 0 {
				break;
			}
			filled += n;
		}
		buf.truncate(filled);
		Ok(buf)
	}

	fn read_block_netascii(&mut self, blksize: usize) -> io::Result<Vec<u8>> {
		let mut out = Vec::with_capacity(blksize);
		if let Some(b) = self.carry.take() {
			out.push(b);
		}

		let mut one = [0u8; 1];
		while out.len() < blksize {
			if self.eof {
				break;
			}
			let n = self.source.read(&mut one)?;
			if n == 0 {
				self.eof = true;
				break;
			}
			match one[0] {
				b'\n' => {
					out.push(b'\r');
					if out.len() < blksize {
						out.push(b'\n');
					} else {
						self.carry = Some(b'\n');
					}
				}
				b'\r' => {
					out.push(b'\r');
					if out.len() < blksize {
						out.push(0);
					} else {
						self.carry = Some(0);
					}
				}
				other => out.push(other),
			}
		}
		Ok(out)
	}
}

/// Appends, and for `netascii` un-translates, incoming DATA payload into the
/// destination file. Used by the side that receives DATA packets.
pub struct FileWriter {
	file: File,
	mode: Mode,
	/// Set when the previous call's last byte was a raw `\r` whose
	/// continuation (`\n` or `\0`) hadn't arrived yet. Resolved by the first
	/// byte of the next call, which is what makes the translation correct
	/// across a block boundary that splits a `\r\n` or `\r\0` pair.
	pending_cr: bool,
}

impl FileWriter {
	pub fn new(file: File, mode: Mode) -> Self {
		Self { file, mode, pending_cr: false }
	}

	pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
		match self.mode {
			Mode::Octet => self.file.write_all(data),
			Mode::NetAscii => self.append_netascii(data),
		}
	}

	fn append_netascii(&mut self, data: &[u8]) -> io::Result<()> {
		let mut out = Vec::with_capacity(data.len());
		for b in data.iter().copied() {
			if self.pending_cr {
				self.pending_cr = false;
				if b == b'\n' {
					out.push(b'\n');
					continue;
				}
				if b == 0 {
					out.push(b'\r');
					continue;
				}
				out.push(b'\r');
				// fall through: b itself still needs handling below
			}
			if b == b'\r' {
				self.pending_cr = true;
			} else {
				out.push(b);
			}
		}
		self.file.write_all(&out)
	}

	/// Flushes a trailing unresolved `\r` (a standalone CR at the very end
	/// of the stream, with no continuation byte ever arriving). Call once
	/// after the terminal DATA packet has been appended.
	pub fn finish(mut self) -> io::Result<()> {
		if self.pending_cr {
			self.file.write_all(&[b'\r'])?;
		}
		self.file.flush()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Seek;

	fn tmp_with(contents: &[u8]) -> File {
		let mut f = tempfile::tempfile().unwrap();
		f.write_all(contents).unwrap();
		f.rewind().unwrap();
		f
	}

	#[test]
	fn octet_round_trip_is_byte_exact() {
		let src = b"\x00\x01hello\xffworld";
		let mut reader = FileReader::new(tmp_with(src), Mode::Octet);
		let mut collected = Vec::new();
		loop {
			let block = reader.read_block(4).unwrap();
			let short = block.len() < 4;
			collected.extend_from_slice(&block);
			if short {
				break;
			}
		}
		assert_eq!(collected, src);
	}

	#[test]
	fn netascii_read_translates_lf_and_standalone_cr() {
		let src = b"a\nb\rc";
		let mut reader = FileReader::new(tmp_with(src), Mode::NetAscii);
		let mut collected = Vec::new();
		loop {
			let block = reader.read_block(512).unwrap();
			let short = block.len() < 512;
			collected.extend_from_slice(&block);
			if short {
				break;
			}
		}
		assert_eq!(collected, b"a\r\nb\r\0c");
	}

	#[test]
	fn netascii_read_splits_pair_across_small_blocks() {
		// "a\n" -> "a\r\n"; with blksize=2 the \r and \n must land in
		// separate blocks, carried over via the one-byte lookahead.
		let src = b"a\n";
		let mut reader = FileReader::new(tmp_with(src), Mode::NetAscii);
		let b1 = reader.read_block(2).unwrap();
		assert_eq!(b1, b"a\r");
		let b2 = reader.read_block(2).unwrap();
		assert_eq!(b2, b"\n");
	}

	#[test]
	fn netascii_write_reassembles_pair_split_across_appends() {
		let mut tmp = tempfile::NamedTempFile::new().unwrap();
		let file = tmp.reopen().unwrap();
		let mut writer = FileWriter::new(file, Mode::NetAscii);
		writer.append(b"a\r").unwrap();
		writer.append(b"\nb\r").unwrap();
		writer.append(b"\0c").unwrap();
		writer.finish().unwrap();

		let mut result = String::new();
		std::fs::File::open(tmp.path()).unwrap().read_to_string(&mut result).unwrap();
		assert_eq!(result, "a\nb\rc");
	}
}
