use crate::tftp::{Mode, RequestKind};

use super::CodecError;

/// Fluent builder for RRQ/WRQ packets, mirroring the construction style used
/// throughout this crate's options/option-table code.
pub struct RequestBuilder<'a> {
	kind: RequestKind,
	mode: Mode,
	filename: &'a str,
	options: Vec<(&'a str, String)>,
}

impl<'a> RequestBuilder<'a> {
	pub fn new(kind: RequestKind, filename: &'a str) -> Self {
		Self { kind, mode: Mode::Octet, filename, options: Vec::with_capacity(3) }
	}

	#[inline]
	pub fn mode(mut self, mode: Mode) -> Self {
		self.mode = mode;
		self
	}

	#[inline]
	pub fn option(mut self, name: &'a str, value: String) -> Self {
		self.options.push((name, value));
		self
	}

	pub fn build(self) -> Result<Vec<u8>, CodecError> {
		super::encode_request(self.kind, self.filename, self.mode, &self.options)
	}
}

/// Fluent builder for an OACK reply, preserving the order in which options
/// were pushed (the order the requester listed them in, per the negotiation
/// rules in the option table).
#[derive(Default)]
pub struct OAckBuilder<'a> {
	options: Vec<(&'a str, String)>,
}

impl<'a> OAckBuilder<'a> {
	pub fn new() -> Self {
		Self { options: Vec::with_capacity(3) }
	}

	#[inline]
	pub fn option(mut self, name: &'a str, value: String) -> Self {
		self.options.push((name, value));
		self
	}

	pub fn build(self) -> Result<Vec<u8>, CodecError> {
		super::encode_oack(&self.options)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tftp::packet::Packet;

	#[test]
	fn request_builder_produces_decodable_packet() {
		let buf = RequestBuilder::new(RequestKind::Wrq, "x.bin")
			.mode(Mode::Octet)
			.option("blksize", "1024".to_string())
			.build()
			.unwrap();
		let Packet::Request(req) = Packet::decode(&buf).unwrap() else { panic!("wrong kind") };
		assert_eq!(req.filename, "x.bin");
		assert_eq!(req.options, vec![("blksize", "1024")]);
	}

	#[test]
	fn oack_builder_preserves_push_order() {
		let buf = OAckBuilder::new()
			.option("timeout", "2".to_string())
			.option("blksize", "8".to_string())
			.build()
			.unwrap();
		let Packet::OAck(oack) = Packet::decode(&buf).unwrap() else { panic!("wrong kind") };
		assert_eq!(oack.options, vec![("timeout", "2"), ("blksize", "8")]);
	}
}
