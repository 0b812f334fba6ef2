use std::fmt::Display;
use std::time::Duration;

use crate::tftp::{consts, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
	Blksize,
	Timeout,
	Tsize,
}

impl OptionKind {
	/// Option names are case-insensitive on input (spec.md §3).
	fn from_name(name: &str) -> Option<Self> {
		match name.to_ascii_lowercase().as_str() {
			consts::OPT_BLOCKSIZE_IDENT => Some(Self::Blksize),
			consts::OPT_TIMEOUT_IDENT => Some(Self::Timeout),
			consts::OPT_TRANSFERSIZE_IDENT => Some(Self::Tsize),
			_ => None,
		}
	}

	fn name(&self) -> &'static str {
		match self {
			Self::Blksize => consts::OPT_BLOCKSIZE_IDENT,
			Self::Timeout => consts::OPT_TIMEOUT_IDENT,
			Self::Tsize => consts::OPT_TRANSFERSIZE_IDENT,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionError {
	/// Same option name appeared twice in one request.
	Duplicate(&'static str),
	/// A known option's value didn't parse as an integer, or fell outside
	/// the range in spec.md §3.
	OutOfRange(&'static str),
}

impl Display for OptionError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Duplicate(name) => write!(f, "duplicate option \"{name}\""),
			Self::OutOfRange(name) => write!(f, "option \"{name}\" has an invalid or out-of-range value"),
		}
	}
}

/// A single option entry, retaining the position at which its name first
/// appeared in the request. The OACK is built by iterating entries in
/// ascending `order`, which is what lets two conformant peers agree on
/// exact byte layout.
#[derive(Debug, Clone, Copy)]
struct Entry {
	kind: OptionKind,
	order: usize,
	value: u32,
}

/// Per-session option state (component B). Tracks which of the three
/// negotiable options are active and what value is in effect for each.
/// Never shared across sessions — one table is owned by one
/// [`crate::tftp::engine`] session.
#[derive(Debug, Default)]
pub struct OptionTable {
	entries: Vec<Entry>,
}

impl OptionTable {
	pub fn new() -> Self {
		Self { entries: Vec::new() }
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	fn find(&self, kind: OptionKind) -> Option<&Entry> {
		self.entries.iter().find(|e| e.kind == kind)
	}

	/// Parses the raw (name, value) pairs straight off a decoded RRQ/WRQ/OACK,
	/// validating ranges and rejecting duplicates. Unrecognized option names
	/// are silently dropped, per the standard and spec.md §4.2 — they are
	/// never echoed back and never cause an error.
	pub fn parse_requested(pairs: &[(&str, &str)]) -> Result<Self, OptionError> {
		let mut table = Self::new();
		for (order, (name, value)) in pairs.iter().enumerate() {
			let Some(kind) = OptionKind::from_name(name) else { continue };
			if table.find(kind).is_some() {
				return Err(OptionError::Duplicate(kind.name()));
			}
			let numeric: u32 = value.parse().map_err(|_| OptionError::OutOfRange(kind.name()))?;
			match kind {
				OptionKind::Blksize => {
					if numeric < consts::MIN_BLOCK_SIZE as u32 || numeric > consts::MAX_BLOCK_SIZE as u32 {
						return Err(OptionError::OutOfRange(kind.name()));
					}
				}
				OptionKind::Timeout => {
					if numeric < consts::MIN_TIMEOUT_SECS as u32 || numeric > consts::MAX_TIMEOUT_SECS as u32 {
						return Err(OptionError::OutOfRange(kind.name()));
					}
				}
				OptionKind::Tsize => (), // full u32 range permitted
			}
			table.entries.push(Entry { kind, order, value: numeric });
		}
		table.entries.sort_by_key(|e| e.order);
		Ok(table)
	}

	/// Produce the accepted option table a responder sends back in its OACK,
	/// given the options the peer requested, this session's role, and (for
	/// `tsize`) the actual file size involved. All requested options in
	/// range are accepted as-is; `blksize` may be clamped downward by a
	/// responder that prefers a smaller block, which this implementation
	/// never does (it always honors the requested size once validated).
	pub fn negotiate(requested: &OptionTable, role: Role, file_size: u64) -> OptionTable {
		let mut accepted = OptionTable::new();
		for entry in &requested.entries {
			let value = match (entry.kind, role) {
				(OptionKind::Tsize, Role::Writer) => file_size.min(u32::MAX as u64) as u32,
				(OptionKind::Tsize, Role::Reader) => entry.value,
				_ => entry.value,
			};
			accepted.entries.push(Entry { kind: entry.kind, order: entry.order, value });
		}
		accepted
	}

	/// Renders the accepted options as (name, value-string) pairs in
	/// first-requested order, ready for [`crate::tftp::packet::encode_oack`].
	pub fn as_oack_pairs(&self) -> Vec<(&'static str, String)> {
		self.entries.iter().map(|e| (e.kind.name(), e.value.to_string())).collect()
	}

	pub fn is_active(&self, kind: OptionKind) -> bool {
		self.find(kind).is_some()
	}

	pub fn effective_blksize(&self) -> u16 {
		self.find(OptionKind::Blksize).map(|e| e.value as u16).unwrap_or(consts::DEFAULT_BLOCK_SIZE)
	}

	pub fn effective_timeout(&self) -> Duration {
		let secs = self.find(OptionKind::Timeout).map(|e| e.value as u64).unwrap_or(consts::DEFAULT_TIMEOUT_SECS as u64);
		Duration::from_secs(secs)
	}

	pub fn effective_tsize(&self) -> u32 {
		self.find(OptionKind::Tsize).map(|e| e.value).unwrap_or(0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unrecognized_options_are_dropped_silently() {
		let pairs = [("windowsize", "4"), ("blksize", "1024")];
		let table = OptionTable::parse_requested(&pairs).unwrap();
		assert_eq!(table.effective_blksize(), 1024);
		assert_eq!(table.as_oack_pairs(), vec![("blksize", "1024".to_string())]);
	}

	#[test]
	fn option_names_are_case_insensitive() {
		let pairs = [("BlkSize", "1024"), ("TIMEOUT", "3")];
		let table = OptionTable::parse_requested(&pairs).unwrap();
		assert_eq!(table.effective_blksize(), 1024);
		assert_eq!(table.effective_timeout(), Duration::from_secs(3));
	}

	#[test]
	fn duplicate_option_name_is_rejected() {
		let pairs = [("blksize", "512"), ("blksize", "1024")];
		assert_eq!(OptionTable::parse_requested(&pairs).unwrap_err(), OptionError::Duplicate("blksize"));
	}

	#[test]
	fn blksize_out_of_range_is_rejected() {
		let pairs = [("blksize", "4")];
		assert!(matches!(OptionTable::parse_requested(&pairs), Err(OptionError::OutOfRange("blksize"))));
		let pairs = [("blksize", "70000")];
		assert!(matches!(OptionTable::parse_requested(&pairs), Err(OptionError::OutOfRange("blksize"))));
	}

	#[test]
	fn defaults_apply_when_option_absent() {
		let table = OptionTable::new();
		assert_eq!(table.effective_blksize(), consts::DEFAULT_BLOCK_SIZE);
		assert_eq!(table.effective_timeout(), Duration::from_secs(consts::DEFAULT_TIMEOUT_SECS as u64));
		assert_eq!(table.effective_tsize(), 0);
	}

	#[test]
	fn negotiate_tsize_as_reader_fills_in_actual_file_size() {
		let pairs = [("tsize", "0")];
		let requested = OptionTable::parse_requested(&pairs).unwrap();
		let accepted = OptionTable::negotiate(&requested, Role::Writer, 2048);
		assert_eq!(accepted.effective_tsize(), 2048);
	}

	#[test]
	fn oack_preserves_first_requested_order() {
		let pairs = [("tsize", "0"), ("blksize", "1024"), ("timeout", "3")];
		let requested = OptionTable::parse_requested(&pairs).unwrap();
		let accepted = OptionTable::negotiate(&requested, Role::Reader, 0);
		let names: Vec<&str> = accepted.as_oack_pairs().iter().map(|(n, _)| *n).collect();
		assert_eq!(names, vec!["tsize", "blksize", "timeout"]);
	}
}
