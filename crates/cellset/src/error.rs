use thiserror::Error;

/// Errors raised while building a [`CellSelection`](crate::CellSelection).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
	/// A column does not have the same length as the `levels` column.
	#[error("column `{column}` has {actual} entries, expected {expected}")]
	LengthMismatch {
		/// Name of the offending column.
		column: &'static str,
		/// Length of the `levels` column.
		expected: usize,
		/// Length of the offending column.
		actual: usize,
	},
	/// The selection holds more cells than the wire header can describe.
	#[error("selection holds {0} cells, more than the u32 wire count allows")]
	TooManyCells(usize),
}

/// Errors raised while decoding a cell-set buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
	/// The buffer is shorter than the fixed header.
	#[error("buffer of {actual} bytes is shorter than the {needed}-byte header")]
	Truncated {
		/// Header length.
		needed: usize,
		/// Buffer length.
		actual: usize,
	},
	/// The presence flags contain bits this codec does not understand.
	#[error("unknown presence flags {0:#010b}")]
	UnknownFlags(u8),
	/// A reserved header byte or a padding byte is not zero.
	#[error("non-zero reserved byte at offset {offset}")]
	NonZeroReserved {
		/// Byte offset within the buffer.
		offset: usize,
	},
	/// The declared count does not fit in addressable memory.
	#[error("declared cell count {0} overflows the buffer size")]
	CountOverflow(u32),
	/// The buffer length differs from the length implied by the header.
	#[error("header implies {expected} bytes, buffer has {actual}")]
	LengthMismatch {
		/// Length implied by the header.
		expected: usize,
		/// Actual buffer length.
		actual: usize,
	},
	/// A deleted flag byte is neither 0 nor 1.
	#[error("deleted flag of cell {index} has invalid value {value}")]
	InvalidDeletedFlag {
		/// Cell index.
		index: usize,
		/// Offending byte.
		value: u8,
	},
}
