//! Cell-set encoding and decoding.

use std::ops::Range;

use crate::error::DecodeError;
use crate::selection::CellSelection;

/// Fixed header length: count, flags and three reserved bytes.
pub const HEADER_LEN: usize = 8;

/// Header length of the backend layout: the count word only.
pub const BACKEND_HEADER_LEN: usize = 4;

const COUNT_RANGE: Range<usize> = 0..4;
const FLAGS_OFFSET: usize = 4;
const RESERVED_RANGE: Range<usize> = 5..HEADER_LEN;

bitflags::bitflags! {
	/// Presence flags for optional columns.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct CellFlags: u8 {
		/// The buffer carries a deleted flag column.
		const DELETED = 1 << 0;
	}
}

/// Byte ranges of every column for a given header.
#[derive(Debug)]
struct Layout {
	levels: Range<usize>,
	padding: Range<usize>,
	global_ids: Range<usize>,
	deleted: Option<Range<usize>>,
	total: usize,
}

impl Layout {
	fn new(header: usize, count: usize, flags: CellFlags) -> Option<Self> {
		let levels = header..header.checked_add(count)?;
		let padding = levels.end..levels.end.checked_next_multiple_of(4)?;
		let global_ids = padding.end..padding.end.checked_add(count.checked_mul(4)?)?;
		let deleted = if flags.contains(CellFlags::DELETED) {
			Some(global_ids.end..global_ids.end.checked_add(count)?)
		} else {
			None
		};
		let total = deleted.as_ref().map_or(global_ids.end, |range| range.end);
		Some(Self {
			levels,
			padding,
			global_ids,
			deleted,
			total,
		})
	}
}

/// Byte length of an encoded selection with `count` cells.
pub fn encoded_len(count: usize, has_deleted: bool) -> usize {
	let flags = if has_deleted { CellFlags::DELETED } else { CellFlags::empty() };
	Layout::new(HEADER_LEN, count, flags).map_or(usize::MAX, |layout| layout.total)
}

/// Encodes a selection into a single contiguous buffer.
pub fn encode(selection: &CellSelection) -> Vec<u8> {
	let count = selection.len();
	let mut flags = CellFlags::empty();
	if selection.deleted().is_some() {
		flags |= CellFlags::DELETED;
	}

	let total = encoded_len(count, selection.deleted().is_some());
	let mut buf = Vec::with_capacity(total);
	// Selection construction caps the count at u32::MAX.
	buf.extend_from_slice(&(count as u32).to_le_bytes());
	buf.push(flags.bits());
	buf.extend_from_slice(&[0; 3]);

	buf.extend_from_slice(selection.levels());
	buf.resize(HEADER_LEN + count.next_multiple_of(4), 0);
	for id in selection.global_ids() {
		buf.extend_from_slice(&id.to_le_bytes());
	}
	if let Some(deleted) = selection.deleted() {
		buf.extend(deleted.iter().map(|&flag| u8::from(flag)));
	}

	debug_assert_eq!(buf.len(), total);
	buf
}

/// Decodes a buffer produced by [`encode`].
///
/// # Errors
///
/// Fails on a short header, unknown flags, non-zero reserved or padding bytes,
/// any length that differs from the one implied by the header, and deleted
/// flags other than 0 or 1.
pub fn decode(bytes: &[u8]) -> Result<CellSelection, DecodeError> {
	let count = read_count(bytes, HEADER_LEN)?;
	let raw_flags = bytes[FLAGS_OFFSET];
	let flags = CellFlags::from_bits(raw_flags).ok_or(DecodeError::UnknownFlags(raw_flags))?;
	check_zeroed(bytes, RESERVED_RANGE)?;

	let layout = checked_layout(bytes, HEADER_LEN, count, flags)?;
	let (levels, global_ids) = read_columns(bytes, &layout);

	let selection = match layout.deleted {
		Some(range) => {
			let deleted = bytes[range]
				.iter()
				.enumerate()
				.map(|(index, &value)| match value {
					0 => Ok(false),
					1 => Ok(true),
					_ => Err(DecodeError::InvalidDeletedFlag { index, value }),
				})
				.collect::<Result<Vec<_>, _>>()?;
			CellSelection::with_deleted(levels, global_ids, deleted)
		}
		None => CellSelection::new(levels, global_ids),
	};

	// Column lengths are derived from one count, so construction cannot fail.
	selection.map_err(|_| DecodeError::CountOverflow(count))
}

/// Encodes a selection in the layout the backend's patch routes speak:
/// count, levels, zero padding to 4 bytes, global ids.
///
/// That layout has no deleted column; deletion state is not transmitted.
pub fn encode_backend(selection: &CellSelection) -> Vec<u8> {
	let count = selection.len();
	let mut buf = Vec::with_capacity(BACKEND_HEADER_LEN + count.next_multiple_of(4) + 4 * count);
	// Selection construction caps the count at u32::MAX.
	buf.extend_from_slice(&(count as u32).to_le_bytes());
	buf.extend_from_slice(selection.levels());
	buf.resize(BACKEND_HEADER_LEN + count.next_multiple_of(4), 0);
	for id in selection.global_ids() {
		buf.extend_from_slice(&id.to_le_bytes());
	}
	buf
}

/// Decodes a buffer in the backend layout written by [`encode_backend`].
///
/// # Errors
///
/// Fails on a short header, non-zero padding and any length that differs
/// from the one implied by the count.
pub fn decode_backend(bytes: &[u8]) -> Result<CellSelection, DecodeError> {
	let count = read_count(bytes, BACKEND_HEADER_LEN)?;
	let layout = checked_layout(bytes, BACKEND_HEADER_LEN, count, CellFlags::empty())?;
	let (levels, global_ids) = read_columns(bytes, &layout);
	CellSelection::new(levels, global_ids).map_err(|_| DecodeError::CountOverflow(count))
}

fn read_count(bytes: &[u8], header: usize) -> Result<u32, DecodeError> {
	let truncated = || DecodeError::Truncated {
		needed: header,
		actual: bytes.len(),
	};
	if bytes.len() < header {
		return Err(truncated());
	}
	let count_bytes: [u8; 4] = bytes[COUNT_RANGE].try_into().map_err(|_| truncated())?;
	Ok(u32::from_le_bytes(count_bytes))
}

/// Layout for `count` cells, checked against the buffer length and padding.
fn checked_layout(bytes: &[u8], header: usize, count: u32, flags: CellFlags) -> Result<Layout, DecodeError> {
	let count_usize = usize::try_from(count).map_err(|_| DecodeError::CountOverflow(count))?;
	let layout = Layout::new(header, count_usize, flags).ok_or(DecodeError::CountOverflow(count))?;
	if bytes.len() != layout.total {
		return Err(DecodeError::LengthMismatch {
			expected: layout.total,
			actual: bytes.len(),
		});
	}
	check_zeroed(bytes, layout.padding.clone())?;
	Ok(layout)
}

fn read_columns(bytes: &[u8], layout: &Layout) -> (Vec<u8>, Vec<u32>) {
	let levels = bytes[layout.levels.clone()].to_vec();
	let global_ids = bytes[layout.global_ids.clone()]
		.chunks_exact(4)
		.map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
		.collect();
	(levels, global_ids)
}

fn check_zeroed(bytes: &[u8], range: Range<usize>) -> Result<(), DecodeError> {
	let start = range.start;
	match bytes[range].iter().position(|&byte| byte != 0) {
		Some(pos) => Err(DecodeError::NonZeroReserved { offset: start + pos }),
		None => Ok(()),
	}
}
