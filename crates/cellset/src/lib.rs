//! Binary codec for bulk grid-cell selections.
//!
//! Bulk topology operations (subdivide, merge, delete, recover, pick) exchange
//! large homogeneous sets of grid cells with the backend. A [`CellSelection`]
//! stores them as parallel columns, and [`encode`] / [`decode`] convert between
//! that shape and a single contiguous little-endian buffer.
//!
//! # Wire layout
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | cell count `n` (`u32`) |
//! | 4 | 1 | presence flags ([`CellFlags`]) |
//! | 5 | 3 | reserved, zero |
//! | 8 | `n` | levels (`u8`) |
//! | `8 + n` | 0..=3 | zero padding to a 4-byte boundary |
//! | aligned | `4n` | global ids (`u32`) |
//! | after ids | `n` | deleted flags (`u8`, 0 or 1), only with [`CellFlags::DELETED`] |
//!
//! Each column is contiguous so the receiver can operate on whole columns
//! without de-interleaving.
//!
//! The backend's patch routes speak an older layout with a bare count word
//! in place of the 8-byte header and no deleted column. [`encode_backend`] /
//! [`decode_backend`] convert to and from it with the same strict length
//! check.
//!
//! # Invariants
//!
//! 1. All present columns of a [`CellSelection`] have the same length, and that
//!    length fits in a `u32`.
//!    - Enforced in: `CellSelection::new`, `CellSelection::with_deleted`, `CellSelection::push`
//! 2. [`decode`] MUST reject any buffer whose length differs from the length
//!    implied by its header. Truncated or padded payloads never decode to a
//!    partial selection.
//!    - Enforced in: `decode`
//!    - Tested by: `tests::truncated_by_one_byte_is_rejected`, `tests::trailing_byte_is_rejected`

#![warn(missing_docs)]

mod codec;
mod error;
mod selection;

pub use codec::{BACKEND_HEADER_LEN, CellFlags, HEADER_LEN, decode, decode_backend, encode, encode_backend, encoded_len};
pub use error::{DecodeError, SelectionError};
pub use selection::{Cell, CellSelection};
