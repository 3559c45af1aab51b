use crate::error::SelectionError;

/// One logical cell of a [`CellSelection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
	/// Subdivision depth.
	pub level: u8,
	/// Flattened spatial index, unique within its level.
	pub global_id: u32,
	/// Soft-deletion state, present only when the selection carries it.
	pub deleted: Option<bool>,
}

/// A set of grid cells stored as parallel columns.
///
/// Index `i` across all columns describes one cell. The `deleted` column is
/// optional and only present when soft-deletion state matters to the
/// operation that produced or consumes the selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellSelection {
	levels: Vec<u8>,
	global_ids: Vec<u32>,
	deleted: Option<Vec<bool>>,
}

impl CellSelection {
	/// Creates a selection without deletion state.
	pub fn new(levels: Vec<u8>, global_ids: Vec<u32>) -> Result<Self, SelectionError> {
		check_column("global_ids", levels.len(), global_ids.len())?;
		check_count(levels.len())?;
		Ok(Self {
			levels,
			global_ids,
			deleted: None,
		})
	}

	/// Creates a selection that carries a deleted flag per cell.
	pub fn with_deleted(levels: Vec<u8>, global_ids: Vec<u32>, deleted: Vec<bool>) -> Result<Self, SelectionError> {
		check_column("global_ids", levels.len(), global_ids.len())?;
		check_column("deleted", levels.len(), deleted.len())?;
		check_count(levels.len())?;
		Ok(Self {
			levels,
			global_ids,
			deleted: Some(deleted),
		})
	}

	/// Creates an empty selection without deletion state.
	pub const fn empty() -> Self {
		Self {
			levels: Vec::new(),
			global_ids: Vec::new(),
			deleted: None,
		}
	}

	/// Number of cells.
	pub fn len(&self) -> usize {
		self.levels.len()
	}

	/// Returns true if the selection holds no cells.
	pub fn is_empty(&self) -> bool {
		self.levels.is_empty()
	}

	/// Level column.
	pub fn levels(&self) -> &[u8] {
		&self.levels
	}

	/// Global id column.
	pub fn global_ids(&self) -> &[u32] {
		&self.global_ids
	}

	/// Deleted column, if the selection carries one.
	pub fn deleted(&self) -> Option<&[bool]> {
		self.deleted.as_deref()
	}

	/// Returns the cell at `index`.
	pub fn get(&self, index: usize) -> Option<Cell> {
		Some(Cell {
			level: *self.levels.get(index)?,
			global_id: *self.global_ids.get(index)?,
			deleted: match &self.deleted {
				Some(column) => Some(*column.get(index)?),
				None => None,
			},
		})
	}

	/// Iterates cells in column order.
	pub fn iter(&self) -> impl ExactSizeIterator<Item = Cell> + '_ {
		(0..self.len()).map(|index| Cell {
			level: self.levels[index],
			global_id: self.global_ids[index],
			deleted: self.deleted.as_ref().map(|column| column[index]),
		})
	}

	/// Appends a cell.
	///
	/// A selection with a `deleted` column records `deleted.unwrap_or(false)`;
	/// a selection without one ignores the cell's `deleted` field.
	pub fn push(&mut self, cell: Cell) -> Result<(), SelectionError> {
		check_count(self.len() + 1)?;
		self.levels.push(cell.level);
		self.global_ids.push(cell.global_id);
		if let Some(column) = &mut self.deleted {
			column.push(cell.deleted.unwrap_or(false));
		}
		Ok(())
	}

	/// Splits the selection into its columns.
	pub fn into_parts(self) -> (Vec<u8>, Vec<u32>, Option<Vec<bool>>) {
		(self.levels, self.global_ids, self.deleted)
	}

	/// Byte length of this selection once encoded.
	pub fn encoded_len(&self) -> usize {
		crate::codec::encoded_len(self.len(), self.deleted.is_some())
	}
}

fn check_column(column: &'static str, expected: usize, actual: usize) -> Result<(), SelectionError> {
	if expected == actual {
		Ok(())
	} else {
		Err(SelectionError::LengthMismatch {
			column,
			expected,
			actual,
		})
	}
}

fn check_count(count: usize) -> Result<(), SelectionError> {
	if u32::try_from(count).is_ok() {
		Ok(())
	} else {
		Err(SelectionError::TooManyCells(count))
	}
}
