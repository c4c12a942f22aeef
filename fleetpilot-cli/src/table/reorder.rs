//! Drag-to-reorder geometry for header cells

/// Horizontal extent of a rendered header cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderCell {
    pub x: u16,
    pub width: u16,
    /// Position of the column in the field order
    pub field_index: usize,
}

impl HeaderCell {
    fn contains(&self, x: u16) -> bool {
        x >= self.x && x < self.x.saturating_add(self.width)
    }

    /// Doubled midpoint, to stay in integers
    fn midpoint2(&self) -> u32 {
        2 * self.x as u32 + self.width as u32
    }
}

/// Insertion slot (`0..=cells.len()`) for the cursor at `x`.
///
/// Inside a cell: before it when left of its midpoint, after it otherwise.
/// Outside the row: clamped to the nearest edge. Gaps between cells fall
/// to the slot after the cell on the left.
pub fn drop_index(cells: &[HeaderCell], x: u16) -> Option<usize> {
    let first = cells.first()?;
    let last = cells.last()?;

    if let Some(index) = cells.iter().position(|cell| cell.contains(x)) {
        let cell = &cells[index];
        return Some(if (2 * x as u32) < cell.midpoint2() {
            index
        } else {
            index + 1
        });
    }

    if x <= first.x {
        return Some(0);
    }
    if x >= last.x.saturating_add(last.width) {
        return Some(cells.len());
    }
    cells
        .iter()
        .rposition(|cell| cell.x.saturating_add(cell.width) <= x)
        .map(|index| index + 1)
}

/// An in-progress column drag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDrag {
    /// Index of the dragged cell among the rendered cells
    pub start_index: usize,
    pub drop_index: Option<usize>,
}

impl ColumnDrag {
    pub fn start(cells: &[HeaderCell], x: u16) -> Option<Self> {
        let start_index = cells.iter().position(|cell| cell.contains(x))?;
        Some(Self {
            start_index,
            drop_index: Some(start_index),
        })
    }

    pub fn update(&mut self, cells: &[HeaderCell], x: u16) {
        self.drop_index = drop_index(cells, x);
    }

    /// Translate the drop into a field-order move `(from, to)`.
    ///
    /// Dropping onto either side of the dragged cell does nothing. A slot
    /// past the last rendered cell maps to the end of the field order.
    pub fn finish(&self, cells: &[HeaderCell], field_count: usize) -> Option<(usize, usize)> {
        let target = self.drop_index?;
        if target == self.start_index || target == self.start_index + 1 {
            return None;
        }
        let from = cells.get(self.start_index)?.field_index;
        let to = match cells.get(target) {
            Some(cell) => cell.field_index,
            None => field_count,
        };
        Some((from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells() -> Vec<HeaderCell> {
        // three visible columns; field 2 is hidden
        vec![
            HeaderCell { x: 0, width: 10, field_index: 0 },
            HeaderCell { x: 11, width: 10, field_index: 1 },
            HeaderCell { x: 22, width: 10, field_index: 3 },
        ]
    }

    #[test]
    fn test_drop_index_uses_midpoints() {
        let cells = cells();
        assert_eq!(drop_index(&cells, 2), Some(0));
        assert_eq!(drop_index(&cells, 5), Some(1));
        assert_eq!(drop_index(&cells, 12), Some(1));
        assert_eq!(drop_index(&cells, 20), Some(2));
        assert_eq!(drop_index(&cells, 10), Some(1));
        assert_eq!(drop_index(&cells, 31), Some(3));
        assert_eq!(drop_index(&cells, 60), Some(3));
        assert_eq!(drop_index(&[], 5), None);
    }

    #[test]
    fn test_drop_before_row_clamps_to_start() {
        let cells = vec![HeaderCell { x: 4, width: 6, field_index: 0 }];
        assert_eq!(drop_index(&cells, 1), Some(0));
    }

    #[test]
    fn test_finish_skips_same_position() {
        let cells = cells();
        let mut drag = ColumnDrag::start(&cells, 13).unwrap();
        assert_eq!(drag.start_index, 1);

        drag.update(&cells, 12);
        assert_eq!(drag.finish(&cells, 4), None);
        drag.update(&cells, 25);
        assert_eq!(drag.finish(&cells, 4), None);
    }

    #[test]
    fn test_finish_maps_to_field_positions() {
        let cells = cells();
        let mut drag = ColumnDrag::start(&cells, 1).unwrap();
        drag.update(&cells, 29);
        assert_eq!(drag.finish(&cells, 4), Some((0, 4)));

        drag.update(&cells, 23);
        assert_eq!(drag.finish(&cells, 4), Some((0, 3)));

        let mut back = ColumnDrag::start(&cells, 30).unwrap();
        back.update(&cells, 0);
        assert_eq!(back.finish(&cells, 4), Some((3, 0)));
    }
}
