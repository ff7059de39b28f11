//! # In-Place Block Transposition
//!
//! Converts a column-major block of fixed-size elements to row-major
//! without allocating a second buffer. Used by the insert path when a
//! batch supplies one value per column: the aggregated per-type buffer
//! is then column-contiguous and must be flipped before the row-major
//! dataset write.
//!
//! The algorithm follows the permutation cycles of the index map
//! `i -> (n * i) mod (m * n - 1)`, swapping each cycle into place and
//! marking visited elements so every element moves exactly once. The
//! first and last elements are fixed points of the map and never move.

/// Transposes `block`, holding a `rows x cols` matrix of `elem_size`-byte
/// elements in column-major order, into row-major order in place.
///
/// `cols` is derived from the block length. Degenerate shapes
/// (`rows == 1` or `cols == 1`) are already in row-major order and are
/// left untouched.
pub(crate) fn transpose_block(block: &mut [u8], rows: usize, elem_size: usize) {
    debug_assert!(rows > 0);
    debug_assert!(elem_size > 0);
    debug_assert_eq!(block.len() % elem_size, 0);
    debug_assert_eq!((block.len() / elem_size) % rows, 0);

    let total = block.len() / elem_size;
    let cols = total / rows;
    if rows == 1 || cols == 1 {
        return;
    }

    let last = total - 1;
    let mut visited = vec![false; total];

    for start in 1..total {
        if visited[start] {
            continue;
        }
        let mut a = start;
        loop {
            a = if a == last { last } else { (cols * a) % last };
            for k in 0..elem_size {
                block.swap(a * elem_size + k, start * elem_size + k);
            }
            visited[a] = true;
            if a == start {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_single_byte() {
        // Columns [1,2] and [3,4] become rows (1,3) and (2,4).
        let mut block = [1u8, 2, 3, 4];
        transpose_block(&mut block, 2, 1);
        assert_eq!(block, [1, 3, 2, 4]);
    }

    #[test]
    fn rectangular_single_byte() {
        // 2 rows x 3 cols, column-major input.
        let mut block = [1u8, 2, 3, 4, 5, 6];
        transpose_block(&mut block, 2, 1);
        assert_eq!(block, [1, 3, 5, 2, 4, 6]);

        // 3 rows x 2 cols.
        let mut block = [1u8, 2, 3, 4, 5, 6];
        transpose_block(&mut block, 3, 1);
        assert_eq!(block, [1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn single_row_and_single_column_are_identity() {
        let mut row = [1u8, 2, 3, 4];
        transpose_block(&mut row, 1, 1);
        assert_eq!(row, [1, 2, 3, 4]);

        let mut col = [1u8, 2, 3, 4];
        transpose_block(&mut col, 4, 1);
        assert_eq!(col, [1, 2, 3, 4]);
    }

    #[test]
    fn multi_byte_elements() {
        // 2 rows x 2 cols of 2-byte elements A,B,C,D.
        let mut block = [0xA0u8, 0xA1, 0xB0, 0xB1, 0xC0, 0xC1, 0xD0, 0xD1];
        transpose_block(&mut block, 2, 2);
        assert_eq!(block, [0xA0, 0xA1, 0xC0, 0xC1, 0xB0, 0xB1, 0xD0, 0xD1]);
    }

    #[test]
    fn transpose_twice_with_swapped_shape_round_trips() {
        let original: Vec<u8> = (0..24).collect();
        let mut block = original.clone();
        transpose_block(&mut block, 4, 1);
        transpose_block(&mut block, 6, 1);
        assert_eq!(block, original);
    }
}
