//! Regular chunk grids.

use itertools::Itertools;

/// Return the number of chunks along each dimension.
#[must_use]
pub fn chunk_grid_shape(shape: &[u64], chunk_shape: &[u64]) -> Vec<u64> {
    std::iter::zip(shape, chunk_shape)
        .map(|(&size, &chunk)| if chunk == 0 { 0 } else { size.div_ceil(chunk) })
        .collect()
}

/// Return the total number of chunks of a chunk grid.
#[must_use]
pub fn num_chunks(grid_shape: &[u64]) -> u64 {
    grid_shape.iter().product()
}

/// Return the `.` separated key of the chunk at `chunk_indices`.
#[must_use]
pub fn chunk_key(chunk_indices: &[u64]) -> String {
    if chunk_indices.is_empty() {
        "0".to_string()
    } else {
        chunk_indices.iter().join(".")
    }
}

/// Iterate over the chunk indices of a grid in row-major order (the last dimension varies fastest).
pub fn chunk_indices(grid_shape: &[u64]) -> impl Iterator<Item = Vec<u64>> + '_ {
    grid_shape
        .iter()
        .map(|&chunks| 0..chunks)
        .multi_cartesian_product()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_grid_2d() {
        let grid = chunk_grid_shape(&[3, 20], &[3, 7]);
        assert_eq!(grid, vec![1, 3]);
        assert_eq!(num_chunks(&grid), 3);
        let keys: Vec<String> = chunk_indices(&grid).map(|c| chunk_key(&c)).collect();
        assert_eq!(keys, vec!["0.0", "0.1", "0.2"]);
    }

    #[test]
    fn chunk_grid_row_major() {
        let indices: Vec<Vec<u64>> = chunk_indices(&[2, 2]).collect();
        assert_eq!(indices, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
        assert_eq!(chunk_indices(&[2, 0]).count(), 0);
        assert_eq!(chunk_key(&[]), "0");
    }
}
