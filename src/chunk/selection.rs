//! Selection vectors

use arrow::array::UInt32Array;
use std::sync::Arc;

/// Shared list of active row indices overlaying a chunk's columns
///
/// Indices address the physical rows of the columns. Cloning shares the
/// underlying buffer, so an operator that forwards a selection unchanged
/// hands its parent the very same vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionVector {
    indices: Arc<[u32]>,
}

impl SelectionVector {
    pub fn new(indices: Vec<u32>) -> Self {
        Self {
            indices: indices.into(),
        }
    }

    /// Selection of the contiguous rows `[start, end)`
    pub fn range(start: usize, end: usize) -> Self {
        Self::new((start as u32..end as u32).collect())
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Physical row of the `i`-th active row
    pub fn get(&self, i: usize) -> usize {
        self.indices[i] as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().map(|&i| i as usize)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }

    /// Narrow to the active rows `[start, end)` of this selection
    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self::new(self.indices[start..end].to_vec())
    }

    pub fn max_index(&self) -> Option<usize> {
        self.indices.iter().max().map(|&i| i as usize)
    }

    /// Indices as an arrow array, suitable for `take`
    pub fn to_indices(&self) -> UInt32Array {
        UInt32Array::from(self.indices.to_vec())
    }

    /// True if both vectors share one buffer
    pub fn ptr_eq(&self, other: &SelectionVector) -> bool {
        Arc::ptr_eq(&self.indices, &other.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_and_slice() {
        let sel = SelectionVector::range(2, 6);
        assert_eq!(sel.as_slice(), &[2, 3, 4, 5]);

        let narrowed = sel.slice(1, 3);
        assert_eq!(narrowed.as_slice(), &[3, 4]);
        assert!(!narrowed.ptr_eq(&sel));
    }

    #[test]
    fn test_clone_shares_buffer() {
        let sel = SelectionVector::new(vec![0, 4, 9]);
        let forwarded = sel.clone();
        assert!(forwarded.ptr_eq(&sel));
        assert_eq!(forwarded.max_index(), Some(9));
    }
}
