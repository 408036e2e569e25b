//! Compressed Sparse Row encode/decode.

use crate::ngram::SparseVector;

/// `{values, col_indices, row_pointers}` — columns ascending per row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Csr {
    pub values: Vec<f32>,
    pub col_indices: Vec<u32>,
    /// Length `num_items + 1`.
    pub row_pointers: Vec<u32>,
}

impl Csr {
    pub fn num_items(&self) -> usize {
        self.row_pointers.len().saturating_sub(1)
    }

    pub fn row(&self, i: usize) -> (&[f32], &[u32]) {
        let start = self.row_pointers[i] as usize;
        let end = self.row_pointers[i + 1] as usize;
        (&self.values[start..end], &self.col_indices[start..end])
    }

    pub fn row_as_sparse(&self, i: usize) -> SparseVector {
        let (values, cols) = self.row(i);
        let features = cols.iter().copied().zip(values.iter().copied()).collect();
        SparseVector { features }
    }
}

/// `SparseVector`'s `BTreeMap` already iterates in ascending bucket order,
/// so each row's `col_indices` come out sorted for free.
pub fn to_csr(rows: &[SparseVector]) -> Csr {
    let mut values = Vec::new();
    let mut col_indices = Vec::new();
    let mut row_pointers = Vec::with_capacity(rows.len() + 1);
    row_pointers.push(0u32);

    for row in rows {
        for (&bucket, &value) in &row.features {
            col_indices.push(bucket);
            values.push(value);
        }
        row_pointers.push(values.len() as u32);
    }

    Csr {
        values,
        col_indices,
        row_pointers,
    }
}

pub fn from_csr(csr: &Csr) -> Vec<SparseVector> {
    (0..csr.num_items()).map(|i| csr.row_as_sparse(i)).collect()
}
