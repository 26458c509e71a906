//! Global linear systems that local contributions are summed into.
use crate::error::StagingError;
use crate::mesh::Mesh;
use crate::Real;
use eyre::eyre;
use nalgebra::{DMatrix, DMatrixView, DVector, DVectorView};
use nalgebra_sparse::csr::CsrRowMut;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeSet;

/// Destination of assembled local systems.
///
/// Row `dofs * node + i` holds degree of freedom `i` of `node`. Local systems are ordered the
/// same way, by local node index.
pub trait LinearSystem<T: Real> {
    fn dofs_per_node(&self) -> usize;

    /// Adds a local system to the rows and columns of `nodes`. Never overwrites.
    fn sum_into(&mut self, nodes: &[usize], lhs: DMatrixView<T>, rhs: DVectorView<T>) -> eyre::Result<()>;
}

fn check_local_system<T: Real>(
    nodes: &[usize],
    dofs: usize,
    lhs: &DMatrixView<T>,
    rhs: &DVectorView<T>,
) -> Result<(), StagingError> {
    let expected = nodes.len() * dofs;
    for found in [lhs.nrows(), lhs.ncols(), rhs.len()] {
        if found != expected {
            return Err(StagingError::LocalSystemMismatch { expected, found });
        }
    }
    Ok(())
}

/// Sparse system whose pattern is the node adjacency of a set of mesh parts.
#[derive(Debug, Clone)]
pub struct CsrLinearSystem<T> {
    matrix: CsrMatrix<T>,
    rhs: DVector<T>,
    dofs: usize,
    connectivity_permutation: Vec<usize>,
}

impl<T: Real> CsrLinearSystem<T> {
    pub fn from_mesh_parts(mesh: &Mesh<T>, part_names: &[&str], dofs: usize) -> eyre::Result<Self> {
        let num_rows = mesh.num_nodes() * dofs;
        let mut rows = vec![BTreeSet::new(); num_rows];
        for name in part_names {
            for entity in mesh.part(name)?.entities() {
                for &a in entity.nodes {
                    for &b in entity.nodes {
                        for i in 0..dofs {
                            rows[dofs * a + i].extend((0..dofs).map(|j| dofs * b + j));
                        }
                    }
                }
            }
        }

        let mut offsets = Vec::with_capacity(num_rows + 1);
        let mut column_indices = Vec::new();
        offsets.push(0);
        for row in rows {
            column_indices.extend(row);
            offsets.push(column_indices.len());
        }
        let nnz = column_indices.len();
        let pattern = SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
            .map_err(|err| eyre!("Invalid sparsity pattern: {}", err))?;
        let matrix = CsrMatrix::try_from_pattern_and_values(pattern, vec![T::zero(); nnz])
            .map_err(|err| eyre!("Invalid CSR matrix: {}", err))?;

        Ok(Self {
            matrix,
            rhs: DVector::zeros(num_rows),
            dofs,
            connectivity_permutation: Vec::new(),
        })
    }

    pub fn zero(&mut self) {
        self.matrix.values_mut().fill(T::zero());
        self.rhs.fill(T::zero());
    }

    pub fn matrix(&self) -> &CsrMatrix<T> {
        &self.matrix
    }

    pub fn rhs(&self) -> &DVector<T> {
        &self.rhs
    }
}

/// Adds a row of a local matrix to the corresponding row of a CSR matrix.
///
/// `sorted_permutation` lists the local node indices ordered by global node index, so that the
/// columns of the CSR row can be matched in a single pass.
fn add_element_row_to_csr_row<T: Real>(
    row: &mut CsrRowMut<T>,
    node_connectivity: &[usize],
    sorted_permutation: &[usize],
    dofs: usize,
    local_row: impl Fn(usize) -> T,
) -> eyre::Result<()> {
    let (column_indices, values) = row.cols_and_values_mut();
    let mut csr_col_idx_iter = column_indices.iter().copied().enumerate();

    for &node_local_idx in sorted_permutation {
        let node_global_idx = node_connectivity[node_local_idx];
        for i in 0..dofs {
            let local_col_idx = dofs * node_local_idx + i;
            let global_col_idx = dofs * node_global_idx + i;
            let (local_csr_col_idx, _) = csr_col_idx_iter
                .find(|(_, csr_col_idx)| *csr_col_idx == global_col_idx)
                .ok_or_else(|| eyre!("Column {} is not part of the sparsity pattern", global_col_idx))?;
            values[local_csr_col_idx] += local_row(local_col_idx);
        }
    }
    Ok(())
}

impl<T: Real> LinearSystem<T> for CsrLinearSystem<T> {
    fn dofs_per_node(&self) -> usize {
        self.dofs
    }

    fn sum_into(&mut self, nodes: &[usize], lhs: DMatrixView<T>, rhs: DVectorView<T>) -> eyre::Result<()> {
        let dofs = self.dofs;
        check_local_system(nodes, dofs, &lhs, &rhs)?;

        let permutation = &mut self.connectivity_permutation;
        permutation.clear();
        permutation.extend(0..nodes.len());
        permutation.sort_unstable_by_key(|&a| nodes[a]);
        // Repeated nodes would break the single-pass column search
        if permutation.windows(2).any(|w| nodes[w[0]] == nodes[w[1]]) {
            return Err(eyre!("Entity connectivity {:?} contains repeated nodes", nodes));
        }

        for (local_node_idx, &global_node_idx) in nodes.iter().enumerate() {
            for i in 0..dofs {
                let local_row_idx = dofs * local_node_idx + i;
                let global_row_idx = dofs * global_node_idx + i;
                let mut csr_row = self
                    .matrix
                    .get_row_mut(global_row_idx)
                    .ok_or_else(|| eyre!("Row {} is out of bounds", global_row_idx))?;
                add_element_row_to_csr_row(&mut csr_row, nodes, permutation, dofs, |col| lhs[(local_row_idx, col)])?;
                self.rhs[global_row_idx] += rhs[local_row_idx];
            }
        }
        Ok(())
    }
}

/// Dense system, for diagnostics and small problems.
#[derive(Debug, Clone)]
pub struct DenseLinearSystem<T> {
    matrix: DMatrix<T>,
    rhs: DVector<T>,
    dofs: usize,
}

impl<T: Real> DenseLinearSystem<T> {
    pub fn new(num_nodes: usize, dofs: usize) -> Self {
        Self {
            matrix: DMatrix::zeros(num_nodes * dofs, num_nodes * dofs),
            rhs: DVector::zeros(num_nodes * dofs),
            dofs,
        }
    }

    pub fn zero(&mut self) {
        self.matrix.fill(T::zero());
        self.rhs.fill(T::zero());
    }

    pub fn matrix(&self) -> &DMatrix<T> {
        &self.matrix
    }

    pub fn rhs(&self) -> &DVector<T> {
        &self.rhs
    }
}

impl<T: Real> LinearSystem<T> for DenseLinearSystem<T> {
    fn dofs_per_node(&self) -> usize {
        self.dofs
    }

    fn sum_into(&mut self, nodes: &[usize], lhs: DMatrixView<T>, rhs: DVectorView<T>) -> eyre::Result<()> {
        let dofs = self.dofs;
        check_local_system(nodes, dofs, &lhs, &rhs)?;
        let global = |local: usize| dofs * nodes[local / dofs] + local % dofs;
        let n = nodes.len() * dofs;
        for r in 0..n {
            for c in 0..n {
                self.matrix[(global(r), global(c))] += lhs[(r, c)];
            }
            self.rhs[global(r)] += rhs[r];
        }
        Ok(())
    }
}
