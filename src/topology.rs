//! Reference geometry of the supported element and face topologies.
//!
//! All reference quantities are stored as `f64` with three components, of which only the first
//! [`Topology::reference_dim`] are meaningful. Master elements convert them to the working
//! scalar type once at construction.
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Topology {
    /// Trilinear hexahedron on `[-1, 1]^3`.
    Hex8,
    /// Linear tetrahedron on the unit simplex.
    Tet4,
    /// Bilinear quadrilateral on `[-1, 1]^2` in two spatial dimensions.
    Quad4,
    /// Linear triangle on the unit simplex in two spatial dimensions.
    Tri3,
    /// Bilinear quadrilateral face of a three-dimensional element.
    Quad4Face,
    /// Triangular face of a three-dimensional element.
    Tri3Face,
    /// Edge of a two-dimensional element.
    Line2Face,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ShapeKind {
    TensorProduct,
    Simplex,
}

const HEX8_NODES: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];
const TET4_NODES: [[f64; 3]; 4] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
const QUAD4_NODES: [[f64; 3]; 4] = [[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]];
const TRI3_NODES: [[f64; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
const LINE2_NODES: [[f64; 3]; 2] = [[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]];

const HEX8_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];
const TET4_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
const QUAD4_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];
const TRI3_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];

// Outward-oriented sides, counter-clockwise when seen from outside
const HEX8_SIDES: [&[usize]; 6] = [
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[0, 4, 7, 3],
    &[0, 3, 2, 1],
    &[4, 5, 6, 7],
];
const TET4_SIDES: [&[usize]; 4] = [&[0, 1, 3], &[1, 2, 3], &[0, 3, 2], &[0, 2, 1]];
const QUAD4_SIDES: [&[usize]; 4] = [&[0, 1], &[1, 2], &[2, 3], &[3, 0]];
const TRI3_SIDES: [&[usize]; 3] = [&[0, 1], &[1, 2], &[2, 0]];

impl Topology {
    pub fn is_face(&self) -> bool {
        matches!(self, Topology::Quad4Face | Topology::Tri3Face | Topology::Line2Face)
    }

    pub fn num_nodes(&self) -> usize {
        self.reference_nodes().len()
    }

    pub fn spatial_dim(&self) -> usize {
        match self {
            Topology::Hex8 | Topology::Tet4 | Topology::Quad4Face | Topology::Tri3Face => 3,
            Topology::Quad4 | Topology::Tri3 | Topology::Line2Face => 2,
        }
    }

    /// Dimension of the reference (parametric) domain.
    pub fn reference_dim(&self) -> usize {
        match self {
            Topology::Hex8 | Topology::Tet4 => 3,
            Topology::Quad4 | Topology::Tri3 | Topology::Quad4Face | Topology::Tri3Face => 2,
            Topology::Line2Face => 1,
        }
    }

    /// Topology of the boundary sides of an element topology.
    pub fn side_topology(&self) -> Option<Topology> {
        match self {
            Topology::Hex8 => Some(Topology::Quad4Face),
            Topology::Tet4 => Some(Topology::Tri3Face),
            Topology::Quad4 | Topology::Tri3 => Some(Topology::Line2Face),
            _ => None,
        }
    }

    /// Measure of the reference domain.
    pub fn reference_measure(&self) -> f64 {
        match self {
            Topology::Hex8 => 8.0,
            Topology::Tet4 => 1.0 / 6.0,
            Topology::Quad4 | Topology::Quad4Face => 4.0,
            Topology::Tri3 | Topology::Tri3Face => 0.5,
            Topology::Line2Face => 2.0,
        }
    }

    pub fn reference_nodes(&self) -> &'static [[f64; 3]] {
        match self {
            Topology::Hex8 => &HEX8_NODES,
            Topology::Tet4 => &TET4_NODES,
            Topology::Quad4 | Topology::Quad4Face => &QUAD4_NODES,
            Topology::Tri3 | Topology::Tri3Face => &TRI3_NODES,
            Topology::Line2Face => &LINE2_NODES,
        }
    }

    /// Element edges. Each sub-control surface of a control-volume element is associated with
    /// one edge, and is oriented from the first to the second node.
    pub fn edges(&self) -> &'static [[usize; 2]] {
        match self {
            Topology::Hex8 => &HEX8_EDGES,
            Topology::Tet4 => &TET4_EDGES,
            Topology::Quad4 | Topology::Quad4Face => &QUAD4_EDGES,
            Topology::Tri3 | Topology::Tri3Face => &TRI3_EDGES,
            Topology::Line2Face => &[[0, 1]],
        }
    }

    /// Local node lists of the boundary sides, oriented so that the right-hand rule yields the
    /// outward normal. Face topologies have no sides.
    pub fn sides(&self) -> &'static [&'static [usize]] {
        match self {
            Topology::Hex8 => &HEX8_SIDES,
            Topology::Tet4 => &TET4_SIDES,
            Topology::Quad4 => &QUAD4_SIDES,
            Topology::Tri3 => &TRI3_SIDES,
            _ => &[],
        }
    }

    pub fn is_simplex(&self) -> bool {
        self.shape_kind() == ShapeKind::Simplex
    }

    fn shape_kind(&self) -> ShapeKind {
        match self {
            Topology::Tet4 | Topology::Tri3 | Topology::Tri3Face => ShapeKind::Simplex,
            _ => ShapeKind::TensorProduct,
        }
    }

    /// Evaluates all shape functions at the reference point `xi`.
    pub fn shape_values(&self, xi: &[f64; 3], values: &mut [f64]) {
        let r = self.reference_dim();
        let nodes = self.reference_nodes();
        assert_eq!(values.len(), nodes.len());
        match self.shape_kind() {
            ShapeKind::TensorProduct => {
                for (value, node) in values.iter_mut().zip(nodes) {
                    *value = (0..r).map(|k| 0.5 * (1.0 + xi[k] * node[k])).product();
                }
            }
            ShapeKind::Simplex => {
                values[0] = 1.0 - xi[..r].iter().sum::<f64>();
                values[1..].copy_from_slice(&xi[..r]);
            }
        }
    }

    /// Evaluates the reference gradients of all shape functions at `xi`, stored node-major as
    /// `gradients[a * r + k] = dN_a / dxi_k`.
    pub fn shape_gradients(&self, xi: &[f64; 3], gradients: &mut [f64]) {
        let r = self.reference_dim();
        let nodes = self.reference_nodes();
        assert_eq!(gradients.len(), nodes.len() * r);
        match self.shape_kind() {
            ShapeKind::TensorProduct => {
                for (a, node) in nodes.iter().enumerate() {
                    for j in 0..r {
                        gradients[a * r + j] = (0..r)
                            .map(|k| {
                                if k == j {
                                    0.5 * node[k]
                                } else {
                                    0.5 * (1.0 + xi[k] * node[k])
                                }
                            })
                            .product();
                    }
                }
            }
            ShapeKind::Simplex => {
                gradients.fill(0.0);
                for j in 0..r {
                    gradients[j] = -1.0;
                    gradients[(j + 1) * r + j] = 1.0;
                }
            }
        }
    }

    /// Centroid of the given local nodes in reference coordinates.
    pub fn reference_centroid_of(&self, local_nodes: &[usize]) -> [f64; 3] {
        let nodes = self.reference_nodes();
        let mut centroid = [0.0; 3];
        for &a in local_nodes {
            for k in 0..3 {
                centroid[k] += nodes[a][k];
            }
        }
        centroid.map(|c| c / local_nodes.len() as f64)
    }

    pub fn reference_centroid(&self) -> [f64; 3] {
        let all: Vec<usize> = (0..self.num_nodes()).collect();
        self.reference_centroid_of(&all)
    }
}
