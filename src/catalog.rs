//! Catalog of the geometric operators a kernel may request.
//!
//! Every operator belongs to one integration [`Family`] and is evaluated from the gathered
//! coordinates of the entity. Most operators need intermediate results: the reference
//! derivatives of the shape functions and the Jacobian determinants at the integration points.
//! These are reserved implicitly, once per (coordinate field, family, variant), no matter how
//! many operators depend on them.
use crate::field::FieldId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;

/// Integration families of master elements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Family {
    /// Sub-control surfaces of a control-volume element, one per edge.
    Scs,
    /// Sub-control volumes of a control-volume element, one per node.
    Scv,
    /// Gauss quadrature over the element volume.
    Fem,
    /// Boundary face with one sub-face integration point per face node.
    FaceCvfem,
    /// Gauss quadrature over a boundary face.
    FaceFem,
}

impl Family {
    pub fn is_face(&self) -> bool {
        matches!(self, Family::FaceCvfem | Family::FaceFem)
    }
}

/// Placement of the integration points.
///
/// Shifted integration moves sub-control surface points to the edge midpoints and all other
/// points onto their nearest node, which yields lumped (diagonal) operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variant {
    Exact,
    Shifted,
}

impl Variant {
    pub fn from_shifted(shifted: bool) -> Self {
        if shifted {
            Variant::Shifted
        } else {
            Variant::Exact
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Variant::Exact => 0,
            Variant::Shifted => 1,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    ScsAreaVector,
    ScsGradOp,
    ScsMetric,
    ScvVolume,
    ScvGradOp,
    FemGradOp,
    FemDetJ,
    FemMetric,
    FaceAreaVector,
    FaceNormal,
    FaceDetJ,
}

/// Intermediate results an operator depends on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Dependencies {
    pub derivatives: bool,
    pub determinants: bool,
}

impl OperatorKind {
    pub fn family(&self) -> Family {
        use OperatorKind::*;
        match self {
            ScsAreaVector | ScsGradOp | ScsMetric => Family::Scs,
            ScvVolume | ScvGradOp => Family::Scv,
            FemGradOp | FemDetJ | FemMetric => Family::Fem,
            FaceAreaVector | FaceNormal | FaceDetJ => Family::FaceCvfem,
        }
    }

    pub fn dependencies(&self) -> Dependencies {
        use OperatorKind::*;
        match self {
            ScsGradOp | ScvGradOp | FemGradOp | FemDetJ | FaceDetJ | ScvVolume => Dependencies {
                derivatives: true,
                determinants: true,
            },
            ScsAreaVector | ScsMetric | FemMetric | FaceAreaVector | FaceNormal => Dependencies {
                derivatives: true,
                determinants: false,
            },
        }
    }

    /// Determinant operators are served directly from the implicit determinant buffer.
    pub fn has_buffer(&self) -> bool {
        !matches!(self, OperatorKind::FemDetJ | OperatorKind::FaceDetJ)
    }

    /// Buffer shape for `q` integration points, `n` nodes and spatial dimension `d`.
    pub fn shape(&self, q: usize, n: usize, d: usize) -> [usize; 3] {
        use OperatorKind::*;
        match self {
            ScsAreaVector | FaceAreaVector | FaceNormal => [q, d, 1],
            ScsGradOp | ScvGradOp | FemGradOp => [q, n, d],
            ScsMetric | FemMetric => [2 * q, d, d],
            ScvVolume => [q, 1, 1],
            FemDetJ | FaceDetJ => [0, 0, 0],
        }
    }
}

/// Boundary operators may be integrated with either face family. The catalog places them in
/// [`Family::FaceCvfem`] unless the request names [`Family::FaceFem`] explicitly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperatorRequest {
    pub kind: OperatorKind,
    pub coordinates: FieldId,
    pub variant: Variant,
    pub family: Family,
}

impl OperatorRequest {
    pub fn new(kind: OperatorKind, coordinates: FieldId, variant: Variant) -> Self {
        Self {
            family: kind.family(),
            kind,
            coordinates,
            variant,
        }
    }

    /// Evaluates a face operator with Gauss quadrature instead of sub-face points.
    pub fn with_face_gauss_points(mut self) -> Self {
        if self.family == Family::FaceCvfem {
            self.family = Family::FaceFem;
        }
        self
    }
}

impl Display for OperatorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({}, {:?}, {:?})", self.kind, self.coordinates, self.family, self.variant)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImplicitKind {
    /// Reference derivatives of the shape functions, `q * n * r` scalars.
    Derivatives,
    /// Jacobian determinants, `q` scalars.
    Determinants,
}

/// An intermediate buffer shared by all operators of one (coordinates, family, variant).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImplicitRequest {
    pub coordinates: FieldId,
    pub family: Family,
    pub variant: Variant,
    pub kind: ImplicitKind,
}

impl ImplicitRequest {
    pub fn shape(&self, q: usize, n: usize, r: usize) -> [usize; 3] {
        match self.kind {
            ImplicitKind::Derivatives => [q, n, r],
            ImplicitKind::Determinants => [q, 1, 1],
        }
    }
}

/// Implicit buffers required by `request`.
pub fn implicit_requests(request: &OperatorRequest) -> impl Iterator<Item = ImplicitRequest> + '_ {
    let deps = request.kind.dependencies();
    [
        (deps.derivatives, ImplicitKind::Derivatives),
        (deps.determinants, ImplicitKind::Determinants),
    ]
    .into_iter()
    .filter(|(needed, _)| *needed)
    .map(move |(_, kind)| ImplicitRequest {
        coordinates: request.coordinates.clone(),
        family: request.family,
        variant: request.variant,
        kind,
    })
}
