//! Shape functions and integration rules of the supported topologies.
//!
//! A master element describes one integration [`Family`] of one [`Topology`]: the location and
//! weights of its integration points in both [`Variant`]s, and how to turn gathered nodal
//! coordinates into geometric quantities at those points. Everything that does not depend on
//! the coordinates is tabulated once at construction.
use crate::catalog::{Family, Variant};
use crate::error::{ConfigurationError, StagingError};
use crate::topology::Topology;
use crate::Real;
use itertools::izip;
use nalgebra::{convert, Matrix3, Vector3};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Evaluator of shape functions and geometric quantities at integration points.
///
/// Coordinates are passed node-major (`coords[a * d + i]`) and reference derivatives
/// ip-major (`deriv[(ip * n + a) * r + k]`), matching the scratch buffer layout.
pub trait MasterElement<T: Real>: Debug + Send + Sync {
    fn topology(&self) -> Topology;

    fn family(&self) -> Family;

    fn nodes_per_entity(&self) -> usize {
        self.topology().num_nodes()
    }

    fn spatial_dim(&self) -> usize {
        self.topology().spatial_dim()
    }

    fn reference_dim(&self) -> usize {
        self.topology().reference_dim()
    }

    fn num_integration_points(&self) -> usize;

    fn ip_weights(&self) -> &[T];

    /// Local node nearest to each integration point.
    fn ip_node_map(&self) -> &[usize];

    /// The (left, right) node pair of each sub-control surface. Empty for other families.
    fn adjacent_nodes(&self) -> &[[usize; 2]];

    /// Shape function values, `out[ip * n + a]`.
    fn shape_fcn(&self, variant: Variant, out: &mut [T]);

    fn reference_derivatives(&self, variant: Variant, out: &mut [T]);

    /// Jacobian determinants. For faces this is the surface (or line) measure of the mapping.
    fn jacobian_determinants(&self, coords: &[T], deriv: &[T], out: &mut [T]);

    /// Physical shape function gradients, `out[(ip * n + a) * d + i] = dN_a/dx_i`.
    fn gradient_operator(&self, coords: &[T], deriv: &[T], out: &mut [T]) -> Result<(), StagingError>;

    fn area_vectors(&self, coords: &[T], deriv: &[T], out: &mut [T]) -> Result<(), StagingError>;

    fn volumes(&self, det_j: &[T], out: &mut [T]) -> Result<(), StagingError>;

    /// Contravariant metric `J^-1 J^-T` for all points, followed by the covariant metric `J^T J`.
    fn metric_tensors(&self, coords: &[T], deriv: &[T], out: &mut [T]) -> Result<(), StagingError>;

    fn unit_normals(&self, coords: &[T], deriv: &[T], out: &mut [T]) -> Result<(), StagingError>;
}

/// Integration points of one family in reference coordinates.
#[derive(Debug, Clone, Default)]
struct ReferenceRule {
    exact: Vec<[f64; 3]>,
    shifted: Vec<[f64; 3]>,
    weights: Vec<f64>,
    ip_node_map: Vec<usize>,
    adjacent_nodes: Vec<[usize; 2]>,
    reference_areas: Vec<[f64; 3]>,
}

fn midpoint(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [0.5 * (a[0] + b[0]), 0.5 * (a[1] + b[1]), 0.5 * (a[2] + b[2])]
}

fn mean(points: &[[f64; 3]]) -> [f64; 3] {
    let mut m = [0.0; 3];
    for p in points {
        for k in 0..3 {
            m[k] += p[k] / points.len() as f64;
        }
    }
    m
}

fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[1] * b[2] - a[2] * b[1], a[2] * b[0] - a[0] * b[2], a[0] * b[1] - a[1] * b[0]]
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// One sub-control surface per edge, spanned by the edge midpoint, the centroids of the sides
/// sharing the edge and the element centroid.
fn scs_rule(topology: Topology) -> ReferenceRule {
    let nodes = topology.reference_nodes();
    let centroid = topology.reference_centroid();
    let mut rule = ReferenceRule::default();

    for &[a, b] in topology.edges() {
        let m = midpoint(&nodes[a], &nodes[b]);
        let (corners, mut area) = if topology.reference_dim() == 3 {
            let adjacent_sides: Vec<[f64; 3]> = topology
                .sides()
                .iter()
                .filter(|side| side.contains(&a) && side.contains(&b))
                .map(|side| topology.reference_centroid_of(side))
                .collect();
            assert_eq!(adjacent_sides.len(), 2, "Every edge is shared by exactly two sides");
            let (f1, f2) = (adjacent_sides[0], adjacent_sides[1]);
            let area = cross(&sub(&centroid, &m), &sub(&f2, &f1)).map(|x| 0.5 * x);
            (vec![m, f1, centroid, f2], area)
        } else {
            let s = sub(&centroid, &m);
            (vec![m, centroid], [s[1], -s[0], 0.0])
        };

        if dot(&area, &sub(&nodes[b], &nodes[a])) < 0.0 {
            area = area.map(|x| -x);
        }

        rule.exact.push(mean(&corners));
        rule.shifted.push(m);
        rule.weights.push(dot(&area, &area).sqrt());
        rule.ip_node_map.push(a);
        rule.adjacent_nodes.push([a, b]);
        rule.reference_areas.push(area);
    }
    rule
}

/// One sub-volume (or boundary sub-face) per node, spanned by the node, the midpoints of its
/// edges, the centroids of its sides and the entity centroid.
fn subvolume_rule(topology: Topology) -> ReferenceRule {
    let nodes = topology.reference_nodes();
    let centroid = topology.reference_centroid();
    let n = nodes.len();
    let mut rule = ReferenceRule::default();

    for (a, node) in nodes.iter().enumerate() {
        let mut corners = vec![*node];
        if topology.reference_dim() > 1 {
            corners.extend(
                topology
                    .edges()
                    .iter()
                    .filter(|edge| edge.contains(&a))
                    .map(|&[p, q]| midpoint(&nodes[p], &nodes[q])),
            );
        }
        if topology.reference_dim() == 3 {
            corners.extend(
                topology
                    .sides()
                    .iter()
                    .filter(|side| side.contains(&a))
                    .map(|side| topology.reference_centroid_of(side)),
            );
        }
        corners.push(centroid);

        rule.exact.push(mean(&corners));
        rule.shifted.push(*node);
        rule.weights.push(topology.reference_measure() / n as f64);
        rule.ip_node_map.push(a);
    }
    rule
}

/// Gauss rule with one point per node, each point associated with its nearest node.
fn gauss_rule(topology: Topology) -> ReferenceRule {
    let nodes = topology.reference_nodes();
    let r = topology.reference_dim();
    let n = nodes.len();
    let mut rule = ReferenceRule::default();

    for (a, node) in nodes.iter().enumerate() {
        let point = if topology.is_simplex() {
            // Degree-two rules in barycentric form
            let (near, far) = if r == 3 {
                (0.5854101966249685, 0.1381966011250105)
            } else {
                (2.0 / 3.0, 1.0 / 6.0)
            };
            let mut lambda = vec![far; n];
            lambda[a] = near;
            let mut xi = [0.0; 3];
            xi[..r].copy_from_slice(&lambda[1..]);
            xi
        } else {
            node.map(|x| x / 3f64.sqrt())
        };
        rule.exact.push(point);
        rule.shifted.push(*node);
        rule.weights.push(topology.reference_measure() / n as f64);
        rule.ip_node_map.push(a);
    }
    rule
}

/// Master element for the linear Lagrange topologies in all integration families.
#[derive(Debug, Clone)]
pub struct StandardMasterElement<T> {
    topology: Topology,
    family: Family,
    num_ips: usize,
    weights: Vec<T>,
    ip_node_map: Vec<usize>,
    adjacent_nodes: Vec<[usize; 2]>,
    reference_areas: Vec<Vector3<T>>,
    shape_functions: [Vec<T>; 2],
    derivatives: [Vec<T>; 2],
}

impl<T: Real> StandardMasterElement<T> {
    pub fn new(topology: Topology, family: Family) -> Result<Self, ConfigurationError> {
        if topology.is_face() != family.is_face() {
            return Err(ConfigurationError::UnsupportedMasterElement { topology, family });
        }

        let rule = match family {
            Family::Scs => scs_rule(topology),
            Family::Scv | Family::FaceCvfem => subvolume_rule(topology),
            Family::Fem | Family::FaceFem => gauss_rule(topology),
        };

        let n = topology.num_nodes();
        let r = topology.reference_dim();
        let tabulate = |points: &[[f64; 3]]| {
            let mut values = vec![0.0; n];
            let mut gradients = vec![0.0; n * r];
            let mut shape_functions = Vec::with_capacity(points.len() * n);
            let mut derivatives = Vec::with_capacity(points.len() * n * r);
            for xi in points {
                topology.shape_values(xi, &mut values);
                topology.shape_gradients(xi, &mut gradients);
                shape_functions.extend(values.iter().map(|&v| convert::<f64, T>(v)));
                derivatives.extend(gradients.iter().map(|&g| convert::<f64, T>(g)));
            }
            (shape_functions, derivatives)
        };
        let (exact_shape, exact_deriv) = tabulate(&rule.exact);
        let (shifted_shape, shifted_deriv) = tabulate(&rule.shifted);

        Ok(Self {
            topology,
            family,
            num_ips: rule.exact.len(),
            weights: rule.weights.iter().map(|&w| convert(w)).collect(),
            ip_node_map: rule.ip_node_map,
            adjacent_nodes: rule.adjacent_nodes,
            reference_areas: rule
                .reference_areas
                .iter()
                .map(|a| Vector3::new(convert(a[0]), convert(a[1]), convert(a[2])))
                .collect(),
            shape_functions: [exact_shape, shifted_shape],
            derivatives: [exact_deriv, shifted_deriv],
        })
    }

    /// Jacobian `dx/dxi` at one integration point, padded with the identity to 3x3.
    fn jacobian(&self, coords: &[T], deriv: &[T], ip: usize) -> Matrix3<T> {
        let n = self.nodes_per_entity();
        let d = self.spatial_dim();
        let r = self.reference_dim();
        let deriv_ip = &deriv[ip * n * r..(ip + 1) * n * r];
        let mut j = Matrix3::identity();
        for i in 0..d {
            for k in 0..r {
                j[(i, k)] = (0..n).fold(T::zero(), |acc, a| acc + coords[a * d + i] * deriv_ip[a * r + k]);
            }
        }
        j
    }

    fn checked_inverse(&self, j: &Matrix3<T>, ip: usize) -> Result<(T, Matrix3<T>), StagingError> {
        let det = j.determinant();
        let degenerate = || StagingError::DegenerateJacobian {
            ip,
            determinant: det.to_subset().unwrap_or(f64::NAN),
        };
        if det <= T::zero() {
            return Err(degenerate());
        }
        let inverse = j.try_inverse().ok_or_else(degenerate)?;
        Ok((det, inverse))
    }

    /// Unscaled face normal from the tangents of the face mapping.
    fn face_normal(&self, j: &Matrix3<T>) -> Vector3<T> {
        let t0 = j.column(0).into_owned();
        if self.reference_dim() == 2 {
            t0.cross(&j.column(1).into_owned())
        } else {
            Vector3::new(t0.y, -t0.x, T::zero())
        }
    }

    fn unsupported(&self, operator: &str) -> StagingError {
        StagingError::UnsupportedOperator {
            operator: operator.to_string(),
            family: self.family,
        }
    }
}

impl<T: Real> MasterElement<T> for StandardMasterElement<T> {
    fn topology(&self) -> Topology {
        self.topology
    }

    fn family(&self) -> Family {
        self.family
    }

    fn num_integration_points(&self) -> usize {
        self.num_ips
    }

    fn ip_weights(&self) -> &[T] {
        &self.weights
    }

    fn ip_node_map(&self) -> &[usize] {
        &self.ip_node_map
    }

    fn adjacent_nodes(&self) -> &[[usize; 2]] {
        &self.adjacent_nodes
    }

    fn shape_fcn(&self, variant: Variant, out: &mut [T]) {
        out.copy_from_slice(&self.shape_functions[variant.index()]);
    }

    fn reference_derivatives(&self, variant: Variant, out: &mut [T]) {
        out.copy_from_slice(&self.derivatives[variant.index()]);
    }

    fn jacobian_determinants(&self, coords: &[T], deriv: &[T], out: &mut [T]) {
        for (ip, det) in out.iter_mut().enumerate() {
            let j = self.jacobian(coords, deriv, ip);
            *det = if self.family.is_face() {
                self.face_normal(&j).norm()
            } else {
                j.determinant()
            };
        }
    }

    fn gradient_operator(&self, coords: &[T], deriv: &[T], out: &mut [T]) -> Result<(), StagingError> {
        if self.family.is_face() {
            return Err(self.unsupported("gradient operator"));
        }
        let n = self.nodes_per_entity();
        let d = self.spatial_dim();
        let r = self.reference_dim();
        for ip in 0..self.num_ips {
            let (_, inverse) = self.checked_inverse(&self.jacobian(coords, deriv, ip), ip)?;
            for a in 0..n {
                let dn = &deriv[(ip * n + a) * r..(ip * n + a + 1) * r];
                for i in 0..d {
                    out[(ip * n + a) * d + i] = (0..r).fold(T::zero(), |acc, k| acc + dn[k] * inverse[(k, i)]);
                }
            }
        }
        Ok(())
    }

    fn area_vectors(&self, coords: &[T], deriv: &[T], out: &mut [T]) -> Result<(), StagingError> {
        let d = self.spatial_dim();
        for ip in 0..self.num_ips {
            let j = self.jacobian(coords, deriv, ip);
            let area = match self.family {
                Family::Scs => {
                    let (det, inverse) = self.checked_inverse(&j, ip)?;
                    inverse.transpose() * self.reference_areas[ip] * det
                }
                Family::FaceCvfem | Family::FaceFem => self.face_normal(&j) * self.weights[ip],
                Family::Scv | Family::Fem => return Err(self.unsupported("area vector")),
            };
            out[ip * d..(ip + 1) * d].copy_from_slice(&area.as_slice()[..d]);
        }
        Ok(())
    }

    fn volumes(&self, det_j: &[T], out: &mut [T]) -> Result<(), StagingError> {
        for (ip, (volume, &det, &w)) in izip!(out.iter_mut(), det_j, &self.weights).enumerate() {
            if !self.family.is_face() && det <= T::zero() {
                return Err(StagingError::DegenerateJacobian {
                    ip,
                    determinant: det.to_subset().unwrap_or(f64::NAN),
                });
            }
            *volume = det * w;
        }
        Ok(())
    }

    fn metric_tensors(&self, coords: &[T], deriv: &[T], out: &mut [T]) -> Result<(), StagingError> {
        if self.family.is_face() {
            return Err(self.unsupported("metric tensor"));
        }
        let d = self.spatial_dim();
        let (upper, lower) = out.split_at_mut(self.num_ips * d * d);
        for ip in 0..self.num_ips {
            let j = self.jacobian(coords, deriv, ip);
            let (_, inverse) = self.checked_inverse(&j, ip)?;
            let contravariant = inverse * inverse.transpose();
            let covariant = j.transpose() * j;
            for i in 0..d {
                for k in 0..d {
                    upper[(ip * d + i) * d + k] = contravariant[(i, k)];
                    lower[(ip * d + i) * d + k] = covariant[(i, k)];
                }
            }
        }
        Ok(())
    }

    fn unit_normals(&self, coords: &[T], deriv: &[T], out: &mut [T]) -> Result<(), StagingError> {
        if !self.family.is_face() {
            return Err(self.unsupported("unit normal"));
        }
        let d = self.spatial_dim();
        for ip in 0..self.num_ips {
            let normal = self.face_normal(&self.jacobian(coords, deriv, ip));
            let length = normal.norm();
            if length <= T::zero() {
                return Err(StagingError::DegenerateJacobian { ip, determinant: 0.0 });
            }
            out[ip * d..(ip + 1) * d].copy_from_slice(&(normal / length).as_slice()[..d]);
        }
        Ok(())
    }
}

/// Shared cache of master elements, one per (topology, family).
#[derive(Debug)]
pub struct MasterElementRepository<T: Real> {
    cache: Mutex<BTreeMap<(Topology, Family), Arc<dyn MasterElement<T>>>>,
}

impl<T: Real> Default for MasterElementRepository<T> {
    fn default() -> Self {
        Self {
            cache: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<T: Real> MasterElementRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, topology: Topology, family: Family) -> Result<Arc<dyn MasterElement<T>>, ConfigurationError> {
        let mut cache = self.cache.lock();
        if let Some(element) = cache.get(&(topology, family)) {
            return Ok(Arc::clone(element));
        }
        let element: Arc<dyn MasterElement<T>> = Arc::new(StandardMasterElement::new(topology, family)?);
        cache.insert((topology, family), Arc::clone(&element));
        Ok(element)
    }

    /// Replaces the cached master element, e.g. with an instrumented one.
    pub fn insert(&self, element: Arc<dyn MasterElement<T>>) {
        let mut cache = self.cache.lock();
        cache.insert((element.topology(), element.family()), element);
    }
}
