use fenris_kernels::catalog::{Family, Variant};
use fenris_kernels::error::{ConfigurationError, StagingError};
use fenris_kernels::master_element::{MasterElement, MasterElementRepository, StandardMasterElement};
use fenris_kernels::mesh::procedural::create_unit_box_uniform_hex_mesh;
use fenris_kernels::topology::Topology;
use matrixcompare::assert_scalar_eq;
use nalgebra::Vector3;
use rayon::prelude::*;
use std::sync::Arc;

/// Node-major coordinates of the nodes of an entity.
fn entity_coordinates(coordinates: &[f64], nodes: &[usize]) -> Vec<f64> {
    nodes
        .iter()
        .flat_map(|&node| coordinates[3 * node..3 * node + 3].to_vec())
        .collect()
}

fn reference_derivatives(element: &dyn MasterElement<f64>) -> Vec<f64> {
    let n = element.nodes_per_entity();
    let mut deriv = vec![0.0; element.num_integration_points() * n * element.reference_dim()];
    element.reference_derivatives(Variant::Exact, &mut deriv);
    deriv
}

fn subcontrol_volumes(element: &dyn MasterElement<f64>, coords: &[f64]) -> Vec<f64> {
    let deriv = reference_derivatives(element);
    let q = element.num_integration_points();
    let mut det_j = vec![0.0; q];
    element.jacobian_determinants(coords, &deriv, &mut det_j);
    let mut volumes = vec![0.0; q];
    element.volumes(&det_j, &mut volumes).unwrap();
    volumes
}

#[test]
fn hex8_subcontrol_surfaces_are_aligned_with_edges() {
    let mesh = create_unit_box_uniform_hex_mesh::<f64>(1).unwrap();
    let cell = mesh.part("block_1").unwrap().entity(0);
    let coords = entity_coordinates(mesh.coordinates(), cell.nodes);
    let element = StandardMasterElement::<f64>::new(Topology::Hex8, Family::Scs).unwrap();
    assert_eq!(element.num_integration_points(), 12);

    let deriv = reference_derivatives(&element);
    let mut areas = vec![0.0; 12 * 3];
    element.area_vectors(&coords, &deriv, &mut areas).unwrap();

    let point = |a: usize| Vector3::from_column_slice(&coords[3 * a..3 * a + 3]);
    for (ip, &[left, right]) in element.adjacent_nodes().iter().enumerate() {
        let area = Vector3::from_column_slice(&areas[3 * ip..3 * ip + 3]);
        let edge = point(right) - point(left);
        assert_scalar_eq!(area.norm(), 0.25, comp = abs, tol = 1e-14);
        assert_scalar_eq!(area.dot(&edge), 0.25, comp = abs, tol = 1e-14);
        assert_eq!(element.ip_node_map()[ip], left);
    }
}

#[test]
fn subcontrol_volumes_partition_the_element() {
    let mesh = create_unit_box_uniform_hex_mesh::<f64>(1).unwrap();
    let cell = mesh.part("block_1").unwrap().entity(0);
    let coords = entity_coordinates(mesh.coordinates(), cell.nodes);
    let hex = StandardMasterElement::<f64>::new(Topology::Hex8, Family::Scv).unwrap();
    let volumes = subcontrol_volumes(&hex, &coords);
    assert_eq!(volumes.len(), 8);
    for &volume in &volumes {
        assert_scalar_eq!(volume, 0.125, comp = abs, tol = 1e-14);
    }

    // A tetrahedron of unit volume
    let tet = StandardMasterElement::<f64>::new(Topology::Tet4, Family::Scv).unwrap();
    let coords = [0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 3.0];
    let volumes = subcontrol_volumes(&tet, &coords);
    assert_scalar_eq!(volumes.iter().sum::<f64>(), 1.0, comp = abs, tol = 1e-14);

    let reference = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
    let volumes = subcontrol_volumes(&tet, &reference);
    assert_scalar_eq!(volumes.iter().sum::<f64>(), 1.0 / 6.0, comp = abs, tol = 1e-14);
}

#[test]
fn metric_tensors_of_the_unit_cube_are_scaled_identities() {
    let mesh = create_unit_box_uniform_hex_mesh::<f64>(1).unwrap();
    let cell = mesh.part("block_1").unwrap().entity(0);
    let coords = entity_coordinates(mesh.coordinates(), cell.nodes);

    // The reference hexahedron is [-1, 1]^3, so J = I / 2 everywhere in the unit cube
    for family in [Family::Scs, Family::Fem] {
        let element = StandardMasterElement::<f64>::new(Topology::Hex8, family).unwrap();
        let q = element.num_integration_points();
        let deriv = reference_derivatives(&element);
        let mut metric = vec![0.0; 2 * q * 9];
        element.metric_tensors(&coords, &deriv, &mut metric).unwrap();

        let (contravariant, covariant) = metric.split_at(q * 9);
        for ip in 0..q {
            for i in 0..3 {
                for k in 0..3 {
                    let delta = if i == k { 1.0 } else { 0.0 };
                    assert_scalar_eq!(contravariant[(ip * 3 + i) * 3 + k], 4.0 * delta, comp = abs, tol = 1e-13);
                    assert_scalar_eq!(covariant[(ip * 3 + i) * 3 + k], 0.25 * delta, comp = abs, tol = 1e-14);
                }
            }
        }
    }
}

#[test]
fn subcontrol_volume_gradients_reproduce_linear_fields() {
    let mesh = create_unit_box_uniform_hex_mesh::<f64>(1).unwrap();
    let cell = mesh.part("block_1").unwrap().entity(0);
    let unit = entity_coordinates(mesh.coordinates(), cell.nodes);

    // Affine image of the unit cube, so trilinear shape functions span the linear fields
    let map = [[2.0, 0.5, 0.0], [0.0, 1.0, 0.25], [0.1, 0.0, 3.0]];
    let coords: Vec<f64> = unit
        .chunks(3)
        .flat_map(|x| (0..3).map(move |i| (0..3).map(|k| map[i][k] * x[k]).sum::<f64>() + 0.5 * i as f64))
        .collect();
    let gradient = [1.5, -0.75, 0.2];
    let phi: Vec<f64> = coords
        .chunks(3)
        .map(|x| 3.0 + (0..3).map(|i| gradient[i] * x[i]).sum::<f64>())
        .collect();

    let scv = StandardMasterElement::<f64>::new(Topology::Hex8, Family::Scv).unwrap();
    for variant in [Variant::Exact, Variant::Shifted] {
        let mut deriv = vec![0.0; 8 * 8 * 3];
        scv.reference_derivatives(variant, &mut deriv);
        let mut dndx = vec![0.0; 8 * 8 * 3];
        scv.gradient_operator(&coords, &deriv, &mut dndx).unwrap();

        for ip in 0..8 {
            let derivative_sum: f64 = (0..8).map(|a| dndx[(ip * 8 + a) * 3]).sum();
            assert_scalar_eq!(derivative_sum, 0.0, comp = abs, tol = 1e-13);
            for i in 0..3 {
                let computed: f64 = (0..8).map(|a| dndx[(ip * 8 + a) * 3 + i] * phi[a]).sum();
                assert_scalar_eq!(computed, gradient[i], comp = abs, tol = 1e-12);
            }
        }
    }
}

#[test]
fn inverted_elements_are_degenerate() {
    let tet = StandardMasterElement::<f64>::new(Topology::Tet4, Family::Scv).unwrap();
    // Nodes 1 and 2 swapped
    let inverted = [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
    let deriv = reference_derivatives(&tet);
    let mut det_j = vec![0.0; tet.num_integration_points()];
    tet.jacobian_determinants(&inverted, &deriv, &mut det_j);
    let mut volumes = vec![0.0; tet.num_integration_points()];
    assert!(matches!(
        tet.volumes(&det_j, &mut volumes),
        Err(StagingError::DegenerateJacobian { .. })
    ));
}

#[test]
fn boundary_faces_of_the_unit_box_point_outwards() {
    let mesh = create_unit_box_uniform_hex_mesh::<f64>(1).unwrap();
    let face = StandardMasterElement::<f64>::new(Topology::Quad4Face, Family::FaceCvfem).unwrap();
    let deriv = reference_derivatives(&face);
    let q = face.num_integration_points();
    assert_eq!(q, 4);

    for (name, expected) in [("zmin", [0.0, 0.0, -1.0]), ("xmax", [1.0, 0.0, 0.0])] {
        let entity = mesh.part(name).unwrap().entity(0);
        let coords = entity_coordinates(mesh.coordinates(), entity.nodes);
        let mut areas = vec![0.0; q * 3];
        face.area_vectors(&coords, &deriv, &mut areas).unwrap();
        let mut normals = vec![0.0; q * 3];
        face.unit_normals(&coords, &deriv, &mut normals).unwrap();

        for i in 0..3 {
            let total: f64 = (0..q).map(|ip| areas[3 * ip + i]).sum();
            assert_scalar_eq!(total, expected[i], comp = abs, tol = 1e-14);
            for ip in 0..q {
                assert_scalar_eq!(normals[3 * ip + i], expected[i], comp = abs, tol = 1e-14);
            }
        }
    }
}

#[test]
fn operators_outside_the_family_are_rejected() {
    let mesh = create_unit_box_uniform_hex_mesh::<f64>(1).unwrap();
    let cell = mesh.part("block_1").unwrap().entity(0);
    let coords = entity_coordinates(mesh.coordinates(), cell.nodes);
    let scv = StandardMasterElement::<f64>::new(Topology::Hex8, Family::Scv).unwrap();
    let deriv = reference_derivatives(&scv);
    let mut out = vec![0.0; 8 * 3];
    assert!(matches!(
        scv.area_vectors(&coords, &deriv, &mut out),
        Err(StagingError::UnsupportedOperator { .. })
    ));

    assert_eq!(
        StandardMasterElement::<f64>::new(Topology::Hex8, Family::FaceCvfem).err(),
        Some(ConfigurationError::UnsupportedMasterElement {
            topology: Topology::Hex8,
            family: Family::FaceCvfem
        })
    );
}

#[test]
fn repository_shares_master_elements() {
    let repository = MasterElementRepository::<f64>::new();
    let first = repository.get(Topology::Hex8, Family::Scs).unwrap();
    let second = repository.get(Topology::Hex8, Family::Scs).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(repository.get(Topology::Quad4Face, Family::Scv).is_err());

    let custom: Arc<dyn MasterElement<f64>> =
        Arc::new(StandardMasterElement::new(Topology::Tet4, Family::Fem).unwrap());
    repository.insert(custom.clone());
    assert!(Arc::ptr_eq(&repository.get(Topology::Tet4, Family::Fem).unwrap(), &custom));
}

#[test]
fn repository_is_shared_between_threads() {
    let repository = MasterElementRepository::<f64>::new();
    let elements: Vec<_> = (0..64)
        .into_par_iter()
        .map(|i| {
            let family = if i % 2 == 0 { Family::Scs } else { Family::Scv };
            (family, repository.get(Topology::Hex8, family).unwrap())
        })
        .collect();

    let scs = repository.get(Topology::Hex8, Family::Scs).unwrap();
    let scv = repository.get(Topology::Hex8, Family::Scv).unwrap();
    for (family, element) in &elements {
        let expected = if *family == Family::Scs { &scs } else { &scv };
        assert!(Arc::ptr_eq(element, expected));
    }
}
