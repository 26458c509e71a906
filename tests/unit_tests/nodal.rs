use super::unit_box_with_fields;
use fenris_kernels::error::ConfigurationError;
use fenris_kernels::field::{EntityRank, FieldRegistry};
use fenris_kernels::kernel::KernelContext;
use fenris_kernels::master_element::MasterElementRepository;
use fenris_kernels::mesh::Mesh;
use fenris_kernels::nodal::{
    DualNodalVolumeAlgorithm, NodalFieldDriver, NodalGradientAlgorithm, TurbViscWaleAlgorithm, DUAL_NODAL_VOLUME,
    DUDX, TURBULENT_VISCOSITY,
};
use fenris_kernels::options::SolutionOptions;
use fenris_kernels::topology::Topology;
use matrixcompare::assert_scalar_eq;

const BOUNDARY_PARTS: [&str; 6] = ["xmin", "xmax", "ymin", "ymax", "zmin", "zmax"];

fn assemble_dual_nodal_volume(mesh: &Mesh<f64>, fields: &mut FieldRegistry<f64>) {
    let repository = MasterElementRepository::new();
    let options = SolutionOptions::default();
    let context = KernelContext::new(fields, &options, &repository, Topology::Hex8);
    let mut driver = NodalFieldDriver::new(fields.get_field(DUAL_NODAL_VOLUME, EntityRank::Node).unwrap());
    driver.add_algorithm(DualNodalVolumeAlgorithm::new(&context, "block_1").unwrap());
    driver.execute(mesh, fields).unwrap();
}

/// Interior and boundary gradient algorithms of `field_name` on the unit box.
fn gradient_driver(fields: &FieldRegistry<f64>, field_name: &str, gradient_name: &str) -> NodalFieldDriver<f64> {
    let repository = MasterElementRepository::new();
    let options = SolutionOptions::default();
    let mut driver = NodalFieldDriver::new(fields.get_field(gradient_name, EntityRank::Node).unwrap());
    let interior = KernelContext::new(fields, &options, &repository, Topology::Hex8);
    driver.add_algorithm(NodalGradientAlgorithm::new(&interior, "block_1", field_name, gradient_name).unwrap());
    let boundary = KernelContext::new(fields, &options, &repository, Topology::Quad4Face);
    for part in BOUNDARY_PARTS {
        driver.add_algorithm(NodalGradientAlgorithm::new(&boundary, part, field_name, gradient_name).unwrap());
    }
    driver
}

#[test]
fn dual_nodal_volumes_partition_the_box() {
    let (mesh, mut fields) = unit_box_with_fields(2);
    let volume = fields
        .declare_field(DUAL_NODAL_VOLUME, EntityRank::Node, 1, 1, 1)
        .unwrap();
    fields.fill(&volume, 7.0);
    assemble_dual_nodal_volume(&mesh, &mut fields);

    let total: f64 = fields.values(&volume).iter().sum();
    assert_scalar_eq!(total, 1.0, comp = abs, tol = 1e-13);
    assert_eq!(fields.synchronization_count(&volume), 1);

    let coordinates = fields.get_field("coordinates", EntityRank::Node).unwrap();
    for node in 0..mesh.num_nodes() {
        let x = fields.field_data(&coordinates, node);
        // A node in the interior of k of the three directions is shared by 2^k cells
        let interior_directions = x.iter().filter(|&&xi| (xi - 0.5).abs() < 1e-12).count();
        let expected = (1 << interior_directions) as f64 / 64.0;
        assert_scalar_eq!(fields.field_data(&volume, node)[0], expected, comp = abs, tol = 1e-14);
    }
}

#[test]
fn green_gauss_gradients_of_linear_fields_are_exact() {
    let (mesh, mut fields) = unit_box_with_fields(2);
    let coordinates = fields.get_field("coordinates", EntityRank::Node).unwrap();
    let x = fields.values(&coordinates).to_vec();
    fields
        .declare_field(DUAL_NODAL_VOLUME, EntityRank::Node, 1, 1, 1)
        .unwrap();
    let dudx = fields
        .declare_field(DUDX, EntityRank::Node, 3, 3, 1)
        .unwrap();
    let pressure = fields
        .declare_field("pressure", EntityRank::Node, 1, 1, 1)
        .unwrap();
    let dpdx = fields
        .declare_field("dpdx", EntityRank::Node, 3, 1, 1)
        .unwrap();

    let a = [[0.5, -1.0, 2.0], [0.0, 3.0, -0.25], [1.5, 0.75, -2.0]];
    let velocity = fields.get_field("velocity", EntityRank::Node).unwrap();
    fields.fill_with(&velocity, |node, v| {
        for i in 0..3 {
            v[i] = 0.1 * i as f64 + (0..3).map(|j| a[i][j] * x[3 * node + j]).sum::<f64>();
        }
    });
    let b = [2.0, -0.5, 1.25];
    fields.fill_with(&pressure, |node, p| {
        p[0] = 4.0 + (0..3).map(|j| b[j] * x[3 * node + j]).sum::<f64>();
    });

    assemble_dual_nodal_volume(&mesh, &mut fields);
    let velocity_gradient = gradient_driver(&fields, "velocity", DUDX);
    let pressure_gradient = gradient_driver(&fields, "pressure", "dpdx");
    assert_eq!(velocity_gradient.num_algorithms(), 7);
    velocity_gradient.execute(&mesh, &mut fields).unwrap();
    pressure_gradient.execute(&mesh, &mut fields).unwrap();

    for node in 0..mesh.num_nodes() {
        let computed = fields.field_data(&dudx, node);
        for i in 0..3 {
            for j in 0..3 {
                assert_scalar_eq!(computed[3 * i + j], a[i][j], comp = abs, tol = 1e-12);
            }
        }
        let computed = fields.field_data(&dpdx, node);
        for j in 0..3 {
            assert_scalar_eq!(computed[j], b[j], comp = abs, tol = 1e-12);
        }
    }
    assert_eq!(fields.synchronization_count(&dudx), 1);
}

#[test]
fn gradients_require_an_assembled_dual_nodal_volume() {
    let (mesh, mut fields) = unit_box_with_fields(1);
    fields
        .declare_field(DUAL_NODAL_VOLUME, EntityRank::Node, 1, 1, 1)
        .unwrap();
    fields
        .declare_field(DUDX, EntityRank::Node, 3, 3, 1)
        .unwrap();
    let driver = gradient_driver(&fields, "velocity", DUDX);
    assert!(driver.execute(&mesh, &mut fields).is_err());
}

#[test]
fn gradient_field_must_match_the_field_shape() {
    let (_, mut fields) = unit_box_with_fields(1);
    fields
        .declare_field(DUAL_NODAL_VOLUME, EntityRank::Node, 1, 1, 1)
        .unwrap();
    fields
        .declare_field("dtdx", EntityRank::Node, 3, 3, 1)
        .unwrap();
    let repository = MasterElementRepository::new();
    let options = SolutionOptions::default();
    let context = KernelContext::new(&fields, &options, &repository, Topology::Hex8);
    let error = NodalGradientAlgorithm::new(&context, "block_1", "temperature", "dtdx").unwrap_err();
    assert!(matches!(error, ConfigurationError::InvalidOption { name, .. } if name == "dtdx"));
}

#[test]
fn wale_viscosity_vanishes_in_simple_shear() {
    let (_, mut fields) = unit_box_with_fields(1);
    for (name, dim) in [(DUDX, 3), (DUAL_NODAL_VOLUME, 1), (TURBULENT_VISCOSITY, 1)] {
        fields
            .declare_field(name, EntityRank::Node, dim, if dim == 3 { 3 } else { 1 }, 1)
            .unwrap();
    }
    let wale = TurbViscWaleAlgorithm::new(&fields, &SolutionOptions::default(), 3).unwrap();

    let shear = [0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    assert!(wale.nodal_viscosity(&shear, 1.2, 0.125) < 1e-12);

    // Plane strain: the traceless square of the gradient is diag(1, 1, -2) / 3
    let strain = [1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0];
    let sij_sq: f64 = 2.0;
    let sijd_sq: f64 = 2.0 / 3.0;
    let ls = 0.325 * 0.5;
    let expected = 1.2 * ls * ls * (sijd_sq.powf(1.5) + 1e-16) / (sij_sq.powf(2.5) + sijd_sq.powf(1.25) + 1e-8);
    assert_scalar_eq!(wale.nodal_viscosity(&strain, 1.2, 0.125), expected, comp = abs, tol = 1e-14);
}

#[test]
fn wale_viscosity_is_written_at_every_node() {
    let (mesh, mut fields) = unit_box_with_fields(1);
    let dudx = fields
        .declare_field(DUDX, EntityRank::Node, 3, 3, 1)
        .unwrap();
    let tvisc = fields
        .declare_field(TURBULENT_VISCOSITY, EntityRank::Node, 1, 1, 1)
        .unwrap();
    fields
        .declare_field(DUAL_NODAL_VOLUME, EntityRank::Node, 1, 1, 1)
        .unwrap();
    assemble_dual_nodal_volume(&mesh, &mut fields);
    fields.fill_with(&dudx, |node, g| {
        g.copy_from_slice(&[1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0]);
        g[2] = 0.1 * node as f64;
    });

    let wale = TurbViscWaleAlgorithm::new(&fields, &SolutionOptions::default(), 3).unwrap();
    wale.execute(&mut fields);
    let density = fields.get_field("density", EntityRank::Node).unwrap();
    for node in 0..mesh.num_nodes() {
        let expected = wale.nodal_viscosity(
            fields.field_data(&dudx, node),
            fields.field_data(&density, node)[0],
            0.125,
        );
        assert!(expected > 0.0);
        assert_eq!(fields.field_data(&tvisc, node)[0], expected);
    }

    let missing = FieldRegistry::with_coordinates(&mesh, "coordinates").unwrap();
    assert!(matches!(
        TurbViscWaleAlgorithm::new(&missing, &SolutionOptions::default(), 3),
        Err(ConfigurationError::UnknownField { .. })
    ));
}
