use super::unit_box_with_fields;
use super::wall::wall_fields;
use fenris_kernels::algorithm::{ElementSolverAlgorithm, ElementSolverAlgorithmBuilder};
use fenris_kernels::error::{ConfigurationError, StagingError};
use fenris_kernels::field::FieldRegistry;
use fenris_kernels::kernel::{KernelContext, ScalarAdvDiffElemKernel, ScalarDiffFemKernel};
use fenris_kernels::linear_system::{CsrLinearSystem, DenseLinearSystem, LinearSystem};
use fenris_kernels::master_element::MasterElementRepository;
use fenris_kernels::mesh::Mesh;
use fenris_kernels::options::SolutionOptions;
use fenris_kernels::topology::Topology;
use fenris_kernels::wall::MomentumWallFunctionKernel;
use matrixcompare::assert_matrix_eq;
use nalgebra::DMatrix;

fn transport_algorithm(mesh: &Mesh<f64>, fields: &FieldRegistry<f64>, part_name: &str) -> ElementSolverAlgorithm<f64> {
    let repository = MasterElementRepository::new();
    let options = SolutionOptions::default();
    let part = mesh.part(part_name).unwrap();
    let context = KernelContext::new(fields, &options, &repository, part.topology());
    let mut builder = ElementSolverAlgorithmBuilder::new(part, 1);
    builder
        .add_kernel(|requirements| {
            ScalarAdvDiffElemKernel::new(&context, requirements, "temperature", "thermal_conductivity")
        })
        .unwrap()
        .add_kernel(|requirements| ScalarDiffFemKernel::new(&context, requirements, "temperature", "thermal_conductivity"))
        .unwrap();
    builder.build().unwrap()
}

#[test]
fn parallel_assembly_is_identical_to_serial_assembly() {
    let (mesh, fields) = unit_box_with_fields(3);
    let algorithm = transport_algorithm(&mesh, &fields, "block_1");

    let mut serial = DenseLinearSystem::new(mesh.num_nodes(), 1);
    algorithm.execute(&mesh, &fields, &mut serial).unwrap();

    for chunk_size in [1, 4, 1000] {
        let mut parallel = DenseLinearSystem::new(mesh.num_nodes(), 1);
        algorithm
            .par_execute(&mesh, &fields, &mut parallel, chunk_size)
            .unwrap();
        assert_eq!(parallel.matrix(), serial.matrix());
        assert_eq!(parallel.rhs(), serial.rhs());
    }
}

#[test]
fn parallel_assembly_over_many_windows_is_identical_to_serial_assembly() {
    let (mesh, fields) = unit_box_with_fields(3);
    let algorithm = transport_algorithm(&mesh, &fields, "block_1");
    let mut serial = CsrLinearSystem::from_mesh_parts(&mesh, &["block_1"], 1).unwrap();
    algorithm.execute(&mesh, &fields, &mut serial).unwrap();

    // Two threads with chunks of 2 give windows of 4 of the 27 elements, the last one partial
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(2)
        .build()
        .unwrap();
    for chunk_size in [2, 5] {
        let mut parallel = CsrLinearSystem::from_mesh_parts(&mesh, &["block_1"], 1).unwrap();
        pool.install(|| algorithm.par_execute(&mesh, &fields, &mut parallel, chunk_size))
            .unwrap();
        assert_eq!(parallel.matrix().values(), serial.matrix().values());
        assert_eq!(parallel.rhs(), serial.rhs());
    }
}

#[test]
fn csr_and_dense_systems_agree() {
    let (mesh, fields) = unit_box_with_fields(2);
    let algorithm = transport_algorithm(&mesh, &fields, "block_1");

    let mut dense = DenseLinearSystem::new(mesh.num_nodes(), 1);
    let mut csr = CsrLinearSystem::from_mesh_parts(&mesh, &["block_1"], 1).unwrap();
    algorithm.execute(&mesh, &fields, &mut dense).unwrap();
    algorithm.par_execute(&mesh, &fields, &mut csr, 3).unwrap();

    assert_matrix_eq!(DMatrix::from(csr.matrix()), dense.matrix().clone(), comp = abs, tol = 1e-12);
    assert_matrix_eq!(csr.rhs().clone(), dense.rhs().clone(), comp = abs, tol = 1e-12);

    csr.zero();
    assert!(csr.matrix().values().iter().all(|&v| v == 0.0));
    assert!(csr.rhs().iter().all(|&v| v == 0.0));
}

#[test]
fn sums_of_entity_systems_match_global_system() {
    let (mesh, fields) = unit_box_with_fields(2);
    let algorithm = transport_algorithm(&mesh, &fields, "block_1");

    let mut expected = DenseLinearSystem::new(mesh.num_nodes(), 1);
    for entity in mesh.part("block_1").unwrap().entities() {
        let (lhs, rhs) = algorithm.execute_element(entity, &fields).unwrap();
        expected
            .sum_into(entity.nodes, (&lhs).into(), (&rhs).into())
            .unwrap();
    }
    let mut system = DenseLinearSystem::new(mesh.num_nodes(), 1);
    algorithm.execute(&mesh, &fields, &mut system).unwrap();
    assert_matrix_eq!(system.matrix().clone(), expected.matrix().clone(), comp = abs, tol = 1e-14);
}

#[test]
fn ghosted_entities_are_not_assembled() {
    let (mut mesh, fields) = unit_box_with_fields(2);
    let algorithm = transport_algorithm(&mesh, &fields, "block_1");
    let mut all = DenseLinearSystem::new(mesh.num_nodes(), 1);
    algorithm.execute(&mesh, &fields, &mut all).unwrap();

    let part = mesh.part("block_1").unwrap();
    let ghost = part.entity(0);
    let (ghost_lhs, _) = algorithm.execute_element(ghost, &fields).unwrap();
    let ghost_nodes = ghost.nodes.to_vec();
    mesh.part_mut("block_1").unwrap().set_owned(0, false);

    let mut owned = DenseLinearSystem::new(mesh.num_nodes(), 1);
    algorithm.par_execute(&mesh, &fields, &mut owned, 2).unwrap();

    let mut difference = all.matrix() - owned.matrix();
    for (a, &ga) in ghost_nodes.iter().enumerate() {
        for (b, &gb) in ghost_nodes.iter().enumerate() {
            difference[(ga, gb)] -= ghost_lhs[(a, b)];
        }
    }
    assert!(difference.amax() < 1e-12);
}

#[test]
fn algorithm_rejects_mismatched_parts_and_systems() {
    let (mesh, fields) = unit_box_with_fields(1);
    let algorithm = transport_algorithm(&mesh, &fields, "block_1");
    assert_eq!(algorithm.part_name(), "block_1");
    assert_eq!(algorithm.dofs_per_node(), 1);

    let mut vector_system = DenseLinearSystem::new(mesh.num_nodes(), 3);
    assert!(algorithm
        .execute(&mesh, &fields, &mut vector_system)
        .is_err());

    // A mesh whose part of the same name has a different topology
    let mut other = Mesh::from_coordinates(3, mesh.coordinates().to_vec());
    other
        .add_part("block_1", Topology::Tet4, vec![0, 1, 2, 4])
        .unwrap();
    let mut system = DenseLinearSystem::new(other.num_nodes(), 1);
    let err = algorithm
        .execute(&other, &fields, &mut system)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StagingError>(),
        Some(StagingError::TopologyMismatch { expected: Topology::Hex8, found: Topology::Tet4, .. })
    ));
}

#[test]
fn builder_rejects_kernels_for_another_topology() {
    let (mesh, fields) = unit_box_with_fields(1);
    let repository = MasterElementRepository::new();
    let options = SolutionOptions::default();
    let part = mesh.part("block_1").unwrap();
    // Kernels registered with a tetrahedral context on a hexahedral part
    let context = KernelContext::new(&fields, &options, &repository, Topology::Tet4);
    let mut builder = ElementSolverAlgorithmBuilder::new(part, 1);
    builder
        .add_kernel(|requirements| ScalarDiffFemKernel::new(&context, requirements, "temperature", "thermal_conductivity"))
        .unwrap();
    assert_eq!(
        builder.build().err(),
        Some(ConfigurationError::InconsistentTopology {
            expected: Topology::Hex8,
            found: Topology::Tet4,
        })
    );
}

#[test]
fn builder_rejects_kernels_with_other_dofs_per_node() {
    let (mesh, fields) = wall_fields(2.5, 1e-2);
    let repository = MasterElementRepository::new();
    let options = SolutionOptions::default();

    // A vector kernel in a scalar algorithm
    let wall = mesh.part("zmin").unwrap();
    let context = KernelContext::new(&fields, &options, &repository, wall.topology());
    let mut builder = ElementSolverAlgorithmBuilder::new(wall, 1);
    builder
        .add_kernel(|requirements| MomentumWallFunctionKernel::new(&context, requirements))
        .unwrap();
    assert_eq!(
        builder.build().err(),
        Some(ConfigurationError::DofMismatch {
            part: "zmin".to_string(),
            kernel: "MomentumWallFunctionKernel".to_string(),
            expected: 1,
            found: 3,
        })
    );

    // A scalar kernel in a vector algorithm
    let block = mesh.part("block_1").unwrap();
    let context = KernelContext::new(&fields, &options, &repository, block.topology());
    let mut builder = ElementSolverAlgorithmBuilder::new(block, 3);
    builder
        .add_kernel(|requirements| ScalarDiffFemKernel::new(&context, requirements, "temperature", "thermal_conductivity"))
        .unwrap();
    assert_eq!(
        builder.build().err(),
        Some(ConfigurationError::DofMismatch {
            part: "block_1".to_string(),
            kernel: "ScalarDiffFemKernel".to_string(),
            expected: 3,
            found: 1,
        })
    );
}

#[test]
fn csr_system_rejects_entities_outside_its_pattern() {
    let (mesh, _) = unit_box_with_fields(2);
    let mut csr = CsrLinearSystem::<f64>::from_mesh_parts(&mesh, &["xmin"], 1).unwrap();
    let lhs = DMatrix::repeat(2, 2, 1.0);
    let rhs = nalgebra::DVector::repeat(2, 1.0);
    // The nodes at both ends of the box are never coupled by faces of xmin
    let far = mesh.num_nodes() - 1;
    assert!(csr
        .sum_into(&[0, far], (&lhs).into(), (&rhs).into())
        .is_err());
    assert!(csr
        .sum_into(&[0, 0], (&lhs).into(), (&rhs).into())
        .is_err());
    let wrong_size = DMatrix::repeat(3, 3, 1.0);
    assert!(csr
        .sum_into(&[0, 1], (&wrong_size).into(), (&rhs).into())
        .is_err());
}
