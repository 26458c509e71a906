use fenris_kernels::error::ConfigurationError;
use fenris_kernels::field::EntityRank;
use fenris_kernels::mesh::procedural::{create_unit_box_uniform_hex_mesh, create_unit_square_uniform_quad_mesh};
use fenris_kernels::mesh::Mesh;
use fenris_kernels::topology::Topology;

#[test]
fn unit_box_has_block_and_boundary_parts() {
    let mesh = create_unit_box_uniform_hex_mesh::<f64>(2).unwrap();
    assert_eq!(mesh.spatial_dim(), 3);
    assert_eq!(mesh.num_nodes(), 27);
    assert_eq!(mesh.num_entities(EntityRank::Element), 8);
    assert_eq!(mesh.num_entities(EntityRank::Face), 24);

    let names: Vec<_> = mesh.parts().iter().map(|part| part.name()).collect();
    assert_eq!(names, ["block_1", "xmin", "xmax", "ymin", "ymax", "zmin", "zmax"]);

    let block = mesh.part("block_1").unwrap();
    assert_eq!(block.topology(), Topology::Hex8);
    assert_eq!(block.rank(), EntityRank::Element);

    // Face ids continue across boundary parts
    let xmin = mesh.part("xmin").unwrap();
    let xmax = mesh.part("xmax").unwrap();
    assert_eq!(xmin.rank(), EntityRank::Face);
    assert_eq!(xmin.entity(0).id, 0);
    assert_eq!(xmax.entity(0).id, 4);

    let coordinates = mesh.coordinates();
    for part in &mesh.parts()[1..] {
        assert_eq!(part.num_entities(), 4);
        assert_eq!(part.topology(), Topology::Quad4Face);
    }
    for face in xmin.entities() {
        assert!(face.nodes.iter().all(|&node| coordinates[3 * node] == 0.0));
    }
    for face in xmax.entities() {
        assert!(face.nodes.iter().all(|&node| coordinates[3 * node] == 1.0));
    }
}

#[test]
fn unit_square_has_line_boundaries() {
    let mesh = create_unit_square_uniform_quad_mesh::<f64>(3).unwrap();
    assert_eq!(mesh.num_nodes(), 16);
    assert_eq!(mesh.num_entities(EntityRank::Element), 9);
    assert_eq!(mesh.num_entities(EntityRank::Face), 12);
    let coordinates = mesh.coordinates();
    for face in mesh.part("top").unwrap().entities() {
        assert_eq!(face.nodes.len(), 2);
        assert!(face.nodes.iter().all(|&node| coordinates[2 * node + 1] == 1.0));
    }
}

#[test]
fn ownership_filters_entities() {
    let mut mesh = create_unit_square_uniform_quad_mesh::<f64>(2).unwrap();
    let part = mesh.part_mut("block_1").unwrap();
    part.set_owned(1, false);
    part.set_owned(3, false);

    let part = mesh.part("block_1").unwrap();
    let owned: Vec<_> = part.owned_entities().map(|entity| entity.id).collect();
    assert_eq!(owned, [0, 2]);
    assert_eq!(part.entities().count(), 4);
    assert!(!part.entity(1).owned);
}

#[test]
fn invalid_parts_are_rejected() {
    let mut mesh = Mesh::from_coordinates(2, vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
    mesh.add_part("block_1", Topology::Quad4, vec![0, 1, 2, 3])
        .unwrap();

    let invalid = [
        ("block_1", Topology::Quad4, vec![0, 1, 2, 3]),
        ("block_2", Topology::Quad4, vec![0, 1, 2]),
        ("block_3", Topology::Tri3, vec![0, 1, 4]),
        ("block_4", Topology::Hex8, vec![0, 1, 2, 3, 0, 1, 2, 3]),
    ];
    for (name, topology, connectivity) in invalid {
        assert!(matches!(
            mesh.add_part(name, topology, connectivity),
            Err(ConfigurationError::InvalidConnectivity { .. })
        ));
    }
    assert_eq!(mesh.parts().len(), 1);
    assert_eq!(
        mesh.part("missing").err(),
        Some(ConfigurationError::UnknownPart {
            name: "missing".to_string()
        })
    );
}
