use fenris_kernels::field::{EntityRank, FieldRegistry};
use fenris_kernels::mesh::procedural::create_unit_box_uniform_hex_mesh;
use fenris_kernels::mesh::Mesh;

mod algorithm;
mod master_element;
mod mesh;
mod nodal;
mod time_integrator;

/// Unit box of `cells^3` hexahedra with the fields used by the scalar transport kernels.
///
/// Temperature and density carry three states. All fields are set to simple, non-constant
/// functions of the node coordinates.
pub fn unit_box_with_fields(cells: usize) -> (Mesh<f64>, FieldRegistry<f64>) {
    let mesh = create_unit_box_uniform_hex_mesh(cells).unwrap();
    let mut fields = FieldRegistry::with_coordinates(&mesh, "coordinates").unwrap();
    let x = mesh.coordinates().to_vec();
    let point = |node: usize| [x[3 * node], x[3 * node + 1], x[3 * node + 2]];

    let temperature = fields
        .declare_field("temperature", EntityRank::Node, 1, 1, 3)
        .unwrap();
    fields.fill_with(&temperature, |node, v| {
        let [x, y, z] = point(node);
        v[0] = 1.0 + x + 2.0 * y * y - 0.5 * z;
    });

    let conductivity = fields
        .declare_field("thermal_conductivity", EntityRank::Node, 1, 1, 1)
        .unwrap();
    fields.fill_with(&conductivity, |node, v| v[0] = 1.0 + 0.25 * point(node)[0]);

    let density = fields
        .declare_field("density", EntityRank::Node, 1, 1, 3)
        .unwrap();
    fields.fill(&density, 1.2);

    let velocity = fields
        .declare_field("velocity", EntityRank::Node, 3, 1, 1)
        .unwrap();
    fields.fill_with(&velocity, |node, v| {
        let [x, y, z] = point(node);
        v.copy_from_slice(&[1.0 + y, -0.5 * x, 0.25 + z * x]);
    });

    let viscosity = fields
        .declare_field("viscosity", EntityRank::Node, 1, 1, 1)
        .unwrap();
    fields.fill(&viscosity, 1e-3);

    (mesh, fields)
}
