//! Procedurally generated meshes on the unit square and unit box.
use crate::error::ConfigurationError;
use crate::mesh::Mesh;
use crate::topology::Topology;
use crate::Real;

/// Uniform quadrilateral mesh of `[0, 1]^2` with block `block_1` and boundary parts `left`,
/// `right`, `bottom` and `top` (outward-oriented `Line2Face` entities).
pub fn create_unit_square_uniform_quad_mesh<T>(cells_per_dim: usize) -> Result<Mesh<T>, ConfigurationError>
where
    T: Real,
{
    create_rectangular_uniform_quad_mesh(T::one(), cells_per_dim, cells_per_dim)
}

/// Uniform hexahedral mesh of `[0, 1]^3` with block `block_1` and boundary parts `xmin`,
/// `xmax`, `ymin`, `ymax`, `zmin` and `zmax` (outward-oriented `Quad4Face` entities).
pub fn create_unit_box_uniform_hex_mesh<T>(cells_per_dim: usize) -> Result<Mesh<T>, ConfigurationError>
where
    T: Real,
{
    create_rectangular_uniform_hex_mesh(T::one(), cells_per_dim, cells_per_dim, cells_per_dim)
}

/// Generates an axis-aligned rectangular mesh with `cells_x * cells_y` square cells of side
/// `domain_size / cells_x`, with the lower-left corner at the origin.
pub fn create_rectangular_uniform_quad_mesh<T>(
    domain_size: T,
    cells_x: usize,
    cells_y: usize,
) -> Result<Mesh<T>, ConfigurationError>
where
    T: Real,
{
    let cell_size = domain_size / T::from_usize(cells_x.max(1)).expect("Must be able to fit usize in T");
    let num_vertices_x = cells_x + 1;
    let to_global_vertex_index = |i: usize, j: usize| num_vertices_x * j + i;

    let mut coordinates = Vec::new();
    for j in 0..=cells_y {
        for i in 0..=cells_x {
            coordinates.push(T::from_usize(i).expect("Must be able to fit usize in T") * cell_size);
            coordinates.push(T::from_usize(j).expect("Must be able to fit usize in T") * cell_size);
        }
    }

    let mut cells = Vec::new();
    for j in 0..cells_y {
        for i in 0..cells_x {
            cells.extend_from_slice(&[
                to_global_vertex_index(i, j),
                to_global_vertex_index(i + 1, j),
                to_global_vertex_index(i + 1, j + 1),
                to_global_vertex_index(i, j + 1),
            ]);
        }
    }

    let side_nodes = |cell: &[usize], side: usize| -> Vec<usize> {
        Topology::Quad4.sides()[side].iter().map(|&a| cell[a]).collect()
    };
    let mut sides: [Vec<usize>; 4] = Default::default();
    for (index, cell) in cells.chunks_exact(4).enumerate() {
        let (i, j) = (index % cells_x, index / cells_x);
        if j == 0 {
            sides[0].extend(side_nodes(cell, 0));
        }
        if i + 1 == cells_x {
            sides[1].extend(side_nodes(cell, 1));
        }
        if j + 1 == cells_y {
            sides[2].extend(side_nodes(cell, 2));
        }
        if i == 0 {
            sides[3].extend(side_nodes(cell, 3));
        }
    }

    let mut mesh = Mesh::from_coordinates(2, coordinates);
    mesh.add_part("block_1", Topology::Quad4, cells)?;
    let [bottom, right, top, left] = sides;
    mesh.add_part("bottom", Topology::Line2Face, bottom)?;
    mesh.add_part("right", Topology::Line2Face, right)?;
    mesh.add_part("top", Topology::Line2Face, top)?;
    mesh.add_part("left", Topology::Line2Face, left)?;
    Ok(mesh)
}

/// Generates an axis-aligned box mesh with cubic cells of side `domain_size / cells_x`.
pub fn create_rectangular_uniform_hex_mesh<T>(
    domain_size: T,
    cells_x: usize,
    cells_y: usize,
    cells_z: usize,
) -> Result<Mesh<T>, ConfigurationError>
where
    T: Real,
{
    let cell_size = domain_size / T::from_usize(cells_x.max(1)).expect("Must be able to fit usize in T");
    let num_vertices_x = cells_x + 1;
    let num_vertices_y = cells_y + 1;
    let to_global_vertex_index =
        |i: usize, j: usize, k: usize| (num_vertices_x * num_vertices_y) * k + num_vertices_x * j + i;

    let mut coordinates = Vec::new();
    for k in 0..=cells_z {
        for j in 0..=cells_y {
            for i in 0..=cells_x {
                for index in [i, j, k] {
                    coordinates.push(T::from_usize(index).expect("Must be able to fit usize in T") * cell_size);
                }
            }
        }
    }

    let mut cells = Vec::new();
    // Side lists in the order of `Topology::Hex8.sides()`: ymin, xmax, ymax, xmin, zmin, zmax
    let mut sides: [Vec<usize>; 6] = Default::default();
    for k in 0..cells_z {
        for j in 0..cells_y {
            for i in 0..cells_x {
                let idx = &to_global_vertex_index;
                let cell = [
                    idx(i, j, k),
                    idx(i + 1, j, k),
                    idx(i + 1, j + 1, k),
                    idx(i, j + 1, k),
                    idx(i, j, k + 1),
                    idx(i + 1, j, k + 1),
                    idx(i + 1, j + 1, k + 1),
                    idx(i, j + 1, k + 1),
                ];
                let on_boundary = [
                    j == 0,
                    i + 1 == cells_x,
                    j + 1 == cells_y,
                    i == 0,
                    k == 0,
                    k + 1 == cells_z,
                ];
                for (side, _) in on_boundary.iter().enumerate().filter(|(_, b)| **b) {
                    sides[side].extend(Topology::Hex8.sides()[side].iter().map(|&a| cell[a]));
                }
                cells.extend_from_slice(&cell);
            }
        }
    }

    let mut mesh = Mesh::from_coordinates(3, coordinates);
    mesh.add_part("block_1", Topology::Hex8, cells)?;
    let [ymin, xmax, ymax, xmin, zmin, zmax] = sides;
    for (name, connectivity) in [
        ("xmin", xmin),
        ("xmax", xmax),
        ("ymin", ymin),
        ("ymax", ymax),
        ("zmin", zmin),
        ("zmax", zmax),
    ] {
        mesh.add_part(name, Topology::Quad4Face, connectivity)?;
    }
    Ok(mesh)
}
