//! Mesh topology: node coordinates and parts of elements or faces.
//!
//! Every part holds entities of a single topology. Entity ids are numbered per rank across all
//! parts, so element and face fields can be indexed directly by id.
use crate::error::ConfigurationError;
use crate::field::EntityRank;
use crate::topology::Topology;
use crate::Real;

pub mod procedural;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    name: String,
    topology: Topology,
    rank: EntityRank,
    ids: Vec<usize>,
    connectivity: Vec<usize>,
    owned: Vec<bool>,
}

/// A single element or face of a part.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntityRef<'a> {
    pub id: usize,
    pub nodes: &'a [usize],
    pub owned: bool,
}

impl Part {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn rank(&self) -> EntityRank {
        self.rank
    }

    pub fn num_entities(&self) -> usize {
        self.ids.len()
    }

    pub fn entity(&self, index: usize) -> EntityRef<'_> {
        let n = self.topology.num_nodes();
        EntityRef {
            id: self.ids[index],
            nodes: &self.connectivity[n * index..n * (index + 1)],
            owned: self.owned[index],
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityRef<'_>> + '_ {
        (0..self.num_entities()).map(move |index| self.entity(index))
    }

    /// Entities owned by this process, in part order.
    pub fn owned_entities(&self) -> impl Iterator<Item = EntityRef<'_>> + '_ {
        self.entities().filter(|entity| entity.owned)
    }

    /// Marks an entity as owned or ghosted.
    pub fn set_owned(&mut self, index: usize, owned: bool) {
        self.owned[index] = owned;
    }
}

#[derive(Debug, Clone)]
pub struct Mesh<T> {
    spatial_dim: usize,
    coordinates: Vec<T>,
    num_elements: usize,
    num_faces: usize,
    parts: Vec<Part>,
}

impl<T: Real> Mesh<T> {
    /// Creates a mesh without parts from node-major coordinates.
    pub fn from_coordinates(spatial_dim: usize, coordinates: Vec<T>) -> Self {
        assert!(spatial_dim == 2 || spatial_dim == 3, "Only 2D and 3D meshes are supported");
        assert_eq!(coordinates.len() % spatial_dim, 0);
        Self {
            spatial_dim,
            coordinates,
            num_elements: 0,
            num_faces: 0,
            parts: Vec::new(),
        }
    }

    pub fn spatial_dim(&self) -> usize {
        self.spatial_dim
    }

    pub fn num_nodes(&self) -> usize {
        self.coordinates.len() / self.spatial_dim
    }

    pub fn coordinates(&self) -> &[T] {
        &self.coordinates
    }

    pub fn num_entities(&self, rank: EntityRank) -> usize {
        match rank {
            EntityRank::Node => self.num_nodes(),
            EntityRank::Element => self.num_elements,
            EntityRank::Face => self.num_faces,
        }
    }

    /// Adds a part. All entities are locally owned and receive consecutive ids of their rank.
    pub fn add_part(
        &mut self,
        name: &str,
        topology: Topology,
        connectivity: Vec<usize>,
    ) -> Result<&mut Part, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidConnectivity {
            part: name.to_string(),
            reason,
        };
        if self.parts.iter().any(|part| part.name == name) {
            return Err(invalid("a part with this name already exists".to_string()));
        }
        if topology.spatial_dim() != self.spatial_dim {
            return Err(invalid(format!(
                "{:?} entities cannot live in a {}D mesh",
                topology, self.spatial_dim
            )));
        }
        let n = topology.num_nodes();
        if connectivity.len() % n != 0 {
            return Err(invalid(format!(
                "length {} is not a multiple of {} nodes",
                connectivity.len(),
                n
            )));
        }
        if let Some(&node) = connectivity.iter().find(|&&node| node >= self.num_nodes()) {
            return Err(invalid(format!("node {} is out of bounds", node)));
        }

        let count = connectivity.len() / n;
        let (rank, counter) = if topology.is_face() {
            (EntityRank::Face, &mut self.num_faces)
        } else {
            (EntityRank::Element, &mut self.num_elements)
        };
        let ids = (*counter..*counter + count).collect();
        *counter += count;

        self.parts.push(Part {
            name: name.to_string(),
            topology,
            rank,
            ids,
            connectivity,
            owned: vec![true; count],
        });
        Ok(self.parts.last_mut().expect("A part was just pushed"))
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, name: &str) -> Result<&Part, ConfigurationError> {
        self.parts
            .iter()
            .find(|part| part.name == name)
            .ok_or_else(|| ConfigurationError::UnknownPart { name: name.to_string() })
    }

    pub fn part_mut(&mut self, name: &str) -> Result<&mut Part, ConfigurationError> {
        self.parts
            .iter_mut()
            .find(|part| part.name == name)
            .ok_or_else(|| ConfigurationError::UnknownPart { name: name.to_string() })
    }
}
