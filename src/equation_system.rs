//! Ownership of the assembly algorithms of one equation system.
use crate::algorithm::{ElementSolverAlgorithm, ElementSolverAlgorithmBuilder};
use crate::error::ConfigurationError;
use crate::field::FieldRegistry;
use crate::linear_system::LinearSystem;
use crate::mesh::Mesh;
use crate::options::SolutionOptions;
use crate::time_integrator::TimeIntegrator;
use crate::wall::{ConvergenceReport, WallFrictionVelocityAlgorithm};
use crate::Real;
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlgorithmKind {
    /// Interior terms, such as advection, diffusion and time derivatives.
    Interior,
    /// Element source terms.
    SourceTerms,
    /// Boundary terms assembled on face parts.
    Boundary,
}

impl Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The algorithms of an equation system, keyed by kind and part.
///
/// Wall friction velocity algorithms are run before any assembly, since the momentum wall
/// kernels read their result.
pub struct EquationSystem<T: Real> {
    name: String,
    dofs_per_node: usize,
    options: SolutionOptions,
    algorithms: BTreeMap<(AlgorithmKind, String), ElementSolverAlgorithm<T>>,
    wall_algorithms: BTreeMap<String, WallFrictionVelocityAlgorithm<T>>,
}

impl<T: Real> EquationSystem<T> {
    pub fn new(name: &str, dofs_per_node: usize, options: SolutionOptions) -> Result<Self, ConfigurationError> {
        options.validate()?;
        Ok(Self {
            name: name.to_string(),
            dofs_per_node,
            options,
            algorithms: BTreeMap::new(),
            wall_algorithms: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &SolutionOptions {
        &self.options
    }

    pub fn algorithm(&self, kind: AlgorithmKind, part_name: &str) -> Option<&ElementSolverAlgorithm<T>> {
        self.algorithms.get(&(kind, part_name.to_string()))
    }

    pub fn num_algorithms(&self) -> usize {
        self.algorithms.len()
    }

    fn register(&mut self, kind: AlgorithmKind, builder: ElementSolverAlgorithmBuilder<T>) -> Result<(), ConfigurationError> {
        let key = (kind, builder.part_name().to_string());
        if self.algorithms.contains_key(&key) {
            return Err(ConfigurationError::DuplicateAlgorithm {
                kind: kind.to_string(),
                part: key.1,
            });
        }
        if builder.dofs_per_node() != self.dofs_per_node {
            return Err(ConfigurationError::InvalidOption {
                name: format!("{}.dofs_per_node", self.name),
                reason: format!(
                    "algorithm on part '{}' assembles {} dofs per node, but the equation system has {}",
                    key.1,
                    builder.dofs_per_node(),
                    self.dofs_per_node
                ),
            });
        }
        let algorithm = builder.build()?;
        debug!("Registered {} algorithm on part '{}' for '{}'", kind, key.1, self.name);
        self.algorithms.insert(key, algorithm);
        Ok(())
    }

    pub fn register_interior_algorithm(&mut self, builder: ElementSolverAlgorithmBuilder<T>) -> Result<(), ConfigurationError> {
        self.register(AlgorithmKind::Interior, builder)
    }

    /// Registers element-based source terms. These cannot be combined with an edge-based
    /// discretization, which is rejected before anything is built.
    pub fn register_element_source_terms(
        &mut self,
        builder: ElementSolverAlgorithmBuilder<T>,
    ) -> Result<(), ConfigurationError> {
        if self.options.edge_based {
            return Err(ConfigurationError::UnsupportedCombination {
                feature: "element source terms".to_string(),
                context: "edge-based discretization".to_string(),
            });
        }
        self.register(AlgorithmKind::SourceTerms, builder)
    }

    pub fn register_boundary_algorithm(&mut self, builder: ElementSolverAlgorithmBuilder<T>) -> Result<(), ConfigurationError> {
        self.register(AlgorithmKind::Boundary, builder)
    }

    pub fn register_wall_function(&mut self, algorithm: WallFrictionVelocityAlgorithm<T>) -> Result<(), ConfigurationError> {
        let part = algorithm.part_name().to_string();
        if self.wall_algorithms.contains_key(&part) {
            return Err(ConfigurationError::DuplicateAlgorithm {
                kind: "wall friction velocity".to_string(),
                part,
            });
        }
        self.wall_algorithms.insert(part, algorithm);
        Ok(())
    }

    /// Runs the wall friction velocity algorithms, then sets up and executes all assembly
    /// algorithms in key order.
    pub fn assemble<S: LinearSystem<T>>(
        &mut self,
        mesh: &Mesh<T>,
        fields: &mut FieldRegistry<T>,
        time_integrator: &TimeIntegrator<T>,
        system: &mut S,
    ) -> eyre::Result<ConvergenceReport> {
        let mut report = ConvergenceReport::default();
        for wall in self.wall_algorithms.values() {
            report.merge(&wall.execute(mesh, fields)?);
        }

        let chunk_size = self.options.parallel_chunk_size;
        for algorithm in self.algorithms.values_mut() {
            algorithm.setup(time_integrator);
            algorithm.par_execute(mesh, fields, system, chunk_size)?;
        }
        Ok(report)
    }
}
