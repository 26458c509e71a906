//! Per-part assembly driver.
//!
//! An algorithm is created through [`ElementSolverAlgorithmBuilder`], which collects kernels
//! and their requirements. Building finalizes the requirements and plans the scratch layout
//! once. The built [`ElementSolverAlgorithm`] then assembles every locally owned entity of its
//! part: stage, zero the local system, run all kernels in registration order and sum the local
//! system into the global one.
use crate::error::{ConfigurationError, StagingError};
use crate::field::FieldRegistry;
use crate::kernel::Kernel;
use crate::layout::ScratchLayout;
use crate::linear_system::LinearSystem;
use crate::mesh::{EntityRef, Mesh, Part};
use crate::requests::{DataRequirementSet, FinalizedRequirements};
use crate::scratch::ElementScratch;
use crate::stager::ElementStager;
use crate::time_integrator::TimeIntegrator;
use crate::topology::Topology;
use crate::Real;
use eyre::WrapErr;
use log::info;
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use rayon::prelude::*;
use std::cell::RefCell;
use thread_local::ThreadLocal;

pub struct ElementSolverAlgorithmBuilder<T: Real> {
    part_name: String,
    topology: Topology,
    dofs_per_node: usize,
    requirements: DataRequirementSet<T>,
    kernels: Vec<Box<dyn Kernel<T>>>,
    kernel_names: Vec<&'static str>,
}

impl<T: Real> ElementSolverAlgorithmBuilder<T> {
    pub fn new(part: &Part, dofs_per_node: usize) -> Self {
        Self {
            part_name: part.name().to_string(),
            topology: part.topology(),
            dofs_per_node,
            requirements: DataRequirementSet::new(),
            kernels: Vec::new(),
            kernel_names: Vec::new(),
        }
    }

    pub fn part_name(&self) -> &str {
        &self.part_name
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn dofs_per_node(&self) -> usize {
        self.dofs_per_node
    }

    /// Constructs a kernel, letting it register its requirements.
    pub fn add_kernel<K, E, F>(&mut self, constructor: F) -> eyre::Result<&mut Self>
    where
        K: Kernel<T> + 'static,
        E: Into<eyre::Report>,
        F: FnOnce(&mut DataRequirementSet<T>) -> Result<K, E>,
    {
        let kernel = constructor(&mut self.requirements).map_err(Into::into)?;
        self.kernels.push(Box::new(kernel));
        self.kernel_names.push(kernel_name::<K>());
        Ok(self)
    }

    pub fn num_kernels(&self) -> usize {
        self.kernels.len()
    }

    pub fn build(self) -> Result<ElementSolverAlgorithm<T>, ConfigurationError> {
        for (kernel, name) in self.kernels.iter().zip(&self.kernel_names) {
            if kernel.dofs_per_node() != self.dofs_per_node {
                return Err(ConfigurationError::DofMismatch {
                    part: self.part_name.clone(),
                    kernel: name.to_string(),
                    expected: self.dofs_per_node,
                    found: kernel.dofs_per_node(),
                });
            }
        }
        let requirements = self.requirements.finalize()?;
        if requirements.topology() != self.topology {
            return Err(ConfigurationError::InconsistentTopology {
                expected: self.topology,
                found: requirements.topology(),
            });
        }
        let layout = ScratchLayout::plan(&requirements);
        info!(
            "Built element solver algorithm on part '{}' ({:?}) with {} kernels, {} scratch buffers \
             and {} scalars per entity",
            self.part_name,
            self.topology,
            self.kernels.len(),
            layout.num_buffers(),
            layout.total_len()
        );
        Ok(ElementSolverAlgorithm {
            part_name: self.part_name,
            dofs_per_node: self.dofs_per_node,
            requirements,
            layout,
            kernels: self.kernels,
            workspace: ThreadLocal::new(),
        })
    }
}

/// Type name of a kernel without its module path and generic arguments.
fn kernel_name<K>() -> &'static str {
    let full = std::any::type_name::<K>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Reusable buffers of one worker.
struct Workspace<T: Real> {
    scratch: ElementScratch<T>,
    lhs: DMatrix<T>,
    rhs: DVector<T>,
}

impl<T: Real> Workspace<T> {
    fn new(layout: &ScratchLayout, local_size: usize) -> Self {
        Self {
            scratch: ElementScratch::new(layout),
            lhs: DMatrix::zeros(local_size, local_size),
            rhs: DVector::zeros(local_size),
        }
    }
}

pub struct ElementSolverAlgorithm<T: Real> {
    part_name: String,
    dofs_per_node: usize,
    requirements: FinalizedRequirements<T>,
    layout: ScratchLayout,
    kernels: Vec<Box<dyn Kernel<T>>>,
    workspace: ThreadLocal<RefCell<Workspace<T>>>,
}

impl<T: Real> ElementSolverAlgorithm<T> {
    pub fn part_name(&self) -> &str {
        &self.part_name
    }

    pub fn requirements(&self) -> &FinalizedRequirements<T> {
        &self.requirements
    }

    pub fn layout(&self) -> &ScratchLayout {
        &self.layout
    }

    pub fn dofs_per_node(&self) -> usize {
        self.dofs_per_node
    }

    pub fn num_kernels(&self) -> usize {
        self.kernels.len()
    }

    fn local_size(&self) -> usize {
        self.requirements.sizing().nodes_per_entity * self.dofs_per_node
    }

    /// Refreshes all kernels for the next time step.
    pub fn setup(&mut self, time_integrator: &TimeIntegrator<T>) {
        for kernel in &mut self.kernels {
            kernel.setup(time_integrator);
        }
    }

    fn part<'m>(&self, mesh: &'m Mesh<T>) -> eyre::Result<&'m Part> {
        let part = mesh.part(&self.part_name)?;
        if part.topology() != self.requirements.topology() {
            return Err(StagingError::TopologyMismatch {
                part: self.part_name.clone(),
                expected: self.requirements.topology(),
                found: part.topology(),
            }
            .into());
        }
        Ok(part)
    }

    fn check_system<S: LinearSystem<T>>(&self, system: &S) -> eyre::Result<()> {
        if system.dofs_per_node() != self.dofs_per_node {
            return Err(eyre::eyre!(
                "Algorithm on part '{}' assembles {} dofs per node, but the linear system has {}",
                self.part_name,
                self.dofs_per_node,
                system.dofs_per_node()
            ));
        }
        Ok(())
    }

    fn assemble_entity(
        &self,
        entity: EntityRef<'_>,
        fields: &FieldRegistry<T>,
        workspace: &mut Workspace<T>,
    ) -> eyre::Result<()> {
        let Workspace { scratch, lhs, rhs } = workspace;
        let stager = ElementStager::new(&self.requirements, &self.layout);
        stager
            .stage(entity, fields, scratch)
            .wrap_err_with(|| format!("Failed to stage entity {} of part '{}'", entity.id, self.part_name))?;

        let local_size = self.local_size();
        lhs.resize_mut(local_size, local_size, T::zero());
        rhs.resize_vertically_mut(local_size, T::zero());
        lhs.fill(T::zero());
        rhs.fill(T::zero());

        let views = scratch.views(&self.layout);
        for kernel in &self.kernels {
            kernel.execute(DMatrixViewMut::from(&mut *lhs), DVectorViewMut::from(&mut *rhs), &views)?;
        }
        Ok(())
    }

    /// Assembles a single entity and returns its local system.
    pub fn execute_element(
        &self,
        entity: EntityRef<'_>,
        fields: &FieldRegistry<T>,
    ) -> eyre::Result<(DMatrix<T>, DVector<T>)> {
        let mut workspace = Workspace::new(&self.layout, self.local_size());
        self.assemble_entity(entity, fields, &mut workspace)?;
        Ok((workspace.lhs, workspace.rhs))
    }

    /// Assembles all locally owned entities of the part, one after another.
    pub fn execute<S: LinearSystem<T>>(
        &self,
        mesh: &Mesh<T>,
        fields: &FieldRegistry<T>,
        system: &mut S,
    ) -> eyre::Result<()> {
        self.check_system(system)?;
        let part = self.part(mesh)?;
        let mut workspace = self
            .workspace
            .get_or(|| RefCell::new(Workspace::new(&self.layout, self.local_size())))
            .borrow_mut();
        for entity in part.owned_entities() {
            self.assemble_entity(entity, fields, &mut workspace)?;
            system.sum_into(
                entity.nodes,
                DMatrixView::from(&workspace.lhs),
                DVectorView::from(&workspace.rhs),
            )?;
        }
        Ok(())
    }

    /// Assembles all locally owned entities in parallel.
    ///
    /// Entities are processed in windows of `chunk_size` entities per rayon thread. The local
    /// systems of a window are computed in parallel into one reused buffer, then summed into
    /// `system` in entity order before the next window starts. The result is identical to
    /// [`execute`].
    ///
    /// [`execute`]: Self::execute
    pub fn par_execute<S: LinearSystem<T>>(
        &self,
        mesh: &Mesh<T>,
        fields: &FieldRegistry<T>,
        system: &mut S,
        chunk_size: usize,
    ) -> eyre::Result<()> {
        self.check_system(system)?;
        let part = self.part(mesh)?;
        let entities: Vec<EntityRef<'_>> = part.owned_entities().collect();

        let chunk_size = chunk_size.max(1);
        let window_size = chunk_size * rayon::current_num_threads().max(1);
        let local_size = self.local_size();
        let lhs_len = local_size * local_size;
        let stride = lhs_len + local_size;
        let mut local_systems = Vec::new();

        for window in entities.chunks(window_size) {
            local_systems.resize(window.len() * stride, T::zero());
            local_systems
                .par_chunks_mut(chunk_size * stride)
                .zip(window.par_chunks(chunk_size))
                .try_for_each(|(output, chunk)| -> eyre::Result<()> {
                    let mut workspace = self
                        .workspace
                        .get_or(|| RefCell::new(Workspace::new(&self.layout, local_size)))
                        .borrow_mut();
                    for (&entity, local) in chunk.iter().zip(output.chunks_exact_mut(stride)) {
                        self.assemble_entity(entity, fields, &mut workspace)?;
                        let (lhs, rhs) = local.split_at_mut(lhs_len);
                        lhs.copy_from_slice(workspace.lhs.as_slice());
                        rhs.copy_from_slice(workspace.rhs.as_slice());
                    }
                    Ok(())
                })?;

            for (entity, local) in window.iter().zip(local_systems.chunks_exact(stride)) {
                let (lhs, rhs) = local.split_at(lhs_len);
                system.sum_into(
                    entity.nodes,
                    DMatrixView::from_slice(lhs, local_size, local_size),
                    DVectorView::from_slice(rhs, local_size),
                )?;
            }
        }
        Ok(())
    }
}
