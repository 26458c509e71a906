//! Per-entity scratch storage and read-only views into it.
use crate::catalog::{ImplicitKind, ImplicitRequest, OperatorKind, OperatorRequest};
use crate::error::StagingError;
use crate::layout::{BufferKey, ScratchLayout, Slot};
use crate::requests::GatherKey;
use crate::Real;

/// The staged data of the entity currently being assembled.
///
/// One instance is allocated per worker with the length of the layout and reused for every
/// entity. Nothing in it outlives the assembly of a single entity.
#[derive(Debug, Clone)]
pub struct ElementScratch<T> {
    data: Vec<T>,
    nodes: Vec<usize>,
    entity: usize,
}

impl<T: Real> ElementScratch<T> {
    pub fn new(layout: &ScratchLayout) -> Self {
        Self {
            data: vec![T::zero(); layout.total_len()],
            nodes: Vec::new(),
            entity: 0,
        }
    }

    /// Makes sure the buffer fits `layout`, reallocating only if it has grown.
    pub fn prepare(&mut self, layout: &ScratchLayout, entity: usize, nodes: &[usize]) {
        if self.data.len() != layout.total_len() {
            self.data.resize(layout.total_len(), T::zero());
        }
        self.entity = entity;
        self.nodes.clear();
        self.nodes.extend_from_slice(nodes);
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn entity(&self) -> usize {
        self.entity
    }

    pub fn views<'a>(&'a self, layout: &'a ScratchLayout) -> ScratchViews<'a, T> {
        ScratchViews { scratch: self, layout }
    }
}

/// Row-major view of one staged buffer.
#[derive(Debug, Copy, Clone)]
pub struct View<'a, T> {
    data: &'a [T],
    shape: [usize; 3],
}

impl<'a, T: Real> View<'a, T> {
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    pub fn at(&self, i: usize) -> T {
        self.data[i]
    }

    pub fn at2(&self, i: usize, j: usize) -> T {
        self.data[i * self.shape[1] + j]
    }

    pub fn at3(&self, i: usize, j: usize, k: usize) -> T {
        self.data[(i * self.shape[1] + j) * self.shape[2] + k]
    }

    /// The sub-array at the leading index `i`.
    pub fn row(&self, i: usize) -> &'a [T] {
        let stride = self.shape[1] * self.shape[2];
        &self.data[i * stride..(i + 1) * stride]
    }
}

/// Access to the staged buffers of one entity, by the keys kernels received at registration.
#[derive(Debug, Copy, Clone)]
pub struct ScratchViews<'a, T> {
    scratch: &'a ElementScratch<T>,
    layout: &'a ScratchLayout,
}

impl<'a, T: Real> ScratchViews<'a, T> {
    fn view(&self, key: &BufferKey) -> Result<View<'a, T>, StagingError> {
        let &Slot { offset, len, shape } = self
            .layout
            .slot(key)
            .ok_or_else(|| StagingError::MissingBuffer { buffer: key.to_string() })?;
        Ok(View {
            data: &self.scratch.data[offset..offset + len],
            shape,
        })
    }

    pub fn gather(&self, key: &GatherKey) -> Result<View<'a, T>, StagingError> {
        self.view(&BufferKey::Gather(key.clone()))
    }

    /// The result of a geometric operator. Determinant operators resolve to the shared
    /// determinant buffer of their family and variant.
    pub fn operator(&self, request: &OperatorRequest) -> Result<View<'a, T>, StagingError> {
        match request.kind {
            OperatorKind::FemDetJ | OperatorKind::FaceDetJ => self.implicit(request, ImplicitKind::Determinants),
            _ => self.view(&BufferKey::Operator(request.clone())),
        }
    }

    fn implicit(&self, request: &OperatorRequest, kind: ImplicitKind) -> Result<View<'a, T>, StagingError> {
        self.view(&BufferKey::Implicit(ImplicitRequest {
            coordinates: request.coordinates.clone(),
            family: request.family,
            variant: request.variant,
            kind,
        }))
    }

    /// Reference shape function derivatives used by `request`.
    pub fn derivatives(&self, request: &OperatorRequest) -> Result<View<'a, T>, StagingError> {
        self.implicit(request, ImplicitKind::Derivatives)
    }

    pub fn determinants(&self, request: &OperatorRequest) -> Result<View<'a, T>, StagingError> {
        self.implicit(request, ImplicitKind::Determinants)
    }

    /// Global node ids of the entity, in local order.
    pub fn nodes(&self) -> &'a [usize] {
        &self.scratch.nodes
    }

    pub fn entity(&self) -> usize {
        self.scratch.entity
    }
}
