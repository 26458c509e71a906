//! Placement of gathered fields and geometric operators in a flat scratch buffer.
use crate::catalog::{ImplicitRequest, OperatorRequest};
use crate::requests::{FinalizedRequirements, GatherKey, SCRATCH_PADDING};
use crate::Real;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;

/// Identifies one buffer of the scratch layout.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BufferKey {
    Gather(GatherKey),
    Implicit(ImplicitRequest),
    Operator(OperatorRequest),
}

impl Display for BufferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKey::Gather(key) => write!(f, "gather of {} ({:?}, {}x{})", key.field, key.rank, key.dim1, key.dim2),
            BufferKey::Implicit(implicit) => write!(
                f,
                "{:?} of {} ({:?}, {:?})",
                implicit.kind, implicit.coordinates, implicit.family, implicit.variant
            ),
            BufferKey::Operator(request) => write!(f, "{}", request),
        }
    }
}

/// A contiguous range of the scratch buffer holding a row-major array of `shape`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Slot {
    pub offset: usize,
    pub len: usize,
    pub shape: [usize; 3],
}

impl Slot {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Offsets of all buffers of one requirement set.
///
/// Gathers come first, in key order, followed by the geometry of each coordinate field. Every
/// operator is placed after the implicit buffers it is computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchLayout {
    slots: BTreeMap<BufferKey, Slot>,
    order: Vec<BufferKey>,
    total_len: usize,
}

impl ScratchLayout {
    pub fn plan<T: Real>(requirements: &FinalizedRequirements<T>) -> Self {
        let sizing = requirements.sizing();
        let mut offset = 0;
        let mut slots = BTreeMap::new();
        let mut order = Vec::new();
        for key in requirements.buffer_keys() {
            let shape = sizing.shape(&key);
            let len = shape.iter().product();
            slots.insert(key.clone(), Slot { offset, len, shape });
            order.push(key);
            offset += len;
        }
        Self {
            slots,
            order,
            total_len: offset + SCRATCH_PADDING,
        }
    }

    pub fn slot(&self, key: &BufferKey) -> Option<&Slot> {
        self.slots.get(key)
    }

    /// Buffers in placement order.
    pub fn buffers(&self) -> impl Iterator<Item = (&BufferKey, &Slot)> {
        self.order.iter().map(move |key| (key, &self.slots[key]))
    }

    pub fn num_buffers(&self) -> usize {
        self.order.len()
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }
}
