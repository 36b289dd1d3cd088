//! Generational handles and element pools.
//!
//! Mesh elements are identified by 64-bit handles: a 32-bit slot index plus
//! a 32-bit generation counter. Freeing a slot bumps its generation, so a
//! handle held across a deletion goes stale instead of silently aliasing
//! whatever gets allocated into the slot next.
//!
//! Pools are free-list allocators. Allocation always reuses the lowest free
//! index, which keeps iteration order stable for external code that wants to
//! persist mesh state by enumeration.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::{self, Debug};

use crate::error::{MeshError, Result};

/// Common interface of the typed element handles.
pub trait ElementHandle: Copy + Eq + Debug {
    /// The element kind name, used in error messages.
    const KIND: &'static str;

    /// Build a handle from a slot index and generation.
    fn from_parts(index: u32, generation: u32) -> Self;

    /// The slot index.
    fn index(self) -> usize;

    /// The generation the handle was minted with.
    fn generation(self) -> u32;

    /// The invalid sentinel handle.
    fn invalid() -> Self;

    /// Check against the sentinel. Says nothing about liveness; ask the pool.
    fn is_valid(self) -> bool;
}

macro_rules! impl_handle_type {
    ($name:ident, $display:literal, $kind:literal) => {
        impl $name {
            /// Create a handle from raw parts.
            #[inline]
            pub fn new(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            /// The invalid sentinel handle.
            #[inline]
            pub const INVALID: Self = Self {
                index: u32::MAX,
                generation: 0,
            };
        }

        impl ElementHandle for $name {
            const KIND: &'static str = $kind;

            #[inline]
            fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            #[inline]
            fn index(self) -> usize {
                self.index as usize
            }

            #[inline]
            fn generation(self) -> u32 {
                self.generation
            }

            #[inline]
            fn invalid() -> Self {
                Self::INVALID
            }

            #[inline]
            fn is_valid(self) -> bool {
                self.index != u32::MAX
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if ElementHandle::is_valid(*self) {
                    write!(f, "{}({})", $display, self.index)
                } else {
                    write!(f, "{}(INVALID)", $display)
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }
    };
}

/// Handle to a vertex.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VertexHandle {
    index: u32,
    generation: u32,
}

/// Handle to a directed half-edge.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct HalfEdgeHandle {
    index: u32,
    generation: u32,
}

/// Handle to a full (undirected) edge.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EdgeHandle {
    index: u32,
    generation: u32,
}

/// Handle to a face.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FaceHandle {
    index: u32,
    generation: u32,
}

impl_handle_type!(VertexHandle, "V", "vertex");
impl_handle_type!(HalfEdgeHandle, "HE", "half-edge");
impl_handle_type!(EdgeHandle, "E", "edge");
impl_handle_type!(FaceHandle, "F", "face");

/// A handle to any mesh element, for selection-set operators that accept
/// mixed element kinds.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Element {
    /// A vertex.
    Vertex(VertexHandle),
    /// A half-edge.
    HalfEdge(HalfEdgeHandle),
    /// A full edge.
    Edge(EdgeHandle),
    /// A face.
    Face(FaceHandle),
}

#[derive(Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Free-list allocator for one element kind.
///
/// Slots are never shrunk; freed slots are tombstoned and handed out again
/// at the next allocation, lowest index first.
#[derive(Clone)]
pub struct Pool<H: ElementHandle, T> {
    slots: Vec<Slot<T>>,
    free: BinaryHeap<Reverse<u32>>,
    live: usize,
    _marker: std::marker::PhantomData<H>,
}

impl<H: ElementHandle, T> Default for Pool<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ElementHandle, T> Pool<H, T> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: BinaryHeap::new(),
            live: 0,
            _marker: std::marker::PhantomData,
        }
    }

    /// Number of live elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// True if no elements are live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots ever allocated (live + tombstoned). Streams are sized
    /// to this.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Allocate a slot for `value`, reusing the lowest free index.
    pub fn allocate(&mut self, value: T) -> H {
        if let Some(Reverse(index)) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            self.live += 1;
            H::from_parts(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            self.live += 1;
            H::from_parts(index, 0)
        }
    }

    /// Free the slot behind `handle`, bumping its generation.
    ///
    /// Returns the stored value, or `StaleHandle` if the handle is dead.
    pub fn free(&mut self, handle: H) -> Result<T> {
        let index = handle.index();
        let slot = self
            .slots
            .get_mut(index)
            .filter(|s| s.generation == handle.generation() && s.value.is_some())
            .ok_or(MeshError::StaleHandle {
                kind: H::KIND,
                index: index as u32,
            })?;
        let value = slot.value.take().expect("checked above");
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(Reverse(index as u32));
        self.live -= 1;
        Ok(value)
    }

    /// Check whether `handle` refers to a live element.
    #[inline]
    pub fn is_valid(&self, handle: H) -> bool {
        self.slots
            .get(handle.index())
            .map(|s| s.generation == handle.generation() && s.value.is_some())
            .unwrap_or(false)
    }

    /// Borrow the element behind `handle`.
    pub fn get(&self, handle: H) -> Result<&T> {
        self.slots
            .get(handle.index())
            .filter(|s| s.generation == handle.generation())
            .and_then(|s| s.value.as_ref())
            .ok_or(MeshError::StaleHandle {
                kind: H::KIND,
                index: handle.index() as u32,
            })
    }

    /// Mutably borrow the element behind `handle`.
    pub fn get_mut(&mut self, handle: H) -> Result<&mut T> {
        self.slots
            .get_mut(handle.index())
            .filter(|s| s.generation == handle.generation())
            .and_then(|s| s.value.as_mut())
            .ok_or(MeshError::StaleHandle {
                kind: H::KIND,
                index: handle.index() as u32,
            })
    }

    /// Borrow by raw index, ignoring generations. Internal traversal only.
    #[inline]
    pub(crate) fn get_at(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(|s| s.value.as_ref())
    }

    /// Rebuild the live handle for a raw slot index.
    #[inline]
    pub(crate) fn handle_at(&self, index: usize) -> Option<H> {
        self.slots.get(index).and_then(|s| {
            s.value
                .as_ref()
                .map(|_| H::from_parts(index as u32, s.generation))
        })
    }

    /// Iterate live elements in index order.
    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value
                .as_ref()
                .map(|v| (H::from_parts(i as u32, s.generation), v))
        })
    }

    /// Iterate live handles in index order.
    pub fn handles(&self) -> impl Iterator<Item = H> + '_ {
        self.iter().map(|(h, _)| h)
    }
}

impl<H: ElementHandle, T> std::ops::Index<H> for Pool<H, T> {
    type Output = T;

    #[inline]
    fn index(&self, handle: H) -> &T {
        match self.get(handle) {
            Ok(v) => v,
            Err(_) => panic!("dead {} handle {:?}", H::KIND, handle),
        }
    }
}

impl<H: ElementHandle, T> std::ops::IndexMut<H> for Pool<H, T> {
    #[inline]
    fn index_mut(&mut self, handle: H) -> &mut T {
        match self.get_mut(handle) {
            Ok(v) => v,
            Err(_) => panic!("dead {} handle {:?}", H::KIND, handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_debug() {
        let v = VertexHandle::new(42, 0);
        assert_eq!(format!("{:?}", v), "V(42)");
        assert_eq!(format!("{:?}", VertexHandle::INVALID), "V(INVALID)");
    }

    #[test]
    fn test_allocate_lowest_free() {
        let mut pool: Pool<VertexHandle, i32> = Pool::new();
        let a = pool.allocate(10);
        let b = pool.allocate(20);
        let c = pool.allocate(30);
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));

        pool.free(b).unwrap();
        pool.free(a).unwrap();
        assert_eq!(pool.len(), 1);

        // Lowest free index first, with a bumped generation.
        let d = pool.allocate(40);
        assert_eq!(d.index(), 0);
        assert_eq!(d.generation(), 1);
        let e = pool.allocate(50);
        assert_eq!(e.index(), 1);
        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    fn test_stale_handle_detection() {
        let mut pool: Pool<FaceHandle, &str> = Pool::new();
        let f = pool.allocate("quad");
        assert!(pool.is_valid(f));
        pool.free(f).unwrap();
        assert!(!pool.is_valid(f));
        assert!(matches!(
            pool.get(f),
            Err(MeshError::StaleHandle { kind: "face", .. })
        ));

        // A new element in the same slot does not resurrect the old handle.
        let g = pool.allocate("tri");
        assert_eq!(g.index(), f.index());
        assert!(!pool.is_valid(f));
        assert!(pool.is_valid(g));
    }

    #[test]
    fn test_iter_skips_tombstones() {
        let mut pool: Pool<EdgeHandle, u32> = Pool::new();
        let handles: Vec<_> = (0..5).map(|i| pool.allocate(i)).collect();
        pool.free(handles[1]).unwrap();
        pool.free(handles[3]).unwrap();

        let live: Vec<u32> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec![0, 2, 4]);
    }
}
