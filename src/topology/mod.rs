//! Manifold half-edge topology.
//!
//! Each full edge is a pair of oppositely-directed half-edges. A half-edge
//! belongs to at most one face; half-edges on an open boundary carry the
//! invalid face sentinel and are linked into boundary loops by `next`/`prev`
//! exactly like face cycles. A loose edge (no face on either side) is a
//! two-half-edge cycle.
//!
//! # Invariants
//!
//! Between public calls:
//! - `twin(twin(h)) == h` and `twin(h) != h`
//! - `next(prev(h)) == h`; the `next` cycle of a face has length >= 3 and
//!   uniform face assignment
//! - a vertex with any boundary half-edge has its `halfedge` field pointing
//!   at an outgoing boundary half-edge (fans around boundary vertices can be
//!   walked without special cases)
//! - at most two faces meet at a full edge
//!
//! Mutators validate their preconditions first and return tagged errors
//! without touching the mesh; see [`crate::error::MeshError`].

mod euler;
mod rings;

pub use euler::{BevelOutcome, EdgeCollapse, ExtendOutcome, SplitOutcome};
pub use rings::{EdgeListConnectivity, EdgeRib};

use crate::error::{MeshError, Result};
use crate::handle::{EdgeHandle, ElementHandle, FaceHandle, HalfEdgeHandle, Pool, VertexHandle};

/// Element kinds that carry attribute streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Per-vertex data.
    Vertex,
    /// Per-half-edge (face corner) data.
    HalfEdge,
    /// Per-face data.
    Face,
}

/// One element creation or destruction, recorded for stream bookkeeping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TopoEvent {
    pub kind: StreamKind,
    pub index: u32,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct VertexRec {
    /// One outgoing half-edge; a boundary one if any exists.
    pub halfedge: HalfEdgeHandle,
}

#[derive(Debug, Clone)]
pub(crate) struct HalfEdgeRec {
    pub end_vertex: VertexHandle,
    pub twin: HalfEdgeHandle,
    pub next: HalfEdgeHandle,
    pub prev: HalfEdgeHandle,
    pub face: FaceHandle,
    pub edge: EdgeHandle,
}

#[derive(Debug, Clone)]
pub(crate) struct FaceRec {
    pub halfedge: HalfEdgeHandle,
}

#[derive(Debug, Clone)]
pub(crate) struct EdgeRec {
    /// Canonical representative of the `{h, twin(h)}` pair.
    pub half: HalfEdgeHandle,
}

/// The half-edge graph: vertices, half-edges, full edges, and faces in
/// generational pools, plus the Euler operators that rewrite them.
#[derive(Default, Clone)]
pub struct Topology {
    pub(crate) vertices: Pool<VertexHandle, VertexRec>,
    pub(crate) halfedges: Pool<HalfEdgeHandle, HalfEdgeRec>,
    pub(crate) edges: Pool<EdgeHandle, EdgeRec>,
    pub(crate) faces: Pool<FaceHandle, FaceRec>,
    pub(crate) journal: Vec<TopoEvent>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Counts ====================

    /// Number of live vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of live half-edges.
    #[inline]
    pub fn num_halfedges(&self) -> usize {
        self.halfedges.len()
    }

    /// Number of live full edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of live faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// V - E + F over the whole graph.
    pub fn euler_characteristic(&self) -> i64 {
        self.num_vertices() as i64 - self.num_edges() as i64 + self.num_faces() as i64
    }

    // ==================== Handle checks ====================

    /// True if `v` refers to a live vertex.
    #[inline]
    pub fn contains_vertex(&self, v: VertexHandle) -> bool {
        self.vertices.is_valid(v)
    }

    /// True if `h` refers to a live half-edge.
    #[inline]
    pub fn contains_halfedge(&self, h: HalfEdgeHandle) -> bool {
        self.halfedges.is_valid(h)
    }

    /// True if `e` refers to a live full edge.
    #[inline]
    pub fn contains_edge(&self, e: EdgeHandle) -> bool {
        self.edges.is_valid(e)
    }

    /// True if `f` refers to a live face.
    #[inline]
    pub fn contains_face(&self, f: FaceHandle) -> bool {
        self.faces.is_valid(f)
    }

    pub(crate) fn check_vertex(&self, v: VertexHandle) -> Result<()> {
        self.vertices.get(v).map(|_| ())
    }

    pub(crate) fn check_edge(&self, e: EdgeHandle) -> Result<()> {
        self.edges.get(e).map(|_| ())
    }

    pub(crate) fn check_face(&self, f: FaceHandle) -> Result<()> {
        self.faces.get(f).map(|_| ())
    }

    pub(crate) fn check_halfedge(&self, h: HalfEdgeHandle) -> Result<()> {
        self.halfedges.get(h).map(|_| ())
    }

    // ==================== Core accessors ====================

    /// The opposite half-edge.
    #[inline]
    pub fn twin(&self, h: HalfEdgeHandle) -> HalfEdgeHandle {
        self.halfedges[h].twin
    }

    /// The next half-edge in the face (or boundary) cycle.
    #[inline]
    pub fn next(&self, h: HalfEdgeHandle) -> HalfEdgeHandle {
        self.halfedges[h].next
    }

    /// The previous half-edge in the face (or boundary) cycle.
    #[inline]
    pub fn prev(&self, h: HalfEdgeHandle) -> HalfEdgeHandle {
        self.halfedges[h].prev
    }

    /// The vertex this half-edge points at.
    #[inline]
    pub fn end_vertex(&self, h: HalfEdgeHandle) -> VertexHandle {
        self.halfedges[h].end_vertex
    }

    /// The vertex this half-edge leaves.
    #[inline]
    pub fn start_vertex(&self, h: HalfEdgeHandle) -> VertexHandle {
        self.end_vertex(self.twin(h))
    }

    /// The face of a half-edge; `FaceHandle::INVALID` on an open boundary.
    #[inline]
    pub fn face_of(&self, h: HalfEdgeHandle) -> FaceHandle {
        self.halfedges[h].face
    }

    /// The full edge a half-edge belongs to.
    #[inline]
    pub fn edge_of(&self, h: HalfEdgeHandle) -> EdgeHandle {
        self.halfedges[h].edge
    }

    /// The canonical half-edge of a full edge.
    #[inline]
    pub fn half_of(&self, e: EdgeHandle) -> HalfEdgeHandle {
        self.edges[e].half
    }

    /// One outgoing half-edge of a vertex; invalid if the vertex is isolated.
    #[inline]
    pub fn halfedge_of_vertex(&self, v: VertexHandle) -> HalfEdgeHandle {
        self.vertices[v].halfedge
    }

    /// One half-edge in a face's cycle.
    #[inline]
    pub fn halfedge_of_face(&self, f: FaceHandle) -> HalfEdgeHandle {
        self.faces[f].halfedge
    }

    // ==================== Classification ====================

    /// A half-edge with no face on its side.
    #[inline]
    pub fn is_boundary_halfedge(&self, h: HalfEdgeHandle) -> bool {
        !ElementHandle::is_valid(self.halfedges[h].face)
    }

    /// An edge missing a face on at least one side.
    #[inline]
    pub fn is_open_edge(&self, e: EdgeHandle) -> bool {
        let h = self.half_of(e);
        self.is_boundary_halfedge(h) || self.is_boundary_halfedge(self.twin(h))
    }

    /// An edge with no face on either side.
    #[inline]
    pub fn is_loose_edge(&self, e: EdgeHandle) -> bool {
        let h = self.half_of(e);
        self.is_boundary_halfedge(h) && self.is_boundary_halfedge(self.twin(h))
    }

    /// True if the vertex has no incident half-edges.
    #[inline]
    pub fn is_isolated_vertex(&self, v: VertexHandle) -> bool {
        !ElementHandle::is_valid(self.vertices[v].halfedge)
    }

    /// True if the vertex is isolated or touches an open boundary.
    pub fn is_boundary_vertex(&self, v: VertexHandle) -> bool {
        let start = self.vertices[v].halfedge;
        if !ElementHandle::is_valid(start) {
            return true;
        }
        // The outgoing pointer prefers boundary half-edges, so one probe plus
        // a fan walk covers corrupt-free meshes quickly.
        let mut h = start;
        loop {
            if self.is_boundary_halfedge(h) || self.is_boundary_halfedge(self.twin(h)) {
                return true;
            }
            h = self.next(self.twin(h));
            if h == start {
                return false;
            }
        }
    }

    // ==================== Relations ====================

    /// Both endpoints of a full edge.
    pub fn edge_vertices(&self, e: EdgeHandle) -> (VertexHandle, VertexHandle) {
        let h = self.half_of(e);
        (self.start_vertex(h), self.end_vertex(h))
    }

    /// The faces on each side of a full edge; either may be invalid.
    pub fn edge_faces(&self, e: EdgeHandle) -> (FaceHandle, FaceHandle) {
        let h = self.half_of(e);
        (self.face_of(h), self.face_of(self.twin(h)))
    }

    /// Iterate outgoing half-edges of a vertex (the fan).
    pub fn outgoing_halfedges(&self, v: VertexHandle) -> VertexFanIter<'_> {
        VertexFanIter::new(self, self.vertices[v].halfedge)
    }

    /// Iterate incoming half-edges of a vertex.
    pub fn incoming_halfedges(
        &self,
        v: VertexHandle,
    ) -> impl Iterator<Item = HalfEdgeHandle> + '_ {
        self.outgoing_halfedges(v).map(|h| self.twin(h))
    }

    /// Iterate the full edges incident to a vertex.
    pub fn vertex_edges(&self, v: VertexHandle) -> impl Iterator<Item = EdgeHandle> + '_ {
        self.outgoing_halfedges(v).map(|h| self.edge_of(h))
    }

    /// Iterate the faces incident to a vertex.
    pub fn vertex_faces(&self, v: VertexHandle) -> impl Iterator<Item = FaceHandle> + '_ {
        self.outgoing_halfedges(v)
            .map(|h| self.face_of(h))
            .filter(|f| ElementHandle::is_valid(*f))
    }

    /// Number of full edges at a vertex.
    pub fn vertex_degree(&self, v: VertexHandle) -> usize {
        self.outgoing_halfedges(v).count()
    }

    /// Iterate the half-edges of a face cycle.
    pub fn face_halfedges(&self, f: FaceHandle) -> FaceLoopIter<'_> {
        FaceLoopIter::new(self, self.faces[f].halfedge)
    }

    /// Iterate the vertices of a face in cycle order.
    pub fn face_vertices(&self, f: FaceHandle) -> impl Iterator<Item = VertexHandle> + '_ {
        self.face_halfedges(f).map(|h| self.end_vertex(h))
    }

    /// Number of vertices (equivalently half-edges) in a face cycle.
    pub fn face_valence(&self, f: FaceHandle) -> usize {
        self.face_halfedges(f).count()
    }

    /// Find the half-edge from `u` to `w`, if any.
    pub fn find_halfedge(&self, u: VertexHandle, w: VertexHandle) -> Option<HalfEdgeHandle> {
        self.outgoing_halfedges(u).find(|&h| self.end_vertex(h) == w)
    }

    /// Find the full edge connecting two vertices, if any.
    pub fn find_edge(&self, u: VertexHandle, w: VertexHandle) -> Option<EdgeHandle> {
        self.find_halfedge(u, w).map(|h| self.edge_of(h))
    }

    /// Find a face adjacent to both edges, if any.
    pub fn find_face_connecting(&self, a: EdgeHandle, b: EdgeHandle) -> Option<FaceHandle> {
        let (fa0, fa1) = self.edge_faces(a);
        let (fb0, fb1) = self.edge_faces(b);
        for fa in [fa0, fa1] {
            if ElementHandle::is_valid(fa) && (fa == fb0 || fa == fb1) {
                return Some(fa);
            }
        }
        None
    }

    // ==================== Iteration over all elements ====================

    /// Live vertex handles in index order.
    pub fn vertex_handles(&self) -> impl Iterator<Item = VertexHandle> + '_ {
        self.vertices.handles()
    }

    /// Live half-edge handles in index order.
    pub fn halfedge_handles(&self) -> impl Iterator<Item = HalfEdgeHandle> + '_ {
        self.halfedges.handles()
    }

    /// Live full-edge handles in index order.
    pub fn edge_handles(&self) -> impl Iterator<Item = EdgeHandle> + '_ {
        self.edges.handles()
    }

    /// Live face handles in index order.
    pub fn face_handles(&self) -> impl Iterator<Item = FaceHandle> + '_ {
        self.faces.handles()
    }

    // ==================== Internal plumbing ====================

    pub(crate) fn take_journal(&mut self) -> Vec<TopoEvent> {
        std::mem::take(&mut self.journal)
    }

    pub(crate) fn record(&mut self, kind: StreamKind, index: usize, created: bool) {
        self.journal.push(TopoEvent {
            kind,
            index: index as u32,
            created,
        });
    }

    /// Chain two half-edges: `next(a) = b`, `prev(b) = a`.
    pub(crate) fn link(&mut self, a: HalfEdgeHandle, b: HalfEdgeHandle) {
        self.halfedges[a].next = b;
        self.halfedges[b].prev = a;
    }

    pub(crate) fn alloc_vertex(&mut self) -> VertexHandle {
        let v = self.vertices.allocate(VertexRec {
            halfedge: HalfEdgeHandle::INVALID,
        });
        self.record(StreamKind::Vertex, v.index(), true);
        v
    }

    pub(crate) fn free_vertex(&mut self, v: VertexHandle) {
        let index = v.index();
        self.vertices.free(v).expect("freeing dead vertex");
        self.record(StreamKind::Vertex, index, false);
    }

    /// Allocate a twin pair `u -> w` / `w -> u` plus its edge record.
    /// `next`/`prev` are left invalid; the caller must link them before
    /// returning to the outside world.
    pub(crate) fn alloc_edge_pair(
        &mut self,
        u: VertexHandle,
        w: VertexHandle,
    ) -> (HalfEdgeHandle, HalfEdgeHandle, EdgeHandle) {
        let h0 = self.halfedges.allocate(HalfEdgeRec {
            end_vertex: w,
            twin: HalfEdgeHandle::INVALID,
            next: HalfEdgeHandle::INVALID,
            prev: HalfEdgeHandle::INVALID,
            face: FaceHandle::INVALID,
            edge: EdgeHandle::INVALID,
        });
        let h1 = self.halfedges.allocate(HalfEdgeRec {
            end_vertex: u,
            twin: h0,
            next: HalfEdgeHandle::INVALID,
            prev: HalfEdgeHandle::INVALID,
            face: FaceHandle::INVALID,
            edge: EdgeHandle::INVALID,
        });
        self.halfedges[h0].twin = h1;

        let e = self.edges.allocate(EdgeRec { half: h0 });
        self.halfedges[h0].edge = e;
        self.halfedges[h1].edge = e;

        self.record(StreamKind::HalfEdge, h0.index(), true);
        self.record(StreamKind::HalfEdge, h1.index(), true);
        (h0, h1, e)
    }

    /// Free a twin pair and its edge record. Links must already be spliced
    /// around it.
    pub(crate) fn free_edge_pair(&mut self, e: EdgeHandle) {
        let h0 = self.edges[e].half;
        let h1 = self.twin(h0);
        let (i0, i1) = (h0.index(), h1.index());
        self.halfedges.free(h0).expect("freeing dead half-edge");
        self.halfedges.free(h1).expect("freeing dead half-edge");
        self.edges.free(e).expect("freeing dead edge");
        self.record(StreamKind::HalfEdge, i0, false);
        self.record(StreamKind::HalfEdge, i1, false);
    }

    pub(crate) fn alloc_face(&mut self, halfedge: HalfEdgeHandle) -> FaceHandle {
        let f = self.faces.allocate(FaceRec { halfedge });
        self.record(StreamKind::Face, f.index(), true);
        f
    }

    pub(crate) fn free_face(&mut self, f: FaceHandle) {
        let index = f.index();
        self.faces.free(f).expect("freeing dead face");
        self.record(StreamKind::Face, index, false);
    }

    /// An outgoing boundary half-edge at `v`, if the fan has a gap.
    pub(crate) fn boundary_outgoing(&self, v: VertexHandle) -> Option<HalfEdgeHandle> {
        self.outgoing_halfedges(v)
            .find(|&h| self.is_boundary_halfedge(h))
    }

    /// Re-point the vertex's outgoing half-edge, preferring a boundary one.
    pub(crate) fn adjust_outgoing(&mut self, v: VertexHandle) {
        let start = self.vertices[v].halfedge;
        if !ElementHandle::is_valid(start) {
            return;
        }
        if let Some(b) = self.boundary_outgoing(v) {
            self.vertices[v].halfedge = b;
        }
    }

    // ==================== Validation ====================

    /// Check structural invariants across the whole graph. Used by tests;
    /// linear in mesh size.
    pub fn validate(&self) -> bool {
        for (h, rec) in self.halfedges.iter() {
            // Twin involution.
            if !self.halfedges.is_valid(rec.twin) || rec.twin == h {
                return false;
            }
            if self.halfedges[rec.twin].twin != h {
                return false;
            }
            // next/prev are inverse.
            if !self.halfedges.is_valid(rec.next) || !self.halfedges.is_valid(rec.prev) {
                return false;
            }
            if self.halfedges[rec.next].prev != h || self.halfedges[rec.prev].next != h {
                return false;
            }
            // Chain continuity: next starts where h ends.
            if self.start_vertex(rec.next) != rec.end_vertex {
                return false;
            }
            // Edge record agreement.
            if !self.edges.is_valid(rec.edge) || self.halfedges[rec.twin].edge != rec.edge {
                return false;
            }
            let canon = self.edges[rec.edge].half;
            if canon != h && canon != rec.twin {
                return false;
            }
            if !self.vertices.is_valid(rec.end_vertex) {
                return false;
            }
        }

        for (f, rec) in self.faces.iter() {
            if !self.halfedges.is_valid(rec.halfedge) {
                return false;
            }
            // Cycle closure with uniform face tags, length >= 3.
            let mut steps = 0usize;
            let mut h = rec.halfedge;
            loop {
                if self.halfedges[h].face != f {
                    return false;
                }
                h = self.next(h);
                steps += 1;
                if h == rec.halfedge {
                    break;
                }
                if steps > self.halfedges.capacity() {
                    return false;
                }
            }
            if steps < 3 {
                return false;
            }
        }

        for (v, rec) in self.vertices.iter() {
            if ElementHandle::is_valid(rec.halfedge) {
                if !self.halfedges.is_valid(rec.halfedge) {
                    return false;
                }
                if self.start_vertex(rec.halfedge) != v {
                    return false;
                }
                // Boundary preference: if any outgoing half-edge is open, the
                // stored one must be.
                if !self.is_boundary_halfedge(rec.halfedge)
                    && self.boundary_outgoing(v).is_some()
                {
                    return false;
                }
            }
        }

        true
    }
}

/// Iterator over the half-edges of one face (or boundary) cycle.
pub struct FaceLoopIter<'a> {
    topo: &'a Topology,
    start: HalfEdgeHandle,
    current: HalfEdgeHandle,
    done: bool,
}

impl<'a> FaceLoopIter<'a> {
    fn new(topo: &'a Topology, start: HalfEdgeHandle) -> Self {
        Self {
            topo,
            start,
            current: start,
            done: !ElementHandle::is_valid(start),
        }
    }
}

impl<'a> Iterator for FaceLoopIter<'a> {
    type Item = HalfEdgeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.current;
        self.current = self.topo.next(self.current);
        if self.current == self.start {
            self.done = true;
        }
        Some(result)
    }
}

/// Iterator over the outgoing half-edges of one vertex.
pub struct VertexFanIter<'a> {
    topo: &'a Topology,
    start: HalfEdgeHandle,
    current: HalfEdgeHandle,
    done: bool,
}

impl<'a> VertexFanIter<'a> {
    fn new(topo: &'a Topology, start: HalfEdgeHandle) -> Self {
        Self {
            topo,
            start,
            current: start,
            done: !ElementHandle::is_valid(start),
        }
    }
}

impl<'a> Iterator for VertexFanIter<'a> {
    type Item = HalfEdgeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.current;
        // twin(h) points back at the vertex; its next leaves it again. With
        // boundary loops linked this rotation covers open fans too.
        self.current = self.topo.next(self.topo.twin(self.current));
        if self.current == self.start {
            self.done = true;
        }
        Some(result)
    }
}
