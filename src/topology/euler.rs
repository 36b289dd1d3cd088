//! Euler operators: the topology-rewriting primitives.
//!
//! Each operator validates its preconditions before touching the graph, so a
//! returned error means nothing changed. Batch operators (`bevel_faces`,
//! `extend_edges`) snapshot the graph per item and roll back items that fail
//! partway, reporting their status instead.

use smallvec::SmallVec;

use crate::error::{ItemStatus, MeshError, Result};
use crate::handle::{EdgeHandle, ElementHandle, FaceHandle, HalfEdgeHandle, VertexHandle};

use super::Topology;

/// Result of [`Topology::collapse_edge`].
#[derive(Debug, Clone)]
pub struct EdgeCollapse {
    /// The surviving vertex.
    pub vertex: VertexHandle,
    /// Full edges that became identified with another edge while a
    /// degenerate face was dissolved: `(removed, kept)`.
    pub replaced: Vec<(EdgeHandle, EdgeHandle)>,
}

/// Result of [`Topology::bevel_faces`].
#[derive(Debug, Clone, Default)]
pub struct BevelOutcome {
    /// `(source face, duplicate face)` for each beveled input.
    pub new_faces: Vec<(FaceHandle, FaceHandle)>,
    /// `(old face, replacement)` for originals that were reversed in place
    /// to make room for the connecting ring.
    pub flipped: Vec<(FaceHandle, FaceHandle)>,
    /// The ring of quads between original and duplicate loops.
    pub connecting_faces: Vec<FaceHandle>,
    /// `(original vertex, duplicate vertex)` correspondence.
    pub vertex_map: Vec<(VertexHandle, VertexHandle)>,
    /// Per input face: processed or skipped.
    pub statuses: Vec<ItemStatus>,
}

/// Result of [`Topology::extend_edges`].
#[derive(Debug, Clone, Default)]
pub struct ExtendOutcome {
    /// The quads added along the open edges.
    pub new_faces: Vec<FaceHandle>,
    /// `(strip vertex, extruded duplicate)` correspondence.
    pub vertex_map: Vec<(VertexHandle, VertexHandle)>,
    /// Per input edge: processed or skipped.
    pub statuses: Vec<ItemStatus>,
}

/// Result of [`Topology::split_edges`].
#[derive(Debug, Clone, Default)]
pub struct SplitOutcome {
    /// The second (torn-off) edge created for each split input.
    pub new_edges: Vec<EdgeHandle>,
    /// `(original vertex, duplicate)` for vertices the tear pulled apart.
    pub vertex_map: Vec<(VertexHandle, VertexHandle)>,
}

impl Topology {
    // ==================== Vertices and edges ====================

    /// Create an isolated vertex.
    pub fn add_vertex(&mut self) -> VertexHandle {
        self.alloc_vertex()
    }

    /// Create a loose (two-sided open) edge between two vertices.
    ///
    /// Returns the existing edge if one already connects `a` and `b`. Fails
    /// with `NonManifold` if either vertex is interior (no boundary gap to
    /// splice the edge into).
    pub fn add_edge(&mut self, a: VertexHandle, b: VertexHandle) -> Result<EdgeHandle> {
        self.check_vertex(a)?;
        self.check_vertex(b)?;
        if a == b {
            return Err(MeshError::BadPolygon("an edge needs two distinct vertices"));
        }
        if let Some(e) = self.find_edge(a, b) {
            return Ok(e);
        }

        let gap_a = self.boundary_outgoing(a);
        if !self.is_isolated_vertex(a) && gap_a.is_none() {
            return Err(MeshError::NonManifold("vertex has no boundary gap"));
        }
        let gap_b = self.boundary_outgoing(b);
        if !self.is_isolated_vertex(b) && gap_b.is_none() {
            return Err(MeshError::NonManifold("vertex has no boundary gap"));
        }

        let (h, t, e) = self.alloc_edge_pair(a, b);
        // Default to the lone 2-cycle, then splice each endpoint that
        // already has boundary structure.
        match gap_a {
            Some(ga) => {
                let pa = self.prev(ga);
                self.link(pa, h);
                self.link(t, ga);
            }
            None => self.link(t, h),
        }
        match gap_b {
            Some(gb) => {
                let pb = self.prev(gb);
                self.link(h, gb);
                self.link(pb, t);
            }
            None => self.link(h, t),
        }

        if self.is_isolated_vertex(a) {
            self.vertices[a].halfedge = h;
        }
        if self.is_isolated_vertex(b) {
            self.vertices[b].halfedge = t;
        }
        Ok(e)
    }

    // ==================== Face insertion ====================

    /// Create a face over an ordered vertex loop.
    ///
    /// Existing boundary half-edges along the loop are reused; missing edges
    /// are created. Fails without mutating if the loop is shorter than 3,
    /// repeats a vertex, or the insertion would be non-manifold.
    pub fn add_face(&mut self, verts: &[VertexHandle]) -> Result<FaceHandle> {
        let n = verts.len();
        if n < 3 {
            return Err(MeshError::BadPolygon("a face needs at least 3 vertices"));
        }
        for &v in verts {
            self.check_vertex(v)?;
        }
        for i in 0..n {
            for j in i + 1..n {
                if verts[i] == verts[j] {
                    return Err(MeshError::BadPolygon("repeated vertex in face loop"));
                }
            }
        }

        // Existing directed half-edges along the loop must be free.
        let mut hes: Vec<HalfEdgeHandle> = vec![HalfEdgeHandle::INVALID; n];
        let mut is_new = vec![true; n];
        for i in 0..n {
            if let Some(h) = self.find_halfedge(verts[i], verts[(i + 1) % n]) {
                if !self.is_boundary_halfedge(h) {
                    return Err(MeshError::BadPolygon("edge side already carries a face"));
                }
                hes[i] = h;
                is_new[i] = false;
            }
        }

        // Second pass: prove every corner can be spliced, and stash the
        // boundary re-links for corners whose two old half-edges are not yet
        // consecutive. Nothing is mutated until all corners check out.
        let mut next_cache: Vec<(HalfEdgeHandle, HalfEdgeHandle)> = Vec::new();
        for i in 0..n {
            let ii = (i + 1) % n;
            let w = verts[ii];
            match (is_new[i], is_new[ii]) {
                (false, false) => {
                    let inner_prev = hes[i];
                    let inner_next = hes[ii];
                    if self.next(inner_prev) == inner_next {
                        continue;
                    }
                    // Relocate the boundary chain between them into another
                    // gap around `w`.
                    let mut boundary_prev = self.twin(inner_next);
                    loop {
                        boundary_prev = self.twin(self.next(boundary_prev));
                        if self.is_boundary_halfedge(boundary_prev) {
                            break;
                        }
                    }
                    if boundary_prev == inner_prev {
                        return Err(MeshError::BadPolygon(
                            "vertex fan has no free gap for the new corner",
                        ));
                    }
                    let boundary_next = self.next(boundary_prev);
                    let patch_start = self.next(inner_prev);
                    let patch_end = self.prev(inner_next);
                    next_cache.push((boundary_prev, patch_start));
                    next_cache.push((patch_end, boundary_next));
                    next_cache.push((inner_prev, inner_next));
                }
                (true, true) => {
                    if !self.is_isolated_vertex(w) && self.boundary_outgoing(w).is_none() {
                        return Err(MeshError::BadPolygon(
                            "vertex is interior; face insertion would be non-manifold",
                        ));
                    }
                }
                _ => {}
            }
        }

        // Mutation starts here; every remaining step succeeds.
        for i in 0..n {
            if is_new[i] {
                let (h, _, _) = self.alloc_edge_pair(verts[i], verts[(i + 1) % n]);
                hes[i] = h;
            }
        }
        let f = self.alloc_face(hes[n - 1]);

        let mut needs_adjust = vec![false; n];
        for i in 0..n {
            let ii = (i + 1) % n;
            let w = verts[ii];
            let inner_prev = hes[i];
            let inner_next = hes[ii];
            match (is_new[i], is_new[ii]) {
                (true, false) => {
                    let boundary_prev = self.prev(inner_next);
                    let outer_next = self.twin(inner_prev);
                    next_cache.push((boundary_prev, outer_next));
                    next_cache.push((inner_prev, inner_next));
                    self.vertices[w].halfedge = outer_next;
                }
                (false, true) => {
                    let outer_prev = self.twin(inner_next);
                    let boundary_next = self.next(inner_prev);
                    next_cache.push((outer_prev, boundary_next));
                    next_cache.push((inner_prev, inner_next));
                    self.vertices[w].halfedge = boundary_next;
                }
                (true, true) => {
                    let outer_prev = self.twin(inner_next);
                    let outer_next = self.twin(inner_prev);
                    let vh = self.vertices[w].halfedge;
                    if ElementHandle::is_valid(vh) {
                        // The stored half-edge is a boundary one (checked in
                        // pass two); splice into its gap.
                        let boundary_prev = self.prev(vh);
                        next_cache.push((boundary_prev, outer_next));
                        next_cache.push((outer_prev, vh));
                    } else {
                        self.vertices[w].halfedge = outer_next;
                        next_cache.push((outer_prev, outer_next));
                    }
                    next_cache.push((inner_prev, inner_next));
                }
                (false, false) => {
                    needs_adjust[ii] = true;
                }
            }
            self.halfedges[inner_prev].face = f;
        }

        for (a, b) in next_cache {
            self.link(a, b);
        }
        for i in 0..n {
            if needs_adjust[i] {
                self.adjust_outgoing(verts[i]);
            }
        }
        Ok(f)
    }

    /// Split face `f` by the chord `a -> b`; both vertices must lie on the
    /// face and not already be adjacent in it. Returns the new edge and the
    /// new face (which takes the `a -> ... -> b` side of the old cycle).
    pub fn add_edge_to_face(
        &mut self,
        f: FaceHandle,
        a: VertexHandle,
        b: VertexHandle,
    ) -> Result<(EdgeHandle, FaceHandle)> {
        self.check_face(f)?;
        self.check_vertex(a)?;
        self.check_vertex(b)?;
        if a == b {
            return Err(MeshError::BadPolygon("chord endpoints must differ"));
        }

        let mut ha = HalfEdgeHandle::INVALID;
        let mut hb = HalfEdgeHandle::INVALID;
        for h in self.face_halfedges(f) {
            let end = self.end_vertex(h);
            if end == a {
                ha = h;
            } else if end == b {
                hb = h;
            }
        }
        if !ElementHandle::is_valid(ha) || !ElementHandle::is_valid(hb) {
            return Err(MeshError::BadPolygon("chord endpoint is not on the face"));
        }
        if self.next(ha) == hb || self.next(hb) == ha {
            return Err(MeshError::NonManifold("chord duplicates a face edge"));
        }

        let after_a = self.next(ha);
        let after_b = self.next(hb);
        let (h_ab, h_ba, e) = self.alloc_edge_pair(a, b);

        // Old cycle splits at the two corner half-edges: `f` keeps
        // b -> ... -> a plus the chord, the new face takes the rest.
        self.link(ha, h_ab);
        self.link(h_ab, after_b);
        self.link(hb, h_ba);
        self.link(h_ba, after_a);

        self.halfedges[h_ab].face = f;
        self.faces[f].halfedge = h_ab;

        let g = self.alloc_face(h_ba);
        let mut walk = h_ba;
        loop {
            self.halfedges[walk].face = g;
            walk = self.next(walk);
            if walk == h_ba {
                break;
            }
        }
        Ok((e, g))
    }

    // ==================== Removal ====================

    /// Detach a face, leaving its half-edges open. Frees the face record and
    /// re-points cycle vertices at their new boundary.
    pub(crate) fn clear_face(&mut self, f: FaceHandle) {
        let cycle: SmallVec<[HalfEdgeHandle; 8]> = self.face_halfedges(f).collect();
        for &h in &cycle {
            self.halfedges[h].face = FaceHandle::INVALID;
        }
        self.free_face(f);
        for &h in &cycle {
            let v = self.end_vertex(h);
            self.adjust_outgoing(v);
        }
    }

    /// Unlink a loose edge pair from the boundary chains and free it,
    /// fixing endpoint outgoing pointers.
    pub(crate) fn detach_edge_pair(&mut self, e: EdgeHandle) {
        let h = self.half_of(e);
        let t = self.twin(h);
        let a = self.start_vertex(h);
        let b = self.end_vertex(h);
        debug_assert!(self.is_loose_edge(e));

        let hp = self.prev(h);
        let hn = self.next(h);
        let tp = self.prev(t);
        let tn = self.next(t);

        if hn == t && tn == h {
            // Lone edge: both endpoints lose their last half-edge.
            self.vertices[a].halfedge = HalfEdgeHandle::INVALID;
            self.vertices[b].halfedge = HalfEdgeHandle::INVALID;
        } else if tn == h {
            // The chain makes a U-turn at `a`: this was a's only edge.
            self.link(tp, hn);
            self.vertices[a].halfedge = HalfEdgeHandle::INVALID;
            if self.vertices[b].halfedge == t {
                self.vertices[b].halfedge = hn;
            }
        } else if hn == t {
            self.link(hp, tn);
            self.vertices[b].halfedge = HalfEdgeHandle::INVALID;
            if self.vertices[a].halfedge == h {
                self.vertices[a].halfedge = tn;
            }
        } else {
            self.link(hp, tn);
            self.link(tp, hn);
            if self.vertices[a].halfedge == h {
                self.vertices[a].halfedge = tn;
            }
            if self.vertices[b].halfedge == t {
                self.vertices[b].halfedge = hn;
            }
        }
        self.free_edge_pair(e);
    }

    /// Remove a face. Edges left with no face on either side are stripped;
    /// with `keep_vertices = false`, vertices of the face that end up
    /// isolated are removed too.
    pub fn remove_face(&mut self, f: FaceHandle, keep_vertices: bool) -> Result<()> {
        self.check_face(f)?;
        let cycle_edges: SmallVec<[EdgeHandle; 8]> =
            self.face_halfedges(f).map(|h| self.edge_of(h)).collect();
        let cycle_verts: SmallVec<[VertexHandle; 8]> = self.face_vertices(f).collect();

        self.clear_face(f);
        for &e in &cycle_edges {
            if self.contains_edge(e) && self.is_loose_edge(e) {
                self.detach_edge_pair(e);
            }
        }
        if !keep_vertices {
            for &v in &cycle_verts {
                if self.contains_vertex(v) && self.is_isolated_vertex(v) {
                    self.free_vertex(v);
                }
            }
        }
        Ok(())
    }

    /// Remove a full edge: both adjacent faces go first, then the half-edge
    /// pair itself. `keep_vertices` as in [`Topology::remove_face`].
    pub fn remove_edge(&mut self, e: EdgeHandle, keep_vertices: bool) -> Result<()> {
        self.check_edge(e)?;
        let (va, vb) = self.edge_vertices(e);
        let (f0, f1) = self.edge_faces(e);
        if ElementHandle::is_valid(f0) {
            self.remove_face(f0, keep_vertices)?;
        }
        if ElementHandle::is_valid(f1) && self.contains_face(f1) {
            self.remove_face(f1, keep_vertices)?;
        }
        // A loose input edge is untouched by the face removals above.
        if self.contains_edge(e) {
            self.detach_edge_pair(e);
        }
        if !keep_vertices {
            for v in [va, vb] {
                if self.contains_vertex(v) && self.is_isolated_vertex(v) {
                    self.free_vertex(v);
                }
            }
        }
        Ok(())
    }

    /// Remove a vertex with all incident faces and edges. Loose edges left
    /// over from the removed faces (not incident to `v`) are stripped only
    /// when `remove_loose_edges` is set; they keep both live endpoints
    /// either way.
    pub fn remove_vertex(&mut self, v: VertexHandle, remove_loose_edges: bool) -> Result<()> {
        self.check_vertex(v)?;
        let incident_edges: Vec<EdgeHandle> = self.vertex_edges(v).collect();
        let incident_faces: Vec<FaceHandle> = {
            let mut faces: Vec<FaceHandle> = self.vertex_faces(v).collect();
            faces.dedup();
            faces
        };
        let mut rim_edges: Vec<EdgeHandle> = Vec::new();
        for &f in &incident_faces {
            for h in self.face_halfedges(f) {
                let e = self.edge_of(h);
                if !incident_edges.contains(&e) {
                    rim_edges.push(e);
                }
            }
        }

        for f in incident_faces {
            if self.contains_face(f) {
                self.clear_face(f);
            }
        }
        for e in incident_edges {
            if self.contains_edge(e) {
                self.detach_edge_pair(e);
            }
        }
        if remove_loose_edges {
            for e in rim_edges {
                if self.contains_edge(e) && self.is_loose_edge(e) {
                    self.detach_edge_pair(e);
                }
            }
        }
        self.free_vertex(v);
        Ok(())
    }

    // ==================== Edge surgery ====================

    /// Split a full edge by inserting a new vertex between its endpoints.
    /// Returns `(new vertex, edge on the start side, edge on the end side)`.
    /// Both adjacent face cycles grow by one corner.
    pub fn add_vertex_to_edge(
        &mut self,
        e: EdgeHandle,
    ) -> Result<(VertexHandle, EdgeHandle, EdgeHandle)> {
        self.check_edge(e)?;
        let h = self.half_of(e);
        let t = self.twin(h);
        let b = self.end_vertex(h);

        let v = self.alloc_vertex();
        let (h2, h2t, e2) = self.alloc_edge_pair(v, b);

        let hn = self.next(h);
        let tp = self.prev(t);

        self.halfedges[h].end_vertex = v;
        self.halfedges[h2].face = self.face_of(h);
        self.halfedges[h2t].face = self.face_of(t);

        self.link(h, h2);
        self.link(h2t, t);
        if hn == t {
            // Open 2-cycle: the edge was b's only one.
            self.link(h2, h2t);
        } else {
            self.link(h2, hn);
            self.link(tp, h2t);
        }

        self.vertices[v].halfedge = h2;
        self.adjust_outgoing(v);
        if self.vertices[b].halfedge == t {
            self.vertices[b].halfedge = h2t;
        }
        self.adjust_outgoing(b);

        Ok((v, e, e2))
    }

    /// Dissolve a face that collapsed to two half-edges, identifying its two
    /// (now coincident) full edges. Returns `(removed edge, kept edge)` or
    /// `None` if the pair degenerated entirely.
    fn dissolve_two_gon(
        &mut self,
        f: FaceHandle,
        ha: HalfEdgeHandle,
        hb: HalfEdgeHandle,
    ) -> Option<(EdgeHandle, EdgeHandle)> {
        debug_assert_eq!(self.next(ha), hb);
        debug_assert_eq!(self.next(hb), ha);
        let u = self.end_vertex(hb);
        let w = self.end_vertex(ha);

        self.free_face(f);
        let (ia, ib) = (ha.index() as u32, hb.index() as u32);
        let e_removed = self.edge_of(ha);
        let e_kept = self.edge_of(hb);

        if self.twin(ha) == hb {
            // The 2-gon sat on a single edge; the whole edge goes away.
            for v in [u, w] {
                if self.vertices[v].halfedge == ha || self.vertices[v].halfedge == hb {
                    self.vertices[v].halfedge = HalfEdgeHandle::INVALID;
                }
            }
            self.free_edge_pair(e_removed);
            for v in [u, w] {
                self.rebuild_vertex_pointer(v);
            }
            return None;
        }

        let outer_a = self.twin(ha);
        let outer_b = self.twin(hb);

        // Pair the two outer half-edges with each other and retire the
        // inner ones along with one edge record.
        self.halfedges[outer_a].twin = outer_b;
        self.halfedges[outer_b].twin = outer_a;
        self.halfedges[outer_b].edge = e_kept;
        self.edges[e_kept].half = outer_b;

        if self.vertices[u].halfedge == ha {
            self.vertices[u].halfedge = outer_b;
        }
        if self.vertices[w].halfedge == hb {
            self.vertices[w].halfedge = outer_a;
        }

        self.halfedges.free(ha).expect("freeing dead half-edge");
        self.halfedges.free(hb).expect("freeing dead half-edge");
        self.record(super::StreamKind::HalfEdge, ia as usize, false);
        self.record(super::StreamKind::HalfEdge, ib as usize, false);
        self.edges.free(e_removed).expect("freeing dead edge");

        self.adjust_outgoing(u);
        self.adjust_outgoing(w);
        Some((e_removed, e_kept))
    }

    /// Last-resort repair of a vertex's outgoing pointer after surgery that
    /// may have freed it: scan all half-edges. Local ops keep this off the
    /// hot path; it only runs on tiny degenerate configurations.
    fn rebuild_vertex_pointer(&mut self, v: VertexHandle) {
        if self
            .vertices
            .get(v)
            .map(|rec| {
                !ElementHandle::is_valid(rec.halfedge) || !self.halfedges.is_valid(rec.halfedge)
            })
            .unwrap_or(false)
        {
            let found = self
                .halfedge_handles()
                .find(|&h| self.start_vertex(h) == v)
                .unwrap_or(HalfEdgeHandle::INVALID);
            self.vertices[v].halfedge = found;
            self.adjust_outgoing(v);
        }
    }

    /// Collapse a full edge, merging its end vertex into its start vertex.
    ///
    /// Adjacent triangles degenerate into 2-gons and are dissolved; each
    /// dissolution identifies two full edges, reported in `replaced`. Fails
    /// with `NonManifold` when the collapse would pinch the mesh (a common
    /// neighbor that is not a triangle apex, or a bow-tie configuration).
    pub fn collapse_edge(&mut self, e: EdgeHandle) -> Result<EdgeCollapse> {
        self.check_edge(e)?;
        let h = self.half_of(e);
        let t = self.twin(h);
        let a = self.start_vertex(h);
        let b = self.end_vertex(h);
        let fh = self.face_of(h);
        let ft = self.face_of(t);

        // Apex vertices of adjacent triangles: the only legal common
        // neighbors of the edge endpoints.
        let mut apexes: SmallVec<[VertexHandle; 2]> = SmallVec::new();
        for (f, inner) in [(fh, h), (ft, t)] {
            if ElementHandle::is_valid(f) && self.face_valence(f) == 3 {
                apexes.push(self.end_vertex(self.next(inner)));
            }
        }
        if apexes.len() == 2 && apexes[0] == apexes[1] {
            return Err(MeshError::NonManifold("bow-tie collapse"));
        }
        let neighbors_a: Vec<VertexHandle> =
            self.outgoing_halfedges(a).map(|g| self.end_vertex(g)).collect();
        for g in self.outgoing_halfedges(b) {
            let x = self.end_vertex(g);
            if x != a && neighbors_a.contains(&x) && !apexes.contains(&x) {
                return Err(MeshError::NonManifold(
                    "collapse would create a duplicate edge",
                ));
            }
        }

        // Gather before surgery; fan iterators cannot run mid-splice.
        let b_incoming: Vec<HalfEdgeHandle> = self.incoming_halfedges(b).collect();
        let a_outgoing: Vec<HalfEdgeHandle> = self.outgoing_halfedges(a).collect();

        let h_prev = self.prev(h);
        let h_next = self.next(h);
        let t_prev = self.prev(t);
        let t_next = self.next(t);

        // Unlink the dying pair from both cycles. A loose edge at a
        // degree-1 endpoint chains straight through the pair (next(t) == h
        // or next(h) == t); splice around both halves at once there.
        if h_next == t && t_next == h {
            // Lone edge: no external links at all.
        } else if t_next == h {
            self.link(t_prev, h_next);
        } else if h_next == t {
            self.link(h_prev, t_next);
        } else {
            self.link(h_prev, h_next);
            self.link(t_prev, t_next);
        }
        if ElementHandle::is_valid(fh) && self.faces[fh].halfedge == h {
            self.faces[fh].halfedge = h_next;
        }
        if ElementHandle::is_valid(ft) && self.faces[ft].halfedge == t {
            self.faces[ft].halfedge = t_next;
        }

        // Every half-edge that pointed at b now points at a.
        for inc in b_incoming.iter().copied() {
            if inc != h && inc != t {
                self.halfedges[inc].end_vertex = a;
            }
        }

        // Candidate outgoing pointers for the merged vertex.
        let mut candidates: Vec<HalfEdgeHandle> = Vec::new();
        for g in a_outgoing {
            if g != h {
                candidates.push(g);
            }
        }
        for inc in b_incoming.iter().copied() {
            let out = self.twin(inc);
            if out != h && out != t {
                candidates.push(out);
            }
        }

        self.free_edge_pair(e);
        self.free_vertex(b);

        // Shrunken triangles are now 2-gons: dissolve them.
        let mut replaced = Vec::new();
        for (f, first, second) in [(fh, h_next, h_prev), (ft, t_next, t_prev)] {
            if !ElementHandle::is_valid(f) || !self.contains_face(f) {
                continue;
            }
            if self.contains_halfedge(first) && self.next(first) == second
                && self.next(second) == first
            {
                if let Some(pair) = self.dissolve_two_gon(f, first, second) {
                    replaced.push(pair);
                }
            }
        }

        // Settle the merged vertex's outgoing pointer.
        let live = candidates
            .into_iter()
            .find(|&g| self.contains_halfedge(g) && self.start_vertex(g) == a)
            .unwrap_or(HalfEdgeHandle::INVALID);
        self.vertices[a].halfedge = live;
        self.adjust_outgoing(a);

        Ok(EdgeCollapse {
            vertex: a,
            replaced,
        })
    }

    // ==================== Vertex and edge welding ====================

    /// Merge vertex `b` into vertex `a`.
    ///
    /// With an edge between them this is an edge collapse; otherwise the two
    /// fans are welded, which requires a boundary gap on both sides.
    pub fn merge_vertices(&mut self, a: VertexHandle, b: VertexHandle) -> Result<VertexHandle> {
        self.check_vertex(a)?;
        self.check_vertex(b)?;
        if a == b {
            return Ok(a);
        }
        if let Some(e) = self.find_edge(a, b) {
            // Make sure the collapse keeps `a`: orient from a's side.
            if self.start_vertex(self.half_of(e)) != a {
                let half = self.half_of(e);
                let twin = self.twin(half);
                self.edges[e].half = twin;
            }
            return self.collapse_edge(e).map(|c| c.vertex);
        }

        if self.is_isolated_vertex(b) {
            self.free_vertex(b);
            return Ok(a);
        }
        if self.is_isolated_vertex(a) {
            let b_halfedge = self.vertices[b].halfedge;
            let incoming: Vec<HalfEdgeHandle> = self.incoming_halfedges(b).collect();
            for inc in incoming {
                self.halfedges[inc].end_vertex = a;
            }
            self.vertices[a].halfedge = b_halfedge;
            self.free_vertex(b);
            self.adjust_outgoing(a);
            return Ok(a);
        }

        let ga = self
            .boundary_outgoing(a)
            .ok_or(MeshError::NonManifold("cannot weld an interior vertex"))?;
        let gb = self
            .boundary_outgoing(b)
            .ok_or(MeshError::NonManifold("cannot weld an interior vertex"))?;
        let pa = self.prev(ga);
        let pb = self.prev(gb);

        let incoming: Vec<HalfEdgeHandle> = self.incoming_halfedges(b).collect();
        for inc in incoming {
            self.halfedges[inc].end_vertex = a;
        }
        self.link(pa, gb);
        self.link(pb, ga);
        self.free_vertex(b);
        self.adjust_outgoing(a);
        Ok(a)
    }

    /// Zip two open edges into one, merging their endpoint pairs with
    /// opposite orientation. Returns the merged `(v1, v2)`.
    pub fn merge_edges(
        &mut self,
        a: EdgeHandle,
        b: EdgeHandle,
    ) -> Result<(VertexHandle, VertexHandle)> {
        self.check_edge(a)?;
        self.check_edge(b)?;
        if a == b {
            return Err(MeshError::NonManifold("cannot zip an edge onto itself"));
        }
        let ha = self.open_half(a)?;
        let hb = self.open_half(b)?;

        let (a0, a1) = (self.start_vertex(ha), self.end_vertex(ha));
        let (b0, b1) = (self.start_vertex(hb), self.end_vertex(hb));

        // Opposite orientation: the surviving faces land on opposite sides.
        let v1 = if a0 == b1 {
            a0
        } else {
            self.merge_vertices(a0, b1)?
        };
        let v2 = if a1 == b0 {
            a1
        } else {
            self.merge_vertices(a1, b0)?
        };

        // The vertex merges may have already identified the two edges (a
        // triangle side collapsing onto its neighbor).
        if !self.contains_edge(a) || !self.contains_edge(b) {
            return Ok((v1, v2));
        }

        let ia = self.twin(ha);
        let ib = self.twin(hb);
        let (ha_prev, ha_next) = (self.prev(ha), self.next(ha));
        let (hb_prev, hb_next) = (self.prev(hb), self.next(hb));

        // Splice the two open halves out of the boundary chains.
        if ha_next == hb && hb_next == ha {
            // They already close a 2-cycle; nothing external to relink.
        } else if ha_next == hb {
            self.link(ha_prev, hb_next);
        } else if hb_next == ha {
            self.link(hb_prev, ha_next);
        } else {
            self.link(ha_prev, hb_next);
            self.link(hb_prev, ha_next);
        }

        self.halfedges[ia].twin = ib;
        self.halfedges[ib].twin = ia;
        let kept = self.edge_of(ia);
        self.halfedges[ib].edge = kept;
        self.edges[kept].half = ia;

        for v in [v1, v2] {
            let vh = self.vertices[v].halfedge;
            if vh == ha || vh == hb {
                self.vertices[v].halfedge = if self.start_vertex(ib) == v { ib } else { ia };
            }
        }

        let (iha, ihb) = (ha.index(), hb.index());
        self.halfedges.free(ha).expect("freeing dead half-edge");
        self.halfedges.free(hb).expect("freeing dead half-edge");
        self.record(super::StreamKind::HalfEdge, iha, false);
        self.record(super::StreamKind::HalfEdge, ihb, false);
        self.edges.free(b).expect("freeing dead edge");

        self.adjust_outgoing(v1);
        self.adjust_outgoing(v2);
        Ok((v1, v2))
    }

    pub(crate) fn open_half(&self, e: EdgeHandle) -> Result<HalfEdgeHandle> {
        let h = self.half_of(e);
        if self.is_boundary_halfedge(h) {
            Ok(h)
        } else if self.is_boundary_halfedge(self.twin(h)) {
            Ok(self.twin(h))
        } else {
            Err(MeshError::NonManifold("edge has faces on both sides"))
        }
    }

    /// Add a face connecting two open edges: a quad in general, a triangle
    /// when they share a vertex.
    pub fn bridge_edges(&mut self, a: EdgeHandle, b: EdgeHandle) -> Result<FaceHandle> {
        self.check_edge(a)?;
        self.check_edge(b)?;
        if a == b {
            return Err(MeshError::BadPolygon("cannot bridge an edge to itself"));
        }
        let ha = self.open_half(a)?;
        let hb = self.open_half(b)?;

        let (u, v) = (self.start_vertex(ha), self.end_vertex(ha));
        let (s, t) = (self.start_vertex(hb), self.end_vertex(hb));

        if v == s && t == u {
            return Err(MeshError::BadPolygon("edges already close a loop"));
        }
        if v == s {
            self.add_face(&[u, v, t])
        } else if t == u {
            self.add_face(&[u, v, s])
        } else {
            self.add_face(&[u, v, s, t])
        }
    }

    // ==================== Bulk operators ====================

    /// Duplicate each face and, optionally, connect the duplicate to the
    /// original's boundary with a ring of quads (the extrude primitive).
    ///
    /// With `create_connecting`, each original must be free-standing (no
    /// face on the far side of any of its edges); it is reversed in place so
    /// the ring and the duplicate close into a consistently-oriented shell.
    /// Items that cannot be processed are rolled back and reported in
    /// `statuses`.
    pub fn bevel_faces(&mut self, faces: &[FaceHandle], create_connecting: bool) -> BevelOutcome {
        let mut out = BevelOutcome::default();

        for &f in faces {
            if !self.contains_face(f) {
                out.statuses.push(ItemStatus::Skipped(MeshError::StaleHandle {
                    kind: "face",
                    index: f.index() as u32,
                }));
                continue;
            }
            let snapshot = self.clone();
            let marks = (
                out.new_faces.len(),
                out.flipped.len(),
                out.connecting_faces.len(),
                out.vertex_map.len(),
            );
            match self.bevel_one_face(f, create_connecting, &mut out) {
                Ok(()) => out.statuses.push(ItemStatus::Ok),
                Err(err) => {
                    *self = snapshot;
                    out.new_faces.truncate(marks.0);
                    out.flipped.truncate(marks.1);
                    out.connecting_faces.truncate(marks.2);
                    out.vertex_map.truncate(marks.3);
                    out.statuses.push(ItemStatus::Skipped(err));
                }
            }
        }
        out
    }

    fn bevel_one_face(
        &mut self,
        f: FaceHandle,
        create_connecting: bool,
        out: &mut BevelOutcome,
    ) -> Result<()> {
        if create_connecting {
            let blocked = self
                .face_halfedges(f)
                .any(|h| !self.is_boundary_halfedge(self.twin(h)));
            if blocked {
                return Err(MeshError::NonManifold(
                    "connected bevel requires open far sides",
                ));
            }
        }

        let loop_verts: Vec<VertexHandle> = self.face_vertices(f).collect();
        let n = loop_verts.len();

        let dups: Vec<VertexHandle> = (0..n).map(|_| self.alloc_vertex()).collect();
        for i in 0..n {
            out.vertex_map.push((loop_verts[i], dups[i]));
        }

        if !create_connecting {
            let dup_face = self.add_face(&dups)?;
            out.new_faces.push((f, dup_face));
            return Ok(());
        }

        // Reverse the original in place so the new shell is consistently
        // oriented: the ring quads take the freshly-opened sides.
        self.clear_face(f);
        let reversed: Vec<VertexHandle> = loop_verts.iter().rev().copied().collect();
        let flipped = self.add_face(&reversed)?;
        out.flipped.push((f, flipped));

        let dup_face = self.add_face(&dups)?;
        out.new_faces.push((f, dup_face));

        for i in 0..n {
            let j = (i + 1) % n;
            let quad = self.add_face(&[loop_verts[i], loop_verts[j], dups[j], dups[i]])?;
            out.connecting_faces.push(quad);
        }
        Ok(())
    }

    /// Extrude a strip of open edges: each input edge gets a quad attached
    /// to its open side, built over duplicated endpoints shared along the
    /// strip. Positions of the duplicates are the caller's business.
    pub fn extend_edges(&mut self, edges: &[EdgeHandle]) -> ExtendOutcome {
        let mut out = ExtendOutcome::default();
        let mut dup_of: Vec<(VertexHandle, VertexHandle)> = Vec::new();

        for &e in edges {
            if !self.contains_edge(e) {
                out.statuses.push(ItemStatus::Skipped(MeshError::StaleHandle {
                    kind: "edge",
                    index: e.index() as u32,
                }));
                continue;
            }
            let hd = match self.open_half(e) {
                Ok(h) => h,
                Err(err) => {
                    out.statuses.push(ItemStatus::Skipped(err));
                    continue;
                }
            };
            let d0 = self.start_vertex(hd);
            let d1 = self.end_vertex(hd);

            let snapshot = self.clone();
            let dup_len = dup_of.len();
            let mut dup = |topo: &mut Self, v: VertexHandle,
                           map: &mut Vec<(VertexHandle, VertexHandle)>| {
                if let Some(&(_, d)) = map.iter().find(|(old, _)| *old == v) {
                    d
                } else {
                    let d = topo.alloc_vertex();
                    map.push((v, d));
                    d
                }
            };
            let d0p = dup(self, d0, &mut dup_of);
            let d1p = dup(self, d1, &mut dup_of);

            match self.add_face(&[d0, d1, d1p, d0p]) {
                Ok(quad) => {
                    out.new_faces.push(quad);
                    out.statuses.push(ItemStatus::Ok);
                }
                Err(err) => {
                    *self = snapshot;
                    dup_of.truncate(dup_len);
                    out.statuses.push(ItemStatus::Skipped(err));
                }
            }
        }
        out.vertex_map = dup_of;
        out
    }

    /// Tear the listed interior edges apart: each becomes two co-located
    /// open edges, and vertices whose fans are cut into separate sectors are
    /// duplicated per sector.
    pub fn split_edges(&mut self, edges: &[EdgeHandle]) -> Result<SplitOutcome> {
        let mut out = SplitOutcome::default();

        let targets: Vec<EdgeHandle> = edges
            .iter()
            .copied()
            .filter(|&e| self.contains_edge(e) && !self.is_open_edge(e))
            .collect();
        if targets.is_empty() {
            return Ok(out);
        }

        let mut affected: Vec<VertexHandle> = Vec::new();
        let mut incident: Vec<HalfEdgeHandle> = Vec::new();
        for &e in &targets {
            let (a, b) = self.edge_vertices(e);
            for v in [a, b] {
                if !affected.contains(&v) {
                    affected.push(v);
                    incident.extend(self.outgoing_halfedges(v));
                }
            }
        }

        // Phase 1: re-pair each target so each face keeps its own half,
        // twinned with a fresh open half.
        for &e in &targets {
            let h1 = self.half_of(e);
            let h2 = self.twin(h1);
            let a = self.start_vertex(h1);
            let b = self.end_vertex(h1);

            let (o2, o1, e2) = self.alloc_edge_pair(a, b);
            incident.push(o1);
            incident.push(o2);

            self.halfedges[h1].twin = o1;
            self.halfedges[o1].twin = h1;
            self.halfedges[h2].twin = o2;
            self.halfedges[o2].twin = h2;

            self.halfedges[h2].edge = e2;
            self.halfedges[o2].edge = e2;
            self.edges[e2].half = h2;
            self.halfedges[o1].edge = e;
            self.edges[e].half = h1;

            // Placeholder loop; the boundary re-link below overwrites it.
            self.link(o1, o2);
            self.link(o2, o1);
            out.new_edges.push(e2);
        }

        // Phase 2: rebuild boundary next/prev around every affected vertex.
        // For each open incoming half-edge, rotate clockwise through face
        // sectors until the first open outgoing one.
        for &hin in &incident {
            if !self.contains_halfedge(hin) || !self.is_boundary_halfedge(hin) {
                continue;
            }
            let v = self.end_vertex(hin);
            if !affected.contains(&v) {
                continue;
            }
            let mut g = self.twin(hin);
            let mut guard = 0usize;
            while !self.is_boundary_halfedge(g) {
                g = self.twin(self.prev(g));
                guard += 1;
                if guard > self.num_halfedges() {
                    return Err(MeshError::NonManifold("boundary relink diverged"));
                }
            }
            self.link(hin, g);
        }
        // Incoming halves also live in `incident` as twins of outgoing ones;
        // walk those too.
        for &hout in &incident {
            if !self.contains_halfedge(hout) {
                continue;
            }
            let hin = self.twin(hout);
            if !self.is_boundary_halfedge(hin) {
                continue;
            }
            let v = self.end_vertex(hin);
            if !affected.contains(&v) {
                continue;
            }
            let mut g = self.twin(hin);
            let mut guard = 0usize;
            while !self.is_boundary_halfedge(g) {
                g = self.twin(self.prev(g));
                guard += 1;
                if guard > self.num_halfedges() {
                    return Err(MeshError::NonManifold("boundary relink diverged"));
                }
            }
            self.link(hin, g);
        }

        // Phase 3: split vertex fans that the tear disconnected. Outgoing
        // half-edges are grouped by shared face sectors (h and
        // twin(prev(h)) always border the same sector).
        for &v in &affected {
            let outgoing: Vec<HalfEdgeHandle> = incident
                .iter()
                .copied()
                .filter(|&h| self.contains_halfedge(h) && self.start_vertex(h) == v)
                .collect();
            if outgoing.len() < 2 {
                continue;
            }

            let mut component: Vec<usize> = (0..outgoing.len()).collect();
            fn find(c: &mut [usize], i: usize) -> usize {
                let mut root = i;
                while c[root] != root {
                    root = c[root];
                }
                let mut cur = i;
                while c[cur] != root {
                    let next = c[cur];
                    c[cur] = root;
                    cur = next;
                }
                root
            }
            for (i, &h) in outgoing.iter().enumerate() {
                let mate = self.twin(self.prev(h));
                if let Some(j) = outgoing.iter().position(|&g| g == mate) {
                    let (ri, rj) = (find(&mut component, i), find(&mut component, j));
                    if ri != rj {
                        component[ri] = rj;
                    }
                }
            }

            let mut roots: Vec<usize> = Vec::new();
            for i in 0..outgoing.len() {
                let r = find(&mut component, i);
                if !roots.contains(&r) {
                    roots.push(r);
                }
            }
            if roots.len() < 2 {
                continue;
            }

            // First sector keeps the original vertex.
            for &root in roots.iter().skip(1) {
                let dup = self.alloc_vertex();
                out.vertex_map.push((v, dup));
                for (i, &h) in outgoing.iter().enumerate() {
                    if find(&mut component, i) == root {
                        let inc = self.twin(h);
                        self.halfedges[inc].end_vertex = dup;
                    }
                }
                let first = outgoing
                    .iter()
                    .enumerate()
                    .find(|(i, _)| find(&mut component, *i) == root)
                    .map(|(_, &h)| h)
                    .expect("non-empty sector");
                self.vertices[dup].halfedge = first;
                self.adjust_outgoing(dup);
            }
            let keep = outgoing
                .iter()
                .enumerate()
                .find(|(i, _)| find(&mut component, *i) == roots[0])
                .map(|(_, &h)| h)
                .expect("non-empty sector");
            self.vertices[v].halfedge = keep;
            self.adjust_outgoing(v);
        }

        // Vertices whose fan stayed in one piece still gained open
        // half-edges; keep their outgoing pointers boundary-first.
        for &v in &affected {
            if self.contains_vertex(v) {
                self.adjust_outgoing(v);
            }
        }

        Ok(out)
    }

    /// Reverse every face cycle (and boundary loop) in the mesh. Twin pairs
    /// and edge records are untouched; every half-edge reverses direction.
    pub fn flip_all_faces(&mut self) {
        let snapshot: Vec<(HalfEdgeHandle, VertexHandle, HalfEdgeHandle, HalfEdgeHandle)> = self
            .halfedges
            .iter()
            .map(|(h, rec)| (h, rec.end_vertex, rec.next, rec.prev))
            .collect();
        let twin_ends: Vec<(HalfEdgeHandle, VertexHandle)> = snapshot
            .iter()
            .map(|&(h, ..)| (h, self.end_vertex(self.twin(h))))
            .collect();

        for ((h, _, next, prev), (_, new_end)) in snapshot.iter().zip(twin_ends.iter()) {
            let rec = &mut self.halfedges[*h];
            rec.end_vertex = *new_end;
            rec.next = *prev;
            rec.prev = *next;
        }

        let verts: Vec<VertexHandle> = self.vertex_handles().collect();
        for v in verts {
            let vh = self.vertices[v].halfedge;
            if ElementHandle::is_valid(vh) {
                self.vertices[v].halfedge = self.twin(vh);
                self.adjust_outgoing(v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Topology;

    fn quad_topology() -> (Topology, Vec<VertexHandle>, FaceHandle) {
        let mut topo = Topology::new();
        let vs: Vec<_> = (0..4).map(|_| topo.add_vertex()).collect();
        let f = topo.add_face(&vs).unwrap();
        (topo, vs, f)
    }

    fn grid_2x2() -> (Topology, Vec<VertexHandle>, Vec<FaceHandle>) {
        // 3x3 vertices, 4 quads.
        let mut topo = Topology::new();
        let vs: Vec<_> = (0..9).map(|_| topo.add_vertex()).collect();
        let mut faces = Vec::new();
        for j in 0..2 {
            for i in 0..2 {
                let a = j * 3 + i;
                faces.push(
                    topo.add_face(&[vs[a], vs[a + 1], vs[a + 4], vs[a + 3]])
                        .unwrap(),
                );
            }
        }
        (topo, vs, faces)
    }

    #[test]
    fn test_add_face_rejects_bad_input() {
        let mut topo = Topology::new();
        let vs: Vec<_> = (0..3).map(|_| topo.add_vertex()).collect();

        assert!(matches!(
            topo.add_face(&[vs[0], vs[1]]),
            Err(MeshError::BadPolygon(_))
        ));
        assert!(matches!(
            topo.add_face(&[vs[0], vs[1], vs[0]]),
            Err(MeshError::BadPolygon(_))
        ));

        // Same winding twice over the same loop: second face must fail and
        // leave the mesh untouched.
        topo.add_face(&vs).unwrap();
        let before = topo.num_halfedges();
        assert!(topo.add_face(&vs).is_err());
        assert_eq!(topo.num_halfedges(), before);
        assert!(topo.validate());
    }

    #[test]
    fn test_grid_construction() {
        let (topo, vs, _) = grid_2x2();
        assert_eq!(topo.num_vertices(), 9);
        assert_eq!(topo.num_faces(), 4);
        assert_eq!(topo.num_edges(), 12);
        assert!(topo.validate());
        // Disk: V - E + F = 1.
        assert_eq!(topo.euler_characteristic(), 1);
        // Center vertex is interior with 4 edges.
        assert!(!topo.is_boundary_vertex(vs[4]));
        assert_eq!(topo.vertex_degree(vs[4]), 4);
    }

    #[test]
    fn test_closed_cube() {
        let mut topo = Topology::new();
        let vs: Vec<_> = (0..8).map(|_| topo.add_vertex()).collect();
        let quads = [
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [1, 2, 6, 5],
            [2, 3, 7, 6],
            [3, 0, 4, 7],
        ];
        for q in quads {
            topo.add_face(&[vs[q[0]], vs[q[1]], vs[q[2]], vs[q[3]]])
                .unwrap();
        }
        assert!(topo.validate());
        assert_eq!(topo.num_faces(), 6);
        assert_eq!(topo.num_edges(), 12);
        assert_eq!(topo.euler_characteristic(), 2);
        for &v in &vs {
            assert!(!topo.is_boundary_vertex(v));
            assert_eq!(topo.vertex_degree(v), 3);
        }
    }

    #[test]
    fn test_remove_face_strips_loose_edges() {
        let (mut topo, vs, f) = quad_topology();
        topo.remove_face(f, false).unwrap();
        assert_eq!(topo.num_faces(), 0);
        assert_eq!(topo.num_edges(), 0);
        assert_eq!(topo.num_vertices(), 0);
        assert!(topo.validate());
        assert!(!topo.contains_vertex(vs[0]));
    }

    #[test]
    fn test_remove_face_keeps_shared_edges() {
        let (mut topo, _, faces) = grid_2x2();
        topo.remove_face(faces[0], true).unwrap();
        assert_eq!(topo.num_faces(), 3);
        // The two edges shared with neighbors stay; the two rim edges of the
        // removed quad were its alone and went with it.
        assert_eq!(topo.num_edges(), 10);
        assert!(topo.validate());
    }

    #[test]
    fn test_remove_vertex_center_of_grid() {
        let (mut topo, vs, _) = grid_2x2();
        topo.remove_vertex(vs[4], false).unwrap();
        assert_eq!(topo.num_faces(), 0);
        assert_eq!(topo.num_vertices(), 8);
        // The four spokes died with the vertex; the rim survives as loose
        // edges when remove_loose_edges is off.
        assert_eq!(topo.num_edges(), 8);
        assert!(topo.validate());

        let (mut topo, vs, _) = grid_2x2();
        topo.remove_vertex(vs[4], true).unwrap();
        assert_eq!(topo.num_edges(), 0);
        assert!(topo.validate());
    }

    #[test]
    fn test_remove_edge() {
        let (mut topo, vs, _) = grid_2x2();
        let e = topo.find_edge(vs[1], vs[4]).unwrap();
        topo.remove_edge(e, true).unwrap();
        assert_eq!(topo.num_faces(), 2);
        assert!(topo.find_edge(vs[1], vs[4]).is_none());
        assert!(topo.validate());
    }

    #[test]
    fn test_add_vertex_to_edge_splits_both_cycles() {
        let (mut topo, vs, _) = grid_2x2();
        let e = topo.find_edge(vs[1], vs[4]).unwrap();
        let (f0, f1) = topo.edge_faces(e);
        let (v, e1, e2) = topo.add_vertex_to_edge(e).unwrap();

        assert!(topo.validate());
        assert_eq!(topo.face_valence(f0), 5);
        assert_eq!(topo.face_valence(f1), 5);
        assert_eq!(topo.vertex_degree(v), 2);
        let (a, _) = topo.edge_vertices(e1);
        let (_, d) = topo.edge_vertices(e2);
        assert!(a == vs[1] || a == v);
        assert!(d == vs[4] || d == v);
    }

    #[test]
    fn test_add_vertex_to_loose_edge() {
        let mut topo = Topology::new();
        let a = topo.add_vertex();
        let b = topo.add_vertex();
        let e = topo.add_edge(a, b).unwrap();
        let (v, ..) = topo.add_vertex_to_edge(e).unwrap();
        assert!(topo.validate());
        assert_eq!(topo.num_edges(), 2);
        assert_eq!(topo.vertex_degree(v), 2);
    }

    #[test]
    fn test_add_edge_to_face_splits() {
        let (mut topo, vs, f) = quad_topology();
        let (e, g) = topo.add_edge_to_face(f, vs[0], vs[2]).unwrap();
        assert!(topo.validate());
        assert_eq!(topo.num_faces(), 2);
        assert_eq!(topo.face_valence(f), 3);
        assert_eq!(topo.face_valence(g), 3);
        let (fa, fb) = topo.edge_faces(e);
        assert!(fa == f && fb == g || fa == g && fb == f);

        // Chord along an existing edge is refused.
        assert!(topo.add_edge_to_face(f, vs[0], vs[1]).is_err());
    }

    #[test]
    fn test_collapse_edge_in_grid() {
        let (mut topo, vs, _) = grid_2x2();
        let e = topo.find_edge(vs[4], vs[5]).unwrap();
        let before_faces = topo.num_faces();
        let collapse = topo.collapse_edge(e).unwrap();

        assert!(topo.validate());
        assert_eq!(collapse.vertex, vs[4]);
        assert!(!topo.contains_vertex(vs[5]));
        // Quads shrink to triangles; no face dies.
        assert_eq!(topo.num_faces(), before_faces);
        assert!(collapse.replaced.is_empty());
    }

    #[test]
    fn test_collapse_edge_dissolves_triangles() {
        // Two triangles sharing an edge; collapsing it dissolves both and
        // reports both edge identifications.
        let mut topo = Topology::new();
        let vs: Vec<_> = (0..4).map(|_| topo.add_vertex()).collect();
        topo.add_face(&[vs[0], vs[1], vs[2]]).unwrap();
        topo.add_face(&[vs[1], vs[0], vs[3]]).unwrap();

        let e = topo.find_edge(vs[0], vs[1]).unwrap();
        let collapse = topo.collapse_edge(e).unwrap();
        assert!(topo.validate());
        assert_eq!(topo.num_faces(), 0);
        assert_eq!(topo.num_vertices(), 3);
        assert_eq!(topo.num_edges(), 2);
        assert_eq!(collapse.replaced.len(), 2);
        assert_eq!(topo.vertex_degree(collapse.vertex), 2);
    }

    #[test]
    fn test_collapse_rejects_pinch() {
        // Two triangles sharing only the edge endpoints (not the edge's
        // faces): a and b share neighbor x through separate triangles.
        let mut topo = Topology::new();
        let a = topo.add_vertex();
        let b = topo.add_vertex();
        let x = topo.add_vertex();
        let p = topo.add_vertex();
        let q = topo.add_vertex();
        topo.add_face(&[a, b, p]).unwrap();
        topo.add_face(&[b, a, q]).unwrap();
        topo.add_face(&[a, p, x]).unwrap();
        // x-b edge via a separate triangle on the other side.
        topo.add_face(&[b, q, x]).unwrap();
        let e = topo.find_edge(a, b).unwrap();
        // x is a common neighbor but not an apex of e's faces.
        let ex = topo.find_edge(a, x);
        let eb = topo.find_edge(b, x);
        assert!(ex.is_some() && eb.is_some());
        assert!(matches!(
            topo.collapse_edge(e),
            Err(MeshError::NonManifold(_))
        ));
        assert!(topo.validate());
    }

    #[test]
    fn test_collapse_rejects_bowtie() {
        // Two triangles over the same three vertices, glued along one edge
        // with the same apex on both sides.
        let mut topo = Topology::new();
        let a = topo.add_vertex();
        let b = topo.add_vertex();
        let c = topo.add_vertex();
        topo.add_face(&[a, b, c]).unwrap();
        topo.add_face(&[b, a, c]).unwrap();
        assert!(topo.validate());

        let e = topo.find_edge(a, b).unwrap();
        assert!(matches!(
            topo.collapse_edge(e),
            Err(MeshError::NonManifold(_))
        ));
        assert!(topo.validate());
    }

    #[test]
    fn test_split_then_collapse_restores_topology() {
        let (mut topo, vs, _) = grid_2x2();
        let before = (
            topo.num_vertices(),
            topo.num_edges(),
            topo.num_faces(),
            topo.num_halfedges(),
        );

        let e = topo.find_edge(vs[4], vs[5]).unwrap();
        let (_, _, e2) = topo.add_vertex_to_edge(e).unwrap();
        assert!(topo.validate());
        let collapse = topo.collapse_edge(e2).unwrap();
        assert!(topo.validate());
        assert!(collapse.replaced.is_empty());

        let after = (
            topo.num_vertices(),
            topo.num_edges(),
            topo.num_faces(),
            topo.num_halfedges(),
        );
        assert_eq!(before, after);
    }

    #[test]
    fn test_merge_vertices_weld() {
        // Two separate triangles; welding one vertex from each.
        let mut topo = Topology::new();
        let t1: Vec<_> = (0..3).map(|_| topo.add_vertex()).collect();
        let t2: Vec<_> = (0..3).map(|_| topo.add_vertex()).collect();
        topo.add_face(&t1).unwrap();
        topo.add_face(&t2).unwrap();

        let kept = topo.merge_vertices(t1[0], t2[0]).unwrap();
        assert_eq!(kept, t1[0]);
        assert!(!topo.contains_vertex(t2[0]));
        assert!(topo.validate());
        assert_eq!(topo.num_vertices(), 5);
        assert_eq!(topo.num_faces(), 2);
        assert_eq!(topo.vertex_degree(kept), 4);
    }

    #[test]
    fn test_merge_vertices_with_edge_collapses() {
        let (mut topo, vs, _) = grid_2x2();
        let kept = topo.merge_vertices(vs[4], vs[5]).unwrap();
        assert_eq!(kept, vs[4]);
        assert!(!topo.contains_vertex(vs[5]));
        assert!(topo.validate());
    }

    #[test]
    fn test_merge_edges_zips() {
        // Two quads sharing nothing; zip their facing open edges.
        let mut topo = Topology::new();
        let q1: Vec<_> = (0..4).map(|_| topo.add_vertex()).collect();
        let q2: Vec<_> = (0..4).map(|_| topo.add_vertex()).collect();
        topo.add_face(&q1).unwrap();
        topo.add_face(&q2).unwrap();

        let ea = topo.find_edge(q1[1], q1[2]).unwrap();
        let eb = topo.find_edge(q2[3], q2[0]).unwrap();
        let (v1, v2) = topo.merge_edges(ea, eb).unwrap();

        assert!(topo.validate());
        assert_eq!(topo.num_faces(), 2);
        assert_eq!(topo.num_vertices(), 6);
        assert_eq!(topo.num_edges(), 7);
        let e = topo.find_edge(v1, v2).unwrap();
        assert!(!topo.is_open_edge(e));
    }

    #[test]
    fn test_bridge_edges_quad_and_triangle() {
        let mut topo = Topology::new();
        let t1: Vec<_> = (0..3).map(|_| topo.add_vertex()).collect();
        let t2: Vec<_> = (0..3).map(|_| topo.add_vertex()).collect();
        topo.add_face(&t1).unwrap();
        topo.add_face(&t2).unwrap();

        let ea = topo.find_edge(t1[0], t1[1]).unwrap();
        let eb = topo.find_edge(t2[0], t2[1]).unwrap();
        let f = topo.bridge_edges(ea, eb).unwrap();
        assert_eq!(topo.face_valence(f), 4);
        assert!(topo.validate());

        // Shared-vertex case bridges with a triangle.
        let mut topo = Topology::new();
        let a = topo.add_vertex();
        let b = topo.add_vertex();
        let c = topo.add_vertex();
        let e1 = topo.add_edge(a, b).unwrap();
        let e2 = topo.add_edge(b, c).unwrap();
        let f = topo.bridge_edges(e1, e2).unwrap();
        assert_eq!(topo.face_valence(f), 3);
        assert!(topo.validate());
    }

    #[test]
    fn test_bevel_face_closes_box() {
        let (mut topo, _, f) = quad_topology();
        let out = topo.bevel_faces(&[f], true);

        assert!(out.statuses[0].is_ok());
        assert!(topo.validate());
        // Original (flipped), duplicate, and 4 ring quads: a closed box.
        assert_eq!(topo.num_faces(), 6);
        assert_eq!(topo.num_vertices(), 8);
        assert_eq!(topo.num_edges(), 12);
        assert_eq!(topo.euler_characteristic(), 2);
        assert_eq!(out.vertex_map.len(), 4);
        assert_eq!(out.connecting_faces.len(), 4);
    }

    #[test]
    fn test_bevel_without_connecting_duplicates() {
        let (mut topo, _, f) = quad_topology();
        let out = topo.bevel_faces(&[f], false);
        assert!(out.statuses[0].is_ok());
        assert!(topo.contains_face(f));
        assert_eq!(topo.num_faces(), 2);
        assert_eq!(topo.num_vertices(), 8);
        assert!(topo.validate());
    }

    #[test]
    fn test_bevel_attached_face_is_skipped() {
        let (mut topo, _, faces) = grid_2x2();
        let before = (topo.num_vertices(), topo.num_edges(), topo.num_faces());
        let out = topo.bevel_faces(&[faces[0]], true);
        assert!(!out.statuses[0].is_ok());
        // Rolled back completely.
        assert_eq!(
            (topo.num_vertices(), topo.num_edges(), topo.num_faces()),
            before
        );
        assert!(topo.validate());
    }

    #[test]
    fn test_extend_edges_attaches_quads() {
        let (mut topo, vs, _) = quad_topology();
        let e0 = topo.find_edge(vs[0], vs[1]).unwrap();
        let e1 = topo.find_edge(vs[1], vs[2]).unwrap();
        let out = topo.extend_edges(&[e0, e1]);

        assert!(out.statuses.iter().all(|s| s.is_ok()));
        assert!(topo.validate());
        assert_eq!(out.new_faces.len(), 2);
        // Shared strip vertex duplicated once: 3 new vertices.
        assert_eq!(out.vertex_map.len(), 3);
        assert_eq!(topo.num_faces(), 3);
    }

    #[test]
    fn test_split_edges_tears_grid() {
        let (mut topo, vs, _) = grid_2x2();
        // Tear the two vertical interior edges: a full cut through the grid.
        let e_top = topo.find_edge(vs[1], vs[4]).unwrap();
        let e_bottom = topo.find_edge(vs[4], vs[7]).unwrap();
        let out = topo.split_edges(&[e_top, e_bottom]).unwrap();

        assert!(topo.validate());
        assert_eq!(out.new_edges.len(), 2);
        // The center vertex and the two rim endpoints split into two copies
        // each (the cut runs straight through the grid).
        assert_eq!(out.vertex_map.len(), 3);
        assert_eq!(topo.num_vertices(), 12);
        assert_eq!(topo.num_faces(), 4);
        // Two separate 1x2 sheets now.
        assert_eq!(topo.euler_characteristic(), 2);
    }

    #[test]
    fn test_split_single_interior_edge() {
        let (mut topo, vs, _) = grid_2x2();
        let e = topo.find_edge(vs[1], vs[4]).unwrap();
        let out = topo.split_edges(&[e]).unwrap();
        assert!(topo.validate());
        assert_eq!(out.new_edges.len(), 1);
        // The cut reaches the rim at vs[1], so that vertex splits; the
        // interior endpoint pinches and stays single.
        assert_eq!(out.vertex_map.len(), 1);
        assert_eq!(out.vertex_map[0].0, vs[1]);
        assert_eq!(topo.num_vertices(), 10);
        assert_eq!(topo.num_edges(), 13);
    }

    #[test]
    fn test_flip_all_faces_involution() {
        let (mut topo, vs, f) = quad_topology();
        let order_before: Vec<_> = topo.face_vertices(f).collect();
        topo.flip_all_faces();
        assert!(topo.validate());
        let order_flipped: Vec<_> = topo.face_vertices(f).collect();
        // Same vertex set, reversed cyclic order.
        let mut reversed = order_flipped.clone();
        reversed.reverse();
        let start = order_before
            .iter()
            .position(|v| *v == reversed[0])
            .unwrap();
        for (i, v) in reversed.iter().enumerate() {
            assert_eq!(*v, order_before[(start + i) % 4]);
        }

        topo.flip_all_faces();
        assert!(topo.validate());
        let order_after: Vec<_> = topo.face_vertices(f).collect();
        let start = order_before
            .iter()
            .position(|v| *v == order_after[0])
            .unwrap();
        for (i, v) in order_after.iter().enumerate() {
            assert_eq!(*v, order_before[(start + i) % 4]);
        }
        let _ = vs;
    }
}
