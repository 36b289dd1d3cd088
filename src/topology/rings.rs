//! Edge-list algorithms: rings, loops, islands, ribs, and connectivity
//! classification for selection sets.

use nalgebra::Point3;

use crate::error::Result;
use crate::handle::{EdgeHandle, ElementHandle, VertexHandle};

use super::Topology;

/// Shape of an edge selection, from a single pass counting endpoint
/// occurrences per vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeListConnectivity {
    /// Empty selection.
    None,
    /// An open chain: exactly two endpoint vertices used once.
    List,
    /// Closed: every vertex used exactly twice.
    Loop,
    /// Branching or disconnected ends.
    Mixed,
}

/// The edges perpendicular to one selection edge, per adjacent face.
#[derive(Debug, Clone, Copy)]
pub struct EdgeRib {
    /// The selection edge.
    pub edge: EdgeHandle,
    /// For each side with a face: the `(previous, next)` edges flanking the
    /// selection edge in that face's cycle.
    pub sides: [Option<(EdgeHandle, EdgeHandle)>; 2],
}

impl Topology {
    /// Walk the edge ring through quads: alternate `twin` with the opposite
    /// edge in each quad face, in both directions, stopping at boundaries,
    /// non-quad faces, or when the ring closes.
    pub fn find_edge_ring(&self, e: EdgeHandle) -> Result<Vec<EdgeHandle>> {
        self.check_edge(e)?;
        let mut ring = vec![e];

        let start = self.half_of(e);
        for side in [start, self.twin(start)] {
            let mut h = side;
            loop {
                let f = self.face_of(h);
                if !ElementHandle::is_valid(f) || self.face_valence(f) != 4 {
                    break;
                }
                let opposite = self.next(self.next(h));
                let oe = self.edge_of(opposite);
                if ring.contains(&oe) {
                    // Closed ring (or a self-crossing selection): stop here
                    // and skip the second direction.
                    return Ok(ring);
                }
                ring.push(oe);
                h = self.twin(opposite);
            }
        }
        Ok(ring)
    }

    /// Walk the edge loop through vertices: at each endpoint pick the edge
    /// that best preserves the walking direction (largest dot product with
    /// the incoming direction), stopping at dead ends, closure, or
    /// `step_limit` steps per direction.
    pub fn find_edge_loop<P>(
        &self,
        e: EdgeHandle,
        step_limit: usize,
        pos: P,
    ) -> Result<Vec<EdgeHandle>>
    where
        P: Fn(VertexHandle) -> Point3<f64>,
    {
        self.check_edge(e)?;
        let mut loop_edges = vec![e];
        let (a, b) = self.edge_vertices(e);

        for (origin, mut from, mut at) in [(a, a, b), (b, b, a)] {
            let mut steps = 0usize;
            while steps < step_limit && at != origin {
                let v = pos(at) - pos(from);
                let len = v.norm();
                if len < 1e-12 {
                    break;
                }
                let dir = v / len;

                let mut best: Option<(f64, EdgeHandle, VertexHandle)> = None;
                for h in self.outgoing_halfedges(at) {
                    let candidate = self.edge_of(h);
                    if loop_edges.contains(&candidate) {
                        continue;
                    }
                    let other = self.end_vertex(h);
                    let w = pos(other) - pos(at);
                    let wl = w.norm();
                    if wl < 1e-12 {
                        continue;
                    }
                    let d = dir.dot(&(w / wl));
                    match best {
                        Some((bd, ..)) if d <= bd => {}
                        _ => best = Some((d, candidate, other)),
                    }
                }

                // Only straight-ish continuations extend the loop.
                match best {
                    Some((d, candidate, other)) if d > 0.0 => {
                        loop_edges.push(candidate);
                        from = at;
                        at = other;
                        steps += 1;
                    }
                    _ => break,
                }
            }
        }
        Ok(loop_edges)
    }

    /// Partition an edge selection into islands connected by shared
    /// vertices.
    pub fn find_edge_islands(&self, edges: &[EdgeHandle]) -> Result<Vec<Vec<EdgeHandle>>> {
        for &e in edges {
            self.check_edge(e)?;
        }

        let n = edges.len();
        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut [usize], i: usize) -> usize {
            let mut root = i;
            while parent[root] != root {
                root = parent[root];
            }
            let mut cur = i;
            while parent[cur] != root {
                let next = parent[cur];
                parent[cur] = root;
                cur = next;
            }
            root
        }

        let mut first_at_vertex: Vec<(VertexHandle, usize)> = Vec::new();
        for (i, &e) in edges.iter().enumerate() {
            let (a, b) = self.edge_vertices(e);
            for v in [a, b] {
                match first_at_vertex.iter().find(|(u, _)| *u == v) {
                    Some(&(_, j)) => {
                        let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                        if ri != rj {
                            parent[ri] = rj;
                        }
                    }
                    None => first_at_vertex.push((v, i)),
                }
            }
        }

        let mut islands: Vec<(usize, Vec<EdgeHandle>)> = Vec::new();
        for (i, &e) in edges.iter().enumerate() {
            let root = find(&mut parent, i);
            match islands.iter_mut().find(|(r, _)| *r == root) {
                Some((_, island)) => island.push(e),
                None => islands.push((root, vec![e])),
            }
        }
        Ok(islands.into_iter().map(|(_, island)| island).collect())
    }

    /// For each selection edge, the perpendicular edges flanking it in its
    /// adjacent faces.
    pub fn find_edge_ribs(&self, edges: &[EdgeHandle]) -> Result<Vec<EdgeRib>> {
        let mut ribs = Vec::with_capacity(edges.len());
        for &e in edges {
            self.check_edge(e)?;
            let h = self.half_of(e);
            let mut sides = [None, None];
            for (i, side) in [h, self.twin(h)].into_iter().enumerate() {
                if !self.is_boundary_halfedge(side) {
                    sides[i] = Some((
                        self.edge_of(self.prev(side)),
                        self.edge_of(self.next(side)),
                    ));
                }
            }
            ribs.push(EdgeRib { edge: e, sides });
        }
        Ok(ribs)
    }

    /// Classify an edge selection by endpoint counts: no edges, an open
    /// chain, a closed loop, or anything branching.
    pub fn classify_edge_list_connectivity(
        &self,
        edges: &[EdgeHandle],
    ) -> Result<EdgeListConnectivity> {
        if edges.is_empty() {
            return Ok(EdgeListConnectivity::None);
        }
        let mut counts: Vec<(VertexHandle, usize)> = Vec::with_capacity(edges.len() + 1);
        for &e in edges {
            self.check_edge(e)?;
            let (a, b) = self.edge_vertices(e);
            for v in [a, b] {
                match counts.iter_mut().find(|(u, _)| *u == v) {
                    Some((_, c)) => *c += 1,
                    None => counts.push((v, 1)),
                }
            }
        }

        let mut ends = 0usize;
        for &(_, c) in &counts {
            match c {
                1 => ends += 1,
                2 => {}
                _ => return Ok(EdgeListConnectivity::Mixed),
            }
        }
        match ends {
            0 => Ok(EdgeListConnectivity::Loop),
            2 => Ok(EdgeListConnectivity::List),
            _ => Ok(EdgeListConnectivity::Mixed),
        }
    }
}
