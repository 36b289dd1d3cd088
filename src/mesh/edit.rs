//! Compound editing operators.
//!
//! These combine Euler operators with stream bookkeeping: extrusion-style
//! bevels, vertex bevels, face slicing, chord insertion, proximity welding,
//! and cleanup passes. Batch operators report per-item outcomes and keep
//! going past individual failures.

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point2, Point3, Vector2, Vector3};
use tracing::debug;

use crate::error::{ItemStatus, MeshError, Result};
use crate::geom;
use crate::handle::{EdgeHandle, ElementHandle, FaceHandle, VertexHandle};
use crate::topology::{BevelOutcome, ExtendOutcome, SplitOutcome};

use super::{FaceTexture, Mesh, Smoothing};

/// Options for [`Mesh::quad_slice_faces`].
#[derive(Debug, Clone, Copy)]
pub struct QuadSliceOptions {
    /// Number of cuts perpendicular to the first detected side.
    pub cuts_x: usize,
    /// Number of cuts perpendicular to the second detected side.
    pub cuts_y: usize,
    /// Minimum direction change (degrees) for a vertex of a non-quad face
    /// to count as a grid corner.
    pub min_corner_angle_deg: f64,
}

impl Default for QuadSliceOptions {
    fn default() -> Self {
        Self {
            cuts_x: 1,
            cuts_y: 1,
            min_corner_angle_deg: 45.0,
        }
    }
}

impl Mesh {
    // ==================== Bevel / extrude ====================

    /// Duplicate faces and optionally connect the duplicates to the
    /// originals with rings of quads, offsetting the duplicates by `offset`
    /// (the extrude primitive). Attributes carry over from each source face.
    pub fn bevel_faces(
        &mut self,
        faces: &[FaceHandle],
        create_connecting: bool,
        offset: Vector3<f64>,
    ) -> BevelOutcome {
        // Capture source attributes before the topology rewrite frees any
        // flipped originals.
        let mut captured: Vec<(FaceHandle, FaceTexture, i32, Vec<(VertexHandle, Vector2<f64>)>)> =
            Vec::new();
        for &f in faces {
            if self.topo.contains_face(f) {
                let corners = self
                    .topo
                    .face_halfedges(f)
                    .map(|h| (self.topo.end_vertex(h), self.texcoord_unchecked(h)))
                    .collect();
                captured.push((
                    f,
                    self.face_texture_unchecked(f),
                    self.material_unchecked(f),
                    corners,
                ));
            }
        }

        let out = self.topo.bevel_faces(faces, create_connecting);
        self.sync_streams();

        let corner_of = |captured: &[(FaceHandle, FaceTexture, i32, Vec<(VertexHandle, Vector2<f64>)>)],
                         src: FaceHandle,
                         v: VertexHandle|
         -> Vector2<f64> {
            captured
                .iter()
                .find(|(f, ..)| *f == src)
                .and_then(|(_, _, _, corners)| {
                    corners.iter().find(|(u, _)| *u == v).map(|(_, uv)| *uv)
                })
                .unwrap_or_else(Vector2::zeros)
        };
        let original_of = |out: &BevelOutcome, dup: VertexHandle| -> Option<VertexHandle> {
            out.vertex_map
                .iter()
                .find(|(_, d)| *d == dup)
                .map(|(o, _)| *o)
        };

        // Offset the duplicated vertices.
        for &(orig, dup) in &out.vertex_map {
            let p = self.position_unchecked(orig) + offset;
            self.set_position_unchecked(dup, p);
        }

        // Duplicates and flipped originals inherit the source attributes.
        let mut ring_iter = out.connecting_faces.iter().copied();
        for &(src, dup) in &out.new_faces {
            if let Some((_, tex, mat, _)) = captured.iter().find(|(f, ..)| *f == src) {
                let (tex, mat) = (*tex, *mat);
                self.set_face_texture_unchecked(dup, tex);
                self.set_material_local(dup, mat);
            }
            let corners: Vec<_> = self.topo.face_halfedges(dup).collect();
            for h in corners {
                let dv = self.topo.end_vertex(h);
                if let Some(ov) = original_of(&out, dv) {
                    let uv = corner_of(&captured, src, ov);
                    self.set_texcoord_unchecked(h, uv);
                }
            }

            if create_connecting {
                // The ring quads for this face follow in order, one per
                // loop edge.
                let n = self.topo.face_valence(dup);
                for quad in ring_iter.by_ref().take(n) {
                    if let Some((_, tex, mat, _)) = captured.iter().find(|(f, ..)| *f == src) {
                        let (tex, mat) = (*tex, *mat);
                        self.set_face_texture_unchecked(quad, tex);
                        self.set_material_local(quad, mat);
                    }
                    let corners: Vec<_> = self.topo.face_halfedges(quad).collect();
                    for h in corners {
                        let v = self.topo.end_vertex(h);
                        let uv = match original_of(&out, v) {
                            Some(ov) => corner_of(&captured, src, ov),
                            None => corner_of(&captured, src, v),
                        };
                        self.set_texcoord_unchecked(h, uv);
                    }
                }
            }
        }
        for &(old, flipped) in &out.flipped {
            if let Some((_, tex, mat, _)) = captured.iter().find(|(f, ..)| *f == old) {
                let (tex, mat) = (*tex, *mat);
                self.set_face_texture_unchecked(flipped, tex);
                self.set_material_local(flipped, mat);
            }
            let corners: Vec<_> = self.topo.face_halfedges(flipped).collect();
            for h in corners {
                let v = self.topo.end_vertex(h);
                let uv = corner_of(&captured, old, v);
                self.set_texcoord_unchecked(h, uv);
            }
        }

        if out.statuses.iter().any(|s| s.is_ok()) {
            self.mark_dirty();
        }
        out
    }

    /// Replace each vertex with a small inset face whose corners sit on the
    /// incident edges, `distance` away from the old vertex (clamped to each
    /// edge's far end). Boundary vertices are skipped.
    pub fn bevel_vertices(
        &mut self,
        verts: &[VertexHandle],
        distance: f64,
    ) -> Result<(Vec<FaceHandle>, Vec<ItemStatus>)> {
        if distance <= 0.0 {
            return Err(MeshError::out_of_range("distance", distance, "> 0"));
        }
        let mut new_faces = Vec::new();
        let mut statuses = Vec::new();

        for &v in verts {
            match self.bevel_one_vertex(v, distance) {
                Ok(f) => {
                    new_faces.push(f);
                    statuses.push(ItemStatus::Ok);
                }
                Err(err) => statuses.push(ItemStatus::Skipped(err)),
            }
        }
        if !new_faces.is_empty() {
            self.mark_dirty();
        }
        Ok((new_faces, statuses))
    }

    fn bevel_one_vertex(&mut self, v: VertexHandle, distance: f64) -> Result<FaceHandle> {
        self.topo.check_vertex(v)?;
        if self.topo.is_boundary_vertex(v) {
            return Err(MeshError::NonManifold(
                "vertex bevel needs an interior vertex",
            ));
        }

        let pv = self.position_unchecked(v);
        let cap_template = self
            .topo
            .outgoing_halfedges(v)
            .next()
            .map(|h| self.topo.face_of(self.topo.twin(h)))
            .filter(|f| ElementHandle::is_valid(*f))
            .map(|f| (self.face_texture_unchecked(f), self.material_unchecked(f)));

        // Inset a corner on every incident edge, in fan order.
        let spokes: Vec<EdgeHandle> = self.topo.vertex_edges(v).collect();
        for e in spokes {
            let (a, b) = self.topo.edge_vertices(e);
            let far = if a == v { b } else { a };
            let len = (self.position_unchecked(far) - pv).norm();
            if len < 1e-12 || distance >= len {
                // The inset swallows the whole edge: reuse the far vertex.
                continue;
            }
            let from_v = self.topo.start_vertex(self.topo.half_of(e)) == v;
            let t = if from_v {
                distance / len
            } else {
                1.0 - distance / len
            };
            self.add_vertex_to_edge(e, t)?;
        }

        // Connect consecutive corners across each fan sector.
        let ring: Vec<(VertexHandle, FaceHandle)> = self
            .topo
            .outgoing_halfedges(v)
            .map(|h| {
                (
                    self.topo.end_vertex(h),
                    self.topo.face_of(self.topo.twin(h)),
                )
            })
            .collect();
        let k = ring.len();
        if k < 3 {
            return Err(MeshError::Degenerate("vertex bevel needs degree >= 3"));
        }
        for i in 0..k {
            let (wi, sector) = ring[i];
            let (wj, _) = ring[(i + 1) % k];
            self.connect_in_face(sector, wi, wj)?;
        }

        // The spoke triangles go with the vertex; the hole they leave is
        // the bevel face.
        let hole: Vec<VertexHandle> = {
            let mut order = Vec::with_capacity(k);
            // Walk the open boundary left by the removal in its own cycle
            // order; reconstruct it from the surviving ring edges instead
            // after the removal below.
            order.extend(ring.iter().map(|(w, _)| *w));
            order
        };
        self.remove_vertex(v, true)?;

        // The fan iterator ran counter to face winding, so the cap reuses
        // the reversed order to match the surrounding surface orientation.
        let reversed: Vec<VertexHandle> = hole.iter().rev().copied().collect();
        let cap = self.add_face(&reversed)?;
        if let Some((tex, mat)) = cap_template {
            self.set_face_texture_unchecked(cap, tex);
            self.set_material_local(cap, mat);
        }
        Ok(cap)
    }

    fn connect_in_face(&mut self, f: FaceHandle, a: VertexHandle, b: VertexHandle) -> Result<()> {
        self.topo.check_face(f)?;
        if self.topo.find_edge(a, b).is_some() {
            return Ok(());
        }
        let tex = self.face_texture_unchecked(f);
        let mat = self.material_unchecked(f);
        let ca = self
            .topo
            .face_halfedges(f)
            .find(|&h| self.topo.end_vertex(h) == a)
            .map(|h| self.texcoord_unchecked(h))
            .unwrap_or_else(Vector2::zeros);
        let cb = self
            .topo
            .face_halfedges(f)
            .find(|&h| self.topo.end_vertex(h) == b)
            .map(|h| self.texcoord_unchecked(h))
            .unwrap_or_else(Vector2::zeros);

        let (e, g) = self.topo.add_edge_to_face(f, a, b)?;
        self.sync_streams();

        let h_ab = {
            let h = self.topo.half_of(e);
            if self.topo.end_vertex(h) == b {
                h
            } else {
                self.topo.twin(h)
            }
        };
        self.set_texcoord_unchecked(h_ab, cb);
        self.set_texcoord_unchecked(self.topo.twin(h_ab), ca);
        self.set_face_texture_unchecked(g, tex);
        self.set_material_local(g, mat);
        self.mark_dirty();
        Ok(())
    }

    // ==================== Chords ====================

    /// Split the face shared by `a` and `b` with the chord `a-b`, provided
    /// the chord stays inside the face. Returns the new edge and face.
    pub fn connect_vertices(
        &mut self,
        a: VertexHandle,
        b: VertexHandle,
    ) -> Result<(EdgeHandle, FaceHandle)> {
        self.topo.check_vertex(a)?;
        self.topo.check_vertex(b)?;

        let shared = self
            .topo
            .vertex_faces(a)
            .find(|&f| self.topo.face_vertices(f).any(|u| u == b))
            .ok_or(MeshError::BadPolygon("vertices share no face"))?;

        // The chord midpoint must land inside the face polygon (projected
        // onto its plane).
        let points = self.face_positions(shared)?;
        let plane = geom::Plane::fit_newell(&points)
            .ok_or(MeshError::Degenerate("face has no plane"))?;
        let axis = geom::dominant_axis(&plane.normal);
        let poly: Vec<Point2<f64>> = points.iter().map(|p| geom::drop_axis(p, axis)).collect();
        let mid = Point3::from(
            (self.position_unchecked(a).coords + self.position_unchecked(b).coords) * 0.5,
        );
        if !geom::point_in_polygon_2d(&geom::drop_axis(&mid, axis), &poly) {
            return Err(MeshError::BadPolygon("chord leaves the face"));
        }

        let tex = self.face_texture_unchecked(shared);
        let mat = self.material_unchecked(shared);
        let ca = self
            .topo
            .face_halfedges(shared)
            .find(|&h| self.topo.end_vertex(h) == a)
            .map(|h| self.texcoord_unchecked(h))
            .unwrap_or_else(Vector2::zeros);
        let cb = self
            .topo
            .face_halfedges(shared)
            .find(|&h| self.topo.end_vertex(h) == b)
            .map(|h| self.texcoord_unchecked(h))
            .unwrap_or_else(Vector2::zeros);

        let (e, g) = self.topo.add_edge_to_face(shared, a, b)?;
        self.sync_streams();

        let h_ab = {
            let h = self.topo.half_of(e);
            if self.topo.end_vertex(h) == b {
                h
            } else {
                self.topo.twin(h)
            }
        };
        self.set_texcoord_unchecked(h_ab, cb);
        self.set_texcoord_unchecked(self.topo.twin(h_ab), ca);
        self.set_face_texture_unchecked(g, tex);
        self.set_material_local(g, mat);
        self.mark_dirty();
        Ok((e, g))
    }

    /// Walk from `start` toward `target_point`, crossing face boundaries:
    /// each crossing splits the crossed edge and adds a chord, until the
    /// target is reached (inserted as a vertex) or no face admits the next
    /// chord. Returns the chord edges created.
    pub fn create_edges_connecting_vertex_to_point(
        &mut self,
        start: VertexHandle,
        target_point: Point3<f64>,
    ) -> Result<Vec<EdgeHandle>> {
        self.topo.check_vertex(start)?;
        let mut created = Vec::new();
        let mut cv = start;

        for _ in 0..256 {
            let pv = self.position_unchecked(cv);
            if (target_point - pv).norm() < 1e-9 {
                break;
            }

            let Some(step) = self.pick_crossing(cv, &target_point)? else {
                break;
            };

            match step {
                Crossing::TargetInside { face, exit } => {
                    let w = self.split_crossing(exit)?;
                    let (chord, _) = self.connect_or_find(face, cv, w)?;
                    // Drop the target onto the chord itself.
                    let (s, d) = self.edge_line(chord)?;
                    let len_sq = d.norm_squared();
                    let t = if len_sq > 1e-30 {
                        ((target_point - s).dot(&d) / len_sq).clamp(0.0, 1.0)
                    } else {
                        0.5
                    };
                    let (tv, e1, e2) = self.add_vertex_to_edge(chord, t)?;
                    self.set_position_unchecked(tv, target_point);
                    created.push(e1);
                    created.push(e2);
                    return Ok(created);
                }
                Crossing::ThroughEdge { face, exit } => {
                    let w = self.split_crossing(exit)?;
                    let (chord, _) = self.connect_or_find(face, cv, w)?;
                    created.push(chord);
                    cv = w;
                }
            }
        }
        Ok(created)
    }

    fn split_crossing(&mut self, exit: ExitPoint) -> Result<VertexHandle> {
        match exit {
            ExitPoint::AtVertex(v) => Ok(v),
            ExitPoint::OnEdge(e, t) => {
                let (v, _, _) = self.add_vertex_to_edge(e, t)?;
                Ok(v)
            }
        }
    }

    fn connect_or_find(
        &mut self,
        f: FaceHandle,
        a: VertexHandle,
        b: VertexHandle,
    ) -> Result<(EdgeHandle, Option<FaceHandle>)> {
        if let Some(e) = self.topo.find_edge(a, b) {
            return Ok((e, None));
        }
        let tex = self.face_texture_unchecked(f);
        let mat = self.material_unchecked(f);
        let (e, g) = self.topo.add_edge_to_face(f, a, b)?;
        self.sync_streams();
        self.set_face_texture_unchecked(g, tex);
        self.set_material_local(g, mat);
        self.mark_dirty();
        Ok((e, Some(g)))
    }

    /// Find the face around `cv` that the ray toward the target crosses,
    /// and where it exits.
    fn pick_crossing(
        &self,
        cv: VertexHandle,
        target: &Point3<f64>,
    ) -> Result<Option<Crossing>> {
        let pv = self.position_unchecked(cv);

        for f in self.topo.vertex_faces(cv) {
            let cycle: Vec<_> = self.topo.face_halfedges(f).collect();
            let points: Vec<Point3<f64>> = cycle
                .iter()
                .map(|&h| self.position_unchecked(self.topo.end_vertex(h)))
                .collect();
            let Some(plane) = geom::Plane::fit_newell(&points) else {
                continue;
            };
            let axis = geom::dominant_axis(&plane.normal);
            let poly: Vec<Point2<f64>> =
                points.iter().map(|p| geom::drop_axis(p, axis)).collect();

            let origin = geom::drop_axis(&pv, axis);
            let tp = geom::drop_axis(&plane.project(target), axis);
            let dir = tp - origin;
            if dir.norm() < 1e-12 {
                continue;
            }

            // Closest boundary crossing, skipping edges that touch cv.
            let mut best: Option<(f64, usize, f64)> = None;
            for (i, &h) in cycle.iter().enumerate() {
                let sv = self.topo.start_vertex(h);
                let ev = self.topo.end_vertex(h);
                if sv == cv || ev == cv {
                    continue;
                }
                let a2 = geom::drop_axis(&self.position_unchecked(sv), axis);
                let b2 = geom::drop_axis(&self.position_unchecked(ev), axis);
                if let Some((t_ray, t_seg)) =
                    geom::ray_segment_intersection_2d(&origin, &dir, &a2, &b2)
                {
                    if t_ray > 1e-9 && best.map_or(true, |(bt, ..)| t_ray < bt) {
                        best = Some((t_ray, i, t_seg));
                    }
                }
            }
            let Some((t_ray, i, t_seg)) = best else {
                continue;
            };

            // The ray must actually enter this face.
            let probe = origin + dir * (t_ray.min(1.0) * 0.5);
            if !geom::point_in_polygon_2d(&probe, &poly) {
                continue;
            }

            let h = cycle[i];
            let exit = if t_seg < 1e-6 {
                ExitPoint::AtVertex(self.topo.start_vertex(h))
            } else if t_seg > 1.0 - 1e-6 {
                ExitPoint::AtVertex(self.topo.end_vertex(h))
            } else {
                let e = self.topo.edge_of(h);
                // Map the crossing onto the edge's canonical orientation.
                let t = if self.topo.half_of(e) == h {
                    t_seg
                } else {
                    1.0 - t_seg
                };
                ExitPoint::OnEdge(e, t)
            };

            return Ok(Some(if t_ray >= 1.0 {
                // Target lies inside this face, before the boundary.
                Crossing::TargetInside { face: f, exit }
            } else {
                Crossing::ThroughEdge { face: f, exit }
            }));
        }
        Ok(None)
    }

    // ==================== Slicing ====================

    /// Slice quad-like faces into a grid of `(cuts_x + 1) * (cuts_y + 1)`
    /// cells. Non-quad faces participate when exactly four corner vertices
    /// are detected by the direction-change threshold; otherwise the face is
    /// skipped.
    pub fn quad_slice_faces(
        &mut self,
        faces: &[FaceHandle],
        options: QuadSliceOptions,
    ) -> Vec<ItemStatus> {
        let mut statuses = Vec::with_capacity(faces.len());
        for &f in faces {
            let status = match self.quad_slice_one(f, &options) {
                Ok(()) => ItemStatus::Ok,
                Err(err) => ItemStatus::Skipped(err),
            };
            statuses.push(status);
        }
        if statuses.iter().any(|s| s.is_ok()) {
            self.mark_dirty();
        }
        statuses
    }

    fn quad_slice_one(&mut self, f: FaceHandle, options: &QuadSliceOptions) -> Result<()> {
        self.topo.check_face(f)?;
        let cycle_verts: Vec<VertexHandle> = self.topo.face_vertices(f).collect();
        let n = cycle_verts.len();

        // Locate the four grid corners.
        let corner_indices: Vec<usize> = if n == 4 {
            vec![0, 1, 2, 3]
        } else {
            let threshold = options.min_corner_angle_deg.to_radians().cos();
            let mut corners = Vec::new();
            for i in 0..n {
                let p_prev = self.position_unchecked(cycle_verts[(i + n - 1) % n]);
                let p = self.position_unchecked(cycle_verts[i]);
                let p_next = self.position_unchecked(cycle_verts[(i + 1) % n]);
                let din = (p - p_prev).normalize();
                let dout = (p_next - p).normalize();
                if din.dot(&dout) < threshold {
                    corners.push(i);
                }
            }
            corners
        };
        if corner_indices.len() != 4 {
            return Err(MeshError::Degenerate("face has no four corners"));
        }

        let tex = self.face_texture_unchecked(f);
        let mat = self.material_unchecked(f);
        let corner_uvs: [Vector2<f64>; 4] = {
            let mut uvs = [Vector2::zeros(); 4];
            let hs: Vec<_> = self.topo.face_halfedges(f).collect();
            for (k, &ci) in corner_indices.iter().enumerate() {
                uvs[k] = self.texcoord_unchecked(hs[ci]);
            }
            uvs
        };

        let (cx, cy) = (options.cuts_x, options.cuts_y);
        let cols = cx + 2;
        let rows = cy + 2;

        // Cut the four side chains. Sides 0 and 2 carry the u parameter,
        // sides 3 and 1 the v parameter.
        let side = |k: usize| -> (usize, usize) {
            (corner_indices[k], corner_indices[(k + 1) % 4])
        };
        let bottom = self.cut_chain(&cycle_verts, side(0), cx)?;
        let right = self.cut_chain(&cycle_verts, side(1), cy)?;
        let top_rev = self.cut_chain(&cycle_verts, side(2), cx)?;
        let left_rev = self.cut_chain(&cycle_verts, side(3), cy)?;

        // Interior grid vertices, bilinear between the bottom and top cuts.
        let top: Vec<(VertexHandle, f64)> = top_rev
            .iter()
            .rev()
            .map(|&(v, t)| (v, 1.0 - t))
            .collect();
        let left: Vec<(VertexHandle, f64)> = left_rev
            .iter()
            .rev()
            .map(|&(v, t)| (v, 1.0 - t))
            .collect();

        let cut_at = |chain: &[(VertexHandle, f64)], k: usize, cuts: usize| -> VertexHandle {
            let target = k as f64 / (cuts + 1) as f64;
            chain
                .iter()
                .min_by(|(_, a), (_, b)| {
                    (a - target).abs().partial_cmp(&(b - target).abs()).unwrap()
                })
                .map(|(v, _)| *v)
                .expect("chain has endpoints")
        };

        let mut grid: Vec<Vec<VertexHandle>> = vec![vec![VertexHandle::INVALID; cols]; rows];
        for k in 0..cols {
            grid[0][k] = cut_at(&bottom, k, cx);
            grid[rows - 1][k] = cut_at(&top, k, cx);
        }
        for l in 0..rows {
            grid[l][0] = cut_at(&left, l, cy);
            grid[l][cols - 1] = cut_at(&right, l, cy);
        }
        for l in 1..rows - 1 {
            let v = l as f64 / (cy + 1) as f64;
            for k in 1..cols - 1 {
                let pb = self.position_unchecked(grid[0][k]);
                let pt = self.position_unchecked(grid[rows - 1][k]);
                grid[l][k] = self.add_vertex(pb + (pt - pb) * v);
            }
        }

        // Replace the face with grid cells. The original's half-edges stay
        // open for reuse by the cells along the rim.
        self.topo.clear_face(f);
        self.sync_streams();

        for l in 0..rows - 1 {
            for k in 0..cols - 1 {
                let mut cell: Vec<VertexHandle> = Vec::with_capacity(8);
                self.push_segment(&mut cell, &bottom, grid[l][k], grid[l][k + 1], l == 0);
                self.push_segment(&mut cell, &right, grid[l][k + 1], grid[l + 1][k + 1], k + 1 == cols - 1);
                self.push_segment(&mut cell, &top, grid[l + 1][k + 1], grid[l + 1][k], l + 1 == rows - 1);
                self.push_segment(&mut cell, &left, grid[l + 1][k], grid[l][k], k == 0);

                let cell_face = self.add_face(&cell)?;
                self.set_face_texture_unchecked(cell_face, tex);
                self.set_material_local(cell_face, mat);

                // Bilinear texcoords from the original corner values.
                let corners: Vec<_> = self.topo.face_halfedges(cell_face).collect();
                for h in corners {
                    let v = self.topo.end_vertex(h);
                    let (u, w) = self.grid_param(&grid, v, cols, rows);
                    let uv = corner_uvs[0] * (1.0 - u) * (1.0 - w)
                        + corner_uvs[1] * u * (1.0 - w)
                        + corner_uvs[2] * u * w
                        + corner_uvs[3] * (1.0 - u) * w;
                    self.set_texcoord_unchecked(h, uv);
                }
            }
        }
        Ok(())
    }

    /// Append the vertices from `from` (exclusive) to `to` (inclusive)
    /// along a cell side. On rim sides the cut chain may carry extra
    /// vertices between grid columns; interior sides are single hops.
    fn push_segment(
        &self,
        cell: &mut Vec<VertexHandle>,
        chain: &[(VertexHandle, f64)],
        from: VertexHandle,
        to: VertexHandle,
        on_rim: bool,
    ) {
        if cell.last() != Some(&from) && (cell.is_empty() || !cell.contains(&from)) {
            cell.push(from);
        }
        if on_rim {
            let a = chain.iter().position(|(v, _)| *v == from);
            let b = chain.iter().position(|(v, _)| *v == to);
            if let (Some(a), Some(b)) = (a, b) {
                if a < b {
                    for &(v, _) in &chain[a + 1..b] {
                        cell.push(v);
                    }
                } else {
                    for &(v, _) in chain[b + 1..a].iter().rev() {
                        cell.push(v);
                    }
                }
            }
        }
        if !cell.contains(&to) {
            cell.push(to);
        }
    }

    fn grid_param(
        &self,
        grid: &[Vec<VertexHandle>],
        v: VertexHandle,
        cols: usize,
        rows: usize,
    ) -> (f64, f64) {
        for (l, row) in grid.iter().enumerate() {
            if let Some(k) = row.iter().position(|&u| u == v) {
                return (
                    k as f64 / (cols - 1) as f64,
                    l as f64 / (rows - 1) as f64,
                );
            }
        }
        // A rim intermediate vertex: interpolate from its position against
        // the grid corners.
        let p = self.position_unchecked(v);
        let p00 = self.position_unchecked(grid[0][0]);
        let p10 = self.position_unchecked(grid[0][cols - 1]);
        let p01 = self.position_unchecked(grid[rows - 1][0]);
        let du = p10 - p00;
        let dv = p01 - p00;
        let rel = p - p00;
        let u = if du.norm_squared() > 1e-30 {
            (rel.dot(&du) / du.norm_squared()).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let w = if dv.norm_squared() > 1e-30 {
            (rel.dot(&dv) / dv.norm_squared()).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (u, w)
    }

    /// Split the chain between two face corners at `cuts` evenly spaced
    /// parameters. Returns the chain as `(vertex, arc parameter)` pairs
    /// from the first corner to the second, including both corners and any
    /// pre-existing intermediate vertices.
    fn cut_chain(
        &mut self,
        cycle: &[VertexHandle],
        (from_idx, to_idx): (usize, usize),
        cuts: usize,
    ) -> Result<Vec<(VertexHandle, f64)>> {
        let n = cycle.len();
        let mut verts = vec![cycle[from_idx]];
        let mut i = from_idx;
        while i != to_idx {
            i = (i + 1) % n;
            verts.push(cycle[i]);
        }

        let mut lengths = vec![0.0];
        for w in verts.windows(2) {
            let d = (self.position_unchecked(w[1]) - self.position_unchecked(w[0])).norm();
            lengths.push(lengths.last().unwrap() + d);
        }
        let total = *lengths.last().unwrap();
        if total < 1e-12 {
            return Err(MeshError::Degenerate("zero-length side chain"));
        }

        let mut chain: Vec<(VertexHandle, f64)> = verts
            .iter()
            .zip(lengths.iter())
            .map(|(&v, &l)| (v, l / total))
            .collect();

        for k in 1..=cuts {
            let target = k as f64 / (cuts + 1) as f64;
            // Find the chain segment containing the target parameter.
            let seg = chain
                .windows(2)
                .position(|w| w[0].1 <= target && target <= w[1].1);
            let Some(seg) = seg else { continue };
            let (va, ta) = chain[seg];
            let (vb, tb) = chain[seg + 1];
            if (target - ta).abs() < 1e-9 || (tb - target).abs() < 1e-9 {
                continue;
            }
            let e = self
                .topo
                .find_edge(va, vb)
                .ok_or(MeshError::Degenerate("side chain edge vanished"))?;
            let local = (target - ta) / (tb - ta);
            let oriented = if self.topo.start_vertex(self.topo.half_of(e)) == va {
                local
            } else {
                1.0 - local
            };
            let (v, _, _) = self.add_vertex_to_edge(e, oriented)?;
            chain.insert(seg + 1, (v, target));
        }
        Ok(chain)
    }

    // ==================== Welding ====================

    /// Weld vertices that sit within `max_distance` of each other, using a
    /// k-d tree to group clusters and merging each cluster pairwise (up to
    /// ten convergence passes).
    ///
    /// With `pre_connect`, cluster vertices sharing a face but no edge get
    /// a chord first, so the welds collapse cleanly. With
    /// `average_positions`, merges meet halfway; otherwise the later vertex
    /// wins.
    pub fn merge_vertices_within_distance(
        &mut self,
        verts: &[VertexHandle],
        max_distance: f64,
        pre_connect: bool,
        average_positions: bool,
    ) -> Result<usize> {
        if max_distance < 0.0 {
            return Err(MeshError::out_of_range("max_distance", max_distance, ">= 0"));
        }
        let t = if average_positions { 0.5 } else { 1.0 };
        let mut total_merged = 0usize;

        for pass in 0..10 {
            let alive: Vec<VertexHandle> = verts
                .iter()
                .copied()
                .filter(|&v| self.topo.contains_vertex(v))
                .collect();
            if alive.len() < 2 {
                break;
            }

            if pre_connect {
                self.pre_connect_clusters(&alive, max_distance);
            }

            let mut tree: KdTree<f64, 3> = KdTree::new();
            for (i, &v) in alive.iter().enumerate() {
                let p = self.position_unchecked(v);
                tree.add(&[p.x, p.y, p.z], i as u64);
            }

            let mut visited = vec![false; alive.len()];
            let mut merged_this_pass = 0usize;

            for i in 0..alive.len() {
                if visited[i] || !self.topo.contains_vertex(alive[i]) {
                    continue;
                }
                visited[i] = true;
                let p = self.position_unchecked(alive[i]);
                let nearby =
                    tree.within::<SquaredEuclidean>(&[p.x, p.y, p.z], max_distance * max_distance);

                let mut acc = alive[i];
                for hit in nearby {
                    let j = hit.item as usize;
                    if j == i || visited[j] || !self.topo.contains_vertex(alive[j]) {
                        continue;
                    }
                    visited[j] = true;
                    match self.merge_vertices(acc, alive[j], t) {
                        Ok(kept) => {
                            acc = kept;
                            merged_this_pass += 1;
                        }
                        Err(_) => {
                            // Weld blocked (interior fans); leave for a
                            // later pass or for the caller.
                            visited[j] = false;
                        }
                    }
                }
                if self.topo.contains_vertex(acc) {
                    self.weld_duplicate_edges(acc);
                }
            }

            debug!(pass, merged = merged_this_pass, "weld pass");
            total_merged += merged_this_pass;
            if merged_this_pass == 0 {
                break;
            }
        }
        if total_merged > 0 {
            self.mark_dirty();
        }
        Ok(total_merged)
    }

    /// After a weld, coincident open edge pairs at the merged vertex (one
    /// from each welded fan) are zipped into single closed edges.
    fn weld_duplicate_edges(&mut self, v: VertexHandle) {
        loop {
            let outgoing: Vec<_> = self.topo.outgoing_halfedges(v).collect();
            let mut acted = false;
            'scan: for i in 0..outgoing.len() {
                for j in i + 1..outgoing.len() {
                    let (hi, hj) = (outgoing[i], outgoing[j]);
                    if self.topo.end_vertex(hi) != self.topo.end_vertex(hj) {
                        continue;
                    }
                    let (ei, ej) = (self.topo.edge_of(hi), self.topo.edge_of(hj));
                    if ei != ej && self.merge_edges(ei, ej).is_ok() {
                        acted = true;
                        break 'scan;
                    }
                }
            }
            if !acted {
                break;
            }
        }
    }

    fn pre_connect_clusters(&mut self, verts: &[VertexHandle], max_distance: f64) {
        let faces: Vec<FaceHandle> = self.topo.face_handles().collect();
        for f in faces {
            if !self.topo.contains_face(f) {
                continue;
            }
            let on_face: Vec<VertexHandle> = self
                .topo
                .face_vertices(f)
                .filter(|v| verts.contains(v))
                .collect();
            for i in 0..on_face.len() {
                for j in i + 1..on_face.len() {
                    let (a, b) = (on_face[i], on_face[j]);
                    if self.topo.find_edge(a, b).is_some() {
                        continue;
                    }
                    let d = (self.position_unchecked(a) - self.position_unchecked(b)).norm();
                    if d > max_distance {
                        continue;
                    }
                    // Best effort; a chord that leaves the face is skipped.
                    let _ = self.connect_vertices(a, b);
                }
            }
        }
    }

    // ==================== Extrusion of open edges ====================

    /// Extrude a strip of open edges outward by `amount`, along each edge's
    /// face normal crossed with the edge direction. Shared strip endpoints
    /// are duplicated once and the offset directions averaged.
    pub fn extend_edges(&mut self, edges: &[EdgeHandle], amount: f64) -> Result<ExtendOutcome> {
        // Per strip vertex: accumulated outward direction.
        let mut dirs: Vec<(VertexHandle, Vector3<f64>)> = Vec::new();
        for &e in edges {
            if !self.topo.contains_edge(e) {
                continue;
            }
            let Ok(hd) = self.topo.open_half(e) else {
                continue;
            };
            let d0 = self.topo.start_vertex(hd);
            let d1 = self.topo.end_vertex(hd);
            let along = self.position_unchecked(d1) - self.position_unchecked(d0);

            let face = self.topo.face_of(self.topo.twin(hd));
            let outward = if ElementHandle::is_valid(face) {
                match self.face_normal(face) {
                    Ok(n) => n.cross(&along),
                    Err(_) => Vector3::zeros(),
                }
            } else {
                Vector3::zeros()
            };
            for v in [d0, d1] {
                match dirs.iter_mut().find(|(u, _)| *u == v) {
                    Some((_, acc)) => *acc += outward,
                    None => dirs.push((v, outward)),
                }
            }
        }

        let out = self.topo.extend_edges(edges);
        self.sync_streams();

        for &(orig, dup) in &out.vertex_map {
            let base = self.position_unchecked(orig);
            let dir = dirs
                .iter()
                .find(|(v, _)| *v == orig)
                .map(|(_, d)| *d)
                .unwrap_or_else(Vector3::zeros);
            let len = dir.norm();
            let offset = if len > 1e-12 {
                dir / len * amount
            } else {
                Vector3::zeros()
            };
            self.set_position_unchecked(dup, base + offset);
        }

        if out.statuses.iter().any(|s| s.is_ok()) {
            self.mark_dirty();
        }
        Ok(out)
    }

    /// Tear interior edges apart; see [`crate::topology::Topology::split_edges`].
    /// Duplicated vertices keep the original positions.
    pub fn split_edges(&mut self, edges: &[EdgeHandle]) -> Result<SplitOutcome> {
        let out = self.topo.split_edges(edges)?;
        self.sync_streams();
        for &(orig, dup) in &out.vertex_map {
            let p = self.position_unchecked(orig);
            self.set_position_unchecked(dup, p);
        }
        if !out.new_edges.is_empty() {
            self.mark_dirty();
        }
        Ok(out)
    }

    // ==================== Cleanup ====================

    /// Remove a vertex with exactly two incident edges whose directions are
    /// within `tol_deg` of a straight line, welding the edges into one.
    pub fn remove_colinear_vertex(&mut self, v: VertexHandle, tol_deg: f64) -> Result<()> {
        self.topo.check_vertex(v)?;
        if self.topo.vertex_degree(v) != 2 {
            return Err(MeshError::BadPolygon(
                "colinear removal needs exactly two incident edges",
            ));
        }
        let neighbors: Vec<VertexHandle> = self
            .topo
            .outgoing_halfedges(v)
            .map(|h| self.topo.end_vertex(h))
            .collect();
        let pv = self.position_unchecked(v);
        let d1 = (self.position_unchecked(neighbors[0]) - pv).normalize();
        let d2 = (self.position_unchecked(neighbors[1]) - pv).normalize();
        // Straight through the vertex means the two edge directions oppose.
        let deviation_deg = d1.dot(&d2).clamp(-1.0, 1.0).acos().to_degrees();
        if (180.0 - deviation_deg) > tol_deg {
            return Err(MeshError::Degenerate("edges are not colinear"));
        }

        let keep = neighbors[0];
        let e = self
            .topo
            .find_edge(v, keep)
            .ok_or(MeshError::Degenerate("edge vanished"))?;
        // Collapse toward the surviving neighbor.
        let kept_pos = self.position_unchecked(keep);
        let outcome = if self.topo.start_vertex(self.topo.half_of(e)) == keep {
            self.collapse_edge(e, 0.0)?
        } else {
            self.collapse_edge(e, 1.0)?
        };
        self.set_position_unchecked(outcome.vertex, kept_pos);
        Ok(())
    }

    /// Remove faces whose triangulation underflows the expected
    /// `3 * (valence - 2)` indices. Returns how many faces were dropped.
    pub fn remove_bad_faces(&mut self) -> Result<usize> {
        let faces: Vec<FaceHandle> = self.topo.face_handles().collect();
        let mut removed = 0usize;
        for f in faces {
            if !self.topo.contains_face(f) {
                continue;
            }
            let points = self.face_positions(f)?;
            let expected = points.len().saturating_sub(2);
            if geom::triangulate(&points).len() != expected {
                self.remove_face(f, true)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "dropped degenerate faces");
            self.mark_dirty();
        }
        Ok(removed)
    }

    /// Mark a whole edge list hard or soft in one call.
    pub fn set_edges_smoothing(&mut self, edges: &[EdgeHandle], s: Smoothing) -> Result<()> {
        for &e in edges {
            self.set_edge_smoothing(e, s)?;
        }
        Ok(())
    }
}

enum ExitPoint {
    AtVertex(VertexHandle),
    OnEdge(EdgeHandle, f64),
}

enum Crossing {
    TargetInside { face: FaceHandle, exit: ExitPoint },
    ThroughEdge { face: FaceHandle, exit: ExitPoint },
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_quad(mesh: &mut Mesh) -> (Vec<VertexHandle>, FaceHandle) {
        let vs = vec![
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)),
        ];
        let f = mesh.add_face(&vs).unwrap();
        (vs, f)
    }

    fn cube(mesh: &mut Mesh) -> (Vec<VertexHandle>, Vec<FaceHandle>) {
        let corners = [
            [-1.0, -1.0, -1.0],
            [1.0, -1.0, -1.0],
            [1.0, 1.0, -1.0],
            [-1.0, 1.0, -1.0],
            [-1.0, -1.0, 1.0],
            [1.0, -1.0, 1.0],
            [1.0, 1.0, 1.0],
            [-1.0, 1.0, 1.0],
        ];
        let vs: Vec<VertexHandle> = corners
            .iter()
            .map(|c| mesh.add_vertex(Point3::new(c[0], c[1], c[2])))
            .collect();
        let quads = [
            [0, 3, 2, 1], // -Z
            [4, 5, 6, 7], // +Z
            [0, 1, 5, 4], // -Y
            [2, 3, 7, 6], // +Y
            [1, 2, 6, 5], // +X
            [3, 0, 4, 7], // -X
        ];
        let faces = quads
            .iter()
            .map(|q| {
                mesh.add_face(&[vs[q[0]], vs[q[1]], vs[q[2]], vs[q[3]]])
                    .unwrap()
            })
            .collect();
        (vs, faces)
    }

    #[test]
    fn test_extrude_quad_scenario() {
        // A 1x1 quad on z=0, extruded one unit up, closes into a box.
        let mut mesh = Mesh::new();
        let (_, f) = unit_quad(&mut mesh);
        let out = mesh.bevel_faces(&[f], true, Vector3::new(0.0, 0.0, 1.0));

        assert!(out.statuses[0].is_ok());
        assert!(mesh.topology().validate());
        assert_eq!(mesh.topology().num_faces(), 6);

        // Top face sits at z=1 with outward +Z normal.
        let (_, top) = out.new_faces[0];
        for p in mesh.face_positions(top).unwrap() {
            assert_relative_eq!(p.z, 1.0);
        }
        let n = mesh.face_normal(top).unwrap();
        assert_relative_eq!(n.z, 1.0, epsilon = 1e-9);

        // The flipped original faces down.
        let (_, bottom) = out.flipped[0];
        let n = mesh.face_normal(bottom).unwrap();
        assert_relative_eq!(n.z, -1.0, epsilon = 1e-9);

        // Each side quad has unit area and an axis-aligned outward normal.
        for &quad in &out.connecting_faces {
            let points = mesh.face_positions(quad).unwrap();
            let area = geom::triangulate(&points)
                .iter()
                .map(|t| geom::triangle_area(&points[t[0]], &points[t[1]], &points[t[2]]))
                .sum::<f64>();
            assert_relative_eq!(area, 1.0, epsilon = 1e-9);

            let n = mesh.face_normal(quad).unwrap();
            assert_relative_eq!(n.z, 0.0, epsilon = 1e-9);
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-9);
            assert!(n.x.abs() > 0.99 || n.y.abs() > 0.99);
        }
    }

    #[test]
    fn test_quad_slice_cube_face() {
        let mut mesh = Mesh::new();
        let (_, faces) = cube(&mut mesh);
        let before_vertices = mesh.topology().num_vertices();

        let statuses = mesh.quad_slice_faces(
            &[faces[1]],
            QuadSliceOptions {
                cuts_x: 1,
                cuts_y: 1,
                min_corner_angle_deg: 45.0,
            },
        );
        assert!(statuses[0].is_ok());
        assert!(mesh.topology().validate());

        // One face became four; four edge midpoints plus a center appeared.
        assert_eq!(mesh.topology().num_faces(), 9);
        assert_eq!(mesh.topology().num_vertices(), before_vertices + 5);
    }

    #[test]
    fn test_quad_slice_detects_corners_of_pentagon() {
        // A quad with one colinear midpoint on the bottom side: five
        // vertices, four direction-change corners.
        let mut mesh = Mesh::new();
        let vs = vec![
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(0.5, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)),
        ];
        let f = mesh.add_face(&vs).unwrap();
        let statuses = mesh.quad_slice_faces(&[f], QuadSliceOptions::default());
        assert!(statuses[0].is_ok(), "status: {:?}", statuses[0]);
        assert!(mesh.topology().validate());
        assert_eq!(mesh.topology().num_faces(), 4);
    }

    #[test]
    fn test_connect_vertices_inside_face() {
        let mut mesh = Mesh::new();
        let (vs, f) = unit_quad(&mut mesh);
        let (e, g) = mesh.connect_vertices(vs[0], vs[2]).unwrap();

        assert!(mesh.topology().validate());
        assert_eq!(mesh.topology().num_faces(), 2);
        let (fa, fb) = mesh.topology().edge_faces(e);
        assert!(fa == f && fb == g || fa == g && fb == f);

        // Adjacent vertices have an edge already: no shared-face chord.
        assert!(mesh.connect_vertices(vs[0], vs[1]).is_err());
    }

    #[test]
    fn test_connect_vertices_rejects_outside_chord() {
        // L-shaped face: the chord between the two far ends of the L leaves
        // the polygon.
        let mut mesh = Mesh::new();
        let vs = vec![
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(2.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(2.0, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 2.0, 0.0)),
            mesh.add_vertex(Point3::new(0.0, 2.0, 0.0)),
        ];
        mesh.add_face(&vs).unwrap();
        assert!(matches!(
            mesh.connect_vertices(vs[2], vs[4]),
            Err(MeshError::BadPolygon(_))
        ));
        // A chord that stays inside works.
        assert!(mesh.connect_vertices(vs[0], vs[3]).is_ok());
    }

    #[test]
    fn test_create_edges_to_point_inside_face() {
        let mut mesh = Mesh::new();
        let (vs, _) = unit_quad(&mut mesh);
        let target = Point3::new(0.6, 0.4, 0.0);
        let edges = mesh
            .create_edges_connecting_vertex_to_point(vs[0], target)
            .unwrap();

        assert!(mesh.topology().validate());
        assert!(!edges.is_empty());
        // Some created vertex sits exactly on the target.
        let hit = mesh
            .topology()
            .vertex_handles()
            .any(|v| (mesh.position(v).unwrap() - target).norm() < 1e-9);
        assert!(hit);
    }

    #[test]
    fn test_create_edges_walks_across_faces() {
        // Two quads side by side; the path from the far-left vertex to a
        // point in the right quad must cross the shared edge.
        let mut mesh = Mesh::new();
        let vs = vec![
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(2.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(2.0, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)),
        ];
        mesh.add_face(&[vs[0], vs[1], vs[4], vs[5]]).unwrap();
        mesh.add_face(&[vs[1], vs[2], vs[3], vs[4]]).unwrap();

        let target = Point3::new(1.6, 0.5, 0.0);
        let edges = mesh
            .create_edges_connecting_vertex_to_point(vs[0], target)
            .unwrap();

        assert!(mesh.topology().validate());
        // At least the crossing chord and the target chord halves.
        assert!(edges.len() >= 2);
        let hit = mesh
            .topology()
            .vertex_handles()
            .any(|v| (mesh.position(v).unwrap() - target).norm() < 1e-9);
        assert!(hit);
    }

    #[test]
    fn test_merge_by_distance_scenario() {
        // Two triangles with two vertex pairs within epsilon and one pair
        // far apart.
        let mut mesh = Mesh::new();
        let t1 = vec![
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(0.5, 1.0, 0.0)),
        ];
        let t2 = vec![
            mesh.add_vertex(Point3::new(1.005, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(0.005, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(0.5, -1.0, 0.0)),
        ];
        mesh.add_face(&t1).unwrap();
        mesh.add_face(&t2).unwrap();

        let all: Vec<VertexHandle> = t1.iter().chain(t2.iter()).copied().collect();
        let merged = mesh
            .merge_vertices_within_distance(&all, 0.05, false, true)
            .unwrap();

        assert_eq!(merged, 2);
        assert_eq!(mesh.topology().num_vertices(), 4);
        assert!(mesh.topology().validate());
        // The welded seam is now a closed interior edge.
        let seam: Vec<EdgeHandle> = mesh
            .topology()
            .edge_handles()
            .filter(|&e| !mesh.topology().is_open_edge(e))
            .collect();
        assert_eq!(seam.len(), 1);
    }

    #[test]
    fn test_merge_by_distance_ignores_distant_clusters() {
        let mut mesh = Mesh::new();
        let a = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let b = mesh.add_vertex(Point3::new(10.0, 0.0, 0.0));
        let merged = mesh
            .merge_vertices_within_distance(&[a, b], 0.5, false, true)
            .unwrap();
        assert_eq!(merged, 0);
        assert_eq!(mesh.topology().num_vertices(), 2);
    }

    #[test]
    fn test_extend_edges_by_zero_keeps_positions() {
        let mut mesh = Mesh::new();
        let (vs, _) = unit_quad(&mut mesh);
        let e = mesh.topology().find_edge(vs[0], vs[1]).unwrap();
        let out = mesh.extend_edges(&[e], 0.0).unwrap();

        assert!(out.statuses[0].is_ok());
        assert!(mesh.topology().validate());
        for &(orig, dup) in &out.vertex_map {
            assert_relative_eq!(
                (mesh.position(orig).unwrap() - mesh.position(dup).unwrap()).norm(),
                0.0
            );
        }
    }

    #[test]
    fn test_extend_edges_offsets_outward() {
        let mut mesh = Mesh::new();
        let (vs, _) = unit_quad(&mut mesh);
        // Bottom edge of the CCW quad: outward is -Y.
        let e = mesh.topology().find_edge(vs[0], vs[1]).unwrap();
        let out = mesh.extend_edges(&[e], 0.5).unwrap();
        assert!(out.statuses[0].is_ok());

        for &(orig, dup) in &out.vertex_map {
            let from = mesh.position(orig).unwrap();
            let to = mesh.position(dup).unwrap();
            assert_relative_eq!(to.y - from.y, -0.5, epsilon = 1e-9);
            assert_relative_eq!(to.x, from.x);
        }
    }

    #[test]
    fn test_bevel_vertices_on_subdivided_plane() {
        // Slice a quad 1x1 so the center vertex is interior, then bevel it.
        let mut mesh = Mesh::new();
        let (_, f) = unit_quad(&mut mesh);
        mesh.quad_slice_faces(&[f], QuadSliceOptions::default());
        let center = mesh
            .topology()
            .vertex_handles()
            .find(|&v| {
                (mesh.position(v).unwrap() - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-9
            })
            .unwrap();

        let before_faces = mesh.topology().num_faces();
        let (new_faces, statuses) = mesh.bevel_vertices(&[center], 0.1).unwrap();
        assert!(statuses[0].is_ok(), "status: {:?}", statuses[0]);
        assert!(mesh.topology().validate());
        assert_eq!(new_faces.len(), 1);
        // The cap replaces the four spoke triangles cut out around the
        // vertex: net face count is unchanged (4 cells split into 8 by the
        // chords, minus 4 removed, plus the cap).
        assert_eq!(mesh.topology().num_faces(), before_faces + 1);
        assert_eq!(mesh.topology().face_valence(new_faces[0]), 4);
        assert!(!mesh.topology().contains_vertex(center));
    }

    #[test]
    fn test_remove_colinear_vertex() {
        let mut mesh = Mesh::new();
        let a = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let m = mesh.add_vertex(Point3::new(1.0, 0.001, 0.0));
        let b = mesh.add_vertex(Point3::new(2.0, 0.0, 0.0));
        mesh.add_edge(a, m).unwrap();
        mesh.add_edge(m, b).unwrap();

        mesh.remove_colinear_vertex(m, 1.0).unwrap();
        assert!(mesh.topology().validate());
        assert!(!mesh.topology().contains_vertex(m));
        assert!(mesh.topology().find_edge(a, b).is_some());
        // Endpoints stayed put.
        assert_relative_eq!(mesh.position(a).unwrap().x, 0.0);
        assert_relative_eq!(mesh.position(b).unwrap().x, 2.0);

        // A right-angle vertex refuses.
        let mut mesh = Mesh::new();
        let a = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let m = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        let b = mesh.add_vertex(Point3::new(1.0, 1.0, 0.0));
        mesh.add_edge(a, m).unwrap();
        mesh.add_edge(m, b).unwrap();
        assert!(matches!(
            mesh.remove_colinear_vertex(m, 5.0),
            Err(MeshError::Degenerate(_))
        ));
    }

    #[test]
    fn test_remove_bad_faces_drops_degenerate_quad() {
        let mut mesh = Mesh::new();
        // A collinear quad triangulates to nothing.
        let vs = vec![
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(2.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(3.0, 0.0, 0.0)),
        ];
        mesh.add_face(&vs).unwrap();
        let (_, good) = unit_quad(&mut mesh);

        let removed = mesh.remove_bad_faces().unwrap();
        assert_eq!(removed, 1);
        assert!(mesh.topology().contains_face(good));
        assert_eq!(mesh.topology().num_faces(), 1);
    }

    #[test]
    fn test_collapse_then_cleanup_leaves_merged_vertex() {
        // Two triangles sharing an edge; collapsing the shared edge
        // dissolves both faces and leaves the merged midpoint vertex.
        let mut mesh = Mesh::new();
        let a = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let b = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        let c = mesh.add_vertex(Point3::new(0.5, 1.0, 0.0));
        let d = mesh.add_vertex(Point3::new(0.5, -1.0, 0.0));
        mesh.add_face(&[a, b, c]).unwrap();
        mesh.add_face(&[b, a, d]).unwrap();

        let e = mesh.topology().find_edge(a, b).unwrap();
        let outcome = mesh.collapse_edge(e, 0.5).unwrap();
        let removed = mesh.remove_bad_faces().unwrap();

        assert_eq!(mesh.topology().num_faces(), 0);
        assert_eq!(removed, 0);
        let merged = mesh.position(outcome.vertex).unwrap();
        assert_relative_eq!(merged.x, 0.5);
        assert_relative_eq!(merged.y, 0.0);
        assert!(mesh.topology().validate());
    }
}
