//! The editable mesh: topology plus standard attribute streams.
//!
//! [`Mesh`] owns a [`Topology`] and keeps a fixed set of streams in lockstep
//! with it: per-vertex positions, per-corner texture coordinates and
//! smoothing flags, and per-face texture projection parameters and material
//! ids. Editing operators combine a topology rewrite with consistent stream
//! updates; any change marks the mesh dirty until the next rebuild.

mod edit;

pub use edit::QuadSliceOptions;

use nalgebra::{Point3, Vector2, Vector3};

use crate::attr::{StreamId, StreamSet};
use crate::error::{MeshError, Result};
use crate::geom::Plane;
use crate::handle::{EdgeHandle, Element, ElementHandle, FaceHandle, HalfEdgeHandle, VertexHandle};
use crate::topology::{StreamKind, Topology};

/// Texture size assumed when the material resolver has no answer.
pub const DEFAULT_TEXTURE_SIZE: u32 = 512;

/// Per-corner smoothing behavior of an edge side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Smoothing {
    /// Smooth when the dihedral angle is under the mesh threshold.
    #[default]
    Default,
    /// Always split normals across this edge.
    Hard,
    /// Always smooth across this edge.
    Soft,
}

/// Opaque reference to a material owned outside the mesh core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialRef(pub u64);

/// Resolves external material references to the data the core needs.
pub trait MaterialResolver {
    /// Texture dimensions of the material, if known.
    fn texture_dims(&self, material: MaterialRef) -> Option<(u32, u32)>;
}

/// A resolver that knows nothing; every lookup falls back to
/// [`DEFAULT_TEXTURE_SIZE`].
pub struct NullResolver;

impl MaterialResolver for NullResolver {
    fn texture_dims(&self, _material: MaterialRef) -> Option<(u32, u32)> {
        None
    }
}

/// Compact table of the external materials a mesh actually uses. Face
/// streams store indices into this table (`-1` = unassigned).
#[derive(Debug, Clone, Default)]
pub struct MaterialTable {
    slots: Vec<MaterialRef>,
}

impl MaterialTable {
    /// Intern an external reference, returning its local id.
    pub fn local_id(&mut self, material: MaterialRef) -> i32 {
        if let Some(i) = self.slots.iter().position(|m| *m == material) {
            return i as i32;
        }
        self.slots.push(material);
        (self.slots.len() - 1) as i32
    }

    /// Look up the external reference behind a local id.
    pub fn get(&self, local: i32) -> Option<MaterialRef> {
        if local < 0 {
            return None;
        }
        self.slots.get(local as usize).copied()
    }

    /// Number of interned materials.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no materials are interned.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop unused slots. `used[i]` marks local id `i` live; returns the
    /// old-to-new id mapping (`-1` for dropped slots).
    fn compact(&mut self, used: &[bool]) -> Vec<i32> {
        let mut mapping = vec![-1i32; self.slots.len()];
        let mut kept = Vec::with_capacity(self.slots.len());
        for (i, &m) in self.slots.iter().enumerate() {
            if used.get(i).copied().unwrap_or(false) {
                mapping[i] = kept.len() as i32;
                kept.push(m);
            }
        }
        self.slots = kept;
        mapping
    }
}

/// Whether the mesh has changed since the last rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshState {
    /// Output surfaces are up to date.
    Clean,
    /// At least one topological or geometric change since the last rebuild.
    Dirty,
}

/// A face's texture projection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceTexture {
    /// World-space U axis (unit).
    pub u_axis: Vector3<f64>,
    /// World-space V axis (unit).
    pub v_axis: Vector3<f64>,
    /// Texels-per-unit scale divisor per axis.
    pub scale: Vector2<f64>,
    /// Texel offset.
    pub offset: Vector2<f64>,
}

impl Default for FaceTexture {
    fn default() -> Self {
        Self {
            u_axis: Vector3::x(),
            v_axis: -Vector3::y(),
            scale: Vector2::new(0.25, 0.25),
            offset: Vector2::zeros(),
        }
    }
}

struct StandardIds {
    position: StreamId<Point3<f64>>,
    texcoord: StreamId<Vector2<f64>>,
    smoothing: StreamId<Smoothing>,
    tex_u_axis: StreamId<Vector3<f64>>,
    tex_v_axis: StreamId<Vector3<f64>>,
    tex_scale: StreamId<Vector2<f64>>,
    tex_offset: StreamId<Vector2<f64>>,
    material: StreamId<i32>,
}

/// An editable polygon mesh.
pub struct Mesh {
    pub(crate) topo: Topology,
    vdata: StreamSet,
    hdata: StreamSet,
    fdata: StreamSet,
    ids: StandardIds,
    materials: MaterialTable,
    smooth_cos: f64,
    state: MeshState,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Mesh {
    /// Create an empty mesh with the standard streams registered and a 45
    /// degree smoothing threshold.
    pub fn new() -> Self {
        let mut vdata = StreamSet::new();
        let mut hdata = StreamSet::new();
        let mut fdata = StreamSet::new();
        let defaults = FaceTexture::default();

        let ids = StandardIds {
            position: vdata.register("position", Point3::origin()),
            texcoord: hdata.register("texcoord", Vector2::zeros()),
            smoothing: hdata.register("smoothing", Smoothing::Default),
            tex_u_axis: fdata.register("texture_u_axis", defaults.u_axis),
            tex_v_axis: fdata.register("texture_v_axis", defaults.v_axis),
            tex_scale: fdata.register("texture_scale", defaults.scale),
            tex_offset: fdata.register("texture_offset", defaults.offset),
            material: fdata.register("material", -1),
        };

        Self {
            topo: Topology::new(),
            vdata,
            hdata,
            fdata,
            ids,
            materials: MaterialTable::default(),
            smooth_cos: 45f64.to_radians().cos(),
            state: MeshState::Clean,
        }
    }

    /// The underlying half-edge graph, read-only. All mutation goes through
    /// the mesh so streams stay aligned.
    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    /// Current clean/dirty state.
    pub fn state(&self) -> MeshState {
        self.state
    }

    /// The materials this mesh references.
    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    /// Cosine of the smoothing threshold angle.
    pub fn smooth_cos(&self) -> f64 {
        self.smooth_cos
    }

    /// Set the smoothing threshold as an angle in degrees.
    pub fn set_smooth_angle(&mut self, degrees: f64) -> Result<()> {
        if !(0.0..=180.0).contains(&degrees) {
            return Err(MeshError::out_of_range(
                "smooth_angle",
                degrees,
                "0..=180 degrees",
            ));
        }
        self.smooth_cos = degrees.to_radians().cos();
        self.mark_dirty();
        Ok(())
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.state = MeshState::Dirty;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.state = MeshState::Clean;
    }

    /// Apply pending topology events to the streams.
    pub(crate) fn sync_streams(&mut self) {
        for ev in self.topo.take_journal() {
            let set = match ev.kind {
                StreamKind::Vertex => &mut self.vdata,
                StreamKind::HalfEdge => &mut self.hdata,
                StreamKind::Face => &mut self.fdata,
            };
            if ev.created {
                set.on_alloc(ev.index as usize);
            } else {
                set.on_free(ev.index as usize);
            }
        }
    }

    // ==================== Stream access ====================

    /// Position of a vertex.
    pub fn position(&self, v: VertexHandle) -> Result<Point3<f64>> {
        self.topo.check_vertex(v)?;
        Ok(*self.vdata.stream(self.ids.position).get(v.index()))
    }

    /// Move a vertex.
    pub fn set_position(&mut self, v: VertexHandle, p: Point3<f64>) -> Result<()> {
        self.topo.check_vertex(v)?;
        self.vdata.stream_mut(self.ids.position).set(v.index(), p);
        self.mark_dirty();
        Ok(())
    }

    pub(crate) fn position_unchecked(&self, v: VertexHandle) -> Point3<f64> {
        *self.vdata.stream(self.ids.position).get(v.index())
    }

    pub(crate) fn set_position_unchecked(&mut self, v: VertexHandle, p: Point3<f64>) {
        self.vdata.stream_mut(self.ids.position).set(v.index(), p);
    }

    /// Texture coordinate at a face corner (the half-edge ending at the
    /// corner vertex).
    pub fn texcoord(&self, h: HalfEdgeHandle) -> Result<Vector2<f64>> {
        self.topo.check_halfedge(h)?;
        Ok(*self.hdata.stream(self.ids.texcoord).get(h.index()))
    }

    /// Set the texture coordinate at a face corner.
    pub fn set_texcoord(&mut self, h: HalfEdgeHandle, uv: Vector2<f64>) -> Result<()> {
        self.topo.check_halfedge(h)?;
        self.hdata.stream_mut(self.ids.texcoord).set(h.index(), uv);
        self.mark_dirty();
        Ok(())
    }

    pub(crate) fn texcoord_unchecked(&self, h: HalfEdgeHandle) -> Vector2<f64> {
        *self.hdata.stream(self.ids.texcoord).get(h.index())
    }

    pub(crate) fn set_texcoord_unchecked(&mut self, h: HalfEdgeHandle, uv: Vector2<f64>) {
        self.hdata.stream_mut(self.ids.texcoord).set(h.index(), uv);
    }

    /// Smoothing flag on one side of an edge.
    pub fn smoothing(&self, h: HalfEdgeHandle) -> Result<Smoothing> {
        self.topo.check_halfedge(h)?;
        Ok(*self.hdata.stream(self.ids.smoothing).get(h.index()))
    }

    /// Set the smoothing flag on one half-edge.
    pub fn set_smoothing(&mut self, h: HalfEdgeHandle, s: Smoothing) -> Result<()> {
        self.topo.check_halfedge(h)?;
        self.hdata.stream_mut(self.ids.smoothing).set(h.index(), s);
        self.mark_dirty();
        Ok(())
    }

    /// Set the smoothing flag on both sides of a full edge.
    pub fn set_edge_smoothing(&mut self, e: EdgeHandle, s: Smoothing) -> Result<()> {
        self.topo.check_edge(e)?;
        let h = self.topo.half_of(e);
        let t = self.topo.twin(h);
        let stream = self.hdata.stream_mut(self.ids.smoothing);
        stream.set(h.index(), s);
        stream.set(t.index(), s);
        self.mark_dirty();
        Ok(())
    }

    /// Effective smoothing of a full edge: `Hard` wins, then `Soft`.
    pub fn edge_smoothing(&self, e: EdgeHandle) -> Result<Smoothing> {
        self.topo.check_edge(e)?;
        let h = self.topo.half_of(e);
        let t = self.topo.twin(h);
        let stream = self.hdata.stream(self.ids.smoothing);
        let (a, b) = (*stream.get(h.index()), *stream.get(t.index()));
        Ok(match (a, b) {
            (Smoothing::Hard, _) | (_, Smoothing::Hard) => Smoothing::Hard,
            (Smoothing::Soft, _) | (_, Smoothing::Soft) => Smoothing::Soft,
            _ => Smoothing::Default,
        })
    }

    pub(crate) fn smoothing_unchecked(&self, h: HalfEdgeHandle) -> Smoothing {
        *self.hdata.stream(self.ids.smoothing).get(h.index())
    }

    pub(crate) fn set_smoothing_unchecked(&mut self, h: HalfEdgeHandle, s: Smoothing) {
        self.hdata.stream_mut(self.ids.smoothing).set(h.index(), s);
    }

    /// A face's texture projection parameters.
    pub fn face_texture(&self, f: FaceHandle) -> Result<FaceTexture> {
        self.topo.check_face(f)?;
        Ok(self.face_texture_unchecked(f))
    }

    pub(crate) fn face_texture_unchecked(&self, f: FaceHandle) -> FaceTexture {
        let i = f.index();
        FaceTexture {
            u_axis: *self.fdata.stream(self.ids.tex_u_axis).get(i),
            v_axis: *self.fdata.stream(self.ids.tex_v_axis).get(i),
            scale: *self.fdata.stream(self.ids.tex_scale).get(i),
            offset: *self.fdata.stream(self.ids.tex_offset).get(i),
        }
    }

    /// Set a face's texture projection parameters.
    pub fn set_face_texture(&mut self, f: FaceHandle, tex: FaceTexture) -> Result<()> {
        self.topo.check_face(f)?;
        self.set_face_texture_unchecked(f, tex);
        self.mark_dirty();
        Ok(())
    }

    pub(crate) fn set_face_texture_unchecked(&mut self, f: FaceHandle, tex: FaceTexture) {
        let i = f.index();
        self.fdata.stream_mut(self.ids.tex_u_axis).set(i, tex.u_axis);
        self.fdata.stream_mut(self.ids.tex_v_axis).set(i, tex.v_axis);
        self.fdata.stream_mut(self.ids.tex_scale).set(i, tex.scale);
        self.fdata.stream_mut(self.ids.tex_offset).set(i, tex.offset);
    }

    /// Local material id of a face (`-1` = unassigned).
    pub fn material_of(&self, f: FaceHandle) -> Result<i32> {
        self.topo.check_face(f)?;
        Ok(*self.fdata.stream(self.ids.material).get(f.index()))
    }

    /// External material reference of a face, if assigned.
    pub fn material_ref_of(&self, f: FaceHandle) -> Result<Option<MaterialRef>> {
        Ok(self.materials.get(self.material_of(f)?))
    }

    /// Assign a material to a face, interning it into the mesh's table.
    pub fn set_material(&mut self, f: FaceHandle, material: MaterialRef) -> Result<()> {
        self.topo.check_face(f)?;
        let local = self.materials.local_id(material);
        self.fdata.stream_mut(self.ids.material).set(f.index(), local);
        self.mark_dirty();
        Ok(())
    }

    pub(crate) fn material_unchecked(&self, f: FaceHandle) -> i32 {
        *self.fdata.stream(self.ids.material).get(f.index())
    }

    pub(crate) fn set_material_local(&mut self, f: FaceHandle, local: i32) {
        self.fdata.stream_mut(self.ids.material).set(f.index(), local);
    }

    /// Drop unused material slots and remap face ids into the compact
    /// range. Called by the rebuilder for deterministic id assignment.
    pub(crate) fn compact_materials(&mut self) {
        let mut used = vec![false; self.materials.len()];
        for f in self.topo.face_handles() {
            let id = self.material_unchecked(f);
            if id >= 0 {
                if let Some(slot) = used.get_mut(id as usize) {
                    *slot = true;
                }
            }
        }
        let mapping = self.materials.compact(&used);
        let faces: Vec<FaceHandle> = self.topo.face_handles().collect();
        for f in faces {
            let id = self.material_unchecked(f);
            if id >= 0 {
                let new_id = mapping.get(id as usize).copied().unwrap_or(-1);
                self.set_material_local(f, new_id);
            }
        }
    }

    // ==================== Construction ====================

    /// Create an isolated vertex at `p`.
    pub fn add_vertex(&mut self, p: Point3<f64>) -> VertexHandle {
        let v = self.topo.add_vertex();
        self.sync_streams();
        self.set_position_unchecked(v, p);
        self.mark_dirty();
        v
    }

    /// Create a face over existing vertices.
    pub fn add_face(&mut self, verts: &[VertexHandle]) -> Result<FaceHandle> {
        let f = self.topo.add_face(verts);
        self.sync_streams();
        if f.is_ok() {
            self.mark_dirty();
        }
        f
    }

    /// Create vertices and a face over them in one call.
    pub fn add_polygon(&mut self, points: &[Point3<f64>]) -> Result<FaceHandle> {
        let verts: Vec<VertexHandle> = points.iter().map(|&p| self.add_vertex(p)).collect();
        match self.add_face(&verts) {
            Ok(f) => Ok(f),
            Err(err) => {
                for v in verts {
                    let _ = self.topo.remove_vertex(v, false);
                }
                self.sync_streams();
                Err(err)
            }
        }
    }

    /// Create a loose edge between two vertices.
    pub fn add_edge(&mut self, a: VertexHandle, b: VertexHandle) -> Result<EdgeHandle> {
        let e = self.topo.add_edge(a, b);
        self.sync_streams();
        if e.is_ok() {
            self.mark_dirty();
        }
        e
    }

    // ==================== Removal ====================

    /// Remove a vertex with its incident faces and edges; see
    /// [`Topology::remove_vertex`].
    pub fn remove_vertex(&mut self, v: VertexHandle, remove_loose_edges: bool) -> Result<()> {
        let r = self.topo.remove_vertex(v, remove_loose_edges);
        self.sync_streams();
        if r.is_ok() {
            self.mark_dirty();
        }
        r
    }

    /// Remove a face; see [`Topology::remove_face`].
    pub fn remove_face(&mut self, f: FaceHandle, keep_vertices: bool) -> Result<()> {
        let r = self.topo.remove_face(f, keep_vertices);
        self.sync_streams();
        if r.is_ok() {
            self.mark_dirty();
        }
        r
    }

    /// Remove an edge and its faces; see [`Topology::remove_edge`].
    pub fn remove_edge(&mut self, e: EdgeHandle, keep_vertices: bool) -> Result<()> {
        let r = self.topo.remove_edge(e, keep_vertices);
        self.sync_streams();
        if r.is_ok() {
            self.mark_dirty();
        }
        r
    }

    // ==================== User streams ====================

    /// Register an extra per-element stream. The standard streams are
    /// registered at construction; anything added here follows the same
    /// lifecycle (default-filled on allocation, reset on free).
    pub fn register_stream<T: crate::attr::StreamValue>(
        &mut self,
        kind: StreamKind,
        name: &str,
        default: T,
    ) -> StreamId<T> {
        let set = match kind {
            StreamKind::Vertex => &mut self.vdata,
            StreamKind::HalfEdge => &mut self.hdata,
            StreamKind::Face => &mut self.fdata,
        };
        let id = set.register(name, default);
        // Backfill slots for elements that already exist.
        let capacity = match kind {
            StreamKind::Vertex => self.topo.vertices.capacity(),
            StreamKind::HalfEdge => self.topo.halfedges.capacity(),
            StreamKind::Face => self.topo.faces.capacity(),
        };
        if capacity > 0 {
            let set = match kind {
                StreamKind::Vertex => &mut self.vdata,
                StreamKind::HalfEdge => &mut self.hdata,
                StreamKind::Face => &mut self.fdata,
            };
            set.on_alloc(capacity - 1);
        }
        id
    }

    /// Look up a registered stream by name and type.
    pub fn find_stream<T: crate::attr::StreamValue>(
        &self,
        kind: StreamKind,
        name: &str,
    ) -> Option<StreamId<T>> {
        match kind {
            StreamKind::Vertex => self.vdata.find(name),
            StreamKind::HalfEdge => self.hdata.find(name),
            StreamKind::Face => self.fdata.find(name),
        }
    }

    /// Read a vertex stream value through a validated handle.
    pub fn vertex_value<T: crate::attr::StreamValue>(
        &self,
        id: StreamId<T>,
        v: VertexHandle,
    ) -> Result<&T> {
        self.topo.check_vertex(v)?;
        Ok(self.vdata.stream(id).get(v.index()))
    }

    /// Write a vertex stream value through a validated handle.
    pub fn set_vertex_value<T: crate::attr::StreamValue>(
        &mut self,
        id: StreamId<T>,
        v: VertexHandle,
        value: T,
    ) -> Result<()> {
        self.topo.check_vertex(v)?;
        self.vdata.stream_mut(id).set(v.index(), value);
        self.mark_dirty();
        Ok(())
    }

    /// Read a half-edge stream value through a validated handle.
    pub fn halfedge_value<T: crate::attr::StreamValue>(
        &self,
        id: StreamId<T>,
        h: HalfEdgeHandle,
    ) -> Result<&T> {
        self.topo.check_halfedge(h)?;
        Ok(self.hdata.stream(id).get(h.index()))
    }

    /// Read a face stream value through a validated handle.
    pub fn face_value<T: crate::attr::StreamValue>(
        &self,
        id: StreamId<T>,
        f: FaceHandle,
    ) -> Result<&T> {
        self.topo.check_face(f)?;
        Ok(self.fdata.stream(id).get(f.index()))
    }

    // ==================== Queries ====================

    /// Representative point of any element: the vertex position, an edge or
    /// half-edge midpoint, or a face centroid.
    pub fn element_center(&self, element: Element) -> Result<Point3<f64>> {
        match element {
            Element::Vertex(v) => self.position(v),
            Element::HalfEdge(h) => {
                self.topo.check_halfedge(h)?;
                let a = self.position_unchecked(self.topo.start_vertex(h));
                let b = self.position_unchecked(self.topo.end_vertex(h));
                Ok(a + (b - a) * 0.5)
            }
            Element::Edge(e) => {
                let (p, d) = self.edge_line(e)?;
                Ok(p + d * 0.5)
            }
            Element::Face(f) => self.face_centroid(f),
        }
    }

    /// Axis-aligned bounds of a mixed element selection.
    pub fn selection_bounds(&self, elements: &[Element]) -> Result<(Point3<f64>, Point3<f64>)> {
        if elements.is_empty() {
            return Err(MeshError::Empty);
        }
        let first = self.element_center(elements[0])?;
        let (mut min, mut max) = (first, first);
        for &el in &elements[1..] {
            let p = self.element_center(el)?;
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Ok((min, max))
    }

    /// Axis-aligned bounds of all vertices.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut iter = self.topo.vertex_handles();
        let first = self.position_unchecked(iter.next()?);
        let (mut min, mut max) = (first, first);
        for v in iter {
            let p = self.position_unchecked(v);
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Some((min, max))
    }

    /// Axis-aligned bounds of all vertices after mapping through a
    /// transform.
    pub fn transformed_bounds(
        &self,
        transform: &crate::rebuild::Transform,
    ) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut iter = self.topo.vertex_handles();
        let first = transform.point_to_world(&self.position_unchecked(iter.next()?));
        let (mut min, mut max) = (first, first);
        for v in iter {
            let p = transform.point_to_world(&self.position_unchecked(v));
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Some((min, max))
    }

    /// Positions of a face's vertices in cycle order.
    pub fn face_positions(&self, f: FaceHandle) -> Result<Vec<Point3<f64>>> {
        self.topo.check_face(f)?;
        Ok(self
            .topo
            .face_vertices(f)
            .map(|v| self.position_unchecked(v))
            .collect())
    }

    /// Positions of a face's vertices mapped through a transform.
    pub fn face_positions_transformed(
        &self,
        f: FaceHandle,
        transform: &crate::rebuild::Transform,
    ) -> Result<Vec<Point3<f64>>> {
        Ok(self
            .face_positions(f)?
            .into_iter()
            .map(|p| transform.point_to_world(&p))
            .collect())
    }

    /// Mean of a face's vertex positions.
    pub fn face_centroid(&self, f: FaceHandle) -> Result<Point3<f64>> {
        let points = self.face_positions(f)?;
        let mut sum = Vector3::zeros();
        for p in &points {
            sum += p.coords;
        }
        Ok(Point3::from(sum / points.len() as f64))
    }

    /// Newell plane fit of a face.
    pub fn face_plane(&self, f: FaceHandle) -> Result<Plane> {
        let points = self.face_positions(f)?;
        Plane::fit_newell(&points).ok_or(MeshError::Degenerate("face has no plane"))
    }

    /// Unit normal of a face.
    pub fn face_normal(&self, f: FaceHandle) -> Result<Vector3<f64>> {
        Ok(self.face_plane(f)?.normal)
    }

    /// Origin and direction of an edge's line.
    pub fn edge_line(&self, e: EdgeHandle) -> Result<(Point3<f64>, Vector3<f64>)> {
        self.topo.check_edge(e)?;
        let (a, b) = self.topo.edge_vertices(e);
        let pa = self.position_unchecked(a);
        Ok((pa, self.position_unchecked(b) - pa))
    }

    // ==================== Edge surgery ====================

    /// Split an edge at parameter `t` from its start vertex. Corner texture
    /// coordinates interpolate on both incident faces; the new vertex lands
    /// on the edge line.
    pub fn add_vertex_to_edge(
        &mut self,
        e: EdgeHandle,
        t: f64,
    ) -> Result<(VertexHandle, EdgeHandle, EdgeHandle)> {
        if !(0.0..=1.0).contains(&t) {
            return Err(MeshError::out_of_range("t", t, "0..=1"));
        }
        self.topo.check_edge(e)?;

        let h = self.topo.half_of(e);
        let tw = self.topo.twin(h);
        let a = self.topo.start_vertex(h);
        let b = self.topo.end_vertex(h);
        let pa = self.position_unchecked(a);
        let pb = self.position_unchecked(b);

        // Corner values before surgery: per face side, value at `a` and `b`.
        let f_at_a = self.texcoord_unchecked(self.topo.prev(h));
        let f_at_b = self.texcoord_unchecked(h);
        let ft_at_b = self.texcoord_unchecked(self.topo.prev(tw));
        let ft_at_a = self.texcoord_unchecked(tw);
        let smooth_h = self.smoothing_unchecked(h);
        let smooth_t = self.smoothing_unchecked(tw);

        let (v, e1, e2) = self.topo.add_vertex_to_edge(e)?;
        self.sync_streams();

        let h2 = self.topo.next(h);
        let h2t = self.topo.twin(h2);

        self.set_position_unchecked(v, pa + (pb - pa) * t);
        self.set_texcoord_unchecked(h, f_at_a * (1.0 - t) + f_at_b * t);
        self.set_texcoord_unchecked(h2, f_at_b);
        self.set_texcoord_unchecked(h2t, ft_at_a * (1.0 - t) + ft_at_b * t);
        self.set_smoothing_unchecked(h2, smooth_h);
        self.set_smoothing_unchecked(h2t, smooth_t);

        self.mark_dirty();
        Ok((v, e1, e2))
    }

    /// Collapse an edge, placing the merged vertex at parameter `t` between
    /// the old endpoints. See [`Topology::collapse_edge`] for the topology
    /// contract.
    pub fn collapse_edge(
        &mut self,
        e: EdgeHandle,
        t: f64,
    ) -> Result<crate::topology::EdgeCollapse> {
        if !(0.0..=1.0).contains(&t) {
            return Err(MeshError::out_of_range("t", t, "0..=1"));
        }
        self.topo.check_edge(e)?;
        let h = self.topo.half_of(e);
        let pa = self.position_unchecked(self.topo.start_vertex(h));
        let pb = self.position_unchecked(self.topo.end_vertex(h));

        let outcome = self.topo.collapse_edge(e)?;
        self.sync_streams();
        self.set_position_unchecked(outcome.vertex, pa + (pb - pa) * t);
        self.mark_dirty();
        Ok(outcome)
    }

    /// Merge vertex `b` into `a`, placing the result at parameter `t`
    /// between their positions.
    pub fn merge_vertices(
        &mut self,
        a: VertexHandle,
        b: VertexHandle,
        t: f64,
    ) -> Result<VertexHandle> {
        if !(0.0..=1.0).contains(&t) {
            return Err(MeshError::out_of_range("t", t, "0..=1"));
        }
        let pa = self.position(a)?;
        let pb = self.position(b)?;
        let kept = self.topo.merge_vertices(a, b)?;
        self.sync_streams();
        self.set_position_unchecked(kept, pa + (pb - pa) * t);
        self.mark_dirty();
        Ok(kept)
    }

    /// Zip two open edges together; endpoint positions average pairwise.
    pub fn merge_edges(
        &mut self,
        a: EdgeHandle,
        b: EdgeHandle,
    ) -> Result<(VertexHandle, VertexHandle)> {
        self.topo.check_edge(a)?;
        self.topo.check_edge(b)?;
        let r = self.topo.merge_edges(a, b);
        self.sync_streams();
        if r.is_ok() {
            self.mark_dirty();
        }
        r
    }

    /// Bridge two open edges with a new face.
    pub fn bridge_edges(&mut self, a: EdgeHandle, b: EdgeHandle) -> Result<FaceHandle> {
        let r = self.topo.bridge_edges(a, b);
        self.sync_streams();
        if r.is_ok() {
            self.mark_dirty();
        }
        r
    }

    /// Reverse every face, keeping corner attributes attached to their
    /// corners.
    pub fn flip_all_faces(&mut self) {
        // After the flip each half-edge ends where its old predecessor did,
        // so corner values travel from the predecessor.
        let moves: Vec<(HalfEdgeHandle, Vector2<f64>)> = self
            .topo
            .halfedge_handles()
            .map(|h| (h, self.texcoord_unchecked(self.topo.prev(h))))
            .collect();

        self.topo.flip_all_faces();
        self.sync_streams();

        for (h, uv) in moves {
            self.set_texcoord_unchecked(h, uv);
        }
        self.mark_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    pub(crate) fn unit_quad(mesh: &mut Mesh) -> (Vec<VertexHandle>, FaceHandle) {
        let vs = vec![
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)),
        ];
        let f = mesh.add_face(&vs).unwrap();
        (vs, f)
    }

    #[test]
    fn test_streams_follow_topology() {
        let mut mesh = Mesh::new();
        let (vs, f) = unit_quad(&mut mesh);

        assert_eq!(mesh.position(vs[2]).unwrap(), Point3::new(1.0, 1.0, 0.0));
        assert_eq!(mesh.material_of(f).unwrap(), -1);
        assert_eq!(mesh.state(), MeshState::Dirty);

        // Freed handles go stale for stream access too.
        mesh.remove_face(f, false).unwrap();
        assert!(matches!(
            mesh.position(vs[0]),
            Err(MeshError::StaleHandle { .. })
        ));
        assert!(matches!(
            mesh.material_of(f),
            Err(MeshError::StaleHandle { .. })
        ));
    }

    #[test]
    fn test_material_interning() {
        let mut mesh = Mesh::new();
        let (_, f) = unit_quad(&mut mesh);
        let brick = MaterialRef(100);

        mesh.set_material(f, brick).unwrap();
        assert_eq!(mesh.material_of(f).unwrap(), 0);
        assert_eq!(mesh.material_ref_of(f).unwrap(), Some(brick));

        // Same reference interns to the same id.
        let mut mesh2 = Mesh::new();
        let (_, f2) = unit_quad(&mut mesh2);
        let (_, f3) = unit_quad(&mut mesh2);
        mesh2.set_material(f2, brick).unwrap();
        mesh2.set_material(f3, brick).unwrap();
        assert_eq!(mesh2.material_of(f2), mesh2.material_of(f3));
        assert_eq!(mesh2.materials().len(), 1);
    }

    #[test]
    fn test_split_edge_interpolates() {
        let mut mesh = Mesh::new();
        let (vs, f) = unit_quad(&mut mesh);

        // Give the bottom edge corners distinct texcoords.
        let h = mesh.topo.find_halfedge(vs[0], vs[1]).unwrap();
        let at_a = mesh.topo.prev(h);
        mesh.set_texcoord(at_a, Vector2::new(0.0, 0.0)).unwrap();
        mesh.set_texcoord(h, Vector2::new(1.0, 0.0)).unwrap();

        let e = mesh.topo.find_edge(vs[0], vs[1]).unwrap();
        let (v, _, _) = mesh.add_vertex_to_edge(e, 0.25).unwrap();

        assert_relative_eq!(mesh.position(v).unwrap().x, 0.25);
        assert_relative_eq!(mesh.position(v).unwrap().y, 0.0);

        // The corner at the new vertex interpolated; the corner at the old
        // end kept its value.
        let h_new = mesh.topo.find_halfedge(vs[0], v).unwrap();
        assert_relative_eq!(mesh.texcoord(h_new).unwrap().x, 0.25);
        let h_tail = mesh.topo.find_halfedge(v, vs[1]).unwrap();
        assert_relative_eq!(mesh.texcoord(h_tail).unwrap().x, 1.0);
        assert_eq!(mesh.topology().face_valence(f), 5);
    }

    #[test]
    fn test_split_then_collapse_restores_positions() {
        let mut mesh = Mesh::new();
        let (vs, _) = unit_quad(&mut mesh);
        let before: Vec<Point3<f64>> = vs.iter().map(|&v| mesh.position(v).unwrap()).collect();

        let e = mesh.topo.find_edge(vs[0], vs[1]).unwrap();
        let (_, _, e2) = mesh.add_vertex_to_edge(e, 0.5).unwrap();
        mesh.collapse_edge(e2, 1.0).unwrap();

        // Collapsing the tail half at t=1 puts the merged vertex back on
        // vs[1]'s old position.
        assert!(mesh.topology().validate());
        assert_eq!(mesh.topology().num_vertices(), 4);
        for (&v, &p) in vs.iter().zip(before.iter()).take(1) {
            assert_relative_eq!((mesh.position(v).unwrap() - p).norm(), 0.0);
        }
    }

    #[test]
    fn test_face_plane_and_centroid() {
        let mut mesh = Mesh::new();
        let (_, f) = unit_quad(&mut mesh);

        let plane = mesh.face_plane(f).unwrap();
        assert_relative_eq!(plane.normal.z.abs(), 1.0, epsilon = 1e-12);
        let c = mesh.face_centroid(f).unwrap();
        assert_relative_eq!(c.x, 0.5);
        assert_relative_eq!(c.y, 0.5);

        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_flip_all_faces_keeps_corner_values() {
        let mut mesh = Mesh::new();
        let (vs, f) = unit_quad(&mut mesh);

        // Tag each corner with its vertex's x+2y as u.
        let corners: Vec<(VertexHandle, HalfEdgeHandle)> = mesh
            .topo
            .face_halfedges(f)
            .map(|h| (mesh.topo.end_vertex(h), h))
            .collect();
        for &(v, h) in &corners {
            let p = mesh.position(v).unwrap();
            mesh.set_texcoord(h, Vector2::new(p.x + 2.0 * p.y, 0.0))
                .unwrap();
        }

        mesh.flip_all_faces();
        mesh.flip_all_faces();
        assert!(mesh.topology().validate());

        // Double flip is the identity on corner attributes.
        for h in mesh.topo.face_halfedges(f) {
            let v = mesh.topo.end_vertex(h);
            let p = mesh.position(v).unwrap();
            assert_relative_eq!(mesh.texcoord(h).unwrap().x, p.x + 2.0 * p.y);
        }

        // Single flip keeps each corner's value at its vertex.
        mesh.flip_all_faces();
        for h in mesh.topo.face_halfedges(f) {
            let v = mesh.topo.end_vertex(h);
            let p = mesh.position(v).unwrap();
            assert_relative_eq!(mesh.texcoord(h).unwrap().x, p.x + 2.0 * p.y);
        }
        let _ = vs;
    }

    #[test]
    fn test_element_centers_and_selection_bounds() {
        let mut mesh = Mesh::new();
        let (vs, f) = unit_quad(&mut mesh);
        let e = mesh.topo.find_edge(vs[0], vs[1]).unwrap();

        assert_eq!(
            mesh.element_center(Element::Vertex(vs[2])).unwrap(),
            Point3::new(1.0, 1.0, 0.0)
        );
        assert_eq!(
            mesh.element_center(Element::Edge(e)).unwrap(),
            Point3::new(0.5, 0.0, 0.0)
        );
        assert_eq!(
            mesh.element_center(Element::Face(f)).unwrap(),
            Point3::new(0.5, 0.5, 0.0)
        );

        let (min, max) = mesh
            .selection_bounds(&[Element::Vertex(vs[0]), Element::Face(f)])
            .unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(0.5, 0.5, 0.0));

        assert!(matches!(
            mesh.selection_bounds(&[]),
            Err(MeshError::Empty)
        ));
    }

    #[test]
    fn test_user_stream_follows_lifecycle() {
        use crate::topology::StreamKind;

        let mut mesh = Mesh::new();
        let (vs, _) = unit_quad(&mut mesh);

        // Registration after the fact backfills existing elements.
        let weights = mesh.register_stream(StreamKind::Vertex, "weight", 1.0f64);
        assert_eq!(*mesh.vertex_value(weights, vs[0]).unwrap(), 1.0);

        mesh.set_vertex_value(weights, vs[0], 0.25).unwrap();
        assert_eq!(*mesh.vertex_value(weights, vs[0]).unwrap(), 0.25);
        assert!(mesh
            .find_stream::<f64>(StreamKind::Vertex, "weight")
            .is_some());

        // New vertices get the default.
        let v = mesh.add_vertex(Point3::new(5.0, 0.0, 0.0));
        assert_eq!(*mesh.vertex_value(weights, v).unwrap(), 1.0);
    }

    #[test]
    fn test_add_polygon_rolls_back_on_failure() {
        let mut mesh = Mesh::new();
        let r = mesh.add_polygon(&[Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        assert!(r.is_err());
        assert_eq!(mesh.topology().num_vertices(), 0);
    }
}
