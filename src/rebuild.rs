//! Rebuild: editable mesh in, renderable + collision surfaces out.
//!
//! Faces are grouped by material into submeshes; every face corner gets a
//! smoothed normal (walking the vertex fan across smooth edges only), a
//! tangent derived from the face's texture U axis, and its corner texture
//! coordinate. Degenerate triangles are dropped silently; the rebuilder
//! never fails, it just emits less.

use nalgebra::{Point3, UnitQuaternion, Vector2, Vector3};
use rayon::prelude::*;
use tracing::debug;

use crate::geom;
use crate::handle::{ElementHandle, FaceHandle, HalfEdgeHandle};
use crate::mesh::{MaterialRef, MaterialResolver, Mesh, Smoothing};

/// A rigid transform with per-axis scale. The inverse is exact for uniform
/// scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation.
    pub position: Vector3<f64>,
    /// Rotation.
    pub rotation: UnitQuaternion<f64>,
    /// Per-axis scale, applied before rotation.
    pub scale: Vector3<f64>,
}

impl Transform {
    /// The do-nothing transform.
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Map a local point to world space: rotate the scaled point, then
    /// translate.
    pub fn point_to_world(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * Point3::from(p.coords.component_mul(&self.scale)) + self.position
    }

    /// Map a local direction to world space (no translation).
    pub fn vector_to_world(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v.component_mul(&self.scale)
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Transform {
        let rotation = self.rotation.inverse();
        let scale = Vector3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);
        let position = -(rotation * self.position).component_mul(&scale);
        Transform {
            position,
            rotation,
            scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// What a vertex attribute means to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexSemantic {
    /// Object-space position.
    Position,
    /// Smoothed unit normal.
    Normal,
    /// Texture-aligned tangent.
    Tangent,
    /// Normalized texture coordinate.
    TexCoord,
}

/// Scalar format of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    /// 32-bit float.
    F32,
}

impl VertexFormat {
    fn byte_size(self) -> u32 {
        match self {
            VertexFormat::F32 => 4,
        }
    }
}

/// One attribute of a vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Meaning of the attribute.
    pub semantic: VertexSemantic,
    /// Index among attributes with the same semantic.
    pub semantic_index: u32,
    /// Scalar format.
    pub format: VertexFormat,
    /// Number of scalar components.
    pub component_count: u32,
    /// Offset from the start of the vertex, in bytes.
    pub byte_offset: u32,
}

/// A concrete, bytewise description of a vertex layout, published alongside
/// the vertex array so sinks can validate a plain-old-data copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexDescriptor {
    /// Attributes in offset order.
    pub attributes: Vec<VertexAttribute>,
    /// Bytes from one vertex to the next.
    pub stride: u32,
}

impl VertexDescriptor {
    /// The layout of [`RenderVertex`].
    pub fn render_vertex() -> Self {
        let attributes = vec![
            VertexAttribute {
                semantic: VertexSemantic::Position,
                semantic_index: 0,
                format: VertexFormat::F32,
                component_count: 3,
                byte_offset: 0,
            },
            VertexAttribute {
                semantic: VertexSemantic::Normal,
                semantic_index: 0,
                format: VertexFormat::F32,
                component_count: 3,
                byte_offset: 12,
            },
            VertexAttribute {
                semantic: VertexSemantic::Tangent,
                semantic_index: 0,
                format: VertexFormat::F32,
                component_count: 3,
                byte_offset: 24,
            },
            VertexAttribute {
                semantic: VertexSemantic::TexCoord,
                semantic_index: 0,
                format: VertexFormat::F32,
                component_count: 2,
                byte_offset: 36,
            },
        ];
        Self {
            attributes,
            stride: 44,
        }
    }

    /// Check that a `repr(C)` type of size `size_of::<T>()` can back this
    /// layout: attributes in bounds, no overlap with the declared stride.
    pub fn matches_pod_size(&self, byte_size: usize) -> bool {
        if byte_size != self.stride as usize {
            return false;
        }
        self.attributes.iter().all(|a| {
            a.byte_offset + a.component_count * a.format.byte_size() <= self.stride
        })
    }
}

/// One output vertex. Field order matches
/// [`VertexDescriptor::render_vertex`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderVertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Smoothed unit normal.
    pub normal: [f32; 3],
    /// Texture-aligned tangent.
    pub tangent: [f32; 3],
    /// Normalized texture coordinate.
    pub texcoord: [f32; 2],
}

/// The renderable output for one material group.
#[derive(Debug, Clone)]
pub struct Submesh {
    /// External material reference; `None` for unassigned faces.
    pub material: Option<MaterialRef>,
    /// Compact local material id (`-1` for unassigned).
    pub local_material: i32,
    /// Vertices, one per emitted face corner.
    pub vertices: Vec<RenderVertex>,
    /// Triangle list indices into `vertices`.
    pub indices: Vec<u32>,
    /// Object-space bounds of `vertices`.
    pub bounds: (Point3<f64>, Point3<f64>),
    /// Streaming density: top-decile `sqrt(world area / UV area)` sample.
    pub uv_density: f64,
    /// Source face per emitted triangle, for picking.
    pub source_faces: Vec<FaceHandle>,
}

/// The combined collision output: one triangle soup plus hull candidates.
#[derive(Debug, Clone, Default)]
pub struct CollisionData {
    /// Object-space triangle soup vertices.
    pub positions: Vec<Point3<f64>>,
    /// Triangle list indices into `positions`.
    pub indices: Vec<u32>,
    /// One material byte per triangle (`0xFF` = unassigned).
    pub materials: Vec<u8>,
    /// Candidate point set for convex hull building.
    pub hull_points: Vec<Point3<f64>>,
}

/// Everything a rebuild produces.
#[derive(Debug, Clone, Default)]
pub struct Model {
    /// Render submeshes, one per material in use.
    pub submeshes: Vec<Submesh>,
    /// Collision surfaces.
    pub collision: CollisionData,
}

impl Default for Submesh {
    fn default() -> Self {
        Self {
            material: None,
            local_material: -1,
            vertices: Vec::new(),
            indices: Vec::new(),
            bounds: (Point3::origin(), Point3::origin()),
            uv_density: 1.0,
            source_faces: Vec::new(),
        }
    }
}

/// Receives render submeshes (the `IRenderMesh` boundary).
pub trait RenderMeshSink {
    /// Accept one finished submesh.
    fn submit(&mut self, submesh: &Submesh, descriptor: &VertexDescriptor);
}

/// Receives the combined collision payload (the `ICollisionSink` boundary).
pub trait CollisionSink {
    /// Accept the collision soup and hull candidates.
    fn submit(&mut self, collision: &CollisionData);
}

/// A sink that keeps what it is given; handy for tests and tools.
#[derive(Debug, Default)]
pub struct CollectorSink {
    /// Submeshes received so far.
    pub submeshes: Vec<Submesh>,
    /// Last collision payload received.
    pub collision: Option<CollisionData>,
}

impl RenderMeshSink for CollectorSink {
    fn submit(&mut self, submesh: &Submesh, _descriptor: &VertexDescriptor) {
        self.submeshes.push(submesh.clone());
    }
}

impl CollisionSink for CollectorSink {
    fn submit(&mut self, collision: &CollisionData) {
        self.collision = Some(collision.clone());
    }
}

/// Per-face intermediate produced in parallel, committed serially.
struct FaceBuild {
    face: FaceHandle,
    material: i32,
    corners: Vec<RenderVertex>,
    triangles: Vec<[u32; 3]>,
    density_samples: Vec<f64>,
}

/// Consume the mesh's current state and emit render submeshes grouped by
/// material plus one combined collision buffer. Transitions the mesh to
/// `Clean`. Never fails: degenerate faces and zero-area triangles are
/// dropped.
pub fn rebuild(
    mesh: &mut Mesh,
    transform: &Transform,
    resolver: &dyn MaterialResolver,
    render_sink: &mut dyn RenderMeshSink,
    collision_sink: &mut dyn CollisionSink,
) -> Model {
    mesh.compact_materials();

    let faces: Vec<FaceHandle> = mesh.topology().face_handles().collect();
    let smooth_cos = mesh.smooth_cos();

    // Heavy per-face work runs data-parallel over an immutable mesh; the
    // results are stitched together in face order below.
    let frozen: &Mesh = mesh;
    let builds: Vec<FaceBuild> = faces
        .par_iter()
        .filter_map(|&f| build_face(frozen, f, transform, smooth_cos))
        .collect();

    let mut model = Model::default();
    let mut densities: Vec<Vec<f64>> = Vec::new();
    let skipped = faces.len() - builds.len();

    for build in builds {
        let slot = match model
            .submeshes
            .iter()
            .position(|s| s.local_material == build.material)
        {
            Some(i) => i,
            None => {
                model.submeshes.push(Submesh {
                    material: mesh.materials().get(build.material),
                    local_material: build.material,
                    ..Submesh::default()
                });
                densities.push(Vec::new());
                model.submeshes.len() - 1
            }
        };
        let submesh = &mut model.submeshes[slot];

        let base = submesh.vertices.len() as u32;
        let collision_base = model.collision.positions.len() as u32;
        let material_byte = if build.material < 0 {
            0xFF
        } else {
            build.material.min(0xFE) as u8
        };

        for corner in &build.corners {
            submesh.vertices.push(*corner);
            let p = Point3::new(
                corner.position[0] as f64,
                corner.position[1] as f64,
                corner.position[2] as f64,
            );
            model.collision.positions.push(p);
            model.collision.hull_points.push(p);
        }
        for tri in &build.triangles {
            submesh.indices.extend(tri.iter().map(|&i| base + i));
            submesh.source_faces.push(build.face);
            model
                .collision
                .indices
                .extend(tri.iter().map(|&i| collision_base + i));
            model.collision.materials.push(material_byte);
        }
        densities[slot].extend(build.density_samples);
    }

    for (submesh, samples) in model.submeshes.iter_mut().zip(densities.iter_mut()) {
        submesh.finish(samples);
    }

    let descriptor = VertexDescriptor::render_vertex();
    debug_assert!(descriptor.matches_pod_size(std::mem::size_of::<RenderVertex>()));
    for submesh in &model.submeshes {
        render_sink.submit(submesh, &descriptor);
    }
    collision_sink.submit(&model.collision);

    debug!(
        submeshes = model.submeshes.len(),
        triangles = model.collision.materials.len(),
        skipped_faces = skipped,
        "rebuild complete"
    );
    mesh.mark_clean();
    model
}

impl Submesh {
    fn finish(&mut self, density_samples: &mut Vec<f64>) {
        if !self.vertices.is_empty() {
            let first = &self.vertices[0].position;
            let mut min = Point3::new(first[0] as f64, first[1] as f64, first[2] as f64);
            let mut max = min;
            for v in &self.vertices {
                for i in 0..3 {
                    min[i] = min[i].min(v.position[i] as f64);
                    max[i] = max[i].max(v.position[i] as f64);
                }
            }
            self.bounds = (min, max);
        }

        if !density_samples.is_empty() {
            // Top-decile sample: 10% of triangles are denser than this.
            density_samples
                .sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            let idx = (density_samples.len() / 10).min(density_samples.len() - 1);
            self.uv_density = density_samples[idx];
        }
    }
}

fn build_face(
    mesh: &Mesh,
    f: FaceHandle,
    transform: &Transform,
    smooth_cos: f64,
) -> Option<FaceBuild> {
    let topo = mesh.topology();
    let corners: Vec<HalfEdgeHandle> = topo.face_halfedges(f).collect();
    let positions: Vec<Point3<f64>> = corners
        .iter()
        .map(|&h| mesh.position(topo.end_vertex(h)).ok())
        .collect::<Option<_>>()?;

    let triangulation = geom::triangulate(&positions);
    if triangulation.len() != positions.len().saturating_sub(2) {
        return None;
    }

    let face_tex = mesh.face_texture(f).ok()?;
    let face_normal = mesh.face_normal(f).ok()?;

    let mut render_corners = Vec::with_capacity(corners.len());
    let mut texcoords = Vec::with_capacity(corners.len());
    for &h in &corners {
        let normal = smoothed_corner_normal(mesh, f, h, face_normal, smooth_cos);

        // Project the U axis into the plane of the smoothed normal; flip to
        // keep the frame's handedness against the face's bitangent.
        let mut tangent = face_tex.u_axis - normal * normal.dot(&face_tex.u_axis);
        if tangent.norm_squared() < 1e-18 {
            tangent = normal.cross(&face_tex.v_axis);
        }
        let mut tangent = tangent.normalize();
        if normal.cross(&tangent).dot(&face_tex.v_axis) < 0.0 {
            tangent = -tangent;
        }

        let uv = mesh.texcoord(h).ok()?;
        texcoords.push(uv);
        let p = mesh.position(topo.end_vertex(h)).ok()?;
        render_corners.push(RenderVertex {
            position: [p.x as f32, p.y as f32, p.z as f32],
            normal: [normal.x as f32, normal.y as f32, normal.z as f32],
            tangent: [tangent.x as f32, tangent.y as f32, tangent.z as f32],
            texcoord: [uv.x as f32, uv.y as f32],
        });
    }

    // Keep only triangles with real world-space area.
    let mut triangles = Vec::with_capacity(triangulation.len());
    let mut density_samples = Vec::new();
    for tri in triangulation {
        let w0 = transform.point_to_world(&positions[tri[0]]);
        let w1 = transform.point_to_world(&positions[tri[1]]);
        let w2 = transform.point_to_world(&positions[tri[2]]);
        let world_area = geom::triangle_area(&w0, &w1, &w2);
        if world_area < 1e-12 {
            continue;
        }

        let (a, b, c) = (texcoords[tri[0]], texcoords[tri[1]], texcoords[tri[2]]);
        let uv_area = ((b - a).x * (c - a).y - (c - a).x * (b - a).y).abs() * 0.5;
        if uv_area > 1e-12 {
            density_samples.push((world_area / uv_area).sqrt());
        }

        triangles.push([tri[0] as u32, tri[1] as u32, tri[2] as u32]);
    }
    if triangles.is_empty() {
        return None;
    }

    Some(FaceBuild {
        face: f,
        material: mesh.material_of(f).ok()?,
        corners: render_corners,
        triangles,
        density_samples,
    })
}

/// Accumulate face normals around the corner's vertex, crossing only edges
/// that smooth: `Soft` always, `Default` when the adjacent face normals
/// agree beyond the threshold, `Hard` and open edges never.
fn smoothed_corner_normal(
    mesh: &Mesh,
    f: FaceHandle,
    corner: HalfEdgeHandle,
    face_normal: Vector3<f64>,
    smooth_cos: f64,
) -> Vector3<f64> {
    let topo = mesh.topology();
    let mut sum = face_normal;
    let mut visited = vec![f];

    let crosses = |edge_he: HalfEdgeHandle, from: Vector3<f64>, to: Vector3<f64>| -> bool {
        let e = topo.edge_of(edge_he);
        match mesh.edge_smoothing(e).unwrap_or(Smoothing::Hard) {
            Smoothing::Hard => false,
            Smoothing::Soft => true,
            Smoothing::Default => from.dot(&to) > smooth_cos + 1e-4,
        }
    };

    // One direction: across the outgoing edge after the corner.
    let mut current_normal = face_normal;
    let mut out_he = topo.next(corner);
    loop {
        let cross = topo.twin(out_he);
        let nf = topo.face_of(cross);
        if !ElementHandle::is_valid(nf) || visited.contains(&nf) {
            break;
        }
        let Ok(n) = mesh.face_normal(nf) else { break };
        if !crosses(out_he, current_normal, n) {
            break;
        }
        sum += n;
        visited.push(nf);
        current_normal = n;
        out_he = topo.next(cross);
    }

    // Other direction: across the corner's own edge.
    let mut current_normal = face_normal;
    let mut in_he = corner;
    loop {
        let cross = topo.twin(in_he);
        let nf = topo.face_of(cross);
        if !ElementHandle::is_valid(nf) || visited.contains(&nf) {
            break;
        }
        let Ok(n) = mesh.face_normal(nf) else { break };
        if !crosses(in_he, current_normal, n) {
            break;
        }
        sum += n;
        visited.push(nf);
        current_normal = n;
        in_he = topo.prev(cross);
    }

    let len = sum.norm();
    if len > 1e-12 {
        sum / len
    } else {
        face_normal
    }
}
