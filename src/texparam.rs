//! Texture projection parameters and per-corner UVs.
//!
//! A face carries either world-space projection parameters (U/V axes, scale,
//! offset) or explicit corner texture coordinates; these routines convert in
//! both directions and keep the two representations linked. Texel math runs
//! against the material's texture dimensions, falling back to
//! [`DEFAULT_TEXTURE_SIZE`](crate::mesh::DEFAULT_TEXTURE_SIZE) when the
//! resolver has no answer.

use nalgebra::{Matrix3, Point3, Vector2, Vector3};

use crate::error::{MeshError, Result};
use crate::handle::{EdgeHandle, ElementHandle, FaceHandle, HalfEdgeHandle, VertexHandle};
use crate::mesh::{FaceTexture, MaterialResolver, Mesh, DEFAULT_TEXTURE_SIZE};
use crate::rebuild::Transform;

/// How [`justify`] pins the face's UV bounding box inside the texture tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureJustify {
    /// Leave the offset alone.
    None,
    /// Touch the v = 0 side.
    Top,
    /// Touch the v = H side.
    Bottom,
    /// Touch the u = 0 side.
    Left,
    /// Touch the u = W side.
    Right,
    /// Center the box in the tile.
    Center,
    /// Rescale both axes so the box fills the tile.
    Fit,
    /// Rescale the u axis only.
    FitX,
    /// Rescale the v axis only.
    FitY,
}

/// Fixed orientation table: for each axis-aligned normal, the texture
/// "right" and "down" directions.
#[rustfmt::skip]
const ORIENTATIONS: [([f64; 3], [f64; 3], [f64; 3]); 6] = [
    // (normal, right, down)
    ([ 0.0,  0.0,  1.0], [ 1.0,  0.0, 0.0], [ 0.0, -1.0,  0.0]),
    ([ 0.0,  0.0, -1.0], [ 1.0,  0.0, 0.0], [ 0.0, -1.0,  0.0]),
    ([ 0.0, -1.0,  0.0], [ 1.0,  0.0, 0.0], [ 0.0,  0.0, -1.0]),
    ([ 0.0,  1.0,  0.0], [-1.0,  0.0, 0.0], [ 0.0,  0.0, -1.0]),
    ([-1.0,  0.0,  0.0], [ 0.0, -1.0, 0.0], [ 0.0,  0.0, -1.0]),
    ([ 1.0,  0.0,  0.0], [ 0.0,  1.0, 0.0], [ 0.0,  0.0, -1.0]),
];

/// Texture dimensions for a face's material, with the 512 fallback.
pub fn texture_dims(
    mesh: &Mesh,
    f: FaceHandle,
    resolver: &dyn MaterialResolver,
) -> Result<(f64, f64)> {
    let dims = mesh
        .material_ref_of(f)?
        .and_then(|m| resolver.texture_dims(m))
        .unwrap_or((DEFAULT_TEXTURE_SIZE, DEFAULT_TEXTURE_SIZE));
    Ok((dims.0.max(1) as f64, dims.1.max(1) as f64))
}

fn face_corners(mesh: &Mesh, f: FaceHandle) -> Vec<(HalfEdgeHandle, VertexHandle)> {
    mesh.topology()
        .face_halfedges(f)
        .map(|h| (h, mesh.topology().end_vertex(h)))
        .collect()
}

/// Write per-corner texture coordinates from the face's projection
/// parameters: `u = dot(U, p_world) / scale.x + offset.x` (and likewise for
/// v), normalized by the texture dimensions.
pub fn coords_from_params(
    mesh: &mut Mesh,
    f: FaceHandle,
    transform: &Transform,
    resolver: &dyn MaterialResolver,
) -> Result<()> {
    let tex = mesh.face_texture(f)?;
    let (w, h) = texture_dims(mesh, f, resolver)?;

    for (corner, v) in face_corners(mesh, f) {
        let p = transform.point_to_world(&mesh.position(v)?);
        let u = p.coords.dot(&tex.u_axis) / tex.scale.x + tex.offset.x;
        let vv = p.coords.dot(&tex.v_axis) / tex.scale.y + tex.offset.y;
        mesh.set_texcoord(corner, Vector2::new(u / w, vv / h))?;
    }
    Ok(())
}

/// Recover projection parameters from the face's corner texture
/// coordinates, exact on the best-conditioned corner triple.
pub fn params_from_coords(
    mesh: &mut Mesh,
    f: FaceHandle,
    transform: &Transform,
    resolver: &dyn MaterialResolver,
) -> Result<()> {
    let corners = face_corners(mesh, f);
    let n = corners.len();
    let (w, h) = texture_dims(mesh, f, resolver)?;

    let points: Vec<Point3<f64>> = corners
        .iter()
        .map(|&(_, v)| Ok(transform.point_to_world(&mesh.position(v)?)))
        .collect::<Result<_>>()?;
    // Corner UVs in texel space.
    let uvs: Vec<Vector2<f64>> = corners
        .iter()
        .map(|&(c, _)| {
            let t = mesh.texcoord(c)?;
            Ok(Vector2::new(t.x * w, t.y * h))
        })
        .collect::<Result<_>>()?;

    // Pick the corner triple with the best conditioning:
    // |ab|^2 * |ac|^2 * (1 - |cos|).
    let mut best: Option<(f64, usize, usize, usize)> = None;
    for a in 0..n {
        for b in 0..n {
            if b == a {
                continue;
            }
            for c in b + 1..n {
                if c == a {
                    continue;
                }
                let ab = points[b] - points[a];
                let ac = points[c] - points[a];
                let (lab, lac) = (ab.norm_squared(), ac.norm_squared());
                if lab < 1e-24 || lac < 1e-24 {
                    continue;
                }
                let cos = (ab.dot(&ac) / (lab * lac).sqrt()).abs();
                let quality = lab * lac * (1.0 - cos);
                if best.map_or(true, |(q, ..)| quality > q) {
                    best = Some((quality, a, b, c));
                }
            }
        }
    }
    let Some((quality, ia, ib, ic)) = best else {
        return Err(MeshError::Degenerate("face corners are coincident"));
    };
    if quality < 1e-18 {
        return Err(MeshError::Degenerate("face corners are collinear"));
    }

    let e0 = points[ib] - points[ia];
    let e1 = points[ic] - points[ia];
    let t0 = uvs[ib] - uvs[ia];
    let t1 = uvs[ic] - uvs[ia];

    let e_det = t0.x * t1.y - t1.x * t0.y;
    if e_det.abs() < 1e-12 {
        return Err(MeshError::Degenerate("corner UVs have no area"));
    }

    // Tangent directions: dp/du and dp/dv on the triangle.
    let dp_du = (e0 * t1.y - e1 * t0.y) / e_det;
    let dp_dv = (e1 * t0.x - e0 * t1.x) / e_det;

    // Invert [dp_du | dp_dv | dp_du x dp_dv]; its first two rows are the
    // world-to-texel gradients.
    let m = Matrix3::from_columns(&[dp_du, dp_dv, dp_du.cross(&dp_dv)]);
    let inv = m
        .try_inverse()
        .ok_or(MeshError::Degenerate("texture basis is singular"))?;
    let grad_u = Vector3::new(inv[(0, 0)], inv[(0, 1)], inv[(0, 2)]);
    let grad_v = Vector3::new(inv[(1, 0)], inv[(1, 1)], inv[(1, 2)]);

    let (gu_len, gv_len) = (grad_u.norm(), grad_v.norm());
    if gu_len < 1e-12 || gv_len < 1e-12 {
        return Err(MeshError::Degenerate("texture basis collapsed"));
    }
    let u_axis = grad_u / gu_len;
    let v_axis = grad_v / gv_len;
    let scale = Vector2::new(1.0 / gu_len, 1.0 / gv_len);

    // Anchor the offset at the pivot corner, wrapped into the tile.
    let pa = points[ia].coords;
    let offset = Vector2::new(
        (uvs[ia].x - pa.dot(&u_axis) / scale.x).rem_euclid(w),
        (uvs[ia].y - pa.dot(&v_axis) / scale.y).rem_euclid(h),
    );

    mesh.set_face_texture(
        f,
        FaceTexture {
            u_axis,
            v_axis,
            scale,
            offset,
        },
    )
}

fn closest_orientation(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let mut best = ORIENTATIONS[0];
    let mut best_dot = f64::NEG_INFINITY;
    for o in ORIENTATIONS {
        let d = normal.dot(&Vector3::from(o.0));
        if d > best_dot {
            best_dot = d;
            best = o;
        }
    }
    (
        Vector3::from(best.0),
        Vector3::from(best.1),
        Vector3::from(best.2),
    )
}

/// Reset the face to world-grid projection: axes from the orientation table
/// closest to the face normal, scale 0.25, offset zero.
pub fn align_to_grid(
    mesh: &mut Mesh,
    f: FaceHandle,
    transform: &Transform,
    resolver: &dyn MaterialResolver,
) -> Result<()> {
    let normal = mesh.face_normal(f)?;
    let (_, right, down) = closest_orientation(&normal);
    mesh.set_face_texture(
        f,
        FaceTexture {
            u_axis: right,
            v_axis: down,
            scale: Vector2::new(0.25, 0.25),
            offset: Vector2::zeros(),
        },
    )?;
    coords_from_params(mesh, f, transform, resolver)
}

/// Like [`align_to_grid`], but rotated into the face plane: V starts from
/// the table's "down", U is `normal x V`, then V is squared up as
/// `U x normal`.
pub fn align_to_face(
    mesh: &mut Mesh,
    f: FaceHandle,
    transform: &Transform,
    resolver: &dyn MaterialResolver,
) -> Result<()> {
    let normal = mesh.face_normal(f)?;
    let (_, _, down) = closest_orientation(&normal);

    let mut u_axis = normal.cross(&down);
    if u_axis.norm() < 1e-9 {
        // Normal parallel to the table's down: fall back to the grid frame.
        return align_to_grid(mesh, f, transform, resolver);
    }
    u_axis.normalize_mut();
    let v_axis = u_axis.cross(&normal);

    mesh.set_face_texture(
        f,
        FaceTexture {
            u_axis,
            v_axis,
            scale: Vector2::new(0.25, 0.25),
            offset: Vector2::zeros(),
        },
    )?;
    coords_from_params(mesh, f, transform, resolver)
}

/// Texel-space extents of the face against its current basis: `(min, max)`.
pub fn face_texel_extents(
    mesh: &Mesh,
    f: FaceHandle,
    transform: &Transform,
) -> Result<(Vector2<f64>, Vector2<f64>)> {
    let tex = mesh.face_texture(f)?;
    let mut min = Vector2::new(f64::INFINITY, f64::INFINITY);
    let mut max = Vector2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (_, v) in face_corners(mesh, f) {
        let p = transform.point_to_world(&mesh.position(v)?);
        let u = p.coords.dot(&tex.u_axis) / tex.scale.x + tex.offset.x;
        let vv = p.coords.dot(&tex.v_axis) / tex.scale.y + tex.offset.y;
        min.x = min.x.min(u);
        min.y = min.y.min(vv);
        max.x = max.x.max(u);
        max.y = max.y.max(vv);
    }
    Ok((min, max))
}

/// Shift (and for the `Fit` modes, rescale) the face's projection so its
/// texel bounding box touches the requested side of the `(W, H)` tile.
/// `extents` overrides the measured box, letting several faces justify
/// against a shared region.
pub fn justify(
    mesh: &mut Mesh,
    f: FaceHandle,
    mode: TextureJustify,
    extents: Option<(Vector2<f64>, Vector2<f64>)>,
    transform: &Transform,
    resolver: &dyn MaterialResolver,
) -> Result<()> {
    if mode == TextureJustify::None {
        return Ok(());
    }
    let (w, h) = texture_dims(mesh, f, resolver)?;

    // Fit modes change scale first, then re-measure and pin to the corner.
    if matches!(
        mode,
        TextureJustify::Fit | TextureJustify::FitX | TextureJustify::FitY
    ) {
        let (min, max) = extents.map_or_else(|| face_texel_extents(mesh, f, transform), Ok)?;
        let mut tex = mesh.face_texture(f)?;
        let span = max - min;
        if matches!(mode, TextureJustify::Fit | TextureJustify::FitX) && span.x > 1e-9 {
            tex.scale.x *= span.x / w;
        }
        if matches!(mode, TextureJustify::Fit | TextureJustify::FitY) && span.y > 1e-9 {
            tex.scale.y *= span.y / h;
        }
        mesh.set_face_texture(f, tex)?;

        let (min, _) = face_texel_extents(mesh, f, transform)?;
        let mut tex = mesh.face_texture(f)?;
        tex.offset -= min;
        mesh.set_face_texture(f, tex)?;
        return coords_from_params(mesh, f, transform, resolver);
    }

    let (min, max) = extents.map_or_else(|| face_texel_extents(mesh, f, transform), Ok)?;
    let mut tex = mesh.face_texture(f)?;
    match mode {
        TextureJustify::Left => tex.offset.x -= min.x,
        TextureJustify::Right => tex.offset.x += w - max.x,
        TextureJustify::Top => tex.offset.y -= min.y,
        TextureJustify::Bottom => tex.offset.y += h - max.y,
        TextureJustify::Center => {
            tex.offset.x += (w - min.x - max.x) * 0.5;
            tex.offset.y += (h - min.y - max.y) * 0.5;
        }
        _ => {}
    }
    mesh.set_face_texture(f, tex)?;
    coords_from_params(mesh, f, transform, resolver)
}

/// Average the corner UVs across each edge's two faces, after shifting one
/// side by whole tiles to sit within half a tile of the other. Projection
/// parameters are re-derived on every touched face.
pub fn average_edge_uvs(
    mesh: &mut Mesh,
    edges: &[EdgeHandle],
    transform: &Transform,
    resolver: &dyn MaterialResolver,
) -> Result<()> {
    if edges.is_empty() {
        return Err(MeshError::Empty);
    }
    let mut touched: Vec<FaceHandle> = Vec::new();

    for &e in edges {
        let topo = mesh.topology();
        topo.check_edge(e)?;
        let h = topo.half_of(e);
        let t = topo.twin(h);
        let (f1, f2) = (topo.face_of(h), topo.face_of(t));
        if !ElementHandle::is_valid(f1) || !ElementHandle::is_valid(f2) {
            continue;
        }

        // Corners at the shared endpoints, per side.
        let b_side1 = h;
        let a_side1 = topo.prev(h);
        let a_side2 = t;
        let b_side2 = topo.prev(t);

        // Bring face 2 within half a tile of face 1.
        let shift = {
            let u1 = mesh.texcoord(a_side1)?;
            let u2 = mesh.texcoord(a_side2)?;
            Vector2::new((u1.x - u2.x).round(), (u1.y - u2.y).round())
        };
        if shift != Vector2::zeros() {
            let corners: Vec<HalfEdgeHandle> =
                mesh.topology().face_halfedges(f2).collect();
            for c in corners {
                let uv = mesh.texcoord(c)?;
                mesh.set_texcoord(c, uv + shift)?;
            }
        }

        for (c1, c2) in [(a_side1, a_side2), (b_side1, b_side2)] {
            let mean = (mesh.texcoord(c1)? + mesh.texcoord(c2)?) * 0.5;
            mesh.set_texcoord(c1, mean)?;
            mesh.set_texcoord(c2, mean)?;
        }

        for f in [f1, f2] {
            if !touched.contains(&f) {
                touched.push(f);
            }
        }
    }

    for f in touched {
        // A face whose UVs degenerated keeps its old parameters.
        match params_from_coords(mesh, f, transform, resolver) {
            Ok(()) | Err(MeshError::Degenerate(_)) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Average the corner UVs of all faces meeting at each vertex, tile-shifted
/// like [`average_edge_uvs`].
pub fn average_vertex_uvs(
    mesh: &mut Mesh,
    verts: &[VertexHandle],
    transform: &Transform,
    resolver: &dyn MaterialResolver,
) -> Result<()> {
    if verts.is_empty() {
        return Err(MeshError::Empty);
    }
    let mut touched: Vec<FaceHandle> = Vec::new();

    for &v in verts {
        mesh.topology().check_vertex(v)?;
        // One corner per incident face at this vertex.
        let corners: Vec<(HalfEdgeHandle, FaceHandle)> = {
            let topo = mesh.topology();
            topo.incoming_halfedges(v)
                .filter(|&h| ElementHandle::is_valid(topo.face_of(h)))
                .map(|h| (h, topo.face_of(h)))
                .collect()
        };
        if corners.len() < 2 {
            continue;
        }

        let reference = mesh.texcoord(corners[0].0)?;
        let mut sum = reference;
        let mut shifted: Vec<HalfEdgeHandle> = vec![corners[0].0];
        for &(c, _) in &corners[1..] {
            let uv = mesh.texcoord(c)?;
            let shift = Vector2::new(
                (reference.x - uv.x).round(),
                (reference.y - uv.y).round(),
            );
            let adjusted = uv + shift;
            mesh.set_texcoord(c, adjusted)?;
            sum += adjusted;
            shifted.push(c);
        }

        let mean = sum / corners.len() as f64;
        for c in shifted {
            mesh.set_texcoord(c, mean)?;
        }
        for &(_, f) in &corners {
            if !touched.contains(&f) {
                touched.push(f);
            }
        }
    }

    for f in touched {
        match params_from_coords(mesh, f, transform, resolver) {
            Ok(()) | Err(MeshError::Degenerate(_)) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::NullResolver;
    use approx::assert_relative_eq;

    fn unit_quad_up() -> (Mesh, FaceHandle) {
        let mut mesh = Mesh::new();
        let vs = vec![
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)),
        ];
        let f = mesh.add_face(&vs).unwrap();
        (mesh, f)
    }

    #[test]
    fn test_align_to_grid_up_face() {
        let (mut mesh, f) = unit_quad_up();
        align_to_grid(&mut mesh, f, &Transform::identity(), &NullResolver).unwrap();

        let tex = mesh.face_texture(f).unwrap();
        assert_eq!(tex.u_axis, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(tex.v_axis, Vector3::new(0.0, -1.0, 0.0));
        assert_eq!(tex.scale, Vector2::new(0.25, 0.25));
        assert_eq!(tex.offset, Vector2::zeros());
    }

    #[test]
    fn test_grid_coords_on_unit_quad() {
        let (mut mesh, f) = unit_quad_up();
        align_to_grid(&mut mesh, f, &Transform::identity(), &NullResolver).unwrap();

        // Corner (1,0,0): u = 1/0.25 = 4 texels = 4/512; corner (1,1,0)
        // picks up v = -4 texels.
        for h in mesh.topology().face_halfedges(f).collect::<Vec<_>>() {
            let v = mesh.topology().end_vertex(h);
            let p = mesh.position(v).unwrap();
            let uv = mesh.texcoord(h).unwrap();
            assert_relative_eq!(uv.x, p.x * 4.0 / 512.0, epsilon = 1e-12);
            assert_relative_eq!(uv.y, -p.y * 4.0 / 512.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_params_coords_roundtrip() {
        let (mut mesh, f) = unit_quad_up();
        let id = Transform::identity();
        align_to_grid(&mut mesh, f, &id, &NullResolver).unwrap();
        let before = mesh.face_texture(f).unwrap();

        params_from_coords(&mut mesh, f, &id, &NullResolver).unwrap();
        let after = mesh.face_texture(f).unwrap();

        assert_relative_eq!((after.u_axis - before.u_axis).norm(), 0.0, epsilon = 1e-4);
        assert_relative_eq!((after.v_axis - before.v_axis).norm(), 0.0, epsilon = 1e-4);
        assert_relative_eq!((after.scale - before.scale).norm(), 0.0, epsilon = 1e-4);
        assert_relative_eq!((after.offset - before.offset).norm(), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_roundtrip_with_offset_and_rotation() {
        let (mut mesh, f) = unit_quad_up();
        let id = Transform::identity();
        let sqrt2 = std::f64::consts::FRAC_1_SQRT_2;
        mesh.set_face_texture(
            f,
            FaceTexture {
                u_axis: Vector3::new(sqrt2, sqrt2, 0.0),
                v_axis: Vector3::new(sqrt2, -sqrt2, 0.0),
                scale: Vector2::new(0.5, 0.125),
                offset: Vector2::new(17.0, 80.5),
            },
        )
        .unwrap();
        coords_from_params(&mut mesh, f, &id, &NullResolver).unwrap();
        let coords_before: Vec<Vector2<f64>> = mesh
            .topology()
            .face_halfedges(f)
            .map(|h| mesh.texcoord(h).unwrap())
            .collect();

        params_from_coords(&mut mesh, f, &id, &NullResolver).unwrap();
        let tex = mesh.face_texture(f).unwrap();
        assert_relative_eq!(tex.u_axis.dot(&Vector3::new(sqrt2, sqrt2, 0.0)), 1.0, epsilon = 1e-6);
        assert_relative_eq!(tex.scale.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(tex.scale.y, 0.125, epsilon = 1e-6);
        assert_relative_eq!(tex.offset.x, 17.0, epsilon = 1e-4);
        assert_relative_eq!(tex.offset.y, 80.5, epsilon = 1e-4);

        // Regenerating coords from the recovered parameters reproduces the
        // original corner UVs.
        coords_from_params(&mut mesh, f, &id, &NullResolver).unwrap();
        for (h, before) in mesh
            .topology()
            .face_halfedges(f)
            .zip(coords_before.iter())
        {
            assert_relative_eq!(
                (mesh.texcoord(h).unwrap() - before).norm(),
                0.0,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_align_to_face_on_slope() {
        // A ramp tilted 45 degrees about X: align_to_face keeps U in the
        // face plane and horizontal.
        let mut mesh = Mesh::new();
        let vs = vec![
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 1.0, 1.0)),
            mesh.add_vertex(Point3::new(0.0, 1.0, 1.0)),
        ];
        let f = mesh.add_face(&vs).unwrap();
        align_to_face(&mut mesh, f, &Transform::identity(), &NullResolver).unwrap();

        let tex = mesh.face_texture(f).unwrap();
        let n = mesh.face_normal(f).unwrap();
        assert_relative_eq!(tex.u_axis.dot(&n), 0.0, epsilon = 1e-9);
        assert_relative_eq!(tex.v_axis.dot(&n), 0.0, epsilon = 1e-9);
        assert_relative_eq!(tex.u_axis.norm(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(tex.u_axis.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_justify_left_and_fit() {
        let (mut mesh, f) = unit_quad_up();
        let id = Transform::identity();
        align_to_grid(&mut mesh, f, &id, &NullResolver).unwrap();
        let mut tex = mesh.face_texture(f).unwrap();
        tex.offset = Vector2::new(100.0, 0.0);
        mesh.set_face_texture(f, tex).unwrap();

        justify(&mut mesh, f, TextureJustify::Left, None, &id, &NullResolver).unwrap();
        let (min, _) = face_texel_extents(&mesh, f, &id).unwrap();
        assert_relative_eq!(min.x, 0.0, epsilon = 1e-9);

        justify(&mut mesh, f, TextureJustify::Fit, None, &id, &NullResolver).unwrap();
        let (min, max) = face_texel_extents(&mesh, f, &id).unwrap();
        assert_relative_eq!(min.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(max.x, 512.0, epsilon = 1e-6);
        assert_relative_eq!(min.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(max.y, 512.0, epsilon = 1e-6);

        // Corner texcoords now span the unit tile.
        let span: Vec<Vector2<f64>> = mesh
            .topology()
            .face_halfedges(f)
            .map(|h| mesh.texcoord(h).unwrap())
            .collect();
        let max_u = span.iter().map(|uv| uv.x).fold(f64::NEG_INFINITY, f64::max);
        assert_relative_eq!(max_u, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_average_edge_uvs_meets_in_the_middle() {
        // Two quads sharing an edge with disagreeing UVs on it.
        let mut mesh = Mesh::new();
        let vs = vec![
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(2.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(2.0, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)),
        ];
        let f1 = mesh.add_face(&[vs[0], vs[1], vs[4], vs[5]]).unwrap();
        let f2 = mesh.add_face(&[vs[1], vs[2], vs[3], vs[4]]).unwrap();
        let id = Transform::identity();
        align_to_grid(&mut mesh, f1, &id, &NullResolver).unwrap();
        align_to_grid(&mut mesh, f2, &id, &NullResolver).unwrap();

        // Perturb face 2's corners on the shared edge.
        let shared = mesh.topology().find_edge(vs[1], vs[4]).unwrap();
        let h = mesh.topology().half_of(shared);
        let t = mesh.topology().twin(h);
        let (side2_a, side2_b) = if ElementHandle::is_valid(mesh.topology().face_of(t)) {
            (t, mesh.topology().prev(t))
        } else {
            (h, mesh.topology().prev(h))
        };
        let uv_a = mesh.texcoord(side2_a).unwrap();
        mesh.set_texcoord(side2_a, uv_a + Vector2::new(0.01, 0.0))
            .unwrap();
        let uv_b = mesh.texcoord(side2_b).unwrap();
        mesh.set_texcoord(side2_b, uv_b + Vector2::new(0.01, 0.0))
            .unwrap();

        average_edge_uvs(&mut mesh, &[shared], &id, &NullResolver).unwrap();

        // Both sides now agree exactly along the seam.
        let topo = mesh.topology();
        let (h, t) = (topo.half_of(shared), topo.twin(topo.half_of(shared)));
        let f1_at_b = mesh.texcoord(h).unwrap();
        let f2_at_b = mesh.texcoord(topo.prev(t)).unwrap();
        assert_relative_eq!((f1_at_b - f2_at_b).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_average_empty_selection_is_an_error() {
        let (mut mesh, _) = unit_quad_up();
        let id = Transform::identity();
        assert!(matches!(
            average_edge_uvs(&mut mesh, &[], &id, &NullResolver),
            Err(MeshError::Empty)
        ));
        assert!(matches!(
            average_vertex_uvs(&mut mesh, &[], &id, &NullResolver),
            Err(MeshError::Empty)
        ));
    }
}
