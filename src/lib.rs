//! # Hewn
//!
//! An editable half-edge polygon-mesh kernel for interactive geometry
//! tools.
//!
//! Hewn keeps a manifold half-edge graph with generational handles, a set
//! of attribute streams that follow the topology (positions, per-corner
//! texture coordinates and smoothing flags, per-face texture projections
//! and materials), and the editing operators a mesh editor needs: face
//! insertion, edge split/collapse, vertex and edge welding, bevel/extrude,
//! slicing, and tearing. A rebuild pass turns the editable state into
//! renderable submeshes (smoothed normals, tangents, UVs) and a collision
//! triangle soup.
//!
//! ## Quick Start
//!
//! ```
//! use hewn::prelude::*;
//! use nalgebra::Point3;
//!
//! let mut mesh = Mesh::new();
//! let f = mesh
//!     .add_polygon(&[
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(1.0, 1.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!     ])
//!     .unwrap();
//!
//! assert_eq!(mesh.topology().num_vertices(), 4);
//! assert_eq!(mesh.topology().face_valence(f), 4);
//!
//! // Extrude the quad one unit along +Z: a closed box.
//! let out = mesh.bevel_faces(&[f], true, nalgebra::Vector3::new(0.0, 0.0, 1.0));
//! assert!(out.statuses[0].is_ok());
//! assert_eq!(mesh.topology().num_faces(), 6);
//! assert_eq!(mesh.topology().euler_characteristic(), 2);
//! ```
//!
//! ## Rebuilding Output Surfaces
//!
//! ```
//! use hewn::prelude::*;
//! use hewn::rebuild::{rebuild, CollectorSink, Transform};
//! use nalgebra::Point3;
//!
//! let mut mesh = Mesh::new();
//! mesh.add_polygon(&[
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ])
//! .unwrap();
//!
//! let mut render = CollectorSink::default();
//! let mut collision = CollectorSink::default();
//! let model = rebuild(
//!     &mut mesh,
//!     &Transform::identity(),
//!     &NullResolver,
//!     &mut render,
//!     &mut collision,
//! );
//! assert_eq!(model.submeshes[0].indices.len(), 3);
//! assert_eq!(mesh.state(), MeshState::Clean);
//! ```
//!
//! ## Handles
//!
//! Every element is addressed by a 64-bit generational handle. Deleting an
//! element invalidates its handles; later reads fail with
//! [`MeshError::StaleHandle`](crate::error::MeshError) instead of aliasing
//! whatever reused the slot.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attr;
pub mod error;
pub mod geom;
pub mod handle;
pub mod mesh;
pub mod rebuild;
pub mod texparam;
pub mod topology;

/// Prelude module for convenient imports.
///
/// ```
/// use hewn::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ItemStatus, MeshError, Result};
    pub use crate::handle::{
        EdgeHandle, Element, ElementHandle, FaceHandle, HalfEdgeHandle, VertexHandle,
    };
    pub use crate::mesh::{
        FaceTexture, MaterialRef, MaterialResolver, Mesh, MeshState, NullResolver, Smoothing,
    };
    pub use crate::topology::{EdgeListConnectivity, Topology};
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::Point3;

    #[test]
    fn test_tetrahedron_is_closed() {
        let mut mesh = Mesh::new();
        let vs = vec![
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(0.5, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(0.5, 0.5, 1.0)),
        ];
        let faces = [[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
        for f in faces {
            mesh.add_face(&[vs[f[0]], vs[f[1]], vs[f[2]]]).unwrap();
        }

        let topo = mesh.topology();
        assert_eq!(topo.num_vertices(), 4);
        assert_eq!(topo.num_faces(), 4);
        assert_eq!(topo.num_edges(), 6);
        assert_eq!(topo.num_halfedges(), 12);
        assert_eq!(topo.euler_characteristic(), 2);
        assert!(topo.validate());
        for &v in &vs {
            assert!(!topo.is_boundary_vertex(v));
        }
    }
}
