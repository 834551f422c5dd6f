use nalgebra::Isometry3;
use parry3d::bounding_volume::{Aabb, BoundingVolume};
use parry3d::shape::SharedShape;

/// Struct representing a collision shape attached to a link
pub struct CollisionShape {
    pub name: String,
    pub local_transform: Isometry3<f32>,
    pub shape: SharedShape,
}

/// Struct representing a link, which contains multiple shapes and a simplified version of the
/// link's shape (as an AABB in the link frame) used to skip pairs that are far apart.
pub struct LinkBody {
    pub name: String,
    pub shapes: Vec<CollisionShape>,
    pub local_aabb: Aabb,
}

impl LinkBody {
    /// Constructor to initialize a link with a given list of collision shapes.
    /// The constructor also computes an AABB around all the shapes.
    pub fn new(name: String, shapes: Vec<CollisionShape>) -> Self {
        let local_aabb = Self::compute_aabb(&shapes);
        LinkBody { name, shapes, local_aabb }
    }

    /// Links without shapes take no part in collision checks.
    pub fn has_shapes(&self) -> bool {
        !self.shapes.is_empty()
    }

    /// AABB of the link placed at the given world pose.
    pub fn world_aabb(&self, link_pose: &Isometry3<f32>) -> Aabb {
        self.local_aabb.transform_by(link_pose)
    }

    /// Compute the AABB (Axis-Aligned Bounding Box) that surrounds all the shapes in the link.
    fn compute_aabb(shapes: &[CollisionShape]) -> Aabb {
        let mut overall_aabb = Aabb::new_invalid();

        // Loop over each shape and expand the AABB to include its local bounding box
        for shape in shapes {
            let local_aabb = shape.shape.compute_aabb(&shape.local_transform);
            overall_aabb.merge(&local_aabb);
        }

        overall_aabb
    }
}
