//! Implements self-collision detection

use std::collections::HashSet;
use std::fmt;

use nalgebra::{Isometry3, Point3, Vector3};
use parry3d::bounding_volume::BoundingVolume;
use parry3d::shape::Shape;
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};
use tracing::trace;

use crate::collisions_traits::SelfCollisionDetector;
use crate::joint_body::LinkBody;
use crate::kinematic_tree::KinematicTree;

/// Level of detail requested from a collision query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionQuery {
    /// Stop at the first colliding pair, no contact points.
    FirstHit,
    /// Check all pairs and report the contact point of each colliding shape pair.
    Contacts,
}

/// Single contact between two links of the robot, in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    /// Contact point on the surface of the first link
    pub position: Point3<f64>,
    /// Contact normal, pointing outwards from the first link
    pub normal: Vector3<f64>,
    /// Penetration depth (zero when just touching)
    pub depth: f64,
    pub link_a: String,
    pub link_b: String,
}

/// Result of a single self-collision query. Created, read and dropped within one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionReport {
    /// Colliding link pairs (each pair once)
    pub colliding_pairs: Vec<(String, String)>,
    /// Contacts, only filled by [`CollisionQuery::Contacts`]
    pub contacts: Vec<Contact>,
}

impl CollisionReport {
    pub fn in_collision(&self) -> bool {
        !self.colliding_pairs.is_empty()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn summary(&self) -> CollisionSummary {
        CollisionSummary {
            in_collision: self.in_collision(),
            contact_count: self.contact_count(),
        }
    }
}

/// Outcome of a collision check, as returned from single-shot runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionSummary {
    pub in_collision: bool,
    pub contact_count: usize,
}

impl fmt::Display for CollisionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in_collision={} contacts={}", self.in_collision, self.contact_count)
    }
}

/// Struct representing a collision task for detecting collisions
/// between two shapes with given world transforms.
struct CollisionTask<'a> {
    i: usize, // link index of the first shape
    j: usize, // link index of the second shape
    transform_i: Isometry3<f32>,
    transform_j: Isometry3<f32>,
    shape_i: &'a dyn Shape,
    shape_j: &'a dyn Shape,
}

/// Struct representing the geometry of a robot: its kinematic tree and one collision body per link.
pub struct RobotBody {
    pub name: String,
    pub tree: KinematicTree,
    /// Collision bodies, indexed like the links of the tree
    pub links: Vec<LinkBody>,
    /// Link pairs that are checked against each other
    check_pairs: Vec<(usize, usize)>,
}

impl RobotBody {
    /// Creates the robot body. Adjacent links (connected by a joint) and the explicitly
    /// `disabled` pairs are never checked against each other, nor are links without shapes.
    pub fn new(name: String, tree: KinematicTree, links: Vec<LinkBody>, disabled: &[(usize, usize)]) -> Self {
        let disabled: HashSet<(usize, usize)> = disabled.iter()
            .map(|&(a, b)| (a.min(b), a.max(b)))
            .collect();
        let mut check_pairs = Vec::new();
        for i in 0..links.len() {
            for j in (i + 1)..links.len() {
                if links[i].has_shapes() && links[j].has_shapes()
                    && !tree.adjacent(i, j) && !disabled.contains(&(i, j)) {
                    check_pairs.push((i, j));
                }
            }
        }
        RobotBody { name, tree, links, check_pairs }
    }

    /// Link pairs that take part in the self-collision check.
    pub fn check_pairs(&self) -> &[(usize, usize)] {
        &self.check_pairs
    }

    /// Returns true if any collision is detected in the robot's configuration.
    pub fn collides(&self, joints: &[f64]) -> bool {
        self.self_collision(joints, CollisionQuery::FirstHit).in_collision()
    }

    fn detect_collisions(&self, link_poses: &[Isometry3<f32>], query: CollisionQuery) -> CollisionReport {
        let world_aabbs: Vec<_> = self.links.iter()
            .zip(link_poses)
            .map(|(link, pose)| link.world_aabb(pose))
            .collect();

        let mut tasks = Vec::with_capacity(self.check_pairs.len());
        for &(i, j) in &self.check_pairs {
            // Links that are far apart cannot collide
            if !world_aabbs[i].intersects(&world_aabbs[j]) {
                continue;
            }
            for shape_i in &self.links[i].shapes {
                for shape_j in &self.links[j].shapes {
                    tasks.push(CollisionTask {
                        i,
                        j,
                        transform_i: link_poses[i] * shape_i.local_transform,
                        transform_j: link_poses[j] * shape_j.local_transform,
                        shape_i: &*shape_i.shape,
                        shape_j: &*shape_j.shape,
                    });
                }
            }
        }
        trace!("{}: {} shape pairs to check", self.name, tasks.len());

        match query {
            CollisionQuery::FirstHit => self.first_hit(&tasks),
            CollisionQuery::Contacts => self.all_contacts(&tasks),
        }
    }

    /// Parallel version with Rayon, exits as soon as any collision is found
    fn first_hit(&self, tasks: &[CollisionTask]) -> CollisionReport {
        let hit = tasks.par_iter()
            .find_map_any(|task| {
                let collides = parry3d::query::intersection_test(
                    &task.transform_i, task.shape_i, &task.transform_j, task.shape_j)
                    .unwrap_or(false);
                if collides { Some((task.i, task.j)) } else { None }
            });
        CollisionReport {
            colliding_pairs: hit.into_iter().map(|(i, j)| self.pair_names(i, j)).collect(),
            contacts: Vec::new(),
        }
    }

    /// Parallel version with Rayon, collects contacts of all colliding shape pairs
    fn all_contacts(&self, tasks: &[CollisionTask]) -> CollisionReport {
        let found: Vec<(usize, usize, parry3d::query::Contact)> = tasks.par_iter()
            .filter_map(|task| {
                // Zero prediction: only touching or penetrating shapes report a contact
                parry3d::query::contact(
                    &task.transform_i, task.shape_i, &task.transform_j, task.shape_j, 0.0)
                    .ok()
                    .flatten()
                    .map(|contact| (task.i, task.j, contact))
            })
            .collect();

        let mut report = CollisionReport::default();
        for (i, j, contact) in found {
            let (link_a, link_b) = self.pair_names(i, j);
            if report.colliding_pairs.last() != Some(&(link_a.clone(), link_b.clone())) {
                report.colliding_pairs.push((link_a.clone(), link_b.clone()));
            }
            report.contacts.push(Contact {
                position: contact.point1.cast::<f64>(),
                normal: contact.normal1.into_inner().cast::<f64>(),
                depth: (-contact.dist).max(0.0) as f64,
                link_a,
                link_b,
            });
        }
        report
    }

    fn pair_names(&self, i: usize, j: usize) -> (String, String) {
        (self.links[i].name.clone(), self.links[j].name.clone())
    }

    fn link_poses_f32(&self, joints: &[f64]) -> Vec<Isometry3<f32>> {
        self.tree.link_poses(joints).iter().map(|pose| pose.cast::<f32>()).collect()
    }
}

impl SelfCollisionDetector for RobotBody {
    fn name(&self) -> &str {
        &self.name
    }

    fn dof(&self) -> usize {
        self.tree.dof()
    }

    fn self_collision(&self, joints: &[f64], query: CollisionQuery) -> CollisionReport {
        let poses = self.link_poses_f32(joints);
        self.detect_collisions(&poses, query)
    }

    fn link_poses(&self, joints: &[f64]) -> Vec<(String, Isometry3<f64>)> {
        self.tree.links().iter().cloned()
            .zip(self.tree.link_poses(joints))
            .collect()
    }
}
