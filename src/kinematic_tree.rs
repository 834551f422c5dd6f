//! Forward kinematics over a tree of links connected by joints.

use std::collections::VecDeque;

use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};

use crate::scene_error::SceneError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointKind {
    Revolute,
    Continuous,
    Prismatic,
    Fixed,
}

impl JointKind {
    pub fn is_movable(&self) -> bool {
        !matches!(self, JointKind::Fixed)
    }
}

/// Joint connecting a parent link to a child link.
#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub kind: JointKind,
    /// Index of the parent link
    pub parent: usize,
    /// Index of the child link
    pub child: usize,
    /// Pose of the child frame in the parent frame when the joint value is zero
    pub origin: Isometry3<f64>,
    pub axis: Unit<Vector3<f64>>,
    /// Lower and upper limit, if given
    pub limits: Option<(f64, f64)>,
}

impl Joint {
    /// Child frame in the parent frame for the joint value `q`.
    pub fn transform(&self, q: f64) -> Isometry3<f64> {
        match self.kind {
            JointKind::Revolute | JointKind::Continuous =>
                self.origin * UnitQuaternion::from_axis_angle(&self.axis, q),
            JointKind::Prismatic =>
                self.origin * Translation3::from(self.axis.into_inner() * q),
            JointKind::Fixed => self.origin,
        }
    }
}

/// Links and joints of one robot. Degrees of freedom are the movable joints,
/// numbered in the order the joints were given.
#[derive(Debug, Clone)]
pub struct KinematicTree {
    links: Vec<String>,
    joints: Vec<Joint>,
    /// For each joint, its index in the joint value vector (movable joints only)
    dof_index: Vec<Option<usize>>,
    /// Joints ordered so that a parent link is always placed before its children
    order: Vec<usize>,
    root: usize,
    dof: usize,
}

impl KinematicTree {
    /// Builds the tree. There must be exactly one root link, every other link must be the
    /// child of exactly one joint, and all links must be reachable from the root.
    pub fn new(links: Vec<String>, joints: Vec<Joint>) -> Result<Self, SceneError> {
        if links.is_empty() {
            return Err(SceneError::StructureError("robot has no links".into()));
        }

        let mut parent_joint: Vec<Option<usize>> = vec![None; links.len()];
        for (j, joint) in joints.iter().enumerate() {
            if joint.parent >= links.len() || joint.child >= links.len() {
                return Err(SceneError::StructureError(format!("joint {} link index out of range", joint.name)));
            }
            if let Some(other) = parent_joint[joint.child] {
                return Err(SceneError::StructureError(format!(
                    "link {} is the child of both {} and {}",
                    links[joint.child], joints[other].name, joint.name)));
            }
            parent_joint[joint.child] = Some(j);
        }

        let roots: Vec<usize> = (0..links.len()).filter(|&l| parent_joint[l].is_none()).collect();
        if roots.len() != 1 {
            let names: Vec<&str> = roots.iter().map(|&r| links[r].as_str()).collect();
            return Err(SceneError::StructureError(format!("expected exactly one root link, found {:?}", names)));
        }
        let root = roots[0];

        // Breadth first from the root
        let mut order = Vec::with_capacity(joints.len());
        let mut queue = VecDeque::from([root]);
        let mut reached = vec![false; links.len()];
        reached[root] = true;
        while let Some(link) = queue.pop_front() {
            for (j, joint) in joints.iter().enumerate() {
                if joint.parent == link && !reached[joint.child] {
                    reached[joint.child] = true;
                    order.push(j);
                    queue.push_back(joint.child);
                }
            }
        }
        if let Some(lost) = reached.iter().position(|r| !r) {
            return Err(SceneError::StructureError(format!("link {} is not reachable from the root", links[lost])));
        }

        let mut dof = 0;
        let dof_index = joints.iter()
            .map(|joint| {
                if joint.kind.is_movable() {
                    dof += 1;
                    Some(dof - 1)
                } else {
                    None
                }
            })
            .collect();

        Ok(KinematicTree { links, joints, dof_index, order, root, dof })
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn root(&self) -> usize {
        self.root
    }

    /// Names of the movable joints in joint value order.
    pub fn dof_names(&self) -> Vec<&str> {
        self.joints.iter()
            .filter(|j| j.kind.is_movable())
            .map(|j| j.name.as_str())
            .collect()
    }

    pub fn link_index(&self, name: &str) -> Option<usize> {
        self.links.iter().position(|l| l == name)
    }

    /// True if a joint connects the two links directly.
    pub fn adjacent(&self, a: usize, b: usize) -> bool {
        self.joints.iter().any(|j| (j.parent == a && j.child == b) || (j.parent == b && j.child == a))
    }

    /// World poses of all links (indexed like [`Self::links`]) with the root at the identity.
    /// Missing joint values are taken as zero.
    pub fn link_poses(&self, joint_values: &[f64]) -> Vec<Isometry3<f64>> {
        let mut poses = vec![Isometry3::identity(); self.links.len()];
        for &j in &self.order {
            let joint = &self.joints[j];
            let q = self.dof_index[j]
                .and_then(|i| joint_values.get(i).copied())
                .unwrap_or(0.0);
            poses[joint.child] = poses[joint.parent] * joint.transform(q);
        }
        poses
    }
}
