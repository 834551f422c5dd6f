//! Reads robot models (links, joints and collision geometry) from URDF-style XML.
//!
//! The file may hold a single `<robot>` element or any root element containing several
//! robots. Collision geometry is limited to primitives:
//!
//! ```xml
//! <robot name="hubo">
//!   <link name="Body_Torso">
//!     <collision>
//!       <origin xyz="0 0 0.1" rpy="0 0 0"/>
//!       <geometry><box size="0.2 0.3 0.25"/></geometry>
//!     </collision>
//!   </link>
//!   <joint name="WST" type="revolute">
//!     <parent link="Body_Hip"/>
//!     <child link="Body_Torso"/>
//!     <origin xyz="0 0 0.1"/>
//!     <axis xyz="0 0 1"/>
//!     <limit lower="${radians(-180)}" upper="${radians(180)}"/>
//!   </joint>
//!   <disable_collisions link1="Body_Hip" link2="Body_LHY"/>
//! </robot>
//! ```

extern crate sxd_document;

use std::fs::read_to_string;
use std::path::Path;
use std::sync::LazyLock;

use nalgebra::{Isometry3, Point3, Translation3, Unit, UnitQuaternion, Vector3};
use parry3d::shape::SharedShape;
use regex::Regex;
use sxd_document::{dom, parser};
use tracing::{debug, warn};

use crate::collisions::RobotBody;
use crate::joint_body::{CollisionShape, LinkBody};
use crate::kinematic_tree::{Joint, JointKind, KinematicTree};
use crate::scene_error::SceneError;

/// Reads all robots from the model file. Robots without links are skipped, so the result
/// may be empty.
///
/// # Example
/// ```no_run
/// let robots = hubo_sim_loop::urdf::from_urdf_file("openHubo/jaemiHubo.robot.xml")
///     .expect("Failed to load the model");
/// println!("{} robots loaded", robots.len());
/// ```
pub fn from_urdf_file<P: AsRef<Path>>(path: P) -> Result<Vec<RobotBody>, SceneError> {
    let xml_content = read_to_string(path)?;
    from_urdf(&xml_content)
}

/// Same as [`from_urdf_file`] but takes the XML content directly.
pub fn from_urdf(xml_content: &str) -> Result<Vec<RobotBody>, SceneError> {
    let package = parser::parse(xml_content)
        .map_err(|e| SceneError::XmlProcessingError(format!("Failed to parse XML: {:?}", e)))?;
    let document = package.as_document();

    // Access the root element
    let root_element = document.root().children().into_iter()
        .find_map(|e| e.element())
        .ok_or_else(|| SceneError::XmlProcessingError("No root element found".into()))?;

    let mut robot_elements = Vec::new();
    collect_robots(root_element, &mut robot_elements);

    let mut robots = Vec::with_capacity(robot_elements.len());
    for element in robot_elements {
        if let Some(robot) = build_robot(element)? {
            robots.push(robot);
        }
    }
    Ok(robots)
}

// Recursive function to collect robot elements. Robots are not nested.
fn collect_robots<'d>(element: dom::Element<'d>, robots: &mut Vec<dom::Element<'d>>) {
    if element.name().local_part() == "robot" {
        robots.push(element);
        return;
    }
    for child in child_elements(element) {
        collect_robots(child, robots);
    }
}

fn child_elements<'d>(element: dom::Element<'d>) -> impl Iterator<Item = dom::Element<'d>> {
    element.children().into_iter().filter_map(|e| e.element())
}

fn first_child<'d>(element: dom::Element<'d>, tag: &str) -> Option<dom::Element<'d>> {
    child_elements(element).find(|el| el.name().local_part() == tag)
}

fn required_attribute<'d>(element: dom::Element<'d>, attr: &str, context: &str) -> Result<&'d str, SceneError> {
    element.attribute_value(attr)
        .ok_or_else(|| SceneError::MissingField(format!("{} of {}", attr, context)))
}

struct JointData {
    name: String,
    kind: JointKind,
    parent: String,
    child: String,
    origin: Isometry3<f64>,
    axis: Unit<Vector3<f64>>,
    limits: Option<(f64, f64)>,
}

fn build_robot(element: dom::Element) -> Result<Option<RobotBody>, SceneError> {
    let name = element.attribute_value("name").unwrap_or("robot").to_string();

    let mut links = Vec::new();
    let mut joints = Vec::new();
    let mut disabled_names = Vec::new();

    for child in child_elements(element) {
        match child.name().local_part() {
            "link" => links.push(read_link(child)?),
            "joint" => joints.push(read_joint(child)?),
            "disable_collisions" => disabled_names.push((
                required_attribute(child, "link1", "disable_collisions")?.to_string(),
                required_attribute(child, "link2", "disable_collisions")?.to_string(),
            )),
            other => debug!("{}: ignoring <{}>", name, other),
        }
    }

    if links.is_empty() {
        warn!("Robot {} has no links, skipped", name);
        return Ok(None);
    }

    let link_names: Vec<String> = links.iter().map(|l: &LinkBody| l.name.clone()).collect();
    let index_of = |owner: &str, link: &str| -> Result<usize, SceneError> {
        link_names.iter().position(|l| l == link)
            .ok_or_else(|| SceneError::UnknownLink { joint: owner.to_string(), link: link.to_string() })
    };

    let mut tree_joints = Vec::with_capacity(joints.len());
    for joint in joints {
        tree_joints.push(Joint {
            parent: index_of(&joint.name, &joint.parent)?,
            child: index_of(&joint.name, &joint.child)?,
            name: joint.name,
            kind: joint.kind,
            origin: joint.origin,
            axis: joint.axis,
            limits: joint.limits,
        });
    }

    let mut disabled = Vec::with_capacity(disabled_names.len());
    for (link1, link2) in &disabled_names {
        disabled.push((index_of("disable_collisions", link1)?, index_of("disable_collisions", link2)?));
    }

    let tree = KinematicTree::new(link_names, tree_joints)?;
    debug!("Robot {}: {} links, {} dof", name, tree.links().len(), tree.dof());
    Ok(Some(RobotBody::new(name, tree, links, &disabled)))
}

fn read_link(element: dom::Element) -> Result<LinkBody, SceneError> {
    let name = required_attribute(element, "name", "link")?.to_string();
    let mut shapes = Vec::new();

    for (idx, collision) in child_elements(element)
        .filter(|el| el.name().local_part() == "collision")
        .enumerate() {
        let origin = first_child(collision, "origin")
            .map_or_else(|| Ok(Isometry3::identity()), read_origin)?;
        let geometry = first_child(collision, "geometry")
            .and_then(|g| child_elements(g).next())
            .ok_or_else(|| SceneError::MissingField(format!("geometry of collision in link {}", name)))?;

        let shape_name = collision.attribute_value("name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}", name, idx));

        match read_shape(geometry)? {
            Some((shape, shape_frame)) => shapes.push(CollisionShape {
                name: shape_name,
                local_transform: (origin * shape_frame).cast::<f32>(),
                shape,
            }),
            None => warn!("Link {}: <{}> geometry is not supported, skipped",
                name, geometry.name().local_part()),
        }
    }

    Ok(LinkBody::new(name, shapes))
}

/// Primitive shape and its frame relative to the collision origin.
fn read_shape(element: dom::Element) -> Result<Option<(SharedShape, Isometry3<f64>)>, SceneError> {
    let identity = Isometry3::identity();
    let shape = match element.name().local_part() {
        "box" => {
            let size = parse_values(required_attribute(element, "size", "box")?, 3)?;
            positive(&size, "box size")?;
            (SharedShape::cuboid(size[0] as f32 / 2.0, size[1] as f32 / 2.0, size[2] as f32 / 2.0), identity)
        }
        "sphere" => {
            let radius = parse_number(required_attribute(element, "radius", "sphere")?)?;
            positive(&[radius], "sphere radius")?;
            (SharedShape::ball(radius as f32), identity)
        }
        "cylinder" => {
            let radius = parse_number(required_attribute(element, "radius", "cylinder")?)?;
            let length = parse_number(required_attribute(element, "length", "cylinder")?)?;
            positive(&[radius, length], "cylinder dimensions")?;
            // Cylinder axis is Y in parry3d and Z in the model file
            let y_to_z = Isometry3::rotation(Vector3::x() * std::f64::consts::FRAC_PI_2);
            (SharedShape::cylinder(length as f32 / 2.0, radius as f32), y_to_z)
        }
        "capsule" => {
            let radius = parse_number(required_attribute(element, "radius", "capsule")?)?;
            let length = parse_number(required_attribute(element, "length", "capsule")?)?;
            positive(&[radius, length], "capsule dimensions")?;
            let half = length as f32 / 2.0;
            (SharedShape::capsule(Point3::new(0.0, 0.0, -half), Point3::new(0.0, 0.0, half), radius as f32), identity)
        }
        _ => return Ok(None),
    };
    Ok(Some(shape))
}

fn read_joint(element: dom::Element) -> Result<JointData, SceneError> {
    let name = required_attribute(element, "name", "joint")?.to_string();
    let kind = match element.attribute_value("type").unwrap_or("revolute") {
        "revolute" | "hinge" => JointKind::Revolute,
        "continuous" => JointKind::Continuous,
        "prismatic" | "slider" => JointKind::Prismatic,
        "fixed" => JointKind::Fixed,
        other => return Err(SceneError::ParseError(format!("Joint {}: unsupported type {}", name, other))),
    };

    let parent = first_child(element, "parent")
        .ok_or_else(|| SceneError::MissingField(format!("parent of joint {}", name)))
        .and_then(|p| required_attribute(p, "link", &name))?
        .to_string();
    let child = first_child(element, "child")
        .ok_or_else(|| SceneError::MissingField(format!("child of joint {}", name)))
        .and_then(|c| required_attribute(c, "link", &name))?
        .to_string();

    let origin = first_child(element, "origin")
        .map_or_else(|| Ok(Isometry3::identity()), read_origin)?;

    let axis = match first_child(element, "axis") {
        Some(axis) => {
            let xyz = parse_values(required_attribute(axis, "xyz", &name)?, 3)?;
            Unit::try_new(Vector3::new(xyz[0], xyz[1], xyz[2]), 1e-9)
                .ok_or_else(|| SceneError::ParseError(format!("Joint {}: zero axis", name)))?
        }
        None => Vector3::x_axis(), // URDF default
    };

    let limits = match first_child(element, "limit") {
        Some(limit) => match get_limits(limit) {
            Ok(limits) => Some(limits),
            Err(e) => {
                warn!("Joint limits defined but not readable for {}: {}", name, e);
                None
            }
        },
        None => None,
    };

    Ok(JointData { name, kind, parent, child, origin, axis, limits })
}

fn read_origin(element: dom::Element) -> Result<Isometry3<f64>, SceneError> {
    let xyz = match element.attribute_value("xyz") {
        Some(xyz) => parse_values(xyz, 3)?,
        None => vec![0.0; 3],
    };
    let rpy = match element.attribute_value("rpy") {
        Some(rpy) => parse_angles(rpy)?,
        None => vec![0.0; 3],
    };
    Ok(Isometry3::from_parts(
        Translation3::new(xyz[0], xyz[1], xyz[2]),
        UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
    ))
}

fn parse_number(value: &str) -> Result<f64, SceneError> {
    value.trim().parse()
        .map_err(|_| SceneError::ParseError(format!("not a number: {}", value)))
}

fn parse_values(value: &str, expected: usize) -> Result<Vec<f64>, SceneError> {
    let values: Vec<f64> = value.split_whitespace()
        .map(parse_number)
        .collect::<Result<_, _>>()?;
    if values.len() != expected {
        return Err(SceneError::InvalidLength { expected, found: values.len() });
    }
    Ok(values)
}

fn parse_angles(value: &str) -> Result<Vec<f64>, SceneError> {
    let values: Vec<f64> = value.split_whitespace()
        .map(parse_angle)
        .collect::<Result<_, _>>()?;
    if values.len() != 3 {
        return Err(SceneError::InvalidLength { expected: 3, found: values.len() });
    }
    Ok(values)
}

fn positive(values: &[f64], what: &str) -> Result<(), SceneError> {
    if values.iter().all(|v| v.is_finite() && *v > 0.0) {
        Ok(())
    } else {
        Err(SceneError::ParseError(format!("{} must be positive: {:?}", what, values)))
    }
}

// Matches the ${radians(<number>)} format that is common in xacro
static RADIANS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\{radians\((-?\d+(\.\d+)?)\)\}$").expect("valid regex")
});

fn parse_angle(attr_value: &str) -> Result<f64, SceneError> {
    if let Some(caps) = RADIANS.captures(attr_value) {
        let degrees_str = caps.get(1)
            .ok_or_else(|| SceneError::WrongAngle(format!("Bad representation: {}", attr_value)))?
            .as_str();
        let degrees: f64 = degrees_str.parse()
            .map_err(|_| SceneError::WrongAngle(attr_value.to_string()))?;
        Ok(degrees.to_radians())
    } else {
        // Plain number, in radians
        attr_value.parse()
            .map_err(|_| SceneError::WrongAngle(attr_value.to_string()))
    }
}

fn get_limits(element: dom::Element) -> Result<(f64, f64), SceneError> {
    let lower_attr = element.attribute_value("lower")
        .ok_or_else(|| SceneError::MissingField("lower limit not found".into()))?;
    let lower_limit = parse_angle(lower_attr)?;

    let upper_attr = element.attribute_value("upper")
        .ok_or_else(|| SceneError::MissingField("upper limit not found".into()))?;
    let upper_limit = parse_angle(upper_attr)?;

    Ok((lower_limit, upper_limit))
}
