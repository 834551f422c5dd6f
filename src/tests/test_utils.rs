use crate::collisions::{CollisionQuery, CollisionReport, Contact};
use crate::collisions_traits::SelfCollisionDetector;
use crate::config::LoopConfig;
use nalgebra::{Point3, Vector3};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Robot without geometry. It reports one contact between "a" and "b" whenever
/// the first joint exceeds `1.0`.
pub struct StubRobot {
    pub dof: usize,
}

impl SelfCollisionDetector for StubRobot {
    fn name(&self) -> &str {
        "stub"
    }

    fn dof(&self) -> usize {
        self.dof
    }

    fn self_collision(&self, joints: &[f64], query: CollisionQuery) -> CollisionReport {
        let mut report = CollisionReport::default();
        if joints.first().is_some_and(|&j| j > 1.0) {
            report.colliding_pairs.push(("a".into(), "b".into()));
            if query == CollisionQuery::Contacts {
                report.contacts.push(Contact {
                    position: Point3::origin(),
                    normal: Vector3::x(),
                    depth: 0.0,
                    link_a: "a".into(),
                    link_b: "b".into(),
                });
            }
        }
        report
    }
}

/// Robot that always collides, with `contacts` contacts between "l_hand" and "torso".
pub struct ContactingRobot {
    pub dof: usize,
    pub contacts: usize,
}

impl SelfCollisionDetector for ContactingRobot {
    fn name(&self) -> &str {
        "contacting"
    }

    fn dof(&self) -> usize {
        self.dof
    }

    fn self_collision(&self, _joints: &[f64], query: CollisionQuery) -> CollisionReport {
        let mut report = CollisionReport::default();
        report.colliding_pairs.push(("l_hand".into(), "torso".into()));
        if query == CollisionQuery::Contacts {
            report.contacts = (0..self.contacts).map(|i| Contact {
                position: Point3::new(i as f64, 0.0, 1.0),
                normal: Vector3::z(),
                depth: 0.002,
                link_a: "l_hand".into(),
                link_b: "torso".into(),
            }).collect();
        }
        report
    }
}

/// Log sink shared between a test and the subscriber it installs.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a plain text subscriber writing into the returned buffer.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .without_time()
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.contents())
}

/// Configuration with a short period so that tests do not wait long.
pub fn fast_config() -> LoopConfig {
    LoopConfig {
        period: Duration::from_millis(1),
        step: 0.001,
        ..LoopConfig::default()
    }
}
