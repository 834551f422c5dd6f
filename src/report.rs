//! Formats collision reports for the log.

use tracing::{debug, info};

use crate::collisions::{CollisionReport, Contact};
use crate::config::Verbosity;

/// Lines describing the report at the given verbosity. Empty if there is no collision.
/// `Quiet` and `Summary` both produce the summary line, `Contacts` adds one line
/// per contact.
pub fn report_lines(report: &CollisionReport, verbosity: Verbosity) -> Vec<String> {
    if !report.in_collision() {
        return Vec::new();
    }
    let pairs = report.colliding_pairs.iter()
        .map(|(a, b)| format!("{}-{}", a, b))
        .collect::<Vec<_>>()
        .join(", ");
    let mut lines = vec![format!("Self-collision: {} ({})", report.summary(), pairs)];
    if verbosity == Verbosity::Contacts {
        lines.extend(report.contacts.iter().map(contact_line));
    }
    lines
}

/// Position and normal triples of a contact.
pub fn contact_line(contact: &Contact) -> String {
    let p = &contact.position;
    let n = &contact.normal;
    format!(
        "contact {}-{} pos = [{:.4}, {:.4}, {:.4}] norm = [{:.4}, {:.4}, {:.4}] depth = {:.4}",
        contact.link_a, contact.link_b, p.x, p.y, p.z, n.x, n.y, n.z, contact.depth
    )
}

/// Sends the report lines to the log. Quiet mode only logs at debug level.
pub fn log_report(report: &CollisionReport, verbosity: Verbosity) {
    for line in report_lines(report, verbosity) {
        match verbosity {
            Verbosity::Quiet => debug!("{}", line),
            Verbosity::Summary | Verbosity::Contacts => info!("{}", line),
        }
    }
}
