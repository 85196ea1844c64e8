use slicefold_ir::{AnnotationHost, Function};

use crate::{Candidate, WeaverConfig};

/// Drops every candidate of a method carrying the opt-out marker.
pub fn prune(
    func: &Function,
    candidates: Vec<Candidate>,
    config: &WeaverConfig,
) -> Vec<Candidate> {
    if func.has_marker(&config.marker_namespace, &config.opt_out_marker) {
        tracing::debug!(method = %func.name, "opted out");
        return Vec::new();
    }
    candidates
}
