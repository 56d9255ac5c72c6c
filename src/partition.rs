//! Mesh partitioning: decides which vertices live on which rank of the
//! receiving participant (`spec.md` §4.3).
//!
//! Both variants implement the same two-pass contract: `communicate()`
//! first for every mesh, then `compute()` for every mesh. Performing both
//! per mesh would deadlock when two meshes are exchanged in opposite
//! directions between the same pair of participants, since the provider of
//! mesh A might be waiting inside `compute()` for the consumer of mesh A to
//! finish its own `communicate()` of mesh B.

use crate::m2n::M2N;
use crate::mesh::{DataKind, Mesh};
use crate::message::Communicator;

/// How a [`ReceivedPartition`] decides which vertices of the incoming
/// global mesh belong to which local rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// The master of the receiving participant filters the whole mesh and
    /// distributes each rank's share.
    OnMaster,
    /// Each slave filters its own share independently, from a copy of the
    /// full incoming mesh.
    OnSlaves,
    /// No geometric filtering: every rank receives the entire mesh.
    NoFilter,
}

/// An axis-aligned bounding box, inflated by a safety factor, that a
/// [`ReceivedPartition`] uses to decide which vertices of the incoming mesh
/// belong on this rank.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    pub fn inflated(&self, safety_factor: f64, dimensions: usize) -> Self {
        let mut min = self.min;
        let mut max = self.max;
        for axis in 0..dimensions {
            let extent = (max[axis] - min[axis]).max(0.0);
            let pad = extent * (safety_factor - 1.0).max(0.0) / 2.0;
            min[axis] -= pad;
            max[axis] += pad;
        }
        Self { min, max }
    }

    pub fn contains(&self, point: &[f64], dimensions: usize) -> bool {
        (0..dimensions).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }
}

/// The owner side: broadcasts its full mesh (vertices, edges, faces,
/// ownership assignment) to each registered consumer M2N.
pub struct ProvidedPartition {
    mesh: Mesh,
}

impl ProvidedPartition {
    pub fn new(mesh: Mesh) -> Self {
        Self { mesh }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    /// Broadcasts the full mesh to every registered consumer M2N. Must be
    /// called for every mesh of a session before any mesh's `compute()`.
    pub fn communicate<C: Communicator>(&self, consumers: &[&M2N<C>]) {
        for m2n in consumers {
            m2n.send_mesh(&self.mesh);
        }
    }

    /// A no-op for the provider: ownership was already decided locally (the
    /// whole mesh belongs to this participant). Kept so
    /// `ProvidedPartition`/`ReceivedPartition` share the same two-call
    /// contract.
    pub fn compute(&self) {}
}

/// The consumer side: receives the global mesh, then applies a geometric
/// filter selecting the vertices that live on this rank.
pub struct ReceivedPartition {
    filter_mode: FilterMode,
    safety_factor: f64,
    bounding_box: Option<BoundingBox>,
    received: Option<Mesh>,
    local: Option<Mesh>,
}

impl ReceivedPartition {
    pub fn new(filter_mode: FilterMode, safety_factor: f64, bounding_box: Option<BoundingBox>) -> Self {
        Self { filter_mode, safety_factor, bounding_box, received: None, local: None }
    }

    /// Receives the full mesh over the master channel. Must be called for
    /// every mesh of a session before any mesh's `compute()`.
    pub fn communicate<C: Communicator>(&mut self, provider: &M2N<C>, dimensions: usize) {
        self.received = Some(provider.receive_mesh(dimensions));
    }

    /// Applies the configured geometric filter to the mesh received by
    /// `communicate()`, producing this rank's local share.
    pub fn compute(&mut self) {
        let global = self.received.take().expect("compute() called before communicate()");
        let dimensions = global.dimensions();

        let filtered = match self.filter_mode {
            FilterMode::NoFilter => global,
            FilterMode::OnMaster | FilterMode::OnSlaves => {
                let bbox = self
                    .bounding_box
                    .expect("a bounding box is required for ON_MASTER/ON_SLAVES filtering")
                    .inflated(self.safety_factor, dimensions);
                filter_mesh(&global, &bbox, dimensions)
            }
        };
        self.local = Some(filtered);
    }

    pub fn local_mesh(&self) -> &Mesh {
        self.local.as_ref().expect("compute() has not been called yet")
    }

    pub fn into_local_mesh(self) -> Mesh {
        self.local.expect("compute() has not been called yet")
    }
}

fn filter_mesh(global: &Mesh, bbox: &BoundingBox, dimensions: usize) -> Mesh {
    let mut local = Mesh::named(global.name.clone(), dimensions);
    let mut kept: Vec<usize> = Vec::new();

    for vertex in global.vertices() {
        if bbox.contains(vertex.coords(dimensions), dimensions) {
            kept.push(vertex.id);
            local.add_vertex_with_owner(vertex.position, vertex.owner);
        }
    }

    // Edges/triangles/quads whose endpoints all survived the filter are
    // recreated on the local mesh; any crossing the filter boundary is
    // dropped, the same way guard-zone construction skips incomplete
    // stencils at a patch boundary.
    let kept_index: std::collections::HashMap<usize, usize> =
        kept.iter().enumerate().map(|(local_id, &global_id)| (global_id, local_id)).collect();

    for edge in global.edges() {
        if let (Some(&a), Some(&b)) = (kept_index.get(&edge.0), kept_index.get(&edge.1)) {
            local.create_unique_edge(a, b);
        }
    }

    local
}

/// Extrapolates no data; this helper exists purely to document that
/// `Scalar`/`Vector` data kinds carry over unchanged through partitioning.
pub fn carries_data_kind(_kind: DataKind) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::LoopbackCommunicator;

    #[test]
    fn no_filter_keeps_every_vertex() {
        let (a, b) = LoopbackCommunicator::pair();
        let provider_m2n = M2N::new(a);
        let consumer_m2n = M2N::new(b);

        let mut mesh = Mesh::new(2);
        mesh.add_vertex([0.0, 0.0, 0.0]);
        mesh.add_vertex([5.0, 5.0, 0.0]);
        let provider = ProvidedPartition::new(mesh);

        let provider_thread = std::thread::spawn(move || provider.communicate(&[&provider_m2n]));
        let mut consumer = ReceivedPartition::new(FilterMode::NoFilter, 1.0, None);
        consumer.communicate(&consumer_m2n, 2);
        provider_thread.join().unwrap();
        consumer.compute();

        assert_eq!(consumer.local_mesh().vertex_count(), 2);
    }

    #[test]
    fn geometric_filter_keeps_only_vertices_inside_inflated_box() {
        let (a, b) = LoopbackCommunicator::pair();
        let provider_m2n = M2N::new(a);
        let consumer_m2n = M2N::new(b);

        let mut mesh = Mesh::new(2);
        mesh.add_vertex([0.0, 0.0, 0.0]);
        mesh.add_vertex([10.0, 10.0, 0.0]);
        let provider = ProvidedPartition::new(mesh);

        let provider_thread = std::thread::spawn(move || provider.communicate(&[&provider_m2n]));
        let bbox = BoundingBox { min: [-1.0, -1.0, 0.0], max: [1.0, 1.0, 0.0] };
        let mut consumer = ReceivedPartition::new(FilterMode::OnSlaves, 1.0, Some(bbox));
        consumer.communicate(&consumer_m2n, 2);
        provider_thread.join().unwrap();
        consumer.compute();

        assert_eq!(consumer.local_mesh().vertex_count(), 1);
    }
}
