//! Vertices, edges, triangles, quads, and per-vertex data arrays (`spec.md` §3).
//!
//! IDs are dense and assigned in creation order within one [`Mesh`]; a
//! (mesh-ID, vertex-index) pair is globally addressable once the mesh is
//! registered with a [`crate::id::IdTable`]. `spec.md` §3's invariants are
//! enforced here: IDs never change once assigned, and `Data::values` is kept
//! sized to `vertex_count * dimensionality` by [`Data::allocate`].

use std::collections::HashMap;

pub type VertexId = usize;
pub type EdgeId = usize;
pub type TriangleId = usize;
pub type QuadId = usize;

/// A point in ℝ² or ℝ³ plus the rank of the participant process that owns
/// it, as assigned by a [`crate::partition::Partition`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub id: VertexId,
    pub position: [f64; 3],
    pub owner: usize,
}

impl Vertex {
    pub fn coords(&self, dimensions: usize) -> &[f64] {
        &self.position[..dimensions]
    }
}

/// An unordered pair of vertex IDs. Equality (and therefore uniqueness in
/// [`Mesh::create_unique_edge`]) ignores endpoint order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge(pub VertexId, pub VertexId);

impl Edge {
    fn normalized(a: VertexId, b: VertexId) -> (VertexId, VertexId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

/// Three edges, forming a closed triangle. Stored by edge ID (not vertex
/// ID) so that `Mesh::create_unique_edge` can deduplicate shared edges
/// between adjacent polygons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    edges: [EdgeId; 3],
}

impl Triangle {
    pub fn edges(&self) -> [EdgeId; 3] {
        self.edges
    }
}

/// Four edges, forming a closed quadrilateral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    edges: [EdgeId; 4],
}

impl Quad {
    pub fn edges(&self) -> [EdgeId; 4] {
        self.edges
    }
}

/// Dimensionality of a per-vertex quantity: `Scalar` values occupy one
/// `f64` per vertex, `Vector` values occupy `space_dimensions` per vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Scalar,
    Vector,
}

impl DataKind {
    pub fn width(self, space_dimensions: usize) -> usize {
        match self {
            DataKind::Scalar => 1,
            DataKind::Vector => space_dimensions,
        }
    }
}

/// A named, dense per-vertex array belonging to a [`Mesh`].
///
/// `values.len() == vertex_count * width` is maintained by
/// [`Data::allocate`]; callers must re-allocate after adding vertices.
#[derive(Debug, Clone)]
pub struct Data {
    pub name: String,
    pub kind: DataKind,
    values: Vec<f64>,
    width: usize,
}

impl Data {
    pub fn new(name: impl Into<String>, kind: DataKind, space_dimensions: usize) -> Self {
        Self { name: name.into(), kind, values: Vec::new(), width: kind.width(space_dimensions) }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Resizes the values buffer to `vertex_count * width`, preserving
    /// existing entries and zero-filling new ones.
    pub fn allocate(&mut self, vertex_count: usize) {
        self.values.resize(vertex_count * self.width, 0.0);
    }

    pub fn zero_all(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// An ordered collection of vertices, edges, triangles, and quads, plus a
/// set of named [`Data`] arrays. `spec.md` §3: before `initialize()` a mesh
/// is writable; the write gate itself lives in [`crate::session::SessionFacade`],
/// not here, since locking is a session-scoped concept shared across meshes.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    dimensions: usize,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    edge_lookup: HashMap<(VertexId, VertexId), EdgeId>,
    triangles: Vec<Triangle>,
    quads: Vec<Quad>,
    data: HashMap<String, Data>,
}

impl Mesh {
    pub fn new(dimensions: usize) -> Self {
        Self::named("", dimensions)
    }

    pub fn named(name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            name: name.into(),
            dimensions,
            vertices: Vec::new(),
            edges: Vec::new(),
            edge_lookup: HashMap::new(),
            triangles: Vec::new(),
            quads: Vec::new(),
            data: HashMap::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn quads(&self) -> &[Quad] {
        &self.quads
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id)
    }

    /// Appends a vertex owned by the local/default rank (0); returns its
    /// dense ID, which is always `old_vertex_count`.
    pub fn add_vertex(&mut self, position: [f64; 3]) -> VertexId {
        self.add_vertex_with_owner(position, 0)
    }

    pub fn add_vertex_with_owner(&mut self, position: [f64; 3], owner: usize) -> VertexId {
        let id = self.vertices.len();
        self.vertices.push(Vertex { id, position, owner });
        for data in self.data.values_mut() {
            data.allocate(self.vertices.len());
        }
        id
    }

    /// Returns the edge ID connecting `a` and `b`, creating it if it does
    /// not already exist. Guarantees polygon construction never duplicates
    /// edges shared between adjacent triangles/quads.
    pub fn create_unique_edge(&mut self, a: VertexId, b: VertexId) -> EdgeId {
        let key = Edge::normalized(a, b);
        if let Some(&id) = self.edge_lookup.get(&key) {
            return id;
        }
        let id = self.edges.len();
        self.edges.push(Edge(a, b));
        self.edge_lookup.insert(key, id);
        id
    }

    pub fn add_triangle(&mut self, a: VertexId, b: VertexId, c: VertexId) -> TriangleId {
        let edges = [
            self.create_unique_edge(a, b),
            self.create_unique_edge(b, c),
            self.create_unique_edge(c, a),
        ];
        let id = self.triangles.len();
        self.triangles.push(Triangle { edges });
        id
    }

    pub fn add_triangle_from_edges(&mut self, edges: [EdgeId; 3]) -> TriangleId {
        let id = self.triangles.len();
        self.triangles.push(Triangle { edges });
        id
    }

    pub fn add_quad(&mut self, a: VertexId, b: VertexId, c: VertexId, d: VertexId) -> QuadId {
        let edges = [
            self.create_unique_edge(a, b),
            self.create_unique_edge(b, c),
            self.create_unique_edge(c, d),
            self.create_unique_edge(d, a),
        ];
        let id = self.quads.len();
        self.quads.push(Quad { edges });
        id
    }

    pub fn add_quad_from_edges(&mut self, edges: [EdgeId; 4]) -> QuadId {
        let id = self.quads.len();
        self.quads.push(Quad { edges });
        id
    }

    pub fn add_data(&mut self, name: impl Into<String>, kind: DataKind) {
        let mut data = Data::new(name, kind, self.dimensions);
        data.allocate(self.vertices.len());
        self.data.insert(data.name.clone(), data);
    }

    pub fn data(&self, name: &str) -> Option<&Data> {
        self.data.get(name)
    }

    pub fn data_mut(&mut self, name: &str) -> Option<&mut Data> {
        self.data.get_mut(name)
    }

    pub fn has_data(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_ids_are_dense_and_stable() {
        let mut mesh = Mesh::new(2);
        let ids: Vec<_> = (0..5).map(|i| mesh.add_vertex([i as f64, 0.0, 0.0])).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(mesh.vertex(*id).unwrap().position[0], i as f64);
        }
    }

    #[test]
    fn create_unique_edge_deduplicates_shared_edges() {
        let mut mesh = Mesh::new(2);
        let a = mesh.add_vertex([0.0, 0.0, 0.0]);
        let b = mesh.add_vertex([1.0, 0.0, 0.0]);
        let c = mesh.add_vertex([0.0, 1.0, 0.0]);
        let d = mesh.add_vertex([1.0, 1.0, 0.0]);

        mesh.add_triangle(a, b, c);
        mesh.add_triangle(b, d, c);
        // The a-b-c and b-d-c triangles share edge (b, c); it must appear
        // only once in the mesh's edge list regardless of endpoint order.
        assert_eq!(mesh.edges().len(), 5);
    }

    #[test]
    fn data_values_track_vertex_count() {
        let mut mesh = Mesh::new(2);
        mesh.add_data("temperature", DataKind::Scalar);
        mesh.add_vertex([0.0, 0.0, 0.0]);
        mesh.add_vertex([1.0, 0.0, 0.0]);
        assert_eq!(mesh.data("temperature").unwrap().values().len(), 2);

        mesh.add_data("velocity", DataKind::Vector);
        assert_eq!(mesh.data("velocity").unwrap().values().len(), 4);
    }
}
