//! Wire encoding for data arrays and mesh geometry (`spec.md` §6).
//!
//! Everything that crosses an inter-participant [`crate::m2n::M2N`] link is
//! encoded as little-endian, native-double bytes rather than through a
//! generic serialization crate: the wire format is part of this runtime's
//! contract, not an implementation detail delegated to `serde`.

use crate::message::util;
use crate::mesh::Mesh;
use std::io::Cursor;

/// An object that can encode a particular type to, and decode it from, a
/// `Vec<u8>`. The implementation can be based on a `serde` data format, or
/// anything else.
pub trait Coder {
    type Type;

    /// Consume an instance of the encodable type and convert it to bytes.
    fn encode(&self, inst: &Self::Type) -> Vec<u8>;

    /// Consume a buffer of bytes and decode it to the decodable type.
    fn decode(&self, data: &[u8]) -> Self::Type;
}

/// Encodes a dense `(length, f64 buffer)` data array, as used for
/// [`crate::coupling_data::CouplingData`] send/receive buffers.
#[derive(Default)]
pub struct DataArrayCoder;

impl Coder for DataArrayCoder {
    type Type = Vec<f64>;

    fn encode(&self, inst: &Self::Type) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + inst.len() * 8);
        bytes.extend_from_slice(&inst.len().to_le_bytes());
        for value in inst {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    fn decode(&self, data: &[u8]) -> Self::Type {
        let mut cursor = Cursor::new(data);
        let len = util::read_usize(&mut cursor);
        (0..len).map(|_| f64::from_le_bytes(util::read_bytes_array(&mut cursor))).collect()
    }
}

/// Encodes mesh geometry per `spec.md` §6: vertex count, coordinate buffer,
/// edge count and index pairs, triangle count and index triples, quad count
/// and index quads, then one owner-rank per vertex.
pub struct MeshGeometryCoder {
    dimensions: usize,
}

impl Coder for MeshGeometryCoder {
    type Type = Mesh;

    fn encode(&self, inst: &Self::Type) -> Vec<u8> {
        let mut bytes = Vec::new();
        let dim = inst.dimensions();

        bytes.extend_from_slice(&inst.vertex_count().to_le_bytes());
        for vertex in inst.vertices() {
            for component in 0..dim {
                bytes.extend_from_slice(&vertex.position[component].to_le_bytes());
            }
        }

        bytes.extend_from_slice(&inst.edges().len().to_le_bytes());
        for edge in inst.edges() {
            bytes.extend_from_slice(&edge.0.to_le_bytes());
            bytes.extend_from_slice(&edge.1.to_le_bytes());
        }

        bytes.extend_from_slice(&inst.triangles().len().to_le_bytes());
        for triangle in inst.triangles() {
            for edge_id in triangle.edges() {
                bytes.extend_from_slice(&edge_id.to_le_bytes());
            }
        }

        bytes.extend_from_slice(&inst.quads().len().to_le_bytes());
        for quad in inst.quads() {
            for edge_id in quad.edges() {
                bytes.extend_from_slice(&edge_id.to_le_bytes());
            }
        }

        for vertex in inst.vertices() {
            bytes.extend_from_slice(&vertex.owner.to_le_bytes());
        }
        bytes
    }

    fn decode(&self, data: &[u8]) -> Self::Type {
        let mut cursor = Cursor::new(data);
        let dim = self.dimensions;
        let vertex_count = util::read_usize(&mut cursor);
        let mut positions = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            let mut position = [0.0; 3];
            for component in position.iter_mut().take(dim) {
                *component = f64::from_le_bytes(util::read_bytes_array(&mut cursor));
            }
            positions.push(position);
        }

        let edge_count = util::read_usize(&mut cursor);
        let edges: Vec<(usize, usize)> = (0..edge_count)
            .map(|_| {
                let a = util::read_usize(&mut cursor);
                let b = util::read_usize(&mut cursor);
                (a, b)
            })
            .collect();

        let tri_count = util::read_usize(&mut cursor);
        let triangles: Vec<[usize; 3]> = (0..tri_count)
            .map(|_| {
                [
                    util::read_usize(&mut cursor),
                    util::read_usize(&mut cursor),
                    util::read_usize(&mut cursor),
                ]
            })
            .collect();

        let quad_count = util::read_usize(&mut cursor);
        let quads: Vec<[usize; 4]> = (0..quad_count)
            .map(|_| {
                [
                    util::read_usize(&mut cursor),
                    util::read_usize(&mut cursor),
                    util::read_usize(&mut cursor),
                    util::read_usize(&mut cursor),
                ]
            })
            .collect();

        let owners: Vec<usize> = (0..vertex_count).map(|_| util::read_usize(&mut cursor)).collect();

        let mut mesh = Mesh::new(dim);
        for (position, owner) in positions.into_iter().zip(owners) {
            mesh.add_vertex_with_owner(position, owner);
        }
        // Edges were encoded in the sender's creation order, so re-creating
        // them in the same order via `create_unique_edge` reproduces
        // identical edge IDs, which is what lets the triangle/quad edge-ID
        // triples/quads below be replayed verbatim.
        for (a, b) in &edges {
            mesh.create_unique_edge(*a, *b);
        }
        for triangle in triangles {
            mesh.add_triangle_from_edges(triangle);
        }
        for quad in quads {
            mesh.add_quad_from_edges(quad);
        }
        mesh
    }
}

impl MeshGeometryCoder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_array_round_trips() {
        let coder = DataArrayCoder;
        let values = vec![1.0, 2.5, -3.0, 0.0];
        let bytes = coder.encode(&values);
        assert_eq!(coder.decode(&bytes), values);
    }

    #[test]
    fn mesh_geometry_round_trips() {
        let mut mesh = Mesh::new(2);
        let a = mesh.add_vertex_with_owner([0.0, 0.0, 0.0], 0);
        let b = mesh.add_vertex_with_owner([1.0, 0.0, 0.0], 1);
        let c = mesh.add_vertex_with_owner([0.0, 1.0, 0.0], 1);
        mesh.add_triangle(a, b, c);

        let coder = MeshGeometryCoder::new(2);
        let bytes = coder.encode(&mesh);
        let decoded = coder.decode(&bytes);

        assert_eq!(decoded.vertex_count(), 3);
        assert_eq!(decoded.edges().len(), 3);
        assert_eq!(decoded.triangles().len(), 1);
        assert_eq!(decoded.vertex(1).unwrap().owner, 1);
        assert_eq!(&decoded.vertex(0).unwrap().position[..2], &[0.0, 0.0]);
    }
}
