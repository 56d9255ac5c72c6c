//! Session-scoped ID tables (`spec.md` §3, §4.2).
//!
//! A mesh-name → mesh-ID map and a (mesh-ID, data-name) → data-ID map, both
//! frozen once [`crate::session::SessionFacade::configure`] returns. Every
//! public entry point that takes a mesh or data ID validates it against
//! these tables before doing anything else.

use crate::error::{CouplingError, Result};
use std::collections::HashMap;

pub type MeshId = usize;
pub type DataId = usize;

#[derive(Debug, Default)]
pub struct IdTable {
    mesh_ids: HashMap<String, MeshId>,
    mesh_names: Vec<String>,
    data_ids: HashMap<(MeshId, String), DataId>,
    data_names: Vec<(MeshId, String)>,
}

impl IdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mesh name, assigning it the next dense mesh ID. Called
    /// only during `configure`, before the table is considered frozen.
    pub fn register_mesh(&mut self, name: &str) -> MeshId {
        if let Some(&id) = self.mesh_ids.get(name) {
            return id;
        }
        let id = self.mesh_names.len();
        self.mesh_names.push(name.to_string());
        self.mesh_ids.insert(name.to_string(), id);
        id
    }

    pub fn register_data(&mut self, mesh_id: MeshId, name: &str) -> DataId {
        let key = (mesh_id, name.to_string());
        if let Some(&id) = self.data_ids.get(&key) {
            return id;
        }
        let id = self.data_names.len();
        self.data_names.push(key.clone());
        self.data_ids.insert(key, id);
        id
    }

    pub fn has_mesh(&self, name: &str) -> bool {
        self.mesh_ids.contains_key(name)
    }

    pub fn mesh_id(&self, name: &str) -> Result<MeshId> {
        self.mesh_ids
            .get(name)
            .copied()
            .ok_or_else(|| CouplingError::Usage(format!("unknown mesh name \"{name}\"")))
    }

    pub fn mesh_name(&self, id: MeshId) -> Result<&str> {
        self.mesh_names
            .get(id)
            .map(|s| s.as_str())
            .ok_or_else(|| CouplingError::Usage(format!("invalid mesh ID {id}")))
    }

    pub fn mesh_ids(&self) -> impl Iterator<Item = MeshId> {
        0..self.mesh_names.len()
    }

    pub fn has_data(&self, mesh_id: MeshId, name: &str) -> bool {
        self.data_ids.contains_key(&(mesh_id, name.to_string()))
    }

    pub fn data_id(&self, mesh_id: MeshId, name: &str) -> Result<DataId> {
        self.data_ids
            .get(&(mesh_id, name.to_string()))
            .copied()
            .ok_or_else(|| {
                CouplingError::Usage(format!("unknown data name \"{name}\" on mesh {mesh_id}"))
            })
    }

    /// Validates that `id` names a known mesh; used by every public entry
    /// point before it touches mesh state.
    pub fn validate_mesh_id(&self, id: MeshId) -> Result<()> {
        if id < self.mesh_names.len() {
            Ok(())
        } else {
            Err(CouplingError::Usage(format!("invalid mesh ID {id}")))
        }
    }

    pub fn validate_data_id(&self, id: DataId) -> Result<()> {
        if id < self.data_names.len() {
            Ok(())
        } else {
            Err(CouplingError::Usage(format!("invalid data ID {id}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_ids_are_dense_and_stable() {
        let mut table = IdTable::new();
        assert_eq!(table.register_mesh("a"), 0);
        assert_eq!(table.register_mesh("b"), 1);
        assert_eq!(table.register_mesh("a"), 0);
        assert_eq!(table.mesh_id("b").unwrap(), 1);
    }

    #[test]
    fn invalid_mesh_id_is_a_usage_error() {
        let table = IdTable::new();
        assert!(matches!(table.validate_mesh_id(0), Err(CouplingError::Usage(_))));
    }

    #[test]
    fn data_ids_are_scoped_per_mesh() {
        let mut table = IdTable::new();
        let m0 = table.register_mesh("a");
        let m1 = table.register_mesh("b");
        let d0 = table.register_data(m0, "x");
        let d1 = table.register_data(m1, "x");
        assert_ne!(d0, d1);
    }
}
