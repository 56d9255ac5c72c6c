//! Interpolation operators between two meshes' data arrays (`spec.md` §2, §4.4).
//!
//! Geometric interpolation kernels (nearest-neighbor, RBF, projection) are
//! out of this crate's scope; [`Mapping`] is the interface the dispatcher
//! invokes, and any concrete interpolation lives behind it. [`MappingDispatcher`]
//! is the scope's actual subject: sequencing `computeMapping`/`map`/`clear`
//! calls at the correct points in the time loop.

use crate::mesh::Mesh;

/// When a mapping is (re)computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingTiming {
    /// Computed once at `initialize`, never cleared. Appropriate for rigid
    /// interfaces whose geometry never changes.
    Initial,
    /// Recomputed every time window, and cleared at the end of it to
    /// release internal caches.
    OnAdvance,
}

/// An opaque interpolation operator from one mesh's data array to
/// another's. Concrete implementations (nearest-neighbor, RBF, projection)
/// are external collaborators; this crate only calls the methods below, in
/// the order `spec.md` §4.4 prescribes.
pub trait Mapping {
    fn compute_mapping(&mut self, from: &Mesh, to: &Mesh);
    fn has_computed_mapping(&self) -> bool;
    fn map(&mut self, from: &Mesh, from_data: &str, to: &mut Mesh, to_data: &str);
    fn clear(&mut self);
}

/// One configured use of a [`Mapping`]: which named data array flows from
/// which mesh to which, and when the mapping backing it should be
/// (re)computed.
pub struct MappingContext {
    pub mapping: Box<dyn Mapping>,
    pub timing: MappingTiming,
    pub from_data: String,
    pub to_data: String,
    has_mapped_data: bool,
}

impl MappingContext {
    pub fn new(
        mapping: Box<dyn Mapping>,
        timing: MappingTiming,
        from_data: impl Into<String>,
        to_data: impl Into<String>,
    ) -> Self {
        Self {
            mapping,
            timing,
            from_data: from_data.into(),
            to_data: to_data.into(),
            has_mapped_data: false,
        }
    }
}

/// Sequences `computeMapping`/`map`/`clear` calls across a set of mapping
/// contexts exchanged between one `from`/`to` mesh pair, implementing the
/// pseudocode of `spec.md` §4.4:
///
/// ```text
/// for each mapping context:
///     if not computed: computeMapping()
/// for each mapping context not yet mapped this window:
///     zero target buffer
///     map(fromData, toData)
///     mark hasMappedData
/// if this call ends a window:
///     for each mapping context with timing == ON_ADVANCE:
///         clear(); hasMappedData := false
/// ```
///
/// One dispatcher handles one direction (write, before exchange; read,
/// after); a [`crate::coupling_data::CouplingData`] owner holds a write
/// dispatcher and a read dispatcher side by side.
pub struct MappingDispatcher {
    contexts: Vec<MappingContext>,
}

impl MappingDispatcher {
    pub fn new() -> Self {
        Self { contexts: Vec::new() }
    }

    pub fn add(&mut self, context: MappingContext) {
        self.contexts.push(context)
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Computes any not-yet-computed mappings, then maps every context
    /// that hasn't mapped data yet this window. Call once per exchange,
    /// for both the write side (before data leaves this participant) and
    /// the read side (after it arrives).
    pub fn dispatch(&mut self, from: &Mesh, to: &mut Mesh) {
        for context in &mut self.contexts {
            if !context.mapping.has_computed_mapping() {
                context.mapping.compute_mapping(from, to);
            }
        }

        for context in &mut self.contexts {
            if context.has_mapped_data {
                continue;
            }
            if let Some(data) = to.data_mut(&context.to_data) {
                data.zero_all();
            }
            context.mapping.map(from, &context.from_data, to, &context.to_data);
            context.has_mapped_data = true;
        }
    }

    /// Clears every `ON_ADVANCE`-timed mapping and resets its
    /// `hasMappedData` flag; `INITIAL`-timed mappings are left alone so
    /// their cached operator and mapped buffer persist across windows.
    /// Called once at the end of `advance` (`spec.md` §4.1 step 9, resolved
    /// per the written-data reset decision).
    pub fn end_window(&mut self) {
        for context in &mut self.contexts {
            if context.timing == MappingTiming::OnAdvance {
                context.mapping.clear();
                context.has_mapped_data = false;
            }
        }
    }
}

impl Default for MappingDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::DataKind;

    struct NearestVertexMapping {
        computed: bool,
    }

    impl NearestVertexMapping {
        fn new() -> Self {
            Self { computed: false }
        }
    }

    impl Mapping for NearestVertexMapping {
        fn compute_mapping(&mut self, _from: &Mesh, _to: &Mesh) {
            self.computed = true;
        }

        fn has_computed_mapping(&self) -> bool {
            self.computed
        }

        fn map(&mut self, from: &Mesh, from_data: &str, to: &mut Mesh, to_data: &str) {
            let source = from.data(from_data).unwrap().values().to_vec();
            let target = to.data_mut(to_data).unwrap();
            for (slot, value) in target.values_mut().iter_mut().zip(source.iter().cycle()) {
                *slot = *value;
            }
        }

        fn clear(&mut self) {
            self.computed = false;
        }
    }

    fn two_vertex_mesh(value: f64) -> Mesh {
        let mut mesh = Mesh::new(2);
        mesh.add_data("x", DataKind::Scalar);
        mesh.add_vertex([0.0, 0.0, 0.0]);
        mesh.add_vertex([1.0, 0.0, 0.0]);
        mesh.data_mut("x").unwrap().values_mut().iter_mut().for_each(|v| *v = value);
        mesh
    }

    #[test]
    fn dispatch_computes_once_and_maps_every_context() {
        let from = two_vertex_mesh(3.0);
        let mut to = two_vertex_mesh(0.0);

        let mut dispatcher = MappingDispatcher::new();
        dispatcher.add(MappingContext::new(
            Box::new(NearestVertexMapping::new()),
            MappingTiming::OnAdvance,
            "x",
            "x",
        ));

        dispatcher.dispatch(&from, &mut to);
        assert_eq!(to.data("x").unwrap().values(), &[3.0, 3.0]);

        // A second dispatch within the same window does not re-map (the
        // context already has mapped data), so overwriting `to`'s buffer by
        // hand here should survive.
        to.data_mut("x").unwrap().values_mut()[0] = 9.0;
        dispatcher.dispatch(&from, &mut to);
        assert_eq!(to.data("x").unwrap().values()[0], 9.0);
    }

    #[test]
    fn end_window_clears_on_advance_but_not_initial_mappings() {
        let from = two_vertex_mesh(1.0);
        let mut to = two_vertex_mesh(0.0);

        let mut dispatcher = MappingDispatcher::new();
        dispatcher.add(MappingContext::new(
            Box::new(NearestVertexMapping::new()),
            MappingTiming::Initial,
            "x",
            "x",
        ));
        dispatcher.dispatch(&from, &mut to);
        dispatcher.end_window();

        // Initial-timed contexts stay computed across the window boundary.
        assert!(dispatcher.contexts[0].mapping.has_computed_mapping());
    }
}
