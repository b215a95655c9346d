// SPDX-License-Identifier: Apache-2.0

//! Struct/array layout description used by the PM extractor's "same field"
//! test (spec §4.5, §9 "PM field math"). The trace format itself carries no
//! type information, so callers supply a [`TypeOracle`] that maps a store's
//! address to the instance it belongs to and that instance's layout —
//! typically built from the target program's debug info or a hand-written
//! layout table, outside this crate's scope.

/// One field of a [`TypeLayout::Struct`], given as a byte offset and size
/// within the owning instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub offset: u64,
    pub size: u64,
    pub is_array: bool,
}

/// The layout of one instrumented type. Scalar/pointer types carry no field
/// breakdown; C6's `equivalent_in_type` falls back to stack-trace equality
/// for them (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeLayout {
    Scalar { size: u64 },
    Struct { name: String, size: u64, fields: Vec<FieldLayout> },
}

impl TypeLayout {
    pub fn size(&self) -> u64 {
        match self {
            TypeLayout::Scalar { size } => *size,
            TypeLayout::Struct { size, .. } => *size,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TypeLayout::Scalar { .. } => "<scalar>",
            TypeLayout::Struct { name, .. } => name,
        }
    }

    /// The field index containing `offset`, or `None` if `offset` falls in
    /// a zero-sized trailing gap (the struct-end sentinel, spec §9).
    pub fn field_at(&self, offset: u64) -> Option<usize> {
        match self {
            TypeLayout::Scalar { .. } => None,
            TypeLayout::Struct { fields, .. } => fields
                .iter()
                .position(|f| offset >= f.offset && offset < f.offset + f.size.max(1)),
        }
    }

    pub fn field(&self, index: usize) -> Option<&FieldLayout> {
        match self {
            TypeLayout::Scalar { .. } => None,
            TypeLayout::Struct { fields, .. } => fields.get(index),
        }
    }
}

/// Maps a store's absolute address to the instance (base address) and
/// layout of the instrumented type it falls inside, if any.
pub trait TypeOracle {
    fn locate(&self, address: u64) -> Option<(u64, &TypeLayout)>;
}

/// A [`TypeOracle`] backed by a flat table of `(base_address, layout)`
/// pairs, sorted by base address. Good enough for the instance counts a
/// single trace produces; callers with many instances of one type can
/// still use one entry per instance.
#[derive(Debug, Default)]
pub struct MapTypeOracle {
    instances: Vec<(u64, TypeLayout)>,
}

impl MapTypeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, base_address: u64, layout: TypeLayout) {
        self.instances.push((base_address, layout));
        self.instances.sort_by_key(|(base, _)| *base);
    }
}

impl TypeOracle for MapTypeOracle {
    fn locate(&self, address: u64) -> Option<(u64, &TypeLayout)> {
        self.instances
            .iter()
            .filter(|(base, layout)| *base <= address && address < base + layout.size().max(1))
            .max_by_key(|(base, _)| *base)
            .map(|(base, layout)| (*base, layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_struct() -> TypeLayout {
        TypeLayout::Struct {
            name: "Node".into(),
            size: 24,
            fields: vec![
                FieldLayout { name: "next".into(), offset: 0, size: 8, is_array: false },
                FieldLayout { name: "value".into(), offset: 8, size: 8, is_array: false },
                FieldLayout { name: "tag".into(), offset: 16, size: 1, is_array: false },
            ],
        }
    }

    #[test]
    fn field_at_finds_owning_field() {
        let t = sample_struct();
        assert_eq!(t.field_at(0), Some(0));
        assert_eq!(t.field_at(9), Some(1));
        assert_eq!(t.field_at(16), Some(2));
    }

    #[test]
    fn field_at_past_last_field_is_sentinel_end() {
        let t = sample_struct();
        assert_eq!(t.field_at(20), None);
    }

    #[test]
    fn map_oracle_locates_instance_by_address_range() {
        let mut oracle = MapTypeOracle::new();
        oracle.register(0x1000, sample_struct());
        oracle.register(0x2000, TypeLayout::Scalar { size: 8 });
        let (base, layout) = oracle.locate(0x1008).unwrap();
        assert_eq!(base, 0x1000);
        assert_eq!(layout.name(), "Node");
        assert!(oracle.locate(0x1000 + 24).is_none());
    }
}
