//! Frozen cross-unit lookup tables. These are computed by upstream analyses
//! before any unit's lowering begins and are only ever read by the
//! middle-end, which keeps per-file lowering trivially parallelizable.

use hashbrown::HashMap;

use crate::frontend::intern::Symbol;

/// The recorded parameter/result shape of a function, keyed by its
/// fully-qualified name in [`SignatureTable`].
#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub params: Vec<Symbol>,
    pub param_names: Vec<Symbol>,
    pub results: Vec<Symbol>,
}

#[derive(Debug, Default)]
pub struct SignatureTable {
    entries: HashMap<Symbol, Signature>,
}

impl SignatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: Symbol, signature: Signature) {
        self.entries.insert(name, signature);
    }

    /// An unknown callee is an explicit `None`, never a default signature.
    pub fn get(&self, name: Symbol) -> Option<&Signature> {
        self.entries.get(&name)
    }
}

/// Structural field index: aggregate type name -> field name -> field type.
/// Used to resolve selector expressions into typed field projections.
#[derive(Debug, Default)]
pub struct TypeIndex {
    fields: HashMap<Symbol, HashMap<Symbol, Symbol>>,
}

impl TypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_field(&mut self, ty: Symbol, field: Symbol, field_ty: Symbol) {
        self.fields.entry(ty).or_default().insert(field, field_ty);
    }

    pub fn field_type(&self, ty: Symbol, field: Symbol) -> Option<Symbol> {
        self.fields.get(&ty)?.get(&field).copied()
    }
}

/// Membership in statically-detected mutual-recursion groups. Two functions
/// belong to the same group iff they can reach each other through calls.
/// A function that only calls itself is its own group.
#[derive(Debug, Default)]
pub struct RecursionSets {
    groups: HashMap<Symbol, u32>,
}

impl RecursionSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, function: Symbol, group: u32) {
        self.groups.insert(function, group);
    }

    pub fn insert_group(&mut self, members: &[Symbol], group: u32) {
        for member in members {
            self.groups.insert(*member, group);
        }
    }

    /// Whether `caller` and `callee` are members of the same recursion group.
    pub fn same_group(&self, caller: Symbol, callee: Symbol) -> bool {
        match (self.groups.get(&caller), self.groups.get(&callee)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}
