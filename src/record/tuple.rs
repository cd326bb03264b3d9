use super::value::{Field, FieldType};

/// An ordered sequence of field values; in-memory only, serialized through
/// a [`TupleDesc`](super::TupleDesc)
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    fields: Vec<Field>,
}

impl Tuple {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Number of fields
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Field at position `i`.
    ///
    /// Panics when `i` is out of range; positions come from a schema the
    /// tuple has already been checked against.
    pub fn field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_type(&self, i: usize) -> FieldType {
        self.fields[i].field_type()
    }
}
