use std::collections::HashMap;

use super::error::{RecordError, RecordResult};
use super::tuple::Tuple;
use super::value::{CHAR_SIZE, Field, FieldType};

/// Fixed-width record schema: an ordered sequence of (type, name) columns
/// with distinct names, a byte offset per column, and a fixed total record
/// length.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    types: Vec<FieldType>,
    names: Vec<String>,
    offsets: Vec<usize>,
    length: usize,
    name_to_index: HashMap<String, usize>,
}

impl TupleDesc {
    pub fn new<S: Into<String>>(types: Vec<FieldType>, names: Vec<S>) -> RecordResult<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if types.len() != names.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "{} types but {} names",
                types.len(),
                names.len()
            )));
        }

        let mut name_to_index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if name_to_index.insert(name.clone(), i).is_some() {
                return Err(RecordError::DuplicateFieldName(name.clone()));
            }
        }

        let mut offsets = Vec::with_capacity(types.len());
        let mut offset = 0;
        for ty in &types {
            offsets.push(offset);
            offset += ty.size();
        }

        Ok(Self {
            types,
            names,
            offsets,
            length: offset,
            name_to_index,
        })
    }

    /// Number of columns
    pub fn num_fields(&self) -> usize {
        self.types.len()
    }

    /// Serialized record length in bytes
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn field_type(&self, i: usize) -> FieldType {
        self.types[i]
    }

    pub fn field_name(&self, i: usize) -> &str {
        &self.names[i]
    }

    /// Byte offset of column `i` within a serialized record
    pub fn offset_of(&self, i: usize) -> usize {
        self.offsets[i]
    }

    /// Position of the column named `name`
    pub fn index_of(&self, name: &str) -> RecordResult<usize> {
        self.name_to_index
            .get(name)
            .copied()
            .ok_or_else(|| RecordError::NoSuchField(name.to_string()))
    }

    /// Whether `tuple` matches this schema: same arity and the exact type
    /// at every position, no widening
    pub fn compatible(&self, tuple: &Tuple) -> bool {
        tuple.num_fields() == self.types.len()
            && self
                .types
                .iter()
                .enumerate()
                .all(|(i, ty)| tuple.field_type(i) == *ty)
    }

    /// Serialize `tuple` into `dst`, which must hold at least
    /// [`TupleDesc::length`] bytes. CHAR values are truncated to
    /// `CHAR_SIZE` bytes and NUL-padded.
    pub fn serialize(&self, dst: &mut [u8], tuple: &Tuple) -> RecordResult<()> {
        if !self.compatible(tuple) {
            return Err(RecordError::SchemaMismatch(
                "tuple does not match schema".to_string(),
            ));
        }

        for (i, ty) in self.types.iter().enumerate() {
            let offset = self.offsets[i];
            match (ty, tuple.field(i)) {
                (FieldType::Int, Field::Int(v)) => {
                    dst[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
                }
                (FieldType::Double, Field::Double(v)) => {
                    dst[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
                }
                (FieldType::Char, Field::Char(s)) => {
                    let bytes = s.as_bytes();
                    let n = bytes.len().min(CHAR_SIZE);
                    dst[offset..offset + n].copy_from_slice(&bytes[..n]);
                    dst[offset + n..offset + CHAR_SIZE].fill(0);
                }
                (ty, field) => {
                    return Err(RecordError::SchemaMismatch(format!(
                        "expected {:?} at position {}, got {:?}",
                        ty, i, field
                    )));
                }
            }
        }

        Ok(())
    }

    /// Deserialize one record from `src`, which must hold at least
    /// [`TupleDesc::length`] bytes. CHAR values end at the first NUL.
    pub fn deserialize(&self, src: &[u8]) -> Tuple {
        let mut fields = Vec::with_capacity(self.types.len());

        for (i, ty) in self.types.iter().enumerate() {
            let offset = self.offsets[i];
            let field = match ty {
                FieldType::Int => {
                    let mut buf = [0u8; 4];
                    buf.copy_from_slice(&src[offset..offset + 4]);
                    Field::Int(i32::from_le_bytes(buf))
                }
                FieldType::Double => {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(&src[offset..offset + 8]);
                    Field::Double(f64::from_le_bytes(buf))
                }
                FieldType::Char => {
                    let bytes = &src[offset..offset + CHAR_SIZE];
                    let end = bytes.iter().position(|&b| b == 0).unwrap_or(CHAR_SIZE);
                    Field::Char(String::from_utf8_lossy(&bytes[..end]).into_owned())
                }
            };
            fields.push(field);
        }

        Tuple::new(fields)
    }

    /// Concatenate two schemas; fails when column names collide
    pub fn merge(td1: &TupleDesc, td2: &TupleDesc) -> RecordResult<TupleDesc> {
        let types = td1.types.iter().chain(&td2.types).copied().collect();
        let names: Vec<String> = td1.names.iter().chain(&td2.names).cloned().collect();
        TupleDesc::new(types, names)
    }
}
