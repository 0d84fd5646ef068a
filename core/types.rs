use std::hash::{Hash, Hasher};

pub(crate) const NULL_TAG: u8 = 0;
pub(crate) const INT_TAG: u8 = 1;
pub(crate) const FLOAT_TAG: u8 = 2;
pub(crate) const TEXT_TAG: u8 = 3;
pub(crate) const BLOB_TAG: u8 = 4;

/// A single column value carried by a [`Row`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Borrowed view of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    Null,
    Integer(i64),
    Float(f64),
    Text(&'a str),
    Blob(&'a [u8]),
}

impl Value {
    pub fn as_ref(&self) -> ValueRef<'_> {
        match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Float(f) => ValueRef::Float(*f),
            Value::Text(t) => ValueRef::Text(t.as_str()),
            Value::Blob(b) => ValueRef::Blob(b.as_slice()),
        }
    }

    /// Type tag shared by hashing and the on-disk row encoding.
    pub(crate) fn tag(&self) -> u8 {
        self.as_ref().tag()
    }
}

impl ValueRef<'_> {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            ValueRef::Null => NULL_TAG,
            ValueRef::Integer(_) => INT_TAG,
            ValueRef::Float(_) => FLOAT_TAG,
            ValueRef::Text(_) => TEXT_TAG,
            ValueRef::Blob(_) => BLOB_TAG,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(*i),
            ValueRef::Float(f) => Value::Float(*f),
            ValueRef::Text(t) => Value::Text(t.to_string()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

#[inline(always)]
fn canonicalize_f64(f: f64) -> f64 {
    if f == 0.0 {
        0.0 // collapse -0.0 to +0.0
    } else {
        f
    }
}

impl Hash for ValueRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.tag());
        match self {
            ValueRef::Null => {}
            ValueRef::Integer(i) => state.write_i64(*i),
            ValueRef::Float(f) => state.write(&canonicalize_f64(*f).to_le_bytes()),
            ValueRef::Text(t) => state.write(t.as_bytes()),
            ValueRef::Blob(b) => state.write(b),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ref().hash(state)
    }
}

/// The record type partitioned by [`crate::RowCodec`]: an ordered list of values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
