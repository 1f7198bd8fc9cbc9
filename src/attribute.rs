use crate::types::TypeId;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};

#[derive(Clone, Debug)]
pub enum Attribute {
    Unit,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Reference to a function by name.
    Symbol(String),
    Type(TypeId),
    Array(Vec<Attribute>),
}

impl Attribute {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Attribute::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Attribute::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::String(s) | Attribute::Symbol(s) => Some(s),
            _ => None,
        }
    }
}

// Floats compare bitwise so that attributes can key hash maps (CSE).
impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Attribute::Unit, Attribute::Unit) => true,
            (Attribute::Bool(a), Attribute::Bool(b)) => a == b,
            (Attribute::Integer(a), Attribute::Integer(b)) => a == b,
            (Attribute::Float(a), Attribute::Float(b)) => a.to_bits() == b.to_bits(),
            (Attribute::String(a), Attribute::String(b)) => a == b,
            (Attribute::Symbol(a), Attribute::Symbol(b)) => a == b,
            (Attribute::Type(a), Attribute::Type(b)) => a == b,
            (Attribute::Array(a), Attribute::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Attribute::Unit => {}
            Attribute::Bool(b) => b.hash(state),
            Attribute::Integer(i) => i.hash(state),
            Attribute::Float(f) => f.to_bits().hash(state),
            Attribute::String(s) | Attribute::Symbol(s) => s.hash(state),
            Attribute::Type(t) => t.hash(state),
            Attribute::Array(items) => items.hash(state),
        }
    }
}

pub type AttributeMap = SmallVec<[(String, Attribute); 4]>;

pub trait AttributeMapExt {
    fn get(&self, key: &str) -> Option<&Attribute>;
    fn set(&mut self, key: &str, value: Attribute);
    fn take(&mut self, key: &str) -> Option<Attribute>;
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl AttributeMapExt for AttributeMap {
    fn get(&self, key: &str) -> Option<&Attribute> {
        self.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn set(&mut self, key: &str, value: Attribute) {
        if let Some(pos) = self.iter().position(|(k, _)| k == key) {
            self[pos].1 = value;
        } else {
            self.push((key.to_string(), value));
        }
    }

    fn take(&mut self, key: &str) -> Option<Attribute> {
        let pos = self.iter().position(|(k, _)| k == key)?;
        Some(self.remove(pos).1)
    }
}
