use crate::Value;
use std::{
    collections::{BTreeMap, HashMap},
    hash::BuildHasher,
};

/// Host-side provider of uniform values, looked up by name without the leading dot.
pub trait UniformSource {
    fn uniform(&self, name: &str) -> Option<Value>;
}

impl<S: BuildHasher> UniformSource for HashMap<String, Value, S> {
    fn uniform(&self, name: &str) -> Option<Value> {
        self.get(name).copied()
    }
}

impl UniformSource for BTreeMap<String, Value> {
    fn uniform(&self, name: &str) -> Option<Value> {
        self.get(name).copied()
    }
}
