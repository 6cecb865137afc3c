use linked_hash_map::LinkedHashMap;
use std::{fmt::Display, hash::Hash, iter::IntoIterator};
use thiserror::Error;

/// An insertion-ordered map that refuses to overwrite keys. Field order is
/// observable in rendered documents, so projections, documents and accumulator
/// lists are kept in one of these.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueLinkedHashMap<K, V>(LinkedHashMap<K, V>)
where
    K: Hash + Eq + Display;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("duplicate key found: {0}")]
pub struct DuplicateKeyError(pub String);

impl DuplicateKeyError {
    pub fn get_key_name(self) -> String {
        self.0
    }
}

impl<K, V> Default for UniqueLinkedHashMap<K, V>
where
    K: Hash + Eq + Display,
{
    fn default() -> Self {
        Self(LinkedHashMap::new())
    }
}

impl<K, V> UniqueLinkedHashMap<K, V>
where
    K: Hash + Eq + Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_many(
        &mut self,
        other: impl Iterator<Item = (K, V)>,
    ) -> Result<(), DuplicateKeyError> {
        for (k, v) in other {
            self.insert(k, v)?;
        }
        Ok(())
    }

    pub fn insert(&mut self, k: K, v: V) -> Result<(), DuplicateKeyError> {
        if self.0.contains_key(&k) {
            return Err(DuplicateKeyError(k.to_string()));
        }
        self.0.insert(k, v);
        Ok(())
    }

    /// Replaces the value under an existing key in place, keeping its position.
    /// Returns the previous value, or None if the key was appended.
    pub fn replace(&mut self, k: K, v: V) -> Option<V> {
        match self.0.get_mut(&k) {
            Some(slot) => Some(std::mem::replace(slot, v)),
            None => {
                self.0.insert(k, v);
                None
            }
        }
    }

    pub fn get(&self, k: &K) -> Option<&V> {
        self.0.get(k)
    }

    pub fn get_mut(&mut self, k: &K) -> Option<&mut V> {
        self.0.get_mut(k)
    }

    pub fn remove(&mut self, k: &K) -> Option<V> {
        self.0.remove(k)
    }

    pub fn contains_key(&self, k: &K) -> bool {
        self.0.contains_key(k)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.0.iter()
    }

    pub fn front(&self) -> Option<(&K, &V)> {
        self.0.front()
    }

    /// Rebuilds the map by applying `f` to every value, preserving key order.
    pub fn map_values<W, E>(
        self,
        mut f: impl FnMut(V) -> Result<W, E>,
    ) -> Result<UniqueLinkedHashMap<K, W>, E> {
        let mut out = LinkedHashMap::new();
        for (k, v) in self.0 {
            out.insert(k, f(v)?);
        }
        Ok(UniqueLinkedHashMap(out))
    }
}

impl<K, V> IntoIterator for UniqueLinkedHashMap<K, V>
where
    K: Hash + Eq + Display,
{
    type Item = (K, V);
    type IntoIter = linked_hash_map::IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K, V> From<UniqueLinkedHashMap<K, V>> for LinkedHashMap<K, V>
where
    K: Hash + Eq + Display,
{
    fn from(ulhm: UniqueLinkedHashMap<K, V>) -> Self {
        ulhm.0
    }
}

impl<K, V> From<LinkedHashMap<K, V>> for UniqueLinkedHashMap<K, V>
where
    K: Hash + Eq + Display,
{
    fn from(lhm: LinkedHashMap<K, V>) -> Self {
        Self(lhm)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_rejects_duplicates() {
        let mut m = UniqueLinkedHashMap::new();
        assert_eq!(Ok(()), m.insert("a".to_string(), 1));
        assert_eq!(
            Err(DuplicateKeyError("a".to_string())),
            m.insert("a".to_string(), 2)
        );
        assert_eq!(Some(&1), m.get(&"a".to_string()));
    }

    #[test]
    fn replace_keeps_position() {
        let mut m = UniqueLinkedHashMap::new();
        m.insert("a".to_string(), 1).unwrap();
        m.insert("b".to_string(), 2).unwrap();
        assert_eq!(Some(1), m.replace("a".to_string(), 3));
        assert_eq!(
            vec![("a".to_string(), 3), ("b".to_string(), 2)],
            m.into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn map_values_preserves_order() {
        let mut m = UniqueLinkedHashMap::new();
        m.insert("z".to_string(), 1).unwrap();
        m.insert("y".to_string(), 2).unwrap();
        let mapped: UniqueLinkedHashMap<String, i32> =
            m.map_values(|v| Ok::<_, ()>(v * 10)).unwrap();
        assert_eq!(
            vec!["z", "y"],
            mapped.keys().map(String::as_str).collect::<Vec<_>>()
        );
        assert_eq!(Some(&20), mapped.get(&"y".to_string()));
    }
}
