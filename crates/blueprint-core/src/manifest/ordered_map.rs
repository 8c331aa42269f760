//! Insertion-ordered map used where key order carries meaning (env slots,
//! commands). Keys are kept in a parallel vector alongside a `HashMap`.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

#[derive(Clone)]
pub struct OrderedMap<K, V> {
    keys: Vec<K>,
    values: HashMap<K, V>,
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            values: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> OrderedMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.values.get(key)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.values.get_mut(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.values.contains_key(key)
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        if !self.values.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.values.insert(key, value)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let removed = self.values.remove(key)?;
        self.keys.retain(|k| <K as Borrow<Q>>::borrow(k) != key);
        Some(removed)
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.keys
            .iter()
            .filter_map(move |k| self.values.get(k).map(|v| (k, v)))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> + '_ {
        self.values.values_mut()
    }

    /// Same keys mapping to equal values, regardless of order.
    pub fn same_entries(&self, other: &Self) -> bool
    where
        V: PartialEq,
    {
        self.values == other.values
    }
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for OrderedMap<K, V> {
    /// Order-sensitive: two maps with the same entries in a different order
    /// are not equal.
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys && self.values == other.values
    }
}

impl<K: Eq + Hash, V: Eq> Eq for OrderedMap<K, V> {}

impl<K: fmt::Debug + Eq + Hash, V: fmt::Debug> fmt::Debug for OrderedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.keys
                    .iter()
                    .filter_map(|k| self.values.get(k).map(|v| (k, v))),
            )
            .finish()
    }
}

impl<K: Eq + Hash + Clone, V> FromIterator<(K, V)> for OrderedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

// ---------------------------------------------------------------------------
// serde
// ---------------------------------------------------------------------------

impl<K, V> Serialize for OrderedMap<K, V>
where
    K: Serialize + Eq + Hash,
    V: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.keys.len()))?;
        for key in &self.keys {
            if let Some(value) = self.values.get(key) {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

struct OrderedMapVisitor<K, V>(PhantomData<(K, V)>);

impl<'de, K, V> Visitor<'de> for OrderedMapVisitor<K, V>
where
    K: Deserialize<'de> + Eq + Hash + Clone,
    V: Deserialize<'de>,
{
    type Value = OrderedMap<K, V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((key, value)) = access.next_entry::<K, V>()? {
            map.set(key, value);
        }
        Ok(map)
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(OrderedMap::new())
    }
}

impl<'de, K, V> Deserialize<'de> for OrderedMap<K, V>
where
    K: Deserialize<'de> + Eq + Hash + Clone,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OrderedMapVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order_through_serde() {
        let json = r#"{"zeta":1,"alpha":2,"mid":3}"#;
        let map: OrderedMap<String, u32> = serde_json::from_str(json).unwrap();
        assert_eq!(map.keys(), ["zeta", "alpha", "mid"]);
        assert_eq!(serde_json::to_string(&map).unwrap(), json);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut map = OrderedMap::new();
        map.set("a", 1);
        map.set("b", 2);
        assert_eq!(map.set("a", 3), Some(1));
        assert_eq!(map.keys(), ["a", "b"]);
        assert_eq!(map.get("a"), Some(&3));
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let mut map: OrderedMap<String, i32> =
            [("x".to_string(), 1), ("y".to_string(), 2), ("z".to_string(), 3)]
                .into_iter()
                .collect();
        assert_eq!(map.remove("y"), Some(2));
        assert_eq!(map.keys(), ["x", "z"]);
        assert_eq!(map.remove("y"), None);
    }

    #[test]
    fn equality_is_order_sensitive_but_same_entries_is_not() {
        let a: OrderedMap<&str, i32> = [("a", 1), ("b", 2)].into_iter().collect();
        let b: OrderedMap<&str, i32> = [("b", 2), ("a", 1)].into_iter().collect();
        assert_ne!(a, b);
        assert!(a.same_entries(&b));
    }

    #[test]
    fn duplicate_keys_keep_first_position_last_value() {
        let map: OrderedMap<String, u32> =
            serde_json::from_str(r#"{"a":1,"b":2,"a":3}"#).unwrap();
        assert_eq!(map.keys(), ["a", "b"]);
        assert_eq!(map.get("a"), Some(&3));
    }

    #[test]
    fn null_is_empty() {
        let map: OrderedMap<String, u32> = serde_json::from_str("null").unwrap();
        assert!(map.is_empty());
    }
}
