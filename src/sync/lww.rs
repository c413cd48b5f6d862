// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Last-Write-Wins Register
//!
//! A per-key register that resolves concurrent writes from several tabs.
//! The surviving write is the one with the greatest `(timestamp, writer_id)`
//! pair; `merge` is commutative, associative and idempotent, so replicas
//! that have seen the same set of writes hold the same value.
//!
//! Two writes with an identical `(timestamp, writer_id)` pair can only come
//! from the same tab within one millisecond. Those are ordered by the value's
//! JSON encoding so that merge stays deterministic.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::Fingerprint;

/// Identity of a writing tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriterId(String);

impl WriterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<fingerprint prefix>-<random suffix>`; unique per tab even within
    /// one browser profile.
    pub fn for_tab(fingerprint: &Fingerprint) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", fingerprint.short(), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LwwRegister<V> {
    pub key: String,
    pub value: V,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub writer_id: WriterId,
}

impl<V: Clone + Serialize> LwwRegister<V> {
    pub fn new(key: impl Into<String>, value: V, writer: &WriterId, now: i64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp: now,
            writer_id: writer.clone(),
        }
    }

    /// Local write. Rejected when `now` is behind the register.
    pub fn update(&mut self, value: V, writer: &WriterId, now: i64) -> bool {
        if now < self.timestamp {
            return false;
        }
        self.value = value;
        self.timestamp = now;
        self.writer_id = writer.clone();
        true
    }

    /// Adopt `other` if it wins. Returns whether this register changed.
    pub fn merge(&mut self, other: &Self) -> bool {
        if other.key != self.key {
            return false;
        }
        if other.precedence(self) == Ordering::Greater {
            *self = other.clone();
            true
        } else {
            false
        }
    }

    fn precedence(&self, other: &Self) -> Ordering {
        (self.timestamp, &self.writer_id)
            .cmp(&(other.timestamp, &other.writer_id))
            .then_with(|| canonical(&self.value).cmp(&canonical(&other.value)))
    }
}

fn canonical<V: Serialize>(value: &V) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Register-backed fields of one tab's UI/app state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldReplica {
    registers: BTreeMap<String, LwwRegister<Value>>,
}

impl FieldReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local write to one field.
    pub fn set(&mut self, key: &str, value: Value, writer: &WriterId, now: i64) -> bool {
        match self.registers.get_mut(key) {
            Some(register) => register.update(value, writer, now),
            None => {
                self.registers
                    .insert(key.to_string(), LwwRegister::new(key, value, writer, now));
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.registers.get(key).map(|register| &register.value)
    }

    pub fn register(&self, key: &str) -> Option<&LwwRegister<Value>> {
        self.registers.get(key)
    }

    /// Merge every register of `other`. Returns the number of fields changed.
    pub fn merge(&mut self, other: &FieldReplica) -> usize {
        let mut changed = 0;
        for (key, theirs) in &other.registers {
            match self.registers.get_mut(key) {
                Some(ours) => {
                    if ours.merge(theirs) {
                        changed += 1;
                    }
                }
                None => {
                    self.registers.insert(key.clone(), theirs.clone());
                    changed += 1;
                }
            }
        }
        changed
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.registers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn writer(id: &str) -> WriterId {
        WriterId::new(id)
    }

    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn update_rejects_older_time() {
        let mut reg = LwwRegister::new("theme", json!("dark"), &writer("a"), 100);
        assert!(!reg.update(json!("light"), &writer("a"), 99));
        assert_eq!(reg.value, json!("dark"));

        assert!(reg.update(json!("light"), &writer("b"), 100));
        assert_eq!(reg.value, json!("light"));
        assert_eq!(reg.writer_id, writer("b"));
    }

    #[test]
    fn greater_timestamp_wins() {
        let mut a = LwwRegister::new("k", json!(1), &writer("z"), 100);
        let b = LwwRegister::new("k", json!(2), &writer("a"), 101);
        assert!(a.merge(&b));
        assert_eq!(a.value, json!(2));
        assert!(!a.merge(&b));
    }

    #[test]
    fn equal_timestamps_break_on_writer_id() {
        let a = LwwRegister::new("k", json!("from-a"), &writer("tab-a"), 100);
        let b = LwwRegister::new("k", json!("from-b"), &writer("tab-b"), 100);

        let mut left = a.clone();
        left.merge(&b);
        let mut right = b.clone();
        right.merge(&a);

        assert_eq!(left, right);
        assert_eq!(left.value, json!("from-b"));
    }

    #[test]
    fn merge_ignores_other_keys() {
        let mut a = LwwRegister::new("a", json!(1), &writer("w"), 1);
        let b = LwwRegister::new("b", json!(2), &writer("w"), 2);
        assert!(!a.merge(&b));
        assert_eq!(a.value, json!(1));
    }

    #[test]
    fn merge_converges_in_any_order() {
        let updates = vec![
            LwwRegister::new("fee", json!(500), &writer("tab-a"), 10),
            LwwRegister::new("fee", json!(650), &writer("tab-b"), 12),
            LwwRegister::new("fee", json!(700), &writer("tab-c"), 12),
            LwwRegister::new("fee", json!(900), &writer("tab-c"), 12),
            LwwRegister::new("fee", json!(100), &writer("tab-a"), 11),
        ];

        let mut results = Vec::new();
        for order in permutations(&updates) {
            let mut acc = order[0].clone();
            for reg in &order[1..] {
                acc.merge(reg);
            }
            results.push(acc);
        }

        let first = &results[0];
        assert!(results.iter().all(|r| r == first));
        assert_eq!(first.timestamp, 12);
        assert_eq!(first.writer_id, writer("tab-c"));
        assert_eq!(first.value, json!(900));
    }

    #[test]
    fn merge_is_associative_and_idempotent() {
        let a = LwwRegister::new("k", json!("a"), &writer("1"), 5);
        let b = LwwRegister::new("k", json!("b"), &writer("2"), 7);
        let c = LwwRegister::new("k", json!("c"), &writer("3"), 6);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ab_c = ab.clone();
        ab_c.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut a_bc = a.clone();
        a_bc.merge(&bc);

        assert_eq!(ab_c, a_bc);

        let snapshot = ab_c.clone();
        assert!(!ab_c.merge(&snapshot));
        assert_eq!(ab_c, snapshot);
    }

    #[test]
    fn replicas_converge_field_by_field() {
        let (wa, wb) = (writer("tab-a"), writer("tab-b"));

        let mut tab_a = FieldReplica::new();
        tab_a.set("filters.class", json!("10-A"), &wa, 100);
        tab_a.set("draft.amount", json!(500), &wa, 110);

        let mut tab_b = FieldReplica::new();
        tab_b.set("filters.class", json!("9-B"), &wb, 105);
        tab_b.set("sidebar", json!(true), &wb, 90);

        let mut merged_a = tab_a.clone();
        assert_eq!(merged_a.merge(&tab_b), 2);
        let mut merged_b = tab_b.clone();
        assert_eq!(merged_b.merge(&tab_a), 1);

        assert_eq!(merged_a, merged_b);
        assert_eq!(merged_a.get("filters.class"), Some(&json!("9-B")));
        assert_eq!(merged_a.len(), 3);
        assert_eq!(
            merged_a.keys().collect::<Vec<_>>(),
            vec!["draft.amount", "filters.class", "sidebar"]
        );
    }

    #[test]
    fn writer_ids_are_unique_per_tab() {
        let fp = crate::auth::fingerprint::desktop_attributes().fingerprint();
        let a = WriterId::for_tab(&fp);
        let b = WriterId::for_tab(&fp);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with(fp.short()));
    }

    #[test]
    fn register_wire_format_is_camel_case() {
        let reg = LwwRegister::new("k", json!(1), &writer("w"), 42);
        assert_eq!(
            serde_json::to_value(&reg).unwrap(),
            json!({ "key": "k", "value": 1, "timestamp": 42, "writerId": "w" })
        );
    }
}
