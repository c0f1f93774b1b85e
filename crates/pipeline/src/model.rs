//! The Fragment and Entity model.
//!
//! A Fragment is one observation of a real-world entity; equal ids mean
//! "the same entity, different observation". Merging is a total operation
//! on the Entity type: property-value sets are unioned per key and
//! reference sets are unioned, never overwritten, so any permutation of
//! the same fragment multiset yields an identical merged result.

use graphfold_core::Error;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A partial, single-observation entity record.
///
/// `id` is optional at this level because malformed upstream records
/// arrive without one; aggregation reports and skips those instead of
/// aborting the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub references: BTreeSet<String>,
}

impl Fragment {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()), ..Default::default() }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.entry(name.into()).or_default().insert(value.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.references.insert(reference.into());
        self
    }
}

/// The merged result of all fragments sharing an id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub references: BTreeSet<String>,
}

impl Entity {
    /// Promote a fragment to an entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFragment`] if the fragment has no id.
    pub fn from_fragment(fragment: &Fragment) -> Result<Self, Error> {
        let id = fragment
            .id
            .clone()
            .ok_or_else(|| Error::InvalidFragment("fragment has no id".into()))?;
        Ok(Self {
            id,
            schema: fragment.schema.clone(),
            properties: fragment.properties.clone(),
            references: fragment.references.clone(),
        })
    }

    /// Merge another observation of this entity in.
    ///
    /// Total over disjoint, overlapping, and empty inputs: property-value
    /// sets are unioned per key (duplicate values collapse), references
    /// are unioned, and the schema from the first observation wins. The
    /// fragment's id is not consulted; callers group by id.
    pub fn merge(&mut self, fragment: &Fragment) {
        if self.schema.is_none() {
            self.schema = fragment.schema.clone();
        }
        for (name, values) in &fragment.properties {
            self.properties
                .entry(name.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        self.references.extend(fragment.references.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_unions_properties() {
        let mut entity = Entity::from_fragment(&Fragment::new("A").with_property("x", "1")).unwrap();
        entity.merge(&Fragment::new("A").with_property("y", "2"));

        assert_eq!(entity.properties.len(), 2);
        assert!(entity.properties["x"].contains("1"));
        assert!(entity.properties["y"].contains("2"));
    }

    #[test]
    fn test_merge_collapses_duplicates() {
        let mut entity = Entity::from_fragment(&Fragment::new("A").with_property("x", "1")).unwrap();
        entity.merge(&Fragment::new("A").with_property("x", "1").with_property("x", "2"));

        assert_eq!(entity.properties["x"].len(), 2);
    }

    #[test]
    fn test_merge_unions_references() {
        let mut entity = Entity::from_fragment(&Fragment::new("A").with_reference("B")).unwrap();
        entity.merge(&Fragment::new("A").with_reference("B").with_reference("C"));

        assert_eq!(entity.references.len(), 2);
    }

    #[test]
    fn test_merge_empty_fragment_is_identity() {
        let mut entity = Entity::from_fragment(&Fragment::new("A").with_property("x", "1")).unwrap();
        let before = entity.clone();
        entity.merge(&Fragment::new("A"));

        assert_eq!(entity, before);
    }

    #[test]
    fn test_merge_keeps_first_schema() {
        let mut entity = Entity::from_fragment(&Fragment::new("A").with_schema("Company")).unwrap();
        entity.merge(&Fragment::new("A").with_schema("Organization"));

        assert_eq!(entity.schema.as_deref(), Some("Company"));
    }

    #[test]
    fn test_merge_order_independent() {
        let fragments = [
            Fragment::new("A").with_property("x", "1").with_reference("B"),
            Fragment::new("A").with_property("y", "2"),
            Fragment::new("A").with_property("x", "3").with_reference("C"),
        ];

        let merge_all = |order: &[usize]| {
            let mut entity = Entity::from_fragment(&fragments[order[0]]).unwrap();
            for &ix in &order[1..] {
                entity.merge(&fragments[ix]);
            }
            entity
        };

        let forward = merge_all(&[0, 1, 2]);
        for order in [[0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
            assert_eq!(merge_all(&order), forward);
        }
    }

    #[test]
    fn test_from_fragment_without_id() {
        let result = Entity::from_fragment(&Fragment::default().with_property("x", "1"));
        assert!(matches!(result, Err(Error::InvalidFragment(_))));
    }
}
