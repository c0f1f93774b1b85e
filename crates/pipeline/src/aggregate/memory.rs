//! In-memory aggregation strategy.
//!
//! Maintains an id → entity map and merges each incoming fragment into
//! it. Single-pass and single-threaded per run. The whole accumulated
//! map goes to the loader in one call after the input is exhausted.

use super::AggregationRun;
use crate::loader::Loader;
use crate::model::{Entity, Fragment};
use graphfold_core::Error;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Aggregate a fragment sequence in process memory.
///
/// Fragments without an id are reported and skipped; a single malformed
/// record never poisons the batch. Progress is logged every
/// `10 × chunk_size` fragments read.
pub async fn aggregate<I>(fragments: I, loader: &dyn Loader, chunk_size: usize) -> Result<AggregationRun, Error>
where
    I: IntoIterator<Item = Fragment>,
{
    let notice_every = chunk_size.max(1) * 10;
    let mut buffer: HashMap<String, Entity> = HashMap::new();
    let mut read = 0usize;

    for fragment in fragments {
        let Some(id) = fragment.id.clone() else {
            tracing::warn!("skipping fragment: {}", Error::InvalidFragment("fragment has no id".into()));
            continue;
        };
        read += 1;
        if read % notice_every == 0 {
            tracing::info!("reading in fragment {} ...", read);
        }
        match buffer.entry(id) {
            Entry::Occupied(mut slot) => slot.get_mut().merge(&fragment),
            Entry::Vacant(slot) => {
                slot.insert(Entity::from_fragment(&fragment)?);
            }
        }
    }

    let entities: Vec<Entity> = buffer.into_values().collect();
    let written = loader.load(&entities, true).await?;

    Ok(AggregationRun { fragments_read: read, entities_written: written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;

    #[tokio::test]
    async fn test_merges_shared_ids() {
        let loader = MemoryLoader::new();
        let fragments = vec![
            Fragment::new("A").with_property("x", "1"),
            Fragment::new("A").with_property("y", "2"),
            Fragment::new("B").with_property("x", "3"),
        ];

        let run = aggregate(fragments, &loader, 1000).await.unwrap();

        assert_eq!(run.fragments_read, 3);
        assert_eq!(run.entities_written, 2);

        let mut entities = loader.entities();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        assert!(entities[0].properties["x"].contains("1"));
        assert!(entities[0].properties["y"].contains("2"));
        assert!(entities[1].properties["x"].contains("3"));
    }

    #[tokio::test]
    async fn test_skips_fragment_without_id() {
        let loader = MemoryLoader::new();
        let fragments = vec![
            Fragment::new("A").with_property("x", "1"),
            Fragment::default().with_property("x", "9"),
            Fragment::new("B").with_property("x", "3"),
        ];

        let run = aggregate(fragments, &loader, 1000).await.unwrap();

        assert_eq!(run.fragments_read, 2);
        assert_eq!(run.entities_written, 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let loader = MemoryLoader::new();
        let run = aggregate(Vec::new(), &loader, 1000).await.unwrap();

        assert_eq!(run, AggregationRun::default());
    }

    #[tokio::test]
    async fn test_order_independent() {
        let fragments = vec![
            Fragment::new("A").with_property("x", "1"),
            Fragment::new("B").with_property("x", "3"),
            Fragment::new("A").with_property("y", "2"),
        ];

        let forward = MemoryLoader::new();
        aggregate(fragments.clone(), &forward, 1000).await.unwrap();

        let mut reversed_input = fragments;
        reversed_input.reverse();
        let reversed = MemoryLoader::new();
        aggregate(reversed_input, &reversed, 1000).await.unwrap();

        let sort = |mut entities: Vec<crate::model::Entity>| {
            entities.sort_by(|a, b| a.id.cmp(&b.id));
            entities
        };
        assert_eq!(sort(forward.entities()), sort(reversed.entities()));
    }
}
