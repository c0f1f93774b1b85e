//! Aggregation strategy equivalence tests.

use graphfold_pipeline::aggregate::Strategy;
use graphfold_pipeline::bulk::SqliteBulkStore;
use graphfold_pipeline::loader::MemoryLoader;
use graphfold_pipeline::model::{Entity, Fragment};

fn fixture() -> Vec<Fragment> {
    vec![
        Fragment::new("A").with_property("x", "1"),
        Fragment::new("A").with_property("y", "2"),
        Fragment::new("B").with_property("x", "3"),
        Fragment::new("C").with_property("x", "1").with_reference("A"),
        Fragment::new("A").with_property("x", "1"),
        Fragment::new("C").with_reference("B"),
    ]
}

fn sorted(mut entities: Vec<Entity>) -> Vec<Entity> {
    entities.sort_by(|a, b| a.id.cmp(&b.id));
    entities
}

#[tokio::test]
async fn strategies_agree_on_same_input() {
    let store = SqliteBulkStore::in_memory();

    let memory_loader = MemoryLoader::new();
    let memory_run = Strategy::InMemory
        .run(fixture(), &memory_loader, &store, 1000)
        .await
        .unwrap();

    let bulk_loader = MemoryLoader::new();
    let bulk_run = Strategy::External
        .run(fixture(), &bulk_loader, &store, 1000)
        .await
        .unwrap();

    assert_eq!(memory_run.fragments_read, bulk_run.fragments_read);
    assert_eq!(memory_run.entities_written, bulk_run.entities_written);
    assert_eq!(sorted(memory_loader.entities()), sorted(bulk_loader.entities()));
}

#[tokio::test]
async fn strategies_agree_under_permutation() {
    let store = SqliteBulkStore::in_memory();

    let forward = MemoryLoader::new();
    Strategy::InMemory.run(fixture(), &forward, &store, 1000).await.unwrap();

    let mut shuffled = fixture();
    shuffled.reverse();
    shuffled.swap(0, 2);
    let permuted = MemoryLoader::new();
    Strategy::External
        .run(shuffled, &permuted, &store, 1000)
        .await
        .unwrap();

    assert_eq!(sorted(forward.entities()), sorted(permuted.entities()));
}

#[tokio::test]
async fn concrete_merge_scenario() {
    let store = SqliteBulkStore::in_memory();
    let loader = MemoryLoader::new();
    let fragments = vec![
        Fragment::new("A").with_property("x", "1"),
        Fragment::new("A").with_property("y", "2"),
        Fragment::new("B").with_property("x", "3"),
    ];

    let run = Strategy::InMemory.run(fragments, &loader, &store, 1000).await.unwrap();

    assert_eq!(run.fragments_read, 3);
    assert_eq!(run.entities_written, 2);

    let entities = sorted(loader.entities());
    assert_eq!(entities[0].id, "A");
    assert!(entities[0].properties["x"].contains("1"));
    assert!(entities[0].properties["y"].contains("2"));
    assert_eq!(entities[1].id, "B");
    assert!(entities[1].properties["x"].contains("3"));
}

#[tokio::test]
async fn invalid_fragment_reduces_count_without_aborting() {
    let store = SqliteBulkStore::in_memory();
    let loader = MemoryLoader::new();
    let fragments = vec![
        Fragment::new("A").with_property("x", "1"),
        Fragment::default().with_property("x", "9"),
        Fragment::new("B").with_property("x", "3"),
    ];

    let run = Strategy::External.run(fragments, &loader, &store, 1000).await.unwrap();

    assert_eq!(run.fragments_read, 2);
    assert_eq!(run.entities_written, 2);
}
