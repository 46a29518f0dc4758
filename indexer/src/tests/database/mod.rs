use chrono::Utc;
use mongodb::bson::{doc, Document};
use rstest::*;
use std::sync::Arc;

use crate::core::client::database::constant::IMPORT_STATES_COLLECTION;
use crate::core::client::database::{DatabaseError, ImportStateClient};
use crate::core::client::{InMemoryImportStateClient, MongoDbClient};
use crate::sync::updater::apply_outcomes;
use crate::tests::common::TestVault;
use crate::types::entity::ImportEntity;
use crate::types::import_state::ImportState;
use crate::types::params::database::MongoConfig;
use crate::types::query::RangeOutcome;
use crate::types::range::Range;

fn initial_state(vault: &TestVault) -> ImportState {
    ImportState::new(vault.import_key(), vault.initial_import_data(Utc::now()))
}

async fn mongo_client() -> MongoDbClient {
    let url = std::env::var("VAULT_INDEXER_MONGODB_CONNECTION_URL")
        .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string());
    let config = MongoConfig { connection_url: url, database_name: format!("vault_indexer_test_{}", uuid::Uuid::new_v4()) };
    MongoDbClient::new(&config).await.expect("MongoDB with a replica set is required")
}

async fn create_if_missing_keeps_the_first_state(client: Arc<dyn ImportStateClient>) {
    let vault = TestVault::new("a", 10);
    let first = client.create_import_state_if_missing(initial_state(&vault)).await.unwrap();

    let mut other = initial_state(&vault);
    other.ranges_mut::<u64>().unwrap().covered_ranges = vec![Range::new(1, 5)];
    let stored = client.create_import_state_if_missing(other).await.unwrap();

    assert_eq!(stored, first);
    assert!(stored.ranges::<u64>().unwrap().covered_ranges.is_empty());
}

async fn concurrent_merges_do_not_lose_updates(client: Arc<dyn ImportStateClient>) {
    let vault = TestVault::new("a", 10);
    client.create_import_state_if_missing(initial_state(&vault)).await.unwrap();

    let handles: Vec<_> = (0..10u64)
        .map(|i| {
            let client = client.clone();
            let key = vault.import_key();
            tokio::spawn(async move {
                let outcomes = vec![RangeOutcome::success(key.clone(), Range::new(i * 10 + 1, i * 10 + 10))];
                let merge =
                    move |state: ImportState| apply_outcomes(state, &outcomes, Utc::now()).map_err(DatabaseError::from);
                client.update_import_state_transactional(&key, &merge).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let state = client.get_import_state(&vault.import_key()).await.unwrap().unwrap();
    assert_eq!(state.ranges::<u64>().unwrap().covered_ranges, vec![Range::new(1, 100)]);
}

async fn merge_of_missing_state_fails(client: Arc<dyn ImportStateClient>) {
    let merge = |state: ImportState| -> Result<ImportState, DatabaseError> { Ok(state) };
    let result = client.update_import_state_transactional("product:investment:missing", &merge).await;
    assert!(matches!(result, Err(DatabaseError::ImportStateNotFound(_))));
}

async fn get_import_states_skips_missing_keys(client: Arc<dyn ImportStateClient>) {
    let a = TestVault::new("a", 10);
    let b = TestVault::new("b", 20);
    client.upsert_import_state(&initial_state(&a)).await.unwrap();
    client.upsert_import_state(&initial_state(&b)).await.unwrap();

    let keys = vec![a.import_key(), "product:investment:missing".to_string(), b.import_key()];
    let mut states = client.get_import_states(&keys).await.unwrap();
    states.sort_by(|x, y| x.import_key.cmp(&y.import_key));
    assert_eq!(states.iter().map(|s| s.import_key.as_str()).collect::<Vec<_>>(), vec![
        "product:investment:a",
        "product:investment:b"
    ]);
}

#[rstest]
#[tokio::test]
async fn in_memory_create_if_missing() {
    create_if_missing_keeps_the_first_state(Arc::new(InMemoryImportStateClient::new())).await;
}

#[rstest]
#[tokio::test]
async fn in_memory_concurrent_merges() {
    concurrent_merges_do_not_lose_updates(Arc::new(InMemoryImportStateClient::new())).await;
}

#[rstest]
#[tokio::test]
async fn in_memory_merge_of_missing_state() {
    merge_of_missing_state_fails(Arc::new(InMemoryImportStateClient::new())).await;
}

#[rstest]
#[tokio::test]
async fn in_memory_get_many() {
    get_import_states_skips_missing_keys(Arc::new(InMemoryImportStateClient::new())).await;
}

#[tokio::test]
async fn in_memory_rejected_merge_leaves_state_untouched() {
    let client = InMemoryImportStateClient::new();
    let vault = TestVault::new("a", 10);
    let before = client.create_import_state_if_missing(initial_state(&vault)).await.unwrap();

    let outcomes = vec![RangeOutcome::success(vault.import_key(), Range::new(chrono::DateTime::<Utc>::MIN_UTC, Utc::now()))];
    let merge = |state: ImportState| apply_outcomes(state, &outcomes, Utc::now()).map_err(DatabaseError::from);
    let result = client.update_import_state_transactional(&vault.import_key(), &merge).await;

    assert!(matches!(result, Err(DatabaseError::MergeRejected(_))));
    assert_eq!(client.get_import_state(&vault.import_key()).await.unwrap(), Some(before));
}

#[rstest]
#[tokio::test]
#[ignore = "requires a MongoDB replica set"]
async fn mongo_create_if_missing() {
    create_if_missing_keeps_the_first_state(Arc::new(mongo_client().await)).await;
}

#[rstest]
#[tokio::test]
#[ignore = "requires a MongoDB replica set"]
async fn mongo_concurrent_merges() {
    concurrent_merges_do_not_lose_updates(Arc::new(mongo_client().await)).await;
}

#[rstest]
#[tokio::test]
#[ignore = "requires a MongoDB replica set"]
async fn mongo_merge_of_missing_state() {
    merge_of_missing_state_fails(Arc::new(mongo_client().await)).await;
}

#[rstest]
#[tokio::test]
#[ignore = "requires a MongoDB replica set"]
async fn mongo_get_many() {
    get_import_states_skips_missing_keys(Arc::new(mongo_client().await)).await;
}

#[rstest]
#[tokio::test]
#[ignore = "requires a MongoDB replica set"]
async fn mongo_stores_states_under_their_import_key() {
    let client = mongo_client().await;
    let vault = TestVault::new("a", 10);
    client.create_import_state_if_missing(initial_state(&vault)).await.unwrap();

    let raw = client
        .database()
        .collection::<Document>(IMPORT_STATES_COLLECTION)
        .find_one(doc! { "_id": vault.import_key() }, None)
        .await
        .unwrap()
        .expect("state stored under its import key");
    assert_eq!(raw.get_str("importKey").unwrap(), vault.import_key());
}
