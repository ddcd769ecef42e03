mod common;
use common::setup_operator;
use labsheet_core::gate;
use labsheet_core::storage::operator_from_uri;
use labsheet_core::{MemoryStore, OpendalStore, Record, StoreError, TabularStore};
use opendal::ErrorKind;
use serde_json::json;

#[tokio::test]
async fn test_storage_opendal_requires_initialised_spreadsheet() -> anyhow::Result<()> {
    let op = setup_operator()?;
    let store = OpendalStore::new(op, "lab");

    let err = store.collection_exists("electrochem").await.unwrap_err();
    assert_eq!(err, StoreError::SpreadsheetNotFound("lab".to_string()));
    assert!(matches!(
        store.spreadsheet().await,
        Err(StoreError::SpreadsheetNotFound(_))
    ));

    let meta = store.create_spreadsheet("Lab Data Sheet").await?;
    assert_eq!(meta.title, "Lab Data Sheet");
    assert_eq!(store.spreadsheet().await?, meta);
    assert!(!store.collection_exists("electrochem").await?);
    assert!(store.list_collections().await?.is_empty());

    assert!(store.create_spreadsheet("Again").await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_storage_opendal_collection_lifecycle() -> anyhow::Result<()> {
    let op = setup_operator()?;
    let store = OpendalStore::new(op, "lab");
    store.create_spreadsheet("Lab").await?;

    store.create_collection("synthesis", 100, 50).await?;
    store.create_collection("electrochem", 100, 50).await?;
    store.create_collection("electrochem", 10, 5).await?;
    assert_eq!(
        store.list_collections().await?,
        vec!["electrochem", "synthesis"]
    );
    assert!(store.read_header("electrochem").await?.is_empty());

    store
        .write_header_cells("electrochem", 0, &["exp_code".to_string(), "date".to_string()])
        .await?;
    store
        .append_rows("electrochem", vec![vec![json!("A1"), json!("2024-01-01")]])
        .await?;
    store
        .write_header_cells("electrochem", 2, &["note".to_string()])
        .await?;

    assert_eq!(
        store.read_header("electrochem").await?,
        vec!["exp_code", "date", "note"]
    );
    assert_eq!(
        store.read_column("electrochem", 0).await?,
        vec![json!("exp_code"), json!("A1")]
    );
    assert_eq!(
        store.read_column("electrochem", 2).await?,
        vec![json!("note"), json!("")]
    );
    assert_eq!(store.read_rows("electrochem").await?.len(), 2);

    assert_eq!(
        store.read_header("missing").await,
        Err(StoreError::CollectionNotFound("missing".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn test_storage_rejects_invalid_collection_names() -> anyhow::Result<()> {
    let op = setup_operator()?;
    let store = OpendalStore::new(op, "");
    store.create_spreadsheet("Lab").await?;
    assert_eq!(
        store.create_collection("../escape", 1, 1).await,
        Err(StoreError::InvalidCollection("../escape".to_string()))
    );

    let memory = MemoryStore::new();
    assert!(matches!(
        memory.create_collection("bad name", 1, 1).await,
        Err(StoreError::InvalidCollection(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_storage_gate_runs_against_opendal_store() -> anyhow::Result<()> {
    let op = setup_operator()?;
    let store = OpendalStore::new(op.clone(), "lab");
    store.create_spreadsheet("Lab").await?;

    let mut record = Record::new();
    record.insert("exp_code", json!("A1"));
    record.insert("voltage", json!(3.7));
    assert!(gate::append(&store, "electrochem", &record).await.ok);
    assert!(!gate::append(&store, "electrochem", &record).await.ok);
    assert!(!gate::check(&store, "electrochem", "A1").await.available);

    let reopened = OpendalStore::new(op, "lab");
    assert_eq!(
        reopened.read_rows("electrochem").await?,
        vec![
            vec![json!("exp_code"), json!("voltage")],
            vec![json!("A1"), json!(3.7)],
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_storage_memory_uris_share_contents() -> anyhow::Result<()> {
    let first = OpendalStore::from_uri("memory://labsheet-shared")?;
    first.create_spreadsheet("Shared").await?;
    first.create_collection("electrochem", 100, 50).await?;

    let second = OpendalStore::from_uri("memory://labsheet-shared")?;
    assert!(second.collection_exists("electrochem").await?);

    let other = OpendalStore::from_uri("memory://labsheet-other")?;
    assert!(matches!(
        other.collection_exists("electrochem").await,
        Err(StoreError::SpreadsheetNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_storage_memory_store_clones_share_sheets() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let handle = store.clone();
    store.create_collection("electrochem", 100, 50).await?;
    handle
        .write_header_cells("electrochem", 0, &["exp_code".to_string()])
        .await?;
    assert_eq!(store.read_header("electrochem").await?, vec!["exp_code"]);
    assert_eq!(
        store.append_rows("missing", vec![]).await,
        Err(StoreError::CollectionNotFound("missing".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn test_storage_file_uri_maps_to_local_directory() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("labsheet-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir)?;
    let uri = format!("file://{}", dir.display());

    let op = operator_from_uri(&uri)?;
    op.write("marker.txt", b"ok".to_vec()).await?;
    assert!(dir.join("marker.txt").exists());
    let missing = op.read("absent.txt").await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
