use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use alma_ingest::domain::{ColumnValue, StagedLink, TableName};
use alma_ingest::error::AlmaError;
use alma_ingest::schema::PROJECT_COLUMNS;
use alma_ingest::store::Store;

fn store_in(temp: &tempfile::TempDir) -> Store {
    let database = Utf8PathBuf::from_path_buf(temp.path().join("nested").join("alma.db")).unwrap();
    let downloads = Utf8PathBuf::from_path_buf(temp.path().join("downloads")).unwrap();
    Store::new_with_paths(database, downloads)
}

#[test]
fn provision_creates_both_tables() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(&temp);
    store.provision().unwrap();

    let db = store.open().unwrap();
    assert_eq!(
        db.schema().fields(TableName::ProjectsData).len(),
        PROJECT_COLUMNS.len()
    );
    assert!(db.projects().unwrap().is_empty());
    assert!(db.links().unwrap().is_empty());
    assert_eq!(db.latest_release_date().unwrap(), None);
}

#[test]
fn legacy_layout_without_declared_columns_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(&temp);
    std::fs::create_dir_all(store.database_path().parent().unwrap().as_std_path()).unwrap();
    let conn = rusqlite::Connection::open(store.database_path().as_std_path()).unwrap();
    conn.execute_batch(
        "CREATE TABLE projects_data (id_projects_data INTEGER PRIMARY KEY, source_name TEXT);
         CREATE TABLE links_list (id_link INTEGER PRIMARY KEY, url TEXT, uid TEXT, size REAL);",
    )
    .unwrap();
    drop(conn);

    assert_matches!(store.open().unwrap_err(), AlmaError::SchemaMismatch(_));
}

#[test]
fn links_round_trip_in_id_order() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(&temp);
    store.provision().unwrap();

    let mut db = store.open().unwrap();
    let tx = db.transaction().unwrap();
    for (id, uid) in [(2_i64, "uid://B2"), (1, "uid://A1")] {
        tx.insert_link(
            id,
            &StagedLink {
                url: format!("https://example.org/{id}.tar"),
                uid: uid.to_string(),
                size: 512.0,
            },
        )
        .unwrap();
    }
    tx.commit().unwrap();

    let links = db.links().unwrap();
    assert_eq!(links.iter().map(|link| link.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(links[0].uid, "uid://A1");
    assert_eq!(links[1].size, 512.0);
}

#[test]
fn latest_release_date_ignores_masked_values() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(&temp);
    store.provision().unwrap();

    let mut db = store.open().unwrap();
    let tx = db.transaction().unwrap();
    tx.insert_project(
        1,
        &[(
            "release_date".to_string(),
            ColumnValue::Text("2014-05-30".to_string()),
        )],
    )
    .unwrap();
    tx.insert_project(
        2,
        &[(
            "release_date".to_string(),
            ColumnValue::from_json(serde_json::Value::Null),
        )],
    )
    .unwrap();
    tx.insert_project(
        3,
        &[(
            "release_date".to_string(),
            ColumnValue::Text("2019-11-02".to_string()),
        )],
    )
    .unwrap();
    tx.commit().unwrap();

    assert_eq!(
        db.latest_release_date().unwrap().as_deref(),
        Some("2019-11-02")
    );
}

#[test]
fn clear_one_table() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(&temp);
    store.provision().unwrap();

    let mut db = store.open().unwrap();
    let tx = db.transaction().unwrap();
    tx.insert_project(1, &[]).unwrap();
    tx.insert_link(
        1,
        &StagedLink {
            url: "https://example.org/1.tar".to_string(),
            uid: "uid://A1".to_string(),
            size: 1.0,
        },
    )
    .unwrap();
    tx.commit().unwrap();

    let cleared = db.clear(Some(TableName::ProjectsData)).unwrap();
    assert_eq!(cleared, vec![TableName::ProjectsData]);
    assert_eq!(db.next_id(TableName::ProjectsData).unwrap(), 1);
    assert_eq!(db.next_id(TableName::LinksList).unwrap(), 2);
}
