//! Integration tests for the `Dao` facade against real SQLite databases.
//!
//! Each test works on its own temporary database file.

use hydro_dao::db::driver::Metadata;
use hydro_dao::error::ErrorKind;
use hydro_dao::models::{
    BatchCommand, Command, DataSourceConfig, IsolationLevel, IteratorBatchCommand, Record, Row,
    Value,
};
use hydro_dao::{Dao, DataSources, bindable, params};
use serde::Serialize;
use tempfile::NamedTempFile;

#[derive(Debug, Default, PartialEq)]
struct User {
    id: i64,
    name: String,
    age: Option<i64>,
    active: bool,
}

bindable!(User in "users" { id, name, age, active });

#[derive(Serialize)]
struct NewUser {
    id: i64,
    name: String,
    age: Option<i64>,
}

/// Create a SQLite test database with a `users` table.
fn setup_db() -> (DataSources, Dao) {
    let temp_file = NamedTempFile::new().unwrap();
    // Keep the temp file alive - prevent deletion when function returns
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let config = DataSourceConfig::parse(&format!("test=sqlite:{db_path}")).unwrap();
    let sources = DataSources::new();
    sources.connect(&config).unwrap();

    let dao = sources.get_dao("test").unwrap();
    dao.execute(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            age INTEGER DEFAULT 30,
            active BOOLEAN NOT NULL DEFAULT 1
        )",
        &[],
    )
    .unwrap();
    (sources, dao)
}

fn seed(dao: &Dao, n: i64) {
    let mut batch = BatchCommand::new("INSERT INTO users (id, name, age) VALUES (?, ?, ?)");
    for i in 1..=n {
        batch = batch.add(params![i, format!("user{i:02}"), 20 + i]);
    }
    assert_eq!(dao.execute_batch(&batch).unwrap(), n as u64);
}

fn count_users(dao: &Dao) -> u64 {
    dao.count("SELECT * FROM users", &[]).unwrap()
}

#[test]
fn test_query_page() {
    let (_sources, dao) = setup_db();
    seed(&dao, 25);

    let sql = "SELECT * FROM users ORDER BY id";
    let page = dao.query_page(sql, &[], 10, 2).unwrap();
    assert_eq!(page.total_count, 25);
    assert_eq!(page.total_pages(), 3);
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.items[0].get_i64("id"), Some(21));
    assert!(!page.has_next());

    let typed = dao.query_page_as::<User>(sql, &[], 10, 0).unwrap();
    assert_eq!(typed.items.len(), 10);
    assert_eq!(typed.items[9].name, "user10");
    assert!(typed.has_next());

    let err = dao.query_page(sql, &[], 0, 0).unwrap_err();
    assert!(matches!(err, hydro_dao::DaoError::InvalidInput { .. }));
}

#[test]
fn test_query_range_and_first() {
    let (_sources, dao) = setup_db();
    seed(&dao, 10);

    let rows = dao
        .query_range("SELECT id FROM users ORDER BY id;", &[], 3, 6)
        .unwrap();
    let ids: Vec<i64> = rows.iter().filter_map(|r| r.get_i64("id")).collect();
    assert_eq!(ids, vec![4, 5, 6]);

    let first: User = dao
        .query_first_as("SELECT * FROM users WHERE age > ? ORDER BY id", &params![25])
        .unwrap()
        .unwrap();
    assert_eq!(first.id, 6);
    assert!(first.active);

    assert!(
        dao.query_first("SELECT * FROM users WHERE id = ?", &params![99])
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_window_over_statement_with_own_limit() {
    let (_sources, dao) = setup_db();
    seed(&dao, 25);

    for sql in [
        "SELECT id FROM users ORDER BY id\nLIMIT 20",
        "SELECT id FROM users ORDER BY id\tLIMIT 20",
        "SELECT id FROM users ORDER BY id LIMIT\n20",
        "SELECT id\nFROM users\nORDER BY id\nLIMIT 20 OFFSET 2",
    ] {
        let rows = dao.query_range(sql, &[], 0, 5).unwrap();
        let ids: Vec<i64> = rows.iter().filter_map(|r| r.get_i64("id")).collect();
        let first = if sql.contains("OFFSET") { 3 } else { 1 };
        assert_eq!(ids, (first..first + 5).collect::<Vec<_>>(), "{sql:?}");
    }

    let page = dao
        .query_page("SELECT id FROM users ORDER BY id\tLIMIT 20", &[], 10, 1)
        .unwrap();
    assert_eq!(page.total_count, 20);
    let ids: Vec<i64> = page.items.iter().filter_map(|r| r.get_i64("id")).collect();
    assert_eq!(ids, (11..=20).collect::<Vec<_>>());
}

#[test]
fn test_window_over_multiline_ordered_statement() {
    let (_sources, dao) = setup_db();
    seed(&dao, 25);

    let sql = "SELECT id, name\n  FROM users\n WHERE age > ?\n ORDER BY id DESC -- newest first";
    let rows = dao.query_range(sql, &params![22], 2, 6).unwrap();
    let ids: Vec<i64> = rows.iter().filter_map(|r| r.get_i64("id")).collect();
    assert_eq!(ids, vec![23, 22, 21, 20]);

    let page = dao.query_page(sql, &params![22], 10, 2).unwrap();
    assert_eq!(page.total_count, 23);
    let ids: Vec<i64> = page.items.iter().filter_map(|r| r.get_i64("id")).collect();
    assert_eq!(ids, vec![5, 4, 3]);
}

#[test]
fn test_sole_list_parameter_is_expanded() {
    let (_sources, dao) = setup_db();
    seed(&dao, 5);

    let rows = dao
        .query(
            "SELECT id FROM users WHERE id IN (?, ?, ?) ORDER BY id",
            &[Value::from(vec![1, 3, 5])],
        )
        .unwrap();
    let ids: Vec<i64> = rows.iter().filter_map(|r| r.get_i64("id")).collect();
    assert_eq!(ids, vec![1, 3, 5]);
}

#[test]
fn test_query_as_maps_columns() {
    let (_sources, dao) = setup_db();
    dao.execute(
        "INSERT INTO users (id, name, age, active) VALUES (?, ?, ?, ?)",
        &params![1, "Alice", None::<i64>, false],
    )
    .unwrap();

    let users: Vec<User> = dao
        .query_as("SELECT id AS ID, name AS NAME, age, active FROM users", &[])
        .unwrap();
    assert_eq!(
        users,
        vec![User {
            id: 1,
            name: "Alice".to_string(),
            age: None,
            active: false,
        }]
    );
}

#[test]
fn test_insert_find_exists_delete() {
    let (_sources, dao) = setup_db();

    let row = Row::new().with("id", 7).with("name", "Grace").with("age", 41);
    assert_eq!(dao.insert(row.clone(), "users").unwrap(), 1);
    assert!(dao.exists(&row, "users").unwrap());

    let found: User = dao.find("users", 7).unwrap().unwrap();
    assert_eq!(found.name, "Grace");
    assert_eq!(found.age, Some(41));
    assert!(dao.find::<User>("users", 8).unwrap().is_none());

    assert_eq!(dao.delete(&row, "users").unwrap(), 1);
    assert!(!dao.exists(&row, "users").unwrap());

    dao.insert(row, "users").unwrap();
    assert_eq!(dao.delete_by_key("users", 7).unwrap(), 1);
    assert_eq!(count_users(&dao), 0);

    let keyless = Row::new().with("name", "Nobody");
    assert!(matches!(
        dao.exists(&keyless, "users").unwrap_err(),
        hydro_dao::DaoError::InvalidInput { .. }
    ));
}

#[test]
fn test_delete_and_exists_accept_serialized_structs() {
    let (_sources, dao) = setup_db();
    let grace = NewUser {
        id: 7,
        name: "Grace".to_string(),
        age: Some(41),
    };
    let alan = NewUser {
        id: 8,
        name: "Alan".to_string(),
        age: None,
    };
    dao.insert(Record::from_serialize(&[&grace, &alan]).unwrap(), "users")
        .unwrap();

    let record = Record::from_serialize(&grace).unwrap();
    assert!(dao.exists(record.clone(), "users").unwrap());
    assert_eq!(dao.delete(record.clone(), "users").unwrap(), 1);
    assert!(!dao.exists(record, "users").unwrap());
    assert_eq!(count_users(&dao), 1);

    let both = Record::from_serialize(&[&grace, &alan]).unwrap();
    assert!(matches!(
        dao.exists(both.clone(), "users").unwrap_err(),
        hydro_dao::DaoError::InvalidInput { .. }
    ));
    assert_eq!(dao.delete(both, "users").unwrap(), 1);
    assert_eq!(count_users(&dao), 0);
}

#[test]
fn test_find_by_key_uses_bound_table() {
    let (_sources, dao) = setup_db();
    seed(&dao, 3);

    let user: User = dao.find_by_key(2).unwrap().unwrap();
    assert_eq!(user.name, "user02");
    assert!(dao.find_by_key::<User>(9).unwrap().is_none());

    #[derive(Debug, Default)]
    struct Unbound {
        id: i64,
    }
    bindable!(Unbound { id });
    let err = dao.find_by_key::<Unbound>(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_insert_list_of_fields_uses_defaults() {
    let (_sources, dao) = setup_db();

    let users = vec![
        NewUser {
            id: 1,
            name: "Ada".to_string(),
            age: None,
        },
        NewUser {
            id: 2,
            name: "Linus".to_string(),
            age: Some(55),
        },
    ];
    let record = Record::from_serialize(&users).unwrap();
    assert_eq!(dao.insert(record, "users").unwrap(), 2);

    // A field holding NULL is left out, so the column default applies.
    let ada: User = dao.find("users", 1).unwrap().unwrap();
    assert_eq!(ada.age, Some(30));
    let linus: User = dao.find("users", 2).unwrap().unwrap();
    assert_eq!(linus.age, Some(55));

    // A map inserts NULL explicitly.
    let map = Row::new()
        .with("id", 3)
        .with("name", "Null Age")
        .with("age", Value::Null);
    dao.insert(map, "users").unwrap();
    let null_age: User = dao.find("users", 3).unwrap().unwrap();
    assert_eq!(null_age.age, None);

    assert_eq!(dao.insert(Record::List(vec![]), "users").unwrap(), 0);
}

#[test]
fn test_iterator_streams_all_rows() {
    let (_sources, dao) = setup_db();
    seed(&dao, 25);

    let mut iter = dao
        .query_iterator("SELECT id, name FROM users ORDER BY id", &[], None)
        .unwrap();
    let mut seen = 0;
    for row in iter.by_ref() {
        let row = row.unwrap();
        seen += 1;
        assert_eq!(row.get_i64("id"), Some(seen));
    }
    assert_eq!(seen, 25);
    iter.close();

    // The connection went back to the pool and is usable again.
    assert_eq!(count_users(&dao), 25);
}

#[test]
fn test_iterator_dropped_early_releases_connection() {
    let (_sources, dao) = setup_db();
    seed(&dao, 25);

    for _ in 0..10 {
        let mut iter = dao.query_iterator("SELECT * FROM users", &[], None).unwrap();
        assert!(iter.next().unwrap().is_ok());
    }
    assert_eq!(count_users(&dao), 25);
}

#[test]
fn test_iterator_batch_flushes_in_chunks() {
    let (_sources, dao) = setup_db();

    let rows = (1..=23).map(|i| params![i, format!("bulk{i}")]);
    let batch =
        IteratorBatchCommand::new("INSERT INTO users (id, name) VALUES (?, ?)", rows).batch_size(5);
    assert_eq!(dao.execute_iter_batch(batch).unwrap(), 23);
    assert_eq!(count_users(&dao), 23);
}

#[test]
fn test_execute_command() {
    let (_sources, dao) = setup_db();
    seed(&dao, 3);

    let command = Command::sql("UPDATE users SET active = ? WHERE id > ?;")
        .bind(false)
        .bind(1);
    assert_eq!(dao.execute_command(&command).unwrap(), 2);

    let inactive = dao
        .count("SELECT * FROM users WHERE active = ?", &params![false])
        .unwrap();
    assert_eq!(inactive, 2);
}

#[test]
fn test_transaction_commit_and_rollback() {
    let (_sources, dao) = setup_db();

    dao.run_transaction(IsolationLevel::Serializable, |tx| {
        tx.execute("INSERT INTO users (id, name) VALUES (1, 'a')", &[])?;
        tx.execute("INSERT INTO users (id, name) VALUES (2, 'b')", &[])?;
        Ok(())
    })
    .unwrap();
    assert_eq!(count_users(&dao), 2);

    let err = dao
        .run_transaction(IsolationLevel::default(), |tx| {
            tx.execute("INSERT INTO users (id, name) VALUES (3, 'c')", &[])?;
            // Duplicate key fails and takes the first insert with it.
            tx.execute("INSERT INTO users (id, name) VALUES (1, 'dup')", &[])
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transaction);
    assert_eq!(count_users(&dao), 2);
}

#[test]
fn test_nested_transaction_rollback() {
    let (_sources, dao) = setup_db();

    let err = dao
        .run_transaction(IsolationLevel::default(), |outer| {
            outer.execute("INSERT INTO users (id, name) VALUES (1, 'kept?')", &[])?;
            let inner = outer.run_transaction(IsolationLevel::default(), |inner| {
                inner.execute("INSERT INTO users (id, name) VALUES (1, 'dup')", &[])
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transaction);
    assert_eq!(count_users(&dao), 0);
}

#[test]
fn test_sqlite_has_no_stored_procedures() {
    let (_sources, dao) = setup_db();
    let err = dao.call("anything", &params![1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_unknown_table_is_data_access_error() {
    let (_sources, dao) = setup_db();
    let err = dao.query("SELECT * FROM missing", &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataAccess);
}

#[test]
fn test_with_connection() {
    let (sources, dao) = setup_db();
    seed(&dao, 2);

    let keys = sources
        .with_connection("test", |conn| conn.primary_keys("users"))
        .unwrap();
    assert_eq!(keys, vec!["id".to_string()]);
}
