/// Change tracking tests
///
/// Snapshot-then-diff tracking on derived records, feeding partial updates.
/// Run with: cargo test --test change_tracking_tests

use rowkeeper::statement::build_update;
use rowkeeper::{
    Action, ChangeTracker, Connection, CrudProvider, Params, Record, SqlServer, SqliteConnection,
    Value,
};

#[derive(Debug, Clone, Default, Record)]
struct Person {
    person_id: i64,
    first_name: String,
    last_name: String,
    #[column(update_only)]
    modified_by: Option<String>,
    #[column(insert_only)]
    created_by: Option<String>,
}

#[derive(Debug, Clone, Default, Record)]
struct Reading {
    id: i64,
    value: f64,
}

fn wilbur() -> Person {
    Person {
        person_id: 42,
        first_name: "Wilbur".to_string(),
        last_name: "Wright".to_string(),
        ..Default::default()
    }
}

#[test]
fn test_single_change_produces_single_assignment() {
    let mut tracker = ChangeTracker::new(wilbur()).unwrap();
    tracker.record_mut().last_name = "Wainright".to_string();

    let changes = tracker.change_set(Action::Update);
    assert_eq!(changes.len(), 1);
    let change = changes.get("LastName").unwrap();
    assert_eq!(change.old, Value::from("Wright"));
    assert_eq!(change.new, Value::from("Wainright"));

    let stmt = build_update(tracker.metadata(), &SqlServer, Some(&changes)).unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE [Person] SET [LastName]=@LastName WHERE [PersonId]=@PersonId"
    );
}

#[test]
fn test_changes_are_reported_in_metadata_order() {
    let mut tracker = ChangeTracker::new(wilbur()).unwrap();
    tracker.record_mut().modified_by = Some("editor".to_string());
    tracker.record_mut().first_name = "Orville".to_string();
    tracker.record_mut().created_by = Some("import".to_string());

    assert_eq!(
        tracker.modified_columns(Action::Update),
        vec!["FirstName", "ModifiedBy"]
    );
    assert_eq!(
        tracker.modified_columns(Action::Insert),
        vec!["FirstName", "CreatedBy"]
    );
}

#[test]
fn test_tiny_float_change_is_detected() {
    let mut tracker = ChangeTracker::new(Reading { id: 1, value: 1e-17 }).unwrap();
    tracker.record_mut().value = 0.0;

    assert_eq!(tracker.modified_columns(Action::Update), vec!["Value"]);
    let changes = tracker.change_set(Action::Update);
    assert_eq!(changes.get("Value").unwrap().old, Value::Float(1e-17));
}

#[test]
fn test_identity_is_never_tracked() {
    let mut tracker = ChangeTracker::new(wilbur()).unwrap();
    tracker.record_mut().person_id = 7;
    assert!(!tracker.is_modified(Action::Update));
    assert!(tracker.original("PersonId").is_none());
}

#[test]
fn test_accept_changes_moves_the_baseline() {
    let mut tracker = ChangeTracker::new(wilbur()).unwrap();
    tracker.record_mut().first_name = "Orville".to_string();
    tracker.accept_changes();

    assert!(!tracker.is_modified(Action::Update));
    assert_eq!(tracker.original("FirstName"), Some(&Value::from("Orville")));

    tracker.record_mut().first_name = "Wilbur".to_string();
    assert_eq!(tracker.modified_columns(Action::Update), vec!["FirstName"]);
}

#[tokio::test]
async fn test_tracked_update_leaves_other_columns_alone() {
    let mut conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE Person (
            PersonId INTEGER PRIMARY KEY AUTOINCREMENT,
            FirstName TEXT NOT NULL,
            LastName TEXT NOT NULL,
            ModifiedBy TEXT,
            CreatedBy TEXT
        )",
    )
    .unwrap();

    let provider = CrudProvider::<Person>::new().unwrap();
    let mut person = Person {
        person_id: 0,
        created_by: Some("seed".to_string()),
        ..wilbur()
    };
    let id = provider.insert(&mut conn, &mut person).await.unwrap();

    let mut tracker = ChangeTracker::new(person).unwrap();
    tracker.record_mut().last_name = "Wainright".to_string();

    // A concurrent writer changes FirstName; the tracked update must not clobber it.
    conn.execute(
        "UPDATE Person SET FirstName=@FirstName WHERE PersonId=@Id",
        &Params::new().with_value("FirstName", "Orville").with_value("Id", id),
    )
    .await
    .unwrap();

    let changes = tracker.change_set(Action::Update);
    let affected = provider
        .update(&mut conn, tracker.record(), Some(&changes))
        .await
        .unwrap();
    assert_eq!(affected, 1);
    tracker.accept_changes();

    let stored = provider.get(&mut conn, &id).await.unwrap().unwrap();
    assert_eq!(stored.first_name, "Orville");
    assert_eq!(stored.last_name, "Wainright");
    assert_eq!(stored.created_by.as_deref(), Some("seed"));
    assert_eq!(stored.id(), id);
}
