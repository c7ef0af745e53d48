/// Audit trail tests
///
/// Versioned, transactional column-level history written by
/// `LoggedChangeTracker`.
/// Run with: cargo test --test audit_tests

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rowkeeper::{
    AuditConfig, AuditTrail, Connection, CrudProvider, DbError, LoggedChangeTracker, Params,
    Record, Result, SqlEnum, SqliteConnection, StaticUser, TextLookup, Value,
};

const SCHEMA: &str = r#"
    CREATE TABLE Region (Id INTEGER PRIMARY KEY, Name TEXT NOT NULL);
    INSERT INTO Region (Id, Name) VALUES (1, 'North'), (2, 'South');
    CREATE TABLE Accounts (
        Id INTEGER PRIMARY KEY AUTOINCREMENT,
        Owner TEXT NOT NULL,
        Status INTEGER NOT NULL,
        RegionId INTEGER,
        Nickname TEXT
    );
    CREATE TABLE Shipment (
        Id INTEGER PRIMARY KEY AUTOINCREMENT,
        CarrierId INTEGER NOT NULL
    );
    CREATE TABLE Parcel (
        Id INTEGER PRIMARY KEY AUTOINCREMENT,
        DepotId INTEGER NOT NULL
    );
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, SqlEnum)]
enum Status {
    #[default]
    Active,
    Suspended,
    Closed = 9,
}

#[derive(Debug, Clone, Default, Record)]
#[record(table = "Accounts")]
struct Account {
    id: i64,
    owner: String,
    #[column(symbolic)]
    status: Status,
    #[column(lookup = "Region")]
    region_id: Option<i64>,
    nickname: Option<String>,
}

#[derive(Debug, Clone, Default, Record)]
#[record(text_lookup)]
struct Shipment {
    id: i64,
    #[column(lookup = "Carrier")]
    carrier_id: i64,
}

#[async_trait]
impl TextLookup for Shipment {
    async fn lookup_text(
        &self,
        _conn: &mut dyn Connection,
        column: &str,
        key: &Value,
    ) -> Result<Option<String>> {
        Ok(Some(format!("{} #{}", column, key)))
    }
}

/// Lookup column whose reference table does not exist.
#[derive(Debug, Clone, Default, Record)]
struct Parcel {
    id: i64,
    #[column(lookup = "Depot")]
    depot_id: i64,
}

fn pinned() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(3, 4, 5)
        .unwrap()
}

async fn setup(config: AuditConfig) -> (SqliteConnection, AuditTrail) {
    let mut conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    let trail = AuditTrail::initialize(&mut conn, config).await.unwrap();
    (conn, trail)
}

async fn insert_account(conn: &mut SqliteConnection) -> Account {
    let provider = CrudProvider::<Account>::new().unwrap();
    let mut account = Account {
        owner: "alice".to_string(),
        status: Status::Active,
        region_id: Some(1),
        nickname: None,
        ..Default::default()
    };
    provider.insert(conn, &mut account).await.unwrap();
    account
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let (mut conn, _) = setup(AuditConfig::default()).await;
    let again = AuditTrail::initialize(&mut conn, AuditConfig::default()).await;
    assert!(again.is_ok());

    let invalid = AuditTrail::initialize(&mut conn, AuditConfig::new().history_table("")).await;
    assert!(matches!(invalid, Err(DbError::Configuration(_))));
}

#[tokio::test]
async fn test_save_renders_symbolic_lookup_and_null_values() {
    let (mut conn, trail) = setup(AuditConfig::default()).await;
    let provider = CrudProvider::<Account>::new().unwrap();
    let account = insert_account(&mut conn).await;
    let user = StaticUser::new("auditor").at(pinned());

    let mut tracker = LoggedChangeTracker::new(account).unwrap();
    tracker.record_mut().status = Status::Suspended;
    tracker.record_mut().region_id = Some(2);
    tracker.record_mut().nickname = Some("Ace".to_string());

    let version = tracker
        .update_and_save(&mut conn, &provider, &trail, &user)
        .await
        .unwrap();
    assert_eq!(version, Some(1));
    assert!(!conn.in_transaction());

    let id = tracker.record().id;
    let history = trail.history(&mut conn, "Accounts", id).await.unwrap();
    let rendered: Vec<(&str, &str, &str)> = history
        .iter()
        .map(|h| (h.column_name.as_str(), h.old_value.as_str(), h.new_value.as_str()))
        .collect();
    assert_eq!(
        rendered,
        vec![
            ("Status", "Active", "Suspended"),
            ("RegionId", "North", "South"),
            ("Nickname", "<null>", "Ace"),
        ]
    );
    assert!(history.iter().all(|h| h.version == 1));
    assert!(history.iter().all(|h| h.user_name == "auditor"));
    assert!(history.iter().all(|h| h.changed_at == pinned()));

    let stored = provider.get(&mut conn, &id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Suspended);
    assert_eq!(stored.nickname.as_deref(), Some("Ace"));
}

#[tokio::test]
async fn test_n_saves_give_version_n() {
    let (mut conn, trail) = setup(AuditConfig::default()).await;
    let account = insert_account(&mut conn).await;
    let id = account.id;
    let user = StaticUser::new("auditor");

    let mut tracker = LoggedChangeTracker::new(account).unwrap();
    for n in 1..=3 {
        tracker.record_mut().owner = format!("owner-{}", n);
        let version = tracker.save(&mut conn, &trail, &user).await.unwrap();
        assert_eq!(version, Some(n));
    }

    assert_eq!(trail.current_version(&mut conn, "Accounts", id).await.unwrap(), Some(3));

    let history = trail.history(&mut conn, "Accounts", id).await.unwrap();
    let mut versions: Vec<i64> = history.iter().map(|h| h.version).collect();
    versions.dedup();
    assert_eq!(versions, vec![1, 2, 3]);
    assert_eq!(history[0].old_value, "alice");
    assert_eq!(history[2].new_value, "owner-3");
}

#[tokio::test]
async fn test_unchanged_save_is_skipped_by_default() {
    let (mut conn, trail) = setup(AuditConfig::default()).await;
    let account = insert_account(&mut conn).await;
    let id = account.id;

    let mut tracker = LoggedChangeTracker::new(account).unwrap();
    let version = tracker
        .save(&mut conn, &trail, &StaticUser::new("auditor"))
        .await
        .unwrap();
    assert_eq!(version, None);
    assert_eq!(trail.current_version(&mut conn, "Accounts", id).await.unwrap(), None);
}

#[tokio::test]
async fn test_unchanged_save_bumps_version_when_configured() {
    let (mut conn, trail) = setup(AuditConfig::new().version_empty_saves(true)).await;
    let account = insert_account(&mut conn).await;
    let id = account.id;

    let mut tracker = LoggedChangeTracker::new(account).unwrap();
    let version = tracker
        .save(&mut conn, &trail, &StaticUser::new("auditor"))
        .await
        .unwrap();
    assert_eq!(version, Some(1));
    assert!(trail.history(&mut conn, "Accounts", id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failure_rolls_back_version_and_update() {
    let (mut conn, trail) = setup(AuditConfig::default()).await;
    let provider = CrudProvider::<Account>::new().unwrap();
    let account = insert_account(&mut conn).await;
    let id = account.id;

    conn.execute_batch("DROP TABLE ChangeHistory").unwrap();

    let mut tracker = LoggedChangeTracker::new(account).unwrap();
    tracker.record_mut().owner = "mallory".to_string();
    let err = tracker
        .update_and_save(&mut conn, &provider, &trail, &StaticUser::new("auditor"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Sqlite(_)));
    assert!(!conn.in_transaction());

    assert_eq!(trail.current_version(&mut conn, "Accounts", id).await.unwrap(), None);
    let stored = provider.get(&mut conn, &id).await.unwrap().unwrap();
    assert_eq!(stored.owner, "alice");

    // The change is still pending on the tracker.
    assert_eq!(
        tracker.tracker().modified_columns(rowkeeper::Action::Update),
        vec!["Owner"]
    );
}

#[tokio::test]
async fn test_save_joins_an_open_transaction() {
    let (mut conn, trail) = setup(AuditConfig::default()).await;
    let account = insert_account(&mut conn).await;
    let id = account.id;

    let mut tracker = LoggedChangeTracker::new(account).unwrap();
    tracker.record_mut().owner = "bob".to_string();

    conn.begin().await.unwrap();
    let version = tracker
        .save(&mut conn, &trail, &StaticUser::new("auditor"))
        .await
        .unwrap();
    assert_eq!(version, Some(1));
    assert!(conn.in_transaction());
    conn.rollback().await.unwrap();

    assert_eq!(trail.current_version(&mut conn, "Accounts", id).await.unwrap(), None);
}

#[tokio::test]
async fn test_record_text_lookup_takes_precedence() {
    let (mut conn, trail) = setup(AuditConfig::default()).await;
    let provider = CrudProvider::<Shipment>::new().unwrap();

    let mut shipment = Shipment {
        carrier_id: 7,
        ..Default::default()
    };
    let id = provider.insert(&mut conn, &mut shipment).await.unwrap();

    let mut tracker = LoggedChangeTracker::new(shipment).unwrap();
    tracker.record_mut().carrier_id = 8;
    tracker
        .save(&mut conn, &trail, &StaticUser::new("auditor"))
        .await
        .unwrap();

    let history = trail.history(&mut conn, "Shipment", id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_value, "CarrierId #7");
    assert_eq!(history[0].new_value, "CarrierId #8");
}

#[tokio::test]
async fn test_failed_lookup_returns_storage_error_and_rolls_back() {
    let (mut conn, trail) = setup(AuditConfig::default()).await;
    let provider = CrudProvider::<Parcel>::new().unwrap();

    let mut parcel = Parcel {
        depot_id: 1,
        ..Default::default()
    };
    let id = provider.insert(&mut conn, &mut parcel).await.unwrap();

    let mut tracker = LoggedChangeTracker::new(parcel).unwrap();
    tracker.record_mut().depot_id = 2;
    let err = tracker
        .save(&mut conn, &trail, &StaticUser::new("auditor"))
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Sqlite(_)));
    assert!(!conn.in_transaction());
    assert_eq!(trail.current_version(&mut conn, "Parcel", id).await.unwrap(), None);
    assert!(trail.history(&mut conn, "Parcel", id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unsaved_record_cannot_be_audited() {
    let (mut conn, trail) = setup(AuditConfig::default()).await;

    let mut tracker = LoggedChangeTracker::new(Account::default()).unwrap();
    tracker.record_mut().owner = "ghost".to_string();
    let err = tracker
        .save(&mut conn, &trail, &StaticUser::new("auditor"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Configuration(_)));
    assert!(!conn.in_transaction());
}

#[tokio::test]
async fn test_custom_tables_and_placeholder() {
    let config = AuditConfig::new()
        .history_table("AuditLog")
        .version_table("AuditVersion")
        .null_placeholder("(none)");
    let (mut conn, trail) = setup(config).await;
    let account = insert_account(&mut conn).await;
    let id = account.id;

    let mut tracker = LoggedChangeTracker::new(account).unwrap();
    tracker.record_mut().region_id = None;
    tracker
        .save(&mut conn, &trail, &StaticUser::new("auditor"))
        .await
        .unwrap();

    let history = trail.history(&mut conn, "Accounts", id).await.unwrap();
    assert_eq!(history[0].old_value, "North");
    assert_eq!(history[0].new_value, "(none)");

    let logged = conn
        .query_scalar("SELECT COUNT(*) FROM AuditLog", &Params::new())
        .await
        .unwrap();
    assert_eq!(logged, Some(Value::Integer(1)));
}

#[tokio::test]
async fn test_symbolic_enum_round_trips_ordinals() {
    use rowkeeper::{SqlValue, Symbolic};

    assert_eq!(Status::Closed.to_value(), Value::Integer(9));
    assert_eq!(Status::from_value(Value::Integer(1)).unwrap(), Status::Suspended);
    assert_eq!(Status::symbol_of(&Value::Integer(9)), Some("Closed"));
    assert!(Status::from_value(Value::Integer(5)).is_err());
}
