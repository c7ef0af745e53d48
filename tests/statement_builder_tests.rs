/// Statement builder tests
///
/// SQL text produced from derived record metadata, for both dialects.
/// Run with: cargo test --test statement_builder_tests

use chrono::NaiveDateTime;
use rowkeeper::metadata::resolve;
use rowkeeper::statement::{
    build_delete, build_exists_by_id, build_insert, build_select_by_id,
    build_select_by_properties, build_update,
};
use rowkeeper::{Action, ChangeSet, DbError, Record, SqlServer, Sqlite, Value};

#[derive(Debug, Clone, Default, Record)]
struct Greeting {
    id: i64,
    message: String,
    current_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, Record)]
#[record(
    table = "Sales.Invoice",
    select_from = "Sales.InvoiceView v",
    select_where = "v.InvoiceNo=@id"
)]
struct Invoice {
    #[column(identity, name = "InvoiceNo")]
    number: i32,
    #[column(key)]
    customer: String,
    #[column(insert_only)]
    created_by: String,
    #[column(update_only)]
    modified_by: Option<String>,
    #[column(read_only)]
    total: f64,
    #[column(skip)]
    cached: Vec<u8>,
}

#[test]
fn test_greeting_insert_for_sql_server() {
    let meta = resolve::<Greeting>().unwrap();
    let stmt = build_insert(&meta, &SqlServer).unwrap();
    assert_eq!(
        stmt.sql,
        "INSERT INTO [Greeting] ([Message], [CurrentTime]) VALUES (@Message, @CurrentTime); SELECT CAST(SCOPE_IDENTITY() AS BIGINT)"
    );
    assert_eq!(stmt.parameters, vec!["Message", "CurrentTime"]);
}

#[test]
fn test_greeting_update_for_sql_server() {
    let meta = resolve::<Greeting>().unwrap();
    let stmt = build_update(&meta, &SqlServer, None).unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE [Greeting] SET [Message]=@Message, [CurrentTime]=@CurrentTime WHERE [Id]=@Id"
    );
    assert_eq!(stmt.parameters, vec!["Message", "CurrentTime", "Id"]);
}

#[test]
fn test_greeting_select_and_delete_for_sqlite() {
    let meta = resolve::<Greeting>().unwrap();
    assert_eq!(
        build_select_by_id(&meta, &Sqlite).unwrap().sql,
        r#"SELECT * FROM "Greeting" WHERE "Id"=@id"#
    );
    assert_eq!(
        build_delete(&meta, &Sqlite).unwrap().sql,
        r#"DELETE FROM "Greeting" WHERE "Id"=@id"#
    );
}

#[test]
fn test_derived_metadata_honours_column_attributes() {
    let meta = resolve::<Invoice>().unwrap();

    assert_eq!(meta.table(), "Sales.Invoice");
    assert_eq!(meta.identity().unwrap().column, "InvoiceNo");
    assert_eq!(meta.insert_columns(), vec!["Customer", "CreatedBy"]);
    assert_eq!(meta.update_columns(), vec!["Customer", "ModifiedBy"]);
    assert_eq!(meta.key_columns(), vec!["Customer"]);
    assert!(meta.column("Total").is_none());
    assert!(meta.column("Cached").is_none());
}

#[test]
fn test_schema_qualified_insert() {
    let meta = resolve::<Invoice>().unwrap();
    let stmt = build_insert(&meta, &SqlServer).unwrap();
    assert_eq!(
        stmt.sql,
        "INSERT INTO [Sales].[Invoice] ([Customer], [CreatedBy]) VALUES (@Customer, @CreatedBy); SELECT CAST(SCOPE_IDENTITY() AS BIGINT)"
    );
}

#[test]
fn test_select_override_replaces_from_and_where() {
    let meta = resolve::<Invoice>().unwrap();

    let by_id = build_select_by_id(&meta, &SqlServer).unwrap();
    assert_eq!(by_id.sql, "SELECT * FROM Sales.InvoiceView v WHERE v.InvoiceNo=@id");

    let exists = build_exists_by_id(&meta, &SqlServer).unwrap();
    assert_eq!(
        exists.sql,
        "SELECT CASE WHEN EXISTS (SELECT 1 FROM Sales.InvoiceView v WHERE v.InvoiceNo=@id) THEN 1 ELSE 0 END"
    );

    let by_customer = build_select_by_properties(&meta, &SqlServer, &["Customer"]).unwrap();
    assert_eq!(
        by_customer.sql,
        "SELECT * FROM Sales.InvoiceView v WHERE [Customer]=@Customer"
    );
}

#[test]
fn test_update_restricted_to_change_set() {
    let meta = resolve::<Invoice>().unwrap();
    let changes = ChangeSet::new().with_change(
        "ModifiedBy",
        Value::Null,
        Value::from("clerk"),
    );
    let stmt = build_update(&meta, &SqlServer, Some(&changes)).unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE [Sales].[Invoice] SET [ModifiedBy]=@ModifiedBy WHERE [InvoiceNo]=@InvoiceNo"
    );
}

#[test]
fn test_insert_only_column_cannot_be_updated() {
    let meta = resolve::<Invoice>().unwrap();
    let changes = ChangeSet::new().with_change("CreatedBy", Value::from("a"), Value::from("b"));
    let err = build_update(&meta, &SqlServer, Some(&changes)).unwrap_err();
    assert!(matches!(err, DbError::UnknownColumn(column, _) if column == "CreatedBy"));
}

#[test]
fn test_record_values_follow_column_names() {
    let invoice = Invoice {
        number: 12,
        customer: "ACME".to_string(),
        total: 99.5,
        ..Default::default()
    };
    assert_eq!(invoice.id(), 12);
    assert_eq!(invoice.value("Customer"), Some(Value::from("ACME")));
    assert_eq!(invoice.value("ModifiedBy"), Some(Value::Null));
    assert_eq!(invoice.value("Cached"), None);

    let meta = resolve::<Invoice>().unwrap();
    let insertable: Vec<&str> = meta
        .columns_for(Action::Insert)
        .map(|c| c.column.as_str())
        .collect();
    assert_eq!(insertable, vec!["Customer", "CreatedBy"]);
}
