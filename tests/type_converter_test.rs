//! Integration tests for typed row mapping over values decoded from SQLite.

use chrono::{NaiveDate, NaiveDateTime};
use hydro_dao::db::TypeConverter;
use hydro_dao::db::binding::{Bindable, BindingBuilder};
use hydro_dao::models::{DataSourceConfig, Row, Value};
use hydro_dao::{DataSources, impl_named_enum};
use tempfile::NamedTempFile;

#[derive(Debug, Default, PartialEq)]
enum Kind {
    #[default]
    Unknown,
    Deposit,
    Withdrawal,
}

impl_named_enum!(Kind {
    Unknown,
    Deposit,
    Withdrawal
});

#[derive(Debug, Default)]
struct Audited {
    id: i64,
    happened_at: Option<NaiveDateTime>,
}

impl Bindable for Audited {
    fn describe(b: &mut BindingBuilder<Self>) {
        b.field("id", |t: &mut Audited, v| t.id = v)
            .field("happened_at", |t: &mut Audited, v| t.happened_at = v);
    }
}

#[derive(Debug, Default)]
struct Event {
    audit: Audited,
    kind: Kind,
    amount: String,
    flagged: bool,
}

impl Bindable for Event {
    fn describe(b: &mut BindingBuilder<Self>) {
        b.inherit::<Audited>(|e| &mut e.audit)
            .enum_field("kind", |t: &mut Event, v| t.kind = v)
            .field("amount", |t: &mut Event, v| t.amount = v)
            .field("flagged", |t: &mut Event, v| t.flagged = v);
    }
}

fn setup_db() -> DataSources {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let config = DataSourceConfig::parse(&format!("events=sqlite:{db_path}")).unwrap();
    let sources = DataSources::new();
    sources.connect(&config).unwrap();

    let dao = sources.get_dao("events").unwrap();
    dao.execute(
        "CREATE TABLE events (
            id INTEGER PRIMARY KEY,
            kind TEXT,
            happened_at TIMESTAMP,
            amount REAL,
            flagged TEXT
        )",
        &[],
    )
    .unwrap();
    dao.execute(
        "INSERT INTO events VALUES
            (1, 'Deposit', '2024-03-01 09:30:00', 1e21, 'yes'),
            (2, 'Withdrawal', NULL, 12.5, 'off'),
            (3, 'Refund', '2024-03-02', 0.1, 'ON')",
        &[],
    )
    .unwrap();
    sources
}

#[test]
fn test_events_map_onto_structs() {
    let sources = setup_db();
    let dao = sources.get_dao("events").unwrap();

    let events: Vec<Event> = dao
        .query_as(
            "SELECT id, kind, happened_at AS HAPPENED_AT, amount, flagged, 'x' AS extra \
             FROM events ORDER BY id",
            &[],
        )
        .unwrap();
    assert_eq!(events.len(), 3);

    let deposit = &events[0];
    assert_eq!(deposit.audit.id, 1);
    assert_eq!(deposit.kind, Kind::Deposit);
    assert_eq!(deposit.amount, "1000000000000000000000");
    assert!(deposit.flagged);
    assert_eq!(
        deposit.audit.happened_at,
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
    );

    let withdrawal = &events[1];
    assert_eq!(withdrawal.kind, Kind::Withdrawal);
    assert_eq!(withdrawal.audit.happened_at, None);
    assert_eq!(withdrawal.amount, "12.5");
    assert!(!withdrawal.flagged);

    // Unknown variant leaves the field at its default; the row still maps.
    let refund = &events[2];
    assert_eq!(refund.audit.id, 3);
    assert_eq!(refund.kind, Kind::Unknown);
    assert!(refund.flagged);
}

#[test]
fn test_warnings_are_reported_once_per_batch() {
    let converter = TypeConverter::new();
    let rows: Vec<Row> = (0..50)
        .map(|i| {
            Row::new()
                .with("id", i)
                .with("kind", "Sideways")
                .with("no_such_column", true)
        })
        .collect();

    let (events, warnings) = converter.convert_rows_with_warnings::<Event>(&rows);
    assert_eq!(events.len(), 50);
    assert_eq!(events[49].audit.id, 49);
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().any(|w| w.contains("no_such_column")));
    assert!(warnings.iter().any(|w| w.contains("kind")));
}

#[test]
fn test_null_leaves_field_untouched() {
    let converter = TypeConverter::new();
    let row = Row::new()
        .with("id", 5)
        .with("amount", Value::Null)
        .with("flagged", Value::Null);
    let event: Event = converter.convert_row(&row);
    assert_eq!(event.audit.id, 5);
    assert_eq!(event.amount, "");
    assert!(!event.flagged);
}
