//! `PostgresWarehouse` loads against a throwaway Postgres container.
//!
//! Run with `cargo test -p clinicmart-warehouse -- --ignored` on a host with docker.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use clinicmart_types::{DeltaWindow, Record, Table, Value};
use clinicmart_warehouse::{PostgresWarehouse, Warehouse, WarehouseConfig, WarehouseError};
use once_cell::sync::OnceCell;
use testcontainers::clients;
use testcontainers::core::WaitFor;
use testcontainers::GenericImage;
use tokio_postgres::{Client, NoTls};

static SHARED_PORT: OnceCell<u16> = OnceCell::new();
static NEXT_SCHEMA_ID: AtomicU64 = AtomicU64::new(1);

fn shared_postgres_port() -> u16 {
    *SHARED_PORT.get_or_init(|| {
        let docker: &'static clients::Cli = Box::leak(Box::new(clients::Cli::default()));
        let image = GenericImage::new("postgres", "16-alpine")
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .with_env_var("POSTGRES_DB", "postgres")
            .with_exposed_port(5432)
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ));
        let node = Box::leak(Box::new(docker.run(image)));
        node.get_host_port_ipv4(5432)
    })
}

struct Harness {
    client: Client,
    schema: String,
    warehouse: PostgresWarehouse,
}

impl Harness {
    async fn new(test_name: &str) -> Self {
        let port = shared_postgres_port();
        let (client, connection) = tokio_postgres::connect(
            &format!("host=127.0.0.1 port={port} user=postgres password=postgres dbname=postgres"),
            NoTls,
        )
        .await
        .expect("must connect to test postgres");
        tokio::spawn(async move {
            let _ = connection.await;
        });

        let schema = format!("{test_name}_{}", NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed));
        client
            .execute(&format!("CREATE SCHEMA {schema}"), &[])
            .await
            .expect("must create test schema");

        let warehouse = PostgresWarehouse::new(WarehouseConfig {
            host: "127.0.0.1".to_string(),
            port,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
            schema: schema.clone(),
            insert_chunk_rows: 2,
        });
        Self {
            client,
            schema,
            warehouse,
        }
    }

    async fn exec(&self, sql: &str) {
        let sql = sql.replace("{schema}", &self.schema);
        self.client
            .batch_execute(&sql)
            .await
            .unwrap_or_else(|e| panic!("setup statement failed: {e}\n{sql}"));
    }

    async fn ids(&self, table: &str, column: &str) -> Vec<i64> {
        self.client
            .query(
                &format!("SELECT {column} FROM {}.{table} ORDER BY {column}", self.schema),
                &[],
            )
            .await
            .expect("select must succeed")
            .iter()
            .map(|row| row.get(0))
            .collect()
    }

    async fn columns(&self, table: &str) -> Vec<String> {
        self.client
            .query(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
                &[&self.schema, &table],
            )
            .await
            .expect("column query must succeed")
            .iter()
            .map(|row| row.get(0))
            .collect()
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn window() -> DeltaWindow {
    DeltaWindow::trailing(date(10), 3)
}

fn interaction(id: i64, day: u32, price: Value) -> Record {
    Record::from_iter([
        ("interaction_id", Value::Int(id)),
        ("interaction_date", Value::Date(date(day))),
        ("price", price),
    ])
}

#[tokio::test]
#[ignore = "requires docker"]
async fn window_replace_swaps_only_rows_inside_the_window() {
    let h = Harness::new("window_replace").await;
    let prior = Table::from_rows(
        "dm",
        vec![
            interaction(1, 5, Value::Int(100)),
            interaction(2, 8, Value::Int(200)),
            interaction(3, 9, Value::Int(300)),
        ],
    );
    h.warehouse.append("dm", &prior).await.unwrap();

    let fresh = Table::from_rows("dm", vec![interaction(4, 9, Value::Int(400))]);
    let counts = h
        .warehouse
        .replace_window("dm", "interaction_date", window(), &fresh)
        .await
        .unwrap();
    assert_eq!(counts.rows_deleted, 2);
    assert_eq!(counts.rows_written, 1);
    assert_eq!(h.ids("dm", "interaction_id").await, vec![1, 4]);

    // rerunning the same window is idempotent
    h.warehouse
        .replace_window("dm", "interaction_date", window(), &fresh)
        .await
        .unwrap();
    assert_eq!(h.ids("dm", "interaction_id").await, vec![1, 4]);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn failed_insert_rolls_back_the_window_delete() {
    let h = Harness::new("window_rollback").await;
    h.exec(
        "CREATE TABLE {schema}.dm (interaction_id BIGINT, interaction_date DATE, price NUMERIC);
         INSERT INTO {schema}.dm VALUES (1, '2024-03-08', 10.5), (2, '2024-03-09', 20);",
    )
    .await;

    // the third row forces a second chunk whose numeric cast fails server-side
    let fresh = Table::from_rows(
        "dm",
        vec![
            interaction(3, 8, Value::from("12.5")),
            interaction(4, 8, Value::from("13")),
            interaction(5, 9, Value::from("not a number")),
        ],
    );
    let err = h
        .warehouse
        .replace_window("dm", "interaction_date", window(), &fresh)
        .await
        .unwrap_err();
    assert!(matches!(err, WarehouseError::Statement { .. }), "got: {err}");
    assert_eq!(h.ids("dm", "interaction_id").await, vec![1, 2]);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn replace_all_swaps_in_the_incoming_schema() {
    let h = Harness::new("replace_all").await;
    h.exec(
        "CREATE TABLE {schema}.dim_manufacturing_sku (order_id BIGINT, sku TEXT, legacy_code BIGINT);
         INSERT INTO {schema}.dim_manufacturing_sku VALUES (1, 'a', 7), (2, 'b', 8), (3, 'c', 9);",
    )
    .await;

    let mut dim = Table::new(
        "dim_manufacturing_sku",
        vec!["order_id".to_string(), "sku".to_string(), "sku_normalized".to_string()],
    );
    dim.push(Record::from_iter([
        ("order_id", Value::Int(10)),
        ("sku", Value::from(" ab cd ")),
        ("sku_normalized", Value::from("AB-CD")),
    ]));
    dim.push(Record::from_iter([
        ("order_id", Value::Int(11)),
        ("sku", Value::Null),
        ("sku_normalized", Value::Null),
    ]));

    let counts = h
        .warehouse
        .replace_all("dim_manufacturing_sku", &dim)
        .await
        .unwrap();
    assert_eq!(counts.rows_deleted, 3);
    assert_eq!(counts.rows_written, 2);
    assert_eq!(
        h.columns("dim_manufacturing_sku").await,
        ["order_id", "sku", "sku_normalized"]
    );
    assert_eq!(h.ids("dim_manufacturing_sku", "order_id").await, vec![10, 11]);
    assert!(h.columns("dim_manufacturing_sku__clinicmart_staging").await.is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn append_with_no_shared_column_fails_without_writing() {
    let h = Harness::new("append_disjoint").await;
    h.exec("CREATE TABLE {schema}.fact_appointment_flow (lead_id BIGINT);").await;

    let rows = Table::from_rows(
        "fact_appointment_flow",
        vec![Record::from_iter([("visit_id", Value::Int(1))])],
    );
    let err = h
        .warehouse
        .append("fact_appointment_flow", &rows)
        .await
        .unwrap_err();
    assert!(matches!(err, WarehouseError::NoSharedColumns { .. }), "got: {err}");
    assert!(h.ids("fact_appointment_flow", "lead_id").await.is_empty());
}
