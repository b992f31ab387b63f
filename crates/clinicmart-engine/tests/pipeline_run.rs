//! End-to-end pipeline runs against in-process sources and the memory warehouse.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clinicmart_engine::config::parser::parse_config_str;
use clinicmart_engine::{run_all, run_pipeline, validate_config, ClinicmartConfig, PipelineError};
use clinicmart_sources::{Selector, SourceAdapter, SourceKind, SourceRegistry, WindowFilter};
use clinicmart_types::{DeltaWindow, FetchResult, Record, SourceError, Table, Value};
use clinicmart_warehouse::MemoryWarehouse;

const CONFIG: &str = r#"
version: "1.0"
sources:
  appointment_db: {kind: postgres, host: h, user: u, database: appointment}
  manufacturing_db: {kind: postgres, host: h, user: u, database: manufacturing}
  sales_db: {kind: postgres, host: h, user: u, database: sales}
  insurance_api: {kind: api, url: "http://unused", api_key: k, sentinel: {insurance_status: unknown, provider: null}}
  logistics_api: {kind: api, url: "http://unused", api_key: k, sentinel: {tracking_status: N/A}}
warehouse: {host: dwh, user: loader, database: dwh}
pipelines:
  - name: appointment_flow
    extract:
      - {name: leads, source: appointment_db, table: sales_leads, columns: [lead_id, customer_name, created_at]}
      - {name: appointments, source: appointment_db, table: appointments, columns: [appointment_id, lead_id, date]}
      - name: slips
        source: appointment_db
        table: slips
        columns: [slip_id, appointment_id, total_cost, created_at]
        rename: {total_cost: invoice_total_cost, created_at: invoice_created_at}
      - {name: manufacturing_orders, source: manufacturing_db, table: manufacturing_orders, columns: [order_id, sku]}
    join:
      base: leads
      steps:
        - {table: appointments, left: lead_id}
        - {table: slips, left: appointment_id}
    rename:
      slip_id: invoice_id
    enrich:
      max_concurrency: 2
      lookups:
        - source: insurance_api
          key: customer_name
          param: customer_name
          fields: {insurance_status: insurance_status, provider: insurance_provider}
        - source: logistics_api
          key: invoice_id
          param: invoice_id
          fields: {tracking_status: logistics_status}
          on_null_key: {logistics_status: Not Applicable}
    dimension: {table: manufacturing_orders}
    load:
      fact: {table: fact_appointment_flow, policy: append}
      dimension: {table: dim_manufacturing_sku, policy: replace}

  - name: interaction_treatment_payment
    window: {lookback_days: 3}
    extract:
      - name: interaction
        source: sales_db
        table: interaction
        window_column: date
        rename: {id: interaction_id, date: interaction_date}
      - name: order_item
        source: sales_db
        table: order_item
        rename: {id: order_item_id}
      - name: slip
        source: sales_db
        table: slip
        rename: {id: slip_id, state: slip_state}
    join:
      base: interaction
      steps:
        - {table: order_item, left: interaction_id}
        - {table: slip, left: slip_id}
    derive:
      - {kind: label, target: payment_status, source: slip_state, equals: paid, then: Sudah Dibayar, otherwise: Belum Dibayar}
      - {kind: product, target: total_amount_per_treatment, left: price, right: qty}
    load:
      fact:
        table: dm_interaction_treatment_payment
        policy: replace_window
        window_column: interaction_date
        columns: [interaction_id, interaction_date, treatment_name, qty, price, total_amount_per_treatment, payment_status]
"#;

fn config() -> ClinicmartConfig {
    let config = parse_config_str(CONFIG).unwrap();
    validate_config(&config).unwrap();
    config
}

fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap()
}

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// Relational source serving fixed tables; unknown tables come back empty.
#[derive(Default)]
struct StaticSource {
    tables: BTreeMap<String, Vec<Record>>,
    calls: AtomicUsize,
    selectors: Mutex<Vec<Selector>>,
}

impl StaticSource {
    fn with(mut self, table: &str, rows: Vec<Record>) -> Self {
        self.tables.insert(table.to_string(), rows);
        self
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Postgres
    }

    async fn fetch(&self, selector: &Selector) -> FetchResult<Table> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.selectors.lock().unwrap().push(selector.clone());
        let Selector::Table { table, .. } = selector else {
            return FetchResult::failed(Table::empty("?"), SourceError::query("bad selector"));
        };
        let rows = self.tables.get(table).cloned().unwrap_or_default();
        FetchResult::success(Table::from_rows(table.as_str(), rows))
    }
}

struct DownSource;

#[async_trait]
impl SourceAdapter for DownSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Postgres
    }

    async fn fetch(&self, _selector: &Selector) -> FetchResult<Table> {
        FetchResult::failed(
            Table::empty("down"),
            SourceError::connection("connection refused"),
        )
    }
}

struct SlowSource;

#[async_trait]
impl SourceAdapter for SlowSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Postgres
    }

    async fn fetch(&self, _selector: &Selector) -> FetchResult<Table> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        FetchResult::success(Table::empty("slow"))
    }
}

/// Partner API answering from a fixed map, sentinel for anything else.
struct FakeApi {
    responses: BTreeMap<String, Record>,
    sentinel: Record,
    calls: AtomicUsize,
}

impl FakeApi {
    fn new(sentinel: Record) -> Self {
        Self {
            responses: BTreeMap::new(),
            sentinel,
            calls: AtomicUsize::new(0),
        }
    }

    fn answer(mut self, key: &str, response: Record) -> Self {
        self.responses.insert(key.to_string(), response);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for FakeApi {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    async fn fetch(&self, selector: &Selector) -> FetchResult<Table> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = match selector {
            Selector::Params(params) => params.first().map(|(_, v)| v.clone()),
            _ => None,
        };
        let sentinel = Table::from_rows("api", vec![self.sentinel.clone()]);
        match key.and_then(|k| self.responses.get(&k).cloned()) {
            Some(row) => FetchResult::success(Table::from_rows("api", vec![row])),
            None => FetchResult::failed(sentinel, SourceError::http(503, "unavailable")),
        }
    }
}

fn insurance_sentinel() -> Record {
    record(&[("insurance_status", "unknown".into()), ("provider", Value::Null)])
}

fn logistics_sentinel() -> Record {
    record(&[("tracking_status", "unknown".into())])
}

struct Harness {
    registry: SourceRegistry,
    appointment_db: Arc<StaticSource>,
    insurance: Arc<FakeApi>,
    logistics: Arc<FakeApi>,
}

fn harness(
    appointment_db: StaticSource,
    manufacturing_db: Arc<dyn SourceAdapter>,
    insurance: FakeApi,
    logistics: FakeApi,
) -> Harness {
    let appointment_db = Arc::new(appointment_db);
    let insurance = Arc::new(insurance);
    let logistics = Arc::new(logistics);
    let mut registry = SourceRegistry::new();
    registry.register("appointment_db", appointment_db.clone());
    registry.register("manufacturing_db", manufacturing_db);
    registry.register("insurance_api", insurance.clone());
    registry.register("logistics_api", logistics.clone());
    Harness {
        registry,
        appointment_db,
        insurance,
        logistics,
    }
}

fn manufacturing() -> Arc<dyn SourceAdapter> {
    Arc::new(StaticSource::default().with(
        "manufacturing_orders",
        vec![
            record(&[("order_id", Value::Int(1)), ("sku", " al kit ".into())]),
            record(&[("order_id", Value::Int(2)), ("sku", Value::Null)]),
        ],
    ))
}

#[tokio::test]
async fn lead_without_appointments_still_produces_a_row() {
    let config = config();
    let h = harness(
        StaticSource::default().with(
            "sales_leads",
            vec![record(&[("lead_id", Value::Int(1)), ("customer_name", "Ani".into())])],
        ),
        manufacturing(),
        FakeApi::new(insurance_sentinel()).answer(
            "Ani",
            record(&[("insurance_status", "active".into()), ("provider", "BPJS".into())]),
        ),
        FakeApi::new(logistics_sentinel()),
    );
    let warehouse = MemoryWarehouse::new();

    let report = run_pipeline(
        config.pipeline("appointment_flow").unwrap(),
        &h.registry,
        &warehouse,
        reference_time(),
    )
    .await
    .unwrap();

    assert_eq!(report.fact_rows, 1);
    let rows = warehouse.snapshot("fact_appointment_flow").unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get("lead_id"), &Value::Int(1));
    assert!(row.contains("appointment_id"));
    assert!(row.get("appointment_id").is_null());
    assert!(row.get("invoice_id").is_null());
    assert!(!row.contains("slip_id"));
    assert_eq!(row.get("insurance_status"), &Value::from("active"));
    assert_eq!(row.get("insurance_provider"), &Value::from("BPJS"));
    assert_eq!(row.get("logistics_status"), &Value::from("Not Applicable"));
    assert_eq!(h.logistics.calls(), 0);
    assert_eq!(h.insurance.calls(), 1);
    // one fetch per extract step
    assert_eq!(h.appointment_db.calls.load(Ordering::SeqCst), 3);
    assert!(!report.is_degraded());
}

#[tokio::test]
async fn failing_insurance_api_degrades_but_loads() {
    let config = config();
    let h = harness(
        StaticSource::default()
            .with(
                "sales_leads",
                vec![
                    record(&[
                        ("lead_id", Value::Int(1)),
                        ("customer_name", "Ani".into()),
                        ("created_at", "2020-01-01".into()),
                    ]),
                    record(&[("lead_id", Value::Int(2)), ("customer_name", "Budi".into())]),
                    record(&[("lead_id", Value::Int(3)), ("customer_name", "Ani".into())]),
                ],
            )
            .with(
                "appointments",
                vec![record(&[
                    ("appointment_id", Value::Int(10)),
                    ("lead_id", Value::Int(1)),
                    ("date", "2024-03-08".into()),
                ])],
            )
            .with(
                "slips",
                vec![record(&[
                    ("slip_id", Value::Int(100)),
                    ("appointment_id", Value::Int(10)),
                    ("total_cost", Value::Int(250_000)),
                    ("created_at", "not a date".into()),
                ])],
            ),
        manufacturing(),
        FakeApi::new(insurance_sentinel()),
        FakeApi::new(logistics_sentinel())
            .answer("100", record(&[("tracking_status", "shipped".into())])),
    );
    let warehouse = MemoryWarehouse::new();

    let report = run_pipeline(
        config.pipeline("appointment_flow").unwrap(),
        &h.registry,
        &warehouse,
        reference_time(),
    )
    .await
    .unwrap();

    let rows = warehouse.snapshot("fact_appointment_flow").unwrap();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row.get("insurance_status"), &Value::from("unknown"));
        assert!(row.get("insurance_provider").is_null());
    }
    // two distinct customers, one call each
    assert_eq!(h.insurance.calls(), 2);
    assert_eq!(h.logistics.calls(), 1);

    let invoiced = rows
        .iter()
        .find(|r| r.get("invoice_id") == &Value::Int(100))
        .unwrap();
    assert_eq!(invoiced.get("logistics_status"), &Value::from("shipped"));
    assert_eq!(invoiced.get("invoice_total_cost"), &Value::Int(250_000));
    // the slip's own timestamp, not the lead's
    assert!(invoiced.get("invoice_created_at").is_null());
    assert_eq!(
        invoiced.get("created_at"),
        &Value::Timestamp(
            NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        )
    );
    assert!(!invoiced.contains("created_at_slips"));
    assert_eq!(
        invoiced.get("date"),
        &Value::Timestamp(
            NaiveDate::from_ymd_opt(2024, 3, 8)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        )
    );

    assert!(report.is_degraded());
    assert_eq!(report.nulled_dates, 1);
    let insurance = &report.lookups[0];
    assert_eq!(insurance.distinct_keys, 2);
    assert_eq!(insurance.failed_keys, 2);
}

#[tokio::test]
async fn dimension_is_normalized_and_replaced() {
    let config = config();
    let h = harness(
        StaticSource::default(),
        manufacturing(),
        FakeApi::new(insurance_sentinel()),
        FakeApi::new(logistics_sentinel()),
    );
    let warehouse = MemoryWarehouse::new();
    warehouse
        .seed(
            "dim_manufacturing_sku",
            vec![record(&[("order_id", Value::Int(99))])],
        )
        .unwrap();

    let report = run_pipeline(
        config.pipeline("appointment_flow").unwrap(),
        &h.registry,
        &warehouse,
        reference_time(),
    )
    .await
    .unwrap();

    let dim = warehouse.snapshot("dim_manufacturing_sku").unwrap();
    assert_eq!(dim.len(), 2);
    assert_eq!(dim[0].get("sku_normalized"), &Value::from("AL-KIT"));
    assert!(dim[1].get("sku_normalized").is_null());
    assert_eq!(report.loads[1].rows_deleted, 1);
    assert_eq!(report.fact_rows, 0);
}

#[tokio::test]
async fn failed_dimension_source_keeps_previous_snapshot() {
    let config = config();
    let h = harness(
        StaticSource::default(),
        Arc::new(DownSource),
        FakeApi::new(insurance_sentinel()),
        FakeApi::new(logistics_sentinel()),
    );
    let warehouse = MemoryWarehouse::new();
    let previous = vec![record(&[("order_id", Value::Int(99)), ("sku", "OLD".into())])];
    warehouse
        .seed("dim_manufacturing_sku", previous.clone())
        .unwrap();

    let report = run_pipeline(
        config.pipeline("appointment_flow").unwrap(),
        &h.registry,
        &warehouse,
        reference_time(),
    )
    .await
    .unwrap();

    assert!(report.dimension_skipped);
    assert!(report.is_degraded());
    assert_eq!(report.loads.len(), 1);
    assert_eq!(warehouse.snapshot("dim_manufacturing_sku").unwrap(), previous);
}

#[tokio::test]
async fn missing_source_fails_before_any_fetch() {
    let config = config();
    let appointment_db = Arc::new(StaticSource::default());
    let mut registry = SourceRegistry::new();
    registry.register("appointment_db", appointment_db.clone());
    registry.register("manufacturing_db", manufacturing());
    registry.register("insurance_api", Arc::new(FakeApi::new(insurance_sentinel())));

    let err = run_pipeline(
        config.pipeline("appointment_flow").unwrap(),
        &registry,
        &MemoryWarehouse::new(),
        reference_time(),
    )
    .await
    .unwrap_err();

    assert!(err.is_config());
    assert_eq!(err.to_string(), "source 'logistics_api' is not configured");
    assert_eq!(appointment_db.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn load_failure_is_fatal_and_commits_nothing() {
    let config = config();
    let h = harness(
        StaticSource::default().with(
            "sales_leads",
            vec![record(&[("lead_id", Value::Int(1))])],
        ),
        manufacturing(),
        FakeApi::new(insurance_sentinel()),
        FakeApi::new(logistics_sentinel()),
    );
    let warehouse = MemoryWarehouse::new().failing_on("fact_appointment_flow");

    let err = run_pipeline(
        config.pipeline("appointment_flow").unwrap(),
        &h.registry,
        &warehouse,
        reference_time(),
    )
    .await
    .unwrap_err();

    assert!(err.is_load());
    assert!(warehouse.snapshot("fact_appointment_flow").unwrap().is_empty());
    assert!(warehouse.snapshot("dim_manufacturing_sku").unwrap().is_empty());
}

fn sales_db() -> Arc<StaticSource> {
    Arc::new(
        StaticSource::default()
            .with(
                "interaction",
                vec![
                    record(&[("id", Value::Int(1)), ("date", "2024-03-08 09:30:00".into())]),
                    record(&[("id", Value::Int(2)), ("date", "2024-03-09 14:00:00".into())]),
                ],
            )
            .with(
                "order_item",
                vec![
                    record(&[
                        ("id", Value::Int(11)),
                        ("interaction_id", Value::Int(1)),
                        ("slip_id", Value::Int(21)),
                        ("treatment_name", "Scaling".into()),
                        ("qty", Value::Int(2)),
                        ("price", Value::Int(150_000)),
                    ]),
                    record(&[
                        ("id", Value::Int(12)),
                        ("interaction_id", Value::Int(2)),
                        ("slip_id", Value::Int(22)),
                        ("treatment_name", "Whitening".into()),
                        ("qty", Value::Int(1)),
                        ("price", Value::Float(500_000.5)),
                    ]),
                ],
            )
            .with(
                "slip",
                vec![
                    record(&[("id", Value::Int(21)), ("state", "paid".into())]),
                    record(&[("id", Value::Int(22)), ("state", "draft".into())]),
                ],
            ),
    )
}

#[tokio::test]
async fn windowed_run_is_idempotent() {
    let config = config();
    let pipeline = config.pipeline("interaction_treatment_payment").unwrap();
    let sales = sales_db();
    let mut registry = SourceRegistry::new();
    registry.register("sales_db", sales.clone());

    let warehouse = MemoryWarehouse::new();
    let stale = |id: i64, day: u32| {
        record(&[
            ("interaction_id", Value::Int(id)),
            (
                "interaction_date",
                Value::Date(NaiveDate::from_ymd_opt(2024, 3, day).unwrap()),
            ),
        ])
    };
    warehouse
        .seed(
            "dm_interaction_treatment_payment",
            vec![stale(500, 1), stale(501, 8)],
        )
        .unwrap();

    let first = run_pipeline(pipeline, &registry, &warehouse, reference_time())
        .await
        .unwrap();
    let after_first = warehouse.snapshot("dm_interaction_treatment_payment").unwrap();
    let second = run_pipeline(pipeline, &registry, &warehouse, reference_time())
        .await
        .unwrap();
    let after_second = warehouse.snapshot("dm_interaction_treatment_payment").unwrap();

    assert_eq!(after_first, after_second);
    assert_eq!(after_second.len(), 3);
    assert_eq!(after_second[0].get("interaction_id"), &Value::Int(500));
    assert_eq!(first.loads[0].rows_deleted, 1);
    assert_eq!(second.loads[0].rows_deleted, 2);

    let window = DeltaWindow::trailing(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(), 3);
    assert_eq!(first.window, Some(window));
    let selectors = sales.selectors.lock().unwrap().clone();
    assert!(selectors.contains(&Selector::Table {
        table: "interaction".to_string(),
        filter: Some(WindowFilter {
            column: "date".to_string(),
            window,
        }),
    }));
    assert!(selectors.contains(&Selector::table("slip")));

    let paid = &after_second[1];
    assert_eq!(paid.len(), 7, "projection keeps exactly the load columns");
    assert_eq!(paid.get("payment_status"), &Value::from("Sudah Dibayar"));
    assert_eq!(paid.get("total_amount_per_treatment"), &Value::Int(300_000));
    let draft = &after_second[2];
    assert_eq!(draft.get("payment_status"), &Value::from("Belum Dibayar"));
    assert_eq!(draft.get("total_amount_per_treatment"), &Value::Float(500_000.5));
}

#[tokio::test]
async fn run_deadline_is_fatal() {
    let mut config = config();
    let pipeline = config
        .pipelines
        .iter_mut()
        .find(|p| p.name == "interaction_treatment_payment")
        .unwrap();
    pipeline.run_timeout_secs = 1;
    let pipeline = pipeline.clone();

    let mut registry = SourceRegistry::new();
    registry.register("sales_db", Arc::new(SlowSource));

    let err = run_pipeline(&pipeline, &registry, &MemoryWarehouse::new(), reference_time())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Deadline { secs: 1, .. }));
}

#[tokio::test]
async fn unknown_pipeline_selection_is_config_missing() {
    let err = run_all(
        &config(),
        &SourceRegistry::new(),
        &MemoryWarehouse::new(),
        reference_time(),
        Some("nightly_backfill"),
    )
    .await
    .unwrap_err();
    assert!(err.is_config());
    assert_eq!(err.to_string(), "pipeline 'nightly_backfill' is not configured");
}
