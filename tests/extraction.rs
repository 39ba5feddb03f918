mod common;

use common::{document, engine, registry, workbook, Blank, N, T};
use payout_sheet::config::EndRowPolicy;
use payout_sheet::database::StoreError;
use payout_sheet::engine::resolver::ResolveError;
use payout_sheet::{PayoutError, PayoutRecord};
use tempfile::tempdir;

const ORDERS_CONFIG: &str = r#"{"platforms": {"swiggy": {
    "outlet_name": "Koramangala",
    "import_configs": [
        {"sheet": "Data", "range": "A1:D", "header": true}
    ],
    "export_configs": [
        {"table_name": "payout_swiggy_Data_A1_D", "reader_configs": [
            {"column_name": "final_payout_amt", "expression": "sum(amount)"},
            {"column_name": "total_orders", "expression": "count(*)"},
            {"column_name": "settlement_date", "expression": "max(settled_on)"}
        ]}
    ]
}}}"#;

fn orders(dir: &std::path::Path, file_name: &str, amounts: &[f64]) -> std::path::PathBuf {
    let mut rows = vec![vec![T("order_id"), T("item"), T("amount"), T("settled_on")]];
    for (index, amount) in amounts.iter().enumerate() {
        rows.push(vec![N(1000.0 + index as f64), T("thali"), N(*amount), T("2024-03-31")]);
    }
    workbook(dir, file_name, &[("Data", 1, rows)])
}

#[test]
fn single_section_is_summed_into_the_record() {
    let dir = tempdir().unwrap();
    let file = orders(dir.path(), "payout.xlsx", &[100.0, 200.25, 300.25, 434.0, 200.0]);
    let registry = registry(ORDERS_CONFIG);
    let plan = registry.platform("swiggy").unwrap();

    let record = engine()
        .ingest_and_project(document(1), &file, "swiggy", plan)
        .unwrap();

    assert_eq!(record.final_payout_amt, 1234.5);
    assert_eq!(record.total_orders, 5);
    assert_eq!(record.platform.as_deref(), Some("swiggy"));
    assert_eq!(record.outlet_name.as_deref(), Some("Koramangala"));
    assert_eq!(record.settlement_date.as_deref(), Some("2024-03-31"));
    assert_eq!(record.utr_number, None);
}

#[test]
fn documents_do_not_see_each_others_rows() {
    let dir = tempdir().unwrap();
    let first = orders(dir.path(), "first.xlsx", &[10.0, 20.0]);
    let second = orders(dir.path(), "second.xlsx", &[1.5]);
    let registry = registry(ORDERS_CONFIG);
    let plan = registry.platform("swiggy").unwrap();
    let engine = engine();

    let first = engine.ingest_and_project(document(1), &first, "swiggy", plan).unwrap();
    let second = engine.ingest_and_project(document(2), &second, "swiggy", plan).unwrap();

    assert_eq!(first.final_payout_amt, 30.0);
    assert_eq!(first.total_orders, 2);
    assert_eq!(second.final_payout_amt, 1.5);
    assert_eq!(second.total_orders, 1);
}

#[test]
fn documents_are_processed_concurrently() {
    let dir = tempdir().unwrap();
    let first = orders(dir.path(), "first.xlsx", &[100.0, 200.25, 300.25, 434.0, 200.0]);
    let second = orders(dir.path(), "second.xlsx", &[7.0, 3.0]);
    let registry = registry(ORDERS_CONFIG);
    let plan = registry.platform("swiggy").unwrap();
    let engine = engine();

    let (first, second) = std::thread::scope(|scope| {
        let first_engine = engine.clone();
        let second_engine = engine.clone();
        let first = scope.spawn(move || first_engine.ingest_and_project(document(11), &first, "swiggy", plan));
        let second = scope.spawn(move || second_engine.ingest_and_project(document(12), &second, "swiggy", plan));
        (first.join().unwrap().unwrap(), second.join().unwrap().unwrap())
    });

    assert_eq!(first.final_payout_amt, 1234.5);
    assert_eq!(second.final_payout_amt, 10.0);
    assert_eq!(second.total_orders, 2);
}

const SECTIONS_CONFIG: &str = r#"{"platforms": {"zomato": {
    "import_configs": [
        {"sheet": "Summary", "relative_range": {"anchor": "orders", "rows_offset": 2}, "header": true, "stop_at_empty": true},
        {"name": "orders", "sheet": "Summary", "range": "A3:C", "header": true, "stop_at_empty": true}
    ],
    "export_configs": [
        {"table_name": "payout_zomato_Summary_A3_C", "reader_configs": [
            {"column_name": "total_orders", "expression": "count(*)"},
            {"column_name": "gross_sales_amt", "expression": "sum(amount)"},
            {"column_name": "platform_commission_amt", "expression": "sum(commission)"}
        ]},
        {"table_name": "payout_zomato_Summary_", "reader_configs": [
            {"column_name": "marketing_ads_amt", "expression": "sum(adjustment)"}
        ]}
    ]
}}}"#;

fn sections(dir: &std::path::Path) -> std::path::PathBuf {
    workbook(
        dir,
        "sections.xlsx",
        &[
            ("Summary", 1, vec![vec![T("Order Report")]]),
            (
                "Summary",
                3,
                vec![
                    vec![T("order_id"), T("amount"), T("commission")],
                    vec![N(1.0), N(250.0), N(25.0)],
                    vec![N(2.0), N(150.0), N(15.0)],
                    vec![N(3.0), N(100.0), N(10.0)],
                    vec![N(4.0), N(500.0), N(50.0)],
                    vec![Blank, Blank, Blank],
                    vec![T("kind"), T("adjustment"), T("note")],
                    vec![T("ads"), N(120.0), T("banner")],
                    vec![T("ads"), N(80.0), Blank],
                ],
            ),
        ],
    )
}

#[test]
fn dependent_section_starts_after_its_anchor() {
    let dir = tempdir().unwrap();
    let file = sections(dir.path());
    // The relative import has no declared range, so it derives its table
    // name from the sheet alone.
    let registry = registry(SECTIONS_CONFIG);
    let plan = registry.platform("zomato").unwrap();
    let engine = engine();

    let imports = engine.ingest(document(5), &file, plan).unwrap();
    assert_eq!(imports.len(), 2);
    assert_eq!(imports[0].index, 1);
    assert_eq!(imports[0].rows, 4);
    assert_eq!(imports[1].index, 0);
    assert_eq!(imports[1].range.as_ref().map(ToString::to_string).as_deref(), Some("A9:C"));
    assert_eq!(imports[1].rows, 2);

    let record = engine.project(document(5), plan).unwrap();
    assert_eq!(record.total_orders, 4);
    assert_eq!(record.gross_sales_amt, 1000.0);
    assert_eq!(record.platform_commission_amt, 100.0);
    assert_eq!(record.marketing_ads_amt, 200.0);
}

#[test]
fn literal_end_row_policy_shifts_the_dependent_section() {
    let dir = tempdir().unwrap();
    let file = sections(dir.path());
    // Headerless anchor over the data rows only: four rows starting at row 4
    // end at row 8 when counted literally, so an offset of 1 lands on row 9.
    let registry = registry(
        r#"{"platforms": {"zomato": {
            "import_configs": [
                {"name": "orders", "table_name": "orders", "sheet": "Summary", "range": "A4:C", "stop_at_empty": true},
                {"table_name": "adjustments", "sheet": "Summary", "header": true, "stop_at_empty": true,
                 "relative_range": {"anchor": "orders", "rows_offset": 1, "end_row_policy": "literal"}}
            ]
        }}}"#,
    );
    let plan = registry.platform("zomato").unwrap();
    assert_eq!(
        plan.import(1).and_then(|import| import.relative_range.as_ref()).map(|relative| relative.end_row_policy),
        Some(EndRowPolicy::Literal)
    );

    let imports = engine().ingest(document(6), &file, plan).unwrap();
    assert_eq!(imports[1].range.as_ref().map(ToString::to_string).as_deref(), Some("A9:C"));
    assert_eq!(imports[1].rows, 2);
}

#[test]
fn missing_file_is_reported_before_any_import() {
    let dir = tempdir().unwrap();
    let registry = registry(ORDERS_CONFIG);
    let plan = registry.platform("swiggy").unwrap();

    let error = engine()
        .ingest_and_project(document(1), &dir.path().join("absent.xlsx"), "swiggy", plan)
        .unwrap_err();
    assert!(matches!(error, PayoutError::SourceFileMissing(_)));
}

#[test]
fn failing_import_names_platform_and_index() {
    let dir = tempdir().unwrap();
    let file = orders(dir.path(), "payout.xlsx", &[1.0]);
    let registry = registry(
        r#"{"platforms": {"swiggy": {"import_configs": [
            {"sheet": "Data", "range": "A1:D", "header": true},
            {"sheet": "Missing Sheet", "header": true}
        ]}}}"#,
    );
    let plan = registry.platform("swiggy").unwrap();

    let error = engine()
        .ingest_and_project(document(3), &file, "swiggy", plan)
        .unwrap_err();
    match &error {
        PayoutError::Step { platform, index, .. } => {
            assert_eq!(platform, "swiggy");
            assert_eq!(*index, 1);
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(matches!(
        error.root(),
        PayoutError::StoreError(StoreError::SchemaResolutionFailed { .. })
    ));
}

#[test]
fn relative_range_before_the_sheet_is_rejected() {
    let dir = tempdir().unwrap();
    let file = sections(dir.path());
    let registry = registry(
        r#"{"platforms": {"zomato": {"import_configs": [
            {"name": "orders", "sheet": "Summary", "range": "A3:C", "header": true, "stop_at_empty": true},
            {"sheet": "Summary", "header": true, "relative_range": {"anchor": 0, "rows_offset": -20}}
        ]}}}"#,
    );
    let plan = registry.platform("zomato").unwrap();

    let error = engine().ingest(document(8), &file, plan).unwrap_err();
    assert!(matches!(
        error.root(),
        PayoutError::ResolveError(ResolveError::RowOutOfBounds { row: -13 })
    ));
}

#[test]
fn record_serializes_to_the_canonical_json_shape() {
    let dir = tempdir().unwrap();
    let file = orders(dir.path(), "payout.xlsx", &[100.0, 200.25, 300.25, 434.0, 200.0]);
    let registry = registry(ORDERS_CONFIG);
    let plan = registry.platform("swiggy").unwrap();

    let record = engine()
        .ingest_and_project(document(21), &file, "swiggy", plan)
        .unwrap();
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["final_payout_amt"], 1234.5);
    assert_eq!(json["platform"], "swiggy");

    let decoded: PayoutRecord = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, record);
}
