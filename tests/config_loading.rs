use payout_sheet::config::{ConfigError, ConfigRef, PayoutConfigs};
use std::fs;
use tempfile::tempdir;

const LEGACY_CONFIG: &str = r#"{
  "platforms": {
    "swiggy": {
      "import_configs": [
        {"table_name": "", "sheet": "Order Level", "range": "A3:AR", "header": true,
         "relative_range": {"relative_config_index": 0, "rows_offset": 0}},
        {"table_name": "", "sheet": "Payout Breakup", "range": "A2:C", "header": true,
         "relative_range": {"relative_config_index": 0, "rows_offset": 2}},
        {"table_name": "", "sheet": "Payout Breakup", "all_varchar": true,
         "relative_range": {"relative_config_index": 1, "rows_offset": 3}}
      ],
      "export_configs": [
        {"table_name": "payout_swiggy_Order_Level_A3_AR", "reader_configs": [
          {"column_name": "total_orders", "expression": "count(*)"}
        ]}
      ]
    }
  }
}"#;

#[test]
fn config_file_is_loaded_and_validated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("payout_configs.json");
    fs::write(&path, LEGACY_CONFIG).unwrap();

    let registry = PayoutConfigs::load(&path).unwrap();
    let plan = registry.platform("swiggy").unwrap();

    // Legacy index 0 means "no dependency"; index 1 anchors on the second import.
    assert_eq!(plan.import(0).unwrap().relative_range, None);
    assert_eq!(plan.import(1).unwrap().relative_range, None);
    assert_eq!(
        plan.import(2).unwrap().relative_range.as_ref().map(|relative| &relative.anchor),
        Some(&ConfigRef::Index(1))
    );
    assert_eq!(plan.order(), &[0, 1, 2]);
    assert_eq!(plan.table(0), Some("payout_swiggy_Order_Level_A3_AR"));
    assert_eq!(plan.table(1), Some("payout_swiggy_Payout_Breakup_A2_C"));
    assert_eq!(plan.table(2), Some("payout_swiggy_Payout_Breakup_"));
    assert!(registry.tables().contains("PAYOUT_SWIGGY_ORDER_LEVEL_A3_AR"));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let error = PayoutConfigs::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(error, ConfigError::Io { .. }));
}

#[test]
fn malformed_json_is_rejected() {
    let error = PayoutConfigs::from_json(r#"{"platforms": {"swiggy": {"import_configs": [}}}"#).unwrap_err();
    assert!(matches!(error, ConfigError::Json(_)));
}

#[test]
fn tables_are_unique_across_platforms() {
    let error = PayoutConfigs::from_json(
        r#"{"platforms": {
            "swiggy": {"import_configs": [{"table_name": "orders", "sheet": "A"}]},
            "zomato": {"import_configs": [{"table_name": "orders", "sheet": "B"}]}
        }}"#,
    )
    .unwrap()
    .validate()
    .unwrap_err();
    assert!(matches!(
        error,
        ConfigError::TableNameCollision { ref platform, ref owner, .. } if platform == "zomato" && owner == "swiggy"
    ));
}

#[test]
fn relative_sections_on_one_sheet_need_explicit_tables() {
    let error = PayoutConfigs::from_json(
        r#"{"platforms": {"swiggy": {"import_configs": [
            {"sheet": "Breakup", "range": "A2:C", "header": true},
            {"sheet": "Breakup", "relative_range": {"anchor": 0, "rows_offset": 2}},
            {"sheet": "Breakup", "relative_range": {"anchor": 1, "rows_offset": 2}}
        ]}}}"#,
    )
    .unwrap()
    .validate()
    .unwrap_err();
    assert!(matches!(
        error,
        ConfigError::DerivedTableCollision { ref table, ref platform }
            if table == "payout_swiggy_Breakup_" && platform == "swiggy"
    ));

    let registry = PayoutConfigs::from_json(
        r#"{"platforms": {"swiggy": {"import_configs": [
            {"sheet": "Breakup", "range": "A2:C", "header": true},
            {"sheet": "Breakup", "table_name": "adjustments", "relative_range": {"anchor": 0, "rows_offset": 2}},
            {"sheet": "Breakup", "table_name": "taxes", "relative_range": {"anchor": 1, "rows_offset": 2}}
        ]}}}"#,
    )
    .unwrap()
    .validate()
    .unwrap();
    assert_eq!(registry.platform("swiggy").unwrap().table(2), Some("taxes"));
}

#[test]
fn named_anchor_must_exist() {
    let error = PayoutConfigs::from_json(
        r#"{"platforms": {"swiggy": {"import_configs": [
            {"sheet": "A", "range": "A1:B"},
            {"sheet": "A", "relative_range": {"anchor": "summary", "rows_offset": 1}}
        ]}}}"#,
    )
    .unwrap()
    .validate()
    .unwrap_err();
    assert!(matches!(
        error,
        ConfigError::UnresolvedRelativeRange { index: 1, ref anchor, .. } if anchor == "summary"
    ));
}

#[test]
fn duplicate_import_names_are_rejected() {
    let error = PayoutConfigs::from_json(
        r#"{"platforms": {"swiggy": {"import_configs": [
            {"name": "orders", "sheet": "A", "range": "A1:B"},
            {"name": "orders", "sheet": "B", "range": "A1:B"}
        ]}}}"#,
    )
    .unwrap()
    .validate()
    .unwrap_err();
    assert!(matches!(error, ConfigError::DuplicateImportName { .. }));
}
