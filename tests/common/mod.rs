#![allow(dead_code)]

use payout_sheet::{DocumentId, PayoutConfigs, PayoutEngine, PayoutRegistry, PayoutStore};
use rust_xlsxwriter::{Workbook, Worksheet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A cell value written by the fixtures.
#[derive(Clone, Copy, Debug)]
pub enum Value<'a> {
    Text(&'a str),
    Number(f64),
    Blank,
}

pub use Value::{Blank, Number as N, Text as T};

/// Writes rows starting at a 1-based Excel row, column A onwards.
pub fn write_rows(worksheet: &mut Worksheet, first_row: u32, rows: &[Vec<Value>]) {
    for (offset, row) in rows.iter().enumerate() {
        let excel_row = first_row - 1 + offset as u32;
        for (column, value) in row.iter().enumerate() {
            match value {
                Value::Text(text) => {
                    worksheet.write_string(excel_row, column as u16, *text).unwrap();
                }
                Value::Number(number) => {
                    worksheet.write_number(excel_row, column as u16, *number).unwrap();
                }
                Value::Blank => {}
            }
        }
    }
}

/// Saves a workbook with one sheet per `(name, first_row, rows)` block.
/// Blocks naming the same sheet are written into it.
pub fn workbook(dir: &Path, file_name: &str, blocks: &[(&str, u32, Vec<Vec<Value>>)]) -> PathBuf {
    let mut workbook = Workbook::new();
    let mut names: Vec<&str> = Vec::new();
    for (name, _, _) in blocks {
        if !names.contains(name) {
            names.push(*name);
            workbook.add_worksheet().set_name(*name).unwrap();
        }
    }
    for (name, first_row, rows) in blocks {
        let worksheet = workbook.worksheet_from_name(name).unwrap();
        write_rows(worksheet, *first_row, rows);
    }
    let path = dir.join(file_name);
    workbook.save(&path).unwrap();
    path
}

pub fn registry(json: &str) -> PayoutRegistry {
    PayoutConfigs::from_json(json).unwrap().validate().unwrap()
}

pub fn engine() -> PayoutEngine {
    payout_sheet::logging::init_test();
    PayoutEngine::new(Arc::new(PayoutStore::open_in_memory().unwrap()))
}

pub fn document(id: i64) -> DocumentId {
    DocumentId::try_from(id).unwrap()
}
