//! Dataset files
//!
//! Layout: `{directory}/{market}/{name}.{ext}`, one file per category plus
//! one consolidated file named after the market. JSON keeps the nested tree;
//! CSV flattens it to one tab-separated row per item.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::crawl::MarketData;

/// Columns every flattened row starts with, ahead of the item fields.
pub const LEAD_COLUMNS: [&str; 4] = ["Market", "CategoryName", "SubCategoryName", "ProductName"];

/// On-disk dataset format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    /// Tab-separated, one row per item
    Csv,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// Replace every run of characters outside `[A-Za-z0-9]` with one space.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push(' ');
            in_run = true;
        }
    }
    out
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn flatten_object(prefix: &str, map: &Map<String, Value>, out: &mut Vec<(String, String)>) {
    for (key, value) in map {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten_object(&key, inner, out),
            other => out.push((key, cell(other))),
        }
    }
}

/// Header and rows for the tabular form of `data`.
///
/// Item fields follow the lead columns in the order they are first seen.
/// Nested objects become dotted columns; an item field that shares a name
/// with a lead column is dropped.
pub fn flatten(data: &MarketData) -> (Vec<String>, Vec<Vec<String>>) {
    let mut columns: Vec<String> = LEAD_COLUMNS.iter().map(|c| c.to_string()).collect();
    let mut index: HashMap<String, usize> =
        columns.iter().enumerate().map(|(i, c)| (c.clone(), i)).collect();

    let mut records = Vec::new();
    for category in &data.categories {
        for sub in &category.sub_categories {
            for product in &sub.products {
                for item in &product.items {
                    let mut fields = Vec::new();
                    flatten_object("", item, &mut fields);
                    for (key, _) in &fields {
                        if !index.contains_key(key) {
                            index.insert(key.clone(), columns.len());
                            columns.push(key.clone());
                        }
                    }
                    let lead = [&data.market, &category.name, &sub.name, &product.name];
                    records.push((lead, fields));
                }
            }
        }
    }

    let rows = records
        .into_iter()
        .map(|(lead, fields)| {
            let mut row = vec![String::new(); columns.len()];
            for (slot, value) in row.iter_mut().zip(lead) {
                slot.clone_from(value);
            }
            for (key, value) in fields {
                if let Some(&i) = index.get(&key) {
                    if i >= LEAD_COLUMNS.len() {
                        row[i] = value;
                    }
                }
            }
            row
        })
        .collect();
    (columns, rows)
}

fn to_tsv(data: &MarketData) -> io::Result<Vec<u8>> {
    let (columns, rows) = flatten(data);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    writer.write_record(&columns)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.into_inner().map_err(|e| e.into_error())
}

/// Writes datasets under one output directory in one format.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    directory: PathBuf,
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(directory: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            directory: directory.into(),
            format,
        }
    }

    pub fn path_for(&self, market: &str, name: &str) -> PathBuf {
        self.directory
            .join(market)
            .join(format!("{}.{}", sanitize_name(name), self.format.extension()))
    }

    /// Encode `data` in the writer's format and write it for `market`/`name`.
    pub fn write(&self, market: &str, name: &str, data: &MarketData) -> common::Result<PathBuf> {
        let bytes = match self.format {
            OutputFormat::Json => serde_json::to_vec(data).map_err(io::Error::from)?,
            OutputFormat::Csv => to_tsv(data)?,
        };
        self.write_bytes(market, name, &bytes)
    }

    /// Write already encoded bytes, creating the market directory.
    pub fn write_bytes(&self, market: &str, name: &str, bytes: &[u8]) -> common::Result<PathBuf> {
        let path = self.path_for(market, name);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, bytes)?;
        info!(
            market,
            name,
            format = self.format.extension(),
            path = %path.display(),
            bytes = bytes.len(),
            "saved dataset"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::{CategoryData, ProductData, SubCategoryData};
    use serde_json::json;

    fn item(value: Value) -> catalog_fetch::Item {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn sample() -> MarketData {
        MarketData {
            market: "FMCG".into(),
            categories: vec![CategoryData {
                name: "Dairy & Eggs".into(),
                sub_categories: vec![SubCategoryData {
                    name: "Milk".into(),
                    products: vec![
                        ProductData {
                            name: "Toned Milk".into(),
                            items: vec![
                                item(json!({ "Name": "m1", "Price": 42, "Seller": { "City": "Pune" } })),
                                item(json!({ "Name": "m2", "Price": null })),
                            ],
                        },
                        ProductData {
                            name: "Curd".into(),
                            items: vec![item(json!({ "Name": "c1", "Tags": ["fresh"], "Market": "x" }))],
                        },
                    ],
                }],
            }],
        }
    }

    #[test]
    fn sanitize_collapses_runs() {
        assert_eq!(sanitize_name("Fruits & Vegetables"), "Fruits Vegetables");
        assert_eq!(sanitize_name("Home/Kitchen--Dining"), "Home Kitchen Dining");
        assert_eq!(sanitize_name("Staples"), "Staples");
        assert_eq!(sanitize_name("(Snacks)"), " Snacks ");
        assert_eq!(sanitize_name("Café"), "Caf ");
    }

    #[test]
    fn path_is_market_dir_plus_sanitized_name() {
        let writer = OutputWriter::new("/data", OutputFormat::Json);
        assert_eq!(
            writer.path_for("FMCG", "Fruits & Veg"),
            PathBuf::from("/data/FMCG/Fruits Veg.json")
        );
        let writer = OutputWriter::new("/data", OutputFormat::Csv);
        assert_eq!(
            writer.path_for("FMCG", "Fruits & Veg"),
            PathBuf::from("/data/FMCG/Fruits Veg.csv")
        );
    }

    #[test]
    fn write_creates_directories_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path().join("out"), OutputFormat::Json);

        let data = MarketData {
            market: "FMCG".into(),
            categories: vec![],
        };
        let path = writer.write("FMCG", "Dairy & Eggs", &data).unwrap();

        assert_eq!(path, dir.path().join("out/FMCG/Dairy Eggs.json"));
        let written: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, json!({ "Market": "FMCG", "Category": [] }));
    }

    #[test]
    fn write_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), OutputFormat::Json);

        writer.write_bytes("M", "a", b"[1]").unwrap();
        let path = writer.write_bytes("M", "a", b"[2]").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "[2]");
    }

    #[test]
    fn flatten_puts_lead_columns_first() {
        let (columns, rows) = flatten(&sample());
        assert_eq!(
            columns,
            vec![
                "Market",
                "CategoryName",
                "SubCategoryName",
                "ProductName",
                "Name",
                "Price",
                "Seller.City",
                "Tags",
            ]
        );
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["FMCG", "Dairy & Eggs", "Milk", "Toned Milk", "m1", "42", "Pune", ""]);
        assert_eq!(rows[1], vec!["FMCG", "Dairy & Eggs", "Milk", "Toned Milk", "m2", "", "", ""]);
        // An item field named like a lead column does not override it
        assert_eq!(rows[2], vec!["FMCG", "Dairy & Eggs", "Milk", "Curd", "c1", "", "", r#"["fresh"]"#]);
    }

    #[test]
    fn csv_file_is_tab_separated_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), OutputFormat::Csv);

        let path = writer.write("FMCG", "Dairy & Eggs", &sample()).unwrap();
        assert_eq!(path, dir.path().join("FMCG/Dairy Eggs.csv"));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "Market\tCategoryName\tSubCategoryName\tProductName\tName\tPrice\tSeller.City\tTags"
        );
        assert!(lines[1].starts_with("FMCG\tDairy & Eggs\tMilk\tToned Milk\tm1\t42"), "{}", lines[1]);
    }

    #[test]
    fn csv_of_market_without_items_is_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), OutputFormat::Csv);
        let data = MarketData {
            market: "Toys".into(),
            categories: vec![],
        };

        let path = writer.write("Toys", "Toys", &data).unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap().trim_end(),
            "Market\tCategoryName\tSubCategoryName\tProductName"
        );
    }
}
