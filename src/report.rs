use crate::config::EppProgram;
use crate::models::{AggregatedRow, Offer};
use crate::processing::sku_discount;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const MAX_SHEET_NAME: usize = 31;
const INVALID_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];
const RESERVED_SHEET_NAME: &str = "History";

pub const AGGREGATION_SHEET: &str = "Aggregation";
pub const GAP_SHEET: &str = "Not In Stage";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl Cell {
    fn text(value: Option<&str>) -> Self {
        value.map_or(Cell::Empty, |v| Cell::Text(v.to_string()))
    }

    fn number(value: Option<f64>) -> Self {
        value.map_or(Cell::Empty, Cell::Number)
    }

    fn flag(value: Option<bool>) -> Self {
        value.map_or(Cell::Empty, Cell::Bool)
    }

    fn joined(values: &[String]) -> Self {
        Cell::Text(values.join(","))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Sink for the audit report. Sheets are written in call order.
pub trait ReportWriter {
    fn create_sku_sheet(&mut self, sku: &str, offers: &[Offer]) -> Result<(), ReportError>;

    fn create_aggregation_sheet(
        &mut self,
        rows: &[AggregatedRow],
        programs: &[EppProgram],
    ) -> Result<(), ReportError>;

    fn create_gap_sheet(&mut self, offer_ids: &BTreeSet<String>) -> Result<(), ReportError>;

    fn save(&mut self) -> Result<PathBuf, ReportError>;
}

pub fn sku_table(sku: &str, offers: &[Offer]) -> Table {
    let headers = [
        "offer_id",
        "name",
        "type",
        "channel",
        "exclude_ir",
        "exclude_epp",
        "coupon_code_triggered",
        "trigger_tags",
        "concurrent",
        "apply_mode",
        "applicable_sites",
        "restricted_skus",
        "discount_value",
        "discount_type",
    ]
    .map(String::from)
    .to_vec();

    let rows = offers
        .iter()
        .map(|offer| {
            let discount = sku_discount(offer, sku);
            vec![
                Cell::Text(offer.offer_id.clone()),
                Cell::text(offer.name.as_deref()),
                Cell::text(offer.kind.as_deref()),
                Cell::text(offer.channel.as_deref()),
                Cell::flag(offer.exclude_ir),
                Cell::flag(offer.exclude_epp),
                Cell::flag(offer.coupon_code_triggered),
                Cell::joined(&offer.trigger_tags),
                Cell::flag(offer.concurrent),
                Cell::text(offer.apply_mode.as_deref()),
                Cell::joined(&offer.applicable_sites),
                Cell::joined(&offer.restricted_skus),
                Cell::number(discount.value.map(|v| v as f64)),
                Cell::text(discount.kind.as_deref()),
            ]
        })
        .collect();

    Table { headers, rows }
}

pub fn aggregation_table(rows: &[AggregatedRow], programs: &[EppProgram]) -> Table {
    let offer_columns = rows.iter().map(|row| row.offers.len()).max().unwrap_or(0);

    let mut headers: Vec<String> = [
        "SKU",
        "MSRP",
        "Sale Price",
        "Min Price",
        "Min EPP Price",
        "List Price",
    ]
    .map(String::from)
    .to_vec();
    for program in programs {
        headers.push(format!("{} Type", program.name));
        headers.push(format!("{} Value", program.name));
    }
    headers.push("Status".to_string());
    for i in 1..=offer_columns {
        headers.push(format!("Offer {i} ID"));
        headers.push(format!("Offer {i} Value"));
        headers.push(format!("Offer {i} Type"));
    }

    let body = rows
        .iter()
        .map(|row| {
            let mut cells = vec![
                Cell::Text(row.sku.clone()),
                Cell::number(row.price.msrp_price),
                Cell::number(row.price.sale_price),
                Cell::number(row.price.min_price),
                Cell::number(row.price.min_epp_price),
                Cell::number(row.price.list_price),
            ];
            for program in programs {
                let discount = row
                    .epp
                    .iter()
                    .find(|entry| entry.program == program.name)
                    .and_then(|entry| entry.discount.as_ref());
                cells.push(Cell::text(discount.and_then(|d| d.kind.as_deref())));
                cells.push(Cell::number(discount.and_then(|d| d.value)));
            }
            cells.push(Cell::Text(
                if row.search_failed { "search failed" } else { "ok" }.to_string(),
            ));
            for offer in &row.offers {
                cells.push(Cell::Text(offer.offer_id.clone()));
                cells.push(Cell::number(offer.value.map(|v| v as f64)));
                cells.push(Cell::text(offer.kind.as_deref()));
            }
            cells
        })
        .collect();

    Table {
        headers,
        rows: body,
    }
}

pub fn gap_table(offer_ids: &BTreeSet<String>) -> Table {
    Table {
        headers: vec!["offer_id".to_string()],
        rows: offer_ids
            .iter()
            .map(|id| vec![Cell::Text(id.clone())])
            .collect(),
    }
}

/// Truncates to 31 characters and replaces characters Excel rejects,
/// including an apostrophe at either end. `History` is reserved.
pub fn sanitize_sheet_name(name: &str) -> String {
    let mut chars: Vec<char> = name
        .chars()
        .take(MAX_SHEET_NAME)
        .map(|c| if INVALID_SHEET_CHARS.contains(&c) { '_' } else { c })
        .collect();
    if chars.first() == Some(&'\'') {
        chars[0] = '_';
    }
    if let Some(last) = chars.last_mut().filter(|c| **c == '\'') {
        *last = '_';
    }
    let cleaned: String = chars.into_iter().collect();
    if cleaned.trim().is_empty() {
        "Sheet".to_string()
    } else if cleaned.eq_ignore_ascii_case(RESERVED_SHEET_NAME) {
        format!("{cleaned}_")
    } else {
        cleaned
    }
}

/// Sheet names already handed out, compared case-insensitively as Excel does.
#[derive(Debug, Default)]
struct SheetNames {
    taken: HashSet<String>,
}

impl SheetNames {
    fn claim(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if self.taken.insert(base.to_lowercase()) {
            return base;
        }
        let mut n = 1usize;
        loop {
            let suffix = format!("~{n}");
            let keep = MAX_SHEET_NAME - suffix.chars().count();
            let candidate: String = base.chars().take(keep).chain(suffix.chars()).collect();
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}

pub struct XlsxReport {
    workbook: Workbook,
    path: PathBuf,
    names: SheetNames,
    header: Format,
}

impl XlsxReport {
    pub fn new(output_dir: &Path, primary_offer_id: &str) -> Self {
        let file_name = format!("{}.xlsx", primary_offer_id.replace(['/', '\\'], "_"));
        Self {
            workbook: Workbook::new(),
            path: output_dir.join(file_name),
            names: SheetNames::default(),
            header: Format::new().set_bold(),
        }
    }

    fn write_table(&mut self, raw_name: &str, table: &Table) -> Result<(), ReportError> {
        let name = self.names.claim(raw_name);
        if name != raw_name {
            debug!(target = "deep_discount.report", requested = %raw_name, sheet = %name, "sheet_renamed");
        }
        let mut worksheet = Worksheet::new();
        worksheet.set_name(&name)?;
        for (col, header) in table.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, header, &self.header)?;
        }
        for (index, row) in table.rows.iter().enumerate() {
            let row_num = index as u32 + 1;
            for (col, cell) in row.iter().enumerate() {
                let col = col as u16;
                match cell {
                    Cell::Text(value) => {
                        worksheet.write_string(row_num, col, value)?;
                    }
                    Cell::Number(value) => {
                        worksheet.write_number(row_num, col, *value)?;
                    }
                    Cell::Bool(value) => {
                        worksheet.write_boolean(row_num, col, *value)?;
                    }
                    Cell::Empty => {}
                }
            }
        }
        worksheet.autofit();
        self.workbook.push_worksheet(worksheet);
        Ok(())
    }
}

impl ReportWriter for XlsxReport {
    fn create_sku_sheet(&mut self, sku: &str, offers: &[Offer]) -> Result<(), ReportError> {
        self.write_table(sku, &sku_table(sku, offers))
    }

    fn create_aggregation_sheet(
        &mut self,
        rows: &[AggregatedRow],
        programs: &[EppProgram],
    ) -> Result<(), ReportError> {
        self.write_table(AGGREGATION_SHEET, &aggregation_table(rows, programs))
    }

    fn create_gap_sheet(&mut self, offer_ids: &BTreeSet<String>) -> Result<(), ReportError> {
        self.write_table(GAP_SHEET, &gap_table(offer_ids))
    }

    fn save(&mut self) -> Result<PathBuf, ReportError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.workbook.save(&self.path)?;
        Ok(self.path.clone())
    }
}

/// Keeps rendered tables in memory instead of writing a workbook.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryReport {
    pub sheets: Vec<(String, Table)>,
    pub saved: bool,
    names: SheetNames,
}

#[cfg(test)]
impl MemoryReport {
    pub fn sheet(&self, name: &str) -> Option<&Table> {
        self.sheets
            .iter()
            .find(|(sheet, _)| sheet == name)
            .map(|(_, table)| table)
    }
}

#[cfg(test)]
impl ReportWriter for MemoryReport {
    fn create_sku_sheet(&mut self, sku: &str, offers: &[Offer]) -> Result<(), ReportError> {
        let name = self.names.claim(sku);
        self.sheets.push((name, sku_table(sku, offers)));
        Ok(())
    }

    fn create_aggregation_sheet(
        &mut self,
        rows: &[AggregatedRow],
        programs: &[EppProgram],
    ) -> Result<(), ReportError> {
        let name = self.names.claim(AGGREGATION_SHEET);
        self.sheets.push((name, aggregation_table(rows, programs)));
        Ok(())
    }

    fn create_gap_sheet(&mut self, offer_ids: &BTreeSet<String>) -> Result<(), ReportError> {
        let name = self.names.claim(GAP_SHEET);
        self.sheets.push((name, gap_table(offer_ids)));
        Ok(())
    }

    fn save(&mut self) -> Result<PathBuf, ReportError> {
        self.saved = true;
        Ok(PathBuf::from("memory.xlsx"))
    }
}
