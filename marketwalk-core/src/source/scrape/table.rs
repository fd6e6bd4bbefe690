//! Listings table extraction from rendered markup.
//!
//! Locates the first `div` carrying the container class, takes the last
//! `<table>` inside it and reads `thead th` as headers and `tbody tr > td`
//! as rows. Cell text is whitespace-trimmed.

use crate::error::AcquireError;
use scraper::{ElementRef, Html, Selector};

/// Class of the listings container on the historical snapshot page.
pub const LISTING_CONTAINER_CLASS: &str = "cmc-table-listing";

/// Rectangular table: every row has one value per header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn selector(css: &str) -> Result<Selector, AcquireError> {
    Selector::parse(css).map_err(|e| AcquireError::Config(format!("invalid selector '{css}': {e}")))
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Extract the last table under `div.<container_class>`.
///
/// `Ok(None)` when the container or a table inside it is missing. A table
/// without `thead`/`tbody`, or with a row whose width differs from the
/// header, breaks the extraction contract.
pub fn extract_last_table(html: &str, container_class: &str) -> Result<Option<Table>, AcquireError> {
    let doc = Html::parse_document(html);
    let container_sel = selector(&format!("div.{container_class}"))?;
    let table_sel = selector("table")?;
    let thead_sel = selector("thead")?;
    let th_sel = selector("th")?;
    let tbody_sel = selector("tbody")?;
    let tr_sel = selector("tr")?;
    let td_sel = selector("td")?;

    let Some(container) = doc.select(&container_sel).next() else {
        return Ok(None);
    };
    let Some(table) = container.select(&table_sel).last() else {
        return Ok(None);
    };

    let thead = table
        .select(&thead_sel)
        .next()
        .ok_or_else(|| AcquireError::ContractViolation("listing table has no <thead>".into()))?;
    let headers: Vec<String> = thead.select(&th_sel).map(cell_text).collect();

    let tbody = table
        .select(&tbody_sel)
        .next()
        .ok_or_else(|| AcquireError::ContractViolation("listing table has no <tbody>".into()))?;

    let mut rows = Vec::new();
    for (i, tr) in tbody.select(&tr_sel).enumerate() {
        let row: Vec<String> = tr.select(&td_sel).map(cell_text).collect();
        if row.len() != headers.len() {
            return Err(AcquireError::ContractViolation(format!(
                "row {i} has {} cells but the header has {}",
                row.len(),
                headers.len()
            )));
        }
        rows.push(row);
    }

    Ok(Some(Table { headers, rows }))
}
