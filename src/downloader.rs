use crate::error::{Result, ScorecardError};
use crate::sheet::{BscSheet, COLUMN_HEADERS, CellValue};
use log::info;
use std::path::Path;

/// Convert a materialized board to CSV
///
/// The first line carries the column headers, the first column the R/O row
/// labels. Values containing commas, quotes or newlines are quoted.
///
/// # Arguments
/// * `sheet` - Sheet to export
///
/// # Returns
/// * `String` - CSV content
pub fn to_csv(sheet: &BscSheet) -> String {
    let mut csv_content = String::new();

    csv_content.push_str("R/O");
    for header in COLUMN_HEADERS {
        csv_content.push(',');
        csv_content.push_str(&escape(header));
    }
    csv_content.push('\n');

    for (row, cells) in sheet.cells.iter().enumerate() {
        csv_content.push_str(&sheet.row_headers[row]);
        for cell in cells {
            csv_content.push(',');
            csv_content.push_str(&escape(&cell.to_string()));
        }
        csv_content.push('\n');
    }

    csv_content
}

fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Convert a materialized board to XLSX, keeping merged regions
///
/// # Arguments
/// * `sheet` - Sheet to export
///
/// # Returns
/// * `Result<Vec<u8>>` - Workbook bytes or an export error
#[cfg(feature = "xlsx")]
pub fn to_xlsx(sheet: &BscSheet) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
    use std::collections::HashSet;

    fn write(sheet: &BscSheet) -> std::result::Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let mut worksheet = Worksheet::new();
        let bold = Format::new().set_bold();
        let plain = Format::new();
        worksheet.set_name(truncated_name(&sheet.board_name))?;

        for (col, header) in COLUMN_HEADERS.iter().enumerate() {
            worksheet.write_string_with_format(0, (col + 1) as u16, *header, &bold)?;
        }

        // Cells covered by a merge are written once, through the merge.
        let mut covered = HashSet::new();
        for merge in &sheet.merges {
            let text = sheet
                .cell(merge.row, merge.col)
                .map(CellValue::to_string)
                .unwrap_or_default();
            let format = if merge.colspan > 1 { &bold } else { &plain };
            worksheet.merge_range(
                (merge.row + 1) as u32,
                (merge.col + 1) as u16,
                (merge.row + merge.rowspan) as u32,
                (merge.col + merge.colspan) as u16,
                &text,
                format,
            )?;
            for r in merge.row..merge.row + merge.rowspan {
                for c in merge.col..merge.col + merge.colspan {
                    covered.insert((r, c));
                }
            }
        }

        for (row, cells) in sheet.cells.iter().enumerate() {
            let xrow = (row + 1) as u32;
            worksheet.write_string(xrow, 0, &sheet.row_headers[row])?;
            for (col, cell) in cells.iter().enumerate() {
                if covered.contains(&(row, col)) {
                    continue;
                }
                let xcol = (col + 1) as u16;
                match cell {
                    CellValue::Number(n) => {
                        worksheet.write_number(xrow, xcol, *n)?;
                    }
                    CellValue::Text(s) => {
                        worksheet.write_string(xrow, xcol, s)?;
                    }
                    CellValue::Empty => {}
                }
            }
        }

        workbook.push_worksheet(worksheet);
        workbook.save_to_buffer()
    }

    write(sheet).map_err(|e| ScorecardError::Export(e.to_string()))
}

// Worksheet names are limited to 31 characters and cannot contain []:*?/\
#[cfg(feature = "xlsx")]
fn truncated_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    if cleaned.trim().is_empty() {
        "BSC".to_string()
    } else {
        cleaned
    }
}

/// Write the sheet to `path`, picking the format from the extension
pub fn export_to_path(sheet: &BscSheet, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") => std::fs::write(path, to_csv(sheet))?,
        #[cfg(feature = "xlsx")]
        Some("xlsx") => std::fs::write(path, to_xlsx(sheet)?)?,
        _ => {
            return Err(ScorecardError::Export(format!(
                "unsupported export format: {}",
                path.display()
            )));
        }
    }
    info!("exported {} to {}", sheet.board_name, path.display());
    Ok(())
}
