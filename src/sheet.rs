use crate::condition::{evaluate, status_marker};
use crate::model::{Bsc, CategoryId, ComparisonMode, Indicator, IndicatorId, Month, Track};
use crate::relations::RelationGraph;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;

lazy_static! {
    static ref CELL_NAME_REGEX: Regex = Regex::new(r"^([A-Za-z]+)([0-9]+)$").unwrap();
}

pub const COLUMN_COUNT: usize = 23;

/// Identity/meta columns merged across each Real/Objective pair.
pub const META_COLUMNS: usize = 7;

pub const COLUMN_HEADERS: [&str; COLUMN_COUNT] = [
    "N°",
    "Indicador",
    "Dueño",
    "Unidad",
    "Tipo",
    "Condición",
    "Año",
    "Ene",
    "Feb",
    "Mar",
    "Q1",
    "Abr",
    "May",
    "Jun",
    "Q2",
    "Jul",
    "Ago",
    "Sep",
    "Q3",
    "Oct",
    "Nov",
    "Dic",
    "Q4",
];

const INDENT: &str = "    ";

/// Grid column showing `month`: three month columns then one quarter rollup.
pub fn column_for_month(month: Month) -> usize {
    META_COLUMNS + month.quarter() * 4 + month.index() % 3
}

/// Only the twelve month columns are edit targets.
pub fn month_for_column(col: usize) -> Option<Month> {
    if col < META_COLUMNS || col >= COLUMN_COUNT {
        return None;
    }
    let offset = col - META_COLUMNS;
    if offset % 4 == 3 {
        return None;
    }
    Month::ALL.get((offset / 4) * 3 + offset % 4).copied()
}

pub fn quarter_for_column(col: usize) -> Option<usize> {
    if col < META_COLUMNS || col >= COLUMN_COUNT {
        return None;
    }
    let offset = col - META_COLUMNS;
    (offset % 4 == 3).then_some(offset / 4)
}

#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(CellValue::Empty, CellValue::Number)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{:.2}", n),
        }
    }
}

/// A rectangular block of cells rendered as one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergeRegion {
    pub row: usize,
    pub col: usize,
    pub rowspan: usize,
    pub colspan: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RowRole {
    CategoryHeader,
    Real,
    Objective,
}

impl RowRole {
    pub fn track(self) -> Option<Track> {
        match self {
            RowRole::Real => Some(Track::Real),
            RowRole::Objective => Some(Track::Objective),
            RowRole::CategoryHeader => None,
        }
    }
}

/// Stable identity of an indicator row, independent of where it is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub indicator_id: IndicatorId,
    pub track: Track,
}

/// What an emitted row shows. Only valid for the sheet that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct RowMapping {
    pub row: usize,
    pub role: RowRole,
    pub indicator_id: Option<IndicatorId>,
    pub category_id: Option<CategoryId>,
    pub depth: usize,
    pub has_children: bool,
    /// As stored; `None` shades with `<=` and shows a blank Condición cell.
    pub comparison: Option<ComparisonMode>,
    /// Aggregate rows (indicators with children) and headers are never edited.
    pub read_only: bool,
}

impl RowMapping {
    pub fn key(&self) -> Option<RowKey> {
        Some(RowKey {
            indicator_id: self.indicator_id?,
            track: self.role.track()?,
        })
    }
}

/// One board flattened into a grid: cell values, merged regions, the
/// row-to-indicator mapping and the row header labels, all indexed by row.
#[derive(Clone, Debug)]
pub struct BscSheet {
    pub board_id: i64,
    pub board_name: String,
    pub cells: Vec<Vec<CellValue>>,
    pub merges: Vec<MergeRegion>,
    pub rows: Vec<RowMapping>,
    pub row_headers: Vec<String>,
    positions: HashMap<RowKey, usize>,
}

impl BscSheet {
    /// Flattens a board into rows.
    ///
    /// Categories are walked in board order; inside each, the top-level
    /// indicators (no parent in the collection) in collection order; under
    /// each expanded indicator, its children in declared order. A category
    /// with no top-level indicator contributes nothing, not even a header.
    ///
    /// # Arguments
    /// * `board` - Board whose ordered categories drive the layout
    /// * `indicators` - Full indicator collection
    /// * `expanded` - Indicators whose children are shown
    ///
    /// # Returns
    /// * `BscSheet` - A fresh sheet; identical inputs give identical sheets
    pub fn materialize(
        board: &Bsc,
        indicators: &[Indicator],
        expanded: &HashSet<IndicatorId>,
    ) -> Self {
        let graph = RelationGraph::build(indicators);
        let mut by_id: HashMap<IndicatorId, &Indicator> = HashMap::new();
        for ind in indicators {
            by_id.entry(ind.id).or_insert(ind);
        }

        let mut sheet = BscSheet {
            board_id: board.id,
            board_name: board.name.clone(),
            cells: Vec::new(),
            merges: Vec::new(),
            rows: Vec::new(),
            row_headers: Vec::new(),
            positions: HashMap::new(),
        };

        let mut seen_categories = HashSet::new();
        for &category_id in &board.categories {
            if !seen_categories.insert(category_id) {
                continue;
            }

            let mut seen_tops = HashSet::new();
            let tops: Vec<IndicatorId> = indicators
                .iter()
                .filter(|i| i.in_category(category_id) && graph.parents_of(i.id).is_empty())
                .map(|i| i.id)
                .filter(|id| seen_tops.insert(*id))
                .collect();
            if tops.is_empty() {
                continue;
            }

            sheet.push_category_header(category_id, &category_label(board, indicators, category_id));

            for top in tops {
                for (id, depth) in graph.walk(top, |id| expanded.contains(&id)) {
                    if let Some(ind) = by_id.get(&id) {
                        let has_children = !graph.children_of(id).is_empty();
                        sheet.push_indicator(ind, depth, has_children, expanded.contains(&id));
                    }
                }
            }
        }

        sheet
    }

    fn push_category_header(&mut self, category_id: CategoryId, label: &str) {
        let row = self.cells.len();
        let mut cells = vec![CellValue::Empty; COLUMN_COUNT];
        cells[0] = CellValue::Text(label.to_string());
        self.cells.push(cells);
        self.rows.push(RowMapping {
            row,
            role: RowRole::CategoryHeader,
            indicator_id: None,
            category_id: Some(category_id),
            depth: 0,
            has_children: false,
            comparison: None,
            read_only: true,
        });
        self.row_headers.push(String::new());
        self.merges.push(MergeRegion {
            row,
            col: 0,
            rowspan: 1,
            colspan: COLUMN_COUNT,
        });
    }

    fn push_indicator(&mut self, ind: &Indicator, depth: usize, has_children: bool, expanded: bool) {
        let row = self.cells.len();
        let glyph = match (has_children, expanded) {
            (true, true) => "▼ ",
            (true, false) => "▶ ",
            (false, _) => "  ",
        };
        let comparison = ind.comparison;

        let mut real = vec![
            text(ind.number.as_deref()),
            CellValue::Text(format!("{}{}{}", INDENT.repeat(depth), glyph, ind.display_name())),
            text(ind.owner.as_deref()),
            text(ind.unit.as_deref()),
            text(ind.kind.as_deref()),
            text(comparison.map(ComparisonMode::code)),
            CellValue::from(ind.year_to_date),
        ];
        let mut objective = vec![CellValue::Empty; META_COLUMNS];
        for quarter in 0..4 {
            for month in &Month::ALL[quarter * 3..quarter * 3 + 3] {
                real.push(ind.value(*month, Track::Real).into());
                objective.push(ind.value(*month, Track::Objective).into());
            }
            real.push(ind.values.quarter(quarter, Track::Real).into());
            objective.push(ind.values.quarter(quarter, Track::Objective).into());
        }

        for (offset, (cells, track)) in [(real, Track::Real), (objective, Track::Objective)]
            .into_iter()
            .enumerate()
        {
            let this_row = row + offset;
            self.cells.push(cells);
            self.rows.push(RowMapping {
                row: this_row,
                role: match track {
                    Track::Real => RowRole::Real,
                    Track::Objective => RowRole::Objective,
                },
                indicator_id: Some(ind.id),
                category_id: None,
                depth,
                has_children,
                comparison,
                read_only: has_children,
            });
            self.row_headers.push(track.row_header().to_string());
            self.positions
                .entry(RowKey {
                    indicator_id: ind.id,
                    track,
                })
                .or_insert(this_row);
        }

        for col in 0..META_COLUMNS {
            self.merges.push(MergeRegion {
                row,
                col,
                rowspan: 2,
                colspan: 1,
            });
        }
    }

    pub fn row_count(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.cells.get(row)?.get(col)
    }

    /// Overwrites one cell of the local grid, returning what was there.
    pub fn set_cell(&mut self, row: usize, col: usize, value: CellValue) -> Option<CellValue> {
        let slot = self.cells.get_mut(row)?.get_mut(col)?;
        Some(std::mem::replace(slot, value))
    }

    pub fn mapping(&self, row: usize) -> Option<&RowMapping> {
        self.rows.get(row)
    }

    /// First row currently showing `key`.
    pub fn row_of(&self, key: RowKey) -> Option<usize> {
        self.positions.get(&key).copied()
    }

    pub fn visible_indicators(&self) -> usize {
        self.positions
            .keys()
            .filter(|k| k.track == Track::Real)
            .count()
    }

    pub fn is_editable(&self, row: usize, col: usize) -> bool {
        match self.mapping(row) {
            Some(m) => m.key().is_some() && !m.read_only && month_for_column(col).is_some(),
            None => false,
        }
    }

    /// Pass/fail shading for a Real month cell against the Objective below it.
    pub fn cell_status(&self, row: usize, col: usize) -> Option<bool> {
        let mapping = self.mapping(row)?;
        if mapping.role != RowRole::Real || mapping.read_only || month_for_column(col).is_none() {
            return None;
        }
        let below = self.mapping(row + 1)?;
        if below.role != RowRole::Objective || below.indicator_id != mapping.indicator_id {
            return None;
        }
        evaluate(
            self.cell(row, col)?.as_number(),
            self.cell(row + 1, col)?.as_number(),
            ComparisonMode::resolve(mapping.comparison),
        )
    }

    pub fn col_to_letter(col: usize) -> String {
        let mut col = col + 1;
        let mut result = String::new();
        while col > 0 {
            col -= 1;
            result.push(((col % 26) as u8 + b'A') as char);
            col /= 26;
        }
        result.chars().rev().collect()
    }

    /// One-based column number of `AB`-style letters; `None` on overflow.
    pub fn letter_to_col(letters: &str) -> Option<usize> {
        letters.chars().try_fold(0usize, |acc, c| {
            let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
            acc.checked_mul(26)?.checked_add(digit)
        })
    }

    /// Spreadsheet-style name (`H5`) of a zero-based position.
    pub fn cell_name(row: usize, col: usize) -> String {
        format!("{}{}", Self::col_to_letter(col), row + 1)
    }

    /// Parses `H5` into a zero-based `(row, col)` inside this sheet.
    pub fn parse_cell_name(&self, name: &str) -> Option<(usize, usize)> {
        let captures = CELL_NAME_REGEX.captures(name.trim())?;
        let col = Self::letter_to_col(captures.get(1)?.as_str())?;
        let row = captures.get(2)?.as_str().parse::<usize>().ok()?;
        if row == 0 || col == 0 || row > self.row_count() || col > COLUMN_COUNT {
            return None;
        }
        Some((row - 1, col - 1))
    }

    /// Plain-text rendering with pass/fail markers beside Real month cells.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n", self.board_name));
        out.push_str(&format!("{:<4}{:<4}", "", ""));
        for (col, header) in COLUMN_HEADERS.iter().enumerate() {
            out.push_str(&format!("{:<w$}", header, w = column_width(col)));
        }
        out.push('\n');
        out.push_str(&format!("{:<4}", ""));
        for col in 0..COLUMN_COUNT {
            out.push_str(&format!("{:<w$}", Self::col_to_letter(col), w = column_width(col)));
        }
        out.push('\n');

        for (row, cells) in self.cells.iter().enumerate() {
            out.push_str(&format!("{:<4}{:<4}", row + 1, self.row_headers[row]));
            if self.rows[row].role == RowRole::CategoryHeader {
                out.push_str(&format!("== {} ==\n", cells[0].to_string().to_uppercase()));
                continue;
            }
            for (col, cell) in cells.iter().enumerate() {
                let mut shown = truncate(&cell.to_string(), column_width(col) - 2);
                if month_for_column(col).is_some() && self.rows[row].role == RowRole::Real {
                    shown.push_str(status_marker(self.cell_status(row, col)));
                }
                out.push_str(&format!("{:<w$}", shown, w = column_width(col)));
            }
            out.push('\n');
        }
        out
    }

    pub fn display(&self) {
        print!("{}", self.render());
    }
}

fn text(value: Option<&str>) -> CellValue {
    CellValue::Text(value.unwrap_or("").to_string())
}

fn category_label(board: &Bsc, indicators: &[Indicator], category_id: CategoryId) -> String {
    board
        .category(category_id)
        .or_else(|| {
            indicators
                .iter()
                .flat_map(|i| i.category_details.iter())
                .find(|c| c.id == category_id)
        })
        .map(|c| c.name.clone())
        .unwrap_or_else(|| format!("#{}", category_id))
}

fn column_width(col: usize) -> usize {
    match col {
        1 => 28,
        2..=5 => 10,
        _ => 9,
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
