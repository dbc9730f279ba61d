use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub type IndicatorId = i64;
pub type CategoryId = i64;
pub type BoardId = i64;
pub type RelationId = i64;

/// Partial field update sent with `PATCH`.
pub type Patch = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Prefix the API uses for this month's fields (`ene`, `feb`, ...).
    pub fn wire_prefix(self) -> &'static str {
        match self {
            Month::Jan => "ene",
            Month::Feb => "feb",
            Month::Mar => "mar",
            Month::Apr => "abr",
            Month::May => "may",
            Month::Jun => "jun",
            Month::Jul => "jul",
            Month::Aug => "ago",
            Month::Sep => "sep",
            Month::Oct => "oct",
            Month::Nov => "nov",
            Month::Dec => "dic",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Month::Jan => "Ene",
            Month::Feb => "Feb",
            Month::Mar => "Mar",
            Month::Apr => "Abr",
            Month::May => "May",
            Month::Jun => "Jun",
            Month::Jul => "Jul",
            Month::Aug => "Ago",
            Month::Sep => "Sep",
            Month::Oct => "Oct",
            Month::Nov => "Nov",
            Month::Dec => "Dic",
        }
    }

    /// Zero-based quarter this month rolls up into.
    pub fn quarter(self) -> usize {
        self.index() / 3
    }

    pub fn field_name(self, track: Track) -> String {
        format!("{}_{}", self.wire_prefix(), track.suffix())
    }
}

/// The two parallel value tracks carried per month.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Track {
    Real,
    Objective,
}

impl Track {
    pub fn suffix(self) -> &'static str {
        match self {
            Track::Real => "r",
            Track::Objective => "o",
        }
    }

    pub fn row_header(self) -> &'static str {
        match self {
            Track::Real => "R",
            Track::Objective => "O",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonMode {
    #[default]
    #[serde(rename = "MAYOR")]
    GreaterIsBetter,
    #[serde(rename = "MENOR")]
    LessIsBetter,
}

impl ComparisonMode {
    pub fn resolve(mode: Option<ComparisonMode>) -> ComparisonMode {
        mode.unwrap_or(ComparisonMode::LessIsBetter)
    }

    pub fn code(self) -> &'static str {
        match self {
            ComparisonMode::GreaterIsBetter => "MAYOR",
            ComparisonMode::LessIsBetter => "MENOR",
        }
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// How a parent's values are expected to derive from its children.
/// Advisory only: the server does the arithmetic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationMethod {
    #[default]
    #[serde(rename = "PROMEDIO")]
    Average,
    #[serde(rename = "SUMA")]
    Sum,
}

// Blank or unrecognised codes read as null instead of failing the record.
fn lenient_code<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value(value.clone()) {
        Ok(code) => Some(code),
        Err(_) => {
            if value != Value::String(String::new()) {
                debug!("ignoring unknown code {}", value);
            }
            None
        }
    }))
}

/// One end of a parent/child link as embedded in an indicator record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationRef {
    pub rel_id: RelationId,
    pub id: IndicatorId,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(rename = "indicador", default)]
    pub name: Option<String>,
}

/// Monthly Real/Objective values plus the server-computed quarter rollups.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMonthly", into = "RawMonthly")]
pub struct MonthlyValues {
    pub real: [Option<f64>; 12],
    pub objective: [Option<f64>; 12],
    pub quarters_real: [Option<f64>; 4],
    pub quarters_objective: [Option<f64>; 4],
}

impl MonthlyValues {
    pub fn get(&self, month: Month, track: Track) -> Option<f64> {
        match track {
            Track::Real => self.real[month.index()],
            Track::Objective => self.objective[month.index()],
        }
    }

    /// Stores a value and hands back the one it replaced.
    pub fn set(&mut self, month: Month, track: Track, value: Option<f64>) -> Option<f64> {
        let slot = match track {
            Track::Real => &mut self.real[month.index()],
            Track::Objective => &mut self.objective[month.index()],
        };
        std::mem::replace(slot, value)
    }

    pub fn quarter(&self, quarter: usize, track: Track) -> Option<f64> {
        match track {
            Track::Real => self.quarters_real.get(quarter).copied().flatten(),
            Track::Objective => self.quarters_objective.get(quarter).copied().flatten(),
        }
    }
}

// Flat wire shape of the monthly block; keeps the field names in one place.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawMonthly {
    ene_r: Option<f64>,
    feb_r: Option<f64>,
    mar_r: Option<f64>,
    abr_r: Option<f64>,
    may_r: Option<f64>,
    jun_r: Option<f64>,
    jul_r: Option<f64>,
    ago_r: Option<f64>,
    sep_r: Option<f64>,
    oct_r: Option<f64>,
    nov_r: Option<f64>,
    dic_r: Option<f64>,
    q1_r: Option<f64>,
    q2_r: Option<f64>,
    q3_r: Option<f64>,
    q4_r: Option<f64>,
    ene_o: Option<f64>,
    feb_o: Option<f64>,
    mar_o: Option<f64>,
    abr_o: Option<f64>,
    may_o: Option<f64>,
    jun_o: Option<f64>,
    jul_o: Option<f64>,
    ago_o: Option<f64>,
    sep_o: Option<f64>,
    oct_o: Option<f64>,
    nov_o: Option<f64>,
    dic_o: Option<f64>,
    q1_o: Option<f64>,
    q2_o: Option<f64>,
    q3_o: Option<f64>,
    q4_o: Option<f64>,
}

impl From<RawMonthly> for MonthlyValues {
    fn from(raw: RawMonthly) -> Self {
        MonthlyValues {
            real: [
                raw.ene_r, raw.feb_r, raw.mar_r, raw.abr_r, raw.may_r, raw.jun_r, raw.jul_r,
                raw.ago_r, raw.sep_r, raw.oct_r, raw.nov_r, raw.dic_r,
            ],
            objective: [
                raw.ene_o, raw.feb_o, raw.mar_o, raw.abr_o, raw.may_o, raw.jun_o, raw.jul_o,
                raw.ago_o, raw.sep_o, raw.oct_o, raw.nov_o, raw.dic_o,
            ],
            quarters_real: [raw.q1_r, raw.q2_r, raw.q3_r, raw.q4_r],
            quarters_objective: [raw.q1_o, raw.q2_o, raw.q3_o, raw.q4_o],
        }
    }
}

impl From<MonthlyValues> for RawMonthly {
    fn from(v: MonthlyValues) -> Self {
        let [ene_r, feb_r, mar_r, abr_r, may_r, jun_r, jul_r, ago_r, sep_r, oct_r, nov_r, dic_r] =
            v.real;
        let [ene_o, feb_o, mar_o, abr_o, may_o, jun_o, jul_o, ago_o, sep_o, oct_o, nov_o, dic_o] =
            v.objective;
        let [q1_r, q2_r, q3_r, q4_r] = v.quarters_real;
        let [q1_o, q2_o, q3_o, q4_o] = v.quarters_objective;
        RawMonthly {
            ene_r,
            feb_r,
            mar_r,
            abr_r,
            may_r,
            jun_r,
            jul_r,
            ago_r,
            sep_r,
            oct_r,
            nov_r,
            dic_r,
            q1_r,
            q2_r,
            q3_r,
            q4_r,
            ene_o,
            feb_o,
            mar_o,
            abr_o,
            may_o,
            jun_o,
            jul_o,
            ago_o,
            sep_o,
            oct_o,
            nov_o,
            dic_o,
            q1_o,
            q2_o,
            q3_o,
            q4_o,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    #[serde(rename = "bscs", default, skip_serializing_if = "Vec::is_empty")]
    pub boards: Vec<BoardId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub id: IndicatorId,
    #[serde(rename = "n", default)]
    pub number: Option<String>,
    #[serde(rename = "indicador", default)]
    pub name: Option<String>,
    #[serde(rename = "dueno", default)]
    pub owner: Option<String>,
    #[serde(rename = "unidad", default)]
    pub unit: Option<String>,
    #[serde(rename = "tipo_de_indicador", default)]
    pub kind: Option<String>,
    #[serde(rename = "condicion", default, deserialize_with = "lenient_code")]
    pub comparison: Option<ComparisonMode>,
    #[serde(rename = "ano_a_la_fecha", default)]
    pub year_to_date: Option<f64>,
    #[serde(rename = "metodo_q", default, deserialize_with = "lenient_code")]
    pub aggregation: Option<AggregationMethod>,
    #[serde(rename = "categorias", default)]
    pub categories: Vec<CategoryId>,
    #[serde(rename = "categorias_detalle", default)]
    pub category_details: Vec<Category>,
    #[serde(flatten)]
    pub values: MonthlyValues,
    #[serde(rename = "creado_en", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "actualizado_en", default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "hijos", default)]
    pub children: Vec<RelationRef>,
    #[serde(rename = "padres", default)]
    pub parents: Vec<RelationRef>,
}

impl Indicator {
    /// Bare record with only an id; handy for fixtures and drafts.
    pub fn new(id: IndicatorId) -> Self {
        Indicator {
            id,
            number: None,
            name: None,
            owner: None,
            unit: None,
            kind: None,
            comparison: None,
            year_to_date: None,
            aggregation: None,
            categories: Vec::new(),
            category_details: Vec::new(),
            values: MonthlyValues::default(),
            created_at: None,
            updated_at: None,
            children: Vec::new(),
            parents: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Mode used for shading. Anything but `MAYOR`, null included, compares
    /// with `<=`.
    pub fn comparison_mode(&self) -> ComparisonMode {
        ComparisonMode::resolve(self.comparison)
    }

    pub fn value(&self, month: Month, track: Track) -> Option<f64> {
        self.values.get(month, track)
    }

    pub fn set_value(&mut self, month: Month, track: Track, value: Option<f64>) -> Option<f64> {
        self.values.set(month, track, value)
    }

    pub fn child_ids(&self) -> impl Iterator<Item = IndicatorId> + '_ {
        self.children.iter().map(|c| c.id)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn in_category(&self, category: CategoryId) -> bool {
        self.categories.contains(&category)
    }
}

/// Body for `POST /indicadores/`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IndicatorDraft {
    #[serde(rename = "n", skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(rename = "indicador")]
    pub name: String,
    #[serde(rename = "dueno", skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(rename = "unidad", skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "tipo_de_indicador", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "condicion")]
    pub comparison: ComparisonMode,
    #[serde(rename = "metodo_q")]
    pub aggregation: AggregationMethod,
    #[serde(rename = "categorias")]
    pub categories: Vec<CategoryId>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CategoryDraft {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A board: named, ordered list of categories.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bsc {
    pub id: BoardId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "categorias", default)]
    pub categories: Vec<CategoryId>,
    #[serde(rename = "categorias_detalle", default)]
    pub category_details: Vec<Category>,
}

impl Bsc {
    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.category_details.iter().find(|c| c.id == id)
    }

    /// True when the indicator sits in any of this board's categories.
    pub fn includes(&self, indicator: &Indicator) -> bool {
        indicator
            .categories
            .iter()
            .any(|c| self.categories.contains(c))
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BscDraft {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "categorias")]
    pub categories: Vec<CategoryId>,
}

/// A standalone parent/child link as returned by `/indicadores-rel/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    #[serde(rename = "indicador_padre")]
    pub parent: IndicatorId,
    #[serde(rename = "indicador_hijo")]
    pub child: IndicatorId,
}

/// Single-field patch for one monthly value; `None` clears the cell.
pub fn value_patch(month: Month, track: Track, value: Option<f64>) -> Patch {
    let mut patch = Patch::new();
    patch.insert(month.field_name(track), number_value(value));
    patch
}

pub fn number_value(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
