/*!
# Scorecard

Client core for a Balanced ScoreCard service, built in Rust.

## Overview

A Balanced ScoreCard (BSC) groups strategic indicators (KPIs) into ordered
categories. Every indicator carries a monthly "Real" value and a monthly
"Objective" value, and indicators can be linked into parent/child
hierarchies. This crate fetches boards, categories and indicators from the
REST service, lays a board out as an editable grid, and pushes cell edits
back with optimistic local updates.

## Architecture

### Data Layer
- **model**: Wire records (indicators, categories, boards, relations) and the
  month/track vocabulary used to address monthly values
- **cache**: Local copy of the indicator collection, replaced on refetch

### Core Components
- **relations**: Relation Graph Builder. Derives parent links from declared
  child links, finds roots, resolves connected groups (BFS), detects cycles
  and reports inconsistent records
- **sheet**: Hierarchical Table Materializer. Flattens a board into
  Real/Objective row pairs under category headers, with merged regions and a
  row mapping keyed by (indicator id, track)
- **condition**: Condition Evaluator. Pass/fail/indeterminate per cell
- **sync**: Edit-Sync Engine. Optimistic apply, concurrent `PATCH`es,
  debounced refetch, bulk save
- **workflow**: Category group assignment, relation link/unlink with
  validation, board category ordering

### Outer Layer
- **api**: `ScorecardApi` trait and its `reqwest` implementation
- **downloader**: CSV export (XLSX with the `xlsx` feature)
- **config**: Settings from `SCORECARD_*` environment variables
- **error**: `ScorecardError`

## Grid Layout

23 columns: seven identity columns (`N°`, `Indicador`, `Dueño`, `Unidad`,
`Tipo`, `Condición`, `Año`) followed by four quarters of three months and a
rollup each. Only the twelve month columns are editable, and only on rows of
indicators without children.

## REST Endpoints

- `/indicadores/`, `/indicadores/{id}/`
- `/categorias/`, `/categorias/{id}/`
- `/bsc/`, `/bsc/{id}/`
- `/indicadores-rel/`, `/indicadores-rel/{id}/`
*/

pub mod api;
pub mod cache;
pub mod condition;
pub mod config;
pub mod downloader;
pub mod error;
pub mod model;
pub mod relations;
pub mod sheet;
pub mod sync;
pub mod workflow;

pub use api::{HttpApi, ScorecardApi, Session};
pub use cache::IndicatorCache;
pub use config::{Config, FailurePolicy};
pub use error::{Result, ScorecardError};
pub use model::{Bsc, Category, ComparisonMode, Indicator, Month, Track};
pub use relations::RelationGraph;
pub use sheet::{BscSheet, CellValue, RowKey, RowMapping, RowRole};
pub use sync::{BatchReport, CellEdit, EditOutcome, SyncEngine};
