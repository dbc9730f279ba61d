use scorecard::condition::evaluate;
use scorecard::model::{Bsc, ComparisonMode, Indicator, Month, Track};
use scorecard::relations::RelationGraph;
use scorecard::sheet::{BscSheet, RowRole, column_for_month};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};

// Records shaped like the `/indicadores/` payload.
fn load() -> Vec<Indicator> {
    serde_json::from_value(json!([
        {
            "id": 1, "n": "1.1", "indicador": "Rentabilidad", "dueno": "Finanzas",
            "unidad": "%", "tipo_de_indicador": "Resultado", "condicion": "MAYOR",
            "metodo_q": "PROMEDIO", "categorias": [10],
            "mar_r": 85.0, "mar_o": 70.0, "q1_r": 85.0,
            "hijos": [{"rel_id": 31, "id": 2, "n": "1.2", "indicador": "Margen"}],
            "padres": []
        },
        {
            "id": 2, "n": "1.2", "indicador": "Margen", "condicion": "MENOR",
            "categorias": [10], "ene_r": 3, "ene_o": 5,
            "hijos": [], "padres": [{"rel_id": 31, "id": 1, "n": "1.1", "indicador": "Rentabilidad"}]
        },
        {
            "id": 3, "indicador": "Clientes", "condicion": null, "categorias": [20],
            "feb_r": 60, "feb_o": 70, "hijos": [], "padres": []
        }
    ]))
    .unwrap()
}

fn board() -> Bsc {
    serde_json::from_value(json!({
        "id": 1, "nombre": "Plan 2025", "categorias": [20, 10, 30],
        "categorias_detalle": [
            {"id": 10, "nombre": "Financiera", "descripcion": null},
            {"id": 20, "nombre": "Clientes", "descripcion": "Perspectiva cliente"},
            {"id": 30, "nombre": "Procesos", "descripcion": null}
        ]
    }))
    .unwrap()
}

#[test]
fn roots_and_child_map_from_payload() {
    let graph = RelationGraph::build(&load());
    assert_eq!(graph.roots(), vec![1, 3]);
    let expected: BTreeMap<i64, Vec<i64>> =
        [(1, vec![2]), (2, vec![]), (3, vec![])].into_iter().collect();
    assert_eq!(graph.child_map(), expected);
}

#[test]
fn board_layout_follows_category_order() {
    let sheet = BscSheet::materialize(&board(), &load(), &HashSet::from([1]));

    let layout: Vec<(RowRole, Option<i64>)> =
        sheet.rows.iter().map(|r| (r.role, r.indicator_id)).collect();
    assert_eq!(
        layout,
        vec![
            (RowRole::CategoryHeader, None),
            (RowRole::Real, Some(3)),
            (RowRole::Objective, Some(3)),
            (RowRole::CategoryHeader, None),
            (RowRole::Real, Some(1)),
            (RowRole::Objective, Some(1)),
            (RowRole::Real, Some(2)),
            (RowRole::Objective, Some(2)),
        ]
    );
    assert_eq!(sheet.rows[0].category_id, Some(20));
    assert_eq!(sheet.rows[3].category_id, Some(10));
}

#[test]
fn shading_uses_each_row_comparison_mode() {
    let sheet = BscSheet::materialize(&board(), &load(), &HashSet::from([1]));
    let jan = column_for_month(Month::Jan);
    let feb = column_for_month(Month::Feb);
    let mar = column_for_month(Month::Mar);

    assert_eq!(sheet.cell_status(4, mar), None, "aggregate rows are not shaded");
    assert_eq!(sheet.cell_status(6, jan), Some(true), "3 <= 5 under MENOR");
    assert_eq!(sheet.cell_status(6, mar), None);
    assert_eq!(sheet.cell_status(1, feb), Some(true), "null condition compares with <=");
    assert_eq!(sheet.cell_status(7, jan), None, "objective rows carry no status");
}

#[test]
fn aggregate_rows_are_locked_regardless_of_values() {
    let sheet = BscSheet::materialize(&board(), &load(), &HashSet::new());
    let parent_rows: Vec<usize> = sheet
        .rows
        .iter()
        .filter(|r| r.indicator_id == Some(1))
        .map(|r| r.row)
        .collect();
    assert_eq!(parent_rows.len(), 2);
    for row in parent_rows {
        for month in Month::ALL {
            assert!(!sheet.is_editable(row, column_for_month(month)));
        }
    }
}

#[test]
fn evaluator_examples() {
    let mode = ComparisonMode::GreaterIsBetter;
    assert_eq!(evaluate(Some(85.0), Some(70.0), mode), Some(true));
    assert_eq!(evaluate(Some(60.0), Some(70.0), mode), Some(false));
    assert_eq!(evaluate(Some(85.0), None, mode), None);

    let inds = load();
    assert_eq!(inds[2].comparison, None);
    assert_eq!(inds[2].comparison_mode(), ComparisonMode::LessIsBetter);
    assert_eq!(inds[0].value(Month::Mar, Track::Objective), Some(70.0));
}
