mod common;

use common::{FakeApi, board, indicator};
use scorecard::config::Config;
use scorecard::model::Indicator;
use scorecard::sync::SyncEngine;
use scorecard::{IndicatorCache, ScorecardError, workflow};
use serde_json::json;
use std::sync::Arc;

// 1 -> 2 <- 3 form one group, 4 stands alone, 5 points at a missing id.
fn fixture() -> Vec<Indicator> {
    vec![
        indicator(1, &[10], &[2]),
        indicator(2, &[10], &[]),
        indicator(3, &[20], &[2]),
        indicator(4, &[20], &[]),
        indicator(5, &[30], &[99]),
    ]
}

fn engine(api: &Arc<FakeApi>) -> SyncEngine<FakeApi> {
    SyncEngine::new(api.clone(), IndicatorCache::new(fixture()), &Config::default())
}

fn categories_of(engine: &SyncEngine<FakeApi>, id: i64) -> Vec<i64> {
    engine.with_cache(|c| c.get(id).map(|i| i.categories.clone()).unwrap_or_default())
}

#[tokio::test]
async fn group_assignment_patches_every_member() {
    let api = Arc::new(FakeApi::new(fixture()));
    let engine = engine(&api);

    let members = workflow::assign_group_categories(&engine, 2, vec![10, 40])
        .await
        .unwrap();

    assert_eq!(members, vec![1, 2, 3]);
    let mut patched: Vec<i64> = api.patches().iter().map(|(id, _)| *id).collect();
    patched.sort();
    assert_eq!(patched, vec![1, 2, 3]);
    for (_, patch) in api.patches() {
        assert_eq!(patch["categorias"], json!([10, 40]));
    }
    for id in [1, 2, 3] {
        assert_eq!(categories_of(&engine, id), vec![10, 40]);
    }
    assert_eq!(categories_of(&engine, 4), vec![20]);
}

#[tokio::test]
async fn group_assignment_reports_the_failure() {
    let api = Arc::new(FakeApi::new(fixture()));
    api.fail_patches_for(3);
    let engine = engine(&api);

    let result = workflow::assign_group_categories(&engine, 1, vec![50]).await;

    assert!(matches!(result, Err(ScorecardError::Rejected { status: 400, .. })));
    assert_eq!(api.patches().len(), 3, "the other requests still went out");
    assert_eq!(categories_of(&engine, 1), vec![50]);
    assert_eq!(categories_of(&engine, 3), vec![20]);
}

#[tokio::test]
async fn group_assignment_of_unknown_indicator() {
    let api = Arc::new(FakeApi::new(fixture()));
    let engine = engine(&api);
    let result = workflow::assign_group_categories(&engine, 99, vec![1]).await;
    assert!(matches!(result, Err(ScorecardError::UnknownIndicator(99))));
    assert!(api.patches().is_empty());
}

#[tokio::test]
async fn link_creates_and_refreshes() {
    let api = Arc::new(FakeApi::new(fixture()));
    let engine = engine(&api);

    let relation = workflow::link_indicators(&engine, 4, 1).await.unwrap();

    assert_eq!((relation.parent, relation.child), (4, 1));
    let children: Vec<i64> =
        engine.with_cache(|c| c.get(4).unwrap().child_ids().collect());
    assert_eq!(children, vec![1]);
    assert_eq!(api.list_calls(), 1);
}

#[tokio::test]
async fn link_refuses_self_duplicate_and_cycles() {
    let api = Arc::new(FakeApi::new(fixture()));
    let engine = engine(&api);

    for (parent, child) in [(4, 4), (1, 2), (2, 1), (2, 3)] {
        let result = workflow::link_indicators(&engine, parent, child).await;
        assert!(
            matches!(result, Err(ScorecardError::InvalidRelation { .. })),
            "{} -> {} should be refused",
            parent,
            child
        );
    }
    assert!(matches!(
        workflow::link_indicators(&engine, 1, 99).await,
        Err(ScorecardError::UnknownIndicator(99))
    ));
    assert_eq!(api.list_calls(), 0, "nothing reached the server");
}

#[tokio::test]
async fn unlink_by_pair_resolves_the_relation_id() {
    let api = Arc::new(FakeApi::new(fixture()));
    let engine = engine(&api);

    let removed = workflow::unlink_pair(&engine, 1, 2).await.unwrap();

    assert_eq!(removed, 102);
    assert_eq!(api.deleted_relations(), vec![102]);
    assert!(engine.with_cache(|c| !c.get(1).unwrap().has_children()));

    assert!(matches!(
        workflow::unlink_pair(&engine, 1, 2).await,
        Err(ScorecardError::InvalidRelation { .. })
    ));
}

#[tokio::test]
async fn board_order_is_sent_in_full() {
    let api = Arc::new(FakeApi::new(fixture()).with_boards(vec![board(1, &[10, 20, 30])]));
    let mut b = board(1, &[10, 20, 30]);

    workflow::move_category(&mut b, 2, 0).unwrap();
    assert!(workflow::assign_category(&mut b, 40));
    assert!(workflow::remove_category(&mut b, 20));
    let saved = workflow::save_board_order(api.as_ref(), &b).await.unwrap();

    assert_eq!(saved.categories, vec![30, 10, 40]);
    assert_eq!(api.board_patches().len(), 1);
    assert_eq!(api.board_patches()[0].1["categorias"], json!([30, 10, 40]));
}
