use crate::api::ScorecardApi;
use crate::error::{Result, ScorecardError};
use crate::model::{Bsc, CategoryId, Indicator, IndicatorId, Patch, Relation, RelationId};
use crate::relations::RelationGraph;
use crate::sync::SyncEngine;
use futures::future::join_all;
use log::{error, info, warn};
use serde_json::{Value, json};

/// Gives every indicator connected to `start` the same category list.
///
/// The group is resolved over parent and child links in both directions,
/// then one `PATCH {categorias}` per member is sent concurrently. Members
/// that succeeded are updated in the cache even when another one failed;
/// the first failure is returned.
///
/// # Arguments
/// * `engine` - Sync engine holding the cache and the API
/// * `start` - Any indicator of the group
/// * `categories` - Full category list to assign
///
/// # Returns
/// * `Ok(Vec<IndicatorId>)` - The group members, ascending
/// * `Err(ScorecardError)` - Unknown start indicator or the first failed request
pub async fn assign_group_categories<A: ScorecardApi + 'static>(
    engine: &SyncEngine<A>,
    start: IndicatorId,
    categories: Vec<CategoryId>,
) -> Result<Vec<IndicatorId>> {
    let graph = RelationGraph::build(&engine.snapshot());
    if !graph.contains(start) {
        return Err(ScorecardError::UnknownIndicator(start));
    }
    let members: Vec<IndicatorId> = graph.group(start).into_iter().collect();
    info!(
        "assigning categories {:?} to {} related indicators",
        categories,
        members.len()
    );

    let requests = members.iter().map(|&id| {
        let api = engine.api().clone();
        let mut patch = Patch::new();
        patch.insert("categorias".into(), json!(categories));
        async move { (id, api.patch_indicator(id, patch).await) }
    });

    let mut first_error = None;
    for (id, result) in join_all(requests).await {
        match result {
            Ok(_) => {
                engine.with_cache(|cache| cache.set_categories(id, categories.clone()));
            }
            Err(err) => {
                error!("failed to assign categories to indicator {}: {}", id, err);
                first_error.get_or_insert(err);
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(members),
    }
}

/// Checks a prospective parent/child link against the cached graph.
pub fn check_link(graph: &RelationGraph, parent: IndicatorId, child: IndicatorId) -> Result<()> {
    let refuse = |reason: &str| ScorecardError::InvalidRelation {
        parent,
        child,
        reason: reason.to_string(),
    };
    if !graph.contains(parent) {
        return Err(ScorecardError::UnknownIndicator(parent));
    }
    if !graph.contains(child) {
        return Err(ScorecardError::UnknownIndicator(child));
    }
    if parent == child {
        return Err(refuse("an indicator cannot be its own child"));
    }
    if graph.relation_id(parent, child).is_some() {
        return Err(refuse("already linked"));
    }
    if graph.would_create_cycle(parent, child) {
        return Err(refuse("the child already reaches the parent"));
    }
    Ok(())
}

/// Creates a parent/child relation after local validation, then refreshes.
pub async fn link_indicators<A: ScorecardApi + 'static>(
    engine: &SyncEngine<A>,
    parent: IndicatorId,
    child: IndicatorId,
) -> Result<Relation> {
    check_link(&RelationGraph::build(&engine.snapshot()), parent, child)?;
    let relation = engine.api().create_relation(parent, child).await?;
    info!("linked {} -> {} as relation {}", parent, child, relation.id);
    refresh_quietly(engine).await;
    Ok(relation)
}

pub async fn unlink<A: ScorecardApi + 'static>(
    engine: &SyncEngine<A>,
    relation: RelationId,
) -> Result<()> {
    engine.api().delete_relation(relation).await?;
    info!("removed relation {}", relation);
    refresh_quietly(engine).await;
    Ok(())
}

/// Removes the link between two indicators, looked up in the cached graph.
pub async fn unlink_pair<A: ScorecardApi + 'static>(
    engine: &SyncEngine<A>,
    parent: IndicatorId,
    child: IndicatorId,
) -> Result<RelationId> {
    let graph = RelationGraph::build(&engine.snapshot());
    let relation = graph
        .relation_id(parent, child)
        .ok_or_else(|| ScorecardError::InvalidRelation {
            parent,
            child,
            reason: "not linked".into(),
        })?;
    unlink(engine, relation).await?;
    Ok(relation)
}

async fn refresh_quietly<A: ScorecardApi + 'static>(engine: &SyncEngine<A>) {
    if let Err(err) = engine.refresh().await {
        warn!("refresh after relation change failed: {}", err);
    }
}

/// Appends a category to the board unless it is already there.
pub fn assign_category(board: &mut Bsc, category: CategoryId) -> bool {
    if board.categories.contains(&category) {
        return false;
    }
    board.categories.push(category);
    true
}

pub fn remove_category(board: &mut Bsc, category: CategoryId) -> bool {
    let before = board.categories.len();
    board.categories.retain(|&c| c != category);
    board.categories.len() != before
}

/// Moves the category at `from` to position `to`, shifting the rest.
pub fn move_category(board: &mut Bsc, from: usize, to: usize) -> Result<()> {
    let len = board.categories.len();
    if from >= len || to >= len {
        return Err(ScorecardError::InvalidMove { from, to, len });
    }
    let category = board.categories.remove(from);
    board.categories.insert(to, category);
    Ok(())
}

/// Same as [`move_category`] with one-based positions; `0` is refused.
pub fn move_category_by_position(board: &mut Bsc, from: usize, to: usize) -> Result<()> {
    match (from.checked_sub(1), to.checked_sub(1)) {
        (Some(from), Some(to)) => move_category(board, from, to),
        _ => Err(ScorecardError::InvalidMove {
            from,
            to,
            len: board.categories.len(),
        }),
    }
}

/// Sends the board's full ordered category list.
pub async fn save_board_order<A: ScorecardApi + ?Sized>(api: &A, board: &Bsc) -> Result<Bsc> {
    let mut patch = Patch::new();
    patch.insert(
        "categorias".into(),
        Value::Array(board.categories.iter().map(|&c| json!(c)).collect()),
    );
    api.patch_board(board.id, patch).await
}

/// Indicators that sit in at least one of the board's categories.
pub fn board_indicators<'a>(board: &Bsc, indicators: &'a [Indicator]) -> Vec<&'a Indicator> {
    indicators.iter().filter(|i| board.includes(i)).collect()
}
