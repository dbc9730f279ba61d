#![allow(dead_code)]

use async_trait::async_trait;
use scorecard::model::{
    Bsc, BscDraft, BoardId, Category, CategoryDraft, CategoryId, Indicator, IndicatorDraft,
    IndicatorId, Patch, Relation, RelationId, RelationRef,
};
use scorecard::{Result, ScorecardApi, ScorecardError};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
struct FakeState {
    indicators: Vec<Indicator>,
    categories: Vec<Category>,
    boards: Vec<Bsc>,
    next_id: i64,
    failing_patches: HashSet<IndicatorId>,
    patches: Vec<(IndicatorId, Patch)>,
    board_patches: Vec<(BoardId, Patch)>,
    list_calls: usize,
    deleted_relations: Vec<RelationId>,
}

type PatchProbe = Box<dyn Fn(IndicatorId) + Send + Sync>;

/// In-memory server with failure injection and a request log.
pub struct FakeApi {
    state: Mutex<FakeState>,
    probe: Mutex<Option<PatchProbe>>,
}

impl FakeApi {
    pub fn new(indicators: Vec<Indicator>) -> Self {
        FakeApi {
            state: Mutex::new(FakeState {
                indicators,
                next_id: 1000,
                ..FakeState::default()
            }),
            probe: Mutex::new(None),
        }
    }

    pub fn with_boards(self, boards: Vec<Bsc>) -> Self {
        self.state.lock().unwrap().boards = boards;
        self
    }

    /// Runs `probe` as each indicator PATCH arrives, before it is handled.
    pub fn on_patch(&self, probe: impl Fn(IndicatorId) + Send + Sync + 'static) {
        *self.probe.lock().unwrap() = Some(Box::new(probe));
    }

    /// Every PATCH to this indicator answers 400.
    pub fn fail_patches_for(&self, id: IndicatorId) {
        self.state.lock().unwrap().failing_patches.insert(id);
    }

    pub fn patches(&self) -> Vec<(IndicatorId, Patch)> {
        self.state.lock().unwrap().patches.clone()
    }

    pub fn board_patches(&self) -> Vec<(BoardId, Patch)> {
        self.state.lock().unwrap().board_patches.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn deleted_relations(&self) -> Vec<RelationId> {
        self.state.lock().unwrap().deleted_relations.clone()
    }

    pub fn stored(&self, id: IndicatorId) -> Option<Indicator> {
        self.state
            .lock()
            .unwrap()
            .indicators
            .iter()
            .find(|i| i.id == id)
            .cloned()
    }

    /// Overwrites a stored record behind the client's back.
    pub fn server_side_update(&self, indicator: Indicator) {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.indicators.iter_mut().find(|i| i.id == indicator.id) {
            *slot = indicator;
        }
    }
}

fn merge<T: serde::Serialize + serde::de::DeserializeOwned>(record: &T, patch: &Patch) -> T {
    let mut value = serde_json::to_value(record).unwrap();
    if let Value::Object(map) = &mut value {
        for (k, v) in patch {
            map.insert(k.clone(), v.clone());
        }
    }
    serde_json::from_value(value).unwrap()
}

pub fn child_ref(rel_id: RelationId, id: IndicatorId) -> RelationRef {
    RelationRef {
        rel_id,
        id,
        n: None,
        name: None,
    }
}

/// Indicator fixture with a name, categories and declared children.
pub fn indicator(id: IndicatorId, categories: &[CategoryId], children: &[IndicatorId]) -> Indicator {
    let mut ind = Indicator::new(id);
    ind.name = Some(format!("Indicador {}", id));
    ind.categories = categories.to_vec();
    ind.children = children.iter().map(|&c| child_ref(id * 100 + c, c)).collect();
    ind
}

pub fn board(id: BoardId, categories: &[CategoryId]) -> Bsc {
    Bsc {
        id,
        name: format!("BSC {}", id),
        categories: categories.to_vec(),
        category_details: categories
            .iter()
            .map(|&c| Category {
                id: c,
                name: format!("Categoria {}", c),
                description: None,
                boards: vec![id],
            })
            .collect(),
    }
}

#[async_trait]
impl ScorecardApi for FakeApi {
    async fn list_indicators(&self) -> Result<Vec<Indicator>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Ok(state.indicators.clone())
    }

    async fn get_indicator(&self, id: IndicatorId) -> Result<Indicator> {
        self.stored(id).ok_or(ScorecardError::rejected(404, "not found"))
    }

    async fn create_indicator(&self, draft: &IndicatorDraft) -> Result<Indicator> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let mut ind = Indicator::new(state.next_id);
        ind.name = Some(draft.name.clone());
        ind.categories = draft.categories.clone();
        ind.comparison = Some(draft.comparison);
        state.indicators.push(ind.clone());
        Ok(ind)
    }

    async fn patch_indicator(&self, id: IndicatorId, patch: Patch) -> Result<Indicator> {
        if let Some(probe) = self.probe.lock().unwrap().as_ref() {
            probe(id);
        }
        let mut state = self.state.lock().unwrap();
        state.patches.push((id, patch.clone()));
        if state.failing_patches.contains(&id) {
            return Err(ScorecardError::rejected(400, "{\"detail\":\"invalid\"}"));
        }
        let slot = state
            .indicators
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(ScorecardError::rejected(404, "not found"))?;
        *slot = merge(slot, &patch);
        Ok(slot.clone())
    }

    async fn delete_indicator(&self, id: IndicatorId) -> Result<()> {
        self.state.lock().unwrap().indicators.retain(|i| i.id != id);
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.state.lock().unwrap().categories.clone())
    }

    async fn create_category(&self, draft: &CategoryDraft) -> Result<Category> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let category = Category {
            id: state.next_id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            boards: Vec::new(),
        };
        state.categories.push(category.clone());
        Ok(category)
    }

    async fn patch_category(&self, id: CategoryId, patch: Patch) -> Result<Category> {
        let mut state = self.state.lock().unwrap();
        let slot = state
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(ScorecardError::rejected(404, "not found"))?;
        *slot = merge(slot, &patch);
        Ok(slot.clone())
    }

    async fn delete_category(&self, id: CategoryId) -> Result<()> {
        self.state.lock().unwrap().categories.retain(|c| c.id != id);
        Ok(())
    }

    async fn list_boards(&self) -> Result<Vec<Bsc>> {
        Ok(self.state.lock().unwrap().boards.clone())
    }

    async fn get_board(&self, id: BoardId) -> Result<Bsc> {
        self.state
            .lock()
            .unwrap()
            .boards
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(ScorecardError::UnknownBoard(id))
    }

    async fn create_board(&self, draft: &BscDraft) -> Result<Bsc> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let board = Bsc {
            id: state.next_id,
            name: draft.name.clone(),
            categories: draft.categories.clone(),
            category_details: Vec::new(),
        };
        state.boards.push(board.clone());
        Ok(board)
    }

    async fn patch_board(&self, id: BoardId, patch: Patch) -> Result<Bsc> {
        let mut state = self.state.lock().unwrap();
        state.board_patches.push((id, patch.clone()));
        let slot = state
            .boards
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(ScorecardError::UnknownBoard(id))?;
        *slot = merge(slot, &patch);
        Ok(slot.clone())
    }

    async fn delete_board(&self, id: BoardId) -> Result<()> {
        self.state.lock().unwrap().boards.retain(|b| b.id != id);
        Ok(())
    }

    async fn create_relation(&self, parent: IndicatorId, child: IndicatorId) -> Result<Relation> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        for ind in state.indicators.iter_mut() {
            if ind.id == parent {
                ind.children.push(child_ref(id, child));
            }
            if ind.id == child {
                ind.parents.push(child_ref(id, parent));
            }
        }
        Ok(Relation { id, parent, child })
    }

    async fn delete_relation(&self, id: RelationId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.deleted_relations.push(id);
        for ind in state.indicators.iter_mut() {
            ind.children.retain(|r| r.rel_id != id);
            ind.parents.retain(|r| r.rel_id != id);
        }
        Ok(())
    }
}
