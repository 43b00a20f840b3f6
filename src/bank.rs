//! Read-only item bank shared by adaptive sessions.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::{CatError, CatResult};
use crate::params::{ItemParams, Model};

/// One bank record: an item id with its phase-1 and optional phase-2 calibration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankItem {
    pub id: String,
    pub phase1: ItemParams,
    pub phase2: Option<ItemParams>,
}

impl BankItem {
    pub fn new(id: impl Into<String>, phase1: ItemParams) -> Self {
        BankItem {
            id: id.into(),
            phase1,
            phase2: None,
        }
    }

    pub fn with_phase2(mut self, phase2: ItemParams) -> Self {
        self.phase2 = Some(phase2);
        self
    }
}

/// Items keyed by id, iterated in construction order.
///
/// Within a phase every item uses the same response model.
#[derive(Debug, Clone)]
pub struct ItemBank {
    items: Vec<BankItem>,
    index: HashMap<String, usize>,
    phase1_model: Model,
    phase2_model: Option<Model>,
}

impl ItemBank {
    pub fn new(items: Vec<BankItem>) -> CatResult<Self> {
        let first = items.first().ok_or(CatError::Empty("item bank"))?;
        let phase1_model = first.phase1.model();
        let phase2_model = items
            .iter()
            .find_map(|item| item.phase2.as_ref().map(ItemParams::model));

        let mut index = HashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            if index.insert(item.id.clone(), position).is_some() {
                return Err(CatError::DuplicateItem(item.id.clone()));
            }
            check_model(position, phase1_model, &item.phase1)?;
            if let (Some(model), Some(params)) = (phase2_model, &item.phase2) {
                check_model(position, model, params)?;
            }
        }

        Ok(ItemBank {
            items,
            index,
            phase1_model,
            phase2_model,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&BankItem> {
        self.index.get(id).map(|&position| &self.items[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &BankItem> {
        self.items.iter()
    }

    pub fn phase1_model(&self) -> Model {
        self.phase1_model
    }

    /// Model of the phase-2 calibration, `None` when no item carries one.
    pub fn phase2_model(&self) -> Option<Model> {
        self.phase2_model
    }

    pub fn phase1_params(&self, id: &str) -> CatResult<&ItemParams> {
        self.get(id)
            .map(|item| &item.phase1)
            .ok_or_else(|| CatError::UnknownItem(id.to_string()))
    }

    pub fn phase2_params(&self, id: &str) -> CatResult<&ItemParams> {
        let item = self
            .get(id)
            .ok_or_else(|| CatError::UnknownItem(id.to_string()))?;
        item.phase2.as_ref().ok_or_else(|| CatError::IncompleteItem {
            id: id.to_string(),
            what: "phase 2 params",
        })
    }
}

fn check_model(position: usize, expected: Model, params: &ItemParams) -> CatResult<()> {
    if params.model() != expected {
        return Err(CatError::ModelMismatch {
            index: position,
            expected: expected.name(),
            found: params.model().name(),
        });
    }
    Ok(())
}
