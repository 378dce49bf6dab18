use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved pseudo-entity at the root of the user's exploration.
pub const START_NODE: &str = "start_node";

/// Entity types whose members may be refined into constituents.
pub const REFINABLE_TYPES: [&str; 3] = ["Food", "Metabolite", "Drug"];

/// Label recorded on every entity -> constituent edge.
pub const CONSTITUENT_LABEL: &str = "contains constituent";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub entity_type: String,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
        }
    }

    pub fn is_start_node(&self) -> bool {
        self.name == START_NODE
    }

    pub fn is_refinable(&self) -> bool {
        is_refinable_type(&self.entity_type)
    }
}

pub fn is_refinable_type(entity_type: &str) -> bool {
    REFINABLE_TYPES.contains(&entity_type)
}

/// Entity name -> ordered, duplicate-free constituent names.
pub type ConstituentSet = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEdge {
    pub source: String,
    pub target: String,
    pub label: String,
}

impl PathEdge {
    pub fn constituent(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: CONSTITUENT_LABEL.to_string(),
        }
    }

    pub fn connects(&self, source: &str, target: &str) -> bool {
        self.source == source && self.target == target
    }
}

/// One `(term, type)` pair inside a combination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term {
    pub term: String,
    pub term_type: String,
}

impl Term {
    pub fn new(term: impl Into<String>, term_type: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            term_type: term_type.into(),
        }
    }
}

/// A full cross-entity selection of terms, flattened in entity order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combination(pub Vec<Term>);

impl Combination {
    pub fn terms(&self) -> &[Term] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Immutable inputs captured when a run starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanInput {
    pub entities: Vec<Entity>,
    pub constituents: ConstituentSet,
    pub edges: Vec<PathEdge>,
}

impl PlanInput {
    /// Drops `start_node` from entities, constituents and edges.
    pub fn without_start_node(&self) -> PlanInput {
        PlanInput {
            entities: self
                .entities
                .iter()
                .filter(|e| !e.is_start_node())
                .cloned()
                .collect(),
            constituents: self
                .constituents
                .iter()
                .filter(|(name, _)| name.as_str() != START_NODE)
                .map(|(name, list)| (name.clone(), list.clone()))
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|edge| edge.source != START_NODE)
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedCombination {
    pub id: String,
    pub combination: Combination,
}

/// Output of the planner: one batch worth of identified combinations plus the
/// `start_node`-free context every submission carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub batch_id: String,
    pub combinations: Vec<PlannedCombination>,
    pub constituents: ConstituentSet,
    pub edges: Vec<PathEdge>,
}

impl Plan {
    pub fn combination_ids(&self) -> Vec<String> {
        self.combinations.iter().map(|c| c.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }
}
