use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use crate::combinations::{cartesian_product, combinations_of};
use crate::schema::{Combination, Entity, Plan, PlanInput, PlannedCombination, Term};

/// Entities with more constituents than this are split into single-constituent
/// alternatives; smaller lists are queried as one alternative.
pub const SPLIT_THRESHOLD: usize = 2;

/// Subset size used when splitting a constituent list.
pub const SUBSET_SIZE: usize = 1;

/// How two flattened combinations are compared during deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupStrategy {
    /// Pair sequences must match position by position.
    #[default]
    Ordered,
    /// Pair sequences are sorted before comparison.
    Canonical,
}

/// An entity's alternatives: each is a group of terms contributed as a unit.
pub type Alternatives = Vec<Vec<Term>>;

#[derive(Debug, Clone, Default)]
pub struct QueryPlanner {
    dedup: DedupStrategy,
}

impl QueryPlanner {
    pub fn new(dedup: DedupStrategy) -> Self {
        Self { dedup }
    }

    /// Expand the session state into a batch of uniquely identified combinations.
    ///
    /// Inputs are assumed validated: every constituent is a non-empty, trimmed string.
    pub fn plan(&self, input: &PlanInput) -> Plan {
        let input = input.without_start_node();

        let per_entity: Vec<Alternatives> = input
            .entities
            .iter()
            .map(|entity| {
                let constituents = input
                    .constituents
                    .get(&entity.name)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                alternatives_for(entity, constituents)
            })
            .collect();

        let combinations = if per_entity.is_empty() {
            Vec::new()
        } else {
            self.unique_combinations(&per_entity)
        };

        let plan = Plan {
            batch_id: Uuid::new_v4().to_string(),
            combinations: combinations
                .into_iter()
                .map(|combination| PlannedCombination {
                    id: Uuid::new_v4().to_string(),
                    combination,
                })
                .collect(),
            constituents: input.constituents,
            edges: input.edges,
        };

        debug!(
            batch_id = %plan.batch_id,
            entities = per_entity.len(),
            combinations = plan.combinations.len(),
            "Planned batch"
        );

        plan
    }

    fn unique_combinations(&self, per_entity: &[Alternatives]) -> Vec<Combination> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();

        for row in cartesian_product(per_entity) {
            let terms: Vec<Term> = row.into_iter().flatten().collect();
            let key = match self.dedup {
                DedupStrategy::Ordered => terms.clone(),
                DedupStrategy::Canonical => {
                    let mut sorted = terms.clone();
                    sorted.sort();
                    sorted
                }
            };
            if seen.insert(key) {
                unique.push(Combination(terms));
            }
        }

        unique
    }
}

/// Alternatives contributed by one entity, in emission order.
pub fn alternatives_for(entity: &Entity, constituents: &[String]) -> Alternatives {
    let typed = |names: Vec<String>| -> Vec<Term> {
        names
            .into_iter()
            .map(|name| Term::new(name, entity.entity_type.clone()))
            .collect()
    };

    let mut alternatives = Vec::new();

    if constituents.len() > SPLIT_THRESHOLD {
        alternatives.extend(combinations_of(constituents, SUBSET_SIZE).map(typed));
    } else if !constituents.is_empty() {
        alternatives.push(typed(constituents.to_vec()));
    }
    alternatives.push(vec![Term::new(
        entity.name.clone(),
        entity.entity_type.clone(),
    )]);

    alternatives
}
