use thiserror::Error;
use tracing::debug;

use crate::schema::{ConstituentSet, Entity, PathEdge, PlanInput, START_NODE, is_refinable_type};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Entity name must not be empty")]
    EmptyEntityName,
    #[error("Entity already exists: {0}")]
    DuplicateEntity(String),
    #[error("Entity not found: {0}")]
    UnknownEntity(String),
    #[error("Entity {name} of type {entity_type} cannot have constituents")]
    NotRefinable { name: String, entity_type: String },
    #[error("Constituent list for {0} contains an empty name")]
    EmptyConstituent(String),
}

/// Split comma-separated user input into trimmed, non-empty names.
pub fn parse_constituent_input(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accumulated exploration state for one question.
///
/// All mutation goes through these methods; planning works on a [`PlanInput`]
/// copy taken by [`Session::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct Session {
    question: String,
    entities: Vec<Entity>,
    constituents: ConstituentSet,
    edges: Vec<PathEdge>,
}

impl Session {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn constituents(&self) -> &ConstituentSet {
        &self.constituents
    }

    pub fn edges(&self) -> &[PathEdge] {
        &self.edges
    }

    /// Start over with a new question.
    pub fn reset(&mut self, question: impl Into<String>) {
        *self = Self::new(question);
    }

    /// Install freshly extracted entities, replacing any previous ones.
    pub fn set_entities(&mut self, entities: Vec<Entity>) -> Result<(), SessionError> {
        let question = std::mem::take(&mut self.question);
        self.reset(question);
        for entity in entities {
            self.add_entity(entity)?;
        }
        Ok(())
    }

    pub fn add_entity(&mut self, entity: Entity) -> Result<(), SessionError> {
        if entity.name.trim().is_empty() {
            return Err(SessionError::EmptyEntityName);
        }
        if self.entity(&entity.name).is_some() {
            return Err(SessionError::DuplicateEntity(entity.name));
        }

        if entity.is_start_node() {
            let others = self.entity_names();
            merge_unique(self.constituents.entry(START_NODE.to_string()).or_default(), others);
        } else {
            let initial = if entity.is_refinable() {
                vec![entity.name.clone()]
            } else {
                Vec::new()
            };
            self.constituents.insert(entity.name.clone(), initial);
            merge_unique(
                self.constituents.entry(START_NODE.to_string()).or_default(),
                vec![entity.name.clone()],
            );
        }

        debug!(entity = %entity.name, entity_type = %entity.entity_type, "Entity added");
        self.entities.push(entity);
        Ok(())
    }

    pub fn remove_entity(&mut self, name: &str) -> Result<Entity, SessionError> {
        let index = self
            .entities
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| SessionError::UnknownEntity(name.to_string()))?;
        let removed = self.entities.remove(index);

        // Other entities may list this name as a constituent; their edges stay.
        self.constituents.remove(name);
        self.edges.retain(|edge| edge.source != name);
        if let Some(roots) = self.constituents.get_mut(START_NODE) {
            roots.retain(|n| n != name);
        }

        Ok(removed)
    }

    /// Attach validated constituents to a refinable entity.
    pub fn add_constituents(
        &mut self,
        entity_name: &str,
        constituents: Vec<String>,
    ) -> Result<(), SessionError> {
        let entity = self
            .entity(entity_name)
            .ok_or_else(|| SessionError::UnknownEntity(entity_name.to_string()))?;
        if !is_refinable_type(&entity.entity_type) {
            return Err(SessionError::NotRefinable {
                name: entity.name.clone(),
                entity_type: entity.entity_type.clone(),
            });
        }
        if constituents.iter().any(|c| c.trim().is_empty()) {
            return Err(SessionError::EmptyConstituent(entity_name.to_string()));
        }

        let constituents: Vec<String> = constituents.iter().map(|c| c.trim().to_string()).collect();

        for constituent in &constituents {
            if !self.edges.iter().any(|edge| edge.connects(entity_name, constituent)) {
                self.edges.push(PathEdge::constituent(entity_name, constituent.clone()));
            }
        }
        merge_unique(
            self.constituents.entry(entity_name.to_string()).or_default(),
            constituents,
        );

        Ok(())
    }

    pub fn remove_constituent(
        &mut self,
        entity_name: &str,
        constituent: &str,
    ) -> Result<(), SessionError> {
        let list = self
            .constituents
            .get_mut(entity_name)
            .ok_or_else(|| SessionError::UnknownEntity(entity_name.to_string()))?;
        list.retain(|c| c != constituent);
        self.edges.retain(|edge| !edge.connects(entity_name, constituent));
        Ok(())
    }

    /// Copy of the current state, immune to later mutation.
    pub fn snapshot(&self) -> PlanInput {
        PlanInput {
            entities: self.entities.clone(),
            constituents: self.constituents.clone(),
            edges: self.edges.clone(),
        }
    }

    fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    fn entity_names(&self) -> Vec<String> {
        self.entities
            .iter()
            .filter(|e| !e.is_start_node())
            .map(|e| e.name.clone())
            .collect()
    }
}

fn merge_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Session {
        let mut session = Session::new("Does coffee affect sleep?");
        session
            .set_entities(vec![
                Entity::new(START_NODE, ""),
                Entity::new("coffee", "Food"),
                Entity::new("sleep", "Phenotype"),
            ])
            .unwrap();
        session
    }

    #[test]
    fn test_parse_constituent_input() {
        assert_eq!(
            parse_constituent_input(" caffeine, ,trigonelline ,"),
            vec!["caffeine".to_string(), "trigonelline".to_string()]
        );
        assert!(parse_constituent_input(" , ").is_empty());
    }

    #[test]
    fn test_initial_constituents() {
        let session = seeded();
        assert_eq!(session.constituents()["coffee"], vec!["coffee".to_string()]);
        assert!(session.constituents()["sleep"].is_empty());
        assert_eq!(
            session.constituents()[START_NODE],
            vec!["coffee".to_string(), "sleep".to_string()]
        );
    }

    #[test]
    fn test_add_constituents_merges_and_records_edges() {
        let mut session = seeded();
        session
            .add_constituents("coffee", vec!["caffeine".into(), "coffee".into()])
            .unwrap();
        session
            .add_constituents("coffee", vec!["caffeine".into(), "trigonelline".into()])
            .unwrap();

        assert_eq!(
            session.constituents()["coffee"],
            vec![
                "coffee".to_string(),
                "caffeine".to_string(),
                "trigonelline".to_string()
            ]
        );
        let caffeine_edges = session
            .edges()
            .iter()
            .filter(|e| e.connects("coffee", "caffeine"))
            .count();
        assert_eq!(caffeine_edges, 1);
    }

    #[test]
    fn test_add_constituents_validation() {
        let mut session = seeded();
        assert_eq!(
            session.add_constituents("coffee", vec!["caffeine".into(), "".into()]),
            Err(SessionError::EmptyConstituent("coffee".into()))
        );
        assert!(matches!(
            session.add_constituents("sleep", vec!["melatonin".into()]),
            Err(SessionError::NotRefinable { .. })
        ));
        assert_eq!(
            session.add_constituents("tea", vec!["theanine".into()]),
            Err(SessionError::UnknownEntity("tea".into()))
        );
        // Rejected input leaves no trace
        assert_eq!(session.constituents()["coffee"], vec!["coffee".to_string()]);
        assert!(session.edges().is_empty());
    }

    #[test]
    fn test_remove_constituent() {
        let mut session = seeded();
        session
            .add_constituents("coffee", vec!["caffeine".into()])
            .unwrap();
        session.remove_constituent("coffee", "caffeine").unwrap();
        assert_eq!(session.constituents()["coffee"], vec!["coffee".to_string()]);
        assert!(session.edges().is_empty());
    }

    #[test]
    fn test_entity_lifecycle() {
        let mut session = seeded();
        assert_eq!(
            session.add_entity(Entity::new("coffee", "Drug")),
            Err(SessionError::DuplicateEntity("coffee".into()))
        );
        session.add_entity(Entity::new("aspirin", "Drug")).unwrap();
        assert!(session.constituents()[START_NODE].contains(&"aspirin".to_string()));

        session.remove_entity("aspirin").unwrap();
        assert!(!session.constituents().contains_key("aspirin"));
        assert!(!session.constituents()[START_NODE].contains(&"aspirin".to_string()));
    }

    #[test]
    fn test_remove_entity_keeps_edges_of_other_entities() {
        let mut session = Session::new("Does coffee interact with caffeine?");
        session
            .set_entities(vec![
                Entity::new("coffee", "Food"),
                Entity::new("caffeine", "Drug"),
            ])
            .unwrap();
        session
            .add_constituents("coffee", vec!["caffeine".into()])
            .unwrap();

        session.remove_entity("caffeine").unwrap();

        assert_eq!(
            session.constituents()["coffee"],
            vec!["coffee".to_string(), "caffeine".to_string()]
        );
        assert!(
            session
                .edges()
                .iter()
                .any(|e| e.connects("coffee", "caffeine"))
        );
    }

    #[test]
    fn test_remove_entity_drops_its_own_edges() {
        let mut session = seeded();
        session
            .add_constituents("coffee", vec!["caffeine".into()])
            .unwrap();
        session.remove_entity("coffee").unwrap();
        assert!(session.edges().is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut session = seeded();
        let snapshot = session.snapshot();
        session
            .add_constituents("coffee", vec!["caffeine".into()])
            .unwrap();
        assert_eq!(snapshot.constituents["coffee"], vec!["coffee".to_string()]);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut session = seeded();
        session.reset("What is in green tea?");
        assert_eq!(session.question(), "What is in green tea?");
        assert!(session.entities().is_empty());
        assert!(session.constituents().is_empty());
    }
}
