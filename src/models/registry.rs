use serde::{Deserialize, Serialize};

use super::Rule;
use crate::errors::{RuleError, RuleResult};

/// In-memory rule list with unique id assignment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    #[serde(default)]
    last_id: u32,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from loaded rules, validating them and their ids
    pub fn from_rules(rules: Vec<Rule>) -> RuleResult<Self> {
        let mut registry = Self::new();
        for rule in rules {
            rule.validate()?;
            if registry.get(rule.id).is_some() {
                return Err(RuleError::DuplicateId { id: rule.id });
            }
            registry.last_id = registry.last_id.max(rule.id);
            registry.rules.push(rule);
        }
        Ok(registry)
    }

    pub fn next_id(&mut self) -> u32 {
        self.last_id += 1;
        self.last_id
    }

    pub fn add(&mut self, rule: Rule) -> RuleResult<()> {
        rule.validate()?;
        if self.get(rule.id).is_some() {
            return Err(RuleError::DuplicateId { id: rule.id });
        }
        self.last_id = self.last_id.max(rule.id);
        self.rules.push(rule);
        Ok(())
    }

    pub fn remove(&mut self, id: u32) -> RuleResult<Rule> {
        let idx = self
            .rules
            .iter()
            .position(|r| r.id == id)
            .ok_or(RuleError::NotFound { id })?;
        Ok(self.rules.remove(idx))
    }

    /// Replace the rule with the same id, or append it
    pub fn set(&mut self, rule: Rule) -> RuleResult<()> {
        rule.validate()?;
        match self.rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => {
                self.last_id = self.last_id.max(rule.id);
                self.rules.push(rule);
            }
        }
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> impl Iterator<Item = &mut Rule> {
        self.rules.iter_mut()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.enabled)
    }

    /// Rules ordered by name, case-insensitively
    pub fn sorted(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by_key(|r| r.name.to_lowercase());
        rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
