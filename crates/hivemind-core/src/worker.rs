//! Worker templates.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

static CLONE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Configuration shared by every instance of a worker role.
///
/// Instances cloned from a template keep everything but the name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Unique instance name.
    pub name: String,

    /// Task type this worker pulls (e.g. "quiz").
    pub worker_type: String,

    /// Human-readable role.
    #[serde(default)]
    pub role: String,

    /// What the worker is for.
    #[serde(default)]
    pub goal: String,

    /// Free-form persona text passed to the executor.
    #[serde(default)]
    pub backstory: String,

    /// Model the executor should use.
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub allow_delegation: bool,

    /// Name of the template this instance was cloned from. Equal to `name`
    /// for originals.
    #[serde(default)]
    pub template: String,
}

impl WorkerSpec {
    /// Create a new template with minimal required fields.
    pub fn new(name: impl Into<String>, worker_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            template: name.clone(),
            name,
            worker_type: worker_type.into(),
            role: String::new(),
            goal: String::new(),
            backstory: String::new(),
            model: String::new(),
            allow_delegation: false,
        }
    }

    /// Builder method to set the role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Builder method to set the goal.
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }

    /// Builder method to set the backstory.
    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = backstory.into();
        self
    }

    /// Builder method to set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Same configuration under a new unique name: `<template>-<unix millis>-<seq>`.
    pub fn derive_clone(&self) -> Self {
        let seq = CLONE_SEQ.fetch_add(1, Ordering::Relaxed);
        let template = if self.template.is_empty() {
            self.name.clone()
        } else {
            self.template.clone()
        };

        Self {
            name: format!("{}-{}-{}", template, Utc::now().timestamp_millis(), seq),
            template,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_clone_keeps_configuration() {
        let spec = WorkerSpec::new("quiz-worker", "quiz")
            .with_role("Quiz specialist")
            .with_goal("Write quizzes")
            .with_model("llama-3.3-70b");

        let clone = spec.derive_clone();

        assert_ne!(clone.name, spec.name);
        assert!(clone.name.starts_with("quiz-worker-"));
        assert_eq!(clone.template, "quiz-worker");
        assert_eq!(clone.worker_type, spec.worker_type);
        assert_eq!(clone.role, spec.role);
        assert_eq!(clone.goal, spec.goal);
        assert_eq!(clone.model, spec.model);
    }

    #[test]
    fn test_clone_of_clone_stays_in_template() {
        let spec = WorkerSpec::new("quiz-worker", "quiz");
        let first = spec.derive_clone();
        let second = first.derive_clone();

        assert_ne!(first.name, second.name);
        assert_eq!(second.template, "quiz-worker");
    }
}
