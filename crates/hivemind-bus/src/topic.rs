//! Topic naming and pattern matching.

use crate::BusError;

/// Topic conventions shared by publishers and consumers.
pub mod topics {
    /// Every heartbeat.
    pub const HEALTH_ALL: &str = "health.*";
    /// Every task-created notification.
    pub const TASK_ALL: &str = "task.*";
    /// Every published metric.
    pub const METRICS_ALL: &str = "metrics.#";

    /// `health.<worker>`
    pub fn health(worker: &str) -> String {
        format!("health.{}", segment(worker))
    }

    /// `task.<type>`
    pub fn task(task_type: &str) -> String {
        format!("task.{}", segment(task_type))
    }

    /// `metrics.<worker>.<metric>`
    pub fn metric(worker: &str, metric: &str) -> String {
        format!("metrics.{}.{}", segment(worker), segment(metric))
    }

    /// Make a name usable as one routing-key word.
    pub fn segment(name: &str) -> String {
        let cleaned: String = name
            .trim()
            .chars()
            .map(|c| match c {
                '.' | ' ' | '*' | '#' => '-',
                c => c,
            })
            .collect();
        if cleaned.is_empty() {
            "_".to_string()
        } else {
            cleaned
        }
    }
}

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    words: Vec<String>,
}

impl TopicPattern {
    /// Parse a dotted pattern. Empty words are rejected.
    pub fn parse(pattern: &str) -> Result<Self, BusError> {
        if pattern.is_empty() || pattern.split('.').any(str::is_empty) {
            return Err(BusError::InvalidTopic(pattern.to_string()));
        }
        Ok(Self {
            raw: pattern.to_string(),
            words: pattern.split('.').map(str::to_string).collect(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// AMQP topic-exchange semantics.
    pub fn matches(&self, topic: &str) -> bool {
        let topic: Vec<&str> = topic.split('.').collect();
        let pattern: Vec<&str> = self.words.iter().map(String::as_str).collect();
        match_words(&pattern, &topic)
    }
}

fn match_words(pattern: &[&str], topic: &[&str]) -> bool {
    match pattern.split_first() {
        None => topic.is_empty(),
        Some((&"#", rest)) => (0..=topic.len()).any(|skip| match_words(rest, &topic[skip..])),
        Some((&"*", rest)) => !topic.is_empty() && match_words(rest, &topic[1..]),
        Some((word, rest)) => {
            topic.first().is_some_and(|t| t == word) && match_words(rest, &topic[1..])
        }
    }
}
