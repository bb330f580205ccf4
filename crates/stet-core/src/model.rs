use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::Date;

/// An active task as shown on the Today page, with today's completion state.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub completed: bool,
}

impl Task {
    pub fn toggle_completed(&mut self) {
        self.completed = !self.completed;
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
    pub active: bool,
    pub created_at: i64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JournalEntry {
    pub id: String,
    pub entry_date: Date,
    pub content: String,
    pub updated_at: i64,
}

/// A task row of the history heat-map: the dates on which it was completed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HistoryTask {
    pub id: String,
    pub title: String,
    pub completions: BTreeSet<Date>,
}

impl HistoryTask {
    pub fn completed_on(&self, date: Date) -> bool {
        self.completions.contains(&date)
    }

    pub fn set_completed(&mut self, date: Date, completed: bool) {
        if completed {
            self.completions.insert(date);
        } else {
            self.completions.remove(&date);
        }
    }
}

/// Moves incomplete tasks ahead of completed ones, keeping creation order
/// within each group.
pub fn sort_by_completion(tasks: &mut [Task]) {
    tasks.sort_by_key(|task| task.completed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn task(id: &str, completed: bool) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_uppercase(),
            description: String::new(),
            completed,
        }
    }

    #[test]
    fn sort_keeps_creation_order_within_groups() {
        let mut tasks = vec![
            task("a", true),
            task("b", false),
            task("c", true),
            task("d", false),
        ];
        sort_by_completion(&mut tasks);
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn history_task_set_completed_is_idempotent() {
        let mut row = HistoryTask {
            id: "t".to_string(),
            title: "T".to_string(),
            completions: BTreeSet::new(),
        };
        let day = date!(2024 - 03 - 09);
        row.set_completed(day, true);
        row.set_completed(day, true);
        assert!(row.completed_on(day));
        assert_eq!(row.completions.len(), 1);
        row.set_completed(day, false);
        assert!(!row.completed_on(day));
    }
}
