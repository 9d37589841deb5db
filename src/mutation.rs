//! Optimistic local updates with explicit compensation.
//!
//! A view model is changed first, then the store write runs. If the write
//! fails the command's `revert` puts the view model back.

use crate::errors::AppResult;
use crate::progress::{progress_of, Completable};
use serde::Serialize;

pub trait Compensable<S> {
    fn apply(&self, state: &mut S);
    fn revert(&self, state: &mut S);
    fn describe(&self) -> String;
}

pub fn apply_optimistically<S, C, W>(state: &mut S, command: &C, write: W) -> AppResult<()>
where
    C: Compensable<S>,
    W: FnOnce() -> AppResult<()>,
{
    command.apply(state);
    if let Err(error) = write() {
        command.revert(state);
        tracing::warn!(command = %command.describe(), error = %error, "store write failed, reverted local change");
        return Err(error);
    }
    Ok(())
}

/// Set one item's completion flag, remembering the flag it replaced.
#[derive(Debug, Clone)]
pub struct ToggleCompletion {
    pub item_id: String,
    pub completed: bool,
    previous: std::cell::Cell<Option<bool>>,
}

impl ToggleCompletion {
    pub fn new(item_id: impl Into<String>, completed: bool) -> Self {
        Self {
            item_id: item_id.into(),
            completed,
            previous: std::cell::Cell::new(None),
        }
    }
}

impl<T: Completable> Compensable<Vec<T>> for ToggleCompletion {
    fn apply(&self, state: &mut Vec<T>) {
        if let Some(item) = state.iter_mut().find(|item| item.item_id() == self.item_id) {
            self.previous.set(Some(item.is_completed()));
            item.set_completed(self.completed);
        }
    }

    fn revert(&self, state: &mut Vec<T>) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        if let Some(item) = state.iter_mut().find(|item| item.item_id() == self.item_id) {
            item.set_completed(previous);
        }
    }

    fn describe(&self) -> String {
        format!("toggle {} -> {}", self.item_id, self.completed)
    }
}

/// Remove one item, remembering where it sat so it can be put back.
pub struct RemoveItem<T> {
    item_id: String,
    removed: std::cell::RefCell<Option<(usize, T)>>,
}

impl<T> RemoveItem<T> {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            removed: std::cell::RefCell::new(None),
        }
    }
}

impl<T: Completable> Compensable<Vec<T>> for RemoveItem<T> {
    fn apply(&self, state: &mut Vec<T>) {
        if let Some(index) = state.iter().position(|item| item.item_id() == self.item_id) {
            let item = state.remove(index);
            *self.removed.borrow_mut() = Some((index, item));
        }
    }

    fn revert(&self, state: &mut Vec<T>) {
        if let Some((index, item)) = self.removed.borrow_mut().take() {
            state.insert(index.min(state.len()), item);
        }
    }

    fn describe(&self) -> String {
        format!("remove {}", self.item_id)
    }
}

/// Ordered list of completable items with its derived progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList<T> {
    pub items: Vec<T>,
    pub completed_first: bool,
}

impl<T: Completable + Clone> TaskList<T> {
    pub fn new(items: Vec<T>, completed_first: bool) -> Self {
        Self { items, completed_first }
    }

    pub fn progress(&self) -> u8 {
        progress_of(&self.items)
    }

    /// Items in display order. The completed-first sort is stable, so ties
    /// keep their store order.
    pub fn ordered(&self) -> Vec<T> {
        let mut items = self.items.clone();
        if self.completed_first {
            items.sort_by_key(|item| !item.is_completed());
        }
        items
    }

    pub fn toggle(&mut self, item_id: &str, completed: bool, write: impl FnOnce() -> AppResult<()>) -> AppResult<()> {
        apply_optimistically(&mut self.items, &ToggleCompletion::new(item_id, completed), write)
    }

    pub fn remove(&mut self, item_id: &str, write: impl FnOnce() -> AppResult<()>) -> AppResult<()> {
        apply_optimistically(&mut self.items, &RemoveItem::new(item_id), write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: &'static str,
        done: bool,
    }

    impl Completable for Item {
        fn item_id(&self) -> &str {
            self.id
        }

        fn is_completed(&self) -> bool {
            self.done
        }

        fn set_completed(&mut self, completed: bool) {
            self.done = completed;
        }
    }

    fn items() -> Vec<Item> {
        vec![
            Item { id: "a", done: false },
            Item { id: "b", done: true },
            Item { id: "c", done: false },
        ]
    }

    #[test]
    fn toggle_keeps_change_when_write_succeeds() {
        let mut list = TaskList::new(items(), false);
        list.toggle("a", true, || Ok(())).expect("toggle");
        assert!(list.items[0].done);
        assert_eq!(list.progress(), 67);
    }

    #[test]
    fn toggle_reverts_when_write_fails() {
        let mut list = TaskList::new(items(), false);
        let result = list.toggle("a", true, || Err(AppError::Store("disk full".to_string())));
        assert!(matches!(result, Err(AppError::Store(_))));
        assert_eq!(list.items, items());
    }

    #[test]
    fn failed_toggle_restores_the_prior_flag_not_its_inverse() {
        let mut list = TaskList::new(items(), false);
        let result = list.toggle("b", true, || Err(AppError::Store("locked".to_string())));
        assert!(result.is_err());
        assert_eq!(list.items, items());

        let result = list.toggle("a", false, || Err(AppError::Store("locked".to_string())));
        assert!(result.is_err());
        assert_eq!(list.items, items());
    }

    #[test]
    fn removal_is_restored_at_its_old_position() {
        let mut list = TaskList::new(items(), false);
        let result = list.remove("b", || Err(AppError::Io("offline".to_string())));
        assert!(result.is_err());
        assert_eq!(list.items, items());

        list.remove("b", || Ok(())).expect("remove");
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.progress(), 0);
    }

    #[test]
    fn completed_first_ordering_is_stable() {
        let mut source = items();
        source[2].done = true;
        let list = TaskList::new(source, true);
        let order: Vec<&str> = list.ordered().iter().map(|item| item.id).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn unknown_ids_are_a_no_op() {
        let mut list = TaskList::new(items(), false);
        list.toggle("zzz", true, || Ok(())).expect("toggle");
        list.remove("zzz", || Ok(())).expect("remove");
        assert_eq!(list.items, items());
    }
}
