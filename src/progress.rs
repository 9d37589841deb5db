use serde::{Deserialize, Serialize};

/// Anything whose completion feeds a parent's progress percentage.
pub trait Completable {
    fn item_id(&self) -> &str;
    fn is_completed(&self) -> bool;
    fn set_completed(&mut self, completed: bool);
}

/// `round(100 * completed / total)` with halves rounded up; 0 when `total` is 0.
pub fn completion_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total) as u64;
    let total = total as u64;
    ((200 * completed + total) / (2 * total)) as u8
}

pub fn progress_of<T: Completable>(items: &[T]) -> u8 {
    let completed = items.iter().filter(|item| item.is_completed()).count();
    completion_percentage(completed, items.len())
}

/// Where a project's progress value came from. Phases supersede the stored
/// column once at least one exists; until then the stored value is all there is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum ProjectProgress {
    #[serde(rename_all = "camelCase")]
    Derived {
        percent: u8,
        completed_phases: usize,
        total_phases: usize,
    },
    Stored { percent: u8 },
}

impl ProjectProgress {
    pub fn percent(&self) -> u8 {
        match self {
            Self::Derived { percent, .. } | Self::Stored { percent } => *percent,
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, Self::Derived { .. })
    }
}

pub fn resolve_project_progress<T: Completable>(stored: u8, phases: &[T]) -> ProjectProgress {
    if phases.is_empty() {
        return ProjectProgress::Stored { percent: stored.min(100) };
    }
    let completed_phases = phases.iter().filter(|phase| phase.is_completed()).count();
    ProjectProgress::Derived {
        percent: completion_percentage(completed_phases, phases.len()),
        completed_phases,
        total_phases: phases.len(),
    }
}

/// Rounded mean of progress values; 0 for an empty list.
pub fn average_progress(values: &[u8]) -> u8 {
    if values.is_empty() {
        return 0;
    }
    let sum: u64 = values.iter().map(|value| u64::from(*value)).sum();
    let count = values.len() as u64;
    ((2 * sum + count) / (2 * count)) as u8
}

/// Goal progress measured against its numeric target, capped at 100.
pub fn target_percentage(progress: i64, target: i64) -> u8 {
    if target <= 0 || progress <= 0 {
        return 0;
    }
    let scaled = (200 * progress as i128 + target as i128) / (2 * target as i128);
    scaled.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item(bool);

    impl Completable for Item {
        fn item_id(&self) -> &str {
            "item"
        }

        fn is_completed(&self) -> bool {
            self.0
        }

        fn set_completed(&mut self, completed: bool) {
            self.0 = completed;
        }
    }

    #[test]
    fn percentage_matches_rounded_ratio() {
        for total in 1..=40usize {
            for completed in 0..=total {
                let expected = (100.0 * completed as f64 / total as f64).round() as u8;
                assert_eq!(completion_percentage(completed, total), expected, "{completed}/{total}");
            }
        }
    }

    #[test]
    fn empty_collection_is_zero_percent() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(progress_of::<Item>(&[]), 0);
    }

    #[test]
    fn halves_round_up() {
        assert_eq!(completion_percentage(1, 8), 13);
        assert_eq!(completion_percentage(1, 200), 1);
    }

    #[test]
    fn goal_progress_after_task_delete() {
        let mut tasks = vec![Item(true), Item(true), Item(true), Item(false)];
        assert_eq!(progress_of(&tasks), 75);
        tasks.remove(0);
        assert_eq!(progress_of(&tasks), 67);
    }

    #[test]
    fn project_progress_prefers_phases_when_present() {
        let stored = resolve_project_progress::<Item>(40, &[]);
        assert_eq!(stored, ProjectProgress::Stored { percent: 40 });
        assert!(!stored.is_derived());

        let derived = resolve_project_progress(40, &[Item(true), Item(false), Item(false)]);
        assert_eq!(derived.percent(), 33);
        assert!(derived.is_derived());
    }

    #[test]
    fn averages_and_targets() {
        assert_eq!(average_progress(&[]), 0);
        assert_eq!(average_progress(&[50, 51]), 51);
        assert_eq!(target_percentage(5, 0), 0);
        assert_eq!(target_percentage(3, 4), 75);
        assert_eq!(target_percentage(12, 10), 100);
    }
}
