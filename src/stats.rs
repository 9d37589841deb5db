use crate::dates::{local_date_key, week_of, MonthWindow};
use crate::models::{Client, ClientStatus, DailyTask, Goal, GoalType, Project, Reminder};
use crate::outreach::{extract_outreach_count, sum_outreach};
use crate::progress::average_progress;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const WEEKDAY_INITIALS: [&str; 7] = ["S", "M", "T", "W", "T", "F", "S"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub month: u32,
    pub year: i32,
    pub total_projects: usize,
    pub total_revenue: f64,
    pub converted_leads: usize,
    pub interested_leads: usize,
    pub monthly_outreaches: u64,
    pub total_outreaches: u64,
}

/// Stat-card values for `window`.
///
/// Lead counts cover every client regardless of the window; everything else is
/// scoped to projects and monthly goals created inside it.
pub fn compute_dashboard_stats(
    window: &MonthWindow,
    projects: &[Project],
    clients: &[Client],
    goals: &[Goal],
    tasks: &[DailyTask],
) -> DashboardStats {
    let in_window: Vec<&Project> = projects
        .iter()
        .filter(|project| window.contains_timestamp(&project.created_at))
        .collect();

    let total_revenue = in_window
        .iter()
        .filter(|project| !project.is_inactive())
        .map(|project| project.target_revenue)
        .sum();

    let count_status = |status: ClientStatus| clients.iter().filter(|client| client.status == status).count();

    let monthly_goals: Vec<&Goal> = goals
        .iter()
        .filter(|goal| goal.goal_type == GoalType::Monthly)
        .collect();
    let window_goal_ids: HashSet<&str> = monthly_goals
        .iter()
        .filter(|goal| window.contains_timestamp(&goal.created_at))
        .map(|goal| goal.id.as_str())
        .collect();
    let all_goal_ids: HashSet<&str> = monthly_goals.iter().map(|goal| goal.id.as_str()).collect();

    DashboardStats {
        month: window.month,
        year: window.year,
        total_projects: in_window.len(),
        total_revenue,
        converted_leads: count_status(ClientStatus::Converted),
        interested_leads: count_status(ClientStatus::Interested),
        monthly_outreaches: outreach_for_goals(tasks, &window_goal_ids),
        total_outreaches: outreach_for_goals(tasks, &all_goal_ids),
    }
}

fn outreach_for_goals(tasks: &[DailyTask], goal_ids: &HashSet<&str>) -> u64 {
    sum_outreach(
        tasks
            .iter()
            .filter(|task| task.completed)
            .filter(|task| task.goal_id.as_deref().is_some_and(|id| goal_ids.contains(id)))
            .map(|task| task.title.as_str()),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekdayOutreach {
    pub day: String,
    pub date: String,
    pub value: u64,
}

/// Completed-task outreach per day of the Sunday-start week containing
/// `reference`. Every task dated that day counts, whichever goal owns it.
pub fn weekly_outreaches(reference: NaiveDate, tasks: &[DailyTask]) -> Vec<WeekdayOutreach> {
    week_of(reference)
        .iter()
        .zip(WEEKDAY_INITIALS)
        .map(|(day, initial)| {
            let key = local_date_key(*day);
            let value = tasks
                .iter()
                .filter(|task| task.completed && task.date == key)
                .map(|task| extract_outreach_count(&task.title))
                .fold(0u64, u64::saturating_add);
            WeekdayOutreach {
                day: initial.to_string(),
                date: key,
                value,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub id: String,
    pub name: Option<String>,
    pub progress: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProgressCard {
    pub average: u8,
    pub projects: Vec<ProgressEntry>,
}

/// Non-Inactive projects created in `window`, due date ascending with undated
/// projects last.
pub fn monthly_projects(window: &MonthWindow, projects: &[Project]) -> Vec<Project> {
    let mut selected: Vec<Project> = projects
        .iter()
        .filter(|project| !project.is_inactive() && window.contains_timestamp(&project.created_at))
        .cloned()
        .collect();
    selected.sort_by(|left, right| match (&left.due_date, &right.due_date) {
        (Some(left), Some(right)) => left.cmp(right),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    selected
}

pub fn project_progress_card(monthly: &[Project]) -> ProjectProgressCard {
    let values: Vec<u8> = monthly.iter().map(|project| project.progress).collect();
    ProjectProgressCard {
        average: average_progress(&values),
        projects: monthly
            .iter()
            .map(|project| ProgressEntry {
                id: project.id.clone(),
                name: project.name.clone(),
                progress: project.progress,
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub stats: DashboardStats,
    pub weekly_outreaches: Vec<WeekdayOutreach>,
    pub reminders: Vec<Reminder>,
    pub todays_tasks: Vec<DailyTask>,
    pub project_progress: ProjectProgressCard,
    pub monthly_projects: Vec<Project>,
}

/// Row snapshot the dashboard payload is reduced from.
pub struct DashboardSnapshot<'a> {
    pub projects: &'a [Project],
    pub clients: &'a [Client],
    pub goals: &'a [Goal],
    pub tasks: &'a [DailyTask],
    pub reminders: Vec<Reminder>,
}

pub fn build_dashboard_data(window: &MonthWindow, today: NaiveDate, snapshot: DashboardSnapshot<'_>) -> DashboardData {
    let stats = compute_dashboard_stats(window, snapshot.projects, snapshot.clients, snapshot.goals, snapshot.tasks);
    let monthly = monthly_projects(window, snapshot.projects);
    let today_key = local_date_key(today);

    let mut todays_tasks: Vec<DailyTask> = snapshot
        .tasks
        .iter()
        .filter(|task| task.date == today_key)
        .cloned()
        .collect();
    todays_tasks.sort_by(|left, right| right.created_at.cmp(&left.created_at));

    DashboardData {
        stats,
        weekly_outreaches: weekly_outreaches(today, snapshot.tasks),
        reminders: snapshot.reminders,
        todays_tasks,
        project_progress: project_progress_card(&monthly),
        monthly_projects: monthly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::month_window;
    use chrono::{DateTime, Local, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn local_noon(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(year, month, day, 12, 0, 0)
            .earliest()
            .expect("valid local time")
            .with_timezone(&Utc)
    }

    fn project(id: &str, created: DateTime<Utc>, target: f64, status: &str, due: Option<&str>) -> Project {
        Project {
            id: id.to_string(),
            name: Some(id.to_string()),
            client_id: None,
            description: None,
            status: status.to_string(),
            progress: 50,
            due_date: due.map(ToString::to_string),
            target_revenue: target,
            created_at: created,
            quick_description: None,
            whatsapp_group_name: None,
            initial_project_scope: None,
            case_study_link: None,
        }
    }

    fn client(id: &str, status: ClientStatus, created: DateTime<Utc>) -> Client {
        Client {
            id: id.to_string(),
            name: None,
            company: None,
            email: None,
            phone: None,
            notes: None,
            status,
            created_at: created,
        }
    }

    fn goal(id: &str, goal_type: GoalType, created: DateTime<Utc>) -> Goal {
        Goal {
            id: id.to_string(),
            goal_type,
            title: None,
            category: None,
            description: None,
            color: None,
            target: None,
            progress: 0,
            deadline: None,
            week_end_date: None,
            is_active: true,
            week_titles: BTreeMap::new(),
            week_descriptions: BTreeMap::new(),
            created_at: created,
        }
    }

    fn task(id: &str, goal_id: &str, title: &str, date: &str, completed: bool) -> DailyTask {
        DailyTask {
            id: id.to_string(),
            goal_id: Some(goal_id.to_string()),
            title: title.to_string(),
            description: None,
            date: date.to_string(),
            start_time: None,
            end_time: None,
            completed,
            created_at: local_noon(2024, 5, 1),
        }
    }

    #[test]
    fn window_scopes_projects_and_monthly_goals_but_not_leads() {
        let window = month_window(2024, 5).expect("window");
        let projects = vec![
            project("may-active", local_noon(2024, 5, 1), 1_000.0, "Active", None),
            project("may-inactive", local_noon(2024, 5, 31), 9_000.0, "Inactive", None),
            project("april", local_noon(2024, 4, 30), 5_000.0, "Active", None),
        ];
        let clients = vec![
            client("c1", ClientStatus::Converted, local_noon(2023, 1, 1)),
            client("c2", ClientStatus::Interested, local_noon(2024, 5, 2)),
            client("c3", ClientStatus::Interested, local_noon(2022, 7, 2)),
            client("c4", ClientStatus::Client, local_noon(2024, 5, 3)),
        ];
        let goals = vec![
            goal("may-goal", GoalType::Monthly, local_noon(2024, 5, 2)),
            goal("old-goal", GoalType::Monthly, local_noon(2024, 3, 2)),
            goal("weekly", GoalType::Weekly, local_noon(2024, 5, 2)),
        ];
        let tasks = vec![
            task("t1", "may-goal", "OT 5", "2024-05-03", true),
            task("t2", "may-goal", "OT 7", "2024-05-04", false),
            task("t3", "old-goal", "outreach 10", "2024-03-04", true),
            task("t4", "weekly", "ot 100", "2024-05-04", true),
        ];

        let stats = compute_dashboard_stats(&window, &projects, &clients, &goals, &tasks);
        assert_eq!(stats.total_projects, 2);
        assert_eq!(stats.total_revenue, 1_000.0);
        assert_eq!(stats.converted_leads, 1);
        assert_eq!(stats.interested_leads, 2);
        assert_eq!(stats.monthly_outreaches, 5);
        assert_eq!(stats.total_outreaches, 15);
    }

    #[test]
    fn weekly_outreach_buckets_by_task_date() {
        // 2024-05-15 is a Wednesday; its week runs 12th..18th.
        let reference = NaiveDate::from_ymd_opt(2024, 5, 15).expect("date");
        let tasks = vec![
            task("t1", "any", "OT 3", "2024-05-12", true),
            task("t2", "other", "outreach 4", "2024-05-12", true),
            task("t3", "any", "OT 9", "2024-05-13", false),
            task("t4", "any", "OT 2", "2024-05-18", true),
            task("t5", "any", "OT 50", "2024-05-19", true),
        ];

        let week = weekly_outreaches(reference, &tasks);
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].day, "S");
        assert_eq!(week[0].date, "2024-05-12");
        assert_eq!(week[0].value, 7);
        assert_eq!(week[1].value, 0);
        assert_eq!(week[6].value, 2);
        assert_eq!(week.iter().map(|day| day.value).sum::<u64>(), 9);
    }

    #[test]
    fn monthly_projects_sort_undated_last() {
        let window = month_window(2024, 5).expect("window");
        let projects = vec![
            project("undated", local_noon(2024, 5, 1), 0.0, "Active", None),
            project("late", local_noon(2024, 5, 2), 0.0, "Active", Some("2024-07-01")),
            project("early", local_noon(2024, 5, 3), 0.0, "Pending", Some("2024-06-01")),
            project("gone", local_noon(2024, 5, 3), 0.0, "Inactive", Some("2024-05-05")),
        ];
        let ordered: Vec<String> = monthly_projects(&window, &projects).into_iter().map(|p| p.id).collect();
        assert_eq!(ordered, vec!["early", "late", "undated"]);

        let card = project_progress_card(&monthly_projects(&window, &projects));
        assert_eq!(card.average, 50);
        assert_eq!(card.projects.len(), 3);
    }

    #[test]
    fn dashboard_payload_collects_todays_tasks() {
        let window = month_window(2024, 5).expect("window");
        let today = NaiveDate::from_ymd_opt(2024, 5, 15).expect("date");
        let tasks = vec![
            task("t1", "g", "OT 1", "2024-05-15", true),
            task("t2", "g", "call", "2024-05-14", false),
        ];
        let data = build_dashboard_data(
            &window,
            today,
            DashboardSnapshot {
                projects: &[],
                clients: &[],
                goals: &[],
                tasks: &tasks,
                reminders: Vec::new(),
            },
        );
        assert_eq!(data.todays_tasks.len(), 1);
        assert_eq!(data.todays_tasks[0].id, "t1");
        assert_eq!(data.weekly_outreaches[3].value, 1);
        assert_eq!(data.project_progress.average, 0);
    }
}
