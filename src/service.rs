//! Operations the dashboard pages call, bound to one store.

use crate::dates::{
    current_month_window, format_date, format_date_time, local_date_key, local_date_of, month_calendar_weeks,
    month_days, month_weeks, month_window, parse_date_key, today, year_months, MonthGrid, MonthWindow,
};
use crate::db::query::{Select, Table};
use crate::db::{Database, ProjectBundle};
use crate::errors::{AppError, AppResult};
use crate::finance::{overview, project_finance, FinanceFilter, FinanceOverview};
use crate::models::{
    AppSettings, BulkTaskPayload, Client, ClientStatus, ClientWithProjects, DailyTask, Goal, GoalDetail, GoalType,
    GoalsOverview, Invoice, LeadsSummary, LeadsView, ListLeadsFilters, ListProjectsFilters, Project, ProjectCost,
    ProjectDetail, ProjectListItem, ProjectPhase, Reminder, SaveClientPayload, SaveCostPayload, SaveGoalPayload,
    SaveInvoicePayload, SavePhasePayload, SaveProjectPayload, SaveReminderPayload, SaveTaskPayload,
    SaveWeekNotesPayload,
};
use crate::mutation::TaskList;
use crate::progress::{progress_of, resolve_project_progress, target_percentage, ProjectProgress};
use crate::stats::{compute_dashboard_stats, DashboardData, DashboardStats};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Which row a progress write-back targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressTarget {
    Goal(String),
    Project(String),
}

/// Handle to a detached progress recompute. Dropping it lets the write finish
/// in the background; awaiting it yields the percentage that was stored.
pub struct ProgressSync {
    target: ProgressTarget,
    state: SyncState,
}

enum SyncState {
    Spawned(JoinHandle<AppResult<u8>>),
    Finished(AppResult<u8>),
}

impl ProgressSync {
    pub fn spawn(db: Arc<Database>, target: ProgressTarget) -> Self {
        let job_target = target.clone();
        let job = move || {
            let result = match &job_target {
                ProgressTarget::Goal(id) => db.recompute_goal_progress(id),
                ProgressTarget::Project(id) => db.recompute_project_progress(id).map(|progress| progress.percent()),
            };
            if let Err(error) = &result {
                tracing::warn!(progress_target = ?job_target, error = %error, "progress write-back failed");
            }
            result
        };

        let state = match tokio::runtime::Handle::try_current() {
            Ok(handle) => SyncState::Spawned(handle.spawn_blocking(job)),
            Err(_) => SyncState::Finished(job()),
        };
        Self { target, state }
    }

    pub fn target(&self) -> &ProgressTarget {
        &self.target
    }

    pub async fn wait(self) -> AppResult<u8> {
        match self.state {
            SyncState::Spawned(handle) => handle
                .await
                .map_err(|error| AppError::Internal(format!("progress write-back task failed: {}", error)))?,
            SyncState::Finished(result) => result,
        }
    }
}

/// A stored record plus the progress write-back it triggered, if any.
pub struct Saved<T> {
    pub record: T,
    pub sync: Option<ProgressSync>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarView {
    pub grid: MonthGrid,
    pub week_chunks: Vec<Vec<NaiveDate>>,
    pub calendar_weeks: Vec<Vec<NaiveDate>>,
    pub months: Vec<NaiveDate>,
}

#[derive(Clone)]
pub struct DashboardCore {
    db: Arc<Database>,
}

impl DashboardCore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn settings(&self) -> AppResult<AppSettings> {
        self.db.get_settings()
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        self.db.update_settings(update)
    }

    // ─── Dashboard ──────────────────────────────────────────────────────────

    pub fn dashboard(&self, month: Option<u32>, year: Option<i32>) -> AppResult<DashboardData> {
        let window = resolve_window(month, year)?;
        self.db.get_dashboard_data(&window, today())
    }

    pub fn stats(&self, month: Option<u32>, year: Option<i32>) -> AppResult<DashboardStats> {
        let window = resolve_window(month, year)?;
        let projects = self.db.list_projects()?;
        let clients = self.db.list_clients()?;
        let goals: Vec<Goal> = self
            .db
            .select(&Select::from(Table::Goals).eq("type", GoalType::Monthly.as_str().to_string()))?;
        let tasks: Vec<DailyTask> = self.db.select(&Select::from(Table::DailyTasks).eq("completed", true))?;
        Ok(compute_dashboard_stats(&window, &projects, &clients, &goals, &tasks))
    }

    pub fn calendar(&self, year: i32, month: u32) -> AppResult<CalendarView> {
        Ok(CalendarView {
            grid: month_days(year, month)?,
            week_chunks: month_weeks(year, month)?,
            calendar_weeks: month_calendar_weeks(year, month)?,
            months: year_months(year),
        })
    }

    // ─── Finance ────────────────────────────────────────────────────────────

    pub fn finance_overview(&self, filter: FinanceFilter, search: Option<&str>) -> AppResult<FinanceOverview> {
        let bundles = self.all_project_bundles()?;
        let finances = bundles
            .into_iter()
            .map(|bundle| project_finance(&bundle.project, bundle.client.as_ref(), bundle.invoices, bundle.costs))
            .collect();
        Ok(overview(finances, filter, search))
    }

    pub fn save_invoice(&self, payload: SaveInvoicePayload) -> AppResult<Invoice> {
        validate_amount(payload.amount)?;
        validate_optional_date("dateIssued", payload.date_issued.as_deref())?;
        validate_optional_date("dueDate", payload.due_date.as_deref())?;
        let invoice = self.db.save_invoice(payload)?;
        tracing::info!(invoice_id = %invoice.id, project_id = %invoice.project_id, "invoice saved");
        Ok(invoice)
    }

    pub fn delete_invoice(&self, invoice_id: &str) -> AppResult<bool> {
        self.db.delete_invoice(invoice_id)
    }

    pub fn save_cost(&self, payload: SaveCostPayload) -> AppResult<ProjectCost> {
        validate_amount(payload.amount)?;
        if payload.title.trim().is_empty() {
            return Err(AppError::Validation("cost title is required".to_string()));
        }
        let cost = self.db.save_cost(payload)?;
        tracing::info!(cost_id = %cost.id, project_id = %cost.project_id, "cost saved");
        Ok(cost)
    }

    pub fn delete_cost(&self, cost_id: &str) -> AppResult<bool> {
        self.db.delete_cost(cost_id)
    }

    // ─── Projects ───────────────────────────────────────────────────────────

    pub fn list_projects(&self, filters: &ListProjectsFilters) -> AppResult<Vec<ProjectListItem>> {
        if let Some(month) = filters.month {
            if !(1..=12).contains(&month) {
                return Err(AppError::Validation(format!("month {} is out of range", month)));
            }
        }

        let search = filters
            .search
            .as_deref()
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty());

        Ok(self
            .all_project_bundles()?
            .into_iter()
            .filter(|bundle| {
                let created = local_date_of(&bundle.project.created_at);
                filters.month.map_or(true, |month| created.month() == month)
                    && filters.year.map_or(true, |year| created.year() == year)
            })
            .filter(|bundle| search.as_deref().map_or(true, |query| bundle_matches(bundle, query)))
            .map(|bundle| ProjectListItem {
                due_date_label: format_date(bundle.project.due_date.as_deref()),
                created_label: format_date_time(Some(&bundle.project.created_at.to_rfc3339())),
                total_revenue: bundle.invoices.iter().map(|invoice| invoice.amount).sum(),
                total_cost: bundle.costs.iter().map(|cost| cost.amount).sum(),
                client_name: bundle.client.as_ref().and_then(|client| client.name.clone()),
                client_company: bundle.client.as_ref().and_then(|client| client.company.clone()),
                project: bundle.project,
            })
            .collect())
    }

    pub fn project_detail(&self, project_id: &str) -> AppResult<ProjectDetail> {
        let bundle = self
            .db
            .get_project_bundle(project_id)?
            .ok_or_else(|| AppError::NotFound(format!("project {} does not exist", project_id)))?;
        let phases = self.db.list_phases(project_id)?;
        let progress = resolve_project_progress(bundle.project.progress, &phases);
        let finance = project_finance(&bundle.project, bundle.client.as_ref(), bundle.invoices, bundle.costs);

        Ok(ProjectDetail {
            project: bundle.project,
            client: bundle.client,
            phases,
            progress,
            finance,
        })
    }

    pub fn save_project(&self, payload: SaveProjectPayload) -> AppResult<Project> {
        validate_optional_date("dueDate", payload.due_date.as_deref())?;
        if let Some(target) = payload.target_revenue {
            validate_amount(target)?;
        }
        let settings = self.db.get_settings()?;
        let project = self.db.save_project(payload, &settings.default_project_status)?;
        tracing::info!(project_id = %project.id, status = %project.status, "project saved");
        if let Some(client_id) = project.client_id.as_deref() {
            tracing::info!(client_id = %client_id, project_id = %project.id, "client promoted by project link");
        }
        Ok(project)
    }

    pub fn delete_project(&self, project_id: &str) -> AppResult<bool> {
        let deleted = self.db.delete_project(project_id)?;
        if deleted {
            tracing::info!(project_id = %project_id, "project deleted");
        }
        Ok(deleted)
    }

    pub fn save_phase(&self, payload: SavePhasePayload) -> AppResult<Saved<ProjectPhase>> {
        validate_optional_date("dueDate", payload.due_date.as_deref())?;
        let phase = self.db.save_phase(payload)?;
        let sync = self.sync(ProgressTarget::Project(phase.project_id.clone()));
        Ok(Saved {
            record: phase,
            sync: Some(sync),
        })
    }

    /// Flips a phase in `view` first, then in the store, then recomputes the
    /// owning project's progress in the background.
    pub fn toggle_phase(
        &self,
        view: &mut TaskList<ProjectPhase>,
        phase_id: &str,
        completed: bool,
    ) -> AppResult<ProgressSync> {
        let phase = self
            .db
            .find::<ProjectPhase>(phase_id)?
            .ok_or_else(|| AppError::NotFound(format!("phase {} does not exist", phase_id)))?;
        view.toggle(phase_id, completed, || self.expect_changed(self.db.set_phase_completed(phase_id, completed)?, "phase", phase_id))?;
        Ok(self.sync(ProgressTarget::Project(phase.project_id)))
    }

    pub fn delete_phase(&self, view: &mut TaskList<ProjectPhase>, phase_id: &str) -> AppResult<ProgressSync> {
        let phase = self
            .db
            .find::<ProjectPhase>(phase_id)?
            .ok_or_else(|| AppError::NotFound(format!("phase {} does not exist", phase_id)))?;
        view.remove(phase_id, || self.expect_changed(self.db.delete_phase(phase_id)?, "phase", phase_id))?;
        Ok(self.sync(ProgressTarget::Project(phase.project_id)))
    }

    pub fn refresh_project_progress(&self, project_id: &str) -> AppResult<ProjectProgress> {
        self.db.recompute_project_progress(project_id)
    }

    // ─── Leads ──────────────────────────────────────────────────────────────

    pub fn leads(&self, filters: &ListLeadsFilters) -> AppResult<LeadsView> {
        let clients = self.db.list_clients_with_projects()?;
        let summary = clients.iter().fold(LeadsSummary::default(), |mut summary, entry| {
            match entry.client.status {
                ClientStatus::Client => summary.client += 1,
                ClientStatus::Interested => summary.interested += 1,
                ClientStatus::Converted => summary.converted += 1,
            }
            summary
        });

        let search = filters
            .search
            .as_deref()
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty());

        let clients: Vec<ClientWithProjects> = clients
            .into_iter()
            .filter(|entry| filters.status.map_or(true, |status| entry.client.status == status))
            .filter(|entry| search.as_deref().map_or(true, |query| client_matches(&entry.client, query)))
            .collect();

        Ok(LeadsView { summary, clients })
    }

    pub fn save_client(&self, payload: SaveClientPayload) -> AppResult<Client> {
        let client = self.db.save_client(payload)?;
        tracing::info!(client_id = %client.id, status = client.status.as_str(), "client saved");
        Ok(client)
    }

    pub fn delete_client(&self, client_id: &str) -> AppResult<bool> {
        self.db.delete_client(client_id)
    }

    // ─── Goals and tasks ────────────────────────────────────────────────────

    pub fn goals_overview(&self) -> AppResult<GoalsOverview> {
        let settings = self.db.get_settings()?;
        let mut result = GoalsOverview::default();
        for goal in self.db.list_active_goals()? {
            match goal.goal_type {
                GoalType::Daily => result.daily.push(goal),
                GoalType::Weekly => result.weekly.push(goal),
                GoalType::Monthly => result.monthly.push(goal),
                GoalType::Yearly => result.yearly.push(goal),
            }
        }
        result.todays_tasks = self.todays_tasks(&settings)?.ordered();
        Ok(result)
    }

    /// Today's tasks as a view model, newest first, with the completed-first
    /// preference applied when the list is ordered.
    pub fn todays_tasks(&self, settings: &AppSettings) -> AppResult<TaskList<DailyTask>> {
        let tasks = self.db.list_tasks_on(&local_date_key(today()))?;
        Ok(TaskList::new(tasks, settings.today_tasks_completed_first))
    }

    pub fn goal_detail(&self, goal_id: &str) -> AppResult<GoalDetail> {
        let goal = self
            .db
            .find::<Goal>(goal_id)?
            .ok_or_else(|| AppError::NotFound(format!("goal {} does not exist", goal_id)))?;
        let tasks = self.db.list_tasks_for_goal(goal_id)?;
        let progress = progress_of(&tasks);
        let target = target_percentage(i64::from(goal.progress), goal.target.unwrap_or(0));

        Ok(GoalDetail {
            goal,
            tasks,
            progress,
            target_percentage: target,
        })
    }

    pub fn save_goal(&self, payload: SaveGoalPayload) -> AppResult<Goal> {
        validate_optional_date("deadline", payload.deadline.as_deref())?;
        validate_optional_date("weekEndDate", payload.week_end_date.as_deref())?;
        if payload.target.is_some_and(|target| target < 0) {
            return Err(AppError::Validation("goal target cannot be negative".to_string()));
        }
        let settings = self.db.get_settings()?;
        let goal = self.db.save_goal(payload, &settings.default_goal_color)?;
        tracing::info!(goal_id = %goal.id, goal_type = goal.goal_type.as_str(), "goal saved");
        Ok(goal)
    }

    /// Soft delete: the goal stays but is hidden, and its tasks are removed.
    pub fn delete_goal(&self, goal_id: &str) -> AppResult<bool> {
        let deleted = self.db.deactivate_goal(goal_id)?;
        if deleted {
            tracing::info!(goal_id = %goal_id, "goal deactivated");
        }
        Ok(deleted)
    }

    pub fn save_week_notes(&self, payload: SaveWeekNotesPayload) -> AppResult<Goal> {
        for key in payload.week_titles.keys().chain(payload.week_descriptions.keys()) {
            if key.parse::<usize>().is_err() {
                return Err(AppError::Validation(format!("week key '{}' is not a chunk index", key)));
            }
        }
        self.db
            .save_week_notes(&payload.goal_id, payload.week_titles, payload.week_descriptions)
    }

    pub fn save_task(&self, mut payload: SaveTaskPayload) -> AppResult<Saved<DailyTask>> {
        if payload.title.trim().is_empty() {
            return Err(AppError::Validation("task title is required".to_string()));
        }
        let date = match payload.date.as_deref() {
            Some(raw) => parse_date_key(raw)?,
            None => today(),
        };
        payload.date = Some(local_date_key(date));

        let task = self.db.save_task(payload)?;
        let sync = task
            .goal_id
            .clone()
            .map(|goal_id| self.sync(ProgressTarget::Goal(goal_id)));
        Ok(Saved { record: task, sync })
    }

    /// Inserts one task per day of the month, or per day of one sequential
    /// week chunk when `week_index` is set.
    pub fn add_tasks_for_period(&self, payload: BulkTaskPayload) -> AppResult<Saved<Vec<DailyTask>>> {
        let title = payload.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("task title is required".to_string()));
        }
        if self.db.find::<Goal>(&payload.goal_id)?.is_none() {
            return Err(AppError::NotFound(format!("goal {} does not exist", payload.goal_id)));
        }

        let days = match payload.week_index {
            Some(index) => month_weeks(payload.year, payload.month)?
                .into_iter()
                .nth(index)
                .ok_or_else(|| AppError::Validation(format!("week {} is not in this month", index)))?,
            None => month_days(payload.year, payload.month)?.days,
        };

        let now = Utc::now();
        let tasks: Vec<DailyTask> = days
            .into_iter()
            .map(|day| DailyTask {
                id: Uuid::new_v4().to_string(),
                goal_id: Some(payload.goal_id.clone()),
                title: title.to_string(),
                description: None,
                date: local_date_key(day),
                start_time: payload.start_time.clone().filter(|value| !value.is_empty()),
                end_time: payload.end_time.clone().filter(|value| !value.is_empty()),
                completed: false,
                created_at: now,
            })
            .collect();

        let inserted = self.db.insert_tasks(&tasks)?;
        tracing::info!(goal_id = %payload.goal_id, count = inserted, "bulk tasks added");
        let sync = self.sync(ProgressTarget::Goal(payload.goal_id));
        Ok(Saved {
            record: tasks,
            sync: Some(sync),
        })
    }

    pub fn toggle_task(
        &self,
        view: &mut TaskList<DailyTask>,
        task_id: &str,
        completed: bool,
    ) -> AppResult<Option<ProgressSync>> {
        let task = self
            .db
            .find::<DailyTask>(task_id)?
            .ok_or_else(|| AppError::NotFound(format!("task {} does not exist", task_id)))?;
        view.toggle(task_id, completed, || self.expect_changed(self.db.set_task_completed(task_id, completed)?, "task", task_id))?;
        Ok(task.goal_id.map(|goal_id| self.sync(ProgressTarget::Goal(goal_id))))
    }

    pub fn delete_task(&self, view: &mut TaskList<DailyTask>, task_id: &str) -> AppResult<Option<ProgressSync>> {
        let task = self
            .db
            .find::<DailyTask>(task_id)?
            .ok_or_else(|| AppError::NotFound(format!("task {} does not exist", task_id)))?;
        view.remove(task_id, || self.expect_changed(self.db.delete_task(task_id)?, "task", task_id))?;
        Ok(task.goal_id.map(|goal_id| self.sync(ProgressTarget::Goal(goal_id))))
    }

    pub fn refresh_goal_progress(&self, goal_id: &str) -> AppResult<u8> {
        self.db.recompute_goal_progress(goal_id)
    }

    // ─── Reminders ──────────────────────────────────────────────────────────

    pub fn list_reminders(&self) -> AppResult<Vec<Reminder>> {
        self.db.list_reminders()
    }

    pub fn save_reminder(&self, payload: SaveReminderPayload) -> AppResult<Reminder> {
        if let (Some(start), Some(end)) = (payload.start_time, payload.end_time) {
            if end < start {
                return Err(AppError::Validation("reminder ends before it starts".to_string()));
            }
        }
        self.db.save_reminder(payload)
    }

    pub fn delete_reminder(&self, reminder_id: &str) -> AppResult<bool> {
        self.db.delete_reminder(reminder_id)
    }

    fn all_project_bundles(&self) -> AppResult<Vec<ProjectBundle>> {
        self.db
            .list_project_bundles(&Select::from(Table::Projects).order_by("created_at", false))
    }

    fn sync(&self, target: ProgressTarget) -> ProgressSync {
        ProgressSync::spawn(Arc::clone(&self.db), target)
    }

    fn expect_changed(&self, changed: bool, kind: &str, id: &str) -> AppResult<()> {
        if changed {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("{} {} does not exist", kind, id)))
        }
    }
}

/// The month window named by `month`/`year`, or the current month when both
/// are absent. A month without a year means that month of the current year.
pub fn resolve_window(month: Option<u32>, year: Option<i32>) -> AppResult<MonthWindow> {
    match (month, year) {
        (None, None) => current_month_window(),
        (Some(month), year) => month_window(year.unwrap_or_else(|| today().year()), month),
        (None, Some(_)) => Err(AppError::Validation("a year needs a month".to_string())),
    }
}

fn validate_optional_date(field: &str, raw: Option<&str>) -> AppResult<()> {
    match raw {
        Some(value) if !value.trim().is_empty() => parse_date_key(value)
            .map(|_| ())
            .map_err(|_| AppError::Validation(format!("{} must be YYYY-MM-DD, got '{}'", field, value))),
        _ => Ok(()),
    }
}

fn validate_amount(amount: f64) -> AppResult<()> {
    if amount.is_finite() {
        Ok(())
    } else {
        Err(AppError::Validation("amount must be a finite number".to_string()))
    }
}

fn bundle_matches(bundle: &ProjectBundle, query: &str) -> bool {
    let client = bundle.client.as_ref();
    [
        bundle.project.name.as_deref(),
        client.and_then(|client| client.name.as_deref()),
        client.and_then(|client| client.company.as_deref()),
    ]
    .into_iter()
    .flatten()
    .any(|value| value.to_lowercase().contains(query))
}

fn client_matches(client: &Client, query: &str) -> bool {
    [client.name.as_deref(), client.company.as_deref(), client.email.as_deref()]
        .into_iter()
        .flatten()
        .any(|value| value.to_lowercase().contains(query))
}
