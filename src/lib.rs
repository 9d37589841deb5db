pub mod cli;
pub mod config;
pub mod dates;
pub mod db;
pub mod errors;
pub mod finance;
pub mod models;
pub mod mutation;
pub mod outreach;
pub mod progress;
pub mod service;
pub mod session;
pub mod stats;

use crate::cli::{Cli, Command};
use crate::config::BootstrapConfig;
use crate::db::Database;
use crate::errors::AppError;
use crate::finance::{FinanceFilter, FinanceOverview};
use crate::models::{
    AppSettings, BooleanResponse, BulkTaskPayload, Client, ClientStatus, DailyTask, Goal, GoalDetail, GoalsOverview,
    Invoice, LeadsView, ListLeadsFilters, ListProjectsFilters, Project, ProjectCost, ProjectDetail, ProjectListItem,
    ProjectPhase, ProgressUpdate, Reminder, SaveClientPayload, SaveCostPayload, SaveGoalPayload, SaveInvoicePayload,
    SavePhasePayload, SaveProjectPayload, SaveReminderPayload, SaveTaskPayload, SaveWeekNotesPayload,
};
use crate::mutation::TaskList;
use crate::service::{CalendarView, DashboardCore, ProgressSync, Saved};
use crate::session::{SessionManager, SessionUser};
use crate::stats::{DashboardData, DashboardStats};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<DashboardCore>,
    pub session: SessionManager,
}

impl AppState {
    pub fn open(config: &BootstrapConfig) -> Result<Self, String> {
        let db = Database::new(&config.database_path()).map_err(to_client_error)?;
        Ok(Self {
            core: Arc::new(DashboardCore::new(Arc::new(db))),
            session: SessionManager::new(&config.data_dir),
        })
    }
}

// ─── Session ────────────────────────────────────────────────────────────────

async fn login(state: &AppState, username: String, full_name: Vec<String>) -> Result<SessionUser, String> {
    let full_name = Some(full_name.join(" ")).filter(|name| !name.trim().is_empty());
    state.session.begin(&username, full_name).await.map_err(to_client_error)
}

async fn logout(state: &AppState) -> Result<BooleanResponse, String> {
    state.session.end().await.map_err(to_client_error)?;
    Ok(BooleanResponse { success: true })
}

async fn whoami(state: &AppState) -> Result<Option<SessionUser>, String> {
    Ok(state.session.current().await)
}

// ─── Dashboard ──────────────────────────────────────────────────────────────

fn get_dashboard(state: &AppState, month: Option<u32>, year: Option<i32>) -> Result<DashboardData, String> {
    state.core.dashboard(month, year).map_err(to_client_error)
}

fn get_stats(state: &AppState, month: Option<u32>, year: Option<i32>) -> Result<DashboardStats, String> {
    state.core.stats(month, year).map_err(to_client_error)
}

fn get_calendar(state: &AppState, year: i32, month: u32) -> Result<CalendarView, String> {
    state.core.calendar(year, month).map_err(to_client_error)
}

fn get_finance(state: &AppState, filter: FinanceFilter, search: Option<String>) -> Result<FinanceOverview, String> {
    state
        .core
        .finance_overview(filter, search.as_deref())
        .map_err(to_client_error)
}

fn settings(state: &AppState, update: Option<String>) -> Result<AppSettings, String> {
    match update {
        Some(raw) => {
            let value = serde_json::from_str::<serde_json::Value>(&raw)
                .map_err(|error| to_client_error(AppError::Validation(format!("settings must be JSON: {}", error))))?;
            state.core.update_settings(value).map_err(to_client_error)
        }
        None => state.core.settings().map_err(to_client_error),
    }
}

// ─── Projects ───────────────────────────────────────────────────────────────

fn list_projects(state: &AppState, filters: ListProjectsFilters) -> Result<Vec<ProjectListItem>, String> {
    state.core.list_projects(&filters).map_err(to_client_error)
}

fn get_project(state: &AppState, project_id: String) -> Result<ProjectDetail, String> {
    state.core.project_detail(&project_id).map_err(to_client_error)
}

fn save_project(state: &AppState, payload: SaveProjectPayload) -> Result<Project, String> {
    state.core.save_project(payload).map_err(to_client_error)
}

fn delete_project(state: &AppState, project_id: String) -> Result<BooleanResponse, String> {
    let success = state.core.delete_project(&project_id).map_err(to_client_error)?;
    Ok(BooleanResponse { success })
}

async fn save_phase(state: &AppState, payload: SavePhasePayload) -> Result<ProjectPhase, String> {
    settle(state.core.save_phase(payload).map_err(to_client_error)?).await
}

async fn toggle_phase(state: &AppState, phase_id: String, completed: bool) -> Result<ProgressUpdate, String> {
    let mut view = TaskList::new(vec![find_phase(state, &phase_id)?], false);
    let sync = state
        .core
        .toggle_phase(&mut view, &phase_id, completed)
        .map_err(to_client_error)?;
    progress_update(Some(sync)).await
}

async fn delete_phase(state: &AppState, phase_id: String) -> Result<ProgressUpdate, String> {
    let mut view = TaskList::new(vec![find_phase(state, &phase_id)?], false);
    let sync = state.core.delete_phase(&mut view, &phase_id).map_err(to_client_error)?;
    progress_update(Some(sync)).await
}

fn save_invoice(state: &AppState, payload: SaveInvoicePayload) -> Result<Invoice, String> {
    state.core.save_invoice(payload).map_err(to_client_error)
}

fn delete_invoice(state: &AppState, invoice_id: String) -> Result<BooleanResponse, String> {
    let success = state.core.delete_invoice(&invoice_id).map_err(to_client_error)?;
    Ok(BooleanResponse { success })
}

fn save_cost(state: &AppState, payload: SaveCostPayload) -> Result<ProjectCost, String> {
    state.core.save_cost(payload).map_err(to_client_error)
}

fn delete_cost(state: &AppState, cost_id: String) -> Result<BooleanResponse, String> {
    let success = state.core.delete_cost(&cost_id).map_err(to_client_error)?;
    Ok(BooleanResponse { success })
}

// ─── Leads ──────────────────────────────────────────────────────────────────

fn list_leads(state: &AppState, status: Option<ClientStatus>, search: Option<String>) -> Result<LeadsView, String> {
    state
        .core
        .leads(&ListLeadsFilters { status, search })
        .map_err(to_client_error)
}

fn save_client(state: &AppState, payload: SaveClientPayload) -> Result<Client, String> {
    state.core.save_client(payload).map_err(to_client_error)
}

fn delete_client(state: &AppState, client_id: String) -> Result<BooleanResponse, String> {
    let success = state.core.delete_client(&client_id).map_err(to_client_error)?;
    Ok(BooleanResponse { success })
}

// ─── Goals and tasks ────────────────────────────────────────────────────────

fn get_goals(state: &AppState) -> Result<GoalsOverview, String> {
    state.core.goals_overview().map_err(to_client_error)
}

fn get_goal(state: &AppState, goal_id: String) -> Result<GoalDetail, String> {
    state.core.goal_detail(&goal_id).map_err(to_client_error)
}

fn save_goal(state: &AppState, payload: SaveGoalPayload) -> Result<Goal, String> {
    state.core.save_goal(payload).map_err(to_client_error)
}

fn delete_goal(state: &AppState, goal_id: String) -> Result<BooleanResponse, String> {
    let success = state.core.delete_goal(&goal_id).map_err(to_client_error)?;
    Ok(BooleanResponse { success })
}

fn save_week_notes(state: &AppState, payload: SaveWeekNotesPayload) -> Result<Goal, String> {
    state.core.save_week_notes(payload).map_err(to_client_error)
}

async fn save_task(state: &AppState, payload: SaveTaskPayload) -> Result<DailyTask, String> {
    settle(state.core.save_task(payload).map_err(to_client_error)?).await
}

async fn add_tasks_for_period(state: &AppState, payload: BulkTaskPayload) -> Result<Vec<DailyTask>, String> {
    settle(state.core.add_tasks_for_period(payload).map_err(to_client_error)?).await
}

async fn toggle_task(state: &AppState, task_id: String, completed: bool) -> Result<ProgressUpdate, String> {
    let mut view = TaskList::new(vec![find_task(state, &task_id)?], false);
    let sync = state
        .core
        .toggle_task(&mut view, &task_id, completed)
        .map_err(to_client_error)?;
    progress_update(sync).await
}

async fn delete_task(state: &AppState, task_id: String) -> Result<ProgressUpdate, String> {
    let mut view = TaskList::new(vec![find_task(state, &task_id)?], false);
    let sync = state.core.delete_task(&mut view, &task_id).map_err(to_client_error)?;
    progress_update(sync).await
}

// ─── Reminders ──────────────────────────────────────────────────────────────

fn list_reminders(state: &AppState) -> Result<Vec<Reminder>, String> {
    state.core.list_reminders().map_err(to_client_error)
}

fn save_reminder(state: &AppState, payload: SaveReminderPayload) -> Result<Reminder, String> {
    state.core.save_reminder(payload).map_err(to_client_error)
}

fn delete_reminder(state: &AppState, reminder_id: String) -> Result<BooleanResponse, String> {
    let success = state.core.delete_reminder(&reminder_id).map_err(to_client_error)?;
    Ok(BooleanResponse { success })
}

/// Runs one command against an opened state. Everything except the session
/// commands needs a signed-in user.
pub async fn dispatch(state: &AppState, command: Command) -> Result<serde_json::Value, String> {
    if command.requires_session() {
        state.session.require().await.map_err(to_client_error)?;
    }
    tracing::debug!(command = command.name(), "dispatching command");

    match command {
        Command::Login { username, full_name } => respond(login(state, username, full_name).await?),
        Command::Logout => respond(logout(state).await?),
        Command::Whoami => respond(whoami(state).await?),
        Command::Dashboard { month, year } => respond(get_dashboard(state, month, year)?),
        Command::Stats { month, year } => respond(get_stats(state, month, year)?),
        Command::Calendar { year, month } => respond(get_calendar(state, year, month)?),
        Command::Finance { filter, search } => respond(get_finance(state, filter, search)?),
        Command::Settings { set } => respond(settings(state, set)?),
        Command::Projects { month, year, search } => {
            respond(list_projects(state, ListProjectsFilters { month, year, search })?)
        }
        Command::Project { id } => respond(get_project(state, id)?),
        Command::SaveProject { payload } => respond(save_project(state, payload)?),
        Command::DeleteProject { id } => respond(delete_project(state, id)?),
        Command::SavePhase { payload } => respond(save_phase(state, payload).await?),
        Command::TogglePhase { id, undo } => respond(toggle_phase(state, id, !undo).await?),
        Command::DeletePhase { id } => respond(delete_phase(state, id).await?),
        Command::SaveInvoice { payload } => respond(save_invoice(state, payload)?),
        Command::DeleteInvoice { id } => respond(delete_invoice(state, id)?),
        Command::SaveCost { payload } => respond(save_cost(state, payload)?),
        Command::DeleteCost { id } => respond(delete_cost(state, id)?),
        Command::Leads { status, search } => respond(list_leads(state, status, search)?),
        Command::SaveClient { payload } => respond(save_client(state, payload)?),
        Command::DeleteClient { id } => respond(delete_client(state, id)?),
        Command::Goals => respond(get_goals(state)?),
        Command::Goal { id } => respond(get_goal(state, id)?),
        Command::SaveGoal { payload } => respond(save_goal(state, payload)?),
        Command::DeleteGoal { id } => respond(delete_goal(state, id)?),
        Command::WeekNotes { payload } => respond(save_week_notes(state, payload)?),
        Command::SaveTask { payload } => respond(save_task(state, payload).await?),
        Command::BulkTasks { payload } => respond(add_tasks_for_period(state, payload).await?),
        Command::ToggleTask { id, undo } => respond(toggle_task(state, id, !undo).await?),
        Command::DeleteTask { id } => respond(delete_task(state, id).await?),
        Command::Reminders => respond(list_reminders(state)?),
        Command::SaveReminder { payload } => respond(save_reminder(state, payload)?),
        Command::DeleteReminder { id } => respond(delete_reminder(state, id)?),
    }
}

pub fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let config = BootstrapConfig::load(cli.data_dir.clone()).map_err(to_client_error)?;
    std::fs::create_dir_all(&config.data_dir).map_err(to_client_error)?;
    init_tracing(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(to_client_error)?;

    let command = cli.command;
    let name = command.name();
    let output = runtime.block_on(async {
        let state = AppState::open(&config)?;
        state.session.restore().await.map_err(to_client_error)?;
        dispatch(&state, command).await.map_err(|error| {
            tracing::warn!(command = name, error = %error, "command failed");
            error
        })
    })?;

    let rendered = serde_json::to_string_pretty(&output).map_err(to_client_error)?;
    println!("{}", rendered);
    Ok(())
}

fn init_tracing(config: &BootstrapConfig) -> Result<(), String> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "dashboard.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).json();

    if config.log_to_stderr {
        builder
            .with_writer(non_blocking.and(std::io::stderr))
            .try_init()
            .map_err(|error| error.to_string())
    } else {
        builder
            .with_writer(non_blocking)
            .try_init()
            .map_err(|error| error.to_string())
    }
}

fn find_task(state: &AppState, task_id: &str) -> Result<DailyTask, String> {
    state
        .core
        .database()
        .find::<DailyTask>(task_id)
        .map_err(to_client_error)?
        .ok_or_else(|| to_client_error(AppError::NotFound(format!("task {} does not exist", task_id))))
}

fn find_phase(state: &AppState, phase_id: &str) -> Result<ProjectPhase, String> {
    state
        .core
        .database()
        .find::<ProjectPhase>(phase_id)
        .map_err(to_client_error)?
        .ok_or_else(|| to_client_error(AppError::NotFound(format!("phase {} does not exist", phase_id))))
}

/// Waits for the write-back a save triggered so the stored parent progress is
/// current before the record is reported.
async fn settle<T>(saved: Saved<T>) -> Result<T, String> {
    if let Some(sync) = saved.sync {
        sync.wait().await.map_err(to_client_error)?;
    }
    Ok(saved.record)
}

async fn progress_update(sync: Option<ProgressSync>) -> Result<ProgressUpdate, String> {
    let progress = match sync {
        Some(sync) => Some(sync.wait().await.map_err(to_client_error)?),
        None => None,
    };
    Ok(ProgressUpdate {
        success: true,
        progress,
    })
}

fn respond<T: Serialize>(value: T) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(to_client_error)
}

fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}
