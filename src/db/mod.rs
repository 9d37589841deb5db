pub mod query;

use crate::dates::{local_date_key_now, MonthWindow};
use crate::errors::{AppError, AppResult};
use crate::models::{
    AppSettings, Client, ClientStatus, ClientWithProjects, DailyTask, Goal, GoalType, Invoice, Project,
    ProjectCost, ProjectPhase, ProjectRef, Reminder, SaveClientPayload, SaveCostPayload, SaveGoalPayload,
    SaveInvoicePayload, SavePhasePayload, SaveProjectPayload, SaveReminderPayload, SaveTaskPayload,
    DEFAULT_PROJECT_STATUS,
};
use crate::progress::{completion_percentage, resolve_project_progress, ProjectProgress};
use crate::stats::{build_dashboard_data, DashboardData, DashboardSnapshot};
use chrono::{DateTime, NaiveDate, Utc};
use query::{text, Select, Table};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

pub trait FromRow: Sized {
    const TABLE: Table;
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

#[derive(Debug, Clone)]
pub struct ProjectBundle {
    pub project: Project,
    pub client: Option<Client>,
    pub invoices: Vec<Invoice>,
    pub costs: Vec<ProjectCost>,
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self { conn: Mutex::new(conn) };

        db.ensure_default_settings()?;

        Ok(db)
    }

    pub fn select<T: FromRow>(&self, select: &Select) -> AppResult<Vec<T>> {
        if select.table() != T::TABLE {
            return Err(AppError::Internal(format!(
                "select on {} cannot produce rows of {}",
                select.table().name(),
                T::TABLE.name()
            )));
        }
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        query_rows(&conn, select)
    }

    pub fn find<T: FromRow>(&self, id: &str) -> AppResult<Option<T>> {
        let mut rows = self.select::<T>(&Select::from(T::TABLE).eq("id", text(id)).limit(1))?;
        Ok(rows.pop())
    }

    fn exists(&self, table: Table, id: &str) -> AppResult<bool> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(1) FROM {} WHERE id = ?1", table.name()),
            [id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn delete_by_id(&self, table: Table, id: &str) -> AppResult<bool> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table.name()), [id])?;
        Ok(changed > 0)
    }

    // ─── Clients ────────────────────────────────────────────────────────────

    pub fn list_clients(&self) -> AppResult<Vec<Client>> {
        self.select(&Select::from(Table::Clients).order_by("created_at", false))
    }

    pub fn save_client(&self, payload: SaveClientPayload) -> AppResult<Client> {
        let id = payload.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let status = payload.status.unwrap_or(ClientStatus::Interested);

        {
            let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
            conn.execute(
                "INSERT INTO clients (id, name, company, email, phone, notes, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name, company = excluded.company, email = excluded.email,
                   phone = excluded.phone, notes = excluded.notes, status = excluded.status",
                params![
                    id,
                    payload.name,
                    payload.company,
                    payload.email,
                    payload.phone,
                    payload.notes,
                    status.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }

        self.find::<Client>(&id)?
            .ok_or_else(|| AppError::Internal(format!("client {} missing after save", id)))
    }

    pub fn delete_client(&self, client_id: &str) -> AppResult<bool> {
        self.delete_by_id(Table::Clients, client_id)
    }

    pub fn list_clients_with_projects(&self) -> AppResult<Vec<ClientWithProjects>> {
        let clients = self.list_clients()?;
        let ids: Vec<Value> = clients.iter().map(|client| text(client.id.as_str())).collect();
        let projects: Vec<Project> = self.select(
            &Select::from(Table::Projects)
                .any_of("client_id", ids)
                .order_by("created_at", false),
        )?;

        let mut by_client: HashMap<String, Vec<ProjectRef>> = HashMap::new();
        for project in projects {
            if let Some(client_id) = project.client_id {
                by_client.entry(client_id).or_default().push(ProjectRef {
                    id: project.id,
                    name: project.name,
                });
            }
        }

        Ok(clients
            .into_iter()
            .map(|client| ClientWithProjects {
                projects: by_client.remove(&client.id).unwrap_or_default(),
                client,
            })
            .collect())
    }

    // ─── Projects ───────────────────────────────────────────────────────────

    pub fn list_projects(&self) -> AppResult<Vec<Project>> {
        self.select(&Select::from(Table::Projects).order_by("created_at", false))
    }

    // A linked client is promoted in the same transaction as the project write.
    pub fn save_project(&self, payload: SaveProjectPayload, default_status: &str) -> AppResult<Project> {
        let existing = match payload.id.as_deref() {
            Some(id) => self.find::<Project>(id)?,
            None => None,
        };
        let id = payload.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(client_id) = payload.client_id.as_deref() {
            if !self.exists(Table::Clients, client_id)? {
                return Err(AppError::NotFound(format!("client {} does not exist", client_id)));
            }
        }

        let project = match existing {
            Some(current) => Project {
                id: current.id,
                name: payload.name.or(current.name),
                client_id: payload.client_id.or(current.client_id),
                description: payload.description.or(current.description),
                status: payload.status.unwrap_or(current.status),
                progress: current.progress,
                due_date: payload.due_date.or(current.due_date),
                target_revenue: payload.target_revenue.unwrap_or(current.target_revenue),
                created_at: current.created_at,
                quick_description: payload.quick_description.or(current.quick_description),
                whatsapp_group_name: payload.whatsapp_group_name.or(current.whatsapp_group_name),
                initial_project_scope: payload.initial_project_scope.or(current.initial_project_scope),
                case_study_link: payload.case_study_link.or(current.case_study_link),
            },
            None => Project {
                id,
                name: payload.name,
                client_id: payload.client_id,
                description: payload.description,
                status: payload
                    .status
                    .filter(|status| !status.trim().is_empty())
                    .unwrap_or_else(|| default_status.to_string()),
                progress: 0,
                due_date: payload.due_date,
                target_revenue: payload.target_revenue.unwrap_or(0.0),
                created_at: Utc::now(),
                quick_description: payload.quick_description,
                whatsapp_group_name: payload.whatsapp_group_name,
                initial_project_scope: payload.initial_project_scope,
                case_study_link: payload.case_study_link,
            },
        };

        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO projects (
               id, name, client_id, description, status, progress, due_date, target_revenue, created_at,
               quick_description, whatsapp_group_name, initial_project_scope, case_study_link
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name, client_id = excluded.client_id, description = excluded.description,
               status = excluded.status, due_date = excluded.due_date, target_revenue = excluded.target_revenue,
               quick_description = excluded.quick_description, whatsapp_group_name = excluded.whatsapp_group_name,
               initial_project_scope = excluded.initial_project_scope, case_study_link = excluded.case_study_link",
            params![
                project.id,
                project.name,
                project.client_id,
                project.description,
                project.status,
                project.progress,
                project.due_date,
                project.target_revenue,
                project.created_at.to_rfc3339(),
                project.quick_description,
                project.whatsapp_group_name,
                project.initial_project_scope,
                project.case_study_link,
            ],
        )?;
        if let Some(client_id) = project.client_id.as_deref() {
            tx.execute(
                "UPDATE clients SET status = ?1 WHERE id = ?2",
                params![ClientStatus::Client.as_str(), client_id],
            )?;
        }
        tx.commit()?;

        Ok(project)
    }

    pub fn delete_project(&self, project_id: &str) -> AppResult<bool> {
        self.delete_by_id(Table::Projects, project_id)
    }

    pub fn list_project_bundles(&self, select: &Select) -> AppResult<Vec<ProjectBundle>> {
        let projects: Vec<Project> = self.select(select)?;
        let project_ids: Vec<Value> = projects.iter().map(|project| text(project.id.as_str())).collect();
        let client_ids: Vec<Value> = projects
            .iter()
            .filter_map(|project| project.client_id.as_deref())
            .map(text)
            .collect();

        let clients: HashMap<String, Client> = self
            .select::<Client>(&Select::from(Table::Clients).any_of("id", client_ids))?
            .into_iter()
            .map(|client| (client.id.clone(), client))
            .collect();
        let mut invoices = group_by_project(
            self.select::<Invoice>(
                &Select::from(Table::Invoices)
                    .any_of("project_id", project_ids.clone())
                    .order_by("created_at", true),
            )?,
            |invoice| invoice.project_id.clone(),
        );
        let mut costs = group_by_project(
            self.select::<ProjectCost>(
                &Select::from(Table::ProjectCosts)
                    .any_of("project_id", project_ids)
                    .order_by("created_at", true),
            )?,
            |cost| cost.project_id.clone(),
        );

        Ok(projects
            .into_iter()
            .map(|project| ProjectBundle {
                client: project.client_id.as_ref().and_then(|id| clients.get(id).cloned()),
                invoices: invoices.remove(&project.id).unwrap_or_default(),
                costs: costs.remove(&project.id).unwrap_or_default(),
                project,
            })
            .collect())
    }

    pub fn get_project_bundle(&self, project_id: &str) -> AppResult<Option<ProjectBundle>> {
        let mut bundles = self.list_project_bundles(&Select::from(Table::Projects).eq("id", text(project_id)))?;
        Ok(bundles.pop())
    }

    // ─── Phases ─────────────────────────────────────────────────────────────

    pub fn list_phases(&self, project_id: &str) -> AppResult<Vec<ProjectPhase>> {
        self.select(&phases_of(project_id))
    }

    pub fn save_phase(&self, payload: SavePhasePayload) -> AppResult<ProjectPhase> {
        if !self.exists(Table::Projects, &payload.project_id)? {
            return Err(AppError::NotFound(format!("project {} does not exist", payload.project_id)));
        }
        let existing = match payload.id.as_deref() {
            Some(id) => self.find::<ProjectPhase>(id)?,
            None => None,
        };

        let phase = ProjectPhase {
            id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            project_id: payload.project_id,
            title: payload.title,
            description: payload.description,
            milestone: payload.milestone,
            due_date: payload.due_date,
            completed: existing.as_ref().map(|phase| phase.completed).unwrap_or(false),
            created_at: existing.map(|phase| phase.created_at).unwrap_or_else(Utc::now),
        };

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO project_phases (id, project_id, title, description, milestone, due_date, completed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
               title = excluded.title, description = excluded.description,
               milestone = excluded.milestone, due_date = excluded.due_date",
            params![
                phase.id,
                phase.project_id,
                phase.title,
                phase.description,
                phase.milestone,
                phase.due_date,
                phase.completed,
                phase.created_at.to_rfc3339(),
            ],
        )?;
        Ok(phase)
    }

    pub fn set_phase_completed(&self, phase_id: &str, completed: bool) -> AppResult<bool> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute(
            "UPDATE project_phases SET completed = ?1 WHERE id = ?2",
            params![completed, phase_id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_phase(&self, phase_id: &str) -> AppResult<bool> {
        self.delete_by_id(Table::ProjectPhases, phase_id)
    }

    pub fn recompute_project_progress(&self, project_id: &str) -> AppResult<ProjectProgress> {
        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        let project = query_rows::<Project>(&tx, &Select::from(Table::Projects).eq("id", text(project_id)).limit(1))?
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("project {} does not exist", project_id)))?;
        let phases: Vec<ProjectPhase> = query_rows(&tx, &phases_of(project_id))?;
        let progress = resolve_project_progress(project.progress, &phases);
        if progress.is_derived() {
            tx.execute(
                "UPDATE projects SET progress = ?1 WHERE id = ?2",
                params![progress.percent(), project_id],
            )?;
        }
        tx.commit()?;
        if progress.is_derived() {
            tracing::debug!(project_id = %project_id, progress = progress.percent(), "project progress written back");
        }
        Ok(progress)
    }

    // ─── Goals ──────────────────────────────────────────────────────────────

    pub fn list_active_goals(&self) -> AppResult<Vec<Goal>> {
        self.select(
            &Select::from(Table::Goals)
                .eq("is_active", true)
                .order_by("created_at", false),
        )
    }

    pub fn save_goal(&self, payload: SaveGoalPayload, default_color: &str) -> AppResult<Goal> {
        let existing = match payload.id.as_deref() {
            Some(id) => self.find::<Goal>(id)?,
            None => None,
        };

        let goal = Goal {
            id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            goal_type: payload.goal_type,
            title: payload.title,
            category: payload.category,
            description: payload.description,
            color: payload.color.or_else(|| Some(default_color.to_string())),
            target: payload.target,
            progress: existing.as_ref().map(|goal| goal.progress).unwrap_or(0),
            deadline: payload.deadline,
            week_end_date: payload.week_end_date,
            is_active: true,
            week_titles: existing.as_ref().map(|goal| goal.week_titles.clone()).unwrap_or_default(),
            week_descriptions: existing
                .as_ref()
                .map(|goal| goal.week_descriptions.clone())
                .unwrap_or_default(),
            created_at: existing.map(|goal| goal.created_at).unwrap_or_else(Utc::now),
        };

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO goals (
               id, type, title, category, description, color, target, progress, deadline, week_end_date,
               is_active, week_titles_json, week_descriptions_json, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
               type = excluded.type, title = excluded.title, category = excluded.category,
               description = excluded.description, color = excluded.color, target = excluded.target,
               deadline = excluded.deadline, week_end_date = excluded.week_end_date, is_active = 1",
            params![
                goal.id,
                goal.goal_type.as_str(),
                goal.title,
                goal.category,
                goal.description,
                goal.color,
                goal.target,
                goal.progress,
                goal.deadline,
                goal.week_end_date,
                goal.is_active,
                serde_json::to_string(&goal.week_titles)?,
                serde_json::to_string(&goal.week_descriptions)?,
                goal.created_at.to_rfc3339(),
            ],
        )?;
        Ok(goal)
    }

    pub fn deactivate_goal(&self, goal_id: &str) -> AppResult<bool> {
        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        let changed = tx.execute("UPDATE goals SET is_active = 0 WHERE id = ?1", [goal_id])?;
        if changed > 0 {
            tx.execute("DELETE FROM daily_tasks WHERE goal_id = ?1", [goal_id])?;
        }
        tx.commit()?;
        Ok(changed > 0)
    }

    pub fn save_week_notes(
        &self,
        goal_id: &str,
        titles: BTreeMap<String, String>,
        descriptions: BTreeMap<String, String>,
    ) -> AppResult<Goal> {
        let mut goal = self
            .find::<Goal>(goal_id)?
            .ok_or_else(|| AppError::NotFound(format!("goal {} does not exist", goal_id)))?;
        merge_notes(&mut goal.week_titles, titles);
        merge_notes(&mut goal.week_descriptions, descriptions);

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "UPDATE goals SET week_titles_json = ?1, week_descriptions_json = ?2 WHERE id = ?3",
            params![
                serde_json::to_string(&goal.week_titles)?,
                serde_json::to_string(&goal.week_descriptions)?,
                goal_id,
            ],
        )?;
        Ok(goal)
    }

    pub fn recompute_goal_progress(&self, goal_id: &str) -> AppResult<u8> {
        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        let (total, completed): (i64, i64) = tx.query_row(
            "SELECT COUNT(1), COALESCE(SUM(completed), 0) FROM daily_tasks WHERE goal_id = ?1",
            [goal_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let progress = completion_percentage(completed.max(0) as usize, total.max(0) as usize);
        tx.execute("UPDATE goals SET progress = ?1 WHERE id = ?2", params![progress, goal_id])?;
        tx.commit()?;
        tracing::debug!(goal_id = %goal_id, progress, "goal progress written back");
        Ok(progress)
    }

    // ─── Daily tasks ────────────────────────────────────────────────────────

    pub fn list_tasks_for_goal(&self, goal_id: &str) -> AppResult<Vec<DailyTask>> {
        self.select(
            &Select::from(Table::DailyTasks)
                .eq("goal_id", text(goal_id))
                .order_by("date", false)
                .order_by_nulls_last("start_time", true),
        )
    }

    pub fn list_tasks_on(&self, date_key: &str) -> AppResult<Vec<DailyTask>> {
        self.select(
            &Select::from(Table::DailyTasks)
                .eq("date", text(date_key))
                .order_by("created_at", false),
        )
    }

    pub fn save_task(&self, payload: SaveTaskPayload) -> AppResult<DailyTask> {
        if let Some(goal_id) = payload.goal_id.as_deref() {
            if !self.exists(Table::Goals, goal_id)? {
                return Err(AppError::NotFound(format!("goal {} does not exist", goal_id)));
            }
        }
        let existing = match payload.id.as_deref() {
            Some(id) => self.find::<DailyTask>(id)?,
            None => None,
        };

        let task = DailyTask {
            id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            goal_id: payload.goal_id,
            title: payload.title,
            description: payload.description,
            date: payload.date.unwrap_or_else(local_date_key_now),
            start_time: payload.start_time,
            end_time: payload.end_time,
            completed: existing.as_ref().map(|task| task.completed).unwrap_or(false),
            created_at: existing.map(|task| task.created_at).unwrap_or_else(Utc::now),
        };

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        upsert_task(&conn, &task)?;
        Ok(task)
    }

    pub fn insert_tasks(&self, tasks: &[DailyTask]) -> AppResult<usize> {
        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        for task in tasks {
            upsert_task(&tx, task)?;
        }
        tx.commit()?;
        Ok(tasks.len())
    }

    pub fn set_task_completed(&self, task_id: &str, completed: bool) -> AppResult<bool> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute(
            "UPDATE daily_tasks SET completed = ?1 WHERE id = ?2",
            params![completed, task_id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_task(&self, task_id: &str) -> AppResult<bool> {
        self.delete_by_id(Table::DailyTasks, task_id)
    }

    // ─── Invoices and costs ─────────────────────────────────────────────────

    pub fn save_invoice(&self, payload: SaveInvoicePayload) -> AppResult<Invoice> {
        if !self.exists(Table::Projects, &payload.project_id)? {
            return Err(AppError::NotFound(format!("project {} does not exist", payload.project_id)));
        }
        let created_at = match payload.id.as_deref() {
            Some(id) => self.find::<Invoice>(id)?.map(|invoice| invoice.created_at),
            None => None,
        }
        .unwrap_or_else(Utc::now);

        let invoice = Invoice {
            id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            project_id: payload.project_id,
            amount: payload.amount,
            status: payload.status,
            date_issued: payload.date_issued,
            due_date: payload.due_date,
            paid: payload.paid,
            pdf_url: payload.pdf_url,
            created_at,
        };

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO invoices (id, project_id, amount, status, date_issued, due_date, paid, pdf_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
               project_id = excluded.project_id, amount = excluded.amount, status = excluded.status,
               date_issued = excluded.date_issued, due_date = excluded.due_date, paid = excluded.paid,
               pdf_url = excluded.pdf_url",
            params![
                invoice.id,
                invoice.project_id,
                invoice.amount,
                invoice.status,
                invoice.date_issued,
                invoice.due_date,
                invoice.paid,
                invoice.pdf_url,
                invoice.created_at.to_rfc3339(),
            ],
        )?;
        Ok(invoice)
    }

    pub fn delete_invoice(&self, invoice_id: &str) -> AppResult<bool> {
        self.delete_by_id(Table::Invoices, invoice_id)
    }

    pub fn save_cost(&self, payload: SaveCostPayload) -> AppResult<ProjectCost> {
        if !self.exists(Table::Projects, &payload.project_id)? {
            return Err(AppError::NotFound(format!("project {} does not exist", payload.project_id)));
        }
        let created_at = match payload.id.as_deref() {
            Some(id) => self.find::<ProjectCost>(id)?.map(|cost| cost.created_at),
            None => None,
        }
        .unwrap_or_else(Utc::now);

        let cost = ProjectCost {
            id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            project_id: payload.project_id,
            title: payload.title,
            amount: payload.amount,
            created_at,
        };

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO project_costs (id, project_id, title, amount, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               project_id = excluded.project_id, title = excluded.title, amount = excluded.amount",
            params![
                cost.id,
                cost.project_id,
                cost.title,
                cost.amount,
                cost.created_at.to_rfc3339(),
            ],
        )?;
        Ok(cost)
    }

    pub fn delete_cost(&self, cost_id: &str) -> AppResult<bool> {
        self.delete_by_id(Table::ProjectCosts, cost_id)
    }

    // ─── Reminders ──────────────────────────────────────────────────────────

    pub fn list_reminders(&self) -> AppResult<Vec<Reminder>> {
        self.select(&Select::from(Table::Reminders).order_by_nulls_last("start_time", true))
    }

    pub fn save_reminder(&self, payload: SaveReminderPayload) -> AppResult<Reminder> {
        let created_at = match payload.id.as_deref() {
            Some(id) => self.find::<Reminder>(id)?.map(|reminder| reminder.created_at),
            None => None,
        }
        .unwrap_or_else(Utc::now);

        let reminder = Reminder {
            id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            title: payload.title,
            start_time: payload.start_time,
            end_time: payload.end_time,
            description: payload.description,
            created_at,
        };

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO reminders (id, title, start_time, end_time, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
               title = excluded.title, start_time = excluded.start_time,
               end_time = excluded.end_time, description = excluded.description",
            params![
                reminder.id,
                reminder.title,
                reminder.start_time.map(|time| time.to_rfc3339()),
                reminder.end_time.map(|time| time.to_rfc3339()),
                reminder.description,
                reminder.created_at.to_rfc3339(),
            ],
        )?;
        Ok(reminder)
    }

    pub fn delete_reminder(&self, reminder_id: &str) -> AppResult<bool> {
        self.delete_by_id(Table::Reminders, reminder_id)
    }

    // ─── Aggregation ────────────────────────────────────────────────────────
    pub fn get_dashboard_data(&self, window: &MonthWindow, today: NaiveDate) -> AppResult<DashboardData> {
        let projects: Vec<Project> = self.select(&Select::from(Table::Projects).order_by("created_at", false))?;
        let clients = self.list_clients()?;
        let goals: Vec<Goal> = self.select(&Select::from(Table::Goals).eq("type", text(GoalType::Monthly.as_str())))?;

        let today_key = crate::dates::local_date_key(today);
        let mut tasks: Vec<DailyTask> = self.select(&Select::from(Table::DailyTasks).eq("completed", true))?;
        tasks.extend(self.select::<DailyTask>(
            &Select::from(Table::DailyTasks)
                .eq("completed", false)
                .eq("date", text(today_key)),
        )?);

        let reminders = self.list_reminders()?;

        Ok(build_dashboard_data(
            window,
            today,
            DashboardSnapshot {
                projects: &projects,
                clients: &clients,
                goals: &goals,
                tasks: &tasks,
                reminders,
            },
        ))
    }

    // ─── Settings ───────────────────────────────────────────────────────────

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'app'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(AppSettings::default());
        };
        match serde_json::from_str::<AppSettings>(&raw) {
            Ok(settings) => Ok(settings),
            Err(error) => {
                tracing::warn!(error = %error, "stored settings are unreadable, falling back to defaults");
                Ok(AppSettings::default())
            }
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: AppSettings = serde_json::from_value(merged)
            .map_err(|error| AppError::Validation(format!("invalid settings: {}", error)))?;

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(&settings)?, Utc::now().to_rfc3339()],
        )?;

        Ok(settings)
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM settings WHERE key = 'app'", [], |row| row.get(0))?;
        if count == 0 {
            conn.execute(
                "INSERT INTO settings (key, value_json, updated_at) VALUES ('app', ?1, ?2)",
                params![
                    serde_json::to_string(&AppSettings::default())?,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(())
    }
}

fn query_rows<T: FromRow>(conn: &Connection, select: &Select) -> AppResult<Vec<T>> {
    let (sql, values) = select.to_sql()?;
    let mut statement = conn.prepare(&sql)?;
    let rows = statement
        .query_map(rusqlite::params_from_iter(values.iter()), T::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn phases_of(project_id: &str) -> Select {
    Select::from(Table::ProjectPhases)
        .eq("project_id", text(project_id))
        .order_by("created_at", true)
}

fn upsert_task(conn: &Connection, task: &DailyTask) -> AppResult<()> {
    conn.execute(
        "INSERT INTO daily_tasks (id, goal_id, title, description, date, start_time, end_time, completed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
           goal_id = excluded.goal_id, title = excluded.title, description = excluded.description,
           date = excluded.date, start_time = excluded.start_time, end_time = excluded.end_time",
        params![
            task.id,
            task.goal_id,
            task.title,
            task.description,
            task.date,
            task.start_time,
            task.end_time,
            task.completed,
            task.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn group_by_project<T>(rows: Vec<T>, key: impl Fn(&T) -> String) -> HashMap<String, Vec<T>> {
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(key(&row)).or_default().push(row);
    }
    grouped
}

fn merge_notes(target: &mut BTreeMap<String, String>, update: BTreeMap<String, String>) {
    for (week, note) in update {
        if note.trim().is_empty() {
            target.remove(&week);
        } else {
            target.insert(week, note);
        }
    }
}

impl FromRow for Client {
    const TABLE: Table = Table::Clients;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Client {
            id: row.get(0)?,
            name: row.get(1)?,
            company: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            notes: row.get(5)?,
            status: parse_client_status(&row.get::<_, String>(6)?),
            created_at: parse_time(&row.get::<_, String>(7)?)?,
        })
    }
}

impl FromRow for Project {
    const TABLE: Table = Table::Projects;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Project {
            id: row.get(0)?,
            name: row.get(1)?,
            client_id: row.get(2)?,
            description: row.get(3)?,
            status: row
                .get::<_, Option<String>>(4)?
                .unwrap_or_else(|| DEFAULT_PROJECT_STATUS.to_string()),
            progress: clamp_percent(row.get::<_, i64>(5)?),
            due_date: row.get(6)?,
            target_revenue: row.get(7)?,
            created_at: parse_time(&row.get::<_, String>(8)?)?,
            quick_description: row.get(9)?,
            whatsapp_group_name: row.get(10)?,
            initial_project_scope: row.get(11)?,
            case_study_link: row.get(12)?,
        })
    }
}

impl FromRow for ProjectPhase {
    const TABLE: Table = Table::ProjectPhases;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(ProjectPhase {
            id: row.get(0)?,
            project_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            milestone: row.get(4)?,
            due_date: row.get(5)?,
            completed: row.get(6)?,
            created_at: parse_time(&row.get::<_, String>(7)?)?,
        })
    }
}

impl FromRow for Goal {
    const TABLE: Table = Table::Goals;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Goal {
            id: row.get(0)?,
            goal_type: parse_goal_type(&row.get::<_, String>(1)?)?,
            title: row.get(2)?,
            category: row.get(3)?,
            description: row.get(4)?,
            color: row.get(5)?,
            target: row.get(6)?,
            progress: clamp_percent(row.get::<_, i64>(7)?),
            deadline: row.get(8)?,
            week_end_date: row.get(9)?,
            is_active: row.get(10)?,
            week_titles: serde_json::from_str(&row.get::<_, String>(11)?).unwrap_or_default(),
            week_descriptions: serde_json::from_str(&row.get::<_, String>(12)?).unwrap_or_default(),
            created_at: parse_time(&row.get::<_, String>(13)?)?,
        })
    }
}

impl FromRow for DailyTask {
    const TABLE: Table = Table::DailyTasks;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(DailyTask {
            id: row.get(0)?,
            goal_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            date: row.get(4)?,
            start_time: row.get(5)?,
            end_time: row.get(6)?,
            completed: row.get(7)?,
            created_at: parse_time(&row.get::<_, String>(8)?)?,
        })
    }
}

impl FromRow for Invoice {
    const TABLE: Table = Table::Invoices;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Invoice {
            id: row.get(0)?,
            project_id: row.get(1)?,
            amount: row.get(2)?,
            status: row.get(3)?,
            date_issued: row.get(4)?,
            due_date: row.get(5)?,
            paid: row.get(6)?,
            pdf_url: row.get(7)?,
            created_at: parse_time(&row.get::<_, String>(8)?)?,
        })
    }
}

impl FromRow for ProjectCost {
    const TABLE: Table = Table::ProjectCosts;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(ProjectCost {
            id: row.get(0)?,
            project_id: row.get(1)?,
            title: row.get(2)?,
            amount: row.get(3)?,
            created_at: parse_time(&row.get::<_, String>(4)?)?,
        })
    }
}

impl FromRow for Reminder {
    const TABLE: Table = Table::Reminders;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Reminder {
            id: row.get(0)?,
            title: row.get(1)?,
            start_time: row
                .get::<_, Option<String>>(2)?
                .map(|raw| parse_time(&raw))
                .transpose()?,
            end_time: row
                .get::<_, Option<String>>(3)?
                .map(|raw| parse_time(&raw))
                .transpose()?,
            description: row.get(4)?,
            created_at: parse_time(&row.get::<_, String>(5)?)?,
        })
    }
}

fn clamp_percent(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

fn parse_client_status(raw: &str) -> ClientStatus {
    ClientStatus::parse(raw).unwrap_or(ClientStatus::Interested)
}

fn parse_goal_type(raw: &str) -> rusqlite::Result<GoalType> {
    GoalType::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown goal type '{}'", raw),
            )),
        )
    })
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
