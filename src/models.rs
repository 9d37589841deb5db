use crate::progress::{Completable, ProjectProgress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const INACTIVE_STATUS: &str = "Inactive";
pub const DEFAULT_PROJECT_STATUS: &str = "Pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Interested,
    Converted,
    Client,
}

impl ClientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interested => "interested",
            Self::Converted => "converted",
            Self::Client => "client",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "interested" => Some(Self::Interested),
            "converted" => Some(Self::Converted),
            "client" => Some(Self::Client),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl GoalType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveClientPayload {
    pub id: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub status: Option<ClientStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: Option<String>,
    pub client_id: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub progress: u8,
    pub due_date: Option<String>,
    pub target_revenue: f64,
    pub created_at: DateTime<Utc>,
    pub quick_description: Option<String>,
    pub whatsapp_group_name: Option<String>,
    pub initial_project_scope: Option<String>,
    pub case_study_link: Option<String>,
}

impl Project {
    pub fn is_inactive(&self) -> bool {
        self.status == INACTIVE_STATUS
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProjectPayload {
    pub id: Option<String>,
    pub name: Option<String>,
    pub client_id: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<String>,
    pub target_revenue: Option<f64>,
    pub quick_description: Option<String>,
    pub whatsapp_group_name: Option<String>,
    pub initial_project_scope: Option<String>,
    pub case_study_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPhase {
    pub id: String,
    pub project_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub milestone: Option<String>,
    pub due_date: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Completable for ProjectPhase {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePhasePayload {
    pub id: Option<String>,
    pub project_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub milestone: Option<String>,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    #[serde(rename = "type")]
    pub goal_type: GoalType,
    pub title: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub target: Option<i64>,
    pub progress: u8,
    pub deadline: Option<String>,
    pub week_end_date: Option<String>,
    pub is_active: bool,
    pub week_titles: BTreeMap<String, String>,
    pub week_descriptions: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveGoalPayload {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub goal_type: GoalType,
    pub title: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub target: Option<i64>,
    pub deadline: Option<String>,
    pub week_end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveWeekNotesPayload {
    pub goal_id: String,
    pub week_titles: BTreeMap<String, String>,
    pub week_descriptions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTask {
    pub id: String,
    pub goal_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub date: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Completable for DailyTask {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTaskPayload {
    pub id: Option<String>,
    pub goal_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// One task per day of a month, or of one sequential week chunk of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTaskPayload {
    pub goal_id: String,
    pub title: String,
    pub year: i32,
    pub month: u32,
    pub week_index: Option<usize>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub project_id: String,
    pub amount: f64,
    pub status: Option<String>,
    pub date_issued: Option<String>,
    pub due_date: Option<String>,
    pub paid: bool,
    pub pdf_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveInvoicePayload {
    pub id: Option<String>,
    pub project_id: String,
    pub amount: f64,
    pub status: Option<String>,
    pub date_issued: Option<String>,
    pub due_date: Option<String>,
    pub paid: bool,
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCost {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCostPayload {
    pub id: Option<String>,
    pub project_id: String,
    pub title: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReminderPayload {
    pub id: Option<String>,
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanResponse {
    pub success: bool,
}

/// Result of a toggle or delete that rewrites a parent's stored progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub success: bool,
    pub progress: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub currency_symbol: String,
    pub today_tasks_completed_first: bool,
    pub default_project_status: String,
    pub default_goal_color: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            currency_symbol: "RM".to_string(),
            today_tasks_completed_first: true,
            default_project_status: DEFAULT_PROJECT_STATUS.to_string(),
            default_goal_color: "#8b5cf6".to_string(),
        }
    }
}

// ─── Views ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProjectsFilters {
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListItem {
    pub project: Project,
    pub client_name: Option<String>,
    pub client_company: Option<String>,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub due_date_label: String,
    pub created_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    pub project: Project,
    pub client: Option<Client>,
    pub phases: Vec<ProjectPhase>,
    pub progress: ProjectProgress,
    pub finance: crate::finance::ProjectFinance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientWithProjects {
    pub client: Client,
    pub projects: Vec<ProjectRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLeadsFilters {
    pub status: Option<ClientStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadsSummary {
    pub client: usize,
    pub interested: usize,
    pub converted: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadsView {
    pub summary: LeadsSummary,
    pub clients: Vec<ClientWithProjects>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalsOverview {
    pub daily: Vec<Goal>,
    pub weekly: Vec<Goal>,
    pub monthly: Vec<Goal>,
    pub yearly: Vec<Goal>,
    pub todays_tasks: Vec<DailyTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalDetail {
    pub goal: Goal,
    pub tasks: Vec<DailyTask>,
    pub progress: u8,
    pub target_percentage: u8,
}
