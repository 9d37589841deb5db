use crate::finance::FinanceFilter;
use crate::models::{
    BulkTaskPayload, ClientStatus, SaveClientPayload, SaveCostPayload, SaveGoalPayload, SaveInvoicePayload,
    SavePhasePayload, SaveProjectPayload, SaveReminderPayload, SaveTaskPayload, SaveWeekNotesPayload,
};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "empire-dashboard", version, about = "Project, lead and goal dashboard")]
pub struct Cli {
    /// Data directory holding the database, session and logs
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sign in; every other command needs a session
    Login {
        username: String,
        /// Display name, may span several words
        full_name: Vec<String>,
    },
    /// Sign out and remove the session file
    Logout,
    /// Show the signed-in user
    Whoami,

    /// Home page data for a month (defaults to the current month)
    Dashboard {
        month: Option<u32>,
        year: Option<i32>,
    },
    /// Headline numbers only
    Stats {
        month: Option<u32>,
        year: Option<i32>,
    },
    /// Month grid and week rows
    Calendar {
        year: i32,
        month: u32,
    },
    /// Per-project finance with totals
    Finance {
        #[arg(default_value = "pending", value_parser = parse_finance_filter)]
        filter: FinanceFilter,
        search: Option<String>,
    },
    /// Read or merge app settings
    Settings {
        /// JSON object merged over the stored settings
        #[arg(long)]
        set: Option<String>,
    },

    /// List projects, optionally by creation month
    Projects {
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        search: Option<String>,
    },
    /// One project with phases, progress and finance
    Project {
        id: String,
    },
    SaveProject {
        #[arg(value_parser = json_payload::<SaveProjectPayload>)]
        payload: SaveProjectPayload,
    },
    DeleteProject {
        id: String,
    },
    SavePhase {
        #[arg(value_parser = json_payload::<SavePhasePayload>)]
        payload: SavePhasePayload,
    },
    /// Mark a phase done (or not done with --undo)
    TogglePhase {
        id: String,
        #[arg(long)]
        undo: bool,
    },
    DeletePhase {
        id: String,
    },
    SaveInvoice {
        #[arg(value_parser = json_payload::<SaveInvoicePayload>)]
        payload: SaveInvoicePayload,
    },
    DeleteInvoice {
        id: String,
    },
    SaveCost {
        #[arg(value_parser = json_payload::<SaveCostPayload>)]
        payload: SaveCostPayload,
    },
    DeleteCost {
        id: String,
    },

    /// Clients grouped by lead status
    Leads {
        #[arg(value_parser = parse_client_status)]
        status: Option<ClientStatus>,
        #[arg(long)]
        search: Option<String>,
    },
    SaveClient {
        #[arg(value_parser = json_payload::<SaveClientPayload>)]
        payload: SaveClientPayload,
    },
    DeleteClient {
        id: String,
    },

    /// Active goals by type plus today's tasks
    Goals,
    /// One goal with its tasks
    Goal {
        id: String,
    },
    SaveGoal {
        #[arg(value_parser = json_payload::<SaveGoalPayload>)]
        payload: SaveGoalPayload,
    },
    /// Hide a goal and drop its tasks
    DeleteGoal {
        id: String,
    },
    WeekNotes {
        #[arg(value_parser = json_payload::<SaveWeekNotesPayload>)]
        payload: SaveWeekNotesPayload,
    },
    SaveTask {
        #[arg(value_parser = json_payload::<SaveTaskPayload>)]
        payload: SaveTaskPayload,
    },
    /// Add one task per day of a month or of one week chunk
    BulkTasks {
        #[arg(value_parser = json_payload::<BulkTaskPayload>)]
        payload: BulkTaskPayload,
    },
    ToggleTask {
        id: String,
        #[arg(long)]
        undo: bool,
    },
    DeleteTask {
        id: String,
    },

    Reminders,
    SaveReminder {
        #[arg(value_parser = json_payload::<SaveReminderPayload>)]
        payload: SaveReminderPayload,
    },
    DeleteReminder {
        id: String,
    },
}

impl Command {
    pub fn requires_session(&self) -> bool {
        !matches!(self, Self::Login { .. } | Self::Logout | Self::Whoami)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::Whoami => "whoami",
            Self::Dashboard { .. } => "dashboard",
            Self::Stats { .. } => "stats",
            Self::Calendar { .. } => "calendar",
            Self::Finance { .. } => "finance",
            Self::Settings { .. } => "settings",
            Self::Projects { .. } => "projects",
            Self::Project { .. } => "project",
            Self::SaveProject { .. } => "save-project",
            Self::DeleteProject { .. } => "delete-project",
            Self::SavePhase { .. } => "save-phase",
            Self::TogglePhase { .. } => "toggle-phase",
            Self::DeletePhase { .. } => "delete-phase",
            Self::SaveInvoice { .. } => "save-invoice",
            Self::DeleteInvoice { .. } => "delete-invoice",
            Self::SaveCost { .. } => "save-cost",
            Self::DeleteCost { .. } => "delete-cost",
            Self::Leads { .. } => "leads",
            Self::SaveClient { .. } => "save-client",
            Self::DeleteClient { .. } => "delete-client",
            Self::Goals => "goals",
            Self::Goal { .. } => "goal",
            Self::SaveGoal { .. } => "save-goal",
            Self::DeleteGoal { .. } => "delete-goal",
            Self::WeekNotes { .. } => "week-notes",
            Self::SaveTask { .. } => "save-task",
            Self::BulkTasks { .. } => "bulk-tasks",
            Self::ToggleTask { .. } => "toggle-task",
            Self::DeleteTask { .. } => "delete-task",
            Self::Reminders => "reminders",
            Self::SaveReminder { .. } => "save-reminder",
            Self::DeleteReminder { .. } => "delete-reminder",
        }
    }
}

fn parse_finance_filter(raw: &str) -> Result<FinanceFilter, String> {
    FinanceFilter::parse(raw).ok_or_else(|| format!("unknown filter '{}', expected pending, paid or all", raw))
}

fn parse_client_status(raw: &str) -> Result<ClientStatus, String> {
    ClientStatus::parse(raw)
        .ok_or_else(|| format!("unknown status '{}', expected interested, converted or client", raw))
}

fn json_payload<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_str(raw).map_err(|error| format!("invalid JSON payload: {}", error))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["empire-dashboard"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse").command
    }

    #[test]
    fn login_collects_full_name_words() {
        match parse(&["login", "aisha", "Aisha", "Rahman"]) {
            Command::Login { username, full_name } => {
                assert_eq!(username, "aisha");
                assert_eq!(full_name, vec!["Aisha", "Rahman"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn finance_filter_defaults_to_pending() {
        assert!(matches!(
            parse(&["finance"]),
            Command::Finance { filter: FinanceFilter::Pending, search: None }
        ));
        assert!(matches!(
            parse(&["finance", "paid", "kopi"]),
            Command::Finance { filter: FinanceFilter::FullyPaid, search: Some(_) }
        ));
        assert!(Cli::try_parse_from(["empire-dashboard", "finance", "overdue"]).is_err());
    }

    #[test]
    fn leads_status_and_dashboard_window() {
        assert!(matches!(
            parse(&["leads", "converted"]),
            Command::Leads { status: Some(ClientStatus::Converted), search: None }
        ));
        assert!(matches!(
            parse(&["dashboard", "2", "2024"]),
            Command::Dashboard { month: Some(2), year: Some(2024) }
        ));
    }

    #[test]
    fn json_payloads_are_parsed_up_front() {
        match parse(&["save-task", r#"{"title":"OT 1","goalId":"g1","date":"2024-05-02"}"#]) {
            Command::SaveTask { payload } => {
                assert_eq!(payload.title, "OT 1");
                assert_eq!(payload.goal_id.as_deref(), Some("g1"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["empire-dashboard", "save-task", "{oops"]).is_err());
    }

    #[test]
    fn global_data_dir_and_session_gate() {
        let cli = Cli::try_parse_from(["empire-dashboard", "goals", "--data-dir", "/tmp/dash"]).expect("parse");
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/dash")));
        assert!(cli.command.requires_session());
        assert!(!parse(&["logout"]).requires_session());
        assert_eq!(parse(&["toggle-task", "t1", "--undo"]).name(), "toggle-task");
    }
}
