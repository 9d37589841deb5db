use empire_dashboard_lib::cli::Command;
use empire_dashboard_lib::config::BootstrapConfig;
use empire_dashboard_lib::finance::FinanceFilter;
use empire_dashboard_lib::models::{
    ClientStatus, GoalType, SaveClientPayload, SaveGoalPayload, SaveInvoicePayload, SaveProjectPayload,
    SaveTaskPayload,
};
use empire_dashboard_lib::{dispatch, AppState};
use serde_json::Value;

fn open_state(dir: &tempfile::TempDir) -> AppState {
    let config = BootstrapConfig {
        data_dir: dir.path().to_path_buf(),
        ..BootstrapConfig::default()
    };
    AppState::open(&config).expect("open state")
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id field").to_string()
}

async fn sign_in(state: &AppState) {
    dispatch(
        state,
        Command::Login {
            username: "aisha".to_string(),
            full_name: vec!["Aisha".to_string(), "Rahman".to_string()],
        },
    )
    .await
    .expect("login");
}

#[tokio::test]
async fn commands_need_a_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = open_state(&dir);

    let error = dispatch(&state, Command::Goals).await.expect_err("signed out");
    assert!(error.starts_with("UNAUTHORIZED"));

    let user = dispatch(
        &state,
        Command::Login {
            username: "aisha".to_string(),
            full_name: vec!["Aisha".to_string(), "Rahman".to_string()],
        },
    )
    .await
    .expect("login");
    assert_eq!(user["fullName"], "Aisha Rahman");

    let restored = open_state(&dir);
    restored.session.restore().await.expect("restore");
    dispatch(&restored, Command::Goals).await.expect("goals after restore");

    dispatch(&restored, Command::Logout).await.expect("logout");
    assert!(dispatch(&restored, Command::Goals).await.is_err());
}

#[tokio::test]
async fn linking_a_project_promotes_the_lead() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = open_state(&dir);
    sign_in(&state).await;

    let client = dispatch(
        &state,
        Command::SaveClient {
            payload: SaveClientPayload {
                name: Some("Ravi".to_string()),
                company: Some("Kopi Labs".to_string()),
                ..SaveClientPayload::default()
            },
        },
    )
    .await
    .expect("save client");
    assert_eq!(client["status"], "interested");

    let project = dispatch(
        &state,
        Command::SaveProject {
            payload: SaveProjectPayload {
                name: Some("Storefront".to_string()),
                client_id: Some(id_of(&client)),
                target_revenue: Some(5_000.0),
                ..SaveProjectPayload::default()
            },
        },
    )
    .await
    .expect("save project");
    assert_eq!(project["status"], "Pending");

    let leads = dispatch(
        &state,
        Command::Leads {
            status: Some(ClientStatus::Client),
            search: None,
        },
    )
    .await
    .expect("leads");
    assert_eq!(leads["summary"]["client"], 1);
    assert_eq!(leads["summary"]["interested"], 0);
    assert_eq!(leads["clients"][0]["projects"][0]["name"], "Storefront");

    dispatch(
        &state,
        Command::SaveInvoice {
            payload: SaveInvoicePayload {
                project_id: id_of(&project),
                amount: 5_000.0,
                paid: true,
                ..SaveInvoicePayload::default()
            },
        },
    )
    .await
    .expect("invoice");

    let paid = dispatch(
        &state,
        Command::Finance {
            filter: FinanceFilter::FullyPaid,
            search: Some("kopi".to_string()),
        },
    )
    .await
    .expect("finance");
    assert_eq!(paid["projects"].as_array().map(Vec::len), Some(1));

    let pending = dispatch(
        &state,
        Command::Finance {
            filter: FinanceFilter::Pending,
            search: None,
        },
    )
    .await
    .expect("finance");
    assert_eq!(pending["projects"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn task_toggles_and_deletes_rewrite_goal_progress() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = open_state(&dir);
    sign_in(&state).await;

    let goal = dispatch(
        &state,
        Command::SaveGoal {
            payload: SaveGoalPayload {
                id: None,
                goal_type: GoalType::Monthly,
                title: Some("Outreach".to_string()),
                category: None,
                description: None,
                color: None,
                target: Some(20),
                deadline: None,
                week_end_date: None,
            },
        },
    )
    .await
    .expect("save goal");
    let goal_id = id_of(&goal);

    let mut task_ids = Vec::new();
    for title in ["OT 1", "OT 2", "OT 3", "OT 4"] {
        let task = dispatch(
            &state,
            Command::SaveTask {
                payload: SaveTaskPayload {
                    goal_id: Some(goal_id.clone()),
                    title: title.to_string(),
                    ..SaveTaskPayload::default()
                },
            },
        )
        .await
        .expect("save task");
        task_ids.push(id_of(&task));
    }

    let mut last = Value::Null;
    for id in &task_ids[..3] {
        last = dispatch(
            &state,
            Command::ToggleTask {
                id: id.clone(),
                undo: false,
            },
        )
        .await
        .expect("toggle");
    }
    assert_eq!(last["progress"], 75);

    let deleted = dispatch(&state, Command::DeleteTask { id: task_ids[0].clone() })
        .await
        .expect("delete");
    assert_eq!(deleted["progress"], 67);

    let detail = dispatch(&state, Command::Goal { id: goal_id.clone() })
        .await
        .expect("goal detail");
    assert_eq!(detail["goal"]["progress"], 67);
    assert_eq!(detail["tasks"].as_array().map(Vec::len), Some(3));

    let overview = dispatch(&state, Command::Goals).await.expect("goals");
    assert_eq!(overview["monthly"].as_array().map(Vec::len), Some(1));
    assert_eq!(overview["todaysTasks"].as_array().map(Vec::len), Some(3));

    let missing = dispatch(
        &state,
        Command::ToggleTask {
            id: "missing".to_string(),
            undo: false,
        },
    )
    .await
    .expect_err("missing task");
    assert!(missing.starts_with("NOT_FOUND"));
}

#[tokio::test]
async fn dashboard_and_calendar_render_for_a_month() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = open_state(&dir);
    sign_in(&state).await;

    let dashboard = dispatch(
        &state,
        Command::Dashboard {
            month: Some(2),
            year: Some(2024),
        },
    )
    .await
    .expect("dashboard");
    assert_eq!(dashboard["stats"]["totalProjects"], 0);
    assert_eq!(dashboard["weeklyOutreaches"].as_array().map(Vec::len), Some(7));

    let calendar = dispatch(&state, Command::Calendar { year: 2024, month: 2 })
        .await
        .expect("calendar");
    assert_eq!(calendar["grid"]["days"].as_array().map(Vec::len), Some(29));
    assert_eq!(calendar["weekChunks"].as_array().map(Vec::len), Some(5));

    let invalid = dispatch(&state, Command::Stats { month: None, year: Some(2024) })
        .await
        .expect_err("year without month");
    assert!(invalid.starts_with("VALIDATION"));
}
