use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use secrecy::SecretString;
use serde_json::Value;

use rudder_agent::{Credentials, GraphDriver, HttpResourceApi, OpenAiModel, TurnInput};
use rudder_core::actions::ActionRegistry;
use rudder_core::audit::InMemoryAuditSink;
use rudder_core::config::AppConfig;
use rudder_core::session::{SessionId, SessionState, Stage};
use rudder_db::repositories::{
    AuditEventRepository, PendingApprovalRepository, SessionRepository,
    SqlAuditEventRepository, SqlPendingApprovalRepository, SqlSessionRepository,
};
use rudder_db::connect_from_config;

use crate::commands::CommandResult;

const RESOURCE_API_TIMEOUT_SECS: u64 = 30;

#[derive(Args, Debug)]
pub struct TurnArgs {
    /// Conversation to run the turn in; created on first use.
    #[arg(long)]
    pub session: String,

    /// The user's chat message for this turn.
    #[arg(long)]
    pub message: String,

    /// Explicit stage tag; omitted means the turn is classified.
    #[arg(long)]
    pub stage: Option<String>,

    /// Project context as a JSON object; replaces the stored context.
    #[arg(long)]
    pub project_context: Option<String>,

    /// Resource context as a JSON object; replaces the stored context.
    #[arg(long)]
    pub resource_context: Option<String>,

    /// Kubeconfig file for the downstream control plane.
    #[arg(long)]
    pub kubeconfig_file: Option<PathBuf>,

    /// Base URL of the regional control plane API.
    #[arg(long)]
    pub region_url: Option<String>,
}

/// Credentials are optional for a turn; read-only conversations never need
/// them. Both pieces must be present for any execution to happen.
pub(crate) fn load_credentials(
    kubeconfig_file: Option<&Path>,
    region_url: Option<&str>,
) -> Result<Option<Credentials>, String> {
    let env_kubeconfig = env::var("RUDDER_KUBECONFIG_FILE").ok();
    let kubeconfig_path = kubeconfig_file
        .map(Path::to_path_buf)
        .or_else(|| env_kubeconfig.map(PathBuf::from));
    let region_url = region_url
        .map(str::to_string)
        .or_else(|| env::var("RUDDER_REGION_URL").ok())
        .filter(|url| !url.is_empty());

    match (kubeconfig_path, region_url) {
        (Some(path), Some(region_url)) => {
            let kubeconfig = fs::read_to_string(&path)
                .map_err(|error| format!("failed to read kubeconfig `{}`: {error}", path.display()))?;
            Ok(Some(Credentials { kubeconfig: SecretString::from(kubeconfig), region_url }))
        }
        _ => Ok(None),
    }
}

fn parse_context(label: &str, raw: Option<&str>) -> Result<Option<Value>, String> {
    raw.map(serde_json::from_str)
        .transpose()
        .map_err(|error| format!("invalid {label} JSON: {error}"))
}

pub fn run(config_path: Option<&Path>, args: TurnArgs) -> CommandResult {
    let config = match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "turn",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    crate::init_logging(&config);

    let stage = match args.stage.as_deref() {
        None => None,
        Some(raw) => match Stage::parse(raw) {
            Some(stage) => Some(stage),
            None => {
                return CommandResult::failure(
                    "turn",
                    "bad_request",
                    format!("unknown stage `{raw}`"),
                    2,
                );
            }
        },
    };
    let project_context = match parse_context("project context", args.project_context.as_deref()) {
        Ok(context) => context,
        Err(message) => return CommandResult::failure("turn", "bad_request", message, 2),
    };
    let resource_context = match parse_context("resource context", args.resource_context.as_deref())
    {
        Ok(context) => context,
        Err(message) => return CommandResult::failure("turn", "bad_request", message, 2),
    };
    let credentials =
        match load_credentials(args.kubeconfig_file.as_deref(), args.region_url.as_deref()) {
            Ok(credentials) => credentials,
            Err(message) => return CommandResult::failure("turn", "credentials", message, 2),
        };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "turn",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let sessions = SqlSessionRepository::new(pool.clone());
        let approvals = SqlPendingApprovalRepository::new(pool.clone());
        let audit_log = SqlAuditEventRepository::new(pool.clone());

        let session_id = SessionId(args.session.clone());
        let mut state = sessions
            .find_by_id(&session_id)
            .await
            .map_err(|error| ("persistence", error.to_string(), 4u8))?
            .unwrap_or_else(|| SessionState::new(session_id.clone()));

        let model = OpenAiModel::from_config(&config.llm)
            .map_err(|error| ("collaborator", error.to_string(), 5u8))?;
        let api = HttpResourceApi::new(RESOURCE_API_TIMEOUT_SECS)
            .map_err(|error| ("collaborator", error.to_string(), 5u8))?;
        let sink = InMemoryAuditSink::default();
        let driver =
            GraphDriver::new(model, api, ActionRegistry::with_default_catalog(), sink.clone());

        let input = TurnInput {
            session_id: session_id.clone(),
            user_message: args.message.clone(),
            stage,
            project_context,
            resource_context,
        };
        let output = driver
            .run_turn(&mut state, input, credentials.as_ref())
            .await
            .map_err(|error| ("turn", error.to_string(), 6u8))?;

        sessions
            .save(&state)
            .await
            .map_err(|error| ("persistence", error.to_string(), 4u8))?;
        if let Some(record) = &output.pending_approval {
            approvals
                .save(&session_id, record)
                .await
                .map_err(|error| ("persistence", error.to_string(), 4u8))?;
        }
        for event in sink.events() {
            audit_log
                .append(&event)
                .await
                .map_err(|error| ("persistence", error.to_string(), 4u8))?;
        }

        pool.close().await;
        serde_json::to_value(&output).map_err(|error| ("serialization", error.to_string(), 6u8))
    });

    match result {
        Ok(data) => CommandResult::success_with_data("turn", "turn completed", Some(data)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("turn", error_class, message, exit_code)
        }
    }
}
