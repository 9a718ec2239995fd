use std::path::{Path, PathBuf};

use clap::Args;

use rudder_agent::{Credentials, GraphDriver, HttpResourceApi, OpenAiModel};
use rudder_core::actions::ActionRegistry;
use rudder_core::approval::{CorrelationId, ResumeDecision};
use rudder_core::audit::InMemoryAuditSink;
use rudder_core::config::AppConfig;
use rudder_core::errors::DomainError;
use rudder_db::repositories::{
    ApprovalRecordStatus, AuditEventRepository, PendingApprovalRepository, SessionRepository,
    SqlAuditEventRepository, SqlPendingApprovalRepository, SqlSessionRepository,
};
use rudder_db::connect_from_config;

use crate::commands::turn::load_credentials;
use crate::commands::CommandResult;

const RESOURCE_API_TIMEOUT_SECS: u64 = 30;

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Correlation id of the pending approval to resolve.
    #[arg(long)]
    pub correlation_id: String,

    /// Raw decision JSON, e.g. '{"approve": true, "payload": {}}'. Anything
    /// malformed is treated as a rejection.
    #[arg(long)]
    pub decision: String,

    /// Kubeconfig file for the downstream control plane.
    #[arg(long)]
    pub kubeconfig_file: Option<PathBuf>,

    /// Base URL of the regional control plane API.
    #[arg(long)]
    pub region_url: Option<String>,
}

pub fn run(config_path: Option<&Path>, args: ResumeArgs) -> CommandResult {
    let config = match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "resume",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    crate::init_logging(&config);

    let credentials =
        match load_credentials(args.kubeconfig_file.as_deref(), args.region_url.as_deref()) {
            Ok(credentials) => credentials,
            Err(message) => return CommandResult::failure("resume", "credentials", message, 2),
        };

    // An approval must be executable before the record is claimed; refusing
    // here leaves the record pending so the approval can be retried.
    let decision = ResumeDecision::parse(&args.decision);
    if let Err(message) = ensure_execution_ready(&decision, credentials.as_ref()) {
        return CommandResult::failure("resume", "credentials", message, 2);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "resume",
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

        let correlation_id = CorrelationId(args.correlation_id.clone());
        let stored = approvals
            .find_by_correlation_id(&correlation_id)
            .await
            .map_err(|error| ("persistence", error.to_string(), 4u8))?
            .ok_or_else(|| {
                (
                    "unknown_approval",
                    DomainError::unknown_pending_approval(&correlation_id).to_string(),
                    4u8,
                )
            })?;
        if stored.status != ApprovalRecordStatus::Pending {
            return Err((
                "approval_resolved",
                DomainError::pending_approval_already_resolved(&correlation_id).to_string(),
                4u8,
            ));
        }

        let mut state = sessions
            .find_by_id(&stored.session_id)
            .await
            .map_err(|error| ("persistence", error.to_string(), 4u8))?
            .ok_or_else(|| {
                (
                    "persistence",
                    format!("session `{}` for approval not found", stored.session_id.0),
                    4u8,
                )
            })?;

        // Claim the record before acting so a concurrent resolution of the
        // same correlation id loses cleanly.
        let status = if decision.approve {
            ApprovalRecordStatus::Approved
        } else {
            ApprovalRecordStatus::Rejected
        };
        approvals
            .mark_resolved(&correlation_id, status)
            .await
            .map_err(|error| ("approval_resolved", error.to_string(), 4u8))?;

        let model = OpenAiModel::from_config(&config.llm)
            .map_err(|error| ("collaborator", error.to_string(), 5u8))?;
        let api = HttpResourceApi::new(RESOURCE_API_TIMEOUT_SECS)
            .map_err(|error| ("collaborator", error.to_string(), 5u8))?;
        let sink = InMemoryAuditSink::default();
        let driver =
            GraphDriver::new(model, api, ActionRegistry::with_default_catalog(), sink.clone());

        let output = driver
            .resume(&mut state, &stored.record, &args.decision, credentials.as_ref())
            .await
            .map_err(|error| ("resume", error.to_string(), 6u8))?;

        sessions
            .save(&state)
            .await
            .map_err(|error| ("persistence", error.to_string(), 4u8))?;
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
        Ok(data) => CommandResult::success_with_data("resume", "approval resolved", Some(data)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("resume", error_class, message, exit_code)
        }
    }
}

fn ensure_execution_ready(
    decision: &ResumeDecision,
    credentials: Option<&Credentials>,
) -> Result<(), String> {
    if decision.approve && credentials.is_none() {
        return Err("approving requires --kubeconfig-file and --region-url (or the \
                    RUDDER_KUBECONFIG_FILE and RUDDER_REGION_URL variables)"
            .to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use rudder_agent::Credentials;
    use rudder_core::approval::ResumeDecision;

    use super::ensure_execution_ready;

    #[test]
    fn approval_without_credentials_is_refused_before_the_record_is_claimed() {
        let decision = ResumeDecision::parse("{\"approve\": true, \"payload\": {}}");
        assert!(ensure_execution_ready(&decision, None).is_err());

        let credentials = Credentials {
            kubeconfig: SecretString::from("kc-test"),
            region_url: "https://region.example".to_string(),
        };
        assert!(ensure_execution_ready(&decision, Some(&credentials)).is_ok());
    }

    #[test]
    fn rejection_needs_no_credentials() {
        let decision = ResumeDecision::parse("not json");
        assert!(!decision.approve);
        assert!(ensure_execution_ready(&decision, None).is_ok());
    }
}
