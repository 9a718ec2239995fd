use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use rudder_core::config::AppConfig;
use rudder_db::connect_from_config;

#[derive(Debug, Serialize)]
struct Check {
    name: String,
    ok: bool,
    detail: String,
    elapsed_ms: u128,
}

pub fn run(config_path: Option<&Path>, json: bool) -> String {
    let mut checks = Vec::new();

    let started = Instant::now();
    let config = match AppConfig::load(config_path) {
        Ok(config) => {
            checks.push(Check {
                name: "config".to_string(),
                ok: true,
                detail: "configuration loaded".to_string(),
                elapsed_ms: started.elapsed().as_millis(),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(Check {
                name: "config".to_string(),
                ok: false,
                detail: error.to_string(),
                elapsed_ms: started.elapsed().as_millis(),
            });
            None
        }
    };

    if let Some(config) = &config {
        checks.push(check_database(config));
        checks.push(check_llm(config));
    }

    render(&checks, json)
}

fn check_database(config: &AppConfig) -> Check {
    let started = Instant::now();
    let outcome = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| error.to_string())
        .and_then(|runtime| {
            runtime.block_on(async {
                let pool = connect_from_config(&config.database)
                    .await
                    .map_err(|error| format!("failed to connect to database: {error}"))?;
                pool.close().await;
                Ok(())
            })
        });

    match outcome {
        Ok(()) => Check {
            name: "database".to_string(),
            ok: true,
            detail: format!("connected to {}", config.database.url),
            elapsed_ms: started.elapsed().as_millis(),
        },
        Err(detail) => Check {
            name: "database".to_string(),
            ok: false,
            detail,
            elapsed_ms: started.elapsed().as_millis(),
        },
    }
}

/// Readiness only checks that an API key is present; it never calls the
/// model endpoint.
fn check_llm(config: &AppConfig) -> Check {
    let started = Instant::now();
    let (ok, detail) = if config.llm.api_key.is_some() {
        (true, format!("api key set, model {}", config.llm.model))
    } else {
        (false, "RUDDER_LLM_API_KEY is not set".to_string())
    };
    Check { name: "llm".to_string(), ok, detail, elapsed_ms: started.elapsed().as_millis() }
}

fn render(checks: &[Check], json: bool) -> String {
    if json {
        return serde_json::to_string(checks).unwrap_or_else(|error| {
            format!("{{\"error\":\"serialization: {}\"}}", error.to_string().replace('"', "'"))
        });
    }

    let mut lines = Vec::with_capacity(checks.len());
    for check in checks {
        let marker = if check.ok { "ok " } else { "FAIL" };
        lines.push(format!("[{marker}] {:<8} {} ({}ms)", check.name, check.detail, check.elapsed_ms));
    }
    lines.join("\n")
}
