use serde::Serialize;
use workdesk_agent::{HttpWorkspaceProvider, IntentRecognizer};
use workdesk_core::config::{AppConfig, LoadOptions, StoreBackend};
use workdesk_db::connect_from_config;

use crate::commands::current_thread_runtime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &LoadOptions, json_output: bool) -> String {
    let report = build_report(options);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_intent_rules(&config));
            checks.push(check_provider(&config));
            checks.push(check_store_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["intent_rules", "provider_readiness", "store_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    // skipped checks are informational, only failures fail the report
    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_intent_rules(config: &AppConfig) -> DoctorCheck {
    match IntentRecognizer::new(config.intent.clone()) {
        Ok(recognizer) => DoctorCheck {
            name: "intent_rules",
            status: CheckStatus::Pass,
            details: format!("{} intent rules compiled", recognizer.rule_order().len()),
        },
        Err(error) => {
            DoctorCheck { name: "intent_rules", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_provider(config: &AppConfig) -> DoctorCheck {
    let Some(base_url) = config.provider.base_url.as_deref() else {
        return DoctorCheck {
            name: "provider_readiness",
            status: CheckStatus::Skipped,
            details: "provider.base_url is unset; tools run against the dry-run provider"
                .to_string(),
        };
    };

    match HttpWorkspaceProvider::from_config(&config.provider) {
        Ok(_) => DoctorCheck {
            name: "provider_readiness",
            status: CheckStatus::Pass,
            details: format!(
                "http provider at `{base_url}` ({})",
                if config.provider.api_token.is_some() { "token set" } else { "no token" }
            ),
        },
        Err(error) => DoctorCheck {
            name: "provider_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_store_connectivity(config: &AppConfig) -> DoctorCheck {
    if config.store.backend == StoreBackend::Memory {
        return DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Pass,
            details: "in-process memory store (state is not shared between processes)".to_string(),
        };
    }

    let runtime = match current_thread_runtime("doctor") {
        Ok(runtime) => runtime,
        Err(failure) => {
            return DoctorCheck {
                name: "store_connectivity",
                status: CheckStatus::Fail,
                details: failure.output,
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.store)
            .await
            .map_err(|error| format!("failed to connect to store: {error}"))?;
        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.store.url),
        },
        Err(error) => {
            DoctorCheck { name: "store_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
