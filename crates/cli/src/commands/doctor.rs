use intentdesk_core::amount::to_minor_units;
use intentdesk_core::config::{AppConfig, LoadOptions};
use intentdesk_core::signer::AccountCredentials;
use serde::Serialize;

use crate::commands::open_session;

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

pub fn run(json_output: bool) -> String {
    let report = build_report();

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

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            let credentials = check_credentials(&config);
            let credentials_ok = credentials.status == CheckStatus::Pass;
            checks.push(credentials);
            if credentials_ok {
                checks.push(check_account_balance(&config));
            } else {
                checks.push(skipped("account_balance", "credentials did not load"));
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped("credentials", "configuration did not load"));
            checks.push(skipped("account_balance", "configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str, reason: &str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: format!("skipped because {reason}"),
    }
}

fn check_credentials(config: &AppConfig) -> DoctorCheck {
    let loaded = config
        .require_credentials_file()
        .map_err(|error| error.to_string())
        .and_then(|path| AccountCredentials::load(path).map_err(|error| error.to_string()))
        .and_then(|credentials| credentials.into_key_material().map_err(|error| error.to_string()));

    match loaded {
        Ok(key) => DoctorCheck {
            name: "credentials",
            status: CheckStatus::Pass,
            details: format!("signing key {} for {}", key.public_key(), key.account_id()),
        },
        Err(error) => DoctorCheck { name: "credentials", status: CheckStatus::Fail, details: error },
    }
}

fn check_account_balance(config: &AppConfig) -> DoctorCheck {
    let session = match open_session("doctor") {
        Ok(session) => session,
        Err(result) => {
            return DoctorCheck {
                name: "account_balance",
                status: CheckStatus::Fail,
                details: result.output,
            };
        }
    };

    let status = match session.runtime.block_on(session.orchestrator.status()) {
        Ok(status) => status,
        Err(error) => {
            return DoctorCheck {
                name: "account_balance",
                status: CheckStatus::Fail,
                details: format!("account view via {} failed: {error}", config.network.rpc_url),
            };
        }
    };

    let minimum = session
        .orchestrator
        .registry()
        .native()
        .and_then(|native| to_minor_units(config.account.min_balance, native.decimals));
    match minimum {
        Ok(minimum) if status.balance_minor >= minimum => DoctorCheck {
            name: "account_balance",
            status: CheckStatus::Pass,
            details: format!("{} holds {} NEAR", status.account_id, status.balance),
        },
        Ok(_) => DoctorCheck {
            name: "account_balance",
            status: CheckStatus::Fail,
            details: format!(
                "{} holds {} NEAR, below account.min_balance {}",
                status.account_id,
                status.balance,
                config.account.min_balance.normalize()
            ),
        },
        Err(error) => DoctorCheck {
            name: "account_balance",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
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
