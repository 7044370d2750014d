use chrono::{DateTime, Utc};
use pengpt_core::config::{AppConfig, LoadOptions};
use pengpt_core::rotation::{RotationScheduler, SchedulerSnapshot};
use serde::Serialize;

use super::{escape_json, CommandResult};

pub const EXIT_CHECK_FAILED: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct ReadinessCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    overall_status: CheckStatus,
    summary: String,
    checked_at: DateTime<Utc>,
    checks: Vec<ReadinessCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(LoadOptions::default());
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CHECK_FAILED };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"check serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: LoadOptions) -> CheckReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(ReadinessCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_rotation(&config));
        }
        Err(error) => {
            checks.push(ReadinessCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(ReadinessCheck {
                name: "rotation_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "check: all readiness checks passed".to_string()
    } else {
        "check: one or more readiness checks failed".to_string()
    };

    CheckReport { overall_status, summary, checked_at: Utc::now(), checks }
}

fn check_rotation(config: &AppConfig) -> ReadinessCheck {
    let scheduler = RotationScheduler::new(
        config.llm.api_keys.clone(),
        config.llm.tiers.clone(),
        &config.llm.default_tier,
        config.conversation.model_cooldown(),
    );

    match scheduler {
        Ok(scheduler) => ReadinessCheck {
            name: "rotation_readiness",
            status: CheckStatus::Pass,
            details: describe_rotation(&scheduler.snapshot(Utc::now())),
        },
        Err(error) => ReadinessCheck {
            name: "rotation_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn describe_rotation(snapshot: &SchedulerSnapshot) -> String {
    format!(
        "{} credential(s), first key {}; tier `{}` starts on `{}`",
        snapshot.credential_count,
        snapshot.credential_fingerprint,
        snapshot.tier,
        snapshot.model
    )
}

fn render_human(report: &CheckReport) -> String {
    let mut lines = vec![report.summary.clone()];

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
