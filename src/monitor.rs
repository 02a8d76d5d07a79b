//! Configuration monitor
//!
//! Audits every inventory target and folds the reports into one summary.
//! Targets are independent; at most `concurrency` audits are in flight.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rbac_core::{AuditStatus, Auditor, ComplianceReport};

use crate::config::InventoryTarget;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: InventoryTarget,
    pub report: ComplianceReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub targets: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub errored: usize,
    pub total_issues: usize,
    pub total_warnings: usize,
    pub reports: Vec<TargetReport>,
}

impl MonitorSummary {
    /// True when every target audited cleanly.
    pub fn is_healthy(&self) -> bool {
        self.non_compliant == 0 && self.errored == 0
    }

    fn from_reports(reports: Vec<TargetReport>) -> Self {
        let status_count = |status: AuditStatus| reports.iter().filter(|r| r.report.status == status).count();
        Self {
            targets: reports.len(),
            compliant: status_count(AuditStatus::Compliant),
            non_compliant: status_count(AuditStatus::NonCompliant),
            errored: status_count(AuditStatus::Error),
            total_issues: reports.iter().map(|r| r.report.total_issues).sum(),
            total_warnings: reports.iter().map(|r| r.report.total_warnings).sum(),
            reports,
        }
    }
}

/// Audit each target. Reports come back in inventory order.
pub async fn run_inventory(auditor: &Auditor, inventory: &[InventoryTarget], concurrency: usize) -> MonitorSummary {
    info!("Monitoring {} target(s)", inventory.len());

    let reports: Vec<TargetReport> = stream::iter(inventory)
        .map(|target| async move {
            let report = auditor
                .audit(&target.environment, &target.database, target.schema.as_deref())
                .await;
            match report.status {
                AuditStatus::Compliant => info!(scope = %target, "compliant"),
                AuditStatus::NonCompliant => warn!(scope = %target, issues = report.total_issues, "non-compliant"),
                AuditStatus::Error => warn!(
                    scope = %target,
                    error = report.error.as_ref().map(|e| e.code.as_str()).unwrap_or("-"),
                    "audit failed"
                ),
            }
            TargetReport {
                target: target.clone(),
                report,
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let summary = MonitorSummary::from_reports(reports);
    info!(
        "Monitor complete: {} compliant, {} non-compliant, {} errored, {} issue(s)",
        summary.compliant, summary.non_compliant, summary.errored, summary.total_issues
    );
    summary
}
