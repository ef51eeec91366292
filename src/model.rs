//! Data model for execution jobs -- statuses, metrics, and the merge rules
//! that let partial payloads accumulate into one record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client-side view of a remote execution's state.
///
/// Transitions are monotonic toward the terminal set; the `rank` order is
/// what the tracker uses to discard stale poll responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Starting,
    Started,
    Running,
    Completed,
    Failed,
    Timeout,
    Error,
}

impl ExecutionStatus {
    /// True for statuses that stop the poll loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Timeout
                | ExecutionStatus::Error
        )
    }

    /// Position in the monotonic lifecycle. All terminal statuses share the
    /// top rank; a payload ranking below the applied status is stale.
    pub fn rank(&self) -> u8 {
        match self {
            ExecutionStatus::Starting => 0,
            ExecutionStatus::Started => 1,
            ExecutionStatus::Running => 2,
            _ => 3,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Starting => write!(f, "starting"),
            ExecutionStatus::Started => write!(f, "started"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Timeout => write!(f, "timeout"),
            ExecutionStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(ExecutionStatus::Starting),
            "started" => Ok(ExecutionStatus::Started),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "timeout" => Ok(ExecutionStatus::Timeout),
            "error" => Ok(ExecutionStatus::Error),
            other => Err(format!("unknown execution status '{}'", other)),
        }
    }
}

/// Which generation pipeline produced a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Unit,
    RestAssured,
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestType::Unit => write!(f, "unit"),
            TestType::RestAssured => write!(f, "restassured"),
        }
    }
}

impl std::str::FromStr for TestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unit" => Ok(TestType::Unit),
            "restassured" => Ok(TestType::RestAssured),
            other => Err(format!(
                "invalid test type '{}'. Expected values are: unit, restassured",
                other
            )),
        }
    }
}

/// Numeric execution summary. Every field is optional because the status
/// endpoint returns a coarse subset and the metrics endpoint fills in the
/// rest; merging is a field-wise overlay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_run: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failures: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_covered: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches_covered: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches_total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions_covered: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions_total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_per_endpoint: Option<f64>,
}

impl ExecutionMetrics {
    /// Overlay `other` onto self: later non-empty fields win.
    pub fn merge_from(&mut self, other: &ExecutionMetrics) {
        merge_opt(&mut self.tests_run, &other.tests_run);
        merge_opt(&mut self.success_rate, &other.success_rate);
        merge_opt(&mut self.failures, &other.failures);
        merge_opt(&mut self.errors, &other.errors);
        merge_opt(&mut self.execution_time, &other.execution_time);
        merge_opt(&mut self.build_success, &other.build_success);
        merge_opt(&mut self.line_coverage, &other.line_coverage);
        merge_opt(&mut self.branch_coverage, &other.branch_coverage);
        merge_opt(&mut self.instruction_coverage, &other.instruction_coverage);
        merge_opt(&mut self.lines_covered, &other.lines_covered);
        merge_opt(&mut self.lines_total, &other.lines_total);
        merge_opt(&mut self.branches_covered, &other.branches_covered);
        merge_opt(&mut self.branches_total, &other.branches_total);
        merge_opt(&mut self.instructions_covered, &other.instructions_covered);
        merge_opt(&mut self.instructions_total, &other.instructions_total);
        merge_opt(&mut self.endpoints_count, &other.endpoints_count);
        merge_opt(&mut self.tests_per_endpoint, &other.tests_per_endpoint);
    }
}

fn merge_opt<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
    if let Some(v) = src {
        *dst = Some(v.clone());
    }
}

/// Derived scoring returned by the detailed metrics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAnalysis {
    pub overall_score: f64,
    pub coverage_quality: String,
    pub test_completeness: String,
}

/// Pre-formatted coverage strings from the detailed metrics endpoint,
/// kept verbatim for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_coverage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_coverage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_coverage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_per_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_endpoints: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tests: Option<u32>,
}

/// The inputs that produced a job, denormalized onto the record so the
/// archive can show them without re-fetching anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestProvenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_test: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<String>,
}

/// One in-flight or archived test execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ExecutionMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_analysis: Option<QualityAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_summary: Option<CoverageSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_info: Option<TestProvenance>,
}

impl ExecutionRecord {
    /// Fresh record for a just-submitted job.
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            status: ExecutionStatus::Starting,
            timestamp: Utc::now(),
            start_time: None,
            end_time: None,
            logs: None,
            metrics: None,
            quality_analysis: None,
            recommendations: None,
            coverage_summary: None,
            test_info: None,
        }
    }

    /// Apply a status observation under the monotonic rule.
    ///
    /// Returns false when the observation is stale (ranks below the applied
    /// status) or the record is already terminal; the caller should discard
    /// the rest of that payload's status context but may still merge data.
    pub fn apply_status(&mut self, status: ExecutionStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if status.rank() < self.status.rank() {
            return false;
        }
        self.status = status;
        true
    }

    /// Field-wise overlay of a later (possibly partial) record.
    ///
    /// Non-empty fields of `other` win; the status moves only forward. This
    /// is the merge the store uses on upsert, so writing the same id twice
    /// yields the union of both payloads.
    pub fn merge_from(&mut self, other: &ExecutionRecord) {
        self.apply_status(other.status);
        merge_opt(&mut self.start_time, &other.start_time);
        merge_opt(&mut self.end_time, &other.end_time);
        merge_opt(&mut self.logs, &other.logs);
        if let Some(theirs) = &other.metrics {
            match &mut self.metrics {
                Some(mine) => mine.merge_from(theirs),
                slot => *slot = Some(theirs.clone()),
            }
        }
        merge_opt(&mut self.quality_analysis, &other.quality_analysis);
        merge_opt(&mut self.recommendations, &other.recommendations);
        merge_opt(&mut self.coverage_summary, &other.coverage_summary);
        if let Some(theirs) = &other.test_info {
            match &mut self.test_info {
                Some(mine) => {
                    merge_opt(&mut mine.history_id, &theirs.history_id);
                    merge_opt(&mut mine.source_code, &theirs.source_code);
                    merge_opt(&mut mine.generated_test, &theirs.generated_test);
                    merge_opt(&mut mine.test_type, &theirs.test_type);
                }
                slot => *slot = Some(theirs.clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Timeout.is_terminal());
        assert!(ExecutionStatus::Error.is_terminal());
        assert!(!ExecutionStatus::Starting.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_never_regresses() {
        let mut rec = ExecutionRecord::new("abc");
        assert!(rec.apply_status(ExecutionStatus::Running));
        // A late "started" response must not pull the record backwards
        assert!(!rec.apply_status(ExecutionStatus::Started));
        assert_eq!(rec.status, ExecutionStatus::Running);

        assert!(rec.apply_status(ExecutionStatus::Completed));
        // Terminal is absorbing, even against another terminal status
        assert!(!rec.apply_status(ExecutionStatus::Error));
        assert!(!rec.apply_status(ExecutionStatus::Running));
        assert_eq!(rec.status, ExecutionStatus::Completed);
    }

    #[test]
    fn test_merge_is_union_of_disjoint_fields() {
        let mut first = ExecutionRecord::new("abc");
        first.status = ExecutionStatus::Completed;
        first.logs = Some("build ok".into());
        first.metrics = Some(ExecutionMetrics {
            tests_run: Some(12),
            success_rate: Some(91.7),
            ..Default::default()
        });

        let mut second = ExecutionRecord::new("abc");
        second.status = ExecutionStatus::Completed;
        second.metrics = Some(ExecutionMetrics {
            line_coverage: Some(78.2),
            ..Default::default()
        });
        second.quality_analysis = Some(QualityAnalysis {
            overall_score: 82.0,
            coverage_quality: "good".into(),
            test_completeness: "adequate".into(),
        });

        first.merge_from(&second);

        let m = first.metrics.as_ref().unwrap();
        assert_eq!(m.tests_run, Some(12));
        assert_eq!(m.success_rate, Some(91.7));
        assert_eq!(m.line_coverage, Some(78.2));
        assert_eq!(first.logs.as_deref(), Some("build ok"));
        assert_eq!(first.quality_analysis.as_ref().unwrap().overall_score, 82.0);
    }

    #[test]
    fn test_status_wire_format() {
        let s: ExecutionStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(s, ExecutionStatus::Running);
        assert_eq!(serde_json::to_string(&ExecutionStatus::Timeout).unwrap(), "\"timeout\"");
        assert_eq!("restassured".parse::<TestType>().unwrap(), TestType::RestAssured);
        assert!("integration".parse::<TestType>().is_err());
    }
}
