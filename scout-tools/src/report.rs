use crate::error::{Result, ToolError};
use crate::traits::{Tool, ToolSpec};
use async_trait::async_trait;
use std::path::PathBuf;

/// Free companion to the job search: returns the current report so the model
/// can summarize past findings without paying for a new search.
pub struct ReadJobReportTool {
    report_path: PathBuf,
}

impl ReadJobReportTool {
    pub fn new(report_path: impl Into<PathBuf>) -> Self {
        Self {
            report_path: report_path.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadJobReportTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "read_job_report".to_string(),
            description: "Reads the saved job search report listing previously found matches."
                .to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            pricing: None,
        }
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<String> {
        match tokio::fs::read_to_string(&self.report_path).await {
            Ok(content) if content.trim().len() >= 50 => Ok(content),
            Ok(_) => Ok("The report exists but is empty; no matches recorded yet.".to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(
                "No report found. Run a job search first to generate one.".to_string(),
            ),
            Err(e) => Err(ToolError::Io(e.to_string())),
        }
    }
}
