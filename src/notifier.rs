pub mod json;
pub mod terminal;

use crate::analysis::AnalysisReport;

/// Sink for analysis results.
pub trait Notifier: Send + Sync {
    fn notify(&self, report: &AnalysisReport);
}
