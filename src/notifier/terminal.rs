use crate::analysis::AnalysisReport;
use crate::notifier::Notifier;

/// Prints a text panel per analysis to stdout.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, report: &AnalysisReport) {
        tracing::info!(
            symbol = %report.symbol,
            timeframe = %report.timeframe,
            strategy = %report.strategy,
            label = %report.classification.label,
            violations = report.classification.violations.len(),
            "wave analysis complete"
        );
        println!("{}", render(report));
    }
}

pub fn render(report: &AnalysisReport) -> String {
    let classification = &report.classification;
    let mut lines = vec![format!(
        "{} {} [{}] over {} candles",
        report.symbol, report.timeframe, report.strategy, report.points
    )];
    if let (Some(first), Some(last)) = (report.first_time, report.last_time) {
        lines.push(format!("  range:   {first} .. {last}"));
    }
    lines.push(format!(
        "  extrema: {} peaks, {} troughs",
        report.extrema.peaks.len(),
        report.extrema.troughs.len()
    ));
    lines.push(format!("  stage:   {}", classification.label));
    if let Some(targets) = classification.targets {
        lines.push(format!("  current: {:.4}", targets.current_price));
        lines.push(format!("  target:  {:.4}", targets.target_price));
    }
    lines.extend(classification.notes.iter().map(|note| format!("  - {note}")));
    lines.join("\n")
}
