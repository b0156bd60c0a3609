//! Output: the durable result log and human-facing summaries
//!
//! The CSV log is the product of a sweep. Console summaries and the optional
//! JSON summary are derived views over [`SweepSummary`].

mod sink;
mod summary;

pub use sink::{format_row, ResultSink, CSV_HEADER};
pub use summary::{Caveat, SweepSummary};

use crate::models::SweepGrid;
use crate::shaping::ShapingConfig;
use colored::*;
use std::fmt::Write as _;

/// Renders the sweep plan and summary for the terminal
#[derive(Debug, Clone, Copy)]
pub struct SummaryFormatter {
    use_color: bool,
}

impl SummaryFormatter {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.use_color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        if self.use_color {
            text.bold().blue().to_string()
        } else {
            text.to_string()
        }
    }

    /// Table of every trial with its derived shaping parameters
    pub fn format_plan(&self, grid: &SweepGrid, interface: Option<&str>, shaping_enabled: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.heading(&format!("Sweep plan: {} trials", grid.len())));

        let shaping = match (shaping_enabled, interface) {
            (false, _) => "disabled".to_string(),
            (true, Some(iface)) => format!("on {}", iface),
            (true, None) => "enabled, no interface detected".to_string(),
        };
        let _ = writeln!(out, "Shaping: {}", shaping);
        let _ = writeln!(
            out,
            "{:>4}  {:<8} {:<10} {:<6} {:>10} {:>10} {:>11}",
            "#", "delay", "bandwidth", "size", "rate kbit", "burst kbit", "latency ms"
        );

        for trial in grid.trials() {
            let cfg = ShapingConfig::derive(trial.bandwidth(), trial.delay());
            let _ = writeln!(
                out,
                "{:>4}  {:<8} {:<10} {:<6} {:>10} {:>10} {:>11}",
                trial.ordinal() + 1,
                trial.delay().token(),
                trial.bandwidth().token(),
                trial.size().token(),
                cfg.rate_kbps,
                cfg.burst_kbit,
                cfg.latency_ms
            );
        }

        out
    }

    /// Multi-line end-of-sweep summary
    pub fn format_summary(&self, summary: &SweepSummary) -> String {
        let mut out = String::new();
        let title = if summary.interrupted { "Sweep interrupted" } else { "Sweep complete" };
        let _ = writeln!(out, "{}", self.heading(title));

        let _ = writeln!(out, "  Trials recorded: {}/{}", summary.completed, summary.planned);

        let rate = format!("{:.1}%", summary.success_rate());
        let rate_color = if summary.failed() == 0 {
            Color::Green
        } else if summary.succeeded > 0 {
            Color::Yellow
        } else {
            Color::Red
        };
        let _ = writeln!(
            out,
            "  Succeeded: {} ({})",
            self.paint(&summary.succeeded.to_string(), Color::Green),
            self.paint(&rate, rate_color)
        );

        if summary.failed() > 0 {
            let _ = writeln!(
                out,
                "  Failed: {} (timeouts {}, process errors {}, parse failures {})",
                self.paint(&summary.failed().to_string(), Color::Red),
                summary.timeouts,
                summary.process_errors,
                summary.parse_failures
            );
        }

        if let (Some(fastest), Some(slowest)) = (summary.fastest_ms, summary.slowest_ms) {
            let _ = writeln!(out, "  Transmission time: {} ms .. {} ms", fastest, slowest);
        }

        if let Some(seconds) = summary.duration_seconds() {
            let _ = writeln!(out, "  Wall time: {:.1}s", seconds);
        }

        if summary.port_conflicts > 0 {
            let _ = writeln!(
                out,
                "  {}",
                self.paint(&format!("Port still busy after reclaim: {} trial(s)", summary.port_conflicts), Color::Yellow)
            );
        }

        self.write_caveats(&mut out, "Ran unshaped", &summary.unshaped);
        self.write_caveats(&mut out, "Degraded payloads", &summary.degraded_payloads);

        out
    }

    fn write_caveats(&self, out: &mut String, title: &str, caveats: &[Caveat]) {
        if caveats.is_empty() {
            return;
        }
        let _ = writeln!(out, "  {}:", self.paint(title, Color::Yellow));
        for caveat in caveats {
            let _ = writeln!(out, "    {} - {}", caveat.subject, caveat.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrialOutcome;

    fn grid() -> SweepGrid {
        SweepGrid::new(
            vec!["0ms".parse().unwrap(), "30ms".parse().unwrap()],
            vec!["10Mbps".parse().unwrap()],
            vec!["10K".parse().unwrap()],
        )
    }

    #[test]
    fn test_plan_lists_derived_parameters() {
        let plan = SummaryFormatter::new(false).format_plan(&grid(), Some("lo"), true);
        assert!(plan.contains("Sweep plan: 2 trials"));
        assert!(plan.contains("Shaping: on lo"));

        let row = plan.lines().find(|l| l.contains("30ms")).unwrap();
        let cols: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(cols, vec!["2", "30ms", "10Mbps", "10K", "10000", "360", "260"]);
    }

    #[test]
    fn test_plan_without_shaping() {
        let plan = SummaryFormatter::new(false).format_plan(&grid(), None, false);
        assert!(plan.contains("Shaping: disabled"));
    }

    #[test]
    fn test_summary_plain_text() {
        let mut summary = SweepSummary::new("s", 3);
        summary.record_outcome(&TrialOutcome::Success { elapsed_ms: 42 });
        summary.record_outcome(&TrialOutcome::Timeout);
        summary.record_degraded_payload("1M", "disk full");
        summary.finish(false);

        let text = SummaryFormatter::new(false).format_summary(&summary);
        assert!(text.starts_with("Sweep complete"));
        assert!(text.contains("Trials recorded: 2/3"));
        assert!(text.contains("Succeeded: 1 (50.0%)"));
        assert!(text.contains("timeouts 1"));
        assert!(text.contains("1M - disk full"));
        assert!(!text.contains("\x1b["));
    }

    #[test]
    fn test_interrupted_title() {
        let mut summary = SweepSummary::new("s", 3);
        summary.finish(true);
        assert!(SummaryFormatter::new(false).format_summary(&summary).starts_with("Sweep interrupted"));
    }
}
