//! Terminal display for the spfmap CLI.
//!
//! Header, spinner and end-of-run summary. JSON mode bypasses all of it.

use console::{style, Term};
use spfmap_lib::{InputSource, RecordSelection, ScanSummary};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::Settings;

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// An async braille-dot spinner that writes to stderr so stdout stays clean.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    /// Start a spinner, or return `None` when stderr is not a terminal.
    pub fn start(message: String) -> Option<Self> {
        let term = Term::stderr();
        if !term.is_term() {
            return None;
        }

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = tokio::spawn(async move {
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let _ = term.clear_line();
                let _ = term.write_str(&format!("{} {}", style(frame).cyan(), message));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Some(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the spinner and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a run.
pub fn print_header(input: &InputSource, settings: &Settings) {
    let subject = match input {
        InputSource::Target(domain) => domain.clone(),
        InputSource::File(path) => path.display().to_string(),
    };

    println!(
        "{} {} {}",
        style("spfmap").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!("- Scanning {}", subject)).dim(),
    );

    let meta_parts = [
        format!("Records: {}", selection_label(settings.scan.selection)),
        format!("Workers: {}", settings.scan.workers),
        format!("Timeout: {}ms", settings.scan.lookup_timeout.as_millis()),
        format!("DB: {}", settings.db),
    ];
    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

fn selection_label(selection: RecordSelection) -> &'static str {
    match selection {
        RecordSelection::Policy => "SPF",
        RecordSelection::Alignment => "DMARC",
        RecordSelection::Both => "SPF + DMARC",
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the end-of-run summary.
pub fn print_summary(summary: &ScanSummary, db: &str) {
    let domain_word = if summary.domains_scanned == 1 {
        "domain"
    } else {
        "domains"
    };

    println!(
        "{} {} {} in {}",
        style("✓").green().bold(),
        style(summary.domains_scanned).bold(),
        domain_word,
        format_duration(summary.duration),
    );

    let mut parts = vec![
        format!("{} with SPF", style(summary.with_policy_record).green()),
        format!("{} with DMARC", style(summary.with_alignment_record).green()),
        format!("{} stored in {}", summary.records_persisted, db),
    ];
    if summary.write_failures > 0 {
        parts.push(format!(
            "{} write failures",
            style(summary.write_failures).red().bold()
        ));
    }

    println!("  {}", parts.join(&format!("{}", style(" | ").dim())));
}

/// Human-friendly elapsed time.
fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
