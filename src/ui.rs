//! Terminal presentation for the binaries: stage spinners, a run progress
//! bar and a console `UiSink`.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::inference::CyclePhase;
use crate::render::{BoxStyle, CycleReport, UiSink};
use crate::tracker::HazardType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Progress over a fixed number of host ticks.
    pub fn run_progress(&self, total_ticks: u64) -> RunProgress {
        let bar = self.pretty().then(|| {
            let bar = ProgressBar::new(total_ticks);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{bar:30} {pos}/{len} ticks {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });
        RunProgress { bar }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct RunProgress {
    bar: Option<ProgressBar>,
}

impl RunProgress {
    pub fn tick(&self, phase: CyclePhase) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
            bar.set_message(phase.as_str());
        }
    }

    /// Console sink that prints above the bar instead of through it.
    pub fn sink(&self) -> ConsoleSink {
        ConsoleSink {
            bar: self.bar.clone(),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Prints one line per cycle that found something or failed.
#[derive(Clone, Default)]
pub struct ConsoleSink {
    bar: Option<ProgressBar>,
}

impl UiSink for ConsoleSink {
    fn on_cycle(&mut self, report: &CycleReport<'_>) {
        let line = if let Some(err) = report.error {
            format!("cycle failed: {}", err)
        } else if report.object_count == 0 {
            return;
        } else {
            let dangerous = count_type(report, HazardType::Dangerous);
            let choking = count_type(report, HazardType::Choking);
            let plain = report
                .boxes
                .iter()
                .filter(|b| b.style == BoxStyle::Plain)
                .count();
            format!(
                "{} object(s): {} overlay(s) [{} dangerous, {} choking], {} plain box(es)",
                report.object_count,
                report.overlays.len(),
                dangerous,
                choking,
                plain
            )
        };
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }
}

fn count_type(report: &CycleReport<'_>, hazard_type: HazardType) -> usize {
    report
        .overlays
        .iter()
        .filter(|o| o.hazard_type() == hazard_type)
        .count()
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
