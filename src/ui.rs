use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Terminal feedback for batch runs: spinners and progress bars on a TTY,
/// plain `==>` lines otherwise.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self {
            mode,
            is_tty,
            quiet: false,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    /// Never draws anything; used by tests and library callers.
    pub fn quiet() -> Self {
        Self {
            mode: UiMode::Plain,
            is_tty: false,
            quiet: true,
        }
    }

    fn use_pretty(&self) -> bool {
        !self.quiet && self.is_tty && matches!(self.mode, UiMode::Pretty | UiMode::Auto)
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            if !self.quiet {
                eprintln!("==> {}", name);
            }
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Progress over `total` images.
    pub fn progress(&self, total: u64) -> Progress {
        if self.use_pretty() {
            let bar = ProgressBar::new(total);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            Progress { bar: Some(bar) }
        } else {
            Progress { bar: None }
        }
    }
}

pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    pub fn advance(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
            bar.inc(1);
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
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

fn stage_done_message(name: &str, elapsed: Duration) -> String {
    format!("✔ {} ({})", name, format_duration(elapsed))
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = stage_done_message(&self.name, self.start.elapsed());
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            log::info!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
