
use indicatif::{ProgressState, ProgressStyle};

/// Shared style for the job progress bar
pub fn get_progress_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {bar:40.green/white} {pos}/{len} jobs ({percent}); ETA: {eta_precise}; {jobs_per_sec} {msg}")
        .unwrap()
        .with_key("percent", |state: &ProgressState, w: &mut dyn std::fmt::Write| write!(w, "{:.1}%", state.fraction() * 100.0).unwrap())
        .with_key("jobs_per_sec", |state: &ProgressState, w: &mut dyn std::fmt::Write| write!(w, "{:.1} jobs/s", state.per_sec()).unwrap())
        .progress_chars("=>-")
}
