use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Total / successes / failures bars for a batch of independent work items.
///
/// With `tui` disabled every bar is hidden, so callers can report progress unconditionally.
#[derive(Clone)]
pub(crate) struct BatchProgress {
    pub(crate) multi: MultiProgress,
    total: ProgressBar,
    success: ProgressBar,
    fails: ProgressBar,
}

impl BatchProgress {
    pub(crate) fn new(len: usize, tui: bool) -> Self {
        if !tui {
            return Self::hidden();
        }

        // overall multi progress bar
        let multi = MultiProgress::new();

        // total number of items to process
        let total = multi.add(ProgressBar::new(len as u64).with_style(bar_style(
            "{spinner:.magenta}\n \
            {msg:>9.white} |{bar:57.white/grey}| {pos:<2} / {human_len} \
            ({percent_precise}%) [Time: {elapsed}, Rate: {per_sec}, ETA: {eta}]",
        )));
        total.set_message("total");
        total.enable_steady_tick(Duration::from_millis(100));

        // total successes
        let success = multi.insert_after(
            &total,
            ProgressBar::new(len as u64)
                .with_style(bar_style(" {msg:>9.green} |{bar:57.green}| {pos:<2.green}")),
        );
        success.set_message("successes");

        // total failures
        let fails = multi.insert_after(
            &success,
            ProgressBar::new(len as u64)
                .with_style(bar_style(" {msg:>9.red} |{bar:57.red}| {pos:<2.red}")),
        );
        fails.set_message("failures");

        Self {
            multi,
            total,
            success,
            fails,
        }
    }

    fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            total: ProgressBar::hidden(),
            success: ProgressBar::hidden(),
            fails: ProgressBar::hidden(),
        }
    }

    pub(crate) fn succeeded(&self) {
        self.success.inc(1);
        self.total.inc(1);
    }

    pub(crate) fn failed(&self) {
        self.fails.inc(1);
        self.total.inc(1);
    }

    pub(crate) fn finish(&self) {
        self.fails.finish_and_clear();
        self.success.finish_and_clear();
        self.total.finish_and_clear();
    }
}

/// Byte-progress bar for a single download, attached under `multi`.
pub(crate) fn download_bar(multi: &MultiProgress, name: &str, tui: bool) -> ProgressBar {
    if !tui {
        return ProgressBar::hidden();
    }

    let pb = multi.add(ProgressBar::new(0).with_style(bar_style(
        "{msg:>22} [{elapsed_precise:.magenta}] |{bar:40.cyan/blue}| {bytes}/{total_bytes} \
        [Rate: {bytes_per_sec:.magenta}, ETA: {eta:.blue}]",
    )));
    pb.set_message(name.to_string());
    pb
}

/// Spinner for one item of a batch, attached under `multi`.
pub(crate) fn spinner(multi: &MultiProgress, msg: String, tui: bool) -> ProgressBar {
    if !tui {
        return ProgressBar::hidden();
    }

    let pb = multi.add(ProgressBar::new_spinner().with_message(msg));
    if let Ok(style) = ProgressStyle::default_spinner().template("\t   > {msg} {spinner:.magenta}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(50));
    pb
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("## ")
}
