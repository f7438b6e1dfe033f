//! Terminal progress bars for the long loops (training batches, hypercolumn
//! extraction, clustering passes).

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {prefix} {msg}";

/// A bar of `len` steps labelled with `prefix`. Hidden when stderr is not a terminal.
pub fn progress_bar(len: u64, prefix: &str) -> ProgressBar {
    let progress = ProgressBar::new(len);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.set_prefix(prefix.to_string());
    progress
}
