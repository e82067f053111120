use indicatif::{ProgressBar, ProgressStyle};

const BYTES_TEMPLATE: &str =
    "[{elapsed_precise}] {msg} {spinner:.green} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} eta: {eta}";
const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {msg} {spinner:.green}";

/// Progress over the bytes of an input table. Stdin has no known size, so it
/// gets a spinner instead.
pub fn create_progress_bar_bytes(quiet_mode: bool, msg: &str, length: Option<u64>) -> ProgressBar {
    let bar = match (quiet_mode, length) {
        (true, _) => ProgressBar::hidden(),
        (false, Some(len)) => ProgressBar::new(len),
        (false, None) => ProgressBar::new_spinner(),
    };

    bar.set_message(msg);
    match length {
        Some(_) => bar.set_style(
            ProgressStyle::default_bar()
                .template(BYTES_TEMPLATE)
                .progress_chars("=> "),
        ),
        None => bar.set_style(ProgressStyle::default_spinner().template(SPINNER_TEMPLATE)),
    };

    bar.inc(0); // Just to avoid the drawing after the log.

    bar
}

pub fn create_spinner(quiet_mode: bool, msg: &str) -> ProgressBar {
    let bar = if quiet_mode {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };

    bar.set_message(msg);
    bar.set_style(ProgressStyle::default_spinner().template(SPINNER_TEMPLATE));
    bar.enable_steady_tick(200);

    bar
}
