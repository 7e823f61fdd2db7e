//! Human-readable time formatting
//!
//! Used for log lines and the CLI progress display.

/// Values below this many seconds use the short `X.XXs` form
const SHORT_FORMAT_MAX_SECS: f64 = 100.0;

/// Values below this many seconds use `M:SS.S`, above it `H:MM:SS`
const MEDIUM_FORMAT_MAX_SECS: f64 = 3600.0;

/// Format a clock time or duration in seconds.
///
/// # Examples
///
/// ```
/// use segue_common::human_time::format_seconds;
///
/// assert_eq!(format_seconds(2.9), "2.90s");
/// assert_eq!(format_seconds(330.0), "5:30.0");
/// assert_eq!(format_seconds(3661.0), "1:01:01");
/// assert_eq!(format_seconds(-0.1), "-0.10s");
/// ```
pub fn format_seconds(seconds: f64) -> String {
    let sign = if seconds < 0.0 { "-" } else { "" };
    let abs = seconds.abs();

    let formatted = if abs < SHORT_FORMAT_MAX_SECS {
        format!("{:.2}s", abs)
    } else if abs < MEDIUM_FORMAT_MAX_SECS {
        let minutes = (abs / 60.0).floor();
        let secs = abs - minutes * 60.0;
        format!("{}:{:04.1}", minutes as u64, secs)
    } else {
        let total = abs.round() as u64;
        format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
    };

    format!("{}{}", sign, formatted)
}

/// Format a playback position as `M:SS` (or `H:MM:SS` past one hour)
///
/// # Examples
///
/// ```
/// use segue_common::human_time::format_position_ms;
///
/// assert_eq!(format_position_ms(0), "0:00");
/// assert_eq!(format_position_ms(65_400), "1:05");
/// assert_eq!(format_position_ms(3_725_000), "1:02:05");
/// ```
pub fn format_position_ms(position_ms: u64) -> String {
    let total_secs = position_ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
