//! Human-readable size and throughput labels.

use std::time::Duration;

const MB: f64 = 1024.0 * 1024.0;

/// Bytes as megabytes with two decimals.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2}MB", bytes as f64 / MB)
}

/// Integer percentage, rounded down and capped at 100.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.min(total) * 100) / total) as u8
}

/// Share of `total` media time already written, rounded down.
pub fn duration_percent(done: Duration, total: Duration) -> u8 {
    percent_of(done.as_millis() as u64, total.as_millis() as u64)
}

/// `HH:MM:SS` clock for media time.
pub fn format_clock(time: Duration) -> String {
    let secs = time.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

/// Label for the remux phase.
pub fn remux_label(segments: usize, done: Duration, total: Option<Duration>) -> String {
    match total {
        Some(total) => format!(
            "remuxing {} segments, {} / {}",
            segments,
            format_clock(done),
            format_clock(total)
        ),
        None => format!("remuxing {} segments, {}", segments, format_clock(done)),
    }
}

/// Average throughput label, e.g. `1.25MB/s`.
pub fn throughput(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return "-".to_string();
    }
    format!("{:.2}MB/s", bytes as f64 / MB / secs)
}

/// Label for the segment fetch phase.
pub fn segments_label(completed: usize, total: usize, bytes: u64, elapsed: Duration) -> String {
    format!(
        "{}/{} segments, {} ({})",
        completed,
        total,
        format_megabytes(bytes),
        throughput(bytes, elapsed)
    )
}

/// Label for a progressive download, with or without a known total.
pub fn transfer_label(done: u64, total: Option<u64>) -> String {
    match total {
        Some(total) => format!(
            "{} / {} ({}%)",
            format_megabytes(done),
            format_megabytes(total),
            percent_of(done, total)
        ),
        None => format!("{} (total unknown)", format_megabytes(done)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 40), 0);
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(39, 40), 97);
        assert_eq!(percent_of(40, 40), 100);
        assert_eq!(percent_of(50, 40), 100);
        assert_eq!(percent_of(5, 0), 0);
        assert_eq!(
            duration_percent(Duration::from_millis(1_999), Duration::from_secs(8)),
            24
        );
        assert_eq!(
            duration_percent(Duration::from_secs(9), Duration::from_secs(8)),
            100
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(format_megabytes(5 * 1024 * 1024), "5.00MB");
        assert_eq!(
            transfer_label(1024 * 1024, Some(4 * 1024 * 1024)),
            "1.00MB / 4.00MB (25%)"
        );
        assert_eq!(transfer_label(0, None), "0.00MB (total unknown)");
        assert_eq!(
            remux_label(3, Duration::from_secs(75), Some(Duration::from_secs(3725))),
            "remuxing 3 segments, 00:01:15 / 01:02:05"
        );
        assert_eq!(
            remux_label(3, Duration::ZERO, None),
            "remuxing 3 segments, 00:00:00"
        );
        assert_eq!(
            segments_label(2, 8, 2 * 1024 * 1024, Duration::from_secs(2)),
            "2/8 segments, 2.00MB (1.00MB/s)"
        );
    }
}
