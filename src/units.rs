//! Human-readable sizes, speeds and durations (1024-based)

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;

pub fn human_size(bytes: u64) -> String {
    let b = bytes as f64;
    if b < KB {
        format!("{} byte(s)", bytes)
    } else if b < MB {
        format!("{:.3} KB", b / KB)
    } else if b < GB {
        format!("{:.3} MB", b / MB)
    } else {
        format!("{:.3} GB", b / GB)
    }
}

pub fn human_speed(bits_per_second: f64) -> String {
    if bits_per_second < KB {
        format!("{:.2} bps", bits_per_second)
    } else if bits_per_second < MB {
        format!("{:.2} Kbps", bits_per_second / KB)
    } else if bits_per_second < GB {
        format!("{:.2} Mbps", bits_per_second / MB)
    } else {
        format!("{:.2} Gbps", bits_per_second / GB)
    }
}

pub fn human_time(ms: u64) -> String {
    if ms < 1000 {
        format!("{} ms", ms)
    } else {
        format!("{:.3} sec", ms as f64 / 1000.0)
    }
}

/// Throughput for `bytes` moved in `ms` milliseconds; 0 when no time passed.
pub fn bits_per_second(bytes: u64, ms: u64) -> f64 {
    if ms == 0 {
        return 0.0;
    }
    bytes as f64 * 8.0 * 1000.0 / ms as f64
}
