const MS_IN_SECOND: f64 = 1000.0;
const MS_IN_MINUTE: f64 = 60.0 * MS_IN_SECOND;
const MS_IN_HOUR: f64 = 60.0 * MS_IN_MINUTE;
const MS_IN_DAY: f64 = 24.0 * MS_IN_HOUR;
const MS_IN_YEAR: f64 = 365.242 * MS_IN_DAY;

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * KB;
const GB: f64 = 1024.0 * MB;

/// Format a duration in milliseconds using the coarsest fitting units.
///
/// Lower units are truncated, the year count rounds to nearest. Negative or
/// non-finite input is returned as a plain number.
pub fn format_duration(ms: f64) -> String {
    if !ms.is_finite() || ms < 0.0 {
        return ms.to_string();
    }
    if ms < MS_IN_SECOND {
        return format!("{}ms", ms);
    }

    let years = if ms < MS_IN_YEAR {
        0.0
    } else {
        (ms / MS_IN_YEAR).round()
    };
    let rest = (ms - years * MS_IN_YEAR).max(0.0);
    let days = (rest / MS_IN_DAY).floor();
    let rest = rest - days * MS_IN_DAY;
    let hours = (rest / MS_IN_HOUR).floor();
    let rest = rest - hours * MS_IN_HOUR;
    let minutes = (rest / MS_IN_MINUTE).floor();
    let rest = rest - minutes * MS_IN_MINUTE;
    let seconds = (rest / MS_IN_SECOND).floor();

    if ms < MS_IN_MINUTE {
        format!("{}s", seconds)
    } else if ms < MS_IN_HOUR {
        format!("{}m {}s", minutes, seconds)
    } else if ms < MS_IN_DAY {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if ms < MS_IN_YEAR {
        format!("{}d {}h {}m", days, hours, minutes)
    } else {
        format!("{}y {}d {}h", years, days, hours)
    }
}

/// Format a byte count with 1024-based units. Raw bytes are not rounded.
pub fn format_bytes(bytes: f64) -> String {
    if !bytes.is_finite() || bytes < 0.0 {
        return bytes.to_string();
    }
    if bytes < KB {
        format!("{}B", bytes)
    } else if bytes < MB {
        format!("{:.1}KB", bytes / KB)
    } else if bytes < GB {
        format!("{:.1}MB", bytes / MB)
    } else {
        format!("{:.1}GB", bytes / GB)
    }
}

/// Render a metric value the way the dashboard shows it, by metric name.
pub fn pretty(name: &str, value: f64) -> String {
    match name {
        "jvm/uptime" | "jvm/gc/msec" => format_duration(value),
        "jvm/mem/current/used" | "jvm/mem/current/max" => format_bytes(value),
        _ => value.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessClass {
    Bad,
    Poor,
    Good,
}

impl SuccessClass {
    pub fn of(ratio: f64) -> Self {
        if ratio < 0.9 {
            SuccessClass::Bad
        } else if ratio < 0.99 {
            SuccessClass::Poor
        } else {
            SuccessClass::Good
        }
    }
}

// ratio in [0, 1] -> "99.5%"
pub fn format_success_rate(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Success rate in percent from request/failure deltas, rounded to 4 decimals.
pub fn success_rate_percent(requests: f64, failures: f64) -> f64 {
    if requests <= 0.0 {
        return 0.0;
    }
    let rate = (1.0 - failures / requests) * 100.0;
    (rate * 10_000.0).round() / 10_000.0
}
