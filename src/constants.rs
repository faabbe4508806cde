pub const TICK_RATE_MS: u64 = 250; // UI redraw cadence
pub const CHART_CAPACITY: usize = 60;
pub const LIVE_INTERVAL_MS: u64 = 1000;
pub const REFRESH_INTERVAL_MS: u64 = 5000;
pub const LEAST_PERFORMANT_CLIENTS: usize = 4;
pub const DEFAULT_ADMIN_URL: &str = "http://localhost:9990/admin/";
pub const DEFAULT_LOG_FILE: &str = "admin_dash.log";
// Dashboard pages that may be given in place of the admin base URL
pub const ADMIN_PAGES: [&str; 2] = ["histograms", "metrics_graphs"];

// Server metrics requested by the summary page, keyed by display label.
pub const SUMMARY_METRICS: [(&str, &str); 6] = [
    ("Success Rate", "successRate"),
    ("Requests", "requests"),
    ("Uptime", "jvm/uptime"),
    ("Thread Count", "jvm/thread/count"),
    ("Memory", "jvm/mem/current/used"),
    ("Garbage Collection", "jvm/gc/msec"),
];

// Keys polled on the process page.
pub const PROCESS_METRICS: [&str; 6] = [
    "jvm/uptime",
    "jvm/thread/count",
    "jvm/mem/current/used",
    "jvm/mem/current/max",
    "jvm/gc/msec",
    "jvm/gc/cycles",
];
