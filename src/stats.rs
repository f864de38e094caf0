//! Human-readable index summary for `tmw stats`.

use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::path::Path;

use crate::gateway::GatewayStats;

/// Render `stats` the way `tmw stats` prints it. `index_file` is stat'ed
/// for its on-disk size when given.
pub fn render(stats: &GatewayStats, index_file: Option<&Path>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "tell-me-why: index stats");
    let _ = writeln!(out, "========================");
    let _ = writeln!(out);
    let _ = writeln!(out, "  Location:    {}", stats.location);
    if let Some(path) = index_file {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let _ = writeln!(out, "  Size:        {}", format_bytes(size));
    }
    let _ = writeln!(out, "  Collection:  {}", stats.collection);
    let _ = writeln!(
        out,
        "  Embeddings:  {} ({} dims)",
        stats.embedding_model, stats.dims
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "  Sources:     {}", stats.source_count);
    let _ = writeln!(out, "  Chunks:      {}", stats.record_count);
    let last = match stats.last_ingested_at {
        Some(ts) => format_relative(ts, Utc::now()),
        None => "never".to_string(),
    };
    let _ = writeln!(out, "  Last ingest: {}", last);
    out
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago" style, falling back to a date past 30 days.
pub fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();
    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
