//! Small HTTP server used by hosting platforms to check the bot is alive.

use crate::config::defaults;
use crate::status::{RelayStatus, StatusSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use warp::Filter;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime: i64,
}

/// `GET /` status page, `GET /health` JSON report, `GET /ping` liveness.
pub fn routes(
    status: Arc<RelayStatus>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_status = warp::any().map(move || status.clone());

    let index = warp::get()
        .and(warp::path::end())
        .and(with_status.clone())
        .map(|status: Arc<RelayStatus>| warp::reply::html(render_index(&status.snapshot())));

    let health = warp::get()
        .and(warp::path("health"))
        .and(warp::path::end())
        .and(with_status)
        .map(|status: Arc<RelayStatus>| {
            warp::reply::json(&HealthReport {
                status: "healthy",
                service: defaults::SERVICE_NAME,
                timestamp: Utc::now(),
                uptime: status.snapshot().uptime_secs,
            })
        });

    let ping = warp::get()
        .and(warp::path("ping"))
        .and(warp::path::end())
        .map(|| "pong");

    index.or(health).or(ping)
}

/// Serves [`routes`] on all interfaces in a background task.
pub fn keep_alive(status: Arc<RelayStatus>, port: u16) -> JoinHandle<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    log::info!("Health endpoint listening on {}", addr);
    tokio::spawn(warp::serve(routes(status)).run(addr))
}

fn render_index(snapshot: &StatusSnapshot) -> String {
    let (label, color) = if snapshot.running {
        ("Running", "green")
    } else {
        ("Stopped", "red")
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Telegram Relay Bot</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; }}
        .metric {{ margin: 8px 0; }}
    </style>
</head>
<body>
    <h1>Telegram Relay Bot</h1>
    <div class="metric">Status: <span style="color: {color}">{label}</span> ({state})</div>
    <div class="metric">Uptime: {uptime} seconds</div>
    <div class="metric">Messages received: {received}</div>
    <div class="metric">Messages forwarded: {sent}</div>
    <div class="metric">Messages filtered: {filtered}</div>
    <div class="metric">Failed sends: {failed}</div>
    <div class="metric">Errors: {errors}</div>
    <div class="metric">Started: {started}</div>
</body>
</html>"#,
        color = color,
        label = label,
        state = snapshot.state,
        uptime = snapshot.uptime_secs,
        received = snapshot.messages_received,
        sent = snapshot.sends_succeeded,
        filtered = snapshot.messages_filtered,
        failed = snapshot.sends_failed,
        errors = snapshot.errors,
        started = snapshot.started_at.to_rfc3339(),
    )
}
