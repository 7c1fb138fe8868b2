use anyhow::Result;
use crate::config::{CommandConfig, HealthConfig, LinkConfig, SerialConfig};

pub fn check_serial(s: &SerialConfig) -> Result<()> {
    anyhow::ensure!(!s.dev.trim().is_empty(), "serial.dev missing");
    anyhow::ensure!(s.baud > 0, "serial.baud invalid");
    anyhow::ensure!(s.read_timeout_ms >= 10 && s.read_timeout_ms <= 5_000, "serial.read_timeout_ms should be 10..5000");
    anyhow::ensure!(s.max_line_bytes >= 256, "serial.max_line_bytes too small");
    Ok(())
}

pub fn check_health(h: &HealthConfig) -> Result<()> {
    anyhow::ensure!(h.poll_ms > 0, "health.poll_ms must be > 0");
    anyhow::ensure!(h.grace >= 1, "health.grace must be >= 1");
    anyhow::ensure!(h.timeout_s.is_finite() && h.timeout_s > 0.0, "health.timeout_s must be > 0");
    // a timeout shorter than one poll period can never be observed with margin
    anyhow::ensure!(h.timeout_s * 1000.0 > h.poll_ms as f64, "health.timeout_s must exceed health.poll_ms");
    Ok(())
}

pub fn check_command(c: &CommandConfig) -> Result<()> {
    anyhow::ensure!(c.ack_wait_s.is_finite() && c.ack_wait_s > 0.0, "command.ack_wait_s must be > 0");
    anyhow::ensure!(c.ack_poll_ms > 0, "command.ack_poll_ms must be > 0");
    anyhow::ensure!(c.ack_wait_s * 1000.0 >= c.ack_poll_ms as f64, "command.ack_wait_s shorter than ack_poll_ms");
    anyhow::ensure!(c.retries <= 10, "command.retries above 10 would hold the radio for too long");
    Ok(())
}

pub fn check_link(cfg: &LinkConfig) -> Result<()> {
    check_serial(&cfg.serial)?;
    check_health(&cfg.health)?;
    check_command(&cfg.command)?;
    Ok(())
}
