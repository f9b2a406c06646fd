//! Built-in listeners

use resinkit_core::{PrintStatus, PrinterListener, PrinterState};

/// Logs every printer event
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl PrinterListener for LoggingListener {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_printer_connected(
        &self,
        firmware_version: &str,
        port: &str,
        baud_rate: u32,
    ) -> anyhow::Result<()> {
        tracing::info!(
            "Printer connected on {} @ {} baud, firmware {}",
            port,
            baud_rate,
            firmware_version
        );
        Ok(())
    }

    fn on_printer_disconnected(&self) -> anyhow::Result<()> {
        tracing::info!("Printer disconnected");
        Ok(())
    }

    fn on_print_started(&self, filename: &str) -> anyhow::Result<()> {
        tracing::info!("Print started: {}", filename);
        Ok(())
    }

    fn on_print_paused(&self, filename: &str) -> anyhow::Result<()> {
        tracing::info!("Print paused: {}", filename);
        Ok(())
    }

    fn on_print_resumed(&self, filename: &str) -> anyhow::Result<()> {
        tracing::info!("Print resumed: {}", filename);
        Ok(())
    }

    fn on_print_finished(&self, filename: &str, previous_state: PrinterState) -> anyhow::Result<()> {
        tracing::info!("Print finished: {} (was {})", filename, previous_state);
        Ok(())
    }

    fn on_status_update(
        &self,
        status: &PrintStatus,
        z_position: f64,
        _selected_file: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(
            "Status {} {:.1}% ({}/{} bytes) Z={:.3}",
            status.state,
            status.progress_percent,
            status.current_byte,
            status.total_bytes,
            z_position
        );
        Ok(())
    }
}
