use parking_lot::Mutex;
use resinkit_core::{
    ListenerHandle, ListenerRegistry, PrintStatus, PrinterEvent, PrinterListener, PrinterState,
};
use std::sync::Arc;

#[derive(Default)]
struct Journal {
    entries: Mutex<Vec<String>>,
}

impl Journal {
    fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}

impl PrinterListener for Journal {
    fn name(&self) -> &str {
        "journal"
    }

    fn on_printer_connected(&self, version: &str, port: &str, baud: u32) -> anyhow::Result<()> {
        self.entries
            .lock()
            .push(format!("connected:{}:{}:{}", version, port, baud));
        Ok(())
    }

    fn on_print_finished(&self, filename: &str, previous: PrinterState) -> anyhow::Result<()> {
        self.entries
            .lock()
            .push(format!("finished:{}:{}", filename, previous));
        Ok(())
    }

    fn on_status_update(
        &self,
        status: &PrintStatus,
        _z_position: f64,
        _selected_file: &str,
    ) -> anyhow::Result<()> {
        self.entries
            .lock()
            .push(format!("status:{}:{}", status.state, status.progress_percent));
        Ok(())
    }
}

/// Removes itself the first time it hears anything
struct OneShot {
    registry: Arc<ListenerRegistry>,
    handle: Mutex<Option<ListenerHandle>>,
}

impl PrinterListener for OneShot {
    fn on_printer_disconnected(&self) -> anyhow::Result<()> {
        if let Some(handle) = self.handle.lock().take() {
            self.registry.unregister(&handle);
        }
        Ok(())
    }
}

#[test]
fn test_every_listener_hears_events() {
    let registry = ListenerRegistry::new();
    let first = Arc::new(Journal::default());
    let second = Arc::new(Journal::default());
    registry.register(first.clone());
    registry.register(second.clone());

    registry.dispatch(&PrinterEvent::Connected {
        firmware_version: "V4.13".to_string(),
        port: "/dev/serial0".to_string(),
        baud_rate: 115200,
    });
    registry.dispatch(&PrinterEvent::PrintFinished {
        filename: "cube.ctb".to_string(),
        previous_state: PrinterState::Paused,
    });

    let expected = vec![
        "connected:V4.13:/dev/serial0:115200".to_string(),
        "finished:cube.ctb:PAUSED".to_string(),
    ];
    assert_eq!(first.entries(), expected);
    assert_eq!(second.entries(), expected);
}

#[test]
fn test_unhandled_events_are_ignored() {
    let registry = ListenerRegistry::new();
    let journal = Arc::new(Journal::default());
    registry.register(journal.clone());

    registry.dispatch(&PrinterEvent::PrintPaused("cube.ctb".to_string()));
    registry.dispatch(&PrinterEvent::Disconnected);

    assert!(journal.entries().is_empty());
}

#[test]
fn test_listener_can_unregister_itself_during_dispatch() {
    let registry = Arc::new(ListenerRegistry::new());
    let one_shot = Arc::new(OneShot {
        registry: Arc::clone(&registry),
        handle: Mutex::new(None),
    });
    let handle = registry.register(one_shot.clone());
    *one_shot.handle.lock() = Some(handle);
    assert_eq!(registry.len(), 1);

    registry.dispatch(&PrinterEvent::Disconnected);

    assert!(registry.is_empty());
}

#[test]
fn test_status_update_carries_progress() {
    let registry = ListenerRegistry::new();
    let journal = Arc::new(Journal::default());
    registry.register(journal.clone());

    let mut status = PrintStatus::with_state(PrinterState::Printing);
    status.record_bytes(250, 1000);
    registry.dispatch(&PrinterEvent::StatusUpdate {
        status,
        z_position: 3.5,
        selected_file: "cube.ctb".to_string(),
    });

    assert_eq!(journal.entries(), vec!["status:PRINTING:25".to_string()]);
}
