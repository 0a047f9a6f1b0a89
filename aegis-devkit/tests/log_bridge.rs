//! Library tracing events reach the `log` facade used by the harness

use aegis_telemetry::CredentialStore;
use log::{Log, Metadata, Record};
use std::sync::Mutex;

struct Capture {
    records: Mutex<Vec<(String, String)>>,
}

impl Log for Capture {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records
            .lock()
            .unwrap()
            .push((record.target().to_string(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture {
    records: Mutex::new(Vec::new()),
};

#[test]
fn test_telemetry_events_are_forwarded_to_log() {
    log::set_logger(&CAPTURE).unwrap();
    log::set_max_level(log::LevelFilter::Trace);

    let store = CredentialStore::in_memory();
    store.set("tok-123");
    store.clear();

    let records = CAPTURE.records.lock().unwrap();
    assert!(
        records
            .iter()
            .any(|(target, message)| target.starts_with("aegis_telemetry")
                && message.contains("Credential cleared")),
        "captured: {:?}",
        *records
    );
}
