// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers shared by unit tests

use crate::error::HandlerResult;
use crate::event::Event;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// A writer that captures log output for testing
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub(crate) fn contents(&self) -> String {
        let logs = self.logs.lock().unwrap();
        String::from_utf8_lossy(&logs).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` on the current thread with tracing output captured
pub(crate) fn with_captured_logs<R>(f: impl FnOnce() -> R) -> (String, R) {
    let logs = CapturedLogs::default();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    (logs.contents(), result)
}

/// Records every event handed to it, in call order
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    calls: Arc<Mutex<Vec<(String, Event)>>>,
}

impl Recorder {
    /// A callback that records under `label`
    pub(crate) fn callback(&self, label: &str) -> impl Fn(&Event) -> HandlerResult + Send + Sync + 'static {
        let calls = Arc::clone(&self.calls);
        let label = label.to_string();
        move |event: &Event| {
            calls.lock().unwrap().push((label.clone(), event.clone()));
            Ok(())
        }
    }

    pub(crate) fn labels(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(l, _)| l.clone()).collect()
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.calls.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}
