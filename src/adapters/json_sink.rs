//! JSON-lines event sink.
//!
//! Writes one [`TickRecord`](crate::app::events::TickRecord) per line to any
//! [`Write`]r (stdout in the host runner, a file, a `Vec<u8>` in tests).
//! With [`JsonLinesSink::with_events`] the other events are written too, as
//! externally tagged objects (`{"StateChanged":{...}}`).

use std::io::Write;

use log::warn;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

pub struct JsonLinesSink<W: Write> {
    out: W,
    all_events: bool,
    write_errors: u32,
}

impl<W: Write> JsonLinesSink<W> {
    /// Tick records only.
    pub fn new(out: W) -> Self {
        Self {
            out,
            all_events: false,
            write_errors: 0,
        }
    }

    /// Every event.
    pub fn with_events(out: W) -> Self {
        Self {
            all_events: true,
            ..Self::new(out)
        }
    }

    pub fn write_errors(&self) -> u32 {
        self.write_errors
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, value: &impl serde::Serialize) {
        let res = serde_json::to_writer(&mut self.out, value)
            .map_err(std::io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"))
            .and_then(|()| self.out.flush());
        if let Err(e) = res {
            if self.write_errors == 0 {
                warn!("JSON sink: write failed ({e}), further failures are counted silently");
            }
            self.write_errors = self.write_errors.saturating_add(1);
        }
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Tick(record) => self.write_line(record),
            other if self.all_events => self.write_line(other),
            _ => {}
        }
    }
}
