//! JSONL trace sink (§4.G, §6 `--trace-*` flags).
//!
//! Every trace event is one JSON object per line, written through a single
//! [`TraceSink`] so the driver doesn't care whether it's writing to a file,
//! stdout, or nowhere. Mirrors the teacher's `tracing` usage in spirit but
//! emits a stable machine-readable line per event rather than formatted
//! human text, since these traces back the golden scenarios in
//! `tests/golden.rs`.

use std::io::Write;

use serde::Serialize;

/// Where trace events go. `Null` is the default; the CLI wires up `File`
/// only when `--trace-sink` is given.
pub enum TraceSink {
    Null,
    Writer(Box<dyn Write + Send>),
}

impl TraceSink {
    #[must_use]
    pub fn null() -> Self {
        Self::Null
    }

    #[must_use]
    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self::Writer(Box::new(writer))
    }

    fn emit(&mut self, event: &impl Serialize) {
        let Self::Writer(writer) = self else { return };
        if let Ok(mut line) = serde_json::to_string(event) {
            line.push('\n');
            // A trace sink is diagnostic, not load-bearing; a write failure
            // here must never abort a decompilation.
            let _ = writer.write_all(line.as_bytes());
        }
    }
}

#[derive(Serialize)]
struct LoopGuardEvent<'a> {
    kind: &'a str,
    header: usize,
    iteration: usize,
    action: &'a str,
}

#[derive(Serialize)]
struct SimBlockEvent<'a> {
    kind: &'a str,
    block: usize,
    start_offset: usize,
    end_offset: usize,
    stack_depth_in: usize,
    stack_depth_out: usize,
    outcome: &'a str,
}

#[derive(Serialize)]
struct DecisionEvent<'a> {
    kind: &'a str,
    block: usize,
    pattern: &'a str,
    reason: &'a str,
}

/// Records a loop-guard iteration-bound decision (the `10_000`-iteration
/// fixed-point caps in `dominators.rs`/the driver's block-consumption loop).
pub fn trace_loop_guards(sink: &mut TraceSink, header: usize, iteration: usize, action: &str) {
    sink.emit(&LoopGuardEvent { kind: "loop_guard", header, iteration, action });
}

/// Records one straight-line simulation pass over a block.
pub fn trace_sim_block(sink: &mut TraceSink, block: usize, start_offset: usize, end_offset: usize, stack_depth_in: usize, stack_depth_out: usize, outcome: &str) {
    sink.emit(&SimBlockEvent { kind: "sim_block", block, start_offset, end_offset, stack_depth_in, stack_depth_out, outcome });
}

/// Records a pattern-selection decision made by the recognizer/driver.
pub fn trace_decisions(sink: &mut TraceSink, block: usize, pattern: &str, reason: &str) {
    sink.emit(&DecisionEvent { kind: "decision", block, pattern, reason });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_never_panics_on_emit() {
        let mut sink = TraceSink::null();
        trace_loop_guards(&mut sink, 0, 0, "enter");
        trace_sim_block(&mut sink, 0, 0, 4, 0, 1, "ok");
        trace_decisions(&mut sink, 0, "If", "diamond shape");
    }

    #[test]
    fn writer_sink_emits_one_json_line_per_event() {
        use std::sync::{Arc, Mutex};

        #[derive(Clone)]
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let shared = SharedBuf(Arc::new(Mutex::new(Vec::new())));
        let handle = shared.clone();
        let mut sink = TraceSink::to_writer(shared);
        trace_decisions(&mut sink, 1, "While", "loop header");
        let contents = handle.0.lock().unwrap();
        let text = String::from_utf8_lossy(&contents);
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"pattern\":\"While\""));
    }
}
