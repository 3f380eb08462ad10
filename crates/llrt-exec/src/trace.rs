//! Chunk-level performance trace, dumpable as chrome://tracing JSON.
//!
//! One `TraceLog` is shared by the dispatch front-end (which opens an op
//! record per dispatched operation) and the scheduler (which appends chunk
//! timings as barriers finalize). It is only allocated when profiling is
//! enabled, so the hot path carries no cost otherwise.

use serde::Serialize;
use std::io;
use std::time::Instant;

struct OpRecord {
    link: String,
    kernel: String,
    max_progress: u64,
}

struct ChunkRecord {
    op: usize,
    units: u64,
    start_us: f64,
    end_us: f64,
    /// 0 is the client thread, 1 the scheduler, workers are offset by 2.
    thread: usize,
}

pub struct TraceLog {
    start: Instant,
    ops: Vec<OpRecord>,
    chunks: Vec<ChunkRecord>,
}

#[derive(Serialize)]
struct TraceEvent {
    name: String,
    cat: &'static str,
    ph: &'static str,
    pid: u32,
    tid: usize,
    ts: f64,
}

impl TraceLog {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            ops: Vec::new(),
            chunks: Vec::new(),
        }
    }

    fn micros(&self, t: Instant) -> f64 {
        t.duration_since(self.start).as_secs_f64() * 1e6
    }

    /// Open a record for one dispatched operation; the returned index keys
    /// subsequent chunk logs.
    pub fn log_op(&mut self, link: &str, kernel: &str, max_progress: u64) -> usize {
        self.ops.push(OpRecord {
            link: link.to_string(),
            kernel: kernel.to_string(),
            max_progress,
        });
        self.ops.len() - 1
    }

    pub fn log_chunk(&mut self, op: usize, units: u64, t0: Instant, t1: Instant, thread: usize) {
        self.chunks.push(ChunkRecord {
            op,
            units,
            start_us: self.micros(t0),
            end_us: self.micros(t1),
            thread,
        });
    }

    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Serialize everything in the chrome://tracing event-array format.
    pub fn write_chrome_trace<W: io::Write>(&self, out: W) -> io::Result<()> {
        let mut events = Vec::with_capacity(self.chunks.len() * 2);
        for c in &self.chunks {
            let op = &self.ops[c.op];
            let name = format!("{}@{}:{}/{}", op.kernel, op.link, c.units, op.max_progress);
            events.push(TraceEvent {
                name: name.clone(),
                cat: "op",
                ph: "B",
                pid: 0,
                tid: c.thread,
                ts: c.start_us,
            });
            events.push(TraceEvent {
                name,
                cat: "op",
                ph: "E",
                pid: 0,
                tid: c.thread,
                ts: c.end_us,
            });
        }
        serde_json::to_writer(out, &events).map_err(io::Error::from)
    }

    pub fn to_chrome_trace(&self) -> String {
        let mut buf = Vec::new();
        // Serialization of plain records into a Vec cannot fail.
        self.write_chrome_trace(&mut buf).expect("trace serialization");
        String::from_utf8(buf).expect("trace is utf-8")
    }
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn dump_pairs_begin_and_end() {
        let mut log = TraceLog::new();
        let op = log.log_op("Dense_3_1", "EdgeSum", 600);
        let t0 = log.start + Duration::from_micros(5);
        log.log_chunk(op, 200, t0, t0 + Duration::from_micros(7), 2);
        let json = log.to_chrome_trace();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let events = parsed.as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["ph"], "B");
        assert_eq!(events[1]["ph"], "E");
        assert_eq!(events[0]["tid"], 2);
        assert!(events[1]["ts"].as_f64().unwrap() >= events[0]["ts"].as_f64().unwrap());
    }
}
