use std::io::Write;
use std::time::{Duration, Instant};

const UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Counter-style progress meter for long pack operations.
///
/// Output goes to an optional sink (normally stderr) and looks like
/// `Writing objects:  50% (42/84)`. A silent meter still counts, so callers
/// never need to branch on whether output is wanted.
pub struct Progress {
    sink: Option<Box<dyn Write + Send>>,
    title: String,
    total: Option<u64>,
    current: u64,
    last_draw: Option<Instant>,
}

impl Progress {
    pub fn silent() -> Self {
        Self {
            sink: None,
            title: String::new(),
            total: None,
            current: 0,
            last_draw: None,
        }
    }

    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::silent()
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Begin a new phase, resetting the counter.
    pub fn start(&mut self, title: &str, total: Option<u64>) {
        self.title = title.to_string();
        self.total = total;
        self.current = 0;
        self.last_draw = None;
    }

    pub fn tick(&mut self) {
        self.current += 1;
        let due = self
            .last_draw
            .map_or(true, |at| at.elapsed() >= UPDATE_INTERVAL);
        if due {
            self.draw("\r");
        }
    }

    /// Finish the phase with a final `, done.` line.
    pub fn stop(&mut self) {
        if self.last_draw.is_some() || self.current > 0 {
            self.draw("\r");
            if let Some(sink) = self.sink.as_mut() {
                let _ = sink.write_all(b", done.\n");
                let _ = sink.flush();
            }
        }
        tracing::debug!(title = %self.title, count = self.current, "progress finished");
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn line(&self) -> String {
        match self.total {
            Some(total) if total > 0 => {
                let percent = self.current * 100 / total;
                format!("{}: {:3}% ({}/{})", self.title, percent, self.current, total)
            }
            _ => format!("{}: {}", self.title, self.current),
        }
    }

    fn draw(&mut self, prefix: &str) {
        self.last_draw = Some(Instant::now());
        let line = self.line();
        if let Some(sink) = self.sink.as_mut() {
            let _ = write!(sink, "{prefix}{line}");
            let _ = sink.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn formats_percentages() {
        let mut p = Progress::silent();
        p.start("Writing objects", Some(4));
        p.tick();
        p.tick();
        assert_eq!(p.line(), "Writing objects:  50% (2/4)");
    }

    #[test]
    fn formats_open_counts() {
        let mut p = Progress::silent();
        p.start("Counting objects", None);
        for _ in 0..7 {
            p.tick();
        }
        assert_eq!(p.line(), "Counting objects: 7");
    }

    #[test]
    fn stop_writes_done() {
        let out = Shared::default();
        let mut p = Progress::new(Box::new(out.clone()));
        p.start("Resolving deltas", Some(1));
        p.tick();
        p.stop();
        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(text.ends_with("Resolving deltas: 100% (1/1), done.\n"));
    }
}
