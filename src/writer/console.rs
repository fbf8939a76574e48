use std::io::{self, Write};

/// Console collaborator: receives one flushed chunk per call.
pub trait ConsoleSink: Send + Sync {
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Writes each chunk to stdout followed by a newline.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutConsole;

impl ConsoleSink for StdoutConsole {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()
    }
}
