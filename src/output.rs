use std::{
    io::{self, Write},
    sync::Arc,
};

use parking_lot::Mutex;

/// Where `print`, parse error reports and driver output go.
///
/// Cloned into every spawned evaluation thread; writes are serialized per line.
#[derive(Clone)]
pub struct OutputSink(Arc<Mutex<Box<dyn Write + Send>>>);

impl OutputSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// A sink writing into memory, plus a handle to read what was written.
    pub fn capture() -> (Self, CapturedOutput) {
        let buffer = CapturedOutput::default();
        (Self::new(buffer.clone()), buffer)
    }

    pub fn write_str(&self, text: &str) -> io::Result<()> {
        let mut writer = self.0.lock();
        writer.write_all(text.as_bytes())?;
        writer.flush()
    }

    pub fn write_line(&self, text: &str) -> io::Result<()> {
        let mut writer = self.0.lock();
        writer.write_all(text.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::stdout()
    }
}

#[derive(Clone, Default)]
pub struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl CapturedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
