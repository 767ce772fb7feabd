//! Byte-stream plumbing between the runner, builtins, and children.
//!
//! A [`Stream`] is one end of a command's stdin/stdout/stderr. Builtins
//! and in-process pipeline stages read and write it directly; external
//! commands get it converted to a `Stdio`, with pump threads copying
//! bytes when the stream has no real file descriptor (captures and
//! in-memory sources). This mirrors what the OS `exec` layer does for
//! arbitrary readers and writers.

use std::fs::File;
use std::io::{self, Cursor, PipeReader, PipeWriter, Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Clone)]
pub enum Stream {
    /// The shell's own stdin.
    Stdin,
    /// The shell's own stdout.
    Stdout,
    /// The shell's own stderr.
    Stderr,
    Null,
    File(Arc<File>),
    /// Read end of an OS pipe. The option is taken when the fd is handed
    /// to a child process.
    PipeRead(Arc<Mutex<Option<PipeReader>>>),
    PipeWrite(Arc<Mutex<Option<PipeWriter>>>),
    /// In-process sink, used for backquote capture and tests.
    Capture(Arc<Mutex<Vec<u8>>>),
    /// In-process source.
    Bytes(Arc<Mutex<Cursor<Vec<u8>>>>),
}

/// A command's three standard streams.
#[derive(Clone)]
pub struct Io {
    pub stdin: Stream,
    pub stdout: Stream,
    pub stderr: Stream,
}

impl Io {
    /// The shell's own stdio.
    pub fn std() -> Io {
        Io {
            stdin: Stream::Stdin,
            stdout: Stream::Stdout,
            stderr: Stream::Stderr,
        }
    }

    pub fn with_stdin(&self, s: Stream) -> Io {
        Io {
            stdin: s,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }

    pub fn with_stdout(&self, s: Stream) -> Io {
        Io {
            stdin: self.stdin.clone(),
            stdout: s,
            stderr: self.stderr.clone(),
        }
    }

    pub fn with_stderr(&self, s: Stream) -> Io {
        Io {
            stdin: self.stdin.clone(),
            stdout: self.stdout.clone(),
            stderr: s,
        }
    }

    /// Replaces one of the three standard fds. Other fds are not
    /// representable here; the caller reports those as errors.
    pub fn set_fd(&mut self, fd: i32, s: Stream) -> bool {
        match fd {
            0 => self.stdin = s,
            1 => self.stdout = s,
            2 => self.stderr = s,
            _ => return false,
        }
        true
    }

    pub fn fd(&self, fd: i32) -> Option<&Stream> {
        match fd {
            0 => Some(&self.stdin),
            1 => Some(&self.stdout),
            2 => Some(&self.stderr),
            _ => None,
        }
    }
}

impl Stream {
    /// A connected OS pipe as a (read, write) stream pair.
    pub fn pipe() -> io::Result<(Stream, Stream)> {
        let (r, w) = io::pipe()?;
        Ok((
            Stream::PipeRead(Arc::new(Mutex::new(Some(r)))),
            Stream::PipeWrite(Arc::new(Mutex::new(Some(w)))),
        ))
    }

    /// An in-process sink plus the buffer it fills.
    pub fn capture() -> (Stream, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        (Stream::Capture(buf.clone()), buf)
    }

    /// An in-process source over fixed bytes.
    pub fn bytes(data: Vec<u8>) -> Stream {
        Stream::Bytes(Arc::new(Mutex::new(Cursor::new(data))))
    }

    /// Drops a held pipe end. Closing the write end is what lets the
    /// read side see EOF, so in-process pipeline stages call this as
    /// soon as a stage finishes.
    pub fn close_pipe(&self) {
        match self {
            Stream::PipeRead(cell) => {
                cell.lock().unwrap().take();
            }
            Stream::PipeWrite(cell) => {
                cell.lock().unwrap().take();
            }
            _ => {}
        }
    }

    /// The underlying fd, when the stream has one.
    pub fn raw_fd(&self) -> Option<RawFd> {
        match self {
            Stream::Stdin => Some(0),
            Stream::Stdout => Some(1),
            Stream::Stderr => Some(2),
            Stream::File(f) => Some(f.as_raw_fd()),
            Stream::PipeRead(cell) => cell.lock().unwrap().as_ref().map(|p| p.as_raw_fd()),
            Stream::PipeWrite(cell) => cell.lock().unwrap().as_ref().map(|p| p.as_raw_fd()),
            _ => None,
        }
    }

    /// A reader view for in-process consumers.
    pub fn reader(&self) -> Box<dyn Read + Send> {
        match self {
            Stream::Stdin => Box::new(io::stdin()),
            Stream::File(f) => Box::new(ArcFileReader(f.clone())),
            Stream::PipeRead(cell) => Box::new(PipeReadHalf(cell.clone())),
            Stream::Bytes(cur) => Box::new(BytesReader(cur.clone())),
            _ => Box::new(io::empty()),
        }
    }

    /// A writer view for in-process producers.
    pub fn writer(&self) -> Box<dyn Write + Send> {
        match self {
            Stream::Stdout => Box::new(io::stdout()),
            Stream::Stderr => Box::new(io::stderr()),
            Stream::File(f) => Box::new(ArcFileWriter(f.clone())),
            Stream::PipeWrite(cell) => Box::new(PipeWriteHalf(cell.clone())),
            Stream::Capture(buf) => Box::new(CaptureWriter(buf.clone())),
            _ => Box::new(io::sink()),
        }
    }

    fn input_stdio(&self) -> io::Result<Stdio> {
        match self {
            Stream::Stdin => dup_stdio(0),
            Stream::Stdout => dup_stdio(1),
            Stream::Stderr => dup_stdio(2),
            Stream::File(f) => Ok(Stdio::from(f.try_clone()?)),
            Stream::PipeRead(cell) => match cell.lock().unwrap().take() {
                Some(r) => Ok(Stdio::from(r)),
                None => Ok(Stdio::null()),
            },
            _ => Ok(Stdio::null()),
        }
    }

    fn output_stdio(&self) -> io::Result<Stdio> {
        match self {
            Stream::Stdout => dup_stdio(1),
            Stream::Stderr => dup_stdio(2),
            Stream::Stdin => dup_stdio(0),
            Stream::File(f) => Ok(Stdio::from(f.try_clone()?)),
            Stream::PipeWrite(cell) => match cell.lock().unwrap().take() {
                Some(w) => Ok(Stdio::from(w)),
                None => Ok(Stdio::null()),
            },
            _ => Ok(Stdio::null()),
        }
    }
}

fn dup_stdio(fd: RawFd) -> io::Result<Stdio> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    Ok(Stdio::from(borrowed.try_clone_to_owned()?))
}

/// Spawns `cmd` wired to `io`. Streams with real fds are passed down
/// directly; captures and byte sources get a pipe plus a pump thread.
/// The returned handles must be joined after the child is waited.
pub fn spawn_command(cmd: &mut Command, io: &Io) -> io::Result<(Child, Vec<JoinHandle<()>>)> {
    let feed = match &io.stdin {
        Stream::Bytes(cur) => {
            cmd.stdin(Stdio::piped());
            Some(cur.clone())
        }
        s => {
            cmd.stdin(s.input_stdio()?);
            None
        }
    };
    let drain_out = match &io.stdout {
        Stream::Capture(buf) => {
            cmd.stdout(Stdio::piped());
            Some(buf.clone())
        }
        s => {
            cmd.stdout(s.output_stdio()?);
            None
        }
    };
    let drain_err = match &io.stderr {
        Stream::Capture(buf) => {
            cmd.stderr(Stdio::piped());
            Some(buf.clone())
        }
        s => {
            cmd.stderr(s.output_stdio()?);
            None
        }
    };

    let mut child = cmd.spawn()?;
    let mut pumps = Vec::new();
    if let (Some(cur), Some(mut stdin)) = (feed, child.stdin.take()) {
        pumps.push(thread::spawn(move || {
            let mut data = Vec::new();
            let _ = cur.lock().unwrap().read_to_end(&mut data);
            let _ = stdin.write_all(&data);
        }));
    }
    if let (Some(buf), Some(mut stdout)) = (drain_out, child.stdout.take()) {
        pumps.push(thread::spawn(move || {
            let mut sink = CaptureWriter(buf);
            let _ = io::copy(&mut stdout, &mut sink);
        }));
    }
    if let (Some(buf), Some(mut stderr)) = (drain_err, child.stderr.take()) {
        pumps.push(thread::spawn(move || {
            let mut sink = CaptureWriter(buf);
            let _ = io::copy(&mut stderr, &mut sink);
        }));
    }
    Ok((child, pumps))
}

struct ArcFileReader(Arc<File>);

impl Read for ArcFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self.0).read(buf)
    }
}

struct ArcFileWriter(Arc<File>);

impl Write for ArcFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

struct PipeReadHalf(Arc<Mutex<Option<PipeReader>>>);

impl Read for PipeReadHalf {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.lock().unwrap().as_mut() {
            Some(r) => r.read(buf),
            None => Ok(0),
        }
    }
}

struct PipeWriteHalf(Arc<Mutex<Option<PipeWriter>>>);

impl Write for PipeWriteHalf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.lock().unwrap().as_mut() {
            Some(w) => w.write(buf),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.lock().unwrap().as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct BytesReader(Arc<Mutex<Cursor<Vec<u8>>>>);

impl Read for BytesReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().unwrap().read(buf)
    }
}
