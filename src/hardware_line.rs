use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::config::BindingTable;
use crate::relay_types::HardwareBinding;
use crate::relay_types::PinValue;
use crate::relay_types::RelayId;

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum FaultKind {
    NotPresent,
    PermissionDenied,
    Busy,
    Io,
    Timeout,
    Disconnected,
}

impl Display for FaultKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let text = match self {
            FaultKind::NotPresent => "line not present",
            FaultKind::PermissionDenied => "permission denied",
            FaultKind::Busy => "line claimed by another process",
            FaultKind::Io => "I/O error",
            FaultKind::Timeout => "timed out",
            FaultKind::Disconnected => "line worker gone",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct LineError {
    kind: FaultKind,
    message: String,
}

impl LineError {
    pub fn new<S: Into<String>>(kind: FaultKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_io(err: &io::Error) -> Self {
        let kind = match err.raw_os_error() {
            Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::EINVAL) => {
                FaultKind::NotPresent
            }
            Some(libc::EACCES) | Some(libc::EPERM) => FaultKind::PermissionDenied,
            Some(libc::EBUSY) => FaultKind::Busy,
            _ => match err.kind() {
                io::ErrorKind::NotFound => FaultKind::NotPresent,
                io::ErrorKind::PermissionDenied => FaultKind::PermissionDenied,
                _ => FaultKind::Io,
            },
        };
        Self::new(kind, err.to_string())
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Hardware fault on relay {id} (GPIO {line}): {source}")]
pub struct HardwareFault {
    pub id: RelayId,
    pub line: u32,
    #[source]
    pub source: LineError,
}

impl HardwareFault {
    pub fn kind(&self) -> FaultKind {
        self.source.kind()
    }
}

/// One physical output with a `{set, read-back}` capability set.
pub trait OutputLine: Send {
    fn drive(&mut self, value: PinValue) -> Result<(), LineError>;

    fn read_back(&mut self) -> Result<PinValue, LineError>;
}

enum LineRequest {
    Drive(PinValue, Sender<Result<(), LineError>>),
    ReadBack(Sender<Result<PinValue, LineError>>),
}

/// Owner thread of one line. `busy` is set while a request is queued or in
/// progress, so a stuck line never accumulates a backlog of stale requests.
struct LineWorker {
    requests: Sender<LineRequest>,
    busy: Arc<AtomicBool>,
}

impl LineWorker {
    fn spawn(name: String, mut line: Box<dyn OutputLine>) -> io::Result<LineWorker> {
        let (requests, inbox) = mpsc::channel::<LineRequest>();
        let busy = Arc::new(AtomicBool::new(false));
        let done = busy.clone();
        thread::Builder::new().name(name).spawn(move || {
            // answers to callers that already gave up are dropped
            for request in inbox {
                match request {
                    LineRequest::Drive(value, reply) => {
                        let result = line.drive(value);
                        done.store(false, Ordering::SeqCst);
                        let _ = reply.send(result);
                    }
                    LineRequest::ReadBack(reply) => {
                        let result = line.read_back();
                        done.store(false, Ordering::SeqCst);
                        let _ = reply.send(result);
                    }
                }
            }
        })?;
        Ok(LineWorker { requests, busy })
    }

    fn call<T, B>(&self, build: B, timeout: Duration) -> Result<T, LineError>
    where
        B: FnOnce(Sender<Result<T, LineError>>) -> LineRequest,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LineError::new(
                FaultKind::Timeout,
                "previous call still pending",
            ));
        }

        let (reply, answer) = mpsc::channel();
        if self.requests.send(build(reply)).is_err() {
            self.busy.store(false, Ordering::SeqCst);
            return Err(LineError::new(
                FaultKind::Disconnected,
                "line worker stopped",
            ));
        }
        match answer.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(LineError::new(
                FaultKind::Timeout,
                format!("no answer within {} ms", timeout.as_millis()),
            )),
            Err(RecvTimeoutError::Disconnected) => {
                self.busy.store(false, Ordering::SeqCst);
                Err(LineError::new(
                    FaultKind::Disconnected,
                    "line worker stopped",
                ))
            }
        }
    }
}

struct Channel {
    binding: HardwareBinding,
    worker: LineWorker,
}

/// The relay board's output lines. Each line is owned by its own worker
/// thread so a hanging line costs at most `timeout` per call.
pub struct RelayOutputs {
    channels: Vec<Channel>,
    timeout: Duration,
}

impl RelayOutputs {
    pub fn new<F>(
        bindings: &BindingTable,
        timeout: Duration,
        mut open: F,
    ) -> io::Result<RelayOutputs>
    where
        F: FnMut(&HardwareBinding) -> Box<dyn OutputLine>,
    {
        let mut channels = Vec::with_capacity(RelayId::ALL.len());
        for binding in bindings.iter() {
            let worker = LineWorker::spawn(format!("relay-{}", binding.id), open(binding))?;
            channels.push(Channel {
                binding: *binding,
                worker,
            });
        }
        Ok(RelayOutputs { channels, timeout })
    }

    fn channel(&self, id: RelayId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn binding(&self, id: RelayId) -> &HardwareBinding {
        &self.channel(id).binding
    }

    /// Drives the line of `id` to the level that means `logical_on` for its
    /// wiring and verifies it by reading the line back.
    pub fn apply(&self, id: RelayId, logical_on: bool) -> Result<PinValue, HardwareFault> {
        let channel = self.channel(id);
        let binding = channel.binding;
        let value = binding.polarity.level_for(logical_on);
        let fault = |source| HardwareFault {
            id,
            line: binding.line,
            source,
        };

        channel
            .worker
            .call(|reply| LineRequest::Drive(value, reply), self.timeout)
            .map_err(fault)?;
        let actual = self.read_back(id)?;
        if actual != value {
            return Err(fault(LineError::new(
                FaultKind::Io,
                format!("drove {:?} but read back {:?}", value, actual),
            )));
        }

        debug!("Drove GPIO {} '{:?}' for relay '{}'", binding.line, value, id);
        Ok(value)
    }

    pub fn read_back(&self, id: RelayId) -> Result<PinValue, HardwareFault> {
        let channel = self.channel(id);
        channel
            .worker
            .call(LineRequest::ReadBack, self.timeout)
            .map_err(|source| HardwareFault {
                id,
                line: channel.binding.line,
                source,
            })
    }
}
