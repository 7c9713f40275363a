use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::thread;
use std::time::Duration;

use crate::hardware_line::FaultKind;
use crate::hardware_line::LineError;
use crate::hardware_line::OutputLine;
use crate::relay_types::PinValue;

#[derive(Debug, Default)]
struct SimulatedState {
    level: Option<PinValue>,
    driven: Vec<PinValue>,
    fault: Option<FaultKind>,
    stall: Option<Duration>,
}

/// Output line without hardware behind it. Clones share the same line, so a
/// test can keep one clone to inspect what the engine would have driven.
#[derive(Clone, Debug, Default)]
pub struct SimulatedLine {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedLine {
    pub fn new() -> SimulatedLine {
        SimulatedLine::default()
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Last level driven, `None` until the first drive.
    pub fn level(&self) -> Option<PinValue> {
        self.state().level
    }

    pub fn driven(&self) -> Vec<PinValue> {
        self.state().driven.clone()
    }

    /// Every following call fails with `kind` until [`SimulatedLine::recover`].
    pub fn fail_with(&self, kind: FaultKind) {
        self.state().fault = Some(kind);
    }

    pub fn recover(&self) {
        self.state().fault = None;
    }

    pub fn stall_for(&self, delay: Duration) {
        self.state().stall = Some(delay);
    }

    fn check(&self) -> Result<(), LineError> {
        let stall = self.state().stall;
        if let Some(delay) = stall {
            thread::sleep(delay);
        }
        match self.state().fault {
            Some(kind) => Err(LineError::new(kind, "simulated fault")),
            None => Ok(()),
        }
    }
}

impl OutputLine for SimulatedLine {
    fn drive(&mut self, value: PinValue) -> Result<(), LineError> {
        self.check()?;
        let mut state = self.state();
        state.level = Some(value);
        state.driven.push(value);
        Ok(())
    }

    fn read_back(&mut self) -> Result<PinValue, LineError> {
        self.check()?;
        self.state()
            .level
            .ok_or_else(|| LineError::new(FaultKind::Io, "line was never driven"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_line() {
        let observer = SimulatedLine::new();
        let mut line = observer.clone();
        line.drive(PinValue::High).unwrap();
        assert_eq!(observer.level(), Some(PinValue::High));
        assert_eq!(line.read_back(), Ok(PinValue::High));
    }

    #[test]
    fn injected_fault_until_recovered() {
        let mut line = SimulatedLine::new();
        line.fail_with(FaultKind::NotPresent);
        assert_eq!(
            line.drive(PinValue::Low).unwrap_err().kind(),
            FaultKind::NotPresent
        );
        assert_eq!(line.level(), None);

        line.recover();
        line.drive(PinValue::Low).unwrap();
        assert_eq!(line.driven(), vec![PinValue::Low]);
    }
}
