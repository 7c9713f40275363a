use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::FromRawFd;
use std::path::PathBuf;

use log::info;
use log::warn;

use crate::hardware_line::FaultKind;
use crate::hardware_line::LineError;
use crate::hardware_line::OutputLine;
use crate::relay_types::PinValue;

// Linux GPIO character device, line handle ABI (linux/gpio.h)
const GPIOHANDLES_MAX: usize = 64;
const GPIOHANDLE_REQUEST_OUTPUT: u32 = 1 << 1;
const GPIO_GET_LINEHANDLE_IOCTL: u64 = 0xC16C_B403;
const GPIOHANDLE_GET_LINE_VALUES_IOCTL: u64 = 0xC040_B408;
const GPIOHANDLE_SET_LINE_VALUES_IOCTL: u64 = 0xC040_B409;

const CONSUMER: &[u8] = b"relay-tui";

#[repr(C)]
struct GpioHandleRequest {
    line_offsets: [u32; GPIOHANDLES_MAX],
    flags: u32,
    default_values: [u8; GPIOHANDLES_MAX],
    consumer_label: [u8; 32],
    lines: u32,
    fd: libc::c_int,
}

#[repr(C)]
struct GpioHandleData {
    values: [u8; GPIOHANDLES_MAX],
}

fn to_raw(value: PinValue) -> u8 {
    match value {
        PinValue::High => 1,
        PinValue::Low => 0,
    }
}

fn ioctl<T>(file: &File, request: u64, arg: &mut T) -> io::Result<()> {
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), request as _, arg as *mut T) };
    match ret {
        -1 => Err(io::Error::last_os_error()),
        _ => Ok(()),
    }
}

/// A single output line of a GPIO chip such as `/dev/gpiochip0`.
///
/// The line is requested on the first drive, with the driven value as its
/// initial output level, so it never glitches through a default level. A line
/// that can not be requested yet is retried on the next drive.
pub struct CdevLine {
    chip: PathBuf,
    offset: u32,
    handle: Option<File>,
}

impl CdevLine {
    pub fn new<P: Into<PathBuf>>(chip: P, offset: u32) -> CdevLine {
        CdevLine {
            chip: chip.into(),
            offset,
            handle: None,
        }
    }

    fn request(&self, value: PinValue) -> io::Result<File> {
        let chip = OpenOptions::new().read(true).write(true).open(&self.chip)?;

        let mut request = GpioHandleRequest {
            line_offsets: [0; GPIOHANDLES_MAX],
            flags: GPIOHANDLE_REQUEST_OUTPUT,
            default_values: [0; GPIOHANDLES_MAX],
            consumer_label: [0; 32],
            lines: 1,
            fd: -1,
        };
        request.line_offsets[0] = self.offset;
        request.default_values[0] = to_raw(value);
        request.consumer_label[..CONSUMER.len()].copy_from_slice(CONSUMER);

        ioctl(&chip, GPIO_GET_LINEHANDLE_IOCTL, &mut request)?;
        if request.fd < 0 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "kernel returned no line handle",
            ));
        }

        info!(
            "Requested GPIO {} of '{}' as output",
            self.offset,
            self.chip.display()
        );
        Ok(unsafe { File::from_raw_fd(request.fd) })
    }

    /// Drops the line handle after a failed call, the next drive requests
    /// the line again.
    fn release(&mut self, err: &io::Error) -> LineError {
        if self.handle.take().is_some() {
            warn!("Released GPIO {} after error: {}", self.offset, err);
        }
        LineError::from_io(err)
    }
}

impl OutputLine for CdevLine {
    fn drive(&mut self, value: PinValue) -> Result<(), LineError> {
        let result = match &self.handle {
            Some(handle) => {
                let mut data = GpioHandleData {
                    values: [0; GPIOHANDLES_MAX],
                };
                data.values[0] = to_raw(value);
                ioctl(handle, GPIOHANDLE_SET_LINE_VALUES_IOCTL, &mut data)
            }
            None => self.request(value).map(|handle| {
                self.handle = Some(handle);
            }),
        };
        result.map_err(|e| self.release(&e))
    }

    fn read_back(&mut self) -> Result<PinValue, LineError> {
        let handle = match &self.handle {
            Some(handle) => handle,
            None => {
                return Err(LineError::new(
                    FaultKind::NotPresent,
                    format!("GPIO {} has not been requested", self.offset),
                ))
            }
        };
        let mut data = GpioHandleData {
            values: [0; GPIOHANDLES_MAX],
        };
        ioctl(handle, GPIOHANDLE_GET_LINE_VALUES_IOCTL, &mut data)
            .map_err(|e| self.release(&e))?;
        match data.values[0] {
            0 => Ok(PinValue::Low),
            _ => Ok(PinValue::High),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn abi_struct_sizes_match_ioctl_numbers() {
        assert_eq!(size_of::<GpioHandleRequest>(), 364);
        assert_eq!((GPIO_GET_LINEHANDLE_IOCTL >> 16) & 0x3fff, 364);
        assert_eq!(size_of::<GpioHandleData>(), 64);
        assert_eq!((GPIOHANDLE_SET_LINE_VALUES_IOCTL >> 16) & 0x3fff, 64);
    }

    #[test]
    fn missing_chip_is_not_present() {
        let mut line = CdevLine::new("/dev/relay-tui-no-such-gpiochip", 22);
        let err = line.drive(PinValue::High).unwrap_err();
        assert_eq!(err.kind(), FaultKind::NotPresent);
        assert_eq!(line.read_back().unwrap_err().kind(), FaultKind::NotPresent);
    }

    #[test]
    fn failed_ioctl_releases_the_handle() {
        let mut line = CdevLine::new("/dev/relay-tui-no-such-gpiochip", 22);
        line.handle = Some(File::open("/dev/null").unwrap());

        assert!(line.drive(PinValue::Low).is_err());
        assert!(line.handle.is_none());

        // the next drive requests the line again instead of reusing the handle
        let err = line.drive(PinValue::Low).unwrap_err();
        assert_eq!(err.kind(), FaultKind::NotPresent);
    }

    #[test]
    fn failed_read_back_releases_the_handle() {
        let mut line = CdevLine::new("/dev/relay-tui-no-such-gpiochip", 22);
        line.handle = Some(File::open("/dev/null").unwrap());

        assert!(line.read_back().is_err());
        assert!(line.handle.is_none());
    }
}
