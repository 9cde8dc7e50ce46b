use std::fs::{File, OpenOptions};
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::info;

use crate::error::{Result, TransportError};

/// Baud rate used when none is given.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Open a serial device in raw 8N1 mode.
///
/// Returns `(reader, writer)` handles to the same device so the receive side
/// can be moved into an [`RxPump`](crate::RxPump) while the transmit side
/// backs a [`StreamPort`](crate::StreamPort).
pub fn open_raw(path: impl AsRef<Path>, baud: u32) -> Result<(File, File)> {
    let path = path.as_ref();
    let speed = baud_constant(baud)?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)
        .map_err(|e| TransportError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

    configure_raw(&file, speed).map_err(|e| TransportError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;

    let reader = file.try_clone()?;
    info!(?path, baud, "opened serial device in raw mode");
    Ok((reader, file))
}

fn baud_constant(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        other => return Err(TransportError::UnsupportedBaud(other)),
    };
    Ok(speed)
}

fn configure_raw(file: &File, speed: libc::speed_t) -> std::io::Result<()> {
    let fd = file.as_raw_fd();
    let mut tio = MaybeUninit::<libc::termios>::zeroed();

    // SAFETY: `fd` is an open descriptor owned by `file`, and `tio` points to
    // writable memory large enough for a `termios`.
    if unsafe { libc::tcgetattr(fd, tio.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: tcgetattr succeeded, so every field has been written.
    let mut tio = unsafe { tio.assume_init() };

    // SAFETY: `tio` is a valid, initialized termios.
    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cflag &= !libc::CSTOPB;
    // Block until at least one byte is available.
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: `tio` is a valid termios and `speed` is a termios speed constant.
    let rc = unsafe {
        let rc_in = libc::cfsetispeed(&mut tio, speed);
        let rc_out = libc::cfsetospeed(&mut tio, speed);
        rc_in | rc_out
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `fd` is open and `tio` is a fully initialized termios.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_baud_rates() {
        assert!(matches!(
            baud_constant(12_345),
            Err(TransportError::UnsupportedBaud(12_345))
        ));
        assert!(baud_constant(DEFAULT_BAUD).is_ok());
    }

    #[test]
    fn missing_device_reports_open_error() {
        let path = std::env::temp_dir().join(format!("uartdfu-no-such-tty-{}", std::process::id()));
        let err = open_raw(&path, DEFAULT_BAUD).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }

    #[test]
    fn regular_file_is_not_a_terminal() {
        let path = std::env::temp_dir().join(format!("uartdfu-not-a-tty-{}", std::process::id()));
        std::fs::write(&path, b"plain").unwrap();

        let err = open_raw(&path, DEFAULT_BAUD).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn configures_pseudo_terminal() {
        use std::ffi::CStr;
        use std::io::{Read, Write};
        use std::os::fd::FromRawFd;

        // SAFETY: plain libc calls on a freshly opened pty master; every
        // return code is checked and the buffer passed to ptsname_r is valid.
        let (mut master, slave_path) = unsafe {
            let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
            assert!(fd >= 0, "posix_openpt failed");
            assert_eq!(libc::grantpt(fd), 0);
            assert_eq!(libc::unlockpt(fd), 0);
            let mut name = [0 as libc::c_char; 128];
            assert_eq!(libc::ptsname_r(fd, name.as_mut_ptr(), name.len()), 0);
            let path = CStr::from_ptr(name.as_ptr())
                .to_string_lossy()
                .into_owned();
            (File::from_raw_fd(fd), path)
        };

        let (mut reader, _writer) = open_raw(&slave_path, 57_600).unwrap();
        master.write_all(b"foqs").unwrap();

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"foqs");
    }
}
