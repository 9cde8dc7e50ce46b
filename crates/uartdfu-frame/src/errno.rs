//! Status codes carried in response frames.
//!
//! Responses carry `0` for success or a negative errno value, matching the
//! convention of the firmware-update backends on the device side.

/// Success.
pub const OK: i32 = 0;
/// I/O error.
pub const EIO: i32 = 5;
/// Try again (no response within the deadline).
pub const EAGAIN: i32 = 11;
/// Out of memory / buffer space.
pub const ENOMEM: i32 = 12;
/// Invalid argument (malformed request).
pub const EINVAL: i32 = 22;
/// File too large for the announced image size.
pub const EFBIG: i32 = 27;
/// Function not implemented.
pub const ENOSYS: i32 = 38;
/// Bad message (unexpected response).
pub const EBADMSG: i32 = 74;
/// Value too large for the status field.
pub const EOVERFLOW: i32 = 75;

/// Negate an errno constant into a wire status.
pub const fn status(errno: i32) -> i32 {
    -errno
}
