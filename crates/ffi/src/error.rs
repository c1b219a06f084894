use fluid_sim_core::FluidError;
use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

/// Common interface for FFI error types.
///
/// `code()` is what crosses the boundary; `msg()` is kept in thread-local
/// storage for [`fluid_sim_get_last_error`].
///
/// # Example
/// ```rust,ignore
/// let err = DefaultFluidSimError::null_pointer("ptr");
/// assert_eq!(err.code(), FluidSimErrorCode::NullPointer);
/// assert_eq!(err.msg(), "Parameter 'ptr' cannot be null");
/// ```
pub(crate) trait FluidSimError {
    /// Returns the error code to be returned across the FFI boundary.
    fn code(&self) -> FluidSimErrorCode;

    /// Returns the human-readable error message.
    fn msg(&self) -> &str;
}

/// Default implementation of `FluidSimError` for FFI-side failures and
/// engine errors converted at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DefaultFluidSimError {
    code: FluidSimErrorCode,
    msg: String,
}

impl DefaultFluidSimError {
    /// Create error for null pointer passed where non-null required.
    ///
    /// # Arguments
    /// * `param_name` - The name of the parameter that was null (e.g., `"out_instance"`, `"ptr"`)
    pub fn null_pointer(param_name: &str) -> Self {
        Self {
            code: FluidSimErrorCode::NullPointer,
            msg: format!("Parameter '{param_name}' cannot be null"),
        }
    }

    /// Create error for poisoned lock.
    ///
    /// # Arguments
    /// * `lock_name` - The name of the lock that was poisoned (e.g., `"RwLock"`)
    pub fn lock_poisoned(lock_name: &str) -> Self {
        Self {
            code: FluidSimErrorCode::LockPoisoned,
            msg: format!("Lock '{lock_name}' was poisoned by a panic in another thread"),
        }
    }

    /// Create error for invalid parameter.
    pub fn invalid_parameter(message: String) -> Self {
        Self {
            code: FluidSimErrorCode::InvalidParameter,
            msg: message,
        }
    }

    /// Create error for a caller buffer that cannot hold the requested data.
    pub fn buffer_too_small(param_name: &str, required: usize, provided: usize) -> Self {
        Self {
            code: FluidSimErrorCode::BufferTooSmall,
            msg: format!("Buffer '{param_name}' holds {provided} elements, {required} required"),
        }
    }
}

impl FluidSimError for DefaultFluidSimError {
    fn code(&self) -> FluidSimErrorCode {
        self.code
    }

    fn msg(&self) -> &str {
        &self.msg
    }
}

impl From<FluidError> for DefaultFluidSimError {
    fn from(error: FluidError) -> Self {
        let code = match error {
            FluidError::InvalidGrid { .. } => FluidSimErrorCode::InvalidGrid,
            FluidError::ResourceExhausted { .. } => FluidSimErrorCode::ResourceExhausted,
            FluidError::InvalidTimestep(_) => FluidSimErrorCode::InvalidTimestep,
            FluidError::SplatQueueFull { .. } => FluidSimErrorCode::SplatQueueFull,
            FluidError::UnknownField(_) | FluidError::MissingField { .. } => {
                FluidSimErrorCode::MissingField
            }
            FluidError::FieldLayoutConflict { .. } | FluidError::ShapeMismatch { .. } => {
                FluidSimErrorCode::InvalidParameter
            }
            FluidError::Disposed => FluidSimErrorCode::Disposed,
            FluidError::NeedsReset => FluidSimErrorCode::NeedsReset,
            FluidError::ConfigLockPoisoned => FluidSimErrorCode::LockPoisoned,
            FluidError::Readback(_) => FluidSimErrorCode::Readback,
        };
        Self {
            code,
            msg: error.to_string(),
        }
    }
}

/// FFI error codes returned by fluid simulation functions.
/// Follows standard C convention: 0 = success, non-zero = error.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluidSimErrorCode {
    /// Operation completed successfully.
    Ok = 0,

    /// Invalid pointer: null pointer passed where non-null required.
    NullPointer = 1,

    /// Lock poisoned: internal synchronization primitive was poisoned by a panic.
    LockPoisoned = 2,

    /// Grid dimensions are zero or too large.
    InvalidGrid = 3,

    /// Invalid parameter passed to function.
    InvalidParameter = 4,

    /// The backend cannot hold the fields at the requested resolution.
    ResourceExhausted = 5,

    /// Timestep was negative or non-finite.
    InvalidTimestep = 6,

    /// The pending splat queue is at capacity; retry next frame.
    SplatQueueFull = 7,

    /// The requested field is not allocated by this variant.
    MissingField = 8,

    /// The simulation was disposed.
    Disposed = 9,

    /// A frame failed part-way; call `fluid_sim_reset`.
    NeedsReset = 10,

    /// Reading a field back from the device failed.
    Readback = 11,

    /// A caller-provided buffer is smaller than the data to copy.
    BufferTooSmall = 12,
}

impl From<DefaultFluidSimError> for FluidSimErrorCode {
    fn from(error: DefaultFluidSimError) -> Self {
        error.code
    }
}

thread_local! {
    /// Thread-local storage for the most recent FFI error (C string, error code).
    /// The CString is owned here so the pointer handed out stays valid until the next error.
    static LAST_ERROR: RefCell<(Option<CString>, FluidSimErrorCode)> = const { RefCell::new((None, FluidSimErrorCode::Ok)) };
}

/// Internal helper to read `LAST_ERROR` thread-local storage (cstring, code).
pub(crate) fn with_last_error<F, R>(f: F) -> R
where
    F: FnOnce(&(Option<CString>, FluidSimErrorCode)) -> R,
{
    LAST_ERROR.with_borrow(f)
}

/// Internal helper to mutate `LAST_ERROR` thread-local storage (cstring, code).
pub(crate) fn with_last_error_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut (Option<CString>, FluidSimErrorCode)) -> R,
{
    LAST_ERROR.with_borrow_mut(f)
}

/// Retrieve the most recent FFI error message as a null-terminated C string.
///
/// Returns:
/// - A borrowed pointer to the error message if an error occurred.
/// - `null` if the last call on this thread succeeded.
///
/// # Thread Safety
/// Error messages are stored per-thread, so each thread has its own independent error state.
///
/// # Lifetime
/// The returned pointer is valid until the next FFI call on this thread.
///
/// **DO NOT FREE THIS POINTER** - it is managed internally.
///
/// Example:
/// ```cpp
/// FluidSimInstance* sim = nullptr;
/// FluidSimErrorCode err = fluid_sim_new(512, 512, 0, false, &sim);
/// if (err != Ok) {
///     const char* error = fluid_sim_get_last_error();
///     if (error) {
///         printf("Fluid sim creation failed: %s\n", error);
///     }
/// }
/// ```
#[no_mangle]
pub extern "C" fn fluid_sim_get_last_error() -> *const c_char {
    with_last_error(|(cstring, _code)| cstring.as_ref().map_or(ptr::null(), |cs| cs.as_ptr()))
}

/// Retrieve the most recent FFI error code.
///
/// Returns `FluidSimErrorCode::Ok` (0) if the last call on this thread succeeded.
#[no_mangle]
pub extern "C" fn fluid_sim_get_last_error_code() -> FluidSimErrorCode {
    with_last_error(|(_cstring, code)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_map_to_codes() {
        let cases = [
            (FluidError::InvalidTimestep(-1.0), FluidSimErrorCode::InvalidTimestep),
            (FluidError::SplatQueueFull { capacity: 4 }, FluidSimErrorCode::SplatQueueFull),
            (FluidError::Disposed, FluidSimErrorCode::Disposed),
            (FluidError::NeedsReset, FluidSimErrorCode::NeedsReset),
            (
                FluidError::MissingField {
                    stage: "simulation",
                    field: "Foam",
                },
                FluidSimErrorCode::MissingField,
            ),
        ];

        for (error, expected) in cases {
            let message = error.to_string();
            let converted = DefaultFluidSimError::from(error);
            assert_eq!(converted.code(), expected);
            assert_eq!(converted.msg(), message);
        }
    }

    #[test]
    fn test_null_pointer_message_names_parameter() {
        let err = DefaultFluidSimError::null_pointer("out_instance");
        assert_eq!(err.code(), FluidSimErrorCode::NullPointer);
        assert_eq!(err.msg(), "Parameter 'out_instance' cannot be null");
    }
}
