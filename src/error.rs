use winapi::shared::d3d9::*;
use winapi::shared::dxgi::DXGI_ERROR_WAS_STILL_DRAWING;
use winapi::shared::winerror::{E_NOINTERFACE, E_POINTER, HRESULT, S_OK};

/// Every outcome a device-runtime call can report back to the application.
///
/// Kept as a plain enum rather than `HRESULT` directly so internal code can
/// match on it; the FFI boundary is the only place that needs to know the
/// matching D3D9 error code, via [`Error::to_hresult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Success,
    InvalidCall,
    NotFound,
    DeviceLost,
    Pointer,
    NoInterface,
    /// A `Map` on a surface/texture hit `DXGI_ERROR_WAS_STILL_DRAWING`.
    WasStillDrawing,
}

impl Error {
    pub fn to_hresult(self) -> HRESULT {
        match self {
            Error::Success => S_OK,
            Error::InvalidCall => D3DERR_INVALIDCALL,
            Error::NotFound => D3DERR_NOTFOUND,
            Error::DeviceLost => D3DERR_DEVICELOST,
            Error::Pointer => E_POINTER,
            Error::NoInterface => E_NOINTERFACE,
            Error::WasStillDrawing => DXGI_ERROR_WAS_STILL_DRAWING,
        }
    }
}

/// Result type used by every fallible internal helper in this crate.
///
/// COM vtable methods themselves return bare [`Error`] (see `if_error!`);
/// `Result` is for the `?`-powered helpers those methods call into.
pub type Result<T> = std::result::Result<T, Error>;

/// Unwraps a `Result<T, Error>` in a context that must return `Error`
/// directly (i.e. a COM vtable method), early-returning the error instead
/// of propagating it with `?`.
#[macro_export]
macro_rules! if_error {
    ($e:expr) => {
        match $e {
            Ok(val) => val,
            Err(err) => return err,
        }
    };
}

/// Maps a raw `HRESULT` from a ModernGfx call to our `Result`, logging a
/// failure message on error.
pub fn check_hresult(hr: HRESULT, message: &str) -> Result<()> {
    if winapi::shared::winerror::SUCCEEDED(hr) {
        Ok(())
    } else {
        log::error!("{}: {:#x}", message, hr as u32);
        Err(Error::InvalidCall)
    }
}
