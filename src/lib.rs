//! `d3d9`: a `LegacyGfx` (Direct3D9-class) device runtime implemented on
//! top of a `ModernGfx` (Direct3D11-class) device. Applications compiled
//! against the legacy API link against this crate and run unmodified; it
//! owns the GPU device, translates every call and shader, manages
//! resources, and presents frames.
//!
//! The crate is organised the way the original runtime's source is laid
//! out:
//!
//! - [`adapter`] — the factory (`Context`) and the adapters it enumerates.
//! - [`dev`] — the device object and everything it owns: resources,
//!   shaders, the pipeline state mirror, and the swap chain. This is the
//!   core of the crate.
//! - [`core`] — COM plumbing shared by every object in the crate, plus
//!   configuration, legacy/DXGI format conversion, and multisample
//!   mapping.
//! - [`d3d11`] — thin wrappers around the `ModernGfx` resource types that
//!   back every legacy resource wrapper.
//! - [`translator`] — the seam to the (out of scope) DX9→DX11 shader
//!   bytecode translator.
//! - [`error`] — the `Error`/`Result` types every fallible call in the
//!   crate returns.

#[macro_use]
pub mod error;
#[macro_use]
pub mod core;

pub mod adapter;
pub mod d3d11;
pub mod dev;
pub mod translator;

use std::ptr;
use std::sync::Once;

use winapi::shared::winerror::{HRESULT, S_OK};

pub use crate::adapter::{Adapter, Context};
pub use crate::error::{Error, Result};

/// Brings up whichever logger backend is compiled in. Idempotent: the
/// crate may be entered through either `Direct3DCreate9` or
/// `Direct3DCreate9Ex` (or, in-process, `Context::create` directly), and
/// a logger backend may only be installed once per process.
fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        #[cfg(feature = "env_logger")]
        env_logger::init();

        #[cfg(feature = "win_dbg_logger")]
        win_dbg_logger::init();
    });
}

/// The legacy `Direct3DCreate9` entry point: enumerates adapters off a
/// freshly created DXGI factory and hands back the factory object
/// unchanged (no `ModernGfx` device is created until `Context::create_device`
/// is called). Returns null on any enumeration failure, matching the real
/// `Direct3DCreate9`'s contract.
///
/// # Safety
/// Must be called with the ABI `Direct3DCreate9` callers use: no
/// arguments are dereferenced, so the only real requirement is that the
/// returned pointer is eventually released by calling `Release` on it
/// through the crate's `IUnknown` implementation (or dropped via
/// `Box::from_raw` if never handed across the FFI boundary).
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "system" fn Direct3DCreate9(_sdk_version: u32) -> *mut Context {
    init_logging();

    match Context::create() {
        Ok(ctx) => Box::into_raw(ctx),
        Err(err) => {
            log::error!("Direct3DCreate9 failed: {:?}", err);
            ptr::null_mut()
        }
    }
}

/// The `Direct3DCreate9Ex` entry point. Identical to `Direct3DCreate9`
/// except for the calling convention (HRESULT return, out-pointer
/// parameter) `IDirect3D9Ex`-aware applications use.
///
/// # Safety
/// `out` must be a valid, non-null, writable `*mut *mut Context`.
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "system" fn Direct3DCreate9Ex(
    _sdk_version: u32,
    out: *mut *mut Context,
) -> HRESULT {
    init_logging();

    let out = match crate::core::check_mut_ref(out) {
        Ok(out) => out,
        Err(err) => return err.to_hresult(),
    };

    match Context::create() {
        Ok(ctx) => {
            *out = Box::into_raw(ctx);
            S_OK
        }
        Err(err) => err.to_hresult(),
    }
}
