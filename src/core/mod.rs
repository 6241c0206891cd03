//! Small helpers shared by every COM object in this crate: null-pointer
//! guards, weak-to-owned reference promotion, and the boilerplate needed to
//! hand a freshly built Rust struct out across the FFI boundary as a COM
//! object.

pub mod config;
pub mod fmt;
pub mod msample;
pub mod resource;

use std::ptr;

use com_impl::ComInterface;
use comptr::ComPtr;
use winapi::um::unknwnbase::IUnknown;

use crate::error::{Error, Result};

pub use self::resource::{MemoryPool, PrivateRefCounted, Resource, ResourceType, UsageFlags};

/// Guards an output pointer parameter, returning `InvalidCall` if it is
/// null. Matches spec.md §7: "nil out-pointer ⇒ INVALIDCALL, no state
/// mutation".
pub fn check_mut_ref<'a, T>(ptr: *mut T) -> Result<&'a mut T> {
    unsafe { ptr.as_mut().ok_or(Error::InvalidCall) }
}

/// Guards an input pointer parameter, returning `InvalidCall` if it is
/// null.
pub fn check_ref<'a, T>(ptr: *const T) -> Result<&'a T> {
    unsafe { ptr.as_ref().ok_or(Error::InvalidCall) }
}

/// Promotes a weak, intrusively-held back-reference (e.g. `Device ->
/// Context`) into an owned, ref-counted pointer suitable for handing back
/// to the application through an out-parameter.
///
/// # Safety
/// `ptr` must point to a live COM object implementing `IUnknown`.
pub fn com_ref<T>(ptr: *const T) -> *mut T {
    if ptr.is_null() {
        return ptr::null_mut();
    }

    unsafe {
        let unknown = ptr as *mut T as *mut IUnknown;
        (*unknown).AddRef();
    }

    ptr as *mut T
}

/// Moves a freshly constructed COM object onto the heap and wraps it in a
/// `ComPtr`, taking ownership. The object's single outstanding reference is
/// the one returned here.
///
/// # Safety
/// `obj` must have been constructed with a `__vtable` matching its COM
/// interface (i.e. built via the type's own constructor, never by hand).
pub unsafe fn new_com_interface<T: ComInterface<I>, I>(obj: T) -> ComPtr<T> {
    let raw = Box::into_raw(Box::new(obj));
    ComPtr::new(raw)
}

/// Implements `IUnknown` (`QueryInterface`/`AddRef`/`Release`) for a COM
/// object carrying an atomic refcount named `refs`. `$recognised` lists
/// every interface ID the object should answer `QueryInterface` for,
/// besides `IUnknown` itself.
#[macro_export]
macro_rules! impl_iunknown {
    (struct $ty:ident : $($iface:ty),+) => {
        impl $ty {
            unsafe extern "system" fn query_interface(
                this: *mut winapi::um::unknwnbase::IUnknown,
                riid: *const winapi::shared::guiddef::GUID,
                obj: *mut *mut winapi::ctypes::c_void,
            ) -> winapi::shared::winerror::HRESULT {
                use winapi::shared::winerror::{E_NOINTERFACE, S_OK};
                use winapi::Interface;

                if obj.is_null() {
                    return winapi::shared::winerror::E_POINTER;
                }

                *obj = std::ptr::null_mut();

                let riid = &*riid;
                let this = this as *mut $ty;

                $(
                    if *riid == <$iface as Interface>::uuidof() {
                        Self::add_ref(this as *mut winapi::um::unknwnbase::IUnknown);
                        *obj = this as *mut winapi::ctypes::c_void;
                        return S_OK;
                    }
                )+

                E_NOINTERFACE
            }

            unsafe extern "system" fn add_ref(this: *mut winapi::um::unknwnbase::IUnknown) -> u32 {
                let this = this as *mut $ty;
                (*this).refs.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1
            }

            unsafe extern "system" fn release(this: *mut winapi::um::unknwnbase::IUnknown) -> u32 {
                let this = this as *mut $ty;
                let prev = (*this).refs.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);

                if prev == 1 {
                    let _ = Box::from_raw(this);
                }

                prev - 1
            }
        }
    };
}

/// Implements `IDirect3DResource9` (`GetDevice`, `Set`/`Get`/`FreePrivateData`,
/// `Set`/`GetPriority`, `PreLoad`, `GetType`) for a resource wrapper that
/// embeds a `device: *const Device` back-reference and a
/// `resource: crate::core::resource::Resource`. Every concrete resource
/// type (surface, texture, vertex/index buffer) invokes this once instead
/// of repeating the same eight methods.
#[macro_export]
macro_rules! impl_resource9 {
    ($ty:ident, $restype:path) => {
        #[com_impl::implementation(IDirect3DResource9)]
        impl $ty {
            fn get_device(&self, ret: *mut *mut crate::dev::Device) -> crate::error::Error {
                let ret = if_error!(crate::core::check_mut_ref(ret));
                *ret = crate::core::com_ref(self.device);
                crate::error::Error::Success
            }

            fn set_private_data(
                &self,
                guid: &winapi::shared::guiddef::GUID,
                data: *const winapi::ctypes::c_void,
                size: u32,
                _flags: u32,
            ) -> crate::error::Error {
                let slice =
                    unsafe { std::slice::from_raw_parts(data as *const u8, size as usize) };
                self.resource.set_private_data(*guid, slice);
                crate::error::Error::Success
            }

            fn get_private_data(
                &self,
                guid: &winapi::shared::guiddef::GUID,
                data: *mut winapi::ctypes::c_void,
                size: *mut u32,
            ) -> crate::error::Error {
                let size_ref = if_error!(crate::core::check_mut_ref(size));
                let out = unsafe {
                    std::slice::from_raw_parts_mut(data as *mut u8, *size_ref as usize)
                };

                match self.resource.get_private_data(*guid, out) {
                    Some(len) => {
                        *size_ref = len;
                        crate::error::Error::Success
                    }
                    None => crate::error::Error::NotFound,
                }
            }

            fn free_private_data(
                &self,
                guid: &winapi::shared::guiddef::GUID,
            ) -> crate::error::Error {
                if self.resource.free_private_data(*guid) {
                    crate::error::Error::Success
                } else {
                    crate::error::Error::NotFound
                }
            }

            fn set_priority(&self, priority: u32) -> u32 {
                self.resource.set_priority(priority)
            }

            fn get_priority(&self) -> u32 {
                self.resource.priority()
            }

            fn pre_load(&self) {}

            fn get_type(&self) -> u32 {
                $restype as u32
            }
        }
    };
}

/// Like [`impl_iunknown!`], but for resource wrappers that also carry a
/// private refcount (see `core::resource`). `Release` only frees the
/// object once both the public and the private counters are at zero,
/// since the device may still hold the resource bound even after the
/// application drops its last public reference.
#[macro_export]
macro_rules! impl_iunknown_resource {
    (struct $ty:ident : $($iface:ty),+) => {
        impl $ty {
            unsafe extern "system" fn query_interface(
                this: *mut winapi::um::unknwnbase::IUnknown,
                riid: *const winapi::shared::guiddef::GUID,
                obj: *mut *mut winapi::ctypes::c_void,
            ) -> winapi::shared::winerror::HRESULT {
                use winapi::shared::winerror::{E_NOINTERFACE, S_OK};
                use winapi::Interface;

                if obj.is_null() {
                    return winapi::shared::winerror::E_POINTER;
                }

                *obj = std::ptr::null_mut();

                let riid = &*riid;
                let this = this as *mut $ty;

                $(
                    if *riid == <$iface as Interface>::uuidof() {
                        Self::add_ref(this as *mut winapi::um::unknwnbase::IUnknown);
                        *obj = this as *mut winapi::ctypes::c_void;
                        return S_OK;
                    }
                )+

                E_NOINTERFACE
            }

            unsafe extern "system" fn add_ref(this: *mut winapi::um::unknwnbase::IUnknown) -> u32 {
                let this = this as *mut $ty;
                (*this).refs.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1
            }

            unsafe extern "system" fn release(this: *mut winapi::um::unknwnbase::IUnknown) -> u32 {
                use crate::core::resource::PrivateRefCounted;

                let this = this as *mut $ty;
                let prev = (*this).refs.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);

                if prev == 1 && (*this).private_refs() == 0 {
                    let _ = Box::from_raw(this);
                }

                prev - 1
            }
        }
    };
}
