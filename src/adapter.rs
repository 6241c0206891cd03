//! The `LegacyGfx` factory (`IDirect3D9Ex`) and its adapters. Out of the
//! core device runtime's scope by spec.md §1's framing ("the Context/
//! Adapter that owns it" is named only as the device's weak back-
//! reference), but the device needs a real collaborator behind that
//! reference to create itself and to answer `GetDirect3D`/`GetAdapterXxx`.

use std::ptr;
use std::sync::atomic::AtomicU32;

use comptr::ComPtr;
use winapi::shared::d3d9::D3DPRESENT_PARAMETERS;
use winapi::shared::d3d9types::{D3DDEVICE_CREATION_PARAMETERS, D3DDEVTYPE, D3DFMT_A8B8G8R8, D3DFMT_UNKNOWN};
use winapi::shared::dxgi::{CreateDXGIFactory1, IDXGIAdapter, IDXGIAdapter1, IDXGIFactory1};
use winapi::shared::dxgi1_2::IDXGIFactory2;
use winapi::shared::dxgitype::DXGI_ADAPTER_DESC;
use winapi::shared::windef::HWND;
use winapi::shared::winerror::FAILED;
use winapi::um::d3d11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
    D3D11_CREATE_DEVICE_DEBUG, D3D11_CREATE_DEVICE_DISABLE_GPU_TIMEOUT, D3D11_SDK_VERSION,
};
use winapi::um::d3dcommon::{
    D3D_DRIVER_TYPE_UNKNOWN, D3D_FEATURE_LEVEL_10_0, D3D_FEATURE_LEVEL_10_1,
    D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_11_1,
};
use winapi::um::unknwnbase::IUnknown;
use winapi::um::winuser::GetWindowRect;
use winapi::Interface;

use crate::dev::Device;
use crate::error::{check_hresult, Error, Result};

/// One physical adapter enumerated off the DXGI factory at construction
/// time. `Device::new` resolves the legacy adapter ordinal the
/// application asked for into one of these.
pub struct Adapter {
    pub ordinal: u32,
    pub dxgi_adapter: ComPtr<IDXGIAdapter1>,
    pub desc: DXGI_ADAPTER_DESC,
}

impl Adapter {
    /// Bytes of dedicated video memory, backing `GetAvailableTextureMem`
    /// (original source reads `DXGI_ADAPTER_DESC::DedicatedVideoMemory`).
    pub fn dedicated_video_memory(&self) -> usize {
        self.desc.DedicatedVideoMemory
    }
}

/// The process-wide `LegacyGfx` factory object. Enumerates adapters once
/// at construction and hands out weak references to them; every `Device`
/// keeps a strong back-reference to its `Context` (returned by
/// `GetDirect3D`) and a raw pointer to the `Adapter` it was created on.
pub struct Context {
    refs: AtomicU32,
    dxgi_factory: ComPtr<IDXGIFactory1>,
    adapters: Vec<Adapter>,
}

impl_iunknown!(struct Context: IUnknown);

impl Context {
    /// Creates the DXGI factory and enumerates its adapters, giving the
    /// caller a ready-to-use `Context` with no `ModernGfx` device created
    /// yet. The crate's entry point for applications that don't already
    /// hold an `IDXGIFactory1`; everything downstream (`Context::new`)
    /// stays testable against a factory built by hand.
    pub fn create() -> Result<Box<Context>> {
        let mut raw: *mut IDXGIFactory1 = ptr::null_mut();
        let hr = unsafe {
            CreateDXGIFactory1(&IDXGIFactory1::uuidof(), &mut raw as *mut _ as *mut _)
        };
        check_hresult(hr, "CreateDXGIFactory1")?;

        let dxgi_factory = unsafe { ComPtr::new(raw) };
        Context::new(dxgi_factory).map(Box::new)
    }

    pub fn new(dxgi_factory: ComPtr<IDXGIFactory1>) -> Result<Self> {
        let mut adapters = Vec::new();
        let mut ordinal = 0;

        loop {
            let mut raw = std::ptr::null_mut();
            let hr = unsafe { dxgi_factory.EnumAdapters1(ordinal, &mut raw) };
            if winapi::shared::winerror::FAILED(hr) {
                break;
            }

            let dxgi_adapter = unsafe { ComPtr::new(raw) };
            let mut desc: DXGI_ADAPTER_DESC = unsafe { std::mem::zeroed() };
            unsafe { dxgi_adapter.GetDesc(&mut desc) };

            adapters.push(Adapter {
                ordinal,
                dxgi_adapter,
                desc,
            });
            ordinal += 1;
        }

        if adapters.is_empty() {
            return Err(Error::InvalidCall);
        }

        Ok(Context {
            refs: AtomicU32::new(1),
            dxgi_factory,
            adapters,
        })
    }

    pub fn adapter_count(&self) -> u32 {
        self.adapters.len() as u32
    }

    pub fn adapter(&self, ordinal: u32) -> Result<&Adapter> {
        self.adapters
            .get(ordinal as usize)
            .ok_or(Error::InvalidCall)
    }

    pub fn dxgi_factory(&self) -> &ComPtr<IDXGIFactory1> {
        &self.dxgi_factory
    }

    /// Creates the `ModernGfx` device and its implicit swap chain for one
    /// `LegacyGfx` device, matching `Direct3DDevice9Ex::CreateD3D11Device`
    /// + `Direct3DDevice9Ex::Create` in the original source (spec.md §4.1).
    ///
    /// Feature levels are tried newest-first down to 10.0; any creation
    /// failure is reported as `DeviceLost` rather than propagated raw, per
    /// spec.md §7 ("underlying-device failures during Reset/Create ⇒
    /// DeviceLost").
    pub fn create_device(
        &self,
        ordinal: u32,
        window: HWND,
        device_type: D3DDEVTYPE,
        is_ex: bool,
        behaviour_flags: u32,
        pp: &mut D3DPRESENT_PARAMETERS,
    ) -> Result<ComPtr<Device>> {
        let adapter = self.adapter(ordinal)?;

        let mut flags = D3D11_CREATE_DEVICE_DISABLE_GPU_TIMEOUT | D3D11_CREATE_DEVICE_BGRA_SUPPORT;
        if crate::core::config::settings().debug {
            flags |= D3D11_CREATE_DEVICE_DEBUG;
        }

        let feature_levels = [
            D3D_FEATURE_LEVEL_11_1,
            D3D_FEATURE_LEVEL_11_0,
            D3D_FEATURE_LEVEL_10_1,
            D3D_FEATURE_LEVEL_10_0,
        ];

        let mut device_raw = ptr::null_mut();
        let mut context_raw = ptr::null_mut();
        let mut level = feature_levels[0];

        let hr = unsafe {
            D3D11CreateDevice(
                adapter.dxgi_adapter.as_raw() as *mut IDXGIAdapter,
                D3D_DRIVER_TYPE_UNKNOWN,
                ptr::null_mut(),
                flags,
                feature_levels.as_ptr(),
                feature_levels.len() as u32,
                D3D11_SDK_VERSION,
                &mut device_raw,
                &mut level,
                &mut context_raw,
            )
        };

        if FAILED(hr) {
            log::error!("Unable to create ModernGfx device: {:#x}", hr as u32);
            return Err(Error::DeviceLost);
        }

        // `device_raw`/`context_raw` are owned by the pair returned above;
        // the context handle itself isn't needed here (`Device::new`
        // re-fetches it via `GetImmediateContext`), so just drop it.
        let d3d11_device: ComPtr<ID3D11Device> = unsafe { ComPtr::new(device_raw) };
        unsafe {
            ComPtr::<ID3D11DeviceContext>::new(context_raw);
        }

        let mut factory2_raw: *mut IDXGIFactory2 = ptr::null_mut();
        let hr = unsafe {
            self.dxgi_factory
                .QueryInterface(&IDXGIFactory2::uuidof(), &mut factory2_raw as *mut _ as *mut _)
        };
        check_hresult(hr, "QueryInterface IDXGIFactory2")?;
        let factory2 = unsafe { ComPtr::new(factory2_raw) };

        if pp.BackBufferWidth == 0 || pp.BackBufferHeight == 0 {
            let mut rect = unsafe { std::mem::zeroed() };
            unsafe { GetWindowRect(window, &mut rect) };
            if pp.BackBufferWidth == 0 {
                pp.BackBufferWidth = (rect.right - rect.left) as u32;
            }
            if pp.BackBufferHeight == 0 {
                pp.BackBufferHeight = (rect.bottom - rect.top) as u32;
            }
        }

        if pp.BackBufferCount == 0 {
            pp.BackBufferCount = 1;
        }

        if pp.BackBufferFormat == D3DFMT_UNKNOWN {
            pp.BackBufferFormat = D3DFMT_A8B8G8R8;
        }

        let creation_params = D3DDEVICE_CREATION_PARAMETERS {
            AdapterOrdinal: ordinal,
            DeviceType: device_type,
            hFocusWindow: window,
            BehaviorFlags: behaviour_flags,
        };

        Device::new(self, adapter, d3d11_device, creation_params, pp, factory2, is_ex)
    }
}
