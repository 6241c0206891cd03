//! Thin wrappers around the `ModernGfx` (D3D11) resource types that back
//! every legacy resource wrapper. Kept separate from `core::resource` so
//! that the pure-legacy bookkeeping (usage flags, pool, private refcount)
//! never depends on a live D3D11 device, and so resource wrappers can hold
//! exactly one of these per backing allocation.

use comptr::ComPtr;
use winapi::shared::dxgiformat::DXGI_FORMAT;
use winapi::um::d3d11::*;

use crate::error::{check_hresult, Result};

/// A 2D `ModernGfx` texture plus the views the device may need to bind it
/// as a shader resource, render target, or depth-stencil target. Views are
/// created lazily the first time they're requested, since most textures
/// are bound only one way. `Clone` shares the same underlying texture and
/// already-created views (e.g. between a texture and one of its mip-level
/// surfaces), it never duplicates the GPU resource.
#[derive(Clone)]
pub struct Texture2D {
    pub texture: ComPtr<ID3D11Texture2D>,
    pub format: DXGI_FORMAT,
    srv: Option<ComPtr<ID3D11ShaderResourceView>>,
    rtv: Option<ComPtr<ID3D11RenderTargetView>>,
    dsv: Option<ComPtr<ID3D11DepthStencilView>>,
}

impl Texture2D {
    pub fn new(texture: ComPtr<ID3D11Texture2D>, format: DXGI_FORMAT) -> Self {
        Texture2D {
            texture,
            format,
            srv: None,
            rtv: None,
            dsv: None,
        }
    }

    pub fn desc(&self) -> D3D11_TEXTURE2D_DESC {
        unsafe {
            let mut desc: D3D11_TEXTURE2D_DESC = std::mem::zeroed();
            self.texture.GetDesc(&mut desc);
            desc
        }
    }

    /// Returns the cached shader-resource view, creating it on first use.
    pub fn shader_resource_view(
        &mut self,
        device: &ID3D11Device,
    ) -> Result<ComPtr<ID3D11ShaderResourceView>> {
        if let Some(view) = &self.srv {
            return Ok(view.clone());
        }

        let mut raw = std::ptr::null_mut();
        let hr = unsafe {
            device.CreateShaderResourceView(
                self.texture.as_raw() as *mut _,
                std::ptr::null(),
                &mut raw,
            )
        };
        check_hresult(hr, "CreateShaderResourceView")?;

        let view = unsafe { ComPtr::new(raw) };
        self.srv = Some(view.clone());
        Ok(view)
    }

    pub fn render_target_view(
        &mut self,
        device: &ID3D11Device,
    ) -> Result<ComPtr<ID3D11RenderTargetView>> {
        if let Some(view) = &self.rtv {
            return Ok(view.clone());
        }

        let mut raw = std::ptr::null_mut();
        let hr = unsafe {
            device.CreateRenderTargetView(
                self.texture.as_raw() as *mut _,
                std::ptr::null(),
                &mut raw,
            )
        };
        check_hresult(hr, "CreateRenderTargetView")?;

        let view = unsafe { ComPtr::new(raw) };
        self.rtv = Some(view.clone());
        Ok(view)
    }

    pub fn depth_stencil_view(
        &mut self,
        device: &ID3D11Device,
        desc: &D3D11_DEPTH_STENCIL_VIEW_DESC,
    ) -> Result<ComPtr<ID3D11DepthStencilView>> {
        if let Some(view) = &self.dsv {
            return Ok(view.clone());
        }

        let mut raw = std::ptr::null_mut();
        let hr = unsafe {
            device.CreateDepthStencilView(self.texture.as_raw() as *mut _, desc, &mut raw)
        };
        check_hresult(hr, "CreateDepthStencilView")?;

        let view = unsafe { ComPtr::new(raw) };
        self.dsv = Some(view.clone());
        Ok(view)
    }
}

/// A `ModernGfx` buffer backing a legacy vertex or index buffer.
pub struct Buffer {
    pub buffer: ComPtr<ID3D11Buffer>,
    pub byte_width: u32,
}

impl Buffer {
    pub fn new(buffer: ComPtr<ID3D11Buffer>, byte_width: u32) -> Self {
        Buffer { buffer, byte_width }
    }
}
