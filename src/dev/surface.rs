//! A 2D array of pixels: the target of rendering, the destination of a
//! lock/blit, or one mip level of a texture. Grounded on the teacher's
//! `Surface`/`SurfaceData` shape, reconciled into one consistent
//! constructor signature (the retrieved teacher snapshots disagreed on
//! `Surface::new`'s arity and on `SubResource` vs. `SubTexture`; see
//! DESIGN.md).

use std::sync::atomic::AtomicU32;

use winapi::shared::d3d9::*;
use winapi::shared::d3d9types::*;
use winapi::shared::windef::RECT;
use winapi::um::d3d11::*;
use winapi::um::unknwnbase::{IUnknown, IUnknownVtbl};

use com_impl::{implementation, interface, ComInterface};
use comptr::ComPtr;

use super::{Device, Texture};
use crate::core::fmt::dxgi_format_to_d3d;
use crate::core::msample::dxgi_samples_to_d3d9;
use crate::core::resource::{MemoryPool, PrivateRefCounted, Resource, ResourceType, UsageFlags};
use crate::core::*;
use crate::d3d11;
use crate::error::{check_hresult, Error, Result};

/// Extra information required to fully describe a surface. A surface can
/// stand for quite a few distinct things in the legacy API, so this enum
/// carries whichever piece of `ModernGfx` state backs the concrete kind.
pub enum SurfaceData {
    /// An ordinary, standalone surface (e.g. an off-screen plain surface).
    None,
    /// This surface owns a render target view.
    RenderTarget(ComPtr<ID3D11RenderTargetView>),
    /// This surface owns a depth/stencil view.
    DepthStencil(ComPtr<ID3D11DepthStencilView>),
    /// This surface is mip level `level` of `owner`. Surfaces obtained
    /// this way hold a private reference on their owning texture so it
    /// cannot be destroyed while a level of it is still reachable.
    SubTexture { owner: ComPtr<Texture>, level: u32 },
}

/// A single, always-one-mip-level surface (spec.md's "singleton-surface
/// texture" concept): every surface the device hands out, whether
/// standalone or a texture's mip level, looks identical from here.
#[interface(IDirect3DSurface9)]
pub struct Surface {
    resource: Resource,
    refs: AtomicU32,
    device: *const Device,
    texture: d3d11::Texture2D,
    data: SurfaceData,
    /// Set from `CreateDepthStencilSurface`'s `Discard` parameter; consulted
    /// by `Device::do_depth_discard_check` on `SetDepthStencilSurface` and
    /// `Present`. Meaningless for non-depth-stencil surfaces.
    discard: bool,
}

impl Surface {
    pub fn new(
        device: *const Device,
        texture: d3d11::Texture2D,
        usage: UsageFlags,
        pool: MemoryPool,
        data: SurfaceData,
        discard: bool,
    ) -> ComPtr<Self> {
        if let SurfaceData::SubTexture { owner, .. } = &data {
            owner.private_add_ref();
        }

        let surface = Self {
            __vtable: Box::new(Self::create_vtable()),
            resource: Resource::new(ResourceType::Surface, pool, usage),
            refs: AtomicU32::new(1),
            device,
            texture,
            data,
            discard,
        };

        unsafe { new_com_interface(surface) }
    }

    fn device(&self) -> &Device {
        unsafe { &*self.device }
    }

    /// The D3D11 subresource index and parent resource pointer this
    /// surface maps to, used by `StretchRect`/`UpdateSurface`/`Lock`.
    pub fn subresource(&self) -> (*mut ID3D11Resource, u32) {
        let resource = self.texture.texture.as_raw() as *mut ID3D11Resource;
        let level = match &self.data {
            SurfaceData::SubTexture { level, .. } => *level,
            _ => 0,
        };
        (resource, level)
    }

    pub fn texture2d(&mut self) -> &mut d3d11::Texture2D {
        &mut self.texture
    }

    pub fn render_target_view(&mut self) -> Result<ComPtr<ID3D11RenderTargetView>> {
        match &self.data {
            SurfaceData::RenderTarget(view) => Ok(view.clone()),
            _ => Err(Error::InvalidCall),
        }
    }

    pub fn depth_stencil_view(&mut self) -> Result<ComPtr<ID3D11DepthStencilView>> {
        match &self.data {
            SurfaceData::DepthStencil(view) => Ok(view.clone()),
            _ => Err(Error::InvalidCall),
        }
    }

    pub fn is_render_target(&self) -> bool {
        matches!(self.data, SurfaceData::RenderTarget(_))
    }

    pub fn is_depth_stencil(&self) -> bool {
        matches!(self.data, SurfaceData::DepthStencil(_))
    }

    pub fn discard(&self) -> bool {
        self.discard
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        if let SurfaceData::SubTexture { owner, .. } = &self.data {
            owner.private_release();
        }
    }
}

impl std::ops::Deref for Surface {
    type Target = Resource;
    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl PrivateRefCounted for Surface {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

impl_iunknown_resource!(struct Surface: IUnknown, IDirect3DResource9, IDirect3DSurface9);
impl_resource9!(Surface, D3DRTYPE_SURFACE);

#[implementation(IDirect3DSurface9)]
impl Surface {
    /// Retrieves the container of this resource (the owning texture, for
    /// a mip-level surface). Out of scope for standalone surfaces.
    fn get_container(&self, _riid: &winapi::shared::guiddef::GUID, _ret: *mut usize) -> Error {
        log::warn!("Surface::get_container is a stub");
        Error::NoInterface
    }

    /// Retrieves a description of this surface.
    fn get_desc(&self, ret: *mut D3DSURFACE_DESC) -> Error {
        let ret = if_error!(check_mut_ref(ret));

        let desc = self.texture.desc();

        ret.Width = desc.Width;
        ret.Height = desc.Height;
        ret.Format = dxgi_format_to_d3d(desc.Format);
        ret.Type = D3DRTYPE_SURFACE;
        ret.Usage = self.resource.usage.bits();
        ret.Pool = self.resource.pool as u32;

        let (ms_ty, ms_qlt) = dxgi_samples_to_d3d9(desc.SampleDesc);
        ret.MultiSampleType = ms_ty;
        ret.MultiSampleQuality = ms_qlt;

        Error::Success
    }

    // -- Memory mapping functions --

    fn lock_rect(&mut self, ret: *mut D3DLOCKED_RECT, _r: *const RECT, flags: u32) -> Error {
        let ret = if_error!(check_mut_ref(ret));
        let (res, subres) = self.subresource();

        let map_ty = if flags & D3DLOCK_READONLY != 0 {
            D3D11_MAP_READ
        } else {
            match self.resource.pool {
                MemoryPool::SystemMem => D3D11_MAP_WRITE | D3D11_MAP_READ,
                MemoryPool::Managed => D3D11_MAP_WRITE_DISCARD,
                pool => {
                    log::error!("Cannot lock surface in memory pool {:?}", pool);
                    return Error::InvalidCall;
                }
            }
        };

        unsafe {
            let mut mapped: D3D11_MAPPED_SUBRESOURCE = std::mem::zeroed();
            let hr = self.device().device_context().Map(res, subres, map_ty, 0, &mut mapped);

            if winapi::shared::winerror::DXGI_ERROR_WAS_STILL_DRAWING == hr {
                return Error::WasStillDrawing;
            }
            if_error!(check_hresult(hr, "Failed to map surface"));

            ret.Pitch = mapped.RowPitch as i32;
            ret.pBits = mapped.pData;
        }

        Error::Success
    }

    fn unlock_rect(&self) -> Error {
        let (res, subres) = self.subresource();
        unsafe { self.device().device_context().Unmap(res, subres) };
        Error::Success
    }

    // -- GDI interop functions --

    fn get_d_c(&self, _ret: *mut usize) -> Error {
        log::warn!("GDI interop (GetDC) is not supported");
        Error::InvalidCall
    }

    fn release_d_c(&self, _dc: usize) -> Error {
        log::warn!("GDI interop (ReleaseDC) is not supported");
        Error::InvalidCall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_surface_data_is_neither_rt_nor_ds() {
        // SurfaceData is not Clone/PartialEq; assert via matches! on a
        // freshly built variant instead of requiring a live device.
        let data = SurfaceData::None;
        assert!(!matches!(data, SurfaceData::RenderTarget(_)));
        assert!(!matches!(data, SurfaceData::DepthStencil(_)));
    }
}
