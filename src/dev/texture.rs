//! A 2D image plus its mip sub-levels, wrapping an `ID3D11Texture2D` and
//! lazily creating whichever views the device ends up needing
//! (shader-resource, render-target, depth-stencil) through
//! [`crate::d3d11::Texture2D`].

use std::sync::atomic::AtomicU32;

use winapi::shared::d3d9::*;
use winapi::shared::d3d9types::*;
use winapi::shared::windef::RECT;
use winapi::um::d3d11::*;
use winapi::um::unknwnbase::{IUnknown, IUnknownVtbl};

use com_impl::{implementation, interface, ComInterface};
use comptr::ComPtr;

use super::{Device, Surface, SurfaceData};
use crate::core::resource::{MemoryPool, PrivateRefCounted, Resource, ResourceType, UsageFlags};
use crate::core::*;
use crate::d3d11;
use crate::error::{check_hresult, Error, Result};

/// A 2D texture with `levels` mip levels, matching `ID3D11Texture2D`
/// closely since in D3D9 a 2D texture can only be used in shaders or as a
/// render target/depth buffer — never mapped for vertex/index data.
#[interface(IDirect3DTexture9)]
pub struct Texture {
    resource: Resource,
    refs: AtomicU32,
    device: *const Device,
    texture: d3d11::Texture2D,
    levels: u32,
}

impl Texture {
    pub fn new(
        device: *const Device,
        texture: d3d11::Texture2D,
        levels: u32,
        usage: UsageFlags,
        pool: MemoryPool,
    ) -> ComPtr<Self> {
        let texture = Self {
            __vtable: Box::new(Self::create_vtable()),
            resource: Resource::new(ResourceType::Texture, pool, usage),
            refs: AtomicU32::new(1),
            device,
            texture,
            levels,
        };

        unsafe { new_com_interface(texture) }
    }

    fn device(&self) -> &Device {
        unsafe { &*self.device }
    }

    pub fn texture2d(&mut self) -> &mut d3d11::Texture2D {
        &mut self.texture
    }

    pub fn level_count(&self) -> u32 {
        self.levels
    }
}

impl std::ops::Deref for Texture {
    type Target = Resource;
    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl PrivateRefCounted for Texture {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

impl_iunknown_resource!(
    struct Texture: IUnknown,
    IDirect3DResource9,
    IDirect3DBaseTexture9,
    IDirect3DTexture9
);
impl_resource9!(Texture, D3DRTYPE_TEXTURE);

#[implementation(IDirect3DBaseTexture9)]
impl Texture {
    fn set_l_o_d(&mut self, _lod: u32) -> u32 {
        0
    }

    fn get_l_o_d(&self) -> u32 {
        0
    }

    fn get_level_count(&self) -> u32 {
        self.levels
    }

    fn set_auto_gen_filter_type(&mut self, _filter: D3DTEXTUREFILTERTYPE) -> Error {
        log::warn!("Automatic mip generation is not supported");
        Error::InvalidCall
    }

    fn get_auto_gen_filter_type(&self) -> D3DTEXTUREFILTERTYPE {
        D3DTEXF_NONE
    }

    fn generate_mip_sub_levels(&mut self) {
        log::warn!("GenerateMipSubLevels is a stub");
    }
}

#[implementation(IDirect3DTexture9)]
impl Texture {
    /// Retrieves the description of a certain mip level.
    fn get_level_desc(&self, level: u32, desc: *mut D3DSURFACE_DESC) -> Error {
        if level >= self.levels {
            return Error::InvalidCall;
        }

        // The per-level texture dimensions halve (floor, minimum 1) each
        // level, matching the standard D3D mip chain.
        let base = self.texture.desc();
        let desc = if_error!(check_mut_ref(desc));

        desc.Width = (base.Width >> level).max(1);
        desc.Height = (base.Height >> level).max(1);
        desc.Format = crate::core::fmt::dxgi_format_to_d3d(base.Format);
        desc.Type = D3DRTYPE_SURFACE;
        desc.Usage = self.resource.usage.bits();
        desc.Pool = self.resource.pool as u32;
        desc.MultiSampleType = D3DMULTISAMPLE_NONE;
        desc.MultiSampleQuality = 0;

        Error::Success
    }

    /// Retrieves a surface representing a mip level of this texture.
    fn get_surface_level(&self, level: u32, ret: *mut *mut Surface) -> Error {
        let ret = if_error!(check_mut_ref(ret));

        if level >= self.levels {
            return Error::InvalidCall;
        }

        let owner_ptr = crate::core::com_ref(self as *const Texture);
        let owner: ComPtr<Texture> = unsafe { ComPtr::new(owner_ptr) };

        let data = SurfaceData::SubTexture { owner, level };

        let surface = Surface::new(
            self.device,
            self.texture.clone(),
            self.resource.usage,
            self.resource.pool,
            data,
            false,
        );

        *ret = surface.into();
        Error::Success
    }

    /// Locks a mip level and maps its memory.
    fn lock_rect(
        &self,
        level: u32,
        ret: *mut D3DLOCKED_RECT,
        _r: *const RECT,
        flags: u32,
    ) -> Error {
        let ret = if_error!(check_mut_ref(ret));

        let map_ty = if flags & D3DLOCK_READONLY != 0 {
            log::warn!("Reading data from a texture might not work");
            D3D11_MAP_READ
        } else {
            let base = match self.resource.pool {
                MemoryPool::Managed => D3D11_MAP_WRITE_DISCARD,
                MemoryPool::SystemMem => D3D11_MAP_WRITE | D3D11_MAP_READ,
                pool => {
                    log::error!("Cannot lock texture in memory pool {:?}", pool);
                    return Error::InvalidCall;
                }
            };
            if flags & D3DLOCK_DISCARD != 0 {
                D3D11_MAP_WRITE_DISCARD
            } else if flags & D3DLOCK_NOOVERWRITE != 0 {
                D3D11_MAP_WRITE_NO_OVERWRITE
            } else {
                base
            }
        };

        let mut map_flags = 0;
        if flags & D3DLOCK_DONOTWAIT != 0 {
            map_flags |= D3D11_MAP_FLAG_DO_NOT_WAIT;
        }

        let resource = self.texture.texture.as_raw() as *mut ID3D11Resource;

        unsafe {
            let mut mapped: D3D11_MAPPED_SUBRESOURCE = std::mem::zeroed();
            let hr = self
                .device()
                .device_context()
                .Map(resource, level, map_ty, map_flags, &mut mapped);

            match hr {
                0 => {
                    ret.Pitch = mapped.RowPitch as i32;
                    ret.pBits = mapped.pData;
                }
                winapi::shared::winerror::DXGI_ERROR_WAS_STILL_DRAWING => {
                    return Error::WasStillDrawing
                }
                hr => {
                    if_error!(check_hresult(hr, "Failed to map texture"));
                }
            }
        }

        Error::Success
    }

    fn unlock_rect(&self, level: u32) -> Error {
        let resource = self.texture.texture.as_raw() as *mut ID3D11Resource;
        unsafe { self.device().device_context().Unmap(resource, level) };
        Error::Success
    }

    fn add_dirty_rect(&mut self, _r: *const RECT) -> Error {
        // Dirty-region tracking is a pure performance optimisation for
        // partial texture updates; every update is treated as full.
        Error::Success
    }
}
