//! Vertex and index buffers. Both are thin wrappers around a ModernGfx
//! buffer plus the shared [`Resource`] bookkeeping (pool/usage/private
//! refcount), mirroring the `Resource`/`d3d11::Buffer` pairing
//! `surface.rs`/`texture.rs` already use for textures; grounded on
//! `CreateVertexBuffer`/`CreateIndexBuffer` in the original source.

use std::sync::atomic::AtomicU32;

use comptr::ComPtr;
use winapi::shared::d3d9::*;
use winapi::shared::d3d9types::*;
use winapi::shared::winerror::DXGI_ERROR_WAS_STILL_DRAWING;
use winapi::um::d3d11::*;
use winapi::um::unknwnbase::{IUnknown, IUnknownVtbl};

use com_impl::{implementation, interface, ComInterface};

use super::Device;
use crate::core::resource::{MemoryPool, PrivateRefCounted, Resource, ResourceType, UsageFlags};
use crate::core::*;
use crate::d3d11;
use crate::error::{check_hresult, Error, Result};

macro_rules! impl_locking {
    ($ty:ident) => {
        impl $ty {
            fn lock_impl(&self, offset: u32, size: u32, flags: u32) -> Result<*mut u8> {
                let map_ty = if flags & D3DLOCK_DISCARD != 0 {
                    D3D11_MAP_WRITE_DISCARD
                } else if flags & D3DLOCK_NOOVERWRITE != 0 {
                    D3D11_MAP_WRITE_NO_OVERWRITE
                } else if flags & D3DLOCK_READONLY != 0 {
                    D3D11_MAP_READ
                } else {
                    D3D11_MAP_WRITE
                };

                let mut map_flags = 0;
                if flags & D3DLOCK_DONOTWAIT != 0 {
                    map_flags |= D3D11_MAP_FLAG_DO_NOT_WAIT;
                }

                let ctx = self.device().device_context();
                let resource = self.buffer.buffer.as_raw() as *mut ID3D11Resource;

                unsafe {
                    let mut mapped: D3D11_MAPPED_SUBRESOURCE = std::mem::zeroed();
                    let hr = ctx.Map(resource, 0, map_ty, map_flags, &mut mapped);

                    match hr {
                        0 => {
                            let _ = size;
                            Ok((mapped.pData as *mut u8).add(offset as usize))
                        }
                        DXGI_ERROR_WAS_STILL_DRAWING => Err(Error::WasStillDrawing),
                        hr => {
                            check_hresult(hr, "Map buffer")?;
                            unreachable!()
                        }
                    }
                }
            }

            fn unlock_impl(&self) {
                let ctx = self.device().device_context();
                let resource = self.buffer.buffer.as_raw() as *mut ID3D11Resource;
                unsafe { ctx.Unmap(resource, 0) };
            }
        }
    };
}

/// A vertex buffer: a flat byte array bound to one or more input-assembler
/// stream slots at draw time.
#[interface(IDirect3DVertexBuffer9)]
pub struct VertexBuffer {
    resource: Resource,
    refs: AtomicU32,
    device: *const Device,
    buffer: d3d11::Buffer,
    fvf: u32,
}

impl VertexBuffer {
    pub fn new(
        device: *const Device,
        d3d11_device: &ID3D11Device,
        length: u32,
        usage: UsageFlags,
        fvf: u32,
        pool: MemoryPool,
    ) -> Result<ComPtr<Self>> {
        let (d3d11_usage, cpu_flags) = usage_to_d3d11(usage, pool);

        let desc = D3D11_BUFFER_DESC {
            ByteWidth: length,
            Usage: d3d11_usage,
            BindFlags: D3D11_BIND_VERTEX_BUFFER,
            CPUAccessFlags: cpu_flags,
            MiscFlags: 0,
            StructureByteStride: 0,
        };

        let mut raw = std::ptr::null_mut();
        let hr = unsafe { d3d11_device.CreateBuffer(&desc, std::ptr::null(), &mut raw) };
        check_hresult(hr, "CreateBuffer for vertex buffer")?;

        let vb = Self {
            __vtable: Box::new(Self::create_vtable()),
            resource: Resource::new(ResourceType::VertexBuffer, pool, usage),
            refs: AtomicU32::new(1),
            device,
            buffer: d3d11::Buffer::new(unsafe { ComPtr::new(raw) }, length),
            fvf,
        };

        Ok(unsafe { new_com_interface(vb) })
    }

    fn device(&self) -> &Device {
        unsafe { &*self.device }
    }

    pub fn buffer(&self) -> &ComPtr<ID3D11Buffer> {
        &self.buffer.buffer
    }

    pub fn byte_width(&self) -> u32 {
        self.buffer.byte_width
    }
}

impl std::ops::Deref for VertexBuffer {
    type Target = Resource;
    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl PrivateRefCounted for VertexBuffer {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

impl_iunknown_resource!(struct VertexBuffer: IUnknown, IDirect3DResource9, IDirect3DVertexBuffer9);
impl_resource9!(VertexBuffer, D3DRTYPE_VERTEXBUFFER);
impl_locking!(VertexBuffer);

#[implementation(IDirect3DVertexBuffer9)]
impl VertexBuffer {
    fn lock(
        &self,
        offset: u32,
        size: u32,
        ret: *mut *mut winapi::ctypes::c_void,
        flags: u32,
    ) -> Error {
        let ret = if_error!(check_mut_ref(ret));
        *ret = if_error!(self.lock_impl(offset, size, flags)) as *mut _;
        Error::Success
    }

    fn unlock(&self) -> Error {
        self.unlock_impl();
        Error::Success
    }

    fn get_desc(&self, desc: *mut D3DVERTEXBUFFER_DESC) -> Error {
        let desc = if_error!(check_mut_ref(desc));
        desc.Format = D3DFMT_VERTEXDATA;
        desc.Type = D3DRTYPE_VERTEXBUFFER;
        desc.Usage = self.resource.usage.bits();
        desc.Pool = self.resource.pool as u32;
        desc.Size = self.buffer.byte_width;
        desc.FVF = self.fvf;
        Error::Success
    }
}

/// An index buffer: a flat array of 16- or 32-bit vertex indices.
#[interface(IDirect3DIndexBuffer9)]
pub struct IndexBuffer {
    resource: Resource,
    refs: AtomicU32,
    device: *const Device,
    buffer: d3d11::Buffer,
    format: D3DFORMAT,
}

impl IndexBuffer {
    pub fn new(
        device: *const Device,
        d3d11_device: &ID3D11Device,
        length: u32,
        usage: UsageFlags,
        format: D3DFORMAT,
        pool: MemoryPool,
    ) -> Result<ComPtr<Self>> {
        let (d3d11_usage, cpu_flags) = usage_to_d3d11(usage, pool);

        let desc = D3D11_BUFFER_DESC {
            ByteWidth: length,
            Usage: d3d11_usage,
            BindFlags: D3D11_BIND_INDEX_BUFFER,
            CPUAccessFlags: cpu_flags,
            MiscFlags: 0,
            StructureByteStride: 0,
        };

        let mut raw = std::ptr::null_mut();
        let hr = unsafe { d3d11_device.CreateBuffer(&desc, std::ptr::null(), &mut raw) };
        check_hresult(hr, "CreateBuffer for index buffer")?;

        let ib = Self {
            __vtable: Box::new(Self::create_vtable()),
            resource: Resource::new(ResourceType::IndexBuffer, pool, usage),
            refs: AtomicU32::new(1),
            device,
            buffer: d3d11::Buffer::new(unsafe { ComPtr::new(raw) }, length),
            format,
        };

        Ok(unsafe { new_com_interface(ib) })
    }

    fn device(&self) -> &Device {
        unsafe { &*self.device }
    }

    pub fn buffer(&self) -> &ComPtr<ID3D11Buffer> {
        &self.buffer.buffer
    }

    pub fn dxgi_format(&self) -> winapi::shared::dxgiformat::DXGI_FORMAT {
        if self.format == D3DFMT_INDEX32 {
            winapi::shared::dxgiformat::DXGI_FORMAT_R32_UINT
        } else {
            winapi::shared::dxgiformat::DXGI_FORMAT_R16_UINT
        }
    }
}

impl std::ops::Deref for IndexBuffer {
    type Target = Resource;
    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl PrivateRefCounted for IndexBuffer {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

impl_iunknown_resource!(struct IndexBuffer: IUnknown, IDirect3DResource9, IDirect3DIndexBuffer9);
impl_resource9!(IndexBuffer, D3DRTYPE_INDEXBUFFER);
impl_locking!(IndexBuffer);

#[implementation(IDirect3DIndexBuffer9)]
impl IndexBuffer {
    fn lock(
        &self,
        offset: u32,
        size: u32,
        ret: *mut *mut winapi::ctypes::c_void,
        flags: u32,
    ) -> Error {
        let ret = if_error!(check_mut_ref(ret));
        *ret = if_error!(self.lock_impl(offset, size, flags)) as *mut _;
        Error::Success
    }

    fn unlock(&self) -> Error {
        self.unlock_impl();
        Error::Success
    }

    fn get_desc(&self, desc: *mut D3DINDEXBUFFER_DESC) -> Error {
        let desc = if_error!(check_mut_ref(desc));
        desc.Format = self.format;
        desc.Type = D3DRTYPE_INDEXBUFFER;
        desc.Usage = self.resource.usage.bits();
        desc.Pool = self.resource.pool as u32;
        desc.Size = self.buffer.byte_width;
        Error::Success
    }
}

/// Shared usage/pool-to-D3D11 mapping for both buffer kinds, matching the
/// pool handling already present for textures in `CreateTextureInternal`.
fn usage_to_d3d11(usage: UsageFlags, pool: MemoryPool) -> (D3D11_USAGE, u32) {
    if usage.contains(UsageFlags::DYNAMIC) {
        (D3D11_USAGE_DYNAMIC, D3D11_CPU_ACCESS_WRITE)
    } else {
        match pool {
            MemoryPool::SystemMem => (
                D3D11_USAGE_STAGING,
                D3D11_CPU_ACCESS_WRITE | D3D11_CPU_ACCESS_READ,
            ),
            MemoryPool::Managed => (D3D11_USAGE_DYNAMIC, D3D11_CPU_ACCESS_WRITE),
            _ => (D3D11_USAGE_DEFAULT, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_usage_always_maps_to_dynamic_regardless_of_pool() {
        let (usage, flags) = usage_to_d3d11(UsageFlags::DYNAMIC, MemoryPool::Default);
        assert_eq!(usage, D3D11_USAGE_DYNAMIC);
        assert_eq!(flags, D3D11_CPU_ACCESS_WRITE);
    }

    #[test]
    fn system_mem_pool_maps_to_staging() {
        let (usage, flags) = usage_to_d3d11(UsageFlags::empty(), MemoryPool::SystemMem);
        assert_eq!(usage, D3D11_USAGE_STAGING);
        assert_eq!(flags, D3D11_CPU_ACCESS_WRITE | D3D11_CPU_ACCESS_READ);
    }
}
