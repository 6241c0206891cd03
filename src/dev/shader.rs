//! Vertex declarations and the two shader wrapper types. The vertex
//! shader additionally owns the lazy input-layout cache keyed by the
//! identity of the vertex declaration it was last paired with, exactly as
//! spec.md §3 places it; grounded on
//! `UpdateVertexShaderAndInputLayout`/`GetLinkedInput`/`LinkInput` and
//! `CreateShader<Vertex, ...>` in the original source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use comptr::ComPtr;
use winapi::shared::d3d9::*;
use winapi::shared::d3d9types::*;
use winapi::um::d3d11::*;
use winapi::um::unknwnbase::{IUnknown, IUnknownVtbl};

use com_impl::{implementation, interface, ComInterface};

use super::Device;
use crate::core::fmt::{decl_usage_semantic, decltype_to_dxgi};
use crate::core::*;
use crate::error::{check_hresult, Error, Result};
use crate::translator::{ShaderTranslator, TargetBytecode};

/// A parsed, owned copy of a `D3DVERTEXELEMENT9` stream, terminated by
/// `D3DDECL_END()` in the application's original array.
#[interface(IDirect3DVertexDeclaration9)]
pub struct VertexDeclaration {
    refs: AtomicU32,
    device: *const Device,
    elements: Vec<D3DVERTEXELEMENT9>,
}

impl VertexDeclaration {
    /// # Safety
    /// `elems` must point to a `D3DVERTEXELEMENT9` array terminated by
    /// `D3DDECL_END()`.
    pub unsafe fn new(
        device: *const Device,
        elems: *const D3DVERTEXELEMENT9,
    ) -> Result<ComPtr<Self>> {
        let elems = check_ref(elems)?;
        let mut elements = Vec::new();
        let mut ptr = elems as *const D3DVERTEXELEMENT9;

        loop {
            let elem = *ptr;
            if elem.Stream == 0xFF {
                break;
            }
            elements.push(elem);
            ptr = ptr.add(1);
        }

        let decl = Self {
            __vtable: Box::new(Self::create_vtable()),
            refs: AtomicU32::new(1),
            device,
            elements,
        };

        Ok(new_com_interface(decl))
    }

    pub fn elements(&self) -> &[D3DVERTEXELEMENT9] {
        &self.elements
    }

    /// Builds the `D3D11_INPUT_ELEMENT_DESC` array an input layout needs,
    /// paired with `vertex_shader`'s compiled bytecode.
    fn input_element_descs(&self) -> Vec<D3D11_INPUT_ELEMENT_DESC> {
        self.elements
            .iter()
            .filter_map(|e| {
                let format = decltype_to_dxgi(e.Type)?;
                Some(D3D11_INPUT_ELEMENT_DESC {
                    SemanticName: decl_usage_semantic(e.Usage).as_ptr() as *const i8,
                    // SAFETY: decl_usage_semantic always returns a NUL-terminated byte string.
                    SemanticIndex: e.UsageIndex as u32,
                    Format: format,
                    InputSlot: e.Stream as u32,
                    AlignedByteOffset: e.Offset as u32,
                    InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                    InstanceDataStepRate: 0,
                })
            })
            .collect()
    }
}

impl_iunknown!(struct VertexDeclaration: IUnknown, IDirect3DVertexDeclaration9);

#[implementation(IDirect3DVertexDeclaration9)]
impl VertexDeclaration {
    fn get_device(&self, ret: *mut *mut Device) -> Error {
        let ret = if_error!(check_mut_ref(ret));
        *ret = com_ref(self.device);
        Error::Success
    }

    fn get_declaration(&self, elems: *mut D3DVERTEXELEMENT9, count: *mut u32) -> Error {
        let count = if_error!(check_mut_ref(count));
        let needed = self.elements.len() as u32 + 1;

        if elems.is_null() {
            *count = needed;
            return Error::Success;
        }

        if *count < needed {
            return Error::InvalidCall;
        }

        unsafe {
            for (i, e) in self.elements.iter().enumerate() {
                *elems.add(i) = *e;
            }
            *elems.add(self.elements.len()) = d3ddecl_end();
        }

        *count = needed;
        Error::Success
    }
}

/// Dumps `bytecode` to `shaderdump/<stage>_<n>.<ext>` when the `ShaderDump`
/// config is set, creating the directory on first use, matching the
/// filesystem contract the original's shader factory follows.
fn dump_shader_bytecode(stage: &str, n: u32, ext: &str, tokens: &[u32]) {
    if !crate::core::config::settings().shader_dump {
        return;
    }

    if let Err(err) = std::fs::create_dir_all("shaderdump") {
        log::warn!("failed to create shaderdump/: {}", err);
        return;
    }

    let path = format!("shaderdump/{}_{}.{}", stage, n, ext);
    let bytes = unsafe {
        std::slice::from_raw_parts(tokens.as_ptr() as *const u8, tokens.len() * 4)
    };

    if let Err(err) = std::fs::write(&path, bytes) {
        log::warn!("failed to write {}: {}", path, err);
    }
}

fn d3ddecl_end() -> D3DVERTEXELEMENT9 {
    D3DVERTEXELEMENT9 {
        Stream: 0xFF,
        Offset: 0,
        Type: D3DDECLTYPE_UNUSED as u8,
        Method: 0,
        Usage: 0,
        UsageIndex: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem(stream: u16, offset: u16, ty: u8, usage: u8, usage_index: u8) -> D3DVERTEXELEMENT9 {
        D3DVERTEXELEMENT9 {
            Stream: stream,
            Offset: offset,
            Type: ty,
            Method: 0,
            Usage: usage,
            UsageIndex: usage_index,
        }
    }

    #[test]
    fn parses_elements_up_to_the_terminator() {
        let raw = [
            elem(0, 0, D3DDECLTYPE_FLOAT3 as u8, D3DDECLUSAGE_POSITION as u8, 0),
            elem(0, 12, D3DDECLTYPE_FLOAT2 as u8, D3DDECLUSAGE_TEXCOORD as u8, 0),
            d3ddecl_end(),
        ];

        let decl = unsafe { VertexDeclaration::new(std::ptr::null(), raw.as_ptr()) }.unwrap();

        assert_eq!(decl.elements().len(), 2);
        assert_eq!(decl.elements()[1].Offset, 12);
    }

    #[test]
    fn input_element_descs_skip_unrepresentable_types() {
        let raw = [
            elem(0, 0, D3DDECLTYPE_FLOAT4 as u8, D3DDECLUSAGE_POSITION as u8, 0),
            elem(0, 16, D3DDECLTYPE_UNUSED as u8, D3DDECLUSAGE_TEXCOORD as u8, 0),
            d3ddecl_end(),
        ];

        let decl = unsafe { VertexDeclaration::new(std::ptr::null(), raw.as_ptr()) }.unwrap();

        let descs = decl.input_element_descs();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].AlignedByteOffset, 0);
    }

    #[test]
    fn null_pointer_is_rejected() {
        let result = unsafe { VertexDeclaration::new(std::ptr::null(), std::ptr::null()) };
        assert!(result.is_err());
    }
}

/// A compiled vertex shader plus the per-declaration input-layout cache
/// spec.md §3 pins to this object rather than to the device, since a
/// given vertex shader is typically paired with only a handful of
/// distinct declarations over its lifetime.
#[interface(IDirect3DVertexShader9)]
pub struct VertexShader {
    refs: AtomicU32,
    device: *const Device,
    bytecode: TargetBytecode,
    shader: ComPtr<ID3D11VertexShader>,
    input_layouts: std::cell::RefCell<HashMap<usize, ComPtr<ID3D11InputLayout>>>,
}

static VERTEX_SHADER_DUMP_COUNTER: AtomicU32 = AtomicU32::new(0);

impl VertexShader {
    pub fn new(
        device: *const Device,
        d3d11_device: &ID3D11Device,
        translator: &dyn ShaderTranslator,
        src: &[u32],
    ) -> Result<ComPtr<Self>> {
        let n = VERTEX_SHADER_DUMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        dump_shader_bytecode("vs", n, "dx9asm", src);

        let bytecode = translator.translate(src).ok_or(Error::InvalidCall)?;
        dump_shader_bytecode("vs", n, "dx11asm", &bytecode.tokens);

        let mut raw = std::ptr::null_mut();
        let hr = unsafe {
            d3d11_device.CreateVertexShader(
                bytecode.tokens.as_ptr() as *const _,
                bytecode.tokens.len() * 4,
                std::ptr::null_mut(),
                &mut raw,
            )
        };
        check_hresult(hr, "CreateVertexShader")?;

        let vs = Self {
            __vtable: Box::new(Self::create_vtable()),
            refs: AtomicU32::new(1),
            device,
            bytecode,
            shader: unsafe { ComPtr::new(raw) },
            input_layouts: std::cell::RefCell::new(HashMap::new()),
        };

        Ok(unsafe { new_com_interface(vs) })
    }

    pub fn shader(&self) -> &ID3D11VertexShader {
        &self.shader
    }

    /// Returns the input layout paired with `decl`, building and caching
    /// it on first use. Keyed by the declaration's address, matching
    /// `GetLinkedInput`'s identity-based lookup in the original source.
    pub fn input_layout(
        &self,
        d3d11_device: &ID3D11Device,
        decl: &VertexDeclaration,
    ) -> Result<ComPtr<ID3D11InputLayout>> {
        let key = decl as *const _ as usize;

        if let Some(layout) = self.input_layouts.borrow().get(&key) {
            return Ok(layout.clone());
        }

        let descs = decl.input_element_descs();
        let mut raw = std::ptr::null_mut();
        let hr = unsafe {
            d3d11_device.CreateInputLayout(
                descs.as_ptr(),
                descs.len() as u32,
                self.bytecode.tokens.as_ptr() as *const _,
                self.bytecode.tokens.len() * 4,
                &mut raw,
            )
        };
        check_hresult(hr, "CreateInputLayout")?;

        let layout = unsafe { ComPtr::new(raw) };
        self.input_layouts.borrow_mut().insert(key, layout.clone());
        Ok(layout)
    }
}

impl_iunknown!(struct VertexShader: IUnknown, IDirect3DVertexShader9);

#[implementation(IDirect3DVertexShader9)]
impl VertexShader {
    fn get_device(&self, ret: *mut *mut Device) -> Error {
        let ret = if_error!(check_mut_ref(ret));
        *ret = com_ref(self.device);
        Error::Success
    }

    fn get_function(&self, data: *mut winapi::ctypes::c_void, size: *mut u32) -> Error {
        let size_ref = if_error!(check_mut_ref(size));
        let byte_len = (self.bytecode.tokens.len() * 4) as u32;

        if data.is_null() {
            *size_ref = byte_len;
            return Error::Success;
        }

        if *size_ref < byte_len {
            return Error::InvalidCall;
        }

        unsafe {
            std::ptr::copy_nonoverlapping(
                self.bytecode.tokens.as_ptr() as *const u8,
                data as *mut u8,
                byte_len as usize,
            );
        }

        Error::Success
    }
}

/// A compiled pixel shader. Simpler than [`VertexShader`] since it has no
/// input-layout concerns.
#[interface(IDirect3DPixelShader9)]
pub struct PixelShader {
    refs: AtomicU32,
    device: *const Device,
    bytecode: TargetBytecode,
    shader: ComPtr<ID3D11PixelShader>,
}

static PIXEL_SHADER_DUMP_COUNTER: AtomicU32 = AtomicU32::new(0);

impl PixelShader {
    pub fn new(
        device: *const Device,
        d3d11_device: &ID3D11Device,
        translator: &dyn ShaderTranslator,
        src: &[u32],
    ) -> Result<ComPtr<Self>> {
        let n = PIXEL_SHADER_DUMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        dump_shader_bytecode("ps", n, "dx9asm", src);

        let bytecode = translator.translate(src).ok_or(Error::InvalidCall)?;
        dump_shader_bytecode("ps", n, "dx11asm", &bytecode.tokens);

        let mut raw = std::ptr::null_mut();
        let hr = unsafe {
            d3d11_device.CreatePixelShader(
                bytecode.tokens.as_ptr() as *const _,
                bytecode.tokens.len() * 4,
                std::ptr::null_mut(),
                &mut raw,
            )
        };
        check_hresult(hr, "CreatePixelShader")?;

        let ps = Self {
            __vtable: Box::new(Self::create_vtable()),
            refs: AtomicU32::new(1),
            device,
            bytecode,
            shader: unsafe { ComPtr::new(raw) },
        };

        Ok(unsafe { new_com_interface(ps) })
    }

    pub fn shader(&self) -> &ID3D11PixelShader {
        &self.shader
    }
}

impl_iunknown!(struct PixelShader: IUnknown, IDirect3DPixelShader9);

#[implementation(IDirect3DPixelShader9)]
impl PixelShader {
    fn get_device(&self, ret: *mut *mut Device) -> Error {
        let ret = if_error!(check_mut_ref(ret));
        *ret = com_ref(self.device);
        Error::Success
    }

    fn get_function(&self, data: *mut winapi::ctypes::c_void, size: *mut u32) -> Error {
        let size_ref = if_error!(check_mut_ref(size));
        let byte_len = (self.bytecode.tokens.len() * 4) as u32;

        if data.is_null() {
            *size_ref = byte_len;
            return Error::Success;
        }

        if *size_ref < byte_len {
            return Error::InvalidCall;
        }

        unsafe {
            std::ptr::copy_nonoverlapping(
                self.bytecode.tokens.as_ptr() as *const u8,
                data as *mut u8,
                byte_len as usize,
            );
        }

        Error::Success
    }
}
