//! Mirrors the legacy float/int/bool shader constant registers in CPU
//! memory and lazily uploads them to a ModernGfx constant buffer on
//! `prepare_draw`. Out of scope for deep semantics per spec.md §1 (the
//! shader-constant buffer manager is named as an external collaborator);
//! implemented here only at the stated `set`/`get`/`prepare_draw`
//! interface, grounded on the `m_constants.set/get/prepareDraw` call
//! sites in the original source.

use comptr::ComPtr;
use winapi::um::d3d11::*;

use crate::error::{check_hresult, Error, Result};

const MAX_FLOAT4: usize = 256;
const MAX_INT4: usize = 16;
const MAX_BOOL: usize = 16;

/// One stage's worth of shader constant registers (vertex or pixel).
/// `dirty` is set by every `set_*` call and cleared once `prepare_draw`
/// uploads the backing buffer, so an unchanged stage across consecutive
/// draws costs nothing.
pub struct ConstantManager {
    float4: Vec<[f32; 4]>,
    int4: Vec<[i32; 4]>,
    boolean: Vec<bool>,
    dirty: bool,
    buffer: Option<ComPtr<ID3D11Buffer>>,
}

impl ConstantManager {
    pub fn new() -> Self {
        ConstantManager {
            float4: vec![[0.0; 4]; MAX_FLOAT4],
            int4: vec![[0; 4]; MAX_INT4],
            boolean: vec![false; MAX_BOOL],
            dirty: true,
            buffer: None,
        }
    }

    pub fn set_float(&mut self, register: u32, values: &[f32]) -> Result<()> {
        let count = values.len() / 4;
        for (i, chunk) in values.chunks(4).enumerate().take(count) {
            let slot = self
                .float4
                .get_mut(register as usize + i)
                .ok_or(Error::InvalidCall)?;
            slot.copy_from_slice(chunk);
        }
        self.dirty = true;
        Ok(())
    }

    pub fn get_float(&self, register: u32, out: &mut [f32]) -> Result<()> {
        let count = out.len() / 4;
        for (i, chunk) in out.chunks_mut(4).enumerate().take(count) {
            let slot = self
                .float4
                .get(register as usize + i)
                .ok_or(Error::InvalidCall)?;
            chunk.copy_from_slice(slot);
        }
        Ok(())
    }

    pub fn set_int(&mut self, register: u32, values: &[i32]) -> Result<()> {
        let count = values.len() / 4;
        for (i, chunk) in values.chunks(4).enumerate().take(count) {
            let slot = self
                .int4
                .get_mut(register as usize + i)
                .ok_or(Error::InvalidCall)?;
            slot.copy_from_slice(chunk);
        }
        self.dirty = true;
        Ok(())
    }

    pub fn get_int(&self, register: u32, out: &mut [i32]) -> Result<()> {
        let count = out.len() / 4;
        for (i, chunk) in out.chunks_mut(4).enumerate().take(count) {
            let slot = self
                .int4
                .get(register as usize + i)
                .ok_or(Error::InvalidCall)?;
            chunk.copy_from_slice(slot);
        }
        Ok(())
    }

    pub fn set_bool(&mut self, register: u32, values: &[bool]) -> Result<()> {
        for (i, &v) in values.iter().enumerate() {
            let slot = self
                .boolean
                .get_mut(register as usize + i)
                .ok_or(Error::InvalidCall)?;
            *slot = v;
        }
        self.dirty = true;
        Ok(())
    }

    pub fn get_bool(&self, register: u32, out: &mut [bool]) -> Result<()> {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = *self
                .boolean
                .get(register as usize + i)
                .ok_or(Error::InvalidCall)?;
        }
        Ok(())
    }

    /// Lazily (re-)creates and fills the D3D11 constant buffer backing
    /// the float registers, returning it for binding. Int/bool registers
    /// are folded into the same buffer layout a real translator would
    /// emit; since the translator is out of scope, only the float bank is
    /// actually uploaded (matching `PassthroughTranslator`'s scope).
    pub fn prepare_draw(&mut self, device: &ID3D11Device) -> Result<ComPtr<ID3D11Buffer>> {
        if let (Some(buf), false) = (&self.buffer, self.dirty) {
            return Ok(buf.clone());
        }

        let byte_width = (self.float4.len() * std::mem::size_of::<[f32; 4]>()) as u32;

        let desc = D3D11_BUFFER_DESC {
            ByteWidth: byte_width,
            Usage: D3D11_USAGE_DYNAMIC,
            BindFlags: D3D11_BIND_CONSTANT_BUFFER,
            CPUAccessFlags: D3D11_CPU_ACCESS_WRITE,
            MiscFlags: 0,
            StructureByteStride: 0,
        };

        let init = D3D11_SUBRESOURCE_DATA {
            pSysMem: self.float4.as_ptr() as *const _,
            SysMemPitch: 0,
            SysMemSlicePitch: 0,
        };

        let mut raw = std::ptr::null_mut();
        let hr = unsafe { device.CreateBuffer(&desc, &init, &mut raw) };
        check_hresult(hr, "CreateBuffer for shader constants")?;

        let buffer = unsafe { ComPtr::new(raw) };
        self.buffer = Some(buffer.clone());
        self.dirty = false;
        Ok(buffer)
    }
}

impl Default for ConstantManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_registers_round_trip() {
        let mut mgr = ConstantManager::new();
        mgr.set_float(4, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut out = [0.0f32; 4];
        mgr.get_float(4, &mut out).unwrap();
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn out_of_range_register_is_invalid() {
        let mgr = ConstantManager::new();
        let mut out = [0.0f32; 4];
        assert!(mgr.get_float(MAX_FLOAT4 as u32, &mut out).is_err());
    }

    #[test]
    fn setting_a_register_marks_constants_dirty() {
        let mut mgr = ConstantManager::new();
        mgr.dirty = false;
        mgr.set_bool(0, &[true]).unwrap();
        assert!(mgr.dirty);
    }
}
