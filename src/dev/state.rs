//! The LegacyGfx pipeline state mirror: every render state, sampler
//! state, texture-stage state and bound object the application can set,
//! plus the dirty-bit tracker that decides what `prepare_draw` actually
//! has to fold into ModernGfx objects before the next draw call.
//!
//! Field layout and defaults are grounded on `InternalRenderState` and the
//! `Reset` default tables in the original source.

use comptr::ComPtr;
use winapi::shared::d3d9types::*;

use super::buffer::{IndexBuffer, VertexBuffer};
use super::shader::{PixelShader, VertexDeclaration, VertexShader};
use super::Texture;
use crate::error::{Error, Result};

/// One bit per category of state that `prepare_draw` may need to fold
/// into a ModernGfx object. Kept coarse (category, not individual state)
/// since folding a category is cheap compared to tracking every single
/// render/sampler state independently, and the original groups its own
/// dirty tracking the same way.
bitflags::bitflags! {
    pub struct DirtyFlags: u32 {
        const VERTEX_SHADER    = 1 << 0;
        const VERTEX_DECL      = 1 << 1;
        const PIXEL_SHADER     = 1 << 2;
        const RENDER_TARGETS   = 1 << 3;
        const DEPTH_STENCIL    = 1 << 4;
        const RASTERIZER       = 1 << 5;
        const BLEND            = 1 << 6;
        const SAMPLERS         = 1 << 7;
        const INPUT_LAYOUT     = 1 << 8;
        const ALL = Self::VERTEX_SHADER.bits
            | Self::VERTEX_DECL.bits
            | Self::PIXEL_SHADER.bits
            | Self::RENDER_TARGETS.bits
            | Self::DEPTH_STENCIL.bits
            | Self::RASTERIZER.bits
            | Self::BLEND.bits
            | Self::SAMPLERS.bits
            | Self::INPUT_LAYOUT.bits;
    }
}

/// Render states are indexed 0..=`D3DRS_BLENDOPALPHA`; the original stores
/// them in a flat array rather than a map for O(1) access on the hot path.
const NUM_RENDER_STATES: usize = D3DRS_BLENDOPALPHA as usize + 1;
const NUM_TEXTURE_STAGES: usize = 8;
pub const NUM_SAMPLERS: usize = 20;
const NUM_STREAMS: usize = 16;

#[derive(Clone, Copy)]
pub struct StreamSource {
    pub offset: u32,
    pub stride: u32,
    pub freq: u32,
}

impl Default for StreamSource {
    fn default() -> Self {
        StreamSource {
            offset: 0,
            stride: 0,
            freq: 1,
        }
    }
}

/// The full mirrored pipeline state. Owned by `Device`; every `SetXxx`
/// call writes here and marks the relevant [`DirtyFlags`] bit, and
/// `prepare_draw` reads from here to decide what needs folding.
pub struct PipelineState {
    pub dirty: DirtyFlags,

    pub render_states: [u32; NUM_RENDER_STATES],
    pub texture_stage_states: [[u32; 32]; NUM_TEXTURE_STAGES],
    pub sampler_states: [[u32; 14]; NUM_SAMPLERS],

    pub vertex_shader: Option<ComPtr<VertexShader>>,
    pub pixel_shader: Option<ComPtr<PixelShader>>,
    pub vertex_declaration: Option<ComPtr<VertexDeclaration>>,

    pub textures: [Option<ComPtr<Texture>>; NUM_SAMPLERS],
    pub stream_sources: [Option<ComPtr<VertexBuffer>>; NUM_STREAMS],
    pub stream_freqs: [StreamSource; NUM_STREAMS],
    pub indices: Option<ComPtr<IndexBuffer>>,

    pub fvf: u32,
    pub software_vertex_processing: bool,
}

impl PipelineState {
    /// Builds the state mirror with the defaults `Reset` applies, per the
    /// render-state / texture-stage-state / sampler default tables in the
    /// original source (SPEC_FULL.md §D). `auto_depth_stencil` controls
    /// `D3DRS_ZENABLE`'s initial value: on when the device owns an
    /// automatic depth buffer, off otherwise.
    pub fn new(auto_depth_stencil: bool) -> Self {
        let mut render_states = [0u32; NUM_RENDER_STATES];

        // Defaults from SwiftShader, mirrored verbatim from `Reset`.
        render_states[D3DRS_ZENABLE as usize] = if auto_depth_stencil { D3DZB_TRUE } else { D3DZB_FALSE };
        render_states[D3DRS_FILLMODE as usize] = D3DFILL_SOLID;
        render_states[D3DRS_SHADEMODE as usize] = D3DSHADE_GOURAUD;
        render_states[D3DRS_ZWRITEENABLE as usize] = 1;
        render_states[D3DRS_ALPHATESTENABLE as usize] = 0;
        render_states[D3DRS_LASTPIXEL as usize] = 1;
        render_states[D3DRS_SRCBLEND as usize] = D3DBLEND_ONE;
        render_states[D3DRS_DESTBLEND as usize] = D3DBLEND_ZERO;
        render_states[D3DRS_CULLMODE as usize] = D3DCULL_CCW;
        render_states[D3DRS_ZFUNC as usize] = D3DCMP_LESSEQUAL;
        render_states[D3DRS_ALPHAREF as usize] = 0;
        render_states[D3DRS_ALPHAFUNC as usize] = D3DCMP_ALWAYS;
        render_states[D3DRS_DITHERENABLE as usize] = 0;
        render_states[D3DRS_ALPHABLENDENABLE as usize] = 0;
        render_states[D3DRS_FOGENABLE as usize] = 0;
        render_states[D3DRS_SPECULARENABLE as usize] = 0;
        render_states[D3DRS_FOGCOLOR as usize] = 0;
        render_states[D3DRS_FOGTABLEMODE as usize] = D3DFOG_NONE;
        render_states[D3DRS_FOGSTART as usize] = 0.0f32.to_bits();
        render_states[D3DRS_FOGEND as usize] = 1.0f32.to_bits();
        render_states[D3DRS_FOGDENSITY as usize] = 1.0f32.to_bits();
        render_states[D3DRS_RANGEFOGENABLE as usize] = 0;
        render_states[D3DRS_STENCILENABLE as usize] = 0;
        render_states[D3DRS_STENCILFAIL as usize] = D3DSTENCILOP_KEEP;
        render_states[D3DRS_STENCILZFAIL as usize] = D3DSTENCILOP_KEEP;
        render_states[D3DRS_STENCILPASS as usize] = D3DSTENCILOP_KEEP;
        render_states[D3DRS_STENCILFUNC as usize] = D3DCMP_ALWAYS;
        render_states[D3DRS_STENCILREF as usize] = 0;
        render_states[D3DRS_STENCILMASK as usize] = 0xFFFF_FFFF;
        render_states[D3DRS_STENCILWRITEMASK as usize] = 0xFFFF_FFFF;
        render_states[D3DRS_TEXTUREFACTOR as usize] = 0xFFFF_FFFF;
        render_states[D3DRS_WRAP0 as usize] = 0;
        render_states[D3DRS_WRAP1 as usize] = 0;
        render_states[D3DRS_WRAP2 as usize] = 0;
        render_states[D3DRS_WRAP3 as usize] = 0;
        render_states[D3DRS_WRAP4 as usize] = 0;
        render_states[D3DRS_WRAP5 as usize] = 0;
        render_states[D3DRS_WRAP6 as usize] = 0;
        render_states[D3DRS_WRAP7 as usize] = 0;
        render_states[D3DRS_CLIPPING as usize] = 1;
        render_states[D3DRS_LIGHTING as usize] = 1;
        render_states[D3DRS_AMBIENT as usize] = 0;
        render_states[D3DRS_FOGVERTEXMODE as usize] = D3DFOG_NONE;
        render_states[D3DRS_COLORVERTEX as usize] = 1;
        render_states[D3DRS_LOCALVIEWER as usize] = 1;
        render_states[D3DRS_NORMALIZENORMALS as usize] = 0;
        render_states[D3DRS_DIFFUSEMATERIALSOURCE as usize] = D3DMCS_COLOR1;
        render_states[D3DRS_SPECULARMATERIALSOURCE as usize] = D3DMCS_COLOR2;
        render_states[D3DRS_AMBIENTMATERIALSOURCE as usize] = D3DMCS_MATERIAL;
        render_states[D3DRS_EMISSIVEMATERIALSOURCE as usize] = D3DMCS_MATERIAL;
        render_states[D3DRS_VERTEXBLEND as usize] = D3DVBF_DISABLE;
        render_states[D3DRS_CLIPPLANEENABLE as usize] = 0;
        render_states[D3DRS_POINTSIZE as usize] = 1.0f32.to_bits();
        render_states[D3DRS_POINTSIZE_MIN as usize] = 1.0f32.to_bits();
        render_states[D3DRS_POINTSPRITEENABLE as usize] = 0;
        render_states[D3DRS_POINTSCALEENABLE as usize] = 0;
        render_states[D3DRS_POINTSCALE_A as usize] = 1.0f32.to_bits();
        render_states[D3DRS_POINTSCALE_B as usize] = 0.0f32.to_bits();
        render_states[D3DRS_POINTSCALE_C as usize] = 0.0f32.to_bits();
        render_states[D3DRS_MULTISAMPLEANTIALIAS as usize] = 1;
        render_states[D3DRS_MULTISAMPLEMASK as usize] = 0xFFFF_FFFF;
        render_states[D3DRS_PATCHEDGESTYLE as usize] = D3DPATCHEDGE_DISCRETE;
        render_states[D3DRS_DEBUGMONITORTOKEN as usize] = D3DDMT_ENABLE;
        render_states[D3DRS_POINTSIZE_MAX as usize] = 64.0f32.to_bits();
        render_states[D3DRS_INDEXEDVERTEXBLENDENABLE as usize] = 0;
        render_states[D3DRS_COLORWRITEENABLE as usize] = 0xF;
        render_states[D3DRS_TWEENFACTOR as usize] = 0.0f32.to_bits();
        render_states[D3DRS_BLENDOP as usize] = D3DBLENDOP_ADD;
        render_states[D3DRS_POSITIONDEGREE as usize] = D3DDEGREE_CUBIC;
        render_states[D3DRS_NORMALDEGREE as usize] = D3DDEGREE_LINEAR;
        render_states[D3DRS_SCISSORTESTENABLE as usize] = 0;
        render_states[D3DRS_SLOPESCALEDEPTHBIAS as usize] = 0.0f32.to_bits();
        render_states[D3DRS_ANTIALIASEDLINEENABLE as usize] = 0;
        render_states[D3DRS_MINTESSELLATIONLEVEL as usize] = 1.0f32.to_bits();
        render_states[D3DRS_MAXTESSELLATIONLEVEL as usize] = 1.0f32.to_bits();
        render_states[D3DRS_ADAPTIVETESS_X as usize] = 0.0f32.to_bits();
        render_states[D3DRS_ADAPTIVETESS_Y as usize] = 0.0f32.to_bits();
        render_states[D3DRS_ADAPTIVETESS_Z as usize] = 1.0f32.to_bits();
        render_states[D3DRS_ADAPTIVETESS_W as usize] = 0.0f32.to_bits();
        render_states[D3DRS_ENABLEADAPTIVETESSELLATION as usize] = 0;
        render_states[D3DRS_TWOSIDEDSTENCILMODE as usize] = 0;
        render_states[D3DRS_CCW_STENCILFAIL as usize] = D3DSTENCILOP_KEEP;
        render_states[D3DRS_CCW_STENCILZFAIL as usize] = D3DSTENCILOP_KEEP;
        render_states[D3DRS_CCW_STENCILPASS as usize] = D3DSTENCILOP_KEEP;
        render_states[D3DRS_CCW_STENCILFUNC as usize] = D3DCMP_ALWAYS;
        render_states[D3DRS_COLORWRITEENABLE1 as usize] = 0xF;
        render_states[D3DRS_COLORWRITEENABLE2 as usize] = 0xF;
        render_states[D3DRS_COLORWRITEENABLE3 as usize] = 0xF;
        render_states[D3DRS_BLENDFACTOR as usize] = 0xFFFF_FFFF;
        render_states[D3DRS_SRGBWRITEENABLE as usize] = 0;
        render_states[D3DRS_DEPTHBIAS as usize] = 0.0f32.to_bits();
        render_states[D3DRS_WRAP8 as usize] = 0;
        render_states[D3DRS_WRAP9 as usize] = 0;
        render_states[D3DRS_WRAP10 as usize] = 0;
        render_states[D3DRS_WRAP11 as usize] = 0;
        render_states[D3DRS_WRAP12 as usize] = 0;
        render_states[D3DRS_WRAP13 as usize] = 0;
        render_states[D3DRS_WRAP14 as usize] = 0;
        render_states[D3DRS_WRAP15 as usize] = 0;
        render_states[D3DRS_SEPARATEALPHABLENDENABLE as usize] = 0;
        render_states[D3DRS_SRCBLENDALPHA as usize] = D3DBLEND_ONE;
        render_states[D3DRS_DESTBLENDALPHA as usize] = D3DBLEND_ZERO;
        render_states[D3DRS_BLENDOPALPHA as usize] = D3DBLENDOP_ADD;

        // Texture-stage-state defaults: stage 0 modulates diffuse with the
        // texture, stages 1-7 pass their input straight through.
        let mut texture_stage_states = [[0u32; 32]; NUM_TEXTURE_STAGES];
        for (i, stage) in texture_stage_states.iter_mut().enumerate() {
            stage[D3DTSS_COLORARG1 as usize] = D3DTA_TEXTURE;
            stage[D3DTSS_COLORARG2 as usize] = D3DTA_CURRENT;
            stage[D3DTSS_ALPHAARG1 as usize] = D3DTA_TEXTURE;
            stage[D3DTSS_ALPHAARG2 as usize] = D3DTA_CURRENT;
            stage[D3DTSS_TEXCOORDINDEX as usize] = i as u32;
            stage[D3DTSS_BUMPENVMAT00 as usize] = 0;
            stage[D3DTSS_BUMPENVMAT11 as usize] = 0;

            if i == 0 {
                stage[D3DTSS_COLOROP as usize] = D3DTOP_MODULATE;
                stage[D3DTSS_ALPHAOP as usize] = D3DTOP_SELECTARG1;
            } else {
                stage[D3DTSS_COLOROP as usize] = D3DTOP_DISABLE;
                stage[D3DTSS_ALPHAOP as usize] = D3DTOP_DISABLE;
            }
        }

        // Sampler defaults: wrap addressing, point filtering, no mip bias,
        // anisotropy 1, for every one of the 16 pixel + 4 vertex samplers.
        let mut sampler_states = [[0u32; 14]; NUM_SAMPLERS];
        for sampler in sampler_states.iter_mut() {
            sampler[D3DSAMP_ADDRESSU as usize] = D3DTADDRESS_WRAP;
            sampler[D3DSAMP_ADDRESSV as usize] = D3DTADDRESS_WRAP;
            sampler[D3DSAMP_ADDRESSW as usize] = D3DTADDRESS_WRAP;
            sampler[D3DSAMP_MAGFILTER as usize] = D3DTEXF_POINT;
            sampler[D3DSAMP_MINFILTER as usize] = D3DTEXF_POINT;
            sampler[D3DSAMP_MIPFILTER as usize] = D3DTEXF_NONE;
            sampler[D3DSAMP_MIPMAPLODBIAS as usize] = 0;
            sampler[D3DSAMP_MAXMIPLEVEL as usize] = 0;
            sampler[D3DSAMP_MAXANISOTROPY as usize] = 1;
            sampler[D3DSAMP_SRGBTEXTURE as usize] = 0;
        }

        PipelineState {
            dirty: DirtyFlags::ALL,
            render_states,
            texture_stage_states,
            sampler_states,
            vertex_shader: None,
            pixel_shader: None,
            vertex_declaration: None,
            textures: Default::default(),
            stream_sources: Default::default(),
            stream_freqs: [StreamSource::default(); NUM_STREAMS],
            indices: None,
            fvf: 0,
            software_vertex_processing: false,
        }
    }

    pub fn set_render_state(&mut self, state: D3DRENDERSTATETYPE, value: u32) -> Result<()> {
        let slot = self
            .render_states
            .get_mut(state as usize)
            .ok_or(Error::InvalidCall)?;
        *slot = value;

        self.dirty.insert(match state {
            D3DRS_SRCBLEND | D3DRS_DESTBLEND | D3DRS_BLENDOP | D3DRS_ALPHABLENDENABLE
            | D3DRS_COLORWRITEENABLE => DirtyFlags::BLEND,
            D3DRS_CULLMODE | D3DRS_FILLMODE | D3DRS_SCISSORTESTENABLE
            | D3DRS_SLOPESCALEDEPTHBIAS | D3DRS_DEPTHBIAS | D3DRS_MULTISAMPLEANTIALIAS => {
                DirtyFlags::RASTERIZER
            }
            D3DRS_ZENABLE | D3DRS_ZWRITEENABLE | D3DRS_ZFUNC | D3DRS_STENCILENABLE
            | D3DRS_STENCILFUNC | D3DRS_STENCILFAIL | D3DRS_STENCILZFAIL
            | D3DRS_STENCILPASS | D3DRS_STENCILMASK | D3DRS_STENCILWRITEMASK => {
                DirtyFlags::DEPTH_STENCIL
            }
            _ => DirtyFlags::empty(),
        });

        Ok(())
    }

    pub fn render_state(&self, state: D3DRENDERSTATETYPE) -> Result<u32> {
        self.render_states
            .get(state as usize)
            .copied()
            .ok_or(Error::InvalidCall)
    }

    pub fn set_texture_stage_state(&mut self, stage: u32, ty: u32, value: u32) -> Result<()> {
        let stage = self
            .texture_stage_states
            .get_mut(stage as usize)
            .ok_or(Error::InvalidCall)?;
        let slot = stage.get_mut(ty as usize).ok_or(Error::InvalidCall)?;
        *slot = value;
        self.dirty.insert(DirtyFlags::SAMPLERS);
        Ok(())
    }

    pub fn texture_stage_state(&self, stage: u32, ty: u32) -> Result<u32> {
        self.texture_stage_states
            .get(stage as usize)
            .and_then(|s| s.get(ty as usize))
            .copied()
            .ok_or(Error::InvalidCall)
    }

    /// Maps a legacy sampler/stage index onto this mirror's flat sampler
    /// array. Pixel samplers 0-15 pass through unchanged; the four vertex
    /// texture samplers (`D3DDMAPSAMPLER` excluded) land at 16..19 per the
    /// original's `MapStageToSampler`.
    pub fn map_sampler_index(stage: u32) -> Result<usize> {
        const D3DVERTEXTEXTURESAMPLER0: u32 = 256;
        const D3DVERTEXTEXTURESAMPLER3: u32 = D3DVERTEXTEXTURESAMPLER0 + 3;
        const D3DDMAPSAMPLER: u32 = 0x1000_0000 - 1; // sentinel, never a valid stage

        match stage {
            0..=15 => Ok(stage as usize),
            D3DVERTEXTEXTURESAMPLER0..=D3DVERTEXTEXTURESAMPLER3 => {
                Ok((stage - D3DVERTEXTEXTURESAMPLER0 + 16) as usize)
            }
            s if s == D3DDMAPSAMPLER => Err(Error::InvalidCall),
            _ => Err(Error::InvalidCall),
        }
    }

    pub fn set_sampler_state(&mut self, stage: u32, ty: D3DSAMPLERSTATETYPE, value: u32) -> Result<()> {
        let idx = Self::map_sampler_index(stage)?;
        let sampler = self.sampler_states.get_mut(idx).ok_or(Error::InvalidCall)?;
        let slot = sampler.get_mut(ty as usize).ok_or(Error::InvalidCall)?;
        *slot = value;
        self.dirty.insert(DirtyFlags::SAMPLERS);
        Ok(())
    }

    pub fn sampler_state(&self, stage: u32, ty: D3DSAMPLERSTATETYPE) -> Result<u32> {
        let idx = Self::map_sampler_index(stage)?;
        self.sampler_states
            .get(idx)
            .and_then(|s| s.get(ty as usize))
            .copied()
            .ok_or(Error::InvalidCall)
    }

}

/// Records state-setting calls for later replay via `Apply`. Left as a
/// minimal object: recording/replaying the fixed-function-era state block
/// machinery is not part of this device's in-scope surface, but the type
/// still exists so `CreateStateBlock` round-trips through a real object
/// rather than failing outright.
pub struct StateBlock {
    pub ty: D3DSTATEBLOCKTYPE,
}

impl StateBlock {
    pub fn new(ty: D3DSTATEBLOCKTYPE) -> Self {
        StateBlock { ty }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_sampler_indices_pass_through() {
        assert_eq!(PipelineState::map_sampler_index(0).unwrap(), 0);
        assert_eq!(PipelineState::map_sampler_index(15).unwrap(), 15);
    }

    #[test]
    fn vertex_samplers_shift_by_sixteen() {
        assert_eq!(PipelineState::map_sampler_index(256).unwrap(), 16);
        assert_eq!(PipelineState::map_sampler_index(259).unwrap(), 19);
    }

    #[test]
    fn out_of_range_stage_is_invalid() {
        assert!(PipelineState::map_sampler_index(16).is_err());
        assert!(PipelineState::map_sampler_index(255).is_err());
    }

    #[test]
    fn setting_a_blend_state_marks_blend_dirty_only() {
        let mut state = PipelineState::new(false);
        state.dirty = DirtyFlags::empty();
        state.set_render_state(D3DRS_SRCBLEND, D3DBLEND_SRCALPHA).unwrap();
        assert_eq!(state.dirty, DirtyFlags::BLEND);
    }

    #[test]
    fn default_stage_zero_modulates_texture_with_diffuse() {
        let state = PipelineState::new(false);
        assert_eq!(
            state.texture_stage_state(0, D3DTSS_COLOROP).unwrap(),
            D3DTOP_MODULATE
        );
        assert_eq!(
            state.texture_stage_state(1, D3DTSS_COLOROP).unwrap(),
            D3DTOP_DISABLE
        );
    }
}
