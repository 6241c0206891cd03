//! Format conversions between the legacy `D3DFORMAT`/declaration-type
//! vocabulary and the DXGI vocabulary the modern backend speaks.

use winapi::shared::d3d9types::*;
use winapi::shared::dxgiformat::*;

/// Converts a legacy surface/texture format to its DXGI equivalent.
///
/// Returns `None` for legacy formats with no direct DXGI counterpart
/// (e.g. the FOURCC multi-plane video formats); callers treat that as
/// `InvalidCall`.
pub fn d3d_format_to_dxgi(format: D3DFORMAT) -> Option<DXGI_FORMAT> {
    Some(match format {
        D3DFMT_A8R8G8B8 | D3DFMT_X8R8G8B8 => DXGI_FORMAT_B8G8R8A8_UNORM,
        D3DFMT_A8B8G8R8 | D3DFMT_X8B8G8R8 => DXGI_FORMAT_R8G8B8A8_UNORM,
        D3DFMT_A2B10G10R10 => DXGI_FORMAT_R10G10B10A2_UNORM,
        D3DFMT_A1R5G5B5 | D3DFMT_X1R5G5B5 => DXGI_FORMAT_B5G5R5A1_UNORM,
        D3DFMT_R5G6B5 => DXGI_FORMAT_B5G6R5_UNORM,
        D3DFMT_A8 => DXGI_FORMAT_A8_UNORM,
        D3DFMT_A8L8 => DXGI_FORMAT_R8G8_UNORM,
        D3DFMT_L8 => DXGI_FORMAT_R8_UNORM,
        D3DFMT_L16 => DXGI_FORMAT_R16_UNORM,
        D3DFMT_G16R16 => DXGI_FORMAT_R16G16_UNORM,
        D3DFMT_A16B16G16R16 => DXGI_FORMAT_R16G16B16A16_UNORM,
        D3DFMT_A16B16G16R16F => DXGI_FORMAT_R16G16B16A16_FLOAT,
        D3DFMT_R16F => DXGI_FORMAT_R16_FLOAT,
        D3DFMT_G16R16F => DXGI_FORMAT_R16G16_FLOAT,
        D3DFMT_R32F => DXGI_FORMAT_R32_FLOAT,
        D3DFMT_G32R32F => DXGI_FORMAT_R32G32_FLOAT,
        D3DFMT_A32B32G32R32F => DXGI_FORMAT_R32G32B32A32_FLOAT,
        D3DFMT_D24S8 => DXGI_FORMAT_R24G8_TYPELESS,
        D3DFMT_D32 | D3DFMT_D32F_LOCKABLE => DXGI_FORMAT_R32_TYPELESS,
        D3DFMT_D16 => DXGI_FORMAT_R16_TYPELESS,
        D3DFMT_INDEX16 => DXGI_FORMAT_R16_UINT,
        D3DFMT_INDEX32 => DXGI_FORMAT_R32_UINT,
        D3DFMT_VERTEXDATA => DXGI_FORMAT_UNKNOWN,
        _ => return None,
    })
}

/// Converts a DXGI format back to the legacy format a resource created
/// from it should report through `GetDesc`. The inverse of
/// [`d3d_format_to_dxgi`]; only covers formats that mapping can produce.
pub fn dxgi_format_to_d3d(format: DXGI_FORMAT) -> D3DFORMAT {
    match format {
        DXGI_FORMAT_B8G8R8A8_UNORM => D3DFMT_A8R8G8B8,
        DXGI_FORMAT_R8G8B8A8_UNORM => D3DFMT_A8B8G8R8,
        DXGI_FORMAT_R10G10B10A2_UNORM => D3DFMT_A2B10G10R10,
        DXGI_FORMAT_B5G5R5A1_UNORM => D3DFMT_A1R5G5B5,
        DXGI_FORMAT_B5G6R5_UNORM => D3DFMT_R5G6B5,
        DXGI_FORMAT_A8_UNORM => D3DFMT_A8,
        DXGI_FORMAT_R8G8_UNORM => D3DFMT_A8L8,
        DXGI_FORMAT_R8_UNORM => D3DFMT_L8,
        DXGI_FORMAT_R16_UNORM => D3DFMT_L16,
        DXGI_FORMAT_R16G16_UNORM => D3DFMT_G16R16,
        DXGI_FORMAT_R16G16B16A16_UNORM => D3DFMT_A16B16G16R16,
        DXGI_FORMAT_R16G16B16A16_FLOAT => D3DFMT_A16B16G16R16F,
        DXGI_FORMAT_R16_FLOAT => D3DFMT_R16F,
        DXGI_FORMAT_R16G16_FLOAT => D3DFMT_G16R16F,
        DXGI_FORMAT_R32_FLOAT => D3DFMT_R32F,
        DXGI_FORMAT_R32G32_FLOAT => D3DFMT_G32R32F,
        DXGI_FORMAT_R32G32B32A32_FLOAT => D3DFMT_A32B32G32R32F,
        DXGI_FORMAT_R24G8_TYPELESS => D3DFMT_D24S8,
        DXGI_FORMAT_R32_TYPELESS => D3DFMT_D32,
        DXGI_FORMAT_R16_TYPELESS => D3DFMT_D16,
        DXGI_FORMAT_R16_UINT => D3DFMT_INDEX16,
        DXGI_FORMAT_R32_UINT => D3DFMT_INDEX32,
        _ => D3DFMT_UNKNOWN,
    }
}

/// Picks the typed (rather than typeless) DXGI format a depth-stencil
/// surface's `ID3D11DepthStencilView` should be created with, since
/// `d3d_format_to_dxgi` deliberately reports the typeless resource format.
pub fn dxgi_dsv_format(format: DXGI_FORMAT) -> DXGI_FORMAT {
    match format {
        DXGI_FORMAT_R24G8_TYPELESS => DXGI_FORMAT_D24_UNORM_S8_UINT,
        DXGI_FORMAT_R32_TYPELESS => DXGI_FORMAT_D32_FLOAT,
        DXGI_FORMAT_R16_TYPELESS => DXGI_FORMAT_D16_UNORM,
        other => other,
    }
}

/// Converts a `D3DDECLTYPE` vertex-declaration element type to the DXGI
/// format an `ID3D11InputLayout` element descriptor needs.
pub fn decltype_to_dxgi(decl_type: u8) -> Option<DXGI_FORMAT> {
    Some(match decl_type as u32 {
        D3DDECLTYPE_FLOAT1 => DXGI_FORMAT_R32_FLOAT,
        D3DDECLTYPE_FLOAT2 => DXGI_FORMAT_R32G32_FLOAT,
        D3DDECLTYPE_FLOAT3 => DXGI_FORMAT_R32G32B32_FLOAT,
        D3DDECLTYPE_FLOAT4 => DXGI_FORMAT_R32G32B32A32_FLOAT,
        D3DDECLTYPE_D3DCOLOR => DXGI_FORMAT_B8G8R8A8_UNORM,
        D3DDECLTYPE_UBYTE4 => DXGI_FORMAT_R8G8B8A8_UINT,
        D3DDECLTYPE_SHORT2 => DXGI_FORMAT_R16G16_SINT,
        D3DDECLTYPE_SHORT4 => DXGI_FORMAT_R16G16B16A16_SINT,
        D3DDECLTYPE_UBYTE4N => DXGI_FORMAT_R8G8B8A8_UNORM,
        D3DDECLTYPE_SHORT2N => DXGI_FORMAT_R16G16_SNORM,
        D3DDECLTYPE_SHORT4N => DXGI_FORMAT_R16G16B16A16_SNORM,
        D3DDECLTYPE_USHORT2N => DXGI_FORMAT_R16G16_UNORM,
        D3DDECLTYPE_USHORT4N => DXGI_FORMAT_R16G16B16A16_UNORM,
        D3DDECLTYPE_FLOAT16_2 => DXGI_FORMAT_R16G16_FLOAT,
        D3DDECLTYPE_FLOAT16_4 => DXGI_FORMAT_R16G16B16A16_FLOAT,
        _ => return None,
    })
}

/// Maps a `D3DDECLUSAGE` to the HLSL semantic name its DX11 counterpart
/// expects in an input-layout descriptor. NUL-terminated since
/// `D3D11_INPUT_ELEMENT_DESC::SemanticName` is read as a C string.
pub fn decl_usage_semantic(usage: u8) -> &'static [u8] {
    match usage as u32 {
        D3DDECLUSAGE_POSITION => b"POSITION\0",
        D3DDECLUSAGE_BLENDWEIGHT => b"BLENDWEIGHT\0",
        D3DDECLUSAGE_BLENDINDICES => b"BLENDINDICES\0",
        D3DDECLUSAGE_NORMAL => b"NORMAL\0",
        D3DDECLUSAGE_PSIZE => b"PSIZE\0",
        D3DDECLUSAGE_TEXCOORD => b"TEXCOORD\0",
        D3DDECLUSAGE_TANGENT => b"TANGENT\0",
        D3DDECLUSAGE_BINORMAL => b"BINORMAL\0",
        D3DDECLUSAGE_TESSFACTOR => b"TESSFACTOR\0",
        D3DDECLUSAGE_POSITIONT => b"POSITIONT\0",
        D3DDECLUSAGE_COLOR => b"COLOR\0",
        D3DDECLUSAGE_FOG => b"FOG\0",
        D3DDECLUSAGE_DEPTH => b"DEPTH\0",
        D3DDECLUSAGE_SAMPLE => b"SAMPLE\0",
        _ => b"UNKNOWN\0",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_common_render_target_format() {
        let dxgi = d3d_format_to_dxgi(D3DFMT_A8R8G8B8).unwrap();
        assert_eq!(dxgi, DXGI_FORMAT_B8G8R8A8_UNORM);
        assert_eq!(dxgi_format_to_d3d(dxgi), D3DFMT_A8R8G8B8);
    }

    #[test]
    fn depth_formats_pick_typeless_resource_and_typed_view() {
        let dxgi = d3d_format_to_dxgi(D3DFMT_D24S8).unwrap();
        assert_eq!(dxgi, DXGI_FORMAT_R24G8_TYPELESS);
        assert_eq!(dxgi_dsv_format(dxgi), DXGI_FORMAT_D24_UNORM_S8_UINT);
    }

    #[test]
    fn unsupported_fourcc_format_reports_none() {
        assert!(d3d_format_to_dxgi(D3DFMT_UYVY).is_none());
    }
}
