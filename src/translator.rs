//! The DX9→DX11 shader bytecode translator is an external collaborator
//! (spec.md §1): this crate only needs *something* behind the
//! `translate(src) -> Option<TargetBytecode>` seam, not a real shader
//! compiler. `PassthroughTranslator` performs the one piece of real work
//! that belongs on this side of the seam — finding the bytecode's length,
//! the way `dx9asm::byteCodeLength` does in the original — and otherwise
//! hands the raw DX9 tokens through unchanged.

/// Bytecode a `ShaderTranslator` hands back, ready to be compiled/consumed
/// by the ModernGfx backend. Opaque to everything except the translator
/// that produced it and the shader wrapper that consumes it.
#[derive(Debug, Clone)]
pub struct TargetBytecode {
    pub tokens: Vec<u32>,
}

/// Translates legacy DX9 shader bytecode (as handed to
/// `CreateVertexShader`/`CreatePixelShader`) into whatever form the
/// ModernGfx backend needs to compile or consume it.
pub trait ShaderTranslator {
    fn translate(&self, src: &[u32]) -> Option<TargetBytecode>;
}

/// Scans a DX9 shader token stream for its `D3DSIO_END` terminator and
/// returns the token count up to and including it, mirroring
/// `dx9asm::byteCodeLength` in the original source.
fn byte_code_length(src: &[u32]) -> Option<usize> {
    const D3DSIO_END: u32 = 0x0000_FFFF;

    // Skip the version token.
    src.iter()
        .enumerate()
        .skip(1)
        .find(|&(_, &tok)| (tok & 0xFFFF) == D3DSIO_END)
        .map(|(i, _)| i + 1)
}

/// The stand-in translator used until a real DX9→DX11 bytecode compiler is
/// plugged in. Verifies the token stream is well-formed and wraps it
/// as-is; never attempts to emit actual ModernGfx shader bytecode.
pub struct PassthroughTranslator;

impl ShaderTranslator for PassthroughTranslator {
    fn translate(&self, src: &[u32]) -> Option<TargetBytecode> {
        let len = byte_code_length(src)?;
        Some(TargetBytecode {
            tokens: src[..len].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_length_of_well_formed_stream() {
        let src = [0xFFFE_0300u32, 0x0000_0001, 0x0000_FFFF, 0xDEAD_BEEF];
        assert_eq!(byte_code_length(&src), Some(3));
    }

    #[test]
    fn rejects_stream_with_no_terminator() {
        let src = [0xFFFE_0300u32, 0x0000_0001];
        assert!(byte_code_length(&src).is_none());
        assert!(PassthroughTranslator.translate(&src).is_none());
    }
}
