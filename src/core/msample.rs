//! Multisample-type conversions between `D3DMULTISAMPLE_TYPE` and the
//! `(Count, Quality)` pair `DXGI_SAMPLE_DESC` uses.

use winapi::shared::d3d9types::*;
use winapi::shared::dxgitype::DXGI_SAMPLE_DESC;

/// Converts a legacy multisample type and quality level into a DXGI
/// sample descriptor. `D3DMULTISAMPLE_NONMASKABLE` has no direct DXGI
/// equivalent; callers fall back to 1 sample, quality 0 for it since
/// arbitrary non-power-of-two sample counts aren't expressible either way.
pub fn d3d9_to_dxgi_samples(ty: D3DMULTISAMPLE_TYPE, quality: u32) -> DXGI_SAMPLE_DESC {
    let count = match ty {
        D3DMULTISAMPLE_NONE => 1,
        D3DMULTISAMPLE_NONMASKABLE => 1,
        n => n as u32,
    };

    DXGI_SAMPLE_DESC {
        Count: count,
        Quality: quality,
    }
}

/// Converts a DXGI sample descriptor back to the `(D3DMULTISAMPLE_TYPE,
/// quality)` pair a resource's `GetDesc` should report.
pub fn dxgi_samples_to_d3d9(desc: DXGI_SAMPLE_DESC) -> (D3DMULTISAMPLE_TYPE, u32) {
    if desc.Count <= 1 {
        (D3DMULTISAMPLE_NONE, 0)
    } else {
        (desc.Count, desc.Quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_maps_to_single_sample() {
        let desc = d3d9_to_dxgi_samples(D3DMULTISAMPLE_NONE, 0);
        assert_eq!(desc.Count, 1);
        assert_eq!(desc.Quality, 0);
    }

    #[test]
    fn four_x_round_trips() {
        let desc = d3d9_to_dxgi_samples(4, 2);
        assert_eq!((desc.Count, desc.Quality), (4, 2));
        assert_eq!(dxgi_samples_to_d3d9(desc), (4, 2));
    }

    #[test]
    fn single_sample_descriptor_reports_multisample_none() {
        let desc = DXGI_SAMPLE_DESC { Count: 1, Quality: 0 };
        assert_eq!(dxgi_samples_to_d3d9(desc), (D3DMULTISAMPLE_NONE, 0));
    }
}
