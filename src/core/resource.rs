//! Shared state embedded in every resource wrapper (texture, surface,
//! buffer, vertex declaration): its resource kind, usage/pool, and the
//! *private* refcount the device bumps when it binds the resource into the
//! pipeline mirror.
//!
//! A resource is backed by two counters: the public one (`refs` on the
//! object itself, driven by `AddRef`/`Release` and collapsed by
//! `impl_iunknown!`) and the private one kept here. The application can
//! drop its last public reference to a render target that is still bound;
//! the object must survive until the device unbinds it. It is only ever
//! actually freed once both counters are at zero.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use winapi::shared::guiddef::GUID;

/// What kind of legacy resource a wrapper represents. Used for `GetType`
/// and for sanity-checking casts at the COM boundary (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Surface,
    Volume,
    Texture,
    VolumeTexture,
    CubeTexture,
    VertexBuffer,
    IndexBuffer,
}

/// Where a resource's backing memory nominally lives. `ModernGfx` has no
/// such distinction, so this is tracked purely to answer `GetDesc`/pool
/// queries faithfully; it has no effect on how the resource is actually
/// allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPool {
    Default,
    Managed,
    SystemMem,
    Scratch,
}

bitflags! {
    /// Legacy `D3DUSAGE_*` flags, kept as bits since a resource can be
    /// created with several at once (e.g. `RENDERTARGET | DYNAMIC` is
    /// invalid, but `DYNAMIC | WRITEONLY` is common for vertex buffers).
    pub struct UsageFlags: u32 {
        const RENDERTARGET    = 0x0000_0001;
        const DEPTHSTENCIL    = 0x0000_0002;
        const DYNAMIC         = 0x0000_0200;
        const WRITEONLY       = 0x0000_0008;
        const AUTOGENMIPMAP   = 0x0000_0400;
    }
}

/// Embedded in every resource wrapper struct alongside its public `refs`
/// counter. Carries the resource's static classification plus its private
/// refcount.
pub struct Resource {
    pub ty: ResourceType,
    pub pool: MemoryPool,
    pub usage: UsageFlags,
    priv_refs: AtomicU32,
    priority: AtomicU32,
    private_data: RefCell<Vec<(GUID, Vec<u8>)>>,
}

impl Resource {
    pub fn new(ty: ResourceType, pool: MemoryPool, usage: UsageFlags) -> Self {
        Resource {
            ty,
            pool,
            usage,
            priv_refs: AtomicU32::new(0),
            priority: AtomicU32::new(0),
            private_data: RefCell::new(Vec::new()),
        }
    }

    /// `IDirect3DResource9::SetPriority`. Only meaningful for managed
    /// resources in the original API; stored regardless so it reads back
    /// faithfully.
    pub fn set_priority(&self, priority: u32) -> u32 {
        self.priority.swap(priority, Ordering::SeqCst)
    }

    pub fn priority(&self) -> u32 {
        self.priority.load(Ordering::SeqCst)
    }

    /// `IDirect3DResource9::SetPrivateData`. Stores an opaque, app-supplied
    /// byte blob keyed by GUID; `RefCell` is enough since resources are not
    /// shared across threads without external synchronization (spec.md §5).
    pub fn set_private_data(&self, guid: GUID, data: &[u8]) {
        let mut slots = self.private_data.borrow_mut();
        if let Some(slot) = slots.iter_mut().find(|(g, _)| guid_eq(g, &guid)) {
            slot.1 = data.to_vec();
        } else {
            slots.push((guid, data.to_vec()));
        }
    }

    pub fn get_private_data(&self, guid: GUID, out: &mut [u8]) -> Option<u32> {
        let slots = self.private_data.borrow();
        let (_, data) = slots.iter().find(|(g, _)| guid_eq(g, &guid))?;

        let len = data.len();
        if out.len() >= len {
            out[..len].copy_from_slice(data);
        }
        Some(len as u32)
    }

    pub fn free_private_data(&self, guid: GUID) -> bool {
        let mut slots = self.private_data.borrow_mut();
        let before = slots.len();
        slots.retain(|(g, _)| !guid_eq(g, &guid));
        slots.len() != before
    }
}

fn guid_eq(a: &GUID, b: &GUID) -> bool {
    a.Data1 == b.Data1 && a.Data2 == b.Data2 && a.Data3 == b.Data3 && a.Data4 == b.Data4
}

/// Implemented by every resource wrapper type so the device can bump and
/// drop the private refcount without knowing the wrapper's concrete
/// layout, and so `impl_iunknown_resource!` can decide whether a public
/// `Release` reaching zero actually frees the object.
pub trait PrivateRefCounted {
    fn resource(&self) -> &Resource;

    /// Called when the device binds this resource into the pipeline
    /// mirror (e.g. `SetTexture`, `SetRenderTarget`).
    fn private_add_ref(&self) -> u32 {
        self.resource().priv_refs.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Called when the device unbinds this resource. Returns the new
    /// private refcount; the caller combines it with the public refcount
    /// to decide whether the object should now be torn down.
    fn private_release(&self) -> u32 {
        self.resource()
            .priv_refs
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1)
    }

    fn private_refs(&self) -> u32 {
        self.resource().priv_refs.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(Resource);
    impl PrivateRefCounted for Dummy {
        fn resource(&self) -> &Resource {
            &self.0
        }
    }

    #[test]
    fn private_refcount_tracks_binds_independent_of_public() {
        let d = Dummy(Resource::new(
            ResourceType::Texture,
            MemoryPool::Default,
            UsageFlags::empty(),
        ));
        assert_eq!(d.private_refs(), 0);
        d.private_add_ref();
        d.private_add_ref();
        assert_eq!(d.private_refs(), 2);
        d.private_release();
        assert_eq!(d.private_refs(), 1);
    }
}
