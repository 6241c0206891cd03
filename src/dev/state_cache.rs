//! A generic cache of immutable ModernGfx state objects, keyed by the
//! descriptor that produced them. `prepare_draw` folds the pipeline
//! mirror into one of these descriptors and looks it up here instead of
//! creating a new rasterizer/blend/depth-stencil-state object on every
//! draw call; grounded on the `StateCache<D3D11_RASTERIZER_DESC1,
//! ID3D11RasterizerState1>` usage in `UpdateRasterizer` in the original
//! source, generalized per spec.md §4.3 to the other two state-object
//! kinds that follow the identical pattern.

use std::collections::HashMap;

/// A state object cache keyed by a hashable, equality-comparable
/// descriptor. `Desc` is typically a small `Copy` struct built by
/// bit-packing the handful of render states that actually affect a given
/// ModernGfx object (e.g. fill mode + cull mode + depth bias for the
/// rasterizer state), not the raw D3D11 descriptor struct itself, since
/// that doesn't implement `Hash`/`Eq`. `Obj` is whatever ref-counted
/// handle the backend hands back (a `comptr::ComPtr<...>` in practice);
/// only `Clone` is required here so the cache has no hard dependency on
/// COM.
pub struct StateCache<Desc, Obj> {
    entries: HashMap<Desc, Obj>,
}

impl<Desc, Obj> StateCache<Desc, Obj>
where
    Desc: std::hash::Hash + Eq + Copy,
    Obj: Clone,
{
    pub fn new() -> Self {
        StateCache {
            entries: HashMap::new(),
        }
    }

    /// Returns the cached object for `desc`, creating it with `build` on a
    /// miss. `build` receives the descriptor and returns a freshly created
    /// ModernGfx object or an error; a cache miss never poisons the cache
    /// on failure.
    pub fn get_or_create<E>(
        &mut self,
        desc: Desc,
        build: impl FnOnce(&Desc) -> Result<Obj, E>,
    ) -> Result<Obj, E> {
        if let Some(obj) = self.entries.get(&desc) {
            return Ok(obj.clone());
        }

        let obj = build(&desc)?;
        self.entries.insert(desc, obj.clone());
        Ok(obj)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<Desc, Obj> Default for StateCache<Desc, Obj>
where
    Desc: std::hash::Hash + Eq + Copy,
    Obj: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[derive(Hash, Eq, PartialEq, Clone, Copy)]
    struct Key(u32);

    #[test]
    fn second_lookup_with_same_descriptor_does_not_rebuild() {
        let mut cache: StateCache<Key, Rc<u32>> = StateCache::new();
        let mut builds = 0;

        for _ in 0..3 {
            let built = cache.get_or_create(Key(7), |_| -> Result<Rc<u32>, ()> {
                builds += 1;
                Ok(Rc::new(7))
            });
            assert!(built.is_ok());
        }

        assert_eq!(builds, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_descriptors_build_independently() {
        let mut cache: StateCache<Key, Rc<u32>> = StateCache::new();
        cache
            .get_or_create(Key(1), |_| -> Result<Rc<u32>, ()> { Ok(Rc::new(1)) })
            .unwrap();
        cache
            .get_or_create(Key(2), |_| -> Result<Rc<u32>, ()> { Ok(Rc::new(2)) })
            .unwrap();
        assert_eq!(cache.len(), 2);
    }
}
