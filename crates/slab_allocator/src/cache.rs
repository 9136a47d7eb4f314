use core::ptr::NonNull;

use intrusive_list::{container_of, Link, List};

use crate::slab::{objs_per_slab, SlabPtr};
use crate::PageSource;

pub const KMEM_CACHE_NAME_MAXLEN: usize = 32;

pub type CtorFn = fn(&mut [u8]);
pub type DtorFn = fn(&mut [u8]);

/// Slab counts plus live objects, as returned by [`CachePtr::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub full_slabs: usize,
    pub partial_slabs: usize,
    pub free_slabs: usize,
    pub objcnt: usize,
}

impl CacheStats {
    pub fn page_cnt(&self) -> usize {
        self.full_slabs + self.partial_slabs + self.free_slabs
    }
}

/// A named, fixed-object-size cache (spec's `kmem_cache`). Always reached
/// through a [`CachePtr`]; never moved once registered, since slabs hold
/// raw pointers back into its three lists.
pub struct KmemCache {
    pub(crate) link: Link,
    full: List,
    partial: List,
    free: List,
    objsize: u32,
    objs_per_slab: u32,
    ctor: Option<CtorFn>,
    dtor: Option<DtorFn>,
    name: [u8; KMEM_CACHE_NAME_MAXLEN],
    name_len: u8,
}

impl KmemCache {
    pub(crate) fn new(name: &str, objsize: u32, objs_per_slab: u32, ctor: Option<CtorFn>, dtor: Option<DtorFn>) -> Self {
        let mut buf = [0u8; KMEM_CACHE_NAME_MAXLEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(KMEM_CACHE_NAME_MAXLEN);
        buf[..len].copy_from_slice(&bytes[..len]);

        Self {
            link: Link::new(),
            full: List::new(),
            partial: List::new(),
            free: List::new(),
            objsize,
            objs_per_slab,
            ctor,
            dtor,
            name: buf,
            name_len: len as u8,
        }
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }

    pub fn objsize(&self) -> u32 {
        self.objsize
    }

    pub fn objs_per_slab(&self) -> u32 {
        self.objs_per_slab
    }
}

/// A handle to a registered [`KmemCache`]. Cheap to copy.
#[derive(Clone, Copy)]
pub struct CachePtr(NonNull<KmemCache>);

impl CachePtr {
    pub(crate) fn new(ptr: NonNull<KmemCache>) -> Self {
        Self(ptr)
    }

    /// Recover the cache owning a list link popped off the registry.
    ///
    /// # Safety
    /// `link` must be the `link` field of a live [`KmemCache`].
    pub(crate) unsafe fn from_link(link: &mut Link) -> Self {
        Self(container_of!(link, KmemCache, link))
    }

    pub(crate) fn link_mut(&self) -> &mut Link {
        unsafe { &mut (*self.0.as_ptr()).link }
    }

    pub(crate) fn as_raw(&self) -> *mut u8 {
        self.0.as_ptr() as *mut u8
    }

    fn as_ref(&self) -> &KmemCache {
        unsafe { self.0.as_ref() }
    }

    #[allow(clippy::mut_from_ref)]
    fn as_mut(&self) -> &mut KmemCache {
        unsafe { &mut *self.0.as_ptr() }
    }

    pub fn name(&self) -> &str {
        self.as_ref().name()
    }

    pub fn objsize(&self) -> u32 {
        self.as_ref().objsize
    }

    /// `kmem_cache_alloc`: returns one constructed object, requesting a
    /// fresh page from `source` if every existing slab is full.
    pub fn alloc(&self, source: &mut dyn PageSource) -> Option<NonNull<u8>> {
        let cache = self.as_mut();

        let slab = if let Some(link) = cache.partial.pop_first() {
            unsafe { SlabPtr::from_link(link) }
        } else if let Some(link) = cache.free.pop_first() {
            unsafe { SlabPtr::from_link(link) }
        } else {
            let page_kva = source.alloc_page()?;
            SlabPtr::init(page_kva, cache.objsize, cache.objs_per_slab)
        };

        let obj = slab.alloc_slot(cache.objsize, cache.ctor);

        if slab.is_full(cache.objs_per_slab) {
            cache.full.insert(slab.link_mut());
        } else {
            cache.partial.insert(slab.link_mut());
        }

        NonNull::new(obj)
    }

    /// `kmem_cache_free`: returns `obj` to the slab it came from, running
    /// the destructor immediately if the cache has one.
    pub fn free(&self, obj: NonNull<u8>) {
        let cache = self.as_mut();
        let slab = unsafe { SlabPtr::in_which(obj.as_ptr()) };

        if slab.is_full(cache.objs_per_slab) {
            cache.full.remove(slab.link_mut());
        } else {
            cache.partial.remove(slab.link_mut());
        }

        slab.free_slot(obj.as_ptr(), cache.objsize, cache.dtor);

        if slab.is_empty() {
            cache.free.insert(slab.link_mut());
        } else {
            cache.partial.insert(slab.link_mut());
        }
    }

    /// Return every slab this cache owns to `source`, draining all three
    /// lists. Used by `kmem_cache_remove`.
    pub(crate) fn release_all_pages(&self, source: &mut dyn PageSource) {
        let cache = self.as_mut();

        cache.full.drain_each(|link| {
            let slab = unsafe { SlabPtr::from_link(link) };
            source.free_page(slab.page_kva());
        });
        cache.partial.drain_each(|link| {
            let slab = unsafe { SlabPtr::from_link(link) };
            source.free_page(slab.page_kva());
        });
        cache.free.drain_each(|link| {
            let slab = unsafe { SlabPtr::from_link(link) };
            source.free_page(slab.page_kva());
        });
    }

    /// `kmem_cache_stats`: slab counts per list plus live object count.
    pub fn stats(&self) -> CacheStats {
        let cache = self.as_mut();
        let full_slabs = cache.full.count();
        let partial_slabs = cache.partial.count();
        let free_slabs = cache.free.count();

        // Every full slab contributes exactly `objs_per_slab` live objects;
        // partial slabs vary, so those are summed by a non-destructive walk.
        let mut partial_active = 0usize;
        cache.partial.for_each(|link| {
            let slab = unsafe { SlabPtr::from_link(link) };
            partial_active += slab.active() as usize;
        });

        CacheStats {
            full_slabs,
            partial_slabs,
            free_slabs,
            objcnt: full_slabs * cache.objs_per_slab as usize + partial_active,
        }
    }
}
