#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod cache;
mod slab;

use alloc::boxed::Box;
use core::ptr::NonNull;

use intrusive_list::{Link, List};

pub use cache::{CacheStats, CachePtr, CtorFn, DtorFn, KmemCache, KMEM_CACHE_NAME_MAXLEN};
pub use slab::objs_per_slab;

/// What the slab layer needs from whatever owns physical pages (spec §6's
/// external collaborator: page-frame table plus kva/pfn translation).
/// Component E wires this to [`buddy_allocator`]/[`page_table`].
pub trait PageSource {
    /// Obtain one fresh page, returning its kernel virtual address.
    fn alloc_page(&mut self) -> Option<*mut u8>;

    /// Return a page previously handed out by `alloc_page`.
    fn free_page(&mut self, kva: *mut u8);
}

/// Owns the cache registry and the self-bootstrapping `cache_cache`
/// (spec §3's "bootstrap self-reference"). Cache descriptors allocated
/// through [`Self::create`] live in slab-backed memory carved out by
/// `cache_cache` itself, exactly like any other cached object.
pub struct SlabAllocator<S> {
    /// Boxed so its address is stable even if `SlabAllocator` itself moves;
    /// the registry and every slab's list links hold raw pointers into it.
    cache_cache: Box<KmemCache>,
    registry: List,
    source: S,
}

impl<S: PageSource> SlabAllocator<S> {
    /// `kmem_cache_init`: bootstraps `cache_cache` and the registry,
    /// registering `cache_cache` itself. Never calls `create`/`alloc` — a
    /// descriptor cache initializes in place, per spec §4.E.
    pub fn new(source: S) -> Self {
        let objsize = core::mem::size_of::<KmemCache>() as u32;
        let per_slab = objs_per_slab(objsize);
        assert!(
            per_slab >= 2,
            "cache_cache descriptor ({objsize} bytes) does not fit at least 2 per slab"
        );

        let mut cache_cache = Box::new(KmemCache::new("cache_cache", objsize, per_slab, None, None));
        let self_ptr = unsafe { CachePtr::new(NonNull::new_unchecked(cache_cache.as_mut() as *mut KmemCache)) };

        let mut registry = List::new();
        registry.insert(self_ptr.link_mut());

        log::info!("kmem_cache_init: cache_cache objsize={objsize} objs_per_slab={per_slab}");

        Self {
            cache_cache,
            registry,
            source,
        }
    }

    /// The page source backing this allocator — component E uses this to
    /// reach the buddy layer it wired in underneath slab.
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn cache_cache_ptr(&mut self) -> CachePtr {
        unsafe { CachePtr::new(NonNull::new_unchecked(self.cache_cache.as_mut() as *mut KmemCache)) }
    }

    /// `kmem_cache_create`: allocate and register a new named cache.
    /// Rejects (returns `None`) object sizes that would leave fewer than
    /// two objects per slab, per the open-question resolution in spec §9.
    pub fn create(
        &mut self,
        name: &str,
        objsize: u32,
        ctor: Option<CtorFn>,
        dtor: Option<DtorFn>,
    ) -> Option<CachePtr> {
        let per_slab = objs_per_slab(objsize);
        if per_slab < 2 {
            log::error!(
                "kmem_cache_create: rejecting '{name}' (objsize={objsize} yields objs_per_slab={per_slab} < 2)"
            );
            return None;
        }

        let cache_cache = self.cache_cache_ptr();
        let raw = cache_cache.alloc(&mut self.source)?;
        let cache_ptr = raw.as_ptr() as *mut KmemCache;
        unsafe { cache_ptr.write(KmemCache::new(name, objsize, per_slab, ctor, dtor)) };

        let handle = unsafe { CachePtr::new(NonNull::new_unchecked(cache_ptr)) };
        self.registry.insert(handle.link_mut());

        log::info!("kmem_cache_create: '{name}' objsize={objsize} objs_per_slab={per_slab}");
        Some(handle)
    }

    /// Walks the registry looking for `cache` by link identity, the same
    /// `list_for_each` scan `kern/slab.c`'s `kmem_cache_remove` does over
    /// `cache_list` before touching anything.
    fn is_registered(&mut self, cache: CachePtr) -> bool {
        let target: *const Link = cache.link_mut();
        let mut found = false;
        self.registry.for_each(|link| {
            if core::ptr::eq(link, target) {
                found = true;
            }
        });
        found
    }

    /// `kmem_cache_remove`: return every slab's page to the page source,
    /// unregister the descriptor, and free it back to `cache_cache`.
    pub fn remove(&mut self, cache: CachePtr) {
        assert!(
            self.is_registered(cache),
            "kmem_cache_remove: '{}' is not a registered cache",
            cache.name()
        );

        self.registry.remove(cache.link_mut());
        cache.release_all_pages(&mut self.source);

        let cache_cache = self.cache_cache_ptr();
        let raw = unsafe { NonNull::new_unchecked(cache.as_raw()) };
        cache_cache.free(raw);

        log::info!("kmem_cache_remove: '{}'", cache.name());
    }
}
