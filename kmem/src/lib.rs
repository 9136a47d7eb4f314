#![cfg_attr(not(test), no_std)]

pub use buddy_allocator::{BuddyAllocator, MAX_NORMAL_PFN, MAX_ORDER};
pub use page_table::{PageDescriptor, PageFlags, PagePtr, PageTable, PAGE_SIZE, PAGE_SIZE_BITS, PFN};
pub use slab_allocator::{objs_per_slab as slab_objs_per_slab, CachePtr, CacheStats, CtorFn, DtorFn, KmemCache, KMEM_CACHE_NAME_MAXLEN};

use slab_allocator::{PageSource, SlabAllocator};

/// Adapts [`BuddyAllocator`] to the slab layer's page-source seam,
/// translating between kernel virtual addresses and pfns via the
/// [`PageTable`] the buddy allocator owns. This is the glue spec.md §4.E
/// calls the initialization driver.
pub struct BuddyPageSource {
    buddy: BuddyAllocator,
}

impl BuddyPageSource {
    pub fn buddy(&self) -> &BuddyAllocator {
        &self.buddy
    }

    pub fn buddy_mut(&mut self) -> &mut BuddyAllocator {
        &mut self.buddy
    }
}

impl PageSource for BuddyPageSource {
    fn alloc_page(&mut self) -> Option<*mut u8> {
        let pp = self.buddy.alloc_pages(0)?;
        Some(self.buddy.table().kva_of(pp.pfn()))
    }

    fn free_page(&mut self, kva: *mut u8) {
        let pp = self.buddy.table().page_of_kva(kva);
        self.buddy.free_pages(pp, 0);
    }
}

/// Owns both allocator layers and wires them together. Construction order
/// follows spec.md §4.E exactly: the page table must already reflect
/// which frames are free, then buddy seeds its free lists from it, then
/// the slab layer bootstraps `cache_cache` on top — `kmem_cache_init`
/// never allocates through `cache_cache` itself during this sequence.
pub struct Kernel {
    slab: SlabAllocator<BuddyPageSource>,
}

impl Kernel {
    pub fn new(table: PageTable) -> Self {
        let buddy = BuddyAllocator::new(table);
        let source = BuddyPageSource { buddy };
        let slab = SlabAllocator::new(source);
        log::info!("kmem: buddy and slab layers initialized");
        Self { slab }
    }

    fn buddy(&self) -> &BuddyAllocator {
        self.slab.source().buddy()
    }

    fn buddy_mut(&mut self) -> &mut BuddyAllocator {
        self.slab.source_mut().buddy_mut()
    }

    /// `alloc_pages(order)`.
    pub fn alloc_pages(&mut self, order: u32) -> Option<PagePtr> {
        self.buddy_mut().alloc_pages(order)
    }

    /// `free_pages(pp, order)`.
    pub fn free_pages(&mut self, pp: PagePtr, order: u32) {
        self.buddy_mut().free_pages(pp, order);
    }

    pub fn num_free_pages(&self) -> usize {
        self.buddy().num_free_pages()
    }

    pub fn num_free_pages_order(&self, order: u32) -> u32 {
        self.buddy().num_free_pages_order(order)
    }

    /// `kmem_cache_create`.
    pub fn create_cache(
        &mut self,
        name: &str,
        objsize: u32,
        ctor: Option<CtorFn>,
        dtor: Option<DtorFn>,
    ) -> Option<CachePtr> {
        self.slab.create(name, objsize, ctor, dtor)
    }

    /// `kmem_cache_remove`.
    pub fn remove_cache(&mut self, cache: CachePtr) {
        self.slab.remove(cache);
    }

    /// `kmem_cache_alloc`.
    pub fn cache_alloc(&mut self, cache: CachePtr) -> Option<core::ptr::NonNull<u8>> {
        cache.alloc(self.slab.source_mut())
    }

    /// `kmem_cache_free`.
    pub fn cache_free(&mut self, cache: CachePtr, obj: core::ptr::NonNull<u8>) {
        cache.free(obj);
    }

    /// `kmem_cache_stats`.
    pub fn cache_stats(&self, cache: CachePtr) -> CacheStats {
        cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(npages: usize) -> Kernel {
        Kernel::new(PageTable::new(npages, |_| true))
    }

    #[test]
    fn buddy_and_slab_share_the_same_page_table() {
        let mut k = kernel(4);
        let before = k.num_free_pages();
        let cache = k.create_cache("shared", 32, None, None).unwrap();
        let obj = k.cache_alloc(cache).unwrap();
        assert_eq!(k.num_free_pages(), before - 1);
        k.cache_free(cache, obj);
        k.remove_cache(cache);
        assert_eq!(k.num_free_pages(), before);
    }

    #[test]
    fn buddy_alloc_pages_works_independently_of_slab() {
        let mut k = kernel(4);
        let pp = k.alloc_pages(1).unwrap();
        assert_eq!(k.num_free_pages(), 2);
        k.free_pages(pp, 1);
        assert_eq!(k.num_free_pages(), 4);
    }
}
