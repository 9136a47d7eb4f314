use kmem::{Kernel, PageTable, MAX_ORDER};

fn kernel(npages: usize) -> Kernel {
    Kernel::new(PageTable::new(npages, |_| true))
}

/// S1 — buddy split/merge symmetry: allocating and freeing a single base
/// page should split one order-(MAX_ORDER-1) block all the way down and
/// then merge it all the way back up.
#[test]
fn buddy_split_and_merge_symmetry() {
    let mut k = kernel(1 << (MAX_ORDER - 1));
    assert_eq!(k.num_free_pages_order(MAX_ORDER - 1), 1);
    for order in 0..MAX_ORDER - 1 {
        assert_eq!(k.num_free_pages_order(order), 0);
    }

    let pp = k.alloc_pages(0).expect("order 0 alloc");
    for order in 0..MAX_ORDER - 1 {
        assert_eq!(k.num_free_pages_order(order), 1, "order {order} should hold the split remainder");
    }
    assert_eq!(k.num_free_pages_order(MAX_ORDER - 1), 0);

    k.free_pages(pp, 0);
    assert_eq!(k.num_free_pages_order(MAX_ORDER - 1), 1);
    for order in 0..MAX_ORDER - 1 {
        assert_eq!(k.num_free_pages_order(order), 0);
    }
}

/// S2 — constructor memoization: a slot's constructor runs once; freeing
/// without reconstructing replays whatever the destructor left behind.
#[test]
fn constructor_memoization() {
    fn ctor(buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = i as u8;
        }
    }
    fn dtor(buf: &mut [u8]) {
        let last = buf.len() - 1;
        buf[last] = last as u8;
    }

    let mut k = kernel(4);
    let cache = k.create_cache("memo", 20, Some(ctor), Some(dtor)).unwrap();

    let obj = k.cache_alloc(cache).unwrap();
    let bytes = unsafe { core::slice::from_raw_parts(obj.as_ptr(), 20) };
    assert_eq!(bytes, (0u8..20).collect::<Vec<_>>().as_slice());

    unsafe { *obj.as_ptr().add(19) = 0 };
    k.cache_free(cache, obj);

    let obj2 = k.cache_alloc(cache).unwrap();
    assert_eq!(obj2.as_ptr(), obj.as_ptr(), "freed slot should be reused");
    let bytes2 = unsafe { core::slice::from_raw_parts(obj2.as_ptr(), 20) };
    assert_eq!(bytes2, (0u8..20).collect::<Vec<_>>().as_slice(), "dtor restored byte 19");

    k.remove_cache(cache);
}

/// S3 — slab grouping: the first N allocations after bootstrap all share
/// one page-aligned prefix.
#[test]
fn slab_grouping() {
    let mut k = kernel(4);
    let cache = k.create_cache("group", 20, None, None).unwrap();

    let n = kmem::slab_objs_per_slab(20);
    let mut addrs = Vec::new();
    for _ in 0..n {
        addrs.push(k.cache_alloc(cache).unwrap().as_ptr() as usize);
    }

    let page_mask = !(kmem::PAGE_SIZE - 1);
    let first_page = addrs[0] & page_mask;
    for addr in &addrs {
        assert_eq!(addr & page_mask, first_page, "all N objects should share one slab page");
    }

    for addr in addrs {
        k.cache_free(cache, core::ptr::NonNull::new(addr as *mut u8).unwrap());
    }
    k.remove_cache(cache);
}

/// S4 — churn balance: a hundred rounds of alloc-1000/free-1000 leave the
/// cache empty and the page count unchanged from after the first round.
#[test]
fn churn_balance() {
    let mut k = kernel(64);
    let cache = k.create_cache("churn", 32, None, None).unwrap();

    let mut held = Vec::with_capacity(1000);
    for _ in 0..1000 {
        held.push(k.cache_alloc(cache).unwrap());
    }
    for obj in held.drain(..) {
        k.cache_free(cache, obj);
    }
    let page_cnt_after_first_round = k.cache_stats(cache).page_cnt();

    for _ in 0..99 {
        for _ in 0..1000 {
            held.push(k.cache_alloc(cache).unwrap());
        }
        for obj in held.drain(..) {
            k.cache_free(cache, obj);
        }
    }

    let stats = k.cache_stats(cache);
    assert_eq!(stats.objcnt, 0);
    assert_eq!(stats.page_cnt(), page_cnt_after_first_round);

    k.remove_cache(cache);
}

/// S5 — cache remove returns all pages: net free-page count is unchanged
/// by create/allocate/churn/free/remove.
#[test]
fn cache_remove_returns_all_pages() {
    let mut k = kernel(64);
    let before = k.num_free_pages();

    let cache = k.create_cache("roundtrip", 48, None, None).unwrap();
    let mut held = Vec::new();
    for _ in 0..50 {
        held.push(k.cache_alloc(cache).unwrap());
    }
    for obj in held.drain(..) {
        k.cache_free(cache, obj);
    }
    k.remove_cache(cache);

    assert_eq!(k.num_free_pages(), before);
}

/// S6 — buddy initial decomposition: 17 contiguous free pages starting at
/// pfn 0 must produce exactly one order-4 block and one order-0 block.
#[test]
fn buddy_initial_decomposition_of_seventeen_pages() {
    let k = kernel(17);
    assert_eq!(k.num_free_pages_order(4), 1);
    assert_eq!(k.num_free_pages_order(0), 1);
    for order in [1u32, 2, 3] {
        assert_eq!(k.num_free_pages_order(order), 0);
    }
    assert_eq!(k.num_free_pages(), 17);
}
