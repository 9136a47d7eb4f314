use intrusive_list::List;
use page_table::PagePtr;

/// One order's free list plus its run count (spec.md §3's `free_cnt[k]`).
pub struct FreeArea {
    free_list: List,
}

impl FreeArea {
    pub const fn new() -> Self {
        Self {
            free_list: List::new(),
        }
    }

    pub fn count(&self) -> u32 {
        self.free_list.count() as u32
    }

    pub fn get_free_pages(&mut self) -> Option<PagePtr> {
        self.free_list.pop_first().map(|link| {
            // SAFETY: every link on this list was inserted by `add_pages`
            // below, so it is the `link` field of a live `PageDescriptor`.
            let pp = unsafe { PagePtr::from_link(link) };
            pp.set_on_free_list(false);
            pp
        })
    }

    pub fn add_pages(&mut self, pp: PagePtr) {
        pp.set_on_free_list(true);
        self.free_list.insert(pp.link_mut());
    }

    pub fn del_pages(&mut self, pp: PagePtr) {
        debug_assert!(pp.is_free(), "removing a page the free area doesn't think is free");
        pp.set_on_free_list(false);
        self.free_list.remove(pp.link_mut());
    }
}
