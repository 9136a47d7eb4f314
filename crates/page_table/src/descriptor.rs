use core::ptr::NonNull;

use intrusive_list::{container_of, Link};

use crate::pfn::PFN;

bitflags::bitflags! {
    /// A page's classification, plus the `FREE` bit buddy uses to
    /// cross-check its own free-list bookkeeping against page state.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        const FREE          = 1 << 0;
        const COMPOUND_HEAD = 1 << 1;
        const COMPOUND_TAIL = 1 << 2;
    }
}

/// Per-frame metadata. `order` is only meaningful while `COMPOUND_HEAD` is
/// set; only the head of a compound run carries a non-zero `refcount`.
pub struct PageDescriptor {
    pub(crate) link: Link,
    pfn: PFN,
    refcount: u16,
    flags: PageFlags,
    order: u8,
}

impl PageDescriptor {
    pub(crate) fn new(pfn: PFN, initially_free: bool) -> Self {
        Self {
            link: Link::new(),
            pfn,
            refcount: if initially_free { 0 } else { 1 },
            flags: PageFlags::empty(),
            order: 0,
        }
    }
}

/// A handle to one entry of the page descriptor array. Cheap to copy,
/// valid for as long as the owning [`crate::PageTable`] is alive.
#[derive(Clone, Copy)]
pub struct PagePtr(NonNull<PageDescriptor>);

impl PagePtr {
    pub(crate) fn new(ptr: NonNull<PageDescriptor>) -> Self {
        Self(ptr)
    }

    /// Recover the page owning a list link that was popped off one of
    /// buddy's free lists.
    ///
    /// # Safety
    /// `link` must be the `link` field of a live `PageDescriptor`.
    pub unsafe fn from_link(link: &mut Link) -> Self {
        Self(container_of!(link, PageDescriptor, link))
    }

    pub fn link_mut(&self) -> &mut Link {
        unsafe { &mut (*self.0.as_ptr()).link }
    }

    fn as_ref(&self) -> &PageDescriptor {
        unsafe { self.0.as_ref() }
    }

    #[allow(clippy::mut_from_ref)]
    fn as_mut(&self) -> &mut PageDescriptor {
        unsafe { &mut *self.0.as_ptr() }
    }

    pub fn pfn(&self) -> PFN {
        self.as_ref().pfn
    }

    pub fn flags(&self) -> PageFlags {
        self.as_ref().flags
    }

    pub fn order_of(&self) -> u32 {
        self.as_ref().order as u32
    }

    pub fn is_free(&self) -> bool {
        self.as_ref().flags.contains(PageFlags::FREE)
    }

    /// Mark/unmark the page as currently resident on a buddy free list.
    /// Only buddy calls this; it is not part of the facade operations
    /// other callers use.
    pub fn set_on_free_list(&self, free: bool) {
        self.as_mut().flags.set(PageFlags::FREE, free);
    }

    pub fn set_head(&self, order: u32) {
        debug_assert!(order < u8::MAX as u32);
        let d = self.as_mut();
        d.flags.remove(PageFlags::COMPOUND_TAIL);
        d.flags.insert(PageFlags::COMPOUND_HEAD);
        d.order = order as u8;
    }

    pub fn set_tail(&self) {
        let d = self.as_mut();
        d.flags.remove(PageFlags::COMPOUND_HEAD);
        d.flags.insert(PageFlags::COMPOUND_TAIL);
    }

    pub fn refcount(&self) -> u16 {
        self.as_ref().refcount
    }

    /// `ref(pp)`: bump the reference count.
    pub fn add_ref(&self) {
        self.as_mut().refcount += 1;
    }

    /// `deref(pp) -> new_count`. Asserts the count was not already zero.
    pub fn deref(&self) -> u16 {
        let d = self.as_mut();
        assert_ne!(d.refcount, 0, "deref() on a page with refcount already zero");
        d.refcount -= 1;
        d.refcount
    }
}
