use core::ptr::NonNull;

use intrusive_list::{container_of, Link};
use page_table::PAGE_SIZE;

/// Free-table entry packing (spec numeric parameters): low 12 bits are the
/// byte offset from the slab's object region, bit 12 is the CONSTRUCTED
/// flag.
const OFFSET_BITS: u32 = 12;
const OFFSET_MASK: u16 = (1 << OFFSET_BITS) - 1;
const CONSTRUCTED: u16 = 1 << OFFSET_BITS;

fn pack(offset: u16, constructed: bool) -> u16 {
    (offset & OFFSET_MASK) | if constructed { CONSTRUCTED } else { 0 }
}

/// Object region alignment. `cache_cache` stores `KmemCache` descriptors
/// (which embed raw pointers) directly in slab slots, so the first object
/// must land on a boundary any such type can be written through; wider
/// alignments than this are not needed by anything this crate stores.
const OBJ_ALIGN: usize = core::mem::align_of::<usize>();

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// How many fixed-size objects of `objsize` bytes fit in one slab page,
/// alongside the header and a same-sized free table. Reserves up to
/// `OBJ_ALIGN - 1` bytes so the object region can always be rounded up to
/// [`OBJ_ALIGN`] without spilling past the page.
pub fn objs_per_slab(objsize: u32) -> u32 {
    let avail = PAGE_SIZE
        .saturating_sub(core::mem::size_of::<SlabHeader>())
        .saturating_sub(OBJ_ALIGN - 1);
    (avail / (objsize as usize + 2)) as u32
}

/// One page carved into fixed-size objects for a single cache. Lives at
/// the very start of the page it describes; the free table and object
/// region follow it in memory, sized by `objs_per_slab`/`objsize` which the
/// owning cache already knows, so they are not duplicated here.
#[repr(C)]
struct SlabHeader {
    link: Link,
    active: u32,
    start: *mut u8,
    fte_index: *mut u16,
}

/// A handle to a slab header embedded in a page. Cheap to copy.
#[derive(Clone, Copy)]
pub struct SlabPtr(NonNull<SlabHeader>);

impl SlabPtr {
    /// Write a fresh slab header into `page_kva` (the first byte of a page
    /// just obtained from the page source) and populate its free table
    /// with `n` entries `{flags=0, offset=i*objsize}` for `i` in `[0, n)`,
    /// per spec's "allocation of a fresh slab" rule.
    pub fn init(page_kva: *mut u8, objsize: u32, n: u32) -> Self {
        let header_size = core::mem::size_of::<SlabHeader>();
        let table_low = unsafe { page_kva.add(header_size) } as *mut u16;
        let raw_start = unsafe { (table_low as *mut u8).add(n as usize * 2) };
        let start = align_up(raw_start as usize, OBJ_ALIGN) as *mut u8;

        for i in 0..n {
            let entry_addr = unsafe { table_low.add(i as usize) };
            unsafe { entry_addr.write(pack((i * objsize) as u16, false)) };
        }

        let header = SlabHeader {
            link: Link::new(),
            active: 0,
            start,
            fte_index: table_low,
        };
        unsafe {
            (page_kva as *mut SlabHeader).write(header);
            Self(NonNull::new_unchecked(page_kva as *mut SlabHeader))
        }
    }

    /// Recover a slab from a pointer inside one of its objects by masking
    /// to page alignment (spec's `KMEM2SLAB`).
    ///
    /// # Safety
    /// `obj` must point inside a page that was handed out by
    /// [`Self::init`] and not yet returned to the page source.
    pub unsafe fn in_which(obj: *mut u8) -> Self {
        let page_kva = (obj as usize & !(PAGE_SIZE - 1)) as *mut SlabHeader;
        Self(NonNull::new_unchecked(page_kva))
    }

    /// Recover the slab owning a list link popped off a cache's lists.
    ///
    /// # Safety
    /// `link` must be the `link` field of a live [`SlabHeader`].
    pub unsafe fn from_link(link: &mut Link) -> Self {
        Self(container_of!(link, SlabHeader, link))
    }

    pub fn link_mut(&self) -> &mut Link {
        unsafe { &mut (*self.0.as_ptr()).link }
    }

    fn as_ref(&self) -> &SlabHeader {
        unsafe { self.0.as_ref() }
    }

    #[allow(clippy::mut_from_ref)]
    fn as_mut(&self) -> &mut SlabHeader {
        unsafe { &mut *self.0.as_ptr() }
    }

    pub fn page_kva(&self) -> *mut u8 {
        self.0.as_ptr() as *mut u8
    }

    pub fn active(&self) -> u32 {
        self.as_ref().active
    }

    pub fn is_empty(&self) -> bool {
        self.active() == 0
    }

    pub fn is_full(&self, n: u32) -> bool {
        self.active() == n
    }

    /// Pop one slot off the free table, run its constructor if this is its
    /// first use (CONSTRUCTED bit unset), and return the object pointer.
    pub fn alloc_slot(&self, objsize: u32, ctor: Option<fn(&mut [u8])>) -> *mut u8 {
        let hdr = self.as_mut();
        let entry = unsafe { hdr.fte_index.read() };
        let offset = entry & OFFSET_MASK;
        let constructed = entry & CONSTRUCTED != 0;

        let obj = unsafe { hdr.start.add(offset as usize) };
        hdr.fte_index = unsafe { hdr.fte_index.add(1) };
        hdr.active += 1;

        if !constructed {
            if let Some(ctor) = ctor {
                let slice = unsafe { core::slice::from_raw_parts_mut(obj, objsize as usize) };
                ctor(slice);
            }
        }
        obj
    }

    /// Run the destructor (if any), then push the slot back onto the free
    /// table with CONSTRUCTED set so a later alloc skips the constructor.
    pub fn free_slot(&self, obj: *mut u8, objsize: u32, dtor: Option<fn(&mut [u8])>) {
        let hdr = self.as_mut();
        assert!(hdr.active > 0, "freeing an object from an already-empty slab");

        if let Some(dtor) = dtor {
            let slice = unsafe { core::slice::from_raw_parts_mut(obj, objsize as usize) };
            dtor(slice);
        }

        let offset = unsafe { obj.offset_from(hdr.start) } as u16;
        hdr.fte_index = unsafe { hdr.fte_index.sub(1) };
        unsafe { hdr.fte_index.write(pack(offset, true)) };
        hdr.active -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;
    use std::boxed::Box;

    /// Whatever slot count the free table's size works out to, the object
    /// region must start pointer-aligned: callers (e.g. `cache_cache`)
    /// write pointer-containing structs directly into the first slot.
    #[test]
    fn object_region_is_always_pointer_aligned() {
        for objsize in [8u32, 17, 20, 32, 48, 63, 100] {
            let n = objs_per_slab(objsize);
            assert!(n >= 1, "objsize {objsize} should still fit at least one slot");

            let mut page = Box::new([0u8; PAGE_SIZE]);
            let slab = SlabPtr::init(page.as_mut_ptr(), objsize, n);
            let obj = slab.alloc_slot(objsize, None);
            assert_eq!(obj as usize % OBJ_ALIGN, 0, "misaligned object region for objsize {objsize}");
        }
    }
}
