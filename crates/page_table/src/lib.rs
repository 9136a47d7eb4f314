#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod descriptor;
mod pfn;
mod table;

pub use descriptor::{PageDescriptor, PageFlags, PagePtr};
pub use pfn::PFN;
pub use table::{PageTable, PAGE_SIZE, PAGE_SIZE_BITS};
