use core::fmt;
use core::ops::{Add, Sub};

/// Zero-based physical page frame number.
#[repr(transparent)]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct PFN(u32);

impl From<PFN> for usize {
    fn from(v: PFN) -> Self {
        v.0 as usize
    }
}

impl From<PFN> for u32 {
    fn from(v: PFN) -> Self {
        v.0
    }
}

impl From<u32> for PFN {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<usize> for PFN {
    fn from(v: usize) -> Self {
        Self(v as u32)
    }
}

impl Sub for PFN {
    type Output = u32;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

impl Add<u32> for PFN {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        PFN(self.0 + rhs)
    }
}

impl fmt::Debug for PFN {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PFN({:#x})", self.0)
    }
}
