use std::ops::{BitOr, BitOrAssign};

/// 生成选项位集，参与生成缓存的键。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationFlags(u32);

impl GenerationFlags {
    /// 契约自身已实现的操作也改为远程转发。
    pub const IMPLEMENT_CONCRETE: GenerationFlags = GenerationFlags(0x01);

    pub const fn empty() -> Self {
        GenerationFlags(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        GenerationFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: GenerationFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: GenerationFlags) -> Self {
        GenerationFlags(self.0 | other.0)
    }
}

impl BitOr for GenerationFlags {
    type Output = GenerationFlags;

    fn bitor(self, rhs: GenerationFlags) -> GenerationFlags {
        self.union(rhs)
    }
}

impl BitOrAssign for GenerationFlags {
    fn bitor_assign(&mut self, rhs: GenerationFlags) {
        *self = self.union(rhs);
    }
}
