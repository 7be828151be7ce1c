use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use crate::{
    block::{Block, BlockRecycler, zeroed_region},
    error::{BufferError, Result},
};

/// 单次非池化分配的上限，与 `Vec`/`BytesMut` 的容量上限一致。
const UNPOOLED_MAX_SIZE: usize = isize::MAX as usize;

/// `BlockProvider` 定义内存块的租借契约。
///
/// # 设计背景（Why）
/// - 编解码与传输代码只需“拿一块、用完还回去”，不应关心背后是逐次分配还是定长池；
/// - 视图在构造时接收 `&dyn BlockProvider`，由调用方显式注入，不存在全局默认提供者。
///
/// # 契约说明（What）
/// - `alloc(size)`：返回容量 `>= size` 的块（池化实现恰好等于块尺寸）。
///   永远无法满足时返回 [`BufferError::AllocationFailure`]；
///   池化实现在限时等待超时后返回 [`BufferError::Unavailable`]（或多尺寸池的 `OutOfMemory`）。
/// - `dealloc(block)`：把块还给当前提供者。不属于该提供者的块会被拒绝，
///   并经由块自身携带的回收句柄回到真正的所有者；常规归还请使用 [`Block::release`]。
/// - **线程安全**：实现必须是 `Send + Sync`，允许任意数量的线程并发调用。
pub trait BlockProvider: Send + Sync {
    /// 租借一个容量至少为 `size` 的块。
    fn alloc(&self, size: usize) -> Result<Block>;

    /// 归还由本提供者借出的块。
    fn dealloc(&self, block: Block) -> Result<()>;
}

impl<P: BlockProvider + ?Sized> BlockProvider for Arc<P> {
    fn alloc(&self, size: usize) -> Result<Block> {
        (**self).alloc(size)
    }

    fn dealloc(&self, block: Block) -> Result<()> {
        (**self).dealloc(block)
    }
}

/// 非池化提供者：每次调用都分配一段恰好 `size` 字节的新区域，归还即释放。
///
/// 适用于低频或尺寸高度离散、池化记账得不偿失的场景。克隆得到的句柄共享同一组计数。
#[derive(Clone, Default)]
pub struct UnpooledProvider {
    inner: Arc<UnpooledInner>,
}

/// [`UnpooledProvider`] 的计数快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnpooledStats {
    /// 累计分配次数。
    pub total_allocations: u64,
    /// 尚未归还的块数量。
    pub outstanding: usize,
}

impl UnpooledProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> UnpooledStats {
        UnpooledStats {
            total_allocations: self.inner.total_allocations.load(Ordering::Relaxed),
            outstanding: self.inner.outstanding.load(Ordering::Relaxed),
        }
    }
}

impl BlockProvider for UnpooledProvider {
    fn alloc(&self, size: usize) -> Result<Block> {
        let failure = BufferError::AllocationFailure {
            requested: size,
            largest: UNPOOLED_MAX_SIZE,
        };
        if size == 0 || size > UNPOOLED_MAX_SIZE {
            return Err(failure);
        }
        let Some(region) = zeroed_region(size) else {
            tracing::warn!(requested = size, "unpooled allocation refused by the allocator");
            return Err(failure);
        };
        self.inner.total_allocations.fetch_add(1, Ordering::Relaxed);
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);
        let owner: Arc<dyn BlockRecycler> = self.inner.clone();
        Ok(Block::new(region, None, owner))
    }

    fn dealloc(&self, block: Block) -> Result<()> {
        if !block.is_owned_by(&*self.inner) {
            tracing::warn!(
                capacity = block.capacity(),
                "rejected block returned to an unpooled provider that did not lend it"
            );
            return Err(BufferError::ForeignBlock);
        }
        self.inner.reclaim(block)
    }
}

#[derive(Default)]
struct UnpooledInner {
    total_allocations: AtomicU64,
    outstanding: AtomicUsize,
}

impl BlockRecycler for UnpooledInner {
    fn reclaim(&self, block: Block) -> Result<()> {
        // 区域随所有权结束而释放。
        drop(block.into_parts());
        // 只有本提供者借出的块会回到这里，每块恰好一次。
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }
}
