use std::{fmt, mem, ptr, sync::Arc};

use bytes::BytesMut;

use crate::error::Result;

/// `BlockRecycler` 描述内存块在租借结束时的回收入口。
///
/// # 设计初衷（Why）
/// - [`BlockProvider`](crate::BlockProvider) 负责“租借”侧的抽象；归还时调用方不应关心块来自哪个池，
///   因此由块自身携带回收句柄，`Block::release` 与 `Drop` 都经由该句柄回到正确的提供者。
/// - 空闲槽位不持有句柄，只有借出的块才持有，对象图中不存在 `池 → 块 → 池` 的循环引用。
///
/// # 契约定义（What）
/// - **前置条件**：实现必须线程安全，且不得 panic，`Drop` 路径会调用本方法。
/// - **后置条件**：实现必须通过 [`Block::into_parts`] 消费传入的块（或将其转交给真正的所有者），
///   否则被丢弃的块会再次进入回收路径。
pub trait BlockRecycler: Send + Sync + 'static {
    /// 接收一个归还的块。
    fn reclaim(&self, block: Block) -> Result<()>;
}

/// 定长内存块。
///
/// # 教案式说明
/// - **意图 (Why)**：为游标视图提供一段长度恒定、可独占写入的连续字节区域，
///   并记住应当把它还给谁。
/// - **结构 (How)**：
///   - `region`：块的字节区域，池化提供者从一次性大分配中 `split_to` 得到，长度即容量；
///   - `slot`：在所属池中的槽位编号，非池化块为 `None`；
///   - `owner`：回收句柄，`None` 表示块已被拆解，`Drop` 不再触发回收。
/// - **契约 (What)**：
///   - 区域长度在块的整个生命周期内不变；
///   - 块只能被移动不能被复制，重复释放在类型层面不可表达；
///   - 未显式 [`release`](Self::release) 而被丢弃的块同样会归还给所属提供者。
pub struct Block {
    region: BytesMut,
    slot: Option<usize>,
    owner: Option<Arc<dyn BlockRecycler>>,
}

impl Block {
    /// 由提供者构造一个已借出的块。
    ///
    /// 供自定义 [`BlockProvider`](crate::BlockProvider) 实现使用；`region` 的当前长度即块容量。
    pub fn new(region: BytesMut, slot: Option<usize>, owner: Arc<dyn BlockRecycler>) -> Self {
        Self {
            region,
            slot,
            owner: Some(owner),
        }
    }

    /// 块容量（字节）。
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// 在所属池中的槽位编号；非池化块返回 `None`。
    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    /// 只读访问整个区域。
    pub fn as_slice(&self) -> &[u8] {
        &self.region
    }

    /// 可写访问整个区域；长度不可改变。
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.region
    }

    /// 判断该块是否由 `recycler` 借出。
    pub fn is_owned_by<R: BlockRecycler>(&self, recycler: &R) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|owner| ptr::addr_eq(Arc::as_ptr(owner), recycler as *const R))
    }

    /// 将块交还给借出它的提供者。
    pub fn release(self) -> Result<()> {
        match self.owner.clone() {
            Some(owner) => owner.reclaim(self),
            None => Ok(()),
        }
    }

    /// 拆解块，返回底层区域与槽位编号；之后 `Drop` 不再触发回收。
    pub fn into_parts(mut self) -> (BytesMut, Option<usize>) {
        self.owner = None;
        (mem::take(&mut self.region), self.slot)
    }
}

/// 分配一段 `len` 字节的清零区域；分配器无法满足时返回 `None` 而不是终止进程。
pub(crate) fn zeroed_region(len: usize) -> Option<BytesMut> {
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(len).ok()?;
    bytes.resize(len, 0);
    Some(BytesMut::from(bytes::Bytes::from(bytes)))
}

impl Drop for Block {
    fn drop(&mut self) {
        let Some(owner) = self.owner.take() else {
            return;
        };
        let block = Block {
            region: mem::take(&mut self.region),
            slot: self.slot,
            owner: Some(Arc::clone(&owner)),
        };
        if let Err(err) = owner.reclaim(block) {
            tracing::warn!(code = err.code(), error = %err, "dropped block was not reclaimed");
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("capacity", &self.capacity())
            .field("slot", &self.slot)
            .field("armed", &self.owner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        reclaimed: Mutex<Vec<(usize, Option<usize>)>>,
    }

    impl BlockRecycler for Recorder {
        fn reclaim(&self, block: Block) -> Result<()> {
            let (region, slot) = block.into_parts();
            self.reclaimed
                .lock()
                .expect("mutex poisoned")
                .push((region.len(), slot));
            Ok(())
        }
    }

    fn block_for(recorder: &Arc<Recorder>, len: usize, slot: Option<usize>) -> Block {
        let owner: Arc<dyn BlockRecycler> = recorder.clone();
        Block::new(BytesMut::zeroed(len), slot, owner)
    }

    #[test]
    fn release_routes_to_owner_once() {
        let recorder = Arc::new(Recorder::default());
        let block = block_for(&recorder, 16, Some(3));
        assert_eq!(block.capacity(), 16);
        block.release().expect("release");
        assert_eq!(*recorder.reclaimed.lock().unwrap(), vec![(16, Some(3))]);
    }

    #[test]
    fn drop_without_release_still_reclaims() {
        let recorder = Arc::new(Recorder::default());
        drop(block_for(&recorder, 8, None));
        assert_eq!(*recorder.reclaimed.lock().unwrap(), vec![(8, None)]);
    }

    #[test]
    fn into_parts_disarms_recycling() {
        let recorder = Arc::new(Recorder::default());
        let (region, slot) = block_for(&recorder, 4, Some(0)).into_parts();
        assert_eq!(region.len(), 4);
        assert_eq!(slot, Some(0));
        assert!(recorder.reclaimed.lock().unwrap().is_empty());
    }

    #[test]
    fn ownership_is_checked_by_identity() {
        let first = Arc::new(Recorder::default());
        let second = Recorder::default();
        let block = block_for(&first, 4, None);
        assert!(block.is_owned_by(&*first));
        assert!(!block.is_owned_by(&second));
    }

    #[test]
    fn region_is_writable_and_fixed_length() {
        let recorder = Arc::new(Recorder::default());
        let mut block = block_for(&recorder, 4, None);
        block.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(block.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(block.capacity(), 4);
    }
}
