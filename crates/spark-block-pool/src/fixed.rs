use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::BytesMut;
use parking_lot::{Condvar, Mutex};

use crate::{
    block::{Block, BlockRecycler, zeroed_region},
    error::{BufferError, Result},
    provider::BlockProvider,
};

/// `FixedSizePool` 提供单一块尺寸、容量受限、可阻塞等待的内存块池。
///
/// # 模块角色（Why）
/// - 为高频序列化场景预留固定数量的定长块，池耗尽时让生产者**阻塞等待**而不是无界增长内存，
///   形成天然的背压；
/// - 作为 [`SizeRoutedPool`](crate::SizeRoutedPool) 的子池，被多尺寸路由按首个适配原则选用。
///
/// # 核心机制（How）
/// - 构造时一次性分配 `block_size × block_count` 字节的连续区域，再用 `BytesMut::split_to`
///   切分为 `block_count` 个互不重叠的块，全部放入自由链表；
/// - 自由链表与唤醒信号合并为一个有界阻塞队列：`parking_lot::Mutex<FreeList>` + `Condvar`。
///   租借在锁内“等待后出队”，归还在锁内“入队后唤醒”，许可数永远不会超过链表中真实存在的块；
/// - 借出的块携带指向共享状态的回收句柄；空闲槽位不持有句柄，因此不存在引用循环。
///
/// # 契约说明（What）
/// - **前置条件**：`block_size > 0`、`block_size % 4 == 0`、`block_count > 0`，否则构造返回
///   [`BufferError::Configuration`]；
/// - **并发**：任意数量线程可同时租借/归还；只有租借可能阻塞；
/// - **关闭**：[`close`](Self::close) 或丢弃池句柄后，等待者以 [`BufferError::PoolClosed`] 醒来；
///   已借出的块不会被强制收回，它们之后的归还只会释放对应内存。
///
/// # 设计权衡（Trade-offs）
/// - 使用 `parking_lot` 而非自旋锁：阻塞等待必须让出线程，自旋在长时间耗尽时会空耗 CPU；
/// - 每个槽位保留一个“已借出”标记，用于拒绝未借出槽位的重复归还，代价是每块一个字节。
pub struct FixedSizePool {
    inner: Arc<PoolInner>,
}

/// 池的统计快照。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub block_size: usize,
    pub block_count: usize,
    /// 当前位于自由链表中的块数。
    pub available: usize,
    /// 已借出、尚未归还的块数。
    pub outstanding: usize,
    /// 正在阻塞等待的租借调用数。
    pub waiting: usize,
    /// 累计成功租借次数。
    pub total_allocations: u64,
    /// 累计因超时或关闭而失败的租借次数。
    pub failed_acquisitions: u64,
    pub closed: bool,
}

impl FixedSizePool {
    /// 创建无限期等待的池。
    pub fn new(block_size: usize, block_count: usize) -> Result<Self> {
        Self::with_timeout(block_size, block_count, None)
    }

    /// 创建池，并指定 [`BlockProvider::alloc`] 使用的默认等待时长（`None` 表示无限期）。
    pub fn with_timeout(
        block_size: usize,
        block_count: usize,
        alloc_timeout: Option<Duration>,
    ) -> Result<Self> {
        if block_size == 0 || !block_size.is_multiple_of(4) {
            return Err(BufferError::configuration(format!(
                "block size {block_size} must be a positive multiple of 4"
            )));
        }
        if block_count == 0 {
            return Err(BufferError::configuration(format!(
                "block count for {block_size}-byte blocks must be positive"
            )));
        }
        let total = block_size
            .checked_mul(block_count)
            .filter(|total| *total <= isize::MAX as usize)
            .ok_or_else(|| {
                BufferError::configuration(format!(
                    "{block_count} blocks of {block_size} bytes overflow the address space"
                ))
            })?;

        let mut arena = zeroed_region(total).ok_or_else(|| {
            BufferError::configuration(format!(
                "cannot reserve {total} bytes for {block_count} blocks of {block_size} bytes"
            ))
        })?;
        let free: VecDeque<Slot> = (0..block_count)
            .map(|index| Slot {
                index,
                region: arena.split_to(block_size),
            })
            .collect();
        debug_assert!(arena.is_empty());

        tracing::debug!(
            block_size,
            block_count,
            total_bytes = total,
            ?alloc_timeout,
            "fixed-size block pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                block_size,
                block_count,
                alloc_timeout,
                state: Mutex::new(FreeList {
                    free,
                    lent: vec![false; block_count],
                    outstanding: 0,
                    waiting: 0,
                    closed: false,
                }),
                available: Condvar::new(),
                total_allocations: AtomicU64::new(0),
                failed_acquisitions: AtomicU64::new(0),
            }),
        })
    }

    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    pub fn block_count(&self) -> usize {
        self.inner.block_count
    }

    /// 默认等待时长，`None` 表示无限期。
    pub fn alloc_timeout(&self) -> Option<Duration> {
        self.inner.alloc_timeout
    }

    /// 能力探测：本池的块是否足以容纳 `size` 字节。不会发生租借。
    pub fn can_support(&self, size: usize) -> bool {
        self.inner.block_size >= size
    }

    /// 租借一个块，最多等待 `timeout`（`None` 表示无限期）。
    ///
    /// # 契约说明（What）
    /// - `size > block_size`：立即返回 [`BufferError::AllocationFailure`]；
    /// - 超时：返回 [`BufferError::Unavailable`]，不消耗任何块；
    /// - 池已关闭：返回 [`BufferError::PoolClosed`]。
    pub fn alloc_with_timeout(&self, size: usize, timeout: Option<Duration>) -> Result<Block> {
        let inner = &self.inner;
        if size > inner.block_size {
            return Err(BufferError::AllocationFailure {
                requested: size,
                largest: inner.block_size,
            });
        }

        // `Instant` 溢出的超长时限按无限期处理。
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut state = inner.state.lock();
        loop {
            if state.closed {
                inner.failed_acquisitions.fetch_add(1, Ordering::Relaxed);
                return Err(BufferError::PoolClosed {
                    block_size: inner.block_size,
                });
            }
            if let Some(slot) = state.free.pop_front() {
                state.lent[slot.index] = true;
                state.outstanding += 1;
                drop(state);
                inner.total_allocations.fetch_add(1, Ordering::Relaxed);
                let owner: Arc<dyn BlockRecycler> = self.inner.clone();
                return Ok(Block::new(slot.region, Some(slot.index), owner));
            }

            state.waiting += 1;
            let timed_out = match deadline {
                Some(deadline) => inner.available.wait_until(&mut state, deadline).timed_out(),
                None => {
                    inner.available.wait(&mut state);
                    false
                }
            };
            state.waiting -= 1;

            if timed_out && state.free.is_empty() && !state.closed {
                inner.failed_acquisitions.fetch_add(1, Ordering::Relaxed);
                let waited = timeout.unwrap_or_default();
                tracing::warn!(
                    block_size = inner.block_size,
                    ?waited,
                    "block pool exhausted, allocation timed out"
                );
                return Err(BufferError::Unavailable {
                    block_size: inner.block_size,
                    waited,
                });
            }
        }
    }

    /// 不等待的租借；池耗尽时立即返回 [`BufferError::Unavailable`]。
    pub fn try_alloc(&self, size: usize) -> Result<Block> {
        self.alloc_with_timeout(size, Some(Duration::ZERO))
    }

    /// 自由链表中当前的块数。
    pub fn available(&self) -> usize {
        self.inner.state.lock().free.len()
    }

    /// 已借出、尚未归还的块数。
    pub fn outstanding(&self) -> usize {
        self.inner.state.lock().outstanding
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            block_size: self.inner.block_size,
            block_count: self.inner.block_count,
            available: state.free.len(),
            outstanding: state.outstanding,
            waiting: state.waiting,
            total_allocations: self.inner.total_allocations.load(Ordering::Relaxed),
            failed_acquisitions: self.inner.failed_acquisitions.load(Ordering::Relaxed),
            closed: state.closed,
        }
    }

    /// 关闭池：唤醒全部等待者并释放空闲块。重复调用无副作用。
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.free.clear();
        self.inner.available.notify_all();
        tracing::debug!(
            block_size = self.inner.block_size,
            outstanding = state.outstanding,
            "fixed-size block pool closed"
        );
    }
}

impl BlockProvider for FixedSizePool {
    fn alloc(&self, size: usize) -> Result<Block> {
        self.alloc_with_timeout(size, self.inner.alloc_timeout)
    }

    fn dealloc(&self, block: Block) -> Result<()> {
        if !block.is_owned_by(&*self.inner) {
            tracing::warn!(
                block_size = self.inner.block_size,
                capacity = block.capacity(),
                "rejected block that was not lent by this pool"
            );
            return Err(BufferError::ForeignBlock);
        }
        self.inner.reclaim(block)
    }
}

impl Drop for FixedSizePool {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FixedSizePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedSizePool")
            .field("stats", &self.stats())
            .finish()
    }
}

/// 自由链表中的一个空闲槽位。
struct Slot {
    index: usize,
    region: BytesMut,
}

struct FreeList {
    free: VecDeque<Slot>,
    lent: Vec<bool>,
    outstanding: usize,
    waiting: usize,
    closed: bool,
}

struct PoolInner {
    block_size: usize,
    block_count: usize,
    alloc_timeout: Option<Duration>,
    state: Mutex<FreeList>,
    available: Condvar,
    total_allocations: AtomicU64,
    failed_acquisitions: AtomicU64,
}

impl BlockRecycler for PoolInner {
    fn reclaim(&self, block: Block) -> Result<()> {
        let (region, slot) = block.into_parts();
        let index = match slot {
            Some(index) if index < self.block_count && region.len() == self.block_size => index,
            _ => return Err(BufferError::ForeignBlock),
        };

        let mut state = self.state.lock();
        if !state.lent[index] {
            tracing::warn!(
                block_size = self.block_size,
                slot = index,
                "block returned for a slot that is not lent"
            );
            return Err(BufferError::ForeignBlock);
        }
        state.lent[index] = false;
        state.outstanding -= 1;
        if state.closed {
            return Ok(());
        }
        // 入队与唤醒处于同一临界区：被唤醒的租借者必然能看到这个块。
        state.free.push_back(Slot { index, region });
        self.available.notify_one();
        Ok(())
    }
}
