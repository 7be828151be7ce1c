//! `pool_contract` 集成测试：验证 `FixedSizePool` 的容量、阻塞与关闭契约。
//!
//! # 测试目标（Why）
//! - 池绝不会同时借出超过 `block_count` 个块，且借出的块区域互不重叠；
//! - 耗尽时租借阻塞，直到有块归还、超时或池关闭；
//! - 统计快照与实际租借状态保持一致。
//!
//! # 结构安排（How）
//! - `capacity_law_holds_with_zero_timeout`：第 `block_count + 1` 次租借立即失败；
//! - `leased_regions_never_overlap`：逐块写入不同标记后检查互不覆盖；
//! - `contended_threads_all_eventually_succeed`：多线程争用少量块；
//! - 其余测试覆盖统计与关闭语义。

use std::{
    sync::{Arc, Barrier},
    thread,
    time::Duration,
};

use spark_block_pool::{BlockProvider, BufferError, FixedSizePool, PoolStats};

/// 零等待时限下，耗尽后的租借立即返回 `Unavailable`，归还后恢复。
#[test]
fn capacity_law_holds_with_zero_timeout() {
    let pool = FixedSizePool::with_timeout(64, 3, Some(Duration::ZERO)).expect("构建池失败");
    let held: Vec<_> = (0..3).map(|_| pool.alloc(64).expect("租借失败")).collect();

    let err = pool.alloc(1).unwrap_err();
    assert_eq!(
        err,
        BufferError::Unavailable {
            block_size: 64,
            waited: Duration::ZERO
        }
    );
    assert_eq!(err.code(), "pool.unavailable");
    assert_eq!(pool.outstanding(), 3);

    drop(held);
    assert_eq!(pool.available(), 3);
    assert!(pool.alloc(64).is_ok());
}

/// 借出的块各自占有独立区域。
#[test]
fn leased_regions_never_overlap() {
    let pool = FixedSizePool::new(8, 4).expect("构建池失败");
    let mut blocks: Vec<_> = (0..4).map(|_| pool.try_alloc(8).expect("租借失败")).collect();
    for (mark, block) in (0u8..).zip(blocks.iter_mut()) {
        block.as_mut_slice().fill(mark);
    }
    for (mark, block) in (0u8..).zip(blocks.iter()) {
        assert!(block.as_slice().iter().all(|b| *b == mark));
    }
}

/// 多个线程争用两块内存，全部租借最终成功，结束时没有块遗失。
#[test]
fn contended_threads_all_eventually_succeed() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 50;

    let pool = Arc::new(FixedSizePool::new(16, 2).expect("构建池失败"));
    let barrier = Arc::new(Barrier::new(THREADS));
    let workers: Vec<_> = (0..THREADS)
        .map(|id| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for round in 0..ROUNDS {
                    let mut block = pool.alloc(16).expect("阻塞租借不应失败");
                    block.as_mut_slice()[0] = (id + round) as u8;
                    assert!(pool.outstanding() <= 2);
                    block.release().expect("归还失败");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("工作线程 panic");
    }

    let stats = pool.stats();
    assert_eq!(stats.total_allocations, (THREADS * ROUNDS) as u64);
    assert_eq!(stats.outstanding, 0);
    assert_eq!(stats.available, 2);
    assert_eq!(stats.failed_acquisitions, 0);
}

/// 统计快照反映租借、失败与关闭。
#[test]
fn stats_track_the_lease_lifecycle() {
    let pool = FixedSizePool::with_timeout(4, 1, Some(Duration::ZERO)).expect("构建池失败");
    let block = pool.alloc(4).expect("租借失败");
    assert!(pool.alloc(4).is_err());
    drop(block);
    pool.close();
    assert_eq!(
        pool.stats(),
        PoolStats {
            block_size: 4,
            block_count: 1,
            available: 0,
            outstanding: 0,
            waiting: 0,
            total_allocations: 1,
            failed_acquisitions: 1,
            closed: true,
        }
    );
    assert_eq!(pool.alloc(4).unwrap_err().code(), "pool.closed");
}

/// 限时等待在时限内等到归还时成功。
#[test]
fn bounded_wait_succeeds_when_a_block_returns_in_time() {
    let pool = FixedSizePool::new(8, 1).expect("构建池失败");
    let held = pool.alloc(8).expect("租借失败");
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        held.release().expect("归还失败");
    });
    let block = pool
        .alloc_with_timeout(8, Some(Duration::from_secs(5)))
        .expect("应在时限内获得块");
    assert_eq!(block.slot(), Some(0));
    releaser.join().expect("归还线程 panic");
}
