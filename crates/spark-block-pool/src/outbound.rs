use crate::{
    block::Block,
    codec::BinaryWriter,
    error::{BufferError, Result},
    provider::BlockProvider,
};

/// `OutboundView` 是向后生长的游标视图：每次写入都落在已写数据之前。
///
/// # 设计动机（Why）
/// - 组帧时消息体先于报头确定，从块尾部向前写入即可最后补上长度与报头，
///   无需预估偏移或二次拷贝。
///
/// # 契约说明（What）
/// - 游标初始等于容量，写入 `n` 字节后减少 `n`；有效数据恒为 `[cursor, capacity)`；
/// - **写入顺序**：先写入的字段在最终字节序列中位于后写入字段之后，
///   即 `add_i32(7); add_i32(9)` 得到的数据以 `9` 开头；
/// - 单个字段内部仍保持大端与“前缀在前”的布局，见 [`BinaryWriter`]；
/// - 空间不足返回 [`BufferError::OutOfCapacity`] 且游标不动；
///   [`release`](Self::release) 后的操作返回 [`BufferError::Released`]。
pub struct OutboundView {
    block: Option<Block>,
    cursor: usize,
}

impl OutboundView {
    /// 未指定尺寸时向提供者申请的块大小。
    pub const DEFAULT_BLOCK_SIZE: usize = 1024;

    /// 申请一个 [`DEFAULT_BLOCK_SIZE`](Self::DEFAULT_BLOCK_SIZE) 字节的块并包装为视图。
    pub fn new(provider: &dyn BlockProvider) -> Result<Self> {
        Self::with_block_size(provider, Self::DEFAULT_BLOCK_SIZE)
    }

    /// 申请一个至少 `block_size` 字节的块并包装为视图。
    pub fn with_block_size(provider: &dyn BlockProvider, block_size: usize) -> Result<Self> {
        provider.alloc(block_size).map(Self::from_block)
    }

    /// 包装一个已经租借到的块，游标位于块尾。
    pub fn from_block(block: Block) -> Self {
        let cursor = block.capacity();
        Self {
            block: Some(block),
            cursor,
        }
    }

    /// 块容量（字节）。
    pub fn capacity(&self) -> Result<usize> {
        self.block().map(Block::capacity)
    }

    /// 当前游标位置，也是尚可写入的字节数。
    pub fn cursor(&self) -> Result<usize> {
        self.block()?;
        Ok(self.cursor)
    }

    /// 已写入的字节数。
    pub fn data_count(&self) -> Result<usize> {
        Ok(self.block()?.capacity() - self.cursor)
    }

    /// 已写入的连续字节 `[cursor, capacity)`，可直接交给传输层发送。
    pub fn data(&self) -> Result<&[u8]> {
        Ok(&self.block()?.as_slice()[self.cursor..])
    }

    /// 块是否已经归还。
    pub fn is_released(&self) -> bool {
        self.block.is_none()
    }

    /// 游标回到块尾，丢弃已写数据，继续使用同一块。
    pub fn reset(&mut self) -> Result<()> {
        self.cursor = self.block()?.capacity();
        Ok(())
    }

    /// 归还块。重复调用无副作用。
    pub fn release(&mut self) -> Result<()> {
        self.cursor = 0;
        match self.block.take() {
            Some(block) => block.release(),
            None => Ok(()),
        }
    }

    fn block(&self) -> Result<&Block> {
        self.block.as_ref().ok_or(BufferError::Released)
    }
}

impl BinaryWriter for OutboundView {
    /// 在当前数据之前预留 `count` 字节。
    fn prepare_writing(&mut self, count: usize) -> Result<&mut [u8]> {
        let block = self.block.as_mut().ok_or(BufferError::Released)?;
        if count > self.cursor {
            return Err(BufferError::OutOfCapacity {
                requested: count,
                remaining: self.cursor,
            });
        }
        self.cursor -= count;
        let start = self.cursor;
        Ok(&mut block.as_mut_slice()[start..start + count])
    }
}

impl std::fmt::Debug for OutboundView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundView")
            .field("block", &self.block)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::UnpooledProvider;

    fn view(size: usize) -> OutboundView {
        OutboundView::with_block_size(&UnpooledProvider::new(), size).unwrap()
    }

    #[test]
    fn later_fields_precede_earlier_ones() {
        let mut v = view(16);
        v.add_i32(7).unwrap();
        v.add_i32(9).unwrap();
        assert_eq!(v.data().unwrap(), &[0, 0, 0, 9, 0, 0, 0, 7]);
        assert_eq!(v.cursor(), Ok(8));
        assert_eq!(v.data_count(), Ok(8));
    }

    #[test]
    fn string_layout_is_prefix_first() {
        let mut v = view(16);
        v.add_string("ab").unwrap();
        assert_eq!(v.data().unwrap(), &[0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn overflow_leaves_cursor_untouched() {
        let mut v = view(6);
        v.add_i32(1).unwrap();
        assert_eq!(
            v.add_i32(2).unwrap_err(),
            BufferError::OutOfCapacity {
                requested: 4,
                remaining: 2
            }
        );
        assert_eq!(v.cursor(), Ok(2));
        v.add_i16(3).unwrap();
        assert_eq!(v.cursor(), Ok(0));
    }

    #[test]
    fn reset_rewinds_to_the_end_of_the_block() {
        let mut v = view(8);
        v.add_i64(-1).unwrap();
        v.reset().unwrap();
        assert_eq!(v.cursor(), Ok(8));
        assert!(v.data().unwrap().is_empty());
    }

    #[test]
    fn release_is_idempotent_and_final() {
        let provider = UnpooledProvider::new();
        let mut v = OutboundView::new(&provider).unwrap();
        assert_eq!(v.cursor(), Ok(OutboundView::DEFAULT_BLOCK_SIZE));
        v.release().unwrap();
        v.release().unwrap();
        assert_eq!(provider.stats().outstanding, 0);
        assert_eq!(v.data().unwrap_err(), BufferError::Released);
        assert_eq!(v.cursor(), Err(BufferError::Released));
        assert_eq!(v.data_count(), Err(BufferError::Released));
        assert_eq!(v.capacity(), Err(BufferError::Released));
        assert_eq!(v.reset(), Err(BufferError::Released));
        assert_eq!(v.add_u8(0), Err(BufferError::Released));
    }
}
