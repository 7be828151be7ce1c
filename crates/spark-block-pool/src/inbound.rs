use bytes::Buf;

use crate::{
    block::Block,
    codec::BinaryWriter,
    error::{BufferError, Result},
    provider::BlockProvider,
};

/// `InboundView` 是向前生长的游标视图：数据从前往后写入，再从前往后消费。
///
/// # 设计动机（Why）
/// - 解码路径需要把传输层收到的字节先追加进块，再按字段逐个读出；
///   读写游标都只向前推进，块本身在整个消息生命周期内复用，不产生额外堆分配。
///
/// # 结构设计（How）
/// - `write_cursor`：已写入字节数；`read_cursor`：已消费字节数；
/// - 所有读取经由 `prepare_reading` 校验边界，所有写入经由 [`BinaryWriter::prepare_writing`]。
///
/// # 契约说明（What）
/// - **不变量**：`0 <= read_cursor <= write_cursor <= capacity`，任何失败的调用都不移动游标；
/// - 读取越过写游标返回 [`BufferError::OutOfRange`]；写入越过容量返回 [`BufferError::OutOfCapacity`]；
/// - [`release`](Self::release) 后除再次 `release` 外的所有操作返回 [`BufferError::Released`]；
///   视图被丢弃时，其持有的 [`Block`] 随之归还给提供者。
pub struct InboundView {
    block: Option<Block>,
    write_cursor: usize,
    read_cursor: usize,
}

impl InboundView {
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

    /// 包装一个已经租借到的块，游标从零开始。
    pub fn from_block(block: Block) -> Self {
        Self {
            block: Some(block),
            write_cursor: 0,
            read_cursor: 0,
        }
    }

    /// 块容量（字节）。
    pub fn capacity(&self) -> Result<usize> {
        self.block().map(Block::capacity)
    }

    /// 已写入的字节数（写游标）。
    pub fn data_count(&self) -> Result<usize> {
        self.block()?;
        Ok(self.write_cursor)
    }

    /// 已消费的字节数（读游标）。
    pub fn read_position(&self) -> Result<usize> {
        self.block()?;
        Ok(self.read_cursor)
    }

    /// 已写入但尚未消费的字节数。
    pub fn remaining(&self) -> Result<usize> {
        self.block()?;
        Ok(self.write_cursor - self.read_cursor)
    }

    /// 块是否已经归还。
    pub fn is_released(&self) -> bool {
        self.block.is_none()
    }

    /// 两个游标归零，继续使用同一块，不经过提供者。
    pub fn reset(&mut self) -> Result<()> {
        self.block()?;
        self.write_cursor = 0;
        self.read_cursor = 0;
        Ok(())
    }

    /// 在读游标处窥视 `count` 字节，不推进游标。
    pub fn slice(&self, count: usize) -> Result<&[u8]> {
        let block = self.block()?;
        self.check_readable(count)?;
        Ok(&block.as_slice()[self.read_cursor..self.read_cursor + count])
    }

    /// 写游标之后尚未使用的区域，供传输层直接写入；随后以 [`commit`](Self::commit) 宣告写入量。
    pub fn spare_capacity_mut(&mut self) -> Result<&mut [u8]> {
        let start = self.write_cursor;
        let block = self.block.as_mut().ok_or(BufferError::Released)?;
        Ok(&mut block.as_mut_slice()[start..])
    }

    /// 宣告经由 [`spare_capacity_mut`](Self::spare_capacity_mut) 写入了 `count` 字节。
    pub fn commit(&mut self, count: usize) -> Result<()> {
        self.prepare_writing(count).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.prepare_reading(1)?.get_u8())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.prepare_reading(2)?.get_i16())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.prepare_reading(4)?.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.prepare_reading(8)?.get_i64())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(self.prepare_reading(4)?.get_f32())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(self.prepare_reading(8)?.get_f64())
    }

    /// 读取单字节布尔值，非零即真。
    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_u8().map(|value| value != 0)
    }

    /// 读取长度前缀字符串。
    ///
    /// 长度为 `0` 时返回空串且只消费前缀；负长度或非法 UTF-8 返回错误，读游标回到调用前的位置。
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.read_cursor;
        let length = self.read_i32()?;
        let decoded = match usize::try_from(length) {
            Ok(0) => Ok(String::new()),
            Ok(len) => self.prepare_reading(len).and_then(|bytes| {
                std::str::from_utf8(bytes)
                    .map(str::to_owned)
                    .map_err(|_| BufferError::InvalidUtf8 { length: len })
            }),
            Err(_) => Err(BufferError::MalformedString { length }),
        };
        if decoded.is_err() {
            self.read_cursor = start;
        }
        decoded
    }

    /// 复制出 `count` 字节，返回值与块不再共享内存。
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        Ok(self.prepare_reading(count)?.to_vec())
    }

    /// 归还块。重复调用无副作用。
    pub fn release(&mut self) -> Result<()> {
        self.write_cursor = 0;
        self.read_cursor = 0;
        match self.block.take() {
            Some(block) => block.release(),
            None => Ok(()),
        }
    }

    fn block(&self) -> Result<&Block> {
        self.block.as_ref().ok_or(BufferError::Released)
    }

    fn check_readable(&self, count: usize) -> Result<()> {
        let available = self.write_cursor - self.read_cursor;
        if count > available {
            return Err(BufferError::OutOfRange {
                requested: count,
                available,
            });
        }
        Ok(())
    }

    fn prepare_reading(&mut self, count: usize) -> Result<&[u8]> {
        let block = self.block.as_ref().ok_or(BufferError::Released)?;
        let available = self.write_cursor - self.read_cursor;
        if count > available {
            return Err(BufferError::OutOfRange {
                requested: count,
                available,
            });
        }
        let start = self.read_cursor;
        self.read_cursor += count;
        Ok(&block.as_slice()[start..start + count])
    }
}

impl BinaryWriter for InboundView {
    fn prepare_writing(&mut self, count: usize) -> Result<&mut [u8]> {
        let block = self.block.as_mut().ok_or(BufferError::Released)?;
        let remaining = block.capacity() - self.write_cursor;
        if count > remaining {
            return Err(BufferError::OutOfCapacity {
                requested: count,
                remaining,
            });
        }
        let start = self.write_cursor;
        self.write_cursor += count;
        Ok(&mut block.as_mut_slice()[start..start + count])
    }
}

impl std::fmt::Debug for InboundView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundView")
            .field("block", &self.block)
            .field("write_cursor", &self.write_cursor)
            .field("read_cursor", &self.read_cursor)
            .finish()
    }
}
