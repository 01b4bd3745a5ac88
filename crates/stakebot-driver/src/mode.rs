//! 共享模式定义
//!
//! 控制循环之间共享的枚举状态（队伍颜色、进球通道覆盖、夹子策略、进球通道仲裁模式），
//! 以及它们的原子版本。每个枚举都以 `u8` 存储，读写无锁。

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// 可以无损编码为 `u8` 的枚举
pub trait U8Enum: Copy {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回默认值。
    fn from_u8(value: u8) -> Self;
    fn as_u8(self) -> u8;
}

/// 队伍颜色
///
/// 决定进球通道的"己方环"颜色：与之相反的颜色会被剔除。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TeamColor {
    #[default]
    Red = 0,
    Blue = 1,
}

impl TeamColor {
    pub fn opposite(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
        }
    }
}

impl U8Enum for TeamColor {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Blue,
            _ => Self::Red,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for TeamColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Blue => write!(f, "blue"),
        }
    }
}

/// 操作手对进球通道的直接控制
///
/// 非 `None` 时仲裁器进入 `OperatorOverride` 模式，颜色剔除暂停。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum IntakeOverride {
    /// 无覆盖（自动模式）
    #[default]
    None = 0,
    /// 两级正转
    Forward = 1,
    /// 两级反转
    Reverse = 2,
    /// 两级停止
    Stop = 3,
}

impl U8Enum for IntakeOverride {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Forward,
            2 => Self::Reverse,
            3 => Self::Stop,
            _ => Self::None,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 夹子控制策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ClampPolicy {
    /// 自动：距离门控 + 稳定延时
    #[default]
    Auto = 0,
    /// 手动：意图直接驱动气缸（操作手模式）
    Manual = 1,
}

impl U8Enum for ClampPolicy {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Manual,
            _ => Self::Auto,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 进球通道仲裁模式
///
/// 每个 tick 按固定优先级计算一次：
/// `Stalled > Staged > OperatorOverride > RingHold > RejectPulse > Normal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[repr(u8)]
pub enum IntakeMode {
    /// 基线：按 `intake_enabled` / `intake_reversed` 驱动
    #[default]
    Normal = 0,
    /// 正在剔除异色环
    RejectPulse = 1,
    /// 持环：检测到己方环后停止并锁存
    RingHold = 2,
    /// 操作手直接控制
    OperatorOverride = 3,
    /// 脚本接管（第一级电机由脚本给定功率）
    Staged = 4,
    /// 卡死：第一级电机由卡死检测器接管
    Stalled = 5,
}

impl U8Enum for IntakeMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::RejectPulse,
            2 => Self::RingHold,
            3 => Self::OperatorOverride,
            4 => Self::Staged,
            5 => Self::Stalled,
            _ => Self::Normal,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 原子枚举（用于线程间共享）
///
/// # 示例
///
/// ```rust
/// use stakebot_driver::mode::{AtomicEnum, TeamColor};
/// use std::sync::atomic::Ordering;
///
/// let team = AtomicEnum::new(TeamColor::Red);
/// team.set(TeamColor::Blue, Ordering::Release);
/// assert_eq!(team.get(Ordering::Acquire), TeamColor::Blue);
/// ```
pub struct AtomicEnum<T: U8Enum> {
    inner: AtomicU8,
    _marker: PhantomData<T>,
}

impl<T: U8Enum> AtomicEnum<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: AtomicU8::new(value.as_u8()),
            _marker: PhantomData,
        }
    }

    pub fn get(&self, ordering: Ordering) -> T {
        T::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, value: T, ordering: Ordering) {
        self.inner.store(value.as_u8(), ordering);
    }

    /// 设置新值并返回旧值
    pub fn swap(&self, value: T, ordering: Ordering) -> T {
        T::from_u8(self.inner.swap(value.as_u8(), ordering))
    }

    /// 比较并交换（Compare-and-Swap）
    ///
    /// 如果当前值等于 `current`，则设置为 `new` 并返回 true，否则返回 false
    pub fn compare_exchange(&self, current: T, new: T, success: Ordering, failure: Ordering) -> bool {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), success, failure)
            .is_ok()
    }
}

impl<T: U8Enum + fmt::Debug> fmt::Debug for AtomicEnum<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicEnum").field(&self.get(Ordering::Relaxed)).finish()
    }
}

impl<T: U8Enum + Default> Default for AtomicEnum<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// `f64` 的原子版本（按位存储在 `AtomicU64` 中）
#[derive(Debug, Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.bits.load(ordering))
    }

    pub fn store(&self, value: f64, ordering: Ordering) {
        self.bits.store(value.to_bits(), ordering);
    }
}
