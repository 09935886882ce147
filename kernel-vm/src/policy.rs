//! 页面置换算法。
//!
//! 六种算法共用两个操作：每次成功翻译后的 [`update`](Policy::update)，
//! 和缺页时的 [`find_victim`](Policy::find_victim)。`find_victim` 返回
//! `Ok(None)` 表示帧预算还有空位已经占下，调用者直接向分配器要新帧；
//! `Ok(Some(vpn))` 是要换出去的牺牲页。
//!
//! 驻留窗口 `frames` 归地址空间所有，各算法只按自己的规矩解释它：
//! FIFO/时钟把它当环形队列，LRU 把它当栈，OPT 和 Random 只当集合用。

use crate::{refstr::RefString, VmError};
use machine::TranslationEntry;
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// 置换算法种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    /// 最优置换，要求预先录好的引用串。
    Opt,
    /// 先进先出。
    Fifo,
    /// 二次机会（时钟）。
    SecondChance,
    /// 增强二次机会，按 (use, dirty) 分级扫四轮。
    EnhancedSecondChance,
    /// 栈式 LRU。
    Lru,
    /// 随机挑一个，不算真算法。
    Random,
}

/// 算法实例，每个变体只带自己需要的状态。
pub enum Policy {
    /// 先进先出。`idx` 是下一个被覆盖的槽位。
    Fifo {
        /// 覆盖游标。
        idx: usize,
    },
    /// 二次机会。`idx` 是时钟指针。
    SecondChance {
        /// 时钟指针。
        idx: usize,
    },
    /// 增强二次机会。
    EnhancedSecondChance {
        /// 时钟指针。
        idx: usize,
    },
    /// 栈式 LRU，窗口从 `bottom` 起 `count` 项，栈底最旧。
    Lru {
        /// 栈底槽位。
        bottom: usize,
        /// 在栈里的页数。
        count: usize,
    },
    /// 最优置换。`idx` 只在首次填充阶段用。
    Opt {
        /// 首次填充游标。
        idx: usize,
        /// 回放中的引用串。
        refs: RefString,
    },
    /// 随机置换。
    Random {
        /// 首次填充游标。
        idx: usize,
        /// 确定性的伪随机源。
        rng: SmallRng,
    },
}

impl Policy {
    /// 建出 `kind` 的算法实例。OPT 必须带引用串。
    pub fn new(kind: PolicyKind, rng_seed: u64, refs: Option<RefString>) -> Result<Self, VmError> {
        Ok(match kind {
            PolicyKind::Fifo => Self::Fifo { idx: 0 },
            PolicyKind::SecondChance => Self::SecondChance { idx: 0 },
            PolicyKind::EnhancedSecondChance => Self::EnhancedSecondChance { idx: 0 },
            PolicyKind::Lru => Self::Lru { bottom: 0, count: 0 },
            PolicyKind::Opt => Self::Opt {
                idx: 0,
                refs: refs.ok_or(VmError::RecordUnderOpt)?,
            },
            PolicyKind::Random => Self::Random {
                idx: 0,
                rng: SmallRng::seed_from_u64(rng_seed),
            },
        })
    }

    /// 成功翻译后的结构维护：LRU 把页提到栈顶，OPT 推进引用串游标，
    /// 其余算法无事可做。
    pub fn update(&mut self, frames: &mut [Option<usize>], vpn: usize) -> Result<(), VmError> {
        match self {
            Self::Lru { bottom, count } => lru_touch(frames, *bottom, *count, vpn),
            Self::Opt { refs, .. } => refs.advance(vpn),
            _ => Ok(()),
        }
    }

    /// 为 `in_page` 腾地方。
    pub fn find_victim(
        &mut self,
        frames: &mut [Option<usize>],
        table: &mut [TranslationEntry],
        in_page: usize,
    ) -> Result<Option<usize>, VmError> {
        let cap = frames.len();
        match self {
            Self::Fifo { idx } => {
                let victim = frames[*idx];
                frames[*idx] = Some(in_page);
                *idx = (*idx + 1) % cap;
                Ok(victim)
            }
            Self::SecondChance { idx } => loop {
                match frames[*idx] {
                    None => {
                        frames[*idx] = Some(in_page);
                        *idx = (*idx + 1) % cap;
                        return Ok(None);
                    }
                    Some(page) if table[page].used => {
                        table[page].used = false;
                        *idx = (*idx + 1) % cap;
                    }
                    Some(page) => {
                        frames[*idx] = Some(in_page);
                        *idx = (*idx + 1) % cap;
                        return Ok(Some(page));
                    }
                }
            },
            Self::EnhancedSecondChance { idx } => enhanced_clock(idx, frames, table, in_page),
            Self::Lru { bottom, count } => {
                if *count < cap {
                    frames[(*bottom + *count) % cap] = Some(in_page);
                    *count += 1;
                    return Ok(None);
                }
                let victim = frames[*bottom];
                frames[*bottom] = Some(in_page);
                *bottom = (*bottom + 1) % cap;
                Ok(victim)
            }
            Self::Opt { idx, refs } => {
                if frames[*idx].is_none() {
                    frames[*idx] = Some(in_page);
                    *idx = (*idx + 1) % cap;
                    return Ok(None);
                }
                // 下一次使用离得最远的页出局；再也用不到的页直接出局。
                let mut farthest: Option<(usize, usize)> = None;
                let mut never_again = None;
                for (slot, page) in frames.iter().enumerate() {
                    let Some(page) = *page else { continue };
                    match refs.next_use(page) {
                        None => {
                            never_again = Some(slot);
                            break;
                        }
                        Some(at) => {
                            if farthest.map_or(true, |(best, _)| at > best) {
                                farthest = Some((at, slot));
                            }
                        }
                    }
                }
                let slot = never_again
                    .or_else(|| farthest.map(|(_, slot)| slot))
                    .ok_or(VmError::NoVictim)?;
                let victim = frames[slot];
                frames[slot] = Some(in_page);
                Ok(victim)
            }
            Self::Random { idx, rng } => {
                if frames[*idx].is_none() {
                    frames[*idx] = Some(in_page);
                    *idx = (*idx + 1) % cap;
                    return Ok(None);
                }
                let slot = rng.gen_range(0..cap);
                let victim = frames[slot];
                frames[slot] = Some(in_page);
                Ok(victim)
            }
        }
    }
}

/// 增强二次机会的四轮扫描。
///
/// 第 1、3 轮找 (use=0, dirty=0)，第 2、4 轮找 (use=0, dirty=1)，
/// 第 2 轮顺手清 use 位。空槽位只在第 1 轮算首次填充，之后跳过。
/// 四轮之内必有结果，走完四轮说明内核出了 bug。
fn enhanced_clock(
    idx: &mut usize,
    frames: &mut [Option<usize>],
    table: &mut [TranslationEntry],
    in_page: usize,
) -> Result<Option<usize>, VmError> {
    let cap = frames.len();
    for pass in 1..=4 {
        for _ in 0..cap {
            match frames[*idx] {
                None if pass == 1 => {
                    frames[*idx] = Some(in_page);
                    *idx = (*idx + 1) % cap;
                    return Ok(None);
                }
                None => {}
                Some(page) => {
                    let entry = &table[page];
                    let wanted = if pass % 2 == 1 {
                        !entry.used && !entry.dirty
                    } else {
                        !entry.used && entry.dirty
                    };
                    if wanted {
                        frames[*idx] = Some(in_page);
                        *idx = (*idx + 1) % cap;
                        return Ok(Some(page));
                    }
                    if pass == 2 && entry.used {
                        table[page].used = false;
                    }
                }
            }
            *idx = (*idx + 1) % cap;
        }
    }
    Err(VmError::NoVictim)
}

/// 把 `vpn` 提到 LRU 栈顶：中间的项向栈底滑一格，栈不换元素只压缩。
fn lru_touch(
    frames: &mut [Option<usize>],
    bottom: usize,
    count: usize,
    vpn: usize,
) -> Result<(), VmError> {
    let cap = frames.len();
    for i in 0..count {
        if frames[(bottom + i) % cap] == Some(vpn) {
            for j in i..count - 1 {
                frames[(bottom + j) % cap] = frames[(bottom + j + 1) % cap];
            }
            frames[(bottom + count - 1) % cap] = Some(vpn);
            return Ok(());
        }
    }
    Err(VmError::LruMissing(vpn))
}
