//! 境界値種別（Bound）

use super::Value;

/// 置換表に格納するスコアの性質
///
/// fail-soft な αβ 探索の返す値は正確値とは限らないため、
/// 上界・下界・正確値のいずれであるかを 2bit で保持する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Bound {
    /// 有効な境界なし（空きスロット）
    #[default]
    None = 0,
    /// 上界（fail-low: 真の値はこれ以下）
    Upper = 1,
    /// 下界（fail-high: 真の値はこれ以上）
    Lower = 2,
    /// 正確な値
    Exact = 3,
}

impl Bound {
    /// 下位2bitから復元
    #[inline]
    pub const fn from_u8(n: u8) -> Option<Bound> {
        match n {
            0 => Some(Bound::None),
            1 => Some(Bound::Upper),
            2 => Some(Bound::Lower),
            3 => Some(Bound::Exact),
            _ => None,
        }
    }

    /// このエントリでβカットできるか
    #[inline]
    pub const fn can_cutoff(self, value: Value, beta: Value) -> bool {
        match self {
            Bound::Exact => true,
            Bound::Lower => value.raw() >= beta.raw(),
            Bound::Upper => value.raw() < beta.raw(),
            Bound::None => false,
        }
    }
}
