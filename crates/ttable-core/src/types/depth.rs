//! 探索深さ（Depth）

/// 探索深さ
pub type Depth = i32;

/// 最大探索深度
pub const MAX_PLY: Depth = 128;

/// 静止探索の深さ
pub const DEPTH_QS: Depth = 0;

/// 未探索を示す深さ
pub const DEPTH_NONE: Depth = -6;

/// 置換表格納用オフセット
///
/// エントリの depth8 には `depth - DEPTH_OFFSET` を格納する。
/// これにより静止探索の負の深さも u8 に収まる。
/// 格納可能な深さは `DEPTH_OFFSET ..= DEPTH_OFFSET + 255`。
pub const DEPTH_OFFSET: Depth = -7;

// 定数間の関係をコンパイル時に検証する
const _: () = {
    assert!(DEPTH_OFFSET < DEPTH_NONE);
    assert!(DEPTH_NONE < DEPTH_QS);
    assert!(DEPTH_QS < MAX_PLY);
    assert!(MAX_PLY - DEPTH_OFFSET <= 255);
};
