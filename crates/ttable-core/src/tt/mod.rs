//! 置換表モジュール
//!
//! 探索結果をキャッシュする置換表（Transposition Table）。
//!
//! - `TTEntry`: エントリ（10バイト、16bitキー）
//! - `Cluster`: エントリのグループ（32バイト、キャッシュラインに整列）
//! - `TranspositionTable`: テーブル本体
//! - 世代管理
//! - 並列クリア（first-touch）
//! - prefetch
//!
//! # Stockfish（ClusterSize=3）準拠
//!
//! クラスターインデックスは 64bit キーとクラスター数の 128bit 積の上位
//! 64bit で決定し（fastrange）、クラスター内マッチングに上位 16bit を
//! 使用する。10バイトエントリ × 3 + 2パディング = 32バイト/クラスター。
//!
//! probe / save はロックフリーかつ非アトミック。複数ワーカーの書き込みが
//! 競合した場合は千切れたエントリが一時的に生じうるが、key16 の照合で
//! 弾かれるため探索の正しさには影響しない。

mod alloc;
mod bind;
mod entry;
mod table;


pub use entry::{pack_gen_bound, unpack_gen_bound, TTData, TTEntry};
pub use table::{ProbeResult, TranspositionTable};

/// クラスターサイズ（エントリ数）
/// Stockfish準拠: 10bytes × 3 + 2padding = 32bytes
pub const CLUSTER_SIZE: usize = 3;

/// Generation関連の定数
pub const GENERATION_BITS: u32 = 3;
pub const GENERATION_DELTA: u8 = 1 << GENERATION_BITS; // 8
pub const GENERATION_CYCLE: u16 = 255 + GENERATION_DELTA as u16; // 263
pub const GENERATION_MASK: u16 = 0xF8; // (0xFF << GENERATION_BITS) as u8
