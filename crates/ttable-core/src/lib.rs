//! 並列ゲーム木探索のための置換表（Transposition Table）
//!
//! 64bit の Zobrist キーで索引する固定容量・有界メモリのキャッシュ。
//! 探索ワーカーは全ノードで probe / save を呼ぶため、1回の操作が
//! 触るメモリは常に1キャッシュライン（1クラスター）に収まるよう
//! レイアウトしてある。
//!
//! - probe / save: ロックフリー・非アトミック。複数ワーカーから `&self` で
//!   同時に呼べる。競合した書き込みは key16 照合で無害化される。
//! - resize / clear / new_search: コントローラ専用。全ワーカーの静止が前提。
//!
//! ```
//! use ttable_core::{Bound, Move, TranspositionTable, Value};
//!
//! let tt = TranspositionTable::new(16); // 16MB
//! tt.save(0x1234_5678_9ABC_DEF0, Value::new(42), true, Bound::Exact, 10,
//!         Move::from_u16(0x0B1E), Value::new(-5));
//!
//! let result = tt.probe(0x1234_5678_9ABC_DEF0);
//! assert!(result.found);
//! assert_eq!(result.data.value, Value::new(42));
//!
//! tt.new_search(); // 世代を進めて古いエントリを置換されやすくする
//! # let _ = tt.hashfull();
//! ```

pub mod tt;
pub mod types;

pub use tt::{ProbeResult, TTData, TTEntry, TranspositionTable, CLUSTER_SIZE};
pub use types::{Bound, Depth, Key, Move, Value, DEPTH_NONE, DEPTH_OFFSET, DEPTH_QS, MAX_PLY};
