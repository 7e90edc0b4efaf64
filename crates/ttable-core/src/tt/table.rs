//! TranspositionTable本体
//!
//! - Cluster: エントリのグループ（32バイト）
//! - TranspositionTable: テーブル本体
//! - probe/save/hashfull と resize/clear/new_search
//!
//! probe / save は `&self` で複数ワーカーから同時に呼べる。ロックも
//! アトミック命令も使わず、競合による千切れた書き込みは key16 照合で
//! 無害化する。resize / clear / new_search はワーカーの静止が前提。

use super::alloc::{AllocKind, Allocation};
use super::bind;
use super::entry::{TTData, TTEntry};
use super::{CLUSTER_SIZE, GENERATION_DELTA};
use crate::types::{Bound, Depth, Key, Move, Value};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};

/// クラスター構造
///
/// 同じハッシュインデックスに対して複数のエントリを持つ。
/// 10bytes × 3 + 2padding = 32bytes で、キャッシュライン（64B）を
/// ちょうど2クラスターで割り切る。パディングはエントリとして解釈しない。
#[repr(C, align(32))]
pub(super) struct Cluster {
    entries: [TTEntry; CLUSTER_SIZE],
    _padding: [u8; 2],
}

// クラスターは32バイトで、キャッシュラインを均等に分割する
const _: () = assert!(std::mem::size_of::<Cluster>() == 32);
const _: () = assert!(64 % std::mem::size_of::<Cluster>() == 0);

/// クラスター配列と backing memory
///
/// resize 中の「解放済み」状態を表せるよう、確保は Option で持つ。
struct ClusterTable {
    alloc: Option<Allocation>,
    len: usize,
}

impl ClusterTable {
    /// メモリ未確保の空テーブル
    const fn unallocated() -> Self {
        Self { alloc: None, len: 0 }
    }

    /// `len` クラスター分を確保する（ゼロ化は clear の責務）
    fn new(len: usize) -> Option<Self> {
        let bytes = len * std::mem::size_of::<Cluster>();
        let alloc = Allocation::allocate(bytes, std::mem::align_of::<Cluster>())?;
        Some(Self { alloc: Some(alloc), len })
    }

    fn byte_size(&self) -> usize {
        self.alloc.as_ref().map_or(0, |a| a.size())
    }

    fn uses_large_pages(&self) -> bool {
        self.alloc.as_ref().is_some_and(|a| a.kind() == AllocKind::LargePages)
    }
}

impl Deref for ClusterTable {
    type Target = [Cluster];

    fn deref(&self) -> &Self::Target {
        match &self.alloc {
            Some(a) => unsafe {
                std::slice::from_raw_parts(a.ptr().as_ptr() as *const Cluster, self.len)
            },
            None => &[],
        }
    }
}

impl DerefMut for ClusterTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &self.alloc {
            Some(a) => unsafe {
                std::slice::from_raw_parts_mut(a.ptr().as_ptr() as *mut Cluster, self.len)
            },
            None => &mut [],
        }
    }
}

/// 置換表
///
/// エンジンコントローラが所有し、探索ワーカーには共有参照で渡す。
pub struct TranspositionTable {
    /// クラスターの配列
    table: ClusterTable,
    /// クラスター数（2の冪とは限らない）
    cluster_count: usize,
    /// 世代カウンター（下位3bitは使用しない）
    generation8: AtomicU8,
    /// clear の分割数（"Threads" オプション）
    thread_count: usize,
}

impl TranspositionTable {
    /// 新しい置換表を作成（サイズはMB単位）
    pub fn new(mb_size: usize) -> Self {
        let mut tt = Self {
            table: ClusterTable::unallocated(),
            cluster_count: 0,
            generation8: AtomicU8::new(0),
            thread_count: 1,
        };
        tt.resize(mb_size);
        tt
    }

    /// clear の分割数を設定する（"Threads" オプション）
    ///
    /// ワーカー静止中にコントローラが呼ぶ。
    pub fn set_thread_count(&mut self, threads: usize) {
        self.thread_count = threads.max(1);
    }

    /// サイズを変更（MB単位）
    ///
    /// ワーカーが probe / save を実行していないことが前提。
    /// 確保に失敗した場合は診断を stderr に出して終了する（縮退モードはない）。
    pub fn resize(&mut self, mb_size: usize) {
        // 巨大テーブルの二重確保を避けるため、先に既存領域を解放する
        self.table = ClusterTable::unallocated();

        let cluster_count =
            (mb_size.saturating_mul(1024 * 1024) / std::mem::size_of::<Cluster>()).max(1);

        let Some(table) = ClusterTable::new(cluster_count) else {
            log::error!("TT allocation failed: {mb_size} MB");
            eprintln!("Failed to allocate {mb_size}MB for transposition table.");
            std::process::exit(1);
        };
        self.table = table;
        self.cluster_count = cluster_count;

        log::info!(
            "TT resize: {} MB, {} clusters, {} bytes, large_pages={}",
            mb_size,
            cluster_count,
            self.table.byte_size(),
            self.table.uses_large_pages()
        );

        self.clear();
    }

    /// クリア
    ///
    /// 全クラスターをゼロ化し、すべてのエントリを空にする。
    /// `thread_count` 個の連続範囲に分割して並列にゼロ化する。first-touch
    /// ポリシーのシステムでは、このときページが各ワーカーの NUMA ノードに
    /// 配置される（単なる高速化ではなくページ配置の決定でもある）。
    pub fn clear(&mut self) {
        self.generation8.store(0, Ordering::Relaxed);

        let len = self.table.len();
        if len == 0 {
            return;
        }

        let threads = self.thread_count;
        let ptr = self.table.as_mut_ptr();

        // 小さいテーブルや1スレッド指定では逐次クリアで十分
        if threads <= 1 || len < threads * 1024 {
            unsafe { std::ptr::write_bytes(ptr, 0, len) };
            return;
        }

        let stride = len / threads;

        std::thread::scope(|scope| {
            for idx in 0..threads {
                let start = stride * idx;
                // 端数は最後の範囲が吸収する
                let count = if idx != threads - 1 { stride } else { len - start };
                let ptr_addr = unsafe { ptr.add(start) } as usize;

                scope.spawn(move || {
                    if threads > 8 {
                        bind::bind_this_thread(idx);
                    }
                    unsafe { std::ptr::write_bytes(ptr_addr as *mut Cluster, 0, count) };
                });
            }
        });
    }

    /// 新しい探索を開始（世代を進める）
    ///
    /// エントリの内容は変更されない。古い世代のエントリは置換スコア上
    /// 徐々に価値が下がっていく。
    pub fn new_search(&self) {
        self.generation8.fetch_add(GENERATION_DELTA, Ordering::Relaxed);
    }

    /// 現在の世代を取得
    #[inline]
    pub fn generation(&self) -> u8 {
        self.generation8.load(Ordering::Relaxed)
    }

    /// クラスター数を取得
    #[inline]
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Large Pagesを使って確保されたかを返す
    pub fn uses_large_pages(&self) -> bool {
        self.table.uses_large_pages()
    }

    /// 置換表を検索
    ///
    /// ヒット時はエントリの世代を現在値にリフレッシュし（pv/boundは保持）、
    /// スナップショット `TTData` と共に返す。ミス時の `entry` はクラスター
    /// 先頭を指す。
    pub fn probe(&self, key: Key) -> ProbeResult<'_> {
        let generation8 = self.generation();
        let cluster = self.cluster_for(key);
        let key16 = (key >> 48) as u16;

        for entry in &cluster.entries {
            if entry.key16() == key16 {
                // 非アトミックな1バイト書き込み。競合で古い世代に戻っても
                // 置換候補として少し弱くなるだけで無害。
                entry.refresh_generation(generation8);
                return ProbeResult {
                    found: true,
                    data: entry.read(),
                    entry,
                };
            }
        }

        ProbeResult {
            found: false,
            data: TTData::EMPTY,
            entry: &cluster.entries[0],
        }
    }

    /// エントリを保存
    ///
    /// クラスター内の犠牲スロットを三段階で選ぶ:
    /// 1. 同一キーのスロット
    /// 2. 空きスロット（key16 == 0、スキャン順で最初のもの）
    /// 3. 置換スコア最小のスロット
    ///
    /// 書き込みは非アトミック。value の詰み距離補正は呼び出し側の責務。
    #[allow(clippy::too_many_arguments)]
    pub fn save(
        &self,
        key: Key,
        value: Value,
        is_pv: bool,
        bound: Bound,
        depth: Depth,
        mv: Move,
        eval: Value,
    ) {
        let generation8 = self.generation();
        let cluster = self.cluster_for(key);
        let key16 = (key >> 48) as u16;

        let mut replace = None;

        // 1. 同一キーのスロット
        for entry in &cluster.entries {
            if entry.key16() == key16 {
                replace = Some(entry);
                break;
            }
        }

        // 2. 空きスロット
        if replace.is_none() {
            for entry in &cluster.entries {
                if entry.key16() == 0 {
                    replace = Some(entry);
                    break;
                }
            }
        }

        // 3. 置換スコア最小のスロット。先頭エントリを初期候補とし、
        //    真に小さいスコアのときだけ乗り換える（同点は先のスロットを残す）
        let replace = replace.unwrap_or_else(|| {
            let mut worst = &cluster.entries[0];
            for entry in &cluster.entries[1..] {
                if entry.replace_score(generation8) < worst.replace_score(generation8) {
                    worst = entry;
                }
            }
            worst
        });

        replace.save(key16, value, is_pv, bound, depth, mv, eval, generation8);
    }

    /// 置換表の使用率を1000分率で返す
    ///
    /// 先頭1000クラスターをサンプリングし、現世代かつ有効な Bound を持つ
    /// エントリを数える。厳密な占有率ではなく近似値。
    pub fn hashfull(&self) -> u16 {
        let generation8 = self.generation();
        let sample = 1000.min(self.cluster_count);
        let mut count = 0usize;

        for cluster in self.table.iter().take(sample) {
            for entry in &cluster.entries {
                count += usize::from(
                    entry.generation() == generation8 && entry.bound() != Bound::None,
                );
            }
        }

        (count / CLUSTER_SIZE) as u16
    }

    /// キーに対応するクラスター先頭のエントリを取得
    ///
    /// 近傍エントリを覗きたい呼び出し側のための低レベルAPI。
    #[inline]
    pub fn first_entry(&self, key: Key) -> &TTEntry {
        &self.cluster_for(key).entries[0]
    }

    /// 指定キーのクラスターをプリフェッチ
    #[inline]
    pub fn prefetch(&self, key: Key) {
        let cluster = self.cluster_for(key);

        #[cfg(target_arch = "x86_64")]
        unsafe {
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            _mm_prefetch::<_MM_HINT_T0>(cluster as *const Cluster as *const i8);
        }

        #[cfg(target_arch = "aarch64")]
        unsafe {
            // __prefetch 相当（L1 keep）。intrinsic は nightly 限定のため prfm 直書き
            std::arch::asm!(
                "prfm pldl1keep, [{ptr}]",
                ptr = in(reg) cluster as *const Cluster,
                options(nostack, preserves_flags)
            );
        }

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        let _ = cluster;
    }

    /// クラスターインデックスを計算（fastrange）
    ///
    /// `(key * cluster_count) の上位64bit`。剰余も除算も使わず、
    /// クラスター数が2の冪でなくても一様に分布する。
    #[inline]
    pub(super) fn cluster_index(&self, key: Key) -> usize {
        ((key as u128 * self.cluster_count as u128) >> 64) as usize
    }

    /// クラスターの参照を取得
    #[inline]
    fn cluster_for(&self, key: Key) -> &Cluster {
        &self.table[self.cluster_index(key)]
    }

    /// テスト用: クラスター数を直接指定して作成
    ///
    /// fastrange の逆算で同一クラスターに落ちるキーを作るテストは、
    /// クラスターのキー空間スパンが 2^48 を十分超える小さなテーブルを使う。
    #[cfg(test)]
    pub(crate) fn with_cluster_count(cluster_count: usize) -> Self {
        let table = ClusterTable::new(cluster_count).expect("test table allocation failed");
        let mut tt = Self {
            table,
            cluster_count,
            generation8: AtomicU8::new(0),
            thread_count: 1,
        };
        tt.clear();
        tt
    }
}

/// probe結果
///
/// `data` は probe 時点のスナップショット。`entry` は resize / clear までの
/// 間だけ有効な、テーブル内エントリへの参照。
pub struct ProbeResult<'a> {
    /// ヒットしたか
    pub found: bool,
    /// 読み取ったデータ
    pub data: TTData,
    /// ヒットしたエントリ（ミス時はクラスター先頭）
    pub entry: &'a TTEntry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tt::GENERATION_MASK;
    use crate::types::DEPTH_OFFSET;

    #[test]
    fn test_tt_new() {
        let tt = TranspositionTable::new(1);
        // 1MB = 32768クラスター
        assert_eq!(tt.cluster_count(), 32768);
        assert_eq!(tt.generation(), 0);
        assert_eq!(tt.hashfull(), 0);
    }

    #[test]
    fn test_tt_new_search() {
        let tt = TranspositionTable::new(1);
        assert_eq!(tt.generation(), 0);

        tt.new_search();
        assert_eq!(tt.generation(), GENERATION_DELTA);

        tt.new_search();
        assert_eq!(tt.generation(), GENERATION_DELTA * 2);
    }

    #[test]
    fn test_tt_generation_wraps() {
        let tt = TranspositionTable::new(1);
        for _ in 0..40 {
            tt.new_search();
        }
        // 40 * 8 = 320 ≡ 64 (mod 256)、下位3bitは常にゼロ
        assert_eq!(tt.generation(), 64);
        assert_eq!(tt.generation() & !(GENERATION_MASK as u8), 0);
    }

    #[test]
    fn test_tt_probe_empty() {
        let tt = TranspositionTable::new(1);
        let result = tt.probe(0xDEAD_BEEF_CAFE_BABE);
        assert!(!result.found);
        assert_eq!(result.data.bound, Bound::None);
    }

    #[test]
    fn test_tt_save_then_probe() {
        let tt = TranspositionTable::new(1);
        let key = 0xDEAD_BEEF_CAFE_BABE;

        tt.save(
            key,
            Value::new(42),
            true,
            Bound::Exact,
            10,
            Move::from_u16(0x1234),
            Value::new(-5),
        );

        let result = tt.probe(key);
        assert!(result.found);
        assert_eq!(result.data.value.raw(), 42);
        assert_eq!(result.data.eval.raw(), -5);
        assert_eq!(result.data.depth, 10);
        assert_eq!(result.data.mv.to_u16(), 0x1234);
        assert_eq!(result.data.bound, Bound::Exact);
        assert!(result.data.is_pv);
    }

    #[test]
    fn test_tt_move_preserved_on_null_restore() {
        let tt = TranspositionTable::new(1);
        let key = 0xDEAD_BEEF_CAFE_BABE;

        tt.save(key, Value::new(42), true, Bound::Exact, 10, Move::from_u16(0x1234), Value::new(-5));
        tt.save(key, Value::new(50), false, Bound::Lower, 12, Move::NONE, Value::new(-4));

        let result = tt.probe(key);
        assert!(result.found);
        assert_eq!(result.data.mv.to_u16(), 0x1234);
        assert_eq!(result.data.value.raw(), 50);
        assert_eq!(result.data.depth, 12);
        assert_eq!(result.data.bound, Bound::Lower);
    }

    #[test]
    fn test_tt_clear_empties_everything() {
        let mut tt = TranspositionTable::new(1);
        let key = 0x1234_5678_9ABC_DEF0;

        tt.save(key, Value::new(100), false, Bound::Lower, 10, Move::NONE, Value::ZERO);
        tt.new_search();
        assert!(tt.probe(key).found);

        tt.clear();

        assert!(!tt.probe(key).found);
        assert_eq!(tt.generation(), 0);
        assert_eq!(tt.hashfull(), 0);
        assert!(tt.table.iter().all(|c| c.entries.iter().all(|e| e.is_empty())));
    }

    #[test]
    fn test_tt_clear_parallel_path() {
        // 分割数 > 1 かつ len >= threads * 1024 で並列パスを通す
        let mut tt = TranspositionTable::new(8);
        tt.set_thread_count(4);

        for i in 0..10_000u64 {
            let key = i.wrapping_mul(0x9E37_79B9_7F4A_7C15);
            tt.save(key, Value::new(1), false, Bound::Exact, 5, Move::NONE, Value::ZERO);
        }
        assert!(tt.hashfull() > 0);

        tt.clear();

        assert_eq!(tt.hashfull(), 0);
        assert!(tt.table.iter().all(|c| c.entries.iter().all(|e| e.is_empty())));
    }

    #[test]
    fn test_tt_resize_reallocates() {
        let mut tt = TranspositionTable::new(1);
        let key = 0xDEAD_BEEF_CAFE_BABE;
        tt.save(key, Value::new(1), false, Bound::Exact, 5, Move::NONE, Value::ZERO);

        tt.resize(2);
        assert_eq!(tt.cluster_count(), 65536);
        // resize 後はすべて空
        assert!(!tt.probe(key).found);
        assert_eq!(tt.hashfull(), 0);
    }

    #[test]
    fn test_tt_probe_refresh_preserves_payload() {
        let tt = TranspositionTable::new(1);
        let key = 0xFACE_FEED_DEAD_BEEF;

        tt.save(key, Value::new(77), true, Bound::Upper, 9, Move::from_u16(0xABCD), Value::new(3));

        tt.new_search();
        tt.new_search();
        let result = tt.probe(key);
        assert!(result.found);

        // 世代ビットのみ現在値に更新され、他は保存時のまま
        assert_eq!(result.entry.generation(), tt.generation());
        assert_eq!(result.data.bound, Bound::Upper);
        assert!(result.data.is_pv);
        assert_eq!(result.data.mv.to_u16(), 0xABCD);
        assert_eq!(result.data.value.raw(), 77);
        assert_eq!(result.data.eval.raw(), 3);
        assert_eq!(result.data.depth, 9);
        assert_eq!(result.entry.depth(), 9);
    }

    #[test]
    fn test_tt_first_entry_is_cluster_head() {
        let tt = TranspositionTable::new(1);
        let key = 0x0123_4567_89AB_CDEF;
        let head = tt.first_entry(key) as *const TTEntry;
        let cluster = &tt.table[tt.cluster_index(key)];
        assert_eq!(head, &cluster.entries[0] as *const TTEntry);
    }

    #[test]
    fn test_tt_depth_bounds_storable() {
        let tt = TranspositionTable::new(1);
        let key = 0xAAAA_BBBB_CCCC_DDDD;
        tt.save(key, Value::ZERO, false, Bound::Exact, DEPTH_OFFSET, Move::NONE, Value::ZERO);
        assert_eq!(tt.probe(key).data.depth, DEPTH_OFFSET);

        tt.save(key, Value::ZERO, false, Bound::Exact, DEPTH_OFFSET + 255, Move::NONE, Value::ZERO);
        assert_eq!(tt.probe(key).data.depth, DEPTH_OFFSET + 255);
    }
}
