//! fastrange インデックスの分布検査。
//!
//! 置換表のクラスターインデックスは `(key * N) の上位64bit` で計算される。
//! このマッピングが任意の N（2の冪でなくても）で一様になることを、
//! 乱数キーのヒストグラムで確認する。最大ビンが平均の4倍を超えたら失敗。
//!
//! # 使用例
//!
//! ```shell
//! cargo run -p tools --release --bin tt_distribution -- \
//!   --clusters 1000003 --keys 10000000
//! ```

use anyhow::{ensure, Result};
use clap::Parser;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

#[derive(clap::Parser, Debug)]
#[command(about = "Histogram sanity check for the fastrange cluster index")]
struct Args {
    /// クラスター数（2の冪でない値も可）
    #[arg(long, default_value_t = 1_000_003)]
    clusters: usize,

    /// 生成するキー数
    #[arg(long, default_value_t = 10_000_000)]
    keys: u64,

    /// 乱数シード
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// TranspositionTable::cluster_index と同じマッピング
#[inline]
fn cluster_index(key: u64, clusters: usize) -> usize {
    ((key as u128 * clusters as u128) >> 64) as usize
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    ensure!(args.clusters > 0, "--clusters must be positive");

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(args.seed);
    let mut histogram = vec![0u32; args.clusters];

    for _ in 0..args.keys {
        histogram[cluster_index(rng.next_u64(), args.clusters)] += 1;
    }

    let mean = args.keys as f64 / args.clusters as f64;
    let max = *histogram.iter().max().unwrap() as f64;
    let empty = histogram.iter().filter(|&&c| c == 0).count();

    println!("=== fastrange distribution ===");
    println!("clusters:  {}", args.clusters);
    println!("keys:      {}", args.keys);
    println!("mean bin:  {mean:.2}");
    println!("max bin:   {max}");
    println!("max/mean:  {:.2}", max / mean);
    println!("empty:     {empty}");

    ensure!(
        max <= mean * 4.0,
        "distribution too skewed: max={max}, mean={mean:.2}"
    );

    Ok(())
}
