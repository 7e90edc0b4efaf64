//! クリアワーカーのプロセッサグループバインド
//!
//! first-touch ポリシーの NUMA システムでは、ページをゼロクリアした
//! スレッドのノードにページが配置される。クリアを担当するワーカーを
//! タスク番号から導いたグループに固定することで、後段の探索ワーカーと
//! 同じノードにテーブルのページを載せる。
//!
//! Windows のプロセッサグループ（64論理コア超の環境）のみ実装している。
//! それ以外のプラットフォームでは no-op であり、マルチソケット環境では
//! ページ配置が最初にクリアしたノードに偏る可能性がある。

/// 現在のスレッドをタスク番号に対応するプロセッサグループへ固定する
#[cfg(windows)]
pub(super) fn bind_this_thread(idx: usize) {
    use windows_sys::Win32::System::Kernel::GROUP_AFFINITY;
    use windows_sys::Win32::System::Threading::{
        GetActiveProcessorCount, GetActiveProcessorGroupCount, GetCurrentThread,
        SetThreadGroupAffinity,
    };

    unsafe {
        let group_count = GetActiveProcessorGroupCount() as usize;
        if group_count < 2 {
            return;
        }

        // タスクをグループへラウンドロビンで割り付ける
        let group = (idx % group_count) as u16;
        let cpus = GetActiveProcessorCount(group) as u32;
        if cpus == 0 {
            return;
        }
        let mask: usize = if cpus as usize >= usize::BITS as usize {
            usize::MAX
        } else {
            (1usize << cpus) - 1
        };

        let affinity = GROUP_AFFINITY {
            Mask: mask,
            Group: group,
            Reserved: [0; 3],
        };
        if SetThreadGroupAffinity(GetCurrentThread(), &affinity, std::ptr::null_mut()) == 0 {
            log::warn!("SetThreadGroupAffinity failed for clear worker {idx}");
        }
    }
}

#[cfg(not(windows))]
pub(super) fn bind_this_thread(_idx: usize) {}
