//! 置換表の生メモリ確保
//!
//! テーブル本体の確保・解放を一手に引き受ける。確保した領域は
//! テーブルの生存期間中アドレスが変わらず、resize 以外で再確保されない。
//!
//! Linux では 2MiB 整列 + `madvise(MADV_HUGEPAGE)` で Transparent Huge Pages を
//! 誘導する。Windows では `SeLockMemoryPrivilege` を昇格して Large Pages を試み、
//! 失敗時は通常の `VirtualAlloc` にフォールバックする。
//!
//! 確保失敗は呼び出し側（resize）で致命的エラーとして扱う。ここでは
//! `None` を返すだけで、縮退モードは持たない。

use std::ptr::NonNull;

#[cfg(not(windows))]
use std::alloc::{alloc, dealloc, Layout};
#[cfg(not(windows))]
use std::cmp::max;

#[cfg(windows)]
use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, ERROR_SUCCESS};
#[cfg(windows)]
use windows_sys::Win32::Security::{
    AdjustTokenPrivileges, LookupPrivilegeValueA, OpenProcessToken, LUID, LUID_AND_ATTRIBUTES,
    SE_PRIVILEGE_ENABLED, TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
};
#[cfg(windows)]
use windows_sys::Win32::System::Memory::{
    GetLargePageMinimum, VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_LARGE_PAGES, MEM_RELEASE,
    MEM_RESERVE, PAGE_READWRITE,
};
#[cfg(windows)]
use windows_sys::Win32::System::Threading::GetCurrentProcess;

/// 確保に使われたページ種別
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum AllocKind {
    /// Huge Pages / Large Pages
    LargePages,
    /// 通常ページ（Large Pages 未対応環境や確保失敗時のフォールバック）
    #[allow(dead_code)]
    Regular,
}

/// 置換表の backing memory
///
/// Drop で解放される。クラスター配列としての解釈は table 側の責務で、
/// ここではバイト列としてのみ扱う（並列クリアもバイト範囲を分割して行う）。
pub(super) struct Allocation {
    ptr: NonNull<u8>,
    size: usize,
    kind: AllocKind,
    #[cfg(not(windows))]
    layout: Layout,
}

impl Allocation {
    /// `size` バイトを `alignment` 以上に整列して確保する
    ///
    /// OS がメモリを供給できない場合は `None`。
    pub(super) fn allocate(size: usize, alignment: usize) -> Option<Self> {
        debug_assert!(size > 0);

        #[cfg(windows)]
        {
            if let Some(alloc) = try_alloc_large_pages(size) {
                return Some(alloc);
            }
            alloc_windows(size)
        }

        #[cfg(not(windows))]
        {
            alloc_unix(size, alignment)
        }
    }

    #[inline]
    pub(super) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    pub(super) fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub(super) fn kind(&self) -> AllocKind {
        self.kind
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        unsafe {
            #[cfg(windows)]
            {
                let ok = VirtualFree(self.ptr.as_ptr() as *mut _, 0, MEM_RELEASE);
                if ok == 0 {
                    log::warn!("VirtualFree failed with error {}", GetLastError());
                    debug_assert!(false, "VirtualFree failed");
                }
            }
            #[cfg(not(windows))]
            {
                dealloc(self.ptr.as_ptr(), self.layout);
            }
        }
    }
}

// SAFETY: Allocation は置換表の生メモリを排他的に所有し、
// 並行アクセスの整合性は上位（TranspositionTable）の規約で保証される。
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

#[cfg(not(windows))]
fn alloc_unix(size: usize, alignment: usize) -> Option<Allocation> {
    // Linux では 2MiB 整列にして THP の対象になりやすくする
    #[cfg(any(target_os = "linux", target_os = "android"))]
    let (page_align, kind) = (2 * 1024 * 1024, AllocKind::LargePages);
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let (page_align, kind) = (4096, AllocKind::Regular);

    let alignment = max(alignment, page_align);
    let layout = Layout::from_size_align(size, alignment).ok()?.pad_to_align();
    let ptr = NonNull::new(unsafe { alloc(layout) })?;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    unsafe {
        let result = libc::madvise(ptr.as_ptr() as *mut _, layout.size(), libc::MADV_HUGEPAGE);
        // madvise の失敗は動作には影響しない
        if result != 0 {
            log::debug!("madvise(MADV_HUGEPAGE) failed");
        }
    }

    Some(Allocation {
        ptr,
        size,
        kind,
        layout,
    })
}

#[cfg(windows)]
fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(value.checked_add(align - 1).is_some());
    (value + align - 1) / align * align
}

#[cfg(windows)]
fn try_alloc_large_pages(size: usize) -> Option<Allocation> {
    unsafe {
        let large_page_size = GetLargePageMinimum() as usize;
        if large_page_size == 0 {
            return None;
        }

        // MEM_LARGE_PAGES には SeLockMemoryPrivilege の昇格が必要
        let mut token = 0;
        if OpenProcessToken(GetCurrentProcess(), TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY, &mut token)
            == 0
        {
            return None;
        }

        let mut luid = LUID {
            LowPart: 0,
            HighPart: 0,
        };
        if LookupPrivilegeValueA(
            std::ptr::null(),
            b"SeLockMemoryPrivilege\0".as_ptr(),
            &mut luid,
        ) == 0
        {
            CloseHandle(token);
            return None;
        }

        let mut tp = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: luid,
                Attributes: SE_PRIVILEGE_ENABLED,
            }],
        };
        let mut prev_tp = TOKEN_PRIVILEGES {
            PrivilegeCount: 0,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: LUID {
                    LowPart: 0,
                    HighPart: 0,
                },
                Attributes: 0,
            }],
        };
        let mut prev_len = std::mem::size_of::<TOKEN_PRIVILEGES>() as u32;

        // 非ゼロ復帰でも ERROR_NOT_ALL_ASSIGNED 等の部分的失敗がありうる
        if AdjustTokenPrivileges(token, 0, &mut tp, prev_len, &mut prev_tp, &mut prev_len) == 0
            || GetLastError() != ERROR_SUCCESS
        {
            CloseHandle(token);
            return None;
        }

        let alloc_size = align_up(size, large_page_size);
        let ptr = VirtualAlloc(
            std::ptr::null_mut(),
            alloc_size,
            MEM_RESERVE | MEM_COMMIT | MEM_LARGE_PAGES,
            PAGE_READWRITE,
        );

        // 権限は確保の成否にかかわらず元に戻す
        AdjustTokenPrivileges(
            token,
            0,
            &mut prev_tp,
            0,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        CloseHandle(token);

        let ptr = NonNull::new(ptr as *mut u8)?;
        Some(Allocation {
            ptr,
            size,
            kind: AllocKind::LargePages,
        })
    }
}

#[cfg(windows)]
fn alloc_windows(size: usize) -> Option<Allocation> {
    unsafe {
        let ptr =
            VirtualAlloc(std::ptr::null_mut(), size, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE);
        let ptr = NonNull::new(ptr as *mut u8)?;
        Some(Allocation {
            ptr,
            size,
            kind: AllocKind::Regular,
        })
    }
}
