//! Native engine loading via `libloading`: opens the plugin shared library,
//! resolves its exported factory symbol, and wraps the resulting C vtable in
//! a safe [`EnginePlugin`] implementation.
//!
//! The wire format between the dispatcher and the plugin is JSON bytes in,
//! JSON bytes out — the vtable itself only ever moves opaque buffers, so the
//! ABI surface stays small and stable across plugin versions.

use crate::plugin::{EnginePlugin, EngineResult, EngineTaskId};
use cortex_core::{Error, Result};
use libloading::{Library, Symbol};
use std::ffi::c_void;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Mutex;

/// Augments the OS library search path with an engine's install directory
/// for the duration it may need to resolve sibling shared libraries, then
/// undoes the augmentation symmetrically. Grounded on the engine service's
/// own `AddDllDirectory`/`LD_LIBRARY_PATH` handling around plugin load/unload.
#[cfg(windows)]
mod search_path {
    use super::{Error, Path, Result};
    use std::ffi::c_void;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::System::LibraryLoader::{AddDllDirectory, RemoveDllDirectory};

    /// Holds the cookie `AddDllDirectory` returns; `RemoveDllDirectory` is
    /// called with it on drop, mirroring the factory's add-on-load,
    /// remove-on-unload pairing.
    pub struct DllDirectoryGuard {
        cookie: *mut c_void,
    }

    // SAFETY: the cookie is an opaque, process-wide handle; the Win32 API
    // documents `RemoveDllDirectory` as callable from any thread.
    unsafe impl Send for DllDirectoryGuard {}

    impl DllDirectoryGuard {
        pub fn add(dir: &Path) -> Result<Self> {
            let wide: Vec<u16> = dir.as_os_str().encode_wide().chain(std::iter::once(0)).collect();
            let cookie = unsafe { AddDllDirectory(wide.as_ptr()) };
            if cookie.is_null() {
                return Err(Error::load_failed(format!("AddDllDirectory failed for {}", dir.display())));
            }
            Ok(Self { cookie })
        }
    }

    impl Drop for DllDirectoryGuard {
        fn drop(&mut self) {
            unsafe {
                RemoveDllDirectory(self.cookie);
            }
        }
    }
}

/// Unix equivalent of the Windows DLL-directory dance: prepends the engine's
/// install directory to `LD_LIBRARY_PATH` for the duration of the `dlopen`
/// call (when `NEEDED` entries are resolved), then restores the prior value.
/// Serialized with a process-wide lock since the env var is global state.
#[cfg(unix)]
mod search_path {
    use super::{Error, Path, Result};
    use std::sync::Mutex;

    static LOCK: Mutex<()> = Mutex::new(());

    pub fn with_augmented<T>(dir: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = LOCK.lock().unwrap();
        let previous = std::env::var_os("LD_LIBRARY_PATH");
        let mut paths: Vec<std::path::PathBuf> = previous.as_ref().map(std::env::split_paths).into_iter().flatten().collect();
        paths.insert(0, dir.to_path_buf());
        let joined =
            std::env::join_paths(paths).map_err(|e| Error::load_failed(format!("invalid LD_LIBRARY_PATH component: {e}")))?;
        std::env::set_var("LD_LIBRARY_PATH", joined);

        let result = f();

        match &previous {
            Some(v) => std::env::set_var("LD_LIBRARY_PATH", v),
            None => std::env::remove_var("LD_LIBRARY_PATH"),
        }
        result
    }
}

/// Exported symbol every plugin shared library must provide.
const FACTORY_SYMBOL: &[u8] = b"cortex_engine_create\0";

/// The raw C vtable returned by a plugin's factory function. `ctx` is an
/// opaque pointer the plugin owns; every other function takes it as its
/// first argument.
#[repr(C)]
pub struct RawVTable {
    pub ctx: *mut c_void,
    pub submit_completion: unsafe extern "C" fn(*mut c_void, *const u8, usize) -> u64,
    /// Writes a heap-allocated, null-free buffer to `*out_ptr`/`*out_len` and
    /// returns `1` on a chunk, `2` on the final chunk, `0` if no result is
    /// buffered yet, `-1` on engine error (message written to the buffer).
    pub next_result: unsafe extern "C" fn(*mut c_void, u64, *mut *mut u8, *mut usize) -> i32,
    pub cancel: unsafe extern "C" fn(*mut c_void, u64),
    pub clear_cache: unsafe extern "C" fn(*mut c_void),
    /// Frees a buffer previously returned by `next_result`.
    pub free_buffer: unsafe extern "C" fn(*mut u8, usize),
    pub destroy: unsafe extern "C" fn(*mut c_void),
    pub capabilities: *const c_char,
    pub n_parallel: u32,
}

type FactoryFn = unsafe extern "C" fn() -> RawVTable;

pub struct NativeEngine {
    // Kept alive for the lifetime of `vtable`; never accessed directly once
    // the symbol has been resolved.
    _library: Library,
    // Removed from the OS search path on drop, after `_library` above (field
    // drop order is declaration order) has had a chance to unload.
    #[cfg(windows)]
    _dll_dir: Option<search_path::DllDirectoryGuard>,
    vtable: RawVTable,
    capabilities: Vec<String>,
    // Plugins are documented as not thread-safe across calls; serialize
    // access the same way the teacher's trait-object adapters guard shared
    // mutable state.
    call_lock: Mutex<()>,
}

// SAFETY: the plugin contract requires the vtable's functions to be safely
// callable from any thread provided calls are serialized, which `call_lock`
// guarantees.
unsafe impl Send for NativeEngine {}
unsafe impl Sync for NativeEngine {}

impl NativeEngine {
    /// Loads the shared library at `library_path` and resolves its factory
    /// symbol. Fails with `LoadFailed` on a missing file, missing symbol, or
    /// ABI mismatch (surfaced as a dereference/symbol-resolution error).
    pub fn load(library_path: &Path) -> Result<Self> {
        let install_dir = library_path.parent().unwrap_or_else(|| Path::new("."));

        #[cfg(windows)]
        let dll_dir = Some(search_path::DllDirectoryGuard::add(install_dir)?);

        #[cfg(windows)]
        let library = unsafe { Library::new(library_path) }
            .map_err(|e| Error::load_failed(format!("failed to open {}: {e}", library_path.display())))?;

        #[cfg(unix)]
        let library = search_path::with_augmented(install_dir, || {
            unsafe { Library::new(library_path) }.map_err(|e| Error::load_failed(format!("failed to open {}: {e}", library_path.display())))
        })?;

        #[cfg(not(any(windows, unix)))]
        let library = unsafe { Library::new(library_path) }
            .map_err(|e| Error::load_failed(format!("failed to open {}: {e}", library_path.display())))?;

        let vtable = unsafe {
            let factory: Symbol<FactoryFn> = library
                .get(FACTORY_SYMBOL)
                .map_err(|e| Error::load_failed(format!("missing factory symbol in {}: {e}", library_path.display())))?;
            factory()
        };

        let capabilities = if vtable.capabilities.is_null() {
            Vec::new()
        } else {
            let raw = unsafe { std::ffi::CStr::from_ptr(vtable.capabilities) };
            raw.to_string_lossy().split(',').map(str::to_string).collect()
        };

        Ok(Self {
            _library: library,
            #[cfg(windows)]
            _dll_dir: dll_dir,
            vtable,
            capabilities,
            call_lock: Mutex::new(()),
        })
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        unsafe { (self.vtable.destroy)(self.vtable.ctx) };
    }
}

impl EnginePlugin for NativeEngine {
    fn submit_completion(&self, request_json: &[u8]) -> Result<EngineTaskId> {
        let _guard = self.call_lock.lock().unwrap();
        let id = unsafe { (self.vtable.submit_completion)(self.vtable.ctx, request_json.as_ptr(), request_json.len()) };
        Ok(id)
    }

    fn next_result(&self, task_id: EngineTaskId) -> Result<Option<EngineResult>> {
        let _guard = self.call_lock.lock().unwrap();
        let mut out_ptr: *mut u8 = std::ptr::null_mut();
        let mut out_len: usize = 0;
        let code = unsafe { (self.vtable.next_result)(self.vtable.ctx, task_id, &mut out_ptr, &mut out_len) };

        if code == 0 {
            return Ok(None);
        }
        if out_ptr.is_null() || out_len == 0 {
            return Ok(Some(EngineResult {
                stop: code == 2,
                ..Default::default()
            }));
        }

        let bytes = unsafe { std::slice::from_raw_parts(out_ptr, out_len) }.to_vec();
        unsafe { (self.vtable.free_buffer)(out_ptr, out_len) };

        if code == -1 {
            let message = String::from_utf8_lossy(&bytes).to_string();
            return Ok(Some(EngineResult {
                error: Some(message),
                stop: true,
                ..Default::default()
            }));
        }

        let content = String::from_utf8_lossy(&bytes).to_string();
        Ok(Some(EngineResult {
            content,
            stop: code == 2,
            error: None,
            usage: None,
        }))
    }

    fn cancel(&self, task_id: EngineTaskId) {
        let _guard = self.call_lock.lock().unwrap();
        unsafe { (self.vtable.cancel)(self.vtable.ctx, task_id) };
    }

    fn clear_cache(&self) {
        let _guard = self.call_lock.lock().unwrap();
        unsafe { (self.vtable.clear_cache)(self.vtable.ctx) };
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    fn n_parallel(&self) -> u32 {
        self.vtable.n_parallel.max(1)
    }
}

/// Finds the plugin shared library inside an install directory: the single
/// file with a platform-appropriate extension (`.so`/`.dll`/`.dylib`).
pub fn find_library(install_dir: &Path) -> Result<std::path::PathBuf> {
    let entries = std::fs::read_dir(install_dir)
        .map_err(|e| Error::load_failed(format!("cannot read {}: {e}", install_dir.display())))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if matches!(path.extension().and_then(|e| e.to_str()), Some("so" | "dll" | "dylib")) {
            return Ok(path);
        }
    }
    Err(Error::load_failed(format!(
        "no shared library found in {}",
        install_dir.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_library_locates_platform_shared_object() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("version.txt"), "name=x\n").unwrap();
        std::fs::write(dir.path().join("libengine.so"), b"stub").unwrap();
        let found = find_library(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "libengine.so");
    }

    #[test]
    fn find_library_fails_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_library(dir.path()).is_err());
    }
}
