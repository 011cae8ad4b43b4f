use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};

use crate::ffi;
use crate::render::backend::{
    AssetRejected, Coord, MapBackend, NativeFailure, NativeImage, NativeMap, NativeProjection, NativeResult,
    Severity,
};
use crate::render::viewport::BoundingBox;

/// Backend calling into the native engine through its C shim.
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies a C string owned by the engine. `NULL` and `""` both mean "no message".
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string valid for the duration of the call.
unsafe fn engine_message(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let msg = CStr::from_ptr(ptr).to_string_lossy().into_owned();
    (!msg.is_empty()).then_some(msg)
}

fn path_cstring(path: &Path) -> Result<CString, String> {
    let s = path
        .to_str()
        .ok_or_else(|| format!("path is not valid UTF-8: {}", path.display()))?;
    CString::new(s).map_err(|_| format!("path contains a NUL byte: {}", path.display()))
}

type RegisterFn = unsafe extern "C" fn(*const c_char, *mut *mut c_char) -> i32;

fn register(path: &Path, call: RegisterFn) -> Result<(), AssetRejected> {
    let cs = path_cstring(path).map_err(AssetRejected::new)?;
    let mut err: *mut c_char = ptr::null_mut();

    // SAFETY: `cs` outlives the call; on failure the shim hands over a strdup'ed message.
    let status = unsafe { call(cs.as_ptr(), &mut err) };
    if status == 0 {
        return Ok(());
    }

    // SAFETY: `err` is null or a malloc'ed string that we now own.
    let message = unsafe {
        let message = engine_message(err);
        if !err.is_null() {
            libc::free(err as *mut c_void);
        }
        message
    };
    Err(AssetRejected { message })
}

impl MapBackend for NativeBackend {
    fn name(&self) -> &str {
        "NativeBackend"
    }

    fn version(&self) -> String {
        // SAFETY: returns a pointer to a static string.
        unsafe { engine_message(ffi::mapnik_version_string()) }.unwrap_or_default()
    }

    fn set_log_severity(&self, severity: Severity) {
        let level = match severity {
            Severity::Debug => ffi::MAPNIK_DEBUG,
            Severity::Warn => ffi::MAPNIK_WARN,
            Severity::Error => ffi::MAPNIK_ERROR,
            Severity::None => ffi::MAPNIK_NONE,
        };
        // SAFETY: plain value call.
        unsafe { ffi::mapnik_logging_set_severity(level) }
    }

    fn register_font(&self, path: &Path) -> Result<(), AssetRejected> {
        register(path, ffi::mapnik_register_font)
    }

    fn register_datasource(&self, path: &Path) -> Result<(), AssetRejected> {
        register(path, ffi::mapnik_register_datasource)
    }

    fn create_map(&self, width: u32, height: u32) -> Box<dyn NativeMap + Send> {
        // SAFETY: allocation only; the result is checked for null below.
        let raw = unsafe { ffi::mapnik_map(width, height) };
        let Some(ptr) = NonNull::new(raw) else {
            panic!("native engine could not allocate a {width}x{height} map");
        };
        Box::new(NativeMapHandle {
            ptr,
            width,
            height,
            local_error: None,
        })
    }
}

/// Exclusively owned `mapnik_map_t`.
pub struct NativeMapHandle {
    ptr: NonNull<ffi::mapnik_map_t>,
    width: u32,
    height: u32,
    /// Failures detected before reaching the engine (bad strings).
    local_error: Option<String>,
}

// SAFETY: the handle is never aliased and the engine's map has no thread affinity.
unsafe impl Send for NativeMapHandle {}

fn status(code: i32) -> NativeResult {
    if code == 0 {
        Ok(())
    } else {
        Err(NativeFailure)
    }
}

impl NativeMapHandle {
    fn local_failure(&mut self, message: String) -> NativeFailure {
        self.local_error = Some(message);
        NativeFailure
    }
}

impl Drop for NativeMapHandle {
    fn drop(&mut self) {
        // SAFETY: we own the handle and drop runs once.
        unsafe { ffi::mapnik_map_free(self.ptr.as_ptr()) }
    }
}

impl NativeMap for NativeMapHandle {
    fn last_error(&self) -> Option<String> {
        if let Some(local) = &self.local_error {
            return Some(local.clone());
        }
        // SAFETY: the handle is live; the message is copied before returning.
        unsafe { engine_message(ffi::mapnik_map_last_error(self.ptr.as_ptr())) }
    }

    fn load(&mut self, stylesheet: &Path) -> NativeResult {
        self.local_error = None;
        let cs = path_cstring(stylesheet).map_err(|e| self.local_failure(e))?;
        // SAFETY: live handle, `cs` outlives the call.
        let code = unsafe { ffi::mapnik_map_load(self.ptr.as_ptr(), cs.as_ptr()) };
        status(code)
    }

    fn load_string(&mut self, stylesheet: &str) -> NativeResult {
        self.local_error = None;
        let cs = CString::new(stylesheet).map_err(|_| self.local_failure("stylesheet contains a NUL byte".into()))?;
        // SAFETY: live handle, `cs` outlives the call.
        let code = unsafe { ffi::mapnik_map_load_string(self.ptr.as_ptr(), cs.as_ptr()) };
        status(code)
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) {
        // SAFETY: live handle.
        unsafe { ffi::mapnik_map_resize(self.ptr.as_ptr(), width, height) };
        self.width = width;
        self.height = height;
    }

    fn srs(&self) -> String {
        // SAFETY: the returned pointer references the map's own string and is copied at once.
        unsafe { engine_message(ffi::mapnik_map_get_srs(self.ptr.as_ptr())) }.unwrap_or_default()
    }

    fn set_srs(&mut self, srs: &str) {
        let Ok(cs) = CString::new(srs) else {
            log::warn!("ignoring SRS containing a NUL byte");
            return;
        };
        // SAFETY: live handle, `cs` outlives the call.
        unsafe { ffi::mapnik_map_set_srs(self.ptr.as_ptr(), cs.as_ptr()) };
    }

    fn zoom_all(&mut self) -> NativeResult {
        self.local_error = None;
        // SAFETY: live handle.
        let code = unsafe { ffi::mapnik_map_zoom_all(self.ptr.as_ptr()) };
        status(code)
    }

    fn zoom_to_box(&mut self, bbox: BoundingBox) {
        // SAFETY: the box is freed right after use; the map copies it.
        unsafe {
            let b = ffi::mapnik_bbox(bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y);
            ffi::mapnik_map_zoom_to_box(self.ptr.as_ptr(), b);
            ffi::mapnik_bbox_free(b);
        }
    }

    fn set_buffer_size(&mut self, pixels: i32) {
        // SAFETY: live handle.
        unsafe { ffi::mapnik_map_set_buffer_size(self.ptr.as_ptr(), pixels) }
    }

    fn set_max_connections(&mut self, count: i32) {
        // SAFETY: live handle.
        unsafe { ffi::mapnik_map_set_max_connections(self.ptr.as_ptr(), count) }
    }

    fn render_to_file(&mut self, path: &Path) -> NativeResult {
        self.local_error = None;
        let cs = path_cstring(path).map_err(|e| self.local_failure(e))?;
        // SAFETY: live handle, `cs` outlives the call.
        let code = unsafe { ffi::mapnik_map_render_to_file(self.ptr.as_ptr(), cs.as_ptr()) };
        status(code)
    }

    fn render_to_image(&mut self, scale: f64, scale_factor: f64) -> NativeResult<Box<dyn NativeImage>> {
        self.local_error = None;
        // SAFETY: live handle; a non-null result is a new image we own.
        let raw = unsafe { ffi::mapnik_map_render_to_image(self.ptr.as_ptr(), scale, scale_factor) };
        let ptr = NonNull::new(raw).ok_or(NativeFailure)?;
        Ok(Box::new(NativeImageHandle { ptr }))
    }

    fn projection(&self) -> Box<dyn NativeProjection + Send> {
        // SAFETY: live handle; the shim always returns an allocated wrapper.
        let raw = unsafe { ffi::mapnik_map_projection(self.ptr.as_ptr()) };
        Box::new(NativeProjectionHandle { ptr: NonNull::new(raw) })
    }
}

pub struct NativeImageHandle {
    ptr: NonNull<ffi::mapnik_image_t>,
}

impl Drop for NativeImageHandle {
    fn drop(&mut self) {
        // SAFETY: we own the image.
        unsafe { ffi::mapnik_image_free(self.ptr.as_ptr()) }
    }
}

impl NativeImage for NativeImageHandle {
    fn last_error(&self) -> Option<String> {
        // SAFETY: live handle; copied before returning.
        unsafe { engine_message(ffi::mapnik_image_last_error(self.ptr.as_ptr())) }
    }

    fn to_raw(&self) -> &[u8] {
        let mut size = 0usize;
        // SAFETY: the buffer belongs to the image and lives as long as `self`.
        unsafe {
            let data = ffi::mapnik_image_to_raw(self.ptr.as_ptr(), &mut size);
            if data.is_null() {
                return &[];
            }
            std::slice::from_raw_parts(data, size)
        }
    }

    fn to_blob(&mut self, format: &str) -> NativeResult<Vec<u8>> {
        let cs = CString::new(format).map_err(|_| NativeFailure)?;
        // SAFETY: live handle; the blob is copied and freed before returning.
        unsafe {
            let blob = ffi::mapnik_image_to_blob(self.ptr.as_ptr(), cs.as_ptr());
            if blob.is_null() {
                return Err(NativeFailure);
            }
            let b = &*blob;
            let bytes = if b.ptr.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(b.ptr as *const u8, b.len).to_vec()
            };
            ffi::mapnik_image_blob_free(blob);
            Ok(bytes)
        }
    }
}

pub struct NativeProjectionHandle {
    ptr: Option<NonNull<ffi::mapnik_projection_t>>,
}

// SAFETY: exclusively owned, no thread affinity.
unsafe impl Send for NativeProjectionHandle {}

impl Drop for NativeProjectionHandle {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr {
            // SAFETY: we own the projection.
            unsafe { ffi::mapnik_projection_free(ptr.as_ptr()) }
        }
    }
}

impl NativeProjection for NativeProjectionHandle {
    fn forward(&self, coord: Coord) -> Coord {
        let Some(ptr) = self.ptr else {
            return coord;
        };
        let c = ffi::mapnik_coord_t { x: coord.x, y: coord.y };
        // SAFETY: live handle, value in and out.
        let out = unsafe { ffi::mapnik_projection_forward(ptr.as_ptr(), c) };
        Coord { x: out.x, y: out.y }
    }
}
