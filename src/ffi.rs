//! Raw declarations of the engine's C shim (`libmapnik_c_api`).
//!
//! Nothing here is safe to call directly; [`NativeBackend`](crate::render::backends::native::NativeBackend)
//! wraps every handle in an owning type.

#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_double, c_int, c_uint};

pub const MAPNIK_DEBUG: c_int = 0;
pub const MAPNIK_WARN: c_int = 1;
pub const MAPNIK_ERROR: c_int = 2;
pub const MAPNIK_NONE: c_int = 3;

#[repr(C)]
pub struct mapnik_map_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct mapnik_image_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct mapnik_projection_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct mapnik_bbox_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct mapnik_image_blob_t {
    pub ptr: *mut c_char,
    pub len: usize,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct mapnik_coord_t {
    pub x: c_double,
    pub y: c_double,
}

#[link(name = "mapnik_c_api")]
extern "C" {
    pub fn mapnik_version_string() -> *const c_char;
    pub fn mapnik_logging_set_severity(level: c_int);

    /// On failure `err` receives a `strdup`ed message the caller must `free`.
    pub fn mapnik_register_font(path: *const c_char, err: *mut *mut c_char) -> c_int;
    pub fn mapnik_register_datasource(path: *const c_char, err: *mut *mut c_char) -> c_int;

    pub fn mapnik_map(width: c_uint, height: c_uint) -> *mut mapnik_map_t;
    pub fn mapnik_map_free(m: *mut mapnik_map_t);
    pub fn mapnik_map_last_error(m: *mut mapnik_map_t) -> *const c_char;
    pub fn mapnik_map_load(m: *mut mapnik_map_t, stylesheet: *const c_char) -> c_int;
    pub fn mapnik_map_load_string(m: *mut mapnik_map_t, stylesheet: *const c_char) -> c_int;
    pub fn mapnik_map_resize(m: *mut mapnik_map_t, width: c_uint, height: c_uint);
    pub fn mapnik_map_get_srs(m: *mut mapnik_map_t) -> *const c_char;
    pub fn mapnik_map_set_srs(m: *mut mapnik_map_t, srs: *const c_char) -> c_int;
    pub fn mapnik_map_zoom_all(m: *mut mapnik_map_t) -> c_int;
    pub fn mapnik_map_zoom_to_box(m: *mut mapnik_map_t, b: *mut mapnik_bbox_t);
    pub fn mapnik_map_set_buffer_size(m: *mut mapnik_map_t, buffer_size: c_int);
    pub fn mapnik_map_set_max_connections(m: *mut mapnik_map_t, count: c_int);
    pub fn mapnik_map_render_to_file(m: *mut mapnik_map_t, path: *const c_char) -> c_int;
    pub fn mapnik_map_render_to_image(m: *mut mapnik_map_t, scale: c_double, scale_factor: c_double)
        -> *mut mapnik_image_t;
    pub fn mapnik_map_projection(m: *mut mapnik_map_t) -> *mut mapnik_projection_t;

    pub fn mapnik_bbox(minx: c_double, miny: c_double, maxx: c_double, maxy: c_double) -> *mut mapnik_bbox_t;
    pub fn mapnik_bbox_free(b: *mut mapnik_bbox_t);

    pub fn mapnik_image_free(i: *mut mapnik_image_t);
    pub fn mapnik_image_last_error(i: *mut mapnik_image_t) -> *const c_char;
    pub fn mapnik_image_to_raw(i: *mut mapnik_image_t, size: *mut usize) -> *const u8;
    pub fn mapnik_image_to_blob(i: *mut mapnik_image_t, format: *const c_char) -> *mut mapnik_image_blob_t;
    pub fn mapnik_image_blob_free(b: *mut mapnik_image_blob_t);

    pub fn mapnik_projection_free(p: *mut mapnik_projection_t);
    pub fn mapnik_projection_forward(p: *mut mapnik_projection_t, c: mapnik_coord_t) -> mapnik_coord_t;
}
