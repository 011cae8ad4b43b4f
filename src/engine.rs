mod instance;
mod map;
mod projection;
mod registrar;

pub use instance::MapnikEngine;
pub use map::{Map, MapId};
pub use projection::Projection;
pub use registrar::{is_font_file, register_datasources, register_fonts, FONT_EXTENSIONS};
