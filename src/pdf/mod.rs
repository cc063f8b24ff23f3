pub mod image_xobject;
pub mod reader;

pub use reader::PdfStore;
