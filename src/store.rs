use serde::Serialize;

use crate::raster::EncodedImage;

/// Object reference inside the document (`12 0 R`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectRef {
    pub number: u32,
    pub generation: u16,
}

impl ObjectRef {
    pub fn new(number: u32, generation: u16) -> Self {
        ObjectRef { number, generation }
    }
}

impl From<lopdf::ObjectId> for ObjectRef {
    fn from((number, generation): lopdf::ObjectId) -> Self {
        ObjectRef { number, generation }
    }
}

impl From<ObjectRef> for lopdf::ObjectId {
    fn from(r: ObjectRef) -> Self {
        (r.number, r.generation)
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// One embedded image as listed on a page.
///
/// `page_index` and `image_index` are 0-based.
#[derive(Debug, Clone)]
pub struct ImageDescriptor {
    pub page_index: u32,
    pub image_index: u32,
    pub object_ref: ObjectRef,
    pub payload: EncodedImage,
    /// Declared color space name (`DeviceRGB`, `ICCBased`, `Indexed`, ...).
    pub color_space: String,
    pub width: u32,
    pub height: u32,
    /// `/SMask`, or `/Mask` when it points at a stencil mask stream.
    pub mask_ref: Option<ObjectRef>,
    pub internal_alpha: bool,
    /// Embedded ICC profile of an `ICCBased` color space.
    pub icc_profile: Option<Vec<u8>>,
}

impl ImageDescriptor {
    pub fn extension(&self) -> &str {
        &self.payload.extension
    }
}

/// Document store collaborator.
///
/// Implementations must be shareable across worker threads; every method
/// takes `&self`.
pub trait DocumentStore: Sync {
    fn page_count(&self) -> u32;

    /// Images on one page (0-based), in a stable order.
    fn page_images(&self, page_index: u32) -> crate::error::Result<Vec<ImageDescriptor>>;

    /// Encoded payload of any image object, base or mask.
    fn extract_raw_bytes(&self, object_ref: ObjectRef) -> crate::error::Result<EncodedImage>;

    /// Fast check for an alpha channel embedded in the image payload itself.
    fn probe_internal_alpha(&self, object_ref: ObjectRef) -> bool;
}
