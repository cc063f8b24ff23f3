use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::image_xobject::{encoded_payload, read_image_meta};
use crate::error::ExtractError;
use crate::raster::EncodedImage;
use crate::raster::codec::payload_has_alpha;
use crate::store::{DocumentStore, ImageDescriptor, ObjectRef};

/// Form XObject をたどる深さの上限
const MAX_FORM_DEPTH: u8 = 8;

/// lopdf ベースの DocumentStore 実装。
pub struct PdfStore {
    doc: Document,
    /// 1-indexed ページ番号 -> ページObjectId
    pages: BTreeMap<u32, ObjectId>,
}

impl PdfStore {
    /// PDFファイルを開いてPdfStoreを作成する。開けない場合は致命的エラー。
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let doc = Document::load(path)
            .map_err(|e| ExtractError::store_open(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_document(doc))
    }

    /// メモリ上のPDFから作成する。
    pub fn load_mem(bytes: &[u8]) -> crate::error::Result<Self> {
        let doc = Document::load_mem(bytes).map_err(|e| ExtractError::store_open(e.to_string()))?;
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: Document) -> Self {
        let pages = doc.get_pages();
        Self { doc, pages }
    }

    /// 内部のlopdf Documentへの参照を返す。
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// ページ番号(1-indexed)からObjectIdを取得する。
    fn get_page_id(&self, page_num: u32) -> crate::error::Result<ObjectId> {
        self.pages
            .get(&page_num)
            .copied()
            .ok_or_else(|| ExtractError::pdf_read(format!("page {} not found", page_num)))
    }

    /// 指定ページ(1-indexed)の画像XObjectを `名前 -> ObjectId` で収集する。
    ///
    /// ページ直下のResources、継承されたResources、Form XObject内のResourcesを対象とする。
    fn page_image_ids(&self, page_num: u32) -> crate::error::Result<Vec<ObjectId>> {
        let page_id = self.get_page_id(page_num)?;
        let (resource_dict, resource_ids) = self.doc.get_page_resources(page_id)?;

        let mut found: BTreeMap<String, ObjectId> = BTreeMap::new();
        let mut visited_forms: HashSet<ObjectId> = HashSet::new();

        if let Some(dict) = resource_dict {
            self.collect_images_from_resources(dict, "", 0, &mut found, &mut visited_forms)?;
        }
        for res_id in resource_ids {
            let dict = self.doc.get_dictionary(res_id)?;
            self.collect_images_from_resources(dict, "", 0, &mut found, &mut visited_forms)?;
        }

        // 名前順で、同じオブジェクトへの重複参照は最初の1件のみ
        let mut seen = HashSet::new();
        Ok(found
            .into_values()
            .filter(|id| seen.insert(*id))
            .collect())
    }

    /// リソース辞書のXObjectエントリからSubtype=Imageのストリームを列挙する。
    /// Form XObject は再帰的にたどり、名前にプレフィックスを付けて区別する。
    fn collect_images_from_resources(
        &self,
        dict: &Dictionary,
        prefix: &str,
        depth: u8,
        found: &mut BTreeMap<String, ObjectId>,
        visited_forms: &mut HashSet<ObjectId>,
    ) -> crate::error::Result<()> {
        let xobject_dict = match dict.get(b"XObject") {
            Ok(Object::Dictionary(d)) => d,
            Ok(Object::Reference(id)) => self.doc.get_object(*id).and_then(Object::as_dict)?,
            // XObjectエントリがない場合は何もしない
            _ => return Ok(()),
        };

        for (name_bytes, value) in xobject_dict.iter() {
            // インラインのストリームはObjectIdを持たないため対象外
            let Object::Reference(id) = value else {
                continue;
            };
            let Ok(stream) = self.doc.get_object(*id).and_then(Object::as_stream) else {
                continue;
            };
            let name = format!("{}{}", prefix, String::from_utf8_lossy(name_bytes));

            match stream.dict.get(b"Subtype").and_then(Object::as_name) {
                Ok(b"Image") => {
                    found.insert(name, *id);
                }
                Ok(b"Form") if depth < MAX_FORM_DEPTH && visited_forms.insert(*id) => {
                    let resources = match stream.dict.get(b"Resources") {
                        Ok(Object::Dictionary(d)) => Some(d),
                        Ok(Object::Reference(rid)) => self.doc.get_dictionary(*rid).ok(),
                        _ => None,
                    };
                    if let Some(resources) = resources {
                        let nested = format!("{}/", name);
                        self.collect_images_from_resources(
                            resources,
                            &nested,
                            depth + 1,
                            found,
                            visited_forms,
                        )?;
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn image_stream(&self, object_ref: ObjectRef) -> crate::error::Result<&lopdf::Stream> {
        let id: ObjectId = object_ref.into();
        let stream = self.doc.get_object(id).and_then(Object::as_stream)?;
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => Ok(stream),
            _ => Err(ExtractError::image_xobject(format!(
                "{} is not an image XObject",
                object_ref
            ))),
        }
    }

    /// `/SMask`、またはステンシルマスクを指す `/Mask` の参照を返す。
    /// カラーキーマスク（配列の `/Mask`）は対象外。
    fn mask_reference(&self, dict: &Dictionary) -> Option<ObjectRef> {
        for key in [&b"SMask"[..], &b"Mask"[..]] {
            if let Ok(Object::Reference(id)) = dict.get(key)
                && self.doc.get_object(*id).and_then(Object::as_stream).is_ok()
            {
                return Some((*id).into());
            }
        }
        None
    }

    fn describe(
        &self,
        page_index: u32,
        image_index: u32,
        id: ObjectId,
    ) -> crate::error::Result<ImageDescriptor> {
        let object_ref = ObjectRef::from(id);
        let stream = self.image_stream(object_ref)?;
        let meta = read_image_meta(&self.doc, &stream.dict)?;
        let payload = encoded_payload(stream, &meta)?;

        Ok(ImageDescriptor {
            page_index,
            image_index,
            object_ref,
            internal_alpha: meta.smask_in_data || alpha_in_header(&payload),
            payload,
            color_space: meta.color_space.name,
            width: meta.width,
            height: meta.height,
            mask_ref: self.mask_reference(&stream.dict),
            icc_profile: meta.color_space.icc_profile,
        })
    }

    /// メタデータが読めない画像の記述子。ストリーム内容を `bin` として保持する。
    fn undecodable(
        &self,
        page_index: u32,
        image_index: u32,
        id: ObjectId,
    ) -> crate::error::Result<ImageDescriptor> {
        let stream = self.doc.get_object(id).and_then(Object::as_stream)?;
        Ok(ImageDescriptor {
            page_index,
            image_index,
            object_ref: id.into(),
            payload: EncodedImage {
                bytes: stream.content.clone(),
                extension: "bin".to_string(),
                invert: false,
                layout: None,
            },
            color_space: String::new(),
            width: 0,
            height: 0,
            mask_ref: None,
            internal_alpha: false,
            icc_profile: None,
        })
    }
}

/// 自己記述形式のペイロードのみヘッダを調べる（raw サンプルはアルファを持たない）
fn alpha_in_header(payload: &EncodedImage) -> bool {
    payload.layout.is_none() && payload_has_alpha(&payload.bytes)
}

impl DocumentStore for PdfStore {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_images(&self, page_index: u32) -> crate::error::Result<Vec<ImageDescriptor>> {
        let ids = self.page_image_ids(page_index + 1)?;
        let mut descriptors = Vec::with_capacity(ids.len());
        for (image_index, id) in ids.into_iter().enumerate() {
            match self.describe(page_index, image_index as u32, id) {
                Ok(d) => descriptors.push(d),
                Err(e) => {
                    // ペイロードを取り出せない画像は元ストリームをそのまま渡す
                    tracing::warn!(
                        page = page_index + 1,
                        xref = %ObjectRef::from(id),
                        error = %e,
                        "image metadata unreadable, passing stream content through"
                    );
                    descriptors.push(self.undecodable(page_index, image_index as u32, id)?);
                }
            }
        }
        Ok(descriptors)
    }

    fn extract_raw_bytes(&self, object_ref: ObjectRef) -> crate::error::Result<EncodedImage> {
        let stream = self.image_stream(object_ref)?;
        let meta = read_image_meta(&self.doc, &stream.dict)?;
        encoded_payload(stream, &meta)
    }

    fn probe_internal_alpha(&self, object_ref: ObjectRef) -> bool {
        let Ok(stream) = self.image_stream(object_ref) else {
            return false;
        };
        if let Ok(meta) = read_image_meta(&self.doc, &stream.dict)
            && meta.smask_in_data
        {
            return true;
        }
        self.extract_raw_bytes(object_ref)
            .map(|payload| alpha_in_header(&payload))
            .unwrap_or(false)
    }
}
