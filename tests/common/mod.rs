#![allow(dead_code)]

use exif::{Field, In, Rational, Tag, Value, experimental::Writer};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::{io::Cursor, sync::Arc};
use storage_catalog::{
    services::{
        CatalogStore, Pipeline, Scope, TaskLedger,
        catalog_store::{self, CatalogCounts},
    },
    storage::{MemoryStorage, ObjectStorage},
};
use tempfile::TempDir;

pub const SCHEMA: &str = "catalog";
pub const BUCKET: &str = "photos";

pub struct Harness {
    _dir: TempDir,
    pub storage: MemoryStorage,
    pub pipeline: Pipeline,
    pub scope: Scope,
}

impl Harness {
    pub async fn new() -> Self {
        let storage = MemoryStorage::new();
        storage.create_bucket(BUCKET);
        Self::with_storage(storage.clone(), Arc::new(storage)).await
    }

    /// Run the pipeline against `backend` while seeding through `storage`.
    pub async fn with_storage(storage: MemoryStorage, backend: Arc<dyn ObjectStorage>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogStore::new(dir.path());
        let ledger = TaskLedger::open(dir.path()).await.unwrap();
        let pipeline = Pipeline::new(catalog, ledger, backend);
        Self {
            _dir: dir,
            storage,
            pipeline,
            scope: Scope::new(SCHEMA, BUCKET).unwrap(),
        }
    }

    /// Put source content under the data prefix.
    pub fn put(&self, key: &str, body: &[u8], content_type: &str) {
        self.storage
            .insert(BUCKET, &format!("data/{}", key), body.to_vec(), content_type);
    }

    pub fn remove(&self, key: &str) {
        assert!(self.storage.remove(BUCKET, &format!("data/{}", key)));
    }

    pub async fn counts(&self) -> CatalogCounts {
        let pool = self.pipeline.catalog().pool(SCHEMA).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        catalog_store::catalog_counts(&mut conn).await.unwrap()
    }

    pub async fn blob_id(&self, content_hash: &str) -> i64 {
        let pool = self.pipeline.catalog().pool(SCHEMA).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        catalog_store::find_blob_by_hash(&mut conn, content_hash)
            .await
            .unwrap()
            .expect("blob is cataloged")
            .id
    }
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn md5_hex(body: &[u8]) -> String {
    format!("{:x}", md5::compute(body))
}

/// A solid-colour PNG.
pub fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
        .unwrap();
    out
}

/// A JPEG with an APP1 EXIF block: a SONY camera, taken 2023-07-14 18:22:05,
/// 51°30'36" S, rotated 90° clockwise.
pub fn camera_jpeg(width: u32, height: u32) -> Vec<u8> {
    let ascii = |text: &str| Value::Ascii(vec![text.as_bytes().to_vec()]);
    let fields: Vec<Field> = [
        (Tag::Make, ascii("SONY")),
        (Tag::Model, ascii("DSC-RX100")),
        (Tag::Orientation, Value::Short(vec![6])),
        (Tag::DateTimeOriginal, ascii("2023:07:14 18:22:05")),
        (Tag::GPSLatitudeRef, ascii("S")),
        (
            Tag::GPSLatitude,
            Value::Rational(vec![
                Rational { num: 51, denom: 1 },
                Rational { num: 30, denom: 1 },
                Rational { num: 36, denom: 1 },
            ]),
        ),
    ]
    .into_iter()
    .map(|(tag, value)| Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    })
    .collect();
    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 140, 200])));
    let mut jpeg = Vec::new();
    img.write_to(&mut Cursor::new(&mut jpeg), ImageOutputFormat::Jpeg(90))
        .unwrap();

    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&u16::try_from(8 + tiff.len()).unwrap().to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}
